//! Condition trees and the AND/OR accumulator each clause builds into.
//!
//! A [`Criteria`] holds the condition accumulated so far for one clause (WHERE, HAVING or the
//! ON of one join). Adding a condition never touches existing nodes: the previous root becomes
//! the left child of a new `AND`/`OR` node.

use crate::column::{Column, Operand, render_template};
use crate::error::{OrmError, OrmResult};
use crate::qb::Select;
use crate::sql::Composer;
use crate::value::Value;
use std::sync::Arc;

/// How a new condition joins the accumulated one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Junction {
    And,
    Or,
}

impl Junction {
    fn keyword(self) -> &'static str {
        match self {
            Junction::And => " AND ",
            Junction::Or => " OR ",
        }
    }
}

/// One comparison or test.
#[derive(Debug, Clone)]
pub(crate) enum Predicate {
    Compare {
        left: Column,
        op: &'static str,
        right: Operand,
    },
    Like {
        column: Column,
        pattern: Value,
        negated: bool,
        case_insensitive: bool,
    },
    InList {
        column: Column,
        values: Vec<Value>,
        negated: bool,
    },
    InSubquery {
        column: Column,
        subquery: Box<Select>,
        negated: bool,
    },
    Exists {
        subquery: Box<Select>,
        negated: bool,
    },
    Between {
        column: Column,
        low: Operand,
        high: Operand,
        negated: bool,
    },
    IsNull {
        column: Column,
        negated: bool,
    },
    Quantified {
        column: Column,
        op: &'static str,
        quantifier: &'static str,
        subquery: Box<Select>,
    },
    Template {
        template: Arc<str>,
        args: Vec<Operand>,
    },
}

impl Predicate {
    fn render(&self, c: &mut Composer<'_>) -> OrmResult<()> {
        match self {
            Predicate::Compare { left, op, right } => {
                left.render(c)?;
                c.push(" ").push(op).push(" ");
                right.render(c)
            }
            Predicate::Like {
                column,
                pattern,
                negated,
                case_insensitive,
            } => {
                column.render(c)?;
                c.push(match (negated, case_insensitive) {
                    (false, false) => " LIKE ",
                    (true, false) => " NOT LIKE ",
                    (false, true) => " ILIKE ",
                    (true, true) => " NOT ILIKE ",
                });
                c.bind(pattern.clone());
                Ok(())
            }
            Predicate::InList {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    c.push(if *negated { "1=1" } else { "1=0" });
                    return Ok(());
                }
                column.render(c)?;
                c.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        c.push(", ");
                    }
                    c.bind(v.clone());
                }
                c.push(")");
                Ok(())
            }
            Predicate::InSubquery {
                column,
                subquery,
                negated,
            } => {
                column.render(c)?;
                c.push(if *negated { " NOT IN (" } else { " IN (" });
                subquery.render_subquery(c)?;
                c.push(")");
                Ok(())
            }
            Predicate::Exists { subquery, negated } => {
                c.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                subquery.render_subquery(c)?;
                c.push(")");
                Ok(())
            }
            Predicate::Between {
                column,
                low,
                high,
                negated,
            } => {
                column.render(c)?;
                c.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                low.render(c)?;
                c.push(" AND ");
                high.render(c)
            }
            Predicate::IsNull { column, negated } => {
                column.render(c)?;
                c.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
                Ok(())
            }
            Predicate::Quantified {
                column,
                op,
                quantifier,
                subquery,
            } => {
                column.render(c)?;
                c.push(" ").push(op).push(" ").push(quantifier).push(" (");
                subquery.render_subquery(c)?;
                c.push(")");
                Ok(())
            }
            Predicate::Template { template, args } => render_template(template, args, c),
        }
    }
}

/// A node of the condition tree.
#[derive(Debug, Clone)]
pub(crate) enum Condition {
    Predicate(Predicate),
    Junction(Junction, Box<Condition>, Box<Condition>),
    /// A parenthesized sub-group built by `paren`.
    Group(Box<Condition>),
}

impl Condition {
    pub(crate) fn render(&self, c: &mut Composer<'_>) -> OrmResult<()> {
        self.render_in(c, None)
    }

    fn render_in(&self, c: &mut Composer<'_>, parent: Option<Junction>) -> OrmResult<()> {
        match self {
            Condition::Predicate(p) => p.render(c),
            Condition::Junction(junction, left, right) => {
                let wrap = parent.is_some_and(|p| p != *junction);
                if wrap {
                    c.push("(");
                }
                left.render_in(c, Some(*junction))?;
                c.push(junction.keyword());
                right.render_in(c, Some(*junction))?;
                if wrap {
                    c.push(")");
                }
                Ok(())
            }
            Condition::Group(inner) => match inner.as_ref() {
                Condition::Predicate(p) => p.render(c),
                other => {
                    c.push("(");
                    other.render_in(c, None)?;
                    c.push(")");
                    Ok(())
                }
            },
        }
    }

    fn is_composite(&self) -> bool {
        matches!(self, Condition::Junction(..))
    }
}

/// Render several conditions joined with `AND`.
pub(crate) fn render_conjunction(
    conditions: &[&Condition],
    c: &mut Composer<'_>,
) -> OrmResult<()> {
    let parent = (conditions.len() > 1).then_some(Junction::And);
    for (i, cond) in conditions.iter().enumerate() {
        if i > 0 {
            c.push(" AND ");
        }
        cond.render_in(c, parent)?;
    }
    Ok(())
}

/// Accumulator for one clause's condition.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    root: Option<Condition>,
    refuses: bool,
}

impl Criteria {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// A present-but-empty accumulator that refuses every condition (CROSS JOIN).
    pub(crate) fn null() -> Self {
        Self {
            root: None,
            refuses: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Whether this accumulator refuses conditions.
    pub fn is_null(&self) -> bool {
        self.refuses
    }

    pub(crate) fn add(&mut self, junction: Junction, condition: Condition) -> OrmResult<()> {
        if self.refuses {
            return Err(OrmError::illegal_state(
                "this clause does not accept conditions (CROSS JOIN has no ON criteria)",
            ));
        }
        self.root = Some(match self.root.take() {
            None => condition,
            Some(prev) => Condition::Junction(junction, Box::new(prev), Box::new(condition)),
        });
        Ok(())
    }

    /// AND a finished accumulator in as one unit.
    pub(crate) fn and_group(&mut self, other: Criteria) -> OrmResult<()> {
        match other.root {
            None => Ok(()),
            Some(cond) if self.root.is_none() && !self.refuses => {
                self.root = Some(cond);
                Ok(())
            }
            Some(cond) if cond.is_composite() => {
                self.add(Junction::And, Condition::Group(Box::new(cond)))
            }
            Some(cond) => self.add(Junction::And, cond),
        }
    }

    pub(crate) fn root(&self) -> Option<&Condition> {
        self.root.as_ref()
    }

    pub(crate) fn take(&mut self) -> Option<Condition> {
        self.root.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{StatementId, TableRef};
    use crate::config::SqlConfig;
    use crate::meta::TableDef;
    use crate::value::ValueKind;

    fn eq(t: &TableRef, name: &str, v: i64) -> Condition {
        Condition::Predicate(Predicate::Compare {
            left: t.col(name),
            op: "=",
            right: Operand::Value(Value::Int8(v)),
        })
    }

    fn render(criteria: &Criteria, t: &TableRef) -> String {
        let config = SqlConfig::default();
        let mut c = Composer::new(&config);
        c.open_scope([t.statement()]).unwrap();
        criteria.root().unwrap().render(&mut c).unwrap();
        c.finish().0
    }

    fn table() -> TableRef {
        let def = TableDef::builder("t")
            .column("a", ValueKind::Int8)
            .column("b", ValueKind::Int8)
            .column("c", ValueKind::Int8)
            .build()
            .unwrap();
        TableRef::new(def, StatementId::next())
    }

    #[test]
    fn left_fold_keeps_call_order() {
        let t = table();
        let mut criteria = Criteria::new();
        criteria.add(Junction::And, eq(&t, "a", 1)).unwrap();
        criteria.add(Junction::Or, eq(&t, "b", 2)).unwrap();
        criteria.add(Junction::And, eq(&t, "c", 3)).unwrap();
        assert_eq!(render(&criteria, &t), "(t0.a = $1 OR t0.b = $2) AND t0.c = $3");
    }

    #[test]
    fn group_is_one_unit() {
        let t = table();
        let mut inner = Criteria::new();
        inner.add(Junction::And, eq(&t, "b", 2)).unwrap();
        inner.add(Junction::Or, eq(&t, "c", 3)).unwrap();

        let mut outer = Criteria::new();
        outer.add(Junction::And, eq(&t, "a", 1)).unwrap();
        outer.and_group(inner).unwrap();
        assert_eq!(render(&outer, &t), "t0.a = $1 AND (t0.b = $2 OR t0.c = $3)");
    }

    #[test]
    fn null_criteria_refuses_conditions() {
        let t = table();
        let mut criteria = Criteria::null();
        let err = criteria.add(Junction::And, eq(&t, "a", 1)).unwrap_err();
        assert!(err.is_illegal_state());
        assert!(criteria.is_empty());
    }
}
