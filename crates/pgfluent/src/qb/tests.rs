use super::*;
use crate::column::Column;
use crate::condition::MatchType;
use crate::config::SqlConfig;
use crate::decorator::{ForUpdate, SqlComment};
use crate::meta::{SchemaRegistry, TableDef};
use crate::value::{Value, ValueKind};
use std::sync::Arc;

pub(crate) fn person() -> Arc<TableDef> {
    TableDef::builder("person")
        .column("id", ValueKind::Int8)
        .column("name", ValueKind::Text)
        .column("age", ValueKind::Int4)
        .nullable_column("team_id", ValueKind::Int8)
        .primary_key(&["id"])
        .references("person_team_fk", &["team_id"], "team", &["id"])
        .build()
        .unwrap()
}

pub(crate) fn team() -> Arc<TableDef> {
    TableDef::builder("team")
        .column("id", ValueKind::Int8)
        .column("name", ValueKind::Text)
        .primary_key(&["id"])
        .build()
        .unwrap()
}

pub(crate) fn pet() -> Arc<TableDef> {
    TableDef::builder("pet")
        .column("id", ValueKind::Int8)
        .column("owner_id", ValueKind::Int8)
        .column("name", ValueKind::Text)
        .primary_key(&["id"])
        .references("pet_owner_fk", &["owner_id"], "person", &["id"])
        .build()
        .unwrap()
}

const PERSON_COLUMNS: &str = "t0.id, t0.name, t0.age, t0.team_id";

// ==================== Projection ====================

#[test]
fn empty_select_projects_every_column_in_row_mode() {
    let select = Select::from(&person());
    let composed = select.compose().unwrap();
    assert_eq!(
        composed.sql(),
        format!("SELECT {PERSON_COLUMNS} FROM person t0")
    );
    assert!(composed.binders().is_empty());
    let mapping = composed.mapping().unwrap();
    assert_eq!(mapping.width(), 4);
    assert_eq!(mapping.table_count(), 1);
}

#[test]
fn row_projection_adds_missing_primary_key() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .select(|s| {
            s.col(p.col("name")).col(p.col("name"));
        })
        .unwrap();
    assert!(select.is_row_mode());
    assert_eq!(select.sql().unwrap(), "SELECT t0.name, t0.id FROM person t0");
}

#[test]
fn select_count_is_aggregate() {
    let mut select = Select::from(&person());
    select.select_count().unwrap();
    assert_eq!(select.row_mode_exit(), Some(RowModeTrigger::Count));
    assert_eq!(select.sql().unwrap(), "SELECT COUNT(*) FROM person t0");
    assert!(select.compose().unwrap().mapping().is_none());
}

#[test]
fn select_distinct_with_alias() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .select_distinct(|s| {
            s.expr_as(p.col("name").lower(), "lower_name");
        })
        .unwrap();
    assert_eq!(select.row_mode_exit(), Some(RowModeTrigger::Distinct));
    assert_eq!(
        select.sql().unwrap(),
        "SELECT DISTINCT LOWER(t0.name) AS lower_name FROM person t0"
    );
}

#[test]
fn template_arity_is_checked_at_compose() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .select(|s| {
            s.expr_as(Column::template("{0} + {1}", vec![p.col("age").into()]), "x");
        })
        .unwrap();
    assert!(select.compose().unwrap_err().is_illegal_state());
}

#[test]
fn unknown_column_fails_at_compose() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .where_(|w| w.col(p.col("nope")).eq(1))
        .unwrap();
    assert!(select.compose().unwrap_err().is_illegal_state());
}

// ==================== WHERE ====================

#[test]
fn where_order_and_paginate() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .where_(|w| w.col(p.col("age")).ge(18))
        .unwrap()
        .order_by(|o| {
            o.desc(p.col("age")).asc(p.col("name"));
        })
        .unwrap()
        .paginate(3, 10)
        .unwrap();
    assert!(select.is_row_mode());
    assert_eq!(
        select.sql().unwrap(),
        format!(
            "SELECT {PERSON_COLUMNS} FROM person t0 WHERE t0.age >= $1 ORDER BY t0.age DESC, t0.name LIMIT 10 OFFSET 20"
        )
    );
}

#[test]
fn where_calls_fold_like_one_conjunction() {
    let table = person();

    let mut split = Select::from(&table);
    let a = split.table();
    split
        .where_(|w| w.col(a.col("age")).gt(1))
        .unwrap()
        .where_(|w| w.col(a.col("name")).eq("x"))
        .unwrap();

    let mut joined = Select::from(&table);
    let b = joined.table();
    joined
        .where_(|w| w.col(b.col("age")).gt(1)?.and().col(b.col("name")).eq("x"))
        .unwrap();

    assert_eq!(split.sql().unwrap(), joined.sql().unwrap());
}

#[test]
fn or_group_stays_together_across_where_calls() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .where_(|w| w.col(p.col("age")).lt(18)?.or().col(p.col("age")).gt(65))
        .unwrap()
        .where_(|w| w.col(p.col("name")).is_not_null())
        .unwrap();
    assert_eq!(
        select.sql().unwrap(),
        format!(
            "SELECT {PERSON_COLUMNS} FROM person t0 WHERE (t0.age < $1 OR t0.age > $2) AND t0.name IS NOT NULL"
        )
    );
}

#[test]
fn paren_builds_a_nested_group() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .where_(|w| {
            w.col(p.col("id"))
                .eq(1_i64)?
                .and()
                .paren(|g| {
                    g.col(p.col("name"))
                        .like("an", MatchType::Prefix)?
                        .or()
                        .col(p.col("name"))
                        .in_list(["bob", "eve"])
                })
        })
        .unwrap();
    let composed = select.compose().unwrap();
    assert_eq!(
        composed.sql(),
        format!(
            "SELECT {PERSON_COLUMNS} FROM person t0 WHERE t0.id = $1 AND (t0.name LIKE $2 OR t0.name IN ($3, $4))"
        )
    );
    assert_eq!(composed.binders()[1].value(), &Value::Text("an%".into()));
}

#[test]
fn failed_paren_leaves_the_clause_untouched() {
    let mut select = Select::from(&person());
    let p = select.table();
    let err = select
        .where_(|w| {
            w.col(p.col("id"))
                .eq(1_i64)?
                .and()
                .paren(|g| g.col(p.col("age").max()).gt(3))
        })
        .unwrap_err();
    assert!(err.is_illegal_state());
    assert_eq!(
        select.sql().unwrap(),
        format!("SELECT {PERSON_COLUMNS} FROM person t0")
    );
}

#[test]
fn between_and_empty_in_list() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .where_(|w| {
            w.col(p.col("age"))
                .between(20, 30)?
                .and()
                .col(p.col("id"))
                .in_list(Vec::<i64>::new())
        })
        .unwrap();
    assert_eq!(
        select.sql().unwrap(),
        format!("SELECT {PERSON_COLUMNS} FROM person t0 WHERE t0.age BETWEEN $1 AND $2 AND 1=0")
    );
}

// ==================== Subqueries ====================

#[test]
fn exists_subquery_projects_star() {
    let mut people = Select::from(&person());
    let p = people.table();
    let mut pets = Select::from(&pet());
    let a = pets.table();
    pets.where_(|w| w.col(a.col("owner_id")).eq_col(p.col("id")))
        .unwrap();
    people.where_(|w| w.exists(pets)).unwrap();
    assert_eq!(
        people.sql().unwrap(),
        format!(
            "SELECT {PERSON_COLUMNS} FROM person t0 WHERE EXISTS (SELECT * FROM pet t1 WHERE t1.owner_id = t0.id)"
        )
    );
}

#[test]
fn in_subquery_with_projection() {
    let mut people = Select::from(&person());
    let p = people.table();
    let mut owners = Select::from(&pet());
    let o = owners.table();
    owners
        .select(|s| {
            s.col(o.col("owner_id"));
        })
        .unwrap();
    people
        .where_(|w| w.col(p.col("id")).in_subquery(owners))
        .unwrap();
    assert_eq!(
        people.sql().unwrap(),
        format!("SELECT {PERSON_COLUMNS} FROM person t0 WHERE t0.id IN (SELECT t1.owner_id FROM pet t1)")
    );
}

#[test]
fn foreign_column_is_rejected() {
    let stranger = Select::from(&person());
    let mut select = Select::from(&person());
    select
        .where_(|w| w.col(stranger.table().col("id")).eq(1_i64))
        .unwrap();
    let err = select.compose().unwrap_err();
    assert!(err.is_illegal_state());
    assert!(err.to_string().contains("person.id"));
}

// ==================== GROUP BY / HAVING ====================

#[test]
fn group_by_having() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .select(|s| {
            s.col(p.col("team_id"))
                .expr_as(p.col("id").count(), "members");
        })
        .unwrap()
        .group_by(|g| {
            g.col(p.col("team_id"));
        })
        .unwrap()
        .having(|h| h.col(p.col("id").count()).gt(2))
        .unwrap();
    assert!(!select.is_row_mode());
    assert_eq!(select.row_mode_exit(), Some(RowModeTrigger::Projection));
    assert_eq!(
        select.sql().unwrap(),
        "SELECT t0.team_id, COUNT(t0.id) AS members FROM person t0 GROUP BY t0.team_id HAVING COUNT(t0.id) > $1"
    );
}

#[test]
fn aggregate_in_where_is_rejected() {
    let mut select = Select::from(&person());
    let p = select.table();
    let err = select
        .where_(|w| w.col(p.col("age").sum()).gt(1))
        .unwrap_err();
    assert!(err.is_illegal_state());
}

#[test]
fn clause_lists_are_set_once() {
    let mut select = Select::from(&person());
    let p = select.table();
    select.select(|s| {
        s.col(p.col("id"));
    })
    .unwrap();
    assert!(select.select_count().unwrap_err().is_illegal_state());

    select.group_by(|g| {
        g.col(p.col("id"));
    })
    .unwrap();
    assert!(select.group_by(|_| {}).unwrap_err().is_illegal_state());

    select.order_by(|o| {
        o.asc(p.col("id"));
    })
    .unwrap();
    assert!(select.order_by(|_| {}).unwrap_err().is_illegal_state());
}

#[test]
fn ordering_by_expression_leaves_row_mode() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .order_by(|o| {
            o.asc(p.col("name").lower()).nulls_last();
        })
        .unwrap();
    assert_eq!(select.row_mode_exit(), Some(RowModeTrigger::Ordering));
    assert_eq!(
        select.sql().unwrap(),
        "SELECT * FROM person t0 ORDER BY LOWER(t0.name) NULLS LAST"
    );
}

// ==================== Composition lifecycle ====================

#[test]
fn compose_is_idempotent() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .where_(|w| w.col(p.col("name")).eq("ann"))
        .unwrap();
    let first = select.compose().unwrap();
    let second = select.compose().unwrap();
    assert_eq!(first.sql(), second.sql());
    assert_eq!(first.binders().len(), second.binders().len());
    assert!(Arc::ptr_eq(&first.shared_sql(), &second.shared_sql()));
}

#[test]
fn mutation_after_compose_fails_until_reset() {
    let mut select = Select::from(&person());
    let p = select.table();
    select.compose().unwrap();
    assert!(select.is_composed());
    let err = select
        .where_(|w| w.col(p.col("id")).eq(1_i64))
        .unwrap_err();
    assert!(err.is_illegal_state());
    assert!(select.limit(1).unwrap_err().is_illegal_state());

    select.reset();
    select
        .where_(|w| w.col(p.col("id")).eq(1_i64))
        .unwrap();
    assert_eq!(
        select.sql().unwrap(),
        format!("SELECT {PERSON_COLUMNS} FROM person t0 WHERE t0.id = $1")
    );
}

#[test]
fn reset_restores_row_mode() {
    let mut select = Select::from(&person());
    select.select_count().unwrap();
    assert!(!select.is_row_mode());
    select.reset();
    assert!(select.is_row_mode());
    select.select_count().unwrap();
}

#[test]
fn decorators_apply_once() {
    let mut select = Select::from(&team());
    select
        .apply(ForUpdate::new().skip_locked())
        .unwrap()
        .apply(SqlComment::new("report"))
        .unwrap();
    let expected = "/* report */ SELECT t0.id, t0.name FROM team t0 FOR UPDATE SKIP LOCKED";
    assert_eq!(select.sql().unwrap(), expected);
    assert_eq!(select.sql().unwrap(), expected);
}

#[test]
fn config_controls_aliases_and_quoting() {
    let select = Select::from(&team())
        .with_config(
            SqlConfig::new()
                .with_alias_prefix("x")
                .with_quoted_identifiers(),
        )
        .unwrap();
    assert_eq!(
        select.sql().unwrap(),
        "SELECT x0.\"id\", x0.\"name\" FROM \"team\" x0"
    );
}

#[test]
fn config_is_frozen_with_the_composition() {
    let mut select = Select::from(&team());
    let first = select.sql().unwrap();
    let err = select
        .clone()
        .with_config(SqlConfig::new().with_alias_prefix("x"))
        .unwrap_err();
    assert!(err.is_illegal_state());
    assert_eq!(select.sql().unwrap(), first);

    select.reset();
    let select = select
        .with_config(SqlConfig::new().with_alias_prefix("x"))
        .unwrap();
    assert_eq!(select.sql().unwrap(), "SELECT x0.id, x0.name FROM team x0");
}

#[test]
fn reproduce_shares_text_and_rebinds() {
    let mut select = Select::from(&person());
    let p = select.table();
    select
        .where_(|w| w.col(p.col("age")).gt(30)?.and().col(p.col("name")).ne("x"))
        .unwrap();
    let original = select.compose().unwrap();
    let again = select
        .reproduce(vec![Value::Int4(40), Value::Text("y".into())])
        .unwrap();
    assert!(Arc::ptr_eq(&original.shared_sql(), &again.composed().shared_sql()));
    assert_eq!(again.composed().binders()[0].value(), &Value::Int4(40));

    assert!(select.reproduce(vec![Value::Int4(1)]).unwrap_err().is_illegal_state());
    let same = select.reproduce_same().unwrap();
    assert_eq!(same.composed().binders()[1].value(), &Value::Text("x".into()));
}

// ==================== JOIN ====================

#[test]
fn inner_join_projects_both_tables() {
    let mut people = Select::from(&person());
    let teams = Select::from(&team());
    people
        .inner_join(teams)
        .unwrap()
        .on(|on, person, team| on.col(team.col("id")).eq_col(person.col("team_id")))
        .unwrap();
    let composed = people.compose().unwrap();
    assert_eq!(
        composed.sql(),
        format!("SELECT {PERSON_COLUMNS}, t1.id, t1.name FROM person t0 INNER JOIN team t1 ON t1.id = t0.team_id")
    );
    assert_eq!(composed.mapping().unwrap().table_count(), 2);
}

#[test]
fn joined_clauses_merge_by_ordinal() {
    let mut people = Select::from(&person());
    let p = people.table();
    let mut teams = Select::from(&team());
    let t = teams.table();
    teams
        .select(|s| {
            s.col_at(0, t.col("name"));
        })
        .unwrap()
        .where_(|w| w.col(t.col("name")).like("a", MatchType::Prefix))
        .unwrap();
    people
        .select(|s| {
            s.col(p.col("name")).col(p.col("age"));
        })
        .unwrap()
        .where_(|w| w.col(p.col("age")).gt(30))
        .unwrap();
    people
        .left_outer_join(teams)
        .unwrap()
        .on(|on, person, team| on.col(team.col("id")).eq_col(person.col("team_id")))
        .unwrap();
    let composed = people.compose().unwrap();
    assert_eq!(
        composed.sql(),
        "SELECT t0.name, t1.name, t0.age, t0.id, t1.id FROM person t0 \
         LEFT OUTER JOIN team t1 ON t1.id = t0.team_id WHERE t0.age > $1 AND t1.name LIKE $2"
    );
    assert_eq!(composed.binders()[0].value(), &Value::Int4(30));
}

#[test]
fn join_without_on_fails_at_compose() {
    let mut people = Select::from(&person());
    let pending = people.inner_join(Select::from(&team())).unwrap();
    drop(pending);
    assert!(people.compose().unwrap_err().is_illegal_state());
}

#[test]
fn cross_join_has_no_on() {
    let mut people = Select::from(&person());
    people.cross_join(Select::from(&team())).unwrap();
    assert_eq!(
        people.sql().unwrap(),
        format!("SELECT {PERSON_COLUMNS}, t1.id, t1.name FROM person t0 CROSS JOIN team t1")
    );
}

#[test]
fn join_on_relationship() {
    let (people_table, pet_table) = (person(), pet());
    let mut registry = SchemaRegistry::new();
    registry
        .register(Arc::clone(&people_table))
        .register(Arc::clone(&pet_table));

    let mut people = Select::from(&people_table);
    people
        .inner_join(Select::from(&pet_table))
        .unwrap()
        .on_relationship(&registry)
        .unwrap();
    assert_eq!(
        people.sql().unwrap(),
        format!(
            "SELECT {PERSON_COLUMNS}, t1.id, t1.owner_id, t1.name FROM person t0 INNER JOIN pet t1 ON t1.owner_id = t0.id"
        )
    );

    let mut teams = Select::from(&team());
    let err = teams
        .inner_join(Select::from(&pet_table))
        .unwrap()
        .on_relationship(&registry)
        .unwrap_err();
    assert!(err.is_illegal_state());
}

#[test]
fn limited_statement_cannot_be_joined() {
    let mut people = Select::from(&person());
    let mut teams = Select::from(&team());
    teams.limit(1).unwrap();
    assert!(people.inner_join(teams).is_err());
}

#[test]
fn joining_an_aggregate_statement_leaves_row_mode() {
    let mut people = Select::from(&person());
    let mut teams = Select::from(&team());
    teams.select_count().unwrap();
    people.cross_join(teams).unwrap();
    assert_eq!(people.row_mode_exit(), Some(RowModeTrigger::JoinedAggregate));
}

// ==================== Set operations ====================

#[test]
fn union_all_with_parenthesized_operand() {
    let mut first = Select::from(&team());
    let a = first.table();
    first
        .select(|s| {
            s.col(a.col("name"));
        })
        .unwrap()
        .where_(|w| w.col(a.col("id")).lt(10_i64))
        .unwrap();

    let mut second = Select::from(&team());
    let b = second.table();
    second
        .select(|s| {
            s.col(b.col("name"));
        })
        .unwrap()
        .order_by(|o| {
            o.asc(b.col("name"));
        })
        .unwrap()
        .limit(5)
        .unwrap();

    first
        .union_all(second)
        .unwrap()
        .order_by(|o| {
            o.asc(a.col("name"));
        })
        .unwrap()
        .limit(20)
        .unwrap();
    assert_eq!(first.row_mode_exit(), Some(RowModeTrigger::SetOperation));
    assert_eq!(
        first.sql().unwrap(),
        "SELECT t0.name FROM team t0 WHERE t0.id < $1 \
         UNION ALL (SELECT t1.name FROM team t1 ORDER BY t1.name LIMIT 5) ORDER BY name LIMIT 20"
    );
}

#[test]
fn set_operations_follow_call_order() {
    let table = team();
    let mut base = Select::from(&table);
    base.intersect(Select::from(&table))
        .unwrap()
        .except(Select::from(&table))
        .unwrap();
    assert_eq!(
        base.sql().unwrap(),
        "SELECT * FROM team t0 INTERSECT SELECT * FROM team t1 EXCEPT SELECT * FROM team t2"
    );
}
