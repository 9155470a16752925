//! Folding a flat joined result back into one-to-many trees.
//!
//! A [`OneToManyQuery`] wraps a row-mode [`Select`] whose joins form a chain
//! (`team → person → pet`). Each statement of the chain is one level of the tree. The query
//! orders the result so that every level arrives grouped by the keys above it, and a [`Many`]
//! walks the records level by level without buffering them:
//!
//! ```ignore
//! let mut teams = OneToManyQuery::new(select)?.execute(&client).await?;
//! while teams.has_next()? {
//!     let team = teams.next()?;
//!     let mut people = team.many().expect("person level");
//!     while people.has_next()? {
//!         println!("{}", people.next()?.row().get::<String>("name")?);
//!     }
//! }
//! ```

use crate::client::{GenericClient, Record, RecordSet};
use crate::column::StatementId;
use crate::config::SqlConfig;
use crate::error::{OrmError, OrmResult};
use crate::meta::TableDef;
use crate::offer::{OrderItem, merge_ordered};
use crate::qb::{Mode, Participant, Select, Statement};
use crate::query::{Query, restrict_to_key};
use crate::row::{DataRow, TableMapping};
use crate::sql::ComposedSql;
use crate::value::Value;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

/// One level of the folding path, linked to the level above it.
#[derive(Debug)]
pub(crate) struct PathNode {
    pub(crate) depth: usize,
    pub(crate) statement: StatementId,
    pub(crate) mapping: TableMapping,
    pub(crate) parent: Option<Arc<PathNode>>,
}

impl PathNode {
    pub(crate) fn table(&self) -> &Arc<TableDef> {
        &self.mapping.table
    }

    /// This node and its ancestors, deepest first.
    fn lineage(self: &Arc<Self>) -> impl Iterator<Item = &PathNode> {
        std::iter::successors(Some(self.as_ref()), |node| node.parent.as_deref())
    }
}

/// A row-mode select folded into one-to-many trees.
#[derive(Debug)]
pub struct OneToManyQuery {
    select: Select,
    composed: ComposedSql,
    leaf: Arc<PathNode>,
}

impl OneToManyQuery {
    /// Wrap `select`, which must be in row mode and join at most one statement per level.
    pub fn new(select: Select) -> OrmResult<Self> {
        select.require_row_mode("one-to-many query")?;
        let parts = select.participants();
        for p in &parts {
            if p.select.joins.len() > 1 {
                return Err(OrmError::illegal_state(format!(
                    "{} (select #{}) joins {} statements; a one-to-many path joins at most one",
                    p.select.table.name(),
                    p.select.id.get(),
                    p.select.joins.len()
                )));
            }
            if !p.select.table.has_primary_key() {
                return Err(OrmError::illegal_state(format!(
                    "{} has no primary key and cannot be folded",
                    p.select.table.name()
                )));
            }
        }

        let order = folding_order(&parts);
        let composed = select.decorate(select.compose_with(Mode::Row, Some(&order))?);
        let mapping = composed
            .mapping()
            .cloned()
            .ok_or_else(|| OrmError::illegal_state("row-mode select has no row mapping"))?;

        let mut leaf: Option<Arc<PathNode>> = None;
        for (depth, p) in parts.iter().enumerate() {
            let level = mapping.table(p.select.id).cloned().ok_or_else(|| {
                OrmError::illegal_state(format!(
                    "{} (select #{}) is not projected",
                    p.select.table.name(),
                    p.select.id.get()
                ))
            })?;
            leaf = Some(Arc::new(PathNode {
                depth,
                statement: p.select.id,
                mapping: level,
                parent: leaf.take(),
            }));
        }
        let leaf = leaf.ok_or_else(|| OrmError::illegal_state("empty one-to-many path"))?;
        drop(parts);

        tracing::trace!(
            target: "pgfluent.fold",
            statement = select.id().get(),
            levels = leaf.depth + 1,
            "one-to-many path"
        );
        for node in leaf.lineage() {
            tracing::trace!(
                target: "pgfluent.fold",
                depth = node.depth,
                statement = node.statement.get(),
                table = node.table().name(),
                "path level"
            );
        }
        Ok(Self {
            select,
            composed,
            leaf,
        })
    }

    pub fn select(&self) -> &Select {
        &self.select
    }

    /// Number of levels, the root included.
    pub fn depth(&self) -> usize {
        self.leaf.depth + 1
    }

    /// Level tables, root first.
    pub fn tables(&self) -> Vec<Arc<TableDef>> {
        let mut tables: Vec<_> = self.leaf.lineage().map(|n| Arc::clone(n.table())).collect();
        tables.reverse();
        tables
    }
}

/// ORDER BY that groups every level under the keys above it.
///
/// Per level, root first: the explicit entries of that level in their merged order, then the
/// level's primary-key columns they do not cover. Entries of other tables come last.
fn folding_order(parts: &[Participant<'_>]) -> Vec<OrderItem> {
    let explicit = merge_ordered(parts.iter().filter_map(|p| p.select.order_by.as_ref()));
    let level_of = |item: &OrderItem| {
        let column = item.column.table_column()?;
        parts.iter().position(|p| p.select.id == column.statement())
    };

    let mut order = Vec::with_capacity(explicit.len());
    for (depth, p) in parts.iter().enumerate() {
        let own: Vec<&OrderItem> = explicit
            .iter()
            .copied()
            .filter(|item| level_of(item) == Some(depth))
            .collect();
        order.extend(own.iter().map(|item| (*item).clone()));

        let table = p.select.table();
        for &index in p.select.table.primary_key() {
            let key = table.column_at(index);
            let covered = own
                .iter()
                .any(|item| item.column.table_column().is_some_and(|c| c.same_as(&key)));
            if !covered {
                order.push(OrderItem::asc(table.col_at(index)));
            }
        }
    }
    order.extend(
        explicit
            .into_iter()
            .filter(|item| level_of(item).is_none())
            .cloned(),
    );
    order
}

impl Statement for OneToManyQuery {
    fn compose(&self) -> OrmResult<ComposedSql> {
        Ok(self.composed.clone())
    }

    fn config(&self) -> &SqlConfig {
        self.select.config()
    }
}

impl Query for OneToManyQuery {
    type Row = Node;
    type Rows = Many;

    fn execute(&self, client: &impl GenericClient) -> impl Future<Output = OrmResult<Many>> + Send {
        let composed = self.composed.clone();
        let leaf = Arc::clone(&self.leaf);
        let config = self.select.config().clone();
        async move {
            config.log_sql("execute", &composed);
            let records = client.query(composed.sql(), &composed.params_ref()).await?;
            Ok(Many::root(DataObjectManager::new(records, &leaf)))
        }
    }

    fn fetch(
        &self,
        client: &impl GenericClient,
        key: &[Value],
    ) -> impl Future<Output = OrmResult<Option<Node>>> + Send {
        let lookup = (|| {
            let mut select = self.select.fork();
            restrict_to_key(&mut select, key)?;
            let query = OneToManyQuery::new(select)?;
            Ok::<_, OrmError>((query.composed, query.leaf))
        })();
        let config = self.select.config().clone();
        async move {
            let (composed, leaf) = lookup?;
            config.log_sql("fetch", &composed);
            let records = client.query(composed.sql(), &composed.params_ref()).await?;
            let mut roots = Many::root(DataObjectManager::new(records, &leaf));
            if !roots.has_next()? {
                return Ok(None);
            }
            let node = roots.next()?.into_node()?;
            if roots.has_next()? {
                return Err(OrmError::not_unique(format!(
                    "expected at most one {} tree, found more",
                    node.row.table().name()
                )));
            }
            Ok(Some(node))
        }
    }

    /// Counts distinct root keys, so fan-out rows do not inflate the total.
    fn count_sql(&self) -> OrmResult<ComposedSql> {
        self.select.compose_count(true)
    }

    fn aggregate_sql(&self) -> OrmResult<ComposedSql> {
        self.select.aggregate_memoized()
    }
}

enum Cursor {
    /// The next record has not been read yet.
    Pending,
    At(Record),
    End,
}

/// Shared cursor over the raw records of one execution.
///
/// Caches per-level keys and rows of the current record and reads the next record only when
/// told to.
pub(crate) struct DataObjectManager {
    records: RecordSet,
    levels: Vec<Arc<PathNode>>,
    cursor: Cursor,
    keys: Vec<Option<Option<Vec<Value>>>>,
    rows: Vec<Option<DataRow>>,
    fetched: usize,
    /// Bumped every time the cursor leaves a record.
    moves: usize,
}

impl DataObjectManager {
    pub(crate) fn new(records: RecordSet, leaf: &Arc<PathNode>) -> Self {
        let mut levels = Vec::with_capacity(leaf.depth + 1);
        let mut node = Some(Arc::clone(leaf));
        while let Some(current) = node {
            node = current.parent.clone();
            levels.push(current);
        }
        levels.reverse();
        let depth = levels.len();
        Self {
            records,
            levels,
            cursor: Cursor::Pending,
            keys: vec![None; depth],
            rows: vec![None; depth],
            fetched: 0,
            moves: 0,
        }
    }

    fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Make sure the current record is loaded; `false` at the end of the result.
    fn load(&mut self) -> OrmResult<bool> {
        if let Cursor::Pending = self.cursor {
            self.cursor = match self.records.next_record()? {
                Some(record) => {
                    self.fetched += 1;
                    Cursor::At(record)
                }
                None => Cursor::End,
            };
        }
        Ok(matches!(self.cursor, Cursor::At(_)))
    }

    fn record(&self) -> OrmResult<&Record> {
        match &self.cursor {
            Cursor::At(record) => Ok(record),
            _ => Err(OrmError::illegal_state("no current record")),
        }
    }

    fn advance(&mut self) {
        if let Cursor::At(_) = self.cursor {
            self.cursor = Cursor::Pending;
            self.moves += 1;
            self.keys.iter_mut().for_each(|k| *k = None);
            self.rows.iter_mut().for_each(|r| *r = None);
        }
    }

    /// Primary key of `level` in the current record; `None` if NULL.
    fn key(&mut self, level: usize) -> OrmResult<Option<Vec<Value>>> {
        if let Some(key) = &self.keys[level] {
            return Ok(key.clone());
        }
        let key = self.levels[level].mapping.key(self.record()?)?;
        self.keys[level] = Some(key.clone());
        Ok(key)
    }

    fn row(&mut self, level: usize) -> OrmResult<DataRow> {
        if let Some(row) = &self.rows[level] {
            return Ok(row.clone());
        }
        let row = self.levels[level].mapping.data_row(self.record()?)?;
        self.rows[level] = Some(row.clone());
        Ok(row)
    }
}

#[derive(Debug)]
enum Peek {
    Unknown,
    /// Key of the peeked row and the cursor position it was read at.
    Ready { key: Vec<Value>, at: usize },
    Taken,
    Exhausted,
}

/// The rows of one level below one parent, read lazily from the shared cursor.
///
/// [`Many::has_next`] can be called any number of times without consuming data;
/// [`Many::next`] yields the peeked row.
pub struct Many {
    manager: Rc<RefCell<DataObjectManager>>,
    level: usize,
    /// Keys of the levels above, root first.
    parents: Vec<Vec<Value>>,
    last: Option<Vec<Value>>,
    state: Peek,
}

impl Many {
    fn root(manager: DataObjectManager) -> Self {
        Self {
            manager: Rc::new(RefCell::new(manager)),
            level: 0,
            parents: Vec::new(),
            last: None,
            state: Peek::Unknown,
        }
    }

    /// Depth of this level, 0 for the root.
    pub fn level(&self) -> usize {
        self.level
    }

    /// Raw records read from the result so far.
    pub fn records_read(&self) -> usize {
        self.manager.borrow().fetched
    }

    /// Whether another row of this level belongs to the parent.
    pub fn has_next(&mut self) -> OrmResult<bool> {
        let mut manager = self.manager.borrow_mut();
        loop {
            match self.state {
                Peek::Ready { at, .. } => {
                    if let Err(e) = self.ensure_current(at, manager.moves) {
                        self.state = Peek::Exhausted;
                        return Err(e);
                    }
                    return Ok(true);
                }
                Peek::Exhausted => return Ok(false),
                Peek::Unknown | Peek::Taken => {}
            }
            if !manager.load()? {
                self.state = Peek::Exhausted;
                return Ok(false);
            }
            for (level, parent) in self.parents.iter().enumerate() {
                if manager.key(level)?.as_ref() != Some(parent) {
                    tracing::trace!(target: "pgfluent.fold", level = self.level, "parent changed");
                    self.state = Peek::Exhausted;
                    return Ok(false);
                }
            }
            match manager.key(self.level)? {
                None if self.level == 0 => manager.advance(),
                None => {
                    tracing::trace!(target: "pgfluent.fold", level = self.level, "no child row");
                    self.state = Peek::Exhausted;
                    return Ok(false);
                }
                Some(key) if self.last.as_ref() == Some(&key) => manager.advance(),
                Some(key) => {
                    self.state = Peek::Ready {
                        key,
                        at: manager.moves,
                    };
                    return Ok(true);
                }
            }
        }
    }

    /// Yield the row found by [`Many::has_next`] together with its children.
    ///
    /// Fails if another level moved the shared cursor after the peek.
    pub fn next(&mut self) -> OrmResult<One> {
        let mut manager = self.manager.borrow_mut();
        let key = match std::mem::replace(&mut self.state, Peek::Taken) {
            Peek::Ready { key, at } => {
                if let Err(e) = self.ensure_current(at, manager.moves) {
                    self.state = Peek::Exhausted;
                    return Err(e);
                }
                key
            }
            state => {
                let message = match state {
                    Peek::Exhausted => "next() on an exhausted one-to-many level",
                    _ => "next() without a successful has_next()",
                };
                self.state = state;
                return Err(OrmError::illegal_state(message));
            }
        };
        let row = manager.row(self.level)?;
        let many = (self.level + 1 < manager.depth()).then(|| {
            let mut parents = self.parents.clone();
            parents.push(key.clone());
            Many {
                manager: Rc::clone(&self.manager),
                level: self.level + 1,
                parents,
                last: None,
                state: Peek::Unknown,
            }
        });
        drop(manager);
        self.last = Some(key);
        Ok(One { row, many })
    }

    fn ensure_current(&self, at: usize, moves: usize) -> OrmResult<()> {
        if at == moves {
            return Ok(());
        }
        Err(OrmError::illegal_state(format!(
            "the row peeked at level {} was passed over by a level above; \
             read children before advancing their parent",
            self.level
        )))
    }

    /// Read the rest of this level into trees.
    pub fn collect_nodes(mut self) -> OrmResult<Vec<Node>> {
        let mut nodes = Vec::new();
        while self.has_next()? {
            nodes.push(self.next()?.into_node()?);
        }
        Ok(nodes)
    }

    pub fn close(self) {}
}

impl std::fmt::Debug for Many {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Many")
            .field("level", &self.level)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// A row and the rows of the next level below it (`None` at the leaf).
#[derive(Debug)]
pub struct One {
    row: DataRow,
    many: Option<Many>,
}

impl One {
    pub fn row(&self) -> &DataRow {
        &self.row
    }

    pub fn many(&mut self) -> Option<&mut Many> {
        self.many.as_mut()
    }

    pub fn into_parts(self) -> (DataRow, Option<Many>) {
        (self.row, self.many)
    }

    /// Read the children into a [`Node`].
    pub fn into_node(self) -> OrmResult<Node> {
        let children = match self.many {
            Some(many) => many.collect_nodes()?,
            None => Vec::new(),
        };
        Ok(Node {
            row: self.row,
            children,
        })
    }
}

/// A fully read one-to-many tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub row: DataRow,
    pub children: Vec<Node>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qb::tests::{person, pet, team};
    use crate::qb::{Filtered, Reproducible};
    use crate::value::ValueKind;

    fn team_person() -> OneToManyQuery {
        let mut select = Select::from(&team());
        let mut people = Select::from(&person());
        let p = people.table();
        people
            .order_by(|o| {
                o.desc(p.col("age"));
            })
            .unwrap();
        select
            .left_outer_join(people)
            .unwrap()
            .on(|on, t, p| on.col(p.col("team_id")).eq_col(t.col("id")))
            .unwrap();
        OneToManyQuery::new(select).unwrap()
    }

    #[test]
    fn order_groups_levels_root_first() {
        let query = team_person();
        assert_eq!(
            query.sql().unwrap(),
            "SELECT t0.id, t0.name, t1.id, t1.name, t1.age, t1.team_id FROM team t0 \
             LEFT OUTER JOIN person t1 ON t1.team_id = t0.id \
             ORDER BY t0.id, t1.age DESC, t1.id"
        );
        assert_eq!(query.depth(), 2);
        let names: Vec<_> = query.tables().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["team", "person"]);
    }

    #[test]
    fn explicit_key_order_is_kept() {
        let mut select = Select::from(&team());
        let t = select.table();
        select
            .order_by(|o| {
                o.desc(t.col("id"));
            })
            .unwrap();
        let query = OneToManyQuery::new(select).unwrap();
        assert!(query.sql().unwrap().ends_with("ORDER BY t0.id DESC"));
    }

    #[test]
    fn count_counts_distinct_roots() {
        let query = team_person();
        assert_eq!(
            query.count_sql().unwrap().sql(),
            "SELECT COUNT(DISTINCT t0.id) FROM team t0 \
             LEFT OUTER JOIN person t1 ON t1.team_id = t0.id"
        );
    }

    #[test]
    fn rejects_branching_joins() {
        let mut select = Select::from(&person());
        select
            .left_outer_join(Select::from(&team()))
            .unwrap()
            .on(|on, p, t| on.col(p.col("team_id")).eq_col(t.col("id")))
            .unwrap();
        select
            .left_outer_join(Select::from(&pet()))
            .unwrap()
            .on(|on, p, pet| on.col(pet.col("owner_id")).eq_col(p.col("id")))
            .unwrap();
        assert!(OneToManyQuery::new(select).unwrap_err().is_illegal_state());
    }

    #[test]
    fn rejects_aggregate_select() {
        let mut select = Select::from(&person());
        select.select_count().unwrap();
        assert!(OneToManyQuery::new(select).unwrap_err().is_illegal_state());
    }

    #[test]
    fn reproduce_keeps_folding_sql() {
        let mut select = Select::from(&team());
        let t = select.table();
        select.where_(|w| w.col(t.col("name")).eq("red")).unwrap();
        let query = OneToManyQuery::new(select).unwrap();
        let again = query.reproduce(vec![Value::from("blue")]).unwrap();
        assert_eq!(again.sql(), query.sql().unwrap());
        assert_eq!(again.binders()[0].value(), &Value::from("blue"));
    }

    fn fold(leaf: &Arc<PathNode>, rows: Vec<Vec<Value>>) -> Many {
        let records = RecordSet::from_values(Vec::new(), rows);
        Many::root(DataObjectManager::new(records, leaf))
    }

    fn rec(team: i64, person: Option<i64>) -> Vec<Value> {
        let person_id = person.map_or(Value::Null(ValueKind::Int8), Value::Int8);
        vec![
            Value::Int8(team),
            Value::Text(format!("team {team}")),
            person_id,
            Value::Null(ValueKind::Text),
            Value::Null(ValueKind::Int4),
            Value::Int8(team),
        ]
    }

    #[test]
    fn has_next_is_idempotent_and_next_requires_it() {
        let query = team_person();
        let mut many = fold(&query.leaf, vec![rec(1, Some(10))]);
        assert!(many.next().unwrap_err().is_illegal_state());
        assert!(many.has_next().unwrap());
        assert!(many.has_next().unwrap());
        assert_eq!(many.records_read(), 1);
        let one = many.next().unwrap();
        assert_eq!(one.row().get::<i64>("id").unwrap(), 1);
        assert!(many.next().unwrap_err().is_illegal_state());
        assert!(!many.has_next().unwrap());
        assert!(many.next().unwrap_err().is_illegal_state());
    }

    #[test]
    fn null_child_key_means_no_children() {
        let query = team_person();
        let many = fold(&query.leaf, vec![rec(1, None), rec(2, Some(20))]);
        let nodes = many.collect_nodes().unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].children.is_empty());
        assert_eq!(nodes[1].children.len(), 1);
        assert_eq!(nodes[1].children[0].row.get::<i64>("id").unwrap(), 20);
    }

    #[test]
    fn unread_children_are_skipped() {
        let query = team_person();
        let mut many = fold(
            &query.leaf,
            vec![rec(1, Some(10)), rec(1, Some(11)), rec(2, Some(20))],
        );
        assert!(many.has_next().unwrap());
        assert_eq!(many.next().unwrap().row().get::<i64>("id").unwrap(), 1);
        assert!(many.has_next().unwrap());
        assert_eq!(many.next().unwrap().row().get::<i64>("id").unwrap(), 2);
        assert!(!many.has_next().unwrap());
        assert_eq!(many.records_read(), 3);
    }

    #[test]
    fn child_peek_is_invalidated_when_the_parent_moves_on() {
        let query = team_person();
        let mut root = fold(
            &query.leaf,
            vec![rec(1, Some(10)), rec(1, Some(11)), rec(2, Some(20))],
        );
        assert!(root.has_next().unwrap());
        let mut first = root.next().unwrap();
        let people = first.many().unwrap();
        assert!(people.has_next().unwrap());

        assert!(root.has_next().unwrap());
        assert!(people.next().unwrap_err().is_illegal_state());
        assert!(!people.has_next().unwrap());

        let second = root.next().unwrap().into_node().unwrap();
        assert_eq!(second.row.get::<i64>("id").unwrap(), 2);
        assert_eq!(second.children[0].row.get::<i64>("team_id").unwrap(), 2);
    }

    fn team_person_pet() -> OneToManyQuery {
        let mut people = Select::from(&person());
        people
            .left_outer_join(Select::from(&pet()))
            .unwrap()
            .on(|on, p, a| on.col(a.col("owner_id")).eq_col(p.col("id")))
            .unwrap();
        let mut select = Select::from(&team());
        select
            .left_outer_join(people)
            .unwrap()
            .on(|on, t, p| on.col(p.col("team_id")).eq_col(t.col("id")))
            .unwrap();
        OneToManyQuery::new(select).unwrap()
    }

    fn rec3(team: i64, person: i64, pet: Option<i64>) -> Vec<Value> {
        let pet_id = pet.map_or(Value::Null(ValueKind::Int8), Value::Int8);
        let owner = pet.map_or(Value::Null(ValueKind::Int8), |_| Value::Int8(person));
        vec![
            Value::Int8(team),
            Value::Text(format!("team {team}")),
            Value::Int8(person),
            Value::Text(format!("person {person}")),
            Value::Int4(30),
            Value::Int8(team),
            pet_id,
            owner,
            Value::Null(ValueKind::Text),
        ]
    }

    fn shape(nodes: &[Node]) -> Vec<(i64, Vec<(i64, Vec<i64>)>)> {
        let id = |n: &Node| n.row.get::<i64>("id").unwrap();
        nodes
            .iter()
            .map(|t| {
                let people = t
                    .children
                    .iter()
                    .map(|p| (id(p), p.children.iter().map(id).collect()))
                    .collect();
                (id(t), people)
            })
            .collect()
    }

    #[test]
    fn folds_three_levels() {
        let query = team_person_pet();
        assert_eq!(query.depth(), 3);
        assert!(query.sql().unwrap().ends_with("ORDER BY t0.id, t1.id, t2.id"));

        let mut root = fold(
            &query.leaf,
            vec![
                rec3(1, 10, Some(100)),
                rec3(1, 10, Some(101)),
                rec3(1, 11, None),
                rec3(2, 20, Some(200)),
            ],
        );
        let mut nodes = Vec::new();
        while root.has_next().unwrap() {
            nodes.push(root.next().unwrap().into_node().unwrap());
        }
        assert_eq!(
            shape(&nodes),
            vec![
                (1, vec![(10, vec![100, 101]), (11, vec![])]),
                (2, vec![(20, vec![200])]),
            ]
        );
        assert_eq!(root.records_read(), 4);
    }
}
