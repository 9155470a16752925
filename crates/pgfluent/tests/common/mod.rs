#![allow(dead_code)]

use pgfluent::{GenericClient, OrmResult, RecordSet, TableDef, Value, ValueKind};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio_postgres::types::ToSql;

/// In-memory client: answers queries from a queue of prepared results and records every
/// statement it receives.
#[derive(Default)]
pub struct MockClient {
    results: Mutex<VecDeque<Vec<Vec<Value>>>>,
    affected: Mutex<VecDeque<u64>>,
    log: Mutex<Vec<(String, usize)>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the records of the next query.
    pub fn returns(self, rows: Vec<Vec<Value>>) -> Self {
        self.results.lock().unwrap().push_back(rows);
        self
    }

    /// Queue the affected-row count of the next execute.
    pub fn affects(self, rows: u64) -> Self {
        self.affected.lock().unwrap().push_back(rows);
        self
    }

    /// Statements received so far, with their parameter counts.
    pub fn statements(&self) -> Vec<(String, usize)> {
        self.log.lock().unwrap().clone()
    }

    pub fn last_sql(&self) -> String {
        self.log
            .lock()
            .unwrap()
            .last()
            .map(|(sql, _)| sql.clone())
            .unwrap_or_default()
    }
}

impl GenericClient for MockClient {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<RecordSet> {
        self.log.lock().unwrap().push((sql.to_string(), params.len()));
        let rows = self.results.lock().unwrap().pop_front().unwrap_or_default();
        Ok(RecordSet::from_values(Vec::new(), rows))
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        self.log.lock().unwrap().push((sql.to_string(), params.len()));
        Ok(self.affected.lock().unwrap().pop_front().unwrap_or_default())
    }
}

pub fn person() -> Arc<TableDef> {
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

pub fn team() -> Arc<TableDef> {
    TableDef::builder("team")
        .column("id", ValueKind::Int8)
        .column("name", ValueKind::Text)
        .primary_key(&["id"])
        .build()
        .unwrap()
}

/// A person record in projection order: id, name, age, team_id.
pub fn person_row(id: i64, name: &str, age: i32, team: Option<i64>) -> Vec<Value> {
    vec![
        Value::Int8(id),
        Value::Text(name.to_string()),
        Value::Int4(age),
        team.map_or(Value::Null(ValueKind::Int8), Value::Int8),
    ]
}
