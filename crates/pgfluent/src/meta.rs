//! Table metadata: columns, primary keys and relationships.
//!
//! Statements are built against [`TableDef`]s. A [`SchemaRegistry`] collects them and answers
//! lookups through the [`MetadataProvider`] trait.

use crate::error::{OrmError, OrmResult};
use crate::ident::Ident;
use crate::value::ValueKind;
use std::collections::HashMap;
use std::sync::Arc;

/// Column definition.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    ident: Ident,
    kind: ValueKind,
    nullable: bool,
    primary_key: bool,
}

impl ColumnDef {
    pub fn name(&self) -> &str {
        self.ident.name()
    }

    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }
}

/// A foreign-key link from this table to another.
#[derive(Debug, Clone)]
pub struct Relationship {
    /// Relationship name (usually the constraint name).
    pub name: String,
    /// Referencing columns on this table.
    pub from_columns: Vec<String>,
    /// Referenced table name.
    pub to_table: String,
    /// Referenced columns, pairwise with `from_columns`.
    pub to_columns: Vec<String>,
}

/// Metadata for a database table.
#[derive(Debug)]
pub struct TableDef {
    ident: Ident,
    columns: Vec<ColumnDef>,
    primary_key: Vec<usize>,
    relationships: Vec<Relationship>,
}

impl TableDef {
    /// Start declaring a table. `name` may be schema-qualified (`public.person`).
    pub fn builder(name: impl Into<String>) -> TableDefBuilder {
        TableDefBuilder {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Table name without schema.
    pub fn name(&self) -> &str {
        self.ident.name()
    }

    /// Schema name, `public` when the table was declared unqualified.
    pub fn schema(&self) -> &str {
        match self.ident.parts() {
            [schema, _] => schema.name(),
            _ => "public",
        }
    }

    pub fn ident(&self) -> &Ident {
        &self.ident
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.column_index(name).map(|i| &self.columns[i])
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Indexes of the primary-key columns, in key order.
    pub fn primary_key(&self) -> &[usize] {
        &self.primary_key
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// The first relationship from this table to `table`.
    pub fn relationship_to(&self, table: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.to_table == table)
    }
}

/// Builder for [`TableDef`].
#[must_use]
#[derive(Debug, Clone)]
pub struct TableDefBuilder {
    name: String,
    columns: Vec<(String, ValueKind, bool)>,
    primary_key: Vec<String>,
    relationships: Vec<Relationship>,
}

impl TableDefBuilder {
    /// Add a NOT NULL column.
    pub fn column(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.columns.push((name.into(), kind, false));
        self
    }

    /// Add a nullable column.
    pub fn nullable_column(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.columns.push((name.into(), kind, true));
        self
    }

    /// Set the primary-key columns.
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Declare a foreign key from `from` columns of this table to `to` columns of `table`.
    pub fn references(mut self, name: impl Into<String>, from: &[&str], table: &str, to: &[&str]) -> Self {
        self.relationships.push(Relationship {
            name: name.into(),
            from_columns: from.iter().map(|c| c.to_string()).collect(),
            to_table: table.to_string(),
            to_columns: to.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Validate names and build the shared table definition.
    pub fn build(self) -> OrmResult<Arc<TableDef>> {
        let ident = Ident::parse(&self.name)?;
        if ident.parts().len() > 2 {
            return Err(OrmError::validation(format!(
                "Table name '{}' has too many parts",
                self.name
            )));
        }

        let mut columns: Vec<ColumnDef> = Vec::with_capacity(self.columns.len());
        for (name, kind, nullable) in self.columns {
            let ident = Ident::parse_name(&name)?;
            if columns.iter().any(|c| c.name() == ident.name()) {
                return Err(OrmError::validation(format!(
                    "Duplicate column '{name}' in table '{}'",
                    self.name
                )));
            }
            #[cfg(not(feature = "rust_decimal"))]
            if kind == ValueKind::Numeric {
                return Err(OrmError::validation(format!(
                    "Column '{name}' of '{}' is numeric, which needs the rust_decimal feature",
                    self.name
                )));
            }
            columns.push(ColumnDef {
                ident,
                kind,
                nullable,
                primary_key: false,
            });
        }

        let mut primary_key = Vec::with_capacity(self.primary_key.len());
        for name in &self.primary_key {
            let idx = columns
                .iter()
                .position(|c| c.name() == name)
                .ok_or_else(|| {
                    OrmError::validation(format!(
                        "Primary key column '{name}' is not a column of '{}'",
                        self.name
                    ))
                })?;
            columns[idx].primary_key = true;
            primary_key.push(idx);
        }

        for rel in &self.relationships {
            if rel.from_columns.is_empty() || rel.from_columns.len() != rel.to_columns.len() {
                return Err(OrmError::validation(format!(
                    "Relationship '{}' must pair each local column with one referenced column",
                    rel.name
                )));
            }
            if let Some(missing) = rel
                .from_columns
                .iter()
                .find(|c| !columns.iter().any(|d| d.name() == c.as_str()))
            {
                return Err(OrmError::validation(format!(
                    "Relationship '{}' uses unknown column '{missing}'",
                    rel.name
                )));
            }
        }

        Ok(Arc::new(TableDef {
            ident,
            columns,
            primary_key,
            relationships: self.relationships,
        }))
    }
}

/// Source of table and relationship metadata.
pub trait MetadataProvider {
    /// Look up a table by name. `name` may be schema-qualified.
    fn table(&self, name: &str) -> Option<Arc<TableDef>>;

    /// A relationship linking `from` to `to`, in either direction.
    ///
    /// Returns the relationship and whether it is declared on `from` (`true`) or on `to`.
    fn relationship(&self, from: &str, to: &str) -> Option<(Relationship, bool)> {
        if let Some(rel) = self.table(from).and_then(|t| t.relationship_to(to).cloned()) {
            return Some((rel, true));
        }
        self.table(to)
            .and_then(|t| t.relationship_to(from).cloned())
            .map(|rel| (rel, false))
    }
}

/// Registry of table definitions.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    /// Map of schema -> (table -> TableDef)
    tables: HashMap<String, HashMap<String, Arc<TableDef>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table definition, replacing any previous one with the same name.
    pub fn register(&mut self, table: Arc<TableDef>) -> &mut Self {
        self.tables
            .entry(table.schema().to_string())
            .or_default()
            .insert(table.name().to_string(), table);
        self
    }

    /// Get a table by schema and name.
    pub fn get_table(&self, schema: &str, name: &str) -> Option<&Arc<TableDef>> {
        self.tables.get(schema).and_then(|by_name| by_name.get(name))
    }

    /// Find a table by name, trying the `public` schema first.
    pub fn find_table(&self, name: &str) -> Option<&Arc<TableDef>> {
        if let Some(t) = self.get_table("public", name) {
            return Some(t);
        }
        self.tables.values().find_map(|by_name| by_name.get(name))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDef>> {
        self.tables.values().flat_map(|by_name| by_name.values())
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(|by_name| by_name.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.values().all(|by_name| by_name.is_empty())
    }
}

impl MetadataProvider for SchemaRegistry {
    fn table(&self, name: &str) -> Option<Arc<TableDef>> {
        match name.split_once('.') {
            Some((schema, table)) => self.get_table(schema, table).cloned(),
            None => self.find_table(name).cloned(),
        }
    }
}
