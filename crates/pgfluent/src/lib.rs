//! # pgfluent
//!
//! A fluent, statement-composing SQL layer for PostgreSQL.
//!
//! ## Features
//!
//! - **Typed statements**: columns come from a statement's table handle, so every column knows
//!   which table occurrence it belongs to and aliases are assigned at composition
//! - **Closure-scoped conditions**: `where_`, `having` and `on` build their conditions in a
//!   fresh accumulator; nested groups stay parenthesized
//! - **Row and aggregate modes**: a plain select maps records back to table rows; DISTINCT,
//!   GROUP BY, aggregates and set operations switch it to raw records for good
//! - **Reproduce**: re-run a composed statement with new values without rebuilding its SQL
//! - **One-to-many folding**: read a joined result as parent rows with lazy child sequences
//! - **Safe defaults**: UPDATE and DELETE without WHERE match nothing unless `allow_all()`
//!
//! ## Example
//!
//! ```ignore
//! use pgfluent::prelude::*;
//!
//! let person = TableDef::builder("person")
//!     .column("id", ValueKind::Int8)
//!     .column("name", ValueKind::Text)
//!     .column("age", ValueKind::Int4)
//!     .primary_key(&["id"])
//!     .build()?;
//!
//! let mut adults = Select::from(&person);
//! let p = adults.table();
//! adults
//!     .where_(|w| w.col(p.col("age")).ge(18))?
//!     .order_by(|o| {
//!         o.asc(p.col("name"));
//!     })?
//!     .paginate(1, 20)?;
//!
//! let total = adults.count(&client).await?;
//! for entity in adults.execute(&client).await? {
//!     println!("{}", entity?.root().get::<String>("name")?);
//! }
//! ```

pub mod client;
pub mod column;
pub mod condition;
pub mod config;
pub mod criteria;
pub mod decorator;
pub mod error;
pub mod ident;
pub mod meta;
pub mod offer;
pub mod one_to_many;
pub mod prelude;
pub mod qb;
pub mod query;
pub mod row;
pub mod sql;
pub mod value;

pub use client::{GenericClient, Record, RecordSet};
pub use column::{Column, Operand, StatementId, TableColumn, TableRef, coalesce, count_all};
pub use condition::{CompareOp, Having, Logical, MatchType, On, Where};
pub use config::SqlConfig;
pub use decorator::{ForShare, ForUpdate, LockWait, SqlComment, SqlDecorator};
pub use error::{OrmError, OrmResult};
pub use ident::Ident;
pub use meta::{ColumnDef, MetadataProvider, Relationship, SchemaRegistry, TableDef};
pub use offer::{Direction, GroupByOffer, Nulls, OrderByOffer, SelectOffer};
pub use one_to_many::{Many, Node, One, OneToManyQuery};
pub use qb::{
    Delete, Filtered, Insert, JoinKind, JoinOn, Mutation, Reproducible, RowModeTrigger, Select,
    SetOperator, Statement, Update,
};
pub use query::{Prepared, Query};
pub use row::{DataRow, Entity, FromDataRow, RowIter, RowMapping};
pub use sql::ComposedSql;
pub use value::{Binder, FromValue, Value, ValueKind};
