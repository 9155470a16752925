//! Convenient imports for typical `pgfluent` usage.
//!
//! ```ignore
//! use pgfluent::prelude::*;
//! ```

pub use crate::{
    Column, DataRow, Delete, Entity, FromDataRow, GenericClient, Insert, OneToManyQuery, OrmError,
    OrmResult, SchemaRegistry, Select, SqlConfig, TableDef, TableRef, Update, Value, ValueKind,
    coalesce, count_all,
};

// Traits carrying the statement methods.
pub use crate::{Filtered, MetadataProvider, Mutation, Query, Reproducible, Statement};
