//! Statement builders: SELECT, INSERT, UPDATE and DELETE.
//!
//! Every builder owns a process-unique [`StatementId`](crate::column::StatementId). Columns are
//! obtained from the builder's table handle, so composition knows which table occurrence each
//! column refers to and assigns aliases (`t0`, `t1`, ...) accordingly.
//!
//! # Usage
//!
//! ```ignore
//! use pgfluent::prelude::*;
//!
//! // SELECT with a join
//! let mut people = Select::from(&person);
//! let p = people.table();
//! let pets = Select::from(&pet);
//! people
//!     .left_outer_join(pets)?
//!     .on(|on, person, pet| on.col(pet.col("owner_id")).eq_col(person.col("id")))?
//!     .where_(|w| w.col(p.col("age")).ge(18))?;
//! let rows = people.execute(&client).await?;
//!
//! // UPDATE
//! let mut update = Update::table(&person);
//! let u = update.target();
//! update
//!     .set(u.col("name"), "ann")?
//!     .where_(|w| w.col(u.col("id")).eq(1_i64))?;
//! update.execute(&client).await?;
//! ```

mod compose;
mod delete;
mod dml;
mod insert;
mod select;
mod traits;
mod update;

pub(crate) use compose::{Mode, Participant};
pub use delete::Delete;
pub use insert::Insert;
pub use select::{JoinKind, JoinOn, RowModeTrigger, Select, SetOperator};
pub use traits::{Filtered, Mutation, Reproducible, Statement};
pub use update::Update;

#[cfg(test)]
pub(crate) mod tests;
