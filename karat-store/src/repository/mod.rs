//! Generic persistence core
//!
//! A schema-agnostic data-access layer over SQLite:
//!
//! - **Query building**: [`query`] turns a [`Filter`], [`Sort`], [`Page`] and
//!   [`Projection`] into parameterized SQL; values are always bound
//! - **Record store**: [`RecordStore`] implements [`Repository`] and
//!   [`SoftDeleteRepository`] for any table described by a [`TableSpec`]
//! - **Transactions**: [`Transaction`] owns one pooled connection and returns
//!   it on commit, rollback or drop
//! - **Errors**: [`RepositoryError`] classifies every failure into a
//!   [`RepositoryErrorKind`]
//!
//! # Example
//!
//! ```rust,no_run
//! use karat_store::prelude::*;
//!
//! # async fn demo(pool: sqlx::SqlitePool) -> RepositoryResult<()> {
//! let vendors = RecordStore::new(pool, TableSpec::new("vendors"));
//!
//! let created = vendors
//!     .create(Record::new().with("name", "Aurum Traders").with("city", "Jaipur"))
//!     .await?;
//!
//! let in_jaipur = vendors
//!     .find_all(
//!         &Filter::new().eq("city", "Jaipur"),
//!         &Sort::asc("name"),
//!         Page::Unbounded,
//!         &Projection::All,
//!     )
//!     .await?;
//! assert!(in_jaipur.contains(&created));
//! # Ok(())
//! # }
//! ```

mod error;
mod filter;
pub mod query;
mod record;
mod store;
mod traits;
mod transaction;

pub use error::{AggregateStep, RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use filter::{
    Filter, FilterCondition, FilterOperator, OrderDirection, Page, Predicate, Projection, Sort,
};
pub use query::Statement;
pub use record::{bool_from_int, format_timestamp, Record, Value};
pub use store::{RecordStore, TableSpec};
pub use traits::{RelationLoader, Repository, RepositoryResult, SoftDeleteRepository};
pub use transaction::Transaction;
