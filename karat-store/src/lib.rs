//! # karat-store
//!
//! Persistence core for a jewelry shop backend: a parameterized query
//! builder, a schema-agnostic record store, and a transactional jewelry +
//! stones aggregate, all over SQLite.
//!
//! ## Features
//!
//! - **Query building**: typed filters (`Eq`, `In`, `Op`), multi-column
//!   ordering, explicit `Unbounded` or windowed pages; every value is bound
//! - **Record store**: find/create/update/delete/count/exists for any table,
//!   soft delete, all-or-nothing batch insert, transaction-scoped variants
//! - **Aggregate**: a piece and its stones written together or not at all,
//!   read back with one batched child query
//! - **Resource safety**: a transaction owns one pooled connection and
//!   returns it on commit, rollback, error or timeout
//! - **Configuration**: Figment (defaults, TOML files, `KARAT_` environment)
//! - **Logging**: structured JSON via `tracing`
//!
//! ## Example
//!
//! ```rust,no_run
//! use karat_store::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let db = Database::connect(&config.database).await?;
//!
//!     let necklace = db
//!         .jewelry_service()
//!         .create(
//!             NewJewelry {
//!                 code: "N-001".to_string(),
//!                 name: "Test Necklace".to_string(),
//!                 sale_price: 100.0,
//!                 ..Default::default()
//!             },
//!             vec![NewStone {
//!                 stone_code: "RD".to_string(),
//!                 weight: 1.0,
//!                 cost_price: 50.0,
//!                 sale_price: 120.0,
//!                 ..Default::default()
//!             }],
//!         )
//!         .await?;
//!
//!     let in_stock = db
//!         .jewelry()
//!         .get_with_stones(
//!             &Filter::new().eq("status", JewelryStatus::InStock),
//!             &Sort::desc("id"),
//!             Page::first(20),
//!         )
//!         .await?;
//!     println!("{} has {} stones; {} pieces in stock", necklace.piece.code, necklace.stones.len(), in_stock.len());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod jewelry;
pub mod observability;
pub mod pool_health;
pub mod repository;
pub mod schema;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, DatabaseConfig, ServiceConfig};
    pub use crate::database::{create_pool, Database};
    pub use crate::error::{Error, Result};
    pub use crate::jewelry::{
        CostTotals, Jewelry, JewelryAggregate, JewelryChanges, JewelryQuery, JewelryRepository,
        JewelryService, JewelryStatus, NewJewelry, NewStone, Stone, StoneUpdate,
    };
    pub use crate::observability::init_tracing;
    pub use crate::pool_health::DatabasePoolHealth;
    pub use crate::repository::{
        AggregateStep, Filter, FilterCondition, FilterOperator, OrderDirection, Page, Predicate,
        Projection, Record, RecordStore, RelationLoader, Repository, RepositoryError,
        RepositoryErrorKind, RepositoryOperation, RepositoryResult, SoftDeleteRepository, Sort,
        TableSpec, Transaction, Value,
    };
}
