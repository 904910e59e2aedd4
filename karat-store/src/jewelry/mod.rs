//! Jewelry pieces and their stones
//!
//! - [`model`]: typed rows and write models
//! - [`JewelryRepository`]: atomic writes and batched reads of the aggregate
//! - [`JewelryService`]: validation, code uniqueness and cost derivation

pub mod model;
mod repository;
mod service;

pub use model::{
    CostTotals, Jewelry, JewelryAggregate, JewelryChanges, JewelryStatus, NewJewelry, NewStone,
    Stone, StoneUpdate,
};
pub use repository::{JewelryRepository, JEWELRY_TABLE, STONES_TABLE};
pub use service::{JewelryQuery, JewelryService};
