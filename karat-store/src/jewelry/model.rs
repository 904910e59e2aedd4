//! Typed jewelry and stone rows
//!
//! Read models decode from [`Record`]s returned by the store; write models
//! convert into the column patches the store accepts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::{bool_from_int, Record, RepositoryError, Value};

/// Sale state of a piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum JewelryStatus {
    /// Available for sale
    #[default]
    #[serde(rename = "In Stock")]
    InStock,
    /// Sold to a customer
    Sold,
    /// Held for a customer
    Reserved,
}

impl JewelryStatus {
    /// Value stored in the `status` column
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InStock => "In Stock",
            Self::Sold => "Sold",
            Self::Reserved => "Reserved",
        }
    }
}

impl fmt::Display for JewelryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JewelryStatus {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In Stock" => Ok(Self::InStock),
            "Sold" => Ok(Self::Sold),
            "Reserved" => Ok(Self::Reserved),
            other => Err(RepositoryError::validation_failed(format!(
                "Unknown jewelry status '{}'",
                other
            ))),
        }
    }
}

impl From<JewelryStatus> for Value {
    fn from(status: JewelryStatus) -> Self {
        Value::Text(status.as_str().to_string())
    }
}

/// A jewelry piece as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Jewelry {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub material_id: Option<i64>,
    pub gross_weight: f64,
    pub net_weight: f64,
    pub metal_cost: f64,
    pub making_charges: f64,
    /// Sum of the stones' cost prices
    pub stones_cost: f64,
    /// metal_cost + making_charges + stones_cost
    pub cost_price: f64,
    pub sale_price: f64,
    pub status: JewelryStatus,
    #[serde(deserialize_with = "bool_from_int")]
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Jewelry {
    /// Whether the net weight fits within the gross weight
    pub fn weights_consistent(&self) -> bool {
        self.net_weight <= self.gross_weight
    }
}

/// Derived cost columns of a piece
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostTotals {
    /// Sum of the stones' cost prices
    pub stones_cost: f64,
    /// metal_cost + making_charges + stones_cost
    pub cost_price: f64,
}

impl CostTotals {
    /// Totals for a piece's component costs and its stones' cost prices
    pub fn derive(
        metal_cost: f64,
        making_charges: f64,
        stone_costs: impl IntoIterator<Item = f64>,
    ) -> Self {
        let stones_cost: f64 = stone_costs.into_iter().sum();
        Self {
            stones_cost,
            cost_price: metal_cost + making_charges + stones_cost,
        }
    }

    /// Column patch writing both totals
    pub fn to_record(&self) -> Record {
        Record::new()
            .with("stones_cost", self.stones_cost)
            .with("cost_price", self.cost_price)
    }
}

/// A stone set in a piece
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stone {
    pub id: i64,
    pub jewelry_id: i64,
    pub stone_code: String,
    pub name: Option<String>,
    pub weight: f64,
    pub cost_price: f64,
    pub sale_price: f64,
    pub created_at: DateTime<Utc>,
}

/// A piece together with all of its stones
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JewelryAggregate {
    #[serde(flatten)]
    pub piece: Jewelry,
    pub stones: Vec<Stone>,
}

/// Fields for a new piece
///
/// Cost totals are derived inside the write transaction, not supplied by
/// callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewJewelry {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub material_id: Option<i64>,
    pub gross_weight: f64,
    pub net_weight: f64,
    pub metal_cost: f64,
    pub making_charges: f64,
    pub sale_price: f64,
    pub status: JewelryStatus,
}

impl NewJewelry {
    /// Column values for the insert
    pub fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("code", self.code.trim())
            .with("name", self.name.trim())
            .with("gross_weight", self.gross_weight)
            .with("net_weight", self.net_weight)
            .with("metal_cost", self.metal_cost)
            .with("making_charges", self.making_charges)
            .with("sale_price", self.sale_price)
            .with("status", self.status);
        record.set_opt("description", self.description.clone());
        record.set_opt("category_id", self.category_id);
        record.set_opt("vendor_id", self.vendor_id);
        record.set_opt("material_id", self.material_id);
        record
    }
}

/// Partial update of a piece; `None` leaves a column untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JewelryChanges {
    pub code: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub material_id: Option<i64>,
    pub gross_weight: Option<f64>,
    pub net_weight: Option<f64>,
    pub metal_cost: Option<f64>,
    pub making_charges: Option<f64>,
    pub sale_price: Option<f64>,
    pub status: Option<JewelryStatus>,
}

impl JewelryChanges {
    /// Only the supplied columns
    pub fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.set_opt("code", self.code.as_deref().map(str::trim));
        record.set_opt("name", self.name.as_deref().map(str::trim));
        record.set_opt("description", self.description.clone());
        record.set_opt("category_id", self.category_id);
        record.set_opt("vendor_id", self.vendor_id);
        record.set_opt("material_id", self.material_id);
        record.set_opt("gross_weight", self.gross_weight);
        record.set_opt("net_weight", self.net_weight);
        record.set_opt("metal_cost", self.metal_cost);
        record.set_opt("making_charges", self.making_charges);
        record.set_opt("sale_price", self.sale_price);
        record.set_opt("status", self.status);
        record
    }
}

/// Fields for one stone row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewStone {
    pub stone_code: String,
    pub name: Option<String>,
    pub weight: f64,
    pub cost_price: f64,
    pub sale_price: f64,
}

impl NewStone {
    /// Column values for the insert under `jewelry_id`
    pub fn to_record(&self, jewelry_id: i64) -> Record {
        let mut record = Record::new()
            .with("jewelry_id", jewelry_id)
            .with("stone_code", self.stone_code.trim())
            .with("weight", self.weight)
            .with("cost_price", self.cost_price)
            .with("sale_price", self.sale_price);
        record.set_opt("name", self.name.clone());
        record
    }
}

/// What an update does to a piece's stones
///
/// There is no per-stone patch: the set is kept as is or replaced wholesale.
/// `Replace(vec![])` removes every stone.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StoneUpdate {
    /// Leave existing stones untouched
    #[default]
    Unchanged,
    /// Replace the stone set with exactly these stones
    Replace(Vec<NewStone>),
}

impl From<Option<Vec<NewStone>>> for StoneUpdate {
    fn from(stones: Option<Vec<NewStone>>) -> Self {
        match stones {
            Some(stones) => Self::Replace(stones),
            None => Self::Unchanged,
        }
    }
}
