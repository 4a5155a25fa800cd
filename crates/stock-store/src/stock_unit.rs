//! Serialized stock unit records.

use chrono::{DateTime, Utc};
use common::{CollectionId, StockUnitId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Unit of measure a stock unit's quantities are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UnitOfMeasure {
    /// Length-based stock, sold in (possibly fractional) metres.
    #[default]
    #[serde(rename = "mtr")]
    Metre,

    /// Piece-based stock, sold in whole units.
    #[serde(rename = "pcs")]
    Piece,
}

impl UnitOfMeasure {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfMeasure::Metre => "mtr",
            UnitOfMeasure::Piece => "pcs",
        }
    }
}

impl std::str::FromStr for UnitOfMeasure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mtr" => Ok(UnitOfMeasure::Metre),
            "pcs" => Ok(UnitOfMeasure::Piece),
            other => Err(format!("unknown unit of measure: {other}")),
        }
    }
}

impl std::fmt::Display for UnitOfMeasure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One serialized unit of a product collection, carrying the denormalized
/// stock balance.
///
/// `current_stock` must equal the net sum of the unit's ledger movements.
/// The balance is only ever written through the stock mutation path, which
/// pairs every change with a [`crate::StockMovement`] in the same
/// transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockUnit {
    pub id: StockUnitId,
    pub collection_id: CollectionId,
    /// Human-assigned serial code, unique across all units.
    pub serial_code: String,
    pub current_stock: Decimal,
    pub min_stock: Decimal,
    pub max_stock: Decimal,
    pub unit: UnitOfMeasure,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

/// Fields for inserting a stock unit.
///
/// New units start at zero stock; opening stock is applied afterwards through
/// the mutation path so the ledger accounts for it.
#[derive(Debug, Clone)]
pub struct NewStockUnit {
    pub collection_id: CollectionId,
    pub serial_code: String,
    pub min_stock: Decimal,
    pub max_stock: Decimal,
    pub unit: UnitOfMeasure,
    pub created_by: UserId,
}

/// Non-quantity field edits for a stock unit.
///
/// There is deliberately no `current_stock` field here: quantity changes
/// cannot bypass the ledger because the patch type cannot express them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockUnitPatch {
    pub serial_code: Option<String>,
    pub min_stock: Option<Decimal>,
    pub max_stock: Option<Decimal>,
    pub unit: Option<UnitOfMeasure>,
}

impl StockUnitPatch {
    pub fn is_empty(&self) -> bool {
        self.serial_code.is_none()
            && self.min_stock.is_none()
            && self.max_stock.is_none()
            && self.unit.is_none()
    }
}
