//! Append-only stock movement ledger records.

use chrono::{DateTime, Utc};
use common::{MovementId, StockUnitId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a ledger movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementDirection {
    /// Stock entering the unit (restock, reversal, opening stock).
    #[serde(rename = "IN")]
    In,

    /// Stock leaving the unit (sale, reservation).
    #[serde(rename = "OUT")]
    Out,
}

impl MovementDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementDirection::In => "IN",
            MovementDirection::Out => "OUT",
        }
    }

    /// The quantity with the sign this direction applies to a balance.
    pub fn signed(&self, quantity: Decimal) -> Decimal {
        match self {
            MovementDirection::In => quantity,
            MovementDirection::Out => -quantity,
        }
    }
}

impl std::str::FromStr for MovementDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN" => Ok(MovementDirection::In),
            "OUT" => Ok(MovementDirection::Out),
            other => Err(format!("unknown movement direction: {other}")),
        }
    }
}

impl std::fmt::Display for MovementDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable ledger entry.
///
/// Movements are never updated; a correction is a new reversing entry. They
/// are removed only when their owning stock unit is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub stock_unit_id: StockUnitId,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    /// Human-readable reason for the movement.
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
}

/// Fields for appending a ledger entry.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub stock_unit_id: StockUnitId,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub message: String,
    pub created_by: UserId,
}
