//! Order and order line item records, and the order status state machine.

use chrono::{DateTime, Utc};
use common::{LineItemId, OrderId, StockUnitId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Pending ──► Approved ──► Shipped ──► Delivered
///    │            │           │
///    └────────────┴───────────┴──► Cancelled
/// ```
///
/// `Delivered` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed, stock reserved, awaiting approval.
    #[default]
    Pending,

    /// Order approved by staff.
    Approved,

    /// Order handed to the courier.
    Shipped,

    /// Order received by the customer (terminal).
    Delivered,

    /// Order cancelled, reservations returned to stock (terminal).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if `next` is a legal transition from this status.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Approved, Shipped)
                | (Shipped, Delivered)
                | (Pending | Approved | Shipped, Cancelled)
        )
    }

    /// Returns true if this is a terminal status (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "APPROVED" => Ok(OrderStatus::Approved),
            "SHIPPED" => Ok(OrderStatus::Shipped),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A customer purchase.
///
/// Owns zero or more line items; deleting an order deletes its items first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub courier_tracking_no: Option<String>,
    pub courier_company: Option<String>,
    /// Set once the order's reservations have been returned to stock, so a
    /// delete after a cancel cannot restore twice.
    pub stock_reversed: bool,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

/// Fields for inserting an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub status: OrderStatus,
    pub created_by: UserId,
}

impl NewOrder {
    /// A freshly placed order.
    pub fn pending(created_by: UserId) -> Self {
        Self {
            status: OrderStatus::Pending,
            created_by,
        }
    }
}

/// Partial update of an order row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub courier_tracking_no: Option<String>,
    pub courier_company: Option<String>,
    pub stock_reversed: Option<bool>,
}

/// One requested quantity of a stock unit within an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: LineItemId,
    pub order_id: OrderId,
    pub stock_unit_id: StockUnitId,
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

/// Fields for inserting a line item.
#[derive(Debug, Clone)]
pub struct NewLineItem {
    pub order_id: OrderId,
    pub stock_unit_id: StockUnitId,
    pub quantity: Decimal,
    pub created_by: UserId,
}
