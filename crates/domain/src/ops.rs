//! Input payloads accepted by the services and the composite order view.
//!
//! These are the validated shapes the HTTP layer hands over; the engine has
//! no wire format of its own.

use common::{CollectionId, LineItemId, StockUnitId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stock_store::{MovementDirection, Order, OrderLineItem, OrderStatus, UnitOfMeasure};

/// One requested quantity of a stock unit when placing an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub stock_unit_id: StockUnitId,
    pub quantity: Decimal,
}

/// One item-level operation within an order update.
///
/// Operations are applied strictly in the order supplied by the caller; a
/// failure at any point rolls back the preceding operations as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ItemOp {
    /// Add a new line item to the order, reserving its stock.
    Create {
        stock_unit_id: StockUnitId,
        quantity: Decimal,
    },
    /// Change a line item's quantity; only the delta moves stock.
    Update { id: LineItemId, quantity: Decimal },
    /// Remove a line item, returning its reservation to stock.
    Delete { id: LineItemId },
}

/// An order status change, with courier details when handing to a carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: OrderStatus,
    #[serde(default)]
    pub courier_tracking_no: Option<String>,
    #[serde(default)]
    pub courier_company: Option<String>,
}

impl StatusChange {
    pub fn to(status: OrderStatus) -> Self {
        Self {
            status,
            courier_tracking_no: None,
            courier_company: None,
        }
    }
}

/// Fields for registering a new stock unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStockUnit {
    pub collection_id: CollectionId,
    pub serial_code: String,
    #[serde(default)]
    pub min_stock: Decimal,
    #[serde(default)]
    pub max_stock: Decimal,
    #[serde(default)]
    pub unit: UnitOfMeasure,
    /// Initial balance, recorded as an IN movement so the ledger accounts
    /// for it.
    #[serde(default)]
    pub opening_stock: Decimal,
}

/// A manual ledger adjustment made outside any order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub direction: MovementDirection,
    pub quantity: Decimal,
    /// Free-text reason; a default message with the previous and new levels
    /// is written when absent.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Listing parameters for orders.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderListParams {
    /// Restrict to these statuses. Ignored when `overdue` is set.
    #[serde(default)]
    pub statuses: Option<Vec<OrderStatus>>,
    /// Select open orders older than the configured threshold.
    #[serde(default)]
    pub overdue: bool,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// An order together with its line items.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLineItem>,
}
