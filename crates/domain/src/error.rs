//! Domain error taxonomy.

use common::{LineItemId, OrderId, StockUnitId};
use rust_decimal::Decimal;
use stock_store::{OrderStatus, StoreError};
use thiserror::Error;

/// Errors that can occur during engine operations.
///
/// Every multi-step operation runs inside one transaction; any of these
/// aborts and rolls back the entire operation, so no state is left
/// half-applied.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The stock unit does not exist.
    #[error("Stock unit not found: {0}")]
    StockUnitNotFound(StockUnitId),

    /// The order line item does not exist (or belongs to another order).
    #[error("Order item not found: {0}")]
    LineItemNotFound(LineItemId),

    /// The serial code is already assigned to another unit.
    #[error("Serial code already exists: {0}")]
    SerialCodeTaken(String),

    /// A quantity was zero or negative.
    #[error("Quantity must be greater than 0, got {0}")]
    InvalidQuantity(Decimal),

    /// A withdrawal would drive the stock balance negative.
    #[error(
        "Insufficient stock for {serial_code}. Available: {available}, Requested: {requested}"
    )]
    InsufficientStock {
        serial_code: String,
        available: Decimal,
        requested: Decimal,
    },

    /// The requested order status change is not a legal transition.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The order is in a terminal status and its items cannot change.
    #[error("Order {0} is {1} and can no longer be modified")]
    OrderClosed(OrderId, OrderStatus),

    /// The stock unit is still referenced by order line items.
    #[error("Stock unit {0} is referenced by order items")]
    UnitInUse(StockUnitId),

    /// A customer tried to access an order they did not place.
    #[error("Not allowed to access order {0}")]
    Forbidden(OrderId),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            // The unique constraint is the backstop for the service-level
            // serial check; both surface as the same domain error.
            StoreError::DuplicateSerial(serial_code) => DomainError::SerialCodeTaken(serial_code),
            other => DomainError::Store(other),
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, DomainError>;
