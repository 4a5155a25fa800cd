//! Persistence layer for the inventory backend.
//!
//! Defines the row records (stock units, the append-only movement ledger,
//! orders and their line items), the transactional store abstraction
//! ([`Store`] / [`StoreTx`]), and two implementations: PostgreSQL via sqlx
//! and an in-memory store for tests.

pub mod error;
pub mod memory;
pub mod movement;
pub mod order;
pub mod postgres;
pub mod query;
pub mod stock_unit;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use movement::{MovementDirection, NewMovement, StockMovement};
pub use order::{NewLineItem, NewOrder, Order, OrderLineItem, OrderPatch, OrderStatus};
pub use postgres::PgStore;
pub use query::{OrderFilter, Page, PageResult};
pub use stock_unit::{NewStockUnit, StockUnit, StockUnitPatch, UnitOfMeasure};
pub use store::{Store, StoreTx};
