//! Shared types used across the inventory backend crates.

pub mod types;

pub use types::{Actor, CollectionId, LineItemId, MovementId, OrderId, Role, StockUnitId, UserId};
