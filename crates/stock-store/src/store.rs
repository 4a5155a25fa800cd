//! Transactional store abstraction.
//!
//! Every service operation runs against a [`StoreTx`]: a unit of work that
//! either commits as a whole or rolls back as a whole. Callers that own the
//! transaction obtain one from [`Store::begin`] and must finish it with
//! [`StoreTx::commit`] or [`StoreTx::rollback`]; callers that join an
//! existing transaction take `&mut dyn StoreTx` and never finish it
//! themselves. The obligation is visible in every signature.

use async_trait::async_trait;
use common::{CollectionId, LineItemId, OrderId, StockUnitId, UserId};
use rust_decimal::Decimal;

use crate::{
    MovementDirection, NewLineItem, NewMovement, NewOrder, NewStockUnit, Order, OrderFilter,
    OrderLineItem, OrderPatch, Page, PageResult, Result, StockMovement, StockUnit, StockUnitPatch,
};

/// A handle that can open transactions.
///
/// Implementations must be cheap to clone and thread-safe; the services hold
/// one for the lifetime of the process.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Opens a new transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// One open transaction over the inventory tables.
///
/// All reads and writes observe the transaction's own uncommitted state.
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTx: Send {
    // --- stock units ---

    /// Inserts a stock unit with zero stock. Fails with
    /// [`crate::StoreError::DuplicateSerial`] if the serial code is taken.
    async fn insert_stock_unit(&mut self, unit: NewStockUnit) -> Result<StockUnit>;

    async fn stock_unit(&mut self, id: StockUnitId) -> Result<Option<StockUnit>>;

    async fn stock_unit_by_serial(&mut self, serial_code: &str) -> Result<Option<StockUnit>>;

    /// All units belonging to a collection, oldest first.
    async fn stock_units_in_collection(
        &mut self,
        collection_id: CollectionId,
    ) -> Result<Vec<StockUnit>>;

    /// Applies a non-quantity patch. Returns `None` if the unit is missing.
    async fn update_stock_unit(
        &mut self,
        id: StockUnitId,
        patch: StockUnitPatch,
        editor: UserId,
    ) -> Result<Option<StockUnit>>;

    /// Atomically adjusts the stock balance.
    ///
    /// For [`MovementDirection::Out`] the write is conditional on
    /// `current_stock >= quantity`; `None` means the unit is missing or the
    /// guard failed, and nothing was written. This single guarded update is
    /// what keeps two concurrent withdrawals from driving the balance
    /// negative.
    async fn adjust_stock(
        &mut self,
        id: StockUnitId,
        direction: MovementDirection,
        quantity: Decimal,
        editor: UserId,
    ) -> Result<Option<StockUnit>>;

    /// Deletes a unit row. The caller is responsible for cascading the
    /// unit's movements first.
    async fn delete_stock_unit(&mut self, id: StockUnitId) -> Result<bool>;

    // --- movement ledger ---

    /// Appends a ledger entry. There is intentionally no update operation.
    async fn append_movement(&mut self, movement: NewMovement) -> Result<StockMovement>;

    /// A unit's ledger, oldest first.
    async fn movements_for_unit(&mut self, id: StockUnitId) -> Result<Vec<StockMovement>>;

    /// Removes a unit's ledger; only used when deleting the unit itself.
    async fn delete_movements_for_unit(&mut self, id: StockUnitId) -> Result<u64>;

    // --- orders ---

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order>;

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Applies a patch and stamps the editor. Returns `None` if the order is
    /// missing.
    async fn update_order(
        &mut self,
        id: OrderId,
        patch: OrderPatch,
        editor: UserId,
    ) -> Result<Option<Order>>;

    /// Orders matching the filter, newest first.
    async fn list_orders(&mut self, filter: &OrderFilter, page: Page) -> Result<PageResult<Order>>;

    /// Deletes an order row. Line items must be removed first.
    async fn delete_order(&mut self, id: OrderId) -> Result<bool>;

    // --- line items ---

    async fn insert_line_item(&mut self, item: NewLineItem) -> Result<OrderLineItem>;

    async fn line_item(&mut self, id: LineItemId) -> Result<Option<OrderLineItem>>;

    /// An order's line items, oldest first.
    async fn line_items_for_order(&mut self, id: OrderId) -> Result<Vec<OrderLineItem>>;

    /// Line items (across all orders) referencing a stock unit.
    async fn line_items_for_unit(&mut self, id: StockUnitId) -> Result<Vec<OrderLineItem>>;

    async fn update_line_item_quantity(
        &mut self,
        id: LineItemId,
        quantity: Decimal,
        editor: UserId,
    ) -> Result<Option<OrderLineItem>>;

    async fn delete_line_item(&mut self, id: LineItemId) -> Result<bool>;

    async fn delete_line_items_for_order(&mut self, id: OrderId) -> Result<u64>;

    // --- lifecycle ---

    /// Makes the transaction's writes durable.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards the transaction's writes.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
