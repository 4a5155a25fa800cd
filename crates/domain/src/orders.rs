//! Order aggregate service.
//!
//! Owns the order lifecycle (creation, item-level updates, status
//! transitions, deletion) and delegates every stock effect to the stock
//! mutation service, so one order operation is one transaction and the
//! ledger follows every reservation and reversal.

use chrono::Utc;
use common::{Actor, OrderId};
use rust_decimal::Decimal;
use stock_store::{
    MovementDirection, NewLineItem, NewOrder, Order, OrderFilter, OrderPatch, OrderStatus, Page,
    PageResult, Store, StoreTx,
};

use crate::error::{DomainError, Result};
use crate::ops::{ItemOp, OrderItemRequest, OrderListParams, OrderWithItems, StatusChange};
use crate::policy::OrderPolicy;
use crate::stock::StockService;

/// Service for orders and their line items.
///
/// Follows the same own-vs-join transaction convention as
/// [`StockService`]: plain methods own their transaction, `_in` methods
/// participate in the caller's.
pub struct OrderService<S: Store + Clone> {
    store: S,
    stock: StockService<S>,
    policy: OrderPolicy,
}

impl<S: Store + Clone> OrderService<S> {
    /// Creates a new order service with the default policy.
    pub fn new(store: S) -> Self {
        Self::with_policy(store, OrderPolicy::default())
    }

    /// Creates a new order service with an explicit policy.
    pub fn with_policy(store: S, policy: OrderPolicy) -> Self {
        Self {
            stock: StockService::new(store.clone()),
            store,
            policy,
        }
    }

    /// Places an order: one `PENDING` row, one line item per request, and
    /// one OUT reservation per item, all or nothing.
    #[tracing::instrument(skip(self, actor))]
    pub async fn create_order(
        &self,
        items: Vec<OrderItemRequest>,
        actor: &Actor,
    ) -> Result<OrderWithItems> {
        let mut tx = self.store.begin().await?;
        match self.create_order_in(tx.as_mut(), items, actor).await {
            Ok(order) => {
                tx.commit().await?;
                Ok(order)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    /// Transaction-joining form of [`Self::create_order`].
    pub async fn create_order_in(
        &self,
        tx: &mut dyn StoreTx,
        items: Vec<OrderItemRequest>,
        actor: &Actor,
    ) -> Result<OrderWithItems> {
        let order = tx.insert_order(NewOrder::pending(actor.id)).await?;

        for request in &items {
            self.add_item_in(tx, &order, request, actor).await?;
        }

        let items = tx.line_items_for_order(order.id).await?;
        metrics::counter!("orders_created_total").increment(1);

        Ok(OrderWithItems { order, items })
    }

    /// Applies item-level operations to an order, strictly in the supplied
    /// order. A failure at operation *k* rolls back operations *1..k* too.
    #[tracing::instrument(skip(self, actor))]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        ops: Vec<ItemOp>,
        actor: &Actor,
    ) -> Result<OrderWithItems> {
        let mut tx = self.store.begin().await?;
        match self.update_order_in(tx.as_mut(), order_id, ops, actor).await {
            Ok(order) => {
                tx.commit().await?;
                Ok(order)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    /// Transaction-joining form of [`Self::update_order`].
    pub async fn update_order_in(
        &self,
        tx: &mut dyn StoreTx,
        order_id: OrderId,
        ops: Vec<ItemOp>,
        actor: &Actor,
    ) -> Result<OrderWithItems> {
        let order = tx
            .order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        if order.status.is_terminal() {
            return Err(DomainError::OrderClosed(order.id, order.status));
        }

        for op in ops {
            match op {
                ItemOp::Create {
                    stock_unit_id,
                    quantity,
                } => {
                    self.add_item_in(
                        tx,
                        &order,
                        &OrderItemRequest {
                            stock_unit_id,
                            quantity,
                        },
                        actor,
                    )
                    .await?;
                }
                ItemOp::Update { id, quantity } => {
                    if quantity <= Decimal::ZERO {
                        return Err(DomainError::InvalidQuantity(quantity));
                    }
                    let current = tx
                        .line_item(id)
                        .await?
                        .filter(|item| item.order_id == order_id)
                        .ok_or(DomainError::LineItemNotFound(id))?;

                    let delta = quantity - current.quantity;
                    if delta > Decimal::ZERO {
                        self.stock
                            .apply_delta_in(
                                tx,
                                current.stock_unit_id,
                                MovementDirection::Out,
                                delta,
                                Some(format!(
                                    "Order #{order_id} updated - {delta} additional units sold"
                                )),
                                actor,
                            )
                            .await?;
                    } else if delta < Decimal::ZERO {
                        let restored = -delta;
                        self.stock
                            .apply_delta_in(
                                tx,
                                current.stock_unit_id,
                                MovementDirection::In,
                                restored,
                                Some(format!(
                                    "Order #{order_id} updated - {restored} units restored"
                                )),
                                actor,
                            )
                            .await?;
                    }

                    tx.update_line_item_quantity(id, quantity, actor.id)
                        .await?
                        .ok_or(DomainError::LineItemNotFound(id))?;
                }
                ItemOp::Delete { id } => {
                    let item = tx
                        .line_item(id)
                        .await?
                        .filter(|item| item.order_id == order_id)
                        .ok_or(DomainError::LineItemNotFound(id))?;

                    self.stock
                        .apply_delta_in(
                            tx,
                            item.stock_unit_id,
                            MovementDirection::In,
                            item.quantity,
                            Some(format!(
                                "Order #{order_id} item deleted - {} units restored",
                                item.quantity
                            )),
                            actor,
                        )
                        .await?;
                    tx.delete_line_item(id).await?;
                }
            }
        }

        let order = tx
            .update_order(order_id, OrderPatch::default(), actor.id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;
        let items = tx.line_items_for_order(order_id).await?;

        Ok(OrderWithItems { order, items })
    }

    /// Moves an order through its state machine.
    ///
    /// A transition to `CANCELLED` returns every line item's reservation to
    /// stock in the same transaction, exactly once over the order's
    /// lifetime.
    #[tracing::instrument(skip(self, actor))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        change: StatusChange,
        actor: &Actor,
    ) -> Result<Order> {
        let mut tx = self.store.begin().await?;
        match self
            .update_status_in(tx.as_mut(), order_id, change, actor)
            .await
        {
            Ok(order) => {
                tx.commit().await?;
                Ok(order)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    /// Transaction-joining form of [`Self::update_status`].
    pub async fn update_status_in(
        &self,
        tx: &mut dyn StoreTx,
        order_id: OrderId,
        change: StatusChange,
        actor: &Actor,
    ) -> Result<Order> {
        let order = tx
            .order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if !order.status.can_transition_to(change.status) {
            return Err(DomainError::InvalidStatusTransition {
                from: order.status,
                to: change.status,
            });
        }

        let mut patch = OrderPatch {
            status: Some(change.status),
            courier_tracking_no: change.courier_tracking_no,
            courier_company: change.courier_company,
            stock_reversed: None,
        };

        if change.status == OrderStatus::Cancelled && !order.stock_reversed {
            self.restore_stock_in(tx, &order, actor).await?;
            patch.stock_reversed = Some(true);
            metrics::counter!("orders_cancelled_total").increment(1);
        }

        tx.update_order(order_id, patch, actor.id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))
    }

    /// Deletes an order: restores its reservations (unless a cancellation
    /// already has), then removes the line items and the order row.
    #[tracing::instrument(skip(self, actor))]
    pub async fn delete_order(&self, order_id: OrderId, actor: &Actor) -> Result<()> {
        let mut tx = self.store.begin().await?;
        match self.delete_order_in(tx.as_mut(), order_id, actor).await {
            Ok(()) => {
                tx.commit().await?;
                Ok(())
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    /// Transaction-joining form of [`Self::delete_order`].
    pub async fn delete_order_in(
        &self,
        tx: &mut dyn StoreTx,
        order_id: OrderId,
        actor: &Actor,
    ) -> Result<()> {
        let order = tx
            .order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if !order.stock_reversed {
            self.restore_stock_in(tx, &order, actor).await?;
        }

        tx.delete_line_items_for_order(order_id).await?;
        tx.delete_order(order_id).await?;
        Ok(())
    }

    /// Loads an order with its items. Customers may only read their own.
    pub async fn get_order(&self, order_id: OrderId, actor: &Actor) -> Result<OrderWithItems> {
        let mut tx = self.store.begin().await?;
        let result = self.get_order_in(tx.as_mut(), order_id, actor).await;
        tx.rollback().await?;
        result
    }

    /// Transaction-joining form of [`Self::get_order`].
    pub async fn get_order_in(
        &self,
        tx: &mut dyn StoreTx,
        order_id: OrderId,
        actor: &Actor,
    ) -> Result<OrderWithItems> {
        let order = tx
            .order(order_id)
            .await?
            .ok_or(DomainError::OrderNotFound(order_id))?;

        if !actor.is_staff() && order.created_by != actor.id {
            return Err(DomainError::Forbidden(order_id));
        }

        let items = tx.line_items_for_order(order_id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// Lists orders, newest first. Customers are scoped to their own orders;
    /// `overdue` selects open orders older than the policy threshold.
    pub async fn list_orders(
        &self,
        params: OrderListParams,
        actor: &Actor,
    ) -> Result<PageResult<OrderWithItems>> {
        let mut tx = self.store.begin().await?;
        let result = self.list_orders_in(tx.as_mut(), params, actor).await;
        tx.rollback().await?;
        result
    }

    /// Transaction-joining form of [`Self::list_orders`].
    pub async fn list_orders_in(
        &self,
        tx: &mut dyn StoreTx,
        params: OrderListParams,
        actor: &Actor,
    ) -> Result<PageResult<OrderWithItems>> {
        let mut filter = OrderFilter::new();
        if !actor.is_staff() {
            filter.created_by = Some(actor.id);
        }
        if params.overdue {
            filter.statuses = Some(vec![
                OrderStatus::Pending,
                OrderStatus::Approved,
                OrderStatus::Shipped,
            ]);
            filter.created_before = Some(self.policy.overdue_cutoff(Utc::now()));
        } else if let Some(statuses) = params.statuses {
            filter.statuses = Some(statuses);
        }

        let page = Page::new(
            params.limit.unwrap_or(Page::default().limit),
            params.offset.unwrap_or(0),
        );
        let orders = tx.list_orders(&filter, page).await?;

        let total = orders.total;
        let mut items = Vec::with_capacity(orders.items.len());
        for order in orders.items {
            let line_items = tx.line_items_for_order(order.id).await?;
            items.push(OrderWithItems {
                order,
                items: line_items,
            });
        }

        Ok(PageResult { items, total })
    }

    /// Validates availability, inserts the line item, and reserves its
    /// stock.
    async fn add_item_in(
        &self,
        tx: &mut dyn StoreTx,
        order: &Order,
        request: &OrderItemRequest,
        actor: &Actor,
    ) -> Result<()> {
        if request.quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(request.quantity));
        }

        // Resolve the unit before touching the item rows so a bad reference
        // surfaces as a typed error, not a foreign-key violation.
        let unit = tx
            .stock_unit(request.stock_unit_id)
            .await?
            .ok_or(DomainError::StockUnitNotFound(request.stock_unit_id))?;
        if unit.current_stock < request.quantity {
            return Err(DomainError::InsufficientStock {
                serial_code: unit.serial_code,
                available: unit.current_stock,
                requested: request.quantity,
            });
        }

        tx.insert_line_item(NewLineItem {
            order_id: order.id,
            stock_unit_id: request.stock_unit_id,
            quantity: request.quantity,
            created_by: actor.id,
        })
        .await?;

        self.stock
            .apply_delta_in(
                tx,
                request.stock_unit_id,
                MovementDirection::Out,
                request.quantity,
                Some(format!(
                    "Order #{} - {} units sold",
                    order.id, request.quantity
                )),
                actor,
            )
            .await?;

        Ok(())
    }

    /// Returns every line item's reservation to stock, tagged with the
    /// order id.
    async fn restore_stock_in(
        &self,
        tx: &mut dyn StoreTx,
        order: &Order,
        actor: &Actor,
    ) -> Result<()> {
        for item in tx.line_items_for_order(order.id).await? {
            self.stock
                .apply_delta_in(
                    tx,
                    item.stock_unit_id,
                    MovementDirection::In,
                    item.quantity,
                    Some(format!(
                        "Order #{} cancelled - {} units restored",
                        order.id, item.quantity
                    )),
                    actor,
                )
                .await?;
        }
        Ok(())
    }
}
