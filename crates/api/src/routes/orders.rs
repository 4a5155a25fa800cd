//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use common::OrderId;
use domain::{ItemOp, OrderItemRequest, OrderListParams, OrderWithItems, StatusChange};
use serde::Deserialize;
use stock_store::{Order, OrderStatus, PageResult, Store};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::actor_from_headers;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub items: Vec<OrderItemRequest>,
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    pub items: Vec<ItemOp>,
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub overdue: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// -- Handlers --

/// POST /orders — place a new order, reserving stock for every item.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let order = state.orders.create_order(req.items, &actor).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders — list orders, newest first.
#[tracing::instrument(skip(state, headers))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<PageResult<OrderWithItems>>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let params = OrderListParams {
        statuses: query.status.map(|status| vec![status]),
        overdue: query.overdue,
        limit: query.limit,
        offset: query.offset,
    };
    let page = state.orders.list_orders(params, &actor).await?;
    Ok(Json(page))
}

/// GET /orders/:id — load one order with its items.
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<OrderWithItems>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let order = state
        .orders
        .get_order(OrderId::from_i64(id), &actor)
        .await?;
    Ok(Json(order))
}

/// PATCH /orders/:id/items — apply item-level create/update/delete
/// operations atomically.
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_items<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<UpdateOrderRequest>,
) -> Result<Json<OrderWithItems>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let order = state
        .orders
        .update_order(OrderId::from_i64(id), req.items, &actor)
        .await?;
    Ok(Json(order))
}

/// PATCH /orders/:id/status — drive the order state machine.
#[tracing::instrument(skip(state, headers, change))]
pub async fn update_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(change): Json<StatusChange>,
) -> Result<Json<Order>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let order = state
        .orders
        .update_status(OrderId::from_i64(id), change, &actor)
        .await?;
    Ok(Json(order))
}

/// DELETE /orders/:id — remove an order, restoring its reservations.
#[tracing::instrument(skip(state, headers))]
pub async fn remove<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let actor = actor_from_headers(&headers)?;
    state
        .orders
        .delete_order(OrderId::from_i64(id), &actor)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
