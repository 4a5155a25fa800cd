//! Stock unit and movement ledger endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use common::{CollectionId, StockUnitId};
use domain::{CreateStockUnit, StockAdjustment};
use stock_store::{StockMovement, StockUnit, StockUnitPatch, Store};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::actor_from_headers;

/// POST /stock-units — register a new serialized unit.
#[tracing::instrument(skip(state, headers, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Json(req): Json<CreateStockUnit>,
) -> Result<(StatusCode, Json<StockUnit>), ApiError> {
    let actor = actor_from_headers(&headers)?;
    let unit = state.stock.create_unit(req, &actor).await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

/// GET /stock-units/:id — load one unit.
#[tracing::instrument(skip(state, headers))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<StockUnit>, ApiError> {
    actor_from_headers(&headers)?;
    let unit = state.stock.get_unit(StockUnitId::from_i64(id)).await?;
    Ok(Json(unit))
}

/// PATCH /stock-units/:id — edit thresholds, serial code, or unit of
/// measure. Quantities only move through the adjust endpoint.
#[tracing::instrument(skip(state, headers, patch))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(patch): Json<StockUnitPatch>,
) -> Result<Json<StockUnit>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let unit = state
        .stock
        .set_fields(StockUnitId::from_i64(id), patch, &actor)
        .await?;
    Ok(Json(unit))
}

/// POST /stock-units/:id/adjust — manual stock adjustment outside any
/// order, ledgered like every other movement.
#[tracing::instrument(skip(state, headers, req))]
pub async fn adjust<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<StockAdjustment>,
) -> Result<Json<StockUnit>, ApiError> {
    let actor = actor_from_headers(&headers)?;
    let unit = state
        .stock
        .apply_delta(
            StockUnitId::from_i64(id),
            req.direction,
            req.quantity,
            req.reason,
            &actor,
        )
        .await?;
    Ok(Json(unit))
}

/// GET /stock-units/:id/movements — the unit's ledger, oldest first.
#[tracing::instrument(skip(state, headers))]
pub async fn movements<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StockMovement>>, ApiError> {
    actor_from_headers(&headers)?;
    let movements = state.stock.movements(StockUnitId::from_i64(id)).await?;
    Ok(Json(movements))
}

/// DELETE /stock-units/:id — remove a unit and its ledger.
#[tracing::instrument(skip(state, headers))]
pub async fn remove<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    actor_from_headers(&headers)?;
    state.stock.delete_unit(StockUnitId::from_i64(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /collections/:id/stock-units — every unit in a collection.
#[tracing::instrument(skip(state, headers))]
pub async fn list_in_collection<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StockUnit>>, ApiError> {
    actor_from_headers(&headers)?;
    let units = state.stock.list_units(CollectionId::from_i64(id)).await?;
    Ok(Json(units))
}
