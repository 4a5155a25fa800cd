//! Stock mutation service.
//!
//! The sole authorized path for changing a unit's stock balance. Every
//! quantity change pairs a guarded balance update with an appended ledger
//! entry inside one transaction, so the balance and the ledger cannot
//! diverge.

use common::{Actor, CollectionId, StockUnitId};
use rust_decimal::Decimal;
use stock_store::{
    MovementDirection, NewMovement, NewStockUnit, StockMovement, StockUnit, StockUnitPatch, Store,
    StoreTx,
};

use crate::error::{DomainError, Result};
use crate::ops::CreateStockUnit;

/// Service for stock units and their movement ledger.
///
/// Each operation comes in two forms: the plain form owns its transaction
/// (begin, commit on success, roll back on error), while the `_in` form
/// joins a caller-supplied transaction and never finishes it. The order
/// service composes the `_in` forms; administrative endpoints use the plain
/// ones directly.
pub struct StockService<S: Store> {
    store: S,
}

impl<S: Store> StockService<S> {
    /// Creates a new stock service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Registers a new stock unit.
    #[tracing::instrument(skip(self, actor))]
    pub async fn create_unit(&self, req: CreateStockUnit, actor: &Actor) -> Result<StockUnit> {
        let mut tx = self.store.begin().await?;
        match self.create_unit_in(tx.as_mut(), req, actor).await {
            Ok(unit) => {
                tx.commit().await?;
                Ok(unit)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    /// Transaction-joining form of [`Self::create_unit`].
    pub async fn create_unit_in(
        &self,
        tx: &mut dyn StoreTx,
        req: CreateStockUnit,
        actor: &Actor,
    ) -> Result<StockUnit> {
        if tx.stock_unit_by_serial(&req.serial_code).await?.is_some() {
            return Err(DomainError::SerialCodeTaken(req.serial_code));
        }

        let unit = tx
            .insert_stock_unit(NewStockUnit {
                collection_id: req.collection_id,
                serial_code: req.serial_code,
                min_stock: req.min_stock,
                max_stock: req.max_stock,
                unit: req.unit,
                created_by: actor.id,
            })
            .await?;

        // Opening stock goes through the mutation path so the ledger
        // accounts for the unit's balance from its first day.
        if req.opening_stock > Decimal::ZERO {
            return self
                .apply_delta_in(
                    tx,
                    unit.id,
                    MovementDirection::In,
                    req.opening_stock,
                    Some("Opening stock".to_string()),
                    actor,
                )
                .await;
        }

        Ok(unit)
    }

    /// Applies a quantity delta to a unit and appends the matching ledger
    /// entry.
    ///
    /// Fails with [`DomainError::InsufficientStock`] when an OUT would drive
    /// the balance negative — including when a concurrent withdrawal wins
    /// the race between the availability read and the guarded update.
    #[tracing::instrument(skip(self, actor))]
    pub async fn apply_delta(
        &self,
        unit_id: StockUnitId,
        direction: MovementDirection,
        quantity: Decimal,
        reason: Option<String>,
        actor: &Actor,
    ) -> Result<StockUnit> {
        let mut tx = self.store.begin().await?;
        match self
            .apply_delta_in(tx.as_mut(), unit_id, direction, quantity, reason, actor)
            .await
        {
            Ok(unit) => {
                tx.commit().await?;
                Ok(unit)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    /// Transaction-joining form of [`Self::apply_delta`].
    pub async fn apply_delta_in(
        &self,
        tx: &mut dyn StoreTx,
        unit_id: StockUnitId,
        direction: MovementDirection,
        quantity: Decimal,
        reason: Option<String>,
        actor: &Actor,
    ) -> Result<StockUnit> {
        if quantity <= Decimal::ZERO {
            return Err(DomainError::InvalidQuantity(quantity));
        }

        let unit = tx
            .stock_unit(unit_id)
            .await?
            .ok_or(DomainError::StockUnitNotFound(unit_id))?;

        if direction == MovementDirection::Out && unit.current_stock < quantity {
            return Err(DomainError::InsufficientStock {
                serial_code: unit.serial_code,
                available: unit.current_stock,
                requested: quantity,
            });
        }

        // The guarded update is the authority; the read above only exists
        // for the error report. An OUT losing the race comes back empty.
        let updated = tx
            .adjust_stock(unit_id, direction, quantity, actor.id)
            .await?
            .ok_or_else(|| DomainError::InsufficientStock {
                serial_code: unit.serial_code.clone(),
                available: unit.current_stock,
                requested: quantity,
            })?;

        let message = reason.unwrap_or_else(|| {
            let label = match direction {
                MovementDirection::In => "Stock added",
                MovementDirection::Out => "Stock reduced",
            };
            format!(
                "{label}: {quantity} {} (Previous: {}, New: {})",
                unit.unit, unit.current_stock, updated.current_stock
            )
        });

        tx.append_movement(NewMovement {
            stock_unit_id: unit_id,
            direction,
            quantity,
            message,
            created_by: actor.id,
        })
        .await?;

        metrics::counter!("stock_movements_total", "direction" => direction.as_str()).increment(1);

        Ok(updated)
    }

    /// Edits a unit's non-quantity fields.
    ///
    /// The patch type cannot express a balance change, so these edits bypass
    /// the ledger by design of the types, not by runtime checks.
    #[tracing::instrument(skip(self, actor))]
    pub async fn set_fields(
        &self,
        unit_id: StockUnitId,
        patch: StockUnitPatch,
        actor: &Actor,
    ) -> Result<StockUnit> {
        let mut tx = self.store.begin().await?;
        match self.set_fields_in(tx.as_mut(), unit_id, patch, actor).await {
            Ok(unit) => {
                tx.commit().await?;
                Ok(unit)
            }
            Err(err) => {
                tx.rollback().await?;
                Err(err)
            }
        }
    }

    /// Transaction-joining form of [`Self::set_fields`].
    pub async fn set_fields_in(
        &self,
        tx: &mut dyn StoreTx,
        unit_id: StockUnitId,
        patch: StockUnitPatch,
        actor: &Actor,
    ) -> Result<StockUnit> {
        if let Some(ref serial_code) = patch.serial_code
            && let Some(existing) = tx.stock_unit_by_serial(serial_code).await?
            && existing.id != unit_id
        {
            return Err(DomainError::SerialCodeTaken(serial_code.clone()));
        }

        tx.update_stock_unit(unit_id, patch, actor.id)
            .await?
            .ok_or(DomainError::StockUnitNotFound(unit_id))
    }

    /// Loads a single unit.
    pub async fn get_unit(&self, unit_id: StockUnitId) -> Result<StockUnit> {
        let mut tx = self.store.begin().await?;
        let result = self.get_unit_in(tx.as_mut(), unit_id).await;
        tx.rollback().await?;
        result
    }

    /// Transaction-joining form of [`Self::get_unit`].
    pub async fn get_unit_in(
        &self,
        tx: &mut dyn StoreTx,
        unit_id: StockUnitId,
    ) -> Result<StockUnit> {
        tx.stock_unit(unit_id)
            .await?
            .ok_or(DomainError::StockUnitNotFound(unit_id))
    }

    /// All units in a collection.
    pub async fn list_units(&self, collection_id: CollectionId) -> Result<Vec<StockUnit>> {
        let mut tx = self.store.begin().await?;
        let result = tx
            .stock_units_in_collection(collection_id)
            .await
            .map_err(DomainError::from);
        tx.rollback().await?;
        result
    }

    /// A unit's movement ledger, oldest first.
    pub async fn movements(&self, unit_id: StockUnitId) -> Result<Vec<StockMovement>> {
        let mut tx = self.store.begin().await?;
        let result = self.movements_in(tx.as_mut(), unit_id).await;
        tx.rollback().await?;
        result
    }

    /// Transaction-joining form of [`Self::movements`].
    pub async fn movements_in(
        &self,
        tx: &mut dyn StoreTx,
        unit_id: StockUnitId,
    ) -> Result<Vec<StockMovement>> {
        if tx.stock_unit(unit_id).await?.is_none() {
            return Err(DomainError::StockUnitNotFound(unit_id));
        }
        Ok(tx.movements_for_unit(unit_id).await?)
    }

    /// Deletes a unit, cascading its ledger first.
    ///
    /// Refused while any order line item still references the unit.
    #[tracing::instrument(skip(self))]
    pub async fn delete_unit(&self, unit_id: StockUnitId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        match self.delete_unit_in(tx.as_mut(), unit_id).await {
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

    /// Transaction-joining form of [`Self::delete_unit`].
    pub async fn delete_unit_in(&self, tx: &mut dyn StoreTx, unit_id: StockUnitId) -> Result<()> {
        if tx.stock_unit(unit_id).await?.is_none() {
            return Err(DomainError::StockUnitNotFound(unit_id));
        }
        if !tx.line_items_for_unit(unit_id).await?.is_empty() {
            return Err(DomainError::UnitInUse(unit_id));
        }

        tx.delete_movements_for_unit(unit_id).await?;
        tx.delete_stock_unit(unit_id).await?;
        Ok(())
    }
}
