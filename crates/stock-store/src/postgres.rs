//! PostgreSQL-backed store implementation.

use async_trait::async_trait;
use common::{CollectionId, LineItemId, OrderId, StockUnitId, UserId};
use rust_decimal::Decimal;
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{PgPool, Row, Transaction};

use crate::{
    MovementDirection, NewLineItem, NewMovement, NewOrder, NewStockUnit, Order, OrderFilter,
    OrderLineItem, OrderPatch, Page, PageResult, Result, StockMovement, StockUnit, StockUnitPatch,
    StoreError,
    store::{Store, StoreTx},
};

const SERIAL_CODE_CONSTRAINT: &str = "stock_units_serial_code_key";

/// PostgreSQL store over a connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the given database URL with default pool options.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        tracing::info!("running database migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }
}

/// One open PostgreSQL transaction.
pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

fn row_to_unit(row: PgRow) -> Result<StockUnit> {
    let unit: String = row.try_get("unit")?;
    Ok(StockUnit {
        id: StockUnitId::from_i64(row.try_get("id")?),
        collection_id: CollectionId::from_i64(row.try_get("collection_id")?),
        serial_code: row.try_get("serial_code")?,
        current_stock: row.try_get("current_stock")?,
        min_stock: row.try_get("min_stock")?,
        max_stock: row.try_get("max_stock")?,
        unit: unit.parse().map_err(StoreError::Decode)?,
        created_at: row.try_get("created_at")?,
        created_by: UserId::from_i64(row.try_get("created_by")?),
        updated_at: row.try_get("updated_at")?,
        updated_by: row.try_get::<Option<i64>, _>("updated_by")?.map(UserId::from_i64),
    })
}

fn row_to_movement(row: PgRow) -> Result<StockMovement> {
    let direction: String = row.try_get("direction")?;
    Ok(StockMovement {
        id: common::MovementId::from_i64(row.try_get("id")?),
        stock_unit_id: StockUnitId::from_i64(row.try_get("stock_unit_id")?),
        direction: direction.parse().map_err(StoreError::Decode)?,
        quantity: row.try_get("quantity")?,
        message: row.try_get("message")?,
        created_at: row.try_get("created_at")?,
        created_by: UserId::from_i64(row.try_get("created_by")?),
    })
}

fn row_to_order(row: PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::from_i64(row.try_get("id")?),
        status: status.parse().map_err(StoreError::Decode)?,
        courier_tracking_no: row.try_get("courier_tracking_no")?,
        courier_company: row.try_get("courier_company")?,
        stock_reversed: row.try_get("stock_reversed")?,
        created_at: row.try_get("created_at")?,
        created_by: UserId::from_i64(row.try_get("created_by")?),
        updated_at: row.try_get("updated_at")?,
        updated_by: row.try_get::<Option<i64>, _>("updated_by")?.map(UserId::from_i64),
    })
}

fn row_to_line_item(row: PgRow) -> Result<OrderLineItem> {
    Ok(OrderLineItem {
        id: LineItemId::from_i64(row.try_get("id")?),
        order_id: OrderId::from_i64(row.try_get("order_id")?),
        stock_unit_id: StockUnitId::from_i64(row.try_get("stock_unit_id")?),
        quantity: row.try_get("quantity")?,
        created_at: row.try_get("created_at")?,
        created_by: UserId::from_i64(row.try_get("created_by")?),
        updated_at: row.try_get("updated_at")?,
        updated_by: row.try_get::<Option<i64>, _>("updated_by")?.map(UserId::from_i64),
    })
}

/// Maps a unique-constraint violation on the serial code to
/// [`StoreError::DuplicateSerial`].
fn map_serial_conflict(e: sqlx::Error, serial_code: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint() == Some(SERIAL_CODE_CONSTRAINT)
    {
        return StoreError::DuplicateSerial(serial_code.to_string());
    }
    StoreError::Database(e)
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn insert_stock_unit(&mut self, unit: NewStockUnit) -> Result<StockUnit> {
        let row = sqlx::query(
            r#"
            INSERT INTO stock_units (collection_id, serial_code, min_stock, max_stock, unit, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, collection_id, serial_code, current_stock, min_stock, max_stock, unit,
                      created_at, created_by, updated_at, updated_by
            "#,
        )
        .bind(unit.collection_id.as_i64())
        .bind(&unit.serial_code)
        .bind(unit.min_stock)
        .bind(unit.max_stock)
        .bind(unit.unit.as_str())
        .bind(unit.created_by.as_i64())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_serial_conflict(e, &unit.serial_code))?;

        row_to_unit(row)
    }

    async fn stock_unit(&mut self, id: StockUnitId) -> Result<Option<StockUnit>> {
        let row = sqlx::query(
            r#"
            SELECT id, collection_id, serial_code, current_stock, min_stock, max_stock, unit,
                   created_at, created_by, updated_at, updated_by
            FROM stock_units
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_unit).transpose()
    }

    async fn stock_unit_by_serial(&mut self, serial_code: &str) -> Result<Option<StockUnit>> {
        let row = sqlx::query(
            r#"
            SELECT id, collection_id, serial_code, current_stock, min_stock, max_stock, unit,
                   created_at, created_by, updated_at, updated_by
            FROM stock_units
            WHERE serial_code = $1
            "#,
        )
        .bind(serial_code)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_unit).transpose()
    }

    async fn stock_units_in_collection(
        &mut self,
        collection_id: CollectionId,
    ) -> Result<Vec<StockUnit>> {
        let rows = sqlx::query(
            r#"
            SELECT id, collection_id, serial_code, current_stock, min_stock, max_stock, unit,
                   created_at, created_by, updated_at, updated_by
            FROM stock_units
            WHERE collection_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(collection_id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_unit).collect()
    }

    async fn update_stock_unit(
        &mut self,
        id: StockUnitId,
        patch: StockUnitPatch,
        editor: UserId,
    ) -> Result<Option<StockUnit>> {
        // Build the SET clause dynamically; bind order must match.
        let mut sql = String::from("UPDATE stock_units SET updated_at = NOW()");
        let mut param_count = 0;

        if patch.serial_code.is_some() {
            param_count += 1;
            sql.push_str(&format!(", serial_code = ${param_count}"));
        }
        if patch.min_stock.is_some() {
            param_count += 1;
            sql.push_str(&format!(", min_stock = ${param_count}"));
        }
        if patch.max_stock.is_some() {
            param_count += 1;
            sql.push_str(&format!(", max_stock = ${param_count}"));
        }
        if patch.unit.is_some() {
            param_count += 1;
            sql.push_str(&format!(", unit = ${param_count}"));
        }

        param_count += 1;
        sql.push_str(&format!(", updated_by = ${param_count}"));
        param_count += 1;
        sql.push_str(&format!(
            " WHERE id = ${param_count} \
             RETURNING id, collection_id, serial_code, current_stock, min_stock, max_stock, unit, \
             created_at, created_by, updated_at, updated_by"
        ));

        let serial_for_error = patch.serial_code.clone().unwrap_or_default();
        let mut query = sqlx::query(&sql);
        if let Some(serial_code) = patch.serial_code {
            query = query.bind(serial_code);
        }
        if let Some(min_stock) = patch.min_stock {
            query = query.bind(min_stock);
        }
        if let Some(max_stock) = patch.max_stock {
            query = query.bind(max_stock);
        }
        if let Some(unit) = patch.unit {
            query = query.bind(unit.as_str());
        }
        let row = query
            .bind(editor.as_i64())
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_serial_conflict(e, &serial_for_error))?;

        row.map(row_to_unit).transpose()
    }

    async fn adjust_stock(
        &mut self,
        id: StockUnitId,
        direction: MovementDirection,
        quantity: Decimal,
        editor: UserId,
    ) -> Result<Option<StockUnit>> {
        // The OUT form is conditional on sufficient stock and reports the
        // failure through an empty result rather than a constraint error, so
        // a lost race surfaces the same way as plain insufficiency.
        let sql = match direction {
            MovementDirection::In => {
                r#"
                UPDATE stock_units
                SET current_stock = current_stock + $2, updated_at = NOW(), updated_by = $3
                WHERE id = $1
                RETURNING id, collection_id, serial_code, current_stock, min_stock, max_stock, unit,
                          created_at, created_by, updated_at, updated_by
                "#
            }
            MovementDirection::Out => {
                r#"
                UPDATE stock_units
                SET current_stock = current_stock - $2, updated_at = NOW(), updated_by = $3
                WHERE id = $1 AND current_stock >= $2
                RETURNING id, collection_id, serial_code, current_stock, min_stock, max_stock, unit,
                          created_at, created_by, updated_at, updated_by
                "#
            }
        };

        let row = sqlx::query(sql)
            .bind(id.as_i64())
            .bind(quantity)
            .bind(editor.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_unit).transpose()
    }

    async fn delete_stock_unit(&mut self, id: StockUnitId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM stock_units WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_movement(&mut self, movement: NewMovement) -> Result<StockMovement> {
        let row = sqlx::query(
            r#"
            INSERT INTO stock_movements (stock_unit_id, direction, quantity, message, created_by)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, stock_unit_id, direction, quantity, message, created_at, created_by
            "#,
        )
        .bind(movement.stock_unit_id.as_i64())
        .bind(movement.direction.as_str())
        .bind(movement.quantity)
        .bind(&movement.message)
        .bind(movement.created_by.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_movement(row)
    }

    async fn movements_for_unit(&mut self, id: StockUnitId) -> Result<Vec<StockMovement>> {
        let rows = sqlx::query(
            r#"
            SELECT id, stock_unit_id, direction, quantity, message, created_at, created_by
            FROM stock_movements
            WHERE stock_unit_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_movement).collect()
    }

    async fn delete_movements_for_unit(&mut self, id: StockUnitId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM stock_movements WHERE stock_unit_id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_order(&mut self, order: NewOrder) -> Result<Order> {
        let row = sqlx::query(
            r#"
            INSERT INTO orders (status, created_by)
            VALUES ($1, $2)
            RETURNING id, status, courier_tracking_no, courier_company, stock_reversed,
                      created_at, created_by, updated_at, updated_by
            "#,
        )
        .bind(order.status.as_str())
        .bind(order.created_by.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_order(row)
    }

    async fn order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, status, courier_tracking_no, courier_company, stock_reversed,
                   created_at, created_by, updated_at, updated_by
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_order).transpose()
    }

    async fn update_order(
        &mut self,
        id: OrderId,
        patch: OrderPatch,
        editor: UserId,
    ) -> Result<Option<Order>> {
        let mut sql = String::from("UPDATE orders SET updated_at = NOW()");
        let mut param_count = 0;

        if patch.status.is_some() {
            param_count += 1;
            sql.push_str(&format!(", status = ${param_count}"));
        }
        if patch.courier_tracking_no.is_some() {
            param_count += 1;
            sql.push_str(&format!(", courier_tracking_no = ${param_count}"));
        }
        if patch.courier_company.is_some() {
            param_count += 1;
            sql.push_str(&format!(", courier_company = ${param_count}"));
        }
        if patch.stock_reversed.is_some() {
            param_count += 1;
            sql.push_str(&format!(", stock_reversed = ${param_count}"));
        }

        param_count += 1;
        sql.push_str(&format!(", updated_by = ${param_count}"));
        param_count += 1;
        sql.push_str(&format!(
            " WHERE id = ${param_count} \
             RETURNING id, status, courier_tracking_no, courier_company, stock_reversed, \
             created_at, created_by, updated_at, updated_by"
        ));

        let mut query = sqlx::query(&sql);
        if let Some(status) = patch.status {
            query = query.bind(status.as_str());
        }
        if let Some(tracking_no) = patch.courier_tracking_no {
            query = query.bind(tracking_no);
        }
        if let Some(company) = patch.courier_company {
            query = query.bind(company);
        }
        if let Some(reversed) = patch.stock_reversed {
            query = query.bind(reversed);
        }
        let row = query
            .bind(editor.as_i64())
            .bind(id.as_i64())
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(row_to_order).transpose()
    }

    async fn list_orders(&mut self, filter: &OrderFilter, page: Page) -> Result<PageResult<Order>> {
        let mut where_clause = String::from(" WHERE 1=1");
        let mut param_count = 0;

        if filter.statuses.is_some() {
            param_count += 1;
            where_clause.push_str(&format!(" AND status = ANY(${param_count})"));
        }
        if filter.created_by.is_some() {
            param_count += 1;
            where_clause.push_str(&format!(" AND created_by = ${param_count}"));
        }
        if filter.created_before.is_some() {
            param_count += 1;
            where_clause.push_str(&format!(" AND created_at < ${param_count}"));
        }

        let statuses: Option<Vec<String>> = filter
            .statuses
            .as_ref()
            .map(|s| s.iter().map(|status| status.as_str().to_string()).collect());

        let count_sql = format!("SELECT COUNT(*) FROM orders{where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        if let Some(ref statuses) = statuses {
            count_query = count_query.bind(statuses);
        }
        if let Some(created_by) = filter.created_by {
            count_query = count_query.bind(created_by.as_i64());
        }
        if let Some(created_before) = filter.created_before {
            count_query = count_query.bind(created_before);
        }
        let total = count_query.fetch_one(&mut *self.tx).await?;

        let list_sql = format!(
            "SELECT id, status, courier_tracking_no, courier_company, stock_reversed, \
             created_at, created_by, updated_at, updated_by \
             FROM orders{where_clause} ORDER BY id DESC LIMIT ${} OFFSET ${}",
            param_count + 1,
            param_count + 2,
        );
        let mut list_query = sqlx::query(&list_sql);
        if let Some(ref statuses) = statuses {
            list_query = list_query.bind(statuses);
        }
        if let Some(created_by) = filter.created_by {
            list_query = list_query.bind(created_by.as_i64());
        }
        if let Some(created_before) = filter.created_before {
            list_query = list_query.bind(created_before);
        }
        let rows = list_query
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&mut *self.tx)
            .await?;

        let items = rows
            .into_iter()
            .map(row_to_order)
            .collect::<Result<Vec<_>>>()?;

        Ok(PageResult {
            items,
            total: total as u64,
        })
    }

    async fn delete_order(&mut self, id: OrderId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_line_item(&mut self, item: NewLineItem) -> Result<OrderLineItem> {
        let row = sqlx::query(
            r#"
            INSERT INTO order_items (order_id, stock_unit_id, quantity, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, stock_unit_id, quantity,
                      created_at, created_by, updated_at, updated_by
            "#,
        )
        .bind(item.order_id.as_i64())
        .bind(item.stock_unit_id.as_i64())
        .bind(item.quantity)
        .bind(item.created_by.as_i64())
        .fetch_one(&mut *self.tx)
        .await?;

        row_to_line_item(row)
    }

    async fn line_item(&mut self, id: LineItemId) -> Result<Option<OrderLineItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, stock_unit_id, quantity,
                   created_at, created_by, updated_at, updated_by
            FROM order_items
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_line_item).transpose()
    }

    async fn line_items_for_order(&mut self, id: OrderId) -> Result<Vec<OrderLineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, stock_unit_id, quantity,
                   created_at, created_by, updated_at, updated_by
            FROM order_items
            WHERE order_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_line_item).collect()
    }

    async fn line_items_for_unit(&mut self, id: StockUnitId) -> Result<Vec<OrderLineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, stock_unit_id, quantity,
                   created_at, created_by, updated_at, updated_by
            FROM order_items
            WHERE stock_unit_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id.as_i64())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_line_item).collect()
    }

    async fn update_line_item_quantity(
        &mut self,
        id: LineItemId,
        quantity: Decimal,
        editor: UserId,
    ) -> Result<Option<OrderLineItem>> {
        let row = sqlx::query(
            r#"
            UPDATE order_items
            SET quantity = $2, updated_at = NOW(), updated_by = $3
            WHERE id = $1
            RETURNING id, order_id, stock_unit_id, quantity,
                      created_at, created_by, updated_at, updated_by
            "#,
        )
        .bind(id.as_i64())
        .bind(quantity)
        .bind(editor.as_i64())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_line_item).transpose()
    }

    async fn delete_line_item(&mut self, id: LineItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM order_items WHERE id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_line_items_for_order(&mut self, id: OrderId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM order_items WHERE order_id = $1")
            .bind(id.as_i64())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
