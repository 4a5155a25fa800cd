//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p stock-store --test postgres_integration
//! ```

use std::sync::Arc;

use common::{CollectionId, UserId};
use rust_decimal::Decimal;
use serial_test::serial;
use sqlx::PgPool;
use stock_store::{
    MovementDirection, NewLineItem, NewMovement, NewOrder, NewStockUnit, OrderFilter, OrderPatch,
    OrderStatus, Page, PgStore, StockUnitPatch, Store, StoreError, StoreTx, UnitOfMeasure,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for the schema
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            // Run the migration using raw_sql to execute multiple statements
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_inventory_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PgStore {
    let info = get_container_info().await;

    // Create a fresh pool for each test to avoid connection issues
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    // Clear tables for test isolation
    sqlx::query(
        "TRUNCATE TABLE order_items, stock_movements, orders, stock_units RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .unwrap();

    PgStore::new(pool)
}

fn new_unit(serial: &str) -> NewStockUnit {
    NewStockUnit {
        collection_id: CollectionId::from_i64(1),
        serial_code: serial.to_string(),
        min_stock: Decimal::ZERO,
        max_stock: Decimal::from(100),
        unit: UnitOfMeasure::Metre,
        created_by: UserId::from_i64(1),
    }
}

#[tokio::test]
#[serial]
async fn insert_unit_and_adjust_stock() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let unit = tx.insert_stock_unit(new_unit("SR-001")).await.unwrap();
    assert_eq!(unit.current_stock, Decimal::ZERO);
    assert_eq!(unit.serial_code, "SR-001");
    assert!(unit.updated_at.is_none());

    let unit = tx
        .adjust_stock(
            unit.id,
            MovementDirection::In,
            Decimal::from(10),
            UserId::from_i64(1),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.current_stock, Decimal::from(10));
    assert!(unit.updated_at.is_some());
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let found = tx.stock_unit(unit.id).await.unwrap().unwrap();
    assert_eq!(found.current_stock, Decimal::from(10));
    let by_serial = tx.stock_unit_by_serial("SR-001").await.unwrap().unwrap();
    assert_eq!(by_serial.id, unit.id);
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn out_adjustment_guard_refuses_overdraw() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let unit = tx.insert_stock_unit(new_unit("SR-001")).await.unwrap();
    tx.adjust_stock(
        unit.id,
        MovementDirection::In,
        Decimal::from(10),
        UserId::from_i64(1),
    )
    .await
    .unwrap()
    .unwrap();

    // Guard failure is an empty result, not an error; the transaction
    // remains usable.
    let refused = tx
        .adjust_stock(
            unit.id,
            MovementDirection::Out,
            Decimal::from(11),
            UserId::from_i64(1),
        )
        .await
        .unwrap();
    assert!(refused.is_none());

    let unit = tx
        .adjust_stock(
            unit.id,
            MovementDirection::Out,
            Decimal::from(4),
            UserId::from_i64(1),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unit.current_stock, Decimal::from(6));
    tx.commit().await.unwrap();
}

#[tokio::test]
#[serial]
async fn duplicate_serial_is_rejected() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    tx.insert_stock_unit(new_unit("SR-001")).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let err = tx.insert_stock_unit(new_unit("SR-001")).await.unwrap_err();
    assert!(matches!(err, StoreError::DuplicateSerial(ref s) if s == "SR-001"));
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn rollback_discards_all_writes() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let unit = tx.insert_stock_unit(new_unit("SR-001")).await.unwrap();
    tx.append_movement(NewMovement {
        stock_unit_id: unit.id,
        direction: MovementDirection::In,
        quantity: Decimal::from(5),
        message: "Opening stock".to_string(),
        created_by: UserId::from_i64(1),
    })
    .await
    .unwrap();
    tx.insert_order(NewOrder::pending(UserId::from_i64(1)))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    assert!(tx.stock_unit(unit.id).await.unwrap().is_none());
    assert!(
        tx.order(common::OrderId::from_i64(1))
            .await
            .unwrap()
            .is_none()
    );
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn movement_ledger_appends_in_order() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let unit = tx.insert_stock_unit(new_unit("SR-001")).await.unwrap();
    for (direction, qty, message) in [
        (MovementDirection::In, 10, "Opening stock"),
        (MovementDirection::Out, 4, "Order #1 - 4 units sold"),
        (MovementDirection::In, 4, "Order #1 cancelled - 4 units restored"),
    ] {
        tx.append_movement(NewMovement {
            stock_unit_id: unit.id,
            direction,
            quantity: Decimal::from(qty),
            message: message.to_string(),
            created_by: UserId::from_i64(1),
        })
        .await
        .unwrap();
    }
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let movements = tx.movements_for_unit(unit.id).await.unwrap();
    assert_eq!(movements.len(), 3);
    assert_eq!(movements[0].message, "Opening stock");
    assert_eq!(movements[1].direction, MovementDirection::Out);
    assert_eq!(movements[2].direction, MovementDirection::In);

    let net: Decimal = movements
        .iter()
        .map(|m| m.direction.signed(m.quantity))
        .sum();
    assert_eq!(net, Decimal::from(10));
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn update_stock_unit_fields() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let unit = tx.insert_stock_unit(new_unit("SR-001")).await.unwrap();
    let updated = tx
        .update_stock_unit(
            unit.id,
            StockUnitPatch {
                serial_code: Some("SR-001-A".to_string()),
                min_stock: Some(Decimal::from(2)),
                unit: Some(UnitOfMeasure::Piece),
                ..Default::default()
            },
            UserId::from_i64(9),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.serial_code, "SR-001-A");
    assert_eq!(updated.min_stock, Decimal::from(2));
    assert_eq!(updated.unit, UnitOfMeasure::Piece);
    assert_eq!(updated.updated_by, Some(UserId::from_i64(9)));
    // Untouched fields survive.
    assert_eq!(updated.max_stock, Decimal::from(100));
    tx.commit().await.unwrap();
}

#[tokio::test]
#[serial]
async fn order_lifecycle_rows() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let order = tx
        .insert_order(NewOrder::pending(UserId::from_i64(7)))
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert!(!order.stock_reversed);

    let unit = tx.insert_stock_unit(new_unit("SR-001")).await.unwrap();
    let item = tx
        .insert_line_item(NewLineItem {
            order_id: order.id,
            stock_unit_id: unit.id,
            quantity: Decimal::from(3),
            created_by: UserId::from_i64(7),
        })
        .await
        .unwrap();

    let updated = tx
        .update_order(
            order.id,
            OrderPatch {
                status: Some(OrderStatus::Approved),
                courier_tracking_no: Some("TRK-1".to_string()),
                courier_company: Some("ACME Logistics".to_string()),
                ..Default::default()
            },
            UserId::from_i64(8),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Approved);
    assert_eq!(updated.courier_tracking_no.as_deref(), Some("TRK-1"));
    assert_eq!(updated.updated_by, Some(UserId::from_i64(8)));

    let item = tx
        .update_line_item_quantity(item.id, Decimal::from(5), UserId::from_i64(8))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item.quantity, Decimal::from(5));

    assert_eq!(tx.line_items_for_order(order.id).await.unwrap().len(), 1);
    assert_eq!(tx.line_items_for_unit(unit.id).await.unwrap().len(), 1);

    assert_eq!(tx.delete_line_items_for_order(order.id).await.unwrap(), 1);
    assert!(tx.delete_order(order.id).await.unwrap());
    assert!(tx.order(order.id).await.unwrap().is_none());
    tx.commit().await.unwrap();
}

#[tokio::test]
#[serial]
async fn list_orders_filtering_and_pagination() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    for user in [1, 1, 2] {
        tx.insert_order(NewOrder::pending(UserId::from_i64(user)))
            .await
            .unwrap();
    }
    let cancelled = tx
        .insert_order(NewOrder::pending(UserId::from_i64(2)))
        .await
        .unwrap();
    tx.update_order(
        cancelled.id,
        OrderPatch {
            status: Some(OrderStatus::Cancelled),
            ..Default::default()
        },
        UserId::from_i64(2),
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();

    let all = tx
        .list_orders(&OrderFilter::new(), Page::default())
        .await
        .unwrap();
    assert_eq!(all.total, 4);
    // Newest first.
    assert_eq!(all.items[0].id, cancelled.id);

    let mine = tx
        .list_orders(
            &OrderFilter::new().created_by(UserId::from_i64(1)),
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(mine.total, 2);

    let open = tx
        .list_orders(
            &OrderFilter::new().with_statuses(vec![OrderStatus::Pending]),
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(open.total, 3);

    let window = tx
        .list_orders(&OrderFilter::new(), Page::new(2, 2))
        .await
        .unwrap();
    assert_eq!(window.total, 4);
    assert_eq!(window.items.len(), 2);
    tx.rollback().await.unwrap();
}

#[tokio::test]
#[serial]
async fn delete_unit_cascades_through_caller() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    let unit = tx.insert_stock_unit(new_unit("SR-001")).await.unwrap();
    tx.append_movement(NewMovement {
        stock_unit_id: unit.id,
        direction: MovementDirection::In,
        quantity: Decimal::from(5),
        message: "Opening stock".to_string(),
        created_by: UserId::from_i64(1),
    })
    .await
    .unwrap();

    // Ledger rows must go first; the FK protects the ordering.
    assert_eq!(tx.delete_movements_for_unit(unit.id).await.unwrap(), 1);
    assert!(tx.delete_stock_unit(unit.id).await.unwrap());
    tx.commit().await.unwrap();
}
