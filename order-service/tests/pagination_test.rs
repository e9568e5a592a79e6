//! Listing and pagination integration tests.

mod common;

use common::{item, service, widget_catalog, InMemoryOrderStore, StubPaymentGateway};
use order_service::dtos::{ChangeOrderStatusDto, CreateOrderDto, OrderPaginationDto};

async fn seed_orders(svc: &order_service::services::OrdersService, count: usize) -> Vec<uuid::Uuid> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let created = svc
            .create(CreateOrderDto {
                items: vec![item(1, 1, 5)],
                status: None,
                paid: None,
            })
            .await
            .expect("Failed to create order");
        ids.push(created.order.order.id);
    }
    ids
}

fn page(page: i64, limit: i64, status: Option<&str>) -> OrderPaginationDto {
    OrderPaginationDto {
        page,
        limit,
        status: status.map(str::to_string),
    }
}

#[tokio::test]
async fn last_page_holds_the_remainder() {
    let store = InMemoryOrderStore::new();
    let svc = service(store, widget_catalog(), StubPaymentGateway::ok());
    let ids = seed_orders(&svc, 25).await;

    let result = svc.find_all(page(3, 10, None)).await.expect("Failed to list");

    assert_eq!(result.meta.total, 25);
    assert_eq!(result.meta.last_page, 3);
    assert_eq!(result.meta.page, 3);
    // Records 21-25.
    assert_eq!(result.data.len(), 5);
    assert_eq!(result.data[0].id, ids[20]);
    assert_eq!(result.data[4].id, ids[24]);
}

#[tokio::test]
async fn full_pages_carry_limit_rows() {
    let store = InMemoryOrderStore::new();
    let svc = service(store, widget_catalog(), StubPaymentGateway::ok());
    seed_orders(&svc, 25).await;

    let result = svc.find_all(page(1, 10, None)).await.expect("Failed to list");

    assert_eq!(result.data.len(), 10);
    assert_eq!(result.meta.last_page, 3);
}

#[tokio::test]
async fn empty_result_set_has_page_zero() {
    let store = InMemoryOrderStore::new();
    let svc = service(store, widget_catalog(), StubPaymentGateway::ok());

    let result = svc.find_all(page(1, 10, None)).await.expect("Failed to list");

    assert!(result.data.is_empty());
    assert_eq!(result.meta.total, 0);
    assert_eq!(result.meta.last_page, 0);
}

#[tokio::test]
async fn status_filter_narrows_the_listing() {
    let store = InMemoryOrderStore::new();
    let svc = service(store, widget_catalog(), StubPaymentGateway::ok());
    let ids = seed_orders(&svc, 5).await;

    for id in ids.iter().take(2) {
        svc.change_status(ChangeOrderStatusDto {
            id: *id,
            status: "CANCELLED".to_string(),
        })
        .await
        .expect("Failed to change status");
    }

    let cancelled = svc
        .find_all(page(1, 10, Some("CANCELLED")))
        .await
        .expect("Failed to list");
    assert_eq!(cancelled.meta.total, 2);
    assert!(cancelled.data.iter().all(|o| o.status == "CANCELLED"));

    let pending = svc
        .find_all(page(1, 10, Some("PENDING")))
        .await
        .expect("Failed to list");
    assert_eq!(pending.meta.total, 3);
}
