// comanda-client/tests/sync_integration.rs
// End-to-end controller scenarios against the in-memory order service

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use comanda_client::{ClientConfig, ClientError, FeedClient, MemoryOrderApi, OrderSync, SyncPhase};
use shared::message::{FeedMessage, OrderEvent};
use shared::models::{
    DeliveryPerson, Order, OrderDraft, OrderItemDraft, OrderPatch, OrderStatus, OrderType,
    PaymentMethod, PaymentStatus,
};

fn sample(id: i64, status: OrderStatus) -> Order {
    Order {
        id,
        order_type: OrderType::Pickup,
        status,
        customer_name: format!("Customer {id}"),
        customer_phone: None,
        address: None,
        note: None,
        items: vec![],
        total_amount: 0.0,
        delivery_fee: 0.0,
        payment_method: PaymentMethod::Cash,
        payment_status: PaymentStatus::Pending,
        amount_paid: None,
        delivery_person: None,
        created_at: id,
        updated_at: id,
    }
}

fn controller(api: &Arc<MemoryOrderApi>) -> OrderSync {
    OrderSync::new(api.clone(), &ClientConfig::default())
}

fn pickup_draft() -> OrderDraft {
    OrderDraft {
        order_type: OrderType::Pickup,
        customer_name: "Helena Prado".to_string(),
        items: vec![OrderItemDraft {
            product_id: 1,
            name: "Marmita Executiva".to_string(),
            unit_price: 25.0,
            quantity: 2,
            ..Default::default()
        }],
        ..Default::default()
    }
}

// ========== Fetching ==========

#[tokio::test]
async fn test_load_populates_collection() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![
        sample(2, OrderStatus::Preparing),
        sample(1, OrderStatus::Pending),
    ]));
    let sync = controller(&api);
    let version_before = sync.version();

    sync.load(None).await.unwrap();

    assert_eq!(sync.orders().len(), 2);
    let snapshot = sync.snapshot();
    assert_eq!(snapshot.phase, SyncPhase::Idle);
    assert_eq!(snapshot.order_count, 2);
    assert!(snapshot.last_error.is_none());
    assert!(sync.version() > version_before);
}

#[tokio::test]
async fn test_load_applies_server_side_filter() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![
        sample(3, OrderStatus::Pending),
        sample(2, OrderStatus::Ready),
        sample(1, OrderStatus::Pending),
    ]));
    let sync = controller(&api);

    sync.load(Some(OrderStatus::Pending)).await.unwrap();
    assert_eq!(sync.orders().len(), 2);
    assert!(sync.orders().iter().all(|o| o.status == OrderStatus::Pending));
    assert_eq!(sync.snapshot().filter, Some(OrderStatus::Pending));
    assert!(api.calls().last().unwrap().contains("PENDING"));

    // Clearing the filter restores the full view
    sync.load(None).await.unwrap();
    assert_eq!(sync.orders().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_load_never_commits() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![sample(
        1,
        OrderStatus::Pending,
    )]));
    let sync = controller(&api);

    api.set_latency(Some(Duration::from_millis(200)));
    let slow = tokio::spawn({
        let sync = sync.clone();
        async move { sync.load(None).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Service state changes while the first fetch is still in flight
    api.set_latency(None);
    api.insert(sample(2, OrderStatus::Pending));
    sync.refresh().await.unwrap();

    let superseded = slow.await.unwrap();
    assert!(matches!(superseded, Err(ClientError::Cancelled)));
    let ids: Vec<i64> = sync.orders().iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![2, 1], "only the later fetch may commit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_loads_always_leave_a_winner() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![sample(
        1,
        OrderStatus::Pending,
    )]));
    let sync = controller(&api);

    // Racing fetches may supersede each other in any interleaving, but
    // the one holding the newest generation must never be cancelled
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let sync = sync.clone();
            tokio::spawn(async move { sync.refresh().await })
        })
        .collect();

    let mut committed = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(()) => committed += 1,
            Err(ClientError::Cancelled) => {}
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert!(committed >= 1, "the last-issued fetch must commit");
    assert_eq!(sync.orders().len(), 1);
    assert_eq!(sync.snapshot().phase, SyncPhase::Idle);
}

#[tokio::test]
async fn test_refresh_failure_keeps_collection() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![
        sample(2, OrderStatus::Ready),
        sample(1, OrderStatus::Pending),
    ]));
    let sync = controller(&api);
    sync.load(None).await.unwrap();

    api.push_failure(ClientError::Internal("service restarting".into()));
    let err = sync.refresh().await.unwrap_err();
    assert!(matches!(err, ClientError::Internal(_)));

    assert_eq!(sync.orders().len(), 2, "stale data beats no data");
    let snapshot = sync.snapshot();
    assert_eq!(snapshot.phase, SyncPhase::Idle);
    assert!(
        snapshot
            .last_error
            .as_deref()
            .unwrap()
            .contains("service restarting")
    );

    // The next success clears the sticky error
    sync.refresh().await.unwrap();
    assert!(sync.snapshot().last_error.is_none());
}

// ========== Optimistic Mutations ==========

#[tokio::test]
async fn test_update_status_commits_server_copy() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![sample(
        1,
        OrderStatus::Pending,
    )]));
    let sync = controller(&api);
    sync.load(None).await.unwrap();
    let before = sync.get(1).unwrap();

    let updated = sync.update_status(1, OrderStatus::Preparing).await.unwrap();

    assert_eq!(updated.status, OrderStatus::Preparing);
    assert!(updated.updated_at > before.updated_at);
    assert_eq!(sync.get(1).unwrap(), updated);
    assert_eq!(api.orders()[0].status, OrderStatus::Preparing);
}

#[tokio::test]
async fn test_failed_update_rolls_back_exactly() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![sample(
        1,
        OrderStatus::Pending,
    )]));
    let sync = controller(&api);
    sync.load(None).await.unwrap();
    let before = sync.get(1).unwrap();

    api.push_failure(ClientError::Internal("write refused".into()));
    let err = sync.update_status(1, OrderStatus::Preparing).await.unwrap_err();

    assert!(matches!(err, ClientError::Internal(_)));
    assert_eq!(
        sync.get(1).unwrap(),
        before,
        "pre-mutation order must be restored field for field"
    );
    assert_eq!(api.orders()[0].status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_patch_with_illegal_status_rejected_locally() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![sample(
        1,
        OrderStatus::Pending,
    )]));
    let sync = controller(&api);
    sync.load(None).await.unwrap();
    let calls_before = api.calls().len();

    let err = sync
        .update_order(1, OrderPatch::status(OrderStatus::Delivered))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Transition {
            from: OrderStatus::Pending,
            to: OrderStatus::Delivered
        }
    ));
    assert_eq!(sync.get(1).unwrap().status, OrderStatus::Pending);
    assert_eq!(api.calls().len(), calls_before, "no request may be issued");
}

#[tokio::test]
async fn test_update_order_merges_patch() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![sample(
        1,
        OrderStatus::Pending,
    )]));
    let sync = controller(&api);
    sync.load(None).await.unwrap();

    let patch = OrderPatch {
        note: Some("Ring twice".to_string()),
        ..Default::default()
    };
    let updated = sync.update_order(1, patch).await.unwrap();

    assert_eq!(updated.note.as_deref(), Some("Ring twice"));
    assert_eq!(updated.status, OrderStatus::Pending, "unset fields stay put");
    assert_eq!(sync.get(1).unwrap().note.as_deref(), Some("Ring twice"));
}

#[tokio::test]
async fn test_assign_delivery_person() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![sample(
        1,
        OrderStatus::Ready,
    )]));
    let sync = controller(&api);
    sync.load(None).await.unwrap();

    let courier = DeliveryPerson {
        id: 3,
        name: "Marcos Couri".to_string(),
        phone: Some("+55 11 98888-0001".to_string()),
    };
    let updated = sync
        .update_order(1, OrderPatch::assign(courier.clone()))
        .await
        .unwrap();

    assert_eq!(updated.delivery_person, Some(courier));
    assert_eq!(updated.status, OrderStatus::Ready, "assignment is not a status change");
    assert_eq!(sync.get(1).unwrap().delivery_person, updated.delivery_person);
}

#[tokio::test]
async fn test_cancel_allowed_from_any_active_status() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![
        sample(2, OrderStatus::Delivered),
        sample(1, OrderStatus::Delivering),
    ]));
    let sync = controller(&api);
    sync.load(None).await.unwrap();

    let cancelled = sync.update_status(1, OrderStatus::Cancelled).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // Terminal orders stay terminal
    let err = sync.update_status(2, OrderStatus::Cancelled).await.unwrap_err();
    assert!(matches!(err, ClientError::Transition { .. }));
}

#[tokio::test]
async fn test_create_order_enters_collection_and_feed_echo_is_idempotent() {
    let api = Arc::new(MemoryOrderApi::new());
    let sync = controller(&api);
    sync.load(None).await.unwrap();

    let order = sync.create_order(pickup_draft()).await.unwrap();

    assert!(order.id > 0);
    assert_eq!(order.total_amount, 50.0);
    assert_eq!(sync.get(order.id).unwrap(), order);
    let len = sync.orders().len();

    // The service announces the creation over the feed as well
    sync.apply_event(OrderEvent::Created(order.clone()));
    assert_eq!(sync.orders().len(), len, "echo must not duplicate the order");
}

// ========== Feed ==========

#[tokio::test]
async fn test_feed_events_flow_into_collection() {
    let api = Arc::new(MemoryOrderApi::new());
    let sync = controller(&api);
    let (service_tx, _keep) = broadcast::channel(16);
    let (client_tx, _keep_client) = broadcast::channel(16);
    let feed = FeedClient::memory(&service_tx, &client_tx);
    let _forward = feed.forward_orders(sync.clone());
    let mut changes = sync.subscribe();

    let order = sample(7, OrderStatus::Pending);
    service_tx.send(FeedMessage::order_created(&order)).unwrap();
    changes.changed().await.unwrap();
    assert_eq!(sync.get(7).unwrap(), order);

    // A malformed frame is skipped and the feed keeps flowing
    let mut bad = FeedMessage::order_updated(&order);
    bad.payload = b"not json".to_vec();
    service_tx.send(bad).unwrap();
    service_tx.send(FeedMessage::order_removed(7)).unwrap();

    changes.changed().await.unwrap();
    assert!(sync.get(7).is_none());

    feed.shutdown().await;
}

// ========== Auto Refresh ==========

#[tokio::test(start_paused = true)]
async fn test_auto_refresh_picks_up_service_changes() {
    let api = Arc::new(MemoryOrderApi::new());
    let config = ClientConfig::default().with_auto_refresh_interval(Duration::from_secs(30));
    let sync = OrderSync::new(api.clone(), &config);
    sync.load(None).await.unwrap();
    sync.start_auto_refresh();
    assert!(sync.auto_refresh_running());

    api.insert(sample(1, OrderStatus::Pending));
    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(sync.orders().len(), 1, "periodic refresh must have run");

    sync.stop_auto_refresh();
    sync.stop_auto_refresh();
    assert!(!sync.auto_refresh_running());
    api.insert(sample(2, OrderStatus::Pending));
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(sync.orders().len(), 1, "stopped worker must not refresh");
}

#[tokio::test(start_paused = true)]
async fn test_filter_change_restarts_refresh_timer() {
    let api = Arc::new(MemoryOrderApi::new());
    let config = ClientConfig::default().with_auto_refresh_interval(Duration::from_secs(30));
    let sync = OrderSync::new(api.clone(), &config);
    sync.load(None).await.unwrap();
    sync.start_auto_refresh();

    tokio::time::sleep(Duration::from_secs(20)).await;
    sync.load(Some(OrderStatus::Pending)).await.unwrap();
    let calls_after_load = api.calls().len();

    // The old deadline (30s after start) passes without a refresh
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(
        api.calls().len(),
        calls_after_load,
        "filter change must restart the delay"
    );

    // The restarted deadline (30s after the filter change) fires
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(api.calls().len() > calls_after_load);

    sync.stop_auto_refresh();
}

// ========== Teardown ==========

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_in_flight_fetch() {
    let api = Arc::new(MemoryOrderApi::with_orders(vec![sample(
        1,
        OrderStatus::Pending,
    )]));
    let sync = controller(&api);
    sync.load(None).await.unwrap();

    api.set_latency(Some(Duration::from_millis(100)));
    api.insert(sample(2, OrderStatus::Pending));
    let slow = tokio::spawn({
        let sync = sync.clone();
        async move { sync.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    sync.shutdown();

    let result = slow.await.unwrap();
    assert!(matches!(result, Err(ClientError::Cancelled)));
    assert_eq!(
        sync.orders().len(),
        1,
        "in-flight fetch must not commit after shutdown"
    );
    assert!(matches!(sync.refresh().await, Err(ClientError::Cancelled)));
    assert!(sync.is_shut_down());
}
