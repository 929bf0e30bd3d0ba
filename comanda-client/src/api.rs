//! Order service API seam
//!
//! The sync controller depends on `OrderApi`, not on HTTP. Production
//! code wires `HttpOrderApi`; tests and demos wire `MemoryOrderApi`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use shared::models::{Order, OrderDraft, OrderPatch, OrderStatus, OrderType};
use shared::{money, util};

use crate::http::HttpClient;
use crate::{ClientConfig, ClientError, ClientResult};

/// Typed access to the order service
#[async_trait]
pub trait OrderApi: Send + Sync + std::fmt::Debug {
    /// List orders, optionally narrowed to one status. Newest first.
    async fn fetch_orders(&self, status: Option<OrderStatus>) -> ClientResult<Vec<Order>>;

    /// Create an order; the service assigns id, timestamps and totals.
    async fn create_order(&self, draft: OrderDraft) -> ClientResult<Order>;

    /// Patch an order's mutable fields, returning the updated order.
    async fn update_order(&self, id: i64, patch: OrderPatch) -> ClientResult<Order>;

    /// Change an order's status, returning the updated order.
    async fn update_status(&self, id: i64, status: OrderStatus) -> ClientResult<Order>;
}

// ========== HTTP Adapter ==========

/// REST adapter for the order service
#[derive(Debug, Clone)]
pub struct HttpOrderApi {
    http: HttpClient,
    establishment_id: Option<i64>,
}

impl HttpOrderApi {
    /// Create an adapter from configuration
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: HttpClient::new(config),
            establishment_id: config.establishment_id,
        }
    }

    fn orders_path(&self, status: Option<OrderStatus>) -> String {
        let mut path = String::from("api/orders");
        let mut sep = '?';
        if let Some(id) = self.establishment_id {
            path.push_str(&format!("{sep}establishment_id={id}"));
            sep = '&';
        }
        if let Some(status) = status {
            path.push_str(&format!("{sep}status={status}"));
        }
        path
    }
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    async fn fetch_orders(&self, status: Option<OrderStatus>) -> ClientResult<Vec<Order>> {
        self.http.get_data(&self.orders_path(status)).await
    }

    async fn create_order(&self, mut draft: OrderDraft) -> ClientResult<Order> {
        // Stamp the configured establishment onto drafts that do not set one
        if draft.establishment_id.is_none() {
            draft.establishment_id = self.establishment_id;
        }
        self.http.post_data("api/orders", &draft).await
    }

    async fn update_order(&self, id: i64, patch: OrderPatch) -> ClientResult<Order> {
        self.http.patch_data(&format!("api/orders/{id}"), &patch).await
    }

    async fn update_status(&self, id: i64, status: OrderStatus) -> ClientResult<Order> {
        #[derive(serde::Serialize)]
        struct StatusBody {
            status: OrderStatus,
        }

        self.http
            .patch_data(&format!("api/orders/{id}/status"), &StatusBody { status })
            .await
    }
}

// ========== In-Memory Fake ==========

#[derive(Debug, Default)]
struct MemoryApiInner {
    orders: Mutex<Vec<Order>>,
    fail_queue: Mutex<VecDeque<ClientError>>,
    latency: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
}

/// In-memory order service for tests and demos
///
/// Behaves like the HTTP adapter after envelope unwrapping: it mints ids
/// and timestamps, recomputes totals and enforces the status lifecycle.
#[derive(Debug, Clone, Default)]
pub struct MemoryOrderApi {
    inner: Arc<MemoryApiInner>,
}

impl MemoryOrderApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing orders, newest first.
    pub fn with_orders(orders: Vec<Order>) -> Self {
        let api = Self::new();
        *api.inner.orders.lock().unwrap() = orders;
        api
    }

    /// Insert an order directly, bypassing the create path.
    pub fn insert(&self, order: Order) {
        self.inner.orders.lock().unwrap().insert(0, order);
    }

    /// Drop an order directly, bypassing any API path.
    pub fn remove(&self, id: i64) {
        self.inner.orders.lock().unwrap().retain(|o| o.id != id);
    }

    /// Queue an error; the next call pops and returns it.
    pub fn push_failure(&self, err: ClientError) {
        self.inner.fail_queue.lock().unwrap().push_back(err);
    }

    /// Delay every call by `latency` (None disables).
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.inner.latency.lock().unwrap() = latency;
    }

    /// Snapshot of the stored orders, newest first.
    pub fn orders(&self) -> Vec<Order> {
        self.inner.orders.lock().unwrap().clone()
    }

    /// Log of calls made against this fake.
    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    async fn begin(&self, call: String) -> ClientResult<()> {
        let latency = *self.inner.latency.lock().unwrap();
        self.inner.calls.lock().unwrap().push(call);
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.inner.fail_queue.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl OrderApi for MemoryOrderApi {
    async fn fetch_orders(&self, status: Option<OrderStatus>) -> ClientResult<Vec<Order>> {
        self.begin(match status {
            Some(s) => format!("fetch_orders {s}"),
            None => "fetch_orders".to_string(),
        })
        .await?;

        let orders = self.inner.orders.lock().unwrap();
        Ok(orders
            .iter()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect())
    }

    async fn create_order(&self, draft: OrderDraft) -> ClientResult<Order> {
        self.begin("create_order".to_string()).await?;

        if draft.items.is_empty() {
            return Err(ClientError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }
        if draft.order_type == OrderType::Delivery && draft.address.is_none() {
            return Err(ClientError::Validation(
                "delivery orders require an address".to_string(),
            ));
        }

        let items: Vec<_> = draft.items.into_iter().map(|i| i.into_item()).collect();
        let now = util::now_millis();
        let order = Order {
            id: util::snowflake_id(),
            order_type: draft.order_type,
            status: OrderStatus::Pending,
            customer_name: draft.customer_name,
            customer_phone: draft.customer_phone,
            address: draft.address,
            note: draft.note,
            total_amount: money::to_f64(money::order_total(&items, draft.delivery_fee)),
            delivery_fee: draft.delivery_fee,
            items,
            payment_method: draft.payment_method,
            payment_status: Default::default(),
            amount_paid: None,
            delivery_person: None,
            created_at: now,
            updated_at: now,
        };

        self.inner.orders.lock().unwrap().insert(0, order.clone());
        Ok(order)
    }

    async fn update_order(&self, id: i64, patch: OrderPatch) -> ClientResult<Order> {
        self.begin(format!("update_order {id}")).await?;

        let mut orders = self.inner.orders.lock().unwrap();
        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("order {id}")))?;

        if let Some(next) = patch.status {
            if !order.status.can_transition_to(next) {
                return Err(ClientError::Validation(format!(
                    "illegal transition {} -> {next}",
                    order.status
                )));
            }
        }

        patch.apply_to(order);
        // The service owns money: replacing items reprices the order
        if patch.items.is_some() && patch.total_amount.is_none() {
            order.total_amount = money::to_f64(money::order_total(&order.items, order.delivery_fee));
        }
        Ok(order.clone())
    }

    async fn update_status(&self, id: i64, status: OrderStatus) -> ClientResult<Order> {
        self.begin(format!("update_status {id} {status}")).await?;

        let mut orders = self.inner.orders.lock().unwrap();
        let order = orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| ClientError::NotFound(format!("order {id}")))?;

        if !order.status.can_transition_to(status) {
            return Err(ClientError::Validation(format!(
                "illegal transition {} -> {status}",
                order.status
            )));
        }

        order.status = status;
        order.updated_at = util::now_millis();
        Ok(order.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{OrderItemDraft, PaymentMethod};

    fn draft() -> OrderDraft {
        OrderDraft {
            order_type: OrderType::Pickup,
            customer_name: "Clara".to_string(),
            customer_phone: None,
            address: None,
            note: None,
            payment_method: PaymentMethod::Pix,
            delivery_fee: 0.0,
            establishment_id: None,
            items: vec![OrderItemDraft {
                product_id: 7,
                name: "Marmita".to_string(),
                unit_price: 18.5,
                quantity: 2,
                note: None,
                additions: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn test_create_computes_total_and_mints_id() {
        let api = MemoryOrderApi::new();
        let order = api.create_order(draft()).await.unwrap();

        assert!(order.id > 0);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.total_amount, 37.0);
        assert_eq!(api.orders().len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_empty_items() {
        let api = MemoryOrderApi::new();
        let mut empty = draft();
        empty.items.clear();

        let err = api.create_order(empty).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_requires_address_for_delivery() {
        let api = MemoryOrderApi::new();
        let mut delivery = draft();
        delivery.order_type = OrderType::Delivery;

        let err = api.create_order(delivery).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_status_enforces_lifecycle() {
        let api = MemoryOrderApi::new();
        let order = api.create_order(draft()).await.unwrap();

        let updated = api
            .update_status(order.id, OrderStatus::Preparing)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Preparing);

        let err = api
            .update_status(order.id, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_fetch_filters_by_status() {
        let api = MemoryOrderApi::new();
        let a = api.create_order(draft()).await.unwrap();
        let _b = api.create_order(draft()).await.unwrap();
        api.update_status(a.id, OrderStatus::Preparing).await.unwrap();

        let pending = api.fetch_orders(Some(OrderStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        let all = api.fetch_orders(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_queued_failure_pops_once() {
        let api = MemoryOrderApi::new();
        api.push_failure(ClientError::Internal("boom".to_string()));

        assert!(api.fetch_orders(None).await.is_err());
        assert!(api.fetch_orders(None).await.is_ok());
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_repricing_on_item_replacement() {
        let api = MemoryOrderApi::new();
        let order = api.create_order(draft()).await.unwrap();

        let mut items = order.items.clone();
        items[0].quantity = 3;
        let patch = OrderPatch {
            items: Some(items),
            ..Default::default()
        };
        let updated = api.update_order(order.id, patch).await.unwrap();
        assert_eq!(updated.total_amount, 55.5);
    }
}
