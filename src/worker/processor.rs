//! Default inbox processor.
//!
//! For order events it pulls the authoritative order record from the API,
//! treating the webhook payload as a hint rather than a source of truth:
//! payloads can arrive out of order, and the detail call always reflects
//! current state. Non-order events are acknowledged as processed.
//!
//! Reads only, so reprocessing the same entry is safe. Downstream document
//! mapping plugs in by replacing this with another [`WebhookProcessor`].

use serde_json::Value;
use tracing::{debug, info};

use crate::api::endpoint::ORDER_DETAIL;
use crate::api::{ApiClient, HttpTransport};
use crate::credential::CredentialStore;
use crate::webhook::inbox::InboxEntry;

use super::{ProcessError, WebhookProcessor};

/// Fields that may carry the order number, across payload generations.
const ORDER_FIELDS: &[&str] = &["order_sn", "ordersn"];

/// Processes inbox entries by re-fetching affected orders.
#[derive(Debug, Clone)]
pub struct OrderRefreshProcessor<T> {
    client: ApiClient<T>,
    store: CredentialStore,
}

impl<T: HttpTransport> OrderRefreshProcessor<T> {
    pub fn new(client: ApiClient<T>, store: CredentialStore) -> Self {
        OrderRefreshProcessor { client, store }
    }
}

impl<T: HttpTransport + Send + Sync> WebhookProcessor for OrderRefreshProcessor<T> {
    async fn process(&self, entry: &InboxEntry) -> Result<(), ProcessError> {
        let Some(order_sn) = order_sn_of(&entry.payload) else {
            debug!(key = %entry.idempotency_key, event_type = %entry.event_type, "no order reference; acknowledged");
            return Ok(());
        };

        let credential = self.store.snapshot().await;
        let params = [("order_sn_list", order_sn.clone())];
        let response = self
            .client
            .call(&ORDER_DETAIL, &credential, &params, None)
            .await
            .map_err(|e| ProcessError::new(format!("order detail fetch for {order_sn}: {e}")))?;

        let status = response
            .pointer("/response/order_list/0/order_status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(order_sn = %order_sn, status = %status, "order refreshed from event");
        Ok(())
    }
}

fn order_sn_of(payload: &Value) -> Option<String> {
    let data = payload.get("data").unwrap_or(payload);
    ORDER_FIELDS
        .iter()
        .find_map(|field| data.get(*field))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::{HttpRequest, HttpResponse, TransportError};
    use crate::credential::Credential;
    use crate::types::{Environment, IdempotencyKey, InboxId, PartnerId, ShopId};
    use crate::webhook::inbox::InboxStatus;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    #[derive(Clone, Default)]
    struct CountingTransport {
        calls: std::sync::Arc<AtomicU32>,
        response: std::sync::Arc<Mutex<Option<(u16, String)>>>,
    }

    impl HttpTransport for CountingTransport {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.response.lock().unwrap().clone() {
                Some((status, body)) => Ok(HttpResponse { status, body }),
                None => Err(TransportError::new("connection refused")),
            }
        }
    }

    fn entry(payload: Value) -> InboxEntry {
        InboxEntry {
            id: InboxId::new("e1"),
            idempotency_key: IdempotencyKey::new("e1"),
            event_type: "3".into(),
            payload,
            received_at: 100,
            status: InboxStatus::Processing,
            attempts: 1,
            last_error: None,
            next_retry_at: None,
        }
    }

    fn processor(transport: CountingTransport) -> (OrderRefreshProcessor<CountingTransport>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let mut cred = Credential::new(PartnerId(1), "pk", Environment::Test);
        cred.shop_id = Some(ShopId(2));
        cred.access_token = Some("tok".into());
        let store = CredentialStore::open(dir.path().join("c.json"), cred).unwrap();
        (
            OrderRefreshProcessor::new(ApiClient::new(transport, Environment::Test), store),
            dir,
        )
    }

    #[tokio::test]
    async fn order_event_fetches_detail() {
        let transport = CountingTransport::default();
        *transport.response.lock().unwrap() = Some((
            200,
            r#"{"response":{"order_list":[{"order_sn":"X1","order_status":"SHIPPED"}]}}"#.into(),
        ));
        let (processor, _dir) = processor(transport.clone());

        processor
            .process(&entry(json!({"data": {"ordersn": "X1", "status": "SHIPPED"}})))
            .await
            .unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_order_event_is_acknowledged_without_calls() {
        let transport = CountingTransport::default();
        let (processor, _dir) = processor(transport.clone());

        processor
            .process(&entry(json!({"data": {"shop_id": 2}})))
            .await
            .unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fetch_failure_propagates_for_retry() {
        let transport = CountingTransport::default(); // Always errors.
        let (processor, _dir) = processor(transport);

        let err = processor
            .process(&entry(json!({"data": {"order_sn": "X1"}})))
            .await
            .unwrap_err();
        assert!(err.message.contains("X1"));
    }
}
