//! Signed API client.
//!
//! Builds the signed query string for a declared [`Endpoint`], executes the
//! call through the transport seam, and normalizes the response:
//!
//! - transport failure → `ApiErrorKind::Request`
//! - HTTP 429 → `ApiErrorKind::RateLimited`
//! - non-JSON body → `ApiErrorKind::Http` carrying the raw text
//! - `{error, message}` payload → `ApiErrorKind::Upstream`
//! - top-level JSON array → wrapped under a `response` key, since
//!   downstream consumers always expect an object
//!
//! Errors are returned, never raised across the boundary.

use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::api::endpoint::{Endpoint, Method, Signing};
use crate::api::error::ApiError;
use crate::api::transport::{HttpRequest, HttpTransport};
use crate::credential::Credential;
use crate::signing;
use crate::types::{Environment, now_epoch};

/// Signed HTTP client for one environment.
#[derive(Debug, Clone)]
pub struct ApiClient<T> {
    transport: T,
    environment: Environment,
}

impl<T: HttpTransport> ApiClient<T> {
    pub fn new(transport: T, environment: Environment) -> Self {
        ApiClient {
            transport,
            environment,
        }
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Executes a signed call against `endpoint`.
    ///
    /// `params` are business query parameters (GET endpoints only); `body`
    /// is the JSON business payload (POST endpoints only). Signing fields
    /// always travel in the query string.
    pub async fn call(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
        params: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let timestamp = now_epoch();
        let url = self.build_url(endpoint, credential, params, timestamp)?;

        let response = self
            .transport
            .execute(HttpRequest {
                method: endpoint.method,
                url: url.to_string(),
                body,
            })
            .await
            .map_err(|e| {
                warn!(path = endpoint.path, error = %e, "transport failure");
                ApiError::request(e.to_string())
            })?;

        self.normalize(endpoint, response.status, response.body)
    }

    /// Builds the signed URL for an endpoint. Public so the authorize-URL
    /// builder can reuse the exact same signing path.
    pub fn build_url(
        &self,
        endpoint: &Endpoint,
        credential: &Credential,
        params: &[(&str, String)],
        timestamp: i64,
    ) -> Result<Url, ApiError> {
        let (access_token, shop_or_merchant) = match endpoint.signing {
            Signing::Public => (None, None),
            Signing::Authenticated => {
                let token = credential
                    .access_token
                    .as_deref()
                    .ok_or_else(|| ApiError::auth_required("no access token"))?;
                let id = credential
                    .shop_or_merchant_id()
                    .ok_or_else(|| ApiError::auth_required("no shop_id or merchant_id"))?;
                (Some(token), Some(id))
            }
        };

        let base = signing::canonical_string(
            credential.partner_id,
            endpoint.path,
            timestamp,
            access_token,
            shop_or_merchant,
        );
        let sign = signing::sign(&credential.partner_key, &base);

        let mut url = Url::parse(self.environment.base_url())
            .map_err(|e| ApiError::request(format!("invalid base URL: {e}")))?;
        url.set_path(endpoint.path);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("partner_id", &credential.partner_id.to_string());
            query.append_pair("timestamp", &timestamp.to_string());
            query.append_pair("sign", &sign);
            if let Some(token) = access_token {
                query.append_pair("access_token", token);
            }
            if let Some(id) = shop_or_merchant {
                let field = if credential.shop_id.is_some() {
                    "shop_id"
                } else {
                    "merchant_id"
                };
                query.append_pair(field, &id.to_string());
            }
            if endpoint.method == Method::Get {
                for (key, value) in params {
                    query.append_pair(key, value);
                }
            }
        }
        Ok(url)
    }

    fn normalize(&self, endpoint: &Endpoint, status: u16, body: String) -> Result<Value, ApiError> {
        if status == 429 {
            warn!(path = endpoint.path, status, "rate limited");
            return Err(ApiError::rate_limited(status, body));
        }

        let parsed: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) => {
                warn!(path = endpoint.path, status, "non-JSON response");
                return Err(ApiError::http(status, body));
            }
        };

        // Upstream error payloads carry a non-empty `error` field even on 200.
        if let Some(error) = parsed.get("error").and_then(Value::as_str) {
            if !error.is_empty() {
                let message = parsed
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                warn!(path = endpoint.path, status, error, "upstream error");
                return Err(ApiError::upstream(Some(status), error, message));
            }
        }

        if !(200..300).contains(&status) {
            warn!(path = endpoint.path, status, "unexpected HTTP status");
            return Err(ApiError::http(status, body));
        }

        // Token endpoint responses carry secrets; log body text only for
        // authenticated business calls.
        match endpoint.signing {
            Signing::Authenticated => {
                debug!(path = endpoint.path, status, response = %truncate_for_log(&body), "api call ok")
            }
            Signing::Public => debug!(path = endpoint.path, status, "api call ok"),
        }

        Ok(match parsed {
            Value::Array(items) => json!({ "response": items }),
            other => other,
        })
    }
}

fn truncate_for_log(body: &str) -> &str {
    let mut end = body.len().min(256);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::endpoint::{ORDER_LIST, TOKEN_GET};
    use crate::api::error::ApiErrorKind;
    use crate::api::transport::{HttpResponse, TransportError};
    use crate::types::{PartnerId, ShopId};
    use std::sync::Mutex;

    /// Scripted transport: records requests, replays canned responses.
    struct MockTransport {
        requests: Mutex<Vec<HttpRequest>>,
        responses: Mutex<Vec<Result<HttpResponse, TransportError>>>,
    }

    impl MockTransport {
        fn with_responses(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
            MockTransport {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses),
            }
        }

        fn ok(status: u16, body: &str) -> Self {
            Self::with_responses(vec![Ok(HttpResponse {
                status,
                body: body.to_string(),
            })])
        }

        fn recorded(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl HttpTransport for &MockTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(TransportError::new("no scripted response"));
            }
            responses.remove(0)
        }
    }

    fn authed_credential() -> Credential {
        let mut cred = Credential::new(PartnerId(2000163), "key", Environment::Test);
        cred.shop_id = Some(ShopId(226289));
        cred.access_token = Some("tok".into());
        cred
    }

    #[tokio::test]
    async fn get_call_puts_everything_in_query() {
        let transport = MockTransport::ok(200, r#"{"order_list":[]}"#);
        let client = ApiClient::new(&transport, Environment::Test);

        client
            .call(
                &ORDER_LIST,
                &authed_credential(),
                &[("time_from", "400".to_string()), ("time_to", "5000".to_string())],
                None,
            )
            .await
            .unwrap();

        let requests = transport.recorded();
        assert_eq!(requests.len(), 1);
        let url = Url::parse(&requests[0].url).unwrap();
        assert_eq!(url.path(), "/api/v2/order/get_order_list");
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.clone());
        assert_eq!(get("partner_id").as_deref(), Some("2000163"));
        assert_eq!(get("access_token").as_deref(), Some("tok"));
        assert_eq!(get("shop_id").as_deref(), Some("226289"));
        assert_eq!(get("time_from").as_deref(), Some("400"));
        assert_eq!(get("sign").map(|s| s.len()), Some(64));
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn post_call_carries_json_body_and_public_signing() {
        let transport = MockTransport::ok(
            200,
            r#"{"access_token":"A","refresh_token":"R","expire_in":14400}"#,
        );
        let client = ApiClient::new(&transport, Environment::Test);

        // Public signing: no access token needed even though none is set.
        let cred = Credential::new(PartnerId(7), "key", Environment::Test);
        client
            .call(&TOKEN_GET, &cred, &[], Some(json!({"code": "abc", "shop_id": 1})))
            .await
            .unwrap();

        let requests = transport.recorded();
        let url = Url::parse(&requests[0].url).unwrap();
        let keys: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert!(keys.contains(&"sign".to_string()));
        assert!(!keys.contains(&"access_token".to_string()));
        assert_eq!(requests[0].body, Some(json!({"code": "abc", "shop_id": 1})));
    }

    #[tokio::test]
    async fn authenticated_call_without_token_is_auth_required() {
        let transport = MockTransport::ok(200, "{}");
        let client = ApiClient::new(&transport, Environment::Test);

        let cred = {
            let mut c = authed_credential();
            c.access_token = None;
            c
        };
        let err = client.call(&ORDER_LIST, &cred, &[], None).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::AuthRequired);
        // The request must never have been sent.
        assert!(transport.recorded().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_becomes_request_error() {
        let transport =
            MockTransport::with_responses(vec![Err(TransportError::new("connection timed out"))]);
        let client = ApiClient::new(&transport, Environment::Test);

        let err = client
            .call(&ORDER_LIST, &authed_credential(), &[], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Request);
        assert!(err.message.contains("timed out"));
    }

    #[tokio::test]
    async fn non_json_response_is_http_with_raw_text() {
        let transport = MockTransport::ok(200, "<html>gateway error</html>");
        let client = ApiClient::new(&transport, Environment::Test);

        let err = client
            .call(&ORDER_LIST, &authed_credential(), &[], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Http);
        assert!(err.message.contains("<html>"));
    }

    #[tokio::test]
    async fn rate_limit_is_tagged_retriable() {
        let transport = MockTransport::ok(429, r#"{"message":"slow down"}"#);
        let client = ApiClient::new(&transport, Environment::Test);

        let err = client
            .call(&ORDER_LIST, &authed_credential(), &[], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::RateLimited);
        assert!(err.kind.is_retriable());
    }

    #[tokio::test]
    async fn upstream_error_field_is_surfaced() {
        let transport =
            MockTransport::ok(200, r#"{"error":"error_param","message":"bad time range"}"#);
        let client = ApiClient::new(&transport, Environment::Test);

        let err = client
            .call(&ORDER_LIST, &authed_credential(), &[], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Upstream);
        assert!(err.message.contains("error_param"));
        assert!(err.message.contains("bad time range"));
    }

    #[tokio::test]
    async fn empty_error_field_is_not_an_error() {
        let transport = MockTransport::ok(200, r#"{"error":"","response":{"ok":true}}"#);
        let client = ApiClient::new(&transport, Environment::Test);

        let value = client
            .call(&ORDER_LIST, &authed_credential(), &[], None)
            .await
            .unwrap();
        assert_eq!(value["response"]["ok"], json!(true));
    }

    #[tokio::test]
    async fn top_level_array_is_wrapped_under_response() {
        let transport = MockTransport::ok(200, r#"[{"order_sn":"X1"},{"order_sn":"X2"}]"#);
        let client = ApiClient::new(&transport, Environment::Test);

        let value = client
            .call(&ORDER_LIST, &authed_credential(), &[], None)
            .await
            .unwrap();
        assert_eq!(value["response"][0]["order_sn"], json!("X1"));
        assert_eq!(value["response"][1]["order_sn"], json!("X2"));
    }

    #[tokio::test]
    async fn signature_matches_canonical_string() {
        let transport = MockTransport::ok(200, "{}");
        let client = ApiClient::new(&transport, Environment::Test);
        let cred = authed_credential();

        let url = client.build_url(&ORDER_LIST, &cred, &[], 1_700_000_000).unwrap();
        let sign_param = url
            .query_pairs()
            .find(|(k, _)| k == "sign")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let base = crate::signing::canonical_string(
            cred.partner_id,
            ORDER_LIST.path,
            1_700_000_000,
            cred.access_token.as_deref(),
            cred.shop_or_merchant_id(),
        );
        assert_eq!(sign_param, crate::signing::sign(&cred.partner_key, &base));
    }
}
