//! Authorization URL construction.
//!
//! The merchant opens this URL, approves the partner, and is redirected
//! back with a one-time authorization code. The URL is signed with the
//! common-parameter form since no token exists yet.

use url::Url;

use crate::api::endpoint::SHOP_AUTH_PARTNER;
use crate::api::{ApiClient, ApiError, HttpTransport};
use crate::credential::Credential;

/// Builds the signed authorization URL the merchant must visit.
///
/// `redirect_url` is where the upstream sends the authorization code; it is
/// carried as an encoded query parameter, not part of the signature base.
pub fn build_authorize_url<T: HttpTransport>(
    client: &ApiClient<T>,
    credential: &Credential,
    redirect_url: &str,
    timestamp: i64,
) -> Result<Url, ApiError> {
    client.build_url(
        &SHOP_AUTH_PARTNER,
        credential,
        &[("redirect", redirect_url.to_string())],
        timestamp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::{HttpRequest, HttpResponse, TransportError};
    use crate::types::{Environment, PartnerId};

    struct NeverTransport;

    impl HttpTransport for NeverTransport {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::new("authorize URLs are never fetched"))
        }
    }

    #[test]
    fn url_is_signed_and_carries_redirect() {
        let client = ApiClient::new(NeverTransport, Environment::Test);
        let credential = Credential::new(PartnerId(2000163), "pk", Environment::Test);

        let url =
            build_authorize_url(&client, &credential, "https://erp.example/callback?a=1", 1_700_000_000)
                .unwrap();

        assert_eq!(url.host_str(), Some("partner.test-stable.shopeemobile.com"));
        assert_eq!(url.path(), "/api/v2/shop/auth_partner");

        let get = |k: &str| {
            url.query_pairs()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.into_owned())
        };
        assert_eq!(get("partner_id").as_deref(), Some("2000163"));
        assert_eq!(get("timestamp").as_deref(), Some("1700000000"));
        assert_eq!(get("sign").map(|s| s.len()), Some(64));
        // query_pairs decodes; the redirect survives round-trip encoding.
        assert_eq!(get("redirect").as_deref(), Some("https://erp.example/callback?a=1"));
        // No token fields on the public form.
        assert!(get("access_token").is_none());
        assert!(get("shop_id").is_none());
    }

    #[test]
    fn signature_uses_public_canonical_form() {
        let client = ApiClient::new(NeverTransport, Environment::Live);
        let credential = Credential::new(PartnerId(77), "pk", Environment::Live);

        let url = build_authorize_url(&client, &credential, "https://x.example/cb", 1000).unwrap();
        let sign = url
            .query_pairs()
            .find(|(k, _)| k == "sign")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let base = crate::signing::canonical_string(
            PartnerId(77),
            "/api/v2/shop/auth_partner",
            1000,
            None,
            None,
        );
        assert_eq!(sign, crate::signing::sign("pk", &base));
    }
}
