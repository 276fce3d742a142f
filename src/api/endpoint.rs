//! Per-endpoint descriptor table.
//!
//! The upstream API fixes, per endpoint family, both the HTTP method and
//! which fields enter the canonical signing string. Rather than guessing
//! from the path at call time, every endpoint the bridge touches is
//! declared here and resolved up front; a call site cannot pick the wrong
//! method or signing form for a known path.

use std::fmt;

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// All parameters, including the signature, travel in the query string.
    Get,
    /// Signature/identity fields in the query string; business payload as a
    /// JSON body.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Which fields enter the canonical signing string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signing {
    /// `partner_id + path + timestamp` only. Used by the authorization URL
    /// and the token endpoints, which precede token issuance.
    Public,
    /// `partner_id + path + timestamp + access_token + shop_id|merchant_id`.
    /// Used by every authenticated business call.
    Authenticated,
}

/// A declared API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub method: Method,
    pub signing: Signing,
}

/// OAuth authorization page (not an API call; signed like one).
pub const SHOP_AUTH_PARTNER: Endpoint = Endpoint {
    path: "/api/v2/shop/auth_partner",
    method: Method::Get,
    signing: Signing::Public,
};

/// Exchange an authorization code for a token pair.
pub const TOKEN_GET: Endpoint = Endpoint {
    path: "/api/v2/auth/token/get",
    method: Method::Post,
    signing: Signing::Public,
};

/// Refresh an access token using a refresh token.
pub const ACCESS_TOKEN_GET: Endpoint = Endpoint {
    path: "/api/v2/auth/access_token/get",
    method: Method::Post,
    signing: Signing::Public,
};

/// Shop profile lookup.
pub const SHOP_INFO: Endpoint = Endpoint {
    path: "/api/v2/shop/get_shop_info",
    method: Method::Get,
    signing: Signing::Authenticated,
};

/// Incremental order listing within a time window.
pub const ORDER_LIST: Endpoint = Endpoint {
    path: "/api/v2/order/get_order_list",
    method: Method::Get,
    signing: Signing::Authenticated,
};

/// Batched order detail lookup.
pub const ORDER_DETAIL: Endpoint = Endpoint {
    path: "/api/v2/order/get_order_detail",
    method: Method::Get,
    signing: Signing::Authenticated,
};

/// All endpoints the bridge knows about.
pub const REGISTRY: &[Endpoint] = &[
    SHOP_AUTH_PARTNER,
    TOKEN_GET,
    ACCESS_TOKEN_GET,
    SHOP_INFO,
    ORDER_LIST,
    ORDER_DETAIL,
];

/// Looks up an endpoint descriptor by path.
pub fn resolve(path: &str) -> Option<&'static Endpoint> {
    REGISTRY.iter().find(|e| e.path == path)
}
