//! Shopee Bridge - connects the Shopee Open Platform v2 API to a downstream
//! business-records system.
//!
//! This library provides the core plumbing: request signing, the signed API
//! client, OAuth token lifecycle, overlap-safe incremental sync windows, and
//! the webhook inbox with bounded retries. Business-document mapping lives
//! behind the `SyncExecutor` and `WebhookProcessor` trait seams.

pub mod api;
pub mod auth;
pub mod config;
pub mod credential;
pub mod persistence;
pub mod server;
pub mod signing;
pub mod sync;
pub mod types;
pub mod webhook;
pub mod worker;
