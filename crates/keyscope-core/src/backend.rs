//! Seam between the core engines and the HTTP client.
//!
//! Everything in this crate talks to a [`KeyBackend`] rather than to
//! `ApiClient` directly, so the engines can be driven by scripted backends in
//! tests.

use std::future::Future;

use keyscope_client::{ApiClient, Result};
use keyscope_types::{
    CopyRequest, DeleteResponse, KeyCount, KeyDetails, SaveRequest, ScanPage, ZaddRequest,
};

/// Backend operations used by the search engine, key operations and the
/// count poller. Mirrors the REST surface one method per endpoint.
pub trait KeyBackend: Send + Sync + 'static {
    fn scan_keys(
        &self,
        env: &str,
        pattern: &str,
        cursors: &[String],
        count: usize,
    ) -> impl Future<Output = Result<ScanPage>> + Send;

    fn key_details(&self, env: &str, key: &str) -> impl Future<Output = Result<KeyDetails>> + Send;

    fn key_count(&self, env: &str) -> impl Future<Output = Result<KeyCount>> + Send;

    fn delete_key(&self, env: &str, key: &str)
    -> impl Future<Output = Result<DeleteResponse>> + Send;

    fn set_ttl(&self, env: &str, key: &str, seconds: i64)
    -> impl Future<Output = Result<()>> + Send;

    fn rename_key(
        &self,
        env: &str,
        old_key: &str,
        new_key: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn copy_key(&self, request: &CopyRequest) -> impl Future<Output = Result<()>> + Send;

    fn save_key(&self, env: &str, request: &SaveRequest)
    -> impl Future<Output = Result<()>> + Send;

    fn add_sorted_set_members(
        &self,
        env: &str,
        key: &str,
        request: &ZaddRequest,
    ) -> impl Future<Output = Result<()>> + Send;
}

impl KeyBackend for ApiClient {
    fn scan_keys(
        &self,
        env: &str,
        pattern: &str,
        cursors: &[String],
        count: usize,
    ) -> impl Future<Output = Result<ScanPage>> + Send {
        ApiClient::scan_keys(self, env, pattern, cursors, count)
    }

    fn key_details(&self, env: &str, key: &str) -> impl Future<Output = Result<KeyDetails>> + Send {
        ApiClient::key_details(self, env, key)
    }

    fn key_count(&self, env: &str) -> impl Future<Output = Result<KeyCount>> + Send {
        ApiClient::key_count(self, env)
    }

    fn delete_key(
        &self,
        env: &str,
        key: &str,
    ) -> impl Future<Output = Result<DeleteResponse>> + Send {
        ApiClient::delete_key(self, env, key)
    }

    fn set_ttl(
        &self,
        env: &str,
        key: &str,
        seconds: i64,
    ) -> impl Future<Output = Result<()>> + Send {
        ApiClient::set_ttl(self, env, key, seconds)
    }

    fn rename_key(
        &self,
        env: &str,
        old_key: &str,
        new_key: &str,
    ) -> impl Future<Output = Result<()>> + Send {
        ApiClient::rename_key(self, env, old_key, new_key)
    }

    fn copy_key(&self, request: &CopyRequest) -> impl Future<Output = Result<()>> + Send {
        ApiClient::copy_key(self, request)
    }

    fn save_key(
        &self,
        env: &str,
        request: &SaveRequest,
    ) -> impl Future<Output = Result<()>> + Send {
        ApiClient::save_key(self, env, request)
    }

    fn add_sorted_set_members(
        &self,
        env: &str,
        key: &str,
        request: &ZaddRequest,
    ) -> impl Future<Output = Result<()>> + Send {
        ApiClient::add_sorted_set_members(self, env, key, request)
    }
}
