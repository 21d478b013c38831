//! HTTP client for the keyscope REST backend.
//!
//! Wraps `reqwest` with one method per backend endpoint. Response bodies are
//! decoded with `serde_json`, non-2xx responses and `{ success: false }`
//! acknowledgements are turned into [`ClientError`].

use std::time::Duration;

use keyscope_types::{
    CopyRequest, DeleteRequest, DeleteResponse, KeyCount, KeyDetails, RenameRequest, SaveRequest,
    ScanPage, SuccessResponse, TtlRequest, ZaddRequest,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Default backend address used when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

const JSON_CONTENT_TYPE: &str = "application/json";

/// Client for the key browser REST API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

/// Builder for creating an `ApiClient`
#[derive(Debug, Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl ApiClientBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backend address (defaults to [`DEFAULT_BASE_URL`])
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set a request timeout. Without one, the transport default applies.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the `ApiClient`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::InvalidUrl` if the base URL cannot be parsed or
    /// cannot carry a path, and `ClientError::Http` if the transport fails to
    /// initialize.
    pub fn build(self) -> Result<ApiClient> {
        let raw = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&raw).map_err(|e| ClientError::InvalidUrl(format!("{raw}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(raw));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(ApiClient {
            http: builder.build()?,
            base_url,
        })
    }
}

impl ApiClient {
    /// Create a client for the given backend address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is not a valid base URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        ApiClientBuilder::new().base_url(base_url).build()
    }

    #[must_use]
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from path segments. Each segment is
    /// percent-encoded, so keys containing `/` stay a single segment.
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// URL of one scan page request.
    pub(crate) fn scan_url(
        &self,
        env: &str,
        pattern: &str,
        cursors: &[String],
        count: usize,
    ) -> Result<Url> {
        let mut url = self.endpoint(&["api", "keys"])?;
        url.query_pairs_mut()
            .append_pair("pattern", pattern)
            .append_pair("cursors", &serde_json::to_string(cursors)?)
            .append_pair("count", &count.to_string())
            .append_pair("env", env);
        Ok(url)
    }

    /// Fetch one page of keys matching `pattern`, resuming from `cursors`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status or a malformed body.
    pub async fn scan_keys(
        &self,
        env: &str,
        pattern: &str,
        cursors: &[String],
        count: usize,
    ) -> Result<ScanPage> {
        let url = self.scan_url(env, pattern, cursors, count)?;
        self.send(Method::GET, url, None::<&()>).await
    }

    /// Fetch a single key's type, value and TTL.
    ///
    /// # Errors
    ///
    /// Any non-2xx answer is an error; callers treat it as "not found".
    pub async fn key_details(&self, env: &str, key: &str) -> Result<KeyDetails> {
        let mut url = self.endpoint(&["api", "keys", key])?;
        url.query_pairs_mut().append_pair("env", env);
        self.send(Method::GET, url, None::<&()>).await
    }

    /// # Errors
    ///
    /// Returns an error on transport failure, non-2xx status or a malformed body.
    pub async fn key_count(&self, env: &str) -> Result<KeyCount> {
        let url = self.endpoint(&["api", "keys", "count", env])?;
        self.send(Method::GET, url, None::<&()>).await
    }

    /// # Errors
    ///
    /// Returns `ClientError::Rejected` if the backend reports `success: false`.
    pub async fn delete_key(&self, env: &str, key: &str) -> Result<DeleteResponse> {
        let url = self.endpoint(&["api", "keys", "delete", env])?;
        let body = DeleteRequest {
            key: key.to_string(),
        };
        let response: DeleteResponse = self.send(Method::DELETE, url, Some(&body)).await?;
        if !response.success {
            return Err(ClientError::Rejected(format!("delete of '{key}' failed")));
        }
        Ok(response)
    }

    /// Set or clear (`seconds = -1`) a key's expiry.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` if the backend reports `success: false`.
    pub async fn set_ttl(&self, env: &str, key: &str, seconds: i64) -> Result<()> {
        let url = self.endpoint(&["api", "keys", "ttl", env])?;
        let body = TtlRequest {
            key: key.to_string(),
            seconds,
        };
        self.acknowledge(Method::POST, url, &body).await
    }

    /// # Errors
    ///
    /// Returns `ClientError::Rejected` if the backend reports `success: false`.
    pub async fn rename_key(&self, env: &str, old_key: &str, new_key: &str) -> Result<()> {
        let url = self.endpoint(&["api", "keys", "rename", env])?;
        let body = RenameRequest {
            old_key: old_key.to_string(),
            new_key: new_key.to_string(),
        };
        self.acknowledge(Method::POST, url, &body).await
    }

    /// Copy a key, possibly across environments.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` if the backend reports `success: false`.
    pub async fn copy_key(&self, request: &CopyRequest) -> Result<()> {
        let url = self.endpoint(&["api", "keys", "copy"])?;
        self.acknowledge(Method::POST, url, request).await
    }

    /// Create or overwrite a key.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Rejected` if the backend reports `success: false`.
    pub async fn save_key(&self, env: &str, request: &SaveRequest) -> Result<()> {
        let url = self.endpoint(&["api", "keys", "save", env])?;
        self.acknowledge(Method::POST, url, request).await
    }

    /// # Errors
    ///
    /// Returns `ClientError::Rejected` if the backend reports `success: false`.
    pub async fn add_sorted_set_members(
        &self,
        env: &str,
        key: &str,
        request: &ZaddRequest,
    ) -> Result<()> {
        let mut url = self.endpoint(&["api", "keys", key, "zadd"])?;
        url.query_pairs_mut().append_pair("env", env);
        self.acknowledge(Method::POST, url, request).await
    }

    async fn acknowledge<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<()> {
        let response: SuccessResponse = self.send(method, url, Some(body)).await?;
        if response.success {
            Ok(())
        } else {
            Err(ClientError::Rejected(
                response.reason().unwrap_or("operation failed").to_string(),
            ))
        }
    }

    async fn send<B, T>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(ACCEPT, JSON_CONTENT_TYPE);
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(serde_json::to_string(body)?);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let err = ClientError::status(status, &text);
            warn!("{} {} failed: {}", method, url.path(), err);
            return Err(err);
        }

        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base).unwrap()
    }

    #[test]
    fn test_default_base_url() {
        let client = ApiClient::builder().build().unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:3000/");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(matches!(
            ApiClient::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
        assert!(matches!(
            ApiClient::new("mailto:ops@example.com"),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let url = client("http://localhost:3000")
            .endpoint(&["api", "keys", "count", "prod"])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/keys/count/prod");
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = client("http://localhost:3000/console/")
            .endpoint(&["api", "keys"])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/console/api/keys");
    }

    #[test]
    fn test_endpoint_encodes_key_segment() {
        let url = client("http://localhost:3000")
            .endpoint(&["api", "keys", "session/abc def", "zadd"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/keys/session%2Fabc%20def/zadd"
        );
    }

    #[test]
    fn test_scan_url_serializes_cursor_list() {
        let url = client("http://localhost:3000")
            .scan_url("dev", "user:*", &["12".to_string(), "0".to_string()], 100)
            .unwrap();

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("pattern".to_string(), "user:*".to_string()),
                ("cursors".to_string(), r#"["12","0"]"#.to_string()),
                ("count".to_string(), "100".to_string()),
                ("env".to_string(), "dev".to_string()),
            ]
        );
    }

    #[test]
    fn test_scan_url_empty_cursors() {
        let url = client("http://localhost:3000")
            .scan_url("dev", "*", &[], 100)
            .unwrap();
        let cursors = url
            .query_pairs()
            .find(|(k, _)| k == "cursors")
            .map(|(_, v)| v.into_owned());
        assert_eq!(cursors.as_deref(), Some("[]"));
    }
}
