//! HTTP client for the keyscope REST backend.
//!
//! This crate is the only place that speaks HTTP. It provides:
//!
//! - [`client`]: `ApiClient`, one async method per backend endpoint
//! - [`error`]: `ClientError`, the normalized failure type
//!
//! # Example
//!
//! ```no_run
//! use keyscope_client::ApiClient;
//!
//! # async fn example() -> Result<(), keyscope_client::ClientError> {
//! let client = ApiClient::new("http://127.0.0.1:3000")?;
//! let page = client.scan_keys("dev", "user:*", &[], 100).await?;
//! println!("{} keys, more: {}", page.keys.len(), page.has_more);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{ApiClient, ApiClientBuilder, DEFAULT_BASE_URL};
pub use error::{ClientError, Result};
