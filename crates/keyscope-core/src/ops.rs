//! Key mutations as explicit state transitions.
//!
//! Every operation validates its input before touching the network. Each
//! attempt ends in exactly one toast: success, validation error or backend
//! error. Successful operations also announce themselves on the bus.

use std::future::Future;
use std::sync::Arc;

use keyscope_types::{
    CopyRequest, KeyDetails, KeysDeleted, OperationCompleted, OperationKind, SaveRequest,
    SortedSetMember, Toast, ZaddRequest, events,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::KeyBackend;
use crate::bus::EventBus;
use crate::{Error, Result};

/// Source name stamped on events key operations emit
pub const OPERATIONS_SOURCE: &str = "key-operations";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OperationState {
    #[default]
    Idle,
    Pending(OperationKind),
    Succeeded(OperationKind),
    Failed {
        operation: OperationKind,
        message: String,
    },
}

/// Parse a TTL typed by the user: whole seconds, `-1` clears the expiry.
///
/// # Errors
///
/// Returns `Error::Validation` for non-numeric input or values below `-1`.
pub fn parse_ttl(input: &str) -> Result<i64> {
    let seconds: i64 = input
        .trim()
        .parse()
        .map_err(|_| Error::Validation(format!("TTL must be a whole number of seconds, got {input:?}")))?;
    if seconds < -1 {
        return Err(Error::Validation(
            "TTL must be -1 (no expiry) or zero or more seconds".to_string(),
        ));
    }
    Ok(seconds)
}

/// Parse a sorted-set member written as `score:value`.
///
/// # Errors
///
/// Returns `Error::Validation` if the separator is missing, the score is not
/// a finite number or the value is empty.
pub fn parse_member(input: &str) -> Result<SortedSetMember> {
    let (score, value) = input
        .split_once(':')
        .ok_or_else(|| Error::Validation(format!("Expected score:value, got {input:?}")))?;
    let score: f64 = score
        .trim()
        .parse()
        .ok()
        .filter(|s: &f64| s.is_finite())
        .ok_or_else(|| Error::Validation(format!("Score must be a number, got {score:?}")))?;
    if value.is_empty() {
        return Err(Error::Validation("Member value must not be empty".to_string()));
    }
    Ok(SortedSetMember {
        score,
        value: value.to_string(),
    })
}

/// Runs key mutations against one environment.
pub struct KeyOperations<B: KeyBackend> {
    backend: Arc<B>,
    env: String,
    bus: EventBus,
    state: OperationState,
}

impl<B: KeyBackend> std::fmt::Debug for KeyOperations<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyOperations")
            .field("env", &self.env)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<B: KeyBackend> KeyOperations<B> {
    pub fn new(backend: Arc<B>, env: impl Into<String>, bus: EventBus) -> Self {
        Self {
            backend,
            env: env.into(),
            bus,
            state: OperationState::Idle,
        }
    }

    #[must_use]
    pub fn state(&self) -> &OperationState {
        &self.state
    }

    #[must_use]
    pub fn env(&self) -> &str {
        &self.env
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn set_environment(&mut self, env: impl Into<String>) {
        self.env = env.into();
        self.state = OperationState::Idle;
    }

    /// # Errors
    ///
    /// Returns `Error::Validation` for an empty key, otherwise the backend error.
    pub async fn delete(&mut self, key: &str) -> Result<()> {
        let kind = OperationKind::Delete;
        self.require_key(kind, key)?;

        let backend = Arc::clone(&self.backend);
        let env = self.env.clone();
        let request = async { backend.delete_key(&env, key).await.map(|_| ()) };
        self.execute(kind, key, &env, request, format!("Deleted {key}"))
            .await?;

        self.bus.publish(
            events::KEYS_DELETED,
            &KeysDeleted {
                keys: vec![key.to_string()],
                env,
            },
            OPERATIONS_SOURCE,
        );
        Ok(())
    }

    /// Set a key's TTL from user input; see [`parse_ttl`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an empty key or invalid TTL, otherwise
    /// the backend error.
    pub async fn set_ttl(&mut self, key: &str, ttl: &str) -> Result<()> {
        let kind = OperationKind::SetTtl;
        self.require_key(kind, key)?;
        let seconds = parse_ttl(ttl).map_err(|e| self.reject(kind, e))?;

        let backend = Arc::clone(&self.backend);
        let env = self.env.clone();
        let message = if seconds == -1 {
            format!("Expiry removed from {key}")
        } else {
            format!("TTL of {key} set to {seconds}s")
        };
        self.execute(
            kind,
            key,
            &env,
            backend.set_ttl(&env, key, seconds),
            message,
        )
        .await
    }

    /// # Errors
    ///
    /// Returns `Error::Validation` for an empty or unchanged name, otherwise
    /// the backend error.
    pub async fn rename(&mut self, key: &str, new_key: &str) -> Result<()> {
        let kind = OperationKind::Rename;
        self.require_key(kind, key)?;
        if new_key.trim().is_empty() {
            return Err(self.reject(kind, Error::Validation("New key name is required".to_string())));
        }
        if new_key == key {
            return Err(self.reject(
                kind,
                Error::Validation("New key name must differ from the current one".to_string()),
            ));
        }

        let backend = Arc::clone(&self.backend);
        let env = self.env.clone();
        self.execute(
            kind,
            new_key,
            &env,
            backend.rename_key(&env, key, new_key),
            format!("Renamed {key} to {new_key}"),
        )
        .await
    }

    /// Copy `key` into `target_env`. A blank `target_key` keeps the name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an empty key or target environment, or
    /// when source and target are identical; otherwise the backend error.
    pub async fn copy_to(&mut self, key: &str, target_key: &str, target_env: &str) -> Result<()> {
        let kind = OperationKind::Copy;
        self.require_key(kind, key)?;
        if target_env.trim().is_empty() {
            return Err(self.reject(
                kind,
                Error::Validation("Target environment is required".to_string()),
            ));
        }
        let target_key = if target_key.trim().is_empty() {
            key
        } else {
            target_key
        };
        if target_env == self.env && target_key == key {
            return Err(self.reject(
                kind,
                Error::Validation("Source and target are the same key".to_string()),
            ));
        }

        let request = CopyRequest {
            source_key: key.to_string(),
            target_key: target_key.to_string(),
            source_env: self.env.clone(),
            target_env: target_env.to_string(),
        };
        let backend = Arc::clone(&self.backend);
        self.execute(
            kind,
            target_key,
            target_env,
            backend.copy_key(&request),
            format!("Copied {key} to {target_key} in {target_env}"),
        )
        .await
    }

    /// Create or overwrite a key. `expiry` is in seconds.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an empty key or non-positive expiry,
    /// otherwise the backend error.
    pub async fn save(&mut self, key: &str, value: Value, expiry: Option<i64>) -> Result<()> {
        let kind = OperationKind::Save;
        self.require_key(kind, key)?;
        self.require_expiry(kind, expiry)?;

        let request = SaveRequest {
            key: key.to_string(),
            value,
            expiry,
        };
        let backend = Arc::clone(&self.backend);
        let env = self.env.clone();
        self.execute(
            kind,
            key,
            &env,
            backend.save_key(&env, &request),
            format!("Saved {key}"),
        )
        .await
    }

    /// Add `score:value` members to a sorted set; see [`parse_member`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for an empty key, an empty member list or
    /// a malformed member, otherwise the backend error.
    pub async fn add_sorted_set_members<S: AsRef<str>>(
        &mut self,
        key: &str,
        members: &[S],
        expiry: Option<i64>,
    ) -> Result<()> {
        let kind = OperationKind::AddMembers;
        self.require_key(kind, key)?;
        if members.is_empty() {
            return Err(self.reject(
                kind,
                Error::Validation("At least one member is required".to_string()),
            ));
        }
        self.require_expiry(kind, expiry)?;
        let members = members
            .iter()
            .map(|m| parse_member(m.as_ref()))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| self.reject(kind, e))?;

        let count = members.len();
        let request = ZaddRequest { members, expiry };
        let backend = Arc::clone(&self.backend);
        let env = self.env.clone();
        self.execute(
            kind,
            key,
            &env,
            backend.add_sorted_set_members(&env, key, &request),
            format!("Added {count} member(s) to {key}"),
        )
        .await
    }

    /// # Errors
    ///
    /// Returns the backend error; callers treat any failure as "not found".
    pub async fn key_details(&self, key: &str) -> Result<KeyDetails> {
        Ok(self.backend.key_details(&self.env, key).await?)
    }

    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn count(&self) -> Result<u64> {
        Ok(self.backend.key_count(&self.env).await?.count)
    }

    fn require_key(&mut self, operation: OperationKind, key: &str) -> Result<()> {
        if key.trim().is_empty() {
            return Err(self.reject(operation, Error::Validation("Key name is required".to_string())));
        }
        Ok(())
    }

    fn require_expiry(&mut self, operation: OperationKind, expiry: Option<i64>) -> Result<()> {
        match expiry {
            Some(seconds) if seconds < 1 => Err(self.reject(
                operation,
                Error::Validation("Expiry must be at least one second".to_string()),
            )),
            _ => Ok(()),
        }
    }

    /// Record a validation failure: one error toast, no request.
    fn reject(&mut self, operation: OperationKind, error: Error) -> Error {
        let message = match &error {
            Error::Validation(message) => message.clone(),
            other => other.to_string(),
        };
        debug!("Rejected {operation}: {message}");
        self.bus
            .toast(OPERATIONS_SOURCE, &Toast::error(message.clone()));
        self.state = OperationState::Failed { operation, message };
        error
    }

    async fn execute(
        &mut self,
        operation: OperationKind,
        key: &str,
        env: &str,
        request: impl Future<Output = keyscope_client::Result<()>>,
        success: String,
    ) -> Result<()> {
        self.state = OperationState::Pending(operation);
        debug!("Running {operation} on {key:?} in {env}");

        match request.await {
            Ok(()) => {
                info!("{success}");
                self.state = OperationState::Succeeded(operation);
                self.bus.publish(
                    events::OPERATION_COMPLETED,
                    &OperationCompleted {
                        operation,
                        key: key.to_string(),
                        env: env.to_string(),
                    },
                    OPERATIONS_SOURCE,
                );
                self.bus.toast(OPERATIONS_SOURCE, &Toast::success(success));
                Ok(())
            }
            Err(e) => {
                warn!("{operation} on {key:?} failed: {e}");
                let message = format!("Failed to {}: {e}", describe(operation));
                self.bus
                    .toast(OPERATIONS_SOURCE, &Toast::error(message.clone()));
                self.state = OperationState::Failed { operation, message };
                Err(e.into())
            }
        }
    }
}

fn describe(operation: OperationKind) -> &'static str {
    match operation {
        OperationKind::Delete => "delete key",
        OperationKind::SetTtl => "update TTL",
        OperationKind::Rename => "rename key",
        OperationKind::Copy => "copy key",
        OperationKind::Save => "save key",
        OperationKind::AddMembers => "add members",
    }
}
