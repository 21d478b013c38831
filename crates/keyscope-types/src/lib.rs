//! Shared types for keyscope components.
//!
//! This crate provides the wire types exchanged with the REST backend and the
//! event types carried on the plugin event bus. Everything here is plain data
//! and serializes with the backend's camelCase field names.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Cursor value meaning "not started" before a scan and "exhausted" after one.
pub const TERMINAL_CURSOR: &str = "0";

/// Glob that matches every key.
pub const MATCH_ALL: &str = "*";

/// Characters that turn a pattern into a glob.
pub const WILDCARD_CHARS: [char; 3] = ['*', '?', '['];

/// Event type names understood by the core. Plugins may emit their own.
pub mod events {
    pub const KEYS_SELECTED: &str = "keys:selected";
    pub const KEYS_DELETED: &str = "keys:deleted";
    pub const OPERATION_COMPLETED: &str = "operation:completed";
    pub const TOAST_SHOW: &str = "toast:show";

    /// Listeners registered under this type receive every event.
    pub const WILDCARD: &str = "*";
}

/// Deserialize a Vec that may be null or missing (both become empty vec)
fn deserialize_null_as_empty_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt: Option<Vec<T>> = Option::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// Deserialize a value the backend sends either as a string or as a number.
fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// True if the pattern is a glob rather than a literal key name.
#[must_use]
pub fn has_wildcard(pattern: &str) -> bool {
    pattern.contains(WILDCARD_CHARS)
}

// ============================================================================
// Backend responses
// ============================================================================

/// One page of a cursor-based pattern scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanPage {
    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub keys: Vec<String>,

    /// One continuation cursor per shard.
    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub cursors: Vec<String>,

    #[serde(default)]
    pub has_more: bool,

    /// Backend's estimate of the total key count, when it reports one.
    #[serde(
        default,
        deserialize_with = "deserialize_lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub total: Option<String>,
}

impl ScanPage {
    /// A scan is exhausted when the backend says so or every shard cursor is
    /// back at the terminal value.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        !self.has_more || self.cursors.iter().all(|c| c == TERMINAL_CURSOR)
    }
}

/// Data type of a stored key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    String,
    Hash,
    List,
    Set,
    Zset,
    Stream,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Hash => "hash",
            Self::List => "list",
            Self::Set => "set",
            Self::Zset => "zset",
            Self::Stream => "stream",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

fn no_expiry() -> i64 {
    -1
}

/// Details of a single key as returned by the lookup endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDetails {
    pub key: String,

    #[serde(rename = "type", default)]
    pub key_type: KeyType,

    #[serde(default)]
    pub value: Value,

    /// Remaining time to live in seconds; `-1` means no expiry.
    #[serde(default = "no_expiry")]
    pub ttl: i64,
}

impl KeyDetails {
    #[must_use]
    pub fn expires(&self) -> bool {
        self.ttl >= 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCount {
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub deleted_count: u64,
}

/// Generic `{ success }` acknowledgement. Failed responses sometimes carry a
/// reason under `error` or `message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SuccessResponse {
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlRequest {
    pub key: String,
    /// `-1` clears the expiry.
    pub seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub old_key: String,
    pub new_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRequest {
    pub source_key: String,
    pub target_key: String,
    pub source_env: String,
    pub target_env: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub key: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedSetMember {
    pub score: f64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZaddRequest {
    pub members: Vec<SortedSetMember>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
}

// ============================================================================
// Event bus
// ============================================================================

/// Message carried on the plugin event bus. Delivery is best-effort with no
/// acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub source: String,
}

impl PluginEvent {
    pub fn new(event_type: impl Into<String>, payload: Value, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            source: source.into(),
        }
    }

    /// Build an event from a typed payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized to JSON.
    pub fn typed<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
        source: impl Into<String>,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(event_type, serde_json::to_value(payload)?, source))
    }

    /// Decode the payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    #[must_use]
    pub fn is(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

/// Payload of `keys:selected`. An empty list clears the selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysSelected {
    pub keys: Vec<String>,
}

/// Payload of `keys:deleted`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysDeleted {
    pub keys: Vec<String>,
    pub env: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Delete,
    SetTtl,
    Rename,
    Copy,
    Save,
    AddMembers,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Delete => "delete",
            Self::SetTtl => "set_ttl",
            Self::Rename => "rename",
            Self::Copy => "copy",
            Self::Save => "save",
            Self::AddMembers => "add_members",
        };
        f.write_str(name)
    }
}

/// Payload of `operation:completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationCompleted {
    pub operation: OperationKind,
    pub key: String,
    pub env: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    #[default]
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for ToastLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// Payload of `toast:show`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn new(level: ToastLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ToastLevel::Error, message)
    }
}

/// Custom action a plugin contributes to the details panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelButton {
    pub label: String,
    /// Event type emitted when the button is pressed.
    pub action: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_page_parses_backend_shape() {
        let page: ScanPage = serde_json::from_value(json!({
            "keys": ["a", "b"],
            "cursors": ["12", "0"],
            "hasMore": true,
            "total": "1042"
        }))
        .unwrap();

        assert_eq!(page.keys, vec!["a", "b"]);
        assert_eq!(page.cursors, vec!["12", "0"]);
        assert!(page.has_more);
        assert_eq!(page.total.as_deref(), Some("1042"));
        assert!(!page.is_exhausted());
    }

    #[test]
    fn test_scan_page_accepts_numeric_total_and_null_lists() {
        let page: ScanPage = serde_json::from_value(json!({
            "keys": null,
            "cursors": null,
            "hasMore": false,
            "total": 7
        }))
        .unwrap();

        assert!(page.keys.is_empty());
        assert!(page.cursors.is_empty());
        assert_eq!(page.total.as_deref(), Some("7"));
    }

    #[test]
    fn test_scan_page_terminal_cursors_are_exhausted() {
        let page = ScanPage {
            keys: vec!["c".to_string()],
            cursors: vec!["0".to_string(), "0".to_string()],
            has_more: true,
            total: None,
        };
        assert!(page.is_exhausted());
    }

    #[test]
    fn test_scan_page_without_cursors_is_exhausted() {
        let page = ScanPage {
            has_more: true,
            ..ScanPage::default()
        };
        assert!(page.is_exhausted());
    }

    #[test]
    fn test_has_wildcard() {
        assert!(has_wildcard("user:*"));
        assert!(has_wildcard("user:?"));
        assert!(has_wildcard("user:[ab]"));
        assert!(!has_wildcard("user:42"));
        assert!(!has_wildcard(""));
    }

    #[test]
    fn test_key_details_defaults() {
        let details: KeyDetails = serde_json::from_value(json!({"key": "k"})).unwrap();
        assert_eq!(details.key_type, KeyType::Unknown);
        assert_eq!(details.ttl, -1);
        assert!(!details.expires());
        assert_eq!(details.value, Value::Null);
    }

    #[test]
    fn test_key_details_unknown_type_tolerated() {
        let details: KeyDetails =
            serde_json::from_value(json!({"key": "k", "type": "ReJSON-RL", "ttl": 30})).unwrap();
        assert_eq!(details.key_type, KeyType::Unknown);
        assert!(details.expires());
    }

    #[test]
    fn test_request_bodies_use_backend_field_names() {
        let rename = serde_json::to_value(RenameRequest {
            old_key: "a".to_string(),
            new_key: "b".to_string(),
        })
        .unwrap();
        assert_eq!(rename, json!({"oldKey": "a", "newKey": "b"}));

        let copy = serde_json::to_value(CopyRequest {
            source_key: "a".to_string(),
            target_key: "b".to_string(),
            source_env: "dev".to_string(),
            target_env: "prod".to_string(),
        })
        .unwrap();
        assert_eq!(
            copy,
            json!({"sourceKey": "a", "targetKey": "b", "sourceEnv": "dev", "targetEnv": "prod"})
        );

        let save = serde_json::to_value(SaveRequest {
            key: "k".to_string(),
            value: json!("v"),
            expiry: None,
        })
        .unwrap();
        assert_eq!(save, json!({"key": "k", "value": "v"}));
    }

    #[test]
    fn test_plugin_event_wire_shape() {
        let event = PluginEvent::typed(
            events::KEYS_SELECTED,
            &KeysSelected {
                keys: vec!["user:42".to_string()],
            },
            "key-search",
        )
        .unwrap();

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({"type": "keys:selected", "payload": {"keys": ["user:42"]}, "source": "key-search"})
        );

        let selected: KeysSelected = event.payload_as().unwrap();
        assert_eq!(selected.keys, vec!["user:42"]);
    }

    #[test]
    fn test_toast_serialization() {
        let value = serde_json::to_value(Toast::warning("Key not found")).unwrap();
        assert_eq!(value, json!({"level": "warning", "message": "Key not found"}));
    }

    #[test]
    fn test_success_response_reason() {
        let resp: SuccessResponse =
            serde_json::from_value(json!({"success": false, "message": "READONLY"})).unwrap();
        assert_eq!(resp.reason(), Some("READONLY"));
    }

    #[test]
    fn test_operation_kind_display_matches_serde() {
        for kind in [
            OperationKind::Delete,
            OperationKind::SetTtl,
            OperationKind::Rename,
            OperationKind::Copy,
            OperationKind::Save,
            OperationKind::AddMembers,
        ] {
            let value = serde_json::to_value(kind).unwrap();
            assert_eq!(value, Value::String(kind.to_string()));
        }
    }
}
