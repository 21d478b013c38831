use keyscope_client::ClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Client(#[from] ClientError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("A search request is already in flight")]
    SearchInFlight,

    #[error("No more results to load")]
    NoMoreResults,

    #[error("Last search was an exact key lookup")]
    ExactLookupActive,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::Io(io_err);
        assert!(err.to_string().contains("IO error"));
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("TTL must be a whole number of seconds".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid input: TTL must be a whole number of seconds"
        );
    }

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Config error: missing field");
    }

    #[test]
    fn test_error_display_plugin_not_found() {
        let err = Error::PluginNotFound("activity-log".to_string());
        assert_eq!(err.to_string(), "Plugin not found: activity-log");
    }

    #[test]
    fn test_error_display_search_state() {
        assert_eq!(
            Error::SearchInFlight.to_string(),
            "A search request is already in flight"
        );
        assert_eq!(Error::NoMoreResults.to_string(), "No more results to load");
        assert_eq!(
            Error::ExactLookupActive.to_string(),
            "Last search was an exact key lookup"
        );
    }

    #[test]
    fn test_from_client_error() {
        let err: Error = ClientError::Rejected("READONLY".to_string()).into();
        assert!(matches!(err, Error::Client(_)));
        assert!(err.to_string().contains("READONLY"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("\"not a number\"").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
