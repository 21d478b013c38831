use crate::{Error, Result};
use keyscope_client::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Named environments (backend connections) the console can switch between
    #[serde(default = "default_environments")]
    pub environments: Vec<EnvironmentConfig>,

    #[serde(default = "default_environment")]
    pub default_environment: String,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub stats: StatsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            environments: default_environments(),
            default_environment: default_environment(),
            search: SearchConfig::default(),
            history: HistoryConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds; 0 leaves the transport default in place
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: 0,
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl EnvironmentConfig {
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    /// Keys requested per scan page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Keep search history across console sessions instead of per session
    #[serde(default)]
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsConfig {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
        }
    }
}

impl StatsConfig {
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_environment() -> String {
    "default".to_string()
}

fn default_environments() -> Vec<EnvironmentConfig> {
    vec![EnvironmentConfig {
        name: default_environment(),
        label: None,
    }]
}

fn default_page_size() -> usize {
    100
}

fn default_refresh_interval() -> u64 {
    30
}

impl Config {
    /// Load config from file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, contains invalid JSON, or
    /// fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        super::validation::warn_unknown_fields(&content, "config.json");
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde defaults cannot guard.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.search.page_size == 0 {
            return Err(Error::Config("search.pageSize must be at least 1".to_string()));
        }
        if self.stats.refresh_interval_secs == 0 {
            return Err(Error::Config(
                "stats.refreshIntervalSecs must be at least 1".to_string(),
            ));
        }
        if self.environments.iter().any(|e| e.name.trim().is_empty()) {
            return Err(Error::Config("environment names must not be empty".to_string()));
        }
        if !self.environments.is_empty() && self.environment(&self.default_environment).is_none()
        {
            return Err(Error::Config(format!(
                "defaultEnvironment '{}' is not listed in environments",
                self.default_environment
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn environment(&self, name: &str) -> Option<&EnvironmentConfig> {
        self.environments.iter().find(|e| e.name == name)
    }

    /// Pick the environment to use: the requested one if given, otherwise the
    /// configured default. An empty environment list accepts any name.
    ///
    /// # Errors
    ///
    /// Returns `Error::EnvironmentNotFound` for a name missing from a
    /// non-empty environment list.
    pub fn resolve_environment(&self, requested: Option<&str>) -> Result<String> {
        let name = requested.unwrap_or(&self.default_environment);
        if self.environments.is_empty() || self.environment(name).is_some() {
            Ok(name.to_string())
        } else {
            Err(Error::EnvironmentNotFound(name.to_string()))
        }
    }
}
