mod dirs;
mod settings;
mod validation;

pub use dirs::Directories;
pub use settings::{
    Config, ConnectionConfig, EnvironmentConfig, HistoryConfig, SearchConfig, StatsConfig,
};
pub use validation::warn_unknown_fields;
