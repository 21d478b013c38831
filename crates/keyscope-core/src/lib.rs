//! Core engine for the keyscope console.
//!
//! - [`search`]: `KeyBrowser`, cancelable cursor-paginated scans and exact lookups
//! - [`history`]: bounded most-recently-used search history
//! - [`bus`]: synchronous event bus shared by the host and plugins
//! - [`plugin`]: plugin trait, host and built-in plugins
//! - [`ops`]: validated key mutations
//! - [`poller`]: periodic key-count refresh
//! - [`config`]: configuration file and directories

pub mod backend;
pub mod bus;
pub mod config;
pub mod history;
pub mod ops;
pub mod plugin;
pub mod poller;
pub mod search;

mod error;

#[cfg(test)]
mod tests;

pub use backend::KeyBackend;
pub use bus::{EventBus, Subscription};
pub use error::{Error, Result};
pub use history::{FileStorage, HistoryStorage, SearchHistory, SessionStorage};
pub use ops::{KeyOperations, OperationState};
pub use plugin::{Plugin, PluginContext, PluginHost, PluginView};
pub use poller::{CountPoller, CountReading};
pub use search::{BrowserUpdate, KeyBrowser};

pub use keyscope_types::*;
