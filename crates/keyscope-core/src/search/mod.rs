//! Cursor-paginated key search with exact-key detection.

mod browser;
mod session;

pub use browser::{BrowserUpdate, DEFAULT_PAGE_SIZE, KeyBrowser, SEARCH_SOURCE};
pub use session::{Query, SearchSession};
