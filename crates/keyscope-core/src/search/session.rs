use keyscope_types::{KeyDetails, MATCH_ALL, ScanPage, has_wildcard};

/// How a committed pattern is executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Cursor-paginated pattern scan
    Scan { pattern: String },
    /// Direct lookup of one key
    Exact { key: String },
}

impl Query {
    /// Blank input scans everything; input without wildcard characters is an
    /// exact key name.
    #[must_use]
    pub fn classify(input: &str) -> Self {
        if input.trim().is_empty() {
            Self::Scan {
                pattern: MATCH_ALL.to_string(),
            }
        } else if has_wildcard(input) {
            Self::Scan {
                pattern: input.to_string(),
            }
        } else {
            Self::Exact {
                key: input.to_string(),
            }
        }
    }

    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact { .. })
    }
}

/// State of the last committed search. Recreated with the browser on
/// environment switch.
#[derive(Debug, Clone, Default)]
pub struct SearchSession {
    pattern: String,
    query: Option<Query>,
    cursors: Vec<String>,
    keys: Vec<String>,
    has_more: bool,
    total: Option<String>,
    details: Option<KeyDetails>,
}

impl SearchSession {
    /// Commit `pattern`: forget previous results and pagination.
    pub(crate) fn begin(&mut self, pattern: String, query: Query) {
        *self = Self {
            pattern,
            query: Some(query),
            ..Self::default()
        };
    }

    /// Apply a scan page. Cursors and `has_more` always follow the latest page.
    pub(crate) fn apply_page(&mut self, page: ScanPage, append: bool) -> usize {
        let exhausted = page.is_exhausted();
        let added = page.keys.len();
        if append {
            self.keys.extend(page.keys);
        } else {
            self.keys = page.keys;
        }
        self.cursors = page.cursors;
        self.has_more = !exhausted;
        if page.total.is_some() {
            self.total = page.total;
        }
        added
    }

    /// Exact lookup hit: the result set is the looked-up key alone.
    pub(crate) fn found(&mut self, key: String, details: KeyDetails) {
        self.keys = vec![key];
        self.details = Some(details);
    }

    pub(crate) fn not_found(&mut self) {
        self.keys.clear();
        self.details = None;
    }

    pub(crate) fn forget(&mut self, keys: &[String]) -> usize {
        let before = self.keys.len();
        self.keys.retain(|k| !keys.contains(k));
        if self
            .details
            .as_ref()
            .is_some_and(|d| keys.contains(&d.key))
        {
            self.details = None;
        }
        before - self.keys.len()
    }

    /// Raw committed input
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    #[must_use]
    pub fn is_exact_lookup(&self) -> bool {
        self.query.as_ref().is_some_and(Query::is_exact)
    }

    #[must_use]
    pub fn cursors(&self) -> &[String] {
        &self.cursors
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    #[must_use]
    pub fn total(&self) -> Option<&str> {
        self.total.as_deref()
    }

    #[must_use]
    pub fn details(&self) -> Option<&KeyDetails> {
        self.details.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(keys: &[&str], cursors: &[&str], has_more: bool) -> ScanPage {
        ScanPage {
            keys: keys.iter().map(ToString::to_string).collect(),
            cursors: cursors.iter().map(ToString::to_string).collect(),
            has_more,
            total: None,
        }
    }

    #[test]
    fn test_classify() {
        assert!(Query::classify("user:42").is_exact());
        assert_eq!(
            Query::classify("user:*"),
            Query::Scan {
                pattern: "user:*".to_string()
            }
        );
        assert_eq!(
            Query::classify("   "),
            Query::Scan {
                pattern: "*".to_string()
            }
        );
        assert!(!Query::classify("user:?").is_exact());
        assert!(!Query::classify("user:[ab]").is_exact());
    }

    #[test]
    fn test_apply_page_replaces_then_appends() {
        let mut session = SearchSession::default();
        session.begin("*".to_string(), Query::classify("*"));

        session.apply_page(page(&["a", "b"], &["12"], true), false);
        assert_eq!(session.keys(), ["a", "b"]);
        assert!(session.has_more());

        session.apply_page(page(&["c"], &["0"], true), true);
        assert_eq!(session.keys(), ["a", "b", "c"]);
        assert_eq!(session.cursors(), ["0"]);
        assert!(!session.has_more());
    }

    #[test]
    fn test_has_more_requires_live_cursor() {
        let mut session = SearchSession::default();
        session.apply_page(page(&["a"], &["0", "0"], true), false);
        assert!(!session.has_more());

        session.apply_page(page(&["a"], &["0", "7"], true), false);
        assert!(session.has_more());

        session.apply_page(page(&["a"], &[], true), false);
        assert!(!session.has_more());

        session.apply_page(page(&["a"], &["7"], false), false);
        assert!(!session.has_more());
    }

    #[test]
    fn test_begin_resets_state() {
        let mut session = SearchSession::default();
        session.apply_page(page(&["a"], &["5"], true), false);
        session.begin("b*".to_string(), Query::classify("b*"));
        assert!(session.keys().is_empty());
        assert!(session.cursors().is_empty());
        assert!(!session.has_more());
        assert_eq!(session.pattern(), "b*");
    }

    #[test]
    fn test_forget_drops_keys_and_details() {
        let mut session = SearchSession::default();
        session.found("k".to_string(), KeyDetails {
            key: "k".to_string(),
            key_type: keyscope_types::KeyType::String,
            value: serde_json::Value::Null,
            ttl: -1,
        });
        assert_eq!(session.forget(&["k".to_string()]), 1);
        assert!(session.keys().is_empty());
        assert!(session.details().is_none());
    }
}
