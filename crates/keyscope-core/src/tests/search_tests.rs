//! Tests for the key browser: classification, pagination, cancellation and
//! exact lookups

use std::sync::Arc;
use std::time::Duration;

use keyscope_types::{KeysSelected, Toast, ToastLevel, events};
use serde_json::json;

use super::fixtures::{Call, MockBackend, Recorder, strings};
use crate::bus::EventBus;
use crate::history::SearchHistory;
use crate::search::{BrowserUpdate, KeyBrowser, Query};
use crate::Error;

fn browser(backend: &Arc<MockBackend>, bus: &EventBus) -> KeyBrowser<MockBackend> {
    KeyBrowser::new(
        Arc::clone(backend),
        "dev",
        bus.clone(),
        SearchHistory::in_memory(),
    )
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_classify_exact_and_scan() {
    assert!(Query::classify("user:42").is_exact());
    assert!(!Query::classify("user:*").is_exact());
    assert_eq!(
        Query::classify(""),
        Query::Scan {
            pattern: "*".to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_empty_pattern_scans_everything() {
    let backend = MockBackend::new();
    backend.page("*", &["a"], &["0"], false);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("");
    browser.trigger_search();
    browser.settle().await;

    assert_eq!(browser.keys(), ["a"]);
    assert_eq!(
        backend.calls(),
        vec![Call::Scan {
            env: "dev".to_string(),
            pattern: "*".to_string(),
            cursors: Vec::new(),
            count: 100,
        }]
    );
    assert!(browser.history().is_empty(), "blank input is not recorded");
}

#[tokio::test(start_paused = true)]
async fn test_set_pattern_does_not_search() {
    let backend = MockBackend::new();
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("user:*");

    assert_eq!(browser.input(), "user:*");
    assert!(!browser.is_loading());
    assert!(backend.calls().is_empty());
    assert!(browser.next_update().await.is_none());
}

// ============================================================================
// Pagination
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scan_then_load_more_until_exhausted() {
    let backend = MockBackend::new();
    backend.page("*", &["a", "b"], &["12"], true);
    backend.page("*", &["c"], &["0"], true);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("*");
    browser.trigger_search();
    let update = browser.settle().await;

    assert_eq!(
        update,
        Some(BrowserUpdate::Results {
            added: 2,
            loaded: 2,
            has_more: true
        })
    );
    assert_eq!(browser.session().cursors(), ["12"]);
    assert!(browser.can_load_more());

    browser.load_more().unwrap();
    let update = browser.settle().await;

    assert_eq!(
        update,
        Some(BrowserUpdate::Results {
            added: 1,
            loaded: 3,
            has_more: false
        })
    );
    assert_eq!(browser.keys(), ["a", "b", "c"]);
    assert_eq!(browser.session().cursors(), ["0"]);
    assert!(!browser.can_load_more());
    assert!(matches!(browser.load_more(), Err(Error::NoMoreResults)));

    let scans = backend.scan_calls();
    assert_eq!(scans.len(), 2);
    assert!(matches!(&scans[1], Call::Scan { cursors, .. } if *cursors == strings(&["12"])));
}

#[tokio::test(start_paused = true)]
async fn test_fresh_search_clears_accumulated_keys() {
    let backend = MockBackend::new();
    backend.page("a*", &["a1", "a2"], &["4"], true);
    backend.page("a*", &["a3"], &["0"], false);
    backend.page("b*", &["b1"], &["0"], false);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("a*");
    browser.trigger_search();
    browser.settle().await;
    browser.load_more().unwrap();
    browser.settle().await;
    assert_eq!(browser.keys().len(), 3);

    browser.set_pattern("b*");
    browser.trigger_search();
    assert!(browser.keys().is_empty(), "results reset on commit");
    browser.settle().await;

    assert_eq!(browser.keys(), ["b1"]);
    assert!(matches!(
        backend.scan_calls().last(),
        Some(Call::Scan { cursors, .. }) if cursors.is_empty()
    ));
}

#[tokio::test(start_paused = true)]
async fn test_multi_shard_has_more_until_all_cursors_terminal() {
    let backend = MockBackend::new();
    backend.page("*", &["a"], &["0", "9"], true);
    backend.page("*", &["b"], &["0", "0"], true);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.show_all();
    browser.settle().await;
    assert!(browser.has_more());

    browser.load_more().unwrap();
    browser.settle().await;
    assert!(!browser.has_more());
}

#[tokio::test(start_paused = true)]
async fn test_load_more_rejected_while_in_flight() {
    let backend = MockBackend::new();
    backend.page_after(Duration::from_millis(50), "*", &["a"], &["3"], true);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.show_all();
    assert!(browser.is_loading());
    assert!(matches!(browser.load_more(), Err(Error::SearchInFlight)));

    browser.settle().await;
    assert!(browser.load_more().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_load_more_before_any_search() {
    let backend = MockBackend::new();
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    assert!(matches!(browser.load_more(), Err(Error::NoMoreResults)));
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_page_size_is_sent_as_count() {
    let backend = MockBackend::new();
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus).with_page_size(25);

    browser.show_all();
    browser.settle().await;

    assert!(matches!(
        backend.scan_calls().first(),
        Some(Call::Scan { count: 25, .. })
    ));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_newer_search_wins_over_slow_predecessor() {
    let backend = MockBackend::new();
    backend.page_after(Duration::from_secs(5), "a*", &["stale"], &["0"], false);
    backend.page_after(Duration::from_millis(10), "b*", &["fresh"], &["0"], false);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("a*");
    browser.trigger_search();
    browser.set_pattern("b*");
    browser.trigger_search();
    browser.settle().await;

    assert_eq!(browser.keys(), ["fresh"]);
    assert_eq!(browser.session().pattern(), "b*");

    // the cancelled request never reports back, even after its delay passes
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(browser.next_update().await.is_none());
    assert_eq!(browser.keys(), ["fresh"]);
}

#[tokio::test(start_paused = true)]
async fn test_lookup_superseded_by_scan_emits_nothing() {
    let backend = MockBackend::new();
    backend.key_after(Duration::from_secs(1), "user:1", json!("x"));
    backend.page("user:*", &["user:1", "user:2"], &["0"], false);
    let bus = EventBus::new();
    let selected = Recorder::on(&bus, events::KEYS_SELECTED);
    let toasts = Recorder::on(&bus, events::TOAST_SHOW);
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("user:1");
    browser.trigger_search();
    browser.set_pattern("user:*");
    browser.trigger_search();
    browser.settle().await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(browser.keys(), ["user:1", "user:2"]);
    assert_eq!(selected.len(), 0);
    assert_eq!(toasts.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_resolved_but_unapplied_result_is_discarded() {
    let backend = MockBackend::new();
    backend.page("a*", &["stale"], &["0"], false);
    backend.page_after(Duration::from_millis(50), "b*", &["fresh"], &["0"], false);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("a*");
    browser.trigger_search();
    // a* resolves and waits in the channel before b* is issued
    tokio::time::sleep(Duration::from_millis(10)).await;
    browser.set_pattern("b*");
    browser.trigger_search();

    assert_eq!(browser.next_update().await, Some(BrowserUpdate::Discarded));
    assert!(browser.keys().is_empty());

    let update = browser.settle().await;
    assert_eq!(
        update,
        Some(BrowserUpdate::Results {
            added: 1,
            loaded: 1,
            has_more: false
        })
    );
    assert_eq!(browser.keys(), ["fresh"]);
}

#[tokio::test(start_paused = true)]
async fn test_resolved_lookup_superseded_by_scan_emits_nothing() {
    let backend = MockBackend::new();
    backend.key("user:1", json!("x"));
    backend.page_after(
        Duration::from_millis(50),
        "user:*",
        &["user:1", "user:2"],
        &["0"],
        false,
    );
    let bus = EventBus::new();
    let selected = Recorder::on(&bus, events::KEYS_SELECTED);
    let toasts = Recorder::on(&bus, events::TOAST_SHOW);
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("user:1");
    browser.trigger_search();
    tokio::time::sleep(Duration::from_millis(10)).await;
    browser.set_pattern("user:*");
    browser.trigger_search();
    browser.settle().await;

    assert_eq!(browser.keys(), ["user:1", "user:2"]);
    assert!(browser.session().details().is_none());
    assert_eq!(selected.len(), 0);
    assert_eq!(toasts.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_scan_task_fails_instead_of_hanging() {
    let backend = MockBackend::new();
    backend.scan_panic("boom*");
    backend.page("ok*", &["k"], &["0"], false);
    let bus = EventBus::new();
    let toasts = Recorder::on(&bus, events::TOAST_SHOW);
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("boom*");
    browser.trigger_search();
    let update = browser.settle().await;

    assert!(matches!(update, Some(BrowserUpdate::Failed { .. })));
    assert!(!browser.is_loading());
    assert!(matches!(browser.load_more(), Err(Error::NoMoreResults)));
    assert_eq!(
        toasts.payloads::<Toast>(),
        vec![Toast::error("Error loading keys")]
    );

    browser.set_pattern("ok*");
    browser.trigger_search();
    browser.settle().await;
    assert_eq!(browser.keys(), ["k"]);
}

#[tokio::test(start_paused = true)]
async fn test_switch_environment_drops_in_flight_request() {
    let backend = MockBackend::new();
    backend.page_after(Duration::from_secs(1), "*", &["dev-key"], &["0"], false);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("user:*");
    browser.history_mut().record("older");
    browser.show_all();
    let mut browser = browser.switch_environment("prod");

    assert_eq!(browser.env(), "prod");
    assert!(!browser.is_loading());
    assert!(browser.keys().is_empty());
    assert_eq!(browser.history().entries(), ["*", "older"]);
    assert_eq!(browser.input(), "*");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(browser.next_update().await.is_none());
}

// ============================================================================
// Exact lookup
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_exact_lookup_selects_key() {
    let backend = MockBackend::new();
    backend.key("user:42", json!("alice"));
    let bus = EventBus::new();
    let selected = Recorder::on(&bus, events::KEYS_SELECTED);
    let mut browser = browser(&backend, &bus);

    browser.set_pattern("user:42");
    browser.trigger_search();
    let update = browser.settle().await;

    assert!(matches!(update, Some(BrowserUpdate::Found { ref key, .. }) if key == "user:42"));
    assert_eq!(browser.keys(), ["user:42"]);
    assert_eq!(
        browser.session().details().map(|d| d.value.clone()),
        Some(json!("alice"))
    );
    assert_eq!(
        selected.payloads::<KeysSelected>(),
        vec![KeysSelected {
            keys: strings(&["user:42"])
        }]
    );
    assert_eq!(selected.events()[0].source, "key-search");
    assert!(backend.scan_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_missing_key_clears_results_and_warns() {
    let backend = MockBackend::new();
    backend.page("*", &["a", "b"], &["7"], true);
    let bus = EventBus::new();
    let selected = Recorder::on(&bus, events::KEYS_SELECTED);
    let toasts = Recorder::on(&bus, events::TOAST_SHOW);
    let mut browser = browser(&backend, &bus);

    browser.show_all();
    browser.settle().await;
    let scans_before = backend.scan_calls().len();

    browser.set_pattern("nonexistent");
    browser.trigger_search();
    let update = browser.settle().await;

    assert_eq!(
        update,
        Some(BrowserUpdate::NotFound {
            key: "nonexistent".to_string()
        })
    );
    assert!(browser.keys().is_empty());
    assert_eq!(
        selected.payloads::<KeysSelected>(),
        vec![KeysSelected { keys: Vec::new() }]
    );
    assert_eq!(
        toasts.payloads::<Toast>(),
        vec![Toast::new(ToastLevel::Warning, "Key not found")]
    );

    // pagination is unavailable and no scan was issued
    assert!(!browser.has_more());
    assert!(browser.session().cursors().is_empty());
    assert!(matches!(browser.load_more(), Err(Error::ExactLookupActive)));
    assert_eq!(backend.scan_calls().len(), scans_before);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_scan_failure_toasts_once() {
    let backend = MockBackend::new();
    backend.page("*", &["a"], &["5"], true);
    backend.scan_error("*", 500, "backend down");
    let bus = EventBus::new();
    let toasts = Recorder::on(&bus, events::TOAST_SHOW);
    let mut browser = browser(&backend, &bus);

    browser.show_all();
    browser.settle().await;
    browser.load_more().unwrap();
    let update = browser.settle().await;

    assert!(matches!(update, Some(BrowserUpdate::Failed { ref message }) if message.contains("backend down")));
    assert_eq!(browser.keys(), ["a"], "loaded keys survive a failed page");
    assert_eq!(
        toasts.payloads::<Toast>(),
        vec![Toast::error("Error loading keys")]
    );
    assert!(!browser.is_loading());
}

// ============================================================================
// History integration
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_trigger_records_history() {
    let backend = MockBackend::new();
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    for pattern in ["a*", "b*", "a*"] {
        browser.set_pattern(pattern);
        browser.trigger_search();
        browser.settle().await;
    }

    assert_eq!(browser.history().entries(), ["a*", "b*"]);
}

#[tokio::test(start_paused = true)]
async fn test_history_select_promotes_and_searches() {
    let backend = MockBackend::new();
    backend.page("old:*", &["old:1"], &["0"], false);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);
    browser.history_mut().record("old:*");
    browser.history_mut().record("new:*");

    browser.handle_history_select("old:*");
    browser.settle().await;

    assert_eq!(browser.history().entries(), ["old:*", "new:*"]);
    assert_eq!(browser.input(), "old:*");
    assert_eq!(browser.keys(), ["old:1"]);
}

#[tokio::test(start_paused = true)]
async fn test_forget_keys_after_delete() {
    let backend = MockBackend::new();
    backend.page("*", &["a", "b", "c"], &["0"], false);
    let bus = EventBus::new();
    let mut browser = browser(&backend, &bus);

    browser.show_all();
    browser.settle().await;

    assert_eq!(browser.forget_keys(&strings(&["b", "zzz"])), 1);
    assert_eq!(browser.keys(), ["a", "c"]);
}
