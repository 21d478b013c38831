//! Plugins shipped with the console.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use keyscope_types::{
    KeysDeleted, KeysSelected, OperationCompleted, PanelButton, Toast, events,
};
use tracing::warn;

use super::{Plugin, PluginContext, PluginView};

const TOAST_LOG_CAPACITY: usize = 50;
const ACTIVITY_LOG_CAPACITY: usize = 100;
const RENDERED_LINES: usize = 10;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Collects `toast:show` events for display.
#[derive(Debug, Default, Clone)]
pub struct ToastLog {
    toasts: Arc<Mutex<VecDeque<Toast>>>,
}

impl ToastLog {
    pub const ID: &'static str = "toast-log";
    pub const CLEAR_ACTION: &'static str = "toast-log:clear";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Received toasts, oldest first. The handle stays valid after the
    /// plugin is boxed into a host.
    #[must_use]
    pub fn toasts(&self) -> Vec<Toast> {
        lock(&self.toasts).iter().cloned().collect()
    }
}

impl Plugin for ToastLog {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Notifications"
    }

    fn priority(&self) -> i32 {
        10
    }

    fn panel_button(&self) -> Option<PanelButton> {
        Some(PanelButton {
            label: "Clear notifications".to_string(),
            action: Self::CLEAR_ACTION.to_string(),
        })
    }

    fn mount(&mut self, ctx: &PluginContext) -> anyhow::Result<()> {
        let toasts = Arc::clone(&self.toasts);
        ctx.bus().on(events::TOAST_SHOW, move |event| {
            match event.payload_as::<Toast>() {
                Ok(toast) => {
                    let mut toasts = lock(&toasts);
                    if toasts.len() == TOAST_LOG_CAPACITY {
                        toasts.pop_front();
                    }
                    toasts.push_back(toast);
                }
                Err(e) => warn!("Ignoring malformed toast from {}: {e}", event.source),
            }
        });

        let toasts = Arc::clone(&self.toasts);
        ctx.bus().on(Self::CLEAR_ACTION, move |_| lock(&toasts).clear());
        Ok(())
    }

    fn render(&self, _ctx: &PluginContext) -> anyhow::Result<PluginView> {
        let toasts = lock(&self.toasts);
        let skip = toasts.len().saturating_sub(RENDERED_LINES);
        Ok(PluginView::new("Notifications").lines(
            toasts
                .iter()
                .skip(skip)
                .map(|t| format!("[{}] {}", t.level, t.message)),
        ))
    }
}

#[derive(Debug, Default)]
struct Selection {
    keys: Vec<String>,
    changes: u64,
}

/// Tracks the current key selection.
#[derive(Debug, Default, Clone)]
pub struct SelectionTracker {
    selection: Arc<Mutex<Selection>>,
}

impl SelectionTracker {
    pub const ID: &'static str = "selection";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn selected(&self) -> Vec<String> {
        lock(&self.selection).keys.clone()
    }

    /// How many `keys:selected` events have been seen
    #[must_use]
    pub fn changes(&self) -> u64 {
        lock(&self.selection).changes
    }
}

impl Plugin for SelectionTracker {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Selection"
    }

    fn priority(&self) -> i32 {
        20
    }

    fn mount(&mut self, ctx: &PluginContext) -> anyhow::Result<()> {
        let selection = Arc::clone(&self.selection);
        ctx.bus().on(events::KEYS_SELECTED, move |event| {
            if let Ok(payload) = event.payload_as::<KeysSelected>() {
                let mut selection = lock(&selection);
                selection.keys = payload.keys;
                selection.changes += 1;
            }
        });

        let selection = Arc::clone(&self.selection);
        ctx.bus().on(events::KEYS_DELETED, move |event| {
            if let Ok(payload) = event.payload_as::<KeysDeleted>() {
                lock(&selection).keys.retain(|k| !payload.keys.contains(k));
            }
        });
        Ok(())
    }

    fn render(&self, ctx: &PluginContext) -> anyhow::Result<PluginView> {
        let selection = lock(&self.selection);
        let view = PluginView::new(format!("Selection ({})", ctx.environment()));
        if selection.keys.is_empty() {
            return Ok(view.line("nothing selected"));
        }
        Ok(view.lines(selection.keys.iter().cloned()))
    }
}

/// Records completed key operations.
#[derive(Debug, Default, Clone)]
pub struct ActivityLog {
    entries: Arc<Mutex<VecDeque<OperationCompleted>>>,
}

impl ActivityLog {
    pub const ID: &'static str = "activity-log";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<OperationCompleted> {
        lock(&self.entries).iter().cloned().collect()
    }
}

impl Plugin for ActivityLog {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Activity"
    }

    fn mount(&mut self, ctx: &PluginContext) -> anyhow::Result<()> {
        let entries = Arc::clone(&self.entries);
        ctx.bus().on(events::OPERATION_COMPLETED, move |event| {
            match event.payload_as::<OperationCompleted>() {
                Ok(done) => {
                    let mut entries = lock(&entries);
                    if entries.len() == ACTIVITY_LOG_CAPACITY {
                        entries.pop_front();
                    }
                    entries.push_back(done);
                }
                Err(e) => warn!("Ignoring malformed operation event: {e}"),
            }
        });
        Ok(())
    }

    fn render(&self, _ctx: &PluginContext) -> anyhow::Result<PluginView> {
        let entries = lock(&self.entries);
        let skip = entries.len().saturating_sub(RENDERED_LINES);
        Ok(PluginView::new("Activity").lines(
            entries
                .iter()
                .skip(skip)
                .map(|e| format!("{} {} ({})", e.operation, e.key, e.env)),
        ))
    }
}
