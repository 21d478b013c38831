//! Plugin capability trait and the context handed to plugins.
//!
//! Plugins are independent panels that only talk to each other through the
//! event bus. The host owns them as `Box<dyn Plugin>` and drives their
//! lifecycle; see [`PluginHost`].

mod builtin;
mod host;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use keyscope_types::{PanelButton, PluginEvent, Toast};
use serde::Serialize;

use crate::bus::{EventBus, Subscription};

pub use builtin::{ActivityLog, SelectionTracker, ToastLog};
pub use host::{MountReport, PluginHost, PluginInfo, PluginState, RenderedPlugin};

/// A mountable console panel.
pub trait Plugin: Send {
    /// Stable identifier, also used as the `source` of events it emits.
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// Higher values mount and render first.
    fn priority(&self) -> i32 {
        0
    }

    fn panel_button(&self) -> Option<PanelButton> {
        None
    }

    /// Called once when the host mounts the plugin. Subscriptions made
    /// through `ctx.bus()` are removed automatically on unmount.
    ///
    /// # Errors
    ///
    /// A failed mount leaves the plugin in [`PluginState::Failed`].
    fn mount(&mut self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// # Errors
    ///
    /// Render failures are reported per plugin and do not affect others.
    fn render(&self, ctx: &PluginContext) -> anyhow::Result<PluginView>;

    fn unmount(&mut self) {}
}

/// What a plugin renders: a title and plain text lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginView {
    pub title: String,
    pub lines: Vec<String>,
}

impl PluginView {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            lines: Vec::new(),
        }
    }

    #[must_use]
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.push(line.into());
        self
    }

    #[must_use]
    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines.extend(lines.into_iter().map(Into::into));
        self
    }
}

/// State the host shares with every plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostContext {
    pub environment: String,
    pub selected_keys: Vec<String>,
}

pub(crate) type SharedContext = Arc<Mutex<HostContext>>;

pub(crate) fn lock_context(context: &Mutex<HostContext>) -> MutexGuard<'_, HostContext> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-plugin view of the host: shared context plus a bus handle that stamps
/// the plugin's id on outgoing events.
#[derive(Debug, Clone)]
pub struct PluginContext {
    context: SharedContext,
    bus: PluginBus,
}

impl PluginContext {
    pub(crate) fn new(context: SharedContext, bus: PluginBus) -> Self {
        Self { context, bus }
    }

    #[must_use]
    pub fn environment(&self) -> String {
        lock_context(&self.context).environment.clone()
    }

    #[must_use]
    pub fn selected_keys(&self) -> Vec<String> {
        lock_context(&self.context).selected_keys.clone()
    }

    #[must_use]
    pub fn bus(&self) -> &PluginBus {
        &self.bus
    }
}

/// Bus handle scoped to one plugin.
#[derive(Debug, Clone)]
pub struct PluginBus {
    bus: EventBus,
    source: String,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl PluginBus {
    pub(crate) fn new(bus: EventBus, source: impl Into<String>) -> Self {
        Self {
            bus,
            source: source.into(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Emit an event with this plugin as the source.
    pub fn emit(&self, event_type: &str, payload: serde_json::Value) -> usize {
        self.bus
            .emit(&PluginEvent::new(event_type, payload, self.source.clone()))
    }

    pub fn emit_typed<T: Serialize>(&self, event_type: &str, payload: &T) -> usize {
        self.bus.publish(event_type, payload, &self.source)
    }

    pub fn toast(&self, toast: &Toast) -> usize {
        self.bus.toast(&self.source, toast)
    }

    /// Subscribe on behalf of the plugin; released by the host on unmount.
    pub fn on<F>(&self, event_type: &str, handler: F) -> Subscription
    where
        F: Fn(&PluginEvent) + Send + Sync + 'static,
    {
        let subscription = self.bus.on(event_type, handler);
        let mut tracked = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // drop handles the plugin already released itself
        tracked.retain(Subscription::is_active);
        tracked.push(subscription.clone());
        subscription
    }

    pub(crate) fn unsubscribe_all(&self) -> usize {
        let drained: Vec<Subscription> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        drained.iter().filter(|s| s.unsubscribe()).count()
    }
}
