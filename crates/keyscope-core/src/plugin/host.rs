use std::cmp::Reverse;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use keyscope_types::{KeysDeleted, KeysSelected, PanelButton, events};
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::{
    HostContext, Plugin, PluginBus, PluginContext, PluginView, SharedContext, lock_context,
};
use crate::bus::{EventBus, Subscription};
use crate::{Error, Result};

/// Lifecycle of a plugin inside the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginState {
    /// Registered with the host but not mounted yet
    Unregistered,
    /// `mount` returned successfully
    Mounted,
    /// Mounted and receiving events
    Active,
    /// Torn down; all subscriptions released
    Unmounted,
    /// `mount` returned an error or panicked
    Failed(String),
}

impl PluginState {
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Mounted | Self::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub id: String,
    pub name: String,
    pub priority: i32,
    pub state: PluginState,
}

/// Outcome of [`PluginHost::mount_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountReport {
    pub mounted: Vec<String>,
    /// Plugin id and failure message
    pub failed: Vec<(String, String)>,
}

/// One plugin's render result. Failures are kept per plugin.
#[derive(Debug, Clone)]
pub struct RenderedPlugin {
    pub id: String,
    pub name: String,
    pub view: std::result::Result<PluginView, String>,
}

struct Entry {
    plugin: Box<dyn Plugin>,
    state: PluginState,
    ctx: Option<PluginContext>,
}

/// Owns plugins, orders them by priority and drives their lifecycle.
pub struct PluginHost {
    bus: EventBus,
    context: SharedContext,
    entries: Vec<Entry>,
    context_subscriptions: Vec<Subscription>,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("plugins", &self.plugins())
            .finish_non_exhaustive()
    }
}

impl PluginHost {
    /// Create a host on `bus`. The host keeps its shared context's selection
    /// in sync with `keys:selected` and `keys:deleted`.
    pub fn new(bus: EventBus, environment: impl Into<String>) -> Self {
        let context: SharedContext = Arc::new(Mutex::new(HostContext {
            environment: environment.into(),
            selected_keys: Vec::new(),
        }));

        let selected = {
            let context = Arc::clone(&context);
            bus.on(events::KEYS_SELECTED, move |event| {
                match event.payload_as::<KeysSelected>() {
                    Ok(payload) => lock_context(&context).selected_keys = payload.keys,
                    Err(e) => warn!("Ignoring malformed keys:selected from {}: {e}", event.source),
                }
            })
        };
        let deleted = {
            let context = Arc::clone(&context);
            bus.on(events::KEYS_DELETED, move |event| {
                if let Ok(payload) = event.payload_as::<KeysDeleted>() {
                    lock_context(&context)
                        .selected_keys
                        .retain(|k| !payload.keys.contains(k));
                }
            })
        };

        Self {
            bus,
            context,
            entries: Vec::new(),
            context_subscriptions: vec![selected, deleted],
        }
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Snapshot of the shared context
    #[must_use]
    pub fn context(&self) -> HostContext {
        lock_context(&self.context).clone()
    }

    /// Switch the active environment. The selection belongs to the old
    /// environment and is cleared.
    pub fn set_environment(&self, environment: impl Into<String>) {
        let mut context = lock_context(&self.context);
        context.environment = environment.into();
        context.selected_keys.clear();
    }

    /// Add a plugin. It is mounted by the next [`mount_all`](Self::mount_all).
    ///
    /// # Errors
    ///
    /// Returns `Error::Plugin` if a plugin with the same id is registered.
    pub fn register(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        let id = plugin.id().to_string();
        if self.entries.iter().any(|e| e.plugin.id() == id) {
            return Err(Error::Plugin(format!("duplicate plugin id: {id}")));
        }
        debug!("Registered plugin {id} (priority {})", plugin.priority());
        self.entries.push(Entry {
            plugin,
            state: PluginState::Unregistered,
            ctx: None,
        });
        Ok(())
    }

    /// Mount every plugin that is not live yet, in descending priority order.
    /// Equal priorities keep registration order. One plugin failing does not
    /// stop the others.
    pub fn mount_all(&mut self) -> MountReport {
        self.entries.sort_by_key(|e| Reverse(e.plugin.priority()));

        let mut report = MountReport::default();
        for entry in &mut self.entries {
            if !matches!(
                entry.state,
                PluginState::Unregistered | PluginState::Unmounted
            ) {
                continue;
            }

            let id = entry.plugin.id().to_string();
            let ctx = PluginContext::new(
                Arc::clone(&self.context),
                PluginBus::new(self.bus.clone(), id.clone()),
            );

            let outcome = catch_unwind(AssertUnwindSafe(|| entry.plugin.mount(&ctx)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };

            if let Some(message) = failure {
                error!("Plugin {id} failed to mount: {message}");
                ctx.bus().unsubscribe_all();
                entry.state = PluginState::Failed(message.clone());
                report.failed.push((id, message));
            } else {
                entry.state = PluginState::Mounted;
                entry.ctx = Some(ctx);
                report.mounted.push(id);
            }
        }

        for entry in &mut self.entries {
            if entry.state == PluginState::Mounted {
                entry.state = PluginState::Active;
            }
        }

        info!(
            "Mounted {} plugin(s), {} failed",
            report.mounted.len(),
            report.failed.len()
        );
        report
    }

    /// Unmount one plugin, releasing every subscription it made. Returns the
    /// number of subscriptions removed.
    ///
    /// # Errors
    ///
    /// Returns `Error::PluginNotFound` for an unknown id.
    pub fn unmount(&mut self, id: &str) -> Result<usize> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.plugin.id() == id)
            .ok_or_else(|| Error::PluginNotFound(id.to_string()))?;
        Ok(Self::teardown(entry))
    }

    pub fn unmount_all(&mut self) -> usize {
        self.entries.iter_mut().map(Self::teardown).sum()
    }

    fn teardown(entry: &mut Entry) -> usize {
        if !entry.state.is_live() {
            return 0;
        }
        let removed = entry
            .ctx
            .take()
            .map_or(0, |ctx| ctx.bus().unsubscribe_all());
        if catch_unwind(AssertUnwindSafe(|| entry.plugin.unmount())).is_err() {
            error!("Plugin {} panicked during unmount", entry.plugin.id());
        }
        entry.state = PluginState::Unmounted;
        debug!(
            "Unmounted plugin {} ({removed} subscription(s) released)",
            entry.plugin.id()
        );
        removed
    }

    /// Render every live plugin in priority order.
    #[must_use]
    pub fn render_all(&self) -> Vec<RenderedPlugin> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let ctx = entry.ctx.as_ref()?;
                let outcome = catch_unwind(AssertUnwindSafe(|| entry.plugin.render(ctx)));
                let view = match outcome {
                    Ok(Ok(view)) => Ok(view),
                    Ok(Err(e)) => Err(format!("{e:#}")),
                    Err(panic) => Err(panic_message(panic.as_ref())),
                };
                if let Err(message) = &view {
                    warn!("Plugin {} failed to render: {message}", entry.plugin.id());
                }
                Some(RenderedPlugin {
                    id: entry.plugin.id().to_string(),
                    name: entry.plugin.name().to_string(),
                    view,
                })
            })
            .collect()
    }

    /// Panel buttons contributed by live plugins, with the owning plugin id.
    #[must_use]
    pub fn panel_buttons(&self) -> Vec<(String, PanelButton)> {
        self.entries
            .iter()
            .filter(|e| e.state.is_live())
            .filter_map(|e| Some((e.plugin.id().to_string(), e.plugin.panel_button()?)))
            .collect()
    }

    /// Press a plugin's panel button: emits the button's action event with
    /// the plugin as source and the current selection as payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::PluginNotFound` if no live plugin has that id and
    /// `Error::Plugin` if it has no panel button.
    pub fn press_button(&self, id: &str) -> Result<usize> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.plugin.id() == id && e.state.is_live())
            .ok_or_else(|| Error::PluginNotFound(id.to_string()))?;
        let button = entry
            .plugin
            .panel_button()
            .ok_or_else(|| Error::Plugin(format!("{id} has no panel button")))?;

        let keys = lock_context(&self.context).selected_keys.clone();
        Ok(self.bus.emit(&keyscope_types::PluginEvent::new(
            button.action,
            json!({ "keys": keys }),
            id,
        )))
    }

    #[must_use]
    pub fn state(&self, id: &str) -> Option<PluginState> {
        self.entries
            .iter()
            .find(|e| e.plugin.id() == id)
            .map(|e| e.state.clone())
    }

    /// Plugins in their current order.
    #[must_use]
    pub fn plugins(&self) -> Vec<PluginInfo> {
        self.entries
            .iter()
            .map(|e| PluginInfo {
                id: e.plugin.id().to_string(),
                name: e.plugin.name().to_string(),
                priority: e.plugin.priority(),
                state: e.state.clone(),
            })
            .collect()
    }
}

impl Drop for PluginHost {
    fn drop(&mut self) {
        self.unmount_all();
        for subscription in &self.context_subscriptions {
            subscription.unsubscribe();
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
