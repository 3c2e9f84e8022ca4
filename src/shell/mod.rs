//! Shell - the orchestration facade.
//!
//! The Shell owns all mutable coordination state: the instance registry, the
//! focus/z-order coordinator, the resource monitor, and the bus. Embedders
//! wrap it in `Arc<Mutex<Shell>>`; every mutation flows through `&mut self`,
//! so launch/close/focus and handler bookkeeping are serialized by
//! construction and no two focus calls can interleave.
//!
//! Focus-stealing is prevented structurally: [`Shell::focus`] is the only
//! path that changes the focused instance, and nothing on the message path
//! calls it.

pub mod registry;
pub mod stacking;
pub mod types;

use std::fmt;
use std::sync::Arc;

use crate::bridge::InstanceBridge;
use crate::bus::MessageBus;
use crate::events::{FocusChange, ShellObservers};
use crate::monitor::ResourceMonitor;
use crate::types::{AppName, Error, Result, ShellConfig};

use registry::InstanceRegistry;
use stacking::FocusCoordinator;
use types::{AppDescriptor, AppInstance, InstanceState, LaunchMode};

/// Top-level orchestration facade.
///
/// External collaborators (app switcher UI, bridge transport) talk only to
/// this type; subsystems are plain structs it owns, not separate actors.
pub struct Shell {
    config: ShellConfig,
    registry: InstanceRegistry,
    stacking: FocusCoordinator,
    bus: MessageBus,
    monitor: ResourceMonitor,
    observers: ShellObservers,
    bridge: Arc<dyn InstanceBridge>,
    system_sender: AppName,
}

impl Shell {
    /// Create a shell wired to the given bridge transport.
    pub fn new(config: ShellConfig, bridge: Arc<dyn InstanceBridge>) -> Self {
        Self {
            bus: MessageBus::new(config.bus.clone()),
            monitor: ResourceMonitor::new(config.limits.clone()),
            registry: InstanceRegistry::new(),
            stacking: FocusCoordinator::new(),
            observers: ShellObservers::new(),
            bridge,
            system_sender: AppName::shell(),
            config,
        }
    }

    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    /// Launch an instance. Idempotent: launching a live name focuses it and
    /// returns the existing record.
    pub async fn launch(&mut self, descriptor: AppDescriptor) -> Result<AppInstance> {
        self.launch_with(descriptor, LaunchMode::Idempotent).await
    }

    /// Launch with an explicit collision policy.
    pub async fn launch_with(
        &mut self,
        descriptor: AppDescriptor,
        mode: LaunchMode,
    ) -> Result<AppInstance> {
        let name = descriptor.name.clone();

        // The shell's own identity is permanently taken by the system
        // sender; a hosted instance under it could forge system broadcasts.
        if name == self.system_sender {
            return Err(Error::app_already_running(name.as_str()));
        }

        if self.registry.is_live(&name) {
            return match mode {
                LaunchMode::Strict => Err(Error::app_already_running(name.as_str())),
                LaunchMode::Idempotent => {
                    tracing::debug!("launch_refocus: app={}", name);
                    self.focus(&name).await?;
                    self.registry
                        .get(&name)
                        .cloned()
                        .ok_or_else(|| Error::internal("instance vanished during refocus"))
                }
            };
        }

        tracing::info!(
            "launch: app={}, class={:?}",
            name,
            descriptor.window_class
        );

        // A Closed record under the same name is replaced outright.
        self.registry
            .insert(AppInstance::new(name.clone(), descriptor.window_class));
        self.stacking.push_back(name.clone());
        if let Some(instance) = self.registry.get_mut(&name) {
            instance.mark_running();
        }

        self.focus(&name).await?;

        let instance = self
            .registry
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::internal("instance vanished during launch"))?;
        self.observers.notify_app_launched(&instance);
        Ok(instance)
    }

    /// Give an instance focus: front of the stack, fresh per-layer z-order,
    /// Focused state; the previously focused instance is demoted to Paused.
    pub async fn focus(&mut self, name: &AppName) -> Result<()> {
        let focusable = self
            .registry
            .get(name)
            .map(|i| i.state.is_focusable())
            .unwrap_or(false);
        if !focusable {
            return Err(Error::app_not_running(format!(
                "cannot focus {}: not a live instance",
                name
            )));
        }

        let previous = self.registry.focused_name();

        self.stacking.promote(name);
        let layer = self
            .registry
            .get(name)
            .map(|i| i.z_layer_base)
            .unwrap_or_default();
        let z_order = self.stacking.next_z(layer);
        let focus_clock = self.stacking.tick();
        if let Some(instance) = self.registry.get_mut(name) {
            instance.mark_focused(z_order, focus_clock);
        }

        let demoted = match &previous {
            Some(prev) if prev != name => {
                if let Some(instance) = self.registry.get_mut(prev) {
                    instance.mark_paused();
                }
                Some(prev.clone())
            }
            _ => None,
        };

        tracing::debug!(
            "focus: app={}, z={}, demoted={:?}",
            name,
            z_order,
            demoted.as_ref().map(AppName::as_str)
        );

        // State is consistent before the bridge hears about it; a broken
        // transport is logged, never propagated.
        let bridge = self.bridge.clone();
        if let Some(prev) = &demoted {
            if let Err(e) = bridge.on_app_paused(prev).await {
                tracing::warn!("bridge_notify_failed: app={}, event=paused, error={}", prev, e);
            }
        }
        if let Err(e) = bridge.on_app_resumed(name).await {
            tracing::warn!("bridge_notify_failed: app={}, event=resumed, error={}", name, e);
        }

        if previous.as_ref() != Some(name) {
            self.observers.notify_focus_changed(&FocusChange {
                previous: demoted,
                current: Some(name.clone()),
            });
        }
        Ok(())
    }

    /// Close an instance: signal it, tear down its stack entry, pending
    /// requests, handler, queue, and samples, then mark it Closed. Every
    /// inbound pending request is resolved with `RequestCancelled` before
    /// this returns. If the instance was focused, the new stack front takes
    /// focus.
    pub async fn close(&mut self, name: &AppName) -> Result<()> {
        let state = match self.registry.get(name) {
            Some(instance) if !instance.state.is_terminal() => instance.state,
            Some(instance) => {
                return Err(Error::app_not_running(format!(
                    "cannot close {}: already {:?}",
                    name, instance.state
                )))
            }
            None => {
                return Err(Error::app_not_running(format!(
                    "cannot close {}: not found",
                    name
                )))
            }
        };
        let was_focused = state == InstanceState::Focused;

        if let Some(instance) = self.registry.get_mut(name) {
            instance.mark_closing();
        }
        tracing::info!("close: app={}", name);

        // Last chance for the instance to flush, before any teardown.
        if let Err(e) = self.bridge.clone().on_app_will_close(name).await {
            tracing::warn!(
                "bridge_notify_failed: app={}, event=will_close, error={}",
                name,
                e
            );
        }

        self.stacking.remove(name);
        let cancelled = self.bus.cancel_requests_for(name).await;
        self.bus.remove_app(name).await;
        self.monitor.clear(name);
        if let Some(instance) = self.registry.get_mut(name) {
            instance.mark_closed();
        }

        if was_focused {
            if let Some(next) = self.stacking.front().cloned() {
                self.focus(&next).await?;
            } else {
                self.observers.notify_focus_changed(&FocusChange {
                    previous: Some(name.clone()),
                    current: None,
                });
            }
        }

        self.observers.notify_app_closed(name);
        tracing::debug!("closed: app={}, cancelled_requests={}", name, cancelled);
        Ok(())
    }

    /// Cycle focus to the least recently used instance. No-op (returns None)
    /// when fewer than two instances are focusable.
    pub async fn focus_next(&mut self) -> Result<Option<AppName>> {
        match self.stacking.next_target() {
            Some(target) => {
                self.focus(&target).await?;
                Ok(Some(target))
            }
            None => Ok(None),
        }
    }

    /// Cycle focus back to the previously focused instance, moving the
    /// displaced front to the back of the stack. This makes it the exact
    /// inverse of [`Shell::focus_next`]: composing them equally many times
    /// restores the original stack. No-op (returns None) when fewer than two
    /// instances are focusable.
    pub async fn focus_previous(&mut self) -> Result<Option<AppName>> {
        match self.stacking.previous_target() {
            Some(target) => {
                let displaced = self.stacking.front().cloned();
                self.focus(&target).await?;
                if let Some(displaced) = displaced {
                    self.stacking.demote_to_back(&displaced);
                }
                Ok(Some(target))
            }
            None => Ok(None),
        }
    }

    /// Snapshot of live instances, most-recently-focused first.
    pub fn list_running(&self) -> Vec<AppInstance> {
        self.stacking
            .snapshot()
            .into_iter()
            .filter_map(|name| self.registry.get(&name).cloned())
            .collect()
    }

    /// Name of the focused instance, if any.
    pub fn focused(&self) -> Option<AppName> {
        self.registry.focused_name()
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Broadcast a best-effort GC hint to every registered handler. Advisory:
    /// reclaims nothing itself. Returns delivery count.
    pub async fn force_garbage_collection(&self) -> usize {
        let delivered = self
            .bus
            .broadcast(&self.system_sender, "system.gc-hint", serde_json::json!({}))
            .await;
        tracing::info!("gc_hint_broadcast: delivered={}", delivered);
        delivered
    }

    /// Sweep Closed registry records older than the retention window.
    /// Invoked by the sampler each pass.
    pub fn sweep_closed(&mut self) -> usize {
        self.registry.sweep_closed(self.config.closed_retention)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    /// The bus is cheaply cloneable; instance tasks hold their own clone and
    /// never touch the shell lock to send.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn bridge(&self) -> Arc<dyn InstanceBridge> {
        self.bridge.clone()
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    pub fn monitor_mut(&mut self) -> &mut ResourceMonitor {
        &mut self.monitor
    }

    pub fn observers_mut(&mut self) -> &mut ShellObservers {
        &mut self.observers
    }

    /// Cloned record for one instance, live or recently closed.
    pub fn get_instance(&self, name: &AppName) -> Option<AppInstance> {
        self.registry.get(name).cloned()
    }

    pub fn is_live(&self, name: &AppName) -> bool {
        self.registry.is_live(name)
    }

    /// Names of all live instances, unordered.
    pub fn live_apps(&self) -> Vec<AppName> {
        self.registry.live_names()
    }
}

impl fmt::Debug for Shell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shell")
            .field("instances", &self.registry.count())
            .field("focused", &self.registry.focused_name())
            .field("stack_len", &self.stacking.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
