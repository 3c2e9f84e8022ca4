//! Shell types: WindowClass, InstanceState, AppInstance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AppName;

/// Fixed stacking class assigned at launch.
///
/// The class determines the z-layer base; the base always dominates per-layer
/// z-order, so a dialog is stacked above every widget regardless of focus
/// recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WindowClass {
    Panel,
    Widget,
    Overlay,
    Dialog,
}

/// Z-layer base for a window class. Pure ordering policy, independent of any
/// rendering framework.
pub fn layer_of(class: WindowClass) -> i32 {
    match class {
        WindowClass::Panel => 10,
        WindowClass::Widget => 100,
        WindowClass::Overlay => 1000,
        WindowClass::Dialog => 2000,
    }
}

/// Instance lifecycle state.
///
/// State transitions:
/// ```text
/// LAUNCHING → RUNNING → FOCUSED ⇄ PAUSED
///                  ↓        ↓       ↓
///                  └──→ CLOSING ←───┘
///                          ↓
///                       CLOSED
/// ```
///
/// `Focused` is a refinement of running: at most one instance holds it at a
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Launching,
    Running,
    Focused,
    Paused,
    Closing,
    Closed,
}

impl InstanceState {
    /// Check if this is a terminal or terminating state.
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceState::Closing | InstanceState::Closed)
    }

    /// Live states: on the focus stack, sampled by the monitor.
    pub fn is_live(self) -> bool {
        matches!(
            self,
            InstanceState::Running | InstanceState::Focused | InstanceState::Paused
        )
    }

    /// Check if the instance can take focus.
    pub fn is_focusable(self) -> bool {
        self.is_live()
    }

    /// Check if transition is valid.
    pub fn can_transition_to(self, to: InstanceState) -> bool {
        match (self, to) {
            // LAUNCHING
            (InstanceState::Launching, InstanceState::Running) => true,
            (InstanceState::Launching, InstanceState::Closing) => true,
            // RUNNING
            (InstanceState::Running, InstanceState::Focused) => true,
            (InstanceState::Running, InstanceState::Closing) => true,
            // FOCUSED
            (InstanceState::Focused, InstanceState::Paused) => true,
            (InstanceState::Focused, InstanceState::Closing) => true,
            // PAUSED
            (InstanceState::Paused, InstanceState::Focused) => true,
            (InstanceState::Paused, InstanceState::Closing) => true,
            // CLOSING
            (InstanceState::Closing, InstanceState::Closed) => true,
            // CLOSED is terminal
            (InstanceState::Closed, _) => false,
            // All other transitions invalid
            _ => false,
        }
    }
}

/// Launch collision policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// Launching a live name is a no-op that focuses it instead.
    #[default]
    Idempotent,
    /// Launching a live name fails with `AppAlreadyRunning`.
    Strict,
}

/// Manifest fields consumed at launch time. Everything else in the manifest
/// belongs to layers outside this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDescriptor {
    pub name: AppName,
    pub window_class: WindowClass,
}

impl AppDescriptor {
    pub fn new(name: AppName, window_class: WindowClass) -> Self {
        Self { name, window_class }
    }
}

/// Authoritative record of one hosted instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInstance {
    pub name: AppName,
    pub window_class: WindowClass,
    /// Fixed at launch; never changes afterwards.
    pub z_layer_base: i32,
    /// Monotonic per layer; reassigned on every focus.
    pub z_order: u64,
    pub state: InstanceState,
    /// Logical focus clock value, not wall time.
    pub last_focused_at: u64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl AppInstance {
    pub fn new(name: AppName, window_class: WindowClass) -> Self {
        Self {
            name,
            window_class,
            z_layer_base: layer_of(window_class),
            z_order: 0,
            state: InstanceState::Launching,
            last_focused_at: 0,
            created_at: Utc::now(),
            closed_at: None,
        }
    }

    /// Stacking key: layer base dominates, then per-layer z-order.
    pub fn stacking_key(&self) -> (i32, u64) {
        (self.z_layer_base, self.z_order)
    }

    pub fn mark_running(&mut self) {
        self.state = InstanceState::Running;
    }

    pub fn mark_focused(&mut self, z_order: u64, focus_clock: u64) {
        self.z_order = z_order;
        self.last_focused_at = focus_clock;
        self.state = InstanceState::Focused;
    }

    pub fn mark_paused(&mut self) {
        self.state = InstanceState::Paused;
    }

    pub fn mark_closing(&mut self) {
        self.state = InstanceState::Closing;
    }

    pub fn mark_closed(&mut self) {
        self.state = InstanceState::Closed;
        self.closed_at = Some(Utc::now());
    }
}
