//! Shell event infrastructure - typed observer lists.
//!
//! Replaces implicit framework event wiring with explicit callback lists the
//! Shell invokes synchronously after each completed operation. Listeners run
//! on the coordination context and must return quickly; anything slow belongs
//! on the far side of a channel.

use std::fmt;

use crate::shell::types::AppInstance;
use crate::types::AppName;

/// A focus transition. `current` is None when the last live instance closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusChange {
    pub previous: Option<AppName>,
    pub current: Option<AppName>,
}

type Listener<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Typed listener lists for shell lifecycle events.
#[derive(Default)]
pub struct ShellObservers {
    on_app_launched: Vec<Listener<AppInstance>>,
    on_app_closed: Vec<Listener<AppName>>,
    on_focus_changed: Vec<Listener<FocusChange>>,
}

impl ShellObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_app_launched(&mut self, listener: impl Fn(&AppInstance) + Send + Sync + 'static) {
        self.on_app_launched.push(Box::new(listener));
    }

    pub fn on_app_closed(&mut self, listener: impl Fn(&AppName) + Send + Sync + 'static) {
        self.on_app_closed.push(Box::new(listener));
    }

    pub fn on_focus_changed(&mut self, listener: impl Fn(&FocusChange) + Send + Sync + 'static) {
        self.on_focus_changed.push(Box::new(listener));
    }

    pub(crate) fn notify_app_launched(&self, instance: &AppInstance) {
        for listener in &self.on_app_launched {
            listener(instance);
        }
    }

    pub(crate) fn notify_app_closed(&self, name: &AppName) {
        for listener in &self.on_app_closed {
            listener(name);
        }
    }

    pub(crate) fn notify_focus_changed(&self, change: &FocusChange) {
        for listener in &self.on_focus_changed {
            listener(change);
        }
    }
}

impl fmt::Debug for ShellObservers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellObservers")
            .field("on_app_launched", &self.on_app_launched.len())
            .field("on_app_closed", &self.on_app_closed.len())
            .field("on_focus_changed", &self.on_focus_changed.len())
            .finish()
    }
}
