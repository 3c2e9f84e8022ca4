//! Instance registry - the authoritative table of hosted instances.

use chrono::{Duration, Utc};
use std::collections::HashMap;

use super::types::{AppInstance, InstanceState};
use crate::types::AppName;

/// Authoritative map of instance records.
///
/// NOT a separate actor - owned by the Shell and called via &mut self. Closed
/// records are retained briefly for introspection and swept by the sampler.
#[derive(Debug, Default)]
pub struct InstanceRegistry {
    instances: HashMap<AppName, AppInstance>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
        }
    }

    /// Insert a record, replacing any prior one under the same name.
    /// Replacing a live record is a caller bug; launch guards against it.
    pub fn insert(&mut self, instance: AppInstance) {
        self.instances.insert(instance.name.clone(), instance);
    }

    pub fn get(&self, name: &AppName) -> Option<&AppInstance> {
        self.instances.get(name)
    }

    pub fn get_mut(&mut self, name: &AppName) -> Option<&mut AppInstance> {
        self.instances.get_mut(name)
    }

    pub fn remove(&mut self, name: &AppName) -> Option<AppInstance> {
        self.instances.remove(name)
    }

    /// True if the name has a non-terminal record.
    pub fn is_live(&self, name: &AppName) -> bool {
        self.instances
            .get(name)
            .map(|i| !i.state.is_terminal())
            .unwrap_or(false)
    }

    /// Name of the currently focused instance, if any.
    pub fn focused_name(&self) -> Option<AppName> {
        self.instances
            .values()
            .find(|i| i.state == InstanceState::Focused)
            .map(|i| i.name.clone())
    }

    /// Names of all live (Running/Focused/Paused) instances.
    pub fn live_names(&self) -> Vec<AppName> {
        self.instances
            .values()
            .filter(|i| i.state.is_live())
            .map(|i| i.name.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.instances.len()
    }

    pub fn count_by_state(&self, state: InstanceState) -> usize {
        self.instances
            .values()
            .filter(|i| i.state == state)
            .count()
    }

    /// Remove Closed records older than the retention window.
    pub fn sweep_closed(&mut self, retention: std::time::Duration) -> usize {
        let cutoff = Utc::now()
            - Duration::from_std(retention).unwrap_or_else(|_| Duration::seconds(300));
        let stale: Vec<AppName> = self
            .instances
            .values()
            .filter(|i| {
                i.state == InstanceState::Closed
                    && i.closed_at.map(|at| at < cutoff).unwrap_or(false)
            })
            .map(|i| i.name.clone())
            .collect();

        let count = stale.len();
        for name in stale {
            self.instances.remove(&name);
        }
        count
    }
}
