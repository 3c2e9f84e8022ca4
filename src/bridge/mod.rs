//! Instance bridge - the seam to each hosted instance's execution context.
//!
//! Every instance runs in its own isolated context; the shell reaches it only
//! through these primitives, implemented by the transport layer that is out
//! of scope here. Implementations should enqueue into the instance's context
//! and return promptly; a slow or broken transport must not be able to stall
//! the coordination path, so the Shell logs notification failures instead of
//! propagating them.

use async_trait::async_trait;

use crate::types::{AppName, Result};

/// Outbound calls from the shell into a hosted instance.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstanceBridge: Send + Sync {
    /// Instance gained focus.
    async fn on_app_resumed(&self, app: &AppName) -> Result<()>;

    /// Instance lost focus to another instance.
    async fn on_app_paused(&self, app: &AppName) -> Result<()>;

    /// Instance is about to be torn down. Fired before registry state is
    /// mutated so the instance can flush in-flight work.
    async fn on_app_will_close(&self, app: &AppName) -> Result<()>;

    /// Current memory reading for the instance, in bytes.
    async fn memory_usage(&self, app: &AppName) -> Result<u64>;
}

/// Bridge that accepts every notification and reports zero memory usage.
/// Useful for tests and for embedders that wire the transport in later.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBridge;

#[async_trait]
impl InstanceBridge for NoopBridge {
    async fn on_app_resumed(&self, _app: &AppName) -> Result<()> {
        Ok(())
    }

    async fn on_app_paused(&self, _app: &AppName) -> Result<()> {
        Ok(())
    }

    async fn on_app_will_close(&self, _app: &AppName) -> Result<()> {
        Ok(())
    }

    async fn memory_usage(&self, _app: &AppName) -> Result<u64> {
        Ok(0)
    }
}
