//! Core types for the Concourse shell.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (AppName, CorrelationId)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for shell, bus, and resource limits

mod config;
mod errors;
mod ids;

pub use config::{BusConfig, ResourceLimits, ShellConfig};
pub use errors::{Error, Result};
pub use ids::{AppName, CorrelationId};
