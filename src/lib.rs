//! # Concourse Core - Shell Orchestration Runtime
//!
//! Coordination layer for shells that host multiple independently-rendered
//! application instances on one surface:
//! - Instance lifecycle with a launch/focus/pause/close state machine
//! - Z-order stacking across four fixed window classes
//! - Focus stack with cyclic next/previous switching
//! - Inter-instance message bus (point-to-point, broadcast, request/response)
//! - Resource monitor with background memory sampling and advisory limits
//!
//! ## Architecture
//!
//! The shell follows a single-actor model where the `Shell` owns all mutable state:
//! ```text
//!                    ┌─────────────────────────────────┐
//!   UI / bridge →    │          Shell Actor            │
//!                    │  ┌─────────┐ ┌─────────┐        │
//!                    │  │Instance │ │  Focus  │        │
//!                    │  │Registry │ │Coordntr │        │
//!                    │  └─────────┘ └─────────┘        │
//!                    │  ┌─────────┐ ┌─────────┐        │
//!                    │  │Resource │ │ Message │        │
//!                    │  │ Monitor │ │   Bus   │        │
//!                    │  └─────────┘ └─────────┘        │
//!                    └─────────────────────────────────┘
//! ```
//!
//! Hosted instances run in their own execution contexts and are reached only
//! through the [`bridge::InstanceBridge`] seam and the bus's delivery channels;
//! nothing outside the shell mutates registry or bus state directly.

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod bridge;
pub mod bus;
pub mod events;
pub mod monitor;
pub mod shell;
pub mod types;

// Internal utilities
pub mod observability;

pub use shell::Shell;
pub use types::{Error, Result, ShellConfig};
