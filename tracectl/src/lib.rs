// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Process-wide tracing setup with per-target levels adjustable from a configuration string.

pub mod control;
pub mod display;
pub mod targets;

// re-exports
pub use control::TracingControl;
pub use control::TracingConfigError;
pub use control::get_trace_ctl;
pub use tracing_subscriber::filter::LevelFilter;
