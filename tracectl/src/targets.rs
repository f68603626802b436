// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Link-time registry of the tracing targets declared by every crate in the binary.

use crate::LevelFilter;
use linkme::distributed_slice;

/// A tracing target declared with [`trace_target!`] or [`custom_target!`].
pub struct STarget {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: &'static [&'static str],
}

impl STarget {
    #[must_use]
    pub const fn new(
        target: &'static str,
        name: &'static str,
        level: LevelFilter,
        tags: &'static [&'static str],
    ) -> Self {
        Self {
            target,
            name,
            level,
            tags,
        }
    }
}

#[distributed_slice]
pub static TRACING_TARGETS: [STarget];

#[macro_export]
macro_rules! trace_target_deps {
    () => {
        use linkme::distributed_slice;
        use $crate::LevelFilter;
        use $crate::targets::{STarget, TRACING_TARGETS};
    };
}

/// Declare the tracing target of the invoking module, with a short name, default level and tags.
#[macro_export]
macro_rules! trace_target {
    ($name:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::trace_target_deps;
            trace_target_deps!();

            #[distributed_slice(TRACING_TARGETS)]
            static TRACE_TGT: STarget = STarget::new(module_path!(), $name, $level, $tags);
        };
    };
}

/// Declare a tracing target which is not a module path (e.g. a dependency like `hyper`).
#[macro_export]
macro_rules! custom_target {
    ($target:expr, $level:expr, $tags:expr) => {
        const _: () = {
            use $crate::trace_target_deps;
            trace_target_deps!();

            #[distributed_slice(TRACING_TARGETS)]
            static TRACE_TGT: STarget = STarget::new($target, $target, $level, $tags);
        };
    };
}
