// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Tracing runtime control.

use ordermap::OrderMap;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, OnceLock};
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, Registry, filter::LevelFilter, prelude::*, reload};

use crate::{targets::TRACING_TARGETS, trace_target};

trace_target!("tracectl", LevelFilter::INFO, &[]);

/// Errors produced while applying a `tag=level,...` configuration string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TracingConfigError {
    #[error("invalid syntax {0:?}: expected tag=level")]
    Syntax(String),
    #[error("invalid level {level:?} for {tag:?}")]
    Level { tag: String, level: String },
}

#[derive(Debug, Clone)]
pub struct TargetCfg {
    pub(crate) target: &'static str,
    pub(crate) name: &'static str,
    pub(crate) level: LevelFilter,
    pub(crate) tags: Vec<&'static str>,
}

impl TargetCfg {
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }

    #[must_use]
    pub fn level(&self) -> LevelFilter {
        self.level
    }
}

#[derive(Debug)]
pub(crate) struct TargetCfgDb {
    pub(crate) level: LevelFilter,
    pub(crate) targets: OrderMap<&'static str, TargetCfg>,
}

impl TargetCfgDb {
    fn new(level: LevelFilter) -> Self {
        let mut db = Self {
            level,
            targets: OrderMap::new(),
        };
        for declared in TRACING_TARGETS {
            // a target's own name always works as a tag
            let mut tags = declared.tags.to_vec();
            if !tags.contains(&declared.name) {
                tags.push(declared.name);
            }
            let cfg = TargetCfg {
                target: declared.target,
                name: declared.name,
                level: declared.level,
                tags,
            };
            if let Some(previous) = db.targets.insert(declared.target, cfg) {
                warn!("Target {} has been multiply defined!", previous.target);
            }
        }
        db
    }

    pub(crate) fn tags(&self) -> BTreeSet<&'static str> {
        self.targets
            .values()
            .flat_map(|t| t.tags.iter().copied())
            .collect()
    }

    fn tagged_mut<'a>(&'a mut self, tag: &'a str) -> impl Iterator<Item = &'a mut TargetCfg> + 'a {
        self.targets
            .values_mut()
            .filter(move |t| t.tags.iter().any(|candidate| *candidate == tag))
    }

    fn env_filter(&self) -> EnvFilter {
        self.targets.values().fold(
            EnvFilter::new(self.level.to_string()),
            |filter, target| match format!("{}={}", target.target, target.level).parse() {
                Ok(directive) => filter.add_directive(directive),
                Err(_) => filter,
            },
        )
    }
}

/// Handle on the process-wide tracing subscriber.
#[derive(Debug)]
pub struct TracingControl {
    db: Mutex<TargetCfgDb>,
    reload_filter: reload::Handle<EnvFilter, Registry>,
}

static TRACING_CTL: OnceLock<TracingControl> = OnceLock::new();

/// Get a reference to the static [`TracingControl`], installing the subscriber if needed.
pub fn get_trace_ctl() -> &'static TracingControl {
    TRACING_CTL.get_or_init(TracingControl::new)
}

impl TracingControl {
    fn new() -> Self {
        let db = TargetCfgDb::new(LevelFilter::INFO);
        let (filter, reload_filter) = reload::Layer::new(db.env_filter());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_line_number(true)
            .with_target(true)
            .with_thread_names(true)
            .with_level(true);

        // a test harness may already own the global subscriber; keep going without ours
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .with(ErrorLayer::default())
            .try_init();

        Self {
            db: Mutex::new(db),
            reload_filter,
        }
    }

    fn db(&self) -> MutexGuard<'_, TargetCfgDb> {
        self.db.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn reload(&self, db: &TargetCfgDb) {
        if let Err(e) = self.reload_filter.reload(db.env_filter()) {
            warn!("Failed to reload tracing filter: {e}");
        }
    }

    pub fn set_default_level(&self, level: LevelFilter) {
        let mut db = self.db();
        if db.level != level {
            db.level = level;
            self.reload(&db);
            info!("Set default log level to {level}");
        }
    }

    #[must_use]
    pub fn default_level(&self) -> LevelFilter {
        self.db().level
    }

    /// Set the level of every target carrying `tag`; returns how many targets changed.
    pub fn set_tag_level(&self, tag: &str, level: LevelFilter) -> usize {
        let mut db = self.db();
        let mut changed = 0;
        for target in db.tagged_mut(tag) {
            if target.level != level {
                target.level = level;
                changed += 1;
            }
        }
        if changed > 0 {
            self.reload(&db);
        }
        changed
    }

    pub fn set_level_all(&self, level: LevelFilter) {
        let mut db = self.db();
        for target in db.targets.values_mut() {
            target.level = level;
        }
        self.reload(&db);
    }

    fn parse_tracing_config(
        input: &str,
    ) -> Result<OrderMap<String, LevelFilter>, TracingConfigError> {
        input
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                let (tag, level) = item
                    .split_once('=')
                    .ok_or_else(|| TracingConfigError::Syntax(item.to_string()))?;
                let parsed = LevelFilter::from_str(level.trim()).map_err(|_| {
                    TracingConfigError::Level {
                        tag: tag.trim().to_string(),
                        level: level.trim().to_string(),
                    }
                })?;
                Ok((tag.trim().to_string(), parsed))
            })
            .collect()
    }

    /// Apply a string of comma separated `tag=level` items.
    ///
    /// `default=level` sets the level of events from unregistered targets, `all=level` sets every
    /// registered target; any other tag is applied afterwards so that it can override `all`.
    ///
    /// # Errors
    ///
    /// Fails without applying anything if any item is malformed.
    pub fn setup_from_string(&self, input: &str) -> Result<(), TracingConfigError> {
        let config = Self::parse_tracing_config(input)?;
        if let Some(level) = config.get("default") {
            self.set_default_level(*level);
        }
        if let Some(level) = config.get("all") {
            self.set_level_all(*level);
        }
        for (tag, level) in config.iter().filter(|(t, _)| !matches!(t.as_str(), "default" | "all")) {
            if self.set_tag_level(tag, *level) == 0 && !self.db().tags().contains(tag.as_str()) {
                warn!("Tracing tag '{tag}' matches no registered target");
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn get_target(&self, target: &str) -> Option<TargetCfg> {
        self.db().targets.get(target).cloned()
    }

    /// Log the current per-target configuration.
    pub fn dump(&self) {
        let db = self.db();
        info!("{db}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use crate::control::{TracingConfigError, get_trace_ctl};
    use crate::{LevelFilter, custom_target};
    use serial_test::serial;

    const TAG: &str = "tracectl-test-tag";

    custom_target!("tracectl-test-1", LevelFilter::DEBUG, &[TAG]);
    custom_target!("tracectl-test-2", LevelFilter::ERROR, &[TAG]);

    #[test]
    #[serial]
    fn statically_declared_targets_are_registered() {
        let tctl = get_trace_ctl();
        assert_eq!(
            tctl.get_target("tracectl-test-1").map(|t| t.level()),
            Some(LevelFilter::DEBUG)
        );
        assert!(tctl.get_target("polykube_tracectl::control").is_some());
        tctl.dump();
    }

    #[test]
    #[serial]
    fn tag_levels_apply_to_every_tagged_target() {
        let tctl = get_trace_ctl();
        tctl.set_tag_level(TAG, LevelFilter::WARN);
        assert_eq!(tctl.set_tag_level(TAG, LevelFilter::OFF), 2);
        assert_eq!(tctl.get_target("tracectl-test-2").map(|t| t.level()), Some(LevelFilter::OFF));
        assert_eq!(tctl.set_tag_level(TAG, LevelFilter::OFF), 0);
    }

    #[test]
    #[serial]
    fn setup_from_string_overrides_all() {
        let tctl = get_trace_ctl();
        tctl.setup_from_string("default=warn, all=error, tracectl-test-1=trace")
            .unwrap();
        assert_eq!(tctl.default_level(), LevelFilter::WARN);
        assert_eq!(tctl.get_target("tracectl-test-1").map(|t| t.level()), Some(LevelFilter::TRACE));
        assert_eq!(tctl.get_target("tracectl-test-2").map(|t| t.level()), Some(LevelFilter::ERROR));
        tctl.set_default_level(LevelFilter::INFO);
    }

    #[test]
    #[serial]
    fn malformed_strings_are_rejected() {
        let tctl = get_trace_ctl();
        assert!(matches!(
            tctl.setup_from_string("default=loud"),
            Err(TracingConfigError::Level { .. })
        ));
        assert!(matches!(
            tctl.setup_from_string("default=info, bootstrap"),
            Err(TracingConfigError::Syntax(_))
        ));
    }
}
