// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Display implementations

use crate::control::{TargetCfg, TargetCfgDb};
use std::fmt::{Display, Formatter};

macro_rules! TARGET_FMT {
    () => {
        "{:>16} │ {:>48} │ {:>8} │ {}"
    };
}

impl Display for TargetCfg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            TARGET_FMT!(),
            self.name,
            self.target,
            self.level.to_string(),
            self.tags.join(",")
        )
    }
}

impl Display for TargetCfgDb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f)?;
        writeln!(f, TARGET_FMT!(), "NAME", "TARGET", "LEVEL", "TAGS")?;
        for target in self.targets.values() {
            writeln!(f, "{target}")?;
        }
        write!(
            f,
            TARGET_FMT!(),
            "(default)",
            "--",
            self.level.to_string(),
            "--"
        )
    }
}
