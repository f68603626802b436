// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Mapping of node names to the ordinals VTEP addresses are derived from.

use crate::error::BootstrapError;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Assigns every overlay node a small integer.
pub trait NodeOrdinals: Debug + Send + Sync {
    /// True if `node` takes part in the overlay.
    fn covers(&self, node: &str) -> bool;

    /// The ordinal of `node`.
    ///
    /// # Errors
    ///
    /// Fails with [`BootstrapError::AddressDerivation`] if `node` has no ordinal.
    fn ordinal(&self, node: &str) -> Result<u32, BootstrapError>;
}

/// Ordinals read from node names of the form `<prefix><decimal>`, e.g. `worker3`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamePrefixOrdinals {
    prefix: String,
}

impl NamePrefixOrdinals {
    /// Read ordinals from names starting with `prefix`.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl NodeOrdinals for NamePrefixOrdinals {
    fn covers(&self, node: &str) -> bool {
        node.starts_with(&self.prefix)
    }

    fn ordinal(&self, node: &str) -> Result<u32, BootstrapError> {
        let digits = node.strip_prefix(&self.prefix).ok_or_else(|| {
            BootstrapError::derivation(
                node,
                "ordinal",
                format!("name does not start with {:?}", self.prefix),
            )
        })?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(BootstrapError::derivation(
                node,
                "ordinal",
                format!("{digits:?} after {:?} is not a decimal number", self.prefix),
            ));
        }
        digits
            .parse()
            .map_err(|e| BootstrapError::derivation(node, "ordinal", format!("{digits}: {e}")))
    }
}

/// Explicitly assigned ordinals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticOrdinals {
    ordinals: BTreeMap<String, u32>,
}

impl StaticOrdinals {
    /// Assign `ordinal` to `node`.
    #[must_use]
    pub fn with(mut self, node: impl Into<String>, ordinal: u32) -> Self {
        self.ordinals.insert(node.into(), ordinal);
        self
    }
}

impl FromIterator<(String, u32)> for StaticOrdinals {
    fn from_iter<T: IntoIterator<Item = (String, u32)>>(iter: T) -> Self {
        Self {
            ordinals: iter.into_iter().collect(),
        }
    }
}

impl NodeOrdinals for StaticOrdinals {
    fn covers(&self, node: &str) -> bool {
        self.ordinals.contains_key(node)
    }

    fn ordinal(&self, node: &str) -> Result<u32, BootstrapError> {
        self.ordinals
            .get(node)
            .copied()
            .ok_or_else(|| BootstrapError::derivation(node, "ordinal", "no ordinal assigned"))
    }
}
