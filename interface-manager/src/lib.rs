// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Observe and mutate the linux networking stack of the node.
//!
//! Everything the node bootstrap needs from the kernel goes through the [`NetworkStack`] trait.
//! [`Manager`] implements it over rtnetlink; the `testing` feature adds an in-memory
//! implementation.

#![deny(
    unsafe_code,
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]

use std::sync::Arc;

mod address;
mod link;
mod neighbour;
mod netlink;
pub mod pinned;
mod route;
pub mod stack;

#[cfg(any(test, feature = "testing"))]
pub mod fake;

#[allow(unused_imports)] // re-export
pub use stack::*;

use rtnetlink::Handle;
use tracectl::trace_target;

trace_target!("interface-manager", LevelFilter::INFO, &["netlink"]);

/// `Manager` is the primary entry point to the kernel networking stack.
///
/// It is a newtype wrapper around a netlink handle.  Cloning it is cheap and all clones share the
/// same netlink connection.
#[derive(Clone, Debug)]
pub struct Manager {
    handle: Arc<Handle>,
}

impl Manager {
    /// Crate a new `Manager` from an [`Arc<Handle>`].
    #[must_use]
    pub fn new(handle: Arc<Handle>) -> Self {
        Manager { handle }
    }

    /// Open a netlink connection and drive it on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StackError::Socket`] if the netlink socket cannot be opened.
    ///
    /// # Panics
    ///
    /// If called outside of a tokio runtime.
    pub fn connect() -> Result<Self, StackError> {
        let (connection, handle, _) = rtnetlink::new_connection().map_err(StackError::Socket)?;
        tokio::spawn(connection);
        Ok(Manager::new(Arc::new(handle)))
    }
}
