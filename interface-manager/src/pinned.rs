// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Run async work on a dedicated operating system thread.
//!
//! Netlink state such as the network namespace is per thread, so every kernel mutation of one
//! bootstrap run happens on a single thread with its own single threaded tokio runtime.

use std::future::Future;
use tracing::debug;

/// Errors which prevent the pinned work from running to completion.
#[derive(Debug, thiserror::Error)]
pub enum PinnedError {
    /// The operating system refused to spawn the thread.
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        /// The requested thread name.
        name: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The tokio runtime could not be built.
    #[error("failed to build tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// The work panicked.
    #[error("thread {0} panicked")]
    Panicked(String),
}

/// Run an (async) function or closure on a new named thread and wait for its result.
///
/// The future is created on the new thread, so it need not be `Send`.
///
/// # Errors
///
/// Returns a [`PinnedError`] if the thread or runtime cannot be created or the work panics.
pub fn run_pinned<Exec, Fut, Out>(thread_name: &str, exec: Exec) -> Result<Out, PinnedError>
where
    Exec: (FnOnce() -> Fut) + Send + 'static,
    Fut: Future<Output = Out>,
    Out: Send + 'static,
{
    let name = thread_name.to_string();
    debug!("starting pinned thread {name}");
    let handle = std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || -> Result<Out, std::io::Error> {
            let tokio_runtime = tokio::runtime::Builder::new_current_thread()
                .enable_io()
                .enable_time()
                .build()?;
            Ok(tokio_runtime.block_on(exec()))
        })
        .map_err(|source| PinnedError::Spawn {
            name: name.clone(),
            source,
        })?;
    match handle.join() {
        Ok(Ok(out)) => Ok(out),
        Ok(Err(e)) => Err(PinnedError::Runtime(e)),
        Err(_) => Err(PinnedError::Panicked(name)),
    }
}
