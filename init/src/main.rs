// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

#![doc = include_str!("../README.md")]
#![deny(clippy::all, clippy::pedantic, missing_docs)]

use args::CmdArgs;
use bootstrap::ordinal::NamePrefixOrdinals;
use bootstrap::{Bootstrap, BootstrapError, NodeTopologyState};
use cluster::{ClusterError, KubeNodeSource};
use cube::{CubeClientSet, ManagementApiError, PolycubeClient};
use interface_manager::pinned::{PinnedError, run_pinned};
use interface_manager::{Manager, StackError};
use std::error::Error;
use std::sync::Arc;
use tracectl::{custom_target, get_trace_ctl, trace_target};
use tracing::{error, info};

trace_target!("polykube-init", LevelFilter::INFO, &["init"]);
custom_target!("hyper_util", LevelFilter::ERROR, &[]);
custom_target!("h2", LevelFilter::ERROR, &[]);
custom_target!("rustls", LevelFilter::ERROR, &[]);

/// Errors which abort the process.
#[derive(Debug, thiserror::Error)]
enum InitErr {
    /// The netlink socket cannot be opened.
    #[error("failed to open netlink socket")]
    Netlink(#[source] StackError),
    /// The management API client cannot be built.
    #[error(transparent)]
    ManagementApi(#[from] ManagementApiError),
    /// The cluster API cannot be reached.
    #[error(transparent)]
    Cluster(#[from] ClusterError),
    /// The bootstrap run failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The bootstrap thread could not run.
    #[error(transparent)]
    Pinned(#[from] PinnedError),
}

async fn bootstrap(args: &CmdArgs) -> Result<NodeTopologyState, InitErr> {
    let config = args.environment_config();
    info!("{config}");

    let nodes = KubeNodeSource::connect(args.kubeconfig()).await?;
    let clients = CubeClientSet::from_client(Arc::new(PolycubeClient::new(args.api_base())?));
    let stack = Manager::connect().map_err(InitErr::Netlink)?;
    let ordinals = NamePrefixOrdinals::new(config.worker_prefix.clone());

    let state = Bootstrap::new(&config, &stack, &clients, &nodes, &ordinals)
        .run()
        .await?;
    Ok(state)
}

fn report(err: &dyn Error) {
    error!("{err}");
    let mut source = err.source();
    while let Some(cause) = source {
        error!("  caused by: {cause}");
        source = cause.source();
    }
}

fn main() {
    let args = CmdArgs::parse_tracking_defaults();
    let tctl = get_trace_ctl();
    if let Some(tracing) = args.tracing()
        && let Err(e) = tctl.setup_from_string(tracing)
    {
        error!("Invalid tracing configuration: {e}");
        std::process::exit(1);
    }
    if args.show_tracing_targets() {
        tctl.dump();
        std::process::exit(0);
    }
    args.warn_defaults();

    info!("Starting polykube-init...");
    let outcome = run_pinned("polykube-init", move || async move { bootstrap(&args).await })
        .map_err(InitErr::from)
        .and_then(|run| run);
    match outcome {
        Ok(state) => {
            info!(
                "node {} ready: pods {} via {}",
                state.node, state.pod_cidr, state.pod_gateway
            );
        }
        Err(e) => {
            report(&e);
            std::process::exit(1);
        }
    }
}
