// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Command line of the node bootstrap.
//!
//! Every option can also be given through the environment variable the node agent daemonset
//! sets, and most have a default.  Defaults that end up being used are remembered so that they
//! can be reported once logging is up.

#![deny(clippy::all, clippy::pedantic, missing_docs)]

use bootstrap::EnvironmentConfig;
use bootstrap::config::{
    DEFAULT_CLUSTER_IP_SUBNET, DEFAULT_CNI_CONF_PATH, DEFAULT_INTERNAL_SRC_IP, DEFAULT_MTU,
    DEFAULT_NODEPORT_RANGE, DEFAULT_POD_OVERLAY, DEFAULT_VTEP_POOL, DEFAULT_VXLAN_NAME,
    DEFAULT_WORKER_PREFIX, DispatcherSettings, FunctionNames, NodePortRange,
};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches};
use cube::models::LogLevel;
use ipnet::Ipv4Net;
use net::interface::{IllegalInterfaceName, InterfaceName};
use net::ipv4;
use std::ffi::OsString;
use std::net::Ipv4Addr;
use std::num::NonZero;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracectl::trace_target;
use tracing::warn;

pub use clap::Parser;

trace_target!("args", LevelFilter::INFO, &["args"]);

/// Default root of the management API.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:9000/polycube/v1";

fn parse_interface_name(text: &str) -> Result<InterfaceName, IllegalInterfaceName> {
    InterfaceName::try_from(text)
}

fn parse_mtu(text: &str) -> Result<NonZero<u32>, String> {
    text.trim()
        .parse::<NonZero<u32>>()
        .map_err(|_| format!("{text:?} is not a positive integer"))
}

/// An option left unset which took its default value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DefaultApplied {
    /// The environment variable which could have set it.
    pub variable: String,
    /// The value used instead.
    pub value: String,
}

/// Options of `polykube-init`.
#[derive(Parser, Clone, Debug)]
#[command(name = "polykube-init")]
#[command(version)]
#[command(about = "Bootstrap a node into the polykube pod overlay", long_about = None)]
pub struct CmdArgs {
    /// Name of this node in the cluster
    #[arg(long, env = "NODE_K8S_NAME", value_name = "NODE")]
    node_name: String,

    /// Name of the overlay VXLAN interface to create
    #[arg(
        long,
        env = "NODE_VXLAN_IFACE_NAME",
        value_name = "IFNAME",
        default_value = DEFAULT_VXLAN_NAME,
        value_parser = parse_interface_name
    )]
    vxlan_name: InterfaceName,

    /// Pool the VTEP addresses of the nodes are taken from
    #[arg(
        long,
        env = "NODE_VTEP_CIDR",
        value_name = "CIDR",
        default_value = DEFAULT_VTEP_POOL,
        value_parser = ipv4::parse_network
    )]
    vtep_cidr: Ipv4Net,

    /// Where to write the CNI configuration
    #[arg(
        long,
        env = "CNI_CONF_FILE_PATH",
        value_name = "PATH",
        default_value = DEFAULT_CNI_CONF_PATH
    )]
    cni_conf_path: PathBuf,

    /// Prefix covering the pod subnets of every node
    #[arg(
        long,
        env = "POLYCUBE_VPODS_RANGE",
        value_name = "CIDR",
        default_value = DEFAULT_POD_OVERLAY,
        value_parser = ipv4::parse_network
    )]
    pods_cidr: Ipv4Net,

    /// MTU announced to pods
    #[arg(
        long,
        env = "POLYCUBE_MTU",
        value_name = "BYTES",
        default_value_t = DEFAULT_MTU,
        value_parser = parse_mtu
    )]
    mtu: NonZero<u32>,

    /// Name of the bridge instance
    #[arg(long, env = "POLYCUBE_BRIDGE_NAME", value_name = "NAME", default_value = "br0")]
    bridge_name: String,

    /// Name of the router instance
    #[arg(long, env = "POLYCUBE_ROUTER_NAME", value_name = "NAME", default_value = "r0")]
    router_name: String,

    /// Name of the load-balancer instance
    #[arg(long, env = "POLYCUBE_LBRP_NAME", value_name = "NAME", default_value = "lbrp0")]
    lbrp_name: String,

    /// Name of the service dispatcher instance
    #[arg(long, env = "POLYCUBE_K8SDISP_NAME", value_name = "NAME", default_value = "k0")]
    k8sdispatcher_name: String,

    /// Root of the network function management API
    #[arg(long, env = "POLYCUBE_API_BASE", value_name = "URL", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Kubeconfig to reach the cluster with, instead of the in-cluster configuration
    #[arg(long, env = "KUBECONFIG", value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    /// Virtual IP range of cluster-IP services
    #[arg(
        long,
        env = "POLYCUBE_CLUSTER_IP_SUBNET",
        value_name = "CIDR",
        default_value = DEFAULT_CLUSTER_IP_SUBNET,
        value_parser = ipv4::parse_network
    )]
    cluster_ip_subnet: Ipv4Net,

    /// Source address of traffic to services with a cluster-wide external traffic policy
    #[arg(
        long,
        env = "POLYCUBE_INTERNAL_SRC_IP",
        value_name = "IP",
        default_value_t = DEFAULT_INTERNAL_SRC_IP
    )]
    internal_src_ip: Ipv4Addr,

    /// Ports reserved for NodePort services
    #[arg(
        long,
        env = "POLYCUBE_NODEPORT_RANGE",
        value_name = "LOW-HIGH",
        default_value_t = DEFAULT_NODEPORT_RANGE,
        value_parser = NodePortRange::from_str
    )]
    nodeport_range: NodePortRange,

    /// Log level of the network function instances
    #[arg(
        long,
        env = "POLYCUBE_CUBE_LOGLEVEL",
        value_name = "LEVEL",
        default_value_t = LogLevel::Trace,
        value_parser = LogLevel::from_str
    )]
    cube_log_level: LogLevel,

    /// Prefix of the names of the nodes taking part in the overlay
    #[arg(
        long,
        env = "POLYKUBE_WORKER_PREFIX",
        value_name = "PREFIX",
        default_value = DEFAULT_WORKER_PREFIX
    )]
    worker_prefix: String,

    #[arg(
        long,
        env = "POLYKUBE_TRACING",
        value_name = "tracing configuration",
        help = "Tracing config string as comma-separated sequence of tag=level, with level one in [off,error,warn,info,debug,trace].
Passing default=level sets the default log-level.
Passing all=level allows setting the log-level of all targets to level.
E.g. default=error,all=info,netlink=debug will set the default target to error, and all the registered targets to info, but enable debug for netlink"
    )]
    tracing: Option<String>,

    #[arg(
        long,
        default_value_t = false,
        help = "Show configurable tracing targets and exit"
    )]
    show_tracing_targets: bool,

    #[arg(skip)]
    defaults: Vec<DefaultApplied>,
}

impl CmdArgs {
    /// Parse the process arguments and environment, exiting with a usage error if they are
    /// invalid.
    #[must_use]
    pub fn parse_tracking_defaults() -> Self {
        let matches = Self::command().get_matches();
        match Self::from_matches(&matches) {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }

    /// Parse `itr` and the environment.
    ///
    /// # Errors
    ///
    /// Returns the usage error clap reports for missing or unparsable options.
    pub fn try_parse_tracking_defaults<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(itr)?;
        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self, clap::Error> {
        let mut args = Self::from_arg_matches(matches)?;
        args.defaults = Self::command()
            .get_arguments()
            .filter(|arg| {
                matches.value_source(arg.get_id().as_str()) == Some(ValueSource::DefaultValue)
            })
            .filter_map(|arg| {
                let variable = arg.get_env()?.to_string_lossy().into_owned();
                let value = arg
                    .get_default_values()
                    .iter()
                    .map(|v| v.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(",");
                Some(DefaultApplied { variable, value })
            })
            .collect();
        Ok(args)
    }

    /// The options which took their default value.
    #[must_use]
    pub fn defaults(&self) -> &[DefaultApplied] {
        &self.defaults
    }

    /// Log a warning for every option which took its default value.
    pub fn warn_defaults(&self) {
        for applied in &self.defaults {
            warn!(
                "{} is not set, using default {}",
                applied.variable, applied.value
            );
        }
    }

    /// The configuration of the bootstrap run.
    #[must_use]
    pub fn environment_config(&self) -> EnvironmentConfig {
        EnvironmentConfig {
            node_name: self.node_name.clone(),
            vxlan_name: self.vxlan_name.clone(),
            vtep_pool: self.vtep_cidr,
            cni_conf_path: self.cni_conf_path.clone(),
            pod_overlay: self.pods_cidr,
            mtu: self.mtu,
            functions: FunctionNames {
                bridge: self.bridge_name.clone(),
                router: self.router_name.clone(),
                lbrp: self.lbrp_name.clone(),
                k8sdispatcher: self.k8sdispatcher_name.clone(),
            },
            dispatcher: DispatcherSettings {
                cluster_ip_subnet: self.cluster_ip_subnet,
                internal_src_ip: self.internal_src_ip,
                nodeport_range: self.nodeport_range,
            },
            cube_log_level: self.cube_log_level,
            worker_prefix: self.worker_prefix.clone(),
        }
    }

    /// Root of the management API.
    #[must_use]
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Explicit kubeconfig, if any.
    #[must_use]
    pub fn kubeconfig(&self) -> Option<&Path> {
        self.kubeconfig.as_deref()
    }

    /// The tracing configuration string, if any.
    #[must_use]
    pub fn tracing(&self) -> Option<&str> {
        self.tracing.as_deref()
    }

    /// Whether to dump the tracing targets and exit.
    #[must_use]
    pub fn show_tracing_targets(&self) -> bool {
        self.show_tracing_targets
    }
}
