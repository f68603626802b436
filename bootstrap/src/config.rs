// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Static configuration of a bootstrap run.

use cube::models::LogLevel;
use derive_builder::Builder;
use ipnet::Ipv4Net;
use net::interface::InterfaceName;
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::num::NonZero;
use std::path::PathBuf;
use std::str::FromStr;

/// Default name of the overlay VXLAN device.
pub const DEFAULT_VXLAN_NAME: &str = "vxlan0";
/// Default pool the VTEP addresses are taken from.
pub const DEFAULT_VTEP_POOL: &str = "10.18.0.0/16";
/// Default path of the CNI configuration file.
pub const DEFAULT_CNI_CONF_PATH: &str = "/etc/cni/net.d/00-polykube.json";
/// Default pod overlay prefix, covering the pod subnets of every node.
pub const DEFAULT_POD_OVERLAY: &str = "10.10.0.0/16";
/// Default MTU announced to pods.
pub const DEFAULT_MTU: NonZero<u32> = match NonZero::new(1450) {
    Some(mtu) => mtu,
    None => unreachable!(),
};
/// Default virtual IP range of cluster-IP services.
pub const DEFAULT_CLUSTER_IP_SUBNET: &str = "11.11.11.0/24";
/// Default source address for services with a cluster-wide external traffic policy.
pub const DEFAULT_INTERNAL_SRC_IP: Ipv4Addr = Ipv4Addr::new(3, 3, 1, 3);
/// Default NodePort range.
pub const DEFAULT_NODEPORT_RANGE: NodePortRange = NodePortRange {
    low: 30000,
    high: 32767,
};
/// Default prefix of worker node names.
pub const DEFAULT_WORKER_PREFIX: &str = "worker";

#[allow(clippy::expect_used)] // defaults are legal constant prefixes
fn default_net(text: &str) -> Ipv4Net {
    text.parse().expect("legal default prefix")
}

/// The names of the four network function instances of a node.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(setter(into))]
pub struct FunctionNames {
    /// The L2 bridge pods attach to.
    #[builder(default = "\"br0\".to_string()")]
    pub bridge: String,
    /// The L3 router.
    #[builder(default = "\"r0\".to_string()")]
    pub router: String,
    /// The load-balancer / reverse proxy.
    #[builder(default = "\"lbrp0\".to_string()")]
    pub lbrp: String,
    /// The kubernetes service dispatcher.
    #[builder(default = "\"k0\".to_string()")]
    pub k8sdispatcher: String,
}

impl Default for FunctionNames {
    fn default() -> Self {
        Self {
            bridge: "br0".to_string(),
            router: "r0".to_string(),
            lbrp: "lbrp0".to_string(),
            k8sdispatcher: "k0".to_string(),
        }
    }
}

/// An inclusive range of transport ports, written `low-high`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NodePortRange {
    /// First port of the range.
    pub low: u16,
    /// Last port of the range.
    pub high: u16,
}

/// Errors produced when parsing a [`NodePortRange`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NodePortRangeError {
    /// The text is not of the form `low-high`.
    #[error("{0:?} is not a port range of the form low-high")]
    Malformed(String),
    /// The range is empty.
    #[error("port range {low}-{high} is empty")]
    Empty {
        /// First port.
        low: u16,
        /// Last port.
        high: u16,
    },
}

impl FromStr for NodePortRange {
    type Err = NodePortRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || NodePortRangeError::Malformed(s.to_string());
        let (low, high) = s.trim().split_once('-').ok_or_else(malformed)?;
        let low: u16 = low.parse().map_err(|_| malformed())?;
        let high: u16 = high.parse().map_err(|_| malformed())?;
        if low > high {
            return Err(NodePortRangeError::Empty { low, high });
        }
        Ok(NodePortRange { low, high })
    }
}

impl Display for NodePortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// Service dispatching parameters declared when the dispatcher is created.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// The virtual IP range of cluster-IP services.
    #[builder(default = "default_net(DEFAULT_CLUSTER_IP_SUBNET)")]
    pub cluster_ip_subnet: Ipv4Net,
    /// Source address for traffic to services with a cluster-wide external traffic policy.
    #[builder(default = "DEFAULT_INTERNAL_SRC_IP")]
    pub internal_src_ip: Ipv4Addr,
    /// Ports reserved for NodePort services.
    #[builder(default = "DEFAULT_NODEPORT_RANGE")]
    pub nodeport_range: NodePortRange,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            cluster_ip_subnet: default_net(DEFAULT_CLUSTER_IP_SUBNET),
            internal_src_ip: DEFAULT_INTERNAL_SRC_IP,
            nodeport_range: DEFAULT_NODEPORT_RANGE,
        }
    }
}

/// Configuration of a bootstrap run, resolved once at startup.
///
/// Only the node name has no default.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(setter(into))]
pub struct EnvironmentConfig {
    /// Name of the node being bootstrapped, as known to the cluster.
    pub node_name: String,
    /// Name of the overlay VXLAN device to create.
    #[builder(default = "default_vxlan_name()")]
    pub vxlan_name: InterfaceName,
    /// The pool VTEP addresses are taken from, by node ordinal.
    #[builder(default = "default_net(DEFAULT_VTEP_POOL)")]
    pub vtep_pool: Ipv4Net,
    /// Where the CNI configuration is written.
    #[builder(default = "PathBuf::from(DEFAULT_CNI_CONF_PATH)")]
    pub cni_conf_path: PathBuf,
    /// The prefix covering the pod subnets of every node.
    #[builder(default = "default_net(DEFAULT_POD_OVERLAY)")]
    pub pod_overlay: Ipv4Net,
    /// MTU announced to pods.
    #[builder(default = "DEFAULT_MTU")]
    pub mtu: NonZero<u32>,
    /// Names of the network function instances.
    #[builder(default)]
    pub functions: FunctionNames,
    /// Parameters of the service dispatcher.
    #[builder(default)]
    pub dispatcher: DispatcherSettings,
    /// Log level of the network function instances.
    #[builder(default = "LogLevel::Trace")]
    pub cube_log_level: LogLevel,
    /// Prefix of the names of the nodes taking part in the overlay.
    #[builder(default = "DEFAULT_WORKER_PREFIX.to_string()")]
    pub worker_prefix: String,
}

#[allow(clippy::expect_used)] // the default is a legal constant name
fn default_vxlan_name() -> InterfaceName {
    InterfaceName::try_from(DEFAULT_VXLAN_NAME).expect("legal default vxlan name")
}

impl Display for EnvironmentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Bootstrap config")?;
        writeln!(f, "  node          : {}", self.node_name)?;
        writeln!(f, "  vxlan         : {}", self.vxlan_name)?;
        writeln!(f, "  vtep pool     : {}", self.vtep_pool)?;
        writeln!(f, "  pod overlay   : {}", self.pod_overlay)?;
        writeln!(f, "  mtu           : {}", self.mtu)?;
        writeln!(f, "  cni config    : {}", self.cni_conf_path.display())?;
        writeln!(
            f,
            "  functions     : {} {} {} {}",
            self.functions.bridge,
            self.functions.router,
            self.functions.lbrp,
            self.functions.k8sdispatcher
        )?;
        writeln!(f, "  cluster ips   : {}", self.dispatcher.cluster_ip_subnet)?;
        writeln!(f, "  internal src  : {}", self.dispatcher.internal_src_ip)?;
        writeln!(f, "  nodeports     : {}", self.dispatcher.nodeport_range)?;
        write!(f, "  worker prefix : {}", self.worker_prefix)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn only_the_node_name_is_required() {
        assert!(EnvironmentConfigBuilder::default().build().is_err());
        let config = EnvironmentConfigBuilder::default()
            .node_name("worker1")
            .build()
            .unwrap();
        assert_eq!(config.vxlan_name.as_ref(), "vxlan0");
        assert_eq!(config.vtep_pool.to_string(), "10.18.0.0/16");
        assert_eq!(config.pod_overlay.to_string(), "10.10.0.0/16");
        assert_eq!(config.mtu.get(), 1450);
        assert_eq!(config.functions, FunctionNames::default());
        assert_eq!(config.functions.k8sdispatcher, "k0");
        assert_eq!(config.dispatcher.nodeport_range.to_string(), "30000-32767");
        assert_eq!(config.cube_log_level, LogLevel::Trace);
        assert_eq!(config.worker_prefix, "worker");
    }

    #[test]
    fn function_names_can_be_partially_overridden() {
        let names = FunctionNamesBuilder::default()
            .router("core")
            .build()
            .unwrap();
        assert_eq!(names.router, "core");
        assert_eq!(names.bridge, "br0");
    }

    #[test]
    fn nodeport_ranges_parse() {
        assert_eq!(
            "30000-32767".parse::<NodePortRange>().unwrap(),
            DEFAULT_NODEPORT_RANGE
        );
        assert_eq!(
            "80-80".parse::<NodePortRange>().unwrap(),
            NodePortRange { low: 80, high: 80 }
        );
        assert!(matches!(
            "32767-30000".parse::<NodePortRange>(),
            Err(NodePortRangeError::Empty { .. })
        ));
        for bad in ["30000", "a-b", "30000-70000", "-1-5", ""] {
            assert!(
                matches!(
                    bad.parse::<NodePortRange>(),
                    Err(NodePortRangeError::Malformed(_))
                ),
                "{bad}"
            );
        }
    }
}
