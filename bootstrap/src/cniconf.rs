// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! The configuration file read by the CNI plugin on every pod creation.

use crate::config::EnvironmentConfig;
use crate::error::BootstrapError;
use crate::state::NodeTopologyState;
use ipnet::Ipv4Net;
use net::eth::mac::Mac;
use net::ipv4;
use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::info;

/// CNI specification version of the emitted file.
pub const CNI_VERSION: &str = "0.4.0";
/// Network name of the emitted file.
pub const CNI_NETWORK: &str = "mynet";
/// The plugin the runtime invokes for this network.
pub const CNI_PLUGIN: &str = "polykube-cni-plugin";

/// The plugin configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CniConfig {
    #[serde(rename = "cniVersion")]
    cni_version: &'static str,
    name: &'static str,
    #[serde(rename = "type")]
    plugin: &'static str,
    #[serde(rename = "MTU")]
    mtu: u32,
    vclustercidr: Ipv4Net,
    bridge: String,
    gateway: CniGateway,
    ipam: CniIpam,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct CniGateway {
    ip: Ipv4Addr,
    mac: Mac,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct CniIpam {
    #[serde(rename = "type")]
    plugin: &'static str,
    ranges: Vec<Vec<CniRange>>,
    #[serde(rename = "dataDir")]
    data_dir: String,
    #[serde(rename = "resolvConf")]
    resolv_conf: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct CniRange {
    subnet: Ipv4Net,
    range_start: Ipv4Addr,
    range_end: Ipv4Addr,
    gateway: Ipv4Addr,
}

impl CniConfig {
    /// Describe the pod network of a node whose pod gateway mac is known.
    ///
    /// Pods get addresses from the one after the network address up to the one before the
    /// gateway.
    ///
    /// # Errors
    ///
    /// Fails with [`BootstrapError::GatewayMacUnresolved`] if the pod gateway mac is pending.
    pub fn new(config: &EnvironmentConfig, state: &NodeTopologyState) -> Result<Self, BootstrapError> {
        let gateway = state.pod_gateway.address.addr();
        let mac = state
            .pod_gateway
            .mac
            .ok_or_else(|| BootstrapError::GatewayMacUnresolved {
                gateway,
                interface: config.functions.bridge.clone(),
            })?;
        let subnet = state.pod_cidr;
        let range_start = ipv4::next(subnet.network()).unwrap_or(subnet.network());
        let range_end = ipv4::prev(gateway).unwrap_or(gateway);
        Ok(CniConfig {
            cni_version: CNI_VERSION,
            name: CNI_NETWORK,
            plugin: CNI_PLUGIN,
            mtu: config.mtu.get(),
            vclustercidr: config.pod_overlay,
            bridge: config.functions.bridge.clone(),
            gateway: CniGateway { ip: gateway, mac },
            ipam: CniIpam {
                plugin: "host-local",
                ranges: vec![vec![CniRange {
                    subnet,
                    range_start,
                    range_end,
                    gateway,
                }]],
                data_dir: format!("/var/lib/cni/networks/{CNI_NETWORK}"),
                resolv_conf: "/etc/resolv.conf",
            },
        })
    }

    /// Serialize as pretty printed JSON.
    ///
    /// # Errors
    ///
    /// Fails if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Write the configuration to `path`, replacing any previous content.
///
/// # Errors
///
/// Fails with [`BootstrapError::ConfigEmit`] if the file cannot be written.
pub async fn emit(path: &Path, conf: &CniConfig) -> Result<(), BootstrapError> {
    let emit_error = |source| BootstrapError::ConfigEmit {
        path: path.to_path_buf(),
        source,
    };
    let json = conf.to_json().map_err(|e| emit_error(std::io::Error::other(e)))?;
    tokio::fs::write(path, json).await.map_err(emit_error)?;
    info!("wrote cni configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::EnvironmentConfigBuilder;
    use crate::state::{GatewayInfo, InterfaceDescriptor};
    use net::interface::InterfaceIndex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn state(mac: Option<Mac>) -> NodeTopologyState {
        NodeTopologyState {
            node: "worker3".into(),
            pod_cidr: "10.10.3.0/24".parse().unwrap(),
            pod_gateway: GatewayInfo {
                address: "10.10.3.254/24".parse().unwrap(),
                mac,
            },
            external: InterfaceDescriptor {
                name: "eth0".try_into().unwrap(),
                index: InterfaceIndex::try_new(2).unwrap(),
                address: "192.168.1.13/24".parse().unwrap(),
                mac: None,
            },
            vtep: "10.18.0.3/16".parse().unwrap(),
            uplink_gateway: GatewayInfo::pending("192.168.1.1/24".parse().unwrap()),
            vxlan: None,
        }
    }

    fn config() -> EnvironmentConfig {
        EnvironmentConfigBuilder::default()
            .node_name("worker3")
            .build()
            .unwrap()
    }

    #[test]
    fn document_matches_the_plugin_format() {
        let mac = Mac([0x02, 0xfc, 0, 0, 0, 1]);
        let conf = CniConfig::new(&config(), &state(Some(mac))).unwrap();
        assert_eq!(
            serde_json::to_value(&conf).unwrap(),
            json!({
                "cniVersion": "0.4.0",
                "name": "mynet",
                "type": "polykube-cni-plugin",
                "MTU": 1450,
                "vclustercidr": "10.10.0.0/16",
                "bridge": "br0",
                "gateway": {"ip": "10.10.3.254", "mac": "02:fc:00:00:00:01"},
                "ipam": {
                    "type": "host-local",
                    "ranges": [[{
                        "subnet": "10.10.3.0/24",
                        "rangeStart": "10.10.3.1",
                        "rangeEnd": "10.10.3.253",
                        "gateway": "10.10.3.254",
                    }]],
                    "dataDir": "/var/lib/cni/networks/mynet",
                    "resolvConf": "/etc/resolv.conf",
                },
            })
        );
    }

    #[test]
    fn pending_gateway_mac_is_refused() {
        assert!(matches!(
            CniConfig::new(&config(), &state(None)),
            Err(BootstrapError::GatewayMacUnresolved { .. })
        ));
    }

    #[tokio::test]
    async fn emit_replaces_the_file() {
        let path = std::env::temp_dir().join(format!("polykube-cniconf-{}.json", std::process::id()));
        tokio::fs::write(&path, "x".repeat(4096)).await.unwrap();
        let conf = CniConfig::new(&config(), &state(Some(Mac([2, 0, 0, 0, 0, 1])))).unwrap();
        emit(&path, &conf).await.unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written["ipam"]["ranges"][0][0]["rangeEnd"], "10.10.3.253");
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn unwritable_path_is_an_emit_error() {
        let conf = CniConfig::new(&config(), &state(Some(Mac([2, 0, 0, 0, 0, 1])))).unwrap();
        let path = Path::new("/nonexistent-polykube-dir/conf.json");
        assert!(matches!(
            emit(path, &conf).await,
            Err(BootstrapError::ConfigEmit { .. })
        ));
    }
}
