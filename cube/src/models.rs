// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Request and response bodies of the management API.
//!
//! Field names follow the daemon's kebab-case JSON.  Optional fields are omitted when unset so
//! that partial bodies (e.g. a port update carrying only a peer) leave other fields untouched.

#![allow(missing_docs)] // fields mirror the daemon's schema

use net::eth::mac::Mac;
use serde::{Deserialize, Serialize};

/// Logging level of a function instance.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    PartialEq,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    #[serde(rename = "ERR")]
    #[strum(to_string = "ERR", serialize = "ERROR")]
    Err,
    Critical,
    Off,
}

/// A body carrying only the peer of a port.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct PortPeer {
    pub peer: String,
}

/// An L2 learning bridge.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Simplebridge {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loglevel: Option<LogLevel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<BridgePort>,
}

/// A port of a [`Simplebridge`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct BridgePort {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

/// An L3 router.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Router {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loglevel: Option<LogLevel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<RouterPort>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub route: Vec<RouterRoute>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arp_table: Vec<ArpEntry>,
}

impl Router {
    /// The port called `name`, if any.
    #[must_use]
    pub fn port(&self, name: &str) -> Option<&RouterPort> {
        self.ports.iter().find(|p| p.name == name)
    }
}

/// A port of a [`Router`].
///
/// `ip` is in CIDR form.  The daemon assigns a `mac` on creation when none is given.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RouterPort {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<Mac>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

/// A static route of a [`Router`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RouterRoute {
    pub network: String,
    pub nexthop: String,
    pub interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pathcost: Option<u32>,
}

/// A static ARP entry of a [`Router`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ArpEntry {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<Mac>,
    pub interface: String,
}

/// Role of an [`Lbrp`] port.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LbrpPortType {
    /// Faces the clients.
    #[default]
    Frontend,
    /// Faces the service backends.
    Backend,
}

/// A load-balancer / reverse proxy.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Lbrp {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loglevel: Option<LogLevel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<LbrpPort>,
}

/// A port of an [`Lbrp`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct LbrpPort {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: LbrpPortType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

/// Role of a [`K8sDispatcher`] port.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum K8sDispatcherPortType {
    /// Faces the node's external network.
    #[default]
    Frontend,
    /// Faces the load balancer.
    Backend,
}

/// The kubernetes service dispatcher.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct K8sDispatcher {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loglevel: Option<LogLevel>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<K8sDispatcherPort>,
    /// Range of virtual IPs where cluster-IP services are exposed.
    pub cluster_ip_subnet: String,
    /// The pod subnet of this node.
    pub client_subnet: String,
    /// Source address for services with `externalTrafficPolicy=Cluster`.
    pub internal_src_ip: String,
    /// Port range used for NodePort services, as `low-high`.
    pub nodeport_range: String,
}

/// A port of a [`K8sDispatcher`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct K8sDispatcherPort {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: K8sDispatcherPortType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn router_serializes_as_the_daemon_expects() {
        let router = Router {
            name: "r0".into(),
            loglevel: Some(LogLevel::Trace),
            ports: vec![RouterPort {
                name: "to_br0".into(),
                ip: Some("10.10.1.254/24".into()),
                mac: Some(Mac([0xaa, 0xbb, 0xcc, 0, 0, 1])),
                peer: None,
            }],
            route: vec![RouterRoute {
                network: "0.0.0.0/0".into(),
                nexthop: "192.168.1.1".into(),
                interface: "to_lbrp0".into(),
                pathcost: None,
            }],
            arp_table: vec![ArpEntry {
                address: "192.168.1.1".into(),
                mac: Some(Mac([0x52, 0x54, 0, 0, 0, 1])),
                interface: "to_lbrp0".into(),
            }],
        };
        assert_eq!(
            serde_json::to_value(&router).unwrap(),
            json!({
                "name": "r0",
                "loglevel": "TRACE",
                "ports": [{"name": "to_br0", "ip": "10.10.1.254/24", "mac": "aa:bb:cc:00:00:01"}],
                "route": [{"network": "0.0.0.0/0", "nexthop": "192.168.1.1", "interface": "to_lbrp0"}],
                "arp-table": [{"address": "192.168.1.1", "mac": "52:54:00:00:00:01", "interface": "to_lbrp0"}],
            })
        );
    }

    #[test]
    fn port_types_differ_in_case_between_functions() {
        let lbrp = LbrpPort {
            name: "to_r0".into(),
            kind: LbrpPortType::Backend,
            peer: None,
        };
        let k8s = K8sDispatcherPort {
            name: "to_lbrp0".into(),
            kind: K8sDispatcherPortType::Backend,
            peer: None,
        };
        assert_eq!(serde_json::to_value(&lbrp).unwrap()["type"], "backend");
        assert_eq!(serde_json::to_value(&k8s).unwrap()["type"], "BACKEND");
    }

    #[test]
    fn dispatcher_settings_are_kebab_case() {
        let k = K8sDispatcher {
            name: "k0".into(),
            cluster_ip_subnet: "11.11.11.0/24".into(),
            client_subnet: "10.10.1.0/24".into(),
            internal_src_ip: "3.3.1.3".into(),
            nodeport_range: "30000-32767".into(),
            ..Default::default()
        };
        let value = serde_json::to_value(&k).unwrap();
        assert_eq!(value["cluster-ip-subnet"], "11.11.11.0/24");
        assert_eq!(value["client-subnet"], "10.10.1.0/24");
        assert_eq!(value["internal-src-ip"], "3.3.1.3");
        assert_eq!(value["nodeport-range"], "30000-32767");
        assert!(value.get("ports").is_none());
    }

    #[test]
    fn unknown_response_fields_are_ignored() {
        let router: Router = serde_json::from_value(json!({
            "name": "r0",
            "uuid": "c0ffee",
            "type": "TC",
            "ports": [{"name": "to_br0", "uuid": "x", "status": "UP", "mac": "AA:BB:CC:00:00:02"}],
        }))
        .unwrap();
        assert_eq!(
            router.port("to_br0").and_then(|p| p.mac),
            Some(Mac([0xaa, 0xbb, 0xcc, 0, 0, 2]))
        );
    }

    #[test]
    fn log_levels_parse_case_insensitively() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("ERROR".parse::<LogLevel>().unwrap(), LogLevel::Err);
        assert_eq!(LogLevel::Err.to_string(), "ERR");
        assert!("LOUD".parse::<LogLevel>().is_err());
    }
}
