// SPDX-License-Identifier: Apache-2.0
// Copyright Polykube Authors

//! Overlay interface manager.

use crate::error::BootstrapError;
use crate::state::InterfaceDescriptor;
use interface_manager::{NetworkStack, StackError, VxlanSpecBuilder};
use ipnet::Ipv4Net;
use net::interface::InterfaceName;
use net::vxlan::{VXLAN_PORT, Vni};
use tracing::info;

/// The network identifier of the pod overlay.
pub const OVERLAY_VNI: Vni = match Vni::new_checked(42) {
    Ok(vni) => vni,
    Err(_) => unreachable!(),
};

/// Create the overlay VXLAN device on top of `underlay`, bring it up and give it the VTEP address.
///
/// Nothing is undone if a later step fails.
///
/// # Errors
///
/// Fails with [`BootstrapError::InterfaceCreation`] if any step is refused by the kernel.
pub async fn create_vxlan_interface<S: NetworkStack>(
    stack: &S,
    name: &InterfaceName,
    underlay: &InterfaceDescriptor,
    vtep: Ipv4Net,
) -> Result<InterfaceDescriptor, BootstrapError> {
    let spec = VxlanSpecBuilder::default()
        .name(name.clone())
        .vni(OVERLAY_VNI)
        .port(VXLAN_PORT)
        .underlay(underlay.index)
        .build()
        .map_err(|e| BootstrapError::creation(name, "describe")(StackError::Rejected(e.to_string())))?;
    stack
        .create_vxlan(&spec)
        .await
        .map_err(BootstrapError::creation(name, "create"))?;
    let link = stack
        .link_by_name(name)
        .await
        .map_err(BootstrapError::creation(name, "look up"))?
        .ok_or_else(|| {
            BootstrapError::creation(name, "look up")(StackError::Rejected(format!(
                "{name} vanished after creation"
            )))
        })?;
    stack
        .set_up(link.index)
        .await
        .map_err(BootstrapError::creation(name, "bring up"))?;
    stack
        .add_address(link.index, vtep)
        .await
        .map_err(BootstrapError::creation(name, "address"))?;
    info!(
        "created {name} (vni {OVERLAY_VNI}, port {VXLAN_PORT}) over {} with {vtep}",
        underlay.name
    );
    Ok(InterfaceDescriptor {
        name: link.name,
        index: link.index,
        address: vtep,
        mac: link.mac,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use interface_manager::fake::FakeNetworkStack;
    use pretty_assertions::assert_eq;

    fn underlay(stack: &FakeNetworkStack) -> InterfaceDescriptor {
        let address: Ipv4Net = "192.168.1.11/24".parse().unwrap();
        let index = stack.add_link("eth0".try_into().unwrap(), None, &[address]);
        InterfaceDescriptor {
            name: "eth0".try_into().unwrap(),
            index,
            address,
            mac: None,
        }
    }

    #[tokio::test]
    async fn vxlan_is_created_up_and_addressed() {
        let stack = FakeNetworkStack::default();
        let eth0 = underlay(&stack);
        let vtep: Ipv4Net = "10.18.0.1/16".parse().unwrap();
        let name: InterfaceName = "vxlan0".try_into().unwrap();
        let vxlan = create_vxlan_interface(&stack, &name, &eth0, vtep)
            .await
            .unwrap();
        assert_eq!(vxlan.name, name);
        assert_eq!(vxlan.address, vtep);
        assert!(stack.is_up(vxlan.index));
        assert_eq!(stack.addresses(vxlan.index), vec![vtep]);
        let spec = stack.vxlan(vxlan.index).unwrap();
        assert_eq!(spec.vni.as_u32(), 42);
        assert_eq!(spec.port, 4789);
        assert_eq!(spec.underlay, eth0.index);
    }

    #[tokio::test]
    async fn existing_device_is_a_creation_error() {
        let stack = FakeNetworkStack::default();
        let eth0 = underlay(&stack);
        let name: InterfaceName = "vxlan0".try_into().unwrap();
        let vtep: Ipv4Net = "10.18.0.1/16".parse().unwrap();
        create_vxlan_interface(&stack, &name, &eth0, vtep)
            .await
            .unwrap();
        assert!(matches!(
            create_vxlan_interface(&stack, &name, &eth0, vtep).await,
            Err(BootstrapError::InterfaceCreation { step: "create", .. })
        ));
    }
}
