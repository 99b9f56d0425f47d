//! Shared fixtures for lifecycle tests.

use std::time::Duration;

use rstest::fixture;

use super::super::VirtualMachine;
use crate::config::LifecycleSettings;
use crate::descriptor::{SshCredentials, VmDescriptor, VmDescriptorBuilder, VolumeSpec};
use crate::test_support::{FakeConnector, FakeGateway, FakeProbe};

pub type TestMachine = VirtualMachine<FakeConnector, FakeProbe>;

/// Fakes shared between a machine and the assertions made on it.
pub struct Harness {
    pub gateway: FakeGateway,
    pub connector: FakeConnector,
    pub probe: FakeProbe,
}

impl Harness {
    pub fn machine(&self, descriptor: VmDescriptor) -> TestMachine {
        VirtualMachine::with_probe(
            descriptor,
            self.connector.clone(),
            self.probe.clone(),
            settings(),
        )
    }
}

pub fn settings() -> LifecycleSettings {
    LifecycleSettings {
        poll_interval: Duration::from_millis(1),
        action_timeout: Duration::from_millis(50),
        ssh_timeout: Duration::from_millis(50),
        ssh_connect_timeout: Duration::from_millis(10),
        ssh_port: 22,
    }
}

#[fixture]
pub fn harness() -> Harness {
    let gateway = FakeGateway::new();
    gateway.add_flavor("m1.medium", "flavor-2");
    gateway.add_image("ubuntu-24.04", "img-1");
    Harness {
        connector: FakeConnector::new(gateway.clone()),
        gateway,
        probe: FakeProbe::reachable(),
    }
}

pub fn builder() -> VmDescriptorBuilder {
    VmDescriptor::builder()
        .identity_endpoint("https://identity.example.test/v3")
        .account("demo", "secret")
        .region("RegionOne")
        .tenant_name("demo")
        .flavor_name("m1.medium")
        .image_id("img-1")
        .name("web-1")
        .network("net-1")
        .floating_ip_pool("public")
        .credentials(SshCredentials {
            user: String::from("ubuntu"),
            password: None,
            private_key: None,
        })
}

#[fixture]
pub fn descriptor() -> VmDescriptor {
    builder()
        .build()
        .unwrap_or_else(|err| panic!("descriptor: {err}"))
}

pub fn descriptor_with_volume() -> VmDescriptor {
    builder()
        .volume(VolumeSpec {
            name: String::from("data"),
            size_gb: 10,
            volume_type: None,
            device: None,
        })
        .build()
        .unwrap_or_else(|err| panic!("descriptor: {err}"))
}

pub async fn provisioned(harness: &Harness, descriptor: VmDescriptor) -> TestMachine {
    let mut machine = harness.machine(descriptor);
    machine
        .provision()
        .await
        .unwrap_or_else(|err| panic!("provision: {err}"));
    machine
}
