//! In-memory provider world shared by integration tests.
//!
//! Included from each test binary via `#[path = "common/world.rs"]`. Bind it
//! under a name other than `world` when the binary also declares a `world`
//! fixture.

use std::time::Duration;

use stratus::test_support::{FakeConnector, FakeGateway, FakeProbe};
use stratus::{LifecycleSettings, SshCredentials, VirtualMachine, VmDescriptor};

/// Machine type driven by every integration test.
pub type Machine = VirtualMachine<FakeConnector, FakeProbe>;

/// Fake provider with one flavor and one image registered.
#[derive(Clone)]
pub struct World {
    pub gateway: FakeGateway,
    pub connector: FakeConnector,
    pub probe: FakeProbe,
}

impl World {
    pub fn new() -> Self {
        let gateway = FakeGateway::new();
        gateway.add_flavor("m1.medium", "flavor-2");
        gateway.add_image("ubuntu-24.04", "img-1");
        Self {
            connector: FakeConnector::new(gateway.clone()),
            gateway,
            probe: FakeProbe::reachable(),
        }
    }

    pub fn machine(&self, descriptor: VmDescriptor) -> Machine {
        VirtualMachine::with_probe(
            descriptor,
            self.connector.clone(),
            self.probe.clone(),
            LifecycleSettings {
                poll_interval: Duration::from_millis(1),
                action_timeout: Duration::from_millis(40),
                ssh_timeout: Duration::from_millis(40),
                ssh_connect_timeout: Duration::from_millis(10),
                ssh_port: 22,
            },
        )
    }
}

/// Descriptor for `web-1` using `flavor`.
pub fn descriptor(flavor: &str) -> VmDescriptor {
    VmDescriptor::builder()
        .identity_endpoint("https://identity.example.test/v3")
        .account("demo", "secret")
        .region("RegionOne")
        .flavor_name(flavor)
        .image_id("img-1")
        .name("web-1")
        .network("net-1")
        .floating_ip_pool("public")
        .credentials(SshCredentials {
            user: String::from("ubuntu"),
            password: None,
            private_key: None,
        })
        .build()
        .unwrap_or_else(|err| panic!("descriptor: {err}"))
}
