//! Virtual machine lifecycle management for OpenStack-style clouds.
//!
//! A [`VirtualMachine`] wraps a [`VmDescriptor`] and drives it through
//! provisioning (flavor and image resolution, instance creation, floating IP,
//! optional volume, SSH readiness), power transitions, queries and teardown.
//! Provider access goes through the [`ProviderGateway`] contract so the
//! lifecycle can run against any implementation, including the in-memory
//! doubles in [`test_support`].

pub mod config;
pub mod descriptor;
pub mod error;
pub mod gateway;
pub mod image;
pub mod lifecycle;
pub mod network;
pub mod poll;
pub mod ssh;
pub mod state_store;
#[cfg(test)]
pub mod test_helpers;
pub mod test_support;
pub mod volume;

pub use config::{ConfigError, LifecycleConfig, LifecycleSettings};
pub use descriptor::{
    FloatingIp, ImageMetadata, ProviderEndpoint, ProvisionedState, SshCredentials, VmConfig,
    VmDescriptor, VmDescriptorBuilder, VolumeRecord, VolumeSpec,
};
pub use error::{CombinedError, LifecycleError, RollbackOutcome, Stage};
pub use gateway::{Connector, GatewayError, ProviderGateway, VmState};
pub use lifecycle::{IpPair, VirtualMachine};
pub use ssh::{SshClient, SshOptions, SshProbe, TcpProbe};
pub use state_store::{DescriptorStore, StateStoreError};
