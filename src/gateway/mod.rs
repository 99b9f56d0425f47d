//! Provider gateway abstraction.
//!
//! The gateway is the authenticated handle to the provider's compute,
//! network, volume and image APIs. The lifecycle core only depends on this
//! contract; issuing the actual HTTP calls is left to implementations.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8Path;
use thiserror::Error;

use crate::descriptor::{FloatingIp, ImageMetadata, ProviderEndpoint, VolumeSpec};

mod ids;
mod types;

pub use ids::{FlavorId, FloatingIpId, ImageId, InstanceId, VolumeId};
pub use types::{
    AddressKind, ImageStatus, InstanceAddress, InstanceSpec, InstanceStatus, VmState,
    VolumeStatus,
};

/// Category of provider resource, used to qualify lookups and failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResourceKind {
    /// Instance size.
    Flavor,
    /// Machine image.
    Image,
    /// Compute instance.
    Instance,
    /// Block storage volume.
    Volume,
    /// Floating IP allocation.
    FloatingIp,
    /// Tenant network.
    Network,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Flavor => "flavor",
            Self::Image => "image",
            Self::Instance => "instance",
            Self::Volume => "volume",
            Self::FloatingIp => "floating ip",
            Self::Network => "network",
        };
        f.write_str(label)
    }
}

/// Errors raised by gateway implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GatewayError {
    /// The named resource does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Category of the missing resource.
        kind: ResourceKind,
        /// Name or identifier used for the lookup.
        name: String,
    },
    /// The provider rejected the credentials or session.
    #[error("authentication rejected: {message}")]
    Auth {
        /// Message returned by the provider.
        message: String,
    },
    /// Any other remote failure.
    #[error("{message}")]
    Provider {
        /// Message returned by the provider.
        message: String,
    },
}

impl GatewayError {
    /// Builds a [`GatewayError::Provider`] from any displayable message.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }
}

/// Future returned by gateway operations.
pub type GatewayFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, GatewayError>> + Send + 'a>>;

/// Operations the lifecycle core requires from an infrastructure provider.
pub trait ProviderGateway: Send + Sync {
    /// Resolves a flavor name to its identifier.
    ///
    /// Implementations return [`GatewayError::NotFound`] when the flavor does
    /// not exist.
    fn resolve_flavor<'a>(&'a self, name: &'a str) -> GatewayFuture<'a, FlavorId>;

    /// Lists images whose name matches `name` exactly, in provider order.
    fn find_images_by_name<'a>(&'a self, name: &'a str) -> GatewayFuture<'a, Vec<ImageId>>;

    /// Creates an image record from `metadata` and uploads the file at `path`.
    fn upload_image<'a>(
        &'a self,
        metadata: &'a ImageMetadata,
        path: &'a Utf8Path,
    ) -> GatewayFuture<'a, ImageId>;

    /// Reports the status of an image.
    fn image_status<'a>(&'a self, id: &'a ImageId) -> GatewayFuture<'a, ImageStatus>;

    /// Creates an instance and returns its identifier once acknowledged.
    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> GatewayFuture<'a, InstanceId>;

    /// Deletes an instance.
    fn delete_instance<'a>(&'a self, id: &'a InstanceId) -> GatewayFuture<'a, ()>;

    /// Boots a stopped instance.
    fn start_instance<'a>(&'a self, id: &'a InstanceId) -> GatewayFuture<'a, ()>;

    /// Stops a running instance.
    fn stop_instance<'a>(&'a self, id: &'a InstanceId) -> GatewayFuture<'a, ()>;

    /// Reports the status of an instance, or `None` when the provider no
    /// longer knows it.
    fn instance_status<'a>(&'a self, id: &'a InstanceId)
    -> GatewayFuture<'a, Option<InstanceStatus>>;

    /// Lists the addresses of an instance on the given networks.
    fn instance_addresses<'a>(
        &'a self,
        id: &'a InstanceId,
        networks: &'a [String],
    ) -> GatewayFuture<'a, Vec<InstanceAddress>>;

    /// Allocates a floating IP from the named pool.
    fn allocate_floating_ip<'a>(&'a self, pool: &'a str) -> GatewayFuture<'a, FloatingIp>;

    /// Associates a floating IP with an instance.
    fn associate_floating_ip<'a>(
        &'a self,
        instance: &'a InstanceId,
        ip: &'a str,
    ) -> GatewayFuture<'a, ()>;

    /// Removes a floating IP association from an instance.
    fn disassociate_floating_ip<'a>(
        &'a self,
        instance: &'a InstanceId,
        ip: &'a str,
    ) -> GatewayFuture<'a, ()>;

    /// Releases a floating IP allocation.
    fn delete_floating_ip<'a>(&'a self, id: &'a FloatingIpId) -> GatewayFuture<'a, ()>;

    /// Creates a block storage volume.
    fn create_volume<'a>(&'a self, spec: &'a VolumeSpec) -> GatewayFuture<'a, VolumeId>;

    /// Attaches a volume to an instance and returns the device it was
    /// attached as. `device` of `None` lets the provider choose.
    fn attach_volume<'a>(
        &'a self,
        volume: &'a VolumeId,
        instance: &'a InstanceId,
        device: Option<&'a str>,
    ) -> GatewayFuture<'a, String>;

    /// Detaches a volume from an instance.
    fn detach_volume<'a>(
        &'a self,
        volume: &'a VolumeId,
        instance: &'a InstanceId,
    ) -> GatewayFuture<'a, ()>;

    /// Deletes a volume.
    fn delete_volume<'a>(&'a self, id: &'a VolumeId) -> GatewayFuture<'a, ()>;

    /// Reports the status of a volume.
    fn volume_status<'a>(&'a self, id: &'a VolumeId) -> GatewayFuture<'a, VolumeStatus>;
}

/// Opens authenticated gateway sessions.
pub trait Connector: Send + Sync {
    /// Gateway type produced by this connector.
    type Gateway: ProviderGateway;

    /// Authenticates against `endpoint` and returns a gateway session.
    ///
    /// Implementations return [`GatewayError::Auth`] when the credentials
    /// are rejected.
    fn connect<'a>(&'a self, endpoint: &'a ProviderEndpoint) -> GatewayFuture<'a, Self::Gateway>;
}
