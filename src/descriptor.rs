//! Virtual machine descriptor: caller-supplied configuration plus the
//! identifiers acquired while provisioning.
//!
//! The configuration half is validated once by [`VmDescriptorBuilder`] and is
//! not mutated afterwards. The acquired half, [`ProvisionedState`], is only
//! written by the lifecycle orchestrator.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::gateway::{FloatingIpId, ImageId, InstanceId, VolumeId};

/// Security group applied when the descriptor names none.
pub const DEFAULT_SECURITY_GROUP: &str = "default";

/// Where and as whom to authenticate against the provider.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    /// Identity service URL.
    pub identity_endpoint: String,
    /// Account user name.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Provider region.
    pub region: String,
    /// Tenant (project) the resources belong to.
    pub tenant_name: String,
}

/// Image to upload when no image with the same name exists.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Image name, also used for the lookup.
    pub name: String,
    /// Container format, for example `bare`.
    pub container_format: String,
    /// Disk format, for example `qcow2`.
    pub disk_format: String,
    /// Minimum disk size in gigabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_disk: Option<u32>,
    /// Minimum memory in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ram: Option<u32>,
}

/// Requested block storage volume.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Volume name.
    pub name: String,
    /// Size in gigabytes.
    pub size_gb: u32,
    /// Provider volume type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    /// Device to attach as; `None` lets the provider choose.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Volume attached to the instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Provider-assigned identifier.
    pub id: VolumeId,
    /// Device the volume is attached as.
    pub device: String,
    /// Volume name.
    pub name: String,
    /// Size in gigabytes.
    pub size_gb: u32,
    /// Provider volume type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
}

/// Floating IP allocated for the instance.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FloatingIp {
    /// Provider-assigned allocation identifier, needed to release it.
    pub id: FloatingIpId,
    /// Public address.
    pub ip: String,
    /// Pool the address was allocated from.
    pub pool: String,
}

/// Credentials for logging into the instance over SSH.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SshCredentials {
    /// Remote user.
    pub user: String,
    /// Optional password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Optional private key file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<Utf8PathBuf>,
}

/// Caller-supplied configuration of a virtual machine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Provider endpoint and account.
    pub endpoint: ProviderEndpoint,
    /// Flavor name, resolved to an identifier at provision time.
    pub flavor_name: String,
    /// Explicit image identifier. Skips the lookup when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<ImageId>,
    /// Image to look up by name, or upload when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_metadata: Option<ImageMetadata>,
    /// Image file read when uploading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<Utf8PathBuf>,
    /// Instance name.
    pub name: String,
    /// Network identifiers the instance attaches to.
    #[serde(default)]
    pub networks: Vec<String>,
    /// Pool to allocate the floating IP from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floating_ip_pool: Option<String>,
    /// Security group; [`DEFAULT_SECURITY_GROUP`] when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_group: Option<String>,
    /// Cloud-init payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_data: Option<String>,
    /// Administrator password for the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password: Option<String>,
    /// Volume to create and attach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeSpec>,
    /// SSH login credentials.
    #[serde(default)]
    pub credentials: SshCredentials,
}

impl VmConfig {
    /// Checks the fields every lifecycle operation relies on.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] naming the first missing field.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.endpoint.identity_endpoint.is_empty() {
            return Err(LifecycleError::Validation("identity_endpoint".to_owned()));
        }
        if self.endpoint.region.is_empty() {
            return Err(LifecycleError::Validation("region".to_owned()));
        }
        if self.flavor_name.is_empty() {
            return Err(LifecycleError::Validation("flavor_name".to_owned()));
        }
        if self.name.is_empty() {
            return Err(LifecycleError::Validation("name".to_owned()));
        }
        let has_image_id = self.image_id.as_ref().is_some_and(|id| !id.is_empty());
        let has_image_name = self
            .image_metadata
            .as_ref()
            .is_some_and(|metadata| !metadata.name.is_empty());
        if !has_image_id && !has_image_name {
            return Err(LifecycleError::Validation("image".to_owned()));
        }
        Ok(())
    }

    /// Security group the instance is created in.
    #[must_use]
    pub fn security_group_or_default(&self) -> &str {
        self.security_group
            .as_deref()
            .unwrap_or(DEFAULT_SECURITY_GROUP)
    }
}

/// Identifiers acquired while provisioning.
///
/// A present field means the provider-side resource exists, unless a
/// compensating teardown step failed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProvisionedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image_id: Option<ImageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    floating_ip: Option<FloatingIp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    volume: Option<VolumeRecord>,
}

impl ProvisionedState {
    /// Resolved image identifier.
    #[must_use]
    pub const fn image_id(&self) -> Option<&ImageId> {
        self.image_id.as_ref()
    }

    /// Instance identifier.
    #[must_use]
    pub const fn instance_id(&self) -> Option<&InstanceId> {
        self.instance_id.as_ref()
    }

    /// Associated floating IP.
    #[must_use]
    pub const fn floating_ip(&self) -> Option<&FloatingIp> {
        self.floating_ip.as_ref()
    }

    /// Attached volume.
    #[must_use]
    pub const fn volume(&self) -> Option<&VolumeRecord> {
        self.volume.as_ref()
    }

    /// Returns `true` when no instance, floating IP or volume is recorded.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.instance_id.is_none() && self.floating_ip.is_none() && self.volume.is_none()
    }

    pub(crate) fn record_image(&mut self, id: ImageId) {
        self.image_id = Some(id);
    }

    pub(crate) fn record_instance(&mut self, id: InstanceId) {
        self.instance_id = Some(id);
    }

    pub(crate) fn record_floating_ip(&mut self, ip: FloatingIp) {
        self.floating_ip = Some(ip);
    }

    pub(crate) fn record_volume(&mut self, volume: VolumeRecord) {
        self.volume = Some(volume);
    }

    pub(crate) fn clear_instance(&mut self) {
        self.instance_id = None;
    }

    pub(crate) fn clear_floating_ip(&mut self) {
        self.floating_ip = None;
    }

    pub(crate) fn clear_volume(&mut self) {
        self.volume = None;
    }
}

/// Configuration and acquired state of one virtual machine.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct VmDescriptor {
    config: VmConfig,
    #[serde(default)]
    state: ProvisionedState,
}

impl VmDescriptor {
    /// Starts a builder for a [`VmDescriptor`].
    #[must_use]
    pub fn builder() -> VmDescriptorBuilder {
        VmDescriptorBuilder::new()
    }

    /// Wraps an already validated configuration with empty state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] when the configuration is
    /// incomplete.
    pub fn new(config: VmConfig) -> Result<Self, LifecycleError> {
        config.validate()?;
        Ok(Self {
            config,
            state: ProvisionedState::default(),
        })
    }

    /// Caller-supplied configuration.
    #[must_use]
    pub const fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Identifiers acquired so far.
    #[must_use]
    pub const fn state(&self) -> &ProvisionedState {
        &self.state
    }

    pub(crate) const fn state_mut(&mut self) -> &mut ProvisionedState {
        &mut self.state
    }
}

/// Builder for [`VmDescriptor`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default)]
pub struct VmDescriptorBuilder {
    endpoint: ProviderEndpoint,
    flavor_name: String,
    image_id: Option<String>,
    image_metadata: Option<ImageMetadata>,
    image_path: Option<Utf8PathBuf>,
    name: Option<String>,
    networks: Vec<String>,
    floating_ip_pool: Option<String>,
    security_group: Option<String>,
    user_data: Option<String>,
    admin_password: Option<String>,
    volume: Option<VolumeSpec>,
    credentials: SshCredentials,
}

impl VmDescriptorBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the identity service URL.
    #[must_use]
    pub fn identity_endpoint(mut self, value: impl Into<String>) -> Self {
        self.endpoint.identity_endpoint = value.into();
        self
    }

    /// Sets the account user name and password.
    #[must_use]
    pub fn account(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.endpoint.username = username.into();
        self.endpoint.password = password.into();
        self
    }

    /// Sets the provider region.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.endpoint.region = value.into();
        self
    }

    /// Sets the tenant name.
    #[must_use]
    pub fn tenant_name(mut self, value: impl Into<String>) -> Self {
        self.endpoint.tenant_name = value.into();
        self
    }

    /// Sets the flavor name.
    #[must_use]
    pub fn flavor_name(mut self, value: impl Into<String>) -> Self {
        self.flavor_name = value.into();
        self
    }

    /// Uses an existing image identifier.
    #[must_use]
    pub fn image_id(mut self, value: impl Into<String>) -> Self {
        self.image_id = Some(value.into());
        self
    }

    /// Looks up the image by name, uploading `path` when it is missing.
    #[must_use]
    pub fn image(mut self, metadata: ImageMetadata, path: Option<Utf8PathBuf>) -> Self {
        self.image_metadata = Some(metadata);
        self.image_path = path;
        self
    }

    /// Sets the instance name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = Some(value.into());
        self
    }

    /// Adds a network identifier.
    #[must_use]
    pub fn network(mut self, value: impl Into<String>) -> Self {
        self.networks.push(value.into());
        self
    }

    /// Sets the floating IP pool.
    #[must_use]
    pub fn floating_ip_pool(mut self, value: impl Into<String>) -> Self {
        self.floating_ip_pool = Some(value.into());
        self
    }

    /// Sets the security group.
    #[must_use]
    pub fn security_group(mut self, value: impl Into<String>) -> Self {
        self.security_group = Some(value.into());
        self
    }

    /// Sets the cloud-init payload.
    #[must_use]
    pub fn user_data(mut self, value: impl Into<String>) -> Self {
        self.user_data = Some(value.into());
        self
    }

    /// Sets the administrator password.
    #[must_use]
    pub fn admin_password(mut self, value: impl Into<String>) -> Self {
        self.admin_password = Some(value.into());
        self
    }

    /// Requests a volume. A size of zero means no volume.
    #[must_use]
    pub fn volume(mut self, spec: VolumeSpec) -> Self {
        self.volume = Some(spec);
        self
    }

    /// Sets the SSH login credentials.
    #[must_use]
    pub fn credentials(mut self, credentials: SshCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Builds and validates the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Validation`] when the endpoint, region,
    /// flavor or image is missing.
    pub fn build(self) -> Result<VmDescriptor, LifecycleError> {
        let name = non_empty(self.name).unwrap_or_else(|| format!("stratus-{}", Uuid::new_v4()));
        let endpoint = ProviderEndpoint {
            identity_endpoint: self.endpoint.identity_endpoint.trim().to_owned(),
            username: self.endpoint.username.trim().to_owned(),
            password: self.endpoint.password,
            region: self.endpoint.region.trim().to_owned(),
            tenant_name: self.endpoint.tenant_name.trim().to_owned(),
        };
        let image_metadata = self.image_metadata.map(|metadata| ImageMetadata {
            name: metadata.name.trim().to_owned(),
            ..metadata
        });
        let volume = self.volume.filter(|spec| spec.size_gb > 0);
        let config = VmConfig {
            endpoint,
            flavor_name: self.flavor_name.trim().to_owned(),
            image_id: non_empty(self.image_id).map(ImageId::from),
            image_metadata,
            image_path: self.image_path,
            name,
            networks: self
                .networks
                .into_iter()
                .map(|network| network.trim().to_owned())
                .filter(|network| !network.is_empty())
                .collect(),
            floating_ip_pool: non_empty(self.floating_ip_pool),
            security_group: non_empty(self.security_group),
            user_data: self.user_data,
            admin_password: self.admin_password,
            volume,
            credentials: self.credentials,
        };
        VmDescriptor::new(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|trimmed| !trimmed.is_empty())
}
