//! Value types exchanged with the provider gateway.
//!
//! Providers report statuses as free-form strings. They are parsed once into
//! the enumerations below so the orchestrator never compares raw strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::{FlavorId, ImageId};

/// Parameters for a new compute instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceSpec {
    /// Instance name.
    pub name: String,
    /// Resolved flavor identifier.
    pub flavor_id: FlavorId,
    /// Resolved image identifier.
    pub image_id: ImageId,
    /// Network identifiers the instance attaches to.
    pub networks: Vec<String>,
    /// Security group names.
    pub security_groups: Vec<String>,
    /// Optional cloud-init payload.
    pub user_data: Option<String>,
    /// Optional administrator password.
    pub admin_password: Option<String>,
}

/// Instance status as reported by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceStatus {
    /// `ACTIVE`: the instance is running.
    Active,
    /// `SHUTOFF`: the instance is stopped.
    Shutoff,
    /// `BUILD`: the instance is still being created.
    Build,
    /// `ERROR`: the last action on the instance failed.
    Error,
    /// Any other provider status.
    Other(String),
}

impl InstanceStatus {
    /// Parses a provider status string.
    #[must_use]
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim() {
            "ACTIVE" => Self::Active,
            "SHUTOFF" => Self::Shutoff,
            "BUILD" => Self::Build,
            "ERROR" => Self::Error,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("ACTIVE"),
            Self::Shutoff => f.write_str("SHUTOFF"),
            Self::Build => f.write_str("BUILD"),
            Self::Error => f.write_str("ERROR"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Normalised lifecycle state exposed to callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    /// The instance is running.
    Running,
    /// The instance is stopped.
    Halted,
    /// The provider reports a failed action.
    Error,
    /// The provider status has no lifecycle equivalent.
    Unknown,
}

impl From<&InstanceStatus> for VmState {
    fn from(status: &InstanceStatus) -> Self {
        match status {
            InstanceStatus::Active => Self::Running,
            InstanceStatus::Shutoff => Self::Halted,
            InstanceStatus::Error => Self::Error,
            InstanceStatus::Build | InstanceStatus::Other(_) => Self::Unknown,
        }
    }
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Halted => "halted",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Block storage volume status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VolumeStatus {
    /// `creating`
    Creating,
    /// `available`: created and not attached.
    Available,
    /// `attaching`
    Attaching,
    /// `in-use`: attached to an instance.
    InUse,
    /// `detaching`
    Detaching,
    /// `deleting`
    Deleting,
    /// The provider no longer knows the volume.
    Deleted,
    /// `error`
    Error,
    /// `error_deleting`
    ErrorDeleting,
    /// Any other provider status.
    Other(String),
}

impl VolumeStatus {
    /// Parses a provider status string.
    #[must_use]
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim() {
            "creating" => Self::Creating,
            "available" => Self::Available,
            "attaching" => Self::Attaching,
            "in-use" => Self::InUse,
            "detaching" => Self::Detaching,
            "deleting" => Self::Deleting,
            "deleted" | "nil" => Self::Deleted,
            "error" => Self::Error,
            "error_deleting" => Self::ErrorDeleting,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Creating => f.write_str("creating"),
            Self::Available => f.write_str("available"),
            Self::Attaching => f.write_str("attaching"),
            Self::InUse => f.write_str("in-use"),
            Self::Detaching => f.write_str("detaching"),
            Self::Deleting => f.write_str("deleting"),
            Self::Deleted => f.write_str("deleted"),
            Self::Error => f.write_str("error"),
            Self::ErrorDeleting => f.write_str("error_deleting"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Machine image status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageStatus {
    /// `queued`: the image record exists but holds no data yet.
    Queued,
    /// `saving`: data is being uploaded.
    Saving,
    /// `active`: the image is usable.
    Active,
    /// `killed`: the upload failed.
    Killed,
    /// `deleted`
    Deleted,
    /// Any other provider status.
    Other(String),
}

impl ImageStatus {
    /// Parses a provider status string.
    #[must_use]
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim() {
            "queued" => Self::Queued,
            "saving" => Self::Saving,
            "active" => Self::Active,
            "killed" => Self::Killed,
            "deleted" | "pending_delete" => Self::Deleted,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for ImageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => f.write_str("queued"),
            Self::Saving => f.write_str("saving"),
            Self::Active => f.write_str("active"),
            Self::Killed => f.write_str("killed"),
            Self::Deleted => f.write_str("deleted"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Kind of address attached to an instance network port.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AddressKind {
    /// Provider-managed public address.
    Floating,
    /// Address assigned on the tenant network.
    Fixed,
}

/// Single address reported for an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceAddress {
    /// Name of the network carrying the address.
    pub network: String,
    /// Whether the address is floating or fixed.
    pub kind: AddressKind,
    /// Address as reported by the provider.
    pub addr: String,
}
