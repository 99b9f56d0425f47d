//! Error taxonomy for lifecycle operations.
//!
//! Every failure carries the [`Stage`] it happened in. Multi-stage teardown
//! collects failures into a [`CombinedError`] instead of stopping at the first
//! one, and a rolled-back provision keeps both the original cause and the
//! teardown outcome.

use std::fmt;

use thiserror::Error;

use crate::gateway::{GatewayError, InstanceId, ResourceKind, VmState};

/// Step of a lifecycle operation, used to tag failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Opening the provider session.
    Connect,
    /// Resolving the flavor name.
    ResolveFlavor,
    /// Searching images by name.
    FindImage,
    /// Uploading a new image.
    UploadImage,
    /// Waiting for an uploaded image to leave the queue.
    AwaitImage,
    /// Creating the instance.
    CreateInstance,
    /// Waiting for the instance to run.
    AwaitRunning,
    /// Allocating a floating IP.
    AllocateFloatingIp,
    /// Associating the floating IP with the instance.
    AssociateFloatingIp,
    /// Waiting for SSH on the public address.
    AwaitSsh,
    /// Creating a volume.
    CreateVolume,
    /// Waiting for a volume to become available.
    AwaitVolume,
    /// Attaching a volume.
    AttachVolume,
    /// Removing the floating IP association.
    DisassociateFloatingIp,
    /// Releasing the floating IP.
    DeleteFloatingIp,
    /// Detaching the volume.
    DetachVolume,
    /// Deleting the volume.
    DeleteVolume,
    /// Deleting the instance.
    DeleteInstance,
    /// Waiting for the instance to disappear.
    AwaitDeleted,
    /// Stopping the instance.
    StopInstance,
    /// Waiting for the instance to halt.
    AwaitHalted,
    /// Booting the instance.
    StartInstance,
    /// Querying instance status or addresses.
    QueryInstance,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Connect => "connect",
            Self::ResolveFlavor => "resolve flavor",
            Self::FindImage => "find image",
            Self::UploadImage => "upload image",
            Self::AwaitImage => "await image",
            Self::CreateInstance => "create instance",
            Self::AwaitRunning => "await running",
            Self::AllocateFloatingIp => "allocate floating ip",
            Self::AssociateFloatingIp => "associate floating ip",
            Self::AwaitSsh => "await ssh",
            Self::CreateVolume => "create volume",
            Self::AwaitVolume => "await volume",
            Self::AttachVolume => "attach volume",
            Self::DisassociateFloatingIp => "disassociate floating ip",
            Self::DeleteFloatingIp => "delete floating ip",
            Self::DetachVolume => "detach volume",
            Self::DeleteVolume => "delete volume",
            Self::DeleteInstance => "delete instance",
            Self::AwaitDeleted => "await deletion",
            Self::StopInstance => "stop instance",
            Self::AwaitHalted => "await halted",
            Self::StartInstance => "start instance",
            Self::QueryInstance => "query instance",
        };
        f.write_str(label)
    }
}

/// Errors raised by lifecycle operations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// A flavor, image or instance does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Stage that issued the lookup.
        stage: Stage,
        /// Category of the missing resource.
        kind: ResourceKind,
        /// Name or identifier used for the lookup.
        name: String,
    },
    /// An operation needs an identifier a prior step should have recorded.
    #[error("missing {field}; provision the virtual machine first")]
    MissingIdentifier {
        /// Descriptor field that is empty.
        field: &'static str,
    },
    /// The provider rejected the credentials or session.
    #[error("provider authentication failed: {message}")]
    AuthFailure {
        /// Stage that issued the rejected call.
        stage: Stage,
        /// Message returned by the provider.
        message: String,
    },
    /// A state transition did not happen before the deadline.
    #[error("timeout during {stage} for {resource_id}")]
    ActionTimeout {
        /// Stage that was waiting.
        stage: Stage,
        /// Resource being waited on.
        resource_id: String,
    },
    /// A polled resource entered an error condition.
    #[error("{resource_id} entered status {status} during {stage}")]
    ErrorState {
        /// Stage that was waiting.
        stage: Stage,
        /// Resource being waited on.
        resource_id: String,
        /// Status reported by the provider.
        status: String,
    },
    /// Opaque remote failure.
    #[error("{stage} failed: {message}")]
    Provider {
        /// Stage that issued the failing call.
        stage: Stage,
        /// Message returned by the provider.
        message: String,
    },
    /// The provider lacks this capability.
    #[error("{operation} is not supported by this provider")]
    NotSupported {
        /// Operation that was requested.
        operation: &'static str,
    },
    /// The instance is not in the state the operation requires.
    #[error("instance {instance_id} is {actual}, expected {expected}")]
    InvalidState {
        /// Instance identifier.
        instance_id: InstanceId,
        /// Required state.
        expected: VmState,
        /// Current state.
        actual: VmState,
    },
    /// The provider reports no instance for the recorded identifier.
    #[error("no information available for instance {instance_id}")]
    InfoFailed {
        /// Instance identifier.
        instance_id: InstanceId,
    },
    /// Provisioning needs a floating IP pool and none is configured.
    #[error("empty floating IP pool")]
    MissingFloatingIpPool,
    /// The instance has no public address to reach it on.
    #[error("no public address found for instance {instance_id}")]
    NoPublicAddress {
        /// Instance identifier.
        instance_id: InstanceId,
    },
    /// The descriptor already owns an instance.
    #[error("descriptor already provisioned as instance {instance_id}")]
    AlreadyProvisioned {
        /// Instance identifier already recorded.
        instance_id: InstanceId,
    },
    /// The descriptor is missing a required value.
    #[error("invalid descriptor: missing or empty field {0}")]
    Validation(String),
    /// Several independent stages failed.
    #[error(transparent)]
    Combined(CombinedError),
    /// Provisioning failed and the acquired resources were torn down.
    #[error("{cause}; {rollback}")]
    RolledBack {
        /// Failure that triggered the rollback.
        cause: Box<LifecycleError>,
        /// What happened during teardown.
        rollback: RollbackOutcome,
    },
}

impl LifecycleError {
    /// Converts a gateway failure raised during `stage`.
    #[must_use]
    pub fn from_gateway(stage: Stage, error: GatewayError) -> Self {
        match error {
            GatewayError::NotFound { kind, name } => Self::NotFound { stage, kind, name },
            GatewayError::Auth { message } => Self::AuthFailure { stage, message },
            GatewayError::Provider { message } => Self::Provider { stage, message },
        }
    }

    /// Returns the stage a failure is attributed to, when it carries one.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::NotFound { stage, .. }
            | Self::AuthFailure { stage, .. }
            | Self::ActionTimeout { stage, .. }
            | Self::ErrorState { stage, .. }
            | Self::Provider { stage, .. } => Some(*stage),
            Self::Combined(combined) => combined.failures().first().map(|failure| failure.stage),
            Self::RolledBack { cause, .. } => cause.stage(),
            _ => None,
        }
    }

    /// Returns the failure that started a rollback, or `self` otherwise.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::RolledBack { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// Maps a gateway result into a lifecycle result tagged with `stage`.
pub(crate) trait StageContext<T> {
    fn at_stage(self, stage: Stage) -> Result<T, LifecycleError>;
}

impl<T> StageContext<T> for Result<T, GatewayError> {
    fn at_stage(self, stage: Stage) -> Result<T, LifecycleError> {
        self.map_err(|err| LifecycleError::from_gateway(stage, err))
    }
}

/// One failed stage inside a [`CombinedError`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StageFailure {
    /// Stage that failed.
    pub stage: Stage,
    /// Failure raised by the stage.
    pub error: LifecycleError,
}

/// Aggregate of independent stage failures.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CombinedError {
    failures: Vec<StageFailure>,
}

impl CombinedError {
    /// Creates an empty aggregate.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            failures: Vec::new(),
        }
    }

    /// Records a failure. Nested aggregates are flattened.
    pub fn push(&mut self, stage: Stage, error: LifecycleError) {
        match error {
            LifecycleError::Combined(nested) => self.failures.extend(nested.failures),
            other => self.failures.push(StageFailure {
                stage,
                error: other,
            }),
        }
    }

    /// Returns the recorded failures in the order they happened.
    #[must_use]
    pub fn failures(&self) -> &[StageFailure] {
        &self.failures
    }

    /// Returns `true` when no failure was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns `true` when a failure was recorded for `stage`.
    #[must_use]
    pub fn contains(&self, stage: Stage) -> bool {
        self.failures.iter().any(|failure| failure.stage == stage)
    }

    /// Converts the aggregate into a result: `Ok` when empty, otherwise the
    /// single failure or a [`LifecycleError::Combined`].
    ///
    /// # Errors
    ///
    /// Returns the recorded failures when there is at least one.
    pub fn into_result(mut self) -> Result<(), LifecycleError> {
        match self.failures.len() {
            0 => Ok(()),
            1 => Err(self
                .failures
                .pop()
                .map_or(LifecycleError::Combined(Self::new()), |failure| failure.error)),
            _ => Err(LifecycleError::Combined(self)),
        }
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.failures.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "[{}] {}", failure.stage, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CombinedError {}

/// Result of the teardown run after a provisioning failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RollbackOutcome {
    /// Instance that was torn down.
    pub instance_id: InstanceId,
    /// Teardown failure, if any.
    pub failure: Option<Box<LifecycleError>>,
}

impl RollbackOutcome {
    /// Returns `true` when teardown removed everything.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Display for RollbackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(f, "teardown of instance {} succeeded", self.instance_id),
            Some(failure) => write!(
                f,
                "teardown of instance {} also failed: {failure}",
                self.instance_id
            ),
        }
    }
}
