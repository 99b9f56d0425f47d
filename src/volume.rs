//! Block storage volumes: create, wait, attach and the reverse on teardown.

use tracing::{info, warn};

use crate::descriptor::{VolumeRecord, VolumeSpec};
use crate::error::{CombinedError, LifecycleError, Stage, StageContext};
use crate::gateway::{InstanceId, ProviderGateway, VolumeId, VolumeStatus};
use crate::poll::{Poller, Readiness};

/// Outcome of waiting for a detached volume.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Detached {
    /// The volume still exists and must be deleted.
    Present,
    /// The provider already removed the volume.
    Gone,
}

/// Creates, attaches, detaches and deletes block storage volumes.
#[derive(Debug)]
pub struct VolumeManager<'g, G: ?Sized> {
    gateway: &'g G,
    poller: Poller,
}

impl<'g, G> VolumeManager<'g, G>
where
    G: ProviderGateway + ?Sized,
{
    /// Creates a manager that waits for volume transitions with `poller`.
    #[must_use]
    pub const fn new(gateway: &'g G, poller: Poller) -> Self {
        Self { gateway, poller }
    }

    /// Creates a volume from `spec`, waits until it is available and attaches
    /// it to `instance`.
    ///
    /// When waiting or attaching fails, the created volume is deleted on a
    /// best-effort basis and a failed deletion is reported alongside the
    /// original failure.
    ///
    /// # Errors
    ///
    /// Returns the failure tagged with [`Stage::CreateVolume`],
    /// [`Stage::AwaitVolume`] or [`Stage::AttachVolume`].
    pub async fn attach(
        &self,
        spec: &VolumeSpec,
        instance: &InstanceId,
    ) -> Result<VolumeRecord, LifecycleError> {
        let id = self
            .gateway
            .create_volume(spec)
            .await
            .at_stage(Stage::CreateVolume)?;
        info!(volume_id = %id, size_gb = spec.size_gb, "volume created");

        if let Err(err) = self.wait_available(&id).await {
            return Err(self.discard(&id, Stage::AwaitVolume, err).await);
        }

        let device = match self
            .gateway
            .attach_volume(&id, instance, spec.device.as_deref())
            .await
            .at_stage(Stage::AttachVolume)
        {
            Ok(device) => device,
            Err(err) => return Err(self.discard(&id, Stage::AttachVolume, err).await),
        };
        info!(volume_id = %id, instance_id = %instance, %device, "volume attached");

        Ok(VolumeRecord {
            id,
            device,
            name: spec.name.clone(),
            size_gb: spec.size_gb,
            volume_type: spec.volume_type.clone(),
        })
    }

    /// Detaches `volume` from `instance`, waits for the provider to release
    /// it and deletes it.
    ///
    /// # Errors
    ///
    /// Returns the first failing step tagged with [`Stage::DetachVolume`],
    /// [`Stage::AwaitVolume`] or [`Stage::DeleteVolume`].
    pub async fn detach(
        &self,
        volume: &VolumeRecord,
        instance: &InstanceId,
    ) -> Result<(), LifecycleError> {
        self.gateway
            .detach_volume(&volume.id, instance)
            .await
            .at_stage(Stage::DetachVolume)?;

        if self.wait_detached(&volume.id).await? == Detached::Gone {
            info!(volume_id = %volume.id, "volume already removed by provider");
            return Ok(());
        }

        self.gateway
            .delete_volume(&volume.id)
            .await
            .at_stage(Stage::DeleteVolume)?;
        info!(volume_id = %volume.id, "volume deleted");
        Ok(())
    }

    async fn wait_available(&self, id: &VolumeId) -> Result<(), LifecycleError> {
        let gateway = self.gateway;
        self.poller
            .until(Stage::AwaitVolume, id.as_str(), || async move {
                let status = gateway
                    .volume_status(id)
                    .await
                    .at_stage(Stage::AwaitVolume)?;
                Ok(match status {
                    VolumeStatus::Available => Readiness::Ready(()),
                    VolumeStatus::Error | VolumeStatus::Deleted | VolumeStatus::ErrorDeleting => {
                        Readiness::Failed(status.to_string())
                    }
                    _ => Readiness::Pending,
                })
            })
            .await
    }

    async fn wait_detached(&self, id: &VolumeId) -> Result<Detached, LifecycleError> {
        let gateway = self.gateway;
        self.poller
            .until(Stage::AwaitVolume, id.as_str(), || async move {
                let status = gateway
                    .volume_status(id)
                    .await
                    .at_stage(Stage::AwaitVolume)?;
                Ok(match status {
                    VolumeStatus::Available | VolumeStatus::ErrorDeleting => {
                        Readiness::Ready(Detached::Present)
                    }
                    VolumeStatus::Deleted => Readiness::Ready(Detached::Gone),
                    VolumeStatus::Error => Readiness::Failed(status.to_string()),
                    _ => Readiness::Pending,
                })
            })
            .await
    }

    async fn discard(&self, id: &VolumeId, stage: Stage, cause: LifecycleError) -> LifecycleError {
        let Err(cleanup) = self
            .gateway
            .delete_volume(id)
            .await
            .at_stage(Stage::DeleteVolume)
        else {
            info!(volume_id = %id, "unattached volume deleted");
            return cause;
        };
        warn!(volume_id = %id, error = %cleanup, "failed to delete unattached volume");
        let mut combined = CombinedError::new();
        combined.push(stage, cause);
        combined.push(Stage::DeleteVolume, cleanup);
        LifecycleError::Combined(combined)
    }
}
