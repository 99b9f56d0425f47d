//! Teardown: floating IP, then volume, then instance.

use tracing::{info, warn};

use super::VirtualMachine;
use crate::error::{CombinedError, LifecycleError, Stage, StageContext};
use crate::gateway::{Connector, GatewayError, InstanceId, ProviderGateway};
use crate::network::FloatingIpManager;
use crate::poll::Readiness;
use crate::ssh::SshProbe;
use crate::volume::VolumeManager;

impl<C, P> VirtualMachine<C, P>
where
    C: Connector,
    P: SshProbe,
{
    /// Releases the floating IP, removes the volume and deletes the instance.
    ///
    /// Every stage is attempted even when an earlier one fails. Fields whose
    /// resources were removed are cleared from the descriptor; the others are
    /// kept. The provider session is dropped in all cases.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::MissingIdentifier`] when no instance is
    /// recorded, otherwise the failed stage or a
    /// [`LifecycleError::Combined`] listing every failed stage.
    pub async fn destroy(&mut self) -> Result<(), LifecycleError> {
        let instance_id = self.instance_id()?;
        let gateway = self.session().await?;
        info!(instance_id = %instance_id, "destroying instance");
        let mut failures = CombinedError::new();

        if let Some(floating_ip) = self.descriptor.state().floating_ip().cloned() {
            match FloatingIpManager::new(&*gateway)
                .release(&floating_ip, &instance_id)
                .await
            {
                Ok(()) => self.descriptor.state_mut().clear_floating_ip(),
                Err(release) => {
                    if !release.contains(Stage::DeleteFloatingIp) {
                        self.descriptor.state_mut().clear_floating_ip();
                    }
                    failures.push(Stage::DeleteFloatingIp, LifecycleError::Combined(release));
                }
            }
        }

        if let Some(volume) = self.descriptor.state().volume().cloned() {
            match VolumeManager::new(&*gateway, self.settings.action_poller())
                .detach(&volume, &instance_id)
                .await
            {
                Ok(()) => self.descriptor.state_mut().clear_volume(),
                Err(err) => {
                    warn!(volume_id = %volume.id, error = %err, "volume teardown failed");
                    failures.push(err.stage().unwrap_or(Stage::DetachVolume), err);
                }
            }
        }

        match self.delete_instance(&*gateway, &instance_id).await {
            Ok(()) => {
                self.descriptor.state_mut().clear_instance();
                info!(instance_id = %instance_id, "instance deleted");
            }
            Err(err) => {
                warn!(instance_id = %instance_id, error = %err, "instance teardown failed");
                failures.push(err.stage().unwrap_or(Stage::DeleteInstance), err);
            }
        }

        self.session = None;
        failures.into_result()
    }

    async fn delete_instance(
        &self,
        gateway: &C::Gateway,
        instance_id: &InstanceId,
    ) -> Result<(), LifecycleError> {
        match gateway.delete_instance(instance_id).await {
            Ok(()) | Err(GatewayError::NotFound { .. }) => {}
            Err(err) => return Err(LifecycleError::from_gateway(Stage::DeleteInstance, err)),
        }
        self.settings
            .action_poller()
            .until(Stage::AwaitDeleted, instance_id.as_str(), || async move {
                let status = gateway
                    .instance_status(instance_id)
                    .await
                    .at_stage(Stage::AwaitDeleted)?;
                Ok(status.map_or(Readiness::Ready(()), |_| Readiness::Pending))
            })
            .await
    }
}
