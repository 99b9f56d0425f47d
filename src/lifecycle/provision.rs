//! Provisioning with rollback on partial failure.

use tracing::{info, warn};

use super::{VirtualMachine, parse_address};
use crate::error::{LifecycleError, RollbackOutcome, Stage, StageContext};
use crate::gateway::{Connector, InstanceId, InstanceSpec, ProviderGateway, VmState};
use crate::image::ImageResolver;
use crate::network::FloatingIpManager;
use crate::poll::Readiness;
use crate::ssh::SshProbe;
use crate::volume::VolumeManager;

impl<C, P> VirtualMachine<C, P>
where
    C: Connector,
    P: SshProbe,
{
    /// Creates the instance, gives it a floating IP, waits for SSH and
    /// attaches the requested volume.
    ///
    /// Nothing is created when the flavor or image cannot be resolved. Any
    /// failure after the instance exists tears everything down again and is
    /// returned as [`LifecycleError::RolledBack`], carrying both the cause
    /// and the teardown outcome.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::AlreadyProvisioned`] when the descriptor
    /// already owns an instance, resolution and creation failures as they
    /// occur, and [`LifecycleError::RolledBack`] for later failures.
    pub async fn provision(&mut self) -> Result<(), LifecycleError> {
        if let Some(instance_id) = self.descriptor.state().instance_id() {
            return Err(LifecycleError::AlreadyProvisioned {
                instance_id: instance_id.clone(),
            });
        }
        self.descriptor.config().validate()?;
        let gateway = self.session().await?;
        let config = self.descriptor.config().clone();
        info!(name = %config.name, flavor = %config.flavor_name, "provisioning instance");

        let flavor_id = gateway
            .resolve_flavor(&config.flavor_name)
            .await
            .at_stage(Stage::ResolveFlavor)?;

        let image_id = match self.descriptor.state().image_id() {
            Some(id) => id.clone(),
            None => {
                ImageResolver::new(&*gateway, self.settings.action_poller())
                    .resolve(&config)
                    .await?
            }
        };
        self.descriptor.state_mut().record_image(image_id.clone());

        let spec = InstanceSpec {
            name: config.name.clone(),
            flavor_id,
            image_id,
            networks: config.networks.clone(),
            security_groups: vec![config.security_group_or_default().to_owned()],
            user_data: config.user_data.clone(),
            admin_password: config.admin_password.clone(),
        };
        let instance_id = gateway
            .create_instance(&spec)
            .await
            .at_stage(Stage::CreateInstance)?;
        self.descriptor
            .state_mut()
            .record_instance(instance_id.clone());
        info!(instance_id = %instance_id, "instance created");

        if let Err(cause) = self.complete(&*gateway, &instance_id).await {
            return Err(self.roll_back(instance_id, cause).await);
        }
        info!(instance_id = %instance_id, name = %config.name, "instance provisioned");
        Ok(())
    }

    async fn complete(
        &mut self,
        gateway: &C::Gateway,
        instance_id: &InstanceId,
    ) -> Result<(), LifecycleError> {
        self.await_running(gateway, instance_id).await?;

        let Some(pool) = self.descriptor.config().floating_ip_pool.clone() else {
            return Err(LifecycleError::MissingFloatingIpPool);
        };
        let floating_ip = FloatingIpManager::new(gateway)
            .acquire(&pool, instance_id)
            .await?;
        let public = parse_address(&floating_ip.ip, Stage::AssociateFloatingIp);
        self.descriptor.state_mut().record_floating_ip(floating_ip);
        self.wait_for_ssh(public?).await?;
        info!(instance_id = %instance_id, "ssh reachable");

        let requested = self.descriptor.config().volume.clone();
        if let Some(spec) = requested.filter(|spec| spec.size_gb > 0) {
            let record = VolumeManager::new(gateway, self.settings.action_poller())
                .attach(&spec, instance_id)
                .await?;
            self.descriptor.state_mut().record_volume(record);
        }
        Ok(())
    }

    async fn await_running(
        &self,
        gateway: &C::Gateway,
        instance_id: &InstanceId,
    ) -> Result<(), LifecycleError> {
        self.settings
            .action_poller()
            .until(Stage::AwaitRunning, instance_id.as_str(), || async move {
                let Some(status) = gateway
                    .instance_status(instance_id)
                    .await
                    .at_stage(Stage::AwaitRunning)?
                else {
                    return Err(LifecycleError::InfoFailed {
                        instance_id: instance_id.clone(),
                    });
                };
                Ok(match VmState::from(&status) {
                    VmState::Running => Readiness::Ready(()),
                    VmState::Error => Readiness::Failed(status.to_string()),
                    VmState::Halted | VmState::Unknown => Readiness::Pending,
                })
            })
            .await
    }

    async fn roll_back(&mut self, instance_id: InstanceId, cause: LifecycleError) -> LifecycleError {
        warn!(instance_id = %instance_id, error = %cause, "provisioning failed, tearing down");
        let failure = match self.destroy().await {
            Ok(()) => None,
            Err(err) => {
                warn!(instance_id = %instance_id, error = %err, "teardown after failed provision failed");
                Some(Box::new(err))
            }
        };
        LifecycleError::RolledBack {
            cause: Box::new(cause),
            rollback: RollbackOutcome {
                instance_id,
                failure,
            },
        }
    }
}
