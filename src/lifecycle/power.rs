//! Power transitions. Suspend and resume are not offered by the provider.

use std::net::IpAddr;

use tracing::info;

use super::query::current_state;
use super::{VirtualMachine, parse_address};
use crate::error::{LifecycleError, Stage, StageContext};
use crate::gateway::{Connector, InstanceId, ProviderGateway, VmState};
use crate::poll::Readiness;
use crate::ssh::SshProbe;

impl<C, P> VirtualMachine<C, P>
where
    C: Connector,
    P: SshProbe,
{
    /// Stops a running instance and waits until it is halted.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] without contacting the
    /// provider's stop endpoint when the instance is not running, and stop or
    /// wait failures otherwise.
    pub async fn halt(&mut self) -> Result<(), LifecycleError> {
        let instance_id = self.instance_id()?;
        let gateway = self.session().await?;
        require_state(&*gateway, &instance_id, VmState::Running).await?;

        gateway
            .stop_instance(&instance_id)
            .await
            .at_stage(Stage::StopInstance)?;
        let gateway_ref = &*gateway;
        let id = &instance_id;
        self.settings
            .action_poller()
            .until(Stage::AwaitHalted, instance_id.as_str(), || async move {
                Ok(match current_state(gateway_ref, id).await? {
                    VmState::Halted => Readiness::Ready(()),
                    VmState::Error => Readiness::Failed(VmState::Error.to_string()),
                    VmState::Running | VmState::Unknown => Readiness::Pending,
                })
            })
            .await?;
        info!(instance_id = %instance_id, "instance halted");
        Ok(())
    }

    /// Boots a halted instance and waits until SSH answers on its public
    /// address.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidState`] without contacting the
    /// provider's start endpoint when the instance is not halted,
    /// [`LifecycleError::NoPublicAddress`] when no public address is known,
    /// and start or wait failures otherwise.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        let instance_id = self.instance_id()?;
        let gateway = self.session().await?;
        require_state(&*gateway, &instance_id, VmState::Halted).await?;

        gateway
            .start_instance(&instance_id)
            .await
            .at_stage(Stage::StartInstance)?;
        let host = self.public_address(&instance_id).await?;
        self.wait_for_ssh(host).await?;
        info!(instance_id = %instance_id, "instance started");
        Ok(())
    }

    /// Always fails: the provider cannot suspend instances.
    ///
    /// # Errors
    ///
    /// Always returns [`LifecycleError::NotSupported`].
    pub const fn suspend(&self) -> Result<(), LifecycleError> {
        Err(LifecycleError::NotSupported {
            operation: "suspend",
        })
    }

    /// Always fails: the provider cannot resume instances.
    ///
    /// # Errors
    ///
    /// Always returns [`LifecycleError::NotSupported`].
    pub const fn resume(&self) -> Result<(), LifecycleError> {
        Err(LifecycleError::NotSupported {
            operation: "resume",
        })
    }

    async fn public_address(&mut self, instance_id: &InstanceId) -> Result<IpAddr, LifecycleError> {
        if let Some(floating_ip) = self.descriptor.state().floating_ip() {
            return parse_address(&floating_ip.ip, Stage::StartInstance);
        }
        self.get_ips()
            .await?
            .public()
            .ok_or_else(|| LifecycleError::NoPublicAddress {
                instance_id: instance_id.clone(),
            })
    }
}

async fn require_state<G>(
    gateway: &G,
    instance_id: &InstanceId,
    expected: VmState,
) -> Result<(), LifecycleError>
where
    G: ProviderGateway + ?Sized,
{
    let actual = current_state(gateway, instance_id).await?;
    if actual == expected {
        Ok(())
    } else {
        Err(LifecycleError::InvalidState {
            instance_id: instance_id.clone(),
            expected,
            actual,
        })
    }
}
