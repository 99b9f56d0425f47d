//! Read-only queries: state, addresses and SSH connection details.

use std::net::IpAddr;

use tracing::debug;

use super::VirtualMachine;
use crate::error::{LifecycleError, Stage, StageContext};
use crate::gateway::{AddressKind, Connector, InstanceId, ProviderGateway, VmState};
use crate::ssh::{SshClient, SshOptions, SshProbe};

/// Public and private address of an instance.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct IpPair {
    public: Option<IpAddr>,
    private: Option<IpAddr>,
}

impl IpPair {
    /// Index of the public address in [`IpPair::positions`].
    pub const PUBLIC: usize = 0;
    /// Index of the private address in [`IpPair::positions`].
    pub const PRIVATE: usize = 1;

    /// Floating (public) address.
    #[must_use]
    pub const fn public(&self) -> Option<IpAddr> {
        self.public
    }

    /// Fixed (private) address.
    #[must_use]
    pub const fn private(&self) -> Option<IpAddr> {
        self.private
    }

    /// Both addresses: public first, private second.
    #[must_use]
    pub const fn positions(&self) -> [Option<IpAddr>; 2] {
        [self.public, self.private]
    }
}

impl<C, P> VirtualMachine<C, P>
where
    C: Connector,
    P: SshProbe,
{
    /// Reports the normalised instance state.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::MissingIdentifier`] before provisioning and
    /// [`LifecycleError::InfoFailed`] when the provider does not know the
    /// instance.
    pub async fn state(&mut self) -> Result<VmState, LifecycleError> {
        let instance_id = self.instance_id()?;
        let gateway = self.session().await?;
        current_state(&*gateway, &instance_id).await
    }

    /// Lists the instance addresses. Only floating addresses fill the public
    /// position and only fixed addresses fill the private one; the first of
    /// each kind wins.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::MissingIdentifier`] before provisioning and
    /// the gateway failure otherwise.
    pub async fn get_ips(&mut self) -> Result<IpPair, LifecycleError> {
        let instance_id = self.instance_id()?;
        let gateway = self.session().await?;
        let addresses = gateway
            .instance_addresses(&instance_id, &self.descriptor.config().networks)
            .await
            .at_stage(Stage::QueryInstance)?;

        let mut pair = IpPair::default();
        for address in addresses {
            let Ok(ip) = address.addr.parse::<IpAddr>() else {
                debug!(addr = %address.addr, "skipping unparseable address");
                continue;
            };
            let slot = match address.kind {
                AddressKind::Floating => &mut pair.public,
                AddressKind::Fixed => &mut pair.private,
            };
            if slot.is_none() {
                *slot = Some(ip);
            }
        }
        Ok(pair)
    }

    /// Builds an [`SshClient`] for the public address.
    ///
    /// The descriptor's private key is used as identity file when `options`
    /// names none.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::NoPublicAddress`] when the instance has no
    /// floating address, and any [`VirtualMachine::get_ips`] failure.
    pub async fn ssh_client(&mut self, options: SshOptions) -> Result<SshClient, LifecycleError> {
        let instance_id = self.instance_id()?;
        let Some(host) = self.get_ips().await?.public() else {
            return Err(LifecycleError::NoPublicAddress { instance_id });
        };
        let credentials = &self.descriptor.config().credentials;
        let options = SshOptions {
            identity_file: options
                .identity_file
                .or_else(|| credentials.private_key.clone()),
            ..options
        };
        Ok(SshClient {
            user: credentials.user.clone(),
            host,
            port: self.settings.ssh_port,
            options,
            password: credentials.password.clone(),
        })
    }
}

pub(super) async fn current_state<G>(
    gateway: &G,
    instance_id: &InstanceId,
) -> Result<VmState, LifecycleError>
where
    G: ProviderGateway + ?Sized,
{
    let status = gateway
        .instance_status(instance_id)
        .await
        .at_stage(Stage::QueryInstance)?
        .ok_or_else(|| LifecycleError::InfoFailed {
            instance_id: instance_id.clone(),
        })?;
    Ok(VmState::from(&status))
}
