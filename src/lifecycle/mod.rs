//! Lifecycle orchestration for a single virtual machine.
//!
//! [`VirtualMachine`] owns a [`VmDescriptor`] and drives it through
//! provisioning, power transitions, queries and teardown. Stage managers
//! ([`crate::image`], [`crate::network`], [`crate::volume`]) return the
//! identifiers they acquire; only this module writes them into the
//! descriptor.
//!
//! Every operation takes `&mut self`, so one descriptor cannot be driven by
//! two operations at once.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tracing::debug;

use crate::config::LifecycleSettings;
use crate::descriptor::VmDescriptor;
use crate::error::{LifecycleError, Stage, StageContext};
use crate::gateway::{Connector, InstanceId};
use crate::poll::Readiness;
use crate::ssh::{SshProbe, TcpProbe};

mod destroy;
mod power;
mod provision;
mod query;

pub use query::IpPair;

/// Virtual machine driven through the provider gateway opened by `C`.
///
/// `P` decides when SSH is reachable; [`TcpProbe`] is used unless a probe is
/// supplied with [`VirtualMachine::with_probe`].
pub struct VirtualMachine<C: Connector, P = TcpProbe> {
    descriptor: VmDescriptor,
    connector: C,
    probe: P,
    settings: LifecycleSettings,
    session: Option<Arc<C::Gateway>>,
}

impl<C: Connector> VirtualMachine<C, TcpProbe> {
    /// Wraps `descriptor`, probing SSH over TCP.
    #[must_use]
    pub fn new(descriptor: VmDescriptor, connector: C, settings: LifecycleSettings) -> Self {
        let probe = TcpProbe::new(settings.ssh_connect_timeout);
        Self::with_probe(descriptor, connector, probe, settings)
    }
}

impl<C, P> VirtualMachine<C, P>
where
    C: Connector,
    P: SshProbe,
{
    /// Wraps `descriptor` with an explicit SSH probe.
    #[must_use]
    pub const fn with_probe(
        descriptor: VmDescriptor,
        connector: C,
        probe: P,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            descriptor,
            connector,
            probe,
            settings,
            session: None,
        }
    }

    /// Descriptor including the identifiers acquired so far.
    #[must_use]
    pub const fn descriptor(&self) -> &VmDescriptor {
        &self.descriptor
    }

    /// Releases the descriptor, for example to persist it.
    #[must_use]
    pub fn into_descriptor(self) -> VmDescriptor {
        self.descriptor
    }

    /// Instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.config().name
    }

    /// Returns `true` while a provider session is cached.
    #[must_use]
    pub const fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Timing and SSH settings.
    #[must_use]
    pub const fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    /// Returns the cached session, connecting on first use.
    async fn session(&mut self) -> Result<Arc<C::Gateway>, LifecycleError> {
        if let Some(gateway) = &self.session {
            return Ok(Arc::clone(gateway));
        }
        let endpoint = &self.descriptor.config().endpoint;
        debug!(endpoint = %endpoint.identity_endpoint, region = %endpoint.region, "connecting");
        let gateway = Arc::new(
            self.connector
                .connect(endpoint)
                .await
                .at_stage(Stage::Connect)?,
        );
        self.session = Some(Arc::clone(&gateway));
        Ok(gateway)
    }

    fn instance_id(&self) -> Result<InstanceId, LifecycleError> {
        self.descriptor
            .state()
            .instance_id()
            .cloned()
            .ok_or(LifecycleError::MissingIdentifier {
                field: "instance_id",
            })
    }

    async fn wait_for_ssh(&self, host: IpAddr) -> Result<(), LifecycleError> {
        let addr = SocketAddr::new(host, self.settings.ssh_port);
        let probe = &self.probe;
        self.settings
            .ssh_poller()
            .until(Stage::AwaitSsh, &addr.to_string(), || async move {
                Ok(if probe.probe(addr).await {
                    Readiness::Ready(())
                } else {
                    Readiness::Pending
                })
            })
            .await
    }
}

fn parse_address(raw: &str, stage: Stage) -> Result<IpAddr, LifecycleError> {
    raw.parse().map_err(|_| LifecycleError::Provider {
        stage,
        message: format!("invalid address '{raw}'"),
    })
}

#[cfg(test)]
mod tests;
