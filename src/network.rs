//! Floating IP allocation, association and release.

use tracing::{info, warn};

use crate::descriptor::FloatingIp;
use crate::error::{CombinedError, LifecycleError, Stage, StageContext};
use crate::gateway::{InstanceId, ProviderGateway};

/// Allocates floating IPs for instances and releases them on teardown.
#[derive(Debug)]
pub struct FloatingIpManager<'g, G: ?Sized> {
    gateway: &'g G,
}

impl<'g, G> FloatingIpManager<'g, G>
where
    G: ProviderGateway + ?Sized,
{
    /// Creates a manager backed by `gateway`.
    #[must_use]
    pub const fn new(gateway: &'g G) -> Self {
        Self { gateway }
    }

    /// Allocates a floating IP from `pool` and associates it with `instance`.
    ///
    /// If the association fails, the allocation is released so it does not
    /// leak; a failed release is reported together with the association
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the failure tagged with [`Stage::AllocateFloatingIp`] or
    /// [`Stage::AssociateFloatingIp`], possibly combined with a
    /// [`Stage::DeleteFloatingIp`] failure.
    pub async fn acquire(
        &self,
        pool: &str,
        instance: &InstanceId,
    ) -> Result<FloatingIp, LifecycleError> {
        let ip = self
            .gateway
            .allocate_floating_ip(pool)
            .await
            .at_stage(Stage::AllocateFloatingIp)?;
        info!(floating_ip = %ip.ip, floating_ip_id = %ip.id, pool, "floating ip allocated");

        let Err(cause) = self
            .gateway
            .associate_floating_ip(instance, &ip.ip)
            .await
            .at_stage(Stage::AssociateFloatingIp)
        else {
            info!(floating_ip = %ip.ip, instance_id = %instance, "floating ip associated");
            return Ok(ip);
        };

        warn!(floating_ip = %ip.ip, error = %cause, "association failed, releasing floating ip");
        match self
            .gateway
            .delete_floating_ip(&ip.id)
            .await
            .at_stage(Stage::DeleteFloatingIp)
        {
            Ok(()) => Err(cause),
            Err(cleanup) => {
                warn!(floating_ip_id = %ip.id, error = %cleanup, "floating ip leaked");
                let mut combined = CombinedError::new();
                combined.push(Stage::AssociateFloatingIp, cause);
                combined.push(Stage::DeleteFloatingIp, cleanup);
                Err(LifecycleError::Combined(combined))
            }
        }
    }

    /// Disassociates `ip` from `instance` and releases it.
    ///
    /// Both calls are attempted even when the first one fails.
    ///
    /// # Errors
    ///
    /// Returns every failed step, tagged with
    /// [`Stage::DisassociateFloatingIp`] or [`Stage::DeleteFloatingIp`].
    pub async fn release(&self, ip: &FloatingIp, instance: &InstanceId) -> Result<(), CombinedError> {
        let mut failures = CombinedError::new();

        if let Err(err) = self
            .gateway
            .disassociate_floating_ip(instance, &ip.ip)
            .await
            .at_stage(Stage::DisassociateFloatingIp)
        {
            warn!(floating_ip = %ip.ip, error = %err, "failed to disassociate floating ip");
            failures.push(Stage::DisassociateFloatingIp, err);
        }

        match self
            .gateway
            .delete_floating_ip(&ip.id)
            .await
            .at_stage(Stage::DeleteFloatingIp)
        {
            Ok(()) => info!(floating_ip_id = %ip.id, "floating ip released"),
            Err(err) => {
                warn!(floating_ip_id = %ip.id, error = %err, "failed to release floating ip");
                failures.push(Stage::DeleteFloatingIp, err);
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}
