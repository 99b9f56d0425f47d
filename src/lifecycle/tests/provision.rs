//! Tests for provisioning and rollback.

use rstest::rstest;

use super::fixtures::{Harness, builder, descriptor, descriptor_with_volume, harness, provisioned};
use crate::descriptor::{VmDescriptor, VolumeSpec};
use crate::error::{LifecycleError, Stage};
use crate::gateway::{FloatingIpId, InstanceId, VmState};
use crate::test_support::{GatewayCall, Operation};

fn deletes(harness: &Harness) -> usize {
    harness
        .gateway
        .count(|call| matches!(call, GatewayCall::DeleteInstance(_)))
}

#[rstest]
#[tokio::test]
async fn provision_records_every_acquired_identifier(harness: Harness) {
    let machine = provisioned(&harness, descriptor_with_volume()).await;
    let state = machine.descriptor().state();

    assert_eq!(state.instance_id(), Some(&InstanceId::from("instance-1")));
    assert_eq!(state.image_id().map(|id| id.as_str()), Some("img-1"));
    let floating_ip = state
        .floating_ip()
        .unwrap_or_else(|| panic!("floating ip should be recorded"));
    assert_eq!(floating_ip.id, FloatingIpId::from("fip-2"));
    let volume = state
        .volume()
        .unwrap_or_else(|| panic!("volume should be recorded"));
    assert_eq!(volume.device, "/dev/vdb");
    assert!(machine.has_session());
    assert_eq!(
        harness.probe.probed(),
        vec![
            "203.0.113.11:22"
                .parse()
                .unwrap_or_else(|err| panic!("addr: {err}"))
        ]
    );
}

#[rstest]
#[tokio::test]
async fn instance_uses_default_security_group(harness: Harness, descriptor: VmDescriptor) {
    provisioned(&harness, descriptor).await;
    let Some(GatewayCall::CreateInstance(spec)) = harness
        .gateway
        .calls()
        .into_iter()
        .find(|call| matches!(call, GatewayCall::CreateInstance(_)))
    else {
        panic!("instance should be created");
    };
    assert_eq!(spec.security_groups, vec![String::from("default")]);
    assert_eq!(spec.networks, vec![String::from("net-1")]);
    assert_eq!(spec.flavor_id.as_str(), "flavor-2");
}

#[rstest]
#[tokio::test]
async fn image_is_looked_up_by_name_when_no_id_is_given(harness: Harness) {
    let descriptor = VmDescriptor::builder()
        .identity_endpoint("https://identity.example.test/v3")
        .region("RegionOne")
        .flavor_name("m1.medium")
        .image(
            crate::descriptor::ImageMetadata {
                name: String::from("ubuntu-24.04"),
                container_format: String::from("bare"),
                disk_format: String::from("qcow2"),
                min_disk: None,
                min_ram: None,
            },
            None,
        )
        .floating_ip_pool("public")
        .build()
        .unwrap_or_else(|err| panic!("descriptor: {err}"));
    let machine = provisioned(&harness, descriptor).await;
    assert_eq!(
        machine.descriptor().state().image_id().map(|id| id.as_str()),
        Some("img-1")
    );
    assert!(
        harness
            .gateway
            .calls()
            .contains(&GatewayCall::FindImages(String::from("ubuntu-24.04")))
    );
}

#[rstest]
#[tokio::test]
async fn second_provision_fails_fast(harness: Harness, descriptor: VmDescriptor) {
    let mut machine = provisioned(&harness, descriptor).await;
    let calls_before = harness.gateway.calls().len();
    let result = machine.provision().await;
    assert_eq!(
        result,
        Err(LifecycleError::AlreadyProvisioned {
            instance_id: InstanceId::from("instance-1"),
        })
    );
    assert_eq!(harness.gateway.calls().len(), calls_before);
}

#[rstest]
#[tokio::test]
async fn rejected_credentials_surface_as_auth_failure(harness: Harness, descriptor: VmDescriptor) {
    harness.connector.reject("invalid token");
    let mut machine = harness.machine(descriptor);
    let result = machine.provision().await;
    assert!(matches!(result, Err(LifecycleError::AuthFailure { .. })));
    assert!(harness.gateway.calls().is_empty());
    assert!(!machine.has_session());
}

#[rstest]
#[tokio::test]
async fn missing_pool_rolls_back_the_instance(harness: Harness) {
    let descriptor = VmDescriptor::builder()
        .identity_endpoint("https://identity.example.test/v3")
        .region("RegionOne")
        .flavor_name("m1.medium")
        .image_id("img-1")
        .build()
        .unwrap_or_else(|err| panic!("descriptor: {err}"));
    let mut machine = harness.machine(descriptor);
    let err = machine
        .provision()
        .await
        .expect_err("provision without pool should fail");
    assert_eq!(err.root_cause(), &LifecycleError::MissingFloatingIpPool);
    assert_eq!(deletes(&harness), 1);
    assert!(machine.descriptor().state().is_empty());
}

#[rstest]
#[tokio::test]
async fn instance_error_state_rolls_back(harness: Harness, descriptor: VmDescriptor) {
    harness.gateway.script_instance_statuses(&["BUILD", "ERROR"]);
    let mut machine = harness.machine(descriptor);
    let err = machine
        .provision()
        .await
        .expect_err("error state should fail provisioning");
    assert!(matches!(
        err.root_cause(),
        LifecycleError::ErrorState {
            stage: Stage::AwaitRunning,
            ..
        }
    ));
    assert_eq!(deletes(&harness), 1);
    assert!(!harness.gateway.instance_exists("instance-1"));
}

#[rstest]
#[tokio::test]
async fn unreachable_ssh_releases_floating_ip(harness: Harness, descriptor: VmDescriptor) {
    harness.probe.set_reachable(false);
    let mut machine = harness.machine(descriptor);
    let err = machine
        .provision()
        .await
        .expect_err("ssh timeout should fail provisioning");
    assert!(matches!(
        err.root_cause(),
        LifecycleError::ActionTimeout {
            stage: Stage::AwaitSsh,
            ..
        }
    ));
    assert!(!harness.gateway.floating_ip_exists("fip-2"));
    assert!(machine.descriptor().state().is_empty());
}

#[rstest]
#[tokio::test]
async fn volume_failure_tears_down_everything(harness: Harness) {
    harness.gateway.fail(Operation::AttachVolume, "no free device");
    let mut machine = harness.machine(descriptor_with_volume());
    let err = machine
        .provision()
        .await
        .expect_err("attach failure should fail provisioning");
    assert_eq!(err.stage(), Some(Stage::AttachVolume));
    assert!(!harness.gateway.volume_exists("vol-3"));
    assert!(!harness.gateway.floating_ip_exists("fip-2"));
    assert!(!harness.gateway.instance_exists("instance-1"));
}

#[rstest]
#[tokio::test]
async fn failed_rollback_is_reported_next_to_the_cause(
    harness: Harness,
    descriptor: VmDescriptor,
) {
    harness.gateway.fail(Operation::AssociateFloatingIp, "port busy");
    harness.gateway.fail(Operation::DeleteInstance, "locked");
    let mut machine = harness.machine(descriptor);
    let err = machine
        .provision()
        .await
        .expect_err("association failure should fail provisioning");
    let LifecycleError::RolledBack { rollback, .. } = &err else {
        panic!("expected rolled back error, got {err:?}");
    };
    assert!(!rollback.succeeded());
    let message = err.to_string();
    assert!(message.contains("port busy"), "{message}");
    assert!(message.contains("also failed"), "{message}");
    assert_eq!(
        machine.descriptor().state().instance_id(),
        Some(&InstanceId::from("instance-1"))
    );
}

#[rstest]
#[tokio::test]
async fn provisioned_machine_reports_running(harness: Harness) {
    let descriptor = builder()
        .security_group("web")
        .build()
        .unwrap_or_else(|err| panic!("descriptor: {err}"));
    let mut machine = provisioned(&harness, descriptor).await;
    let state = machine
        .state()
        .await
        .unwrap_or_else(|err| panic!("state: {err}"));
    assert_eq!(state, VmState::Running);
    assert_eq!(
        harness.gateway.count(|call| matches!(
            call,
            GatewayCall::CreateInstance(spec) if spec.security_groups == [String::from("web")]
        )),
        1
    );
}

#[rstest]
#[tokio::test]
async fn zero_size_volume_is_never_created(harness: Harness, descriptor: VmDescriptor) {
    let mut config = descriptor.config().clone();
    config.volume = Some(VolumeSpec {
        name: String::from("scratch"),
        size_gb: 0,
        volume_type: None,
        device: None,
    });
    let unbuilt =
        VmDescriptor::new(config).unwrap_or_else(|err| panic!("descriptor: {err}"));

    let machine = provisioned(&harness, unbuilt).await;

    assert_eq!(
        harness
            .gateway
            .count(|call| matches!(call, GatewayCall::CreateVolume(_))),
        0
    );
    assert!(machine.descriptor().state().volume().is_none());
}
