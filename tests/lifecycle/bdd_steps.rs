//! BDD step definitions for the machine lifecycle.

use std::net::IpAddr;

use rstest_bdd_macros::{given, then, when};
use stratus::gateway::{InstanceId, ResourceKind};
use stratus::test_support::{GatewayCall, Operation};
use stratus::{LifecycleError, Stage};

use super::test_helpers::{Action, LifecycleContext, StepError};

#[given("a provider offering flavor \"{flavor}\"")]
fn provider_offering(lifecycle_context: LifecycleContext, flavor: String) -> LifecycleContext {
    lifecycle_context.world.gateway.add_flavor(&flavor, "flavor-2");
    lifecycle_context
}

#[given("a machine requesting flavor \"{flavor}\"")]
fn machine_requesting(lifecycle_context: LifecycleContext, flavor: String) -> LifecycleContext {
    lifecycle_context.configure_machine(&flavor);
    lifecycle_context
}

#[given("the provider assigns instance id \"{id}\"")]
fn provider_assigns(lifecycle_context: LifecycleContext, id: String) -> LifecycleContext {
    lifecycle_context.world.gateway.push_instance_id(&id);
    lifecycle_context
}

#[given("floating IP association fails with \"{message}\"")]
fn association_fails(lifecycle_context: LifecycleContext, message: String) -> LifecycleContext {
    lifecycle_context
        .world
        .gateway
        .fail(Operation::AssociateFloatingIp, &message);
    lifecycle_context
}

#[given("the instance never leaves \"{status}\"")]
fn instance_stuck(lifecycle_context: LifecycleContext, status: String) -> LifecycleContext {
    lifecycle_context
        .world
        .gateway
        .script_instance_statuses(&[status.as_str()]);
    lifecycle_context
}

#[when("I provision the machine")]
fn provision(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    lifecycle_context.perform(Action::Provision)
}

#[when("I halt the machine")]
fn halt(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    lifecycle_context.perform(Action::Halt)
}

#[when("I start the machine")]
fn start(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    lifecycle_context.perform(Action::Start)
}

#[when("I destroy the machine")]
fn destroy(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    lifecycle_context.perform(Action::Destroy)
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), StepError> {
    if condition {
        Ok(())
    } else {
        Err(StepError::Assertion(message()))
    }
}

#[then("provisioning fails because flavor \"{flavor}\" is missing")]
fn flavor_missing(lifecycle_context: &LifecycleContext, flavor: String) -> Result<(), StepError> {
    let err = lifecycle_context.failure()?;
    let expected = LifecycleError::NotFound {
        stage: Stage::ResolveFlavor,
        kind: ResourceKind::Flavor,
        name: flavor,
    };
    ensure(err == expected, || format!("expected {expected:?}, got {err:?}"))
}

#[then("no instance was created")]
fn no_instance_created(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let creates = lifecycle_context
        .world
        .gateway
        .count(|call| matches!(call, GatewayCall::CreateInstance(_)));
    ensure(creates == 0, || format!("expected no create calls, got {creates}"))
}

#[then("the descriptor records nothing")]
fn descriptor_empty(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let empty = lifecycle_context.inspect(|machine| machine.descriptor().state().is_empty())?;
    ensure(empty, || String::from("descriptor should hold no identifiers"))
}

#[then("the descriptor has no instance id")]
fn no_instance_id(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let recorded = lifecycle_context
        .inspect(|machine| machine.descriptor().state().instance_id().cloned())?;
    ensure(recorded.is_none(), || {
        format!("instance id should be cleared, found {recorded:?}")
    })
}

#[then("the failure mentions \"{text}\"")]
fn failure_mentions(lifecycle_context: &LifecycleContext, text: String) -> Result<(), StepError> {
    let message = lifecycle_context.failure()?.to_string();
    ensure(message.contains(&text), || {
        format!("expected '{text}' in: {message}")
    })
}

#[then("instance \"{id}\" was deleted exactly once")]
fn deleted_once(lifecycle_context: &LifecycleContext, id: String) -> Result<(), StepError> {
    let target = InstanceId::from(id.as_str());
    let deletes = lifecycle_context
        .world
        .gateway
        .count(|call| *call == GatewayCall::DeleteInstance(target.clone()));
    ensure(deletes == 1, || format!("expected one delete of {id}, got {deletes}"))
}

#[then("instance \"{id}\" no longer exists")]
fn instance_gone(lifecycle_context: &LifecycleContext, id: String) -> Result<(), StepError> {
    let exists = lifecycle_context.world.gateway.instance_exists(&id);
    ensure(!exists, || format!("instance {id} should be deleted"))
}

#[then("floating IP \"{id}\" no longer exists")]
fn floating_ip_gone(lifecycle_context: &LifecycleContext, id: String) -> Result<(), StepError> {
    let exists = lifecycle_context.world.gateway.floating_ip_exists(&id);
    ensure(!exists, || format!("floating IP {id} should be released"))
}

#[then("provisioning timed out waiting for the instance to run")]
fn timed_out_waiting(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let err = lifecycle_context.failure()?;
    ensure(
        matches!(
            err.root_cause(),
            LifecycleError::ActionTimeout {
                stage: Stage::AwaitRunning,
                ..
            }
        ),
        || format!("expected a timeout while awaiting running, got {err:?}"),
    )
}

#[then("the machine reports state \"{state}\"")]
fn reports_state(lifecycle_context: &LifecycleContext, state: String) -> Result<(), StepError> {
    let actual = lifecycle_context.state()?;
    ensure(actual.to_string() == state, || {
        format!("expected state {state}, got {actual}")
    })
}

#[then("the public address is \"{address}\"")]
fn public_address(lifecycle_context: &LifecycleContext, address: IpAddr) -> Result<(), StepError> {
    let actual = lifecycle_context.addresses()?.public();
    ensure(actual == Some(address), || {
        format!("expected public address {address}, got {actual:?}")
    })
}

#[then("the private address is \"{address}\"")]
fn private_address(
    lifecycle_context: &LifecycleContext,
    address: IpAddr,
) -> Result<(), StepError> {
    let actual = lifecycle_context.addresses()?.private();
    ensure(actual == Some(address), || {
        format!("expected private address {address}, got {actual:?}")
    })
}

#[then("the action is rejected for the current state")]
fn rejected_for_state(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let err = lifecycle_context.failure()?;
    ensure(matches!(err, LifecycleError::InvalidState { .. }), || {
        format!("expected an invalid state error, got {err:?}")
    })
}

#[then("the provider received {count} stop request")]
fn stop_requests(lifecycle_context: &LifecycleContext, count: usize) -> Result<(), StepError> {
    let stops = lifecycle_context
        .world
        .gateway
        .count(|call| matches!(call, GatewayCall::StopInstance(_)));
    ensure(stops == count, || format!("expected {count} stop calls, got {stops}"))
}

#[then("destroy reports a missing instance id")]
fn missing_instance_id(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let err = lifecycle_context.failure()?;
    let expected = LifecycleError::MissingIdentifier {
        field: "instance_id",
    };
    ensure(err == expected, || format!("expected {expected:?}, got {err:?}"))
}

#[then("the provider was connected once")]
fn connected_once(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let connects = lifecycle_context.world.connector.connects();
    ensure(connects == 1, || format!("expected one session, opened {connects}"))
}

#[then("the machine holds no session")]
fn no_session(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    let open = lifecycle_context.inspect(|machine| machine.has_session())?;
    ensure(!open, || String::from("session should be dropped after destroy"))
}
