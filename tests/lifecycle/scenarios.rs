//! BDD scenarios for the machine lifecycle.

use rstest_bdd_macros::scenario;

use super::test_helpers::{LifecycleContext, lifecycle_context};

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Reject an unknown flavor before creating an instance"
)]
fn scenario_unknown_flavor(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Roll back the instance when floating IP association fails"
)]
fn scenario_association_rollback(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Remove an instance that never leaves BUILD"
)]
fn scenario_build_timeout(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Drive a machine through its whole lifecycle"
)]
fn scenario_full_lifecycle(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Destroying twice reports the missing instance id"
)]
fn scenario_double_destroy(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Reuse one session until teardown"
)]
fn scenario_session_reuse(lifecycle_context: LifecycleContext) {
    let _ = lifecycle_context;
}
