//! Shared fixtures for lifecycle BDD scenarios.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rstest::fixture;
use stratus::{IpPair, LifecycleError, VmState};
use thiserror::Error;
use tokio::runtime::Runtime;

use crate::world::{Machine, World, descriptor};

/// Fake provider plus the machine under test and the last action's result.
///
/// Clones share the machine and the recorded outcome, so a step may take the
/// context by value and later steps still observe its effects.
#[derive(Clone)]
pub struct LifecycleContext {
    pub world: World,
    machine: Arc<Mutex<Option<Machine>>>,
    outcome: Arc<Mutex<Option<Result<(), LifecycleError>>>>,
}

/// Machine operation driven by a `When` step.
#[derive(Clone, Copy, Debug)]
pub enum Action {
    Provision,
    Halt,
    Start,
    Destroy,
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("failed to start runtime: {0}")]
    Runtime(String),
    #[error("no machine has been configured")]
    MissingMachine,
    #[error("assertion failed: {0}")]
    Assertion(String),
}

impl LifecycleContext {
    fn new() -> Self {
        Self {
            world: World::new(),
            machine: Arc::new(Mutex::new(None)),
            outcome: Arc::new(Mutex::new(None)),
        }
    }

    pub fn configure_machine(&self, flavor: &str) {
        let machine = self.world.machine(descriptor(flavor));
        *lock(&self.machine) = Some(machine);
    }

    /// Runs `action` to completion and records its result.
    pub fn perform(&self, action: Action) -> Result<(), StepError> {
        let runtime = runtime()?;
        let mut guard = lock(&self.machine);
        let machine = guard.as_mut().ok_or(StepError::MissingMachine)?;
        let result = runtime.block_on(async {
            match action {
                Action::Provision => machine.provision().await,
                Action::Halt => machine.halt().await,
                Action::Start => machine.start().await,
                Action::Destroy => machine.destroy().await,
            }
        });
        drop(guard);
        self.record(result);
        Ok(())
    }

    pub fn state(&self) -> Result<VmState, StepError> {
        let runtime = runtime()?;
        let mut guard = lock(&self.machine);
        let machine = guard.as_mut().ok_or(StepError::MissingMachine)?;
        Ok(runtime.block_on(machine.state())?)
    }

    pub fn addresses(&self) -> Result<IpPair, StepError> {
        let runtime = runtime()?;
        let mut guard = lock(&self.machine);
        let machine = guard.as_mut().ok_or(StepError::MissingMachine)?;
        Ok(runtime.block_on(machine.get_ips())?)
    }

    /// Reads the machine without driving it.
    pub fn inspect<T>(&self, read: impl FnOnce(&Machine) -> T) -> Result<T, StepError> {
        let guard = lock(&self.machine);
        guard.as_ref().map(read).ok_or(StepError::MissingMachine)
    }

    fn record(&self, result: Result<(), LifecycleError>) {
        *lock(&self.outcome) = Some(result);
    }

    /// Error returned by the last action, failing if it succeeded.
    pub fn failure(&self) -> Result<LifecycleError, StepError> {
        match lock(&self.outcome).clone() {
            Some(Err(err)) => Ok(err),
            Some(Ok(())) => Err(StepError::Assertion(String::from(
                "expected the last action to fail",
            ))),
            None => Err(StepError::Assertion(String::from("missing outcome"))),
        }
    }
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Runtime(err.to_string()))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[fixture]
pub fn lifecycle_context() -> LifecycleContext {
    LifecycleContext::new()
}
