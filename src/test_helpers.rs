//! Serialises environment mutation across unit tests.

use std::env;

use tokio::sync::{Mutex, MutexGuard};

/// Lock shared by every test that mutates the process environment.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Holds the env mutex and removes the variables it set on drop.
pub struct EnvGuard {
    keys: Vec<String>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets every `(key, value)` pair while holding the global mutex.
    pub async fn set_vars(vars: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().await;
        for (key, value) in vars {
            // SAFETY: ENV_LOCK serialises every test that touches the
            // environment.
            unsafe { env::set_var(key, value) };
        }
        Self {
            keys: vars.iter().map(|(key, _)| (*key).to_owned()).collect(),
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for key in &self.keys {
            // SAFETY: the guard still holds ENV_LOCK.
            unsafe { env::remove_var(key) };
        }
    }
}
