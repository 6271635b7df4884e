//! Process-wide registry of in-flight runs.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("configuration '{0}' is already being parsed")]
pub struct RunInProgress(pub String);

static ACTIVE: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();

fn active() -> &'static Mutex<HashSet<String>> {
    ACTIVE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Marks a configuration as being parsed until dropped.
#[derive(Debug)]
pub struct RunGuard {
    configuration: String,
}

impl RunGuard {
    pub fn acquire(configuration: &str) -> Result<Self, RunInProgress> {
        let mut set = active().lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(configuration.to_string()) {
            return Err(RunInProgress(configuration.to_string()));
        }
        Ok(Self {
            configuration: configuration.to_string(),
        })
    }

    pub fn configuration(&self) -> &str {
        &self.configuration
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut set = active().lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.configuration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_run_of_a_configuration_is_rejected() {
        let guard = RunGuard::acquire("lock-test").unwrap();
        assert_eq!(
            RunGuard::acquire("lock-test").unwrap_err(),
            RunInProgress("lock-test".into())
        );
        let other = RunGuard::acquire("lock-test-other").unwrap();
        assert_eq!(other.configuration(), "lock-test-other");
        drop(guard);
        assert!(RunGuard::acquire("lock-test").is_ok());
    }
}
