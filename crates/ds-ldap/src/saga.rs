//! Ordered multi-step writes.
//!
//! The directory has no multi-entry transactions. A [`Saga`] runs the
//! steps of a cascade in order, records the location each committed step
//! wrote, and on the first failure reports the failed step together with
//! what was already committed. Nothing is compensated.

use ds_store::StoreError;
use tracing::{debug, warn};

/// Tracks the progress of one cascading operation.
#[derive(Debug)]
pub struct Saga {
    operation: &'static str,
    committed: Vec<String>,
}

impl Saga {
    /// Starts a saga for `operation`.
    #[must_use]
    pub const fn new(operation: &'static str) -> Self {
        Self {
            operation,
            committed: Vec::new(),
        }
    }

    /// Runs one step writing `location`.
    ///
    /// A failure of the first step is returned unchanged. Later failures
    /// are wrapped in `StoreError::CascadeFailed`.
    pub async fn step<T, E, F>(&mut self, name: &str, location: &str, action: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: Into<StoreError>,
    {
        match action.await {
            Ok(value) => {
                debug!(operation = self.operation, step = name, location, "Cascade step committed");
                self.committed.push(location.to_string());
                Ok(value)
            }
            Err(e) => Err(self.fail(name, e.into())),
        }
    }

    /// Converts a step failure into the error the caller sees.
    pub fn fail(&self, name: &str, error: StoreError) -> StoreError {
        if self.committed.is_empty() {
            return error;
        }
        warn!(
            operation = self.operation,
            step = name,
            committed = ?self.committed,
            error = %error,
            "Cascade failed after partial commit"
        );
        StoreError::CascadeFailed {
            operation: self.operation.to_string(),
            failed_step: name.to_string(),
            committed: self.committed.clone(),
            source: Box::new(error),
        }
    }

    /// Locations written so far.
    #[must_use]
    pub fn committed(&self) -> &[String] {
        &self.committed
    }
}
