//! Result-code classification for idempotent writes.
//!
//! Some writes are defined by their end state: adding a value that is
//! already present, or deleting one that is already gone, leaves the entry
//! as requested. Those codes are reported as success where they occur.

use crate::directory::result_code;
use crate::error::{DirectoryError, DirectoryResult};

/// Kind of write whose outcome is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Add a value to a multi-valued attribute.
    AddValue,
    /// Delete a value from a multi-valued attribute.
    DeleteValue,
    /// Any other write.
    Other,
}

/// Outcome of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The requested end state holds.
    Success,
    /// The write failed.
    Failure,
}

/// Classifies a protocol result code for a write kind.
#[must_use]
pub const fn classify(kind: WriteKind, code: u32) -> Classification {
    match (kind, code) {
        (_, result_code::SUCCESS)
        | (WriteKind::AddValue, result_code::ATTRIBUTE_OR_VALUE_EXISTS)
        | (WriteKind::DeleteValue, result_code::NO_SUCH_ATTRIBUTE) => Classification::Success,
        _ => Classification::Failure,
    }
}

/// Swallows the error of `outcome` when [`classify`] reports success.
pub fn tolerate(kind: WriteKind, outcome: DirectoryResult<()>) -> DirectoryResult<()> {
    match outcome {
        Err(err) => match err.result_code().map(|code| classify(kind, code)) {
            Some(Classification::Success) => {
                tracing::debug!(?kind, error = %err, "Idempotent write treated as success");
                Ok(())
            }
            _ => Err(err),
        },
        ok => ok,
    }
}
