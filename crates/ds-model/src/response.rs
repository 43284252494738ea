//! Operation envelope returned by every mutating store operation.

use serde::{Deserialize, Serialize};

/// Outcome of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    /// The write was applied.
    Ok,
    /// The write was not applied.
    Failed,
}

/// Caller context attached to a write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// Caller-supplied correlation id, echoed in the response.
    pub correlation_id: Option<String>,
    /// Name of the principal issuing the request (for logs only).
    pub requester: Option<String>,
}

impl ProviderRequest {
    /// Creates an empty request context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Sets the requester name.
    #[must_use]
    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }
}

/// Envelope consumed by the REST and queue collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Write outcome.
    pub status: ResponseStatus,
    /// Identifier of the affected entity.
    pub entity_id: String,
    /// Correlation id copied from the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ProviderResponse {
    /// Successful write on `entity_id`.
    #[must_use]
    pub fn ok(entity_id: impl Into<String>, request: &ProviderRequest) -> Self {
        Self {
            status: ResponseStatus::Ok,
            entity_id: entity_id.into(),
            correlation_id: request.correlation_id.clone(),
        }
    }

    /// Failed write on `entity_id`.
    #[must_use]
    pub fn failed(entity_id: impl Into<String>, request: &ProviderRequest) -> Self {
        Self {
            status: ResponseStatus::Failed,
            entity_id: entity_id.into(),
            correlation_id: request.correlation_id.clone(),
        }
    }

    /// Whether the write was applied.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }
}
