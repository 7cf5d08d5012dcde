use uuid::Uuid;

use super::conversion::ConversionError;
use super::store::StoreError;
use super::types::LeadStatus;

#[derive(Debug, thiserror::Error)]
pub enum LeadsError {
    #[error("No pipeline is configured for this hub")]
    NotConfigured,
    #[error("Stage {stage_id} does not belong to pipeline {pipeline_id}")]
    StageNotInPipeline { stage_id: Uuid, pipeline_id: Uuid },
    #[error("Lead is already {0}; reopen it first")]
    LeadAlreadyTerminal(LeadStatus),
    #[error("Lead is already in the requested state")]
    NoChange,
    #[error("Select a loss reason to mark this lead as lost")]
    LossReasonRequired,
    #[error("Record belongs to another hub")]
    CrossHubViolation,
    #[error("Lead was modified concurrently, retry the operation")]
    ConcurrentModification,
    #[error("Customer conversion failed: {0}")]
    ConversionFailed(String),
    #[error("Lead already has a linked customer")]
    AlreadyConverted,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Still in use: {0}")]
    InUse(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LeadsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification)
    }
}

impl From<StoreError> for LeadsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => Self::ConcurrentModification,
            StoreError::Referenced(msg) => Self::InUse(msg),
            StoreError::Missing(msg) => Self::NotFound(msg),
            StoreError::Integrity(msg) | StoreError::Backend(msg) => Self::Storage(msg),
        }
    }
}

impl From<ConversionError> for LeadsError {
    fn from(err: ConversionError) -> Self {
        Self::ConversionFailed(err.to_string())
    }
}
