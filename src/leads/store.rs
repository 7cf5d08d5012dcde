use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::types::{
    Lead, LeadActivity, LeadSettings, LeadStatus, LossReason, Pipeline, PipelineStage,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict: {0}")]
    Conflict(String),
    #[error("{0} is still referenced")]
    Referenced(String),
    #[error("{0} does not exist")]
    Missing(String),
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("backend failure: {0}")]
    Backend(String),
}

/// One atomic write of a lead plus the activities produced alongside it.
///
/// The store rejects the commit with [`StoreError::Conflict`] unless the
/// stored lead is still at `expected_version`, or while another writer
/// holds an unexpired conversion claim on it. A successful commit
/// releases any claim on the lead.
#[derive(Debug, Clone)]
pub struct LeadCommit {
    pub lead: Lead,
    pub expected_version: u64,
    pub activities: Vec<LeadActivity>,
    /// Token of the conversion claim this commit completes.
    pub claim: Option<Uuid>,
}

/// Marks a lead as having a customer conversion in flight.
///
/// Taken before the conversion port is called so that writers sharing
/// the store, in this process or another, cannot convert the same lead
/// twice. Expired claims are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionClaim {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl ConversionClaim {
    pub fn new(expires_at: DateTime<Utc>) -> Self {
        Self {
            token: Uuid::new_v4(),
            expires_at,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Persistence boundary for the leads core.
///
/// Lookups by id are not hub-filtered so callers can tell a foreign
/// record from a missing one.
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert_pipeline(&self, pipeline: Pipeline) -> Result<(), StoreError>;
    /// Writes a pipeline and all of its stages, or nothing.
    async fn insert_pipeline_with_stages(
        &self,
        pipeline: Pipeline,
        stages: Vec<PipelineStage>,
    ) -> Result<(), StoreError>;
    async fn update_pipeline(&self, pipeline: Pipeline) -> Result<(), StoreError>;
    async fn get_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, StoreError>;
    async fn list_pipelines(&self, hub_id: Uuid) -> Result<Vec<Pipeline>, StoreError>;
    /// Clears any other default in the hub and flags `pipeline_id`, as one write.
    async fn set_default_pipeline(&self, hub_id: Uuid, pipeline_id: Uuid)
        -> Result<(), StoreError>;
    /// Cascades to stages; refused while leads reference the pipeline.
    async fn delete_pipeline(&self, id: Uuid) -> Result<(), StoreError>;

    async fn insert_stage(&self, stage: PipelineStage) -> Result<(), StoreError>;
    async fn update_stage(&self, stage: PipelineStage) -> Result<(), StoreError>;
    async fn get_stage(&self, id: Uuid) -> Result<Option<PipelineStage>, StoreError>;
    /// Ordered by `order` ascending.
    async fn list_stages(&self, pipeline_id: Uuid) -> Result<Vec<PipelineStage>, StoreError>;
    async fn delete_stage(&self, id: Uuid) -> Result<(), StoreError>;

    async fn insert_loss_reason(&self, reason: LossReason) -> Result<(), StoreError>;
    async fn update_loss_reason(&self, reason: LossReason) -> Result<(), StoreError>;
    async fn get_loss_reason(&self, id: Uuid) -> Result<Option<LossReason>, StoreError>;
    async fn list_loss_reasons(&self, hub_id: Uuid) -> Result<Vec<LossReason>, StoreError>;
    async fn delete_loss_reason(&self, id: Uuid) -> Result<(), StoreError>;

    async fn insert_lead(&self, lead: Lead) -> Result<(), StoreError>;
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError>;
    async fn list_leads(
        &self,
        hub_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, StoreError>;
    /// Returns the lead as stored, with its bumped version.
    async fn commit_lead(&self, commit: LeadCommit) -> Result<Lead, StoreError>;
    /// Cascades to the lead's activities.
    async fn delete_lead(&self, id: Uuid) -> Result<(), StoreError>;
    /// Records `claim` on the lead and bumps its version, returning the
    /// new version. Fails with `Conflict` when the lead is not at
    /// `expected_version` or another claim is still active.
    async fn claim_conversion(
        &self,
        lead_id: Uuid,
        expected_version: u64,
        claim: ConversionClaim,
    ) -> Result<u64, StoreError>;
    /// Drops the claim if `token` still owns it. The version is untouched.
    async fn release_conversion(&self, lead_id: Uuid, token: Uuid) -> Result<(), StoreError>;

    async fn append_activity(&self, activity: LeadActivity) -> Result<(), StoreError>;
    /// Ascending by `created_at`, ties in insertion order.
    async fn list_activities(
        &self,
        lead_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LeadActivity>, StoreError>;

    async fn get_or_insert_settings(
        &self,
        defaults: LeadSettings,
    ) -> Result<LeadSettings, StoreError>;
    async fn put_settings(&self, settings: LeadSettings) -> Result<(), StoreError>;
}
