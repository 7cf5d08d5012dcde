#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use leadflow::leads::{
    ConversionClaim, ConversionError, ConversionRequest, CreateLeadRequest, CustomerConversionPort, CustomerRef,
    Lead, LeadActivity, LeadCommit, LeadService, LeadSettings, LeadStatus, LeadStore, LossReason,
    MemoryLeadStore, Pipeline, PipelineStage, StoreError,
};
use leadflow::{HubContext, LeadsConfig};
use uuid::Uuid;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Conversion port that counts calls and hands out predictable ids.
#[derive(Default)]
pub struct RecordingConversion {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl RecordingConversion {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CustomerConversionPort for RecordingConversion {
    async fn convert(&self, request: &ConversionRequest) -> Result<CustomerRef, ConversionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(CustomerRef(format!("cust-{}-{n}", request.lead_id)))
    }
}

/// Conversion port whose customer module is always down.
#[derive(Default)]
pub struct FailingConversion {
    pub calls: AtomicUsize,
}

#[async_trait]
impl CustomerConversionPort for FailingConversion {
    async fn convert(&self, _request: &ConversionRequest) -> Result<CustomerRef, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ConversionError::Unavailable("connection refused".to_string()))
    }
}

/// Delegates to a memory store but can be told to fail lead commits or
/// multi-row pipeline writes.
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryLeadStore,
    pub fail_commits: Arc<AtomicBool>,
    pub fail_pipeline_writes: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn fail_next_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_pipeline_writes(&self, fail: bool) {
        self.fail_pipeline_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl LeadStore for FlakyStore {
    async fn insert_pipeline(&self, pipeline: Pipeline) -> Result<(), StoreError> {
        self.inner.insert_pipeline(pipeline).await
    }
    async fn insert_pipeline_with_stages(
        &self,
        pipeline: Pipeline,
        stages: Vec<PipelineStage>,
    ) -> Result<(), StoreError> {
        if self.fail_pipeline_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.insert_pipeline_with_stages(pipeline, stages).await
    }
    async fn update_pipeline(&self, pipeline: Pipeline) -> Result<(), StoreError> {
        self.inner.update_pipeline(pipeline).await
    }
    async fn get_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, StoreError> {
        self.inner.get_pipeline(id).await
    }
    async fn list_pipelines(&self, hub_id: Uuid) -> Result<Vec<Pipeline>, StoreError> {
        self.inner.list_pipelines(hub_id).await
    }
    async fn set_default_pipeline(&self, hub_id: Uuid, pipeline_id: Uuid) -> Result<(), StoreError> {
        self.inner.set_default_pipeline(hub_id, pipeline_id).await
    }
    async fn delete_pipeline(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_pipeline(id).await
    }
    async fn insert_stage(&self, stage: PipelineStage) -> Result<(), StoreError> {
        self.inner.insert_stage(stage).await
    }
    async fn update_stage(&self, stage: PipelineStage) -> Result<(), StoreError> {
        self.inner.update_stage(stage).await
    }
    async fn get_stage(&self, id: Uuid) -> Result<Option<PipelineStage>, StoreError> {
        self.inner.get_stage(id).await
    }
    async fn list_stages(&self, pipeline_id: Uuid) -> Result<Vec<PipelineStage>, StoreError> {
        self.inner.list_stages(pipeline_id).await
    }
    async fn delete_stage(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_stage(id).await
    }
    async fn insert_loss_reason(&self, reason: LossReason) -> Result<(), StoreError> {
        self.inner.insert_loss_reason(reason).await
    }
    async fn update_loss_reason(&self, reason: LossReason) -> Result<(), StoreError> {
        self.inner.update_loss_reason(reason).await
    }
    async fn get_loss_reason(&self, id: Uuid) -> Result<Option<LossReason>, StoreError> {
        self.inner.get_loss_reason(id).await
    }
    async fn list_loss_reasons(&self, hub_id: Uuid) -> Result<Vec<LossReason>, StoreError> {
        self.inner.list_loss_reasons(hub_id).await
    }
    async fn delete_loss_reason(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_loss_reason(id).await
    }
    async fn insert_lead(&self, lead: Lead) -> Result<(), StoreError> {
        self.inner.insert_lead(lead).await
    }
    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        self.inner.get_lead(id).await
    }
    async fn list_leads(
        &self,
        hub_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, StoreError> {
        self.inner.list_leads(hub_id, status).await
    }
    async fn commit_lead(&self, commit: LeadCommit) -> Result<Lead, StoreError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.commit_lead(commit).await
    }
    async fn claim_conversion(
        &self,
        lead_id: Uuid,
        expected_version: u64,
        claim: ConversionClaim,
    ) -> Result<u64, StoreError> {
        self.inner.claim_conversion(lead_id, expected_version, claim).await
    }
    async fn release_conversion(&self, lead_id: Uuid, token: Uuid) -> Result<(), StoreError> {
        self.inner.release_conversion(lead_id, token).await
    }
    async fn delete_lead(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete_lead(id).await
    }
    async fn append_activity(&self, activity: LeadActivity) -> Result<(), StoreError> {
        self.inner.append_activity(activity).await
    }
    async fn list_activities(
        &self,
        lead_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LeadActivity>, StoreError> {
        self.inner.list_activities(lead_id, offset, limit).await
    }
    async fn get_or_insert_settings(
        &self,
        defaults: LeadSettings,
    ) -> Result<LeadSettings, StoreError> {
        self.inner.get_or_insert_settings(defaults).await
    }
    async fn put_settings(&self, settings: LeadSettings) -> Result<(), StoreError> {
        self.inner.put_settings(settings).await
    }
}

pub fn auto_convert_config() -> LeadsConfig {
    LeadsConfig {
        auto_create_customer_on_win: true,
        ..LeadsConfig::default()
    }
}

/// A hub with the stock pipeline, ready for leads.
pub struct Hub {
    pub ctx: HubContext,
    pub pipeline: Pipeline,
    pub stages: Vec<PipelineStage>,
}

impl Hub {
    pub async fn bootstrap(service: &LeadService) -> Self {
        let ctx = HubContext::new(Uuid::new_v4()).with_actor(Uuid::new_v4());
        let pipeline = service
            .catalog()
            .ensure_default_pipeline(&ctx)
            .await
            .expect("default pipeline");
        let stages = service
            .catalog()
            .list_stages(&ctx, pipeline.id)
            .await
            .expect("stages");
        Self {
            ctx,
            pipeline,
            stages,
        }
    }

    pub fn stage(&self, name: &str) -> &PipelineStage {
        self.stages
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no stage named {name}"))
    }

    pub async fn lead(&self, service: &LeadService, name: &str) -> Lead {
        service
            .create_lead(
                &self.ctx,
                CreateLeadRequest {
                    name: name.to_string(),
                    company: Some(format!("{name} Ltd")),
                    email: Some("buyer@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .expect("create lead")
    }
}

pub async fn all_activities(service: &LeadService, ctx: &HubContext, lead_id: Uuid) -> Vec<LeadActivity> {
    use futures::TryStreamExt;
    service
        .activities()
        .list_for(ctx, lead_id)
        .try_collect()
        .await
        .expect("activities")
}
