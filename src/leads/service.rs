use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use log::{info, warn};
use uuid::Uuid;

use super::activity::ActivityLog;
use super::catalog::PipelineCatalog;
use super::conversion::{CustomerConversionPort, DisabledConversion, HttpCustomerConversion};
use super::error::LeadsError;
use super::loss_reasons::LossReasonRegistry;
use super::memory_store::MemoryLeadStore;
use super::settings::LeadSettingsRegistry;
use super::state_machine::LeadStateMachine;
use super::store::{LeadCommit, LeadStore};
use super::types::{
    ActivityKind, CreateLeadRequest, Lead, LeadActivity, LeadStatus, Pipeline, PipelineStage,
    UpdateLeadRequest,
};
use crate::core::{HubContext, KeyedLocks, LeadsConfig};

/// Entry point of the leads core: wires the catalog, registries,
/// activity log and state machine around one store, and owns the lead
/// record operations that are not status transitions.
pub struct LeadService {
    store: Arc<dyn LeadStore>,
    catalog: Arc<PipelineCatalog>,
    loss_reasons: Arc<LossReasonRegistry>,
    settings: Arc<LeadSettingsRegistry>,
    activities: ActivityLog,
    state_machine: LeadStateMachine,
    lead_locks: Arc<KeyedLocks<Uuid>>,
}

impl LeadService {
    pub fn new(
        store: Arc<dyn LeadStore>,
        conversion: Arc<dyn CustomerConversionPort>,
        config: LeadsConfig,
    ) -> Self {
        let config = Arc::new(config);
        let catalog = Arc::new(PipelineCatalog::new(Arc::clone(&store)));
        let loss_reasons = Arc::new(LossReasonRegistry::new(Arc::clone(&store)));
        let settings = Arc::new(LeadSettingsRegistry::new(
            Arc::clone(&store),
            Arc::clone(&config),
        ));
        let lead_locks = Arc::new(KeyedLocks::new());
        let activities = ActivityLog::new(Arc::clone(&store), config.activity_page_size);
        let state_machine = LeadStateMachine::new(
            Arc::clone(&store),
            Arc::clone(&catalog),
            Arc::clone(&loss_reasons),
            Arc::clone(&settings),
            conversion,
            config,
            Arc::clone(&lead_locks),
        );

        Self {
            store,
            catalog,
            loss_reasons,
            settings,
            activities,
            state_machine,
            lead_locks,
        }
    }

    /// Picks the HTTP customer adapter when `customer_service_url` is set.
    pub fn from_config(store: Arc<dyn LeadStore>, config: LeadsConfig) -> Self {
        let conversion: Arc<dyn CustomerConversionPort> = match &config.customer_service_url {
            Some(url) => Arc::new(HttpCustomerConversion::new(
                url.clone(),
                config.customer_service_token.clone(),
            )),
            None => {
                warn!("No customer service configured, won leads will not be converted");
                Arc::new(DisabledConversion)
            }
        };
        Self::new(store, conversion, config)
    }

    pub fn in_memory(conversion: Arc<dyn CustomerConversionPort>, config: LeadsConfig) -> Self {
        Self::new(Arc::new(MemoryLeadStore::new()), conversion, config)
    }

    pub fn catalog(&self) -> &PipelineCatalog {
        &self.catalog
    }

    pub fn loss_reasons(&self) -> &LossReasonRegistry {
        &self.loss_reasons
    }

    pub fn settings(&self) -> &LeadSettingsRegistry {
        &self.settings
    }

    pub fn activities(&self) -> &ActivityLog {
        &self.activities
    }

    pub fn state_machine(&self) -> &LeadStateMachine {
        &self.state_machine
    }

    pub async fn get_lead(&self, ctx: &HubContext, lead_id: Uuid) -> Result<Lead, LeadsError> {
        let lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| LeadsError::NotFound(format!("lead {lead_id}")))?;
        ctx.ensure_same_hub(lead.hub_id)?;
        Ok(lead)
    }

    /// Newest first.
    pub async fn list_leads(
        &self,
        ctx: &HubContext,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, LeadsError> {
        Ok(self.store.list_leads(ctx.hub_id, status).await?)
    }

    async fn pipeline_for_new_lead(
        &self,
        ctx: &HubContext,
        requested: Option<Uuid>,
    ) -> Result<Pipeline, LeadsError> {
        if let Some(pipeline_id) = requested {
            return self.catalog.get_pipeline(ctx, pipeline_id).await;
        }
        if let Some(pipeline_id) = self.settings.get(ctx).await?.default_pipeline_id {
            match self.catalog.get_pipeline(ctx, pipeline_id).await {
                Ok(pipeline) => return Ok(pipeline),
                Err(LeadsError::NotFound(_)) => {
                    warn!("Default pipeline {pipeline_id} in settings no longer exists");
                }
                Err(e) => return Err(e),
            }
        }
        self.catalog.get_default_pipeline(ctx).await
    }

    pub async fn create_lead(
        &self,
        ctx: &HubContext,
        request: CreateLeadRequest,
    ) -> Result<Lead, LeadsError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(LeadsError::Validation("name is required".to_string()));
        }
        let value = request.value.unwrap_or_else(|| BigDecimal::from(0));
        check_value(&value)?;

        let pipeline = self.pipeline_for_new_lead(ctx, request.pipeline_id).await?;
        let stage: PipelineStage = match request.stage_id {
            Some(stage_id) => {
                self.catalog
                    .resolve_stage(ctx, pipeline.id, stage_id)
                    .await?
            }
            None => self.catalog.first_open_stage(ctx, pipeline.id).await?,
        };
        let source = match request.source {
            Some(source) => source,
            None => self.settings.get(ctx).await?.default_source,
        };

        let now = Utc::now();
        let lead = Lead {
            id: Uuid::new_v4(),
            hub_id: ctx.hub_id,
            name: name.to_string(),
            email: non_blank(request.email),
            phone: non_blank(request.phone),
            company: non_blank(request.company),
            value,
            expected_close_date: request.expected_close_date,
            pipeline_id: pipeline.id,
            stage_id: stage.id,
            assigned_to: request.assigned_to,
            converted: false,
            customer_ref: request.customer_ref,
            source,
            priority: request.priority.unwrap_or_default(),
            notes: non_blank(request.notes),
            status: LeadStatus::Open,
            won_date: None,
            lost_date: None,
            loss_reason_id: None,
            stage_changed_at: now,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        self.store.insert_lead(lead.clone()).await?;

        info!(
            "Created lead {} in pipeline {} stage {}",
            lead.id, pipeline.id, stage.id
        );
        Ok(lead)
    }

    /// Edits descriptive fields. Stage and status only change through
    /// the state machine.
    pub async fn update_lead(
        &self,
        ctx: &HubContext,
        lead_id: Uuid,
        request: UpdateLeadRequest,
    ) -> Result<Lead, LeadsError> {
        let _guard = self.lead_locks.lock(lead_id).await;
        let mut lead = self.get_lead(ctx, lead_id).await?;
        let expected_version = lead.version;

        if let Some(name) = request.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(LeadsError::Validation("name is required".to_string()));
            }
            lead.name = name.to_string();
        }
        if let Some(value) = request.value {
            check_value(&value)?;
            lead.value = value;
        }
        if request.email.is_some() {
            lead.email = non_blank(request.email);
        }
        if request.phone.is_some() {
            lead.phone = non_blank(request.phone);
        }
        if request.company.is_some() {
            lead.company = non_blank(request.company);
        }
        if request.notes.is_some() {
            lead.notes = non_blank(request.notes);
        }
        if request.clear_expected_close_date {
            lead.expected_close_date = None;
        } else if let Some(date) = request.expected_close_date {
            lead.expected_close_date = Some(date);
        }
        if request.clear_assigned_to {
            lead.assigned_to = None;
        } else if let Some(assignee) = request.assigned_to {
            lead.assigned_to = Some(assignee);
        }
        if let Some(source) = request.source {
            lead.source = source;
        }
        if let Some(priority) = request.priority {
            lead.priority = priority;
        }
        lead.updated_at = Utc::now();

        Ok(self
            .store
            .commit_lead(LeadCommit {
                lead,
                expected_version,
                activities: Vec::new(),
                claim: None,
            })
            .await?)
    }

    /// Removes the lead and its activity history.
    pub async fn delete_lead(&self, ctx: &HubContext, lead_id: Uuid) -> Result<(), LeadsError> {
        let _guard = self.lead_locks.lock(lead_id).await;
        self.get_lead(ctx, lead_id).await?;
        self.store.delete_lead(lead_id).await?;
        info!("Deleted lead {lead_id}");
        Ok(())
    }

    /// Logs a note, call, email or meeting by hand.
    pub async fn add_activity(
        &self,
        ctx: &HubContext,
        lead_id: Uuid,
        kind: ActivityKind,
        body: &str,
    ) -> Result<LeadActivity, LeadsError> {
        if !kind.is_manual() {
            return Err(LeadsError::Validation(format!(
                "{kind} entries are recorded automatically"
            )));
        }
        let body = body.trim();
        if body.is_empty() {
            return Err(LeadsError::Validation("description is required".to_string()));
        }
        self.activities
            .append(ctx, lead_id, kind, body, Utc::now())
            .await
    }

    /// One-click conversion outside a win. Failures are returned to the
    /// caller rather than logged as notes.
    pub async fn convert_to_customer(
        &self,
        ctx: &HubContext,
        lead_id: Uuid,
    ) -> Result<Lead, LeadsError> {
        self.state_machine.convert(ctx, lead_id).await
    }
}

fn check_value(value: &BigDecimal) -> Result<(), LeadsError> {
    if *value < BigDecimal::from(0) {
        return Err(LeadsError::Validation(
            "expected value cannot be negative".to_string(),
        ));
    }
    Ok(())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
