use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use super::error::LeadsError;
use super::store::LeadStore;
use super::types::{LeadSettings, UpdateSettingsRequest};
use crate::core::{HubContext, KeyedLocks, LeadsConfig};

/// Per-hub lead settings, created from config defaults on first read.
/// Updates are serialized per hub so partial edits never drop each other.
pub struct LeadSettingsRegistry {
    store: Arc<dyn LeadStore>,
    config: Arc<LeadsConfig>,
    hub_locks: KeyedLocks<Uuid>,
}

impl LeadSettingsRegistry {
    pub fn new(store: Arc<dyn LeadStore>, config: Arc<LeadsConfig>) -> Self {
        Self {
            store,
            config,
            hub_locks: KeyedLocks::new(),
        }
    }

    fn defaults_for(&self, ctx: &HubContext) -> LeadSettings {
        LeadSettings {
            hub_id: ctx.hub_id,
            default_pipeline_id: None,
            default_source: self.config.default_source,
            auto_create_customer_on_win: self.config.auto_create_customer_on_win,
            updated_at: Utc::now(),
        }
    }

    pub async fn get(&self, ctx: &HubContext) -> Result<LeadSettings, LeadsError> {
        let settings = self
            .store
            .get_or_insert_settings(self.defaults_for(ctx))
            .await?;
        debug!(
            "Lead settings for hub {}: auto_create_customer_on_win={}",
            ctx.hub_id, settings.auto_create_customer_on_win
        );
        Ok(settings)
    }

    pub async fn update(
        &self,
        ctx: &HubContext,
        request: UpdateSettingsRequest,
    ) -> Result<LeadSettings, LeadsError> {
        let _guard = self.hub_locks.lock(ctx.hub_id).await;
        let mut settings = self.get(ctx).await?;

        if let Some(pipeline_id) = request.default_pipeline_id {
            let pipeline = self
                .store
                .get_pipeline(pipeline_id)
                .await?
                .ok_or_else(|| LeadsError::NotFound(format!("pipeline {pipeline_id}")))?;
            ctx.ensure_same_hub(pipeline.hub_id)?;
            settings.default_pipeline_id = Some(pipeline_id);
        }
        if let Some(source) = request.default_source {
            settings.default_source = source;
        }
        if let Some(auto_create) = request.auto_create_customer_on_win {
            settings.auto_create_customer_on_win = auto_create;
        }
        settings.updated_at = Utc::now();

        self.store.put_settings(settings.clone()).await?;
        info!("Updated lead settings for hub {}", ctx.hub_id);
        Ok(settings)
    }
}
