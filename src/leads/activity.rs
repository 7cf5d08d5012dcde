use std::sync::Arc;

use async_stream::try_stream;
use chrono::{DateTime, Utc};
use futures::Stream;
use uuid::Uuid;

use super::error::LeadsError;
use super::store::LeadStore;
use super::types::{ActivityKind, LeadActivity};
use crate::core::HubContext;

/// Builds an activity row; the caller decides how it is persisted.
pub fn new_activity(
    ctx: &HubContext,
    lead_id: Uuid,
    kind: ActivityKind,
    body: impl Into<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
) -> LeadActivity {
    LeadActivity {
        id: Uuid::new_v4(),
        hub_id: ctx.hub_id,
        lead_id,
        kind,
        body: body.into(),
        metadata,
        actor_id: ctx.actor_id,
        created_at,
    }
}

/// Append-only history of a lead.
pub struct ActivityLog {
    store: Arc<dyn LeadStore>,
    page_size: usize,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn LeadStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    async fn check_lead(&self, ctx: &HubContext, lead_id: Uuid) -> Result<(), LeadsError> {
        let lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| LeadsError::NotFound(format!("lead {lead_id}")))?;
        ctx.ensure_same_hub(lead.hub_id)
    }

    pub async fn append(
        &self,
        ctx: &HubContext,
        lead_id: Uuid,
        kind: ActivityKind,
        body: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<LeadActivity, LeadsError> {
        self.check_lead(ctx, lead_id).await?;
        let activity = new_activity(ctx, lead_id, kind, body, serde_json::json!({}), timestamp);
        self.store.append_activity(activity.clone()).await?;
        Ok(activity)
    }

    /// Oldest first, fetched lazily one page at a time. Each call starts
    /// over from the first entry.
    pub fn list_for<'a>(
        &'a self,
        ctx: &'a HubContext,
        lead_id: Uuid,
    ) -> impl Stream<Item = Result<LeadActivity, LeadsError>> + Send + 'a {
        try_stream! {
            self.check_lead(ctx, lead_id).await?;
            let mut offset = 0;
            loop {
                let page = self
                    .store
                    .list_activities(lead_id, offset, self.page_size)
                    .await
                    .map_err(LeadsError::from)?;
                let fetched = page.len();
                for activity in page {
                    yield activity;
                }
                if fetched < self.page_size {
                    break;
                }
                offset += fetched;
            }
        }
    }
}
