use std::sync::Arc;

use chrono::Utc;
use log::info;
use uuid::Uuid;

use super::error::LeadsError;
use super::store::LeadStore;
use super::types::{CreateLossReasonRequest, LossReason, UpdateLossReasonRequest};
use crate::core::HubContext;

const SORT_ORDER_STEP: i32 = 10;

pub struct LossReasonRegistry {
    store: Arc<dyn LeadStore>,
}

impl LossReasonRegistry {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, ctx: &HubContext) -> Result<Vec<LossReason>, LeadsError> {
        Ok(self.store.list_loss_reasons(ctx.hub_id).await?)
    }

    pub async fn get(&self, ctx: &HubContext, id: Uuid) -> Result<LossReason, LeadsError> {
        let reason = self
            .store
            .get_loss_reason(id)
            .await?
            .ok_or_else(|| LeadsError::NotFound(format!("loss reason {id}")))?;
        ctx.ensure_same_hub(reason.hub_id)?;
        Ok(reason)
    }

    pub async fn create(
        &self,
        ctx: &HubContext,
        request: CreateLossReasonRequest,
    ) -> Result<LossReason, LeadsError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(LeadsError::Validation("loss reason name is required".to_string()));
        }
        let sort_order = match request.sort_order {
            Some(order) => order,
            None => {
                let existing = self.store.list_loss_reasons(ctx.hub_id).await?;
                let last = existing.iter().map(|r| r.sort_order).max().unwrap_or(0);
                last.checked_add(SORT_ORDER_STEP).ok_or_else(|| {
                    LeadsError::Validation(format!(
                        "no sort order left after {last}; pass an explicit sort order"
                    ))
                })?
            }
        };

        let reason = LossReason {
            id: Uuid::new_v4(),
            hub_id: ctx.hub_id,
            name: name.to_string(),
            is_active: true,
            sort_order,
            created_at: Utc::now(),
        };
        self.store.insert_loss_reason(reason.clone()).await?;
        info!("Created loss reason {} ({}) for hub {}", reason.id, reason.name, ctx.hub_id);
        Ok(reason)
    }

    pub async fn update(
        &self,
        ctx: &HubContext,
        id: Uuid,
        request: UpdateLossReasonRequest,
    ) -> Result<LossReason, LeadsError> {
        let mut reason = self.get(ctx, id).await?;
        if let Some(name) = request.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(LeadsError::Validation("loss reason name is required".to_string()));
            }
            reason.name = name.to_string();
        }
        if let Some(is_active) = request.is_active {
            reason.is_active = is_active;
        }
        if let Some(sort_order) = request.sort_order {
            reason.sort_order = sort_order;
        }
        self.store.update_loss_reason(reason.clone()).await?;
        Ok(reason)
    }

    /// Refused with `InUse` while a lost lead still points at the reason.
    pub async fn delete(&self, ctx: &HubContext, id: Uuid) -> Result<(), LeadsError> {
        self.get(ctx, id).await?;
        self.store.delete_loss_reason(id).await?;
        info!("Deleted loss reason {id} from hub {}", ctx.hub_id);
        Ok(())
    }

    /// A reason that may be attached to a lead being lost right now.
    pub async fn resolve_for_loss(&self, ctx: &HubContext, id: Uuid) -> Result<LossReason, LeadsError> {
        let reason = self.get(ctx, id).await?;
        if !reason.is_active {
            return Err(LeadsError::Validation(format!(
                "loss reason '{}' is inactive",
                reason.name
            )));
        }
        Ok(reason)
    }
}
