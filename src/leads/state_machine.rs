use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde_json::json;
use uuid::Uuid;

use super::activity::new_activity;
use super::catalog::PipelineCatalog;
use super::conversion::{
    convert_with_timeout, ConversionError, ConversionRequest, CustomerConversionPort,
};
use super::error::LeadsError;
use super::loss_reasons::LossReasonRegistry;
use super::settings::LeadSettingsRegistry;
use super::store::{ConversionClaim, LeadCommit, LeadStore};
use super::types::{
    ActivityKind, CustomerRef, Lead, LeadActivity, LeadStatus, LossReason, TransitionOptions,
};
use crate::core::{HubContext, KeyedLocks, LeadsConfig};

/// Slack added to the conversion timeout before a claim goes stale.
const CLAIM_GRACE_SECS: i64 = 30;

/// What caused a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The lead entered a stage flagged auto-win or auto-lost.
    Stage,
    Manual,
    Reopen,
}

/// Every status change the engine will perform. Anything absent is
/// rejected.
pub const STATUS_TRANSITIONS: [(LeadStatus, LeadStatus, Trigger); 6] = [
    (LeadStatus::Open, LeadStatus::Won, Trigger::Stage),
    (LeadStatus::Open, LeadStatus::Lost, Trigger::Stage),
    (LeadStatus::Open, LeadStatus::Won, Trigger::Manual),
    (LeadStatus::Open, LeadStatus::Lost, Trigger::Manual),
    (LeadStatus::Won, LeadStatus::Open, Trigger::Reopen),
    (LeadStatus::Lost, LeadStatus::Open, Trigger::Reopen),
];

pub fn transition_allowed(from: LeadStatus, to: LeadStatus, trigger: Trigger) -> bool {
    STATUS_TRANSITIONS
        .iter()
        .any(|&(f, t, tr)| f == from && t == to && tr == trigger)
}

/// Lead mutations and activities accumulated for one operation, written
/// in a single commit at the end.
struct Transition {
    lead: Lead,
    expected_version: u64,
    activities: Vec<LeadActivity>,
    now: DateTime<Utc>,
    claim: Option<Uuid>,
}

impl Transition {
    fn begin(lead: Lead) -> Self {
        Self {
            expected_version: lead.version,
            lead,
            activities: Vec::new(),
            now: Utc::now(),
            claim: None,
        }
    }

    fn record(&mut self, ctx: &HubContext, kind: ActivityKind, body: String, metadata: serde_json::Value) {
        self.activities.push(new_activity(
            ctx,
            self.lead.id,
            kind,
            body,
            metadata,
            self.now,
        ));
    }

    fn into_commit(mut self) -> LeadCommit {
        self.lead.updated_at = self.now;
        LeadCommit {
            lead: self.lead,
            expected_version: self.expected_version,
            activities: self.activities,
            claim: self.claim,
        }
    }
}

/// Applies stage moves and status changes to leads.
///
/// Each operation holds the lead's lock from the first read to the
/// commit. The commit is version-checked for writers outside this
/// process, and a conversion is preceded by a claim in the store so
/// services sharing one store never call the port twice for a lead.
pub struct LeadStateMachine {
    store: Arc<dyn LeadStore>,
    catalog: Arc<PipelineCatalog>,
    loss_reasons: Arc<LossReasonRegistry>,
    settings: Arc<LeadSettingsRegistry>,
    conversion: Arc<dyn CustomerConversionPort>,
    config: Arc<LeadsConfig>,
    lead_locks: Arc<KeyedLocks<Uuid>>,
}

impl LeadStateMachine {
    pub fn new(
        store: Arc<dyn LeadStore>,
        catalog: Arc<PipelineCatalog>,
        loss_reasons: Arc<LossReasonRegistry>,
        settings: Arc<LeadSettingsRegistry>,
        conversion: Arc<dyn CustomerConversionPort>,
        config: Arc<LeadsConfig>,
        lead_locks: Arc<KeyedLocks<Uuid>>,
    ) -> Self {
        Self {
            store,
            catalog,
            loss_reasons,
            settings,
            conversion,
            config,
            lead_locks,
        }
    }

    async fn load_lead(&self, ctx: &HubContext, lead_id: Uuid) -> Result<Lead, LeadsError> {
        let lead = self
            .store
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| LeadsError::NotFound(format!("lead {lead_id}")))?;
        ctx.ensure_same_hub(lead.hub_id)?;
        Ok(lead)
    }

    /// Moves a lead to another stage of its pipeline, applying the
    /// stage's auto-win or auto-lost outcome in the same commit.
    pub async fn move_stage(
        &self,
        ctx: &HubContext,
        lead_id: Uuid,
        target_stage_id: Uuid,
        options: TransitionOptions,
    ) -> Result<Lead, LeadsError> {
        let _guard = self.lead_locks.lock(lead_id).await;
        let lead = self.load_lead(ctx, lead_id).await?;

        let target = self
            .catalog
            .resolve_stage(ctx, lead.pipeline_id, target_stage_id)
            .await?;
        if lead.stage_id == target.id {
            return Err(LeadsError::NoChange);
        }
        if lead.status.is_terminal() {
            debug!("Lead {lead_id} is {}, stage move refused", lead.status);
            return Err(LeadsError::LeadAlreadyTerminal(lead.status));
        }

        let implied = target.implied_status();
        let loss_reason = self
            .loss_reason_for(ctx, implied == Some(LeadStatus::Lost), options)
            .await?;
        let old_stage = self.catalog.get_stage(ctx, lead.stage_id).await?;

        let mut tx = Transition::begin(lead);
        tx.lead.stage_id = target.id;
        tx.lead.stage_changed_at = tx.now;
        tx.record(
            ctx,
            ActivityKind::StageChange,
            format!("Stage changed from {} to {}", old_stage.name, target.name),
            json!({
                "old_stage": old_stage.id,
                "old_stage_name": old_stage.name,
                "new_stage": target.id,
                "new_stage_name": target.name,
            }),
        );
        info!(
            "Lead {lead_id} moved from stage {} to {}",
            old_stage.id, target.id
        );

        match (implied, loss_reason) {
            (Some(LeadStatus::Won), _) => self.apply_won(ctx, &mut tx, Trigger::Stage).await?,
            (Some(LeadStatus::Lost), Some(reason)) => {
                self.apply_lost(ctx, &mut tx, &reason, Trigger::Stage)?
            }
            _ => {}
        }

        self.commit(tx).await
    }

    /// Marks an open lead won or lost by hand.
    pub async fn set_status(
        &self,
        ctx: &HubContext,
        lead_id: Uuid,
        status: LeadStatus,
        options: TransitionOptions,
    ) -> Result<Lead, LeadsError> {
        let _guard = self.lead_locks.lock(lead_id).await;
        let lead = self.load_lead(ctx, lead_id).await?;

        if lead.status.is_terminal() {
            return Err(LeadsError::LeadAlreadyTerminal(lead.status));
        }
        if status == lead.status {
            return Err(LeadsError::NoChange);
        }

        let loss_reason = self
            .loss_reason_for(ctx, status == LeadStatus::Lost, options)
            .await?;

        let mut tx = Transition::begin(lead);
        match status {
            LeadStatus::Won => self.apply_won(ctx, &mut tx, Trigger::Manual).await?,
            LeadStatus::Lost => {
                let reason = loss_reason.ok_or(LeadsError::LossReasonRequired)?;
                self.apply_lost(ctx, &mut tx, &reason, Trigger::Manual)?;
            }
            LeadStatus::Open => return Err(LeadsError::NoChange),
        }

        self.commit(tx).await
    }

    /// Returns a won or lost lead to `open`. A linked customer stays
    /// linked and `converted` is never reset.
    pub async fn reopen(&self, ctx: &HubContext, lead_id: Uuid) -> Result<Lead, LeadsError> {
        let _guard = self.lead_locks.lock(lead_id).await;
        let lead = self.load_lead(ctx, lead_id).await?;

        let previous = lead.status;
        if !transition_allowed(previous, LeadStatus::Open, Trigger::Reopen) {
            return Err(LeadsError::NoChange);
        }

        let mut tx = Transition::begin(lead);
        tx.lead.status = LeadStatus::Open;
        tx.lead.loss_reason_id = None;
        tx.lead.won_date = None;
        tx.lead.lost_date = None;
        tx.record(
            ctx,
            ActivityKind::StatusChange,
            "Lead reopened".to_string(),
            json!({ "new_status": LeadStatus::Open, "previous_status": previous }),
        );
        info!("Lead {lead_id} reopened from {previous}");

        self.commit(tx).await
    }

    /// Validates the loss reason against what the operation will do.
    async fn loss_reason_for(
        &self,
        ctx: &HubContext,
        losing: bool,
        options: TransitionOptions,
    ) -> Result<Option<LossReason>, LeadsError> {
        match (losing, options.loss_reason_id) {
            (true, Some(id)) => Ok(Some(self.loss_reasons.resolve_for_loss(ctx, id).await?)),
            (true, None) => Err(LeadsError::LossReasonRequired),
            (false, Some(_)) => Err(LeadsError::Validation(
                "a loss reason only applies when the lead is lost".to_string(),
            )),
            (false, None) => Ok(None),
        }
    }

    fn apply_lost(
        &self,
        ctx: &HubContext,
        tx: &mut Transition,
        reason: &LossReason,
        trigger: Trigger,
    ) -> Result<(), LeadsError> {
        if !transition_allowed(tx.lead.status, LeadStatus::Lost, trigger) {
            return Err(LeadsError::LeadAlreadyTerminal(tx.lead.status));
        }
        tx.lead.status = LeadStatus::Lost;
        tx.lead.lost_date = Some(tx.now);
        tx.lead.loss_reason_id = Some(reason.id);
        tx.record(
            ctx,
            ActivityKind::StatusChange,
            "Lead marked as lost".to_string(),
            json!({ "new_status": LeadStatus::Lost, "loss_reason": reason.name }),
        );
        info!("Lead {} marked as lost ({})", tx.lead.id, reason.name);
        Ok(())
    }

    async fn apply_won(
        &self,
        ctx: &HubContext,
        tx: &mut Transition,
        trigger: Trigger,
    ) -> Result<(), LeadsError> {
        if !transition_allowed(tx.lead.status, LeadStatus::Won, trigger) {
            return Err(LeadsError::LeadAlreadyTerminal(tx.lead.status));
        }
        tx.lead.status = LeadStatus::Won;
        tx.lead.won_date = Some(tx.now);
        tx.lead.loss_reason_id = None;
        tx.record(
            ctx,
            ActivityKind::StatusChange,
            "Lead marked as won".to_string(),
            json!({ "new_status": LeadStatus::Won }),
        );
        info!("Lead {} marked as won", tx.lead.id);

        let settings = self.settings.get(ctx).await?;
        if tx.lead.customer_ref.is_some()
            || tx.lead.converted
            || !settings.auto_create_customer_on_win
        {
            return Ok(());
        }

        match self.claimed_conversion(tx).await? {
            Ok(customer) => Self::link_customer(ctx, tx, customer),
            Err(e) => {
                // The win stands; `converted` stays false so conversion can be retried.
                warn!("Customer conversion for lead {} failed: {e}", tx.lead.id);
                tx.record(
                    ctx,
                    ActivityKind::Note,
                    format!("Customer conversion failed: {e}"),
                    json!({ "conversion_error": e.to_string() }),
                );
            }
        }
        Ok(())
    }

    /// Converts a lead outside a win. Port errors go back to the caller
    /// and nothing but the released claim is written.
    pub async fn convert(&self, ctx: &HubContext, lead_id: Uuid) -> Result<Lead, LeadsError> {
        let _guard = self.lead_locks.lock(lead_id).await;
        let lead = self.load_lead(ctx, lead_id).await?;
        if lead.customer_ref.is_some() || lead.converted {
            return Err(LeadsError::AlreadyConverted);
        }

        let mut tx = Transition::begin(lead);
        match self.claimed_conversion(&mut tx).await? {
            Ok(customer) => Self::link_customer(ctx, &mut tx, customer),
            Err(e) => {
                if let Some(token) = tx.claim {
                    self.release_claim(lead_id, token).await;
                }
                return Err(e.into());
            }
        }
        self.commit(tx).await
    }

    /// Claims the lead in the store, then calls the port. The claim is
    /// what keeps two writers sharing a store from both converting; a
    /// refused claim fails the operation before the port is reached.
    async fn claimed_conversion(
        &self,
        tx: &mut Transition,
    ) -> Result<Result<CustomerRef, ConversionError>, LeadsError> {
        let timeout = self.config.conversion_timeout();
        let grace = Duration::seconds(CLAIM_GRACE_SECS);
        let expires_at = Utc::now() + Duration::from_std(timeout).unwrap_or(grace) + grace;
        let claim = ConversionClaim::new(expires_at);

        let version = self
            .store
            .claim_conversion(tx.lead.id, tx.expected_version, claim)
            .await
            .map_err(|e| {
                debug!("Conversion claim on lead {} refused: {e}", tx.lead.id);
                LeadsError::from(e)
            })?;
        tx.expected_version = version;
        tx.claim = Some(claim.token);

        let request = ConversionRequest::from_lead(&tx.lead);
        Ok(convert_with_timeout(self.conversion.as_ref(), &request, timeout).await)
    }

    fn link_customer(ctx: &HubContext, tx: &mut Transition, customer: CustomerRef) {
        info!("Lead {} converted to customer {customer}", tx.lead.id);
        let name = tx.lead.customer_display_name().to_string();
        tx.record(
            ctx,
            ActivityKind::Note,
            format!("Lead converted to customer: {name}"),
            json!({ "customer_id": customer }),
        );
        tx.lead.customer_ref = Some(customer);
        tx.lead.converted = true;
    }

    async fn commit(&self, tx: Transition) -> Result<Lead, LeadsError> {
        let lead_id = tx.lead.id;
        let claim = tx.claim;
        match self.store.commit_lead(tx.into_commit()).await {
            Ok(lead) => Ok(lead),
            Err(e) => {
                if let Some(token) = claim {
                    self.release_claim(lead_id, token).await;
                }
                Err(e.into())
            }
        }
    }

    async fn release_claim(&self, lead_id: Uuid, token: Uuid) {
        if let Err(e) = self.store.release_conversion(lead_id, token).await {
            warn!("Could not release conversion claim on lead {lead_id}: {e}");
        }
    }
}
