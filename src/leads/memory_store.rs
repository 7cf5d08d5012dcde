use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{ConversionClaim, LeadCommit, LeadStore, StoreError};
use super::types::{
    Lead, LeadActivity, LeadSettings, LeadStatus, LossReason, Pipeline, PipelineStage,
};

#[derive(Default)]
struct StoreState {
    pipelines: HashMap<Uuid, Pipeline>,
    stages: HashMap<Uuid, PipelineStage>,
    loss_reasons: HashMap<Uuid, LossReason>,
    leads: HashMap<Uuid, Lead>,
    activities: HashMap<Uuid, Vec<LeadActivity>>,
    settings: HashMap<Uuid, LeadSettings>,
    claims: HashMap<Uuid, ConversionClaim>,
}

impl StoreState {
    fn check_lead_refs(&self, lead: &Lead) -> Result<(), StoreError> {
        let pipeline = self
            .pipelines
            .get(&lead.pipeline_id)
            .ok_or_else(|| StoreError::Integrity(format!("pipeline {}", lead.pipeline_id)))?;
        if pipeline.hub_id != lead.hub_id {
            return Err(StoreError::Integrity(format!(
                "pipeline {} is outside hub {}",
                pipeline.id, lead.hub_id
            )));
        }
        match self.stages.get(&lead.stage_id) {
            Some(stage) if stage.pipeline_id == lead.pipeline_id => {}
            _ => {
                return Err(StoreError::Integrity(format!(
                    "stage {} is not part of pipeline {}",
                    lead.stage_id, lead.pipeline_id
                )))
            }
        }
        if let Some(reason_id) = lead.loss_reason_id {
            if !self.loss_reasons.contains_key(&reason_id) {
                return Err(StoreError::Integrity(format!("loss reason {reason_id}")));
            }
        }
        if !lead.loss_reason_consistent() {
            return Err(StoreError::Integrity(format!(
                "lead {} has status {} with loss reason {:?}",
                lead.id, lead.status, lead.loss_reason_id
            )));
        }
        Ok(())
    }

    fn active_claim(&self, lead_id: Uuid) -> Option<&ConversionClaim> {
        let now = Utc::now();
        self.claims.get(&lead_id).filter(|c| c.is_active(now))
    }

    fn push_activity(&mut self, activity: LeadActivity) {
        let list = self.activities.entry(activity.lead_id).or_default();
        let pos = list.partition_point(|a| a.created_at <= activity.created_at);
        list.insert(pos, activity);
    }
}

/// In-process [`LeadStore`]. Every call holds one write lock over the
/// whole state, so each method is atomic.
#[derive(Clone, Default)]
pub struct MemoryLeadStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryLeadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn insert_pipeline(&self, pipeline: Pipeline) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.pipelines.insert(pipeline.id, pipeline);
        Ok(())
    }

    async fn insert_pipeline_with_stages(
        &self,
        pipeline: Pipeline,
        stages: Vec<PipelineStage>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(stray) = stages.iter().find(|s| s.pipeline_id != pipeline.id) {
            return Err(StoreError::Integrity(format!(
                "stage {} is not part of pipeline {}",
                stray.id, pipeline.id
            )));
        }
        if pipeline.is_default
            && state
                .pipelines
                .values()
                .any(|p| p.hub_id == pipeline.hub_id && p.is_default)
        {
            return Err(StoreError::Integrity(format!(
                "hub {} already has a default pipeline",
                pipeline.hub_id
            )));
        }
        for stage in stages {
            state.stages.insert(stage.id, stage);
        }
        state.pipelines.insert(pipeline.id, pipeline);
        Ok(())
    }

    async fn update_pipeline(&self, pipeline: Pipeline) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.pipelines.get_mut(&pipeline.id) {
            Some(existing) => {
                *existing = pipeline;
                Ok(())
            }
            None => Err(StoreError::Missing(format!("pipeline {}", pipeline.id))),
        }
    }

    async fn get_pipeline(&self, id: Uuid) -> Result<Option<Pipeline>, StoreError> {
        Ok(self.state.read().await.pipelines.get(&id).cloned())
    }

    async fn list_pipelines(&self, hub_id: Uuid) -> Result<Vec<Pipeline>, StoreError> {
        let state = self.state.read().await;
        let mut pipelines: Vec<Pipeline> = state
            .pipelines
            .values()
            .filter(|p| p.hub_id == hub_id)
            .cloned()
            .collect();
        pipelines.sort_by(|a, b| {
            b.is_default
                .cmp(&a.is_default)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(pipelines)
    }

    async fn set_default_pipeline(
        &self,
        hub_id: Uuid,
        pipeline_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.pipelines.get(&pipeline_id) {
            Some(p) if p.hub_id == hub_id => {}
            _ => return Err(StoreError::Missing(format!("pipeline {pipeline_id}"))),
        }
        for pipeline in state.pipelines.values_mut().filter(|p| p.hub_id == hub_id) {
            pipeline.is_default = pipeline.id == pipeline_id;
        }
        Ok(())
    }

    async fn delete_pipeline(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.pipelines.contains_key(&id) {
            return Err(StoreError::Missing(format!("pipeline {id}")));
        }
        if state.leads.values().any(|l| l.pipeline_id == id) {
            return Err(StoreError::Referenced(format!("pipeline {id}")));
        }
        state.stages.retain(|_, s| s.pipeline_id != id);
        state.pipelines.remove(&id);
        Ok(())
    }

    async fn insert_stage(&self, stage: PipelineStage) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.pipelines.contains_key(&stage.pipeline_id) {
            return Err(StoreError::Integrity(format!(
                "pipeline {}",
                stage.pipeline_id
            )));
        }
        state.stages.insert(stage.id, stage);
        Ok(())
    }

    async fn update_stage(&self, stage: PipelineStage) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.stages.get_mut(&stage.id) {
            Some(existing) => {
                *existing = stage;
                Ok(())
            }
            None => Err(StoreError::Missing(format!("stage {}", stage.id))),
        }
    }

    async fn get_stage(&self, id: Uuid) -> Result<Option<PipelineStage>, StoreError> {
        Ok(self.state.read().await.stages.get(&id).cloned())
    }

    async fn list_stages(&self, pipeline_id: Uuid) -> Result<Vec<PipelineStage>, StoreError> {
        let state = self.state.read().await;
        let mut stages: Vec<PipelineStage> = state
            .stages
            .values()
            .filter(|s| s.pipeline_id == pipeline_id)
            .cloned()
            .collect();
        stages.sort_by_key(|s| s.order);
        Ok(stages)
    }

    async fn delete_stage(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.stages.contains_key(&id) {
            return Err(StoreError::Missing(format!("stage {id}")));
        }
        if state.leads.values().any(|l| l.stage_id == id) {
            return Err(StoreError::Referenced(format!("stage {id}")));
        }
        state.stages.remove(&id);
        Ok(())
    }

    async fn insert_loss_reason(&self, reason: LossReason) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.loss_reasons.insert(reason.id, reason);
        Ok(())
    }

    async fn update_loss_reason(&self, reason: LossReason) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        match state.loss_reasons.get_mut(&reason.id) {
            Some(existing) => {
                *existing = reason;
                Ok(())
            }
            None => Err(StoreError::Missing(format!("loss reason {}", reason.id))),
        }
    }

    async fn get_loss_reason(&self, id: Uuid) -> Result<Option<LossReason>, StoreError> {
        Ok(self.state.read().await.loss_reasons.get(&id).cloned())
    }

    async fn list_loss_reasons(&self, hub_id: Uuid) -> Result<Vec<LossReason>, StoreError> {
        let state = self.state.read().await;
        let mut reasons: Vec<LossReason> = state
            .loss_reasons
            .values()
            .filter(|r| r.hub_id == hub_id)
            .cloned()
            .collect();
        reasons.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(reasons)
    }

    async fn delete_loss_reason(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.loss_reasons.contains_key(&id) {
            return Err(StoreError::Missing(format!("loss reason {id}")));
        }
        if state.leads.values().any(|l| l.loss_reason_id == Some(id)) {
            return Err(StoreError::Referenced(format!("loss reason {id}")));
        }
        state.loss_reasons.remove(&id);
        Ok(())
    }

    async fn insert_lead(&self, lead: Lead) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.check_lead_refs(&lead)?;
        state.leads.insert(lead.id, lead);
        Ok(())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(self.state.read().await.leads.get(&id).cloned())
    }

    async fn list_leads(
        &self,
        hub_id: Uuid,
        status: Option<LeadStatus>,
    ) -> Result<Vec<Lead>, StoreError> {
        let state = self.state.read().await;
        let mut leads: Vec<Lead> = state
            .leads
            .values()
            .filter(|l| l.hub_id == hub_id)
            .filter(|l| status.map_or(true, |s| l.status == s))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    async fn commit_lead(&self, commit: LeadCommit) -> Result<Lead, StoreError> {
        let mut state = self.state.write().await;
        let LeadCommit {
            mut lead,
            expected_version,
            activities,
            claim,
        } = commit;

        let stored_version = state
            .leads
            .get(&lead.id)
            .map(|l| l.version)
            .ok_or_else(|| StoreError::Missing(format!("lead {}", lead.id)))?;
        if stored_version != expected_version {
            return Err(StoreError::Conflict(format!(
                "lead {} is at version {stored_version}, expected {expected_version}",
                lead.id
            )));
        }
        if let Some(active) = state.active_claim(lead.id) {
            if claim != Some(active.token) {
                return Err(StoreError::Conflict(format!(
                    "lead {} has a customer conversion in progress",
                    lead.id
                )));
            }
        }
        state.check_lead_refs(&lead)?;
        if let Some(stray) = activities.iter().find(|a| a.lead_id != lead.id) {
            return Err(StoreError::Integrity(format!(
                "activity {} belongs to lead {}",
                stray.id, stray.lead_id
            )));
        }

        lead.version = stored_version + 1;
        state.claims.remove(&lead.id);
        state.leads.insert(lead.id, lead.clone());
        for activity in activities {
            state.push_activity(activity);
        }
        Ok(lead)
    }

    async fn delete_lead(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.leads.remove(&id).is_none() {
            return Err(StoreError::Missing(format!("lead {id}")));
        }
        state.activities.remove(&id);
        state.claims.remove(&id);
        Ok(())
    }

    async fn claim_conversion(
        &self,
        lead_id: Uuid,
        expected_version: u64,
        claim: ConversionClaim,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        if state.active_claim(lead_id).is_some() {
            return Err(StoreError::Conflict(format!(
                "lead {lead_id} has a customer conversion in progress"
            )));
        }
        let lead = state
            .leads
            .get_mut(&lead_id)
            .ok_or_else(|| StoreError::Missing(format!("lead {lead_id}")))?;
        if lead.version != expected_version {
            return Err(StoreError::Conflict(format!(
                "lead {lead_id} is at version {}, expected {expected_version}",
                lead.version
            )));
        }
        lead.version += 1;
        let version = lead.version;
        state.claims.insert(lead_id, claim);
        Ok(version)
    }

    async fn release_conversion(&self, lead_id: Uuid, token: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.claims.get(&lead_id).is_some_and(|c| c.token == token) {
            state.claims.remove(&lead_id);
        }
        Ok(())
    }

    async fn append_activity(&self, activity: LeadActivity) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.leads.contains_key(&activity.lead_id) {
            return Err(StoreError::Missing(format!("lead {}", activity.lead_id)));
        }
        state.push_activity(activity);
        Ok(())
    }

    async fn list_activities(
        &self,
        lead_id: Uuid,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LeadActivity>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .activities
            .get(&lead_id)
            .map(|list| list.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_or_insert_settings(
        &self,
        defaults: LeadSettings,
    ) -> Result<LeadSettings, StoreError> {
        let mut state = self.state.write().await;
        Ok(state
            .settings
            .entry(defaults.hub_id)
            .or_insert(defaults)
            .clone())
    }

    async fn put_settings(&self, settings: LeadSettings) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.settings.insert(settings.hub_id, settings);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leads::types::{ActivityKind, LeadPriority, LeadSource};
    use bigdecimal::BigDecimal;
    use chrono::{Duration, Utc};

    fn pipeline(hub_id: Uuid, name: &str) -> Pipeline {
        let now = Utc::now();
        Pipeline {
            id: Uuid::new_v4(),
            hub_id,
            name: name.to_string(),
            description: String::new(),
            is_default: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn stage(pipeline: &Pipeline, order: i32) -> PipelineStage {
        PipelineStage {
            id: Uuid::new_v4(),
            hub_id: pipeline.hub_id,
            pipeline_id: pipeline.id,
            name: format!("Stage {order}"),
            order,
            probability: 10,
            color: "primary".to_string(),
            auto_win: false,
            auto_lost: false,
            created_at: Utc::now(),
        }
    }

    fn lead(stage: &PipelineStage) -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            hub_id: stage.hub_id,
            name: "Ada".to_string(),
            email: None,
            phone: None,
            company: None,
            value: BigDecimal::from(0),
            expected_close_date: None,
            pipeline_id: stage.pipeline_id,
            stage_id: stage.id,
            assigned_to: None,
            customer_ref: None,
            converted: false,
            source: LeadSource::Manual,
            priority: LeadPriority::Medium,
            notes: None,
            status: LeadStatus::Open,
            won_date: None,
            lost_date: None,
            loss_reason_id: None,
            stage_changed_at: now,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    fn activity(lead: &Lead, body: &str, at: chrono::DateTime<Utc>) -> LeadActivity {
        LeadActivity {
            id: Uuid::new_v4(),
            hub_id: lead.hub_id,
            lead_id: lead.id,
            kind: ActivityKind::Note,
            body: body.to_string(),
            metadata: serde_json::json!({}),
            actor_id: None,
            created_at: at,
        }
    }

    #[tokio::test]
    async fn test_set_default_clears_previous() {
        let store = MemoryLeadStore::new();
        let hub = Uuid::new_v4();
        let mut first = pipeline(hub, "B");
        first.is_default = true;
        let second = pipeline(hub, "A");
        let other_hub = {
            let mut p = pipeline(Uuid::new_v4(), "C");
            p.is_default = true;
            p
        };
        store.insert_pipeline(first.clone()).await.unwrap();
        store.insert_pipeline(second.clone()).await.unwrap();
        store.insert_pipeline(other_hub.clone()).await.unwrap();

        store.set_default_pipeline(hub, second.id).await.unwrap();

        let listed = store.list_pipelines(hub).await.unwrap();
        assert_eq!(listed.iter().filter(|p| p.is_default).count(), 1);
        assert_eq!(listed[0].id, second.id);
        let untouched = store.get_pipeline(other_hub.id).await.unwrap().unwrap();
        assert!(untouched.is_default);
    }

    #[tokio::test]
    async fn test_set_default_rejects_foreign_pipeline() {
        let store = MemoryLeadStore::new();
        let foreign = pipeline(Uuid::new_v4(), "X");
        store.insert_pipeline(foreign.clone()).await.unwrap();
        let err = store
            .set_default_pipeline(Uuid::new_v4(), foreign.id)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing(_)));
    }

    #[tokio::test]
    async fn test_commit_checks_version() {
        let store = MemoryLeadStore::new();
        let p = pipeline(Uuid::new_v4(), "P");
        let s = stage(&p, 1);
        store.insert_pipeline(p).await.unwrap();
        store.insert_stage(s.clone()).await.unwrap();
        let l = lead(&s);
        store.insert_lead(l.clone()).await.unwrap();

        let committed = store
            .commit_lead(LeadCommit {
                lead: l.clone(),
                expected_version: 0,
                activities: vec![activity(&l, "first", Utc::now())],
                claim: None,
            })
            .await
            .unwrap();
        assert_eq!(committed.version, 1);

        let stale = store
            .commit_lead(LeadCommit {
                lead: l.clone(),
                expected_version: 0,
                activities: vec![activity(&l, "stale", Utc::now())],
                claim: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(stale, StoreError::Conflict(_)));
        assert_eq!(store.list_activities(l.id, 0, 10).await.unwrap().len(), 1);
    }

    async fn stored_lead(store: &MemoryLeadStore) -> Lead {
        let p = pipeline(Uuid::new_v4(), "P");
        let s = stage(&p, 1);
        store.insert_pipeline(p).await.unwrap();
        store.insert_stage(s.clone()).await.unwrap();
        let l = lead(&s);
        store.insert_lead(l.clone()).await.unwrap();
        l
    }

    #[tokio::test]
    async fn test_conversion_claim_excludes_other_writers() {
        let store = MemoryLeadStore::new();
        let l = stored_lead(&store).await;
        let claim = ConversionClaim::new(Utc::now() + Duration::seconds(30));

        let version = store.claim_conversion(l.id, 0, claim).await.unwrap();
        assert_eq!(version, 1);

        let second = ConversionClaim::new(Utc::now() + Duration::seconds(30));
        assert!(matches!(
            store.claim_conversion(l.id, 1, second).await,
            Err(StoreError::Conflict(_))
        ));
        let outsider = store
            .commit_lead(LeadCommit {
                lead: l.clone(),
                expected_version: 1,
                activities: Vec::new(),
                claim: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(outsider, StoreError::Conflict(_)));

        let mut converted = l.clone();
        converted.converted = true;
        let committed = store
            .commit_lead(LeadCommit {
                lead: converted,
                expected_version: 1,
                activities: Vec::new(),
                claim: Some(claim.token),
            })
            .await
            .unwrap();
        assert_eq!(committed.version, 2);
        assert!(store.claim_conversion(l.id, 2, second).await.is_ok());
    }

    #[tokio::test]
    async fn test_released_or_expired_claims_do_not_block() {
        let store = MemoryLeadStore::new();
        let l = stored_lead(&store).await;

        let claim = ConversionClaim::new(Utc::now() + Duration::seconds(30));
        store.claim_conversion(l.id, 0, claim).await.unwrap();
        store.release_conversion(l.id, Uuid::new_v4()).await.unwrap();
        assert!(store
            .claim_conversion(l.id, 1, ConversionClaim::new(Utc::now() + Duration::seconds(30)))
            .await
            .is_err());
        store.release_conversion(l.id, claim.token).await.unwrap();

        let expired = ConversionClaim::new(Utc::now() - Duration::seconds(1));
        store.claim_conversion(l.id, 1, expired).await.unwrap();
        let committed = store
            .commit_lead(LeadCommit {
                lead: l.clone(),
                expected_version: 2,
                activities: Vec::new(),
                claim: None,
            })
            .await
            .unwrap();
        assert_eq!(committed.version, 3);
    }

    #[tokio::test]
    async fn test_pipeline_with_stages_is_all_or_nothing() {
        let store = MemoryLeadStore::new();
        let hub = Uuid::new_v4();
        let p = pipeline(hub, "P");
        let other = pipeline(hub, "Other");
        let good = stage(&p, 1);
        let stray = stage(&other, 2);

        let err = store
            .insert_pipeline_with_stages(p.clone(), vec![good.clone(), stray])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
        assert!(store.list_pipelines(hub).await.unwrap().is_empty());
        assert!(store.get_stage(good.id).await.unwrap().is_none());

        store
            .insert_pipeline_with_stages(p.clone(), vec![good])
            .await
            .unwrap();
        assert_eq!(store.list_stages(p.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commit_rejects_inconsistent_loss_reason() {
        let store = MemoryLeadStore::new();
        let p = pipeline(Uuid::new_v4(), "P");
        let s = stage(&p, 1);
        store.insert_pipeline(p).await.unwrap();
        store.insert_stage(s.clone()).await.unwrap();
        let l = lead(&s);
        store.insert_lead(l.clone()).await.unwrap();

        let mut lost = l.clone();
        lost.status = LeadStatus::Lost;
        let err = store
            .commit_lead(LeadCommit {
                lead: lost,
                expected_version: 0,
                activities: Vec::new(),
                claim: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
        let stored = store.get_lead(l.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LeadStatus::Open);
    }

    #[tokio::test]
    async fn test_insert_lead_requires_stage_of_pipeline() {
        let store = MemoryLeadStore::new();
        let hub = Uuid::new_v4();
        let p1 = pipeline(hub, "P1");
        let p2 = pipeline(hub, "P2");
        let s2 = stage(&p2, 1);
        store.insert_pipeline(p1.clone()).await.unwrap();
        store.insert_pipeline(p2).await.unwrap();
        store.insert_stage(s2.clone()).await.unwrap();

        let mut l = lead(&s2);
        l.pipeline_id = p1.id;
        let err = store.insert_lead(l).await.unwrap_err();
        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_activities_are_ordered_and_paged() {
        let store = MemoryLeadStore::new();
        let p = pipeline(Uuid::new_v4(), "P");
        let s = stage(&p, 1);
        store.insert_pipeline(p).await.unwrap();
        store.insert_stage(s.clone()).await.unwrap();
        let l = lead(&s);
        store.insert_lead(l.clone()).await.unwrap();

        let now = Utc::now();
        store
            .append_activity(activity(&l, "late", now + Duration::seconds(5)))
            .await
            .unwrap();
        store.append_activity(activity(&l, "early-a", now)).await.unwrap();
        store.append_activity(activity(&l, "early-b", now)).await.unwrap();

        let first_page = store.list_activities(l.id, 0, 2).await.unwrap();
        let second_page = store.list_activities(l.id, 2, 2).await.unwrap();
        let bodies: Vec<&str> = first_page
            .iter()
            .chain(second_page.iter())
            .map(|a| a.body.as_str())
            .collect();
        assert_eq!(bodies, vec!["early-a", "early-b", "late"]);
    }

    #[tokio::test]
    async fn test_deletes_respect_references() {
        let store = MemoryLeadStore::new();
        let p = pipeline(Uuid::new_v4(), "P");
        let s = stage(&p, 1);
        let spare = stage(&p, 2);
        store.insert_pipeline(p.clone()).await.unwrap();
        store.insert_stage(s.clone()).await.unwrap();
        store.insert_stage(spare.clone()).await.unwrap();
        let l = lead(&s);
        store.insert_lead(l.clone()).await.unwrap();
        store
            .append_activity(activity(&l, "hello", Utc::now()))
            .await
            .unwrap();

        assert!(matches!(
            store.delete_stage(s.id).await,
            Err(StoreError::Referenced(_))
        ));
        assert!(matches!(
            store.delete_pipeline(p.id).await,
            Err(StoreError::Referenced(_))
        ));
        store.delete_stage(spare.id).await.unwrap();

        store.delete_lead(l.id).await.unwrap();
        assert!(store.list_activities(l.id, 0, 10).await.unwrap().is_empty());

        store.delete_pipeline(p.id).await.unwrap();
        assert!(store.get_stage(s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settings_are_inserted_once() {
        let store = MemoryLeadStore::new();
        let hub = Uuid::new_v4();
        let defaults = LeadSettings {
            hub_id: hub,
            default_pipeline_id: None,
            default_source: LeadSource::Manual,
            auto_create_customer_on_win: false,
            updated_at: Utc::now(),
        };
        let mut changed = defaults.clone();
        changed.auto_create_customer_on_win = true;
        store.put_settings(changed).await.unwrap();

        let read = store.get_or_insert_settings(defaults).await.unwrap();
        assert!(read.auto_create_customer_on_win);
    }
}
