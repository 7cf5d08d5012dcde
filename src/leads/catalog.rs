use std::sync::Arc;

use chrono::Utc;
use log::{debug, info};
use uuid::Uuid;

use super::error::LeadsError;
use super::store::LeadStore;
use super::types::{
    CreatePipelineRequest, CreateStageRequest, Pipeline, PipelineStage, UpdatePipelineRequest,
    UpdateStageRequest,
};
use crate::core::{HubContext, KeyedLocks};

struct StageTemplate {
    name: &'static str,
    order: i32,
    probability: u8,
    color: &'static str,
    auto_win: bool,
    auto_lost: bool,
}

const fn template(name: &'static str, order: i32, probability: u8, color: &'static str) -> StageTemplate {
    StageTemplate {
        name,
        order,
        probability,
        color,
        auto_win: false,
        auto_lost: false,
    }
}

const DEFAULT_PIPELINE_NAME: &str = "Sales Pipeline";

const DEFAULT_STAGES: [StageTemplate; 7] = [
    template("New", 10, 10, "info"),
    template("Contacted", 20, 20, "primary"),
    template("Qualified", 30, 40, "primary"),
    template("Proposal", 40, 60, "warning"),
    template("Negotiation", 50, 80, "warning"),
    StageTemplate {
        auto_win: true,
        ..template("Won", 60, 100, "success")
    },
    StageTemplate {
        auto_lost: true,
        ..template("Lost", 70, 0, "danger")
    },
];

/// Pipelines and their stages for every hub.
///
/// Writes take a per-hub lock so the one-default-pipeline and
/// one-auto-stage-per-flag rules hold under concurrent admin edits.
pub struct PipelineCatalog {
    store: Arc<dyn LeadStore>,
    hub_locks: KeyedLocks<Uuid>,
}

impl PipelineCatalog {
    pub fn new(store: Arc<dyn LeadStore>) -> Self {
        Self {
            store,
            hub_locks: KeyedLocks::new(),
        }
    }

    pub async fn get_pipeline(&self, ctx: &HubContext, id: Uuid) -> Result<Pipeline, LeadsError> {
        let pipeline = self
            .store
            .get_pipeline(id)
            .await?
            .ok_or_else(|| LeadsError::NotFound(format!("pipeline {id}")))?;
        ctx.ensure_same_hub(pipeline.hub_id)?;
        Ok(pipeline)
    }

    /// Default pipeline first, then by name.
    pub async fn list_pipelines(&self, ctx: &HubContext) -> Result<Vec<Pipeline>, LeadsError> {
        Ok(self.store.list_pipelines(ctx.hub_id).await?)
    }

    /// The hub's default pipeline, or its first pipeline when none is
    /// flagged.
    pub async fn get_default_pipeline(&self, ctx: &HubContext) -> Result<Pipeline, LeadsError> {
        let pipelines = self.store.list_pipelines(ctx.hub_id).await?;
        Self::pick_default(pipelines)
    }

    fn pick_default(pipelines: Vec<Pipeline>) -> Result<Pipeline, LeadsError> {
        let fallback = pipelines.first().cloned();
        pipelines
            .into_iter()
            .find(|p| p.is_default)
            .or(fallback)
            .ok_or(LeadsError::NotConfigured)
    }

    /// Creates the standard sales pipeline when the hub has none.
    pub async fn ensure_default_pipeline(&self, ctx: &HubContext) -> Result<Pipeline, LeadsError> {
        let _guard = self.hub_locks.lock(ctx.hub_id).await;

        let existing = self.store.list_pipelines(ctx.hub_id).await?;
        if !existing.is_empty() {
            return Self::pick_default(existing);
        }

        let mut pipeline = new_pipeline(ctx, DEFAULT_PIPELINE_NAME, "Default sales pipeline");
        pipeline.is_default = true;
        let stages = DEFAULT_STAGES
            .iter()
            .map(|tpl| PipelineStage {
                id: Uuid::new_v4(),
                hub_id: ctx.hub_id,
                pipeline_id: pipeline.id,
                name: tpl.name.to_string(),
                order: tpl.order,
                probability: tpl.probability,
                color: tpl.color.to_string(),
                auto_win: tpl.auto_win,
                auto_lost: tpl.auto_lost,
                created_at: pipeline.created_at,
            })
            .collect();
        self.store
            .insert_pipeline_with_stages(pipeline.clone(), stages)
            .await?;

        info!(
            "Created default pipeline {} for hub {}",
            pipeline.id, ctx.hub_id
        );
        Ok(pipeline)
    }

    pub async fn create_pipeline(
        &self,
        ctx: &HubContext,
        request: CreatePipelineRequest,
    ) -> Result<Pipeline, LeadsError> {
        let name = required_name(&request.name, "pipeline")?;
        let _guard = self.hub_locks.lock(ctx.hub_id).await;

        let is_first = self.store.list_pipelines(ctx.hub_id).await?.is_empty();
        let mut pipeline = self
            .insert_pipeline(ctx, &name, request.description.as_deref().unwrap_or_default())
            .await?;
        if request.is_default || is_first {
            self.store
                .set_default_pipeline(ctx.hub_id, pipeline.id)
                .await?;
            pipeline.is_default = true;
        }

        info!("Created pipeline {} ({name}) for hub {}", pipeline.id, ctx.hub_id);
        Ok(pipeline)
    }

    async fn insert_pipeline(
        &self,
        ctx: &HubContext,
        name: &str,
        description: &str,
    ) -> Result<Pipeline, LeadsError> {
        let pipeline = new_pipeline(ctx, name, description);
        self.store.insert_pipeline(pipeline.clone()).await?;
        Ok(pipeline)
    }

    /// Makes `pipeline_id` the hub's only default pipeline.
    pub async fn set_default(&self, ctx: &HubContext, pipeline_id: Uuid) -> Result<Pipeline, LeadsError> {
        let mut pipeline = self.get_pipeline(ctx, pipeline_id).await?;
        let _guard = self.hub_locks.lock(ctx.hub_id).await;

        self.store
            .set_default_pipeline(ctx.hub_id, pipeline_id)
            .await?;
        pipeline.is_default = true;

        info!("Pipeline {pipeline_id} is now the default for hub {}", ctx.hub_id);
        Ok(pipeline)
    }

    pub async fn update_pipeline(
        &self,
        ctx: &HubContext,
        pipeline_id: Uuid,
        request: UpdatePipelineRequest,
    ) -> Result<Pipeline, LeadsError> {
        let _guard = self.hub_locks.lock(ctx.hub_id).await;
        let mut pipeline = self.get_pipeline(ctx, pipeline_id).await?;

        if let Some(name) = request.name {
            pipeline.name = required_name(&name, "pipeline")?;
        }
        if let Some(description) = request.description {
            pipeline.description = description;
        }
        if let Some(is_active) = request.is_active {
            pipeline.is_active = is_active;
        }
        pipeline.updated_at = Utc::now();

        self.store.update_pipeline(pipeline.clone()).await?;
        Ok(pipeline)
    }

    /// Deletes a pipeline with its stages. Refused while leads use it;
    /// deleting the default promotes the next pipeline.
    pub async fn delete_pipeline(&self, ctx: &HubContext, pipeline_id: Uuid) -> Result<(), LeadsError> {
        let _guard = self.hub_locks.lock(ctx.hub_id).await;
        let pipeline = self.get_pipeline(ctx, pipeline_id).await?;

        self.store.delete_pipeline(pipeline_id).await?;
        info!("Deleted pipeline {pipeline_id} from hub {}", ctx.hub_id);

        if pipeline.is_default {
            if let Some(next) = self.store.list_pipelines(ctx.hub_id).await?.first() {
                self.store.set_default_pipeline(ctx.hub_id, next.id).await?;
                info!("Pipeline {} promoted to default for hub {}", next.id, ctx.hub_id);
            }
        }
        Ok(())
    }

    pub async fn list_stages(
        &self,
        ctx: &HubContext,
        pipeline_id: Uuid,
    ) -> Result<Vec<PipelineStage>, LeadsError> {
        self.get_pipeline(ctx, pipeline_id).await?;
        Ok(self.store.list_stages(pipeline_id).await?)
    }

    pub async fn get_stage(&self, ctx: &HubContext, stage_id: Uuid) -> Result<PipelineStage, LeadsError> {
        let stage = self
            .store
            .get_stage(stage_id)
            .await?
            .ok_or_else(|| LeadsError::NotFound(format!("stage {stage_id}")))?;
        ctx.ensure_same_hub(stage.hub_id)?;
        Ok(stage)
    }

    /// Loads `stage_id` and checks it belongs to `pipeline_id`.
    pub async fn resolve_stage(
        &self,
        ctx: &HubContext,
        pipeline_id: Uuid,
        stage_id: Uuid,
    ) -> Result<PipelineStage, LeadsError> {
        let stage = self.get_stage(ctx, stage_id).await?;
        if stage.pipeline_id != pipeline_id {
            debug!("Stage {stage_id} rejected: not part of pipeline {pipeline_id}");
            return Err(LeadsError::StageNotInPipeline {
                stage_id,
                pipeline_id,
            });
        }
        Ok(stage)
    }

    /// One past the highest stage order in the pipeline (1 when empty).
    pub async fn next_order_index(&self, ctx: &HubContext, pipeline_id: Uuid) -> Result<i32, LeadsError> {
        let stages = self.list_stages(ctx, pipeline_id).await?;
        next_order(&stages)
    }

    /// Lowest-order stage without an auto flag; where new leads start.
    pub async fn first_open_stage(
        &self,
        ctx: &HubContext,
        pipeline_id: Uuid,
    ) -> Result<PipelineStage, LeadsError> {
        self.list_stages(ctx, pipeline_id)
            .await?
            .into_iter()
            .find(PipelineStage::is_open_stage)
            .ok_or_else(|| LeadsError::NotFound(format!("open stage in pipeline {pipeline_id}")))
    }

    pub async fn add_stage(
        &self,
        ctx: &HubContext,
        pipeline_id: Uuid,
        request: CreateStageRequest,
    ) -> Result<PipelineStage, LeadsError> {
        let _guard = self.hub_locks.lock(ctx.hub_id).await;
        let siblings = self.list_stages(ctx, pipeline_id).await?;
        let order = match request.order {
            Some(order) => order,
            None => next_order(&siblings)?,
        };

        let stage = PipelineStage {
            id: Uuid::new_v4(),
            hub_id: ctx.hub_id,
            pipeline_id,
            name: required_name(&request.name, "stage")?,
            order,
            probability: request.probability,
            color: request.color.unwrap_or_else(|| "primary".to_string()),
            auto_win: request.auto_win,
            auto_lost: request.auto_lost,
            created_at: Utc::now(),
        };
        validate_stage(&stage, &siblings)?;

        self.store.insert_stage(stage.clone()).await?;
        info!(
            "Added stage {} ({}) to pipeline {pipeline_id}",
            stage.id, stage.name
        );
        Ok(stage)
    }

    pub async fn update_stage(
        &self,
        ctx: &HubContext,
        stage_id: Uuid,
        request: UpdateStageRequest,
    ) -> Result<PipelineStage, LeadsError> {
        let _guard = self.hub_locks.lock(ctx.hub_id).await;
        let mut stage = self.get_stage(ctx, stage_id).await?;

        if let Some(name) = request.name {
            stage.name = required_name(&name, "stage")?;
        }
        if let Some(order) = request.order {
            stage.order = order;
        }
        if let Some(probability) = request.probability {
            stage.probability = probability;
        }
        if let Some(color) = request.color {
            stage.color = color;
        }
        if let Some(auto_win) = request.auto_win {
            stage.auto_win = auto_win;
        }
        if let Some(auto_lost) = request.auto_lost {
            stage.auto_lost = auto_lost;
        }

        let siblings: Vec<PipelineStage> = self
            .store
            .list_stages(stage.pipeline_id)
            .await?
            .into_iter()
            .filter(|s| s.id != stage_id)
            .collect();
        validate_stage(&stage, &siblings)?;

        self.store.update_stage(stage.clone()).await?;
        Ok(stage)
    }

    /// Refused while any lead sits in the stage.
    pub async fn delete_stage(&self, ctx: &HubContext, stage_id: Uuid) -> Result<(), LeadsError> {
        let _guard = self.hub_locks.lock(ctx.hub_id).await;
        self.get_stage(ctx, stage_id).await?;
        self.store.delete_stage(stage_id).await?;
        info!("Deleted stage {stage_id} from hub {}", ctx.hub_id);
        Ok(())
    }
}

fn new_pipeline(ctx: &HubContext, name: &str, description: &str) -> Pipeline {
    let now = Utc::now();
    Pipeline {
        id: Uuid::new_v4(),
        hub_id: ctx.hub_id,
        name: name.to_string(),
        description: description.to_string(),
        is_default: false,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

fn next_order(stages: &[PipelineStage]) -> Result<i32, LeadsError> {
    match stages.iter().map(|s| s.order).max() {
        None => Ok(1),
        Some(max) => max.checked_add(1).ok_or_else(|| {
            LeadsError::Validation(format!(
                "no stage order left after {max}; pass an explicit order"
            ))
        }),
    }
}

fn required_name(name: &str, what: &str) -> Result<String, LeadsError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(LeadsError::Validation(format!("{what} name is required")));
    }
    Ok(trimmed.to_string())
}

fn validate_stage(stage: &PipelineStage, siblings: &[PipelineStage]) -> Result<(), LeadsError> {
    if stage.probability > 100 {
        return Err(LeadsError::Validation(
            "probability must be between 0 and 100".to_string(),
        ));
    }
    if stage.auto_win && stage.auto_lost {
        return Err(LeadsError::Validation(
            "a stage cannot be both auto-win and auto-lost".to_string(),
        ));
    }
    if siblings.iter().any(|s| s.order == stage.order) {
        return Err(LeadsError::Validation(format!(
            "order {} is already used in this pipeline",
            stage.order
        )));
    }
    if stage.auto_win && siblings.iter().any(|s| s.auto_win) {
        return Err(LeadsError::Validation(
            "pipeline already has an auto-win stage".to_string(),
        ));
    }
    if stage.auto_lost && siblings.iter().any(|s| s.auto_lost) {
        return Err(LeadsError::Validation(
            "pipeline already has an auto-lost stage".to_string(),
        ));
    }
    Ok(())
}
