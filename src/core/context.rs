use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::leads::LeadsError;

/// Tenant scope every leads operation runs under.
///
/// The UI/API layer builds one of these per request after its own
/// permission checks; the core never accepts a bare hub id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubContext {
    pub hub_id: Uuid,
    pub actor_id: Option<Uuid>,
}

impl HubContext {
    pub fn new(hub_id: Uuid) -> Self {
        Self {
            hub_id,
            actor_id: None,
        }
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn ensure_same_hub(&self, hub_id: Uuid) -> Result<(), LeadsError> {
        if self.hub_id == hub_id {
            Ok(())
        } else {
            Err(LeadsError::CrossHubViolation)
        }
    }
}
