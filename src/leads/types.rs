use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    Open,
    Won,
    Lost,
}

impl LeadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Won => write!(f, "won"),
            Self::Lost => write!(f, "lost"),
        }
    }
}

impl Default for LeadStatus {
    fn default() -> Self {
        Self::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    Manual,
    Website,
    Referral,
    Campaign,
    Social,
    WalkIn,
    Phone,
    Import,
    Other,
}

impl std::fmt::Display for LeadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Website => write!(f, "website"),
            Self::Referral => write!(f, "referral"),
            Self::Campaign => write!(f, "campaign"),
            Self::Social => write!(f, "social"),
            Self::WalkIn => write!(f, "walk_in"),
            Self::Phone => write!(f, "phone"),
            Self::Import => write!(f, "import"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl Default for LeadSource {
    fn default() -> Self {
        Self::Manual
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for LeadPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

impl Default for LeadPriority {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Note,
    Call,
    Email,
    Meeting,
    StageChange,
    StatusChange,
}

impl ActivityKind {
    /// Kinds a user may log by hand; the other two are written only by
    /// the state machine.
    pub fn is_manual(self) -> bool {
        matches!(self, Self::Note | Self::Call | Self::Email | Self::Meeting)
    }
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Note => write!(f, "note"),
            Self::Call => write!(f, "call"),
            Self::Email => write!(f, "email"),
            Self::Meeting => write!(f, "meeting"),
            Self::StageChange => write!(f, "stage_change"),
            Self::StatusChange => write!(f, "status_change"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub name: String,
    pub description: String,
    pub is_default: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub order: i32,
    pub probability: u8,
    pub color: String,
    pub auto_win: bool,
    pub auto_lost: bool,
    pub created_at: DateTime<Utc>,
}

impl PipelineStage {
    /// Status a lead takes on when it lands in this stage.
    pub fn implied_status(&self) -> Option<LeadStatus> {
        match (self.auto_win, self.auto_lost) {
            (true, false) => Some(LeadStatus::Won),
            (false, true) => Some(LeadStatus::Lost),
            _ => None,
        }
    }

    pub fn is_open_stage(&self) -> bool {
        !self.auto_win && !self.auto_lost
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossReason {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// Identifier of a record owned by the customer module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerRef(pub String);

impl std::fmt::Display for CustomerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub value: BigDecimal,
    pub expected_close_date: Option<NaiveDate>,
    pub pipeline_id: Uuid,
    pub stage_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub customer_ref: Option<CustomerRef>,
    pub converted: bool,
    pub source: LeadSource,
    pub priority: LeadPriority,
    pub notes: Option<String>,
    pub status: LeadStatus,
    pub won_date: Option<DateTime<Utc>>,
    pub lost_date: Option<DateTime<Utc>>,
    pub loss_reason_id: Option<Uuid>,
    pub stage_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Lead {
    /// `lost` if and only if a loss reason is recorded.
    pub fn loss_reason_consistent(&self) -> bool {
        (self.status == LeadStatus::Lost) == self.loss_reason_id.is_some()
    }

    /// Name used for the customer record: the company when known.
    pub fn customer_display_name(&self) -> &str {
        self.company
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadActivity {
    pub id: Uuid,
    pub hub_id: Uuid,
    pub lead_id: Uuid,
    pub kind: ActivityKind,
    pub body: String,
    pub metadata: serde_json::Value,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSettings {
    pub hub_id: Uuid,
    pub default_pipeline_id: Option<Uuid>,
    pub default_source: LeadSource,
    pub auto_create_customer_on_win: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePipelineRequest {
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePipelineRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateStageRequest {
    pub name: String,
    pub order: Option<i32>,
    pub probability: u8,
    pub color: Option<String>,
    pub auto_win: bool,
    pub auto_lost: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateStageRequest {
    pub name: Option<String>,
    pub order: Option<i32>,
    pub probability: Option<u8>,
    pub color: Option<String>,
    pub auto_win: Option<bool>,
    pub auto_lost: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLossReasonRequest {
    pub name: String,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLossReasonRequest {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateLeadRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub value: Option<BigDecimal>,
    pub expected_close_date: Option<NaiveDate>,
    pub pipeline_id: Option<Uuid>,
    pub stage_id: Option<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub customer_ref: Option<CustomerRef>,
    pub source: Option<LeadSource>,
    pub priority: Option<LeadPriority>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLeadRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub value: Option<BigDecimal>,
    pub expected_close_date: Option<NaiveDate>,
    pub assigned_to: Option<Uuid>,
    pub source: Option<LeadSource>,
    pub priority: Option<LeadPriority>,
    pub notes: Option<String>,
    /// Unassigns the lead; wins over `assigned_to`.
    #[serde(default)]
    pub clear_assigned_to: bool,
    /// Drops the expected close date; wins over `expected_close_date`.
    #[serde(default)]
    pub clear_expected_close_date: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub default_pipeline_id: Option<Uuid>,
    pub default_source: Option<LeadSource>,
    pub auto_create_customer_on_win: Option<bool>,
}

/// Extra input accepted by `move_stage` and `set_status`.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TransitionOptions {
    pub loss_reason_id: Option<Uuid>,
}

impl TransitionOptions {
    pub fn with_loss_reason(loss_reason_id: Uuid) -> Self {
        Self {
            loss_reason_id: Some(loss_reason_id),
        }
    }
}
