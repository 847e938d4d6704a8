use serde::{Deserialize, Serialize};

use approval_shared::models::NoticeKind;

use crate::moderation::ModerationPage;
use crate::owner_view::{ActionOutcome, OwnerDashboard};
use crate::signals::UiMessage;

// Request DTOs
#[derive(Deserialize, Debug)]
pub struct RequestApprovalBody {
    pub content: serde_json::Value,
}

#[derive(Deserialize, Debug)]
pub struct ReasonBody {
    pub reason: String,
}

/// The notice the owner was shown, echoed back on acknowledge
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeBody {
    pub invitation_id: String,
    pub kind: NoticeKind,
}

#[derive(Deserialize, Debug, Default)]
pub struct DeleteQuery {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Deserialize, Debug, Default)]
pub struct PageQuery {
    #[serde(default)]
    pub page: usize,
}

// Response DTOs
#[derive(Serialize, Debug)]
pub struct DashboardResponse {
    #[serde(flatten)]
    pub dashboard: OwnerDashboard,
    pub messages: Vec<UiMessage>,
}

#[derive(Serialize, Debug)]
pub struct OwnerActionResponse {
    #[serde(flatten)]
    pub outcome: ActionOutcome,
    pub dashboard: OwnerDashboard,
    pub messages: Vec<UiMessage>,
}

#[derive(Serialize, Debug)]
pub struct AcknowledgeResponse {
    pub cleared: bool,
}

#[derive(Serialize, Debug)]
pub struct ModerationPageResponse {
    #[serde(flatten)]
    pub page: ModerationPage,
    pub messages: Vec<UiMessage>,
}

#[derive(Serialize, Debug)]
pub struct ModerationActionResponse {
    #[serde(flatten)]
    pub outcome: ActionOutcome,
    pub page: ModerationPage,
    pub messages: Vec<UiMessage>,
}
