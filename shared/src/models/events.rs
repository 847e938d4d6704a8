use serde::{Deserialize, Serialize};

use super::now_str;

pub const EVENT_APPROVAL_REQUESTED: &str = "approval_requested";
pub const EVENT_APPROVAL_CANCELLED: &str = "approval_cancelled";
pub const EVENT_INVITATION_APPROVED: &str = "invitation_approved";
pub const EVENT_INVITATION_REJECTED: &str = "invitation_rejected";
pub const EVENT_INVITATION_REVOKED: &str = "invitation_revoked";
pub const EVENT_REVERTED_TO_DRAFT: &str = "reverted_to_draft";
pub const EVENT_INVITATION_DELETED: &str = "invitation_deleted";

/// Event emitted after an approval transition has been written
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ApprovalEvent {
    pub event_type: String,
    pub invitation_id: String,
    pub slug: String,
    pub actor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timestamp: String,
}

impl ApprovalEvent {
    pub fn new(event_type: &str, invitation_id: &str, slug: &str, actor_id: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            invitation_id: invitation_id.to_string(),
            slug: slug.to_string(),
            actor_id: actor_id.to_string(),
            reason: None,
            timestamp: now_str(),
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}
