use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{Result, StoreError};

pub mod events;

/// Review state of an invitation.
///
/// Stored directly on the invitation instead of the pair of booleans the
/// builder front-end historically exposed, so "approved while requesting
/// approval" cannot be represented.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    #[default]
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Revoked,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Draft => "draft",
            ApprovalStatus::PendingApproval => "pending_approval",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Invitation {
    pub id: String,
    #[serde(rename = "ownerId")]
    pub owner_id: String,
    pub slug: String, // Public lookup key, never changes once assigned
    pub content: serde_json::Value, // Owned by the builder, opaque here
    pub status: ApprovalStatus,
    #[serde(rename = "hasNewRejection", default)]
    pub has_new_rejection: bool,
    #[serde(rename = "hasNewApproval", default)]
    pub has_new_approval: bool,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

impl Invitation {
    /// Builds a fresh draft for a newly assigned slug.
    pub fn new_draft(slug: &str, content: serde_json::Value, owner_id: &str) -> Self {
        let now = now_str();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            slug: slug.to_string(),
            content,
            status: ApprovalStatus::Draft,
            has_new_rejection: false,
            has_new_approval: false,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }

    pub fn is_requesting_approval(&self) -> bool {
        self.status == ApprovalStatus::PendingApproval
    }

    /// Display title taken from the builder content, or the slug when the
    /// content has none.
    pub fn title(&self) -> String {
        self.content
            .get("title")
            .and_then(|t| t.as_str())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.slug.clone())
    }
}

/// Partial update of the status-bearing fields of an invitation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReviewPatch {
    pub status: Option<ApprovalStatus>,
    pub has_new_approval: Option<bool>,
    pub has_new_rejection: Option<bool>,
}

impl ReviewPatch {
    pub fn status(status: ApprovalStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_new_approval(mut self, value: bool) -> Self {
        self.has_new_approval = Some(value);
        self
    }

    pub fn with_new_rejection(mut self, value: bool) -> Self {
        self.has_new_rejection = Some(value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.has_new_approval.is_none() && self.has_new_rejection.is_none()
    }

    pub fn apply(&self, invitation: &mut Invitation) {
        if let Some(status) = self.status {
            invitation.status = status;
        }
        if let Some(flag) = self.has_new_approval {
            invitation.has_new_approval = flag;
        }
        if let Some(flag) = self.has_new_rejection {
            invitation.has_new_rejection = flag;
        }
        invitation.updated_at = now_str();
    }
}

/// Which sticky notification flag a notice was raised from.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Rejection,
    Approval,
}

impl NoticeKind {
    /// Attribute name of the flag in the stored record.
    pub fn flag_attribute(&self) -> &'static str {
        match self {
            NoticeKind::Rejection => "hasNewRejection",
            NoticeKind::Approval => "hasNewApproval",
        }
    }

    pub fn is_raised_on(&self, invitation: &Invitation) -> bool {
        match self {
            NoticeKind::Rejection => invitation.has_new_rejection,
            NoticeKind::Approval => invitation.has_new_approval,
        }
    }

    pub fn clear_on(&self, invitation: &mut Invitation) {
        match self {
            NoticeKind::Rejection => invitation.has_new_rejection = false,
            NoticeKind::Approval => invitation.has_new_approval = false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApprovalRequest {
    pub id: String,
    #[serde(rename = "invitationId")]
    pub invitation_id: String,
    pub slug: String,
    #[serde(rename = "requesterUserId")]
    pub requester_user_id: String,
    #[serde(rename = "requesterName")]
    pub requester_name: String,
    #[serde(rename = "requesterPhone")]
    pub requester_phone: String,
    pub status: RequestStatus,
    #[serde(rename = "isRevoked", default)]
    pub is_revoked: bool, // Only ever set on a request that was approved first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>, // Rich text, present once rejected
    #[serde(rename = "createdAt")]
    pub created_at: String,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
}

impl ApprovalRequest {
    pub fn from_new(new_request: NewApprovalRequest) -> Self {
        let now = now_str();
        Self {
            id: Uuid::new_v4().to_string(),
            invitation_id: new_request.invitation_id,
            slug: new_request.slug,
            requester_user_id: new_request.requester_user_id,
            requester_name: new_request.requester_name,
            requester_phone: new_request.requester_phone,
            status: RequestStatus::Pending,
            is_revoked: false,
            reason: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Moves the request to `approved`. Returns false when it already was,
    /// which keeps repeated approvals harmless.
    pub fn approve(&mut self) -> Result<bool> {
        match self.status {
            RequestStatus::Pending => {
                self.status = RequestStatus::Approved;
                self.updated_at = now_str();
                Ok(true)
            }
            RequestStatus::Approved => Ok(false),
            RequestStatus::Rejected => Err(StoreError::Conflict(format!(
                "Approval request {} was already rejected",
                self.id
            ))),
        }
    }

    /// Rejects a pending request, or revokes an approved one.
    pub fn reject(&mut self, reason: &str) -> Result<()> {
        match self.status {
            RequestStatus::Pending => self.is_revoked = false,
            RequestStatus::Approved => self.is_revoked = true,
            RequestStatus::Rejected => {
                return Err(StoreError::Conflict(format!(
                    "Approval request {} was already rejected",
                    self.id
                )))
            }
        }
        self.status = RequestStatus::Rejected;
        self.reason = Some(reason.to_string());
        self.updated_at = now_str();
        Ok(())
    }
}

/// Payload accepted by `ApprovalRequestStore::create`.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct NewApprovalRequest {
    #[serde(rename = "invitationId")]
    pub invitation_id: String,
    pub slug: String,
    #[serde(rename = "requesterUserId")]
    pub requester_user_id: String,
    #[serde(rename = "requesterName")]
    pub requester_name: String,
    #[serde(rename = "requesterPhone")]
    pub requester_phone: String,
}

/// Most recent request of a set, by creation time.
pub fn latest_request<'a, I>(requests: I) -> Option<&'a ApprovalRequest>
where
    I: IntoIterator<Item = &'a ApprovalRequest>,
{
    requests
        .into_iter()
        .max_by(|a, b| a.created_at.cmp(&b.created_at))
}

// Response DTOs for general use across services
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

// Helper function to get current timestamp as string
pub fn now_str() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}
