use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ApprovalRequest, Invitation, NewApprovalRequest, NoticeKind, ReviewPatch};

pub mod dynamo;
pub mod memory;

/// InvitationStore trait defining the interface for invitation storage implementations
#[async_trait]
pub trait InvitationStore: Send + Sync + 'static {
    /// Gets an invitation by ID
    async fn get_by_id(&self, id: &str) -> Result<Invitation>;

    /// Gets an invitation by its public slug
    async fn get_by_slug(&self, slug: &str) -> Result<Invitation>;

    /// Gets all invitations owned by a user
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invitation>>;

    /// Gets the invitations for the given ids; unknown ids are skipped
    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Invitation>>;

    /// Saves builder content under a slug. A new slug becomes a draft owned
    /// by `owner_id`; an existing slug must belong to `owner_id`.
    async fn save(&self, slug: &str, content: serde_json::Value, owner_id: &str)
        -> Result<Invitation>;

    /// Updates the status and notification flags of an invitation
    async fn update_review(&self, id: &str, patch: ReviewPatch) -> Result<Invitation>;

    /// Deletes an invitation
    async fn delete(&self, id: &str) -> Result<()>;

    /// Clears a single notification flag. Clearing a flag that is already
    /// clear succeeds.
    async fn mark_notification_read(&self, id: &str, kind: NoticeKind) -> Result<()>;
}

/// ApprovalRequestStore trait defining the interface for approval request storage
///
/// Operations keyed by invitation id act on the most recent request of that
/// invitation.
#[async_trait]
pub trait ApprovalRequestStore: Send + Sync + 'static {
    /// Creates a pending request; fails with `Conflict` if one is already pending
    async fn create(&self, request: NewApprovalRequest) -> Result<ApprovalRequest>;

    /// Removes the pending request of an invitation
    async fn cancel(&self, invitation_id: &str) -> Result<()>;

    /// Approves the latest request; approving an approved request is a no-op
    async fn approve(&self, invitation_id: &str) -> Result<ApprovalRequest>;

    /// Rejects a pending request or revokes an approved one
    async fn reject(&self, invitation_id: &str, reason: &str) -> Result<ApprovalRequest>;

    /// Gets the most recent request for an invitation, if any
    async fn latest_for_invitation(&self, invitation_id: &str) -> Result<Option<ApprovalRequest>>;

    /// Gets all requests raised by a user
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ApprovalRequest>>;

    /// Pages over all requests, newest first
    async fn list_all(&self, limit: usize, offset: usize) -> Result<Vec<ApprovalRequest>>;
}

/// Sorts requests newest first and cuts out one page.
pub fn page_newest_first(
    mut requests: Vec<ApprovalRequest>,
    limit: usize,
    offset: usize,
) -> Vec<ApprovalRequest> {
    requests.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    requests.into_iter().skip(offset).take(limit).collect()
}
