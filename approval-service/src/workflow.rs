use std::sync::Arc;

use log::{info, warn};

use approval_shared::auth::AuthContext;
use approval_shared::error::StoreError;
use approval_shared::models::events::{
    ApprovalEvent, EVENT_APPROVAL_CANCELLED, EVENT_APPROVAL_REQUESTED, EVENT_INVITATION_APPROVED,
    EVENT_INVITATION_DELETED, EVENT_INVITATION_REJECTED, EVENT_INVITATION_REVOKED,
    EVENT_REVERTED_TO_DRAFT,
};
use approval_shared::models::{
    ApprovalRequest, ApprovalStatus, Invitation, NewApprovalRequest, RequestStatus, ReviewPatch,
};
use approval_shared::store::{ApprovalRequestStore, InvitationStore};

use crate::error::{Result, WorkflowError};
use crate::events::{publish_or_log, EventPublisher};
use crate::sanitize::validate_reason;
use crate::session::EditingSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    RequestApproval,
    Cancel,
    Approve,
    Reject,
    Revoke,
    RevertToDraft,
}

impl Transition {
    /// The transition table: target status, or None when illegal from `from`.
    pub fn target(self, from: ApprovalStatus) -> Option<ApprovalStatus> {
        use ApprovalStatus::*;
        match (self, from) {
            (Transition::RequestApproval, Draft) => Some(PendingApproval),
            (Transition::Cancel, PendingApproval) => Some(Draft),
            (Transition::Approve, PendingApproval) => Some(Approved),
            (Transition::Reject, PendingApproval) => Some(Rejected),
            (Transition::Revoke, Approved) => Some(Revoked),
            (Transition::RevertToDraft, Rejected | Revoked) => Some(Draft),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Transition::RequestApproval => "request approval",
            Transition::Cancel => "cancel",
            Transition::Approve => "approve",
            Transition::Reject => "reject",
            Transition::Revoke => "revoke",
            Transition::RevertToDraft => "revert to draft",
        }
    }
}

/// Deletion is the one exit not in the table: allowed from anywhere but pending.
pub fn can_delete(status: ApprovalStatus) -> bool {
    status != ApprovalStatus::PendingApproval
}

pub const DELETE_WHILE_PENDING: &str =
    "This invitation is waiting for approval. Cancel the request before deleting it.";

fn ensure_transition(invitation: &Invitation, transition: Transition) -> Result<ApprovalStatus> {
    transition.target(invitation.status).ok_or_else(|| {
        WorkflowError::InvalidTransition(format!(
            "Cannot {} invitation {} while it is {}",
            transition.name(),
            invitation.id,
            invitation.status
        ))
    })
}

fn ensure_owner(actor: &AuthContext, invitation: &Invitation) -> Result<()> {
    if invitation.owner_id != actor.user_id {
        return Err(WorkflowError::Forbidden(format!(
            "Invitation {} is not owned by user {}",
            invitation.id, actor.user_id
        )));
    }
    Ok(())
}

fn ensure_admin(actor: &AuthContext, transition: Transition) -> Result<()> {
    if !actor.is_admin {
        return Err(WorkflowError::Forbidden(format!(
            "Only moderators can {} invitations",
            transition.name()
        )));
    }
    Ok(())
}

/// Sole writer of status-bearing fields.
///
/// Multi-step transitions write in a fixed order and stop at the first
/// failing step; nothing is rolled back. Callers re-fetch afterwards.
#[derive(Clone)]
pub struct WorkflowEngine {
    invitations: Arc<dyn InvitationStore>,
    requests: Arc<dyn ApprovalRequestStore>,
    events: Arc<dyn EventPublisher>,
}

impl WorkflowEngine {
    pub fn new(
        invitations: Arc<dyn InvitationStore>,
        requests: Arc<dyn ApprovalRequestStore>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            invitations,
            requests,
            events,
        }
    }

    pub fn invitations(&self) -> &Arc<dyn InvitationStore> {
        &self.invitations
    }

    pub fn requests(&self) -> &Arc<dyn ApprovalRequestStore> {
        &self.requests
    }

    async fn publish(&self, event: ApprovalEvent) {
        publish_or_log(self.events.as_ref(), event).await;
    }

    /// Draft -> PendingApproval. Saves the session content, opens a request,
    /// then flips the invitation status.
    pub async fn request_approval(
        &self,
        actor: &AuthContext,
        session: &EditingSession,
    ) -> Result<Invitation> {
        let (name, phone) = actor.profile.contact().ok_or_else(|| {
            WorkflowError::ProfileIncomplete(
                "Add your name and phone number to your profile before requesting approval".into(),
            )
        })?;

        match self.invitations.get_by_slug(session.slug()).await {
            Ok(existing) => {
                ensure_owner(actor, &existing)?;
                ensure_transition(&existing, Transition::RequestApproval)?;
            }
            // First save of this slug creates the draft
            Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        let saved = self
            .invitations
            .save(session.slug(), session.content().clone(), &actor.user_id)
            .await?;

        let new_request = NewApprovalRequest {
            invitation_id: saved.id.clone(),
            slug: saved.slug.clone(),
            requester_user_id: actor.user_id.clone(),
            requester_name: name.to_string(),
            requester_phone: phone.to_string(),
        };
        let request = match self.requests.create(new_request).await {
            Ok(request) => request,
            Err(StoreError::Conflict(msg)) => self.adopt_pending_request(&saved.id, msg).await?,
            Err(err) => return Err(err.into()),
        };

        let updated = self
            .invitations
            .update_review(&saved.id, ReviewPatch::status(ApprovalStatus::PendingApproval))
            .await?;

        info!(
            "Approval requested for invitation {} (request {}) by {}",
            updated.id, request.id, actor.user_id
        );
        self.publish(ApprovalEvent::new(
            EVENT_APPROVAL_REQUESTED,
            &updated.id,
            &updated.slug,
            &actor.user_id,
        ))
        .await;
        Ok(updated)
    }

    // A draft with a pending request is what an earlier attempt leaves behind
    // when it failed after creating the request; finish that attempt.
    async fn adopt_pending_request(
        &self,
        invitation_id: &str,
        conflict: String,
    ) -> Result<ApprovalRequest> {
        match self.requests.latest_for_invitation(invitation_id).await? {
            Some(request) if request.status == RequestStatus::Pending => {
                warn!(
                    "Reusing pending request {} left by an earlier attempt on {}",
                    request.id, invitation_id
                );
                Ok(request)
            }
            _ => Err(WorkflowError::Conflict(conflict)),
        }
    }

    /// PendingApproval -> Draft
    pub async fn cancel(&self, actor: &AuthContext, invitation_id: &str) -> Result<Invitation> {
        let invitation = self.invitations.get_by_id(invitation_id).await?;
        ensure_owner(actor, &invitation)?;
        let target = ensure_transition(&invitation, Transition::Cancel)?;

        match self.requests.cancel(invitation_id).await {
            Ok(()) => {}
            // Already gone, e.g. an earlier cancel stopped after this step
            Err(StoreError::NotFound(msg)) => warn!("{}; clearing status only", msg),
            Err(err) => return Err(err.into()),
        }

        let updated = self
            .invitations
            .update_review(invitation_id, ReviewPatch::status(target))
            .await?;

        info!("Approval request cancelled for {} by {}", invitation_id, actor.user_id);
        self.publish(ApprovalEvent::new(
            EVENT_APPROVAL_CANCELLED,
            &updated.id,
            &updated.slug,
            &actor.user_id,
        ))
        .await;
        Ok(updated)
    }

    /// PendingApproval -> Approved. Approving an approved invitation changes nothing.
    pub async fn approve(&self, actor: &AuthContext, invitation_id: &str) -> Result<Invitation> {
        ensure_admin(actor, Transition::Approve)?;

        let invitation = self.invitations.get_by_id(invitation_id).await?;
        if invitation.is_approved() {
            info!("Invitation {} is already approved", invitation_id);
            return Ok(invitation);
        }
        let target = ensure_transition(&invitation, Transition::Approve)?;

        self.requests.approve(invitation_id).await?;
        let updated = self
            .invitations
            .update_review(
                invitation_id,
                ReviewPatch::status(target)
                    .with_new_approval(true)
                    .with_new_rejection(false),
            )
            .await?;

        info!("Invitation {} approved by {}", invitation_id, actor.user_id);
        self.publish(ApprovalEvent::new(
            EVENT_INVITATION_APPROVED,
            &updated.id,
            &updated.slug,
            &actor.user_id,
        ))
        .await;
        Ok(updated)
    }

    /// PendingApproval -> Rejected
    pub async fn reject(
        &self,
        actor: &AuthContext,
        invitation_id: &str,
        reason: &str,
    ) -> Result<Invitation> {
        self.reject_or_revoke(actor, invitation_id, reason, Transition::Reject)
            .await
    }

    /// Approved -> Revoked
    pub async fn revoke(
        &self,
        actor: &AuthContext,
        invitation_id: &str,
        reason: &str,
    ) -> Result<Invitation> {
        self.reject_or_revoke(actor, invitation_id, reason, Transition::Revoke)
            .await
    }

    async fn reject_or_revoke(
        &self,
        actor: &AuthContext,
        invitation_id: &str,
        reason: &str,
        transition: Transition,
    ) -> Result<Invitation> {
        ensure_admin(actor, transition)?;
        let reason = validate_reason(reason)?;

        let invitation = self.invitations.get_by_id(invitation_id).await?;
        let target = ensure_transition(&invitation, transition)?;
        let revoking = transition == Transition::Revoke;

        match self.requests.reject(invitation_id, reason).await {
            Ok(request) => {
                if request.is_revoked != revoking {
                    warn!(
                        "Request {} for {} stored is_revoked={} on {}",
                        request.id,
                        invitation_id,
                        request.is_revoked,
                        transition.name()
                    );
                }
            }
            Err(StoreError::Conflict(msg)) => {
                self.ensure_already_rejected(invitation_id, revoking, msg)
                    .await?
            }
            Err(err) => return Err(err.into()),
        }

        let updated = self
            .invitations
            .update_review(
                invitation_id,
                ReviewPatch::status(target)
                    .with_new_rejection(true)
                    .with_new_approval(false),
            )
            .await?;

        info!(
            "Invitation {} {} by {}",
            invitation_id,
            if revoking { "revoked" } else { "rejected" },
            actor.user_id
        );
        let event_type = if revoking {
            EVENT_INVITATION_REVOKED
        } else {
            EVENT_INVITATION_REJECTED
        };
        self.publish(
            ApprovalEvent::new(event_type, &updated.id, &updated.slug, &actor.user_id)
                .with_reason(reason),
        )
        .await;
        Ok(updated)
    }

    // The request row may already carry the rejection from an earlier attempt
    // that failed before updating the invitation.
    async fn ensure_already_rejected(
        &self,
        invitation_id: &str,
        revoking: bool,
        conflict: String,
    ) -> Result<()> {
        match self.requests.latest_for_invitation(invitation_id).await? {
            Some(request)
                if request.status == RequestStatus::Rejected && request.is_revoked == revoking =>
            {
                warn!(
                    "Request {} was already rejected, finishing the transition",
                    request.id
                );
                Ok(())
            }
            _ => Err(WorkflowError::Conflict(conflict)),
        }
    }

    /// Rejected|Revoked -> Draft. The old request stays as history.
    pub async fn revert_to_draft(
        &self,
        actor: &AuthContext,
        invitation_id: &str,
    ) -> Result<Invitation> {
        let invitation = self.invitations.get_by_id(invitation_id).await?;
        ensure_owner(actor, &invitation)?;
        let target = ensure_transition(&invitation, Transition::RevertToDraft)?;

        let updated = self
            .invitations
            .update_review(invitation_id, ReviewPatch::status(target))
            .await?;

        info!("Invitation {} reverted to draft by {}", invitation_id, actor.user_id);
        self.publish(ApprovalEvent::new(
            EVENT_REVERTED_TO_DRAFT,
            &updated.id,
            &updated.slug,
            &actor.user_id,
        ))
        .await;
        Ok(updated)
    }

    /// Removes an invitation. Warning the owner about shared links on an
    /// approved invitation is up to the caller.
    pub async fn delete(&self, actor: &AuthContext, invitation_id: &str) -> Result<()> {
        let invitation = self.invitations.get_by_id(invitation_id).await?;
        ensure_owner(actor, &invitation)?;
        if !can_delete(invitation.status) {
            return Err(WorkflowError::InvalidTransition(DELETE_WHILE_PENDING.into()));
        }

        self.invitations.delete(invitation_id).await?;

        info!("Invitation {} deleted by {}", invitation_id, actor.user_id);
        self.publish(ApprovalEvent::new(
            EVENT_INVITATION_DELETED,
            &invitation.id,
            &invitation.slug,
            &actor.user_id,
        ))
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use ApprovalStatus::*;

        assert_eq!(Transition::RequestApproval.target(Draft), Some(PendingApproval));
        assert_eq!(Transition::RequestApproval.target(Rejected), None);
        assert_eq!(Transition::Cancel.target(Draft), None);
        assert_eq!(Transition::Approve.target(PendingApproval), Some(Approved));
        assert_eq!(Transition::Reject.target(Approved), None);
        assert_eq!(Transition::Revoke.target(Approved), Some(Revoked));
        assert_eq!(Transition::RevertToDraft.target(Revoked), Some(Draft));
        assert_eq!(Transition::RevertToDraft.target(Approved), None);

        assert!(!can_delete(PendingApproval));
        assert!(can_delete(Approved));
    }
}
