use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::{debug, trace};

use super::{page_newest_first, ApprovalRequestStore, InvitationStore};
use crate::error::{Result, StoreError};
use crate::models::{
    latest_request, now_str, ApprovalRequest, Invitation, NewApprovalRequest, NoticeKind,
    RequestStatus, ReviewPatch,
};

fn read_error() -> StoreError {
    StoreError::InternalError("Failed to acquire read lock".into())
}

fn write_error() -> StoreError {
    StoreError::InternalError("Failed to acquire write lock".into())
}

/// In-memory implementation of InvitationStore
#[derive(Default, Clone)]
pub struct MemoryInvitationStore {
    invitations: Arc<RwLock<HashMap<String, Invitation>>>,
}

impl MemoryInvitationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory invitation store with initial data
    pub fn with_data(initial_data: Vec<Invitation>) -> Self {
        let invitations = initial_data
            .into_iter()
            .map(|invitation| (invitation.id.clone(), invitation))
            .collect();

        Self {
            invitations: Arc::new(RwLock::new(invitations)),
        }
    }
}

#[async_trait]
impl InvitationStore for MemoryInvitationStore {
    async fn get_by_id(&self, id: &str) -> Result<Invitation> {
        let invitations = self.invitations.read().map_err(|_| read_error())?;

        invitations
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Invitation not found: {}", id)))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Invitation> {
        let invitations = self.invitations.read().map_err(|_| read_error())?;

        invitations
            .values()
            .find(|invitation| invitation.slug == slug)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Invitation not found with slug: {}", slug)))
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invitation>> {
        let invitations = self.invitations.read().map_err(|_| read_error())?;

        let mut owned: Vec<Invitation> = invitations
            .values()
            .filter(|invitation| invitation.owner_id == owner_id)
            .cloned()
            .collect();
        // Newest edits first, like the dashboard lists them
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(owned)
    }

    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Invitation>> {
        let invitations = self.invitations.read().map_err(|_| read_error())?;
        trace!("Batch lookup of {} invitations", ids.len());

        Ok(ids
            .iter()
            .filter_map(|id| invitations.get(id).cloned())
            .collect())
    }

    async fn save(
        &self,
        slug: &str,
        content: serde_json::Value,
        owner_id: &str,
    ) -> Result<Invitation> {
        let mut invitations = self.invitations.write().map_err(|_| write_error())?;

        if let Some(existing) = invitations.values_mut().find(|inv| inv.slug == slug) {
            if existing.owner_id != owner_id {
                return Err(StoreError::AuthError(format!(
                    "Invitation {} belongs to another user",
                    slug
                )));
            }
            existing.content = content;
            existing.updated_at = now_str();
            return Ok(existing.clone());
        }

        let invitation = Invitation::new_draft(slug, content, owner_id);
        debug!("Created draft invitation {} for slug {}", invitation.id, slug);
        invitations.insert(invitation.id.clone(), invitation.clone());
        Ok(invitation)
    }

    async fn update_review(&self, id: &str, patch: ReviewPatch) -> Result<Invitation> {
        let mut invitations = self.invitations.write().map_err(|_| write_error())?;

        let invitation = invitations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("Invitation not found: {}", id)))?;
        patch.apply(invitation);

        Ok(invitation.clone())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut invitations = self.invitations.write().map_err(|_| write_error())?;

        if invitations.remove(id).is_none() {
            return Err(StoreError::NotFound(format!("Invitation not found: {}", id)));
        }

        Ok(())
    }

    async fn mark_notification_read(&self, id: &str, kind: NoticeKind) -> Result<()> {
        let mut invitations = self.invitations.write().map_err(|_| write_error())?;

        let invitation = invitations
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("Invitation not found: {}", id)))?;
        kind.clear_on(invitation);

        Ok(())
    }
}

/// In-memory implementation of ApprovalRequestStore
#[derive(Default, Clone)]
pub struct MemoryApprovalRequestStore {
    requests: Arc<RwLock<HashMap<String, ApprovalRequest>>>,
}

impl MemoryApprovalRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory request store with initial data
    pub fn with_data(initial_data: Vec<ApprovalRequest>) -> Self {
        let requests = initial_data
            .into_iter()
            .map(|request| (request.id.clone(), request))
            .collect();

        Self {
            requests: Arc::new(RwLock::new(requests)),
        }
    }

    fn latest_id(requests: &HashMap<String, ApprovalRequest>, invitation_id: &str) -> Result<String> {
        latest_request(
            requests
                .values()
                .filter(|request| request.invitation_id == invitation_id),
        )
        .map(|request| request.id.clone())
        .ok_or_else(|| {
            StoreError::NotFound(format!(
                "No approval request for invitation: {}",
                invitation_id
            ))
        })
    }
}

#[async_trait]
impl ApprovalRequestStore for MemoryApprovalRequestStore {
    async fn create(&self, request: NewApprovalRequest) -> Result<ApprovalRequest> {
        let mut requests = self.requests.write().map_err(|_| write_error())?;

        let already_pending = requests.values().any(|existing| {
            existing.invitation_id == request.invitation_id
                && existing.status == RequestStatus::Pending
        });
        if already_pending {
            return Err(StoreError::Conflict(format!(
                "Invitation {} already has a pending approval request",
                request.invitation_id
            )));
        }

        let created = ApprovalRequest::from_new(request);
        requests.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn cancel(&self, invitation_id: &str) -> Result<()> {
        let mut requests = self.requests.write().map_err(|_| write_error())?;

        let pending_id = requests
            .values()
            .find(|request| {
                request.invitation_id == invitation_id && request.status == RequestStatus::Pending
            })
            .map(|request| request.id.clone())
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "No pending approval request for invitation: {}",
                    invitation_id
                ))
            })?;

        requests.remove(&pending_id);
        Ok(())
    }

    async fn approve(&self, invitation_id: &str) -> Result<ApprovalRequest> {
        let mut requests = self.requests.write().map_err(|_| write_error())?;

        let latest_id = Self::latest_id(&requests, invitation_id)?;
        let request = requests
            .get_mut(&latest_id)
            .ok_or_else(|| StoreError::NotFound(format!("Approval request not found: {}", latest_id)))?;
        request.approve()?;

        Ok(request.clone())
    }

    async fn reject(&self, invitation_id: &str, reason: &str) -> Result<ApprovalRequest> {
        let mut requests = self.requests.write().map_err(|_| write_error())?;

        let latest_id = Self::latest_id(&requests, invitation_id)?;
        let request = requests
            .get_mut(&latest_id)
            .ok_or_else(|| StoreError::NotFound(format!("Approval request not found: {}", latest_id)))?;
        request.reject(reason)?;

        Ok(request.clone())
    }

    async fn latest_for_invitation(&self, invitation_id: &str) -> Result<Option<ApprovalRequest>> {
        let requests = self.requests.read().map_err(|_| read_error())?;

        Ok(latest_request(
            requests
                .values()
                .filter(|request| request.invitation_id == invitation_id),
        )
        .cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ApprovalRequest>> {
        let requests = self.requests.read().map_err(|_| read_error())?;

        Ok(requests
            .values()
            .filter(|request| request.requester_user_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self, limit: usize, offset: usize) -> Result<Vec<ApprovalRequest>> {
        let requests = self.requests.read().map_err(|_| read_error())?;

        Ok(page_newest_first(
            requests.values().cloned().collect(),
            limit,
            offset,
        ))
    }
}
