use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use log::debug;
use tokio::sync::watch;

use crate::error::{Result, StoreError};
use crate::models::{ApprovalRequest, Invitation, NewApprovalRequest, NoticeKind, ReviewPatch};
use crate::store::{ApprovalRequestStore, InvitationStore};

/// Wraps a store to record calls, inject failures and hold calls open.
///
/// Operations are named `invitations.<method>` and `requests.<method>`.
pub struct FlakyStore<S> {
    inner: S,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    gates: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl<S> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Every later call of `op` fails with an internal error
    pub fn fail_on(&self, op: &str) {
        self.failing.lock().unwrap().insert(op.to_string());
    }

    pub fn recover(&self, op: &str) {
        self.failing.lock().unwrap().remove(op);
    }

    /// Later calls of `op` block until `release(op)`
    pub fn hold(&self, op: &str) {
        let (sender, _) = watch::channel(false);
        self.gates.lock().unwrap().insert(op.to_string(), sender);
    }

    pub fn release(&self, op: &str) {
        if let Some(gate) = self.gates.lock().unwrap().remove(op) {
            let _ = gate.send(true);
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == op).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn enter(&self, op: &str) -> Result<()> {
        self.calls.lock().unwrap().push(op.to_string());

        let gate = self.gates.lock().unwrap().get(op).map(|g| g.subscribe());
        if let Some(mut gate) = gate {
            debug!("Holding {} until released", op);
            let _ = gate.wait_for(|open| *open).await;
        }

        if self.failing.lock().unwrap().contains(op) {
            return Err(StoreError::InternalError(format!("injected failure in {}", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: InvitationStore> InvitationStore for FlakyStore<S> {
    async fn get_by_id(&self, id: &str) -> Result<Invitation> {
        self.enter("invitations.get_by_id").await?;
        self.inner.get_by_id(id).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Invitation> {
        self.enter("invitations.get_by_slug").await?;
        self.inner.get_by_slug(slug).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Invitation>> {
        self.enter("invitations.list_by_owner").await?;
        self.inner.list_by_owner(owner_id).await
    }

    async fn list_by_ids(&self, ids: &[String]) -> Result<Vec<Invitation>> {
        self.enter("invitations.list_by_ids").await?;
        self.inner.list_by_ids(ids).await
    }

    async fn save(
        &self,
        slug: &str,
        content: serde_json::Value,
        owner_id: &str,
    ) -> Result<Invitation> {
        self.enter("invitations.save").await?;
        self.inner.save(slug, content, owner_id).await
    }

    async fn update_review(&self, id: &str, patch: ReviewPatch) -> Result<Invitation> {
        self.enter("invitations.update_review").await?;
        self.inner.update_review(id, patch).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.enter("invitations.delete").await?;
        self.inner.delete(id).await
    }

    async fn mark_notification_read(&self, id: &str, kind: NoticeKind) -> Result<()> {
        self.enter("invitations.mark_notification_read").await?;
        self.inner.mark_notification_read(id, kind).await
    }
}

#[async_trait]
impl<S: ApprovalRequestStore> ApprovalRequestStore for FlakyStore<S> {
    async fn create(&self, request: NewApprovalRequest) -> Result<ApprovalRequest> {
        self.enter("requests.create").await?;
        self.inner.create(request).await
    }

    async fn cancel(&self, invitation_id: &str) -> Result<()> {
        self.enter("requests.cancel").await?;
        self.inner.cancel(invitation_id).await
    }

    async fn approve(&self, invitation_id: &str) -> Result<ApprovalRequest> {
        self.enter("requests.approve").await?;
        self.inner.approve(invitation_id).await
    }

    async fn reject(&self, invitation_id: &str, reason: &str) -> Result<ApprovalRequest> {
        self.enter("requests.reject").await?;
        self.inner.reject(invitation_id, reason).await
    }

    async fn latest_for_invitation(&self, invitation_id: &str) -> Result<Option<ApprovalRequest>> {
        self.enter("requests.latest_for_invitation").await?;
        self.inner.latest_for_invitation(invitation_id).await
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<ApprovalRequest>> {
        self.enter("requests.list_by_owner").await?;
        self.inner.list_by_owner(owner_id).await
    }

    async fn list_all(&self, limit: usize, offset: usize) -> Result<Vec<ApprovalRequest>> {
        self.enter("requests.list_all").await?;
        self.inner.list_all(limit, offset).await
    }
}
