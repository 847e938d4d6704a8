use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, warn};
use serde::Serialize;

use approval_shared::auth::AuthContext;
use approval_shared::models::{ApprovalRequest, Invitation, RequestStatus};

use crate::error::{Result, WorkflowError};
use crate::lock::{ActionLock, LockScope};
use crate::owner_view::ActionOutcome;
use crate::sanitize::render_reason_html;
use crate::signals::{report_error, UiMessage, ViewSignals};
use crate::workflow::WorkflowEngine;

/// Invitations already resolved by the moderation queue, keyed by id.
///
/// Clones share the same entries, so the cache outlives any one page load.
#[derive(Clone, Default)]
pub struct InvitationCache {
    entries: Arc<RwLock<HashMap<String, Invitation>>>,
}

impl InvitationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Invitation> {
        self.entries.read().ok()?.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(id))
            .unwrap_or(false)
    }

    /// Ids not cached yet, deduplicated, in first-seen order
    pub fn missing(&self, ids: &[String]) -> Vec<String> {
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| seen.insert(id.as_str()) && !self.contains(id))
            .cloned()
            .collect()
    }

    pub fn insert_all(&self, invitations: Vec<Invitation>) {
        if let Ok(mut entries) = self.entries.write() {
            for invitation in invitations {
                entries.insert(invitation.id.clone(), invitation);
            }
        }
    }

    pub fn evict(&self, id: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(id);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowAction {
    Approve,
    Reject,
    Revoke,
    ViewReason,
}

pub fn row_actions(status: RequestStatus) -> Vec<RowAction> {
    match status {
        RequestStatus::Pending => vec![RowAction::Approve, RowAction::Reject],
        RequestStatus::Approved => vec![RowAction::Revoke],
        RequestStatus::Rejected => vec![RowAction::ViewReason],
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModerationRow {
    pub request: ApprovalRequest,
    /// None when the invitation was deleted after the request was made
    pub invitation: Option<Invitation>,
    pub actions: Vec<RowAction>,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModerationPage {
    pub page: usize,
    pub page_size: usize,
    pub rows: Vec<ModerationRow>,
    pub has_next: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReasonView {
    pub request_id: String,
    pub invitation_id: String,
    pub is_revoked: bool,
    pub reason_html: String,
}

/// The moderator's paginated review surface
pub struct ModerationQueue {
    admin: AuthContext,
    engine: WorkflowEngine,
    locks: LockScope,
    cache: InvitationCache,
    page_size: usize,
    signals: Arc<dyn ViewSignals>,
    state: Mutex<ModerationPage>,
}

impl ModerationQueue {
    pub fn new(
        admin: AuthContext,
        engine: WorkflowEngine,
        lock: ActionLock,
        cache: InvitationCache,
        page_size: usize,
        signals: Arc<dyn ViewSignals>,
    ) -> Self {
        let page_size = page_size.max(1);
        Self {
            admin,
            engine,
            locks: LockScope::new(lock),
            cache,
            page_size,
            signals,
            state: Mutex::new(ModerationPage {
                page_size,
                ..ModerationPage::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ModerationPage> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn current(&self) -> ModerationPage {
        self.state().clone()
    }

    pub fn cache(&self) -> &InvitationCache {
        &self.cache
    }

    fn ensure_admin(&self) -> Result<()> {
        if !self.admin.is_admin {
            return Err(WorkflowError::Forbidden(format!(
                "User {} cannot review invitations",
                self.admin.user_id
            )));
        }
        Ok(())
    }

    /// Loads one page, newest request first, and replaces the local rows.
    pub async fn load_page(&self, page: usize) -> Result<ModerationPage> {
        self.ensure_admin()?;

        match self.fetch_page(page).await {
            Ok(loaded) => {
                *self.state() = loaded.clone();
                Ok(loaded)
            }
            Err(err) => {
                warn!("Failed to load moderation page {}: {}", page, err);
                self.signals
                    .show_message(UiMessage::error("Could not load approval requests."));
                Err(err)
            }
        }
    }

    async fn fetch_page(&self, page: usize) -> Result<ModerationPage> {
        let offset = page.checked_mul(self.page_size).ok_or_else(|| {
            WorkflowError::InvalidInput(format!("Page {} is out of range", page))
        })?;
        // One extra row tells whether a next page exists
        let mut requests = self
            .engine
            .requests()
            .list_all(self.page_size + 1, offset)
            .await?;
        let has_next = requests.len() > self.page_size;
        requests.truncate(self.page_size);

        let ids: Vec<String> = requests.iter().map(|r| r.invitation_id.clone()).collect();
        let missing = self.cache.missing(&ids);
        if !missing.is_empty() {
            debug!("Resolving {} invitation(s) for page {}", missing.len(), page);
            let found = self.engine.invitations().list_by_ids(&missing).await?;
            self.cache.insert_all(found);
        }

        let rows = requests
            .into_iter()
            .map(|request| ModerationRow {
                invitation: self.cache.get(&request.invitation_id),
                actions: row_actions(request.status),
                request,
            })
            .collect();

        Ok(ModerationPage {
            page,
            page_size: self.page_size,
            rows,
            has_next,
        })
    }

    async fn finish(
        &self,
        invitation_id: &str,
        result: Option<Result<Invitation>>,
        success: &str,
    ) -> Result<ActionOutcome> {
        let page = self.state().page;
        match result {
            None => Ok(ActionOutcome::Skipped),
            Some(Ok(_)) => {
                self.cache.evict(invitation_id);
                self.signals.show_message(UiMessage::success(success));
                self.signals.refresh();
                let _ = self.load_page(page).await;
                Ok(ActionOutcome::Completed)
            }
            Some(Err(err)) => {
                report_error(self.signals.as_ref(), &err);
                if err.requires_refresh() {
                    self.cache.evict(invitation_id);
                    let _ = self.load_page(page).await;
                }
                Err(err)
            }
        }
    }

    pub async fn approve(&self, invitation_id: &str) -> Result<ActionOutcome> {
        let engine = self.engine.clone();
        let admin = self.admin.clone();
        let id = invitation_id.to_string();
        let result = self.locks.run(invitation_id, async move {
            engine.approve(&admin, &id).await
        })
        .await;

        self.finish(invitation_id, result, "The invitation has been approved.")
            .await
    }

    pub async fn reject(&self, invitation_id: &str, reason: &str) -> Result<ActionOutcome> {
        let engine = self.engine.clone();
        let admin = self.admin.clone();
        let id = invitation_id.to_string();
        let reason = reason.to_string();
        let result = self.locks.run(invitation_id, async move {
            engine.reject(&admin, &id, &reason).await
        })
        .await;

        self.finish(invitation_id, result, "The invitation has been rejected.")
            .await
    }

    pub async fn revoke(&self, invitation_id: &str, reason: &str) -> Result<ActionOutcome> {
        let engine = self.engine.clone();
        let admin = self.admin.clone();
        let id = invitation_id.to_string();
        let reason = reason.to_string();
        let result = self.locks.run(invitation_id, async move {
            engine.revoke(&admin, &id, &reason).await
        })
        .await;

        self.finish(invitation_id, result, "The approval has been revoked.")
            .await
    }

    /// Escaped reason of a rejected row on the current page
    pub fn view_reason(&self, request_id: &str) -> Result<ReasonView> {
        let state = self.state();
        let row = state
            .rows
            .iter()
            .find(|row| row.request.id == request_id)
            .ok_or_else(|| {
                WorkflowError::NotFound(format!("Approval request {} is not on this page", request_id))
            })?;

        if row.request.status != RequestStatus::Rejected {
            return Err(WorkflowError::InvalidTransition(format!(
                "Approval request {} has no rejection reason",
                request_id
            )));
        }

        Ok(ReasonView {
            request_id: row.request.id.clone(),
            invitation_id: row.request.invitation_id.clone(),
            is_revoked: row.request.is_revoked,
            reason_html: render_reason_html(row.request.reason.as_deref().unwrap_or_default()),
        })
    }
}
