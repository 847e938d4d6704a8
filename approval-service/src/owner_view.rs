use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{info, warn};
use serde::Serialize;

use approval_shared::auth::AuthContext;
use approval_shared::models::{
    latest_request, ApprovalRequest, ApprovalStatus, Invitation, NoticeKind,
};

use crate::error::{Result, WorkflowError};
use crate::lock::{ActionLock, LockScope};
use crate::notifications::{Notice, NotificationDeduper};
use crate::sanitize::render_reason_html;
use crate::session::EditingSession;
use crate::signals::{report_error, UiMessage, ViewSignals};
use crate::workflow::{WorkflowEngine, DELETE_WHILE_PENDING};

pub const SHARED_LINKS_WARNING: &str =
    "This invitation is live. Once deleted, every link you have shared will stop working.";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OwnerAction {
    RequestApproval,
    CancelRequest,
    RevertToDraft,
    ViewReason,
    Delete,
    /// Delete, after the shared-links warning
    DeleteWithWarning,
}

pub fn owner_actions(status: ApprovalStatus) -> Vec<OwnerAction> {
    match status {
        ApprovalStatus::Draft => vec![OwnerAction::RequestApproval, OwnerAction::Delete],
        ApprovalStatus::PendingApproval => vec![OwnerAction::CancelRequest],
        ApprovalStatus::Approved => vec![OwnerAction::DeleteWithWarning],
        ApprovalStatus::Rejected | ApprovalStatus::Revoked => vec![
            OwnerAction::RevertToDraft,
            OwnerAction::ViewReason,
            OwnerAction::Delete,
        ],
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OwnerRow {
    pub invitation: Invitation,
    pub title: String,
    pub latest_request: Option<ApprovalRequest>,
    /// Escaped reason of the last rejection or revocation
    pub reason_html: Option<String>,
    pub actions: Vec<OwnerAction>,
}

impl OwnerRow {
    fn build(invitation: Invitation, latest_request: Option<ApprovalRequest>) -> Self {
        let reason_html = match invitation.status {
            ApprovalStatus::Rejected | ApprovalStatus::Revoked => latest_request
                .as_ref()
                .and_then(|request| request.reason.as_deref())
                .map(render_reason_html),
            _ => None,
        };
        Self {
            title: invitation.title(),
            actions: owner_actions(invitation.status),
            invitation,
            latest_request,
            reason_html,
        }
    }
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct OwnerDashboard {
    pub rows: Vec<OwnerRow>,
    pub notice: Option<Notice>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Completed,
    /// Another action on the same entity is still in flight
    Skipped,
    NeedsConfirmation { warning: String },
}

/// The content owner's dashboard
pub struct OwnerView {
    owner: AuthContext,
    engine: WorkflowEngine,
    deduper: NotificationDeduper,
    locks: LockScope,
    signals: Arc<dyn ViewSignals>,
    state: Mutex<OwnerDashboard>,
}

impl OwnerView {
    pub fn new(
        owner: AuthContext,
        engine: WorkflowEngine,
        lock: ActionLock,
        signals: Arc<dyn ViewSignals>,
    ) -> Self {
        Self {
            deduper: NotificationDeduper::new(engine.invitations().clone()),
            owner,
            engine,
            locks: LockScope::new(lock),
            signals,
            state: Mutex::new(OwnerDashboard::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, OwnerDashboard> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn dashboard(&self) -> OwnerDashboard {
        self.state().clone()
    }

    fn local_invitation(&self, invitation_id: &str) -> Option<Invitation> {
        self.state()
            .rows
            .iter()
            .find(|row| row.invitation.id == invitation_id)
            .map(|row| row.invitation.clone())
    }

    /// Reloads everything for the owner and replaces the local state.
    pub async fn refresh(&self) -> Result<OwnerDashboard> {
        let owner_id = &self.owner.user_id;
        let loaded = async {
            let invitations = self.engine.invitations().list_by_owner(owner_id).await?;
            let requests = self.engine.requests().list_by_owner(owner_id).await?;
            Ok::<_, WorkflowError>((invitations, requests))
        }
        .await;

        let (invitations, requests) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!("Failed to load dashboard for {}: {}", owner_id, err);
                self.signals
                    .show_message(UiMessage::error("Could not load your invitations."));
                return Err(err);
            }
        };

        let mut by_invitation: HashMap<&str, Vec<&ApprovalRequest>> = HashMap::new();
        for request in &requests {
            by_invitation
                .entry(request.invitation_id.as_str())
                .or_default()
                .push(request);
        }

        let notice = NotificationDeduper::select(&invitations);
        let rows = invitations
            .into_iter()
            .map(|invitation| {
                let latest = by_invitation
                    .get(invitation.id.as_str())
                    .and_then(|requests| latest_request(requests.iter().copied()))
                    .cloned();
                OwnerRow::build(invitation, latest)
            })
            .collect();

        let dashboard = OwnerDashboard { rows, notice };
        *self.state() = dashboard.clone();
        Ok(dashboard)
    }

    /// Acknowledges the notice shown for `invitation_id`, clearing only the
    /// `kind` flag. Nothing is re-selected, so flags raised since the notice
    /// was shown stay set. Returns whether the flag was cleared.
    pub async fn acknowledge(&self, invitation_id: &str, kind: NoticeKind) -> Result<bool> {
        if self.local_invitation(invitation_id).is_none() {
            return Err(WorkflowError::NotFound(format!(
                "Invitation {} is not on your dashboard",
                invitation_id
            )));
        }

        {
            let mut state = self.state();
            let shown = state
                .notice
                .as_ref()
                .is_some_and(|notice| notice.invitation_id == invitation_id && notice.kind == kind);
            if shown {
                state.notice = None;
            }
        }

        Ok(self.deduper.acknowledge(invitation_id, kind).await)
    }

    async fn finish<T>(&self, result: Option<Result<T>>, success: &str) -> Result<ActionOutcome> {
        match result {
            None => Ok(ActionOutcome::Skipped),
            Some(Ok(_)) => {
                self.signals.show_message(UiMessage::success(success));
                self.signals.refresh();
                // The transition is done even if this reload fails
                let _ = self.refresh().await;
                Ok(ActionOutcome::Completed)
            }
            Some(Err(err)) => {
                report_error(self.signals.as_ref(), &err);
                if err.requires_refresh() {
                    let _ = self.refresh().await;
                }
                Err(err)
            }
        }
    }

    pub async fn request_approval(&self, session: &EditingSession) -> Result<ActionOutcome> {
        // Key by invitation id when the slug is already known locally
        let entity_id = self
            .state()
            .rows
            .iter()
            .find(|row| row.invitation.slug == session.slug())
            .map(|row| row.invitation.id.clone())
            .unwrap_or_else(|| session.slug().to_string());

        let engine = self.engine.clone();
        let owner = self.owner.clone();
        let session = session.clone();
        let result = self.locks.run(&entity_id, async move {
            engine.request_approval(&owner, &session).await
        })
        .await;

        self.finish(result, "Your invitation has been sent for approval.")
            .await
    }

    pub async fn cancel(&self, invitation_id: &str) -> Result<ActionOutcome> {
        let engine = self.engine.clone();
        let owner = self.owner.clone();
        let id = invitation_id.to_string();
        let result = self.locks.run(invitation_id, async move {
            engine.cancel(&owner, &id).await
        })
        .await;

        self.finish(result, "The approval request has been cancelled.")
            .await
    }

    pub async fn revert_to_draft(&self, invitation_id: &str) -> Result<ActionOutcome> {
        let engine = self.engine.clone();
        let owner = self.owner.clone();
        let id = invitation_id.to_string();
        let result = self.locks.run(invitation_id, async move {
            engine.revert_to_draft(&owner, &id).await
        })
        .await;

        self.finish(result, "The invitation is a draft again.").await
    }

    /// Deletes an invitation. A pending invitation is refused from local
    /// state without touching the store; an approved one needs `confirmed`.
    pub async fn delete(&self, invitation_id: &str, confirmed: bool) -> Result<ActionOutcome> {
        if let Some(local) = self.local_invitation(invitation_id) {
            match local.status {
                ApprovalStatus::PendingApproval => {
                    info!("Refusing to delete pending invitation {}", invitation_id);
                    self.signals
                        .show_message(UiMessage::error(DELETE_WHILE_PENDING));
                    return Err(WorkflowError::InvalidTransition(DELETE_WHILE_PENDING.into()));
                }
                ApprovalStatus::Approved if !confirmed => {
                    return Ok(ActionOutcome::NeedsConfirmation {
                        warning: SHARED_LINKS_WARNING.to_string(),
                    });
                }
                _ => {}
            }
        }

        let engine = self.engine.clone();
        let owner = self.owner.clone();
        let id = invitation_id.to_string();
        let result = self.locks.run(invitation_id, async move {
            engine.delete(&owner, &id).await
        })
        .await;

        self.finish(result, "The invitation has been deleted.").await
    }

    /// Navigation away: drop the locks this view still holds.
    pub fn leave(&self) {
        self.locks.release_held();
    }
}
