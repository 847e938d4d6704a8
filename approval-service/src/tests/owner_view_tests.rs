use std::sync::Arc;
use std::time::Duration;

use approval_shared::models::{ApprovalStatus, NoticeKind, RequestStatus, ReviewPatch};
use approval_shared::store::InvitationStore;
use approval_shared::test_utils::fixtures::{
    admin, at, invitation, owner, owner_without_phone, request, OTHER_OWNER_ID, OWNER_ID,
};

use super::utils::{session, Harness};
use crate::error::WorkflowError;
use crate::handlers::AppState;
use crate::lock::ActionLock;
use crate::owner_view::{ActionOutcome, OwnerAction, OwnerView, SHARED_LINKS_WARNING};
use crate::signals::{CollectedSignals, MessageLevel};

fn view_for(h: &Harness) -> (OwnerView, CollectedSignals, ActionLock) {
    let signals = CollectedSignals::new();
    let lock = ActionLock::new();
    let view = OwnerView::new(
        owner(),
        h.engine.clone(),
        lock.clone(),
        Arc::new(signals.clone()),
    );
    (view, signals, lock)
}

#[tokio::test]
async fn test_refresh_builds_rows_and_single_notice() {
    let mut approved = invitation("inv-1", OWNER_ID, ApprovalStatus::Approved);
    approved.has_new_approval = true;
    let mut revoked = invitation("inv-2", OWNER_ID, ApprovalStatus::Revoked);
    revoked.has_new_rejection = true;
    let mut revoked_request = request("req-2", &revoked, RequestStatus::Rejected, &at(2));
    revoked_request.is_revoked = true;
    revoked_request.reason = Some("<script>x</script>\n사진 누락".into());
    let h = Harness::with_data(vec![approved, revoked], vec![revoked_request]);
    let (view, _, _) = view_for(&h);

    let dashboard = view.refresh().await.unwrap();

    assert_eq!(dashboard.rows.len(), 2);
    let notice = dashboard.notice.unwrap();
    assert_eq!(notice.kind, NoticeKind::Rejection);
    assert_eq!(notice.invitation_id, "inv-2");

    let revoked_row = dashboard
        .rows
        .iter()
        .find(|row| row.invitation.id == "inv-2")
        .unwrap();
    assert_eq!(
        revoked_row.reason_html.as_deref(),
        Some("&lt;script&gt;x&lt;/script&gt;<br>사진 누락")
    );
    assert!(revoked_row.actions.contains(&OwnerAction::RevertToDraft));

    let approved_row = dashboard
        .rows
        .iter()
        .find(|row| row.invitation.id == "inv-1")
        .unwrap();
    assert_eq!(approved_row.actions, vec![OwnerAction::DeleteWithWarning]);
    assert!(approved_row.reason_html.is_none());
}

#[tokio::test]
async fn test_acknowledge_clears_only_the_shown_flag() {
    let mut both = invitation("inv-1", OWNER_ID, ApprovalStatus::Rejected);
    both.has_new_rejection = true;
    both.has_new_approval = true;
    let mut other = invitation("inv-2", OWNER_ID, ApprovalStatus::Approved);
    other.has_new_approval = true;
    let h = Harness::with_data(vec![both, other], vec![]);
    let (view, _, _) = view_for(&h);

    let shown = view.refresh().await.unwrap().notice.unwrap();
    assert_eq!(shown.kind, NoticeKind::Rejection);
    assert_eq!(shown.invitation_id, "inv-1");
    assert!(view.acknowledge(&shown.invitation_id, shown.kind).await.unwrap());
    assert!(view.dashboard().notice.is_none());

    let acknowledged = h.invitation("inv-1").await;
    assert!(!acknowledged.has_new_rejection);
    assert!(acknowledged.has_new_approval);
    assert!(h.invitation("inv-2").await.has_new_approval);
}

#[tokio::test]
async fn test_acknowledge_twice_is_harmless() {
    let mut flagged = invitation("inv-1", OWNER_ID, ApprovalStatus::Approved);
    flagged.has_new_approval = true;
    let h = Harness::with_data(vec![flagged], vec![]);
    let (view, signals, _) = view_for(&h);

    view.refresh().await.unwrap();
    assert!(view.acknowledge("inv-1", NoticeKind::Approval).await.unwrap());
    // Already clear: still succeeds, still clear
    assert!(view.acknowledge("inv-1", NoticeKind::Approval).await.unwrap());

    assert!(!h.invitation("inv-1").await.has_new_approval);
    assert!(view.refresh().await.unwrap().notice.is_none());
    assert!(signals.messages().is_empty());
}

#[tokio::test]
async fn test_acknowledge_failure_keeps_flag_sticky() {
    let mut flagged = invitation("inv-1", OWNER_ID, ApprovalStatus::Rejected);
    flagged.has_new_rejection = true;
    let h = Harness::with_data(vec![flagged], vec![]);
    h.invitations.fail_on("invitations.mark_notification_read");
    let (view, _, _) = view_for(&h);

    view.refresh().await.unwrap();
    assert!(!view.acknowledge("inv-1", NoticeKind::Rejection).await.unwrap());
    assert!(view.dashboard().notice.is_none());

    // Shown again on the next load
    let again = view.refresh().await.unwrap();
    assert_eq!(again.notice.unwrap().invitation_id, "inv-1");
}

#[tokio::test]
async fn test_request_approval_then_cancel() {
    let h = Harness::new();
    let (view, signals, lock) = view_for(&h);
    view.refresh().await.unwrap();

    let outcome = view
        .request_approval(&session("our-day", "Our day"))
        .await
        .unwrap();
    assert_eq!(outcome, ActionOutcome::Completed);

    let dashboard = view.dashboard();
    assert_eq!(dashboard.rows.len(), 1);
    let row = &dashboard.rows[0];
    assert_eq!(row.invitation.status, ApprovalStatus::PendingApproval);
    assert_eq!(row.actions, vec![OwnerAction::CancelRequest]);
    assert_eq!(
        row.latest_request.as_ref().map(|r| r.status),
        Some(RequestStatus::Pending)
    );

    let outcome = view.cancel(&row.invitation.id).await.unwrap();
    assert_eq!(outcome, ActionOutcome::Completed);
    assert_eq!(view.dashboard().rows[0].invitation.status, ApprovalStatus::Draft);

    assert_eq!(signals.refresh_count(), 2);
    assert!(signals
        .messages()
        .iter()
        .all(|m| m.level == MessageLevel::Success));
    assert_eq!(lock.held_count(), 0);
}

#[tokio::test]
async fn test_incomplete_profile_is_a_blocking_dialog() {
    let h = Harness::new();
    let signals = CollectedSignals::new();
    let lock = ActionLock::new();
    let view = OwnerView::new(
        owner_without_phone(),
        h.engine.clone(),
        lock.clone(),
        Arc::new(signals.clone()),
    );

    let err = view
        .request_approval(&session("our-day", "Our day"))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::ProfileIncomplete(_)));
    assert_eq!(signals.messages()[0].level, MessageLevel::Blocking);
    assert!(h.calls().is_empty());
    assert!(!lock.is_held("our-day"));
}

#[tokio::test]
async fn test_delete_pending_is_refused_before_any_store_call() {
    let h = Harness::with_data(
        vec![invitation("inv-1", OWNER_ID, ApprovalStatus::PendingApproval)],
        vec![],
    );
    let (view, signals, _) = view_for(&h);
    view.refresh().await.unwrap();
    h.clear_calls();

    let err = view.delete("inv-1", true).await.unwrap_err();

    assert!(matches!(err, WorkflowError::InvalidTransition(_)));
    assert!(h.calls().is_empty());
    assert!(signals.messages()[0].text.contains("Cancel the request"));
}

#[tokio::test]
async fn test_delete_approved_needs_confirmation() {
    let h = Harness::with_data(
        vec![invitation("inv-1", OWNER_ID, ApprovalStatus::Approved)],
        vec![],
    );
    let (view, _, _) = view_for(&h);
    view.refresh().await.unwrap();
    h.clear_calls();

    let outcome = view.delete("inv-1", false).await.unwrap();
    assert_eq!(
        outcome,
        ActionOutcome::NeedsConfirmation {
            warning: SHARED_LINKS_WARNING.to_string()
        }
    );
    assert!(h.calls().is_empty());

    let outcome = view.delete("inv-1", true).await.unwrap();
    assert_eq!(outcome, ActionOutcome::Completed);
    assert!(view.dashboard().rows.is_empty());
}

#[tokio::test]
async fn test_stale_action_forces_refresh() {
    let h = Harness::with_data(
        vec![invitation("inv-1", OWNER_ID, ApprovalStatus::PendingApproval)],
        vec![],
    );
    let (view, signals, _) = view_for(&h);
    view.refresh().await.unwrap();

    // Deleted elsewhere after the list was loaded
    h.invitations.inner().delete("inv-1").await.unwrap();
    let err = view.cancel("inv-1").await.unwrap_err();

    assert!(matches!(err, WorkflowError::NotFound(_)));
    assert_eq!(signals.refresh_count(), 1);
    assert!(view.dashboard().rows.is_empty());
}

#[tokio::test]
async fn test_second_action_on_same_entity_is_skipped() {
    let h = Harness::with_data(
        vec![invitation("inv-1", OWNER_ID, ApprovalStatus::Rejected)],
        vec![],
    );
    let (view, _, _) = view_for(&h);
    view.refresh().await.unwrap();
    h.invitations.hold("invitations.update_review");

    let first = view.revert_to_draft("inv-1");
    let second = async {
        let outcome = view.revert_to_draft("inv-1").await;
        h.invitations.release("invitations.update_review");
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), ActionOutcome::Completed);
    assert_eq!(second.unwrap(), ActionOutcome::Skipped);
    assert_eq!(h.invitations.call_count("invitations.update_review"), 1);
}

#[tokio::test]
async fn test_navigating_away_releases_lock_but_call_completes() {
    let h = Harness::with_data(
        vec![invitation("inv-1", OWNER_ID, ApprovalStatus::Rejected)],
        vec![],
    );
    let (view, _, lock) = view_for(&h);
    view.refresh().await.unwrap();
    h.invitations.hold("invitations.update_review");

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), view.revert_to_draft("inv-1")).await;
    assert!(abandoned.is_err());
    assert!(!lock.is_held("inv-1"));

    h.invitations.release("invitations.update_review");
    let mut status = h.invitation("inv-1").await.status;
    for _ in 0..50 {
        if status == ApprovalStatus::Draft {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        status = h.invitation("inv-1").await.status;
    }
    assert_eq!(status, ApprovalStatus::Draft);
}

#[tokio::test]
async fn test_acknowledge_leaves_flags_raised_since_the_load() {
    let mut approved = invitation("inv-a", OWNER_ID, ApprovalStatus::Approved);
    approved.has_new_approval = true;
    let h = Harness::with_data(
        vec![approved, invitation("inv-b", OWNER_ID, ApprovalStatus::PendingApproval)],
        vec![],
    );
    let (view, _, _) = view_for(&h);
    let shown = view.refresh().await.unwrap().notice.unwrap();
    assert_eq!(shown.invitation_id, "inv-a");

    // A rejection lands on another invitation before the owner acknowledges
    h.invitations
        .inner()
        .update_review(
            "inv-b",
            ReviewPatch::status(ApprovalStatus::Rejected).with_new_rejection(true),
        )
        .await
        .unwrap();
    view.refresh().await.unwrap();

    assert!(view.acknowledge(&shown.invitation_id, shown.kind).await.unwrap());

    assert!(!h.invitation("inv-a").await.has_new_approval);
    assert!(h.invitation("inv-b").await.has_new_rejection);
    let next = view.refresh().await.unwrap().notice.unwrap();
    assert_eq!(next.invitation_id, "inv-b");
    assert_eq!(next.kind, NoticeKind::Rejection);
}

#[tokio::test]
async fn test_acknowledge_foreign_invitation_is_refused() {
    let mut theirs = invitation("inv-9", OTHER_OWNER_ID, ApprovalStatus::Approved);
    theirs.has_new_approval = true;
    let h = Harness::with_data(vec![theirs], vec![]);
    let (view, _, _) = view_for(&h);
    view.refresh().await.unwrap();

    let err = view
        .acknowledge("inv-9", NoticeKind::Approval)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkflowError::NotFound(_)));
    assert_eq!(h.invitations.call_count("invitations.mark_notification_read"), 0);
    assert!(h.invitation("inv-9").await.has_new_approval);
}

#[tokio::test]
async fn test_leave_releases_only_this_views_locks() {
    let h = Harness::with_data(
        vec![invitation("inv-1", OWNER_ID, ApprovalStatus::Rejected)],
        vec![],
    );
    let (view, _, lock) = view_for(&h);
    view.refresh().await.unwrap();
    // Held through the same client lock by another view
    assert!(lock.try_acquire("inv-2"));
    h.invitations.hold("invitations.update_review");

    let action = view.revert_to_draft("inv-1");
    let leave = async {
        view.leave();
        let freed = !lock.is_held("inv-1");
        h.invitations.release("invitations.update_review");
        freed
    };
    let (outcome, freed) = tokio::join!(action, leave);

    assert!(freed);
    assert_eq!(outcome.unwrap(), ActionOutcome::Completed);
    assert!(lock.is_held("inv-2"));
}

#[tokio::test]
async fn test_owner_leaving_keeps_moderator_action_locked() {
    let pending = invitation("inv-1", OWNER_ID, ApprovalStatus::PendingApproval);
    let open_request = request("req-1", &pending, RequestStatus::Pending, &at(1));
    let h = Harness::with_data(vec![pending], vec![open_request]);
    let state = AppState::new(h.engine.clone(), 20);
    let signals = CollectedSignals::new();
    let first_queue = state.moderation_queue(admin(), &signals);
    let second_queue = state.moderation_queue(admin(), &signals);
    let owner_view = state.owner_view(owner(), &signals);
    h.requests.hold("requests.approve");

    let first = first_queue.approve("inv-1");
    let second = async {
        owner_view.leave();
        let outcome = second_queue.approve("inv-1").await;
        h.requests.release("requests.approve");
        outcome
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), ActionOutcome::Completed);
    assert_eq!(second.unwrap(), ActionOutcome::Skipped);
    assert_eq!(h.requests.call_count("requests.approve"), 1);
}

#[tokio::test]
async fn test_moderator_lock_does_not_block_owner() {
    let h = Harness::with_data(
        vec![invitation("inv-1", OWNER_ID, ApprovalStatus::PendingApproval)],
        vec![],
    );
    let state = AppState::new(h.engine.clone(), 20);
    assert!(state.lock_for(&admin().user_id).try_acquire("inv-1"));
    let owner_view = state.owner_view(owner(), &CollectedSignals::new());
    owner_view.refresh().await.unwrap();

    let outcome = owner_view.cancel("inv-1").await.unwrap();

    assert_eq!(outcome, ActionOutcome::Completed);
    assert_eq!(h.invitation("inv-1").await.status, ApprovalStatus::Draft);
    assert!(state.lock_for(&admin().user_id).is_held("inv-1"));
}
