use std::sync::Arc;

use approval_shared::models::{ApprovalStatus, Invitation, RequestStatus};
use approval_shared::store::InvitationStore;
use approval_shared::test_utils::fixtures::{admin, at, invitation, owner, request, OWNER_ID};

use super::utils::Harness;
use crate::error::WorkflowError;
use crate::lock::ActionLock;
use crate::moderation::{InvitationCache, ModerationQueue, RowAction};
use crate::owner_view::ActionOutcome;
use crate::signals::{CollectedSignals, MessageLevel};

fn queue_for(h: &Harness, page_size: usize) -> (ModerationQueue, CollectedSignals) {
    let signals = CollectedSignals::new();
    let queue = ModerationQueue::new(
        admin(),
        h.engine.clone(),
        ActionLock::new(),
        InvitationCache::new(),
        page_size,
        Arc::new(signals.clone()),
    );
    (queue, signals)
}

fn pending(id: &str) -> Invitation {
    invitation(id, OWNER_ID, ApprovalStatus::PendingApproval)
}

/// Three pending invitations, the newest request on `inv-3`
fn three_pending() -> Harness {
    let invitations = vec![pending("inv-1"), pending("inv-2"), pending("inv-3")];
    let requests = invitations
        .iter()
        .enumerate()
        .map(|(i, inv)| {
            request(
                &format!("req-{}", i + 1),
                inv,
                RequestStatus::Pending,
                &at(i as u32 + 1),
            )
        })
        .collect();
    Harness::with_data(invitations, requests)
}

#[tokio::test]
async fn test_pages_newest_first_with_next_flag() {
    let h = three_pending();
    let (queue, _) = queue_for(&h, 2);

    let first = queue.load_page(0).await.unwrap();
    let ids: Vec<&str> = first.rows.iter().map(|r| r.request.id.as_str()).collect();
    assert_eq!(ids, vec!["req-3", "req-2"]);
    assert!(first.has_next);

    let second = queue.load_page(1).await.unwrap();
    assert_eq!(second.rows.len(), 1);
    assert_eq!(second.rows[0].request.id, "req-1");
    assert!(!second.has_next);
    assert_eq!(queue.current().page, 1);
}

#[tokio::test]
async fn test_invitations_resolved_in_one_batch_and_cached() {
    let h = three_pending();
    let (queue, _) = queue_for(&h, 20);

    let page = queue.load_page(0).await.unwrap();
    assert!(page.rows.iter().all(|row| row.invitation.is_some()));
    assert_eq!(h.invitations.call_count("invitations.list_by_ids"), 1);
    assert_eq!(queue.cache().len(), 3);

    queue.load_page(0).await.unwrap();
    assert_eq!(h.invitations.call_count("invitations.list_by_ids"), 1);
    assert_eq!(h.invitations.call_count("invitations.get_by_id"), 0);
}

#[tokio::test]
async fn test_deleted_invitation_leaves_row_without_invitation() {
    let inv = invitation("inv-1", OWNER_ID, ApprovalStatus::Approved);
    let req = request("req-1", &inv, RequestStatus::Approved, &at(1));
    let h = Harness::with_data(vec![], vec![req]);
    let (queue, _) = queue_for(&h, 20);

    let page = queue.load_page(0).await.unwrap();

    assert_eq!(page.rows.len(), 1);
    assert!(page.rows[0].invitation.is_none());
    assert_eq!(page.rows[0].actions, vec![RowAction::Revoke]);
}

#[tokio::test]
async fn test_row_actions_follow_request_status() {
    let open = pending("inv-1");
    let live = invitation("inv-2", OWNER_ID, ApprovalStatus::Approved);
    let turned_down = invitation("inv-3", OWNER_ID, ApprovalStatus::Rejected);
    let requests = vec![
        request("req-1", &open, RequestStatus::Pending, &at(3)),
        request("req-2", &live, RequestStatus::Approved, &at(2)),
        request("req-3", &turned_down, RequestStatus::Rejected, &at(1)),
    ];
    let h = Harness::with_data(vec![open, live, turned_down], requests);
    let (queue, _) = queue_for(&h, 20);

    let page = queue.load_page(0).await.unwrap();
    let actions: Vec<Vec<RowAction>> = page.rows.iter().map(|r| r.actions.clone()).collect();

    assert_eq!(
        actions,
        vec![
            vec![RowAction::Approve, RowAction::Reject],
            vec![RowAction::Revoke],
            vec![RowAction::ViewReason],
        ]
    );
}

#[tokio::test]
async fn test_approve_reloads_page_and_evicts_cached_invitation() {
    let h = three_pending();
    let (queue, signals) = queue_for(&h, 20);
    queue.load_page(0).await.unwrap();

    let outcome = queue.approve("inv-2").await.unwrap();

    assert_eq!(outcome, ActionOutcome::Completed);
    let row = queue
        .current()
        .rows
        .into_iter()
        .find(|row| row.request.invitation_id == "inv-2")
        .unwrap();
    assert_eq!(row.request.status, RequestStatus::Approved);
    assert_eq!(
        row.invitation.map(|inv| inv.status),
        Some(ApprovalStatus::Approved)
    );
    assert_eq!(signals.refresh_count(), 1);
    assert_eq!(signals.messages()[0].level, MessageLevel::Success);
}

#[tokio::test]
async fn test_double_approve_reaches_store_once() {
    let h = three_pending();
    let (queue, _) = queue_for(&h, 20);
    queue.load_page(0).await.unwrap();

    let (first, second) = tokio::join!(queue.approve("inv-1"), queue.approve("inv-1"));

    assert_eq!(first.unwrap(), ActionOutcome::Completed);
    assert_eq!(second.unwrap(), ActionOutcome::Skipped);
    assert_eq!(h.requests.call_count("requests.approve"), 1);
    assert_eq!(h.events.event_types().len(), 1);
}

#[tokio::test]
async fn test_reject_then_view_escaped_reason() {
    let h = three_pending();
    let (queue, _) = queue_for(&h, 20);
    queue.load_page(0).await.unwrap();

    queue
        .reject("inv-1", "<img src=x onerror=alert(1)>\nPlease fix the date")
        .await
        .unwrap();
    let view = queue.view_reason("req-1").unwrap();

    assert_eq!(view.invitation_id, "inv-1");
    assert!(!view.is_revoked);
    assert_eq!(
        view.reason_html,
        "&lt;img src=x onerror=alert(1)&gt;<br>Please fix the date"
    );
}

#[tokio::test]
async fn test_view_reason_on_pending_or_unknown_row() {
    let h = three_pending();
    let (queue, _) = queue_for(&h, 20);
    queue.load_page(0).await.unwrap();

    assert!(matches!(
        queue.view_reason("req-1"),
        Err(WorkflowError::InvalidTransition(_))
    ));
    assert!(matches!(
        queue.view_reason("req-404"),
        Err(WorkflowError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_revoke_after_owner_deleted_forces_reload() {
    let live = invitation("inv-1", OWNER_ID, ApprovalStatus::Approved);
    let req = request("req-1", &live, RequestStatus::Approved, &at(1));
    let h = Harness::with_data(vec![live], vec![req]);
    let (queue, signals) = queue_for(&h, 20);
    queue.load_page(0).await.unwrap();
    assert!(queue.cache().contains("inv-1"));

    h.invitations.inner().delete("inv-1").await.unwrap();
    let err = queue.revoke("inv-1", "Expired content").await.unwrap_err();

    assert!(matches!(err, WorkflowError::NotFound(_)));
    assert_eq!(signals.refresh_count(), 1);
    assert!(!queue.cache().contains("inv-1"));
    assert!(queue.current().rows[0].invitation.is_none());
}

#[tokio::test]
async fn test_owner_cannot_open_queue() {
    let h = three_pending();
    let queue = ModerationQueue::new(
        owner(),
        h.engine.clone(),
        ActionLock::new(),
        InvitationCache::new(),
        20,
        Arc::new(CollectedSignals::new()),
    );

    let err = queue.load_page(0).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Forbidden(_)));
    assert!(h.calls().is_empty());
}

#[tokio::test]
async fn test_list_failure_is_reported() {
    let h = three_pending();
    h.requests.fail_on("requests.list_all");
    let (queue, signals) = queue_for(&h, 20);

    let err = queue.load_page(0).await.unwrap_err();

    assert!(matches!(err, WorkflowError::RemoteFailure(_)));
    assert_eq!(signals.messages()[0].level, MessageLevel::Error);
    assert!(queue.current().rows.is_empty());
}

#[tokio::test]
async fn test_page_offset_overflow_is_invalid_input() {
    let h = three_pending();
    let (queue, _) = queue_for(&h, 20);

    let err = queue.load_page(usize::MAX).await.unwrap_err();

    assert!(matches!(err, WorkflowError::InvalidInput(_)));
    assert!(h.calls().is_empty());
}
