use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use approval_shared::models::events::ApprovalEvent;
use approval_shared::models::{ApprovalRequest, Invitation, RequestStatus};
use approval_shared::store::memory::{MemoryApprovalRequestStore, MemoryInvitationStore};
use approval_shared::store::{ApprovalRequestStore, InvitationStore};
use approval_shared::test_utils::flaky_store::FlakyStore;
use approval_shared::test_utils::test_logging::init_test_logging;

use crate::error::{Result, WorkflowError};
use crate::events::EventPublisher;
use crate::session::EditingSession;
use crate::workflow::WorkflowEngine;

/// Keeps every published event for assertions
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<ApprovalEvent>>,
    failing: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<ApprovalEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &ApprovalEvent) -> Result<()> {
        if self.failing {
            return Err(WorkflowError::RemoteFailure("topic unavailable".into()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub invitations: Arc<FlakyStore<MemoryInvitationStore>>,
    pub requests: Arc<FlakyStore<MemoryApprovalRequestStore>>,
    pub events: Arc<RecordingPublisher>,
    pub engine: WorkflowEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_data(vec![], vec![])
    }

    pub fn with_data(invitations: Vec<Invitation>, requests: Vec<ApprovalRequest>) -> Self {
        Self::build(invitations, requests, RecordingPublisher::default())
    }

    pub fn build(
        invitations: Vec<Invitation>,
        requests: Vec<ApprovalRequest>,
        publisher: RecordingPublisher,
    ) -> Self {
        init_test_logging();
        let invitations = Arc::new(FlakyStore::new(MemoryInvitationStore::with_data(
            invitations,
        )));
        let requests = Arc::new(FlakyStore::new(MemoryApprovalRequestStore::with_data(
            requests,
        )));
        let events = Arc::new(publisher);
        let engine = WorkflowEngine::new(invitations.clone(), requests.clone(), events.clone());

        Self {
            invitations,
            requests,
            events,
            engine,
        }
    }

    /// Every store call made through either wrapper, invitations first
    pub fn calls(&self) -> Vec<String> {
        let mut calls = self.invitations.calls();
        calls.extend(self.requests.calls());
        calls
    }

    pub fn clear_calls(&self) {
        self.invitations.clear_calls();
        self.requests.clear_calls();
    }

    pub async fn invitation(&self, id: &str) -> Invitation {
        self.invitations.inner().get_by_id(id).await.unwrap()
    }

    pub async fn requests_for(&self, invitation_id: &str, owner_id: &str) -> Vec<ApprovalRequest> {
        self.requests
            .inner()
            .list_by_owner(owner_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.invitation_id == invitation_id)
            .collect()
    }

    /// Checks the store-wide invariants for every invitation of `owner_id`
    pub async fn assert_invariants(&self, owner_id: &str) {
        let invitations = self.invitations.inner().list_by_owner(owner_id).await.unwrap();
        let requests = self.requests.inner().list_by_owner(owner_id).await.unwrap();

        let mut pending: HashMap<&str, usize> = HashMap::new();
        for request in &requests {
            if request.status == RequestStatus::Pending {
                *pending.entry(request.invitation_id.as_str()).or_default() += 1;
            }
            if request.is_revoked {
                assert_eq!(request.status, RequestStatus::Rejected);
            }
        }

        for invitation in &invitations {
            assert!(!(invitation.is_approved() && invitation.is_requesting_approval()));
            let pending_count = pending.get(invitation.id.as_str()).copied().unwrap_or(0);
            assert!(pending_count <= 1, "{} has {} pending requests", invitation.id, pending_count);
            assert_eq!(
                invitation.is_requesting_approval(),
                pending_count == 1,
                "requesting flag out of step for {}",
                invitation.id
            );
        }
    }
}

pub fn session(slug: &str, title: &str) -> EditingSession {
    EditingSession::begin(slug, json!({ "title": title, "blocks": [] }))
}
