pub mod admin_handlers;
pub mod owner_handlers;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use approval_shared::auth::AuthContext;

use crate::lock::ActionLock;
use crate::moderation::{InvitationCache, ModerationQueue};
use crate::owner_view::OwnerView;
use crate::signals::CollectedSignals;
use crate::workflow::WorkflowEngine;

/// Shared router state. Views are built per request on top of it.
#[derive(Clone)]
pub struct AppState {
    pub engine: WorkflowEngine,
    pub cache: InvitationCache,
    pub page_size: usize,
    // One action lock per signed-in user; users never exclude each other
    locks: Arc<Mutex<HashMap<String, ActionLock>>>,
}

impl AppState {
    pub fn new(engine: WorkflowEngine, page_size: usize) -> Self {
        Self {
            engine,
            cache: InvitationCache::new(),
            page_size,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The action lock of one client, created on first use
    pub fn lock_for(&self, user_id: &str) -> ActionLock {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(user_id.to_string()).or_default().clone()
    }

    pub fn owner_view(&self, auth: AuthContext, signals: &CollectedSignals) -> OwnerView {
        let lock = self.lock_for(&auth.user_id);
        OwnerView::new(auth, self.engine.clone(), lock, Arc::new(signals.clone()))
    }

    pub fn moderation_queue(
        &self,
        auth: AuthContext,
        signals: &CollectedSignals,
    ) -> ModerationQueue {
        let lock = self.lock_for(&auth.user_id);
        ModerationQueue::new(
            auth,
            self.engine.clone(),
            lock,
            self.cache.clone(),
            self.page_size,
            Arc::new(signals.clone()),
        )
    }
}
