use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};

use approval_shared::auth::AuthContext;

use crate::error::Result;
use crate::handlers::AppState;
use crate::models::{ModerationActionResponse, ModerationPageResponse, PageQuery, ReasonBody};
use crate::moderation::{ModerationQueue, ReasonView};
use crate::owner_view::ActionOutcome;
use crate::signals::CollectedSignals;

fn action_response(
    queue: &ModerationQueue,
    outcome: ActionOutcome,
    signals: &CollectedSignals,
) -> Json<ModerationActionResponse> {
    Json(ModerationActionResponse {
        outcome,
        page: queue.current(),
        messages: signals.messages(),
    })
}

// GET /admin/requests?page=N - One page of approval requests, newest first
pub async fn list_requests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ModerationPageResponse>> {
    let signals = CollectedSignals::new();
    let queue = state.moderation_queue(auth, &signals);

    let page = queue.load_page(query.page).await?;

    Ok(Json(ModerationPageResponse {
        page,
        messages: signals.messages(),
    }))
}

// POST /admin/invitations/:id/approve
pub async fn approve(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ModerationActionResponse>> {
    let signals = CollectedSignals::new();
    let queue = state.moderation_queue(auth, &signals);

    queue.load_page(query.page).await?;
    let outcome = queue.approve(&id).await?;

    Ok(action_response(&queue, outcome, &signals))
}

// POST /admin/invitations/:id/reject
pub async fn reject(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<ModerationActionResponse>> {
    let signals = CollectedSignals::new();
    let queue = state.moderation_queue(auth, &signals);

    queue.load_page(query.page).await?;
    let outcome = queue.reject(&id, &body.reason).await?;

    Ok(action_response(&queue, outcome, &signals))
}

// POST /admin/invitations/:id/revoke
pub async fn revoke(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<ModerationActionResponse>> {
    let signals = CollectedSignals::new();
    let queue = state.moderation_queue(auth, &signals);

    queue.load_page(query.page).await?;
    let outcome = queue.revoke(&id, &body.reason).await?;

    Ok(action_response(&queue, outcome, &signals))
}

// GET /admin/requests/:id/reason?page=N - Escaped reason of a rejected request
pub async fn view_reason(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ReasonView>> {
    let signals = CollectedSignals::new();
    let queue = state.moderation_queue(auth, &signals);

    queue.load_page(query.page).await?;
    let reason = queue.view_reason(&id)?;

    Ok(Json(reason))
}
