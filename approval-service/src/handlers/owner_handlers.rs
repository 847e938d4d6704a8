use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use log::info;

use approval_shared::auth::AuthContext;

use crate::error::Result;
use crate::handlers::AppState;
use crate::models::{
    AcknowledgeBody, AcknowledgeResponse, DashboardResponse, DeleteQuery, OwnerActionResponse,
    RequestApprovalBody,
};
use crate::owner_view::{ActionOutcome, OwnerView};
use crate::session::EditingSession;
use crate::signals::CollectedSignals;

fn action_response(
    view: &OwnerView,
    outcome: ActionOutcome,
    signals: &CollectedSignals,
) -> Json<OwnerActionResponse> {
    Json(OwnerActionResponse {
        outcome,
        dashboard: view.dashboard(),
        messages: signals.messages(),
    })
}

// GET /invitations/me - Owner dashboard with at most one notice
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<DashboardResponse>> {
    let signals = CollectedSignals::new();
    let view = state.owner_view(auth, &signals);

    let dashboard = view.refresh().await?;

    Ok(Json(DashboardResponse {
        dashboard,
        messages: signals.messages(),
    }))
}

// POST /invitations/me/notice/ack - Acknowledge the notice that was shown
pub async fn acknowledge_notice(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<AcknowledgeBody>,
) -> Result<Json<AcknowledgeResponse>> {
    let signals = CollectedSignals::new();
    let view = state.owner_view(auth, &signals);

    // Loaded for the ownership check only; no notice is re-selected
    view.refresh().await?;
    let cleared = view.acknowledge(&body.invitation_id, body.kind).await?;

    Ok(Json(AcknowledgeResponse { cleared }))
}

// POST /invitations/:slug/approval - Save the content and request approval
pub async fn request_approval(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(slug): Path<String>,
    Json(body): Json<RequestApprovalBody>,
) -> Result<Json<OwnerActionResponse>> {
    info!("Approval requested for slug {} by {}", slug, auth.user_id);
    let signals = CollectedSignals::new();
    let view = state.owner_view(auth, &signals);

    view.refresh().await?;
    let session = EditingSession::begin(&slug, body.content);
    let outcome = view.request_approval(&session).await?;

    Ok(action_response(&view, outcome, &signals))
}

// DELETE /invitations/:id/approval - Cancel a pending request
pub async fn cancel_request(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<OwnerActionResponse>> {
    let signals = CollectedSignals::new();
    let view = state.owner_view(auth, &signals);

    view.refresh().await?;
    let outcome = view.cancel(&id).await?;

    Ok(action_response(&view, outcome, &signals))
}

// POST /invitations/:id/draft - Back to draft after a rejection or revocation
pub async fn revert_to_draft(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
) -> Result<Json<OwnerActionResponse>> {
    let signals = CollectedSignals::new();
    let view = state.owner_view(auth, &signals);

    view.refresh().await?;
    let outcome = view.revert_to_draft(&id).await?;

    Ok(action_response(&view, outcome, &signals))
}

// DELETE /invitations/:id?confirm=true
pub async fn delete_invitation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<OwnerActionResponse>> {
    let signals = CollectedSignals::new();
    let view = state.owner_view(auth, &signals);

    view.refresh().await?;
    let outcome = view.delete(&id, query.confirm).await?;

    Ok(action_response(&view, outcome, &signals))
}
