use axum::{
    extract::Request,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use log::{info, warn};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use approval_shared::auth::auth_middleware;
use approval_shared::store::dynamo::{DynamoApprovalRequestStore, DynamoInvitationStore};
use approval_shared::store::memory::{MemoryApprovalRequestStore, MemoryInvitationStore};
use approval_shared::store::{ApprovalRequestStore, InvitationStore};

use crate::config::{ServiceConfig, StoreBackend};
use crate::events::{EventPublisher, NoopEventPublisher, SnsEventPublisher};
use crate::handlers::{
    admin_handlers::{approve, list_requests, reject, revoke, view_reason},
    owner_handlers::{
        acknowledge_notice, cancel_request, delete_invitation, get_dashboard, request_approval,
        revert_to_draft,
    },
    AppState,
};
use crate::workflow::WorkflowEngine;

/// Creates a router with the stores and publisher the config selects
pub async fn create_router(config: &ServiceConfig) -> Router {
    let (invitations, requests): (Arc<dyn InvitationStore>, Arc<dyn ApprovalRequestStore>) =
        match config.store_backend {
            StoreBackend::Dynamo => {
                info!("Creating router with DynamoDB stores");
                (
                    Arc::new(DynamoInvitationStore::new().await),
                    Arc::new(DynamoApprovalRequestStore::new().await),
                )
            }
            StoreBackend::Memory => {
                info!("Creating router with in-memory stores");
                (
                    Arc::new(MemoryInvitationStore::new()),
                    Arc::new(MemoryApprovalRequestStore::new()),
                )
            }
        };

    let events: Arc<dyn EventPublisher> = match &config.sns_topic_arn {
        Some(topic_arn) => Arc::new(SnsEventPublisher::new(topic_arn).await),
        None => {
            warn!("SNS_TOPIC_ARN not set, approval events will not be published");
            Arc::new(NoopEventPublisher)
        }
    };

    let engine = WorkflowEngine::new(invitations, requests, events);
    create_router_with_state(
        AppState::new(engine, config.moderation_page_size),
        &config.route_prefix,
    )
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Creates a router over the given state
pub fn create_router_with_state(state: AppState, prefix: &str) -> Router {
    info!("Setting up API routes with prefix: '{}'", prefix);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Logging middleware to trace all requests
    async fn logging_middleware(
        req: Request,
        next: axum::middleware::Next,
    ) -> impl axum::response::IntoResponse {
        info!(
            "Router received request: method={}, uri={}",
            req.method(),
            req.uri()
        );
        next.run(req).await
    }

    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/invitations/me", get(get_dashboard))
        .route("/invitations/me/notice/ack", post(acknowledge_notice))
        .route(
            "/invitations/:id/approval",
            post(request_approval).delete(cancel_request),
        )
        .route("/invitations/:id/draft", post(revert_to_draft))
        .route("/invitations/:id", delete(delete_invitation))
        .route("/admin/requests", get(list_requests))
        .route("/admin/requests/:id/reason", get(view_reason))
        .route("/admin/invitations/:id/approve", post(approve))
        .route("/admin/invitations/:id/reject", post(reject))
        .route("/admin/invitations/:id/revoke", post(revoke))
        .layer(middleware::from_fn(auth_middleware))
        .with_state(state);

    let router = if prefix.is_empty() {
        api_routes
            .layer(cors)
            .layer(middleware::from_fn(logging_middleware))
    } else {
        Router::new()
            .nest(prefix, api_routes)
            .layer(cors)
            .layer(middleware::from_fn(logging_middleware))
    };

    router.fallback(|req: Request| async move {
        warn!("No route matched for: {} {}", req.method(), req.uri());
        (
            axum::http::StatusCode::NOT_FOUND,
            "The requested resource was not found".to_string(),
        )
    })
}
