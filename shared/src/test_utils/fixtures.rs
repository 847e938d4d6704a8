use serde_json::json;

use crate::auth::{AuthContext, Profile};
use crate::models::{now_str, ApprovalRequest, ApprovalStatus, Invitation, RequestStatus};

pub const OWNER_ID: &str = "owner-1";
pub const OTHER_OWNER_ID: &str = "owner-2";
pub const ADMIN_ID: &str = "moderator-1";

pub fn complete_profile() -> Profile {
    Profile::new("김민지", "010-1234-5678")
}

pub fn owner() -> AuthContext {
    AuthContext::owner(OWNER_ID, complete_profile())
}

pub fn owner_without_phone() -> AuthContext {
    AuthContext::owner(
        OWNER_ID,
        Profile {
            full_name: Some("김민지".into()),
            phone: None,
        },
    )
}

pub fn admin() -> AuthContext {
    AuthContext::admin(ADMIN_ID)
}

pub fn content(title: &str) -> serde_json::Value {
    json!({ "title": title, "blocks": [{ "type": "cover", "image": "cover.jpg" }] })
}

/// An invitation in the given state, with its flags cleared
pub fn invitation(id: &str, owner_id: &str, status: ApprovalStatus) -> Invitation {
    let now = now_str();
    Invitation {
        id: id.to_string(),
        owner_id: owner_id.to_string(),
        slug: format!("{}-slug", id),
        content: content(&format!("Wedding {}", id)),
        status,
        has_new_rejection: false,
        has_new_approval: false,
        created_at: now.clone(),
        updated_at: now,
    }
}

/// A request for `invitation` created at the given RFC 3339 instant
pub fn request(
    id: &str,
    invitation: &Invitation,
    status: RequestStatus,
    created_at: &str,
) -> ApprovalRequest {
    ApprovalRequest {
        id: id.to_string(),
        invitation_id: invitation.id.clone(),
        slug: invitation.slug.clone(),
        requester_user_id: invitation.owner_id.clone(),
        requester_name: "김민지".into(),
        requester_phone: "010-1234-5678".into(),
        status,
        is_revoked: false,
        reason: match status {
            RequestStatus::Rejected => Some("사진 누락".into()),
            _ => None,
        },
        created_at: created_at.to_string(),
        updated_at: created_at.to_string(),
    }
}

/// Deterministic, sortable timestamp for the n-th fixture row
pub fn at(n: u32) -> String {
    format!("2020-05-01T10:{:02}:{:02}.000000000Z", (n / 60) % 60, n % 60)
}
