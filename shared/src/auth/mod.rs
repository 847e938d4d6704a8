use axum::{extract::Request, middleware::Next, response::Response};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

const DEFAULT_ADMIN_GROUP: &str = "admin";

// Cognito JWT claims used by the approval workflow
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    pub exp: usize,
    pub iat: usize,
    #[serde(rename = "cognito:groups", default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Profile snapshot of the signed-in user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "fullName")]
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

impl Profile {
    pub fn new(full_name: &str, phone: &str) -> Self {
        Self {
            full_name: Some(full_name.to_string()),
            phone: Some(phone.to_string()),
        }
    }

    fn filled(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// Name and phone, when both are present and non-blank
    pub fn contact(&self) -> Option<(&str, &str)> {
        Some((Self::filled(&self.full_name)?, Self::filled(&self.phone)?))
    }

    pub fn is_complete(&self) -> bool {
        self.contact().is_some()
    }
}

/// Verified identity handed to the approval workflow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: String,
    pub is_admin: bool,
    pub profile: Profile,
}

impl AuthContext {
    pub fn owner(user_id: &str, profile: Profile) -> Self {
        Self {
            user_id: user_id.to_string(),
            is_admin: false,
            profile,
        }
    }

    pub fn admin(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            is_admin: true,
            profile: Profile::default(),
        }
    }

    pub fn from_claims(claims: Claims, admin_group: &str) -> Self {
        let is_admin = claims.groups.iter().any(|g| g == admin_group);
        Self {
            user_id: claims.sub,
            is_admin,
            profile: Profile {
                full_name: claims.name,
                phone: claims.phone_number,
            },
        }
    }
}

pub fn admin_group() -> String {
    std::env::var("ADMIN_GROUP").unwrap_or_else(|_| DEFAULT_ADMIN_GROUP.to_string())
}

// JWT decoder without verification - the API Gateway authorizer has already validated the token
pub fn decode_jwt_payload(token: &str) -> Result<Claims> {
    debug!("Decoding JWT payload");

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        warn!("Invalid JWT format: expected 3 parts, got {}", parts.len());
        return Err(StoreError::AuthError("Invalid JWT format".into()));
    }

    let payload_data = URL_SAFE_NO_PAD.decode(parts[1]).map_err(|err| {
        warn!("Failed to base64 decode JWT payload: {:?}", err);
        StoreError::AuthError("Could not decode JWT payload".into())
    })?;

    serde_json::from_slice::<Claims>(&payload_data).map_err(|err| {
        warn!("Failed to parse JWT claims: {:?}", err);
        StoreError::AuthError("Could not parse JWT claims".into())
    })
}

fn unauthorized(message: &'static str) -> Response {
    let mut response = Response::new(axum::body::Body::from(message));
    *response.status_mut() = http::StatusCode::UNAUTHORIZED;
    response
}

// Auth middleware: resolves the bearer token into an AuthContext extension
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    // Allow health checks without authentication
    if request.uri().path().ends_with("/health") {
        return next.run(request).await;
    }

    let bearer_token = match request
        .headers()
        .get("authorization")
        .map(|header| header.to_str())
    {
        Some(Ok(token)) => token,
        Some(Err(err)) => {
            warn!("Invalid authorization header format: {:?}", err);
            return unauthorized("Invalid authorization header format");
        }
        None => {
            warn!("Missing authorization header in request");
            return unauthorized("Missing authorization header");
        }
    };

    let token = match bearer_token.strip_prefix("Bearer ") {
        Some(token) => token,
        None => {
            warn!("Authorization header doesn't start with 'Bearer '");
            return unauthorized("Invalid authorization format. Expected 'Bearer <token>'");
        }
    };

    let claims = match decode_jwt_payload(token) {
        Ok(claims) => claims,
        Err(_) => return unauthorized("Could not decode JWT payload"),
    };

    let auth = AuthContext::from_claims(claims, &admin_group());
    info!(
        "Authenticated user ID: {} (admin: {})",
        auth.user_id, auth.is_admin
    );

    request.extensions_mut().insert(auth);
    next.run(request).await
}

/// Mints an HS256 token carrying the given identity, for tests and local runs
pub fn create_jwt_token(user_id: &str, is_admin: bool, profile: &Profile) -> String {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or_default();

    let claims = Claims {
        sub: user_id.to_string(),
        iss: "https://cognito-idp.ap-northeast-2.amazonaws.com/local".to_string(),
        aud: "approval-service".to_string(),
        exp: now + 3600,
        iat: now.saturating_sub(100),
        groups: if is_admin {
            vec![admin_group()]
        } else {
            vec![]
        },
        name: profile.full_name.clone(),
        phone_number: profile.phone.clone(),
        email: None,
    };

    // Cognito signs with RS256; the payload is all the middleware reads
    let secret = "test_secret_key_for_jwt_encoding_in_tests";
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap_or_default()
}

/// Helper function to create a test request with authentication headers
pub fn create_test_request(
    method: &str,
    path: &str,
    auth: &AuthContext,
    body: Option<serde_json::Value>,
) -> http::Request<axum::body::Body> {
    let token = create_jwt_token(&auth.user_id, auth.is_admin, &auth.profile);
    let mut builder = http::Request::builder()
        .method(method)
        .uri(path)
        .header("authorization", format!("Bearer {}", token));

    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }

    let body = match body {
        Some(json_body) => axum::body::Body::from(json_body.to_string()),
        None => axum::body::Body::empty(),
    };
    builder
        .body(body)
        .unwrap_or_else(|_| http::Request::new(axum::body::Body::empty()))
}
