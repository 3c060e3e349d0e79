// src/utils/jwt.rs

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{error::AppError, models::role::Permissions, state::AppState};

/// JWT Claims structure.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - Stores the User ID (as string).
    pub sub: String,
    pub username: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

/// The authenticated caller, attached to every request behind `auth_middleware`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub user_id: i32,
    pub username: String,
    pub permissions: Permissions,
}

impl Session {
    pub fn has(&self, required: Permissions) -> bool {
        self.permissions.contains(required)
    }
}

impl Claims {
    pub fn user_id(&self) -> Result<i32, AppError> {
        self.sub
            .parse::<i32>()
            .map_err(|_| AppError::AuthError("Invalid token subject".to_string()))
    }
}

/// Signs a new JWT for the user.
pub fn sign_jwt(
    id: i32,
    username: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    // Calculate expiration: current time + expiration_seconds
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: id.to_string(),
        username: username.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
///
/// Returns the `Claims` if valid, otherwise returns an `AppError`.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header, then loads the
/// caller's current account and permissions and injects them as a typed
/// `Session`. Returns 401 for a bad token or a deleted user.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::AuthError("Missing bearer token".to_string()))?;

    let user_id = verify_jwt(token, &state.config.jwt_secret)?.user_id()?;

    let session = state
        .sessions
        .find_session(user_id)
        .await?
        .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;
    req.extensions_mut().insert(session);

    Ok(next.run(req).await)
}

/// Axum Middleware: Permission check.
///
/// Must be layered inside `auth_middleware`; the required bits are the middleware state.
pub async fn require_permission(
    State(required): State<Permissions>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let session = req
        .extensions()
        .get::<Session>()
        .ok_or_else(|| AppError::AuthError("Not authenticated".to_string()))?;

    if !session.has(required) {
        tracing::warn!(
            "User {} lacks permission bits {:#b}",
            session.user_id,
            required.bits()
        );
        return Err(AppError::Forbidden("Insufficient permissions".to_string()));
    }

    Ok(next.run(req).await)
}
