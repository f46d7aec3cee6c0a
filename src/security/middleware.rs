use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Validation, decode};
use tracing::debug;

use super::claims::{UserClaims, UserContext};
use crate::AppState;
use crate::error::ChatError;

/// Verify the `Authorization: Bearer <token>` header.
///
/// With `security.jwt_required` off, requests without a token pass through;
/// a token that is present is still verified when a secret is configured.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ChatError> {
    let security = &state.config.security;

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    let Some(token) = token else {
        if security.jwt_required {
            return Err(ChatError::Auth("missing bearer credential".into()));
        }
        return Ok(next.run(request).await);
    };

    let Some(key) = state.decoding_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let claims = decode::<UserClaims>(token, key, &Validation::default())
        .map_err(|e| {
            debug!(error = %e, "Bearer token rejected");
            ChatError::Auth("invalid or expired credential".into())
        })?
        .claims;

    request.extensions_mut().insert(UserContext {
        user_id: claims.sub.clone(),
        claims,
    });
    Ok(next.run(request).await)
}
