//! Bearer-token auth middleware: HS256 JWT verification against the
//! `"authenticated"` audience, with a dev-mode bypass when no secret is
//! configured (never allowed when `RENDER=true`, enforced at config load).

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::AppConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub aud: String,
    pub exp: usize,
}

/// Authenticated caller identity, injected into request extensions.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
}

const DEV_SUBJECT: &str = "dev-user";

pub async fn require_auth(
    State(config): State<Arc<AppConfig>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(secret) = &config.jwt_secret else {
        req.extensions_mut().insert(Principal {
            subject: DEV_SUBJECT.to_string(),
        });
        return Ok(next.run(req).await);
    };

    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| unauthorized("missing Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized("expected 'Bearer <token>'"))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated"]);

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| {
            tracing::warn!("JWT validation failed: {e}");
            unauthorized(&format!("invalid token: {e}"))
        })?;

    req.extensions_mut().insert(Principal {
        subject: token_data.claims.sub,
    });

    Ok(next.run(req).await)
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message })),
    )
        .into_response()
}
