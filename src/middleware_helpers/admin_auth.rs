use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

use crate::errors::ServiceError;

/// Shared secret expected in `Authorization: Bearer <token>` on admin routes.
/// `None` means admin access is not configured and every admin call is refused.
#[derive(Clone, Debug, Default)]
pub struct AdminToken(pub Option<Arc<str>>);

impl AdminToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()).map(Arc::from))
    }

    fn accepts(&self, presented: &str) -> bool {
        match &self.0 {
            Some(expected) => constant_time_eq(expected.as_bytes(), presented.as_bytes()),
            None => false,
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn require_admin_token(
    State(token): State<AdminToken>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(value) if token.accepts(value) => next.run(request).await,
        _ => {
            warn!(path = %request.uri().path(), "Rejected admin request");
            ServiceError::Unauthorized("Admin credentials required".to_string()).into_response()
        }
    }
}
