//! Request extractors.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::services::{Caller, Role};
use crate::CommerceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The auth provider in front of this service verifies the session and
/// forwards the identity in headers. No user id means no session.
#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = CommerceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        caller_from_headers(&parts.headers).ok_or(CommerceError::Unauthenticated)
    }
}

fn caller_from_headers(headers: &HeaderMap) -> Option<Caller> {
    let user_id = headers.get(USER_ID_HEADER)?.to_str().ok()?.trim();
    if user_id.is_empty() { return None; }
    let role = match headers.get(USER_ROLE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(role) if role.trim().eq_ignore_ascii_case("admin") => Role::Admin,
        _ => Role::Customer,
    };
    Some(Caller { user_id: user_id.to_string(), role })
}

/// First hop of `x-forwarded-for`, if any.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers.get("x-forwarded-for")?.to_str().ok()?;
    forwarded.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()).map(str::to_string)
}
