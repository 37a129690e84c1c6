mod authorize;
mod cache;
mod identity;

pub use authorize::{ADMIN_PERMISSION, ScopeAuthorizer};
pub use cache::TtlCache;
pub use identity::{Identity, IdentityResolver, credential_fingerprint};

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;

/// Extracts the bearer credential from an Authorization header, if any.
#[must_use]
pub fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
