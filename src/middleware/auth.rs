use axum::extract::{FromRef, FromRequestParts};
use axum::http::{HeaderMap, request::Parts};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use headers::Authorization;
use headers::authorization::Bearer;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::ConsoleError;

/// The configured admin key, shared through router state.
#[derive(Debug, Clone)]
pub struct AdminKey(pub Arc<str>);

fn matches(expected: &str, presented: &str) -> bool {
    bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}

/// Key candidates in order: `Authorization: Bearer`, `x-admin-key`, `?key=`.
fn presented_keys(bearer: Option<&str>, headers: &HeaderMap, query: Option<&str>) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(token) = bearer {
        keys.push(token.to_string());
    }
    if let Some(value) = headers.get("x-admin-key").and_then(|v| v.to_str().ok()) {
        keys.push(value.trim().to_string());
    }
    if let Some(qs) = query {
        keys.extend(
            url::form_urlencoded::parse(qs.as_bytes())
                .filter(|(k, _)| k == "key")
                .map(|(_, v)| v.into_owned()),
        );
    }
    keys
}

/// Rejects the request with `401` unless it carries the admin key.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdminKey;

impl<S> FromRequestParts<S> for RequireAdminKey
where
    AdminKey: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AdminKey(expected) = AdminKey::from_ref(state);
        let bearer = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok();
        let keys = presented_keys(
            bearer.as_ref().map(|TypedHeader(auth)| auth.token()),
            &parts.headers,
            parts.uri.query(),
        );

        if keys.iter().any(|k| matches(&expected, k)) {
            Ok(Self)
        } else {
            debug!(path = %parts.uri.path(), "rejected request without a valid admin key");
            Err(ConsoleError::Unauthorized.into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn keys_are_collected_from_all_places() {
        let mut headers = HeaderMap::new();
        headers.insert("x-admin-key", HeaderValue::from_static(" hdr "));
        let keys = presented_keys(Some("bearer"), &headers, Some("a=1&key=q%20k"));
        assert_eq!(keys, vec!["bearer", "hdr", "q k"]);
    }

    #[test]
    fn comparison_is_exact() {
        assert!(matches("secret", "secret"));
        assert!(!matches("secret", "secret "));
        assert!(!matches("secret", ""));
    }
}
