//! Session guard for protected routes.
//!
//! Requests must carry `Authorization: Bearer <access token>` and
//! `X-Salesforce-Instance: <host or URL>`. The guard turns them into a
//! [`SessionContext`] request extension; anything else is answered with 401.

use axum::extract::Request;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use secrecy::SecretString;
use tracing::debug;

use crate::error::AppError;
use crate::salesforce::SessionContext;

pub const INSTANCE_HEADER: &str = "x-salesforce-instance";

/// Builds the session from request headers.
pub fn session_from_headers(headers: &HeaderMap) -> Result<SessionContext, AppError> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty())
        .ok_or(AppError::NotAuthenticated)?;

    let instance = headers
        .get(INSTANCE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::NotAuthenticated)?;

    // Any malformed identity is reported as unauthenticated.
    SessionContext::new(SecretString::from(token.to_string()), instance)
        .map_err(|_| AppError::NotAuthenticated)
}

pub async fn require_session(mut request: Request, next: Next) -> Response {
    match session_from_headers(request.headers()) {
        Ok(session) => {
            debug!("[SERVER] Session for {}", session.host());
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: Option<&str>, instance: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(a) = auth {
            map.insert(AUTHORIZATION, HeaderValue::from_str(a).unwrap());
        }
        if let Some(i) = instance {
            map.insert(INSTANCE_HEADER, HeaderValue::from_str(i).unwrap());
        }
        map
    }

    #[test]
    fn accepts_bearer_and_instance() {
        let session =
            session_from_headers(&headers(Some("Bearer 00Dxx!tok"), Some("na1.salesforce.com")))
                .unwrap();
        assert_eq!(session.host(), "na1.salesforce.com");
    }

    #[test]
    fn scheme_is_case_insensitive() {
        assert!(
            session_from_headers(&headers(Some("bearer tok"), Some("na1.salesforce.com"))).is_ok()
        );
    }

    #[test]
    fn rejects_missing_or_malformed_identity() {
        let cases = [
            headers(None, Some("na1.salesforce.com")),
            headers(Some("Bearer tok"), None),
            headers(Some("Basic dXNlcjpwdw=="), Some("na1.salesforce.com")),
            headers(Some("Bearer "), Some("na1.salesforce.com")),
            headers(Some("Bearer tok"), Some("ftp://na1.salesforce.com")),
        ];
        for map in cases {
            assert!(matches!(
                session_from_headers(&map),
                Err(AppError::NotAuthenticated)
            ));
        }
    }
}
