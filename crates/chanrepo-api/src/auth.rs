//! # HTTP Basic Authentication
//!
//! Write routes take a [`RepoAdmin`] argument. The extractor compares the
//! request's Basic credentials with the configured operator credentials in
//! constant time.
//!
//! | Situation                                  | Response |
//! |--------------------------------------------|----------|
//! | Server has no credentials configured       | 500      |
//! | Header missing, malformed, or not matching | 401 + `WWW-Authenticate` |

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::state::{AppState, Credentials};

/// Proof that the request carried valid operator credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoAdmin;

/// Constant-time comparison of credential strings.
///
/// When lengths differ, performs a dummy comparison so the mismatch costs
/// roughly the same as a full comparison.
fn constant_time_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Check a username/password pair against the configured credentials.
///
/// Both halves are always compared so the response time does not reveal
/// which one was wrong.
pub fn verify(expected: &Credentials, username: &str, password: &str) -> bool {
    let user_ok = constant_time_eq(username, &expected.username);
    let pass_ok = constant_time_eq(password, &expected.password);
    user_ok & pass_ok
}

impl FromRequestParts<AppState> for RepoAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.credentials.as_ref() else {
            return Err(AppError::Internal(
                "server not configured correctly: REPO_USERNAME and REPO_PASSWORD are required".into(),
            ));
        };

        let TypedHeader(Authorization(basic)) =
            TypedHeader::<Authorization<Basic>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("basic credentials required".into()))?;

        if verify(expected, basic.username(), basic.password()) {
            Ok(RepoAdmin)
        } else {
            tracing::warn!(
                method = %parts.method,
                path = %parts.uri.path(),
                "rejected request with invalid credentials"
            );
            Err(AppError::Unauthorized("invalid credentials".into()))
        }
    }
}
