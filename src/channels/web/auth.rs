//! Bearer-token authentication for gateway routes.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::channels::web::error::ApiError;
use crate::error::AuthError;
use crate::identity::WalletAddress;
use crate::roles::Role;
use crate::service::AuthorityService;

/// Per-router auth state: the service and the role that router requires.
#[derive(Clone)]
pub struct AuthState {
    pub service: Arc<AuthorityService>,
    pub required: Role,
}

/// The caller resolved by `auth_middleware`, available as a request extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedWallet(pub WalletAddress);

/// The token from `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return ApiError::from(AuthError::InvalidToken).into_response();
    };

    match auth.service.check_authorization(&token, auth.required).await {
        Ok(wallet) => {
            request.extensions_mut().insert(AuthenticatedWallet(wallet));
            next.run(request).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}
