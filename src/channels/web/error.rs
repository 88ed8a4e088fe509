//! Error responses for the gateway.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::{Error, ErrorClass};

/// Wraps a service error so handlers can return it with `?`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

fn status_for(class: ErrorClass, code: &str) -> StatusCode {
    match class {
        ErrorClass::Input => match code {
            "input.conflict" => StatusCode::CONFLICT,
            "input.not_found" => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        },
        ErrorClass::Authentication => StatusCode::UNAUTHORIZED,
        ErrorClass::Authorization => StatusCode::FORBIDDEN,
        ErrorClass::ChainAvailability => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Consistency => StatusCode::CONFLICT,
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = self.0.to_error_payload();
        if payload.class == ErrorClass::Internal {
            tracing::error!(error = %self.0, "Request failed");
        }
        (status_for(payload.class, payload.code), Json(payload)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AuthError, ChainError, DatabaseError, PrivilegedError};

    fn status(err: impl Into<Error>) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn classes_map_to_statuses() {
        assert_eq!(status(AuthError::TokenExpired), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(AuthError::Forbidden {
                required: "root".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(ChainError::Unavailable("down".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(PrivilegedError::PreconditionNotMet("nope".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(status(Error::Conflict("dup".into())), StatusCode::CONFLICT);
        assert_eq!(status(Error::InvalidInput("bad".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(DatabaseError::NotFound {
                entity: "user".into(),
                id: "x".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(DatabaseError::Query("boom".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
