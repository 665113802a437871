//! Maps [`CoreError`] onto the wire status codes §6/§7 require.

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use statebackend_core::CoreError;
use thiserror::Error;

/// Wraps [`CoreError`] for the one extra HTTP-only case (request
/// authentication), and carries the mapping to a response.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            ServerError::Core(CoreError::StateDidNotExist) => StatusCode::NO_CONTENT.into_response(),
            ServerError::Core(CoreError::Locked { raw, parsed }) => {
                tracing::info!(holder = %parsed.id, "request rejected: state is locked");
                (StatusCode::CONFLICT, Bytes::from(raw)).into_response()
            }
            ServerError::Core(CoreError::LockMissing) => {
                StatusCode::PRECONDITION_REQUIRED.into_response()
            }
            ServerError::Core(CoreError::InvalidRequest(message)) => {
                (StatusCode::BAD_REQUEST, message).into_response()
            }
            ServerError::Core(CoreError::UnknownStorageType(name)) => {
                (StatusCode::BAD_REQUEST, format!("unknown storage type: {name}")).into_response()
            }
            ServerError::Core(CoreError::Unauthorized) => StatusCode::UNAUTHORIZED.into_response(),
            ServerError::Core(other) => {
                tracing::error!(error = %other, "internal error handling request");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
