//! HTTP error mapping for the lifecycle API.
//!
//! Every engine error becomes a structured JSON body with a stable `kind`
//! so API clients can branch without parsing messages. Guard failures carry
//! the full list of blocking reasons.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use flowd::engine::TransitionError;

#[derive(Debug, thiserror::Error)]
pub enum WebError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("missing required header: {header}")]
    Unauthorized { header: &'static str },
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("internal error: {message}")]
    Internal { message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_reasons: Option<Vec<String>>,
}

impl WebError {
    fn status(&self) -> StatusCode {
        match self {
            WebError::Transition(err) => match err {
                TransitionError::JobNotFound { .. } => StatusCode::NOT_FOUND,
                TransitionError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                TransitionError::GuardFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                TransitionError::ConcurrentModification { .. } => StatusCode::CONFLICT,
                TransitionError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
                TransitionError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            WebError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            WebError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            WebError::Internal { .. } | WebError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            WebError::Transition(err) => match err {
                TransitionError::JobNotFound { .. } => "job_not_found",
                TransitionError::InvalidTransition { .. } => "invalid_transition",
                TransitionError::GuardFailed { .. } => "guard_failed",
                TransitionError::ConcurrentModification { .. } => "concurrent_modification",
                TransitionError::InvalidRequest { .. } => "invalid_request",
                TransitionError::Store { .. } => "internal",
            },
            WebError::Unauthorized { .. } => "unauthorized",
            WebError::BadRequest { .. } => "bad_request",
            WebError::Internal { .. } | WebError::Io(_) => "internal",
        }
    }

    fn blocked_reasons(&self) -> Option<Vec<String>> {
        match self {
            WebError::Transition(TransitionError::GuardFailed { reasons }) => {
                Some(reasons.clone())
            }
            _ => None,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
            blocked_reasons: self.blocked_reasons(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_core::state::JobState;

    #[test]
    fn guard_failed_maps_to_unprocessable_with_reasons() {
        let err = WebError::from(TransitionError::GuardFailed {
            reasons: vec!["Crew not assigned".to_string()],
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.kind(), "guard_failed");
        assert_eq!(
            err.blocked_reasons(),
            Some(vec!["Crew not assigned".to_string()])
        );
    }

    #[test]
    fn concurrency_conflict_maps_to_409() {
        let err = WebError::from(TransitionError::ConcurrentModification {
            expected: 3,
            actual: 4,
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "concurrent_modification");
        assert_eq!(err.blocked_reasons(), None);
    }

    #[test]
    fn invalid_transition_maps_to_unprocessable() {
        let err = WebError::from(TransitionError::InvalidTransition {
            from: JobState::Pending,
            to: JobState::Paid,
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[test]
    fn missing_actor_header_maps_to_401() {
        let err = WebError::Unauthorized {
            header: "x-actor-id",
        };
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.kind(), "unauthorized");
    }
}
