//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use kar_advisor::ConversationError;
use kar_core::{Classify, ErrorClass, ValidationErrors};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Rejected input, reported field by field.
  #[error("{message}")]
  Validation {
    message: String,
    fields:  ValidationErrors,
  },

  /// Unknown, expired or unfinished session. Clients restart from `/`.
  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("user identification required")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The advisory service failed. `round`/`question` say what to retry.
  #[error("{message}")]
  Upstream {
    message:  String,
    round:    Option<u32>,
    question: Option<String>,
  },

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  /// Map a store or core error onto a response by its [`ErrorClass`].
  pub fn classify<E>(e: E) -> Self
  where
    E: std::error::Error + Classify + Send + Sync + 'static,
  {
    match e.class() {
      ErrorClass::Validation => Self::Validation {
        message: e.to_string(),
        fields:  e.validation().cloned().unwrap_or_default(),
      },
      ErrorClass::NotFound => Self::NotFound(e.to_string()),
      ErrorClass::Integrity => Self::Conflict(e.to_string()),
      ErrorClass::Upstream => Self::Upstream {
        message:  e.to_string(),
        round:    None,
        question: None,
      },
      ErrorClass::Internal => Self::Internal(Box::new(e)),
    }
  }
}

impl From<ConversationError> for ApiError {
  fn from(e: ConversationError) -> Self {
    match e {
      ConversationError::Upstream { round, question, source } => Self::Upstream {
        message: format!("advisory service unavailable: {source}"),
        round: Some(round),
        question,
      },
      ConversationError::EmptyResponse => {
        let mut fields = ValidationErrors::default();
        fields.push("response", "must not be empty");
        Self::Validation { message: "response must not be empty".to_owned(), fields }
      }
      other @ (ConversationError::WrongRound { .. }
      | ConversationError::WrongState { .. }
      | ConversationError::InvalidTranscript(_)) => Self::BadRequest(other.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, body) = match &self {
      ApiError::Validation { message, fields } => (
        StatusCode::UNPROCESSABLE_ENTITY,
        json!({ "error": message, "fields": fields }),
      ),
      ApiError::NotFound(m) => {
        (StatusCode::NOT_FOUND, json!({ "error": m, "redirect": "/" }))
      }
      ApiError::Conflict(m) => (StatusCode::CONFLICT, json!({ "error": m })),
      ApiError::Unauthorized => {
        (StatusCode::UNAUTHORIZED, json!({ "error": self.to_string() }))
      }
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({ "error": m })),
      ApiError::Upstream { message, round, question } => (
        StatusCode::SERVICE_UNAVAILABLE,
        json!({
          "error": message,
          "retryable": true,
          "retry": { "round": round, "question": question },
        }),
      ),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          json!({ "error": "internal server error" }),
        )
      }
    };
    (status, Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  #[test]
  fn core_errors_map_by_class() {
    let id = Uuid::new_v4();
    assert!(matches!(
      ApiError::classify(kar_core::Error::SessionNotFound(id)),
      ApiError::NotFound(_)
    ));
    assert!(matches!(
      ApiError::classify(kar_core::Error::DataIntegrity("locked".into())),
      ApiError::Conflict(_)
    ));
    let ApiError::Validation { fields, .. } =
      ApiError::classify(kar_core::Error::UnsupportedFinancialYear("2019-20".into()))
    else {
      panic!("expected a validation error");
    };
    assert!(fields.is_empty());
  }

  #[test]
  fn statuses() {
    let cases = [
      (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
      (ApiError::Conflict("x".into()), StatusCode::CONFLICT),
      (ApiError::Unauthorized, StatusCode::UNAUTHORIZED),
      (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
      (ApiError::from(ConversationError::EmptyResponse), StatusCode::UNPROCESSABLE_ENTITY),
      (
        ApiError::from(ConversationError::WrongRound { expected: 2, got: 3 }),
        StatusCode::BAD_REQUEST,
      ),
    ];
    for (err, status) in cases {
      assert_eq!(err.into_response().status(), status);
    }
  }
}
