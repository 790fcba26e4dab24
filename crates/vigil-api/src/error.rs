//! API error type, the response envelope, and their
//! [`axum::response::IntoResponse`] implementations.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

// ─── Envelope ─────────────────────────────────────────────────────────────────

/// Every response body: `{success, data?, error?, message?}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data:    Option<T>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
  Json(Envelope {
    success: true,
    data:    Some(data),
    error:   None,
    message: None,
  })
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
  (StatusCode::CREATED, ok(data))
}

/// A success with no payload, only a human-readable message.
pub fn done(message: impl Into<String>) -> Json<Envelope<()>> {
  Json(Envelope {
    success: true,
    data:    None,
    error:   None,
    message: Some(message.into()),
  })
}

// ─── ApiError ─────────────────────────────────────────────────────────────────

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unauthorized: {0}")]
  Unauthorized(String),

  #[error("forbidden: {0}")]
  Forbidden(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn internal<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Internal(Box::new(e))
  }

  pub fn unauthorized() -> Self { Self::Unauthorized("authentication required".into()) }

  pub fn forbidden() -> Self {
    Self::Forbidden("your role is not allowed to perform this action".into())
  }
}

impl From<vigil_core::Error> for ApiError {
  fn from(e: vigil_core::Error) -> Self {
    use vigil_core::Error as E;
    match e {
      E::Validation(m) => Self::BadRequest(m),
      E::Authentication => Self::unauthorized(),
      E::Authorization(m) => Self::Forbidden(m),
      e @ E::NotFound { .. } => Self::NotFound(e.to_string()),
      E::Conflict(m) => Self::Conflict(m),
      e @ (E::Store(_) | E::Serialization(_)) => Self::internal(e),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { Self::BadRequest(rejection.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, label, message) = match self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, "Validation failed", m),
      ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "Authentication failed", m),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, "Access denied", m),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, "Not found", m),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, "Conflict", m),
      ApiError::Internal(e) => {
        error!(error = %e, "request failed");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          "Internal server error",
          "something went wrong".to_owned(),
        )
      }
    };
    let body = Envelope::<()> {
      success: false,
      data:    None,
      error:   Some(label.to_owned()),
      message: Some(message),
    };
    (status, Json(body)).into_response()
  }
}
