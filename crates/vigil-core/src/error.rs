//! Error types for `vigil-core`.
//!
//! Services raise these; mapping them onto HTTP status codes is the job of
//! the API layer.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// Missing or malformed input.
  #[error("validation failed: {0}")]
  Validation(String),

  /// Missing, invalid or expired credentials.
  #[error("authentication required")]
  Authentication,

  /// The caller's role may not perform the operation.
  #[error("not permitted: {0}")]
  Authorization(String),

  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: Uuid },

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Wrap a backend error from a [`crate::store::SchoolStore`] implementation.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  pub fn report_not_found(id: Uuid) -> Self {
    Self::NotFound { entity: "report", id }
  }

  pub fn incident_not_found(id: Uuid) -> Self {
    Self::NotFound { entity: "incident", id }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
