//! JSON REST API for Vigil.
//!
//! Exposes an axum [`Router`] backed by any [`vigil_core::store::SchoolStore`].
//! Writes to reports and live incidents go through the core services so
//! notifications and real-time events are produced in one place.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", vigil_api::api_router(state))
//! ```

pub mod auth;
pub mod error;
pub mod extract;
pub mod incidents;
pub mod notifications;
pub mod reports;
pub mod students;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use vigil_core::{
  alerts::IncidentService, event::EventSink, lifecycle::ReportService, store::SchoolStore,
};

pub use auth::AuthUser;
pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ApiConfig {
  /// Lifetime of a bearer token issued by login or register.
  pub session_ttl_hours: i64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      session_ttl_hours: 24,
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:     Arc<S>,
  pub reports:   ReportService<S>,
  pub incidents: IncidentService<S>,
  pub config:    Arc<ApiConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      reports:   self.reports.clone(),
      incidents: self.incidents.clone(),
      config:    Arc::clone(&self.config),
    }
  }
}

impl<S: SchoolStore> AppState<S> {
  pub fn new(store: Arc<S>, events: Arc<dyn EventSink>, config: ApiConfig) -> Self {
    Self {
      reports: ReportService::new(Arc::clone(&store), Arc::clone(&events)),
      incidents: IncidentService::new(Arc::clone(&store), events),
      store,
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: SchoolStore + 'static,
{
  Router::new()
    // Auth
    .route("/auth/login", post(auth::login::<S>))
    .route("/auth/register", post(auth::register::<S>))
    .route("/auth/me", get(auth::me::<S>))
    .route("/auth/staff/{id}/password", put(auth::staff_password::<S>))
    .route("/auth/students/{id}/password", put(auth::student_password::<S>))
    .route("/auth/staff/{id}/email", put(auth::staff_email::<S>))
    .route("/auth/students/{id}/email", put(auth::student_email::<S>))
    .route("/auth/{user_id}", delete(auth::delete_account::<S>))
    // Reports
    .route("/reports", get(reports::list::<S>).post(reports::create::<S>))
    .route("/reports/{id}", get(reports::get_one::<S>).delete(reports::delete_one::<S>))
    .route("/reports/{id}/status", put(reports::update_status::<S>))
    .route("/reports/{id}/notes", post(reports::add_note::<S>))
    // Live incidents
    .route("/incidents", get(incidents::list::<S>).post(incidents::create::<S>))
    .route("/incidents/{id}", get(incidents::get_one::<S>))
    .route("/incidents/{id}/respond", post(incidents::respond::<S>))
    .route(
      "/incidents/{id}/responders/{user_id}",
      delete(incidents::remove_responder::<S>),
    )
    .route("/incidents/{id}/resolve", post(incidents::resolve::<S>))
    // Notifications
    .route("/notifications", get(notifications::list::<S>))
    .route("/notifications/read-all", put(notifications::read_all::<S>))
    .route("/notifications/{id}/read", put(notifications::read_one::<S>))
    // Students
    .route("/students", get(students::list::<S>).post(students::create::<S>))
    .route("/students/{id}", get(students::get_one::<S>).put(students::update::<S>))
    .with_state(state)
}

#[cfg(test)]
pub(crate) mod testing {
  //! Shared fixtures for handler tests.

  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::Value;
  use tower::ServiceExt as _;
  use vigil_core::{
    event::RecordingSink,
    store::SchoolStore,
    user::{NewUser, User, UserRole},
  };
  use vigil_store_sqlite::SqliteStore;

  use crate::{ApiConfig, AppState, api_router, auth};

  pub struct Harness {
    pub state:  AppState<SqliteStore>,
    pub events: Arc<RecordingSink>,
  }

  pub async fn harness() -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let events = Arc::new(RecordingSink::default());
    let state = AppState::new(store, events.clone(), ApiConfig::default());
    Harness { state, events }
  }

  impl Harness {
    /// Create an account directly in the store and return it with a live
    /// bearer token.
    pub async fn user(&self, email: &str, role: UserRole) -> (User, String) {
      let user = self
        .state
        .store
        .add_user(NewUser {
          email:         email.into(),
          full_name:     format!("{role} {email}"),
          role,
          external_code: None,
          password_hash: auth::hash_password("correct horse").unwrap(),
        })
        .await
        .unwrap();
      let session = auth::issue_session(&self.state, &user).await.unwrap();
      (user, session.token)
    }

    pub async fn call(
      &self,
      method: &str,
      uri: &str,
      token: Option<&str>,
      body: Option<Value>,
    ) -> (StatusCode, Value) {
      let mut builder = Request::builder().method(method).uri(uri);
      if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
      }
      let body = match body {
        Some(json) => {
          builder = builder.header(header::CONTENT_TYPE, "application/json");
          Body::from(json.to_string())
        }
        None => Body::empty(),
      };
      let resp = api_router(self.state.clone())
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
      let status = resp.status();
      let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
      let json = if bytes.is_empty() {
        Value::Null
      } else {
        serde_json::from_slice(&bytes).unwrap()
      };
      (status, json)
    }
  }
}
