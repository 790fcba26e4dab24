//! Vigil HTTP server assembly.
//!
//! Wires the SQLite store, the real-time broadcaster and the REST API into a
//! single axum [`Router`]: the API under `/api`, the WebSocket at `/ws`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;
use vigil_api::{ApiConfig, AppState, api_router, auth::token_hash};
use vigil_core::{
  store::SchoolStore,
  user::{NewUser, UserLookup, UserRole},
};
use vigil_realtime::{
  Broadcaster,
  socket::{self, SessionVerifier},
};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `VIGIL__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:              String,
  #[serde(default = "default_port")]
  pub port:              u16,
  #[serde(default = "default_store_path")]
  pub store_path:        PathBuf,
  #[serde(default = "default_session_ttl_hours")]
  pub session_ttl_hours: i64,
  /// Per-connection queue depth for real-time events.
  #[serde(default = "default_realtime_buffer")]
  pub realtime_buffer:   usize,
  pub bootstrap_admin:   Option<BootstrapAdmin>,
}

/// An administrator account created at startup if no account with that email
/// exists yet.
#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapAdmin {
  pub email:         String,
  pub full_name:     String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

impl ServerConfig {
  /// Layer `VIGIL__*` environment variables over the TOML file at `path`.
  /// A missing file is not an error.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("VIGIL").separator("__"))
      .build()?
      .try_deserialize()
  }

  /// `store_path` with a leading `~/` expanded to `$HOME`.
  pub fn resolved_store_path(&self) -> PathBuf {
    let raw = self.store_path.to_string_lossy();
    match (raw.strip_prefix("~/"), std::env::var_os("HOME")) {
      (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
      _ => self.store_path.clone(),
    }
  }

  pub fn bind_address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 3000 }

fn default_store_path() -> PathBuf { PathBuf::from("vigil.db") }

fn default_session_ttl_hours() -> i64 { 24 }

fn default_realtime_buffer() -> usize { vigil_realtime::broadcaster::DEFAULT_BUFFER }

// ─── Assembly ─────────────────────────────────────────────────────────────────

/// Checks WebSocket upgrade tokens against the same session table the REST
/// API uses.
struct StoreSessions<S>(Arc<S>);

impl<S: SchoolStore + 'static> SessionVerifier for StoreSessions<S> {
  async fn verify(&self, token: &str) -> Option<Uuid> {
    match self.0.session_user(token_hash(token), Utc::now()).await {
      Ok(user) => user.map(|u| u.user_id),
      Err(e) => {
        warn!("session lookup failed during websocket upgrade: {e}");
        None
      }
    }
  }
}

/// Build the complete application router.
pub fn app<S>(store: Arc<S>, hub: Arc<Broadcaster>, config: &ServerConfig) -> Router
where
  S: SchoolStore + 'static,
{
  let sessions = Arc::new(StoreSessions(Arc::clone(&store)));
  let state = AppState::new(store, hub.clone(), ApiConfig {
    session_ttl_hours: config.session_ttl_hours,
  });

  Router::new()
    .nest("/api", api_router(state))
    .merge(socket::router(hub, sessions))
    .layer(TraceLayer::new_for_http())
}

/// Create the configured administrator unless the email is already taken.
/// Returns whether an account was created.
pub async fn ensure_bootstrap_admin<S: SchoolStore>(
  store: &S,
  admin: &BootstrapAdmin,
) -> Result<bool, S::Error> {
  let email = admin.email.trim().to_lowercase();
  if store
    .find_user(&UserLookup::ByEmail(email.clone()))
    .await?
    .is_some()
  {
    return Ok(false);
  }

  let user = store
    .add_user(NewUser {
      email,
      full_name: admin.full_name.clone(),
      role: UserRole::Admin,
      external_code: None,
      password_hash: admin.password_hash.clone(),
    })
    .await?;
  info!(user_id = %user.user_id, email = %user.email, "bootstrap admin created");
  Ok(true)
}
