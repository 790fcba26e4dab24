//! Async HTTP client wrapping the Vigil JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;
use vigil_core::{
  incident::LiveIncident,
  report::{IncidentReport, IncidentType, Location, ReportStatus},
  user::User,
};

/// Every request gives up after this long.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for the Vigil API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub token:    Option<String>,
}

// ─── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Envelope<T> {
  success: bool,
  data:    Option<T>,
  error:   Option<String>,
  message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
  pub user:       User,
}

/// Body of `POST /reports`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDraft {
  pub incident_type:       IncidentType,
  pub description:         String,
  pub location:            Location,
  pub victim_name:         Option<String>,
  pub is_anonymous:        bool,
  pub reporting_for_self:  bool,
  pub assigned_teacher_id: Option<Uuid>,
  pub grade_section:       Option<String>,
}

/// Body of `PUT /reports/{id}/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
  pub status:         ReportStatus,
  pub notes:          Option<String>,
  pub decline_reason: Option<String>,
}

/// Body of `POST /incidents`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentDraft {
  pub incident_type: IncidentType,
  pub description:   String,
  pub location:      Location,
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// Async HTTP client for the Vigil JSON REST API.
///
/// Clones share the inner [`reqwest::Client`] connection pool.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(REQUEST_TIMEOUT)
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  pub fn with_token(&self, token: String) -> Self {
    Self {
      client: self.client.clone(),
      config: ApiConfig {
        base_url: self.config.base_url.clone(),
        token:    Some(token),
      },
    }
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/api{}",
      self.config.base_url.trim_end_matches('/'),
      path
    )
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    match &self.config.token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  /// Send `req` and unwrap the response envelope.
  async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<T> {
    let resp = self
      .auth(req)
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    let status = resp.status();
    let envelope: Envelope<T> = resp
      .json()
      .await
      .with_context(|| format!("{what} → {status}: unreadable body"))?;

    if !status.is_success() || !envelope.success {
      let reason = envelope
        .message
        .or(envelope.error)
        .unwrap_or_else(|| status.to_string());
      return Err(anyhow!("{what} → {status}: {reason}"));
    }
    envelope
      .data
      .ok_or_else(|| anyhow!("{what} → {status}: response carried no data"))
  }

  // ── Auth ──────────────────────────────────────────────────────────────────

  /// `POST /api/auth/login`
  pub async fn login(&self, identifier: &str, password: &str) -> Result<LoginResponse> {
    let body = serde_json::json!({ "identifier": identifier, "password": password });
    self
      .send(self.client.post(self.url("/auth/login")).json(&body), "POST /auth/login")
      .await
  }

  /// `GET /api/auth/me`
  pub async fn me(&self) -> Result<User> {
    self
      .send(self.client.get(self.url("/auth/me")), "GET /auth/me")
      .await
  }

  // ── Reports ───────────────────────────────────────────────────────────────

  /// `GET /api/reports`
  pub async fn list_reports(&self) -> Result<Vec<IncidentReport>> {
    self
      .send(self.client.get(self.url("/reports")), "GET /reports")
      .await
  }

  /// `POST /api/reports`
  pub async fn create_report(&self, draft: &ReportDraft) -> Result<IncidentReport> {
    self
      .send(self.client.post(self.url("/reports")).json(draft), "POST /reports")
      .await
  }

  /// `PUT /api/reports/{id}/status`
  pub async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<IncidentReport> {
    self
      .send(
        self
          .client
          .put(self.url(&format!("/reports/{id}/status")))
          .json(update),
        "PUT /reports/{id}/status",
      )
      .await
  }

  // ── Live incidents ────────────────────────────────────────────────────────

  /// `GET /api/incidents`
  pub async fn list_incidents(&self) -> Result<Vec<LiveIncident>> {
    self
      .send(self.client.get(self.url("/incidents")), "GET /incidents")
      .await
  }

  /// `POST /api/incidents`
  pub async fn create_incident(&self, draft: &IncidentDraft) -> Result<LiveIncident> {
    self
      .send(self.client.post(self.url("/incidents")).json(draft), "POST /incidents")
      .await
  }

  /// `POST /api/incidents/{id}/respond`
  pub async fn respond(&self, id: Uuid) -> Result<LiveIncident> {
    self
      .send(
        self.client.post(self.url(&format!("/incidents/{id}/respond"))),
        "POST /incidents/{id}/respond",
      )
      .await
  }

  /// `POST /api/incidents/{id}/resolve`
  pub async fn resolve(&self, id: Uuid) -> Result<LiveIncident> {
    self
      .send(
        self.client.post(self.url(&format!("/incidents/{id}/resolve"))),
        "POST /incidents/{id}/resolve",
      )
      .await
  }
}
