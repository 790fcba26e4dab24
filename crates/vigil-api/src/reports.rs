//! Handlers for `/reports` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/reports` | `?status=&reporterId=&teacherId=&overdue=&limit=`; students only see their own |
//! | `POST`   | `/reports` | The caller is the reporter |
//! | `GET`    | `/reports/{id}` | Includes review history |
//! | `PUT`    | `/reports/{id}/status` | admin, principal, guidance |
//! | `POST`   | `/reports/{id}/notes` | staff |
//! | `DELETE` | `/reports/{id}` | admin, principal |

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use vigil_core::{
  report::{
    IncidentReport, IncidentType, Location, NewReport, ReportQuery, ReportStatus, Reporter,
    StatusChange, overdue_cutoff,
  },
  store::SchoolStore,
  user::UserRole,
};

use crate::{
  AppState,
  auth::AuthUser,
  error::{ApiError, created, done, ok},
  extract::{ApiPath, ApiQuery},
};

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  pub status:      Option<ReportStatus>,
  pub reporter_id: Option<Uuid>,
  pub teacher_id:  Option<Uuid>,
  /// Only pending reports older than the overdue threshold.
  #[serde(default)]
  pub overdue:     bool,
  pub limit:       Option<usize>,
}

/// `GET /reports`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiQuery(params): ApiQuery<ListParams>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let mut query = ReportQuery {
    status:              params.status,
    reporter_id:         params.reporter_id,
    assigned_teacher_id: params.teacher_id,
    created_before:      None,
    limit:               params.limit,
  };
  if params.overdue {
    query.status = Some(ReportStatus::UnderReview);
    query.created_before = Some(overdue_cutoff(Utc::now()));
  }
  if caller.0.role == UserRole::Student {
    query.reporter_id = Some(caller.0.user_id);
  }

  let reports = state.reports.list_reports(&query).await?;
  Ok(ok(reports))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  pub incident_type:       Option<IncidentType>,
  pub description:         Option<String>,
  pub location:            Option<Location>,
  pub victim_name:         Option<String>,
  pub incident_at:         Option<DateTime<Utc>>,
  #[serde(default)]
  pub is_anonymous:        bool,
  #[serde(default)]
  pub reporting_for_self:  bool,
  pub assigned_teacher_id: Option<Uuid>,
  pub grade_section:       Option<String>,
}

/// `POST /reports`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let Json(body) = body?;
  let incident_type = body
    .incident_type
    .ok_or_else(|| ApiError::BadRequest("missing required fields: incidentType".into()))?;

  let user = caller.0;
  let input = NewReport {
    reporter: Reporter {
      reporter_id:   user.user_id,
      name:          (!body.is_anonymous).then_some(user.full_name),
      grade_section: body.grade_section,
    },
    victim_name: body.victim_name,
    location: body.location.unwrap_or_default(),
    incident_type,
    description: body.description.unwrap_or_default(),
    incident_at: body.incident_at,
    is_anonymous: body.is_anonymous,
    reporting_for_self: body.reporting_for_self,
    assigned_teacher_id: body.assigned_teacher_id,
  };

  let report = state.reports.create_report(input).await?;
  Ok(created(report))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// Students may only look at reports they filed.
fn visible_to(report: &IncidentReport, caller: &AuthUser) -> bool {
  caller.0.role != UserRole::Student || report.reporter.reporter_id == caller.0.user_id
}

/// `GET /reports/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let report = state.reports.get_report(id).await?;
  caller.require(visible_to(&report, &caller))?;
  Ok(ok(report))
}

// ─── Review ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
  pub status:         Option<ReportStatus>,
  pub notes:          Option<String>,
  pub decline_reason: Option<String>,
}

/// `PUT /reports/{id}/status`
pub async fn update_status<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
  body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  caller.require(caller.0.role.can_review())?;
  let Json(body) = body?;
  let status = body
    .status
    .ok_or_else(|| ApiError::BadRequest("missing required fields: status".into()))?;

  let report = state
    .reports
    .update_status(id, StatusChange {
      status,
      reviewer_id: caller.0.user_id,
      reviewer_name: caller.0.full_name,
      notes: body.notes.filter(|n| !n.trim().is_empty()),
      decline_reason: body.decline_reason.filter(|r| !r.trim().is_empty()),
    })
    .await?;
  Ok(ok(report))
}

#[derive(Debug, Deserialize)]
pub struct NoteBody {
  pub notes: Option<String>,
}

/// `POST /reports/{id}/notes`
pub async fn add_note<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
  body: Result<Json<NoteBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  caller.require(caller.0.role.is_staff())?;
  let Json(body) = body?;
  let notes = body.notes.unwrap_or_default();
  let report = state
    .reports
    .add_review_note(id, caller.0.user_id, &caller.0.full_name, &notes)
    .await?;
  Ok(ok(report))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /reports/{id}`
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  caller.require(caller.0.role.can_administer())?;
  state.reports.delete_report(id).await?;
  Ok(done("report deleted"))
}
