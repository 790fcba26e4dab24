//! Handlers for `/incidents` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/incidents` | Optional `?status=active\|responding\|resolved` |
//! | `POST`   | `/incidents` | The caller is the reporter |
//! | `GET`    | `/incidents/{id}` | |
//! | `POST`   | `/incidents/{id}/respond` | staff; 409 if already responding or resolved |
//! | `DELETE` | `/incidents/{id}/responders/{user_id}` | staff |
//! | `POST`   | `/incidents/{id}/resolve` | staff |

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use vigil_core::{
  incident::{IncidentStatus, NewIncident},
  report::{IncidentType, Location},
  store::SchoolStore,
};

use crate::{
  AppState,
  auth::AuthUser,
  error::{ApiError, created, ok},
  extract::{ApiPath, ApiQuery},
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<IncidentStatus>,
}

/// `GET /incidents[?status=<status>]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _caller: AuthUser,
  ApiQuery(params): ApiQuery<ListParams>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let incidents = state.incidents.list_incidents(params.status).await?;
  Ok(ok(incidents))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  pub incident_type: Option<IncidentType>,
  pub description:   Option<String>,
  pub location:      Option<Location>,
}

/// `POST /incidents`
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

  let incident = state
    .incidents
    .create_incident(NewIncident {
      reporter_id: caller.0.user_id,
      reporter_name: caller.0.full_name,
      location: body.location.unwrap_or_default(),
      incident_type,
      description: body.description.unwrap_or_default(),
    })
    .await?;
  Ok(created(incident))
}

/// `GET /incidents/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  _caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  Ok(ok(state.incidents.get_incident(id).await?))
}

/// `POST /incidents/{id}/respond`
pub async fn respond<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  caller.require(caller.0.role.is_staff())?;
  let user = caller.0;
  let incident = state
    .incidents
    .respond(id, user.user_id, &user.full_name, &user.role.to_string())
    .await?;
  Ok(ok(incident))
}

/// `DELETE /incidents/{id}/responders/{user_id}`
pub async fn remove_responder<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath((id, user_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  caller.require(caller.0.role.is_staff())?;
  Ok(ok(state.incidents.remove_responder(id, user_id).await?))
}

/// `POST /incidents/{id}/resolve`
pub async fn resolve<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  caller.require(caller.0.role.is_staff())?;
  let incident = state
    .incidents
    .resolve(id, caller.0.user_id, &caller.0.full_name)
    .await?;
  Ok(ok(incident))
}
