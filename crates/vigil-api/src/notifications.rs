//! Handlers for `/notifications` endpoints. Callers only ever see their own.

use axum::{
  extract::State,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::store::SchoolStore;

use crate::{
  AppState,
  auth::AuthUser,
  error::{ApiError, done, ok},
  extract::{ApiPath, ApiQuery},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
  #[serde(default)]
  pub unread_only: bool,
}

/// `GET /notifications[?unreadOnly=true]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiQuery(params): ApiQuery<ListParams>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let notifications = state
    .store
    .list_notifications(caller.0.user_id, params.unread_only)
    .await
    .map_err(ApiError::internal)?;
  Ok(ok(notifications))
}

/// `PUT /notifications/{id}/read`
pub async fn read_one<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let found = state
    .store
    .mark_notification_read(id, caller.0.user_id)
    .await
    .map_err(ApiError::internal)?;
  if !found {
    return Err(ApiError::NotFound(format!("notification not found: {id}")));
  }
  Ok(done("notification marked as read"))
}

#[derive(Debug, Serialize)]
pub struct ReadAll {
  pub updated: usize,
}

/// `PUT /notifications/read-all`
pub async fn read_all<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let updated = state
    .store
    .mark_all_read(caller.0.user_id)
    .await
    .map_err(ApiError::internal)?;
  Ok(ok(ReadAll { updated }))
}
