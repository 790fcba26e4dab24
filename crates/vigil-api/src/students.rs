//! Handlers for `/students` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/students` | Sorted by name |
//! | `POST` | `/students` | admin, principal |
//! | `GET`  | `/students/{id}` | 404 if not found |
//! | `PUT`  | `/students/{id}` | admin, principal; partial update |

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use vigil_core::{
  store::SchoolStore,
  user::{NewStudent, StudentPatch, is_valid_email},
};

use crate::{
  AppState,
  auth::AuthUser,
  error::{ApiError, created, ok},
  extract::ApiPath,
};

/// `GET /students`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  _caller: AuthUser,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let students = state
    .store
    .list_students()
    .await
    .map_err(ApiError::internal)?;
  Ok(ok(students))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBody {
  pub student_number: Option<String>,
  pub full_name:      Option<String>,
  pub grade_level:    Option<String>,
  pub section:        Option<String>,
  pub email:          Option<String>,
}

impl CreateBody {
  fn validate(self) -> Result<NewStudent, ApiError> {
    fn present(value: Option<String>) -> Option<String> {
      value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
    }

    let student_number = present(self.student_number);
    let full_name = present(self.full_name);
    let grade_level = present(self.grade_level);
    let section = present(self.section);

    let (Some(student_number), Some(full_name), Some(grade_level), Some(section)) =
      (student_number.clone(), full_name.clone(), grade_level.clone(), section.clone())
    else {
      let missing: Vec<_> = [
        ("studentNumber", student_number.is_none()),
        ("fullName", full_name.is_none()),
        ("gradeLevel", grade_level.is_none()),
        ("section", section.is_none()),
      ]
      .into_iter()
      .filter_map(|(name, absent)| absent.then_some(name))
      .collect();
      return Err(ApiError::BadRequest(format!(
        "missing required fields: {}",
        missing.join(", ")
      )));
    };

    let email = present(self.email).map(|e| e.to_lowercase());
    check_email(email.as_deref())?;
    Ok(NewStudent {
      student_number,
      full_name,
      grade_level,
      section,
      email,
    })
  }
}

fn check_email(email: Option<&str>) -> Result<(), ApiError> {
  match email {
    Some(e) if !is_valid_email(e) => Err(ApiError::BadRequest("invalid email address".into())),
    _ => Ok(()),
  }
}

/// `POST /students`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  body: Result<Json<CreateBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  caller.require(caller.0.role.can_administer())?;
  let Json(body) = body?;
  let input = body.validate()?;

  let existing = state
    .store
    .list_students()
    .await
    .map_err(ApiError::internal)?;
  if existing
    .iter()
    .any(|s| s.student_number == input.student_number)
  {
    return Err(ApiError::Conflict(format!(
      "student number {} is already on the roster",
      input.student_number
    )));
  }

  let student = state
    .store
    .add_student(input)
    .await
    .map_err(ApiError::internal)?;
  Ok(created(student))
}

/// `GET /students/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  _caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let student = state
    .store
    .get_student(id)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| ApiError::NotFound(format!("student not found: {id}")))?;
  Ok(ok(student))
}

/// `PUT /students/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
  body: Result<Json<StudentPatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  caller.require(caller.0.role.can_administer())?;
  let Json(mut patch) = body?;
  patch.email = patch.email.map(|e| e.trim().to_lowercase());
  check_email(patch.email.as_deref())?;

  let student = state
    .store
    .update_student(id, patch)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| ApiError::NotFound(format!("student not found: {id}")))?;
  Ok(ok(student))
}
