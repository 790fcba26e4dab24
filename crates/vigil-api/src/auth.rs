//! Bearer-token sessions, the [`AuthUser`] extractor, and the `/auth`
//! handlers.
//!
//! | Method   | Path                              | Notes |
//! |----------|-----------------------------------|-------|
//! | `POST`   | `/auth/login`                     | `{identifier, password}`; identifier is an email, student or employee number |
//! | `POST`   | `/auth/register`                  | Non-student roles need an admin or principal token |
//! | `GET`    | `/auth/me`                        | |
//! | `PUT`    | `/auth/{staff,students}/{id}/password` | Self (with current password) or admin |
//! | `PUT`    | `/auth/{staff,students}/{id}/email`    | Self or admin |
//! | `DELETE` | `/auth/{user_id}`                 | Self or admin |

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
  Json,
  extract::{FromRequestParts, State, rejection::JsonRejection},
  http::{HeaderMap, header, request::Parts},
  response::IntoResponse,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use tracing::info;
use uuid::Uuid;
use vigil_core::{
  store::SchoolStore,
  user::{NewUser, User, UserLookup, UserRole, is_valid_email},
};

use crate::{
  AppState,
  error::{ApiError, created, done, ok},
  extract::ApiPath,
};

pub const MIN_PASSWORD_LEN: usize = 8;

// ─── Passwords ────────────────────────────────────────────────────────────────

/// Produce an argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(|e| ApiError::Internal(format!("argon2 error: {e}").into()))
}

pub fn verify_password(password: &str, phc: &str) -> bool {
  let Ok(parsed) = PasswordHash::new(phc) else {
    return false;
  };
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .is_ok()
}

fn check_new_password(password: Option<&str>) -> Result<&str, ApiError> {
  let password = password
    .filter(|p| !p.is_empty())
    .ok_or_else(|| ApiError::BadRequest("missing required fields: password".into()))?;
  if password.chars().count() < MIN_PASSWORD_LEN {
    return Err(ApiError::BadRequest(format!(
      "password must be at least {MIN_PASSWORD_LEN} characters"
    )));
  }
  Ok(password)
}

// ─── Sessions ─────────────────────────────────────────────────────────────────

/// A freshly issued bearer token. Only its SHA-256 is persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
}

fn new_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  URL_SAFE_NO_PAD.encode(bytes)
}

pub fn token_hash(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }

pub async fn issue_session<S: SchoolStore>(
  state: &AppState<S>,
  user: &User,
) -> Result<Session, ApiError> {
  let token = new_token();
  let expires_at = Utc::now() + Duration::hours(state.config.session_ttl_hours);
  state
    .store
    .create_session(token_hash(&token), user.user_id, expires_at)
    .await
    .map_err(ApiError::internal)?;
  Ok(Session { token, expires_at })
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

/// Resolve the bearer token in `headers` to its user.
pub async fn authenticate<S: SchoolStore>(
  headers: &HeaderMap,
  state: &AppState<S>,
) -> Result<User, ApiError> {
  let token = bearer_token(headers).ok_or_else(ApiError::unauthorized)?;
  state
    .store
    .session_user(token_hash(token), Utc::now())
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(|| ApiError::Unauthorized("invalid or expired token".into()))
}

/// The signed-in caller. Present in a handler means the request carried a
/// live session token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S> FromRequestParts<AppState<S>> for AuthUser
where
  S: SchoolStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    authenticate(&parts.headers, state).await.map(AuthUser)
  }
}

impl AuthUser {
  pub fn require(&self, allowed: bool) -> Result<(), ApiError> {
    if allowed { Ok(()) } else { Err(ApiError::forbidden()) }
  }

  /// Callers may act on their own account; admins and principals on any.
  pub fn require_self_or_admin(&self, user_id: Uuid) -> Result<(), ApiError> {
    self.require(self.0.user_id == user_id || self.0.role.can_administer())
  }
}

// ─── Login / register ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
  pub user:       User,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
  pub identifier: Option<String>,
  /// Accepted as an alias for `identifier`.
  pub email:      Option<String>,
  pub password:   Option<String>,
}

/// `POST /auth/login`
pub async fn login<S>(
  State(state): State<AppState<S>>,
  body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let Json(body) = body?;
  let identifier = body
    .identifier
    .or(body.email)
    .filter(|s| !s.trim().is_empty());
  let (Some(identifier), Some(password)) = (identifier, body.password) else {
    return Err(ApiError::BadRequest(
      "missing required fields: identifier, password".into(),
    ));
  };

  let invalid = || ApiError::Unauthorized("invalid credentials".into());
  let user = state
    .store
    .find_user(&UserLookup::from_identifier(&identifier))
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(invalid)?;
  let phc = state
    .store
    .password_hash(user.user_id)
    .await
    .map_err(ApiError::internal)?
    .ok_or_else(invalid)?;
  if !verify_password(&password, &phc) {
    return Err(invalid());
  }

  let session = issue_session(&state, &user).await?;
  info!(user_id = %user.user_id, role = %user.role, "signed in");
  Ok(ok(SessionResponse {
    token: session.token,
    expires_at: session.expires_at,
    user,
  }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
  pub email:         Option<String>,
  pub password:      Option<String>,
  pub full_name:     Option<String>,
  pub role:          Option<UserRole>,
  pub external_code: Option<String>,
}

/// `POST /auth/register`
pub async fn register<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
  body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let Json(body) = body?;

  let mut missing = Vec::new();
  let email = body.email.map(|e| e.trim().to_lowercase()).unwrap_or_default();
  let full_name = body.full_name.map(|n| n.trim().to_owned()).unwrap_or_default();
  if email.is_empty() {
    missing.push("email");
  }
  if full_name.is_empty() {
    missing.push("fullName");
  }
  if body.password.as_deref().is_none_or(str::is_empty) {
    missing.push("password");
  }
  if !missing.is_empty() {
    return Err(ApiError::BadRequest(format!(
      "missing required fields: {}",
      missing.join(", ")
    )));
  }
  if !is_valid_email(&email) {
    return Err(ApiError::BadRequest("invalid email address".into()));
  }
  let password = check_new_password(body.password.as_deref())?;

  let role = body.role.unwrap_or(UserRole::Student);
  if role != UserRole::Student {
    let caller = authenticate(&headers, &state).await?;
    if !caller.role.can_administer() {
      return Err(ApiError::forbidden());
    }
  }

  let email_taken = state
    .store
    .find_user(&UserLookup::ByEmail(email.clone()))
    .await
    .map_err(ApiError::internal)?
    .is_some();
  if email_taken {
    return Err(ApiError::Conflict(format!("email {email} is already registered")));
  }
  let external_code = body
    .external_code
    .map(|c| c.trim().to_owned())
    .filter(|c| !c.is_empty());
  if let Some(code) = &external_code {
    let code_taken = state
      .store
      .find_user(&UserLookup::ByExternalCode(code.clone()))
      .await
      .map_err(ApiError::internal)?
      .is_some();
    if code_taken {
      return Err(ApiError::Conflict(format!("{code} is already registered")));
    }
  }

  let user = state
    .store
    .add_user(NewUser {
      email,
      full_name,
      role,
      external_code,
      password_hash: hash_password(password)?,
    })
    .await
    .map_err(ApiError::internal)?;

  let session = issue_session(&state, &user).await?;
  info!(user_id = %user.user_id, role = %user.role, "account registered");
  Ok(created(SessionResponse {
    token: session.token,
    expires_at: session.expires_at,
    user,
  }))
}

/// `GET /auth/me`
pub async fn me<S>(caller: AuthUser) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  Ok(ok(caller.0))
}

// ─── Account maintenance ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountKind {
  Staff,
  Student,
}

/// Load the account at `id`, checking the caller may touch it and that it is
/// of the kind the route names.
async fn target_account<S: SchoolStore>(
  state: &AppState<S>,
  caller: &AuthUser,
  id: Uuid,
  kind: AccountKind,
) -> Result<User, ApiError> {
  caller.require_self_or_admin(id)?;
  let user = state
    .store
    .find_user(&UserLookup::ById(id))
    .await
    .map_err(ApiError::internal)?
    .filter(|u| (u.role == UserRole::Student) == (kind == AccountKind::Student))
    .ok_or_else(|| ApiError::NotFound(format!("account not found: {id}")))?;
  Ok(user)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordBody {
  pub current_password: Option<String>,
  pub new_password:     Option<String>,
}

async fn change_password<S: SchoolStore>(
  state: AppState<S>,
  caller: AuthUser,
  id: Uuid,
  kind: AccountKind,
  body: PasswordBody,
) -> Result<Json<crate::error::Envelope<()>>, ApiError> {
  let target = target_account(&state, &caller, id, kind).await?;
  let new_password = check_new_password(body.new_password.as_deref())?;

  // Changing your own password needs the current one, even for admins.
  if caller.0.user_id == target.user_id {
    let current = body
      .current_password
      .ok_or_else(|| ApiError::BadRequest("missing required fields: currentPassword".into()))?;
    let phc = state
      .store
      .password_hash(target.user_id)
      .await
      .map_err(ApiError::internal)?
      .unwrap_or_default();
    if !verify_password(&current, &phc) {
      return Err(ApiError::Unauthorized("current password is incorrect".into()));
    }
  }

  state
    .store
    .set_password_hash(target.user_id, hash_password(new_password)?)
    .await
    .map_err(ApiError::internal)?;
  info!(user_id = %target.user_id, by = %caller.0.user_id, "password changed");
  Ok(done("password updated"))
}

/// `PUT /auth/staff/{id}/password`
pub async fn staff_password<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
  body: Result<Json<PasswordBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let Json(body) = body?;
  change_password(state, caller, id, AccountKind::Staff, body).await
}

/// `PUT /auth/students/{id}/password`
pub async fn student_password<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
  body: Result<Json<PasswordBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let Json(body) = body?;
  change_password(state, caller, id, AccountKind::Student, body).await
}

#[derive(Debug, Deserialize)]
pub struct EmailBody {
  pub email: Option<String>,
}

async fn change_email<S: SchoolStore>(
  state: AppState<S>,
  caller: AuthUser,
  id: Uuid,
  kind: AccountKind,
  body: EmailBody,
) -> Result<Json<crate::error::Envelope<User>>, ApiError> {
  let target = target_account(&state, &caller, id, kind).await?;
  let email = body
    .email
    .map(|e| e.trim().to_lowercase())
    .filter(|e| !e.is_empty())
    .ok_or_else(|| ApiError::BadRequest("missing required fields: email".into()))?;
  if !is_valid_email(&email) {
    return Err(ApiError::BadRequest("invalid email address".into()));
  }

  let holder = state
    .store
    .find_user(&UserLookup::ByEmail(email.clone()))
    .await
    .map_err(ApiError::internal)?;
  if holder.is_some_and(|u| u.user_id != target.user_id) {
    return Err(ApiError::Conflict(format!("email {email} is already registered")));
  }

  state
    .store
    .set_email(target.user_id, email.clone())
    .await
    .map_err(ApiError::internal)?;
  info!(user_id = %target.user_id, by = %caller.0.user_id, "email changed");
  Ok(ok(User { email, ..target }))
}

/// `PUT /auth/staff/{id}/email`
pub async fn staff_email<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
  body: Result<Json<EmailBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let Json(body) = body?;
  change_email(state, caller, id, AccountKind::Staff, body).await
}

/// `PUT /auth/students/{id}/email`
pub async fn student_email<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(id): ApiPath<Uuid>,
  body: Result<Json<EmailBody>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  let Json(body) = body?;
  change_email(state, caller, id, AccountKind::Student, body).await
}

/// `DELETE /auth/{user_id}`
pub async fn delete_account<S>(
  State(state): State<AppState<S>>,
  caller: AuthUser,
  ApiPath(user_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SchoolStore + 'static,
{
  caller.require_self_or_admin(user_id)?;
  let deleted = state
    .store
    .delete_user(user_id)
    .await
    .map_err(ApiError::internal)?;
  if !deleted {
    return Err(ApiError::NotFound(format!("account not found: {user_id}")));
  }
  info!(%user_id, by = %caller.0.user_id, "account deleted");
  Ok(done("account deleted"))
}

#[cfg(test)]
mod tests {
  use axum::http::StatusCode;
  use serde_json::json;

  use super::*;
  use crate::testing::harness;

  #[test]
  fn token_hash_is_stable_hex() {
    let token = new_token();
    assert_eq!(token_hash(&token), token_hash(&token));
    assert_eq!(token_hash(&token).len(), 64);
    assert_ne!(new_token(), token);
  }

  #[test]
  fn password_round_trip() {
    let phc = hash_password("correct horse").unwrap();
    assert!(verify_password("correct horse", &phc));
    assert!(!verify_password("wrong", &phc));
    assert!(!verify_password("anything", "not-a-phc-string"));
  }

  #[tokio::test]
  async fn register_then_login_by_email_and_code() {
    let h = harness().await;
    let (status, body) = h
      .call(
        "POST",
        "/auth/register",
        None,
        Some(json!({
          "email": "Ana@School.edu",
          "password": "long enough",
          "fullName": "Ana Santos",
          "externalCode": "2024-0001"
        })),
      )
      .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["role"], "student");
    assert_eq!(body["data"]["user"]["email"], "ana@school.edu");
    let token = body["data"]["token"].as_str().unwrap().to_owned();

    let (status, me) = h.call("GET", "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["fullName"], "Ana Santos");

    for identifier in ["ana@school.edu", "2024-0001"] {
      let (status, body) = h
        .call(
          "POST",
          "/auth/login",
          None,
          Some(json!({ "identifier": identifier, "password": "long enough" })),
        )
        .await;
      assert_eq!(status, StatusCode::OK, "{identifier}: {body}");
      assert!(body["data"]["token"].is_string());
    }
  }

  #[tokio::test]
  async fn login_failures() {
    let h = harness().await;
    h.user("t@school.edu", UserRole::Teacher).await;

    let (status, body) = h
      .call("POST", "/auth/login", None, Some(json!({ "identifier": "t@school.edu" })))
      .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = h
      .call(
        "POST",
        "/auth/login",
        None,
        Some(json!({ "identifier": "t@school.edu", "password": "nope" })),
      )
      .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
      .call(
        "POST",
        "/auth/login",
        None,
        Some(json!({ "identifier": "ghost@school.edu", "password": "correct horse" })),
      )
      .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn register_validates_input() {
    let h = harness().await;
    let (status, body) = h
      .call("POST", "/auth/register", None, Some(json!({ "email": "x@school.edu" })))
      .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("password") && message.contains("fullName"), "{message}");

    let (status, _) = h
      .call(
        "POST",
        "/auth/register",
        None,
        Some(json!({ "email": "not-an-email", "password": "long enough", "fullName": "X" })),
      )
      .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    h.user("taken@school.edu", UserRole::Student).await;
    let (status, _) = h
      .call(
        "POST",
        "/auth/register",
        None,
        Some(json!({ "email": "taken@school.edu", "password": "long enough", "fullName": "X" })),
      )
      .await;
    assert_eq!(status, StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn staff_roles_need_an_administrator() {
    let h = harness().await;
    let body = json!({
      "email": "new.teacher@school.edu",
      "password": "long enough",
      "fullName": "New Teacher",
      "role": "teacher"
    });

    let (status, _) = h.call("POST", "/auth/register", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, teacher) = h.user("t@school.edu", UserRole::Teacher).await;
    let (status, _) = h
      .call("POST", "/auth/register", Some(&teacher), Some(body.clone()))
      .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, admin) = h.user("admin@school.edu", UserRole::Admin).await;
    let (status, created) = h
      .call("POST", "/auth/register", Some(&admin), Some(body))
      .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["user"]["role"], "teacher");
  }

  #[tokio::test]
  async fn me_requires_a_valid_token() {
    let h = harness().await;
    let (status, body) = h.call("GET", "/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = h.call("GET", "/auth/me", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn password_change_rules() {
    let h = harness().await;
    let (student, token) = h.user("s@school.edu", UserRole::Student).await;
    let (_, other) = h.user("s2@school.edu", UserRole::Student).await;
    let uri = format!("/auth/students/{}/password", student.user_id);

    // wrong route kind
    let (status, _) = h
      .call(
        "PUT",
        &format!("/auth/staff/{}/password", student.user_id),
        Some(&token),
        Some(json!({ "currentPassword": "correct horse", "newPassword": "battery staple" })),
      )
      .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h
      .call("PUT", &uri, Some(&other), Some(json!({ "newPassword": "battery staple" })))
      .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = h
      .call(
        "PUT",
        &uri,
        Some(&token),
        Some(json!({ "currentPassword": "wrong", "newPassword": "battery staple" })),
      )
      .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
      .call(
        "PUT",
        &uri,
        Some(&token),
        Some(json!({ "currentPassword": "correct horse", "newPassword": "short" })),
      )
      .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = h
      .call(
        "PUT",
        &uri,
        Some(&token),
        Some(json!({ "currentPassword": "correct horse", "newPassword": "battery staple" })),
      )
      .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = h
      .call(
        "POST",
        "/auth/login",
        None,
        Some(json!({ "identifier": "s@school.edu", "password": "battery staple" })),
      )
      .await;
    assert_eq!(status, StatusCode::OK);
  }

  #[tokio::test]
  async fn admin_changes_staff_email_and_deletes_account() {
    let h = harness().await;
    let (teacher, teacher_token) = h.user("t@school.edu", UserRole::Teacher).await;
    let (_, admin) = h.user("admin@school.edu", UserRole::Admin).await;
    h.user("used@school.edu", UserRole::Guidance).await;

    let uri = format!("/auth/staff/{}/email", teacher.user_id);
    let (status, _) = h
      .call("PUT", &uri, Some(&admin), Some(json!({ "email": "used@school.edu" })))
      .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = h
      .call("PUT", &uri, Some(&admin), Some(json!({ "email": "T.New@school.edu" })))
      .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "t.new@school.edu");

    let (status, _) = h
      .call("DELETE", &format!("/auth/{}", teacher.user_id), Some(&admin), None)
      .await;
    assert_eq!(status, StatusCode::OK);

    // The deleted account's sessions die with it.
    let (status, _) = h.call("GET", "/auth/me", Some(&teacher_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = h
      .call("DELETE", &format!("/auth/{}", teacher.user_id), Some(&admin), None)
      .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
  }
}
