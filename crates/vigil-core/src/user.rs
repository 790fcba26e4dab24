//! Accounts and students.
//!
//! A [`User`] is anyone who can sign in. A [`Student`] is a roster entry
//! managed by staff; it may or may not have a matching account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

// ─── Roles ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
  Student,
  Teacher,
  Guidance,
  Principal,
  Admin,
}

impl UserRole {
  pub fn is_staff(self) -> bool { !matches!(self, Self::Student) }

  /// Roles allowed to move a report between statuses.
  pub fn can_review(self) -> bool {
    matches!(self, Self::Admin | Self::Principal | Self::Guidance)
  }

  /// Roles allowed to delete reports and manage the student roster.
  pub fn can_administer(self) -> bool {
    matches!(self, Self::Admin | Self::Principal)
  }
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// A sign-in account. The password hash lives only in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub user_id:       Uuid,
  pub email:         String,
  pub full_name:     String,
  pub role:          UserRole,
  /// Student number or employee number.
  pub external_code: Option<String>,
  pub created_at:    DateTime<Utc>,
}

/// Input to [`crate::store::SchoolStore::add_user`].
#[derive(Debug, Clone)]
pub struct NewUser {
  pub email:         String,
  pub full_name:     String,
  pub role:          UserRole,
  pub external_code: Option<String>,
  /// argon2 PHC string.
  pub password_hash: String,
}

/// How to find an account. Each variant maps to exactly one indexed column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
  ById(Uuid),
  ByExternalCode(String),
  ByEmail(String),
}

impl UserLookup {
  /// Classify a free-form sign-in identifier.
  ///
  /// Anything with an `@` is an email, anything that parses as a UUID is an
  /// internal id, everything else is treated as an external code.
  pub fn from_identifier(raw: &str) -> Self {
    let raw = raw.trim();
    if raw.contains('@') {
      Self::ByEmail(raw.to_lowercase())
    } else if let Ok(id) = Uuid::parse_str(raw) {
      Self::ById(id)
    } else {
      Self::ByExternalCode(raw.to_owned())
    }
  }
}

/// Minimal shape check for email addresses: one `@`, a non-empty local part
/// and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
  let Some((local, domain)) = email.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && domain.contains('.')
    && !domain.starts_with('.')
    && !domain.ends_with('.')
    && !email.chars().any(char::is_whitespace)
}

// ─── Students ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
  pub student_id:     Uuid,
  pub student_number: String,
  pub full_name:      String,
  pub grade_level:    String,
  pub section:        String,
  pub email:          Option<String>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
  pub student_number: String,
  pub full_name:      String,
  pub grade_level:    String,
  pub section:        String,
  pub email:          Option<String>,
}

/// Partial update; `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPatch {
  pub full_name:   Option<String>,
  pub grade_level: Option<String>,
  pub section:     Option<String>,
  pub email:       Option<String>,
}
