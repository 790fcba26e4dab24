//! The `SchoolStore` trait.
//!
//! Implemented by storage backends (e.g. `vigil-store-sqlite`). The services
//! in [`crate::lifecycle`] and [`crate::alerts`] and the HTTP layer depend on
//! this abstraction, not on any concrete backend.
//!
//! The store holds no business rules: it persists what it is given. Status
//! transitions, history entries and notifications are decided by the
//! services.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  incident::{IncidentStatus, LiveIncident},
  notification::{NewNotification, Notification},
  report::{IncidentReport, ReportQuery, ReviewEntry},
  user::{NewStudent, NewUser, Student, StudentPatch, User, UserLookup},
};

/// All methods return `Send` futures so the trait can be used behind axum.
pub trait SchoolStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Accounts ──────────────────────────────────────────────────────────

  fn add_user(
    &self,
    input: NewUser,
  ) -> impl Future<Output = Result<User, Self::Error>> + Send + '_;

  /// One query per [`UserLookup`] variant.
  fn find_user<'a>(
    &'a self,
    lookup: &'a UserLookup,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  /// The stored argon2 PHC string, if the user exists.
  fn password_hash(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + '_;

  /// Returns `false` if the user does not exist.
  fn set_password_hash(
    &self,
    user_id: Uuid,
    password_hash: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Returns `false` if the user does not exist.
  fn set_email(
    &self,
    user_id: Uuid,
    email: String,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Delete the account and its sessions. Returns `false` if absent.
  fn delete_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Persist a session keyed by the SHA-256 of its bearer token.
  fn create_session(
    &self,
    token_hash: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Resolve an unexpired session to its user.
  fn session_user(
    &self,
    token_hash: String,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + '_;

  // ── Students ──────────────────────────────────────────────────────────

  fn add_student(
    &self,
    input: NewStudent,
  ) -> impl Future<Output = Result<Student, Self::Error>> + Send + '_;

  fn get_student(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  fn list_students(
    &self,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + '_;

  /// Returns `None` if the student does not exist.
  fn update_student(
    &self,
    student_id: Uuid,
    patch: StudentPatch,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  // ── Reports ───────────────────────────────────────────────────────────

  /// Insert a new report together with its initial review history.
  fn insert_report<'a>(
    &'a self,
    report: &'a IncidentReport,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Fetch a report with its full review history, oldest entry first.
  fn get_report(
    &self,
    report_id: Uuid,
  ) -> impl Future<Output = Result<Option<IncidentReport>, Self::Error>> + Send + '_;

  fn list_reports<'a>(
    &'a self,
    query: &'a ReportQuery,
  ) -> impl Future<Output = Result<Vec<IncidentReport>, Self::Error>> + Send + 'a;

  /// Write the report's mutable columns and append `entry` to its history,
  /// atomically. Existing history rows are never touched.
  fn record_review<'a>(
    &'a self,
    report: &'a IncidentReport,
    entry: &'a ReviewEntry,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Returns `false` if the report does not exist.
  fn delete_report(
    &self,
    report_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Notifications ─────────────────────────────────────────────────────

  fn add_notification(
    &self,
    input: NewNotification,
  ) -> impl Future<Output = Result<Notification, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_notifications(
    &self,
    recipient_id: Uuid,
    unread_only: bool,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  /// Flip the read flag on one of `recipient_id`'s notifications. Returns
  /// `false` if no such notification belongs to them.
  fn mark_notification_read(
    &self,
    notification_id: Uuid,
    recipient_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Returns the number of notifications flipped.
  fn mark_all_read(
    &self,
    recipient_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Live incidents ────────────────────────────────────────────────────

  fn insert_incident<'a>(
    &'a self,
    incident: &'a LiveIncident,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn get_incident(
    &self,
    incident_id: Uuid,
  ) -> impl Future<Output = Result<Option<LiveIncident>, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_incidents(
    &self,
    status: Option<IncidentStatus>,
  ) -> impl Future<Output = Result<Vec<LiveIncident>, Self::Error>> + Send + '_;

  /// Overwrite status, responders and resolution of an existing incident.
  fn save_incident<'a>(
    &'a self,
    incident: &'a LiveIncident,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
