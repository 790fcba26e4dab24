//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings in UTC with
//! microsecond precision, so lexical order equals chronological order and
//! range filters can compare the strings directly. Enums are stored as their
//! snake_case names. Responder lists and resolutions are compact JSON.

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;
use vigil_core::{
  incident::{LiveIncident, Resolution, Responder},
  notification::Notification,
  report::{IncidentReport, Location, Reporter, ReviewEntry},
  user::{Student, User},
};

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

/// Any of the strum-derived domain enums.
pub fn encode_enum<T: Display>(value: T) -> String { value.to_string() }

pub fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| Error::Decode {
    column,
    value: s.to_owned(),
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read from a `users` row.
pub struct RawUser {
  pub user_id:       String,
  pub email:         String,
  pub full_name:     String,
  pub role:          String,
  pub external_code: Option<String>,
  pub created_at:    String,
}

impl RawUser {
  pub fn into_user(self) -> Result<User> {
    Ok(User {
      user_id:       decode_uuid(&self.user_id)?,
      email:         self.email,
      full_name:     self.full_name,
      role:          decode_enum("users.role", &self.role)?,
      external_code: self.external_code,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read from a `students` row.
pub struct RawStudent {
  pub student_id:     String,
  pub student_number: String,
  pub full_name:      String,
  pub grade_level:    String,
  pub section:        String,
  pub email:          Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
}

impl RawStudent {
  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      student_id:     decode_uuid(&self.student_id)?,
      student_number: self.student_number,
      full_name:      self.full_name,
      grade_level:    self.grade_level,
      section:        self.section,
      email:          self.email,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read from a `report_review_history` row.
pub struct RawReviewEntry {
  pub reviewer_id:   String,
  pub reviewer_name: String,
  pub action:        String,
  pub notes:         Option<String>,
  pub recorded_at:   String,
}

impl RawReviewEntry {
  pub fn into_entry(self) -> Result<ReviewEntry> {
    Ok(ReviewEntry {
      reviewer_id:   decode_uuid(&self.reviewer_id)?,
      reviewer_name: self.reviewer_name,
      action:        decode_enum("report_review_history.action", &self.action)?,
      notes:         self.notes,
      at:            decode_dt(&self.recorded_at)?,
    })
  }
}

/// Raw strings read from an `incident_reports` row plus its history rows.
pub struct RawReport {
  pub report_id:              String,
  pub reporter_id:            String,
  pub reporter_name:          Option<String>,
  pub reporter_grade_section: Option<String>,
  pub victim_name:            Option<String>,
  pub building:               String,
  pub floor:                  Option<String>,
  pub room:                   Option<String>,
  pub incident_type:          String,
  pub description:            String,
  pub incident_at:            Option<String>,
  pub is_anonymous:           bool,
  pub reporting_for_self:     bool,
  pub status:                 String,
  pub assigned_teacher_id:    Option<String>,
  pub admin_notes:            Option<String>,
  pub decline_reason:         Option<String>,
  pub created_at:             String,
  pub updated_at:             String,
  // report_review_history rows, oldest first
  pub history:                Vec<RawReviewEntry>,
}

impl RawReport {
  pub fn into_report(self) -> Result<IncidentReport> {
    let review_history = self
      .history
      .into_iter()
      .map(RawReviewEntry::into_entry)
      .collect::<Result<_>>()?;

    Ok(IncidentReport {
      report_id: decode_uuid(&self.report_id)?,
      reporter: Reporter {
        reporter_id:   decode_uuid(&self.reporter_id)?,
        name:          self.reporter_name,
        grade_section: self.reporter_grade_section,
      },
      victim_name: self.victim_name,
      location: Location {
        building: self.building,
        floor:    self.floor,
        room:     self.room,
      },
      incident_type: decode_enum("incident_reports.incident_type", &self.incident_type)?,
      description: self.description,
      incident_at: decode_opt_dt(self.incident_at)?,
      is_anonymous: self.is_anonymous,
      reporting_for_self: self.reporting_for_self,
      status: decode_enum("incident_reports.status", &self.status)?,
      assigned_teacher_id: decode_opt_uuid(self.assigned_teacher_id)?,
      review_history,
      admin_notes: self.admin_notes,
      decline_reason: self.decline_reason,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read from a `notifications` row.
pub struct RawNotification {
  pub notification_id:   String,
  pub recipient_id:      String,
  pub title:             String,
  pub message:           String,
  pub kind:              String,
  pub related_report_id: Option<String>,
  pub is_read:           bool,
  pub created_at:        String,
}

impl RawNotification {
  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      notification_id:   decode_uuid(&self.notification_id)?,
      recipient_id:      decode_uuid(&self.recipient_id)?,
      title:             self.title,
      message:           self.message,
      kind:              decode_enum("notifications.kind", &self.kind)?,
      related_report_id: decode_opt_uuid(self.related_report_id)?,
      is_read:           self.is_read,
      created_at:        decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read from a `live_incidents` row.
pub struct RawIncident {
  pub incident_id:   String,
  pub reporter_id:   String,
  pub reporter_name: String,
  pub building:      String,
  pub floor:         Option<String>,
  pub room:          Option<String>,
  pub incident_type: String,
  pub description:   String,
  pub status:        String,
  pub responders:    String,
  pub resolution:    Option<String>,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawIncident {
  pub fn into_incident(self) -> Result<LiveIncident> {
    let responders: Vec<Responder> = serde_json::from_str(&self.responders)?;
    let resolution: Option<Resolution> = self
      .resolution
      .as_deref()
      .map(serde_json::from_str)
      .transpose()?;

    Ok(LiveIncident {
      incident_id: decode_uuid(&self.incident_id)?,
      reporter_id: decode_uuid(&self.reporter_id)?,
      reporter_name: self.reporter_name,
      location: Location {
        building: self.building,
        floor:    self.floor,
        room:     self.room,
      },
      incident_type: decode_enum("live_incidents.incident_type", &self.incident_type)?,
      description: self.description,
      status: decode_enum("live_incidents.status", &self.status)?,
      responders,
      resolution,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
