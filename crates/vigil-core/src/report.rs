//! Incident reports and their review history.
//!
//! A report is created in [`ReportStatus::UnderReview`]. Every later change
//! (status transition or reviewer note) appends one [`ReviewEntry`]; entries
//! are never edited or removed.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

/// Reports still under review after this long are overdue.
pub const OVERDUE_AFTER_DAYS: i64 = 3;

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IncidentType {
  PhysicalAssault,
  Fighting,
  Bullying,
  Harassment,
  Cyberbullying,
  VerbalAbuse,
  Theft,
  Vandalism,
  Other,
}

impl IncidentType {
  /// Fixed severity mapping; priority is never stored.
  pub fn priority(self) -> Priority {
    match self {
      Self::PhysicalAssault | Self::Fighting => Priority::Urgent,
      Self::Bullying | Self::Harassment => Priority::High,
      _ => Priority::Medium,
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
  Medium,
  High,
  Urgent,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportStatus {
  UnderReview,
  Accepted,
  Declined,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewAction {
  Submitted,
  Reviewed,
  Accepted,
  Declined,
  NoteAdded,
}

impl From<ReportStatus> for ReviewAction {
  fn from(status: ReportStatus) -> Self {
    match status {
      ReportStatus::Accepted => Self::Accepted,
      ReportStatus::Declined => Self::Declined,
      ReportStatus::UnderReview => Self::Reviewed,
    }
  }
}

// ─── Value types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
  pub building: String,
  pub floor:    Option<String>,
  pub room:     Option<String>,
}

/// Who filed the report, as shown to reviewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reporter {
  pub reporter_id:   Uuid,
  pub name:          Option<String>,
  /// Free-form "grade / section" label.
  pub grade_section: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
  pub reviewer_id:   Uuid,
  pub reviewer_name: String,
  pub action:        ReviewAction,
  pub notes:         Option<String>,
  pub at:            DateTime<Utc>,
}

// ─── IncidentReport ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentReport {
  pub report_id:           Uuid,
  pub reporter:            Reporter,
  pub victim_name:         Option<String>,
  pub location:            Location,
  pub incident_type:       IncidentType,
  pub description:         String,
  pub incident_at:         Option<DateTime<Utc>>,
  pub is_anonymous:        bool,
  pub reporting_for_self:  bool,
  pub status:              ReportStatus,
  pub assigned_teacher_id: Option<Uuid>,
  /// Oldest first.
  pub review_history:      Vec<ReviewEntry>,
  pub admin_notes:         Option<String>,
  pub decline_reason:      Option<String>,
  pub created_at:          DateTime<Utc>,
  pub updated_at:          DateTime<Utc>,
}

impl IncidentReport {
  pub fn priority(&self) -> Priority { self.incident_type.priority() }

  pub fn is_pending(&self) -> bool { self.status == ReportStatus::UnderReview }

  pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
    self.is_pending() && self.created_at < overdue_cutoff(now)
  }

  /// The copy that may be pushed to every connected client. Anonymous
  /// reports lose the reporter's identity, including the submission entry
  /// in their history.
  pub fn public_view(&self) -> Self {
    let mut view = self.clone();
    if !self.is_anonymous {
      return view;
    }

    let reporter_id = self.reporter.reporter_id;
    view.reporter = Reporter {
      reporter_id:   Uuid::nil(),
      name:          None,
      grade_section: None,
    };
    for entry in &mut view.review_history {
      if entry.reviewer_id == reporter_id {
        entry.reviewer_id = Uuid::nil();
        entry.reviewer_name = "Anonymous".to_owned();
      }
    }
    view
  }

  /// Build a freshly submitted report from validated input.
  pub fn submitted(input: NewReport, report_id: Uuid, now: DateTime<Utc>) -> Self {
    let submitted_by = ReviewEntry {
      reviewer_id:   input.reporter.reporter_id,
      reviewer_name: input
        .reporter
        .name
        .clone()
        .unwrap_or_else(|| "Anonymous".to_owned()),
      action:        ReviewAction::Submitted,
      notes:         None,
      at:            now,
    };

    Self {
      report_id,
      reporter: input.reporter,
      victim_name: input.victim_name,
      location: input.location,
      incident_type: input.incident_type,
      description: input.description,
      incident_at: input.incident_at,
      is_anonymous: input.is_anonymous,
      reporting_for_self: input.reporting_for_self,
      status: ReportStatus::UnderReview,
      assigned_teacher_id: input.assigned_teacher_id,
      review_history: vec![submitted_by],
      admin_notes: None,
      decline_reason: None,
      created_at: now,
      updated_at: now,
    }
  }

  /// Apply a status change in memory and return the appended entry.
  ///
  /// Notes and decline reason are only overwritten when the change carries a
  /// value. Any status may follow any other.
  pub fn apply_status_change(
    &mut self,
    change: &StatusChange,
    now: DateTime<Utc>,
  ) -> ReviewEntry {
    let entry = ReviewEntry {
      reviewer_id:   change.reviewer_id,
      reviewer_name: change.reviewer_name.clone(),
      action:        change.status.into(),
      notes:         change.notes.clone(),
      at:            now,
    };

    self.status = change.status;
    if let Some(notes) = &change.notes {
      self.admin_notes = Some(notes.clone());
    }
    if let Some(reason) = &change.decline_reason {
      self.decline_reason = Some(reason.clone());
    }
    self.updated_at = now;
    self.review_history.push(entry.clone());
    entry
  }

  /// Append a reviewer note without touching the status.
  pub fn apply_note(
    &mut self,
    reviewer_id: Uuid,
    reviewer_name: &str,
    notes: &str,
    now: DateTime<Utc>,
  ) -> ReviewEntry {
    let entry = ReviewEntry {
      reviewer_id,
      reviewer_name: reviewer_name.to_owned(),
      action: ReviewAction::NoteAdded,
      notes: Some(notes.to_owned()),
      at: now,
    };
    self.updated_at = now;
    self.review_history.push(entry.clone());
    entry
  }
}

/// Reports created strictly before this instant are overdue if still pending.
pub fn overdue_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
  now - Duration::days(OVERDUE_AFTER_DAYS)
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::lifecycle::ReportService::create_report`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
  pub reporter:            Reporter,
  #[serde(default)]
  pub victim_name:         Option<String>,
  pub location:            Location,
  pub incident_type:       IncidentType,
  pub description:         String,
  #[serde(default)]
  pub incident_at:         Option<DateTime<Utc>>,
  #[serde(default)]
  pub is_anonymous:        bool,
  #[serde(default)]
  pub reporting_for_self:  bool,
  #[serde(default)]
  pub assigned_teacher_id: Option<Uuid>,
}

impl NewReport {
  pub fn validate(&self) -> Result<()> {
    let mut missing = Vec::new();
    if self.reporter.reporter_id.is_nil() {
      missing.push("reporter");
    }
    if self.location.building.trim().is_empty() {
      missing.push("location.building");
    }
    if self.description.trim().is_empty() {
      missing.push("description");
    }
    if missing.is_empty() {
      Ok(())
    } else {
      Err(Error::Validation(format!(
        "missing required fields: {}",
        missing.join(", ")
      )))
    }
  }
}

/// Input to [`crate::lifecycle::ReportService::update_status`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
  pub status:         ReportStatus,
  pub reviewer_id:    Uuid,
  pub reviewer_name:  String,
  #[serde(default)]
  pub notes:          Option<String>,
  #[serde(default)]
  pub decline_reason: Option<String>,
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Filters for [`crate::store::SchoolStore::list_reports`]. All set filters
/// must match. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ReportQuery {
  pub status:              Option<ReportStatus>,
  pub reporter_id:         Option<Uuid>,
  pub assigned_teacher_id: Option<Uuid>,
  /// Only reports created strictly before this instant.
  pub created_before:      Option<DateTime<Utc>>,
  pub limit:               Option<usize>,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn new_report(kind: IncidentType) -> NewReport {
    NewReport {
      reporter:            Reporter {
        reporter_id:   Uuid::new_v4(),
        name:          Some("Sam".into()),
        grade_section: Some("8 / Rizal".into()),
      },
      victim_name:         None,
      location:            Location {
        building: "Main".into(),
        floor:    Some("2".into()),
        room:     Some("204".into()),
      },
      incident_type:       kind,
      description:         "something happened".into(),
      incident_at:         None,
      is_anonymous:        false,
      reporting_for_self:  true,
      assigned_teacher_id: None,
    }
  }

  #[test]
  fn priority_mapping() {
    assert_eq!(IncidentType::PhysicalAssault.priority(), Priority::Urgent);
    assert_eq!(IncidentType::Fighting.priority(), Priority::Urgent);
    assert_eq!(IncidentType::Bullying.priority(), Priority::High);
    assert_eq!(IncidentType::Harassment.priority(), Priority::High);
    for other in [
      IncidentType::Cyberbullying,
      IncidentType::VerbalAbuse,
      IncidentType::Theft,
      IncidentType::Vandalism,
      IncidentType::Other,
    ] {
      assert_eq!(other.priority(), Priority::Medium);
    }
  }

  #[test]
  fn submitted_report_starts_under_review_with_one_entry() {
    let now = Utc::now();
    let input = new_report(IncidentType::Fighting);
    let reporter_id = input.reporter.reporter_id;
    let report = IncidentReport::submitted(input, Uuid::new_v4(), now);

    assert_eq!(report.status, ReportStatus::UnderReview);
    assert_eq!(report.priority(), Priority::Urgent);
    assert_eq!(report.review_history.len(), 1);
    assert_eq!(report.review_history[0].action, ReviewAction::Submitted);
    assert_eq!(report.review_history[0].reviewer_id, reporter_id);
  }

  #[test]
  fn validation_lists_missing_fields() {
    let mut input = new_report(IncidentType::Other);
    input.description = "  ".into();
    input.location.building = String::new();
    let err = input.validate().unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("description"), "{msg}");
    assert!(msg.contains("location.building"), "{msg}");
  }

  #[test]
  fn status_change_preserves_unsupplied_fields() {
    let now = Utc::now();
    let mut report =
      IncidentReport::submitted(new_report(IncidentType::Theft), Uuid::new_v4(), now);
    let reviewer = Uuid::new_v4();

    report.apply_status_change(
      &StatusChange {
        status:         ReportStatus::Declined,
        reviewer_id:    reviewer,
        reviewer_name:  "Ms. Cruz".into(),
        notes:          Some("duplicate".into()),
        decline_reason: Some("already handled".into()),
      },
      now,
    );
    let entry = report.apply_status_change(
      &StatusChange {
        status:         ReportStatus::UnderReview,
        reviewer_id:    reviewer,
        reviewer_name:  "Ms. Cruz".into(),
        notes:          None,
        decline_reason: None,
      },
      now,
    );

    assert_eq!(entry.action, ReviewAction::Reviewed);
    assert_eq!(report.admin_notes.as_deref(), Some("duplicate"));
    assert_eq!(report.decline_reason.as_deref(), Some("already handled"));
    assert_eq!(report.review_history.len(), 3);
  }

  #[test]
  fn overdue_requires_pending_and_age() {
    let now = Utc::now();
    let mut report =
      IncidentReport::submitted(new_report(IncidentType::Other), Uuid::new_v4(), now);
    report.created_at = now - Duration::days(4);
    assert!(report.is_overdue(now));

    report.status = ReportStatus::Accepted;
    assert!(!report.is_overdue(now));

    report.status = ReportStatus::UnderReview;
    report.created_at = now - Duration::days(2);
    assert!(!report.is_overdue(now));
  }

  #[test]
  fn status_strings_match_wire_format() {
    assert_eq!(ReportStatus::UnderReview.to_string(), "under_review");
    assert_eq!(
      "physical_assault".parse::<IncidentType>().unwrap(),
      IncidentType::PhysicalAssault
    );
    assert_eq!(
      serde_json::to_value(ReviewAction::NoteAdded).unwrap(),
      serde_json::json!("note_added")
    );
  }

  #[test]
  fn public_view_hides_anonymous_reporters_only() {
    let now = Utc::now();
    let named = IncidentReport::submitted(new_report(IncidentType::Theft), Uuid::new_v4(), now);
    assert_eq!(named.public_view(), named);

    let mut input = new_report(IncidentType::Theft);
    input.is_anonymous = true;
    let reporter_id = input.reporter.reporter_id;
    let mut report = IncidentReport::submitted(input, Uuid::new_v4(), now);
    report.apply_note(Uuid::new_v4(), "Ms. Reyes", "called in", now);

    let view = report.public_view();
    assert_eq!(view.reporter.reporter_id, Uuid::nil());
    assert_eq!(view.reporter.name, None);
    assert_eq!(view.reporter.grade_section, None);
    assert_eq!(view.review_history[0].reviewer_id, Uuid::nil());
    assert_eq!(view.review_history[0].reviewer_name, "Anonymous");
    assert_eq!(view.review_history[1].reviewer_name, "Ms. Reyes");
    assert_eq!(view.description, report.description);
    assert_eq!(report.reporter.reporter_id, reporter_id);
  }
}
