//! Notifications and the templates that generate them.
//!
//! Notifications are only produced as side effects of report lifecycle
//! events. Once stored, only the read flag ever changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::report::{IncidentReport, ReportStatus};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
  ReportAssigned,
  ReportAccepted,
  ReportDeclined,
  ReportUpdated,
  IncidentAlert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub notification_id:   Uuid,
  pub recipient_id:      Uuid,
  pub title:             String,
  pub message:           String,
  pub kind:              NotificationKind,
  pub related_report_id: Option<Uuid>,
  pub is_read:           bool,
  pub created_at:        DateTime<Utc>,
}

/// Input to [`crate::store::SchoolStore::add_notification`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
  pub recipient_id:      Uuid,
  pub title:             String,
  pub message:           String,
  pub kind:              NotificationKind,
  pub related_report_id: Option<Uuid>,
}

impl NewNotification {
  pub fn into_notification(self, notification_id: Uuid, now: DateTime<Utc>) -> Notification {
    Notification {
      notification_id,
      recipient_id: self.recipient_id,
      title: self.title,
      message: self.message,
      kind: self.kind,
      related_report_id: self.related_report_id,
      is_read: false,
      created_at: now,
    }
  }
}

// ─── Templates ───────────────────────────────────────────────────────────────

/// Tell the assigned teacher that a report landed on their desk.
pub fn report_assigned(report: &IncidentReport, teacher_id: Uuid) -> NewNotification {
  NewNotification {
    recipient_id:      teacher_id,
    title:             "New Report Assigned".to_owned(),
    message:           format!(
      "A new {} report ({} priority) has been assigned to you.",
      humanize(&report.incident_type.to_string()),
      report.priority(),
    ),
    kind:              NotificationKind::ReportAssigned,
    related_report_id: Some(report.report_id),
  }
}

/// Tell the original reporter their report changed status.
pub fn status_changed(
  report: &IncidentReport,
  status: ReportStatus,
  decline_reason: Option<&str>,
) -> NewNotification {
  let (title, message, kind) = match status {
    ReportStatus::Accepted => (
      "Report Accepted",
      "Your report has been accepted and is now being addressed by school staff."
        .to_owned(),
      NotificationKind::ReportAccepted,
    ),
    ReportStatus::Declined => (
      "Report Declined",
      match decline_reason {
        Some(reason) => format!("Your report has been declined. Reason: {reason}"),
        None => "Your report has been declined.".to_owned(),
      },
      NotificationKind::ReportDeclined,
    ),
    ReportStatus::UnderReview => (
      "Report Updated",
      "Your report status has been updated. It is currently under review.".to_owned(),
      NotificationKind::ReportUpdated,
    ),
  };

  NewNotification {
    recipient_id: report.reporter.reporter_id,
    title: title.to_owned(),
    message,
    kind,
    related_report_id: Some(report.report_id),
  }
}

fn humanize(snake: &str) -> String { snake.replace('_', " ") }

#[cfg(test)]
mod tests {
  use super::*;
  use crate::report::{IncidentType, Location, NewReport, Reporter};

  fn report() -> IncidentReport {
    IncidentReport::submitted(
      NewReport {
        reporter:            Reporter {
          reporter_id:   Uuid::new_v4(),
          name:          None,
          grade_section: None,
        },
        victim_name:         None,
        location:            Location { building: "Gym".into(), ..Default::default() },
        incident_type:       IncidentType::VerbalAbuse,
        description:         "name calling".into(),
        incident_at:         None,
        is_anonymous:        true,
        reporting_for_self:  false,
        assigned_teacher_id: None,
      },
      Uuid::new_v4(),
      Utc::now(),
    )
  }

  #[test]
  fn decline_message_includes_reason_when_present() {
    let r = report();
    let with = status_changed(&r, ReportStatus::Declined, Some("insufficient detail"));
    assert!(with.message.ends_with("Reason: insufficient detail"));
    assert_eq!(with.kind, NotificationKind::ReportDeclined);

    let without = status_changed(&r, ReportStatus::Declined, None);
    assert!(!without.message.contains("Reason"));
  }

  #[test]
  fn status_notifications_go_to_reporter() {
    let r = report();
    for status in [
      ReportStatus::Accepted,
      ReportStatus::Declined,
      ReportStatus::UnderReview,
    ] {
      let n = status_changed(&r, status, None);
      assert_eq!(n.recipient_id, r.reporter.reporter_id);
      assert_eq!(n.related_report_id, Some(r.report_id));
    }
    assert!(
      status_changed(&r, ReportStatus::Accepted, None)
        .message
        .contains("accepted")
    );
  }

  #[test]
  fn assignment_mentions_type_and_priority() {
    let r = report();
    let teacher = Uuid::new_v4();
    let n = report_assigned(&r, teacher);
    assert_eq!(n.recipient_id, teacher);
    assert!(n.message.contains("verbal abuse"), "{}", n.message);
    assert!(n.message.contains("medium priority"), "{}", n.message);
  }
}
