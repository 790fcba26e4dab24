//! Report lifecycle: submission, review transitions, notes, and the
//! notifications and real-time events they produce.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  Error, Result,
  event::{EventSink, NotificationPayload, RealtimeEvent},
  notification::{self, NewNotification, Notification},
  report::{IncidentReport, NewReport, ReportQuery, ReportStatus, StatusChange, overdue_cutoff},
  store::SchoolStore,
};

/// Owns every write to incident reports.
pub struct ReportService<S> {
  store:  Arc<S>,
  events: Arc<dyn EventSink>,
}

impl<S> Clone for ReportService<S> {
  fn clone(&self) -> Self {
    Self {
      store:  Arc::clone(&self.store),
      events: Arc::clone(&self.events),
    }
  }
}

impl<S: SchoolStore> ReportService<S> {
  pub fn new(store: Arc<S>, events: Arc<dyn EventSink>) -> Self { Self { store, events } }

  // ── Writes ────────────────────────────────────────────────────────────

  pub async fn create_report(&self, input: NewReport) -> Result<IncidentReport> {
    self.create_report_at(input, Utc::now()).await
  }

  /// [`Self::create_report`] with an explicit submission time.
  pub async fn create_report_at(
    &self,
    input: NewReport,
    now: DateTime<Utc>,
  ) -> Result<IncidentReport> {
    input.validate()?;

    let report = IncidentReport::submitted(input, Uuid::new_v4(), now);
    self.store.insert_report(&report).await.map_err(Error::store)?;

    info!(
      report_id = %report.report_id,
      incident_type = %report.incident_type,
      priority = %report.priority(),
      "report submitted"
    );

    if let Some(teacher_id) = report.assigned_teacher_id {
      let assigned = notification::report_assigned(&report, teacher_id);
      if let Err(e) = self.notify(assigned).await {
        warn!(report_id = %report.report_id, %teacher_id, "assignment notice not stored: {e}");
      }
    }

    let reached = self
      .events
      .broadcast(RealtimeEvent::ReportCreated(report.public_view()));
    debug!(reached, "report:created published");

    Ok(report)
  }

  /// Move a report to `change.status`, append the matching history entry and
  /// notify the reporter. A notice that cannot be stored does not undo the
  /// transition.
  pub async fn update_status(
    &self,
    report_id: Uuid,
    change: StatusChange,
  ) -> Result<IncidentReport> {
    let mut report = self.get_report(report_id).await?;
    let previous = report.status;

    let entry = report.apply_status_change(&change, Utc::now());
    self
      .store
      .record_review(&report, &entry)
      .await
      .map_err(Error::store)?;

    info!(
      %report_id,
      from = %previous,
      to = %report.status,
      reviewer = %change.reviewer_id,
      "report status changed"
    );

    let notice = notification::status_changed(
      &report,
      change.status,
      change.decline_reason.as_deref(),
    );
    if let Err(e) = self.notify(notice).await {
      warn!(%report_id, "status notice not stored: {e}");
    }

    self
      .events
      .broadcast(RealtimeEvent::ReportUpdated(report.public_view()));

    Ok(report)
  }

  pub async fn add_review_note(
    &self,
    report_id: Uuid,
    reviewer_id: Uuid,
    reviewer_name: &str,
    notes: &str,
  ) -> Result<IncidentReport> {
    if notes.trim().is_empty() {
      return Err(Error::Validation("missing required fields: notes".into()));
    }

    let mut report = self.get_report(report_id).await?;
    let entry = report.apply_note(reviewer_id, reviewer_name, notes, Utc::now());
    self
      .store
      .record_review(&report, &entry)
      .await
      .map_err(Error::store)?;

    debug!(%report_id, %reviewer_id, "review note added");
    self
      .events
      .broadcast(RealtimeEvent::ReportUpdated(report.public_view()));

    Ok(report)
  }

  pub async fn delete_report(&self, report_id: Uuid) -> Result<()> {
    let deleted = self
      .store
      .delete_report(report_id)
      .await
      .map_err(Error::store)?;
    if !deleted {
      return Err(Error::report_not_found(report_id));
    }
    info!(%report_id, "report deleted");
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn get_report(&self, report_id: Uuid) -> Result<IncidentReport> {
    self
      .store
      .get_report(report_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| Error::report_not_found(report_id))
  }

  pub async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<IncidentReport>> {
    self.store.list_reports(query).await.map_err(Error::store)
  }

  pub async fn reports_for_teacher(&self, teacher_id: Uuid) -> Result<Vec<IncidentReport>> {
    self
      .list_reports(&ReportQuery {
        assigned_teacher_id: Some(teacher_id),
        ..Default::default()
      })
      .await
  }

  pub async fn reports_by_reporter(&self, reporter_id: Uuid) -> Result<Vec<IncidentReport>> {
    self
      .list_reports(&ReportQuery {
        reporter_id: Some(reporter_id),
        ..Default::default()
      })
      .await
  }

  pub async fn pending_reports(&self) -> Result<Vec<IncidentReport>> {
    self
      .list_reports(&ReportQuery {
        status: Some(ReportStatus::UnderReview),
        ..Default::default()
      })
      .await
  }

  pub async fn overdue_reports(&self) -> Result<Vec<IncidentReport>> {
    self.overdue_reports_at(Utc::now()).await
  }

  /// Reports still under review that were created more than three days
  /// before `now`.
  pub async fn overdue_reports_at(&self, now: DateTime<Utc>) -> Result<Vec<IncidentReport>> {
    self
      .list_reports(&ReportQuery {
        status: Some(ReportStatus::UnderReview),
        created_before: Some(overdue_cutoff(now)),
        ..Default::default()
      })
      .await
  }

  // ── Notifications ─────────────────────────────────────────────────────

  async fn notify(&self, input: NewNotification) -> Result<Notification> {
    let stored = self
      .store
      .add_notification(input)
      .await
      .map_err(Error::store)?;

    let reached = self.events.send_to(
      stored.recipient_id,
      RealtimeEvent::NotificationReceived(NotificationPayload::Stored(stored.clone())),
    );
    debug!(
      recipient = %stored.recipient_id,
      kind = %stored.kind,
      reached,
      "notification delivered"
    );
    Ok(stored)
  }
}
