//! Client-side view of reports and live incidents.
//!
//! Every fetch that succeeds replaces the in-memory collection and the
//! durable cache wholesale. A fetch that fails serves whatever the cache
//! last held. Mutations go to the server first; when it cannot be reached
//! the change is applied locally so the operator still sees it.

use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;
use vigil_core::{
  incident::{LiveIncident, NewIncident, Responder},
  report::{IncidentReport, NewReport, ReportStatus, Reporter, StatusChange},
  user::User,
};

use crate::{
  cache::{DurableCache, INCIDENTS_KEY, REPORTS_KEY},
  client::{ApiClient, IncidentDraft, ReportDraft, StatusUpdate},
};

/// How often `watch` re-fetches.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

// ─── Remote ───────────────────────────────────────────────────────────────────

/// The server operations the sync layer depends on.
#[allow(async_fn_in_trait)]
pub trait Remote {
  async fn fetch_reports(&self) -> Result<Vec<IncidentReport>>;
  async fn submit_report(&self, draft: &ReportDraft) -> Result<IncidentReport>;
  async fn update_report_status(&self, id: Uuid, update: &StatusUpdate)
  -> Result<IncidentReport>;
  async fn fetch_incidents(&self) -> Result<Vec<LiveIncident>>;
  async fn raise_incident(&self, draft: &IncidentDraft) -> Result<LiveIncident>;
  async fn respond(&self, id: Uuid) -> Result<LiveIncident>;
  async fn resolve(&self, id: Uuid) -> Result<LiveIncident>;
}

impl Remote for ApiClient {
  async fn fetch_reports(&self) -> Result<Vec<IncidentReport>> { self.list_reports().await }

  async fn submit_report(&self, draft: &ReportDraft) -> Result<IncidentReport> {
    self.create_report(draft).await
  }

  async fn update_report_status(
    &self,
    id: Uuid,
    update: &StatusUpdate,
  ) -> Result<IncidentReport> {
    self.update_status(id, update).await
  }

  async fn fetch_incidents(&self) -> Result<Vec<LiveIncident>> { self.list_incidents().await }

  async fn raise_incident(&self, draft: &IncidentDraft) -> Result<LiveIncident> {
    self.create_incident(draft).await
  }

  async fn respond(&self, id: Uuid) -> Result<LiveIncident> { ApiClient::respond(self, id).await }

  async fn resolve(&self, id: Uuid) -> Result<LiveIncident> { ApiClient::resolve(self, id).await }
}

// ─── Outcomes ─────────────────────────────────────────────────────────────────

/// Where a refreshed collection came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
  Live,
  Cached,
}

/// Where a mutation landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
  Server,
  LocalOnly,
}

/// Replace the element matching `same` or put `item` at the front.
fn upsert<T>(items: &mut Vec<T>, item: T, same: impl Fn(&T) -> bool) {
  match items.iter_mut().find(|existing| same(existing)) {
    Some(existing) => *existing = item,
    None => items.insert(0, item),
  }
}

async fn persist<T: serde::Serialize>(cache: &DurableCache, key: &str, items: &[T]) {
  if let Err(e) = cache.store(key, items).await {
    warn!("could not write {key} cache: {e:#}");
  }
}

async fn cached<T: serde::de::DeserializeOwned>(cache: &DurableCache, key: &str) -> Vec<T> {
  match cache.load(key).await {
    Ok(items) => items.unwrap_or_default(),
    Err(e) => {
      warn!("could not read {key} cache: {e:#}");
      Vec::new()
    }
  }
}

// ─── Reports ──────────────────────────────────────────────────────────────────

pub struct ReportSync<R> {
  remote:  R,
  cache:   DurableCache,
  me:      User,
  reports: Vec<IncidentReport>,
}

impl<R: Remote> ReportSync<R> {
  pub fn new(remote: R, cache: DurableCache, me: User) -> Self {
    Self {
      remote,
      cache,
      me,
      reports: Vec::new(),
    }
  }

  /// Fetch the full collection, falling back to the cache.
  pub async fn refresh(&mut self) -> Freshness {
    match self.remote.fetch_reports().await {
      Ok(reports) => {
        debug!(count = reports.len(), "reports fetched");
        self.reports = reports;
        persist(&self.cache, REPORTS_KEY, &self.reports).await;
        Freshness::Live
      }
      Err(e) => {
        warn!("report fetch failed, serving cache: {e:#}");
        self.reports = cached(&self.cache, REPORTS_KEY).await;
        Freshness::Cached
      }
    }
  }

  pub fn reports(&self) -> &[IncidentReport] { &self.reports }

  pub fn get(&self, id: Uuid) -> Option<&IncidentReport> {
    self.reports.iter().find(|r| r.report_id == id)
  }

  pub fn by_status(&self, status: ReportStatus) -> Vec<&IncidentReport> {
    self.reports.iter().filter(|r| r.status == status).collect()
  }

  pub fn for_teacher(&self, teacher_id: Uuid) -> Vec<&IncidentReport> {
    self
      .reports
      .iter()
      .filter(|r| r.assigned_teacher_id == Some(teacher_id))
      .collect()
  }

  pub fn by_reporter(&self, reporter_id: Uuid) -> Vec<&IncidentReport> {
    self
      .reports
      .iter()
      .filter(|r| r.reporter.reporter_id == reporter_id)
      .collect()
  }

  pub fn overdue(&self, now: DateTime<Utc>) -> Vec<&IncidentReport> {
    self.reports.iter().filter(|r| r.is_overdue(now)).collect()
  }

  pub async fn submit(&mut self, draft: ReportDraft) -> Result<(IncidentReport, Applied)> {
    let (report, applied) = match self.remote.submit_report(&draft).await {
      Ok(report) => (report, Applied::Server),
      Err(e) => {
        warn!("report submit failed, keeping it locally: {e:#}");
        (self.local_report(draft)?, Applied::LocalOnly)
      }
    };
    upsert(&mut self.reports, report.clone(), |r| {
      r.report_id == report.report_id
    });
    persist(&self.cache, REPORTS_KEY, &self.reports).await;
    Ok((report, applied))
  }

  fn local_report(&self, draft: ReportDraft) -> Result<IncidentReport> {
    let input = NewReport {
      reporter:            Reporter {
        reporter_id:   self.me.user_id,
        name:          (!draft.is_anonymous).then(|| self.me.full_name.clone()),
        grade_section: draft.grade_section,
      },
      victim_name:         draft.victim_name,
      location:            draft.location,
      incident_type:       draft.incident_type,
      description:         draft.description,
      incident_at:         None,
      is_anonymous:        draft.is_anonymous,
      reporting_for_self:  draft.reporting_for_self,
      assigned_teacher_id: draft.assigned_teacher_id,
    };
    input.validate()?;
    Ok(IncidentReport::submitted(input, Uuid::new_v4(), Utc::now()))
  }

  pub async fn update_status(
    &mut self,
    id: Uuid,
    update: StatusUpdate,
  ) -> Result<(IncidentReport, Applied)> {
    let (report, applied) = match self.remote.update_report_status(id, &update).await {
      Ok(report) => (report, Applied::Server),
      Err(e) => {
        warn!(report_id = %id, "status update failed, applying locally: {e:#}");
        let mut report = self
          .get(id)
          .cloned()
          .ok_or_else(|| anyhow!("report {id} is not in the local view"))?;
        report.apply_status_change(
          &StatusChange {
            status:         update.status,
            reviewer_id:    self.me.user_id,
            reviewer_name:  self.me.full_name.clone(),
            notes:          update.notes,
            decline_reason: update.decline_reason,
          },
          Utc::now(),
        );
        (report, Applied::LocalOnly)
      }
    };
    upsert(&mut self.reports, report.clone(), |r| r.report_id == id);
    persist(&self.cache, REPORTS_KEY, &self.reports).await;
    Ok((report, applied))
  }
}

// ─── Live incidents ───────────────────────────────────────────────────────────

pub struct IncidentSync<R> {
  remote:    R,
  cache:     DurableCache,
  me:        User,
  incidents: Vec<LiveIncident>,
}

impl<R: Remote> IncidentSync<R> {
  pub fn new(remote: R, cache: DurableCache, me: User) -> Self {
    Self {
      remote,
      cache,
      me,
      incidents: Vec::new(),
    }
  }

  pub async fn refresh(&mut self) -> Freshness {
    match self.remote.fetch_incidents().await {
      Ok(incidents) => {
        debug!(count = incidents.len(), "incidents fetched");
        self.incidents = incidents;
        persist(&self.cache, INCIDENTS_KEY, &self.incidents).await;
        Freshness::Live
      }
      Err(e) => {
        warn!("incident fetch failed, serving cache: {e:#}");
        self.incidents = cached(&self.cache, INCIDENTS_KEY).await;
        Freshness::Cached
      }
    }
  }

  pub fn incidents(&self) -> &[LiveIncident] { &self.incidents }

  /// Incidents not yet resolved, newest first.
  pub fn active(&self) -> Vec<&LiveIncident> {
    let mut active: Vec<_> = self.incidents.iter().filter(|i| !i.is_resolved()).collect();
    active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    active
  }

  fn local(&self, id: Uuid) -> Result<LiveIncident> {
    self
      .incidents
      .iter()
      .find(|i| i.incident_id == id)
      .cloned()
      .ok_or_else(|| anyhow!("incident {id} is not in the local view"))
  }

  async fn keep(&mut self, incident: &LiveIncident) {
    let id = incident.incident_id;
    upsert(&mut self.incidents, incident.clone(), |i| i.incident_id == id);
    persist(&self.cache, INCIDENTS_KEY, &self.incidents).await;
  }

  pub async fn raise(&mut self, draft: IncidentDraft) -> Result<(LiveIncident, Applied)> {
    let (incident, applied) = match self.remote.raise_incident(&draft).await {
      Ok(incident) => (incident, Applied::Server),
      Err(e) => {
        warn!("incident alert failed, keeping it locally: {e:#}");
        let input = NewIncident {
          reporter_id:   self.me.user_id,
          reporter_name: self.me.full_name.clone(),
          location:      draft.location,
          incident_type: draft.incident_type,
          description:   draft.description,
        };
        input.validate()?;
        (
          LiveIncident::open(input, Uuid::new_v4(), Utc::now()),
          Applied::LocalOnly,
        )
      }
    };
    self.keep(&incident).await;
    Ok((incident, applied))
  }

  pub async fn respond(&mut self, id: Uuid) -> Result<(LiveIncident, Applied)> {
    let (incident, applied) = match self.remote.respond(id).await {
      Ok(incident) => (incident, Applied::Server),
      Err(e) => {
        warn!(incident_id = %id, "respond failed, applying locally: {e:#}");
        let mut incident = self.local(id)?;
        incident.add_responder(Responder {
          user_id:      self.me.user_id,
          user_name:    self.me.full_name.clone(),
          role:         self.me.role.to_string(),
          responded_at: Utc::now(),
        })?;
        (incident, Applied::LocalOnly)
      }
    };
    self.keep(&incident).await;
    Ok((incident, applied))
  }

  pub async fn resolve(&mut self, id: Uuid) -> Result<(LiveIncident, Applied)> {
    let (incident, applied) = match self.remote.resolve(id).await {
      Ok(incident) => (incident, Applied::Server),
      Err(e) => {
        warn!(incident_id = %id, "resolve failed, applying locally: {e:#}");
        let mut incident = self.local(id)?;
        incident.resolve(self.me.user_id, &self.me.full_name, Utc::now());
        (incident, Applied::LocalOnly)
      }
    };
    self.keep(&incident).await;
    Ok((incident, applied))
  }
}
