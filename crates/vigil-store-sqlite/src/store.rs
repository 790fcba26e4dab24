//! [`SqliteStore`], the SQLite implementation of [`SchoolStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, params};
use tracing::debug;
use uuid::Uuid;

use vigil_core::{
  incident::{IncidentStatus, LiveIncident},
  notification::{NewNotification, Notification},
  report::{IncidentReport, ReportQuery, ReviewEntry},
  store::SchoolStore,
  user::{NewStudent, NewUser, Student, StudentPatch, User, UserLookup},
};

use crate::{
  Result,
  encode::{
    RawIncident, RawNotification, RawReport, RawReviewEntry, RawStudent, RawUser, encode_dt,
    encode_enum, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Column lists & row readers ──────────────────────────────────────────────

const USER_COLUMNS: &str = "user_id, email, full_name, role, external_code, created_at";

const STUDENT_COLUMNS: &str = "student_id, student_number, full_name, grade_level, section, \
                               email, created_at, updated_at";

const REPORT_COLUMNS: &str = "report_id, reporter_id, reporter_name, reporter_grade_section, \
                              victim_name, building, floor, room, incident_type, description, \
                              incident_at, is_anonymous, reporting_for_self, status, \
                              assigned_teacher_id, admin_notes, decline_reason, created_at, \
                              updated_at";

const NOTIFICATION_COLUMNS: &str = "notification_id, recipient_id, title, message, kind, \
                                    related_report_id, is_read, created_at";

const INCIDENT_COLUMNS: &str = "incident_id, reporter_id, reporter_name, building, floor, room, \
                                incident_type, description, status, responders, resolution, \
                                created_at, updated_at";

fn user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
  Ok(RawUser {
    user_id:       row.get(0)?,
    email:         row.get(1)?,
    full_name:     row.get(2)?,
    role:          row.get(3)?,
    external_code: row.get(4)?,
    created_at:    row.get(5)?,
  })
}

fn student_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawStudent> {
  Ok(RawStudent {
    student_id:     row.get(0)?,
    student_number: row.get(1)?,
    full_name:      row.get(2)?,
    grade_level:    row.get(3)?,
    section:        row.get(4)?,
    email:          row.get(5)?,
    created_at:     row.get(6)?,
    updated_at:     row.get(7)?,
  })
}

fn report_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawReport> {
  Ok(RawReport {
    report_id:              row.get(0)?,
    reporter_id:            row.get(1)?,
    reporter_name:          row.get(2)?,
    reporter_grade_section: row.get(3)?,
    victim_name:            row.get(4)?,
    building:               row.get(5)?,
    floor:                  row.get(6)?,
    room:                   row.get(7)?,
    incident_type:          row.get(8)?,
    description:            row.get(9)?,
    incident_at:            row.get(10)?,
    is_anonymous:           row.get(11)?,
    reporting_for_self:     row.get(12)?,
    status:                 row.get(13)?,
    assigned_teacher_id:    row.get(14)?,
    admin_notes:            row.get(15)?,
    decline_reason:         row.get(16)?,
    created_at:             row.get(17)?,
    updated_at:             row.get(18)?,
    history:                Vec::new(),
  })
}

fn notification_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawNotification> {
  Ok(RawNotification {
    notification_id:   row.get(0)?,
    recipient_id:      row.get(1)?,
    title:             row.get(2)?,
    message:           row.get(3)?,
    kind:              row.get(4)?,
    related_report_id: row.get(5)?,
    is_read:           row.get(6)?,
    created_at:        row.get(7)?,
  })
}

fn incident_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawIncident> {
  Ok(RawIncident {
    incident_id:   row.get(0)?,
    reporter_id:   row.get(1)?,
    reporter_name: row.get(2)?,
    building:      row.get(3)?,
    floor:         row.get(4)?,
    room:          row.get(5)?,
    incident_type: row.get(6)?,
    description:   row.get(7)?,
    status:        row.get(8)?,
    responders:    row.get(9)?,
    resolution:    row.get(10)?,
    created_at:    row.get(11)?,
    updated_at:    row.get(12)?,
  })
}

/// Attach the review history to each raw report, oldest entry first.
fn load_history(conn: &rusqlite::Connection, reports: &mut [RawReport]) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare_cached(
    "SELECT reviewer_id, reviewer_name, action, notes, recorded_at
     FROM report_review_history
     WHERE report_id = ?1
     ORDER BY entry_id",
  )?;
  for report in reports.iter_mut() {
    report.history = stmt
      .query_map(params![report.report_id], |row| {
        Ok(RawReviewEntry {
          reviewer_id:   row.get(0)?,
          reviewer_name: row.get(1)?,
          action:        row.get(2)?,
          notes:         row.get(3)?,
          recorded_at:   row.get(4)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
  }
  Ok(())
}

fn insert_history(
  conn: &rusqlite::Connection,
  report_id: &str,
  entry: &ReviewEntry,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO report_review_history (
       report_id, reviewer_id, reviewer_name, action, notes, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      report_id,
      encode_uuid(entry.reviewer_id),
      entry.reviewer_name,
      encode_enum(entry.action),
      entry.notes,
      encode_dt(entry.at),
    ],
  )?;
  Ok(())
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vigil store backed by a single SQLite file.
///
/// Clones share one reference-counted connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    debug!(path = %path.as_ref().display(), "opening sqlite store");
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run raw SQL against the connection, for tests that need to break it.
  #[cfg(test)]
  pub(crate) async fn execute_batch(&self, sql: &str) -> Result<()> {
    let sql = sql.to_owned();
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── SchoolStore impl ────────────────────────────────────────────────────────

impl SchoolStore for SqliteStore {
  type Error = crate::Error;

  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn add_user(&self, input: NewUser) -> Result<User> {
    let user = User {
      user_id:       Uuid::new_v4(),
      email:         input.email.trim().to_lowercase(),
      full_name:     input.full_name,
      role:          input.role,
      external_code: input.external_code,
      created_at:    Utc::now(),
    };

    let id_str        = encode_uuid(user.user_id);
    let email         = user.email.clone();
    let full_name     = user.full_name.clone();
    let role_str      = encode_enum(user.role);
    let external_code = user.external_code.clone();
    let password_hash = input.password_hash;
    let at_str        = encode_dt(user.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO users (
             user_id, email, full_name, role, external_code, password_hash, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          params![id_str, email, full_name, role_str, external_code, password_hash, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(user)
  }

  async fn find_user(&self, lookup: &UserLookup) -> Result<Option<User>> {
    let (column, value) = match lookup {
      UserLookup::ById(id) => ("user_id", encode_uuid(*id)),
      UserLookup::ByExternalCode(code) => ("external_code", code.clone()),
      UserLookup::ByEmail(email) => ("email", email.trim().to_lowercase()),
    };
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");

    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, params![value], user_row).optional()?))
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn password_hash(&self, user_id: Uuid) -> Result<Option<String>> {
    let id_str = encode_uuid(user_id);
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(
            conn
              .query_row(
                "SELECT password_hash FROM users WHERE user_id = ?1",
                params![id_str],
                |r| r.get(0),
              )
              .optional()?,
          )
        })
        .await?,
    )
  }

  async fn set_password_hash(&self, user_id: Uuid, password_hash: String) -> Result<bool> {
    let id_str = encode_uuid(user_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET password_hash = ?2 WHERE user_id = ?1",
          params![id_str, password_hash],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn set_email(&self, user_id: Uuid, email: String) -> Result<bool> {
    let id_str = encode_uuid(user_id);
    let email = email.trim().to_lowercase();
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE users SET email = ?2 WHERE user_id = ?1",
          params![id_str, email],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn delete_user(&self, user_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(user_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM users WHERE user_id = ?1", params![id_str])?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn create_session(
    &self,
    token_hash: String,
    user_id: Uuid,
    expires_at: DateTime<Utc>,
  ) -> Result<()> {
    let id_str      = encode_uuid(user_id);
    let expires_str = encode_dt(expires_at);
    let now_str     = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions (token_hash, user_id, expires_at, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          params![token_hash, id_str, expires_str, now_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn session_user(&self, token_hash: String, now: DateTime<Utc>) -> Result<Option<User>> {
    let now_str = encode_dt(now);
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT u.user_id, u.email, u.full_name, u.role, u.external_code, u.created_at
               FROM sessions s
               JOIN users u ON u.user_id = s.user_id
               WHERE s.token_hash = ?1 AND s.expires_at > ?2",
              params![token_hash, now_str],
              user_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawUser::into_user).transpose()
  }

  // ── Students ──────────────────────────────────────────────────────────────

  async fn add_student(&self, input: NewStudent) -> Result<Student> {
    let now = Utc::now();
    let student = Student {
      student_id:     Uuid::new_v4(),
      student_number: input.student_number,
      full_name:      input.full_name,
      grade_level:    input.grade_level,
      section:        input.section,
      email:          input.email,
      created_at:     now,
      updated_at:     now,
    };

    let id_str  = encode_uuid(student.student_id);
    let number  = student.student_number.clone();
    let name    = student.full_name.clone();
    let grade   = student.grade_level.clone();
    let section = student.section.clone();
    let email   = student.email.clone();
    let at_str  = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (
             student_id, student_number, full_name, grade_level, section, email,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
          params![id_str, number, name, grade, section, email, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(student)
  }

  async fn get_student(&self, student_id: Uuid) -> Result<Option<Student>> {
    let id_str = encode_uuid(student_id);
    let raw: Option<RawStudent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {STUDENT_COLUMNS} FROM students WHERE student_id = ?1"),
              params![id_str],
              student_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawStudent::into_student).transpose()
  }

  async fn list_students(&self) -> Result<Vec<Student>> {
    let raws: Vec<RawStudent> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {STUDENT_COLUMNS} FROM students ORDER BY full_name"
        ))?;
        let rows = stmt
          .query_map([], student_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStudent::into_student).collect()
  }

  async fn update_student(
    &self,
    student_id: Uuid,
    patch: StudentPatch,
  ) -> Result<Option<Student>> {
    let id_str = encode_uuid(student_id);
    let at_str = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE students SET
             full_name   = COALESCE(?2, full_name),
             grade_level = COALESCE(?3, grade_level),
             section     = COALESCE(?4, section),
             email       = COALESCE(?5, email),
             updated_at  = ?6
           WHERE student_id = ?1",
          params![
            id_str,
            patch.full_name,
            patch.grade_level,
            patch.section,
            patch.email,
            at_str,
          ],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    self.get_student(student_id).await
  }

  // ── Reports ───────────────────────────────────────────────────────────────

  async fn insert_report(&self, report: &IncidentReport) -> Result<()> {
    let report = report.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let report_id = encode_uuid(report.report_id);
        tx.execute(
          &format!(
            "INSERT INTO incident_reports ({REPORT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                     ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
          ),
          params![
            report_id,
            encode_uuid(report.reporter.reporter_id),
            report.reporter.name,
            report.reporter.grade_section,
            report.victim_name,
            report.location.building,
            report.location.floor,
            report.location.room,
            encode_enum(report.incident_type),
            report.description,
            report.incident_at.map(encode_dt),
            report.is_anonymous,
            report.reporting_for_self,
            encode_enum(report.status),
            report.assigned_teacher_id.map(encode_uuid),
            report.admin_notes,
            report.decline_reason,
            encode_dt(report.created_at),
            encode_dt(report.updated_at),
          ],
        )?;
        for entry in &report.review_history {
          insert_history(&tx, &report_id, entry)?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_report(&self, report_id: Uuid) -> Result<Option<IncidentReport>> {
    let id_str = encode_uuid(report_id);

    let raw: Option<RawReport> = self
      .conn
      .call(move |conn| {
        let found = conn
          .query_row(
            &format!("SELECT {REPORT_COLUMNS} FROM incident_reports WHERE report_id = ?1"),
            params![id_str],
            report_row,
          )
          .optional()?;
        let Some(report) = found else {
          return Ok(None);
        };
        let mut one = [report];
        load_history(conn, &mut one)?;
        let [report] = one;
        Ok(Some(report))
      })
      .await?;

    raw.map(RawReport::into_report).transpose()
  }

  async fn list_reports(&self, query: &ReportQuery) -> Result<Vec<IncidentReport>> {
    let status_str  = query.status.map(encode_enum);
    let reporter    = query.reporter_id.map(encode_uuid);
    let teacher     = query.assigned_teacher_id.map(encode_uuid);
    let before_str  = query.created_before.map(encode_dt);
    // SQLite treats a negative LIMIT as "no limit".
    let limit_val   = query.limit.map(|l| l as i64).unwrap_or(-1);

    let raws: Vec<RawReport> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {REPORT_COLUMNS}
           FROM incident_reports
           WHERE (?1 IS NULL OR status = ?1)
             AND (?2 IS NULL OR reporter_id = ?2)
             AND (?3 IS NULL OR assigned_teacher_id = ?3)
             AND (?4 IS NULL OR created_at < ?4)
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?5"
        ))?;
        let mut rows = stmt
          .query_map(
            params![status_str, reporter, teacher, before_str, limit_val],
            report_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        load_history(conn, &mut rows)?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReport::into_report).collect()
  }

  async fn record_review(&self, report: &IncidentReport, entry: &ReviewEntry) -> Result<()> {
    let report_id      = encode_uuid(report.report_id);
    let status_str     = encode_enum(report.status);
    let admin_notes    = report.admin_notes.clone();
    let decline_reason = report.decline_reason.clone();
    let updated_str    = encode_dt(report.updated_at);
    let entry          = entry.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "UPDATE incident_reports
           SET status = ?2, admin_notes = ?3, decline_reason = ?4, updated_at = ?5
           WHERE report_id = ?1",
          params![report_id, status_str, admin_notes, decline_reason, updated_str],
        )?;
        insert_history(&tx, &report_id, &entry)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_report(&self, report_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(report_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM incident_reports WHERE report_id = ?1",
          params![id_str],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  async fn add_notification(&self, input: NewNotification) -> Result<Notification> {
    let notification = input.into_notification(Uuid::new_v4(), Utc::now());

    let id_str      = encode_uuid(notification.notification_id);
    let recipient   = encode_uuid(notification.recipient_id);
    let title       = notification.title.clone();
    let message     = notification.message.clone();
    let kind_str    = encode_enum(notification.kind);
    let related     = notification.related_report_id.map(encode_uuid);
    let at_str      = encode_dt(notification.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO notifications ({NOTIFICATION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)"
          ),
          params![id_str, recipient, title, message, kind_str, related, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(notification)
  }

  async fn list_notifications(
    &self,
    recipient_id: Uuid,
    unread_only: bool,
  ) -> Result<Vec<Notification>> {
    let recipient = encode_uuid(recipient_id);

    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {NOTIFICATION_COLUMNS}
           FROM notifications
           WHERE recipient_id = ?1 AND (?2 = 0 OR is_read = 0)
           ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(params![recipient, unread_only], notification_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNotification::into_notification).collect()
  }

  async fn mark_notification_read(&self, notification_id: Uuid, recipient_id: Uuid) -> Result<bool> {
    let id_str    = encode_uuid(notification_id);
    let recipient = encode_uuid(recipient_id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE notifications SET is_read = 1
           WHERE notification_id = ?1 AND recipient_id = ?2",
          params![id_str, recipient],
        )?)
      })
      .await?;
    Ok(changed > 0)
  }

  async fn mark_all_read(&self, recipient_id: Uuid) -> Result<usize> {
    let recipient = encode_uuid(recipient_id);
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
            params![recipient],
          )?)
        })
        .await?,
    )
  }

  // ── Live incidents ────────────────────────────────────────────────────────

  async fn insert_incident(&self, incident: &LiveIncident) -> Result<()> {
    let responders_json = serde_json::to_string(&incident.responders)?;
    let resolution_json = incident
      .resolution
      .as_ref()
      .map(serde_json::to_string)
      .transpose()?;
    let incident = incident.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO live_incidents ({INCIDENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
          ),
          params![
            encode_uuid(incident.incident_id),
            encode_uuid(incident.reporter_id),
            incident.reporter_name,
            incident.location.building,
            incident.location.floor,
            incident.location.room,
            encode_enum(incident.incident_type),
            incident.description,
            encode_enum(incident.status),
            responders_json,
            resolution_json,
            encode_dt(incident.created_at),
            encode_dt(incident.updated_at),
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_incident(&self, incident_id: Uuid) -> Result<Option<LiveIncident>> {
    let id_str = encode_uuid(incident_id);
    let raw: Option<RawIncident> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {INCIDENT_COLUMNS} FROM live_incidents WHERE incident_id = ?1"),
              params![id_str],
              incident_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawIncident::into_incident).transpose()
  }

  async fn list_incidents(&self, status: Option<IncidentStatus>) -> Result<Vec<LiveIncident>> {
    let status_str = status.map(encode_enum);
    let raws: Vec<RawIncident> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {INCIDENT_COLUMNS}
           FROM live_incidents
           WHERE (?1 IS NULL OR status = ?1)
           ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(params![status_str], incident_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawIncident::into_incident).collect()
  }

  async fn save_incident(&self, incident: &LiveIncident) -> Result<()> {
    let id_str          = encode_uuid(incident.incident_id);
    let status_str      = encode_enum(incident.status);
    let responders_json = serde_json::to_string(&incident.responders)?;
    let resolution_json = incident
      .resolution
      .as_ref()
      .map(serde_json::to_string)
      .transpose()?;
    let updated_str     = encode_dt(incident.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE live_incidents
           SET status = ?2, responders = ?3, resolution = ?4, updated_at = ?5
           WHERE incident_id = ?1",
          params![id_str, status_str, responders_json, resolution_json, updated_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
