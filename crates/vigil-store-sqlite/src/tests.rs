//! Integration tests for `SqliteStore` against an in-memory database, plus
//! the report and incident services running on top of it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;
use vigil_core::{
  Error as CoreError,
  alerts::IncidentService,
  event::{Audience, NotificationPayload, RealtimeEvent, RecordingSink},
  incident::{IncidentStatus, NewIncident},
  lifecycle::ReportService,
  notification::NotificationKind,
  report::{
    IncidentType, Location, NewReport, Priority, ReportQuery, ReportStatus, Reporter,
    ReviewAction, StatusChange,
  },
  store::SchoolStore,
  user::{NewStudent, NewUser, StudentPatch, UserLookup, UserRole},
};

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn new_user(email: &str, role: UserRole, code: Option<&str>) -> NewUser {
  NewUser {
    email:         email.into(),
    full_name:     "Test Person".into(),
    role,
    external_code: code.map(Into::into),
    password_hash: "$argon2id$placeholder".into(),
  }
}

fn new_report(reporter_id: Uuid, kind: IncidentType) -> NewReport {
  NewReport {
    reporter:            Reporter {
      reporter_id,
      name:          Some("Sam Reyes".into()),
      grade_section: Some("8 / Rizal".into()),
    },
    victim_name:         Some("Jo".into()),
    location:            Location {
      building: "Main".into(),
      floor:    Some("2".into()),
      room:     Some("204".into()),
    },
    incident_type:       kind,
    description:         "pushed against the lockers".into(),
    incident_at:         None,
    is_anonymous:        false,
    reporting_for_self:  false,
    assigned_teacher_id: None,
  }
}

fn change(status: ReportStatus) -> StatusChange {
  StatusChange {
    status,
    reviewer_id: Uuid::new_v4(),
    reviewer_name: "Ms. Cruz".into(),
    notes: None,
    decline_reason: None,
  }
}

fn new_incident(reporter_id: Uuid) -> NewIncident {
  NewIncident {
    reporter_id,
    reporter_name: "Mr. Diaz".into(),
    location:      Location {
      building: "Gym".into(),
      floor:    None,
      room:     None,
    },
    incident_type: IncidentType::Fighting,
    description:   "two students fighting".into(),
  }
}

async fn services() -> (
  Arc<SqliteStore>,
  Arc<RecordingSink>,
  ReportService<SqliteStore>,
  IncidentService<SqliteStore>,
) {
  let store = Arc::new(store().await);
  let sink = Arc::new(RecordingSink::default());
  let reports = ReportService::new(Arc::clone(&store), sink.clone());
  let incidents = IncidentService::new(Arc::clone(&store), sink.clone());
  (store, sink, reports, incidents)
}

// ─── Accounts ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn find_user_by_every_identifier() {
  let s = store().await;
  let user = s
    .add_user(new_user("Sam@School.EDU", UserRole::Student, Some("2024-0042")))
    .await
    .unwrap();
  assert_eq!(user.email, "sam@school.edu");

  for lookup in [
    UserLookup::ById(user.user_id),
    UserLookup::from_identifier("sam@school.edu"),
    UserLookup::from_identifier("2024-0042"),
  ] {
    let found = s.find_user(&lookup).await.unwrap();
    assert_eq!(found.map(|u| u.user_id), Some(user.user_id), "{lookup:?}");
  }

  let missing = s
    .find_user(&UserLookup::ByExternalCode("nope".into()))
    .await
    .unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
  let s = store().await;
  s.add_user(new_user("a@school.edu", UserRole::Teacher, None))
    .await
    .unwrap();
  let again = s
    .add_user(new_user("a@school.edu", UserRole::Teacher, None))
    .await;
  assert!(again.is_err());
}

#[tokio::test]
async fn password_and_email_updates() {
  let s = store().await;
  let user = s
    .add_user(new_user("t@school.edu", UserRole::Teacher, None))
    .await
    .unwrap();

  assert!(s.set_password_hash(user.user_id, "new-hash".into()).await.unwrap());
  assert_eq!(
    s.password_hash(user.user_id).await.unwrap().as_deref(),
    Some("new-hash")
  );

  assert!(s.set_email(user.user_id, "T2@School.edu".into()).await.unwrap());
  let found = s
    .find_user(&UserLookup::ByEmail("t2@school.edu".into()))
    .await
    .unwrap();
  assert!(found.is_some());

  assert!(!s.set_email(Uuid::new_v4(), "x@y.z".into()).await.unwrap());
}

#[tokio::test]
async fn sessions_expire_and_die_with_their_user() {
  let s = store().await;
  let user = s
    .add_user(new_user("p@school.edu", UserRole::Principal, None))
    .await
    .unwrap();
  let now = Utc::now();

  s.create_session("live".into(), user.user_id, now + Duration::hours(1))
    .await
    .unwrap();
  s.create_session("stale".into(), user.user_id, now - Duration::seconds(1))
    .await
    .unwrap();

  let live = s.session_user("live".into(), now).await.unwrap();
  assert_eq!(live.map(|u| u.user_id), Some(user.user_id));
  assert!(s.session_user("stale".into(), now).await.unwrap().is_none());
  assert!(s.session_user("unknown".into(), now).await.unwrap().is_none());

  assert!(s.delete_user(user.user_id).await.unwrap());
  assert!(s.session_user("live".into(), now).await.unwrap().is_none());
  assert!(!s.delete_user(user.user_id).await.unwrap());
}

// ─── Students ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn student_roster_crud() {
  let s = store().await;
  let student = s
    .add_student(NewStudent {
      student_number: "2024-0001".into(),
      full_name:      "Ana Santos".into(),
      grade_level:    "9".into(),
      section:        "Mabini".into(),
      email:          None,
    })
    .await
    .unwrap();

  let patched = s
    .update_student(student.student_id, StudentPatch {
      section: Some("Luna".into()),
      ..Default::default()
    })
    .await
    .unwrap()
    .expect("student exists");
  assert_eq!(patched.section, "Luna");
  assert_eq!(patched.full_name, "Ana Santos");
  assert_eq!(patched.grade_level, "9");

  assert_eq!(s.list_students().await.unwrap().len(), 1);
  assert!(
    s.update_student(Uuid::new_v4(), StudentPatch::default())
      .await
      .unwrap()
      .is_none()
  );
}

// ─── Reports ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fighting_report_is_urgent_and_under_review() {
  let (store, sink, reports, _) = services().await;
  let reporter = Uuid::new_v4();

  let report = reports
    .create_report(new_report(reporter, IncidentType::Fighting))
    .await
    .unwrap();
  assert_eq!(report.status, ReportStatus::UnderReview);
  assert_eq!(report.priority(), Priority::Urgent);

  let stored = store.get_report(report.report_id).await.unwrap().unwrap();
  assert_eq!(stored.status, ReportStatus::UnderReview);
  assert_eq!(stored.location, report.location);
  assert_eq!(stored.review_history.len(), 1);
  assert_eq!(stored.review_history[0].action, ReviewAction::Submitted);

  let events = sink.events();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].0, Audience::Everyone);
  assert_eq!(events[0].1.name(), "report:created");
}

#[tokio::test]
async fn missing_fields_are_rejected_before_storage() {
  let (store, _, reports, _) = services().await;
  let mut input = new_report(Uuid::new_v4(), IncidentType::Theft);
  input.description = String::new();

  let err = reports.create_report(input).await.unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));
  assert!(
    store
      .list_reports(&ReportQuery::default())
      .await
      .unwrap()
      .is_empty()
  );
}

#[tokio::test]
async fn assigned_teacher_gets_a_notification() {
  let (store, sink, reports, _) = services().await;
  let teacher = Uuid::new_v4();
  let mut input = new_report(Uuid::new_v4(), IncidentType::Bullying);
  input.assigned_teacher_id = Some(teacher);

  let report = reports.create_report(input).await.unwrap();

  let inbox = store.list_notifications(teacher, false).await.unwrap();
  assert_eq!(inbox.len(), 1);
  assert_eq!(inbox[0].kind, NotificationKind::ReportAssigned);
  assert_eq!(inbox[0].related_report_id, Some(report.report_id));
  assert!(inbox[0].message.contains("high priority"), "{}", inbox[0].message);

  assert!(
    sink
      .events()
      .iter()
      .any(|(aud, ev)| *aud == Audience::User(teacher) && ev.name() == "notification:received")
  );
}

#[tokio::test]
async fn report_survives_a_notification_failure() {
  let (store, sink, reports, _) = services().await;
  store
    .execute_batch(
      "CREATE TRIGGER inbox_offline BEFORE INSERT ON notifications
       BEGIN SELECT RAISE(ABORT, 'inbox offline'); END;",
    )
    .await
    .unwrap();

  let teacher = Uuid::new_v4();
  let mut input = new_report(Uuid::new_v4(), IncidentType::Harassment);
  input.assigned_teacher_id = Some(teacher);
  let report = reports.create_report(input).await.unwrap();

  assert!(store.get_report(report.report_id).await.unwrap().is_some());
  assert!(store.list_notifications(teacher, false).await.unwrap().is_empty());
  let names: Vec<_> = sink.events().iter().map(|(_, e)| e.name()).collect();
  assert_eq!(names, ["report:created"]);

  let updated = reports
    .update_status(report.report_id, change(ReportStatus::Accepted))
    .await
    .unwrap();
  assert_eq!(updated.status, ReportStatus::Accepted);
  assert!(
    sink
      .events()
      .iter()
      .any(|(_, e)| e.name() == "report:updated")
  );
}

#[tokio::test]
async fn anonymous_reports_are_broadcast_without_the_reporter() {
  let (store, sink, reports, _) = services().await;
  let reporter = Uuid::new_v4();
  let mut input = new_report(reporter, IncidentType::Bullying);
  input.is_anonymous = true;

  let report = reports.create_report(input).await.unwrap();
  reports
    .update_status(report.report_id, change(ReportStatus::Accepted))
    .await
    .unwrap();

  let stored = store.get_report(report.report_id).await.unwrap().unwrap();
  assert_eq!(stored.reporter.reporter_id, reporter);

  let broadcast: Vec<_> = sink
    .events()
    .into_iter()
    .filter(|(aud, _)| *aud == Audience::Everyone)
    .collect();
  assert_eq!(broadcast.len(), 2);
  for (_, event) in &broadcast {
    let (RealtimeEvent::ReportCreated(public) | RealtimeEvent::ReportUpdated(public)) = event
    else {
      panic!("unexpected broadcast {}", event.name());
    };
    assert_eq!(public.reporter.reporter_id, Uuid::nil());
    assert_eq!(public.reporter.name, None);
    assert!(public.review_history.iter().all(|e| e.reviewer_id != reporter));
  }

  // The reporter's own inbox still gets the status notice.
  assert_eq!(store.list_notifications(reporter, false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn accepting_notifies_the_reporter() {
  let (store, sink, reports, _) = services().await;
  let reporter = Uuid::new_v4();
  let report = reports
    .create_report(new_report(reporter, IncidentType::VerbalAbuse))
    .await
    .unwrap();

  let updated = reports
    .update_status(report.report_id, change(ReportStatus::Accepted))
    .await
    .unwrap();
  assert_eq!(updated.status, ReportStatus::Accepted);
  assert_eq!(updated.review_history.len(), 2);

  let stored = store.get_report(report.report_id).await.unwrap().unwrap();
  assert_eq!(stored.status, ReportStatus::Accepted);
  assert_eq!(stored.review_history.len(), 2);
  assert_eq!(stored.review_history[1].action, ReviewAction::Accepted);

  let inbox = store.list_notifications(reporter, true).await.unwrap();
  assert_eq!(inbox.len(), 1);
  assert_eq!(inbox[0].title, "Report Accepted");
  assert!(inbox[0].message.contains("accepted"));

  let targeted: Vec<_> = sink
    .events()
    .into_iter()
    .filter(|(aud, _)| *aud == Audience::User(reporter))
    .collect();
  assert_eq!(targeted.len(), 1);
  assert!(matches!(
    &targeted[0].1,
    RealtimeEvent::NotificationReceived(NotificationPayload::Stored(n)) if n.recipient_id == reporter
  ));
}

#[tokio::test]
async fn decline_reason_survives_later_changes() {
  let (store, _, reports, _) = services().await;
  let reporter = Uuid::new_v4();
  let report = reports
    .create_report(new_report(reporter, IncidentType::Other))
    .await
    .unwrap();

  let mut decline = change(ReportStatus::Declined);
  decline.decline_reason = Some("not enough detail".into());
  reports.update_status(report.report_id, decline).await.unwrap();
  reports
    .update_status(report.report_id, change(ReportStatus::UnderReview))
    .await
    .unwrap();

  let stored = store.get_report(report.report_id).await.unwrap().unwrap();
  assert_eq!(stored.status, ReportStatus::UnderReview);
  assert_eq!(stored.decline_reason.as_deref(), Some("not enough detail"));

  let inbox = store.list_notifications(reporter, false).await.unwrap();
  assert!(
    inbox
      .iter()
      .any(|n| n.message == "Your report has been declined. Reason: not enough detail")
  );
}

#[tokio::test]
async fn review_history_only_grows() {
  let (_, _, reports, _) = services().await;
  let report = reports
    .create_report(new_report(Uuid::new_v4(), IncidentType::Cyberbullying))
    .await
    .unwrap();
  let reviewer = Uuid::new_v4();

  reports
    .add_review_note(report.report_id, reviewer, "Mr. Tan", "spoke with both students")
    .await
    .unwrap();
  reports
    .update_status(report.report_id, change(ReportStatus::Accepted))
    .await
    .unwrap();
  let after = reports.get_report(report.report_id).await.unwrap();

  let actions: Vec<_> = after.review_history.iter().map(|e| e.action).collect();
  assert_eq!(actions, vec![
    ReviewAction::Submitted,
    ReviewAction::NoteAdded,
    ReviewAction::Accepted,
  ]);
  assert_eq!(
    after.review_history[1].notes.as_deref(),
    Some("spoke with both students")
  );
}

#[tokio::test]
async fn blank_note_is_rejected() {
  let (_, _, reports, _) = services().await;
  let report = reports
    .create_report(new_report(Uuid::new_v4(), IncidentType::Theft))
    .await
    .unwrap();
  let err = reports
    .add_review_note(report.report_id, Uuid::new_v4(), "Mr. Tan", "   ")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Validation(_)));
}

#[tokio::test]
async fn unknown_report_is_not_found() {
  let (_, _, reports, _) = services().await;
  let id = Uuid::new_v4();
  assert!(matches!(
    reports.update_status(id, change(ReportStatus::Accepted)).await,
    Err(CoreError::NotFound { entity: "report", .. })
  ));
  assert!(matches!(
    reports.delete_report(id).await,
    Err(CoreError::NotFound { .. })
  ));
}

#[tokio::test]
async fn overdue_only_counts_pending_reports() {
  let (_, _, reports, _) = services().await;
  let four_days_ago = Utc::now() - Duration::days(4);

  let pending = reports
    .create_report_at(new_report(Uuid::new_v4(), IncidentType::Theft), four_days_ago)
    .await
    .unwrap();
  let accepted = reports
    .create_report_at(new_report(Uuid::new_v4(), IncidentType::Theft), four_days_ago)
    .await
    .unwrap();
  reports
    .update_status(accepted.report_id, change(ReportStatus::Accepted))
    .await
    .unwrap();
  reports
    .create_report(new_report(Uuid::new_v4(), IncidentType::Theft))
    .await
    .unwrap();

  let overdue = reports.overdue_reports().await.unwrap();
  let ids: Vec<_> = overdue.iter().map(|r| r.report_id).collect();
  assert_eq!(ids, vec![pending.report_id]);
  assert_eq!(reports.pending_reports().await.unwrap().len(), 2);
}

#[tokio::test]
async fn list_filters_and_order() {
  let (_, _, reports, _) = services().await;
  let alice = Uuid::new_v4();
  let teacher = Uuid::new_v4();
  let base = Utc::now() - Duration::hours(3);

  let first = reports
    .create_report_at(new_report(alice, IncidentType::Theft), base)
    .await
    .unwrap();
  let mut assigned = new_report(Uuid::new_v4(), IncidentType::Bullying);
  assigned.assigned_teacher_id = Some(teacher);
  reports
    .create_report_at(assigned, base + Duration::hours(1))
    .await
    .unwrap();
  let third = reports
    .create_report_at(new_report(alice, IncidentType::Vandalism), base + Duration::hours(2))
    .await
    .unwrap();

  let mine = reports.reports_by_reporter(alice).await.unwrap();
  let ids: Vec<_> = mine.iter().map(|r| r.report_id).collect();
  assert_eq!(ids, vec![third.report_id, first.report_id]);

  assert_eq!(reports.reports_for_teacher(teacher).await.unwrap().len(), 1);

  let limited = reports
    .list_reports(&ReportQuery {
      limit: Some(1),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(limited.len(), 1);
  assert_eq!(limited[0].report_id, third.report_id);
}

#[tokio::test]
async fn deleting_a_report_keeps_its_notifications() {
  let (store, _, reports, _) = services().await;
  let reporter = Uuid::new_v4();
  let report = reports
    .create_report(new_report(reporter, IncidentType::Harassment))
    .await
    .unwrap();
  reports
    .update_status(report.report_id, change(ReportStatus::Accepted))
    .await
    .unwrap();

  reports.delete_report(report.report_id).await.unwrap();
  assert!(store.get_report(report.report_id).await.unwrap().is_none());

  let inbox = store.list_notifications(reporter, false).await.unwrap();
  assert_eq!(inbox.len(), 1);
  assert_eq!(inbox[0].related_report_id, None);
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[tokio::test]
async fn read_flags_are_scoped_to_the_recipient() {
  let (store, _, reports, _) = services().await;
  let reporter = Uuid::new_v4();
  let report = reports
    .create_report(new_report(reporter, IncidentType::Other))
    .await
    .unwrap();
  reports
    .update_status(report.report_id, change(ReportStatus::Accepted))
    .await
    .unwrap();
  reports
    .update_status(report.report_id, change(ReportStatus::Declined))
    .await
    .unwrap();

  let inbox = store.list_notifications(reporter, false).await.unwrap();
  assert_eq!(inbox.len(), 2);
  assert_eq!(inbox[0].kind, NotificationKind::ReportDeclined);

  let someone_else = Uuid::new_v4();
  assert!(
    !store
      .mark_notification_read(inbox[0].notification_id, someone_else)
      .await
      .unwrap()
  );
  assert!(
    store
      .mark_notification_read(inbox[0].notification_id, reporter)
      .await
      .unwrap()
  );
  assert_eq!(store.list_notifications(reporter, true).await.unwrap().len(), 1);

  assert_eq!(store.mark_all_read(reporter).await.unwrap(), 1);
  assert!(store.list_notifications(reporter, true).await.unwrap().is_empty());
}

// ─── Live incidents ──────────────────────────────────────────────────────────

#[tokio::test]
async fn responders_move_incident_between_states() {
  let (store, sink, _, incidents) = services().await;
  let incident = incidents
    .create_incident(new_incident(Uuid::new_v4()))
    .await
    .unwrap();
  assert_eq!(incident.status, IncidentStatus::Active);

  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  incidents
    .respond(incident.incident_id, a, "Mr. Diaz", "teacher")
    .await
    .unwrap();
  let both = incidents
    .respond(incident.incident_id, b, "Ms. Lim", "guidance")
    .await
    .unwrap();
  assert_eq!(both.status, IncidentStatus::Responding);
  assert_eq!(both.responders.len(), 2);

  let dup = incidents
    .respond(incident.incident_id, a, "Mr. Diaz", "teacher")
    .await
    .unwrap_err();
  assert!(matches!(dup, CoreError::Conflict(_)));

  incidents.remove_responder(incident.incident_id, a).await.unwrap();
  let last = incidents.remove_responder(incident.incident_id, b).await.unwrap();
  assert_eq!(last.status, IncidentStatus::Active);

  let stored = store.get_incident(incident.incident_id).await.unwrap().unwrap();
  assert!(stored.responders.is_empty());
  assert_eq!(stored.status, IncidentStatus::Active);

  let names: Vec<_> = sink.events().iter().map(|(_, e)| e.name()).collect();
  assert_eq!(names, vec![
    "incident:created",
    "incident:updated",
    "incident:updated",
    "incident:updated",
    "incident:updated",
  ]);
}

#[tokio::test]
async fn removing_an_absent_responder_publishes_nothing() {
  let (_, sink, _, incidents) = services().await;
  let incident = incidents
    .create_incident(new_incident(Uuid::new_v4()))
    .await
    .unwrap();
  let same = incidents
    .remove_responder(incident.incident_id, Uuid::new_v4())
    .await
    .unwrap();
  assert_eq!(same.status, IncidentStatus::Active);
  assert_eq!(sink.events().len(), 1);
}

#[tokio::test]
async fn resolving_twice_keeps_resolved_and_blocks_responders() {
  let (store, _, _, incidents) = services().await;
  let incident = incidents
    .create_incident(new_incident(Uuid::new_v4()))
    .await
    .unwrap();
  let admin = Uuid::new_v4();

  incidents
    .resolve(incident.incident_id, admin, "Principal Reyes")
    .await
    .unwrap();
  let again = incidents
    .resolve(incident.incident_id, admin, "Principal Reyes")
    .await
    .unwrap();
  assert_eq!(again.status, IncidentStatus::Resolved);
  assert_eq!(
    again.resolution.as_ref().map(|r| r.resolved_by),
    Some(admin)
  );

  let err = incidents
    .respond(incident.incident_id, Uuid::new_v4(), "Late", "teacher")
    .await
    .unwrap_err();
  assert!(matches!(err, CoreError::Conflict(_)));

  let resolved = store
    .list_incidents(Some(IncidentStatus::Resolved))
    .await
    .unwrap();
  assert_eq!(resolved.len(), 1);
  assert!(
    store
      .list_incidents(Some(IncidentStatus::Active))
      .await
      .unwrap()
      .is_empty()
  );
}
