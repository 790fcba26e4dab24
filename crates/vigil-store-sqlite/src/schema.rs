//! SQL schema for the Vigil SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id        TEXT PRIMARY KEY,
    email          TEXT NOT NULL UNIQUE,
    full_name      TEXT NOT NULL,
    role           TEXT NOT NULL,   -- 'student' | 'teacher' | 'guidance' | 'principal' | 'admin'
    external_code  TEXT UNIQUE,     -- student or employee number
    password_hash  TEXT NOT NULL,   -- argon2 PHC string
    created_at     TEXT NOT NULL
);

-- Bearer tokens are never stored; only their SHA-256.
CREATE TABLE IF NOT EXISTS sessions (
    token_hash  TEXT PRIMARY KEY,
    user_id     TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    expires_at  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS students (
    student_id      TEXT PRIMARY KEY,
    student_number  TEXT NOT NULL UNIQUE,
    full_name       TEXT NOT NULL,
    grade_level     TEXT NOT NULL,
    section         TEXT NOT NULL,
    email           TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS incident_reports (
    report_id               TEXT PRIMARY KEY,
    reporter_id             TEXT NOT NULL,
    reporter_name           TEXT,
    reporter_grade_section  TEXT,
    victim_name             TEXT,
    building                TEXT NOT NULL,
    floor                   TEXT,
    room                    TEXT,
    incident_type           TEXT NOT NULL,
    description             TEXT NOT NULL,
    incident_at             TEXT,
    is_anonymous            INTEGER NOT NULL DEFAULT 0,
    reporting_for_self      INTEGER NOT NULL DEFAULT 0,
    status                  TEXT NOT NULL DEFAULT 'under_review',
    assigned_teacher_id     TEXT,
    admin_notes             TEXT,
    decline_reason          TEXT,
    created_at              TEXT NOT NULL,
    updated_at              TEXT NOT NULL
);

-- Append-only. Rows are only removed together with their report.
CREATE TABLE IF NOT EXISTS report_review_history (
    entry_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id      TEXT NOT NULL REFERENCES incident_reports(report_id) ON DELETE CASCADE,
    reviewer_id    TEXT NOT NULL,
    reviewer_name  TEXT NOT NULL,
    action         TEXT NOT NULL,   -- 'submitted' | 'reviewed' | 'accepted' | 'declined' | 'note_added'
    notes          TEXT,
    recorded_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    notification_id    TEXT PRIMARY KEY,
    recipient_id       TEXT NOT NULL,
    title              TEXT NOT NULL,
    message            TEXT NOT NULL,
    kind               TEXT NOT NULL,
    related_report_id  TEXT REFERENCES incident_reports(report_id) ON DELETE SET NULL,
    is_read            INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS live_incidents (
    incident_id    TEXT PRIMARY KEY,
    reporter_id    TEXT NOT NULL,
    reporter_name  TEXT NOT NULL,
    building       TEXT NOT NULL,
    floor          TEXT,
    room           TEXT,
    incident_type  TEXT NOT NULL,
    description    TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'active',
    responders     TEXT NOT NULL DEFAULT '[]',   -- JSON array of Responder
    resolution     TEXT,                         -- JSON Resolution or NULL
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS reports_status_idx    ON incident_reports(status, created_at);
CREATE INDEX IF NOT EXISTS reports_reporter_idx  ON incident_reports(reporter_id);
CREATE INDEX IF NOT EXISTS reports_teacher_idx   ON incident_reports(assigned_teacher_id);
CREATE INDEX IF NOT EXISTS history_report_idx    ON report_review_history(report_id);
CREATE INDEX IF NOT EXISTS notifications_rcpt_idx ON notifications(recipient_id, is_read);
CREATE INDEX IF NOT EXISTS incidents_status_idx  ON live_incidents(status);

PRAGMA user_version = 1;
";
