//! `vigil`: command-line client for the Vigil incident reporting server.
//!
//! Keeps a durable copy of the last fetched reports and incidents so the
//! lists stay readable while the server is unreachable.
//!
//! # Usage
//!
//! ```
//! vigil login admin@school.edu
//! vigil reports --status under_review
//! vigil submit fighting "two students fighting" --building Main --floor 2
//! vigil watch
//! ```

mod cache;
mod client;
mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use cache::{DurableCache, SESSION_KEY};
use chrono::Utc;
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig, IncidentDraft, LoginResponse, ReportDraft, StatusUpdate};
use serde::Deserialize;
use sync::{Applied, Freshness, IncidentSync, POLL_INTERVAL, ReportSync};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vigil_core::{
  incident::LiveIncident,
  report::{IncidentReport, IncidentType, Location, ReportStatus},
  user::User,
};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vigil", about = "Client for the Vigil incident reporting server")]
struct Args {
  /// Path to a TOML config file (url, token, cache_dir).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the vigil server (default: http://localhost:3000).
  #[arg(long, env = "VIGIL_URL")]
  url: Option<String>,

  /// Bearer token; overrides the session saved by `login`.
  #[arg(long, env = "VIGIL_TOKEN")]
  token: Option<String>,

  /// Directory for the offline cache.
  #[arg(long, env = "VIGIL_CACHE_DIR")]
  cache_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(clap::Args, Debug)]
struct Place {
  #[arg(long)]
  building: String,
  #[arg(long)]
  floor:    Option<String>,
  #[arg(long)]
  room:     Option<String>,
}

impl From<Place> for Location {
  fn from(place: Place) -> Self {
    Self {
      building: place.building,
      floor:    place.floor,
      room:     place.room,
    }
  }
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sign in and remember the session.
  Login {
    /// Email, student number or employee number.
    identifier: String,
    /// Read from stdin when omitted.
    #[arg(long)]
    password:   Option<String>,
  },
  /// Forget the saved session.
  Logout,
  /// List incident reports.
  Reports {
    #[arg(long)]
    status:  Option<ReportStatus>,
    /// Only reports assigned to this teacher.
    #[arg(long)]
    teacher: Option<Uuid>,
    /// Only reports filed by the signed-in user.
    #[arg(long)]
    mine:    bool,
    /// Only reports pending for more than three days.
    #[arg(long)]
    overdue: bool,
  },
  /// File an incident report.
  Submit {
    incident_type: IncidentType,
    description:   String,
    #[command(flatten)]
    place:         Place,
    #[arg(long)]
    victim:        Option<String>,
    #[arg(long)]
    anonymous:     bool,
    #[arg(long)]
    for_self:      bool,
    #[arg(long)]
    teacher:       Option<Uuid>,
    #[arg(long)]
    grade_section: Option<String>,
  },
  /// Move a report to a new status.
  Review {
    report_id: Uuid,
    status:    ReportStatus,
    #[arg(long)]
    notes:     Option<String>,
    #[arg(long)]
    reason:    Option<String>,
  },
  /// List live incidents.
  Incidents {
    /// Hide resolved incidents.
    #[arg(long)]
    active: bool,
  },
  /// Raise a live incident alert.
  Alert {
    incident_type: IncidentType,
    description:   String,
    #[command(flatten)]
    place:         Place,
  },
  /// Join the responders of a live incident.
  Respond { incident_id: Uuid },
  /// Mark a live incident resolved.
  Resolve { incident_id: Uuid },
  /// Poll reports and incidents until interrupted.
  Watch,
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:       String,
  #[serde(default)]
  token:     String,
  cache_dir: Option<PathBuf>,
}

fn default_cache_dir() -> PathBuf {
  std::env::var("HOME")
    .map(|home| PathBuf::from(home).join(".cache").join("vigil"))
    .unwrap_or_else(|_| PathBuf::from(".vigil-cache"))
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let base_url = args
    .url
    .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
    .unwrap_or_else(|| "http://localhost:3000".to_string());
  let token = args
    .token
    .or_else(|| (!file_cfg.token.is_empty()).then(|| file_cfg.token.clone()));
  let cache = DurableCache::new(
    args
      .cache_dir
      .or(file_cfg.cache_dir)
      .unwrap_or_else(default_cache_dir),
  );

  let client = ApiClient::new(ApiConfig {
    base_url,
    token: token.clone(),
  })?;

  match args.command {
    Command::Login {
      identifier,
      password,
    } => {
      let password = match password {
        Some(p) => p,
        None => read_password()?,
      };
      let session = client.login(&identifier, &password).await?;
      cache.store(SESSION_KEY, &session).await?;
      println!(
        "signed in as {} ({}), session valid until {}",
        session.user.full_name, session.user.role, session.expires_at
      );
    }
    Command::Logout => {
      cache.remove(SESSION_KEY).await?;
      println!("session forgotten");
    }
    command => {
      let (client, me) = identity(client, token, &cache).await?;
      run(command, client, me, cache).await?;
    }
  }

  Ok(())
}

/// Resolve who is signed in: the saved session, or `GET /auth/me` when a
/// token was supplied explicitly.
async fn identity(
  client: ApiClient,
  token: Option<String>,
  cache: &DurableCache,
) -> Result<(ApiClient, User)> {
  let session: Option<LoginResponse> = cache.load(SESSION_KEY).await?;
  match (token, session) {
    (Some(token), Some(session)) if session.token == token => Ok((client, session.user)),
    (Some(_), _) => {
      let me = client.me().await.context("token was rejected")?;
      Ok((client, me))
    }
    (None, Some(session)) => {
      if session.expires_at <= Utc::now() {
        return Err(anyhow!("session expired, run `vigil login` again"));
      }
      Ok((client.with_token(session.token), session.user))
    }
    (None, None) => Err(anyhow!("not signed in, run `vigil login` first")),
  }
}

async fn run(command: Command, client: ApiClient, me: User, cache: DurableCache) -> Result<()> {
  let mut reports = ReportSync::new(client.clone(), cache.clone(), me.clone());
  let mut incidents = IncidentSync::new(client, cache, me.clone());

  match command {
    Command::Reports {
      status,
      teacher,
      mine,
      overdue,
    } => {
      note_freshness(reports.refresh().await);
      let now = Utc::now();
      let mut selected: Vec<&IncidentReport> = match (teacher, status) {
        (Some(teacher), _) => reports.for_teacher(teacher),
        (None, Some(status)) => reports.by_status(status),
        (None, None) if mine => reports.by_reporter(me.user_id),
        (None, None) if overdue => reports.overdue(now),
        (None, None) => reports.reports().iter().collect(),
      };
      selected.retain(|r| {
        status.is_none_or(|s| r.status == s)
          && (!mine || r.reporter.reporter_id == me.user_id)
          && (!overdue || r.is_overdue(now))
      });
      if selected.is_empty() {
        println!("no reports");
      }
      for report in selected {
        print_report(report);
      }
    }
    Command::Submit {
      incident_type,
      description,
      place,
      victim,
      anonymous,
      for_self,
      teacher,
      grade_section,
    } => {
      let (report, applied) = reports
        .submit(ReportDraft {
          incident_type,
          description,
          location: place.into(),
          victim_name: victim,
          is_anonymous: anonymous,
          reporting_for_self: for_self,
          assigned_teacher_id: teacher,
          grade_section,
        })
        .await?;
      note_applied(applied);
      print_report(&report);
    }
    Command::Review {
      report_id,
      status,
      notes,
      reason,
    } => {
      reports.refresh().await;
      let (report, applied) = reports
        .update_status(report_id, StatusUpdate {
          status,
          notes,
          decline_reason: reason,
        })
        .await?;
      note_applied(applied);
      print_report(&report);
    }
    Command::Incidents { active } => {
      note_freshness(incidents.refresh().await);
      let selected: Vec<&LiveIncident> = if active {
        incidents.active()
      } else {
        incidents.incidents().iter().collect()
      };
      if selected.is_empty() {
        println!("no incidents");
      }
      for incident in selected {
        print_incident(incident);
      }
    }
    Command::Alert {
      incident_type,
      description,
      place,
    } => {
      let (incident, applied) = incidents
        .raise(IncidentDraft {
          incident_type,
          description,
          location: place.into(),
        })
        .await?;
      note_applied(applied);
      print_incident(&incident);
    }
    Command::Respond { incident_id } => {
      incidents.refresh().await;
      let (incident, applied) = incidents.respond(incident_id).await?;
      note_applied(applied);
      print_incident(&incident);
    }
    Command::Resolve { incident_id } => {
      incidents.refresh().await;
      let (incident, applied) = incidents.resolve(incident_id).await?;
      note_applied(applied);
      print_incident(&incident);
    }
    Command::Watch => watch(&mut reports, &mut incidents).await,
    Command::Login { .. } | Command::Logout => {}
  }
  Ok(())
}

async fn watch(reports: &mut ReportSync<ApiClient>, incidents: &mut IncidentSync<ApiClient>) {
  let mut ticker = tokio::time::interval(POLL_INTERVAL);
  loop {
    tokio::select! {
      _ = ticker.tick() => {}
      _ = tokio::signal::ctrl_c() => return,
    }
    let freshness = reports.refresh().await;
    incidents.refresh().await;
    let now = Utc::now();
    println!(
      "[{}] {} pending ({} overdue), {} active incidents{}",
      now.format("%H:%M:%S"),
      reports.by_status(ReportStatus::UnderReview).len(),
      reports.overdue(now).len(),
      incidents.active().len(),
      match freshness {
        Freshness::Live => "",
        Freshness::Cached => " (offline)",
      }
    );
  }
}

// ─── Output ───────────────────────────────────────────────────────────────────

fn note_freshness(freshness: Freshness) {
  if freshness == Freshness::Cached {
    eprintln!("server unreachable, showing cached data");
  }
}

fn note_applied(applied: Applied) {
  if applied == Applied::LocalOnly {
    eprintln!("server unreachable, change kept locally only");
  }
}

fn print_report(report: &IncidentReport) {
  println!(
    "{}  {:<12} {:<7} {:<16} {}  {}",
    report.report_id,
    report.status,
    report.priority(),
    report.incident_type,
    report.location.building,
    report
      .reporter
      .name
      .as_deref()
      .unwrap_or("Anonymous"),
  );
}

fn print_incident(incident: &LiveIncident) {
  println!(
    "{}  {:<10} {:<16} {}  {} responder(s)",
    incident.incident_id,
    incident.status,
    incident.incident_type,
    incident.location.building,
    incident.responders.len(),
  );
}

/// Read a password from stdin.
fn read_password() -> Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}
