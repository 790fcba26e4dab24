//! vigil-server binary.
//!
//! ```
//! vigil-server --config /etc/vigil/config.toml
//! VIGIL__PORT=8080 vigil-server
//! echo 'open sesame' | vigil-server --hash-password
//! ```
//!
//! `--hash-password` prints the argon2 PHC string to paste into
//! `bootstrap_admin.password_hash`.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vigil_realtime::Broadcaster;
use vigil_server::{ServerConfig, ensure_bootstrap_admin};
use vigil_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Vigil incident reporting server")]
struct Cli {
  /// TOML configuration file; a missing file means defaults plus env.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Hash a password read from stdin, print it, and exit.
  #[arg(long)]
  hash_password: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  if cli.hash_password {
    return print_password_hash();
  }

  let config = ServerConfig::load(&cli.config).context("failed to load configuration")?;
  serve(config).await
}

fn print_password_hash() -> Result<()> {
  use std::io::BufRead as _;

  eprint!("Password: ");
  let mut line = String::new();
  std::io::stdin().lock().read_line(&mut line)?;
  let password = line.trim_end_matches(['\n', '\r']);
  let hash = vigil_api::auth::hash_password(password)
    .map_err(|e| anyhow::anyhow!("could not hash password: {e}"))?;
  println!("{hash}");
  Ok(())
}

async fn serve(config: ServerConfig) -> Result<()> {
  let store_path = config.resolved_store_path();
  if let Some(dir) = store_path.parent().filter(|d| !d.as_os_str().is_empty()) {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {dir:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(admin) = &config.bootstrap_admin {
    ensure_bootstrap_admin(&store, admin)
      .await
      .context("failed to create bootstrap admin")?;
  }

  let hub = Arc::new(Broadcaster::new(config.realtime_buffer));
  let app = vigil_server::app(Arc::new(store), hub, &config);

  let address = config.bind_address();
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;
  tracing::info!(store = ?store_path, "listening on http://{address}");

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      tracing::info!("shutting down");
    })
    .await
    .context("server error")
}
