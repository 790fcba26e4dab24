//! Durable key/value cache backing the offline view.
//!
//! Each key is one JSON file under the cache directory. Writes go through a
//! temporary file and a rename so a crash never leaves a half-written entry.

use std::{io::ErrorKind, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};

pub const REPORTS_KEY: &str = "vigil.reports";
pub const INCIDENTS_KEY: &str = "vigil.incidents";
pub const SESSION_KEY: &str = "vigil.session";

#[derive(Debug, Clone)]
pub struct DurableCache {
  dir: PathBuf,
}

impl DurableCache {
  pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into() } }

  fn path(&self, key: &str) -> PathBuf { self.dir.join(format!("{key}.json")) }

  /// Read the value stored under `key`; `None` if nothing was ever stored.
  pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
    let path = self.path(key);
    let bytes = match tokio::fs::read(&path).await {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(e).with_context(|| format!("failed to read {path:?}")),
    };
    let value = serde_json::from_slice(&bytes)
      .with_context(|| format!("corrupt cache entry {path:?}"))?;
    Ok(Some(value))
  }

  pub async fn store<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
    tokio::fs::create_dir_all(&self.dir)
      .await
      .with_context(|| format!("failed to create {:?}", self.dir))?;
    let path = self.path(key);
    let tmp = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec(value).context("failed to serialise cache entry")?;
    tokio::fs::write(&tmp, bytes)
      .await
      .with_context(|| format!("failed to write {tmp:?}"))?;
    tokio::fs::rename(&tmp, &path)
      .await
      .with_context(|| format!("failed to replace {path:?}"))?;
    Ok(())
  }

  pub async fn remove(&self, key: &str) -> Result<()> {
    let path = self.path(key);
    match tokio::fs::remove_file(&path).await {
      Err(e) if e.kind() != ErrorKind::NotFound => {
        Err(e).with_context(|| format!("failed to remove {path:?}"))
      }
      _ => Ok(()),
    }
  }
}

#[cfg(test)]
pub(crate) fn scratch_cache() -> DurableCache {
  DurableCache::new(std::env::temp_dir().join(format!("vigil-cache-{}", uuid::Uuid::new_v4())))
}
