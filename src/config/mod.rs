//! Config module - process settings and asset kinds
//!
//! This module contains the following submodules:
//! - `kinds`: Per-kind settings, versions and the registry
//! - `manifest`: Loading kinds from a JSON file

pub mod kinds;
pub mod manifest;

use anyhow::{Context, Result};
use dotenv::dotenv;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::{CURRENT_NUM_THREADS, DEFAULT_STAGING_DIR};

const ENV_PREFIX: &str = "MAGPIE_";

/// Settings for the worker binary, read from `MAGPIE_*` variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Fallback staging directory for kinds that do not name one.
    pub staging_dir: PathBuf,
    /// Root of the filesystem object store.
    pub store_root: PathBuf,
    /// Use an HTTP object store at this endpoint instead of `store_root`.
    pub store_endpoint: Option<String>,
    pub database_path: PathBuf,
    pub kinds_path: Option<PathBuf>,
    pub hostname: String,
    pub poll_interval_ms: u64,
    pub worker_threads: usize,
    pub visibility_timeout_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
            store_root: PathBuf::from("./object"),
            store_endpoint: None,
            database_path: PathBuf::from("./db/magpie.redb"),
            kinds_path: None,
            hostname: local_hostname(),
            poll_interval_ms: 1000,
            worker_threads: *CURRENT_NUM_THREADS,
            visibility_timeout_ms: 5 * 60 * 1000,
        }
    }
}

impl AppConfig {
    /// Read `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        envy::prefixed(ENV_PREFIX)
            .from_env::<AppConfig>()
            .context("failed to read MAGPIE_* configuration")
    }

    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter::<_, AppConfig>(pairs)
            .context("failed to read MAGPIE_* configuration")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_millis(self.visibility_timeout_ms)
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
