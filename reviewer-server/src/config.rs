use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use reviewer_core::{EngineConfig, MAX_REVIEWERS};

/// Name of the database file created under `STATE_DIR`.
pub const DATABASE_FILE_NAME: &str = "reviewers.db";

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Explicit database path. Overrides `state_dir` when set.
    pub database_path: Option<PathBuf>,
    /// Reviewers assigned when a pull request is created.
    pub max_reviewers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let database_path = parse_database_path(env::var("DATABASE_PATH").ok());

        let max_reviewers = parse_max_reviewers(env::var("MAX_REVIEWERS").ok())?;

        Ok(Config {
            port,
            state_dir,
            database_path,
            max_reviewers,
        })
    }

    /// Where the SQLite database lives.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.state_dir.join(DATABASE_FILE_NAME))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_reviewers: self.max_reviewers,
        }
    }
}

/// Parse DATABASE_PATH. Blank values are treated as unset.
pub fn parse_database_path(value: Option<String>) -> Option<PathBuf> {
    value.filter(|s| !s.trim().is_empty()).map(PathBuf::from)
}

/// Parse MAX_REVIEWERS, defaulting to 2. Only 1 and 2 are accepted.
pub fn parse_max_reviewers(value: Option<String>) -> Result<usize> {
    let Some(raw) = value.filter(|s| !s.trim().is_empty()) else {
        return Ok(EngineConfig::default().max_reviewers);
    };

    let max = raw
        .trim()
        .parse::<usize>()
        .context("MAX_REVIEWERS must be a valid number")?;
    if max == 0 || max > MAX_REVIEWERS {
        bail!("MAX_REVIEWERS must be between 1 and {}", MAX_REVIEWERS);
    }
    Ok(max)
}
