// SPDX-License-Identifier: MIT

//! Runtime settings read from `TASKGRAPH_*` environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::runtime::TaskGraphError;
use crate::taskgraph::workflow::graph::DEFAULT_MAX_STEPS;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATABASE_PATH: &str = "taskgraph.db";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Runs allowed to execute at once; further runs wait for a slot
    pub max_concurrent_executions: usize,
    /// How long finished runs are kept before eviction
    pub execution_ttl: Duration,
    /// Interval between stream updates
    pub poll_interval: Duration,
    /// Node visit cap per run
    pub max_steps: usize,
    /// SQLite file holding graphs and run records
    pub database_path: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_concurrent_executions: 10,
            execution_ttl: Duration::from_secs(3600),
            poll_interval: Duration::from_millis(500),
            max_steps: DEFAULT_MAX_STEPS,
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
        }
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self, TaskGraphError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings using `lookup` to resolve each variable
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TaskGraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_concurrent_executions = parse_var(
            &lookup,
            "TASKGRAPH_MAX_CONCURRENT_EXECUTIONS",
            defaults.max_concurrent_executions,
        )?;
        if max_concurrent_executions == 0 {
            return Err(TaskGraphError::config(
                "TASKGRAPH_MAX_CONCURRENT_EXECUTIONS must be at least 1",
            ));
        }

        let poll_ms: u64 = parse_var(&lookup, "TASKGRAPH_POLL_INTERVAL_MS", 500)?;
        if poll_ms == 0 {
            return Err(TaskGraphError::config(
                "TASKGRAPH_POLL_INTERVAL_MS must be at least 1",
            ));
        }

        Ok(Self {
            host: lookup("TASKGRAPH_HOST")
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .unwrap_or(defaults.host),
            port: parse_var(&lookup, "TASKGRAPH_PORT", defaults.port)?,
            max_concurrent_executions,
            execution_ttl: Duration::from_secs(parse_var(
                &lookup,
                "TASKGRAPH_EXECUTION_TTL_SECS",
                3600,
            )?),
            poll_interval: Duration::from_millis(poll_ms),
            max_steps: parse_var(&lookup, "TASKGRAPH_MAX_STEPS", defaults.max_steps)?,
            database_path: parse_var(
                &lookup,
                "TASKGRAPH_DATABASE_PATH",
                defaults.database_path,
            )?,
        })
    }

    /// Address string suitable for `TcpListener::bind`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, TaskGraphError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| TaskGraphError::config(format!("invalid {} '{}': {}", key, raw, e))),
        _ => Ok(default),
    }
}
