// src/config.rs
use std::env;

use chrono::{NaiveTime, Weekday};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, Level};

pub const ENV_USERS: &str = "TIMEWATCH_USERS";
pub const ENV_COMPANY: &str = "TIMEWATCH_COMPANY";
pub const ENV_USERNAME: &str = "TIMEWATCH_USERNAME";
pub const ENV_PASSWORD: &str = "TIMEWATCH_PASSWORD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse TIMEWATCH_USERS JSON: {0}")]
    InvalidUsersJson(#[from] serde_json::Error),

    #[error(
        "Missing credential configuration: set TIMEWATCH_USERS (JSON array) or \
         TIMEWATCH_COMPANY, TIMEWATCH_USERNAME and TIMEWATCH_PASSWORD"
    )]
    MissingCredentials,
}

/// One (company, username, password) triple identifying a TimeWatch account.
///
/// Fields absent from the JSON form deserialize as empty strings; the batch
/// skips incomplete records instead of failing the whole run on them.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialRecord {
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl CredentialRecord {
    pub fn is_complete(&self) -> bool {
        !self.company.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Resolves the credential records to process, in configuration order.
///
/// `TIMEWATCH_USERS` (JSON array) takes precedence over the single-user
/// variables even when both are set. Malformed JSON is fatal: an explicit
/// multi-user configuration must not silently degrade to zero users, so
/// there is no fallback to the single-user form in that case.
pub fn resolve_credentials() -> Result<Vec<CredentialRecord>, ConfigError> {
    if let Some(users_json) = env::var(ENV_USERS).ok().filter(|v| !v.is_empty()) {
        let users: Vec<CredentialRecord> = serde_json::from_str(&users_json)?;
        info!("Loaded {} users from {}", users.len(), ENV_USERS);
        return Ok(users);
    }

    let company = env::var(ENV_COMPANY).ok().filter(|v| !v.is_empty());
    let username = env::var(ENV_USERNAME).ok().filter(|v| !v.is_empty());
    let password = env::var(ENV_PASSWORD).ok().filter(|v| !v.is_empty());

    if let (Some(company), Some(username), Some(password)) = (company, username, password) {
        info!("Loaded single user from individual env vars");
        return Ok(vec![CredentialRecord {
            company,
            username,
            password,
        }]);
    }

    Err(ConfigError::MissingCredentials)
}

/// Which already-recorded days a run may overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverridePolicy {
    /// Overwrite every working day. Unsafe to vacation/sick days.
    All,
    /// Only overwrite days with partial records.
    Incomplete,
    /// Only overwrite regular days, i.e. days without an absence reason.
    Regular,
}

/// Operational knobs for a fill run.
///
/// These were fixed literals at the call site historically; they live in one
/// injected structure now so a configuration surface can grow around them
/// without touching the runner.
#[derive(Debug, Clone)]
pub struct FillSettings {
    pub override_policy: OverridePolicy,
    /// Nominal punch-in time before jitter is applied.
    pub start_time: NaiveTime,
    /// Weekdays never punched (TimeWatch serves Israeli companies, so the
    /// weekend is Friday/Saturday).
    pub days_off: Vec<Weekday>,
    /// Random punch-time offset range, in minutes either way.
    pub jitter_minutes: i64,
    /// Additional attempts after a failed day update.
    pub retries: u32,
    pub log_level: Level,
}

impl Default for FillSettings {
    fn default() -> Self {
        Self {
            override_policy: OverridePolicy::Incomplete,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            days_off: vec![Weekday::Fri, Weekday::Sat],
            jitter_minutes: 10,
            retries: 2,
            log_level: Level::DEBUG,
        }
    }
}
