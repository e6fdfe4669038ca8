// src/batch.rs
use serde::Serialize;
use tracing::{error, info};

use crate::config::CredentialRecord;
use crate::period::ReportingPeriod;
use crate::timewatch::{LoginOutcome, TimeWatchError, TimesheetSession};

/// Guidance returned when TimeWatch rejects the credentials. Rejected logins
/// are a business outcome reported back to the user, not a system error.
pub const LOGIN_FAILED_GUIDANCE: &str = "*There was a problem logging in*.\nPlease check your \
     user name and password and retry.\nnote - There is usually no 0 at the beginning of the ID.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// The recorded result for one processed credential record. Created once,
/// never mutated. Skipped (incomplete) records produce no outcome at all:
/// invalid configuration is not the same thing as an attempted-and-failed
/// submission.
#[derive(Debug, Clone, Serialize)]
pub struct UserOutcome {
    pub user: String,
    pub company: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UserOutcome {
    fn success(record: &CredentialRecord, result: String) -> Self {
        Self {
            user: record.username.clone(),
            company: record.company.clone(),
            status: OutcomeStatus::Success,
            result: Some(result),
            error: None,
        }
    }

    fn error(record: &CredentialRecord, error: String) -> Self {
        Self {
            user: record.username.clone(),
            company: record.company.clone(),
            status: OutcomeStatus::Error,
            result: None,
            error: Some(error),
        }
    }
}

/// Everything the run produced, printed as JSON once the batch completes.
#[derive(Debug, Serialize)]
pub struct BatchSummary {
    pub period: ReportingPeriod,
    pub processed: usize,
    pub outcomes: Vec<UserOutcome>,
}

/// Logs one user in and edits the target month.
///
/// A rejected login returns the fixed guidance text as a normal value and
/// never reaches the edit step. Transport and server faults propagate; the
/// batch loop is the fault-isolation boundary, not this function.
pub async fn run_for_user<S: TimesheetSession>(
    session: &mut S,
    record: &CredentialRecord,
    period: ReportingPeriod,
) -> Result<String, TimeWatchError> {
    info!(
        "Starting timewatch fill for company={}, user={}",
        record.company, record.username
    );

    info!("Attempting to login...");
    match session
        .login(&record.company, &record.username, &record.password)
        .await?
    {
        LoginOutcome::AuthenticationFailed => {
            error!("Login failed for user {}", record.username);
            Ok(LOGIN_FAILED_GUIDANCE.to_string())
        }
        LoginOutcome::Authenticated => {
            info!("Login successful! Starting to edit month {}...", period);
            let text = session.edit_month(period.year, period.month).await?;
            info!("Edit month completed. Result: {}", text);
            Ok(text)
        }
    }
}

/// Processes every credential record sequentially against one shared
/// reporting period, producing an outcome per complete record.
///
/// `new_session` is invoked once per record: sessions carry per-user cookie
/// state and must never be reused across users. Any failure out of the
/// runner, session construction included, is contained here and recorded as
/// an error outcome; one bad user never aborts the rest of the batch.
pub async fn run_batch<S, F>(
    records: &[CredentialRecord],
    period: ReportingPeriod,
    mut new_session: F,
) -> Vec<UserOutcome>
where
    S: TimesheetSession,
    F: FnMut() -> Result<S, TimeWatchError>,
{
    let mut outcomes = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let index = i + 1;
        if !record.is_complete() {
            error!(
                "User {} missing required fields (company, username, password); skipping",
                index
            );
            continue;
        }

        info!(
            "=== Processing user {}/{}: company={}, user={} ===",
            index,
            records.len(),
            record.company,
            record.username
        );

        let attempt = async {
            let mut session = new_session()?;
            run_for_user(&mut session, record, period).await
        };
        match attempt.await {
            Ok(text) => {
                info!("User {} completed successfully", record.username);
                outcomes.push(UserOutcome::success(record, text));
            }
            Err(e) => {
                error!("User {} failed with error: {}", record.username, e);
                outcomes.push(UserOutcome::error(record, e.to_string()));
            }
        }
    }

    info!("Batch finished. Processed {} users", outcomes.len());
    outcomes
}
