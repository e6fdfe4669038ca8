// src/timewatch.rs

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use reqwest::Client;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{FillSettings, OverridePolicy};

// Constants
pub const TIMEWATCH_BASE_URL: &str = "https://c.timewatch.co.il";
const LOGIN_PATH: &str = "/punch/punch2.php";
const DAY_VIEW_PATH: &str = "/punch/editwh2.php";
const DAY_UPDATE_PATH: &str = "/punch/editwh3.php";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY_SECS: u64 = 5;
/// Hours between punch-in and punch-out on a filled day.
const WORK_DAY_HOURS: i64 = 9;

// The login page answers 200 for both outcomes; rejection is only visible in
// the body text.
static LOGIN_REJECTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)login details you entered are incorrect|login failed").unwrap()
});

// A successful login embeds the employee edit link carrying the employee id
// and the session token used by all subsequent punch requests.
static EMPLOYEE_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ee=(\d+)&e=([0-9A-Za-z]+)").unwrap());

// Hidden punch inputs on the day view: entry/exit hour fields with a value
// already present mean the day carries records.
static PUNCH_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name="((?:ehh|xhh)0)"[^>]*value="(\d+)""#).unwrap());

// A non-zero selected absence code marks vacation/sick days.
static ABSENCE_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name="absence"[^>]*value="([1-9]\d*)""#).unwrap());

// --- Error type ---

#[derive(Error, Debug)]
pub enum TimeWatchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("TimeWatch returned an unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid reporting period: year={year}, month={month}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("Not logged in")]
    NotLoggedIn,
}

/// Outcome of a login attempt. Rejected credentials are a business outcome,
/// not a transport fault, so they are a variant here rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    AuthenticationFailed,
}

/// The contract the batch depends on: authenticate once, then populate one
/// month. Implementations hold per-user session state and must not be shared
/// across users.
#[async_trait]
pub trait TimesheetSession {
    async fn login(
        &mut self,
        company: &str,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, TimeWatchError>;

    async fn edit_month(&mut self, year: i32, month: u32) -> Result<String, TimeWatchError>;
}

// --- Client implementation ---

/// What the day view already carries, used to decide whether the override
/// policy lets this run touch the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayState {
    Empty,
    Partial,
    Complete,
    Absence,
}

fn policy_allows(policy: OverridePolicy, state: DayState) -> bool {
    match policy {
        OverridePolicy::All => true,
        OverridePolicy::Incomplete => matches!(state, DayState::Empty | DayState::Partial),
        OverridePolicy::Regular => !matches!(state, DayState::Absence),
    }
}

#[derive(Debug, Clone)]
struct SessionState {
    employee_id: String,
    token: String,
}

pub struct TimeWatchClient {
    http_client: Client,
    settings: FillSettings,
    session: Option<SessionState>,
}

impl TimeWatchClient {
    pub fn new(settings: FillSettings) -> Result<Self, TimeWatchError> {
        // Cookie store keeps the PHP session alive across the punch requests.
        let http_client = Client::builder()
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http_client,
            settings,
            session: None,
        })
    }

    fn punch_times(&self) -> (NaiveTime, NaiveTime) {
        let jitter = self.settings.jitter_minutes;
        let offset = if jitter > 0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0
        };
        let punch_in = self.settings.start_time + Duration::minutes(offset);
        let punch_out = punch_in + Duration::hours(WORK_DAY_HOURS);
        (punch_in, punch_out)
    }

    async fn fetch_day_state(
        &self,
        employee_id: &str,
        token: &str,
        date: NaiveDate,
    ) -> Result<DayState, TimeWatchError> {
        let url = Url::parse_with_params(
            &format!("{}{}", TIMEWATCH_BASE_URL, DAY_VIEW_PATH),
            &[
                ("ee", employee_id),
                ("e", token),
                ("d", &date.format("%Y-%m-%d").to_string()),
            ],
        )?;

        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TimeWatchError::UnexpectedResponse(format!(
                "day view for {} returned HTTP {}",
                date, status
            )));
        }
        let body = response.text().await?;

        if ABSENCE_MARKER_RE.is_match(&body) {
            return Ok(DayState::Absence);
        }

        let mut has_entry = false;
        let mut has_exit = false;
        for caps in PUNCH_FIELD_RE.captures_iter(&body) {
            match &caps[1] {
                "ehh0" => has_entry = true,
                "xhh0" => has_exit = true,
                _ => {}
            }
        }
        let state = match (has_entry, has_exit) {
            (false, false) => DayState::Empty,
            (true, true) => DayState::Complete,
            _ => DayState::Partial,
        };
        Ok(state)
    }

    async fn post_day(&self, form: &[(&str, String)]) -> Result<(), TimeWatchError> {
        let url = format!("{}{}", TIMEWATCH_BASE_URL, DAY_UPDATE_PATH);
        let response = self.http_client.post(&url).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TimeWatchError::UnexpectedResponse(format!(
                "day update returned HTTP {}",
                status
            )));
        }
        let body = response.text().await?;
        if LOGIN_REJECTED_RE.is_match(&body) {
            // Session expired mid-run; surfaces as a per-user failure.
            return Err(TimeWatchError::NotLoggedIn);
        }
        Ok(())
    }

    async fn fill_day(
        &self,
        employee_id: &str,
        token: &str,
        date: NaiveDate,
    ) -> Result<(), TimeWatchError> {
        let (punch_in, punch_out) = self.punch_times();
        let form = [
            ("e", employee_id.to_string()),
            ("tl", token.to_string()),
            ("d", date.format("%Y-%m-%d").to_string()),
            ("ehh0", punch_in.format("%H").to_string()),
            ("emm0", punch_in.format("%M").to_string()),
            ("xhh0", punch_out.format("%H").to_string()),
            ("xmm0", punch_out.format("%M").to_string()),
        ];

        let mut attempt = 0;
        loop {
            match self.post_day(&form).await {
                Ok(()) => {
                    debug!(
                        "Punched {} as {}-{}",
                        date,
                        punch_in.format("%H:%M"),
                        punch_out.format("%H:%M")
                    );
                    return Ok(());
                }
                Err(e) if attempt < self.settings.retries => {
                    attempt += 1;
                    warn!(
                        "Punch for {} failed ({}); retrying {}/{}",
                        date, e, attempt, self.settings.retries
                    );
                    sleep(std::time::Duration::from_secs(RETRY_DELAY_SECS)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl TimesheetSession for TimeWatchClient {
    async fn login(
        &mut self,
        company: &str,
        username: &str,
        password: &str,
    ) -> Result<LoginOutcome, TimeWatchError> {
        let url = format!("{}{}", TIMEWATCH_BASE_URL, LOGIN_PATH);
        let params = [("comp", company), ("name", username), ("pw", password)];

        let response = self.http_client.post(&url).form(&params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TimeWatchError::UnexpectedResponse(format!(
                "login returned HTTP {}",
                status
            )));
        }
        let body = response.text().await?;

        if LOGIN_REJECTED_RE.is_match(&body) {
            return Ok(LoginOutcome::AuthenticationFailed);
        }

        let Some(caps) = EMPLOYEE_LINK_RE.captures(&body) else {
            return Err(TimeWatchError::UnexpectedResponse(
                "login response carried no employee edit link".to_string(),
            ));
        };
        self.session = Some(SessionState {
            employee_id: caps[1].to_string(),
            token: caps[2].to_string(),
        });
        debug!("Session established for company={}, user={}", company, username);
        Ok(LoginOutcome::Authenticated)
    }

    async fn edit_month(&mut self, year: i32, month: u32) -> Result<String, TimeWatchError> {
        let (employee_id, token) = match &self.session {
            Some(s) => (s.employee_id.clone(), s.token.clone()),
            None => return Err(TimeWatchError::NotLoggedIn),
        };

        let first_day = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(TimeWatchError::InvalidPeriod { year, month })?;
        let first_of_next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or(TimeWatchError::InvalidPeriod { year, month })?;

        info!("Editing month {:04}-{:02}", year, month);

        let mut working_days = 0usize;
        let mut filled = 0usize;
        let mut left_as_is = 0usize;

        let mut date = first_day;
        while date < first_of_next {
            if self.settings.days_off.contains(&date.weekday()) {
                date = date.succ_opt().expect("date overflow walking month");
                continue;
            }
            working_days += 1;

            let state = self.fetch_day_state(&employee_id, &token, date).await?;
            if policy_allows(self.settings.override_policy, state) {
                self.fill_day(&employee_id, &token, date).await?;
                filled += 1;
            } else {
                debug!(
                    "Skipping {} ({:?} under {:?})",
                    date, state, self.settings.override_policy
                );
                left_as_is += 1;
            }

            date = date.succ_opt().expect("date overflow walking month");
        }

        Ok(format!(
            "Filled {} of {} working days for {:04}-{:02} ({} left as-is)",
            filled, working_days, year, month, left_as_is
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_policy_only_touches_unfinished_days() {
        assert!(policy_allows(OverridePolicy::Incomplete, DayState::Empty));
        assert!(policy_allows(OverridePolicy::Incomplete, DayState::Partial));
        assert!(!policy_allows(OverridePolicy::Incomplete, DayState::Complete));
        assert!(!policy_allows(OverridePolicy::Incomplete, DayState::Absence));
    }

    #[test]
    fn test_regular_policy_spares_absence_days() {
        assert!(policy_allows(OverridePolicy::Regular, DayState::Complete));
        assert!(!policy_allows(OverridePolicy::Regular, DayState::Absence));
    }

    #[test]
    fn test_all_policy_touches_everything() {
        for state in [
            DayState::Empty,
            DayState::Partial,
            DayState::Complete,
            DayState::Absence,
        ] {
            assert!(
                policy_allows(OverridePolicy::All, state),
                "'all' should override {:?} days",
                state
            );
        }
    }

    #[test]
    fn test_punch_times_stay_within_jitter_range() {
        let mut settings = FillSettings::default();
        settings.jitter_minutes = 10;
        let client = TimeWatchClient::new(settings.clone()).unwrap();

        for _ in 0..50 {
            let (punch_in, punch_out) = client.punch_times();
            let offset = punch_in.signed_duration_since(settings.start_time);
            assert!(
                offset.num_minutes().abs() <= settings.jitter_minutes,
                "punch-in {} drifted more than {} minutes from {}",
                punch_in,
                settings.jitter_minutes,
                settings.start_time
            );
            assert_eq!(
                punch_out.signed_duration_since(punch_in).num_hours(),
                WORK_DAY_HOURS
            );
        }
    }

    #[test]
    fn test_zero_jitter_punches_exactly_at_start_time() {
        let mut settings = FillSettings::default();
        settings.jitter_minutes = 0;
        let client = TimeWatchClient::new(settings.clone()).unwrap();
        let (punch_in, _) = client.punch_times();
        assert_eq!(punch_in, settings.start_time);
    }
}
