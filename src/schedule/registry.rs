//! Per-agent scheduled jobs.

use chrono::{DateTime, NaiveDateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Schedule failures. No job is created when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid delay \"{0}\": expected a non-negative number of seconds")]
    InvalidSeconds(String),

    #[error("invalid datetime \"{0}\": expected an ISO-8601 timestamp")]
    InvalidDatetime(String),

    #[error("instant {0} is in the past")]
    InstantInPast(DateTime<Utc>),

    #[error("invalid cron pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("cron pattern \"{0}\" never fires")]
    NeverFires(String),

    #[error("unknown schedule type \"{0}\"")]
    UnknownKind(String),
}

/// How the schedule value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleKind {
    /// Recurring cron expression.
    CronPattern,
    /// One-time absolute instant.
    IsoDatetime,
    /// One-time delay in seconds from now.
    Seconds,
}

impl ScheduleKind {
    pub fn is_one_time(self) -> bool {
        !matches!(self, ScheduleKind::CronPattern)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleKind::CronPattern => "cron-pattern",
            ScheduleKind::IsoDatetime => "iso-datetime",
            ScheduleKind::Seconds => "seconds",
        }
    }
}

impl FromStr for ScheduleKind {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cron-pattern" => Ok(ScheduleKind::CronPattern),
            "iso-datetime" => Ok(ScheduleKind::IsoDatetime),
            "seconds" => Ok(ScheduleKind::Seconds),
            _ => Err(ScheduleError::UnknownKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload delivered to the owner when a job fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledFire {
    pub job_id: String,
    pub job_name: String,
    pub message: String,
}

/// Callback invoked on every firing.
///
/// Runs while the registry lock is held, so it must not call back into the
/// registry. Pushing onto a channel is the intended use.
pub type FireCallback = Arc<dyn Fn(ScheduledFire) + Send + Sync>;

#[derive(Debug, Clone)]
enum Trigger {
    At(DateTime<Utc>),
    Recurring(Schedule),
}

impl Trigger {
    fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::At(at) => Some(*at),
            Trigger::Recurring(schedule) => schedule.after(&now).next(),
        }
    }
}

/// A live job owned by a registry.
#[derive(Debug)]
struct ScheduledJob {
    info: JobInfo,
    trigger: Trigger,
    handle: JoinHandle<()>,
}

/// Snapshot of a scheduled job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub id: String,
    pub name: String,
    pub message: String,
    pub kind: ScheduleKind,
    /// Schedule value as given by the caller.
    pub schedule: String,
    pub one_time: bool,
    pub next_run: Option<DateTime<Utc>>,
}

impl std::fmt::Display for JobInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let next = self
            .next_run
            .map(|n| n.to_rfc3339())
            .unwrap_or_else(|| "none".to_string());
        write!(
            f,
            "- {} \"{}\" | {}: {} | next: {} | {}",
            self.id,
            self.name,
            self.kind,
            self.schedule,
            next,
            if self.one_time { "one-time" } else { "recurring" }
        )
    }
}

/// Result of a successful `schedule` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheduled {
    pub job_id: String,
    pub next_run: Option<DateTime<Utc>>,
}

type JobMap = HashMap<String, ScheduledJob>;

/// Timers owned by one agent. No job is visible outside its registry.
pub struct ScheduleRegistry {
    agent_name: String,
    jobs: Arc<Mutex<JobMap>>,
    on_fire: FireCallback,
}

impl ScheduleRegistry {
    /// Create an empty registry for `agent_name`.
    pub fn new(agent_name: impl Into<String>, on_fire: FireCallback) -> Self {
        Self {
            agent_name: agent_name.into(),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            on_fire,
        }
    }

    /// Schedule a job. Must be called from within a tokio runtime.
    pub fn schedule(
        &self,
        name: &str,
        message: &str,
        kind: ScheduleKind,
        value: &str,
    ) -> Result<Scheduled, ScheduleError> {
        let now = Utc::now();
        let trigger = match kind {
            ScheduleKind::Seconds => Trigger::At(parse_delay(value, now)?),
            ScheduleKind::IsoDatetime => {
                let at = parse_instant(value)?;
                if at <= now {
                    return Err(ScheduleError::InstantInPast(at));
                }
                Trigger::At(at)
            }
            ScheduleKind::CronPattern => Trigger::Recurring(parse_pattern(value)?),
        };

        let next_run = trigger.next_after(now);
        if next_run.is_none() {
            return Err(ScheduleError::NeverFires(value.to_string()));
        }

        let job_id = format!("{}-{}", self.agent_name, uuid::Uuid::new_v4());
        let fire = ScheduledFire {
            job_id: job_id.clone(),
            job_name: name.to_string(),
            message: message.to_string(),
        };

        // Hold the lock across spawn + insert so the timer can never observe
        // the map before its own job is in it.
        let mut jobs = lock(&self.jobs);
        let handle = match &trigger {
            Trigger::At(at) => spawn_one_time(*at, fire, Arc::clone(&self.jobs), Arc::clone(&self.on_fire)),
            Trigger::Recurring(schedule) => spawn_recurring(
                schedule.clone(),
                fire,
                Arc::clone(&self.jobs),
                Arc::clone(&self.on_fire),
            ),
        };

        let info = JobInfo {
            id: job_id.clone(),
            name: name.to_string(),
            message: message.to_string(),
            kind,
            schedule: value.to_string(),
            one_time: kind.is_one_time(),
            next_run,
        };
        jobs.insert(
            job_id.clone(),
            ScheduledJob {
                info,
                trigger,
                handle,
            },
        );

        tracing::debug!(
            agent = %self.agent_name,
            job_id = %job_id,
            kind = %kind,
            "Scheduled job \"{}\"",
            name
        );

        Ok(Scheduled { job_id, next_run })
    }

    /// Snapshot of every job with its next fire time.
    pub fn list(&self) -> Vec<JobInfo> {
        let now = Utc::now();
        let jobs = lock(&self.jobs);
        let mut out: Vec<JobInfo> = jobs
            .values()
            .map(|job| JobInfo {
                next_run: job.trigger.next_after(now),
                ..job.info.clone()
            })
            .collect();
        out.sort_by(|a, b| a.next_run.cmp(&b.next_run).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        lock(&self.jobs).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop and remove a job. Returns `None` if the id is unknown.
    pub fn cancel(&self, job_id: &str) -> Option<JobInfo> {
        let job = lock(&self.jobs).remove(job_id)?;
        job.handle.abort();
        tracing::debug!(agent = %self.agent_name, job_id = %job_id, "Cancelled job");
        Some(job.info)
    }

    /// Stop and remove every job.
    pub fn cleanup(&self) {
        let mut jobs = lock(&self.jobs);
        let count = jobs.len();
        for (_, job) in jobs.drain() {
            job.handle.abort();
        }
        if count > 0 {
            tracing::debug!(agent = %self.agent_name, "Cleared {} scheduled job(s)", count);
        }
    }
}

impl Drop for ScheduleRegistry {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn lock(jobs: &Mutex<JobMap>) -> MutexGuard<'_, JobMap> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

fn spawn_one_time(
    at: DateTime<Utc>,
    fire: ScheduledFire,
    jobs: Arc<Mutex<JobMap>>,
    on_fire: FireCallback,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        sleep_until(at).await;
        let mut jobs = lock(&jobs);
        // Removal and callback happen under one lock.
        if jobs.remove(&fire.job_id).is_some() {
            tracing::debug!(job_id = %fire.job_id, "One-time job fired");
            on_fire(fire);
        }
    })
}

fn spawn_recurring(
    schedule: Schedule,
    fire: ScheduledFire,
    jobs: Arc<Mutex<JobMap>>,
    on_fire: FireCallback,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cursor = Utc::now();
        while let Some(next) = schedule.after(&cursor).next() {
            sleep_until(next).await;
            {
                let jobs = lock(&jobs);
                if !jobs.contains_key(&fire.job_id) {
                    break;
                }
                tracing::debug!(job_id = %fire.job_id, "Recurring job fired");
                on_fire(fire.clone());
            }
            cursor = next;
        }
    })
}

async fn sleep_until(at: DateTime<Utc>) {
    let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(delay).await;
}

fn parse_delay(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
    let invalid = || ScheduleError::InvalidSeconds(value.to_string());
    let secs: u64 = value.trim().parse().map_err(|_| invalid())?;
    let secs = i64::try_from(secs).map_err(|_| invalid())?;
    chrono::Duration::try_seconds(secs)
        .and_then(|delay| now.checked_add_signed(delay))
        .ok_or_else(invalid)
}

/// Parse an ISO-8601 instant. Values without an offset are taken as UTC.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, ScheduleError> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(ScheduleError::InvalidDatetime(value.to_string()))
}

/// Parse a cron pattern. Five-field patterns get a zero seconds field.
pub fn parse_pattern(value: &str) -> Result<Schedule, ScheduleError> {
    let fields = value.split_whitespace().count();
    let normalized = match fields {
        5 => format!("0 {}", value.trim()),
        6 | 7 => value.trim().to_string(),
        n => {
            return Err(ScheduleError::InvalidPattern {
                pattern: value.to_string(),
                reason: format!("expected 5, 6 or 7 fields, found {}", n),
            })
        }
    };
    Schedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidPattern {
        pattern: value.to_string(),
        reason: e.to_string(),
    })
}
