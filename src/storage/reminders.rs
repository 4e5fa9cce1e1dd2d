//! Durable reminder jobs.
//!
//! A job carries only primitives (user id, message, fire time) so it can be
//! replayed by a later process; whoever fires it looks up the live session
//! at that moment.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use super::StoreError;
use crate::transport::UserId;

const TREE_REMINDERS: &str = "reminders";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderJob {
    pub id: Uuid,
    pub user_id: UserId,
    pub message: String,
    pub fire_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderUnit {
    Minutes,
    Hours,
    Days,
}

impl ReminderUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "minute" | "minutes" => Some(ReminderUnit::Minutes),
            "hour" | "hours" => Some(ReminderUnit::Hours),
            "day" | "days" => Some(ReminderUnit::Days),
            _ => None,
        }
    }

    fn duration(self, amount: i64) -> Option<Duration> {
        match self {
            ReminderUnit::Minutes => Duration::try_minutes(amount),
            ReminderUnit::Hours => Duration::try_hours(amount),
            ReminderUnit::Days => Duration::try_days(amount),
        }
    }
}

/// A parsed `"message" in N unit` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderRequest {
    pub message: String,
    pub amount: i64,
    pub unit_text: String,
    pub delay: Duration,
}

pub const REMINDER_USAGE: &str =
    "Usage: remindme \"Your message here\" in <number> <unit> (e.g., 5 minutes, 1 hour, 2 days).";

/// Parse `"message" in <number> <minutes|hours|days>`.
pub fn parse_reminder(input: &str) -> Option<ReminderRequest> {
    let rest = input.trim().strip_prefix('"')?;
    let close = rest.find('"')?;
    let message = rest[..close].trim();
    if message.is_empty() {
        return None;
    }
    let mut tail = rest[close + 1..].split_whitespace();
    if !tail.next()?.eq_ignore_ascii_case("in") {
        return None;
    }
    let amount: i64 = tail.next()?.parse().ok()?;
    if amount <= 0 {
        return None;
    }
    let unit_text = tail.next()?;
    let unit = ReminderUnit::parse(unit_text)?;
    if tail.next().is_some() {
        return None;
    }
    let delay = unit.duration(amount)?;
    // Reject delays past the representable calendar.
    Utc::now().checked_add_signed(delay)?;
    Some(ReminderRequest {
        message: message.to_string(),
        amount,
        unit_text: unit_text.to_string(),
        delay,
    })
}

/// Sled-backed job store.
#[derive(Clone)]
pub struct ReminderStore {
    _db: sled::Db,
    jobs: sled::Tree,
}

impl ReminderStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        Self::from_db(sled::open(path_ref)?)
    }

    pub fn temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let jobs = db.open_tree(TREE_REMINDERS)?;
        Ok(Self { _db: db, jobs })
    }

    pub fn schedule_at(
        &self,
        user_id: UserId,
        message: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<ReminderJob, StoreError> {
        let job = ReminderJob {
            id: Uuid::new_v4(),
            user_id,
            message: message.to_string(),
            fire_at,
        };
        self.jobs
            .insert(job.id.as_bytes(), bincode::serialize(&job)?)?;
        self.jobs.flush()?;
        Ok(job)
    }

    pub fn schedule_in(
        &self,
        user_id: UserId,
        message: &str,
        delay: Duration,
    ) -> Result<ReminderJob, StoreError> {
        let fire_at = Utc::now()
            .checked_add_signed(delay)
            .ok_or_else(|| StoreError::OutOfRange(format!("{} from now", delay)))?;
        self.schedule_at(user_id, message, fire_at)
    }

    pub fn all(&self) -> Result<Vec<ReminderJob>, StoreError> {
        let mut jobs = Vec::new();
        for item in self.jobs.iter() {
            let (_, bytes) = item?;
            jobs.push(bincode::deserialize::<ReminderJob>(&bytes)?);
        }
        jobs.sort_by_key(|j| j.fire_at);
        Ok(jobs)
    }

    /// Jobs whose fire time is at or before `now`, oldest first.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderJob>, StoreError> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|j| j.fire_at <= now)
            .collect())
    }

    pub fn remove(&self, id: Uuid) -> Result<(), StoreError> {
        match self.jobs.remove(id.as_bytes())? {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
