use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    error::{AchError, Result},
    storage::Database,
};

/// Bounds how often a depository's micro-deposits may be guessed.
pub trait AttemptLimiter: Send + Sync {
    /// `AttemptsExhausted` once today's attempts have reached the ceiling.
    fn check(&self, depository_id: &str, now: DateTime<Utc>) -> Result<()>;

    fn record(&self, depository_id: &str, now: DateTime<Utc>) -> Result<()>;
}

/// Counts attempts per UTC day in sqlite.
pub struct SqliteAttemptLimiter {
    db: Arc<Database>,
    max_attempts: u32,
}

impl SqliteAttemptLimiter {
    pub fn new(db: Arc<Database>, max_attempts: u32) -> Self {
        Self { db, max_attempts }
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

impl AttemptLimiter for SqliteAttemptLimiter {
    fn check(&self, depository_id: &str, now: DateTime<Utc>) -> Result<()> {
        let used = self
            .db
            .count_attempts_since(depository_id, start_of_day(now))?;
        if used >= self.max_attempts {
            return Err(AchError::AttemptsExhausted(depository_id.to_string()));
        }
        Ok(())
    }

    fn record(&self, depository_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.db.record_attempt(depository_id, now)
    }
}
