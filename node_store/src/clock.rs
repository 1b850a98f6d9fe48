//! Time source for write-partition selection and document timestamps.

use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};

pub trait Clock: Send + Sync {
    /// Current calendar day on the process-local clock.
    fn today(&self) -> NaiveDate;

    /// Current instant, UTC.
    fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn at_day(day: NaiveDate) -> Self {
        Self::new(day.and_time(chrono::NaiveTime::MIN))
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn set_day(&self, day: NaiveDate) {
        self.set(day.and_time(chrono::NaiveTime::MIN));
    }

    fn get(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        self.get().date()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.get().and_utc()
    }
}

/// Document timestamp: ISO-8601 without a zone designator.
pub fn document_timestamp(now: DateTime<Utc>) -> String {
    now.naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
