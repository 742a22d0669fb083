// Clock abstraction - every time-dependent rule reads "now" from here

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Mutex;

use crate::error::{AppError, AppResult};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Epoch milliseconds, the storage representation of every timestamp
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn from_millis(millis: i64) -> AppResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        AppError::DatabaseError(format!("Timestamp {} is out of range", millis))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), start + Duration::hours(2));
    }

    #[test]
    fn millis_round_trip_keeps_precision() {
        let t = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap() + Duration::milliseconds(250);
        assert_eq!(from_millis(to_millis(t)).unwrap(), t);
    }

    #[test]
    fn out_of_range_millis_is_an_error() {
        assert!(matches!(from_millis(i64::MAX), Err(AppError::DatabaseError(_))));
    }
}
