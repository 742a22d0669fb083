// Attendance streaks over distinct calendar dates

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
}

/// Runs of consecutive days among `dates`.
///
/// The current streak is the most recent run, counted only when that run
/// ends today or yesterday. The longest run is reported either way.
pub fn compute_streak<I>(dates: I, today: NaiveDate) -> Streak
where
    I: IntoIterator<Item = NaiveDate>,
{
    let distinct: BTreeSet<NaiveDate> = dates.into_iter().collect();
    let mut descending = distinct.into_iter().rev();

    let most_recent = match descending.next() {
        Some(date) => date,
        None => return Streak::default(),
    };

    let mut longest = 0;
    let mut first_run: Option<u32> = None;
    let mut run = 1;
    let mut previous = most_recent;

    for date in descending {
        if previous - date == Duration::days(1) {
            run += 1;
        } else {
            first_run.get_or_insert(run);
            longest = longest.max(run);
            run = 1;
        }
        previous = date;
    }
    first_run.get_or_insert(run);
    longest = longest.max(run);

    let is_recent = most_recent == today || most_recent == today - Duration::days(1);
    Streak {
        current: if is_recent { first_run.unwrap_or(0) } else { 0 },
        longest,
    }
}
