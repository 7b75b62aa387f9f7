//! Backfill window planning.
//!
//! All calendar arithmetic happens in the operating timezone so that "today", the
//! retention horizon and the 7-day steps land on local midnights across DST changes.

use chrono::{DateTime, Days, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fmt;

/// Records with an event time before `today - RETENTION_DAYS` are purged.
pub const RETENTION_DAYS: u64 = 30;

/// Widest span requested from upstream in a single call.
pub const WINDOW_DAYS: u64 = 7;

/// An inclusive `[start, end]` range of instants fetched in one upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Local midnight of the day containing `now`.
pub fn start_of_today(tz: Tz, now: DateTime<Utc>) -> DateTime<Tz> {
    let midnight = now.with_timezone(&tz).date_naive().and_time(NaiveTime::MIN);
    // A zone may skip midnight on a DST day; take the first instant that exists.
    tz.from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
}

/// The oldest event time retained for a refresh running on `today`.
pub fn retention_horizon(today: DateTime<Tz>) -> DateTime<Tz> {
    today
        .checked_sub_days(Days::new(RETENTION_DAYS))
        .unwrap_or(today - TimeDelta::days(RETENTION_DAYS as i64))
}

fn add_days(instant: DateTime<Tz>, days: u64) -> DateTime<Tz> {
    instant
        .checked_add_days(Days::new(days))
        .unwrap_or(instant + TimeDelta::days(days as i64))
}

/// Plan the upstream windows needed to bring a key from `watermark` up to the end of
/// yesterday.
///
/// A key already at or past `today` needs nothing. A missing watermark, or one older than
/// the retention horizon, backfills from the horizon: anything earlier would be pruned in
/// the same transaction.
pub fn plan_windows(watermark: Option<DateTime<Utc>>, today: DateTime<Tz>) -> Vec<Window> {
    let tz = today.timezone();
    let end_of_yesterday = today - TimeDelta::seconds(1);
    let horizon = retention_horizon(today);

    let origin = match watermark {
        Some(value) if value >= today => return Vec::new(),
        Some(value) if value > horizon => value.with_timezone(&tz),
        _ => horizon,
    };

    let mut windows = Vec::new();
    let mut start = origin;
    while start <= end_of_yesterday {
        let next = add_days(start, WINDOW_DAYS);
        let end = if next < today {
            next - TimeDelta::seconds(1)
        } else {
            end_of_yesterday
        };

        windows.push(Window {
            start: start.with_timezone(&Utc),
            end: end.with_timezone(&Utc),
        });

        if end == end_of_yesterday {
            break;
        }
        start = next;
    }

    windows
}
