//! Real time clock seam. Time is unix seconds, UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

pub trait Clock {
    fn now(&mut self) -> u32;
    fn adjust(&mut self, unix_time: u32);
}

/// Calendar view of a unix timestamp
pub fn to_datetime(unix_time: u32) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp(i64::from(unix_time), 0)
        .unwrap_or_default()
        .naive_utc()
}

/// Back to unix seconds, clamped to the range a `u32` stamp can hold
pub fn to_unix(datetime: &NaiveDateTime) -> u32 {
    let secs = datetime.and_utc().timestamp();
    secs.clamp(0, i64::from(u32::MAX)) as u32
}

/// Move the date by whole years and months, keeping the time of day.
/// Months wrap within 1..=12 without carrying into the year, years clamp to
/// 1970..=2105 and a day that does not exist in the new month falls back to the 1st.
pub fn shift_calendar(datetime: &NaiveDateTime, years: i32, months: i32) -> NaiveDateTime {
    //Stay inside what a u32 unix stamp can represent
    let year = (datetime.year() + years).clamp(1970, 2105);
    let month = (datetime.month() as i32 - 1 + months).rem_euclid(12) as u32 + 1;

    let date = NaiveDate::from_ymd_opt(year, month, datetime.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, month, 1))
        .unwrap_or(datetime.date());
    date.and_time(datetime.time())
}

/// `dd.mm.yyyy HH:MM:SS`
pub fn format_datetime<W: core::fmt::Write>(out: &mut W, datetime: &NaiveDateTime) -> core::fmt::Result {
    write!(
        out,
        "{:02}.{:02}.{:04} {:02}:{:02}:{:02}",
        datetime.day(),
        datetime.month(),
        datetime.year(),
        datetime.hour(),
        datetime.minute(),
        datetime.second()
    )
}
