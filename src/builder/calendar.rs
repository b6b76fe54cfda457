//! US Federal Reserve banking calendar.
//!
//! Weekends and Fed holidays are non-banking days. A holiday falling on a
//! Sunday is observed the following Monday; one falling on a Saturday is not
//! moved.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut day = first_of_next - Duration::days(1);
    while day.weekday() != weekday {
        day -= Duration::days(1);
    }
    Some(day)
}

fn observed(date: Option<NaiveDate>) -> Option<NaiveDate> {
    let date = date?;
    if date.weekday() == Weekday::Sun {
        Some(date + Duration::days(1))
    } else {
        Some(date)
    }
}

/// Observed Fed holidays for `year`.
pub fn holidays(year: i32) -> Vec<NaiveDate> {
    let fixed = |month, day| observed(NaiveDate::from_ymd_opt(year, month, day));

    let mut days = vec![
        fixed(1, 1),
        nth_weekday(year, 1, Weekday::Mon, 3),
        nth_weekday(year, 2, Weekday::Mon, 3),
        last_weekday(year, 5, Weekday::Mon),
        fixed(7, 4),
        nth_weekday(year, 9, Weekday::Mon, 1),
        nth_weekday(year, 10, Weekday::Mon, 2),
        fixed(11, 11),
        nth_weekday(year, 11, Weekday::Thu, 4),
        fixed(12, 25),
    ];
    if year >= 2022 {
        days.push(fixed(6, 19));
    }

    days.into_iter().flatten().collect()
}

pub fn is_holiday(date: NaiveDate) -> bool {
    holidays(date.year()).contains(&date)
}

pub fn is_banking_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(date)
}

/// First banking day strictly after `date`.
pub fn next_banking_day(date: NaiveDate) -> NaiveDate {
    let mut day = date + Duration::days(1);
    while !is_banking_day(day) {
        day += Duration::days(1);
    }
    day
}

/// `date` itself when it is a banking day, otherwise the next one.
pub fn banking_day_on_or_after(date: NaiveDate) -> NaiveDate {
    if is_banking_day(date) {
        date
    } else {
        next_banking_day(date)
    }
}

/// Moves `days` banking days forward from `date`.
pub fn add_banking_days(date: NaiveDate, days: u32) -> NaiveDate {
    (0..days).fold(date, |day, _| next_banking_day(day))
}
