//! Pure Gregorian calendar arithmetic over [`BrokenDownTime`].
//!
//! Every function here is total and side-effect free, per the MSF
//! component design: no function ever observes the wall clock or any
//! other ambient state, they only transform the `BrokenDownTime` they are
//! given.

/// Base year against which [`century_offset`] is measured.
pub const BASE_YEAR: u16 = 1900;

/// Daylight-saving-time status of a [`BrokenDownTime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dst {
    /// Not yet known (e.g. before the first clean minute is decoded).
    Unknown,
    Winter,
    Summer,
}

/// A fully broken-down Gregorian date and time of day, always valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrokenDownTime {
    pub year: u16,
    /// 1..=12
    pub month: u8,
    /// 1..=31
    pub day: u8,
    /// 1..=7, Monday = 1
    pub weekday: u8,
    /// 0..=23
    pub hour: u8,
    /// 0..=59
    pub minute: u8,
    pub dst: Dst,
}

impl BrokenDownTime {
    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        weekday: u8,
        hour: u8,
        minute: u8,
        dst: Dst,
    ) -> Self {
        Self {
            year,
            month,
            day,
            weekday,
            hour,
            minute,
            dst,
        }
    }
}

/// Is `year` a Gregorian leap year?
fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `t`'s month, per the Gregorian leap-year rule.
pub fn last_day_of_month(t: &BrokenDownTime) -> u8 {
    match t.month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(t.year) {
                29
            } else {
                28
            }
        }
        _ => 30, // unreachable for a valid BrokenDownTime, kept total
    }
}

/// Last Sunday of `month` in `year`, as a day-of-month (1-indexed).
fn last_sunday_of_month(year: u16, month: u8) -> u8 {
    debug_assert!(month == 3 || month == 10);
    let last = BrokenDownTime::new(year, month, 1, 1, 0, 0, Dst::Unknown);
    let last_day = last_day_of_month(&last);
    let wd_of_last_day = weekday_of(year, month, last_day); // 1=Mon..7=Sun
    let back = if wd_of_last_day == 7 { 0 } else { wd_of_last_day };
    last_day - back
}

/// Zeller's congruence, returning ISO weekday (1=Monday..7=Sunday).
fn weekday_of(year: u16, month: u8, day: u8) -> u8 {
    // Zeller treats Jan/Feb as months 13/14 of the previous year.
    let (y, m) = if month <= 2 {
        (year as i32 - 1, month as i32 + 12)
    } else {
        (year as i32, month as i32)
    };
    let k = y % 100;
    let j = y / 100;
    let h = (day as i32 + (13 * (m + 1)) / 5 + k + k / 4 + j / 4 + 5 * j).rem_euclid(7);
    // Zeller's h: 0=Saturday, 1=Sunday, 2=Monday, ...
    // Convert to ISO (1=Monday..7=Sunday).
    match h {
        0 => 6, // Saturday
        1 => 7, // Sunday
        n => (n - 1) as u8,
    }
}

/// Does advancing `t` by one minute cross the UK spring-forward boundary
/// (last Sunday of March, 01:00 UTC -> 02:00 UTC, clocks go forward)?
fn crosses_spring_forward(t: &BrokenDownTime) -> bool {
    t.month == 3
        && t.day == last_sunday_of_month(t.year, 3)
        && t.hour == 0
        && t.minute == 59
}

/// Does advancing `t` by one minute cross the UK fall-back boundary (last
/// Sunday of October, 02:00 UTC -> 01:00 UTC, clocks go back)?
fn crosses_fall_back(t: &BrokenDownTime) -> bool {
    t.month == 10
        && t.day == last_sunday_of_month(t.year, 10)
        && t.hour == 1
        && t.minute == 59
}

/// Advance `t` by one minute, handling hour/day/month/year carries.
///
/// If `dst_announce` is true and the wrap lands exactly on a UK DST
/// boundary, the hour is adjusted accordingly and `dst` flips.
pub fn add_minute(t: &BrokenDownTime, dst_announce: bool) -> BrokenDownTime {
    let mut out = *t;
    out.minute += 1;
    if out.minute == 60 {
        out.minute = 0;
        out.hour += 1;
        if out.hour == 24 {
            out.hour = 0;
            out.weekday = if out.weekday == 7 { 1 } else { out.weekday + 1 };
            out.day += 1;
            if out.day > last_day_of_month(&out) {
                out.day = 1;
                out.month += 1;
                if out.month > 12 {
                    out.month = 1;
                    out.year += 1;
                }
            }
        }
    }
    if dst_announce {
        if crosses_spring_forward(t) && out.hour == 1 && out.minute == 0 {
            out.hour = 2;
            out.dst = Dst::Summer;
        } else if crosses_fall_back(t) && out.hour == 2 && out.minute == 0 {
            out.hour = 1;
            out.dst = Dst::Winter;
        }
    }
    out
}

/// Inverse of [`add_minute`].
pub fn subtract_minute(t: &BrokenDownTime, dst_announce: bool) -> BrokenDownTime {
    let mut out = *t;
    if dst_announce {
        // Undo a DST wrap landing exactly at the boundary's target hour/minute.
        if out.month == 3 && out.day == last_sunday_of_month(out.year, 3) && out.hour == 2 && out.minute == 0
        {
            out.hour = 1;
            out.minute = 60;
            out.dst = Dst::Winter;
        } else if out.month == 10
            && out.day == last_sunday_of_month(out.year, 10)
            && out.hour == 1
            && out.minute == 0
        {
            out.hour = 2;
            out.minute = 60;
            out.dst = Dst::Summer;
        }
    }
    if out.minute == 0 {
        out.minute = 60;
        if out.hour == 0 {
            out.hour = 24;
            out.weekday = if out.weekday == 1 { 7 } else { out.weekday - 1 };
            out.day -= 1;
            if out.day == 0 {
                out.month = if out.month == 1 {
                    12
                } else {
                    out.month - 1
                };
                if out.month == 12 {
                    out.year -= 1;
                }
                out.day = last_day_of_month(&out);
            }
        }
        out.hour -= 1;
    }
    out.minute -= 1;
    out
}

/// Days elapsed between the Unix epoch (1970-01-01) and `t`'s date,
/// negative for dates before the epoch. Used by the clock setter to turn
/// a committed `BrokenDownTime` into a `CLOCK_REALTIME` timestamp without
/// going through the host's timezone database (spec §4.8a: UTC-exact,
/// independent of `libc::mktime`).
pub fn days_since_epoch(t: &BrokenDownTime) -> i64 {
    let mut days: i64 = 0;
    if t.year >= 1970 {
        for y in 1970..t.year {
            days += if is_leap_year(y) { 366 } else { 365 };
        }
    } else {
        for y in t.year..1970 {
            days -= if is_leap_year(y) { 366 } else { 365 };
        }
    }
    for m in 1..t.month {
        let probe = BrokenDownTime::new(t.year, m, 1, 1, 0, 0, Dst::Unknown);
        days += last_day_of_month(&probe) as i64;
    }
    days + (t.day as i64 - 1)
}

/// Returns how many centuries above [`BASE_YEAR`] the full year implied by
/// `(year_in_century, month, day, weekday)` lies, i.e. `0..=3`, or `-1` if
/// no century in `BASE_YEAR..BASE_YEAR+400` makes the weekday consistent
/// with `month`/`day` (which marks the year as BCD-invalid).
pub fn century_offset(year_in_century: u8, month: u8, day: u8, weekday: u8) -> i8 {
    for offset in 0..4i32 {
        let year = BASE_YEAR as i32 + offset * 100 + year_in_century as i32;
        if weekday_of(year as u16, month, day) == weekday {
            return offset as i8;
        }
    }
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(year: u16, month: u8, day: u8, weekday: u8, hour: u8, minute: u8) -> BrokenDownTime {
        BrokenDownTime::new(year, month, day, weekday, hour, minute, Dst::Winter)
    }

    #[test]
    fn last_day_of_month_matches_gregorian_rule() {
        assert_eq!(last_day_of_month(&t(2019, 2, 1, 5, 0, 0)), 28);
        assert_eq!(last_day_of_month(&t(2020, 2, 1, 6, 0, 0)), 29); // div 4
        assert_eq!(last_day_of_month(&t(1900, 2, 1, 4, 0, 0)), 28); // div 100, not 400
        assert_eq!(last_day_of_month(&t(2000, 2, 1, 2, 0, 0)), 29); // div 400
        assert_eq!(last_day_of_month(&t(2019, 4, 1, 1, 0, 0)), 30);
        assert_eq!(last_day_of_month(&t(2019, 1, 1, 2, 0, 0)), 31);
    }

    #[test]
    fn add_then_subtract_minute_is_identity_outside_dst() {
        let start = t(2019, 6, 15, 6, 12, 34);
        let advanced = add_minute(&start, false);
        let back = subtract_minute(&advanced, false);
        assert_eq!(back, start);
    }

    #[test]
    fn add_minute_rolls_hour_day_month_year() {
        let start = t(2019, 12, 31, 2, 23, 59);
        let next = add_minute(&start, false);
        assert_eq!(next.year, 2020);
        assert_eq!(next.month, 1);
        assert_eq!(next.day, 1);
        assert_eq!(next.weekday, 3);
        assert_eq!(next.hour, 0);
        assert_eq!(next.minute, 0);
    }

    #[test]
    fn add_minute_spring_forward_2019() {
        // 2019-03-31 is the last Sunday of March 2019.
        let start = t(2019, 3, 31, 7, 0, 59);
        let next = add_minute(&start, true);
        assert_eq!(next.hour, 2);
        assert_eq!(next.minute, 0);
        assert_eq!(next.dst, Dst::Summer);
    }

    #[test]
    fn add_minute_fall_back_2019() {
        // 2019-10-27 is the last Sunday of October 2019.
        let mut start = t(2019, 10, 27, 7, 1, 59);
        start.dst = Dst::Summer;
        let next = add_minute(&start, true);
        assert_eq!(next.hour, 1);
        assert_eq!(next.minute, 0);
        assert_eq!(next.dst, Dst::Winter);
    }

    #[test]
    fn century_offset_recovers_known_date() {
        // 2019-03-15 was a Friday (ISO weekday 5).
        assert_eq!(century_offset(19, 3, 15, 5), 1);
    }

    #[test]
    fn century_offset_rejects_inconsistent_weekday() {
        // 2019-03-15 was not a Monday.
        assert_eq!(century_offset(19, 3, 15, 1), -1);
    }

    #[test]
    fn days_since_epoch_at_epoch_is_zero() {
        assert_eq!(days_since_epoch(&t(1970, 1, 1, 4, 0, 0)), 0);
    }

    #[test]
    fn days_since_epoch_matches_known_offset() {
        // 2019-03-15 is 17,970 days after 1970-01-01.
        assert_eq!(days_since_epoch(&t(2019, 3, 15, 5, 0, 0)), 17_970);
    }

    #[test]
    fn days_since_epoch_handles_pre_epoch_dates() {
        let d = days_since_epoch(&t(1969, 12, 31, 3, 0, 0));
        assert_eq!(d, -1);
    }
}
