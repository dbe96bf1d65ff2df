//! ClockSetter (C8): conditionally commits decoded time to the host clock
//! (spec §4.8, §4.8a).
//!
//! The Unix implementation is modeled on `clock-steering::unix::UnixClock`'s
//! `cerr`-style conversion of a `-1` return into a typed error, but calls
//! `clock_settime` directly rather than stepping via `adjtime`/`ntp_adjtime`:
//! MSF only delivers minute-granularity time, so a hard step at the instant
//! the minute marker bit was framed is the correct model, not a gradual
//! slew.

use std::time::SystemTime;

use crate::calendar::{self, BrokenDownTime};
use crate::error::Error;
use crate::types::{DtResult, InitMinute, Marker, MinuteLength};

/// The commit preconditions of spec §4.8: steady state, no field in
/// `{parity, bcd, jump}`, `minute_length == Ok`, and the marker is a real
/// `Minute` (not a resynced `Late`).
pub fn setclock_ok(init_min: InitMinute, dt: &DtResult, marker: Marker) -> bool {
    init_min == InitMinute::Steady
        && dt.minute_length == MinuteLength::Ok
        && dt.all_ok()
        && marker == Marker::Minute
}

/// Commits a decoded [`BrokenDownTime`] to a system clock.
///
/// `framed_at` is the instant the minute marker bit was framed, captured by
/// `MainLoop` as soon as it saw the bit (spec §4.8): `time` only carries
/// whole-minute resolution, so `setclock` uses however much wall-clock time
/// has elapsed since `framed_at` to align the call to the sub-second.
pub trait ClockSetter {
    fn setclock(&mut self, time: &BrokenDownTime, framed_at: SystemTime) -> Result<(), Error>;
}

/// Always-fails setter used where no clock-set hook makes sense on a
/// platform without `CLOCK_REALTIME` write access, or in tests.
pub struct NullClockSetter;

impl ClockSetter for NullClockSetter {
    fn setclock(&mut self, _time: &BrokenDownTime, _framed_at: SystemTime) -> Result<(), Error> {
        Err(Error::ClockSet(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "clock setting is disabled",
        )))
    }
}

/// `libc::clock_settime(CLOCK_REALTIME, ...)`, converting the committed
/// `BrokenDownTime` to seconds-since-epoch via `Calendar::days_since_epoch`
/// rather than `libc::timegm`/`mktime`, so the conversion never touches the
/// host's timezone database (spec §4.8a).
pub struct UnixClockSetter;

impl UnixClockSetter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UnixClockSetter {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSetter for UnixClockSetter {
    fn setclock(&mut self, time: &BrokenDownTime, framed_at: SystemTime) -> Result<(), Error> {
        let days = calendar::days_since_epoch(time);
        let base_secs = days * 86_400 + time.hour as i64 * 3_600 + time.minute as i64 * 60;
        // The marker bit lands exactly on the minute boundary; whatever
        // elapsed since then is the sub-second offset to apply on top.
        let elapsed = SystemTime::now()
            .duration_since(framed_at)
            .unwrap_or_default();
        let timespec = libc::timespec {
            tv_sec: (base_secs + elapsed.as_secs() as i64) as libc::time_t,
            tv_nsec: elapsed.subsec_nanos() as _,
        };
        // Safety: `timespec` is a valid, fully initialised value on the stack.
        let rc = unsafe { libc::clock_settime(libc::CLOCK_REALTIME, &timespec) };
        if rc == -1 {
            Err(Error::ClockSet(std::io::Error::last_os_error()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Dst;
    use crate::types::{DstStatus, FieldStatus, LeapStatus};

    fn clean_dt() -> DtResult {
        DtResult {
            minute_status: FieldStatus::Ok,
            hour_status: FieldStatus::Ok,
            mday_status: FieldStatus::Ok,
            wday_status: FieldStatus::Ok,
            month_status: FieldStatus::Ok,
            year_status: FieldStatus::Ok,
            minute_length: MinuteLength::Ok,
            dst_status: DstStatus::Ok,
            leap_status: LeapStatus::None,
            dst_announce: false,
            leap_announce: false,
            bit0_ok: true,
            bit52_ok: true,
            bit59_ok: true,
        }
    }

    #[test]
    fn setclock_ok_when_steady_and_clean() {
        assert!(setclock_ok(InitMinute::Steady, &clean_dt(), Marker::Minute));
    }

    #[test]
    fn setclock_refuses_when_not_steady() {
        assert!(!setclock_ok(InitMinute::Second, &clean_dt(), Marker::Minute));
    }

    #[test]
    fn setclock_refuses_on_late_marker() {
        assert!(!setclock_ok(InitMinute::Steady, &clean_dt(), Marker::Late));
    }

    #[test]
    fn setclock_refuses_on_field_error() {
        let mut dt = clean_dt();
        dt.year_status = FieldStatus::Parity;
        assert!(!setclock_ok(InitMinute::Steady, &dt, Marker::Minute));
    }

    #[test]
    fn null_setter_always_fails() {
        let mut setter = NullClockSetter;
        let t = BrokenDownTime::new(2019, 3, 15, 5, 12, 34, Dst::Winter);
        assert!(setter.setclock(&t, SystemTime::now()).is_err());
    }
}
