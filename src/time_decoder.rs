//! TimeDecoder (C5): parses a completed minute buffer into date/time and
//! validity flags (spec §4.5).

use crate::calendar::{self, BrokenDownTime, Dst};
use crate::types::{
    BitBuffer, BitSymbol, CurrentTime, DstStatus, DtResult, FieldStatus, InitMinute, LeapStatus,
    MinuteLength,
};

const YEAR_START: usize = 17;
const YEAR_PARITY: usize = 54;
const MONTH_START: usize = 25;
const DAY_START: usize = 30;
const DATE_PARITY: usize = 55;
const WDAY_START: usize = 36;
const WDAY_PARITY: usize = 56;
const HOUR_START: usize = 39;
const MINUTE_START: usize = 45;
const TIME_PARITY: usize = 57;
const DST_ANNOUNCE_BIT: usize = 16;
const DST_NOW_BIT: usize = 17;
const DST_NEXT_BIT: usize = 18;

/// Low-5 commit-blocking bits plus the two extra anomaly bits (spec §4.5,
/// §4.6): bit 0 frame sanity, 1 bcd, 2 parity, 3 jump, 4 century-invalid,
/// 5 leap anomaly, 6 dst mismatch.
mod errflag {
    pub const FRAME: u8 = 1 << 0;
    pub const BCD: u8 = 1 << 1;
    pub const PARITY: u8 = 1 << 2;
    pub const JUMP: u8 = 1 << 3;
    pub const CENTURY: u8 = 1 << 4;
    pub const LEAP: u8 = 1 << 5;
    pub const DST: u8 = 1 << 6;
    pub const LOW_FIVE: u8 = FRAME | BCD | PARITY | JUMP | CENTURY;
}

/// Mutable decoder state that must survive across minutes (spec §9: no
/// process-wide singletons, owned explicitly and passed by the caller).
#[derive(Debug, Clone)]
pub struct DecoderState {
    dst_count: u32,
    minute_count: u32,
    dst_announce: bool,
    olderr: u8,
    residual_ms: i64,
}

impl DecoderState {
    pub fn new() -> Self {
        Self {
            dst_count: 0,
            minute_count: 0,
            dst_announce: false,
            olderr: 0,
            residual_ms: 0,
        }
    }
}

impl Default for DecoderState {
    fn default() -> Self {
        Self::new()
    }
}

fn bit_value(sym: BitSymbol) -> Option<u8> {
    sym.a_bit().map(|b| b as u8)
}

/// Decode a BCD field of `tens_width` tens-bits followed by a fixed 4-bit
/// units nibble, MSB-first. `None` on any unknown bit or invalid nibble.
fn decode_bcd_group(buffer: &BitBuffer, start: usize, tens_width: usize) -> Option<u8> {
    let mut tens: u32 = 0;
    for i in 0..tens_width {
        tens = (tens << 1) | bit_value(buffer[start + i])? as u32;
    }
    if tens_width == 4 && tens > 9 {
        return None;
    }
    let mut units: u32 = 0;
    for i in 0..4 {
        units = (units << 1) | bit_value(buffer[start + tens_width + i])? as u32;
    }
    if units > 9 {
        return None;
    }
    Some((tens * 10 + units) as u8)
}

/// Decode a plain binary (non-BCD) field, MSB-first.
fn decode_binary(buffer: &BitBuffer, start: usize, width: usize) -> Option<u8> {
    let mut v: u32 = 0;
    for i in 0..width {
        v = (v << 1) | bit_value(buffer[start + i])? as u32;
    }
    Some(v as u8)
}

/// Even parity over `data_start..=data_end` A-bits plus the B-bit of
/// `parity_pos` (spec §4.5). An unknown bit anywhere in the span fails.
fn parity_ok(buffer: &BitBuffer, data_start: usize, data_end: usize, parity_pos: usize) -> bool {
    let mut ones: u32 = 0;
    for i in data_start..=data_end {
        match bit_value(buffer[i]) {
            Some(1) => ones += 1,
            Some(_) => {}
            None => return false,
        }
    }
    match buffer[parity_pos].b_bit() {
        Some(true) => ones += 1,
        Some(false) => {}
        None => return false,
    }
    ones % 2 == 0
}

/// Resolve one field's status given its raw decode, parity outcome, valid
/// range and (when settled) the value implied by the running clock.
fn assess_field(
    decoded: Option<u8>,
    parity_ok: bool,
    valid_min: u8,
    valid_max: u8,
    expected: Option<u8>,
    init_min: InitMinute,
) -> (FieldStatus, Option<u8>) {
    if !parity_ok {
        return (FieldStatus::Parity, None);
    }
    let Some(v) = decoded else {
        return (FieldStatus::Bcd, None);
    };
    if v < valid_min || v > valid_max {
        return (FieldStatus::Bcd, None);
    }
    if init_min == InitMinute::Steady {
        if let Some(exp) = expected {
            if v != exp {
                return (FieldStatus::Jump, None);
            }
        }
    }
    (FieldStatus::Ok, Some(v))
}

/// Combine the previous minute's residual with this minute's accumulated
/// length to produce an integer minute advance, applied via repeated
/// `add_minute` (spec §4.5's `increase_old_time`). Only called when
/// `init_min < 2` (not the very first tick).
fn increase_old_time(
    state: &mut DecoderState,
    time: &CurrentTime,
    acc_minlen: i64,
    dst_announce: bool,
) -> CurrentTime {
    let total = state.residual_ms + acc_minlen;
    let minutes = total / 60_000;
    state.residual_ms = total % 60_000;
    let mut out = *time;
    for _ in 0..minutes {
        out = calendar::add_minute(&out, dst_announce);
    }
    out
}

/// Decode one completed minute buffer and advance `current` in place.
///
/// Returns the full `DtResult`; `current` is only overwritten with the
/// freshly decoded fields when the commit rule of spec §4.5 is satisfied.
pub fn decode_minute(
    state: &mut DecoderState,
    init_min: InitMinute,
    minlen: i64,
    acc_minlen: i64,
    buffer: &BitBuffer,
    current: &mut CurrentTime,
) -> DtResult {
    let mut errflag: u8 = 0;

    let minute_length = if minlen == -1 || minlen > 61 {
        MinuteLength::Long
    } else if minlen < 59 {
        MinuteLength::Short
    } else {
        MinuteLength::Ok
    };
    let bit0_ok = matches!(buffer[0], BitSymbol::BeginOfMinute);
    let bit59_ok = matches!(buffer[59], BitSymbol::Pair00);
    let bit52_ok = matches!(buffer[52], BitSymbol::Pair00);
    if minute_length != MinuteLength::Ok || !bit0_ok || !bit59_ok {
        errflag |= errflag::FRAME;
    }

    let old_dst = current.dst;
    let advance_time = init_min != InitMinute::First;
    let candidate_time = if advance_time {
        increase_old_time(state, current, acc_minlen, state.dst_announce)
    } else {
        *current
    };

    let year_parity = parity_ok(buffer, YEAR_START, YEAR_START + 7, YEAR_PARITY);
    let date_parity = parity_ok(buffer, MONTH_START, DAY_START + 5, DATE_PARITY);
    let wday_parity = parity_ok(buffer, WDAY_START, WDAY_START + 2, WDAY_PARITY);
    let time_parity = parity_ok(buffer, HOUR_START, MINUTE_START + 6, TIME_PARITY);

    let year_raw = decode_bcd_group(buffer, YEAR_START, 4);
    let month_raw = decode_bcd_group(buffer, MONTH_START, 1);
    let day_raw = decode_bcd_group(buffer, DAY_START, 2);
    let wday_raw = decode_binary(buffer, WDAY_START, 3);
    let hour_raw = decode_bcd_group(buffer, HOUR_START, 2);
    let minute_raw = decode_bcd_group(buffer, MINUTE_START, 3);

    let mut year_status;
    let mut month_status;
    let mut mday_status;
    let mut year_value = None;
    let mut month_value = None;
    let mut day_value = None;

    match (year_raw, month_raw, day_raw, wday_raw) {
        (Some(y), Some(m), Some(d), Some(w)) if w >= 1 => {
            let century = calendar::century_offset(y, m, d, w);
            if century < 0 {
                year_status = FieldStatus::Bcd;
                month_status = FieldStatus::Bcd;
                mday_status = FieldStatus::Bcd;
                errflag |= errflag::CENTURY;
            } else {
                let full_year = calendar::BASE_YEAR + century as u16 * 100 + y as u16;
                let probe = BrokenDownTime::new(full_year, m.max(1).min(12), 1, w, 0, 0, Dst::Unknown);
                let ceiling = calendar::last_day_of_month(&probe);
                if d > ceiling {
                    year_status = FieldStatus::Bcd;
                    month_status = FieldStatus::Bcd;
                    mday_status = FieldStatus::Bcd;
                    errflag |= errflag::BCD;
                } else {
                    let expected_year = if init_min == InitMinute::Steady {
                        Some((candidate_time.year % 100) as u8)
                    } else {
                        None
                    };
                    let expected_month = if init_min == InitMinute::Steady {
                        Some(candidate_time.month)
                    } else {
                        None
                    };
                    let expected_day = if init_min == InitMinute::Steady {
                        Some(candidate_time.day)
                    } else {
                        None
                    };
                    let (ys, yv) = assess_field(year_raw, year_parity, 0, 99, expected_year, init_min);
                    let (ms, mv) = assess_field(month_raw, date_parity, 1, 12, expected_month, init_min);
                    let (ds, dv) = assess_field(day_raw, date_parity, 1, 31, expected_day, init_min);
                    year_status = ys;
                    month_status = ms;
                    mday_status = ds;
                    year_value = yv.map(|_| full_year);
                    month_value = mv;
                    day_value = dv;
                }
            }
        }
        _ => {
            year_status = FieldStatus::Bcd;
            month_status = FieldStatus::Bcd;
            mday_status = FieldStatus::Bcd;
            errflag |= errflag::BCD;
        }
    }
    match year_status {
        FieldStatus::Bcd => errflag |= errflag::BCD,
        FieldStatus::Parity => errflag |= errflag::PARITY,
        FieldStatus::Jump => errflag |= errflag::JUMP,
        FieldStatus::Ok => {}
    }

    let expected_wday = if init_min == InitMinute::Steady {
        Some(candidate_time.weekday)
    } else {
        None
    };
    let (wday_status, wday_value) = assess_field(wday_raw, wday_parity, 1, 6, expected_wday, init_min);

    let expected_hour = if init_min == InitMinute::Steady {
        Some(candidate_time.hour)
    } else {
        None
    };
    let (hour_status, hour_value) = assess_field(hour_raw, time_parity, 0, 23, expected_hour, init_min);

    let expected_minute = if init_min == InitMinute::Steady {
        Some(candidate_time.minute)
    } else {
        None
    };
    let (minute_status, minute_value) =
        assess_field(minute_raw, time_parity, 0, 59, expected_minute, init_min);

    for st in [
        month_status,
        mday_status,
        wday_status,
        hour_status,
        minute_status,
    ] {
        match st {
            FieldStatus::Bcd => errflag |= errflag::BCD,
            FieldStatus::Parity => errflag |= errflag::PARITY,
            FieldStatus::Jump => errflag |= errflag::JUMP,
            FieldStatus::Ok => {}
        }
    }

    let mut dst_announce = state.dst_announce;
    let mut dst_status = DstStatus::Ok;
    if init_min != InitMinute::First {
        state.minute_count += 1;
        if bit_value(buffer[DST_ANNOUNCE_BIT]) == Some(1) {
            state.dst_count += 1;
        }
        if 2 * state.dst_count > state.minute_count {
            dst_announce = true;
        }
        let decoded_dst_now = bit_value(buffer[DST_NOW_BIT]).map(|b| b == 1);
        let decoded_dst_next = bit_value(buffer[DST_NEXT_BIT]).map(|b| b == 1);
        if let Some(now_summer) = decoded_dst_now {
            let expected_summer = matches!(candidate_time.dst, Dst::Summer);
            let transition_minute = dst_announce && candidate_time.minute == 0;
            let previously_errored_now_clean = state.olderr != 0 && errflag == 0;
            let first_time = init_min == InitMinute::Second;
            // Bit 18 disambiguates announcement phase (spec §4.5): while a
            // transition is pending it carries the state *to be* (the
            // opposite of now); otherwise it echoes the settled state.
            let next_consistent = match decoded_dst_next {
                Some(next_summer) => {
                    if dst_announce && !transition_minute {
                        next_summer != expected_summer
                    } else {
                        next_summer == expected_summer
                    }
                }
                None => true,
            };
            if (now_summer != expected_summer || !next_consistent)
                && !transition_minute
                && !previously_errored_now_clean
                && !first_time
            {
                dst_status = DstStatus::Jump;
                errflag |= errflag::DST;
            } else if transition_minute {
                dst_status = DstStatus::Done;
                dst_announce = false;
                state.dst_count = 0;
                state.minute_count = 0;
            }
        }
    }

    let mut leap_status = LeapStatus::None;
    let mut minute_length = minute_length;
    if candidate_time.minute == 0 {
        leap_status = LeapStatus::Done;
    }
    if minlen == 60 {
        minute_length = MinuteLength::Short;
        errflag |= errflag::LEAP;
    }
    if minlen == 61 && bit_value(buffer[DST_NOW_BIT]) == Some(1) {
        leap_status = LeapStatus::One;
    }
    if minlen == 61 && leap_status == LeapStatus::None {
        errflag |= errflag::LEAP;
        minute_length = MinuteLength::Long;
    }

    let result = DtResult {
        minute_status,
        hour_status,
        mday_status,
        wday_status,
        month_status,
        year_status,
        minute_length,
        dst_status,
        leap_status,
        dst_announce,
        leap_announce: bit_value(buffer[DST_ANNOUNCE_BIT]) == Some(1),
        bit0_ok,
        bit52_ok,
        bit59_ok,
    };

    if minute_length == MinuteLength::Ok && errflag & errflag::LOW_FIVE == 0 {
        let mut new_time = candidate_time;
        if let Some(y) = year_value {
            new_time.year = y;
        }
        if let Some(m) = month_value {
            new_time.month = m;
        }
        if let Some(d) = day_value {
            new_time.day = d;
        }
        if let Some(w) = wday_value {
            new_time.weekday = w;
        }
        if let Some(h) = hour_value {
            new_time.hour = h;
        }
        if let Some(mi) = minute_value {
            new_time.minute = mi;
        }
        new_time.dst = if dst_status != DstStatus::Jump {
            candidate_time.dst
        } else {
            old_dst
        };
        *current = new_time;
    }

    state.dst_announce = dst_announce;
    state.olderr = errflag;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_bit_buffer;

    fn set_bcd(buffer: &mut BitBuffer, start: usize, tens_width: usize, value: u8) {
        let tens = value / 10;
        let units = value % 10;
        for i in 0..tens_width {
            let bit = (tens >> (tens_width - 1 - i)) & 1;
            buffer[start + i] = if bit == 1 {
                BitSymbol::Pair10
            } else {
                BitSymbol::Pair00
            };
        }
        for i in 0..4 {
            let bit = (units >> (3 - i)) & 1;
            buffer[start + tens_width + i] = if bit == 1 {
                BitSymbol::Pair10
            } else {
                BitSymbol::Pair00
            };
        }
    }

    fn set_binary(buffer: &mut BitBuffer, start: usize, width: usize, value: u8) {
        for i in 0..width {
            let bit = (value >> (width - 1 - i)) & 1;
            buffer[start + i] = if bit == 1 {
                BitSymbol::Pair10
            } else {
                BitSymbol::Pair00
            };
        }
    }

    fn set_parity(buffer: &mut BitBuffer, data_start: usize, data_end: usize, parity_pos: usize) {
        let mut ones = 0u32;
        for i in data_start..=data_end {
            if bit_value(buffer[i]) == Some(1) {
                ones += 1;
            }
        }
        let want_one = ones % 2 != 0;
        buffer[parity_pos] = if want_one {
            BitSymbol::Pair11
        } else {
            BitSymbol::Pair10
        };
    }

    /// 2019-03-15 was a Friday (ISO weekday 5), 12:34, winter time.
    fn clean_buffer() -> BitBuffer {
        let mut buffer = new_bit_buffer();
        buffer[0] = BitSymbol::BeginOfMinute;
        buffer[59] = BitSymbol::Pair00;
        set_bcd(&mut buffer, YEAR_START, 4, 19);
        set_bcd(&mut buffer, MONTH_START, 1, 3);
        set_bcd(&mut buffer, DAY_START, 2, 15);
        set_binary(&mut buffer, WDAY_START, 3, 5);
        set_bcd(&mut buffer, HOUR_START, 2, 12);
        set_bcd(&mut buffer, MINUTE_START, 3, 34);
        set_parity(&mut buffer, YEAR_START, YEAR_START + 7, YEAR_PARITY);
        set_parity(&mut buffer, MONTH_START, DAY_START + 5, DATE_PARITY);
        set_parity(&mut buffer, WDAY_START, WDAY_START + 2, WDAY_PARITY);
        set_parity(&mut buffer, HOUR_START, MINUTE_START + 6, TIME_PARITY);
        buffer
    }

    #[test]
    fn clean_minute_commits_with_all_ok() {
        let mut state = DecoderState::new();
        let buffer = clean_buffer();
        let mut current = BrokenDownTime::new(2019, 3, 15, 5, 12, 33, Dst::Winter);
        let result = decode_minute(&mut state, InitMinute::Second, 59, 60_000, &buffer, &mut current);
        assert_eq!(result.year_status, FieldStatus::Ok);
        assert_eq!(result.month_status, FieldStatus::Ok);
        assert_eq!(result.mday_status, FieldStatus::Ok);
        assert_eq!(result.wday_status, FieldStatus::Ok);
        assert_eq!(result.hour_status, FieldStatus::Ok);
        assert_eq!(result.minute_status, FieldStatus::Ok);
        assert_eq!(result.minute_length, MinuteLength::Ok);
        assert!(result.all_ok());
        assert_eq!(current.year, 2019);
        assert_eq!(current.month, 3);
        assert_eq!(current.day, 15);
        assert_eq!(current.hour, 12);
        assert_eq!(current.minute, 34);
    }

    #[test]
    fn parity_violation_blocks_year_commit() {
        let mut state = DecoderState::new();
        let mut buffer = clean_buffer();
        // Flip the year parity bit so it no longer matches.
        buffer[YEAR_PARITY] = match buffer[YEAR_PARITY] {
            BitSymbol::Pair10 => BitSymbol::Pair00,
            _ => BitSymbol::Pair10,
        };
        let mut current = BrokenDownTime::new(2019, 3, 15, 5, 12, 33, Dst::Winter);
        let result = decode_minute(&mut state, InitMinute::Second, 59, 60_000, &buffer, &mut current);
        assert_eq!(result.year_status, FieldStatus::Parity);
        assert!(!result.all_ok());
        assert_eq!(current.year, 2019); // not advanced past the seed
    }

    #[test]
    fn bcd_violation_in_month_is_flagged() {
        let mut state = DecoderState::new();
        let mut buffer = clean_buffer();
        // Force the month's units nibble above 9 (invalid BCD).
        buffer[MONTH_START + 1] = BitSymbol::Pair10;
        buffer[MONTH_START + 2] = BitSymbol::Pair10;
        buffer[MONTH_START + 3] = BitSymbol::Pair10;
        buffer[MONTH_START + 4] = BitSymbol::Pair10;
        set_parity(&mut buffer, MONTH_START, DAY_START + 5, DATE_PARITY);
        let mut current = BrokenDownTime::new(2019, 3, 15, 5, 12, 33, Dst::Winter);
        let result = decode_minute(&mut state, InitMinute::Second, 59, 60_000, &buffer, &mut current);
        assert_eq!(result.month_status, FieldStatus::Bcd);
        assert!(!result.all_ok());
    }

    #[test]
    fn too_long_minute_reports_long_without_commit() {
        let mut state = DecoderState::new();
        let buffer = clean_buffer();
        let mut current = BrokenDownTime::new(2019, 3, 15, 5, 12, 33, Dst::Winter);
        let result = decode_minute(&mut state, InitMinute::Second, 62, 65_000, &buffer, &mut current);
        assert_eq!(result.minute_length, MinuteLength::Long);
        assert!(!result.all_ok());
        assert_eq!(current.minute, 33); // unchanged, no commit
    }

    #[test]
    fn leap_second_minute_commits_when_not_anomalous() {
        let mut state = DecoderState::new();
        let mut buffer = clean_buffer();
        set_bcd(&mut buffer, MINUTE_START, 3, 0);
        set_parity(&mut buffer, HOUR_START, MINUTE_START + 6, TIME_PARITY);
        let mut current = BrokenDownTime::new(2019, 3, 15, 5, 12, 59, Dst::Winter);
        let result = decode_minute(&mut state, InitMinute::Second, 61, 61_000, &buffer, &mut current);
        assert_eq!(result.leap_status, LeapStatus::Done);
        assert_eq!(result.minute_length, MinuteLength::Ok);
    }
}
