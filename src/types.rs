//! Shared data model: the bit buffer, filter state, and the outcome
//! structures passed between the sampler, framer, decoder and main loop.

use crate::calendar::BrokenDownTime;

/// Number of addressable slots in a minute's bit buffer (indices 0..60).
pub const BIT_BUFFER_LEN: usize = 61;

/// One decoded second-of-minute symbol.
///
/// The numeric encoding used on the wire and in log files is
/// `Pair00 -> 0`, `Pair10 -> 1`, `Pair01Split -> 2`, `Pair11 -> 3`,
/// `BeginOfMinute -> 4`. `Unknown` has no wire code (`_` in the log).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitSymbol {
    Pair00,
    Pair10,
    Pair01Split,
    Pair11,
    BeginOfMinute,
    Unknown,
}

impl BitSymbol {
    /// The numeric code used on the wire/in logs, or `None` for `Unknown`.
    pub fn code(self) -> Option<u8> {
        match self {
            BitSymbol::Pair00 => Some(0),
            BitSymbol::Pair10 => Some(1),
            BitSymbol::Pair01Split => Some(2),
            BitSymbol::Pair11 => Some(3),
            BitSymbol::BeginOfMinute => Some(4),
            BitSymbol::Unknown => None,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BitSymbol::Pair00),
            1 => Some(BitSymbol::Pair10),
            2 => Some(BitSymbol::Pair01Split),
            3 => Some(BitSymbol::Pair11),
            4 => Some(BitSymbol::BeginOfMinute),
            _ => None,
        }
    }

    /// The A-bit (first digit) of the pair, used for BCD decoding.
    pub fn a_bit(self) -> Option<bool> {
        match self {
            BitSymbol::Pair00 => Some(false),
            BitSymbol::Pair10 => Some(true),
            BitSymbol::Pair01Split => Some(false),
            BitSymbol::Pair11 => Some(true),
            BitSymbol::BeginOfMinute => Some(true),
            BitSymbol::Unknown => None,
        }
    }

    /// The B-bit (second digit) of the pair, used for parity bits.
    pub fn b_bit(self) -> Option<bool> {
        match self {
            BitSymbol::Pair00 => Some(false),
            BitSymbol::Pair10 => Some(false),
            BitSymbol::Pair01Split => Some(true),
            BitSymbol::Pair11 => Some(true),
            BitSymbol::BeginOfMinute => Some(true),
            BitSymbol::Unknown => None,
        }
    }
}

/// A minute's worth of decoded bit symbols, indexed by second-within-minute.
///
/// Reset only by a minute marker at position 0; otherwise overwritten in
/// place one slot at a time. Logical length is 59, 60 or (leap second) 61.
pub type BitBuffer = [BitSymbol; BIT_BUFFER_LEN];

pub fn new_bit_buffer() -> BitBuffer {
    [BitSymbol::Unknown; BIT_BUFFER_LEN]
}

/// Running low-pass-filter / Schmitt-trigger state for the bit sampler.
///
/// All fields are fixed-point integers, scaled as documented per field;
/// see spec §4.3 for the filter math that mutates them.
#[derive(Debug, Clone, Copy)]
pub struct BitInfo {
    /// Estimated samples-per-second, scaled by 10^6.
    pub real_freq: i64,
    /// Estimated active-low sample count for the begin-of-minute marker,
    /// scaled by 10^6.
    pub bit0_len: i64,
    /// Estimated active-low sample count for the bit-59 (all-zero) marker,
    /// scaled by 10^6.
    pub bit59_len: i64,
    /// Sample index at which the signal level dropped this second.
    pub t_low: i64,
    /// Last sample index at which the filtered value crossed near zero.
    pub t_last_zero: i64,
    /// Current sample index within the second.
    pub t: i64,
}

impl BitInfo {
    pub fn new(nominal_freq_hz: u32) -> Self {
        let f = nominal_freq_hz as i64 * 1_000_000;
        Self {
            real_freq: f,
            bit0_len: f / 2, // nominal 500 ms begin-of-minute marker
            bit59_len: f / 10, // nominal 100 ms all-zero marker
            t_low: 0,
            t_last_zero: 0,
            t: 0,
        }
    }
}

/// Start-of-minute marker classification for a just-finished second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    None,
    Minute,
    TooLong,
    Late,
}

/// Hardware/decode status for a just-finished second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwStatus {
    Ok,
    Receive,
    Transmit,
    Random,
}

/// Outcome of grabbing one bit (one second) from either the live sampler
/// or the log reader.
#[derive(Debug, Clone, Copy)]
pub struct GbResult {
    pub marker: Marker,
    pub bitval: BitSymbol,
    pub hwstat: HwStatus,
    pub bad_io: bool,
    /// A metadata record (not a real bit) was consumed; the framer must
    /// not advance `bitpos` for this call.
    pub skip: bool,
    pub done: bool,
    /// The frequency guard rail fired this second (spec §4.3): `Some(true)`
    /// for the low-side ("<") trip, `Some(false)` for the high-side (">"),
    /// `None` if it did not fire. Log-playback records never set this; the
    /// reader treats `<`/`>` as write-only diagnostics, not replayable
    /// state.
    pub freq_guard: Option<bool>,
    /// The adaptive bit-length references were reset this second ("!",
    /// spec §4.3). Always `false` on log playback, for the same reason.
    pub bitlen_reset: bool,
}

impl GbResult {
    pub fn idle() -> Self {
        Self {
            marker: Marker::None,
            bitval: BitSymbol::Unknown,
            hwstat: HwStatus::Ok,
            bad_io: false,
            skip: false,
            done: false,
            freq_guard: None,
            bitlen_reset: false,
        }
    }
}

/// Status of a single decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStatus {
    Ok,
    Parity,
    Bcd,
    Jump,
}

/// Observed length of the minute just decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinuteLength {
    Ok,
    Short,
    Long,
}

/// DST transition bookkeeping status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstStatus {
    Ok,
    Jump,
    Done,
}

/// Leap-second bookkeeping status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeapStatus {
    None,
    One,
    Done,
}

/// Outcome of decoding one completed minute buffer.
#[derive(Debug, Clone, Copy)]
pub struct DtResult {
    pub minute_status: FieldStatus,
    pub hour_status: FieldStatus,
    pub mday_status: FieldStatus,
    pub wday_status: FieldStatus,
    pub month_status: FieldStatus,
    pub year_status: FieldStatus,
    pub minute_length: MinuteLength,
    pub dst_status: DstStatus,
    pub leap_status: LeapStatus,
    pub dst_announce: bool,
    pub leap_announce: bool,
    pub bit0_ok: bool,
    pub bit52_ok: bool,
    pub bit59_ok: bool,
}

impl DtResult {
    /// All six field statuses are `Ok` and the minute length is `Ok`: the
    /// invariant a committed minute must satisfy (spec §8).
    pub fn all_ok(&self) -> bool {
        self.minute_status == FieldStatus::Ok
            && self.hour_status == FieldStatus::Ok
            && self.mday_status == FieldStatus::Ok
            && self.wday_status == FieldStatus::Ok
            && self.month_status == FieldStatus::Ok
            && self.year_status == FieldStatus::Ok
            && self.minute_length == MinuteLength::Ok
    }
}

/// Hardware configuration read once at startup (spec §3, §6).
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct HardwareConfig {
    pub pin_id: u32,
    pub active_high: bool,
    pub sample_rate_hz: u32,
    #[serde(default)]
    pub iodev: Option<u32>,
}

impl HardwareConfig {
    /// Validate the range invariants spec.md §6 imposes beyond what the
    /// type system can express (`freq` even, `10..=120_000`).
    pub fn validate(&self) -> Result<(), crate::error::Error> {
        if self.sample_rate_hz < 10
            || self.sample_rate_hz > 120_000
            || self.sample_rate_hz % 2 != 0
        {
            return Err(crate::error::Error::Config(format!(
                "sample_rate_hz {} out of range (must be even, 10..=120000)",
                self.sample_rate_hz
            )));
        }
        Ok(())
    }
}

/// Result of a clock-set attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettimeResult {
    Unset,
    Ok,
    Unsafe,
    Fail,
}

/// Main-loop-wide mutable scratch, per spec.md §3: mutated by input hooks,
/// consumed by the main loop and clock setter.
#[derive(Debug, Clone)]
pub struct MlResult {
    pub logfilename: Option<String>,
    pub settime: bool,
    pub settime_result: SettimeResult,
    pub quit: bool,
}

impl MlResult {
    pub fn new(logfilename: Option<String>) -> Self {
        Self {
            logfilename,
            settime: false,
            settime_result: SettimeResult::Unset,
            quit: false,
        }
    }
}

/// Initialisation phase of the time decoder, per spec.md §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitMinute {
    /// First tick ever seen.
    First,
    /// Second minute, decoder still settling.
    Second,
    /// Steady state.
    Steady,
}

impl InitMinute {
    pub fn as_u8(self) -> u8 {
        match self {
            InitMinute::Steady => 0,
            InitMinute::Second => 1,
            InitMinute::First => 2,
        }
    }
}

/// Current decoded or provisional time, paired with its DST/leap state.
pub type CurrentTime = BrokenDownTime;
