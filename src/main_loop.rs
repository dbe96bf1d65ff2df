//! MainLoop (C6): glues `PulseSource`/`LogCodec` -> `BitSampler` ->
//! `Framer` -> `TimeDecoder`, drives hooks, and handles clock-set
//! requests (spec §4.6).
//!
//! MainLoop exclusively owns the bit buffer, decoder state and current
//! time for the process lifetime (spec §3); no other component holds a
//! reference to them across calls.

use std::time::SystemTime;

use crate::bit_source::BitSource;
use crate::calendar::BrokenDownTime;
use crate::clock_setter::{self, ClockSetter};
use crate::error::Error;
use crate::framer::Framer;
use crate::hooks::Hooks;
use crate::time_decoder::{self, DecoderState};
use crate::types::{
    new_bit_buffer, BitBuffer, BitSymbol, DtResult, HwStatus, InitMinute, Marker, MlResult,
    SettimeResult, BIT_BUFFER_LEN,
};

pub struct MainLoop<B: BitSource, H: Hooks, C: ClockSetter> {
    bit_source: B,
    hooks: H,
    clock_setter: Option<C>,
    framer: Framer,
    decoder_state: DecoderState,
    buffer: BitBuffer,
    current: BrokenDownTime,
    init_min: InitMinute,
    last_marker: Marker,
    last_dt: Option<DtResult>,
    last_marker_instant: SystemTime,
    mlr: MlResult,
}

impl<B: BitSource, H: Hooks, C: ClockSetter> MainLoop<B, H, C> {
    pub fn new(
        bit_source: B,
        hooks: H,
        clock_setter: Option<C>,
        start_time: BrokenDownTime,
        logfilename: Option<String>,
    ) -> Self {
        Self {
            bit_source,
            hooks,
            clock_setter,
            framer: Framer::new(),
            decoder_state: DecoderState::new(),
            buffer: new_bit_buffer(),
            current: start_time,
            init_min: InitMinute::First,
            last_marker: Marker::None,
            last_dt: None,
            last_marker_instant: SystemTime::now(),
            mlr: MlResult::new(logfilename),
        }
    }

    pub fn current_time(&self) -> &BrokenDownTime {
        &self.current
    }

    /// Drive the loop to completion. `cleanup` runs exactly once, after
    /// `bit.done || mlr.quit` terminates the loop (spec §4.6).
    pub fn run<F: FnOnce()>(&mut self, cleanup: F) -> Result<(), Error> {
        loop {
            let bitpos_before = self.framer.bitpos();
            let gb = self.bit_source.get_bit(bitpos_before)?;

            self.hooks.process_input(&mut self.mlr);
            if gb.done || self.mlr.quit {
                break;
            }
            self.hooks.display_bit(bitpos_before, &gb);

            if gb.hwstat != HwStatus::Ok {
                log::warn!("hwstat {:?} at bitpos {}", gb.hwstat, bitpos_before);
            }

            if gb.bad_io {
                log::warn!("bad_io at bitpos {}", bitpos_before);
                self.hooks.post_process_input(&self.mlr);
                continue;
            }

            if self.bit_source.take_dec_bp() {
                self.framer.dec_bp();
            }

            let is_bom = gb.bitval == BitSymbol::BeginOfMinute;
            if !gb.skip {
                let idx = if is_bom { 0 } else { bitpos_before as usize };
                if idx < BIT_BUFFER_LEN {
                    self.buffer[idx] = gb.bitval;
                }
            }

            if is_bom {
                self.last_marker_instant = SystemTime::now();
                let minlen = bitpos_before as i64;
                let marker = self.framer.handle_minute_marker();
                self.process_minute_boundary(minlen, marker);
            } else {
                let marker = self.framer.next_bit(gb.skip);
                if marker == Marker::TooLong {
                    self.process_minute_boundary(-1, marker);
                }
            }

            self.hooks.display_new_second();
            self.hooks.post_process_input(&self.mlr);

            if self.mlr.settime {
                self.attempt_setclock();
            }
        }
        cleanup();
        Ok(())
    }

    fn process_minute_boundary(&mut self, minlen: i64, marker: Marker) {
        let acc_minlen = self.bit_source.acc_minlen_ms();
        let dt = time_decoder::decode_minute(
            &mut self.decoder_state,
            self.init_min,
            minlen,
            acc_minlen,
            &self.buffer,
            &mut self.current,
        );
        if minlen == -1 {
            self.hooks.display_long_minute();
        } else {
            self.hooks.display_minute(&self.buffer, &dt);
            self.hooks.display_time(&self.current);
        }
        self.bit_source.reset_acc_minlen();
        self.last_marker = marker;
        self.init_min = match self.init_min {
            InitMinute::First => InitMinute::Second,
            _ => InitMinute::Steady,
        };
        self.last_dt = Some(dt);
    }

    fn attempt_setclock(&mut self) {
        let result = match (&self.last_dt, self.clock_setter.as_mut()) {
            (Some(dt), Some(setter))
                if clock_setter::setclock_ok(self.init_min, dt, self.last_marker) =>
            {
                match setter.setclock(&self.current, self.last_marker_instant) {
                    Ok(()) => SettimeResult::Ok,
                    Err(_) => SettimeResult::Fail,
                }
            }
            _ => SettimeResult::Unsafe,
        };
        self.mlr.settime = false;
        self.mlr.settime_result = result;
        self.hooks.process_setclock_result(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::Dst;
    use crate::clock_setter::NullClockSetter;
    use crate::hooks::NoopHooks;
    use crate::log_codec::LogReader;
    use std::io::Cursor;

    fn start_time() -> BrokenDownTime {
        BrokenDownTime::new(2019, 3, 15, 5, 12, 33, Dst::Winter)
    }

    #[test]
    fn run_terminates_immediately_on_empty_log() {
        let source = LogReader::new(Cursor::new(Vec::new()));
        let mut ml = MainLoop::new(
            source,
            NoopHooks,
            None::<NullClockSetter>,
            start_time(),
            None,
        );
        let mut cleaned_up = false;
        ml.run(|| cleaned_up = true).unwrap();
        assert!(cleaned_up);
        assert_eq!(*ml.current_time(), start_time());
    }

    #[test]
    fn quit_request_stops_the_loop() {
        struct QuitImmediately;
        impl Hooks for QuitImmediately {
            fn process_input(&mut self, mlr: &mut MlResult) {
                mlr.quit = true;
            }
        }
        // An infinite run of '0' bits would never terminate on its own;
        // only the quit request should stop the loop.
        let source = LogReader::new(Cursor::new(b"000000000000".to_vec()));
        let mut ml = MainLoop::new(
            source,
            QuitImmediately,
            None::<NullClockSetter>,
            start_time(),
            None,
        );
        ml.run(|| {}).unwrap();
        assert_eq!(*ml.current_time(), start_time());
    }

    #[test]
    fn too_long_minute_processes_pending_boundary() {
        // 62 plain bits with no begin-of-minute marker: the framer
        // reports `TooLong` and the loop must decode the pending boundary
        // (minlen=-1) without panicking, then keep going.
        let bits: Vec<u8> = std::iter::repeat(b'0').take(62).collect();
        let source = LogReader::new(Cursor::new(bits));
        let mut ml = MainLoop::new(
            source,
            NoopHooks,
            None::<NullClockSetter>,
            start_time(),
            None,
        );
        ml.run(|| {}).unwrap();
        // No commit happened: the seed time is unchanged.
        assert_eq!(*ml.current_time(), start_time());
    }
}
