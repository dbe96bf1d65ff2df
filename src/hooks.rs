//! Display hooks (C9) and the input-processing capability set the main
//! loop drives through, per spec §9's design note: "express as an
//! abstract `Hooks` capability set ... any hook may be absent (a no-op
//! default satisfies the contract)".

use crate::types::{BitBuffer, CurrentTime, DtResult, GbResult, MlResult, SettimeResult};

/// The full capability set [`MainLoop`](crate::main_loop::MainLoop) drives
/// through. Every method has a no-op default; implementors override only
/// the hooks they care about.
pub trait Hooks {
    /// A bit was just framed; `bitpos` is its position within the minute.
    fn display_bit(&mut self, _bitpos: u8, _bit: &GbResult) {}

    /// A new second has started (independent of what bit it turned out to
    /// be — useful for a live "tick" indicator).
    fn display_new_second(&mut self) {}

    /// A minute has just been decoded; `buffer`/`dt` are the completed
    /// frame and its validity flags.
    fn display_minute(&mut self, _buffer: &BitBuffer, _dt: &DtResult) {}

    /// The current decoded/provisional time, called after every minute.
    fn display_time(&mut self, _time: &CurrentTime) {}

    /// A too-long minute was detected; there is no usable frame to show.
    fn display_long_minute(&mut self) {}

    /// Called once per loop iteration before the bit is acted on; may
    /// mutate `mlr` (e.g. to request `quit` or `settime`).
    fn process_input(&mut self, _mlr: &mut MlResult) {}

    /// Called once per loop iteration after the bit has been acted on.
    fn post_process_input(&mut self, _mlr: &MlResult) {}

    /// The outcome of an attempted clock-set.
    fn process_setclock_result(&mut self, _result: SettimeResult) {}
}

/// Satisfies the `Hooks` contract with every hook absent.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl Hooks for NoopHooks {}

/// A minimal stdout sink, standing in for the reference curses display
/// (spec §1: "the curses/stdout display (a set of callback hooks)" is out
/// of scope beyond its contract).
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutHooks;

impl Hooks for StdoutHooks {
    fn display_minute(&mut self, _buffer: &BitBuffer, dt: &DtResult) {
        println!(
            "minute: len={:?} year={:?} month={:?} mday={:?} wday={:?} hour={:?} minute={:?}",
            dt.minute_length,
            dt.year_status,
            dt.month_status,
            dt.mday_status,
            dt.wday_status,
            dt.hour_status,
            dt.minute_status,
        );
    }

    fn display_time(&mut self, time: &CurrentTime) {
        println!(
            "{:04}-{:02}-{:02} {:02}:{:02} dst={:?}",
            time.year, time.month, time.day, time.hour, time.minute, time.dst
        );
    }

    fn display_long_minute(&mut self) {
        println!("!! minute too long, resyncing !!");
    }

    fn process_setclock_result(&mut self, result: SettimeResult) {
        println!("setclock: {result:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_hooks_accepts_every_call() {
        let mut h = NoopHooks;
        let mut mlr = MlResult::new(None);
        h.process_input(&mut mlr);
        h.post_process_input(&mlr);
        h.display_new_second();
        h.display_long_minute();
        h.process_setclock_result(SettimeResult::Ok);
    }
}
