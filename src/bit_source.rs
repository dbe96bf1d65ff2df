//! The common interface [`MainLoop`](crate::main_loop::MainLoop) drives:
//! either a live [`BitSampler`](crate::bit_sampler::BitSampler) or a
//! recorded [`LogReader`](crate::log_codec::LogReader) can supply bits,
//! per spec §4.6 ("supports both live and recorded (log-file) input").

use crate::error::Error;
use crate::types::GbResult;

/// Yields one [`GbResult`] per call, tracks the running accumulated
/// minute length, and (log playback only) the one-symbol look-ahead
/// roll-back signal described in spec §4.7.
pub trait BitSource {
    /// Grab the next bit. `bitpos` is the framer's current
    /// second-within-minute, needed by the live sampler's self-calibration
    /// step.
    fn get_bit(&mut self, bitpos: u8) -> Result<GbResult, Error>;

    /// Accumulated minute length so far, in milliseconds (spec §4.3's
    /// `acc_minlen`, or the log's `a<ms>` record for playback).
    fn acc_minlen_ms(&self) -> i64;

    /// Reset the per-minute accumulator; called by the main loop after a
    /// committed or `late` minute marker.
    fn reset_acc_minlen(&mut self);

    /// Consume a pending `dec_bp` request (log playback only): the
    /// framer should step `bitpos` back by one before processing the
    /// pending minute marker. Live sampling never requests this.
    fn take_dec_bp(&mut self) -> bool {
        false
    }
}
