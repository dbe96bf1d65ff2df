//! LogCodec (C7): the single-character-per-bit log format (spec §4.7,
//! §6, §4.7a).
//!
//! `LogReader` and `LogWriter` are the playback and recording sides of the
//! same 7-bit ASCII protocol. The reader normalises `\r`/`\r\n`/`\n` to a
//! single `\n` and silently drops any byte outside `012345\nxr#*_a` — this
//! deliberately excludes the `<`/`>`/`!` diagnostic markers the writer
//! emits: they are write-only annotations for a human reading the log,
//! not meaningful to replay.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::bit_source::BitSource;
use crate::error::Error;
use crate::types::{BitSymbol, GbResult, HwStatus, Marker};

/// Default interval between background log flushes (spec §5).
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Spawns the optional background flush thread (spec §5): it shares only a
/// `dup`'d file descriptor, never the main thread's handle, so the two
/// sides never contend for the write path — the flusher only ever calls
/// `flush()`. The returned `Arc<AtomicBool>` should be set to request a
/// clean shutdown; `join()` the handle afterwards before closing the main
/// log handle (spec §5: "concurrent close is forbidden").
pub fn spawn_flush_thread(
    file: &File,
    interval: Duration,
) -> io::Result<(JoinHandle<()>, Arc<AtomicBool>)> {
    let mut flush_handle = file.try_clone()?;
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_thread = Arc::clone(&stop);
    let handle = std::thread::spawn(move || {
        while !stop_for_thread.load(Ordering::Relaxed) {
            std::thread::sleep(interval);
            let _ = flush_handle.flush();
        }
    });
    Ok((handle, stop))
}

/// Bytes the reader recognises; anything else is skipped, one byte at a
/// time, per spec §4.7.
const RECOGNISED: &[u8] = b"012345\nxr#*_a";

/// One parsed record from the log stream.
enum LogRecord {
    Bit(GbResult),
    AccMinlenMs(i64),
}

/// Reads one character at a time from a buffered byte stream, reassembling
/// bit-pair symbols, hardware-status markers and `a<ms>` accumulator
/// records.
pub struct LogReader<R: BufRead> {
    inner: R,
    peeked: Option<u8>,
    acc_minlen_ms: i64,
    pending_dec_bp: bool,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
            acc_minlen_ms: 0,
            pending_dec_bp: false,
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        let n = self.inner.read(&mut buf)?;
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(buf[0]))
        }
    }

    /// Read the next recognised byte, collapsing CR/CRLF/LF to `\n` and
    /// skipping anything not in [`RECOGNISED`].
    fn next_raw_char(&mut self) -> io::Result<Option<u8>> {
        loop {
            let b = match self.peeked.take() {
                Some(b) => b,
                None => match self.read_byte()? {
                    Some(b) => b,
                    None => return Ok(None),
                },
            };
            let b = if b == b'\r' {
                match self.read_byte()? {
                    Some(b'\n') => b'\n',
                    Some(other) => {
                        self.peeked = Some(other);
                        b'\n'
                    }
                    None => b'\n',
                }
            } else {
                b
            };
            if RECOGNISED.contains(&b) {
                return Ok(Some(b));
            }
        }
    }

    fn peek_raw_char(&mut self) -> io::Result<Option<u8>> {
        if self.peeked.is_none() {
            self.peeked = self.next_raw_char()?;
        }
        Ok(self.peeked)
    }

    fn next_record(&mut self) -> io::Result<Option<LogRecord>> {
        let Some(b) = self.next_raw_char()? else {
            return Ok(None);
        };
        if b == b'a' {
            let mut digits = Vec::with_capacity(10);
            while digits.len() < 10 {
                match self.peek_raw_char()? {
                    Some(c) if c.is_ascii_digit() => {
                        digits.push(c);
                        self.peeked = None;
                    }
                    _ => break,
                }
            }
            let ms: i64 = std::str::from_utf8(&digits)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
            return Ok(Some(LogRecord::AccMinlenMs(ms)));
        }
        if b == b'\n' {
            return Ok(Some(LogRecord::Bit(GbResult {
                skip: true,
                ..GbResult::idle()
            })));
        }
        let bitval = match b {
            b'0'..=b'4' => BitSymbol::from_code(b - b'0').unwrap(),
            _ => BitSymbol::Unknown,
        };
        let hwstat = match b {
            b'x' => HwStatus::Transmit,
            b'r' => HwStatus::Receive,
            b'#' => HwStatus::Random,
            _ => HwStatus::Ok,
        };
        let bad_io = b == b'*';
        let marker = if bitval == BitSymbol::BeginOfMinute {
            Marker::Minute
        } else {
            Marker::None
        };
        Ok(Some(LogRecord::Bit(GbResult {
            marker,
            bitval,
            hwstat,
            bad_io,
            skip: false,
            done: false,
            freq_guard: None,
            bitlen_reset: false,
        })))
    }
}

impl<R: BufRead> BitSource for LogReader<R> {
    fn get_bit(&mut self, bitpos: u8) -> Result<GbResult, Error> {
        loop {
            match self.next_record().map_err(Error::Log)? {
                None => {
                    return Ok(GbResult {
                        done: true,
                        ..GbResult::idle()
                    })
                }
                Some(LogRecord::AccMinlenMs(ms)) => {
                    self.acc_minlen_ms = ms;
                    return Ok(GbResult {
                        skip: true,
                        ..GbResult::idle()
                    });
                }
                Some(LogRecord::Bit(gb)) => {
                    if !gb.skip {
                        // One-symbol look-ahead: a `\n` or `a` immediately
                        // following the last real bit of an under-length
                        // minute requests a `dec_bp` roll-back (spec §4.7).
                        if let Some(next) = self.peek_raw_char().map_err(Error::Log)? {
                            if (next == b'\n' || next == b'a') && bitpos < 59 {
                                self.pending_dec_bp = true;
                            }
                        }
                    }
                    return Ok(gb);
                }
            }
        }
    }

    fn acc_minlen_ms(&self) -> i64 {
        self.acc_minlen_ms
    }

    fn reset_acc_minlen(&mut self) {
        self.acc_minlen_ms = 0;
    }

    fn take_dec_bp(&mut self) -> bool {
        let v = self.pending_dec_bp;
        self.pending_dec_bp = false;
        v
    }
}

/// Writes the log format's character protocol, including the session
/// header. Used both by `nplpi` (recording a live session) and by tests.
pub struct LogWriter<W: Write> {
    inner: W,
}

impl<W: Write> LogWriter<W> {
    /// Opens the writer and emits the session header `"\n--new log--\n\n"`.
    pub fn new(mut inner: W) -> io::Result<Self> {
        inner.write_all(b"\n--new log--\n\n")?;
        Ok(Self { inner })
    }

    pub fn write_bit(&mut self, bitval: BitSymbol) -> io::Result<()> {
        let c = match bitval.code() {
            Some(n) => b'0' + n,
            None => b'_',
        };
        self.inner.write_all(&[c])
    }

    pub fn write_hw_status(&mut self, hwstat: HwStatus) -> io::Result<()> {
        let c = match hwstat {
            HwStatus::Transmit => b'x',
            HwStatus::Receive => b'r',
            HwStatus::Random => b'#',
            HwStatus::Ok => return Ok(()),
        };
        self.inner.write_all(&[c])
    }

    pub fn write_bad_io(&mut self) -> io::Result<()> {
        self.inner.write_all(b"*")
    }

    /// `<`/`>`: the frequency out-of-range guard fired (spec §4.3).
    pub fn write_freq_guard(&mut self, was_low: bool) -> io::Result<()> {
        self.inner.write_all(if was_low { b"<" } else { b">" })
    }

    /// `!`: the adaptive bit-length references were reset (spec §4.3).
    pub fn write_bitlen_reset(&mut self) -> io::Result<()> {
        self.inner.write_all(b"!")
    }

    /// `a<ms>\n`, capped to 10 decimal digits per spec §4.7.
    pub fn write_acc_minlen(&mut self, ms: i64) -> io::Result<()> {
        let clamped = ms.clamp(0, 9_999_999_999);
        write!(self.inner, "a{clamped}\n")
    }

    pub fn write_minute_boundary(&mut self) -> io::Result<()> {
        self.inner.write_all(b"\n")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

/// Wraps a live [`BitSource`] and mirrors every bit it yields to a
/// [`LogWriter`], so a live session produces the same character stream a
/// `LogReader` can later replay. Used by `nplpi` to record (spec §6).
pub struct LoggingBitSource<B: BitSource, W: Write> {
    inner: B,
    writer: LogWriter<W>,
}

impl<B: BitSource, W: Write> LoggingBitSource<B, W> {
    pub fn new(inner: B, writer: LogWriter<W>) -> Self {
        Self { inner, writer }
    }
}

impl<B: BitSource, W: Write> BitSource for LoggingBitSource<B, W> {
    fn get_bit(&mut self, bitpos: u8) -> Result<GbResult, Error> {
        let gb = self.inner.get_bit(bitpos)?;
        if gb.done {
            return Ok(gb);
        }
        if gb.bad_io {
            let _ = self.writer.write_bad_io();
            return Ok(gb);
        }
        if !gb.skip {
            let _ = self.writer.write_bit(gb.bitval);
            let _ = self.writer.write_hw_status(gb.hwstat);
            if let Some(was_low) = gb.freq_guard {
                let _ = self.writer.write_freq_guard(was_low);
            }
            if gb.bitlen_reset {
                let _ = self.writer.write_bitlen_reset();
            }
            if gb.marker == Marker::Minute || gb.marker == Marker::Late {
                let _ = self.writer.write_minute_boundary();
                let _ = self.writer.write_acc_minlen(self.inner.acc_minlen_ms());
            }
        }
        Ok(gb)
    }

    fn acc_minlen_ms(&self) -> i64 {
        self.inner.acc_minlen_ms()
    }

    fn reset_acc_minlen(&mut self) {
        self.inner.reset_acc_minlen()
    }

    fn take_dec_bp(&mut self) -> bool {
        self.inner.take_dec_bp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_clean_bit_sequence() {
        let mut r = LogReader::new(Cursor::new(b"40123\n".to_vec()));
        let mut out = Vec::new();
        loop {
            let gb = r.get_bit(0).unwrap();
            if gb.done {
                break;
            }
            if !gb.skip {
                out.push(gb.bitval);
            }
        }
        assert_eq!(
            out,
            vec![
                BitSymbol::BeginOfMinute,
                BitSymbol::Pair10,
                BitSymbol::Pair01Split,
                BitSymbol::Pair11,
            ]
        );
    }

    #[test]
    fn collapses_crlf_and_cr_to_lf() {
        let mut r = LogReader::new(Cursor::new(b"0\r\n1\r2".to_vec()));
        let a = r.get_bit(0).unwrap();
        assert_eq!(a.bitval, BitSymbol::Pair00);
        let b = r.get_bit(0).unwrap();
        assert!(b.skip); // the collapsed \n
        let c = r.get_bit(0).unwrap();
        assert_eq!(c.bitval, BitSymbol::Pair10);
    }

    #[test]
    fn parses_acc_minlen_record() {
        let mut r = LogReader::new(Cursor::new(b"a60000\n".to_vec()));
        let gb = r.get_bit(0).unwrap();
        assert!(gb.skip);
        assert_eq!(r.acc_minlen_ms(), 60_000);
    }

    #[test]
    fn skips_unrecognised_diagnostic_bytes_on_read() {
        let mut r = LogReader::new(Cursor::new(b"<0>1!".to_vec()));
        let a = r.get_bit(0).unwrap();
        assert_eq!(a.bitval, BitSymbol::Pair00);
        let b = r.get_bit(0).unwrap();
        assert_eq!(b.bitval, BitSymbol::Pair10);
    }

    #[test]
    fn hw_status_chars_set_marker_and_bad_io() {
        let mut r = LogReader::new(Cursor::new(b"x r # *".to_vec()));
        let x = r.get_bit(0).unwrap();
        assert_eq!(x.hwstat, HwStatus::Transmit);
        let r2 = r.get_bit(0).unwrap();
        assert_eq!(r2.hwstat, HwStatus::Receive);
        let h = r.get_bit(0).unwrap();
        assert_eq!(h.hwstat, HwStatus::Random);
        let star = r.get_bit(0).unwrap();
        assert!(star.bad_io);
    }

    #[test]
    fn dec_bp_requested_before_newline_on_short_minute() {
        let mut r = LogReader::new(Cursor::new(b"1\n".to_vec()));
        let _ = r.get_bit(5).unwrap(); // bitpos 5 < 59: under-length
        assert!(r.take_dec_bp());
    }

    #[test]
    fn dec_bp_not_requested_at_full_length() {
        let mut r = LogReader::new(Cursor::new(b"1\n".to_vec()));
        let _ = r.get_bit(59).unwrap();
        assert!(!r.take_dec_bp());
    }

    #[test]
    fn writer_emits_session_header() {
        let buf: Vec<u8> = Vec::new();
        let w = LogWriter::new(buf).unwrap();
        assert_eq!(w.get_ref(), b"\n--new log--\n\n");
    }

    #[test]
    fn writer_round_trips_bit_symbols() {
        let mut w = LogWriter::new(Vec::new()).unwrap();
        w.write_bit(BitSymbol::BeginOfMinute).unwrap();
        w.write_bit(BitSymbol::Pair00).unwrap();
        w.write_bit(BitSymbol::Unknown).unwrap();
        let written = &w.get_ref()[14..]; // after the session header
        assert_eq!(written, b"40_");
    }

    #[test]
    fn writer_caps_acc_minlen_at_ten_digits() {
        let mut w = LogWriter::new(Vec::new()).unwrap();
        w.write_acc_minlen(99_999_999_999).unwrap();
        let written = &w.get_ref()[14..];
        assert_eq!(written, b"a9999999999\n");
    }

    struct StubSource(std::vec::IntoIter<GbResult>);

    impl BitSource for StubSource {
        fn get_bit(&mut self, _bitpos: u8) -> Result<GbResult, Error> {
            Ok(self.0.next().unwrap_or(GbResult {
                done: true,
                ..GbResult::idle()
            }))
        }
        fn acc_minlen_ms(&self) -> i64 {
            60_000
        }
        fn reset_acc_minlen(&mut self) {}
    }

    #[test]
    fn logging_bit_source_mirrors_bits_and_diagnostics() {
        let stub = StubSource(
            vec![
                GbResult {
                    bitval: BitSymbol::Pair00,
                    freq_guard: Some(true),
                    ..GbResult::idle()
                },
                GbResult {
                    bitval: BitSymbol::Pair10,
                    bitlen_reset: true,
                    ..GbResult::idle()
                },
                GbResult {
                    bitval: BitSymbol::BeginOfMinute,
                    marker: Marker::Minute,
                    ..GbResult::idle()
                },
            ]
            .into_iter(),
        );
        let writer = LogWriter::new(Vec::new()).unwrap();
        let mut src = LoggingBitSource::new(stub, writer);
        for _ in 0..3 {
            src.get_bit(0).unwrap();
        }
        let written = &src.writer.get_ref()[14..];
        assert_eq!(written, b"0<1!4\na60000\n");
    }
}
