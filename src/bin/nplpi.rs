//! `nplpi <config.json> [logfile]`: live mode, reading a GPIO line through
//! the platform `PulseSource`, rendering to stdout, and recording the
//! session to a log file for later `nplpi-analyze` replay (spec §6).

use std::env;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use nplpi::bit_sampler::BitSampler;
use nplpi::calendar::{BrokenDownTime, Dst};
use nplpi::clock_setter::UnixClockSetter;
use nplpi::config;
use nplpi::hooks::StdoutHooks;
use nplpi::log_codec::{self, LogWriter, LoggingBitSource};
use nplpi::main_loop::MainLoop;
use nplpi::pulse_source;

/// Standard `sysexits`-style "usage" exit code (spec §6).
const EX_USAGE: u8 = 64;
/// Standard `sysexits`-style "data error" exit code (spec §6).
const EX_DATAERR: u8 = 65;

/// Default log path when the caller doesn't name one.
const DEFAULT_LOGFILE: &str = "nplpi.log";

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 && args.len() != 3 {
        eprintln!(
            "usage: {} <config.json> [logfile]",
            args.first().map(String::as_str).unwrap_or("nplpi")
        );
        return ExitCode::from(EX_USAGE);
    }

    let cfg = match config::load(Path::new(&args[1])) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EX_DATAERR);
        }
    };

    let source = match pulse_source::open(&cfg) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let logpath = args.get(2).map(String::as_str).unwrap_or(DEFAULT_LOGFILE);
    let logfile = match OpenOptions::new().create(true).append(true).open(logpath) {
        Ok(f) => f,
        Err(e) => {
            log::error!("cannot open log file {logpath}: {e}");
            eprintln!("cannot open log file {logpath}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let (flush_handle, flush_stop) =
        match log_codec::spawn_flush_thread(&logfile, log_codec::DEFAULT_FLUSH_INTERVAL) {
            Ok(pair) => pair,
            Err(e) => {
                log::error!("cannot spawn log flush thread: {e}");
                eprintln!("cannot spawn log flush thread: {e}");
                return ExitCode::FAILURE;
            }
        };
    let writer = match LogWriter::new(logfile) {
        Ok(w) => w,
        Err(e) => {
            log::error!("cannot write log session header: {e}");
            eprintln!("cannot write log session header: {e}");
            return ExitCode::FAILURE;
        }
    };

    let sampler = BitSampler::new(BoxedPulseSource(source), cfg.sample_rate_hz);
    let logging_source = LoggingBitSource::new(sampler, writer);
    // The decoder has no prior time to settle against at startup; it
    // adopts whatever the first few clean minutes decode.
    let start_time = BrokenDownTime::new(1970, 1, 1, 4, 0, 0, Dst::Unknown);

    let mut main_loop = MainLoop::new(
        logging_source,
        StdoutHooks,
        Some(UnixClockSetter::new()),
        start_time,
        Some(logpath.to_string()),
    );

    let run_result = main_loop.run(|| log::info!("nplpi exiting"));

    // Join the flusher before the log file handle goes out of scope (spec
    // §5: concurrent close is forbidden).
    flush_stop.store(true, Ordering::Relaxed);
    let _ = flush_handle.join();

    if let Err(e) = run_result {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Adapts the trait-object `PulseSource` returned by [`pulse_source::open`]
/// to the concrete generic parameter [`BitSampler`] expects.
struct BoxedPulseSource(Box<dyn nplpi::pulse_source::PulseSource>);

impl nplpi::pulse_source::PulseSource for BoxedPulseSource {
    fn read_sample(&mut self) -> Result<nplpi::pulse_source::Level, nplpi::Error> {
        self.0.read_sample()
    }
}
