//! `nplpi-readpin <config.json> [--simulate]`: raw GPIO probe, printing
//! every sample level as it is read (spec §6). `--simulate` replays a
//! fixed alternating sequence instead of opening real hardware, for
//! testing the wiring harness without a receiver attached.

use std::env;
use std::path::Path;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use nplpi::config;
use nplpi::pulse_source::{self, Level, NullPulseSource, PulseSource};

const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let simulate = args.iter().any(|a| a == "--simulate");
    let positional: Vec<&String> = args.iter().skip(1).filter(|a| *a != "--simulate").collect();
    if positional.len() != 1 {
        eprintln!(
            "usage: {} <config.json> [--simulate]",
            args.first().map(String::as_str).unwrap_or("nplpi-readpin")
        );
        return ExitCode::from(EX_USAGE);
    }

    let cfg = match config::load(Path::new(positional[0])) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(EX_DATAERR);
        }
    };

    let mut source: Box<dyn PulseSource> = if simulate {
        Box::new(NullPulseSource::new(vec![Level::Low, Level::High]))
    } else {
        match pulse_source::open(&cfg) {
            Ok(source) => source,
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
    };

    let period = Duration::from_micros(1_000_000 / cfg.sample_rate_hz as u64);
    loop {
        match source.read_sample() {
            Ok(Level::High) => println!("1"),
            Ok(Level::Low) => println!("0"),
            Err(e) => {
                eprintln!("{e}");
                return ExitCode::FAILURE;
            }
        }
        thread::sleep(period);
    }
}
