//! `nplpi-analyze <infile>`: offline replay of a recorded log file to
//! stdout (spec §6). No clock is ever set; `--settime` is meaningless for
//! recorded input.

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::process::ExitCode;

use nplpi::calendar::{BrokenDownTime, Dst};
use nplpi::clock_setter::NullClockSetter;
use nplpi::hooks::StdoutHooks;
use nplpi::log_codec::LogReader;
use nplpi::main_loop::MainLoop;

const EX_USAGE: u8 = 64;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!(
            "usage: {} <infile>",
            args.first().map(String::as_str).unwrap_or("nplpi-analyze")
        );
        return ExitCode::from(EX_USAGE);
    }

    let file = match File::open(Path::new(&args[1])) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cannot open {}: {e}", args[1]);
            return ExitCode::FAILURE;
        }
    };
    let reader = LogReader::new(BufReader::new(file));
    let start_time = BrokenDownTime::new(1970, 1, 1, 4, 0, 0, Dst::Unknown);

    let mut main_loop = MainLoop::new(
        reader,
        StdoutHooks,
        None::<NullClockSetter>,
        start_time,
        Some(args[1].clone()),
    );

    if let Err(e) = main_loop.run(|| {}) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
