use std::{
    process::ExitCode,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use clap::Parser;
use rfpi::{
    cli::TransmitArgs,
    rf::Code,
    sched::OsScheduler,
    trace::init_tracing,
    transmit::{DEFAULT_OFF_CODE, DEFAULT_ON_CODE, ToggleConfig, parse_code, toggle},
};
use tracing::error;

static STOP: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    STOP.store(true, Ordering::Relaxed);
}

#[derive(Parser, Debug)]
#[clap(author, version, about = "Toggle RF switches on and off to measure reliability", long_about = None)]
struct Args {
    #[clap(long = "on", value_name = "CODE", num_args = 1.., requires = "off", value_parser = parse_code)]
    on: Vec<Code>,

    #[clap(long = "off", value_name = "CODE", num_args = 1.., requires = "on", value_parser = parse_code)]
    off: Vec<Code>,

    /// Number of on/off rounds, default until Ctrl-C
    #[clap(short = 'n', long = "times")]
    times: Option<usize>,

    #[clap(long = "interval-ms", value_name = "pause before each switch", default_value_t = 500)]
    interval_ms: u64,

    #[clap(flatten)]
    tx: TransmitArgs,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let config = ToggleConfig {
        on: if args.on.is_empty() { vec![DEFAULT_ON_CODE] } else { args.on.clone() },
        off: if args.off.is_empty() { vec![DEFAULT_OFF_CODE] } else { args.off.clone() },
        times: args.times,
        interval: Duration::from_millis(args.interval_ms),
        transmit: args.tx.config(),
    };

    let mut driver = match args.tx.open_driver() {
        Ok(d) => d,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let handler = on_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }

    match toggle(&mut *driver, &mut OsScheduler, &config, &STOP) {
        Ok(n) => {
            println!("That ran {} times.", n);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
