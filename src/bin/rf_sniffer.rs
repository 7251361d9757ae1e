use std::{io, process::ExitCode, time::Duration};

use clap::Parser;
use rfpi::{
    gpio::open_linux_gpio,
    receive::{DEFAULT_RX_PIN, ReceiveConfig, run_receive_loop},
    rf::{DEFAULT_RECEIVE_TOLERANCE, rcswitch::RcSwitch, sim::SimDriver},
    trace::init_tracing,
    transmit::DEFAULT_PULSE_LENGTH,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Print the codes picked up by a 433MHz receiver", long_about = None)]
struct Args {
    #[clap(short = 'p', long = "pin", value_name = "BCM pin", default_value_t = DEFAULT_RX_PIN)]
    pin: u8,

    /// Sleep between empty polls, 0 spins
    #[clap(long = "poll-interval-us", value_name = "us", default_value_t = 1000)]
    poll_interval_us: u64,

    /// Pulse length match tolerance in percent
    #[clap(long = "tolerance", value_name = "percent", default_value_t = DEFAULT_RECEIVE_TOLERANCE)]
    tolerance: u32,

    /// Prefix each sample with the local time
    #[clap(short = 't', long = "timestamp")]
    timestamp: bool,

    /// Generate random samples instead of reading GPIO
    #[clap(long = "simulate")]
    simulate: bool,

    #[clap(long = "seed", value_name = "rng seed for --simulate")]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let config = ReceiveConfig {
        pin: args.pin,
        poll_interval: Duration::from_micros(args.poll_interval_us),
        timestamp: args.timestamp,
        tolerance: args.tolerance,
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let result = if args.simulate {
        // about two presses a second
        let rate = (config.poll_interval.as_secs_f64() * 2.0).clamp(1e-4, 1.0);
        let mut driver = SimDriver::random(args.seed, DEFAULT_PULSE_LENGTH, rate);
        run_receive_loop(&mut driver, &config, &mut out)
    } else {
        info!("Setting up GPIO...");
        let gpio = match open_linux_gpio() {
            Ok(g) => g,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        };
        run_receive_loop(&mut RcSwitch::new(gpio), &config, &mut out)
    };

    match result {
        Ok(never) => match never {},
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
