use std::process::ExitCode;

use clap::Parser;
use rfpi::{
    cli::TransmitArgs,
    ffi::send_codes,
    rf::Code,
    sched::OsScheduler,
    trace::init_tracing,
    transmit::parse_code,
};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Send decimal RF codes through a 433MHz transmitter", long_about = None)]
struct Args {
    #[clap(value_name = "CODE", value_parser = parse_code)]
    codes: Vec<Code>,

    #[clap(flatten)]
    tx: TransmitArgs,
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let config = args.tx.config();

    let status = send_codes(&mut OsScheduler, || args.tx.open_driver(), &args.codes, &config);
    ExitCode::from(status as u8)
}
