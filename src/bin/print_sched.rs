use std::process::ExitCode;

use clap::Parser;
use rfpi::{
    sched::{SchedPolicy, priority_range},
    trace::init_tracing,
};
use tracing::error;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Print min and max priority of each scheduling policy", long_about = None)]
struct Args {}

fn main() -> ExitCode {
    init_tracing();
    let _args = Args::parse();

    let mut status = ExitCode::SUCCESS;
    for policy in SchedPolicy::ALL {
        match priority_range(policy) {
            Ok((min, max)) => println!("{} min: {}\tmax: {}", policy, min, max),
            Err(e) => {
                error!("{}: {}", policy, e);
                status = ExitCode::FAILURE;
            }
        }
    }
    status
}
