use std::{io, num::ParseIntError};

use thiserror::Error;

/// GPIO bootstrap failure. Fatal for every binary.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("GPIO unavailable: neither /dev/gpiomem nor exported sysfs pins are usable")]
    GpioUnavailable,
}

#[derive(Debug, Error)]
pub enum GpioError {
    #[error("GPIO used before initialize_gpio succeeded")]
    NotInitialized,
    #[error("invalid BCM pin {0}")]
    InvalidPin(u8),
    /// Sysfs path is active but the pin was never exported.
    #[error("pin {0} is not exported, run `gpio export {0} <in|out>` first")]
    NotExported(u8),
    #[error("gpio io error: {0}")]
    Io(#[from] io::Error),
}

/// Scheduling errors. None of them is fatal; callers log and carry on.
#[derive(Debug, Error)]
pub enum SchedError {
    #[error("failed to query scheduling policy: {0}")]
    PriorityQueryFailed(io::Error),
    #[error("failed to raise scheduling priority: {0}")]
    PriorityElevationDenied(io::Error),
    #[error("failed to restore scheduling priority: {0}")]
    PriorityRestoreFailed(io::Error),
}

#[derive(Debug, Error)]
pub enum RfError {
    #[error(transparent)]
    Gpio(#[from] GpioError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ArgError {
    #[error("malformed code {arg:?}: expected a non-negative base-10 integer ({source})")]
    MalformedArgument {
        arg: String,
        #[source]
        source: ParseIntError,
    },
}
