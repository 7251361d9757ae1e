pub mod cli;
pub mod error;
pub mod ffi;
pub mod gpio;
pub mod receive;
pub mod rf;
pub mod sched;
pub mod trace;
pub mod transmit;
