use std::{
    convert::Infallible,
    fmt,
    io::{self, Write},
    time::Duration,
};

use chrono::Local;
use tracing::info;

use crate::{
    error::RfError,
    rf::{Code, DEFAULT_RECEIVE_TOLERANCE, RfDriver},
};

/// BCM numbering, physical pin 13.
pub const DEFAULT_RX_PIN: u8 = 27;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveConfig {
    pub pin: u8,
    /// Sleep between empty polls, zero spins.
    pub poll_interval: Duration,
    /// Prefix each block with the local time.
    pub timestamp: bool,
    /// Pulse length match tolerance, percent.
    pub tolerance: u32,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            pin: DEFAULT_RX_PIN,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timestamp: false,
            tolerance: DEFAULT_RECEIVE_TOLERANCE,
        }
    }
}

/// Low `bit_length` bits of `value`, MSB first, zero padded.
pub fn dec_to_bin_zero_fill(value: Code, bit_length: u32) -> String {
    (0..bit_length.min(Code::BITS))
        .rev()
        .map(|i| if (value >> i) & 1 == 1 { '1' } else { '0' })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// The driver saw a frame it could not classify. A genuine code 0 ends up
    /// here as well; the driver reports both the same way.
    UnknownEncoding,
    Decoded {
        value: Code,
        bit_length: u32,
        pulse_length: u32,
    },
}

impl Report {
    pub fn read<D: RfDriver + ?Sized>(driver: &D) -> Self {
        match driver.get_value() {
            0 => Report::UnknownEncoding,
            value => Report::Decoded {
                value,
                bit_length: driver.get_bit_length(),
                pulse_length: driver.get_pulse_delay(),
            },
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::UnknownEncoding => writeln!(f, "Unknown encoding"),
            Report::Decoded {
                value,
                bit_length,
                pulse_length,
            } => {
                writeln!(f, "Decimal: {}", value)?;
                writeln!(f, "Bit length: {}", bit_length)?;
                writeln!(f, "Pulse length: {}", pulse_length)?;
                writeln!(f, "Binary: {}", dec_to_bin_zero_fill(*value, *bit_length))
            }
        }
    }
}

/// Print and consume one sample if the driver has one.
pub fn poll_once<D, W>(driver: &mut D, out: &mut W, timestamp: bool) -> io::Result<bool>
where
    D: RfDriver + ?Sized,
    W: Write + ?Sized,
{
    if !driver.is_sample_available() {
        return Ok(false);
    }
    let report = Report::read(driver);
    if timestamp {
        writeln!(out, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))?;
    }
    write!(out, "{}", report)?;
    out.flush()?;
    driver.mark_consumed();
    Ok(true)
}

/// Poll forever. Only a failing `out` (or enabling the pin) ends the loop.
pub fn run_receive_loop<D, W>(driver: &mut D, config: &ReceiveConfig, out: &mut W) -> Result<Infallible, RfError>
where
    D: RfDriver + ?Sized,
    W: Write + ?Sized,
{
    driver.set_receive_tolerance(config.tolerance);
    driver.enable_receive(config.pin)?;
    info!("RF sniffer started on BCM {}, click a button.", config.pin);
    loop {
        if !poll_once(driver, out, config.timestamp)? && !config.poll_interval.is_zero() {
            std::thread::sleep(config.poll_interval);
        }
    }
}
