//! Command-line pieces shared by the transmitting binaries.

use clap::Args;

use crate::{
    error::InitError,
    gpio::open_linux_gpio,
    rf::{DEFAULT_PROTOCOL, PROTOCOLS, RfDriver, rcswitch::RcSwitch, sim::SimDriver},
    transmit::{DEFAULT_BIT_LENGTH, DEFAULT_ITERATIONS, DEFAULT_PULSE_LENGTH, DEFAULT_TX_PIN, TransmitConfig},
};

/// 1-based rc-switch protocol number.
pub fn protocol_parser() -> impl clap::builder::TypedValueParser<Value = u8> {
    clap::value_parser!(u8).range(1..=PROTOCOLS.len() as i64)
}

#[derive(Args, Debug, Clone)]
pub struct TransmitArgs {
    /// Times the whole code set is sent
    #[clap(short = 'i', long = "iterations", value_name = "N", default_value_t = DEFAULT_ITERATIONS)]
    pub iterations: u32,

    #[clap(short = 'p', long = "pin", value_name = "BCM pin", default_value_t = DEFAULT_TX_PIN)]
    pub pin: u8,

    #[clap(short = 'l', long = "pulse-length", value_name = "us", default_value_t = DEFAULT_PULSE_LENGTH)]
    pub pulse_length: u32,

    #[clap(short = 'b', long = "bit-length", value_name = "bits per code", default_value_t = DEFAULT_BIT_LENGTH)]
    pub bit_length: u32,

    /// rc-switch protocol; the pulse length still comes from --pulse-length
    #[clap(short = 'P', long = "protocol", value_parser = protocol_parser(), default_value_t = DEFAULT_PROTOCOL)]
    pub protocol: u8,

    /// Log the sends instead of driving GPIO
    #[clap(long = "simulate")]
    pub simulate: bool,
}

impl TransmitArgs {
    pub fn config(&self) -> TransmitConfig {
        TransmitConfig {
            iterations: self.iterations,
            pin: self.pin,
            pulse_length_us: self.pulse_length,
            bit_length: self.bit_length,
            protocol: self.protocol,
        }
    }

    /// Bootstraps GPIO unless simulating.
    pub fn open_driver(&self) -> Result<Box<dyn RfDriver>, InitError> {
        if self.simulate {
            return Ok(Box::new(SimDriver::new()));
        }
        Ok(Box::new(RcSwitch::new(open_linux_gpio()?)))
    }
}
