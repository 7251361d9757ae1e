//! RF transceiver drivers.
//!
//! [`RfDriver`] is the narrow surface the tools use: enable a pin, poll for a
//! decoded sample, or fire a code. [`rcswitch::RcSwitch`] talks to real hardware,
//! [`sim::SimDriver`] fakes it.

use crate::error::RfError;

pub mod rcswitch;
pub mod sim;

/// One RF command, as typed on the command line.
pub type Code = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub value: Code,
    pub bit_length: u32,
    /// Measured base pulse length in microseconds.
    pub pulse_delay: u32,
    /// 1-based index into [`PROTOCOLS`].
    pub protocol: u8,
}

/// Pulse counts of one symbol: `high` pulses on, then `low` pulses off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighLow {
    pub high: u32,
    pub low: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protocol {
    pub pulse_length: u32,
    pub sync: HighLow,
    pub zero: HighLow,
    pub one: HighLow,
}

pub const DEFAULT_PROTOCOL: u8 = 1;
pub const DEFAULT_RECEIVE_TOLERANCE: u32 = 60;

/// The rc-switch protocol table, first three entries.
pub const PROTOCOLS: [Protocol; 3] = [
    Protocol {
        pulse_length: 350,
        sync: HighLow { high: 1, low: 31 },
        zero: HighLow { high: 1, low: 3 },
        one: HighLow { high: 3, low: 1 },
    },
    Protocol {
        pulse_length: 650,
        sync: HighLow { high: 1, low: 10 },
        zero: HighLow { high: 1, low: 2 },
        one: HighLow { high: 2, low: 1 },
    },
    Protocol {
        pulse_length: 100,
        sync: HighLow { high: 30, low: 71 },
        zero: HighLow { high: 4, low: 11 },
        one: HighLow { high: 9, low: 6 },
    },
];

/// Operations the tools need from an RF transceiver driver.
///
/// `send` has no result: the hardware gives no acknowledgement, so a code
/// leaving the antenna can never be confirmed from this side.
pub trait RfDriver {
    /// Match tolerance of received pulse lengths, in percent.
    fn set_receive_tolerance(&mut self, percent: u32);
    fn enable_receive(&mut self, pin: u8) -> Result<(), RfError>;
    fn is_sample_available(&mut self) -> bool;
    /// Value of the pending sample, 0 when there is none.
    fn get_value(&self) -> Code;
    fn get_bit_length(&self) -> u32;
    fn get_pulse_delay(&self) -> u32;
    fn mark_consumed(&mut self);

    fn enable_transmit(&mut self, pin: u8) -> Result<(), RfError>;
    /// 1-based index into [`PROTOCOLS`]. Unknown numbers keep the current one.
    fn set_protocol(&mut self, n: u8);
    fn set_pulse_length(&mut self, us: u32);
    fn send(&mut self, code: Code, bit_length: u32);
}
