//! Simulated transceiver for dry runs and tests.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use tracing::{info, warn};

use super::{Code, DEFAULT_PROTOCOL, DEFAULT_RECEIVE_TOLERANCE, PROTOCOLS, RfDriver, Sample};
use crate::error::RfError;

struct Noise {
    rng: StdRng,
    jitter: Option<Normal<f64>>,
    /// Chance that one poll finds a new sample.
    rate: f64,
}

/// Records every send; on receive replays a script, then optionally
/// produces random samples.
pub struct SimDriver {
    script: VecDeque<Sample>,
    noise: Option<Noise>,
    pulse_length: u32,
    protocol: u8,
    receive_tolerance: u32,
    tx_pin: Option<u8>,
    rx_pin: Option<u8>,
    sent: Vec<(Code, u32)>,
    pending: Option<Sample>,
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDriver {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            noise: None,
            pulse_length: PROTOCOLS[0].pulse_length,
            protocol: DEFAULT_PROTOCOL,
            receive_tolerance: DEFAULT_RECEIVE_TOLERANCE,
            tx_pin: None,
            rx_pin: None,
            sent: Vec::new(),
            pending: None,
        }
    }

    pub fn scripted(samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            script: samples.into_iter().collect(),
            ..Self::new()
        }
    }

    /// Random remote presses around `pulse_length`, roughly one per `1/rate` polls.
    pub fn random(seed: Option<u64>, pulse_length: u32, rate: f64) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        let jitter = Normal::new(pulse_length as f64, pulse_length as f64 * 0.02).ok();
        Self {
            noise: Some(Noise { rng, jitter, rate: rate.clamp(0.0, 1.0) }),
            pulse_length,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> &[(Code, u32)] {
        &self.sent
    }

    pub fn sent_codes(&self) -> Vec<Code> {
        self.sent.iter().map(|(c, _)| *c).collect()
    }

    pub fn pulse_length(&self) -> u32 {
        self.pulse_length
    }

    pub fn protocol(&self) -> u8 {
        self.protocol
    }

    pub fn receive_tolerance(&self) -> u32 {
        self.receive_tolerance
    }

    pub fn tx_pin(&self) -> Option<u8> {
        self.tx_pin
    }

    pub fn rx_pin(&self) -> Option<u8> {
        self.rx_pin
    }

    fn next_sample(&mut self) -> Option<Sample> {
        if let Some(s) = self.script.pop_front() {
            return Some(s);
        }
        let noise = self.noise.as_mut()?;
        if !noise.rng.random_bool(noise.rate) {
            return None;
        }
        // about one in ten presses does not match any protocol
        let value = if noise.rng.random_bool(0.1) {
            0
        } else {
            noise.rng.random_range(1..1 << 24)
        };
        let pulse_delay = match &noise.jitter {
            Some(n) => n.sample(&mut noise.rng).round().max(1.0) as u32,
            None => self.pulse_length,
        };
        Some(Sample {
            value,
            bit_length: 24,
            pulse_delay,
            protocol: self.protocol,
        })
    }
}

impl RfDriver for SimDriver {
    fn set_receive_tolerance(&mut self, percent: u32) {
        self.receive_tolerance = percent;
    }

    fn enable_receive(&mut self, pin: u8) -> Result<(), RfError> {
        info!("simulated receiver on BCM {}", pin);
        self.rx_pin = Some(pin);
        Ok(())
    }

    fn is_sample_available(&mut self) -> bool {
        if self.rx_pin.is_none() {
            return false;
        }
        if self.pending.is_none() {
            self.pending = self.next_sample();
        }
        self.pending.is_some()
    }

    fn get_value(&self) -> Code {
        self.pending.map_or(0, |s| s.value)
    }

    fn get_bit_length(&self) -> u32 {
        self.pending.map_or(0, |s| s.bit_length)
    }

    fn get_pulse_delay(&self) -> u32 {
        self.pending.map_or(0, |s| s.pulse_delay)
    }

    fn mark_consumed(&mut self) {
        self.pending = None;
    }

    fn enable_transmit(&mut self, pin: u8) -> Result<(), RfError> {
        info!("simulated transmitter on BCM {}", pin);
        self.tx_pin = Some(pin);
        Ok(())
    }

    fn set_protocol(&mut self, n: u8) {
        match PROTOCOLS.get(usize::from(n).wrapping_sub(1)) {
            Some(p) => {
                self.protocol = n;
                self.pulse_length = p.pulse_length;
            }
            None => warn!("unknown protocol {}, keeping {}", n, self.protocol),
        }
    }

    fn set_pulse_length(&mut self, us: u32) {
        self.pulse_length = us;
    }

    fn send(&mut self, code: Code, bit_length: u32) {
        if self.tx_pin.is_none() {
            return;
        }
        info!(
            "sim send {} ({} bits, protocol {}, {} us)",
            code, bit_length, self.protocol, self.pulse_length
        );
        self.sent.push((code, bit_length));
    }
}
