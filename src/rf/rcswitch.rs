//! Native rc-switch compatible OOK driver.
//!
//! Transmit bit-banges the output line with spin-waits. Receive runs a sampler
//! thread that watches the input line for edges and feeds the edge durations to
//! a [`Decoder`]; decoded samples come back over a bounded channel.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{debug, warn};

use super::{Code, DEFAULT_RECEIVE_TOLERANCE, HighLow, PROTOCOLS, Protocol, RfDriver, Sample};
use crate::{
    error::RfError,
    gpio::{GpioLines, InputLine, Level, OutputLine},
};

pub const DEFAULT_REPEAT_TRANSMIT: u32 = 10;
/// Gaps longer than this (µs) separate two frames.
pub const SEPARATION_LIMIT: u32 = 4300;
/// 32 data bits, two edges each, plus sync.
pub const MAX_CHANGES: usize = 67;
const SAMPLE_QUEUE: usize = 64;
/// Longest the sampler blocks on an idle line before checking for shutdown.
const STOP_CHECK: Duration = Duration::from_millis(50);

fn diff(a: u32, b: u32) -> u32 {
    a.abs_diff(b)
}

/// Edge-timing decoder. Push the length of every level as it ends.
pub struct Decoder {
    timings: [u32; MAX_CHANGES],
    change_count: usize,
    repeat_count: u32,
    tolerance: u32,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(DEFAULT_RECEIVE_TOLERANCE)
    }
}

impl Decoder {
    pub fn new(tolerance: u32) -> Self {
        Self {
            timings: [0; MAX_CHANGES],
            change_count: 0,
            repeat_count: 0,
            tolerance,
        }
    }

    /// A frame is only decoded once the same separation gap has been seen
    /// twice after it, i.e. on its second repetition.
    pub fn push(&mut self, duration: u32) -> Option<Sample> {
        let mut decoded = None;
        if duration > SEPARATION_LIMIT {
            if diff(duration, self.timings[0]) < 200 {
                self.repeat_count += 1;
                if self.repeat_count == 2 {
                    decoded = (0..PROTOCOLS.len()).find_map(|p| self.decode(p));
                    self.repeat_count = 0;
                }
            }
            self.change_count = 0;
        }

        if self.change_count >= MAX_CHANGES {
            self.change_count = 0;
            self.repeat_count = 0;
        }
        self.timings[self.change_count] = duration;
        self.change_count += 1;
        decoded
    }

    fn decode(&self, index: usize) -> Option<Sample> {
        let p = &PROTOCOLS[index];
        let changes = self.change_count;
        if changes <= 7 {
            return None;
        }

        let sync_pulses = p.sync.high.max(p.sync.low);
        let delay = self.timings[0] / sync_pulses;
        let tolerance = (u64::from(delay) * u64::from(self.tolerance) / 100) as u32;
        let matches = |hl: HighLow, i: usize| {
            diff(self.timings[i], delay * hl.high) < tolerance
                && diff(self.timings[i + 1], delay * hl.low) < tolerance
        };

        let mut code: Code = 0;
        let mut i = 1;
        while i < changes - 1 {
            let bit = if matches(p.zero, i) {
                0
            } else if matches(p.one, i) {
                1
            } else {
                return None;
            };
            code = (code << 1) | bit;
            i += 2;
        }

        Some(Sample {
            value: code,
            bit_length: ((changes - 1) / 2) as u32,
            pulse_delay: delay,
            protocol: index as u8 + 1,
        })
    }
}

fn spin_until(deadline: Instant) {
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

struct Sampler {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            if h.join().is_err() {
                warn!("rf sampler thread panicked");
            }
        }
    }
}

fn sample_edges(mut line: Box<dyn InputLine>, tx: Sender<Sample>, stop: Arc<AtomicBool>, tolerance: u32) {
    let mut decoder = Decoder::new(tolerance);
    let mut last_level = line.read();
    let mut last_edge = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        let level = line.wait_change(last_level, STOP_CHECK);
        if level == last_level {
            continue;
        }
        let now = Instant::now();
        let duration = now.duration_since(last_edge).as_micros().min(u32::MAX as u128) as u32;
        last_edge = now;
        last_level = level;

        if let Some(sample) = decoder.push(duration) {
            match tx.try_send(sample) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => debug!("sample queue full, dropping {}", sample.value),
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    }
}

pub struct RcSwitch<G: GpioLines> {
    gpio: G,
    protocol: Protocol,
    repeat_transmit: u32,
    receive_tolerance: u32,
    tx_line: Option<Box<dyn OutputLine>>,
    rx: Option<Receiver<Sample>>,
    sampler: Option<Sampler>,
    pending: Option<Sample>,
}

impl<G: GpioLines> RcSwitch<G> {
    pub fn new(gpio: G) -> Self {
        Self {
            gpio,
            protocol: PROTOCOLS[0],
            repeat_transmit: DEFAULT_REPEAT_TRANSMIT,
            receive_tolerance: DEFAULT_RECEIVE_TOLERANCE,
            tx_line: None,
            rx: None,
            sampler: None,
            pending: None,
        }
    }

    pub fn set_repeat_transmit(&mut self, n: u32) {
        self.repeat_transmit = n;
    }

    pub fn disable_receive(&mut self) {
        self.sampler = None;
        self.rx = None;
        self.pending = None;
    }

    fn transmit(line: &mut dyn OutputLine, pulse_length: u32, pulses: HighLow, deadline: &mut Instant) {
        line.write(Level::High);
        *deadline += Duration::from_micros(u64::from(pulse_length) * u64::from(pulses.high));
        spin_until(*deadline);
        line.write(Level::Low);
        *deadline += Duration::from_micros(u64::from(pulse_length) * u64::from(pulses.low));
        spin_until(*deadline);
    }
}

impl<G: GpioLines> RfDriver for RcSwitch<G> {
    /// Takes effect on the next `enable_receive`.
    fn set_receive_tolerance(&mut self, percent: u32) {
        self.receive_tolerance = percent;
    }

    fn enable_receive(&mut self, pin: u8) -> Result<(), RfError> {
        self.disable_receive();
        let line = self.gpio.input(pin)?;
        let (tx, rx) = bounded(SAMPLE_QUEUE);
        let stop = Arc::new(AtomicBool::new(false));
        let stop1 = stop.clone();
        let tolerance = self.receive_tolerance;
        let handle = std::thread::Builder::new()
            .name(format!("rf-rx-{pin}"))
            .spawn(move || sample_edges(line, tx, stop1, tolerance))
            .map_err(crate::error::GpioError::Io)?;
        self.rx = Some(rx);
        self.sampler = Some(Sampler { stop, handle: Some(handle) });
        debug!("receiving on BCM {}", pin);
        Ok(())
    }

    fn is_sample_available(&mut self) -> bool {
        if self.pending.is_none() {
            self.pending = self.rx.as_ref().and_then(|rx| rx.try_recv().ok());
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
        let mut line = self.gpio.output(pin)?;
        line.write(Level::Low);
        self.tx_line = Some(line);
        debug!("transmitting on BCM {}", pin);
        Ok(())
    }

    /// Resets the pulse length to the protocol's default.
    fn set_protocol(&mut self, n: u8) {
        match PROTOCOLS.get(usize::from(n).wrapping_sub(1)) {
            Some(p) => self.protocol = *p,
            None => warn!("unknown protocol {}, keeping current", n),
        }
    }

    fn set_pulse_length(&mut self, us: u32) {
        self.protocol.pulse_length = us;
    }

    fn send(&mut self, code: Code, bit_length: u32) {
        let Some(line) = self.tx_line.as_deref_mut() else {
            warn!("send({}) without an enabled transmitter", code);
            return;
        };
        let p = self.protocol;
        let bits = bit_length.min(Code::BITS);
        let mut deadline = Instant::now();
        for _ in 0..self.repeat_transmit {
            for i in (0..bits).rev() {
                let symbol = if (code >> i) & 1 == 1 { p.one } else { p.zero };
                Self::transmit(line, p.pulse_length, symbol, &mut deadline);
            }
            Self::transmit(line, p.pulse_length, p.sync, &mut deadline);
        }
        line.write(Level::Low);
    }
}
