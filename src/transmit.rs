use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use tracing::{info, trace};

use crate::{
    error::{ArgError, RfError},
    rf::{Code, DEFAULT_PROTOCOL, RfDriver},
    sched::{Scheduler, with_elevated_priority},
};

pub const DEFAULT_ITERATIONS: u32 = 3;
/// BCM numbering, physical pin 11.
pub const DEFAULT_TX_PIN: u8 = 17;
pub const DEFAULT_PULSE_LENGTH: u32 = 190;
pub const DEFAULT_BIT_LENGTH: u32 = 24;

pub const DEFAULT_ON_CODE: Code = 12345;
pub const DEFAULT_OFF_CODE: Code = 54321;
pub const DEFAULT_TOGGLE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitConfig {
    /// Times the whole code set is sent.
    pub iterations: u32,
    pub pin: u8,
    pub pulse_length_us: u32,
    pub bit_length: u32,
    /// rc-switch protocol number, 1 to 3.
    pub protocol: u8,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            pin: DEFAULT_TX_PIN,
            pulse_length_us: DEFAULT_PULSE_LENGTH,
            bit_length: DEFAULT_BIT_LENGTH,
            protocol: DEFAULT_PROTOCOL,
        }
    }
}

pub fn parse_code(s: &str) -> Result<Code, ArgError> {
    s.parse::<Code>().map_err(|source| ArgError::MalformedArgument {
        arg: s.to_string(),
        source,
    })
}

/// Send every code `iterations` times.
///
/// Iterations are the outer loop: codes `1 2 3` twice go out as `1 2 3 1 2 3`,
/// so a timing glitch costs one repetition of one code instead of every
/// repetition of it.
pub fn transmit<D: RfDriver + ?Sized>(
    driver: &mut D,
    codes: &[Code],
    config: &TransmitConfig,
) -> Result<(), RfError> {
    driver.enable_transmit(config.pin)?;
    driver.set_protocol(config.protocol);
    driver.set_pulse_length(config.pulse_length_us);
    for i in 0..config.iterations {
        for &code in codes {
            trace!("iteration {} code {}", i, code);
            driver.send(code, config.bit_length);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleConfig {
    pub on: Vec<Code>,
    pub off: Vec<Code>,
    /// `None` toggles until stopped.
    pub times: Option<usize>,
    pub interval: Duration,
    pub transmit: TransmitConfig,
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self {
            on: vec![DEFAULT_ON_CODE],
            off: vec![DEFAULT_OFF_CODE],
            times: None,
            interval: DEFAULT_TOGGLE_INTERVAL,
            transmit: TransmitConfig::default(),
        }
    }
}

/// Sleep for `d`, waking early when `stop` is set. Returns false if stopped.
fn nap(d: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + d;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(20)));
    }
}

/// Alternate the on and off code sets, each sent at elevated priority.
///
/// Returns how many rounds were started, which is what gets compared against
/// the number of times the receiver actually switched.
pub fn toggle<D, S>(
    driver: &mut D,
    scheduler: &mut S,
    config: &ToggleConfig,
    stop: &AtomicBool,
) -> Result<usize, RfError>
where
    D: RfDriver + ?Sized,
    S: Scheduler + ?Sized,
{
    let mut rounds = 0;
    while config.times.is_none_or(|n| rounds < n) && !stop.load(Ordering::Relaxed) {
        rounds += 1;

        if !nap(config.interval, stop) {
            break;
        }
        info!("Turning on...");
        with_elevated_priority(scheduler, || transmit(&mut *driver, &config.on, &config.transmit))?;

        if !nap(config.interval, stop) {
            break;
        }
        info!("Turning off...");
        with_elevated_priority(scheduler, || transmit(&mut *driver, &config.off, &config.transmit))?;
    }
    Ok(rounds)
}
