use std::{
    io,
    sync::{
        Arc, Mutex,
        atomic::AtomicBool,
    },
    time::{Duration, Instant},
};

use rfpi::{
    error::{GpioError, InitError},
    gpio::{GpioAccess, GpioLines, GpioPath, InputLine, Level, OutputLine, initialize_gpio},
    receive::poll_once,
    rf::{
        RfDriver, Sample,
        rcswitch::{Decoder, RcSwitch},
        sim::SimDriver,
    },
    sched::{SchedPolicy, SchedSnapshot, Scheduler, with_elevated_priority},
    transmit::{ToggleConfig, TransmitConfig, toggle, transmit},
};

struct FakeScheduler {
    state: SchedSnapshot,
    allow_realtime: bool,
    elevated_calls: usize,
}

impl FakeScheduler {
    fn new(allow_realtime: bool) -> Self {
        Self {
            state: SchedSnapshot { policy: SchedPolicy::Batch, priority: 0 },
            allow_realtime,
            elevated_calls: 0,
        }
    }
}

impl Scheduler for FakeScheduler {
    fn current(&self) -> io::Result<SchedSnapshot> {
        Ok(self.state)
    }

    fn max_priority(&self, policy: SchedPolicy) -> io::Result<i32> {
        Ok(if policy.is_realtime() { 99 } else { 0 })
    }

    fn set(&mut self, snapshot: SchedSnapshot) -> io::Result<()> {
        if snapshot.policy.is_realtime() {
            if !self.allow_realtime {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            self.elevated_calls += 1;
        }
        self.state = snapshot;
        Ok(())
    }
}

struct Access {
    low: bool,
    sysfs: bool,
}

impl GpioAccess for Access {
    fn setup_low_privilege(&mut self) -> bool {
        self.low
    }

    fn setup_sysfs(&mut self) -> bool {
        self.sysfs
    }
}

/// Bootstrap, then elevated transmit, the way `rf_send` runs.
fn send_like_cli(
    access: &mut Access,
    sched: &mut FakeScheduler,
    driver: &mut SimDriver,
    codes: &[u64],
    config: &TransmitConfig,
) -> Result<GpioPath, InitError> {
    let path = initialize_gpio(access, true)?;
    with_elevated_priority(sched, || transmit(driver, codes, config)).unwrap();
    Ok(path)
}

#[test]
fn send_pipeline_orders_codes_and_restores_priority() {
    let mut sched = FakeScheduler::new(true);
    let mut driver = SimDriver::new();
    let cfg = TransmitConfig { iterations: 2, ..Default::default() };
    let path = send_like_cli(&mut Access { low: false, sysfs: true }, &mut sched, &mut driver, &[10, 20, 30], &cfg);

    assert_eq!(path.unwrap(), GpioPath::Sysfs);
    assert_eq!(driver.sent_codes(), vec![10, 20, 30, 10, 20, 30]);
    assert_eq!(sched.elevated_calls, 1);
    assert_eq!(sched.state, SchedSnapshot { policy: SchedPolicy::Batch, priority: 0 });
}

#[test]
fn failed_bootstrap_sends_nothing() {
    let mut sched = FakeScheduler::new(true);
    let mut driver = SimDriver::new();
    let r = send_like_cli(
        &mut Access { low: false, sysfs: false },
        &mut sched,
        &mut driver,
        &[1],
        &TransmitConfig::default(),
    );
    assert!(matches!(r, Err(InitError::GpioUnavailable)));
    assert!(driver.sent().is_empty());
    assert_eq!(sched.elevated_calls, 0);
}

#[test]
fn unprivileged_send_still_transmits() {
    let mut sched = FakeScheduler::new(false);
    let mut driver = SimDriver::new();
    send_like_cli(&mut Access { low: true, sysfs: false }, &mut sched, &mut driver, &[5], &TransmitConfig::default())
        .unwrap();
    assert_eq!(driver.sent_codes(), vec![5, 5, 5]);
    assert_eq!(sched.state.policy, SchedPolicy::Batch);
}

#[test]
fn toggle_counts_rounds() {
    let mut sched = FakeScheduler::new(true);
    let mut driver = SimDriver::new();
    let cfg = ToggleConfig {
        on: vec![1],
        off: vec![2],
        times: Some(2),
        interval: Duration::ZERO,
        transmit: TransmitConfig { iterations: 1, ..Default::default() },
    };
    let stop = AtomicBool::new(false);
    let n = toggle(&mut driver, &mut sched, &cfg, &stop).unwrap();
    assert_eq!(n, 2);
    assert_eq!(driver.sent_codes(), vec![1, 2, 1, 2]);
    assert_eq!(sched.elevated_calls, 4);
    assert_eq!(sched.state.policy, SchedPolicy::Batch);
}

#[test]
fn toggle_respects_stop() {
    let mut sched = FakeScheduler::new(true);
    let mut driver = SimDriver::new();
    let stop = AtomicBool::new(true);
    let n = toggle(&mut driver, &mut sched, &ToggleConfig::default(), &stop).unwrap();
    assert_eq!(n, 0);
    assert!(driver.sent().is_empty());
}

#[test]
fn sniffer_output_sequence() {
    let samples = [
        Sample { value: 7508342, bit_length: 24, pulse_delay: 192, protocol: 1 },
        Sample { value: 0, bit_length: 0, pulse_delay: 0, protocol: 1 },
        Sample { value: 3, bit_length: 4, pulse_delay: 350, protocol: 1 },
    ];
    let mut driver = SimDriver::scripted(samples);
    driver.enable_receive(27).unwrap();

    let mut out = Vec::new();
    while poll_once(&mut driver, &mut out, false).unwrap() {}
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Decimal: 7508342\nBit length: 24\nPulse length: 192\nBinary: 011100101001000101110110\n\
         Unknown encoding\n\
         Decimal: 3\nBit length: 4\nPulse length: 350\nBinary: 0011\n"
    );
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<(Level, Instant)>>>);

impl OutputLine for Recorder {
    fn write(&mut self, level: Level) {
        self.0.lock().unwrap().push((level, Instant::now()));
    }
}

struct LoopbackLines(Recorder);

impl GpioLines for LoopbackLines {
    fn output(&self, _pin: u8) -> Result<Box<dyn OutputLine>, GpioError> {
        Ok(Box::new(self.0.clone()))
    }

    fn input(&self, pin: u8) -> Result<Box<dyn InputLine>, GpioError> {
        Err(GpioError::NotExported(pin))
    }
}

#[test]
fn rcswitch_waveform_decodes_back() {
    let rec = Recorder::default();
    let mut rc = RcSwitch::new(LoopbackLines(rec.clone()));
    rc.set_repeat_transmit(5);
    let cfg = TransmitConfig { iterations: 1, pulse_length_us: 500, ..Default::default() };
    transmit(&mut rc, &[7508342], &cfg).unwrap();

    let writes = rec.0.lock().unwrap().clone();
    // skip the idle low written by enable_transmit; each later write ends the previous level
    let durations: Vec<u32> = writes[1..]
        .windows(2)
        .map(|w| w[1].1.duration_since(w[0].1).as_micros() as u32)
        .collect();

    let mut decoder = Decoder::default();
    let decoded: Vec<Sample> = durations.iter().filter_map(|&d| decoder.push(d)).collect();
    assert!(!decoded.is_empty(), "no frame decoded from {} edges", durations.len());
    assert!(decoded.iter().all(|s| s.value == 7508342 && s.bit_length == 24 && s.protocol == 1));
}
