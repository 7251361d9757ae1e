//! GPIO bootstrap and pin lines.
//!
//! Two access paths exist on a Pi: the memory-mapped `/dev/gpiomem` block, which
//! any member of the `gpio` group may open, and the sysfs class directory, which
//! only works for pins a privileged step exported beforehand.

use std::{
    hint,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info};

use crate::error::{GpioError, InitError};

pub mod gpiomem;
pub mod sysfs;

use gpiomem::{GpioMem, MemLine, Mode};
use sysfs::{Direction, SysfsLine};

/// Set to `"0"` to skip `/dev/gpiomem` and go straight to sysfs.
pub const GPIOMEM_ENV: &str = "RFPI_GPIOMEM";
/// Honoured when [`GPIOMEM_ENV`] is unset, for setups that export the wiringPi name.
pub const LEGACY_GPIOMEM_ENV: &str = "WIRINGPI_GPIOMEM";
pub const GPIOMEM_DEVICE: &str = "/dev/gpiomem";
pub const SYSFS_ROOT: &str = "/sys/class/gpio";
pub const MAX_BCM_PIN: u8 = 53;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Level::High } else { Level::Low }
    }
}

pub trait OutputLine: Send {
    fn write(&mut self, level: Level);
}

/// How long an unchanged line is spun on before [`wait_for_change`] starts sleeping.
pub const SPIN_WINDOW: Duration = Duration::from_micros(200);
/// Sleep between reads of an idle line. Well under the shortest pulse (100 µs).
pub const IDLE_BACKOFF: Duration = Duration::from_micros(5);

pub trait InputLine: Send {
    fn read(&mut self) -> Level;

    /// Block until the line leaves `last` or `timeout` passes, returning the
    /// level read last.
    fn wait_change(&mut self, last: Level, timeout: Duration) -> Level {
        wait_for_change(self, last, timeout)
    }
}

/// Polling fallback for lines without edge notification: spin for
/// [`SPIN_WINDOW`], then back off by [`IDLE_BACKOFF`] between reads.
pub fn wait_for_change<L: InputLine + ?Sized>(line: &mut L, last: Level, timeout: Duration) -> Level {
    let start = Instant::now();
    loop {
        let level = line.read();
        if level != last {
            return level;
        }
        let idle = start.elapsed();
        if idle >= timeout {
            return level;
        }
        if idle < SPIN_WINDOW {
            hint::spin_loop();
        } else {
            thread::sleep(IDLE_BACKOFF);
        }
    }
}

/// The two setup calls of the underlying GPIO layer.
pub trait GpioAccess {
    fn setup_low_privilege(&mut self) -> bool;
    fn setup_sysfs(&mut self) -> bool;
}

/// Hands out pin lines once a [`GpioAccess`] path has been set up.
pub trait GpioLines {
    fn output(&self, pin: u8) -> Result<Box<dyn OutputLine>, GpioError>;
    fn input(&self, pin: u8) -> Result<Box<dyn InputLine>, GpioError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioPath {
    LowPrivilege,
    Sysfs,
}

/// Only the literal `"0"` disables the low-privilege path; unset counts as `"1"`.
pub fn gpiomem_allowed(value: Option<&str>) -> bool {
    value != Some("0")
}

/// [`GPIOMEM_ENV`] wins over [`LEGACY_GPIOMEM_ENV`] when both are set.
pub fn gpiomem_override<'a>(value: Option<&'a str>, legacy: Option<&'a str>) -> Option<&'a str> {
    value.or(legacy)
}

pub fn gpiomem_allowed_from_env() -> bool {
    let value = std::env::var(GPIOMEM_ENV).ok();
    let legacy = std::env::var(LEGACY_GPIOMEM_ENV).ok();
    gpiomem_allowed(gpiomem_override(value.as_deref(), legacy.as_deref()))
}

/// Try gpiomem first (unless disabled), then sysfs. No retries.
pub fn initialize_gpio<G: GpioAccess + ?Sized>(
    gpio: &mut G,
    allow_low_privilege: bool,
) -> Result<GpioPath, InitError> {
    if allow_low_privilege {
        if gpio.setup_low_privilege() {
            info!("GPIO ready via {}", GPIOMEM_DEVICE);
            return Ok(GpioPath::LowPrivilege);
        }
        debug!("{} unavailable, trying sysfs", GPIOMEM_DEVICE);
    } else {
        debug!("{}=0, skipping {}", GPIOMEM_ENV, GPIOMEM_DEVICE);
    }

    if gpio.setup_sysfs() {
        info!("GPIO ready via {} (pins must be pre-exported)", SYSFS_ROOT);
        return Ok(GpioPath::Sysfs);
    }
    Err(InitError::GpioUnavailable)
}

/// Bootstrap the real Pi GPIO, honouring [`GPIOMEM_ENV`].
pub fn open_linux_gpio() -> Result<LinuxGpio, InitError> {
    let mut gpio = LinuxGpio::new();
    initialize_gpio(&mut gpio, gpiomem_allowed_from_env())?;
    Ok(gpio)
}

enum Backend {
    Mem(Arc<GpioMem>),
    Sysfs(PathBuf),
}

/// Raspberry Pi GPIO through either `/dev/gpiomem` or sysfs.
pub struct LinuxGpio {
    gpiomem_device: PathBuf,
    sysfs_root: PathBuf,
    backend: Option<Backend>,
}

impl Default for LinuxGpio {
    fn default() -> Self {
        Self::with_paths(GPIOMEM_DEVICE, SYSFS_ROOT)
    }
}

impl LinuxGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_paths(gpiomem_device: impl AsRef<Path>, sysfs_root: impl AsRef<Path>) -> Self {
        Self {
            gpiomem_device: gpiomem_device.as_ref().to_path_buf(),
            sysfs_root: sysfs_root.as_ref().to_path_buf(),
            backend: None,
        }
    }

    pub fn path(&self) -> Option<GpioPath> {
        self.backend.as_ref().map(|b| match b {
            Backend::Mem(_) => GpioPath::LowPrivilege,
            Backend::Sysfs(_) => GpioPath::Sysfs,
        })
    }

    fn backend(&self, pin: u8) -> Result<&Backend, GpioError> {
        if pin > MAX_BCM_PIN {
            return Err(GpioError::InvalidPin(pin));
        }
        self.backend.as_ref().ok_or(GpioError::NotInitialized)
    }
}

impl GpioAccess for LinuxGpio {
    fn setup_low_privilege(&mut self) -> bool {
        match GpioMem::open(&self.gpiomem_device) {
            Ok(mem) => {
                self.backend = Some(Backend::Mem(Arc::new(mem)));
                true
            }
            Err(e) => {
                debug!("cannot map {}: {}", self.gpiomem_device.display(), e);
                false
            }
        }
    }

    fn setup_sysfs(&mut self) -> bool {
        if self.sysfs_root.is_dir() {
            self.backend = Some(Backend::Sysfs(self.sysfs_root.clone()));
            true
        } else {
            debug!("{} does not exist", self.sysfs_root.display());
            false
        }
    }
}

impl GpioLines for LinuxGpio {
    fn output(&self, pin: u8) -> Result<Box<dyn OutputLine>, GpioError> {
        let line: Box<dyn OutputLine> = match self.backend(pin)? {
            Backend::Mem(mem) => Box::new(MemLine::new(mem.clone(), pin, Mode::Output)),
            Backend::Sysfs(root) => Box::new(SysfsLine::open(root, pin, Direction::Out)?),
        };
        Ok(line)
    }

    fn input(&self, pin: u8) -> Result<Box<dyn InputLine>, GpioError> {
        let line: Box<dyn InputLine> = match self.backend(pin)? {
            Backend::Mem(mem) => Box::new(MemLine::new(mem.clone(), pin, Mode::Input)),
            Backend::Sysfs(root) => Box::new(SysfsLine::open(root, pin, Direction::In)?),
        };
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeAccess {
        low_ok: bool,
        sysfs_ok: bool,
        low_calls: usize,
        sysfs_calls: usize,
    }

    impl GpioAccess for FakeAccess {
        fn setup_low_privilege(&mut self) -> bool {
            self.low_calls += 1;
            self.low_ok
        }

        fn setup_sysfs(&mut self) -> bool {
            self.sysfs_calls += 1;
            self.sysfs_ok
        }
    }

    #[test]
    fn prefers_low_privilege_path() {
        let mut g = FakeAccess { low_ok: true, sysfs_ok: true, ..Default::default() };
        assert_eq!(initialize_gpio(&mut g, true).unwrap(), GpioPath::LowPrivilege);
        assert_eq!(g.sysfs_calls, 0);
    }

    #[test]
    fn falls_back_to_sysfs() {
        let mut g = FakeAccess { low_ok: false, sysfs_ok: true, ..Default::default() };
        assert_eq!(initialize_gpio(&mut g, true).unwrap(), GpioPath::Sysfs);
        assert_eq!(g.low_calls, 1);
        assert_eq!(g.sysfs_calls, 1);
    }

    #[test]
    fn both_paths_failing_is_unavailable() {
        let mut g = FakeAccess::default();
        assert!(matches!(initialize_gpio(&mut g, true), Err(InitError::GpioUnavailable)));
        assert_eq!(g.low_calls, 1);
    }

    #[test]
    fn disabled_low_privilege_is_never_attempted() {
        let mut g = FakeAccess { low_ok: true, sysfs_ok: true, ..Default::default() };
        let allowed = gpiomem_allowed(Some("0"));
        assert_eq!(initialize_gpio(&mut g, allowed).unwrap(), GpioPath::Sysfs);
        assert_eq!(g.low_calls, 0);
    }

    #[test]
    fn env_values() {
        assert!(gpiomem_allowed(None));
        assert!(gpiomem_allowed(Some("1")));
        assert!(gpiomem_allowed(Some("")));
        assert!(gpiomem_allowed(Some("00")));
        assert!(!gpiomem_allowed(Some("0")));
    }

    #[test]
    fn legacy_env_is_a_fallback() {
        assert_eq!(gpiomem_override(None, Some("0")), Some("0"));
        assert_eq!(gpiomem_override(Some("1"), Some("0")), Some("1"));
        assert_eq!(gpiomem_override(None, None), None);
        assert!(!gpiomem_allowed(gpiomem_override(None, Some("0"))));
        assert!(gpiomem_allowed(gpiomem_override(Some("1"), Some("0"))));
    }

    struct Flips {
        reads: usize,
        flip_at: usize,
    }

    impl InputLine for Flips {
        fn read(&mut self) -> Level {
            self.reads += 1;
            Level::from(self.reads >= self.flip_at)
        }
    }

    #[test]
    fn wait_returns_on_change() {
        let mut line = Flips { reads: 0, flip_at: 5 };
        assert_eq!(line.wait_change(Level::Low, Duration::from_secs(5)), Level::High);
        assert_eq!(line.reads, 5);
    }

    #[test]
    fn idle_wait_times_out_and_backs_off() {
        let mut line = Flips { reads: 0, flip_at: usize::MAX };
        let t0 = Instant::now();
        assert_eq!(line.wait_change(Level::Low, Duration::from_millis(30)), Level::Low);
        assert!(t0.elapsed() >= Duration::from_millis(30));
        // spinning the whole window would be millions of reads
        assert!(line.reads < 100_000, "{} reads", line.reads);
    }

    #[test]
    fn lines_require_bootstrap() {
        let gpio = LinuxGpio::with_paths("/nonexistent/gpiomem", "/nonexistent/gpio");
        assert!(matches!(gpio.output(17), Err(GpioError::NotInitialized)));
        assert!(matches!(gpio.input(54), Err(GpioError::InvalidPin(54))));
    }

    #[test]
    fn missing_device_and_sysfs() {
        let mut gpio = LinuxGpio::with_paths("/nonexistent/gpiomem", "/nonexistent/gpio");
        assert!(initialize_gpio(&mut gpio, true).is_err());
        assert_eq!(gpio.path(), None);
    }
}
