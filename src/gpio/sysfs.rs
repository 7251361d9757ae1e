use std::{
    fs::{self, File, OpenOptions},
    os::unix::{fs::FileExt, io::AsRawFd},
    path::Path,
    time::Duration,
};

use tracing::{debug, warn};

use super::{InputLine, Level, OutputLine, wait_for_change};
use crate::error::GpioError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// One pre-exported pin under `/sys/class/gpio/gpioN`.
pub struct SysfsLine {
    pin: u8,
    value: File,
    /// `edge` is set to `both`, so the kernel flags changes with POLLPRI.
    edge_events: bool,
}

impl SysfsLine {
    pub fn open(root: &Path, pin: u8, direction: Direction) -> Result<Self, GpioError> {
        let dir = root.join(format!("gpio{pin}"));
        if !dir.is_dir() {
            return Err(GpioError::NotExported(pin));
        }

        let direction_file = dir.join("direction");
        let current = fs::read_to_string(&direction_file)?;
        if current.trim() != direction.as_str() {
            debug!("pin {} exported as {:?}, switching to {}", pin, current.trim(), direction.as_str());
            fs::write(&direction_file, direction.as_str())?;
        }

        let edge_events = direction == Direction::In && enable_edge_events(&dir.join("edge"), pin);

        let value = OpenOptions::new()
            .read(true)
            .write(direction == Direction::Out)
            .open(dir.join("value"))?;
        Ok(Self { pin, value, edge_events })
    }

    pub fn has_edge_events(&self) -> bool {
        self.edge_events
    }

    fn poll_edge(&self, timeout: Duration) -> bool {
        let mut fds = libc::pollfd {
            fd: self.value.as_raw_fd(),
            events: libc::POLLPRI | libc::POLLERR,
            revents: 0,
        };
        let ms = timeout.as_millis().clamp(1, libc::c_int::MAX as u128) as libc::c_int;
        match unsafe { libc::poll(&mut fds, 1, ms) } {
            -1 => {
                debug!("poll on gpio{} failed: {}", self.pin, std::io::Error::last_os_error());
                false
            }
            n => n > 0,
        }
    }
}

fn enable_edge_events(edge: &Path, pin: u8) -> bool {
    if !edge.exists() {
        return false;
    }
    match fs::write(edge, "both") {
        Ok(()) => true,
        Err(e) => {
            debug!("cannot enable edge events on gpio{}, polling instead: {}", pin, e);
            false
        }
    }
}

impl OutputLine for SysfsLine {
    fn write(&mut self, level: Level) {
        let b: &[u8] = if level.is_high() { b"1" } else { b"0" };
        // sends are fire-and-forget, there is nobody to hand the error to
        if let Err(e) = self.value.write_at(b, 0) {
            warn!("write to gpio{} failed: {}", self.pin, e);
        }
    }
}

impl InputLine for SysfsLine {
    fn read(&mut self) -> Level {
        let mut buf = [0u8; 1];
        match self.value.read_at(&mut buf, 0) {
            Ok(1) => Level::from(buf[0] == b'1'),
            Ok(n) => {
                debug!("short read of gpio{} ({} bytes), assuming low", self.pin, n);
                Level::Low
            }
            Err(e) => {
                debug!("read of gpio{} failed, assuming low: {}", self.pin, e);
                Level::Low
            }
        }
    }

    fn wait_change(&mut self, last: Level, timeout: Duration) -> Level {
        if !self.edge_events {
            return wait_for_change(self, last, timeout);
        }
        let level = self.read();
        if level != last {
            return level;
        }
        if !self.poll_edge(timeout) {
            return level;
        }
        // reading the value re-arms the notification
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{GpioAccess, GpioLines, GpioPath, LinuxGpio, initialize_gpio};
    use std::path::PathBuf;

    fn fake_sysfs(name: &str, pin: u8, direction: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("rfpi-sysfs-{}-{}", name, std::process::id()));
        let dir = root.join(format!("gpio{pin}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("direction"), direction).unwrap();
        fs::write(dir.join("value"), "0\n").unwrap();
        root
    }

    fn with_edge_file(root: &Path, pin: u8) {
        fs::write(root.join(format!("gpio{pin}/edge")), "none\n").unwrap();
    }

    #[test]
    fn output_line_writes_value_file() {
        let root = fake_sysfs("out", 17, "out\n");
        let mut gpio = LinuxGpio::with_paths("/nonexistent/gpiomem", &root);
        assert_eq!(initialize_gpio(&mut gpio, true).unwrap(), GpioPath::Sysfs);

        let mut line = gpio.output(17).unwrap();
        line.write(Level::High);
        assert_eq!(&fs::read(root.join("gpio17/value")).unwrap()[..1], b"1");
        line.write(Level::Low);
        assert_eq!(&fs::read(root.join("gpio17/value")).unwrap()[..1], b"0");
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn input_line_fixes_direction_and_reads() {
        let root = fake_sysfs("in", 27, "out\n");
        let mut gpio = LinuxGpio::with_paths("/nonexistent/gpiomem", &root);
        assert!(gpio.setup_sysfs());

        let mut line = gpio.input(27).unwrap();
        assert_eq!(fs::read_to_string(root.join("gpio27/direction")).unwrap(), "in");
        assert_eq!(line.read(), Level::Low);
        fs::write(root.join("gpio27/value"), "1\n").unwrap();
        assert_eq!(line.read(), Level::High);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn input_line_arms_edge_events() {
        let root = fake_sysfs("edge", 27, "in\n");
        with_edge_file(&root, 27);
        let mut line = SysfsLine::open(&root, 27, Direction::In).unwrap();
        assert!(line.has_edge_events());
        assert_eq!(fs::read_to_string(root.join("gpio27/edge")).unwrap(), "both");

        // already different from `last`: no waiting at all
        assert_eq!(line.wait_change(Level::High, Duration::from_secs(5)), Level::Low);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn idle_edge_wait_returns_current_level() {
        let root = fake_sysfs("edge-idle", 27, "in\n");
        with_edge_file(&root, 27);
        let mut line = SysfsLine::open(&root, 27, Direction::In).unwrap();

        let t0 = std::time::Instant::now();
        assert_eq!(line.wait_change(Level::Low, Duration::from_millis(20)), Level::Low);
        assert!(t0.elapsed() < Duration::from_secs(5));
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn no_edge_file_falls_back_to_polling() {
        let root = fake_sysfs("no-edge", 27, "in\n");
        let mut line = SysfsLine::open(&root, 27, Direction::In).unwrap();
        assert!(!line.has_edge_events());
        assert_eq!(line.wait_change(Level::Low, Duration::from_millis(5)), Level::Low);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn empty_value_file_reads_low() {
        let root = fake_sysfs("empty", 27, "in\n");
        let mut line = SysfsLine::open(&root, 27, Direction::In).unwrap();
        fs::write(root.join("gpio27/value"), "").unwrap();
        assert_eq!(line.read(), Level::Low);
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn output_lines_never_touch_edge() {
        let root = fake_sysfs("out-edge", 17, "out\n");
        with_edge_file(&root, 17);
        let line = SysfsLine::open(&root, 17, Direction::Out).unwrap();
        assert!(!line.has_edge_events());
        assert_eq!(fs::read_to_string(root.join("gpio17/edge")).unwrap(), "none\n");
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn unexported_pin() {
        let root = fake_sysfs("unexported", 17, "out\n");
        let mut gpio = LinuxGpio::with_paths("/nonexistent/gpiomem", &root);
        assert!(gpio.setup_sysfs());
        assert!(matches!(gpio.output(22), Err(GpioError::NotExported(22))));
        fs::remove_dir_all(root).unwrap();
    }
}
