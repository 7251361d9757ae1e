//! BCM283x GPIO registers mapped from `/dev/gpiomem`.

use std::{
    fs::OpenOptions,
    io,
    os::unix::{fs::OpenOptionsExt, io::AsRawFd},
    path::Path,
    ptr,
    sync::Arc,
};

use super::{InputLine, Level, OutputLine};

const BLOCK_SIZE: usize = 4 * 1024;

// word offsets into the register block
const GPFSEL0: usize = 0;
const GPSET0: usize = 0x1c / 4;
const GPCLR0: usize = 0x28 / 4;
const GPLEV0: usize = 0x34 / 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Input,
    Output,
}

pub struct GpioMem {
    base: *mut u32,
}

// The block is only touched through volatile accesses. SET/CLR/LEV are
// single-word registers, so concurrent lines on different pins do not race.
unsafe impl Send for GpioMem {}
unsafe impl Sync for GpioMem {}

impl Drop for GpioMem {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, BLOCK_SIZE);
        }
    }
}

impl GpioMem {
    pub fn open(device: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(device)?;

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                BLOCK_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        // the mapping outlives the descriptor
        Ok(Self { base: base as *mut u32 })
    }

    fn reg(&self, word: usize) -> *mut u32 {
        debug_assert!(word < BLOCK_SIZE / 4);
        unsafe { self.base.add(word) }
    }

    pub fn set_mode(&self, pin: u8, mode: Mode) {
        let reg = self.reg(GPFSEL0 + pin as usize / 10);
        let shift = (pin as u32 % 10) * 3;
        let bits = match mode {
            Mode::Input => 0b000,
            Mode::Output => 0b001,
        };
        unsafe {
            let v = ptr::read_volatile(reg);
            ptr::write_volatile(reg, (v & !(0b111 << shift)) | (bits << shift));
        }
    }

    pub fn write(&self, pin: u8, level: Level) {
        let bank = match level {
            Level::High => GPSET0,
            Level::Low => GPCLR0,
        };
        unsafe {
            ptr::write_volatile(self.reg(bank + pin as usize / 32), 1 << (pin % 32));
        }
    }

    pub fn read(&self, pin: u8) -> Level {
        let v = unsafe { ptr::read_volatile(self.reg(GPLEV0 + pin as usize / 32)) };
        Level::from(v & (1 << (pin % 32)) != 0)
    }
}

pub struct MemLine {
    mem: Arc<GpioMem>,
    pin: u8,
}

impl MemLine {
    pub fn new(mem: Arc<GpioMem>, pin: u8, mode: Mode) -> Self {
        mem.set_mode(pin, mode);
        Self { mem, pin }
    }
}

impl OutputLine for MemLine {
    fn write(&mut self, level: Level) {
        self.mem.write(self.pin, level);
    }
}

impl InputLine for MemLine {
    fn read(&mut self) -> Level {
        self.mem.read(self.pin)
    }
}
