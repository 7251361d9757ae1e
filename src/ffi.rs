//! C ABI for scripts that load the shared library directly (Python ctypes,
//! node ffi). The generated header lands in `include/rfpi.h`.

use std::{ffi::c_int, slice};

use tracing::error;

use crate::{
    error::InitError,
    gpio::open_linux_gpio,
    rf::{Code, RfDriver, rcswitch::RcSwitch},
    sched::{OsScheduler, Scheduler, with_elevated_priority},
    transmit::{TransmitConfig, transmit},
};

pub const SEND_OK: c_int = 0;
/// GPIO bootstrap failed or the pin could not be enabled.
pub const SEND_FAILED: c_int = 1;
/// `codes` was null while `len` was not zero.
pub const SEND_INVALID_ARGUMENT: c_int = -1;

/// Open a driver, then transmit `codes` at elevated priority.
///
/// Returns [`SEND_OK`] or [`SEND_FAILED`]. `rf_send` uses the same status as
/// its exit code.
pub fn send_codes<S, F>(scheduler: &mut S, open: F, codes: &[Code], config: &TransmitConfig) -> c_int
where
    S: Scheduler + ?Sized,
    F: FnOnce() -> Result<Box<dyn RfDriver>, InitError>,
{
    let mut driver = match open() {
        Ok(d) => d,
        Err(e) => {
            error!("{}", e);
            return SEND_FAILED;
        }
    };
    match with_elevated_priority(scheduler, || transmit(&mut *driver, codes, config)) {
        Ok(()) => SEND_OK,
        Err(e) => {
            error!("{}", e);
            SEND_FAILED
        }
    }
}

/// Send `len` codes from `codes`, `iterations` times each, on BCM `pin`.
///
/// # Safety
///
/// `codes` must point to `len` readable `u64` values. It may be null when
/// `len` is zero.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn send(
    codes: *const u64,
    len: usize,
    iterations: u32,
    pin: u8,
    pulse_length_us: u32,
    bit_length: u32,
) -> c_int {
    let codes: &[Code] = if len == 0 {
        &[]
    } else if codes.is_null() {
        return SEND_INVALID_ARGUMENT;
    } else {
        unsafe { slice::from_raw_parts(codes, len) }
    };
    let config = TransmitConfig { iterations, pin, pulse_length_us, bit_length, ..Default::default() };
    let open = || -> Result<Box<dyn RfDriver>, InitError> { Ok(Box::new(RcSwitch::new(open_linux_gpio()?))) };
    send_codes(&mut OsScheduler, open, codes, &config)
}
