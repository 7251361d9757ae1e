//! Scheduling policy helpers.
//!
//! Raising the transmitting thread to SCHED_RR keeps it from being preempted
//! halfway through a pulse train. It needs root or `cap_sys_nice`; without
//! either the transmission simply runs at normal priority.

use std::{fmt, io, mem};

use tracing::{debug, info, warn};

use crate::error::SchedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedPolicy {
    #[default]
    Other,
    Batch,
    Idle,
    RoundRobin,
    Fifo,
}

impl SchedPolicy {
    pub const ALL: [SchedPolicy; 5] = [
        SchedPolicy::Other,
        SchedPolicy::Batch,
        SchedPolicy::Idle,
        SchedPolicy::RoundRobin,
        SchedPolicy::Fifo,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SchedPolicy::Other => "SCHED_OTHER",
            SchedPolicy::Batch => "SCHED_BATCH",
            SchedPolicy::Idle => "SCHED_IDLE",
            SchedPolicy::RoundRobin => "SCHED_RR",
            SchedPolicy::Fifo => "SCHED_FIFO",
        }
    }

    pub fn as_raw(self) -> libc::c_int {
        match self {
            SchedPolicy::Other => libc::SCHED_OTHER,
            SchedPolicy::Batch => libc::SCHED_BATCH,
            SchedPolicy::Idle => libc::SCHED_IDLE,
            SchedPolicy::RoundRobin => libc::SCHED_RR,
            SchedPolicy::Fifo => libc::SCHED_FIFO,
        }
    }

    pub fn from_raw(raw: libc::c_int) -> Option<Self> {
        let raw = raw & !libc::SCHED_RESET_ON_FORK;
        Self::ALL.into_iter().find(|p| p.as_raw() == raw)
    }

    pub fn is_realtime(self) -> bool {
        matches!(self, SchedPolicy::RoundRobin | SchedPolicy::Fifo)
    }
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Minimum and maximum priority the OS allows for `policy`.
pub fn priority_range(policy: SchedPolicy) -> io::Result<(i32, i32)> {
    let min = unsafe { libc::sched_get_priority_min(policy.as_raw()) };
    if min == -1 {
        return Err(io::Error::last_os_error());
    }
    let max = unsafe { libc::sched_get_priority_max(policy.as_raw()) };
    if max == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok((min, max))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedSnapshot {
    pub policy: SchedPolicy,
    pub priority: i32,
}

impl fmt::Display for SchedSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.policy, self.priority)
    }
}

pub trait Scheduler {
    fn current(&self) -> io::Result<SchedSnapshot>;
    fn max_priority(&self, policy: SchedPolicy) -> io::Result<i32>;
    fn set(&mut self, snapshot: SchedSnapshot) -> io::Result<()>;
}

/// The calling thread's scheduling, through libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsScheduler;

impl Scheduler for OsScheduler {
    fn current(&self) -> io::Result<SchedSnapshot> {
        let raw = unsafe { libc::sched_getscheduler(0) };
        if raw == -1 {
            return Err(io::Error::last_os_error());
        }
        let policy = SchedPolicy::from_raw(raw).ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, format!("unknown scheduling policy {raw}"))
        })?;

        let mut param: libc::sched_param = unsafe { mem::zeroed() };
        if unsafe { libc::sched_getparam(0, &mut param) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(SchedSnapshot {
            policy,
            priority: param.sched_priority,
        })
    }

    fn max_priority(&self, policy: SchedPolicy) -> io::Result<i32> {
        priority_range(policy).map(|(_, max)| max)
    }

    fn set(&mut self, snapshot: SchedSnapshot) -> io::Result<()> {
        let mut param: libc::sched_param = unsafe { mem::zeroed() };
        param.sched_priority = snapshot.priority;
        if unsafe { libc::sched_setscheduler(0, snapshot.policy.as_raw(), &param) } == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn raise_to_round_robin<S: Scheduler + ?Sized>(scheduler: &mut S) -> Result<SchedSnapshot, SchedError> {
    let priority = scheduler
        .max_priority(SchedPolicy::RoundRobin)
        .map_err(SchedError::PriorityElevationDenied)?;
    let target = SchedSnapshot {
        policy: SchedPolicy::RoundRobin,
        priority,
    };
    scheduler.set(target).map_err(SchedError::PriorityElevationDenied)?;
    Ok(target)
}

/// Holds SCHED_RR at max priority until dropped, then puts the previous
/// policy back. Nothing is restored if elevation never happened.
pub struct PriorityGuard<'a, S: Scheduler + ?Sized> {
    scheduler: &'a mut S,
    saved: Option<SchedSnapshot>,
}

impl<'a, S: Scheduler + ?Sized> PriorityGuard<'a, S> {
    pub fn elevate(scheduler: &'a mut S) -> Self {
        let before = scheduler.current().unwrap_or_else(|e| {
            warn!("{}, assuming {}", SchedError::PriorityQueryFailed(e), SchedSnapshot::default());
            SchedSnapshot::default()
        });

        let saved = match raise_to_round_robin(scheduler) {
            Ok(now) => {
                debug!("scheduling {} -> {}", before, now);
                Some(before)
            }
            Err(e) => {
                info!("{}; continuing at default priority", e);
                info!("run as root or `sudo setcap cap_sys_nice+ep <binary>` for real-time scheduling");
                None
            }
        };
        Self { scheduler, saved }
    }

    pub fn is_elevated(&self) -> bool {
        self.saved.is_some()
    }
}

impl<S: Scheduler + ?Sized> Drop for PriorityGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            match self.scheduler.set(saved) {
                Ok(()) => debug!("scheduling restored to {}", saved),
                Err(e) => warn!("{}", SchedError::PriorityRestoreFailed(e)),
            }
        }
    }
}

/// Run `operation` at real-time priority when the OS allows it.
pub fn with_elevated_priority<S, R>(scheduler: &mut S, operation: impl FnOnce() -> R) -> R
where
    S: Scheduler + ?Sized,
{
    let _guard = PriorityGuard::elevate(scheduler);
    operation()
}
