//! Condition-variable wait exposed to platform code.
//!
//! Worker threads that coordinate with VM-driving code wait on a [`Monitor`]
//! with a millisecond timeout. The VM's own big lock is the mutex returned by
//! [`crate::vm::Vm::lock`]; this type only covers the wait/notify contract.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Outcome of a timed wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// The monitor was notified before the timeout.
    Ok,
    /// The timeout elapsed.
    Timeout,
    /// The underlying mutex was poisoned.
    Err,
}

/// A notify/wait pair with millisecond timeouts.
pub struct Monitor {
    signalled: Mutex<bool>,
    cond: Condvar,
}

impl Monitor {
    /// Creates an unsignalled monitor.
    pub fn new() -> Self {
        Self {
            signalled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Wakes one waiter. The signal is latched: a notify before the wait
    /// still completes the next wait.
    pub fn notify(&self) {
        if let Ok(mut flag) = self.signalled.lock() {
            *flag = true;
            self.cond.notify_one();
        }
    }

    /// Waits up to `ms` milliseconds for a notify.
    pub fn wait_ms(&self, ms: u64) -> WaitStatus {
        let Ok(mut flag) = self.signalled.lock() else {
            return WaitStatus::Err;
        };

        let deadline = std::time::Instant::now() + Duration::from_millis(ms);
        while !*flag {
            let now = std::time::Instant::now();
            if now >= deadline {
                return WaitStatus::Timeout;
            }

            flag = match self.cond.wait_timeout(flag, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return WaitStatus::Err,
            };
        }

        *flag = false;
        WaitStatus::Ok
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_wait_times_out() {
        let monitor = Monitor::new();
        assert_eq!(monitor.wait_ms(10), WaitStatus::Timeout);
    }

    #[test]
    fn test_notify_before_wait_is_latched() {
        let monitor = Monitor::new();
        monitor.notify();
        assert_eq!(monitor.wait_ms(10), WaitStatus::Ok);
        assert_eq!(monitor.wait_ms(10), WaitStatus::Timeout);
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let monitor = Arc::new(Monitor::new());
        let other = Arc::clone(&monitor);

        let waiter = thread::spawn(move || other.wait_ms(5_000));
        thread::sleep(Duration::from_millis(20));
        monitor.notify();

        assert_eq!(waiter.join().expect("waiter panicked"), WaitStatus::Ok);
    }
}
