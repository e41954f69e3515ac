//! Connection health tracking for normal command mode.
//!
//! The guard counts consecutive link faults. Up to [`FAILURE_THRESHOLD`] of
//! them are absorbed as line noise. The next one closes and reopens the link,
//! and the counter goes back to zero whether or not the reopen worked. A
//! failed reopen is fatal.
//!
//! Firmware upgrades never go through the guard.

use {
    crate::{
        error::{Error, Result},
        link::Link,
    },
    log::{debug, warn},
};

/// Consecutive faults absorbed before the link is re-acquired.
pub const FAILURE_THRESHOLD: u32 = 4;

/// What the guard did with a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardAction {
    /// Counted, below the threshold.
    Absorbed,
    /// Threshold crossed, link closed and reopened.
    Reconnected,
}

/// Consecutive failure counter owned by one engine.
#[derive(Debug, Clone)]
pub struct ConnectionGuard {
    failures: u32,
    threshold: u32,
}

impl ConnectionGuard {
    /// Create a guard with the default threshold.
    pub fn new() -> Self {
        Self::with_threshold(FAILURE_THRESHOLD)
    }

    /// Create a guard with a custom threshold.
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            failures: 0,
            threshold,
        }
    }

    /// Consecutive faults since the last success or reconnect.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a successful operation.
    pub fn record_success(&mut self) {
        if self.failures > 0 {
            debug!("Link recovered after {} fault(s)", self.failures);
        }
        self.failures = 0;
    }

    /// Record a fault and re-acquire the link once the threshold is crossed.
    ///
    /// Returns [`Error::FatalLink`] if the link cannot be reopened.
    pub fn record_fault<L: Link + ?Sized>(
        &mut self,
        link: &mut L,
        fault: &Error,
    ) -> Result<GuardAction> {
        self.failures += 1;
        if self.failures <= self.threshold {
            warn!(
                "Link fault {}/{} on {}: {fault}",
                self.failures,
                self.threshold,
                link.name()
            );
            return Ok(GuardAction::Absorbed);
        }

        warn!(
            "{} consecutive link faults on {}, reopening",
            self.failures,
            link.name()
        );
        if let Err(e) = link.close() {
            debug!("Close before reopen failed (ignoring): {e}");
        }
        let reopened = link.reopen();
        self.failures = 0;

        match reopened {
            Ok(()) => Ok(GuardAction::Reconnected),
            Err(e) => Err(Error::FatalLink(format!(
                "cannot reopen {}: {e}",
                link.name()
            ))),
        }
    }
}

impl Default for ConnectionGuard {
    fn default() -> Self {
        Self::new()
    }
}
