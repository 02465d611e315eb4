// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! OS shim (spec.md §6): monotonic time, a condition-signal primitive,
//! and a source of randomness. spec.md keeps this external; the crate
//! still needs concrete implementations to run standalone, so this
//! module supplies them per the Design Notes ("replace with whatever
//! signalling primitive the target offers, preserving the wait-at-most-
//! timeout-then-re-check loop").

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use rand::Rng;
use tokio::{
    sync::Notify,
    time::{Duration, Instant, timeout},
};

use crate::error::BpError;

/// `systime(&secs) -> 0|error` re-expressed as a trait so tests can swap
/// in [`FakeClock`]. Seconds are measured from channel-open time, per
/// spec.md §6.
pub trait Clock: std::fmt::Debug + Send + Sync {
    fn now_secs(&self) -> Result<u64, BpError>;
}

/// Real clock: seconds elapsed since this instance was constructed.
#[derive(Debug)]
pub struct SystemClock {
    opened_at: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            opened_at: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now_secs(&self) -> Result<u64, BpError> {
        Ok(self.opened_at.elapsed().as_secs())
    }
}

/// Deterministic clock for retransmit/expiry/wrap tests: an atomic
/// seconds counter the test advances explicitly instead of sleeping.
#[derive(Debug, Default)]
pub struct FakeClock {
    secs: AtomicU64,
}

impl FakeClock {
    pub fn new(start_secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(start_secs),
        }
    }

    pub fn advance(&self, delta_secs: u64) {
        self.secs.fetch_add(delta_secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_secs(&self) -> Result<u64, BpError> {
        Ok(self.secs.load(Ordering::SeqCst))
    }
}

/// `createlock`/`waiton`/`signal` collapsed into a single cell wrapping
/// `tokio::sync::Notify`, the condvar substitute the Design Notes call
/// for in an async engine.
#[derive(Debug, Default)]
pub struct WaitCell {
    notify: Notify,
}

impl WaitCell {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
        }
    }

    /// Wakes one waiter, if any is currently parked in [`Self::wait`].
    pub fn signal(&self) {
        self.notify.notify_one();
    }

    /// Waits up to `timeout_ms`, then returns regardless (`0|TIMEOUT`
    /// become `Ok(())`/`Err(BpError::Timeout)`). Callers re-check their
    /// condition after this returns either way, per spec.md's Design
    /// Notes ("wait at most WRAP_TIMEOUT ms, then re-check").
    pub async fn wait(&self, timeout_ms: u64) -> Result<(), BpError> {
        let notified = self.notify.notified();
        match timeout(Duration::from_millis(timeout_ms), notified).await {
            Ok(_) => Ok(()),
            Err(_) => Err(BpError::Timeout),
        }
    }
}

/// `bplib_os_random`: a `u32` of randomness, used for the creation-
/// timestamp sequence number disambiguator.
pub fn random_u32() -> u32 {
    rand::rng().random()
}

pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_explicitly() {
        let c = FakeClock::new(10);
        assert_eq!(c.now_secs().unwrap(), 10);
        c.advance(5);
        assert_eq!(c.now_secs().unwrap(), 15);
        c.set(100);
        assert_eq!(c.now_secs().unwrap(), 100);
    }

    #[tokio::test]
    async fn wait_cell_times_out_without_signal() {
        let cell = WaitCell::new();
        let err = cell.wait(10).await.unwrap_err();
        assert_eq!(err, BpError::Timeout);
    }

    #[tokio::test]
    async fn wait_cell_wakes_on_signal() {
        let cell = Arc::new(WaitCell::new());
        let c2 = cell.clone();
        let waiter = tokio::spawn(async move { c2.wait(2_000).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        cell.signal();
        waiter.await.unwrap().unwrap();
    }
}
