// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Pluggable persistent queue abstraction (spec.md §6, "Storage service").
//!
//! spec.md names this component only by its `create/destroy/enqueue/
//! dequeue/retrieve/relinquish/getcount` interface and leaves its
//! implementation external. `StorageService` re-expresses that interface
//! as an async trait object per the Design Notes ("opaque handles... the
//! natural re-expression is an interface with per-instance state"); `dyn`
//! dispatch needs `async_trait` since `async fn` in traits isn't
//! object-safe on its own, borrowed from the `kata-containers` pack entry
//! which leans on the same crate for its own plugin traits.
//!
//! `create`/`destroy` have no counterpart here: a `MemoryStorage` handle
//! is just a value with normal Rust construction/drop, so there is
//! nothing left for those two operations to do.

use std::{collections::VecDeque, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    sync::{Mutex, Notify},
    time::{Duration, timeout},
};

use crate::error::BpError;

/// Opaque handle into a [`StorageService`]. The library never interprets
/// the value; `VACANT` (`0`) marks an empty active-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sid(u64);

impl Sid {
    pub const VACANT: Sid = Sid(0);

    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn is_vacant(self) -> bool {
        self == Self::VACANT
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// `None` blocks indefinitely (bounded only by the caller dropping the
/// future); `Some(0)` is non-blocking; `Some(ms)` bounds the wait.
pub type TimeoutMs = Option<u64>;

#[async_trait]
pub trait StorageService: std::fmt::Debug + Send + Sync {
    /// Enqueues `payload`, returning the [`Sid`] storage assigned to it.
    async fn enqueue(&self, payload: Bytes, timeout_ms: TimeoutMs) -> Result<Sid, BpError>;

    /// Pops the front of the queue. `Err(BpError::Timeout)` if nothing
    /// arrives within `timeout_ms`.
    async fn dequeue(&self, timeout_ms: TimeoutMs) -> Result<(Sid, Bytes), BpError>;

    /// Non-destructive lookup by [`Sid`]. Used by the channel engine's
    /// retransmit scan, which needs the bytes again without consuming
    /// the queue slot.
    async fn retrieve(&self, sid: Sid, timeout_ms: TimeoutMs) -> Result<Bytes, BpError>;

    /// Removes `sid` if still present. Idempotent: relinquishing an
    /// already-relinquished or unknown `sid` is not an error, matching
    /// "all operations are safe to retry" (spec.md §5).
    async fn relinquish(&self, sid: Sid) -> Result<(), BpError>;

    /// Current number of entries still held.
    async fn getcount(&self) -> u64;
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<(Sid, Bytes)>,
    next_sid: u64,
}

/// Reference [`StorageService`] used by the demo binary and the test
/// suite: one instance per logical handle (bundle-store, payload-store,
/// ACS-store), backed by a `VecDeque` behind a `tokio::sync::Mutex`.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                next_sid: 1,
            })),
            notify: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl StorageService for MemoryStorage {
    async fn enqueue(&self, payload: Bytes, timeout_ms: TimeoutMs) -> Result<Sid, BpError> {
        let _ = timeout_ms; // unbounded queue: enqueue never blocks on capacity
        let mut guard = self.inner.lock().await;
        let sid = Sid::new(guard.next_sid);
        guard.next_sid += 1;
        guard.queue.push_back((sid, payload));
        drop(guard);
        self.notify.notify_one();
        Ok(sid)
    }

    async fn dequeue(&self, timeout_ms: TimeoutMs) -> Result<(Sid, Bytes), BpError> {
        loop {
            // Register interest before checking the queue so a concurrent
            // enqueue can't land in the gap between the check and the wait.
            let notified = self.notify.notified();
            {
                let mut guard = self.inner.lock().await;
                if let Some(item) = guard.queue.pop_front() {
                    return Ok(item);
                }
            }
            match timeout_ms {
                Some(0) => return Err(BpError::Timeout),
                Some(ms) => {
                    if timeout(Duration::from_millis(ms), notified).await.is_err() {
                        return Err(BpError::Timeout);
                    }
                },
                None => notified.await,
            }
        }
    }

    async fn retrieve(&self, sid: Sid, _timeout_ms: TimeoutMs) -> Result<Bytes, BpError> {
        let guard = self.inner.lock().await;
        guard
            .queue
            .iter()
            .find(|(s, _)| *s == sid)
            .map(|(_, bytes)| bytes.clone())
            .ok_or(BpError::FailedStore)
    }

    async fn relinquish(&self, sid: Sid) -> Result<(), BpError> {
        let mut guard = self.inner.lock().await;
        if let Some(pos) = guard.queue.iter().position(|(s, _)| *s == sid) {
            guard.queue.remove(pos);
        }
        Ok(())
    }

    async fn getcount(&self) -> u64 {
        self.inner.lock().await.queue.len() as u64
    }
}

/// The three storage handles a channel owns (spec.md §3 "Ownership"):
/// bundle-store, payload-store, and the ACS engine's own outbound store.
#[derive(Debug, Clone)]
pub struct StorageHandles {
    pub bundle: Arc<dyn StorageService>,
    pub payload: Arc<dyn StorageService>,
    pub acs: Arc<dyn StorageService>,
}

impl StorageHandles {
    /// Convenience constructor wiring three independent [`MemoryStorage`]
    /// instances, the shape the demo binary and most tests want.
    pub fn in_memory() -> Self {
        Self {
            bundle: Arc::new(MemoryStorage::new()),
            payload: Arc::new(MemoryStorage::new()),
            acs: Arc::new(MemoryStorage::new()),
        }
    }
}
