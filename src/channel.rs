// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The channel engine (spec.md §4.4): the public `open`/`store`/`load`/
//! `process`/`accept`/`flush`/`latchstats` surface tying together the
//! active table, the ACS engine, and pluggable storage.
//!
//! `oldest_active_cid`/`current_active_cid` live on [`Channel`] itself
//! rather than on [`ActiveTable`], per spec.md §4.4's state list — the
//! active table only owns the slot array; the channel engine drives the
//! two monotone counters directly through the table's raw index
//! accessors (spec.md §4.2, "the channel engine manipulates slots
//! directly by index").

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    acs::{self, AcsEngine},
    active_table::{ActiveTable, AtEntry},
    block::{self, Bundle, DecodedBundle},
    cfg::{config::ChannelAttributes, enums::WrapResponse},
    eid::Eid,
    error::{BpError, ProcessFlags},
    os::{SharedClock, WaitCell},
    storage::{Sid, StorageHandles, StorageService, TimeoutMs},
};

const WRAP_TIMEOUT_MS: u64 = crate::cfg::config::WRAP_TIMEOUT_MS;

/// `stats` block (spec.md §4.4/§4.4.7), one counter per disposition a
/// bundle can reach over its lifetime (spec.md §8, CH1).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub generated: u64,
    pub transmitted: u64,
    pub retransmitted: u64,
    pub expired: u64,
    pub lost: u64,
    pub acknowledged: u64,
    pub received: u64,
    pub delivered: u64,
}

/// Snapshot returned by [`Channel::latchstats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub stats: Stats,
    pub active: u64,
    pub bundles_queued: u64,
    pub payloads_queued: u64,
    pub acs_queued: u64,
}

/// State protected by the channel's single coarse-grained lock (spec.md
/// §5): the AT array and the two monotone CID counters.
struct AtGuarded {
    table: ActiveTable,
    oldest_active_cid: u64,
    current_active_cid: u64,
}

/// A bundle chosen by `load()`'s candidate search (§4.4.3 steps 2-3),
/// tagged with how its CID should be assigned in step 4c.
enum Candidate {
    /// A freshly dequeued bundle; needs a new CID recorded at
    /// `current_active_cid` if it requests custody.
    Fresh { sid: Sid, bytes: Bytes },
    /// A retransmit candidate whose CID assignment is already decided.
    Retransmit {
        sid: Sid,
        bytes: Bytes,
        cid: u64,
        reused: bool,
    },
}

/// One BP6 custody channel (spec.md §4.4).
pub struct Channel {
    route: Eid,
    attributes: Mutex<ChannelAttributes>,
    bundle_store: Arc<dyn StorageService>,
    payload_store: Arc<dyn StorageService>,
    acs: Mutex<AcsEngine>,
    acs_store: Arc<dyn StorageService>,
    at: Mutex<AtGuarded>,
    wrap_cell: WaitCell,
    clock: SharedClock,
    stats: Mutex<Stats>,
}

impl Channel {
    /// `open(route, store_ops, attributes?) → channel` (spec.md
    /// §4.4.1). Resource acquisition here can't fail except through
    /// attribute validation, since storage/AT allocation are infallible
    /// Rust constructions rather than the original's fallible `calloc`s.
    pub fn open(
        route: Eid,
        storage: StorageHandles,
        attributes: ChannelAttributes,
        clock: SharedClock,
    ) -> Result<Self, BpError> {
        attributes
            .validate()
            .map_err(|e| BpError::ParmErr(e.to_string()))?;

        let table = ActiveTable::new(attributes.active_table_size);
        let acs = AcsEngine::new(
            storage.acs.clone(),
            attributes.max_gaps_per_dacs,
            attributes.max_fills_per_dacs,
            attributes.dacs_rate,
            route,
        );

        debug!(%route, "channel opened");

        Ok(Self {
            route,
            bundle_store: storage.bundle,
            payload_store: storage.payload,
            acs_store: storage.acs,
            acs: Mutex::new(acs),
            at: Mutex::new(AtGuarded {
                table,
                oldest_active_cid: 1,
                current_active_cid: 1,
            }),
            attributes: Mutex::new(attributes),
            wrap_cell: WaitCell::new(),
            clock,
            stats: Mutex::new(Stats::default()),
        })
    }

    pub fn route(&self) -> Eid {
        self.route
    }

    /// Applies one configuration change, per spec.md §6's `config`
    /// surface ("setting any option clears `prebuilt`").
    pub async fn configure(
        &self,
        opt: crate::cfg::config::ConfigOption,
    ) -> Result<(), BpError> {
        self.attributes.lock().await.set(opt)
    }

    fn now(&self, flags: &mut ProcessFlags) -> u64 {
        match self.clock.now_secs() {
            Ok(secs) => secs,
            Err(_) => {
                flags.insert(ProcessFlags::UNRELIABLETIME);
                0
            },
        }
    }

    /// `store(payload, size, timeout, flags) → status` (spec.md
    /// §4.4.2).
    pub async fn store(
        &self,
        payload: Bytes,
        timeout_ms: TimeoutMs,
        flags: &mut ProcessFlags,
    ) -> Result<(), BpError> {
        let attrs = self.attributes.lock().await.clone();
        let now = self.now(flags);

        let bundle = Bundle {
            destination: self.route,
            source: self.route,
            creation_secs: now,
            creation_seq: crate::os::random_u32(),
            lifetime: attrs.lifetime,
            custody_requested: attrs.request_custody,
            admin_record: attrs.admin_record,
            fragmentation_permitted: attrs.allow_fragmentation,
            integrity_check: attrs.integrity_check,
            cipher_suite: Some(attrs.cipher_suite),
            payload,
        };
        let encoded = block::encode(&bundle);

        self.bundle_store
            .enqueue(encoded.bytes, timeout_ms)
            .await
            .inspect_err(|_| flags.insert(ProcessFlags::STOREFAILURE))?;

        self.stats.lock().await.generated += 1;
        Ok(())
    }

    /// `load(out_buffer, size, timeout, flags) → bytes_written | status`
    /// (spec.md §4.4.3). The hot path; in order, the first step that
    /// yields a bundle wins.
    pub async fn load(
        &self,
        max_size: usize,
        timeout_ms: TimeoutMs,
        flags: &mut ProcessFlags,
    ) -> Result<Bytes, BpError> {
        // Step 1: flush pending ACS, then drain one serialized record.
        {
            let mut acs = self.acs.lock().await;
            let now = self.now(flags);
            if acs.should_emit(now) {
                let _ = acs.flush(now).await;
            }
        }
        if let Ok((sid, bytes)) = self.acs_store.dequeue(Some(0)).await {
            flags.insert(ProcessFlags::ROUTENEEDED);
            self.acs_store
                .relinquish(sid)
                .await
                .inspect_err(|_| flags.insert(ProcessFlags::STOREFAILURE))?;
            return self.emit(bytes, max_size, None, flags).await;
        }

        let attrs = self.attributes.lock().await.clone();

        // Steps 2-3: scan for a retransmit candidate or fall through to
        // a fresh dequeue, per the control flow documented on `Candidate`.
        let candidate = self.find_candidate(&attrs, timeout_ms, flags).await?;

        match candidate {
            Candidate::Fresh { sid, bytes } => self.emit(bytes, max_size, Some((sid, true)), flags).await,
            Candidate::Retransmit {
                sid,
                bytes,
                cid: _,
                reused,
            } => self.emit(bytes, max_size, Some((sid, !reused)), flags).await,
        }
    }

    /// Steps 2-3 of `load`: scan the AT for a due retransmit, handling
    /// wrap safety, then fall through to a fresh dequeue.
    async fn find_candidate(
        &self,
        attrs: &ChannelAttributes,
        timeout_ms: TimeoutMs,
        flags: &mut ProcessFlags,
    ) -> Result<Candidate, BpError> {
        loop {
            let mut guard = self.at.lock().await;
            let n = guard.table.capacity() as u64;

            // Step 2: scan for a due retransmit.
            while guard.oldest_active_cid != guard.current_active_cid {
                let cid = guard.oldest_active_cid;
                let idx = guard.table.index_of(cid);
                let Some(entry) = guard.table.entry_at(idx) else {
                    guard.oldest_active_cid += 1;
                    continue;
                };

                let now = self.now(flags);
                let bytes = match self.bundle_store.retrieve(entry.sid, Some(0)).await {
                    Ok(b) => b,
                    Err(_) => {
                        let _ = self.bundle_store.relinquish(entry.sid).await;
                        guard.table.vacate_at(idx);
                        guard.oldest_active_cid += 1;
                        self.stats.lock().await.lost += 1;
                        flags.insert(ProcessFlags::STOREFAILURE);
                        continue;
                    },
                };

                let mut pflags = ProcessFlags::empty();
                let decoded = match block::decode(&bytes, &mut pflags) {
                    Ok(d) => d,
                    Err(_) => {
                        let _ = self.bundle_store.relinquish(entry.sid).await;
                        guard.table.vacate_at(idx);
                        guard.oldest_active_cid += 1;
                        self.stats.lock().await.lost += 1;
                        flags.insert(ProcessFlags::STOREFAILURE);
                        continue;
                    },
                };

                if decoded.bundle.lifetime != 0
                    && now >= decoded.bundle.creation_secs + decoded.bundle.lifetime
                {
                    let _ = self.bundle_store.relinquish(entry.sid).await;
                    guard.table.vacate_at(idx);
                    guard.oldest_active_cid += 1;
                    self.stats.lock().await.expired += 1;
                    continue;
                }

                if attrs.timeout != 0 && now >= entry.retx + attrs.timeout {
                    self.stats.lock().await.retransmitted += 1;
                    guard.oldest_active_cid += 1;
                    if attrs.cid_reuse {
                        return Ok(Candidate::Retransmit {
                            sid: entry.sid,
                            bytes,
                            cid,
                            reused: true,
                        });
                    } else {
                        guard.table.vacate_at(idx);
                        return Ok(Candidate::Retransmit {
                            sid: entry.sid,
                            bytes,
                            cid,
                            reused: false,
                        });
                    }
                }

                // Oldest live entry isn't due yet: stop scanning and
                // fall through to the wrap safety check below.
                break;
            }

            // Wrap safety check: can a fresh bundle be admitted?
            let wrap_idx = guard.table.index_of(guard.current_active_cid);
            if guard.table.is_occupied_at(wrap_idx) {
                match attrs.wrap_response {
                    WrapResponse::Resend => {
                        if guard.oldest_active_cid == guard.current_active_cid {
                            // window already empty; nothing to resend, wait and retry
                            drop(guard);
                            let _ = self.wrap_cell.wait(WRAP_TIMEOUT_MS).await;
                            continue;
                        }
                        let cid = guard.oldest_active_cid;
                        let idx = guard.table.index_of(cid);
                        let Some(entry) = guard.table.entry_at(idx) else {
                            guard.oldest_active_cid += 1;
                            continue;
                        };
                        guard.oldest_active_cid += 1;
                        let bytes = match self.bundle_store.retrieve(entry.sid, Some(0)).await {
                            Ok(b) => b,
                            Err(_) => {
                                let _ = self.bundle_store.relinquish(entry.sid).await;
                                guard.table.vacate_at(idx);
                                self.stats.lock().await.lost += 1;
                                flags.insert(ProcessFlags::STOREFAILURE);
                                drop(guard);
                                let _ = self.wrap_cell.wait(WRAP_TIMEOUT_MS).await;
                                continue;
                            },
                        };
                        self.stats.lock().await.retransmitted += 1;
                        drop(guard);
                        let _ = self.wrap_cell.wait(WRAP_TIMEOUT_MS).await;
                        // Wrap-triggered resend always assigns a fresh CID
                        // (spec.md §4.4.3, RESEND: "do not reuse CID").
                        return Ok(Candidate::Retransmit {
                            sid: entry.sid,
                            bytes,
                            cid,
                            reused: false,
                        });
                    },
                    WrapResponse::Block => {
                        drop(guard);
                        let _ = self.wrap_cell.wait(WRAP_TIMEOUT_MS).await;
                        return Err(BpError::Overflow);
                    },
                    WrapResponse::Drop => {
                        let cid = guard.oldest_active_cid;
                        let idx = guard.table.index_of(cid);
                        guard.oldest_active_cid += 1;
                        if let Some(entry) = guard.table.vacate_at(idx) {
                            let _ = self.bundle_store.relinquish(entry.sid).await;
                            self.stats.lock().await.lost += 1;
                        }
                        continue;
                    },
                }
            }

            drop(guard);
            break;
        }

        // Step 3: dequeue a fresh bundle.
        loop {
            let (sid, bytes) = self.bundle_store.dequeue(timeout_ms).await?;

            let mut pflags = ProcessFlags::empty();
            let Ok(decoded) = block::decode(&bytes, &mut pflags) else {
                let _ = self.bundle_store.relinquish(sid).await;
                continue;
            };
            let DecodedBundle { bundle, .. } = decoded;
            let now = self.now(flags);
            if bundle.lifetime != 0 && now >= bundle.creation_secs + bundle.lifetime {
                let _ = self.bundle_store.relinquish(sid).await;
                self.stats.lock().await.expired += 1;
                continue;
            }
            return Ok(Candidate::Fresh { sid, bytes });
        }
    }

    /// Step 4 of `load`: size check, CID assignment under the AT lock,
    /// buffer copy, and custody-vs-fire-and-forget SID disposal.
    async fn emit(
        &self,
        bytes: Bytes,
        max_size: usize,
        cid_assignment: Option<(Sid, bool)>,
        flags: &mut ProcessFlags,
    ) -> Result<Bytes, BpError> {
        if max_size != 0 && bytes.len() > max_size {
            if let Some((sid, _)) = cid_assignment {
                let _ = self.bundle_store.relinquish(sid).await;
            }
            self.stats.lock().await.lost += 1;
            return Err(BpError::BundleTooLarge {
                needed: bytes.len(),
                available: max_size,
            });
        }

        let mut pflags = ProcessFlags::empty();
        let decoded = block::decode(&bytes, &mut pflags)?;

        let out_bytes = if decoded.bundle.custody_requested {
            let Some((sid, assign_new_cid)) = cid_assignment else {
                // ACS bundles never request custody themselves; unreachable
                // in practice but handled defensively.
                bytes
            };
            let now = self.now(flags);
            let mut guard = self.at.lock().await;
            let final_bytes = if assign_new_cid {
                let cid = guard.current_active_cid;
                let idx = guard.table.index_of(cid);
                let rewritten =
                    block::rewrite_cid(&bytes, decoded.cteb_cid_offset, cid).unwrap_or(bytes);
                guard.table.set_at(idx, cid, AtEntry { sid, retx: now });
                guard.current_active_cid += 1;
                rewritten
            } else {
                let cid = decoded.cid.unwrap_or(0);
                let idx = guard.table.index_of(cid);
                guard.table.update_at(idx, AtEntry { sid, retx: now });
                bytes
            };
            drop(guard);
            self.wrap_cell.signal();
            final_bytes
        } else {
            if let Some((sid, _)) = cid_assignment {
                let _ = self.bundle_store.relinquish(sid).await;
            }
            bytes
        };

        self.stats.lock().await.transmitted += 1;
        Ok(out_bytes)
    }

    /// `process(bundle_bytes, size, timeout, flags) → status` (spec.md
    /// §4.4.4).
    pub async fn process(
        &self,
        bundle_bytes: &[u8],
        flags: &mut ProcessFlags,
    ) -> Result<(), BpError> {
        self.stats.lock().await.received += 1;

        let decoded = match block::decode(bundle_bytes, flags) {
            Ok(d) => d,
            Err(e) => return Err(e),
        };

        let now = self.now(flags);
        if decoded.bundle.lifetime != 0 && now >= decoded.bundle.creation_secs + decoded.bundle.lifetime
        {
            self.stats.lock().await.expired += 1;
            return Err(BpError::Expired);
        }

        if decoded.bundle.admin_record {
            if let Ok(acked) = acs::read_record(&decoded.bundle.payload) {
                let mut guard = self.at.lock().await;
                let mut count = 0u64;
                for cid in acked {
                    if cid < guard.oldest_active_cid || cid >= guard.current_active_cid {
                        continue;
                    }
                    let idx = guard.table.index_of(cid);
                    if let Some(entry) = guard.table.vacate_at(idx) {
                        let _ = self.bundle_store.relinquish(entry.sid).await;
                        count += 1;
                    }
                }
                drop(guard);
                self.wrap_cell.signal();
                self.stats.lock().await.acknowledged += count;
                return Err(BpError::PendingAcknowledgment);
            }
        }

        if let Some(cid) = decoded.cid {
            let mut acs = self.acs.lock().await;
            let _ = acs.insert_cid(cid);
            if acs.should_emit(now) {
                let _ = acs.flush(now).await;
            }
            drop(acs);

            self.payload_store
                .enqueue(decoded.bundle.payload, None)
                .await
                .inspect_err(|_| flags.insert(ProcessFlags::STOREFAILURE))?;
            return Err(BpError::PendingCustodyTransfer);
        }

        self.payload_store
            .enqueue(decoded.bundle.payload, None)
            .await
            .inspect_err(|_| flags.insert(ProcessFlags::STOREFAILURE))?;
        Ok(())
    }

    /// `accept(out_payload, size, timeout, flags) → bytes | status`
    /// (spec.md §4.4.5).
    pub async fn accept(
        &self,
        timeout_ms: TimeoutMs,
        flags: &mut ProcessFlags,
    ) -> Result<Bytes, BpError> {
        match self.payload_store.dequeue(timeout_ms).await {
            Ok((sid, bytes)) => {
                self.payload_store
                    .relinquish(sid)
                    .await
                    .inspect_err(|_| flags.insert(ProcessFlags::STOREFAILURE))?;
                self.stats.lock().await.delivered += 1;
                Ok(bytes)
            },
            Err(e) => {
                if e == BpError::Timeout {
                    self.stats.lock().await.lost += 1;
                }
                Err(e)
            },
        }
    }

    /// `flush(channel)` (spec.md §4.4.6): relinquish every outstanding
    /// AT entry and also force an ACS flush, since both share the name
    /// "flush" in the caller-visible vocabulary (spec.md §4.3,
    /// "the channel is explicitly flushed").
    pub async fn flush(&self) {
        let mut guard = self.at.lock().await;
        let mut lost = 0u64;
        while guard.oldest_active_cid != guard.current_active_cid {
            let cid = guard.oldest_active_cid;
            let idx = guard.table.index_of(cid);
            if let Some(entry) = guard.table.vacate_at(idx) {
                let _ = self.bundle_store.relinquish(entry.sid).await;
                lost += 1;
            }
            guard.oldest_active_cid += 1;
        }
        guard.current_active_cid = guard.oldest_active_cid;
        drop(guard);
        self.wrap_cell.signal();
        self.stats.lock().await.lost += lost;

        let mut flags = ProcessFlags::empty();
        let now = self.now(&mut flags);
        let mut acs = self.acs.lock().await;
        let _ = acs.flush(now).await;

        trace!(lost, "channel flushed");
    }

    /// `latchstats(channel, out)` (spec.md §4.4.7).
    pub async fn latchstats(&self) -> StatsSnapshot {
        let stats = *self.stats.lock().await;
        let guard = self.at.lock().await;
        let active = guard.current_active_cid - guard.oldest_active_cid;
        drop(guard);

        StatsSnapshot {
            stats,
            active,
            bundles_queued: self.bundle_store.getcount().await,
            payloads_queued: self.payload_store.getcount().await,
            acs_queued: self.acs_store.getcount().await,
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("route", &self.route).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::os::FakeClock;

    fn open_channel(attrs: ChannelAttributes) -> (Channel, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new(0));
        let ch = Channel::open(
            Eid::new(1, 0),
            StorageHandles::in_memory(),
            attrs,
            clock.clone(),
        )
        .unwrap();
        (ch, clock)
    }

    #[tokio::test]
    async fn store_then_load_round_trips_custody_bundle() {
        // spec.md §8 scenario 3 (A side): CID=1 after first load.
        let attrs = ChannelAttributes {
            request_custody: true,
            ..Default::default()
        };
        let (ch, _clock) = open_channel(attrs);
        let mut flags = ProcessFlags::empty();

        ch.store(Bytes::from_static(b"hello"), None, &mut flags)
            .await
            .unwrap();
        let wire = ch.load(0, None, &mut flags).await.unwrap();

        let mut pflags = ProcessFlags::empty();
        let decoded = block::decode(&wire, &mut pflags).unwrap();
        assert_eq!(decoded.cid, Some(1));
        assert_eq!(decoded.bundle.payload, Bytes::from_static(b"hello"));

        let stats = ch.latchstats().await;
        assert_eq!(stats.active, 1);
        assert_eq!(stats.stats.transmitted, 1);
    }

    #[tokio::test]
    async fn custody_round_trip_acknowledges_and_vacates() {
        // spec.md §8 scenario 3, full loop between two channels.
        let attrs_a = ChannelAttributes {
            request_custody: true,
            ..Default::default()
        };
        let (a, _clock_a) = open_channel(attrs_a);
        let (b, _clock_b) = open_channel(ChannelAttributes {
            max_gaps_per_dacs: 1,
            ..Default::default()
        });
        let mut flags = ProcessFlags::empty();

        a.store(Bytes::from_static(b"hello"), None, &mut flags)
            .await
            .unwrap();
        let wire = a.load(0, None, &mut flags).await.unwrap();

        let status = b.process(&wire, &mut flags).await;
        assert_eq!(status, Err(BpError::PendingCustodyTransfer));

        let payload = b.accept(Some(0), &mut flags).await.unwrap();
        assert_eq!(payload, Bytes::from_static(b"hello"));

        let acs_wire = b.load(0, None, &mut flags).await.unwrap();
        let status_a = a.process(&acs_wire, &mut flags).await;
        assert_eq!(status_a, Err(BpError::PendingAcknowledgment));

        let stats_a = a.latchstats().await;
        assert_eq!(stats_a.stats.acknowledged, 1);
        assert_eq!(stats_a.active, 0);
    }

    #[tokio::test]
    async fn retransmit_after_timeout_reassigns_cid() {
        // spec.md §8 scenario 4.
        let attrs = ChannelAttributes {
            request_custody: true,
            timeout: 2,
            cid_reuse: false,
            ..Default::default()
        };
        let (ch, clock) = open_channel(attrs);
        let mut flags = ProcessFlags::empty();

        ch.store(Bytes::from_static(b"hello"), None, &mut flags)
            .await
            .unwrap();
        let first = ch.load(0, None, &mut flags).await.unwrap();
        let mut pflags = ProcessFlags::empty();
        assert_eq!(block::decode(&first, &mut pflags).unwrap().cid, Some(1));

        clock.advance(3);
        let second = ch.load(0, None, &mut flags).await.unwrap();
        let decoded = block::decode(&second, &mut pflags).unwrap();
        assert_eq!(decoded.cid, Some(2));

        let stats = ch.latchstats().await;
        assert_eq!(stats.stats.retransmitted, 1);
    }

    #[tokio::test]
    async fn wrap_drop_loses_oldest_entry() {
        // spec.md §8 scenario 5.
        let attrs = ChannelAttributes {
            request_custody: true,
            active_table_size: 2,
            wrap_response: WrapResponse::Drop,
            ..Default::default()
        };
        let (ch, _clock) = open_channel(attrs);
        let mut flags = ProcessFlags::empty();

        for _ in 0..3 {
            ch.store(Bytes::from_static(b"x"), None, &mut flags)
                .await
                .unwrap();
            ch.load(0, None, &mut flags).await.unwrap();
        }

        let stats = ch.latchstats().await;
        assert_eq!(stats.stats.lost, 1);
    }

    #[tokio::test]
    async fn non_custody_bundle_relinquishes_immediately() {
        let attrs = ChannelAttributes {
            request_custody: false,
            ..Default::default()
        };
        let (ch, _clock) = open_channel(attrs);
        let mut flags = ProcessFlags::empty();
        ch.store(Bytes::from_static(b"x"), None, &mut flags)
            .await
            .unwrap();
        ch.load(0, None, &mut flags).await.unwrap();
        let stats = ch.latchstats().await;
        assert_eq!(stats.active, 0);
        assert_eq!(stats.bundles_queued, 0);
    }

    #[tokio::test]
    async fn flush_vacates_all_outstanding_entries() {
        let attrs = ChannelAttributes {
            request_custody: true,
            ..Default::default()
        };
        let (ch, _clock) = open_channel(attrs);
        let mut flags = ProcessFlags::empty();
        ch.store(Bytes::from_static(b"x"), None, &mut flags)
            .await
            .unwrap();
        ch.load(0, None, &mut flags).await.unwrap();
        assert_eq!(ch.latchstats().await.active, 1);

        ch.flush().await;
        let stats = ch.latchstats().await;
        assert_eq!(stats.active, 0);
        assert_eq!(stats.stats.lost, 1);
    }

    #[tokio::test]
    async fn wrap_block_signals_after_retransmit_relief() {
        // SPEC_FULL.md §12(a): a channel blocked in the wrap-safety wait
        // wakes as soon as a concurrent ACS vacates the slot it's
        // waiting on, well inside the condvar's 1s ceiling, even though
        // `load()` still reports `OVERFLOW` on this attempt per spec.md
        // §4.4.3's BLOCK policy (the caller is expected to retry).
        use tokio::time::Duration;

        let attrs_a = ChannelAttributes {
            request_custody: true,
            active_table_size: 1,
            wrap_response: WrapResponse::Block,
            ..Default::default()
        };
        let (a, _clock_a) = open_channel(attrs_a);
        let a = Arc::new(a);
        let (b, _clock_b) = open_channel(ChannelAttributes {
            max_gaps_per_dacs: 1,
            ..Default::default()
        });
        let mut flags = ProcessFlags::empty();

        a.store(Bytes::from_static(b"first"), None, &mut flags)
            .await
            .unwrap();
        let first = a.load(0, None, &mut flags).await.unwrap();

        a.store(Bytes::from_static(b"second"), None, &mut flags)
            .await
            .unwrap();

        let a2 = a.clone();
        let blocked = tokio::spawn(async move {
            let mut flags = ProcessFlags::empty();
            tokio::time::timeout(Duration::from_millis(400), a2.load(0, None, &mut flags)).await
        });

        tokio::time::sleep(Duration::from_millis(30)).await;

        let status = b.process(&first, &mut flags).await;
        assert_eq!(status, Err(BpError::PendingCustodyTransfer));
        let acs_wire = b.load(0, None, &mut flags).await.unwrap();
        let ack_status = a.process(&acs_wire, &mut flags).await;
        assert_eq!(ack_status, Err(BpError::PendingAcknowledgment));

        let result = blocked.await.unwrap();
        assert_eq!(result, Ok(Err(BpError::Overflow)));
    }

    #[tokio::test]
    async fn expired_bundle_is_dropped_on_process() {
        let attrs = ChannelAttributes::default();
        let (ch, clock) = open_channel(attrs);
        let mut flags = ProcessFlags::empty();

        let encoded = block::encode(&Bundle {
            destination: Eid::new(1, 0),
            source: Eid::new(2, 0),
            creation_secs: 0,
            creation_seq: 0,
            lifetime: 5,
            custody_requested: false,
            admin_record: false,
            fragmentation_permitted: false,
            integrity_check: false,
            cipher_suite: None,
            payload: Bytes::from_static(b"stale"),
        });
        clock.advance(10);

        let status = ch.process(&encoded.bytes, &mut flags).await;
        assert_eq!(status, Err(BpError::Expired));
        assert_eq!(ch.latchstats().await.stats.expired, 1);
    }
}
