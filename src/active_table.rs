// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fixed-capacity circular ledger of in-flight bundles (spec.md §4.2).
//!
//! Indexed by `cid mod N`. Exposes both the generic `add`/`next`/
//! `remove`/`available`/`count` surface spec.md §4.2 describes, and raw
//! index accessors — the channel engine manipulates slots directly by
//! index rather than through `add`/`next` (spec.md §4.2, last line), so
//! both views live on the same backing array.

use thiserror::Error;

use crate::storage::Sid;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AtError {
    #[error("active table slot already occupied")]
    BufferFull,
}

/// `(sid, retx)` per spec.md §3, tagged internally with the CID that
/// currently owns the slot so `available`/`remove` can tell a live entry
/// from a stale one left behind by a wrapped-around index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtEntry {
    pub sid: Sid,
    pub retx: u64,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    cid: u64,
    entry: AtEntry,
}

#[derive(Debug)]
pub struct ActiveTable {
    slots: Vec<Option<Slot>>,
    capacity: usize,
    oldest_cid: u64,
    current_cid: u64,
    newest_cid: u64,
    count: usize,
}

impl ActiveTable {
    /// `capacity` must be at least 1; callers validate this at
    /// configuration time (`ChannelAttributes::set_active_table_size`).
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "active table capacity must be nonzero");
        Self {
            slots: vec![None; capacity],
            capacity,
            oldest_cid: 0,
            current_cid: 0,
            newest_cid: 0,
            count: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn index_of(&self, cid: u64) -> usize {
        (cid % self.capacity as u64) as usize
    }

    // ---- generic add/next/remove/available/count surface ----

    /// Writes at `newest_cid mod N`; fails [`AtError::BufferFull`] if
    /// occupied and `overwrite` is false. Advances `newest_cid`.
    pub fn add(&mut self, entry: AtEntry, overwrite: bool) -> Result<(), AtError> {
        let idx = self.index_of(self.newest_cid);
        if self.slots[idx].is_some() && !overwrite {
            return Err(AtError::BufferFull);
        }
        if self.slots[idx].is_none() {
            self.count += 1;
        }
        self.slots[idx] = Some(Slot {
            cid: self.newest_cid,
            entry,
        });
        self.newest_cid += 1;
        Ok(())
    }

    /// Pops `oldest_cid`'s slot if occupied; otherwise advances
    /// `oldest_cid` past vacant slots until one is found or the window
    /// is empty.
    pub fn next(&mut self) -> Option<(u64, AtEntry)> {
        while self.oldest_cid < self.newest_cid {
            let idx = self.index_of(self.oldest_cid);
            if let Some(slot) = self.slots[idx].take() {
                self.count -= 1;
                let cid = self.oldest_cid;
                self.oldest_cid += 1;
                return Some((cid, slot.entry));
            }
            self.oldest_cid += 1;
        }
        None
    }

    /// Clears `cid mod N` iff that slot currently holds `cid`.
    pub fn remove(&mut self, cid: u64) -> Option<AtEntry> {
        let idx = self.index_of(cid);
        match &self.slots[idx] {
            Some(slot) if slot.cid == cid => {
                let entry = slot.entry;
                self.slots[idx] = None;
                self.count -= 1;
                Some(entry)
            },
            _ => None,
        }
    }

    /// True iff the slot for `cid` is vacant, or holds a different CID.
    pub fn available(&self, cid: u64) -> bool {
        let idx = self.index_of(cid);
        match &self.slots[idx] {
            Some(slot) => slot.cid != cid,
            None => true,
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    // ---- raw index access used directly by the channel engine ----

    pub fn entry_at(&self, idx: usize) -> Option<AtEntry> {
        self.slots[idx].map(|s| s.entry)
    }

    pub fn set_at(&mut self, idx: usize, cid: u64, entry: AtEntry) {
        if self.slots[idx].is_none() {
            self.count += 1;
        }
        self.slots[idx] = Some(Slot { cid, entry });
    }

    /// Overwrites the entry at `idx` in place, keeping its current CID
    /// tag. Used when a retransmit reuses the original CID.
    pub fn update_at(&mut self, idx: usize, entry: AtEntry) {
        if let Some(slot) = &mut self.slots[idx] {
            slot.entry = entry;
        }
    }

    pub fn vacate_at(&mut self, idx: usize) -> Option<AtEntry> {
        match self.slots[idx].take() {
            Some(slot) => {
                self.count -= 1;
                Some(slot.entry)
            },
            None => None,
        }
    }

    pub fn is_occupied_at(&self, idx: usize) -> bool {
        self.slots[idx].is_some()
    }
}
