// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Arc;

use bp6_custody::{
    cfg::config::ChannelAttributes,
    channel::Channel,
    eid::Eid,
    os::FakeClock,
    storage::StorageHandles,
};

/// Opens a channel against a fresh in-memory storage triple and a
/// [`FakeClock`] pinned at `t=0`, the harness every integration test in
/// this module builds on instead of a live radio link.
pub fn open_channel(route: Eid, attrs: ChannelAttributes) -> (Channel, Arc<FakeClock>) {
    let clock = Arc::new(FakeClock::new(0));
    let channel = Channel::open(route, StorageHandles::in_memory(), attrs, clock.clone())
        .expect("channel::open with valid attributes must not fail");
    (channel, clock)
}
