// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bp6_custody::{block, cfg::config::ChannelAttributes, eid::Eid, error::ProcessFlags};

use crate::integration_tests::common::open_channel;

/// `cid_reuse = true` variant of spec.md §8 scenario 4: the retransmit
/// keeps its original CID instead of being assigned a fresh one.
#[tokio::test]
async fn retransmit_reuses_original_cid_when_configured() {
    let (ch, clock) = open_channel(
        Eid::new(3, 0),
        ChannelAttributes {
            request_custody: true,
            timeout: 2,
            cid_reuse: true,
            ..Default::default()
        },
    );
    let mut flags = ProcessFlags::empty();

    ch.store(bytes::Bytes::from_static(b"reuse-me"), None, &mut flags)
        .await
        .unwrap();
    let first = ch.load(0, None, &mut flags).await.unwrap();
    let mut pflags = ProcessFlags::empty();
    assert_eq!(block::decode(&first, &mut pflags).unwrap().cid, Some(1));

    clock.advance(3);
    let second = ch.load(0, None, &mut flags).await.unwrap();
    let decoded = block::decode(&second, &mut pflags).unwrap();
    assert_eq!(decoded.cid, Some(1), "cid_reuse must keep the original CID");
    assert_eq!(decoded.bundle.payload, bytes::Bytes::from_static(b"reuse-me"));

    let stats = ch.latchstats().await;
    assert_eq!(stats.stats.retransmitted, 1);
    // `oldest_active_cid` always advances past a retransmit candidate
    // regardless of the reuse decision (spec.md §4.4.3 step 2), so the
    // window collapses to empty even though the slot itself still holds
    // live data under its reused CID — the undercount spec.md's Design
    // Notes open question (a) calls out.
    assert_eq!(stats.active, 0);
}
