// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bp6_custody::{block, cfg::{config::ChannelAttributes, enums::WrapResponse}, eid::Eid, error::ProcessFlags};

use crate::integration_tests::common::open_channel;

/// `WRAP_RESPONSE = RESEND` variant of spec.md §8 scenario 5: instead of
/// dropping the oldest outstanding bundle when the active table is
/// full, the channel resends it under a fresh CID. Real-time: this
/// exercises the genuine `WRAP_TIMEOUT_MS` condvar wait (spec.md §4.4.3),
/// so it takes on the order of one second.
#[tokio::test]
async fn wrap_resend_retransmits_oldest_under_a_new_cid() {
    let (ch, _clock) = open_channel(
        Eid::new(4, 0),
        ChannelAttributes {
            request_custody: true,
            active_table_size: 1,
            wrap_response: WrapResponse::Resend,
            ..Default::default()
        },
    );
    let mut flags = ProcessFlags::empty();

    ch.store(bytes::Bytes::from_static(b"only-slot"), None, &mut flags)
        .await
        .unwrap();
    let first = ch.load(0, None, &mut flags).await.unwrap();
    let mut pflags = ProcessFlags::empty();
    assert_eq!(block::decode(&first, &mut pflags).unwrap().cid, Some(1));

    ch.store(bytes::Bytes::from_static(b"displaced"), None, &mut flags)
        .await
        .unwrap();

    // The table has exactly one slot and it's still occupied by CID 1,
    // so load() must resend that bundle under CID 2 rather than
    // returning the freshly stored "displaced" bundle.
    let second = ch.load(0, None, &mut flags).await.unwrap();
    let decoded = block::decode(&second, &mut pflags).unwrap();
    assert_eq!(decoded.cid, Some(2));
    assert_eq!(decoded.bundle.payload, bytes::Bytes::from_static(b"only-slot"));

    let stats = ch.latchstats().await;
    assert_eq!(stats.stats.retransmitted, 1);
    assert_eq!(stats.active, 1);
}
