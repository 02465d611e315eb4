// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bp6_custody::{cfg::config::ChannelAttributes, eid::Eid, error::{BpError, ProcessFlags}};

use crate::integration_tests::common::open_channel;

/// `DACS_RATE` forces an ACS emission even with a single pending CID,
/// well under `max_gaps_per_dacs` (spec.md §4.3's "or `dacs_rate`
/// seconds have elapsed" threshold, driven through the channel's own
/// clock rather than the ACS engine directly).
#[tokio::test]
async fn dacs_rate_forces_emission_below_the_gap_threshold() {
    let (b, clock_b) = open_channel(
        Eid::new(5, 0),
        ChannelAttributes {
            max_gaps_per_dacs: 100,
            dacs_rate: 5,
            ..Default::default()
        },
    );
    let mut flags = ProcessFlags::empty();

    let (a, _clock_a) = open_channel(
        Eid::new(6, 0),
        ChannelAttributes {
            request_custody: true,
            ..Default::default()
        },
    );
    a.store(bytes::Bytes::from_static(b"lonely"), None, &mut flags)
        .await
        .unwrap();
    let wire = a.load(0, None, &mut flags).await.unwrap();

    let status = b.process(&wire, &mut flags).await;
    assert_eq!(status, Err(BpError::PendingCustodyTransfer));

    // Below max_gaps_per_dacs, so no ACS yet.
    assert!(b.load(0, Some(0), &mut flags).await.is_err());

    clock_b.advance(6);
    let acs_wire = b.load(0, None, &mut flags).await.unwrap();

    let ack_status = a.process(&acs_wire, &mut flags).await;
    assert_eq!(ack_status, Err(BpError::PendingAcknowledgment));
    assert_eq!(a.latchstats().await.stats.acknowledged, 1);
}
