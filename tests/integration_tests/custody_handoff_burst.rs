// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bp6_custody::{cfg::config::ChannelAttributes, eid::Eid, error::{BpError, ProcessFlags}};

use crate::integration_tests::common::open_channel;

/// Five custody bundles handed off A -> B in one burst, acknowledged by
/// a single aggregated ACS record (spec.md §8 scenario 6's shape, but
/// driven end to end through `store`/`load`/`process`/`accept` instead
/// of poking the ACS engine directly).
#[tokio::test]
async fn burst_of_bundles_acknowledged_by_one_acs_record() {
    let (a, _clock_a) = open_channel(
        Eid::new(1, 0),
        ChannelAttributes {
            request_custody: true,
            active_table_size: 16,
            ..Default::default()
        },
    );
    let (b, _clock_b) = open_channel(
        Eid::new(2, 0),
        ChannelAttributes {
            max_gaps_per_dacs: 5,
            ..Default::default()
        },
    );
    let mut flags = ProcessFlags::empty();

    let mut wires = Vec::new();
    for i in 0..5u8 {
        a.store(bytes::Bytes::from(vec![i; 4]), None, &mut flags)
            .await
            .unwrap();
        wires.push(a.load(0, None, &mut flags).await.unwrap());
    }
    assert_eq!(a.latchstats().await.active, 5);

    for wire in &wires {
        let status = b.process(wire, &mut flags).await;
        assert_eq!(status, Err(BpError::PendingCustodyTransfer));
    }
    for i in 0..5u8 {
        let payload = b.accept(Some(0), &mut flags).await.unwrap();
        assert_eq!(&payload[..], &[i; 4]);
    }

    // The five CIDs are sequential, so `RangeSet::insert` merges them
    // into a single range at insert time: `range_set.size()` never
    // reaches `max_gaps_per_dacs`, and `dacs_rate` defaults to 0, so
    // nothing crosses `should_emit`'s threshold on its own. Force the
    // emission explicitly instead of waiting on it, and bound `load`
    // with a real timeout rather than blocking forever on an empty
    // `bundle_store`.
    b.flush().await;
    let acs_wire = b.load(0, Some(0), &mut flags).await.unwrap();
    assert!(b.load(0, Some(0), &mut flags).await.is_err());

    let status = a.process(&acs_wire, &mut flags).await;
    assert_eq!(status, Err(BpError::PendingAcknowledgment));

    let stats = a.latchstats().await;
    assert_eq!(stats.stats.acknowledged, 5);
    assert_eq!(stats.active, 0);
}
