// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bp6_custody::cfg::{config::ChannelAttributes, enums::WrapResponse};

#[test]
fn loads_channel_attributes_from_yaml_fixture() {
    let attrs = ChannelAttributes::load_from_file("tests/fixtures/channel.yaml")
        .expect("fixture must parse");

    assert_eq!(attrs.lifetime, 7200);
    assert!(attrs.request_custody);
    assert!(!attrs.admin_record);
    assert!(attrs.integrity_check);
    assert_eq!(attrs.cipher_suite.as_u32(), 1);
    assert_eq!(attrs.timeout, 5);
    assert_eq!(attrs.max_length, 4096);
    assert_eq!(attrs.wrap_response, WrapResponse::Block);
    assert!(attrs.cid_reuse);
    assert_eq!(attrs.dacs_rate, 30);
    assert_eq!(attrs.active_table_size, 128);
    assert_eq!(attrs.max_gaps_per_dacs, 32);
    assert_eq!(attrs.max_fills_per_dacs, 128);
    assert!(!attrs.prebuilt);
}

#[test]
fn missing_fixture_is_an_error_not_a_panic() {
    assert!(ChannelAttributes::load_from_file("tests/fixtures/does_not_exist.yaml").is_err());
}
