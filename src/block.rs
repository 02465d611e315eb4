// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Minimal BPv6 block codec (spec.md §1 names the bit-level primary/
//! payload/CTEB/BIB encoders as external collaborators; a standalone
//! crate has no translation unit to link against for them, so this
//! module supplies a real, if deliberately small, subset per
//! SPEC_FULL.md §6).
//!
//! One format choice departs from a straight SDNV encoding: the CTEB's
//! CID field is a fixed 8-byte big-endian integer rather than an SDNV.
//! spec.md §4.4.3 requires rewriting a bundle's CID in place on
//! retransmit without re-encoding the whole bundle; a fixed-width field
//! makes that rewrite a constant-size splice instead of a variable-
//! length re-layout that could shift every byte after it. Since spec.md
//! §1 explicitly puts the CTEB's bit-level encoding out of scope, this
//! is free territory — the SDNV codec itself is still used everywhere
//! else a field doesn't need in-place mutation.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    cfg::enums::CipherSuite,
    eid::Eid,
    error::{BpError, ProcessFlags},
    sdnv,
};

bitflags! {
    /// Primary-block processing flags (spec.md §6's `ALLOW_FRAGMENTATION`,
    /// `REQUEST_CUSTODY`, `ADMIN_RECORD` options, packed into one byte).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BundleFlags: u8 {
        const CUSTODY_REQUESTED       = 0b0000_0001;
        const ADMIN_RECORD            = 0b0000_0010;
        const FRAGMENTATION_PERMITTED = 0b0000_0100;
        const INTEGRITY_CHECK         = 0b0000_1000;
    }
}

const VERSION: u8 = 6;
const BLOCK_TYPE_CTEB: u8 = 0x0A;
const BLOCK_TYPE_BIB: u8 = 0x0B;
const BLOCK_TYPE_PAYLOAD: u8 = 0xFF;
const CTEB_FIXED_LEN: usize = 1 + 8; // block-type byte + u64 BE CID

/// A bundle's header fields plus its payload, independent of where it
/// came from (freshly built by [`encode`] or parsed by [`decode`]).
#[derive(Debug, Clone)]
pub struct Bundle {
    pub destination: Eid,
    pub source: Eid,
    pub creation_secs: u64,
    pub creation_seq: u32,
    /// `0` means "never expires" (spec.md §3).
    pub lifetime: u64,
    pub custody_requested: bool,
    pub admin_record: bool,
    pub fragmentation_permitted: bool,
    pub integrity_check: bool,
    pub cipher_suite: Option<CipherSuite>,
    pub payload: Bytes,
}

/// Result of [`encode`]: the wire bytes plus, when the bundle carries a
/// CTEB, the byte offset of its 8-byte CID field so a retransmit can
/// rewrite it in place.
pub struct EncodedBundle {
    pub bytes: Bytes,
    pub cteb_cid_offset: Option<usize>,
}

/// Result of [`decode`]: the parsed bundle plus the same CID offset,
/// the bundle's total on-wire length, and whether it requests custody
/// (`cteb_cid_offset.is_some()` answers "does `cteboffset != 0`?").
pub struct DecodedBundle {
    pub bundle: Bundle,
    pub cteb_cid_offset: Option<usize>,
    pub cid: Option<u64>,
    pub encoded_len: usize,
}

pub fn encode(bundle: &Bundle) -> EncodedBundle {
    let mut buf = BytesMut::new();

    buf.put_u8(VERSION);
    let mut flags = BundleFlags::empty();
    flags.set(BundleFlags::CUSTODY_REQUESTED, bundle.custody_requested);
    flags.set(BundleFlags::ADMIN_RECORD, bundle.admin_record);
    flags.set(
        BundleFlags::FRAGMENTATION_PERMITTED,
        bundle.fragmentation_permitted,
    );
    flags.set(BundleFlags::INTEGRITY_CHECK, bundle.integrity_check);
    buf.put_u8(flags.bits());

    sdnv::encode(bundle.destination.node, &mut buf);
    sdnv::encode(bundle.destination.service, &mut buf);
    sdnv::encode(bundle.source.node, &mut buf);
    sdnv::encode(bundle.source.service, &mut buf);
    sdnv::encode(bundle.creation_secs, &mut buf);
    sdnv::encode(u64::from(bundle.creation_seq), &mut buf);
    sdnv::encode(bundle.lifetime, &mut buf);

    let mut cteb_cid_offset = None;
    if bundle.custody_requested {
        buf.put_u8(BLOCK_TYPE_CTEB);
        cteb_cid_offset = Some(buf.len());
        buf.put_u64(0); // CID assigned lazily by the channel at load() time
    }

    if bundle.integrity_check {
        buf.put_u8(BLOCK_TYPE_BIB);
        let suite = bundle.cipher_suite.unwrap_or_default();
        sdnv::encode(u64::from(suite.as_u32()), &mut buf);
        let digest = crc32c::crc32c(&bundle.payload);
        sdnv::encode(4, &mut buf);
        buf.put_u32(digest);
    }

    buf.put_u8(BLOCK_TYPE_PAYLOAD);
    sdnv::encode(bundle.payload.len() as u64, &mut buf);
    buf.put_slice(&bundle.payload);

    EncodedBundle {
        bytes: buf.freeze(),
        cteb_cid_offset,
    }
}

pub fn decode(data: &[u8], flags: &mut ProcessFlags) -> Result<DecodedBundle, BpError> {
    let mut cur = data;
    let total_len = data.len();
    let consumed = |cur: &[u8]| total_len - cur.len();

    let version = take_u8(&mut cur)?;
    if version != VERSION {
        return Err(BpError::BundleParseErr(format!(
            "unsupported bundle version {version}"
        )));
    }
    let raw_flags = take_u8(&mut cur)?;
    let bundle_flags = BundleFlags::from_bits_truncate(raw_flags);

    let dest_node = take_sdnv(&mut cur, flags)?;
    let dest_service = take_sdnv(&mut cur, flags)?;
    let src_node = take_sdnv(&mut cur, flags)?;
    let src_service = take_sdnv(&mut cur, flags)?;
    let creation_secs = take_sdnv(&mut cur, flags)?;
    let creation_seq = take_sdnv(&mut cur, flags)? as u32;
    let lifetime = take_sdnv(&mut cur, flags)?;

    let mut cteb_cid_offset = None;
    let mut cid = None;
    let mut cipher_suite = None;

    loop {
        let Some(&block_type) = cur.first() else {
            return Err(BpError::BundleParseErr(
                "bundle ended before payload block".into(),
            ));
        };
        match block_type {
            BLOCK_TYPE_CTEB => {
                let _ = take_u8(&mut cur)?;
                if cur.len() < 8 {
                    return Err(BpError::BundleParseErr("truncated CTEB".into()));
                }
                cteb_cid_offset = Some(consumed(cur));
                cid = Some(cur.get_u64());
            },
            BLOCK_TYPE_BIB => {
                let _ = take_u8(&mut cur)?;
                let suite = take_sdnv(&mut cur, flags)?;
                cipher_suite = Some(CipherSuite::from_u32(suite as u32));
                let digest_len = take_sdnv(&mut cur, flags)? as usize;
                if cur.len() < digest_len {
                    return Err(BpError::BundleParseErr("truncated BIB digest".into()));
                }
                cur.advance(digest_len);
            },
            BLOCK_TYPE_PAYLOAD => {
                let _ = take_u8(&mut cur)?;
                let payload_len = take_sdnv(&mut cur, flags)? as usize;
                if cur.len() < payload_len {
                    return Err(BpError::BundleParseErr("truncated payload".into()));
                }
                let start = total_len - cur.len();
                let payload = Bytes::copy_from_slice(&data[start..start + payload_len]);
                cur.advance(payload_len);

                let bundle = Bundle {
                    destination: Eid::new(dest_node, dest_service),
                    source: Eid::new(src_node, src_service),
                    creation_secs,
                    creation_seq,
                    lifetime,
                    custody_requested: bundle_flags.contains(BundleFlags::CUSTODY_REQUESTED),
                    admin_record: bundle_flags.contains(BundleFlags::ADMIN_RECORD),
                    fragmentation_permitted: bundle_flags
                        .contains(BundleFlags::FRAGMENTATION_PERMITTED),
                    integrity_check: bundle_flags.contains(BundleFlags::INTEGRITY_CHECK),
                    cipher_suite,
                    payload,
                };
                return Ok(DecodedBundle {
                    bundle,
                    cteb_cid_offset,
                    cid,
                    encoded_len: total_len - cur.len(),
                });
            },
            other => {
                return Err(BpError::BundleParseErr(format!(
                    "unknown block type {other:#04x}"
                )));
            },
        }
    }
}

/// Rewrites the 8-byte CID field in place, preserving every other byte
/// and the bundle's total length (spec.md §4.4.3's retransmit/new-entry
/// CID rewrite).
pub fn rewrite_cid(
    bytes: &Bytes,
    cteb_cid_offset: Option<usize>,
    new_cid: u64,
) -> Result<Bytes, BpError> {
    let offset = cteb_cid_offset.ok_or_else(|| {
        BpError::BundleParseErr("bundle does not carry a CTEB to rewrite".into())
    })?;
    if bytes.len() < offset + 8 {
        return Err(BpError::BundleParseErr("CTEB offset out of range".into()));
    }
    let mut buf = BytesMut::from(&bytes[..]);
    buf[offset..offset + 8].copy_from_slice(&new_cid.to_be_bytes());
    Ok(buf.freeze())
}

fn take_u8(cur: &mut &[u8]) -> Result<u8, BpError> {
    if cur.is_empty() {
        return Err(BpError::BundleParseErr("unexpected end of bundle".into()));
    }
    Ok(cur.get_u8())
}

fn take_sdnv(cur: &mut &[u8], flags: &mut ProcessFlags) -> Result<u64, BpError> {
    let (value, consumed) = sdnv::decode(cur, flags);
    if consumed == 0 {
        return Err(BpError::BundleParseErr(
            "incomplete SDNV field in bundle".into(),
        ));
    }
    cur.advance(consumed);
    Ok(value)
}
