// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Status codes returned by the public channel API (spec.md §6/§7).
//!
//! `BpError` covers the channel-level taxonomy; range-set-local failures
//! use the narrower [`crate::rangeset::RsError`] instead, since a full
//! bundle/storage vocabulary doesn't belong on a bare data structure.

use bitflags::bitflags;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BpError>;

/// Mirrors the caller-visible status codes of spec.md §6.
///
/// `Success` is never constructed as an error; callers that need it use
/// `Ok(n)` with `n` the byte count, matching "status >= 0 on success".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BpError {
    #[error("operation timed out")]
    Timeout,
    #[error("invalid parameter: {0}")]
    ParmErr(String),
    #[error("memory allocation failed")]
    FailedMem,
    #[error("storage operation failed")]
    FailedStore,
    #[error("unexpected or malformed response")]
    FailedResponse,
    #[error("OS shim operation failed")]
    FailedOs,
    #[error("caller buffer too small for bundle ({needed} > {available})")]
    BundleTooLarge { needed: usize, available: usize },
    #[error("caller buffer too small for payload ({needed} > {available})")]
    PayloadTooLarge { needed: usize, available: usize },
    #[error("active table overflow, retry after wrap wait")]
    Overflow,
    #[error("bundle expired before delivery")]
    Expired,
    #[error("bundle carried a pending acknowledgment (ACS)")]
    PendingAcknowledgment,
    #[error("bundle requested custody transfer")]
    PendingCustodyTransfer,
    #[error("failed to parse bundle: {0}")]
    BundleParseErr(String),
    #[error("invalid endpoint id: {0}")]
    InvalidEid(String),
    #[error("{0}")]
    Error(String),
}

bitflags! {
    /// Out-of-band status bits threaded through `load`/`process` calls
    /// (spec.md §7). The C original ORs these into a single flags word
    /// supplied by the caller; here they're an explicit `&mut` parameter.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProcessFlags: u32 {
        /// A storage call failed; the offending SID was relinquished and
        /// its AT slot vacated.
        const STOREFAILURE   = 0b0000_0001;
        /// `systime` failed; processing continued with a stale value.
        const UNRELIABLETIME = 0b0000_0010;
        /// `load` produced a bundle that the caller should route/send.
        const ROUTENEEDED    = 0b0000_0100;
        /// An SDNV field overflowed a `u64` while parsing.
        const OVERFLOW       = 0b0000_1000;
        /// An SDNV field was truncated (ran out of bytes).
        const INCOMPLETE     = 0b0001_0000;
    }
}
