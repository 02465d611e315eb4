// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// `WRAP_RESPONSE` policy (spec.md §6/§4.4.3): what `load()` does when
/// the active table's window is full and a new bundle is ready to send.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapResponse {
    /// Evict the oldest outstanding entry and resend it immediately.
    #[serde(rename = "RESEND", alias = "resend", alias = "Resend")]
    #[default]
    Resend,
    /// Wait on the wrap condvar and return `OVERFLOW` if it times out.
    #[serde(rename = "BLOCK", alias = "block", alias = "Block")]
    Block,
    /// Evict the oldest outstanding entry, relinquish it, and count it lost.
    #[serde(rename = "DROP", alias = "drop", alias = "Drop")]
    Drop,
}

impl fmt::Display for WrapResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WrapResponse::Resend => "RESEND",
            WrapResponse::Block => "BLOCK",
            WrapResponse::Drop => "DROP",
        })
    }
}

/// `CIPHER_SUITE`: an opaque integer index selecting a BIB cipher suite.
/// spec.md's Non-goals keep actual cipher-suite *selection* outside this
/// crate's custody engine; this type only carries the configured index
/// through to the BIB encoder.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct CipherSuite(u32);

impl CipherSuite {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn from_u32(index: u32) -> Self {
        Self(index)
    }
}
