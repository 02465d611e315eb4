// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

pub use crate::cfg::enums::{CipherSuite, WrapResponse};
use crate::error::BpError;

/// Default `WRAP_TIMEOUT`: how long `load()` waits on the active
/// table's condvar before re-checking, in both `RESEND` and `BLOCK`
/// wrap policies (spec.md §5).
pub const WRAP_TIMEOUT_MS: u64 = 1000;

/// The eleven options of spec.md §6's configuration table, plus the
/// range-set/active-table sizing knobs a channel needs at `open()`
/// time. Loaded from YAML the way the teacher's `Config` was, and
/// mutated at runtime through [`ConfigOption`] the way spec.md's single
/// `config(channel, mode, opt, &val, len)` surface does.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelAttributes {
    /// Seconds until a bundle header is considered expired; `0` never.
    pub lifetime: u64,
    /// Set CTEB on outgoing bundles.
    pub request_custody: bool,
    /// Tag outgoing bundles as administrative records.
    pub admin_record: bool,
    /// Include a BIB on outgoing bundles.
    pub integrity_check: bool,
    /// Permit the fragmentation-permitted bit in outgoing headers.
    pub allow_fragmentation: bool,
    /// BIB cipher-suite index.
    pub cipher_suite: CipherSuite,
    /// Retransmit timeout in seconds; `0` disables retransmission.
    pub timeout: u64,
    /// Maximum emitted bundle length in bytes; `0` disables the check.
    pub max_length: usize,
    /// Active-table wrap policy.
    pub wrap_response: WrapResponse,
    /// Reuse the original CID on retransmit instead of assigning a new one.
    pub cid_reuse: bool,
    /// Seconds between forced ACS emissions; `0` disables the timer.
    pub dacs_rate: u64,
    /// Active table capacity (`N` in spec.md §4.2).
    pub active_table_size: usize,
    /// Range-set size that triggers an ACS emission.
    pub max_gaps_per_dacs: usize,
    /// Per-ACS-record budget on emitted fill SDNVs.
    pub max_fills_per_dacs: usize,
    /// Whether the cached primary-block template is still valid. Any
    /// setter on this struct clears it, forcing `store()` to rebuild it
    /// (spec.md §6, "setting any option clears `prebuilt`").
    #[serde(skip)]
    pub prebuilt: bool,
}

impl Default for ChannelAttributes {
    fn default() -> Self {
        Self {
            lifetime: 3600,
            request_custody: true,
            admin_record: false,
            integrity_check: false,
            allow_fragmentation: false,
            cipher_suite: CipherSuite::default(),
            timeout: 10,
            max_length: 0,
            wrap_response: WrapResponse::default(),
            cid_reuse: false,
            dacs_rate: 0,
            active_table_size: 64,
            max_gaps_per_dacs: 16,
            max_fills_per_dacs: 64,
            prebuilt: false,
        }
    }
}

/// The configuration surface spec.md §6 describes as a single
/// `config(channel, mode, opt, &val, len)` entry point, re-expressed as
/// one enum per option plus typed getter/setter methods below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOption {
    Lifetime(u64),
    RequestCustody(bool),
    AdminRecord(bool),
    IntegrityCheck(bool),
    AllowFragmentation(bool),
    CipherSuite(CipherSuite),
    Timeout(u64),
    MaxLength(usize),
    WrapResponse(WrapResponse),
    CidReuse(bool),
    DacsRate(u64),
    ActiveTableSize(usize),
    MaxGapsPerDacs(usize),
    MaxFillsPerDacs(usize),
}

impl ChannelAttributes {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let attrs: Self =
            serde_yaml::from_str(&text).context("failed to parse channel attributes YAML")?;
        attrs.validate()?;
        Ok(attrs)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.active_table_size > 0, "active_table_size must be >= 1");
        ensure!(self.max_gaps_per_dacs > 0, "max_gaps_per_dacs must be >= 1");
        ensure!(
            self.max_fills_per_dacs > 0,
            "max_fills_per_dacs must be >= 1"
        );
        Ok(())
    }

    /// Applies one option, validating ranges per the Design Notes'
    /// "strict reimplementation" open-question resolution (spec.md §9,
    /// open question (b)): a negative/zero-where-invalid value is
    /// rejected with [`BpError::ParmErr`] instead of silently accepted,
    /// which is the permissive behavior of the original C library.
    pub fn set(&mut self, opt: ConfigOption) -> Result<(), BpError> {
        match opt {
            ConfigOption::Lifetime(v) => self.lifetime = v,
            ConfigOption::RequestCustody(v) => self.request_custody = v,
            ConfigOption::AdminRecord(v) => self.admin_record = v,
            ConfigOption::IntegrityCheck(v) => self.integrity_check = v,
            ConfigOption::AllowFragmentation(v) => self.allow_fragmentation = v,
            ConfigOption::CipherSuite(v) => self.cipher_suite = v,
            ConfigOption::Timeout(v) => self.timeout = v,
            ConfigOption::MaxLength(v) => self.max_length = v,
            ConfigOption::WrapResponse(v) => self.wrap_response = v,
            ConfigOption::CidReuse(v) => self.cid_reuse = v,
            ConfigOption::DacsRate(v) => self.dacs_rate = v,
            ConfigOption::ActiveTableSize(v) => {
                if v == 0 {
                    return Err(BpError::ParmErr("active_table_size must be >= 1".into()));
                }
                self.active_table_size = v;
            },
            ConfigOption::MaxGapsPerDacs(v) => {
                if v == 0 {
                    return Err(BpError::ParmErr("max_gaps_per_dacs must be >= 1".into()));
                }
                self.max_gaps_per_dacs = v;
            },
            ConfigOption::MaxFillsPerDacs(v) => {
                if v == 0 {
                    return Err(BpError::ParmErr("max_fills_per_dacs must be >= 1".into()));
                }
                self.max_fills_per_dacs = v;
            },
        }
        self.prebuilt = false;
        Ok(())
    }
}
