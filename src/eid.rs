// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Endpoint ID text format (spec.md §6, GLOSSARY): `"ipn:<node>.<service>"`.

use std::{fmt, str::FromStr};

use crate::error::BpError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Eid {
    pub node: u64,
    pub service: u64,
}

impl Eid {
    pub fn new(node: u64, service: u64) -> Self {
        Self { node, service }
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipn:{}.{}", self.node, self.service)
    }
}

impl FromStr for Eid {
    type Err = BpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BpError::InvalidEid(s.to_string());

        let rest = s.strip_prefix("ipn:").ok_or_else(invalid)?;
        let (node_s, service_s) = rest.split_once('.').ok_or_else(invalid)?;
        let node: u64 = node_s.parse().map_err(|_| invalid())?;
        let service: u64 = service_s.parse().map_err(|_| invalid())?;
        Ok(Eid { node, service })
    }
}

impl TryFrom<&str> for Eid {
    type Error = BpError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_eid() {
        let eid: Eid = "ipn:12.34".parse().unwrap();
        assert_eq!(eid, Eid::new(12, 34));
    }

    #[test]
    fn display_round_trips_parse() {
        let eid = Eid::new(7, 1);
        let text = eid.to_string();
        assert_eq!(text, "ipn:7.1");
        assert_eq!(text.parse::<Eid>().unwrap(), eid);
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!("12.34".parse::<Eid>().is_err());
    }

    #[test]
    fn rejects_missing_service() {
        assert!("ipn:12".parse::<Eid>().is_err());
    }

    #[test]
    fn rejects_non_numeric_parts() {
        assert!("ipn:a.b".parse::<Eid>().is_err());
    }
}
