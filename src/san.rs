// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Subject Alternative Name classification.
//!
//! An entry only becomes an IP SAN when it is structurally an address.
//! Loose matching would turn strings like `999.999.999.999` into a malformed
//! IP entry that breaks certificate parsing downstream.

use crate::error::{Error, Result};
use rcgen::SanType;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Maximum DNS name length per RFC 1035
pub const MAX_DNS_NAME_LENGTH: usize = 253;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanKind {
    Dns,
    Ipv4,
    Ipv6,
}

/// Classify a SAN entry as a DNS name or an IP literal.
pub fn classify_san(entry: &str) -> SanKind {
    SubjectAltName::classify(entry).kind()
}

/// A classified SAN entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltName {
    Dns(String),
    Ip(IpAddr),
}

impl SubjectAltName {
    pub fn classify(entry: &str) -> Self {
        if let Some(v4) = parse_dotted_quad(entry) {
            return SubjectAltName::Ip(IpAddr::V4(v4));
        }
        if let Some(v6) = parse_ipv6_literal(entry) {
            return SubjectAltName::Ip(IpAddr::V6(v6));
        }
        SubjectAltName::Dns(entry.to_string())
    }

    pub fn kind(&self) -> SanKind {
        match self {
            SubjectAltName::Dns(_) => SanKind::Dns,
            SubjectAltName::Ip(IpAddr::V4(_)) => SanKind::Ipv4,
            SubjectAltName::Ip(IpAddr::V6(_)) => SanKind::Ipv6,
        }
    }

    pub(crate) fn to_san_type(&self) -> Result<SanType> {
        match self {
            SubjectAltName::Ip(ip) => Ok(SanType::IpAddress(*ip)),
            SubjectAltName::Dns(name) => Ok(SanType::DnsName(name.clone().try_into().map_err(
                |_| Error::InvalidDomain {
                    domain: name.clone(),
                    reason: "Invalid DNS name".into(),
                },
            )?)),
        }
    }
}

impl fmt::Display for SubjectAltName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectAltName::Dns(name) => write!(f, "DNS:{}", name),
            SubjectAltName::Ip(ip) => write!(f, "IP:{}", ip),
        }
    }
}

/// Check that a DNS-classified entry can be encoded in a certificate.
pub fn validate_dns_name(name: &str) -> Result<()> {
    let reject = |reason: String| {
        Err(Error::InvalidDomain {
            domain: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return reject("name cannot be empty".into());
    }
    if name.len() > MAX_DNS_NAME_LENGTH {
        return reject(format!(
            "DNS name exceeds maximum length of {} characters",
            MAX_DNS_NAME_LENGTH
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii() || c.is_ascii_whitespace() || c.is_ascii_control())
    {
        return reject(format!("invalid character {:?}", c));
    }
    Ok(())
}

/// Four dot-separated groups of 1-3 ASCII digits, each at most 255.
fn parse_dotted_quad(s: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut groups = s.split('.');

    for octet in octets.iter_mut() {
        let group = groups.next()?;
        if group.is_empty() || group.len() > 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // At most three digits, so this cannot overflow u16
        let value: u16 = group.parse().ok()?;
        *octet = u8::try_from(value).ok()?;
    }

    if groups.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

/// A valid IPv6 literal, optionally followed by a `%zone` suffix that is
/// dropped (zones have no meaning inside a certificate).
///
/// The zone must be a plain interface name or index.
fn parse_ipv6_literal(s: &str) -> Option<Ipv6Addr> {
    let address = match s.split_once('%') {
        Some((address, zone)) if is_valid_zone(zone) => address,
        Some(_) => return None,
        None => s,
    };
    address.parse::<Ipv6Addr>().ok()
}

fn is_valid_zone(zone: &str) -> bool {
    !zone.is_empty()
        && zone
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'))
}
