// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Parse X.509 certificates without shelling out to openssl.

use crate::error::{Error, Result};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use x509_parser::prelude::*;

#[derive(Debug, Clone)]
pub struct CertInfo {
    /// Serial number, if it fits in 64 bits.
    pub serial: Option<u64>,
    /// Serial number as uppercase hex without leading zeros.
    pub serial_hex: String,
    pub subject: String,
    pub issuer: String,
    pub common_name: Option<String>,
    /// SAN entries rendered as `DNS:name` or `IP:address`, in certificate order.
    pub subject_alt_names: Vec<String>,
    pub not_before_timestamp: i64,
    pub not_after_timestamp: i64,
    pub is_ca: bool,
    pub key_cert_sign: bool,
    pub crl_sign: bool,
    pub digital_signature: bool,
    pub key_encipherment: bool,
    pub server_auth: bool,
}

impl CertInfo {
    pub fn expiry_string(&self) -> String {
        format_date(self.not_after_timestamp)
    }

    pub fn issued_string(&self) -> String {
        format_date(self.not_before_timestamp)
    }

    pub fn days_remaining(&self) -> i64 {
        let now = ::time::OffsetDateTime::now_utc();
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(expiry) => (expiry - now).whole_days(),
            Err(_) => -1, // Treat invalid timestamps as expired
        }
    }

    pub fn is_expired(&self) -> bool {
        self.days_remaining() < 0
    }

    /// Length of the validity window in whole days.
    pub fn validity_days(&self) -> i64 {
        (self.not_after_timestamp - self.not_before_timestamp) / 86_400
    }

    /// SAN entries joined the way `openssl x509 -text` prints them.
    pub fn san_summary(&self) -> String {
        self.subject_alt_names.join(", ")
    }
}

fn format_date(timestamp: i64) -> String {
    match ::time::OffsetDateTime::from_unix_timestamp(timestamp) {
        Ok(dt) => format!("{}-{:02}-{:02}", dt.year(), dt.month() as u8, dt.day()),
        Err(_) => "Invalid date".to_string(),
    }
}

pub fn parse_cert_file(path: &Path) -> Result<CertInfo> {
    let pem_data = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_cert_pem(&pem_data)
}

/// Decode the first certificate in a PEM bundle to DER.
fn pem_to_der(pem_str: &str) -> Result<Vec<u8>> {
    let pem = ::pem::parse(pem_str)
        .map_err(|e| Error::CertParse(format!("Failed to parse PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE" {
        return Err(Error::CertParse(format!(
            "Expected CERTIFICATE, got {}",
            pem.tag()
        )));
    }
    Ok(pem.into_contents())
}

fn parse_der(der: &[u8]) -> Result<X509Certificate<'_>> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| Error::CertParse(format!("Invalid X.509: {}", e)))?;
    Ok(cert)
}

pub fn parse_cert_pem(pem_str: &str) -> Result<CertInfo> {
    let der = pem_to_der(pem_str)?;
    let cert = parse_der(&der)?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(String::from);

    let (serial, serial_hex) = decode_serial(cert.raw_serial());

    let mut info = CertInfo {
        serial,
        serial_hex,
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        common_name,
        subject_alt_names: Vec::new(),
        not_before_timestamp: cert.validity().not_before.timestamp(),
        not_after_timestamp: cert.validity().not_after.timestamp(),
        is_ca: false,
        key_cert_sign: false,
        crl_sign: false,
        digital_signature: false,
        key_encipherment: false,
        server_auth: false,
    };

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    if let Some(rendered) = render_general_name(name) {
                        info.subject_alt_names.push(rendered);
                    }
                }
            }
            ParsedExtension::BasicConstraints(bc) => {
                info.is_ca = bc.ca;
            }
            ParsedExtension::KeyUsage(ku) => {
                info.key_cert_sign = ku.key_cert_sign();
                info.crl_sign = ku.crl_sign();
                info.digital_signature = ku.digital_signature();
                info.key_encipherment = ku.key_encipherment();
            }
            ParsedExtension::ExtendedKeyUsage(eku) => {
                info.server_auth = eku.server_auth;
            }
            _ => {}
        }
    }

    Ok(info)
}

fn render_general_name(name: &GeneralName<'_>) -> Option<String> {
    match name {
        GeneralName::DNSName(dns) => Some(format!("DNS:{}", dns)),
        GeneralName::IPAddress(bytes) => {
            if let Ok(v4) = <[u8; 4]>::try_from(*bytes) {
                Some(format!("IP:{}", Ipv4Addr::from(v4)))
            } else if let Ok(v6) = <[u8; 16]>::try_from(*bytes) {
                Some(format!("IP:{}", Ipv6Addr::from(v6)))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// DER serials are signed big-endian integers and may carry a leading zero.
fn decode_serial(raw: &[u8]) -> (Option<u64>, String) {
    let start = raw.iter().position(|b| *b != 0).unwrap_or(raw.len());
    let significant = &raw[start..];

    let hex = if significant.is_empty() {
        "00".to_string()
    } else {
        significant.iter().map(|b| format!("{:02X}", b)).collect()
    };

    let value = (significant.len() <= 8)
        .then(|| significant.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)));

    (value, hex)
}

/// Check that `leaf_pem` names the CA in `ca_pem` as issuer and carries a
/// valid signature from the CA key.
pub fn verify_issued_by(leaf_pem: &str, ca_pem: &str) -> Result<()> {
    let leaf_der = pem_to_der(leaf_pem)?;
    let ca_der = pem_to_der(ca_pem)?;
    let leaf = parse_der(&leaf_der)?;
    let ca = parse_der(&ca_der)?;

    if leaf.issuer().as_raw() != ca.subject().as_raw() {
        return Err(Error::Signature(format!(
            "issuer '{}' does not match CA subject '{}'",
            leaf.issuer(),
            ca.subject()
        )));
    }

    leaf.verify_signature(Some(ca.public_key()))
        .map_err(|e| Error::Signature(e.to_string()))
}
