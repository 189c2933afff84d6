// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::ca::CertificateAuthority;
use crate::config::{Paths, SubjectFields};
use crate::error::{Error, Result};
use crate::fs::{ensure_dir, is_reserved_name, write_all_or_nothing, PendingWrite, Visibility};
use crate::keys::{generate_rsa_key_pair, validate_key_bits};
use crate::san::{validate_dns_name, SubjectAltName};
use rcgen::{CertificateParams, ExtendedKeyUsagePurpose, KeyUsagePurpose, SerialNumber};
use std::fmt;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Maximum certificate validity period (10 years).
pub const MAX_CERT_DAYS: u32 = 3650;

/// Default leaf validity.
pub const DEFAULT_LEAF_DAYS: u32 = 365;

/// Default leaf RSA key size.
pub const DEFAULT_LEAF_KEY_BITS: u32 = 2048;

/// SAN entries added to localhost certificates besides the CN.
pub const LOCALHOST_IPS: &[&str] = &["127.0.0.1", "::1"];

/// Validate that the validity period is within allowed bounds.
///
/// # Errors
/// Returns an error if `days` is 0 or exceeds [`MAX_CERT_DAYS`].
pub fn validate_days(days: u32) -> Result<()> {
    if days == 0 {
        return Err(Error::InvalidDays("days cannot be 0".into()));
    }
    if days > MAX_CERT_DAYS {
        return Err(Error::InvalidDays(format!(
            "days cannot exceed {} (10 years)",
            MAX_CERT_DAYS
        )));
    }
    Ok(())
}

/// Check if a certificate with the given validity will outlive the CA.
fn check_ca_expiry_warning(ca: &CertificateAuthority, days: u32) -> Option<String> {
    ca.days_remaining().ok().and_then(|ca_days_remaining| {
        if (days as i64) > ca_days_remaining {
            Some(format!(
                "Certificate validity ({} days) exceeds CA's remaining validity ({} days). \
                 The certificate will become invalid when the CA expires.",
                days, ca_days_remaining
            ))
        } else {
            None
        }
    })
}

/// What a leaf certificate should contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCertificateRequest {
    /// Primary hostname, placed in the subject CN and as the first SAN.
    pub common_name: String,
    /// Additional SAN entries in the order they should appear.
    pub subject_alt_names: Vec<String>,
    pub validity_days: u32,
    pub key_bits: u32,
    /// Subject attributes placed next to the CN.
    pub subject: SubjectFields,
}

impl LeafCertificateRequest {
    pub fn new(common_name: impl Into<String>) -> Self {
        Self {
            common_name: common_name.into(),
            subject_alt_names: Vec::new(),
            validity_days: DEFAULT_LEAF_DAYS,
            key_bits: DEFAULT_LEAF_KEY_BITS,
            subject: SubjectFields::default(),
        }
    }

    /// CN `localhost` with the loopback addresses as SANs.
    pub fn localhost() -> Self {
        Self::new("localhost").with_sans(LOCALHOST_IPS.iter().copied())
    }

    pub fn with_san(mut self, entry: impl Into<String>) -> Self {
        self.subject_alt_names.push(entry.into());
        self
    }

    pub fn with_sans<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subject_alt_names
            .extend(entries.into_iter().map(Into::into));
        self
    }

    pub fn with_validity_days(mut self, days: u32) -> Self {
        self.validity_days = days;
        self
    }

    pub fn with_key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn with_subject(mut self, subject: SubjectFields) -> Self {
        self.subject = subject;
        self
    }

    /// Reject requests that cannot produce a usable certificate.
    ///
    /// Runs before any key is generated or serial consumed.
    pub fn validate(&self) -> Result<()> {
        if self.common_name.trim().is_empty() {
            return Err(Error::EmptyCommonName);
        }
        validate_days(self.validity_days)?;
        validate_key_bits(self.key_bits)?;
        self.subject.validate()?;

        for entry in std::iter::once(&self.common_name).chain(&self.subject_alt_names) {
            if let SubjectAltName::Dns(name) = SubjectAltName::classify(entry) {
                validate_dns_name(&name)?;
            }
        }
        Ok(())
    }

    /// SAN entries in certificate order.
    ///
    /// The CN always comes first, exactly as given. Request entries follow
    /// in order; only entries identical to the CN are skipped, other
    /// duplicates are kept.
    pub fn resolved_sans(&self) -> Vec<SubjectAltName> {
        std::iter::once(&self.common_name)
            .chain(
                self.subject_alt_names
                    .iter()
                    .filter(|entry| **entry != self.common_name),
            )
            .map(|entry| SubjectAltName::classify(entry))
            .collect()
    }
}

/// Progress of a single issuance, reported in trace events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceStage {
    Requested,
    KeyGenerated,
    SansClassified,
    Signed,
    Persisted,
}

impl fmt::Display for IssuanceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IssuanceStage::Requested => "requested",
            IssuanceStage::KeyGenerated => "key-generated",
            IssuanceStage::SansClassified => "sans-classified",
            IssuanceStage::Signed => "signed",
            IssuanceStage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// A signed leaf certificate with its private key.
pub struct IssuedCertificate {
    pub serial: u64,
    /// The certificate in PEM format.
    pub cert_pem: String,
    /// The private key in PEM format.
    pub key_pem: String,
    pub common_name: String,
    /// SAN entries in certificate order.
    pub subject_alt_names: Vec<SubjectAltName>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    /// Set if the certificate outlives the CA.
    pub warning: Option<String>,
}

impl fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("serial", &self.serial)
            .field("common_name", &self.common_name)
            .field("subject_alt_names", &self.subject_alt_names)
            .field("not_after", &self.not_after)
            .finish_non_exhaustive()
    }
}

impl IssuedCertificate {
    /// SAN list rendered the way certificate dumps show it:
    /// `DNS:test.local, IP:127.0.0.1`.
    pub fn san_summary(&self) -> String {
        self.subject_alt_names
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Write key and certificate to `outputs` as one unit.
    pub fn save(&self, outputs: &OutputPaths) -> Result<()> {
        write_all_or_nothing(&[
            PendingWrite {
                path: &outputs.key,
                contents: self.key_pem.as_bytes(),
                visibility: Visibility::Secret,
            },
            PendingWrite {
                path: &outputs.cert,
                contents: self.cert_pem.as_bytes(),
                visibility: Visibility::Public,
            },
        ])
    }
}

/// Where a leaf's certificate and key are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl OutputPaths {
    /// `<dir>/<name>.crt` and `<dir>/<name>.key`.
    pub fn for_name(dir: &Path, name: &str) -> Result<Self> {
        // Prevent overwriting the CA's own files
        if is_reserved_name(name) {
            return Err(Error::ReservedName(name.to_string()));
        }
        Ok(Self {
            cert: Paths::cert_file(dir, name)?,
            key: Paths::key_file(dir, name)?,
        })
    }

    fn existing(&self) -> Option<&Path> {
        [&self.cert, &self.key]
            .into_iter()
            .find(|p| p.exists())
            .map(PathBuf::as_path)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Issues leaf certificates signed by a [`CertificateAuthority`].
pub struct LeafIssuer<'a> {
    ca: &'a CertificateAuthority,
}

impl<'a> LeafIssuer<'a> {
    pub fn new(ca: &'a CertificateAuthority) -> Self {
        Self { ca }
    }

    /// Generate a key and a CA-signed certificate for `request`.
    ///
    /// Nothing is written to disk. A request that fails validation consumes
    /// no serial.
    pub fn issue(&self, request: &LeafCertificateRequest) -> Result<IssuedCertificate> {
        request.validate()?;
        let cn = request.common_name.as_str();
        tracing::debug!(stage = %IssuanceStage::Requested, cn, "issuing leaf certificate");

        let key_pair = generate_rsa_key_pair(request.key_bits)?;
        tracing::debug!(stage = %IssuanceStage::KeyGenerated, cn, bits = request.key_bits);

        let sans = request.resolved_sans();
        let san_types = sans
            .iter()
            .map(SubjectAltName::to_san_type)
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(stage = %IssuanceStage::SansClassified, cn, sans = sans.len());

        let issuer = self.ca.issuer()?;
        let warning = check_ca_expiry_warning(self.ca, request.validity_days);
        let serial = self.ca.next_serial()?;

        // X.509 times have second precision
        let now = OffsetDateTime::now_utc();
        let now = now.replace_nanosecond(0).unwrap_or(now);
        let not_after = now + time::Duration::days(request.validity_days as i64);

        let mut params = CertificateParams::default();
        params.distinguished_name = request.subject.to_distinguished_name(cn);
        params.subject_alt_names = san_types;
        params.serial_number = Some(SerialNumber::from(serial));
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.not_before = now;
        params.not_after = not_after;

        let cert = params.signed_by(&key_pair, &issuer)?;
        tracing::info!(stage = %IssuanceStage::Signed, cn, serial, "leaf certificate signed");

        Ok(IssuedCertificate {
            serial,
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
            common_name: request.common_name.clone(),
            subject_alt_names: sans,
            not_before: now,
            not_after,
            warning,
        })
    }

    /// Issue and write `<cn>.key` (0600) and `<cn>.crt` into `out_dir`.
    pub fn issue_to(
        &self,
        request: &LeafCertificateRequest,
        out_dir: &Path,
        overwrite: bool,
    ) -> Result<(IssuedCertificate, OutputPaths)> {
        request.validate()?;
        let outputs = OutputPaths::for_name(out_dir, &request.common_name)?;
        let issued = self.issue_into(request, &outputs, overwrite)?;
        Ok((issued, outputs))
    }

    /// Issue and write key and certificate to explicit paths.
    ///
    /// Existing outputs are refused before any work unless `overwrite` is
    /// set. If writing fails after signing, the error is
    /// [`Error::Unpersisted`] carrying the consumed serial.
    pub fn issue_into(
        &self,
        request: &LeafCertificateRequest,
        outputs: &OutputPaths,
        overwrite: bool,
    ) -> Result<IssuedCertificate> {
        request.validate()?;

        let ca_paths = self.ca.paths();
        for target in [&outputs.cert, &outputs.key] {
            if [&ca_paths.ca_cert, &ca_paths.ca_key, &ca_paths.ca_serial]
                .into_iter()
                .any(|ca_file| same_file(target, ca_file))
            {
                return Err(Error::ReservedName(target.display().to_string()));
            }
        }

        if !overwrite {
            if let Some(existing) = outputs.existing() {
                return Err(Error::OutputExists(existing.to_path_buf()));
            }
        }
        for parent in [&outputs.cert, &outputs.key]
            .into_iter()
            .filter_map(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
        {
            ensure_dir(parent)?;
        }

        let issued = self.issue(request)?;
        issued.save(outputs).map_err(|e| Error::Unpersisted {
            serial: issued.serial,
            source: Box::new(e),
        })?;

        tracing::info!(
            stage = %IssuanceStage::Persisted,
            serial = issued.serial,
            cert = %outputs.cert.display(),
            key = %outputs.key.display(),
            "leaf certificate written"
        );
        Ok(issued)
    }
}
