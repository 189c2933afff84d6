// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::config::{Config, Paths};
use crate::error::{Error, Result};
use crate::fs::{write_all_or_nothing, LockFile, PendingWrite, Visibility};
use crate::serial::{self, FIRST_SERIAL};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, IsCa, Issuer, KeyPair, KeyUsagePurpose,
    SerialNumber,
};
use std::fs;
use std::path::PathBuf;

/// What is on disk in a CA directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaState {
    /// None of the CA files exist.
    Absent,
    /// Key, certificate and serial counter all exist.
    Complete,
    /// Some files exist and some are missing.
    Partial {
        present: Vec<PathBuf>,
        missing: Vec<PathBuf>,
    },
}

impl CaState {
    pub fn detect(paths: &Paths) -> Self {
        let files = [&paths.ca_key, &paths.ca_cert, &paths.ca_serial];
        let (present, missing): (Vec<&PathBuf>, Vec<&PathBuf>) =
            files.into_iter().partition(|p| p.exists());

        if missing.is_empty() {
            CaState::Complete
        } else if present.is_empty() {
            CaState::Absent
        } else {
            CaState::Partial {
                present: present.into_iter().cloned().collect(),
                missing: missing.into_iter().cloned().collect(),
            }
        }
    }

    fn into_error(self, paths: &Paths) -> Error {
        let reason = match self {
            CaState::Partial { present, missing } => format!(
                "found {} but {} missing",
                join_names(&present),
                join_names(&missing)
            ),
            CaState::Absent => "no CA files".to_string(),
            CaState::Complete => "CA files present".to_string(),
        };
        Error::InconsistentState {
            dir: paths.base.clone(),
            reason,
        }
    }
}

fn join_names(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Local CA: the root key, its self-signed certificate, and the persisted
/// serial counter.
///
/// The private key never leaves this type; leaf signing borrows it through
/// an rcgen `Issuer` built inside the crate.
pub struct CertificateAuthority {
    key_pair: KeyPair,
    cert_pem: String,
    paths: Paths,
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("dir", &self.paths.base)
            .finish_non_exhaustive()
    }
}

impl CertificateAuthority {
    /// Load the CA stored at `paths`, creating it first if the directory holds
    /// no CA at all.
    ///
    /// An existing CA is returned unchanged: no new root, no serial consumed.
    /// A partially written CA is an [`Error::InconsistentState`].
    pub fn bootstrap(paths: &Paths, config: &Config) -> Result<Self> {
        paths.ensure_dir()?;
        let _lock = LockFile::acquire(&paths.ca_lock)?;

        match CaState::detect(paths) {
            CaState::Complete => {
                tracing::info!(dir = %paths.base.display(), "reusing existing CA");
                return Self::read_from(paths);
            }
            CaState::Absent => {}
            partial @ CaState::Partial { .. } => return Err(partial.into_error(paths)),
        }

        config.validate()?;

        tracing::info!(
            dir = %paths.base.display(),
            bits = config.ca_key_bits,
            days = config.ca_days,
            "creating new CA"
        );

        let key_pair = crate::keys::generate_rsa_key_pair(config.ca_key_bits)?;
        let cert = Self::create_ca_cert(&key_pair, config, FIRST_SERIAL)?;
        let cert_pem = cert.pem();
        let key_pem = key_pair.serialize_pem();
        let next_serial = serial::encode(FIRST_SERIAL + 1);

        write_all_or_nothing(&[
            PendingWrite {
                path: &paths.ca_key,
                contents: key_pem.as_bytes(),
                visibility: Visibility::Secret,
            },
            PendingWrite {
                path: &paths.ca_cert,
                contents: cert_pem.as_bytes(),
                visibility: Visibility::Public,
            },
            PendingWrite {
                path: &paths.ca_serial,
                contents: next_serial.as_bytes(),
                visibility: Visibility::Public,
            },
        ])?;

        Ok(Self {
            key_pair,
            cert_pem,
            paths: paths.clone(),
        })
    }

    /// Load an existing CA without ever creating one.
    pub fn load(paths: &Paths) -> Result<Self> {
        if !paths.base.exists() {
            return Err(Error::CaNotInitialized(paths.base.clone()));
        }
        let _lock = LockFile::acquire(&paths.ca_lock)?;

        match CaState::detect(paths) {
            CaState::Complete => Self::read_from(paths),
            CaState::Absent => Err(Error::CaNotInitialized(paths.base.clone())),
            partial @ CaState::Partial { .. } => Err(partial.into_error(paths)),
        }
    }

    fn read_from(paths: &Paths) -> Result<Self> {
        let cert_pem = fs::read_to_string(&paths.ca_cert).map_err(|e| Error::ReadFile {
            path: paths.ca_cert.clone(),
            source: e,
        })?;
        let key_pem = fs::read_to_string(&paths.ca_key).map_err(|e| Error::ReadFile {
            path: paths.ca_key.clone(),
            source: e,
        })?;
        let key_pair = crate::keys::load_key_pair(&key_pem)?;

        // Fail early on a corrupt counter rather than at the first issuance
        serial::read(&paths.ca_serial)?;

        Ok(Self {
            key_pair,
            cert_pem,
            paths: paths.clone(),
        })
    }

    fn create_ca_cert(key_pair: &KeyPair, config: &Config, serial: u64) -> Result<Certificate> {
        let mut params = CertificateParams::default();
        params.distinguished_name = config.ca_subject.to_distinguished_name();
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params.serial_number = Some(SerialNumber::from(serial));

        let now = time::OffsetDateTime::now_utc();
        let now = now.replace_nanosecond(0).unwrap_or(now);
        params.not_before = now;
        params.not_after = now + time::Duration::days(config.ca_days as i64);

        Ok(params.self_signed(key_pair)?)
    }

    /// Hand out the next serial number and persist its successor.
    ///
    /// Holds the CA lock for the read-increment-write, so concurrent callers
    /// in any process get distinct values.
    pub fn next_serial(&self) -> Result<u64> {
        let _lock = LockFile::acquire(&self.paths.ca_lock)?;
        let serial = serial::advance(&self.paths.ca_serial)?;
        tracing::debug!(serial, "allocated serial");
        Ok(serial)
    }

    /// The serial the next issuance will receive.
    pub fn peek_serial(&self) -> Result<u64> {
        let _lock = LockFile::acquire(&self.paths.ca_lock)?;
        serial::read(&self.paths.ca_serial)
    }

    /// Signing handle for leaf certificates.
    ///
    /// Rebuilds the key pair because `Issuer` takes ownership of it.
    pub(crate) fn issuer(&self) -> Result<Issuer<'_, KeyPair>> {
        let key_pair = crate::keys::load_key_pair(&self.key_pair.serialize_pem())?;
        Issuer::from_ca_cert_pem(&self.cert_pem, key_pair).map_err(Error::CertGen)
    }

    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Subject of the root certificate, e.g. `O=localca, CN=localca Development CA`.
    pub fn subject(&self) -> Result<String> {
        Ok(crate::x509::parse_cert_pem(&self.cert_pem)?.subject)
    }

    pub fn days_remaining(&self) -> Result<i64> {
        let info = crate::x509::parse_cert_pem(&self.cert_pem)?;
        Ok(info.days_remaining())
    }
}
