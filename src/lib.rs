// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Local certificate authority and leaf certificate issuance for development
//! TLS.
//!
//! ```rust,no_run
//! use localca::{CertificateAuthority, Config, LeafCertificateRequest, LeafIssuer, Paths};
//!
//! let paths = Paths::new()?;
//! let config = Config::load(&paths.config)?;
//! let ca = CertificateAuthority::bootstrap(&paths, &config)?;
//!
//! let request = LeafCertificateRequest::new("test.local")
//!     .with_sans(["test.local", "127.0.0.1"])
//!     .with_validity_days(config.cert_days);
//! let (issued, files) = LeafIssuer::new(&ca).issue_to(&request, std::path::Path::new("."), false)?;
//! println!("serial {} -> {}", issued.serial, files.cert.display());
//! # Ok::<(), localca::Error>(())
//! ```

/// External ACME client integration.
pub mod acme;
/// Certificate Authority bootstrap and serial allocation.
pub mod ca;
/// Leaf certificate requests and issuance.
pub mod cert;
/// Configuration handling.
pub mod config;
/// Error types.
pub mod error;
/// Filesystem utilities.
pub mod fs;
/// RSA key generation.
pub mod keys;
/// Subject Alternative Name classification.
pub mod san;
/// Persisted serial counter.
pub mod serial;
/// Tracing setup for the binary.
pub mod telemetry;
/// Trust-store instructions for the CA certificate.
pub mod trust;
/// X.509 certificate parsing.
pub mod x509;

pub use acme::{AcmeClient, AcmeRequest};
pub use ca::{CaState, CertificateAuthority};
pub use cert::{
    validate_days, IssuanceStage, IssuedCertificate, LeafCertificateRequest, LeafIssuer,
    OutputPaths, LOCALHOST_IPS, MAX_CERT_DAYS,
};
pub use config::{CaSubject, Config, Paths, SubjectFields};
pub use error::{Error, ErrorKind, Result};
pub use fs::{is_reserved_name, RESERVED_NAMES};
pub use keys::{MAX_KEY_BITS, MIN_KEY_BITS};
pub use san::{classify_san, SanKind, SubjectAltName};
pub use x509::{parse_cert_file, parse_cert_pem, verify_issued_by, CertInfo};
