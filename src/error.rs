// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("CA not initialized at {0}. Run 'localca init' first.")]
    CaNotInitialized(PathBuf),

    #[error("Inconsistent CA state in {dir}: {reason}\nRefusing to repair automatically; inspect or remove the CA directory manually.")]
    InconsistentState { dir: PathBuf, reason: String },

    #[error("Corrupt serial file {path}: {reason}")]
    InvalidSerial { path: PathBuf, reason: String },

    #[error("Serial number space exhausted")]
    SerialExhausted,

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{0} already exists. Use --overwrite to replace it.")]
    OutputExists(PathBuf),

    #[error("Certificate {serial} was signed but could not be saved: {source}")]
    Unpersisted { serial: u64, source: Box<Error> },

    #[error("Certificate generation failed: {0}")]
    CertGen(#[from] rcgen::Error),

    #[error("Key generation failed: {0}")]
    KeyGen(String),

    #[error("Failed to parse certificate: {0}")]
    CertParse(String),

    #[error("Signature verification failed: {0}")]
    Signature(String),

    #[error("Common name cannot be empty")]
    EmptyCommonName,

    #[error("Invalid name '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("Invalid validity period: {0}")]
    InvalidDays(String),

    #[error("Invalid key size {bits}: {reason}")]
    InvalidKeyBits { bits: u32, reason: String },

    #[error("'{0}' is a reserved name and cannot be used for certificates")]
    ReservedName(String),

    #[error("Invalid path (non-UTF8): {0}")]
    InvalidPath(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command '{command}' not found.\n{hint}")]
    CommandNotFound { command: String, hint: String },

    #[error("Command failed: {command}\n{stderr}")]
    Command { command: String, stderr: String },
}

/// Coarse classification of an [`Error`], used by callers that only need to
/// know which layer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading or writing CA or leaf files failed.
    Storage,
    /// Key generation, signing, or certificate decoding failed.
    Crypto,
    /// The request or configuration is malformed.
    Validation,
    /// CA files on disk are partial or corrupt. Needs an operator.
    InconsistentState,
    /// An external collaborator process failed.
    External,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Storage => "storage",
            ErrorKind::Crypto => "crypto",
            ErrorKind::Validation => "validation",
            ErrorKind::InconsistentState => "inconsistent state",
            ErrorKind::External => "external",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CaNotInitialized(_)
            | Error::CreateDir { .. }
            | Error::ReadFile { .. }
            | Error::WriteFile { .. }
            | Error::Lock { .. }
            | Error::OutputExists(_)
            | Error::Unpersisted { .. } => ErrorKind::Storage,

            Error::InconsistentState { .. }
            | Error::InvalidSerial { .. }
            | Error::SerialExhausted => ErrorKind::InconsistentState,

            Error::CertGen(_) | Error::KeyGen(_) | Error::CertParse(_) | Error::Signature(_) => {
                ErrorKind::Crypto
            }

            Error::EmptyCommonName
            | Error::InvalidDomain { .. }
            | Error::InvalidDays(_)
            | Error::InvalidKeyBits { .. }
            | Error::ReservedName(_)
            | Error::InvalidPath(_)
            | Error::Config(_) => ErrorKind::Validation,

            Error::CommandNotFound { .. } | Error::Command { .. } => ErrorKind::External,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::EmptyCommonName.kind(), ErrorKind::Validation);
        assert_eq!(Error::KeyGen("boom".into()).kind(), ErrorKind::Crypto);
        assert_eq!(
            Error::InconsistentState {
                dir: PathBuf::from("/tmp/ca"),
                reason: "ca.crt missing".into(),
            }
            .kind(),
            ErrorKind::InconsistentState
        );
        assert_eq!(
            Error::WriteFile {
                path: PathBuf::from("/tmp/x"),
                source: std::io::Error::other("disk full"),
            }
            .kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_unpersisted_is_storage_and_keeps_serial() {
        let err = Error::Unpersisted {
            serial: 7,
            source: Box::new(Error::OutputExists(PathBuf::from("a.crt"))),
        };
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(err.to_string().contains("Certificate 7"));
    }
}
