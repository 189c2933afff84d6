// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Publicly trusted certificates through an external ACME client.
//!
//! The ACME protocol itself stays in the external program (certbot by
//! default). This module builds its command line, runs it with the terminal
//! attached so the operator can publish the DNS-01 TXT record, and copies the
//! result into the `cert.crt`/`cert.key` layout TLS servers expect.

use crate::error::{Error, Result};
use crate::config::Paths;
use crate::fs::{write_all_or_nothing, PendingWrite, Visibility};
use crate::san::validate_dns_name;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub const DEFAULT_PROGRAM: &str = "certbot";
pub const DEFAULT_LIVE_DIR: &str = "/etc/letsencrypt/live";

/// File names written by [`AcmeClient::install`].
pub const INSTALLED_CERT: &str = "cert.crt";
pub const INSTALLED_KEY: &str = "cert.key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcmeRequest {
    pub domain: String,
    /// Account email registered with the ACME server.
    pub email: String,
    /// Use the ACME staging environment (untrusted certificates, lax rate limits).
    pub staging: bool,
}

impl AcmeRequest {
    pub fn validate(&self) -> Result<()> {
        validate_dns_name(&self.domain)?;
        if self.domain.starts_with('-') {
            return Err(Error::InvalidDomain {
                domain: self.domain.clone(),
                reason: "name cannot start with '-'".into(),
            });
        }

        let valid_email = match self.email.split_once('@') {
            Some((local, host)) => {
                !local.is_empty()
                    && host.contains('.')
                    && !self.email.starts_with('-')
                    && !self.email.chars().any(|c| c.is_whitespace() || c.is_control())
            }
            None => false,
        };
        if !valid_email {
            return Err(Error::Config(format!(
                "'{}' is not a usable ACME account email",
                self.email
            )));
        }
        Ok(())
    }
}

/// An external ACME client and the directory it deposits certificates in.
#[derive(Debug, Clone)]
pub struct AcmeClient {
    program: String,
    live_dir: PathBuf,
}

impl AcmeClient {
    pub fn certbot() -> Self {
        Self::new(DEFAULT_PROGRAM, DEFAULT_LIVE_DIR)
    }

    pub fn new(program: impl Into<String>, live_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            live_dir: live_dir.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command-line arguments for a manual DNS-01 issuance.
    pub fn args(&self, request: &AcmeRequest) -> Result<Vec<String>> {
        request.validate()?;

        let mut args: Vec<String> = [
            "certonly",
            "--manual",
            "--preferred-challenges",
            "dns",
            "-d",
            request.domain.as_str(),
            "--email",
            request.email.as_str(),
            "--agree-tos",
            "--no-eff-email",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        if request.staging {
            args.push("--staging".to_string());
        }
        Ok(args)
    }

    /// Run the client in the foreground. Stdio is inherited because the
    /// DNS-01 flow waits for the operator.
    pub fn run(&self, request: &AcmeRequest) -> Result<()> {
        let args = self.args(request)?;
        tracing::info!(program = %self.program, domain = %request.domain, staging = request.staging, "running ACME client");

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::CommandNotFound {
                        command: self.program.clone(),
                        hint: install_hint(&self.program),
                    }
                } else {
                    Error::Command {
                        command: self.program.clone(),
                        stderr: e.to_string(),
                    }
                }
            })?;

        if !status.success() {
            return Err(Error::Command {
                command: format!("{} {}", self.program, args.join(" ")),
                stderr: format!("exited with {}", status),
            });
        }
        Ok(())
    }

    /// Where the client deposits the chain and key for `domain`.
    ///
    /// A wildcard lineage is stored under the base domain.
    pub fn live_paths(&self, domain: &str) -> Result<(PathBuf, PathBuf)> {
        let lineage = domain.strip_prefix("*.").unwrap_or(domain);
        // Rejects separators and traversal; the sanitized form is not used
        Paths::sanitize_domain_for_filename(lineage)?;
        let dir = self.live_dir.join(lineage);
        Ok((dir.join("fullchain.pem"), dir.join("privkey.pem")))
    }

    /// Copy the deposited chain and key into `out_dir` as `cert.crt` (0644)
    /// and `cert.key` (0600). Returns the written paths.
    pub fn install(&self, domain: &str, out_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        validate_dns_name(domain)?;
        let (chain_src, key_src) = self.live_paths(domain)?;

        let chain = std::fs::read(&chain_src).map_err(|e| Error::ReadFile {
            path: chain_src.clone(),
            source: e,
        })?;
        let key = std::fs::read(&key_src).map_err(|e| Error::ReadFile {
            path: key_src.clone(),
            source: e,
        })?;

        crate::fs::ensure_dir(out_dir)?;
        let cert_dest = out_dir.join(INSTALLED_CERT);
        let key_dest = out_dir.join(INSTALLED_KEY);

        write_all_or_nothing(&[
            PendingWrite {
                path: &key_dest,
                contents: &key,
                visibility: Visibility::Secret,
            },
            PendingWrite {
                path: &cert_dest,
                contents: &chain,
                visibility: Visibility::Public,
            },
        ])?;

        tracing::info!(domain, cert = %cert_dest.display(), key = %key_dest.display(), "installed ACME certificate");
        Ok((cert_dest, key_dest))
    }
}

fn install_hint(command: &str) -> String {
    match command {
        "certbot" => "Install certbot: https://certbot.eff.org/instructions".to_string(),
        _ => format!("Please install the '{}' command", command),
    }
}
