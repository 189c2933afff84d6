// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Instructions for trusting the CA certificate.
//!
//! Nothing here touches a trust store: the commands are rendered for the
//! operator to run.

use std::fmt;
use std::path::Path;

/// Name under which the CA is installed in system stores.
pub const TRUST_STORE_CERT_NAME: &str = "localca-development-ca.crt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Debian, Ubuntu, Mint, Pop!_OS
    Debian,
    /// Fedora, RHEL, CentOS, Rocky, Alma
    Fedora,
    /// Arch, Manjaro, EndeavourOS
    Arch,
    MacOs,
    Windows,
    UnknownLinux,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Debian,
        Platform::Fedora,
        Platform::Arch,
        Platform::MacOs,
        Platform::Windows,
        Platform::UnknownLinux,
    ];

    /// The platform this binary runs on.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            match std::fs::read_to_string("/etc/os-release") {
                Ok(content) => Self::from_os_release(&content),
                Err(_) => Platform::UnknownLinux,
            }
        }
    }

    pub fn from_os_release(content: &str) -> Self {
        let content = content.to_lowercase();

        if ["debian", "ubuntu", "mint", "pop!_os"]
            .iter()
            .any(|id| content.contains(id))
        {
            Platform::Debian
        } else if ["fedora", "rhel", "centos", "rocky", "alma"]
            .iter()
            .any(|id| content.contains(id))
        {
            Platform::Fedora
        } else if ["arch", "manjaro", "endeavour"]
            .iter()
            .any(|id| content.contains(id))
        {
            Platform::Arch
        } else {
            Platform::UnknownLinux
        }
    }

    /// Shell commands that add `ca_cert` to the system trust store.
    pub fn commands(&self, ca_cert: &Path) -> Vec<String> {
        let cert = ca_cert.display();
        match self {
            Platform::Debian => vec![
                format!(
                    "sudo cp {} /usr/local/share/ca-certificates/{}",
                    cert, TRUST_STORE_CERT_NAME
                ),
                "sudo update-ca-certificates".to_string(),
            ],
            Platform::Fedora => vec![
                format!(
                    "sudo cp {} /etc/pki/ca-trust/source/anchors/{}",
                    cert, TRUST_STORE_CERT_NAME
                ),
                "sudo update-ca-trust extract".to_string(),
            ],
            Platform::Arch => vec![
                format!(
                    "sudo cp {} /etc/ca-certificates/trust-source/anchors/{}",
                    cert, TRUST_STORE_CERT_NAME
                ),
                "sudo trust extract-compat".to_string(),
            ],
            Platform::MacOs => vec![format!(
                "sudo security add-trusted-cert -d -r trustRoot -k /Library/Keychains/System.keychain {}",
                cert
            )],
            Platform::Windows => vec![format!("certutil -addstore -f ROOT {}", cert)],
            Platform::UnknownLinux => vec![format!(
                "Add {} to your distribution's CA trust anchors and refresh the bundle",
                cert
            )],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Debian => "Debian/Ubuntu",
            Platform::Fedora => "Fedora/RHEL",
            Platform::Arch => "Arch Linux",
            Platform::MacOs => "macOS",
            Platform::Windows => "Windows",
            Platform::UnknownLinux => "Other Linux",
        };
        f.write_str(name)
    }
}

/// Firefox keeps its own NSS store; `certutil` comes from libnss3-tools.
pub fn firefox_command(ca_cert: &Path, ca_name: &str) -> String {
    format!(
        "certutil -A -d sql:$HOME/.pki/nssdb -t C,, -n \"{}\" -i {}",
        ca_name,
        ca_cert.display()
    )
}

/// Node.js ignores the system store unless told otherwise.
pub fn node_hint(ca_cert: &Path) -> String {
    format!("export NODE_EXTRA_CA_CERTS=\"{}\"", ca_cert.display())
}
