// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use directories::{BaseDirs, ProjectDirs};
use rcgen::{DistinguishedName, DnType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current config file version. Increment when making breaking changes.
const CONFIG_VERSION: u32 = 1;

/// Environment variable overriding the CA directory.
pub const ROOT_ENV: &str = "LOCALCA_ROOT";

pub const DEFAULT_CA_COMMON_NAME: &str = "localca Development CA";
pub const DEFAULT_CA_ORG_NAME: &str = "localca";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config file version for future migration support
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default = "default_ca_days")]
    pub ca_days: u32,
    #[serde(default = "default_ca_key_bits")]
    pub ca_key_bits: u32,
    #[serde(default = "default_cert_days")]
    pub cert_days: u32,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    #[serde(default)]
    pub ca_subject: CaSubject,
    /// Extra subject attributes placed next to the CN of every leaf.
    #[serde(default)]
    pub leaf_subject: SubjectFields,
}

/// Optional distinguished-name attributes besides the common name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl SubjectFields {
    pub fn validate(&self) -> Result<()> {
        if let Some(country) = &self.country {
            if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(Error::Config(format!(
                    "country must be a two-letter code, got '{}'",
                    country
                )));
            }
        }
        for (label, value) in [
            ("state", &self.state),
            ("locality", &self.locality),
            ("organization", &self.organization),
        ] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(Error::Config(format!("{} cannot be empty", label)));
            }
        }
        Ok(())
    }

    /// Build a distinguished name with `common_name` followed by the set
    /// attributes.
    pub fn to_distinguished_name(&self, common_name: &str) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        if let Some(country) = &self.country {
            dn.push(DnType::CountryName, country.to_ascii_uppercase());
        }
        if let Some(state) = &self.state {
            dn.push(DnType::StateOrProvinceName, state.as_str());
        }
        if let Some(locality) = &self.locality {
            dn.push(DnType::LocalityName, locality.as_str());
        }
        if let Some(organization) = &self.organization {
            dn.push(DnType::OrganizationName, organization.as_str());
        }
        dn.push(DnType::CommonName, common_name);
        dn
    }
}

/// Distinguished name of the root certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaSubject {
    #[serde(default = "default_ca_common_name")]
    pub common_name: String,
    #[serde(flatten)]
    pub fields: SubjectFields,
}

impl Default for CaSubject {
    fn default() -> Self {
        Self {
            common_name: default_ca_common_name(),
            fields: SubjectFields {
                organization: Some(DEFAULT_CA_ORG_NAME.to_string()),
                ..SubjectFields::default()
            },
        }
    }
}

impl CaSubject {
    pub fn to_distinguished_name(&self) -> DistinguishedName {
        self.fields.to_distinguished_name(&self.common_name)
    }
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn default_ca_common_name() -> String {
    DEFAULT_CA_COMMON_NAME.to_string()
}

fn default_cert_days() -> u32 {
    365
}

fn default_ca_days() -> u32 {
    3650
}

fn default_ca_key_bits() -> u32 {
    4096
}

fn default_key_bits() -> u32 {
    2048
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            ca_days: default_ca_days(),
            ca_key_bits: default_ca_key_bits(),
            cert_days: default_cert_days(),
            key_bits: default_key_bits(),
            ca_subject: CaSubject::default(),
            leaf_subject: SubjectFields::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        } else {
            Self::default()
        };

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        use crate::cert::validate_days;
        use crate::keys::validate_key_bits;

        if self.config_version > CONFIG_VERSION {
            tracing::warn!(
                found = self.config_version,
                supported = CONFIG_VERSION,
                "config.toml is newer than this version of localca; some settings may be ignored"
            );
        }

        validate_days(self.cert_days)?;
        validate_days(self.ca_days)
            .map_err(|e| Error::Config(format!("ca_days: {}", e)))?;
        validate_key_bits(self.key_bits)?;
        validate_key_bits(self.ca_key_bits)
            .map_err(|e| Error::Config(format!("ca_key_bits: {}", e)))?;

        if self.ca_subject.common_name.trim().is_empty() {
            return Err(Error::Config("ca_subject.common_name cannot be empty".into()));
        }
        self.ca_subject.fields.validate()?;
        self.leaf_subject.validate()?;

        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        crate::fs::atomic_write(path, content.as_bytes())
    }
}

/// Locations of the CA's persisted state.
#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
    pub ca_key: PathBuf,
    pub ca_cert: PathBuf,
    pub ca_serial: PathBuf,
    pub ca_lock: PathBuf,
    pub config: PathBuf,
}

impl Paths {
    /// Paths under `LOCALCA_ROOT`, or the platform data directory.
    pub fn new() -> Result<Self> {
        Ok(Self::at(Self::base_dir()?))
    }

    /// Paths for a CA stored in `base`.
    pub fn at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            ca_key: base.join("ca.key"),
            ca_cert: base.join("ca.crt"),
            ca_serial: base.join("ca.serial"),
            ca_lock: base.join("ca.lock"),
            config: base.join("config.toml"),
            base,
        }
    }

    /// Sanitize a domain name for safe use in file paths.
    /// Wildcard domains (e.g., `*.localhost`) are supported by replacing `*` with `_wildcard_`.
    pub(crate) fn sanitize_domain_for_filename(domain: &str) -> Result<String> {
        let reject = |reason: &str| {
            Err(Error::InvalidDomain {
                domain: domain.to_string(),
                reason: reason.to_string(),
            })
        };

        if domain.is_empty() {
            return reject("domain cannot be empty");
        }
        if domain.contains('\0') {
            return reject("domain contains null byte");
        }
        // Percent-encoding could smuggle a path traversal past the checks below
        if domain.contains('%') {
            return reject("domain contains percent encoding");
        }
        if domain.contains("..") {
            return reject("domain contains path traversal sequence");
        }
        if domain.contains('/') || domain.contains('\\') {
            return reject("domain contains path separator");
        }
        if domain.starts_with('.') || domain.ends_with('.') {
            return reject("domain cannot start or end with a dot");
        }

        let sanitized = domain.replace('*', "_wildcard_");

        if let Some(c) = sanitized
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '.' && *c != '-' && *c != '_')
        {
            return reject(&format!("domain contains invalid character: '{}'", c));
        }

        Ok(sanitized)
    }

    fn base_dir() -> Result<PathBuf> {
        if let Ok(custom_root) = std::env::var(ROOT_ENV) {
            let path = PathBuf::from(&custom_root);

            if !path.is_absolute() {
                return Err(Error::Config(format!(
                    "{} must be an absolute path, got: {}",
                    ROOT_ENV, custom_root
                )));
            }

            return Ok(path);
        }

        if let Some(proj_dirs) = ProjectDirs::from("", "", "localca") {
            Ok(proj_dirs.data_dir().to_path_buf())
        } else if let Some(base_dirs) = BaseDirs::new() {
            #[cfg(windows)]
            {
                Ok(base_dirs.data_local_dir().join("localca"))
            }
            #[cfg(not(windows))]
            {
                Ok(base_dirs.home_dir().join(".localca"))
            }
        } else {
            Err(Error::Config(format!(
                "Could not determine a home directory. Set {} to choose the CA location.",
                ROOT_ENV
            )))
        }
    }

    /// Certificate path for `name` inside `dir`.
    pub fn cert_file(dir: &Path, name: &str) -> Result<PathBuf> {
        let safe_name = Self::sanitize_domain_for_filename(name)?;
        Ok(dir.join(format!("{}.crt", safe_name)))
    }

    /// Private key path for `name` inside `dir`.
    pub fn key_file(dir: &Path, name: &str) -> Result<PathBuf> {
        let safe_name = Self::sanitize_domain_for_filename(name)?;
        Ok(dir.join(format!("{}.key", safe_name)))
    }

    pub fn ensure_dir(&self) -> Result<()> {
        crate::fs::ensure_dir(&self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cert_days, 365);
        assert_eq!(config.ca_days, 3650);
        assert_eq!(config.key_bits, 2048);
        assert_eq!(config.ca_key_bits, 4096);
        assert_eq!(config.ca_subject.common_name, DEFAULT_CA_COMMON_NAME);
        assert_eq!(
            config.ca_subject.fields.organization.as_deref(),
            Some(DEFAULT_CA_ORG_NAME)
        );
    }

    #[test]
    fn test_config_load_missing_file() {
        let path = PathBuf::from("/nonexistent/config.toml");
        let config =
            Config::load(&path).expect("Config should load with defaults for missing file");

        assert_eq!(config.cert_days, 365);
        assert_eq!(config.ca_days, 3650);
    }

    #[test]
    fn test_config_load_custom_values() {
        let mut file = NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "cert_days = 7").expect("write cert_days should succeed");
        writeln!(file, "ca_days = 365").expect("write ca_days should succeed");
        writeln!(file, "key_bits = 3072").expect("write key_bits should succeed");
        writeln!(file, "[ca_subject]").expect("write section should succeed");
        writeln!(file, "common_name = \"Team CA\"").expect("write cn should succeed");
        writeln!(file, "country = \"US\"").expect("write country should succeed");
        writeln!(file, "[leaf_subject]").expect("write section should succeed");
        writeln!(file, "organization = \"Local\"").expect("write org should succeed");

        let config = Config::load(file.path()).expect("Config should load successfully");
        assert_eq!(config.cert_days, 7);
        assert_eq!(config.ca_days, 365);
        assert_eq!(config.key_bits, 3072);
        assert_eq!(config.ca_key_bits, 4096);
        assert_eq!(config.ca_subject.common_name, "Team CA");
        assert_eq!(config.ca_subject.fields.country.as_deref(), Some("US"));
        assert_eq!(config.leaf_subject.organization.as_deref(), Some("Local"));
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().expect("temp directory should be created");
        let path = dir.path().join("config.toml");
        let config = Config {
            cert_days: 90,
            ca_days: 730,
            ca_key_bits: 2048,
            leaf_subject: SubjectFields {
                locality: Some("City".into()),
                ..SubjectFields::default()
            },
            ..Config::default()
        };

        config.save(&path).expect("Config should save successfully");
        let loaded = Config::load(&path).expect("Config should load after save");

        assert_eq!(loaded.config_version, 1);
        assert_eq!(loaded.cert_days, 90);
        assert_eq!(loaded.ca_days, 730);
        assert_eq!(loaded.ca_key_bits, 2048);
        assert_eq!(loaded.ca_subject, CaSubject::default());
        assert_eq!(loaded.leaf_subject.locality.as_deref(), Some("City"));
    }

    #[test]
    fn test_config_invalid_values() {
        for line in [
            "cert_days = 0",
            "cert_days = 999999",
            "ca_days = 0",
            "key_bits = 0",
            "ca_key_bits = 1024",
        ] {
            let mut file = NamedTempFile::new().expect("temp file should be created");
            writeln!(file, "{}", line).expect("write should succeed");
            assert!(Config::load(file.path()).is_err(), "{} should be rejected", line);
        }
    }

    #[test]
    fn test_config_invalid_country() {
        let mut file = NamedTempFile::new().expect("temp file should be created");
        writeln!(file, "[leaf_subject]").expect("write section should succeed");
        writeln!(file, "country = \"USA\"").expect("write country should succeed");

        let result = Config::load(file.path());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_subject_fields_order() {
        let fields = SubjectFields {
            country: Some("us".into()),
            organization: Some("Local".into()),
            ..SubjectFields::default()
        };
        let dn = fields.to_distinguished_name("test.local");
        let types: Vec<DnType> = dn.iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(
            types,
            vec![
                DnType::CountryName,
                DnType::OrganizationName,
                DnType::CommonName
            ]
        );
    }

    #[test]
    fn test_paths_at() {
        let paths = Paths::at("/srv/ca");
        assert_eq!(paths.ca_key, PathBuf::from("/srv/ca/ca.key"));
        assert_eq!(paths.ca_cert, PathBuf::from("/srv/ca/ca.crt"));
        assert_eq!(paths.ca_serial, PathBuf::from("/srv/ca/ca.serial"));
        assert_eq!(paths.ca_lock, PathBuf::from("/srv/ca/ca.lock"));
        assert_eq!(paths.config, PathBuf::from("/srv/ca/config.toml"));
    }

    #[test]
    fn test_paths_respects_root_env() {
        let original = std::env::var(ROOT_ENV).ok();

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let custom_path = temp_dir.path().join("localca");
        std::env::set_var(ROOT_ENV, &custom_path);

        let paths = Paths::new().expect("Paths should be created from LOCALCA_ROOT");
        assert_eq!(paths.base, custom_path);
        assert_eq!(paths.ca_cert, custom_path.join("ca.crt"));

        match original {
            Some(val) => std::env::set_var(ROOT_ENV, val),
            None => std::env::remove_var(ROOT_ENV),
        }
    }

    #[test]
    fn test_sanitize_domain_valid() {
        assert!(Paths::sanitize_domain_for_filename("example.com").is_ok());
        assert!(Paths::sanitize_domain_for_filename("sub.example.com").is_ok());
        assert!(Paths::sanitize_domain_for_filename("my-domain.com").is_ok());
        assert!(Paths::sanitize_domain_for_filename("my_domain.com").is_ok());
        assert!(Paths::sanitize_domain_for_filename("localhost").is_ok());
        assert!(Paths::sanitize_domain_for_filename("127.0.0.1").is_ok());
    }

    #[test]
    fn test_sanitize_domain_rejects_unsafe() {
        for bad in [
            "",
            "..",
            "../etc/passwd",
            "a..b",
            "/etc/passwd",
            "foo\\bar",
            "foo\0bar",
            "foo%2fbar",
            ".hidden",
            "foo:bar",
            "foo bar",
            "::1",
        ] {
            assert!(
                Paths::sanitize_domain_for_filename(bad).is_err(),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_sanitize_domain_wildcard() {
        assert_eq!(
            Paths::sanitize_domain_for_filename("*.example.com")
                .expect("wildcard example.com should be valid"),
            "_wildcard_.example.com"
        );
    }

    #[test]
    fn test_cert_and_key_file() {
        let dir = Path::new("/out");
        assert_eq!(
            Paths::cert_file(dir, "test.local").expect("valid name"),
            PathBuf::from("/out/test.local.crt")
        );
        assert_eq!(
            Paths::key_file(dir, "test.local").expect("valid name"),
            PathBuf::from("/out/test.local.key")
        );
        assert!(Paths::cert_file(dir, "../../../etc/passwd").is_err());
    }
}
