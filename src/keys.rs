// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! RSA key generation and loading.
//!
//! rcgen cannot generate RSA keys itself, so keys are produced with the
//! `rsa` crate and handed to rcgen as PKCS#8.

use crate::error::{Error, Result};
use rand_core::OsRng;
use rcgen::KeyPair;
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;

/// Smallest RSA modulus the signing backend accepts.
pub const MIN_KEY_BITS: u32 = 2048;

/// Largest RSA modulus the signing backend accepts.
pub const MAX_KEY_BITS: u32 = 8192;

/// Validate an RSA key size.
///
/// # Errors
/// Returns [`Error::InvalidKeyBits`] for 0, sizes outside
/// [`MIN_KEY_BITS`]..=[`MAX_KEY_BITS`], or sizes that are not a multiple of 8.
pub fn validate_key_bits(bits: u32) -> Result<()> {
    let reason = if bits == 0 {
        "key size must be positive".to_string()
    } else if bits < MIN_KEY_BITS {
        format!("key size must be at least {} bits", MIN_KEY_BITS)
    } else if bits > MAX_KEY_BITS {
        format!("key size cannot exceed {} bits", MAX_KEY_BITS)
    } else if bits % 8 != 0 {
        "key size must be a multiple of 8".to_string()
    } else {
        return Ok(());
    };
    Err(Error::InvalidKeyBits { bits, reason })
}

/// Generate a fresh RSA key pair usable for SHA-256 signatures.
pub fn generate_rsa_key_pair(bits: u32) -> Result<KeyPair> {
    validate_key_bits(bits)?;

    let started = std::time::Instant::now();
    let private_key = RsaPrivateKey::new(&mut OsRng, bits as usize)
        .map_err(|e| Error::KeyGen(e.to_string()))?;
    let pkcs8 = private_key
        .to_pkcs8_der()
        .map_err(|e| Error::KeyGen(e.to_string()))?;

    let pem = pem::encode(&pem::Pem::new("PRIVATE KEY", pkcs8.as_bytes()));
    let key_pair = load_key_pair(&pem)?;

    tracing::debug!(
        bits,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "generated RSA key"
    );
    Ok(key_pair)
}

/// Load a PKCS#8 RSA private key from PEM.
pub fn load_key_pair(pem: &str) -> Result<KeyPair> {
    KeyPair::from_pkcs8_pem_and_sign_algo(pem, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| Error::KeyGen(format!("unusable RSA key: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validate_key_bits() {
        assert!(validate_key_bits(2048).is_ok());
        assert!(validate_key_bits(3072).is_ok());
        assert!(validate_key_bits(4096).is_ok());
        assert!(validate_key_bits(MAX_KEY_BITS).is_ok());

        for bits in [0, 512, 1024, 2047, 2049, MAX_KEY_BITS + 8] {
            let err = validate_key_bits(bits).expect_err("invalid size should be rejected");
            assert_eq!(err.kind(), ErrorKind::Validation);
        }
    }

    #[test]
    fn test_generate_rsa_key_pair() {
        let key_pair = generate_rsa_key_pair(2048).expect("key should be generated");
        let pem = key_pair.serialize_pem();
        assert!(pem.contains("BEGIN PRIVATE KEY"));

        let reloaded = load_key_pair(&pem).expect("key should reload");
        assert_eq!(reloaded.serialize_der(), key_pair.serialize_der());
    }

    #[test]
    fn test_generate_rejects_zero_bits() {
        assert!(matches!(
            generate_rsa_key_pair(0),
            Err(Error::InvalidKeyBits { bits: 0, .. })
        ));
    }

    #[test]
    fn test_load_garbage_key() {
        let err = load_key_pair("not a key").expect_err("garbage should fail");
        assert_eq!(err.kind(), ErrorKind::Crypto);
    }
}
