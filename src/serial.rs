// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Persisted serial-number counter.
//!
//! The counter file holds the *next* serial to hand out, as uppercase hex
//! with an even number of digits (`02`, `0A`, `0100`), the same layout the
//! OpenSSL CA serial file uses. Callers must hold the CA lock around
//! [`advance`].

use crate::error::{Error, Result};
use std::path::Path;

/// Serial of the root certificate; the first value a new CA consumes.
pub const FIRST_SERIAL: u64 = 1;

pub fn encode(value: u64) -> String {
    let mut hex = format!("{:X}", value);
    if hex.len() % 2 == 1 {
        hex.insert(0, '0');
    }
    hex.push('\n');
    hex
}

pub fn decode(content: &str) -> Option<u64> {
    let hex = content.trim();
    if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(hex, 16).ok().filter(|v| *v >= FIRST_SERIAL)
}

/// Read the next serial without consuming it.
pub fn read(path: &Path) -> Result<u64> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    decode(&content).ok_or_else(|| Error::InvalidSerial {
        path: path.to_path_buf(),
        reason: format!("expected a positive hex number, found '{}'", content.trim()),
    })
}

pub fn write(path: &Path, next: u64) -> Result<()> {
    crate::fs::atomic_write(path, encode(next).as_bytes())
}

/// Return the stored serial and persist its successor.
///
/// The successor is on disk before the value is returned, so a crash right
/// after this call skips a serial instead of repeating one.
pub fn advance(path: &Path) -> Result<u64> {
    let current = read(path)?;
    let next = current.checked_add(1).ok_or(Error::SerialExhausted)?;
    write(path, next)?;
    Ok(current)
}
