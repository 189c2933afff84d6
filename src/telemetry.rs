// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic logging for the `localca` binary.
//!
//! User-facing output goes to stdout through the CLI; trace events go to
//! stderr and are silent unless enabled with `LOCALCA_LOG`, `RUST_LOG` or
//! `--verbose`.

use std::env;
use thiserror::Error;
use tracing::subscriber::{set_global_default, SetGlobalDefaultError};
use tracing_subscriber::filter::{EnvFilter, ParseError};
use tracing_subscriber::layer::SubscriberExt;

pub const LOG_ENV: &str = "LOCALCA_LOG";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidFilter(#[from] ParseError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Filter directive from the environment, or the default for the verbosity.
pub fn filter_directive(verbose: bool) -> String {
    env::var(LOG_ENV)
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| {
            if verbose {
                "localca=debug".to_string()
            } else {
                "warn".to_string()
            }
        })
}

/// Install the global subscriber. Call once, before any work.
pub fn init_tracing(verbose: bool) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(filter_directive(verbose))?;
    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(verbose),
    );
    set_global_default(subscriber)?;
    Ok(())
}
