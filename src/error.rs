//! Crate-wide error type.
//!
//! Transient decode-level conditions (parity, BCD, jump, frame-length,
//! DST/leap anomalies) are never represented here — they stay inside
//! [`crate::types::GbResult`] and [`crate::types::DtResult`] per spec §7.
//! `Error` exists only for fatal initialisation failures and I/O faults.

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("GPIO I/O error: {0}")]
    Gpio(#[source] io::Error),

    #[error("log file I/O error: {0}")]
    Log(#[source] io::Error),

    #[error("clock-set error: {0}")]
    ClockSet(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
