//! Receiver and decoder for the UK NPL MSF 60 kHz long-wave time
//! broadcast.
//!
//! The pipeline is GPIO line -> [`pulse_source`] -> [`bit_sampler`] ->
//! [`framer`] -> [`time_decoder`], sequenced by [`main_loop`] with
//! pluggable [`hooks`] and an optional [`clock_setter`]. [`log_codec`]
//! lets the same pipeline replay a recorded session instead of reading
//! live hardware.

pub mod bit_sampler;
pub mod bit_source;
pub mod calendar;
pub mod clock_setter;
pub mod config;
pub mod error;
pub mod framer;
pub mod hooks;
pub mod log_codec;
pub mod main_loop;
pub mod pulse_source;
pub mod time_decoder;
pub mod types;

pub use error::{Error, Result};
