//! Command-line client for parley voice sessions.
//!
//! The binary in `main.rs` is the composition root; this library holds the
//! pieces it wires together so they can be unit tested.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tokio_test as _;

// Used by the binary only
use anyhow as _;
use dotenvy as _;
use tokio as _;
use tracing_subscriber as _;

pub mod config;
pub mod devices;
pub mod error;
pub mod parser;
pub mod presentation;

pub use config::resolve_settings;
pub use devices::{open_classifier, open_devices};
pub use error::CliError;
pub use parser::Cli;
pub use presentation::EventPrinter;
