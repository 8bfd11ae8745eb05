//! # Tune Manager Common Library
//!
//! Shared code for the tune-manager services including:
//! - Error types
//! - Event types (track events, batches, processing stages)
//! - Configuration file loading and import root resolution

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
