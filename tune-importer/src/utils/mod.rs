//! Utility modules for tune-importer

pub mod paths;

pub use paths::{determine_path, relative_to_root};
