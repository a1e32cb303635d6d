//! Shared types, error model, and configuration for RanoPress.
//!
//! This crate is the foundation depended on by all other RanoPress crates.
//! It provides:
//! - [`RanopressError`] — the unified error type
//! - The intermediate record model ([`Book`], [`Chapter`], [`Attachment`])
//! - Configuration ([`AppConfig`], [`FetchPolicy`], config loading)
//! - The [`ProgressReporter`] contract between the pipeline and its front end

pub mod config;
pub mod error;
pub mod progress;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, FetchPolicy, NetworkConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{RanopressError, Result};
pub use progress::{ProgressReporter, ScaledProgress, SilentProgress};
pub use types::{Attachment, Book, Chapter, RECORD_FILE_NAME, VolumeKey};
