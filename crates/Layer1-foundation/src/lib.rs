//! # te-foundation
//!
//! Foundation layer for the TE CLI:
//! - Error: central taxonomy shared by every crate
//! - Config: `~/.te/config.json` plus environment overrides
//! - Storage: JSON file store with atomic replace
//! - Env: external tool detection for launch prechecks

pub mod config;
pub mod env_detect;
pub mod error;
pub mod storage;

pub use config::{TeConfig, TE_CONFIG_FILE};
pub use env_detect::{EnvironmentReport, ToolCheck};
pub use error::{Error, Result};
pub use storage::JsonStore;
