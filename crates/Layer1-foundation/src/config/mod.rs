//! Config - TE CLI settings
//!
//! - `te.rs` - repository paths, DTK detection, supervision settings

mod te;

pub use te::{TeConfig, TE_CONFIG_FILE};
