//! Storage module for the TE CLI
//!
//! - `json`: JSON file store with atomic replace

mod json;

pub use json::JsonStore;
