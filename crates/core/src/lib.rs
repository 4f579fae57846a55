//! Shared building blocks for the image-generation MCP bridge.
//!
//! Holds configuration loading, the core error type, output filename
//! rules, quality presets, output-directory housekeeping, and the
//! fallback chain used when several generation strategies are tried in
//! sequence.

pub mod config;
pub mod error;
pub mod fallback;
pub mod naming;
pub mod outputs;
pub mod preset;
