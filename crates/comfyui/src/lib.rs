//! ComfyUI client library.
//!
//! Builds node-graph workflows from a small set of templates, submits
//! them over the ComfyUI HTTP API, and polls the prompt history until
//! the job finishes.

pub mod api;
pub mod history;
pub mod poller;
pub mod templates;
pub mod workflow;
