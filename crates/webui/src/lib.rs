//! Stable Diffusion WebUI (`/sdapi/v1`) client.

pub mod api;
pub mod types;
