//! MCP server exposing local ComfyUI and Stable Diffusion WebUI
//! instances as image-generation tools.

pub mod error;
pub mod handlers;
pub mod requests;
pub mod response;
pub mod server;
pub mod service;
