//! MCP coordinator core - platform-independent abstractions and configuration
//!
//! This crate provides the manifest and settings types, the error taxonomy,
//! the environment resolver and the traits that the process layer and the
//! session layer implement.

mod config;
mod env;
mod error;
mod process;
mod session;

pub use config::*;
pub use env::*;
pub use error::*;
pub use process::*;
pub use session::*;
