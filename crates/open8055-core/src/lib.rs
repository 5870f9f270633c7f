//! Shared vocabulary for the Open8055 network server.
//!
//! Card identifiers, run states, authentication levels and the protocol
//! constants used by every other crate in the workspace.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
