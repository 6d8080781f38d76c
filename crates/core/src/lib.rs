//! Shared types, unified error handling, and tracing setup used by every
//! crate in this workspace.
//!
//! - `types`: the accessory database tree and the characteristic value
//!   enum returned by `getAccessories`/`get`/`set`.
//! - `error`: the unified `Error`/`Result` used across all crates.
//! - `logging`: an opt-in `tracing-subscriber` installer for binaries.

pub mod error;
pub mod logging;
pub mod types;

pub use error::{Error, Result};
