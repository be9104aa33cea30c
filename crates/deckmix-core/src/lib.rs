//! # deckmix-core
//!
//! Core types, mixing laws, and error handling for the deckmix engine.
//!
//! Nothing in this crate touches audio hardware; it holds the pieces the
//! engine and any application shell agree on.

pub mod config;
pub mod error;
pub mod gain;
pub mod scratch;
pub mod types;

pub use config::{EngineConfig, PadBank};
pub use error::{Error, Result};
pub use gain::{GainModel, GainSnapshot};
pub use scratch::{ScratchMapper, ScratchRegion};
pub use types::*;
