//! # playctl Common Library
//!
//! Shared code for the playctl control-plane service and its clients:
//! - Wire protocol types (invocations, action results, server frames)
//! - Listen-port validation
//! - TOML bootstrap configuration
//! - Common error type

pub mod config;
pub mod error;
pub mod protocol;

pub use error::{Error, Result};
pub use protocol::{ActionInvocation, ActionResult, Fields, ServerFrame, UpdateChange};
