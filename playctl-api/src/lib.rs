//! # playctl control-plane service (playctl-api)
//!
//! Exposes a media player's state and accepts control actions over HTTP and
//! WebSocket on one port, relaying actions into the player engine.
//!
//! **Architecture:** client → transport ([`api`]) → [`actions`] registry
//! (or engine delegation) → [`state`] store → [`subscriptions`] fan-out.
//! The [`sync`] loop feeds engine snapshots into the same store.

pub mod actions;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod state;
pub mod subscriptions;
pub mod sync;

pub use api::{AppContext, ControlServer, ServerOptions};
pub use error::{Error, Result};
