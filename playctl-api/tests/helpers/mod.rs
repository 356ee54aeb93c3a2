//! Test helper modules for playctl-api integration tests
//!
//! - MockEngine: scripted player engine that records what reached it
//! - TestServer: control server plus an in-process router for oneshot requests

#![allow(dead_code)]

pub mod mock_engine;
pub mod test_server;

pub use mock_engine::MockEngine;
pub use test_server::{free_port, TestServer};
