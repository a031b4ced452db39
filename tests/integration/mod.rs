//! Integration tests for switchboard
//!
//! These tests verify that multiple components work together correctly.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli_smoke;
pub mod session_flow;
pub mod stream_flow;
pub mod tab_flow;
pub mod tool_flow;
