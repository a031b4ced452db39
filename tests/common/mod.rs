//! Shared test utilities for switchboard
//!
//! Builders for a session wired to in-memory collaborators, plus helpers
//! for waiting on stream updates without hanging a failing test.

pub mod fixtures;
