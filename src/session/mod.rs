//! Session coordination
//!
//! Owns the tab registry, stream manager, notification coordinator and tool
//! bridge for one client session and keeps them in step.

pub mod coordinator;

pub use coordinator::SessionCoordinator;
