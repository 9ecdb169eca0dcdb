//! Deterministic, pure logic shared by the step orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod analysis;
pub mod budget;
pub mod classifier;
pub mod invariants;
pub mod scoring;
pub mod selector;
pub mod state;
pub mod types;
pub mod window;
