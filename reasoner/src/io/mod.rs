//! Side-effecting collaborators of the orchestrator.

pub mod config;
pub mod gateway;
pub mod optimizer;
pub mod process;
pub mod prompt;
