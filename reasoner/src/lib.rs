//! Bounded multi-step reasoning engine.
//!
//! Given a problem statement, the engine picks a reasoning strategy, asks a
//! model gateway for one incremental step at a time, scores each step and
//! decides whether to continue. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (scoring, classification, strategy
//!   selection, engine state, response decoding). No I/O.
//! - **[`io`]**: Side-effecting collaborators (configuration, model gateway,
//!   token optimizer, prompt rendering, process execution).
//!
//! [`orchestrator`] coordinates the two to implement `process_problem`.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
