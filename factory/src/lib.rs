//! Multi-persona software factory loop.
//!
//! A client request passes through a fixed pipeline of LLM personas
//! (specification, developer, three verifiers, release manager) until the
//! release manager approves or the iteration budget runs out. The architecture
//! keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (personas, marker protocol, events).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (model backend, config, credentials).
//!   Isolated behind traits so tests can script model replies.
//!
//! [`workflow`] coordinates core logic with I/O to implement a run.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workflow;
