//! Deterministic, pure logic shared by the factory pipeline.
//!
//! Core modules are free of I/O side effects. They operate on in-memory text
//! and return deterministic outputs suitable for tests.

pub mod cancel;
pub mod language;
pub mod persona;
pub mod protocol;
pub mod types;
