//! Deterministic, pure logic shared by the workflow.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod normalize;
pub mod notes;
pub mod parser;
pub mod queue;
pub mod state;
pub mod task;
