//! Deterministic, pure logic for the generation pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod conflict;
pub mod errors;
pub mod graph;
pub mod grouping;
pub mod lexer;
pub mod parser;
pub mod slug;
pub mod types;
pub mod views;
