//! Tests for the interpreter
//!
//! Organized by feature area

mod fault_tests;
mod helpers;
