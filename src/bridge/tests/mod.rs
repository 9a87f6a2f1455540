//! Tests for the bridge
//!
//! Programs are assembled against a registry of small test routines
//! (see `helpers`) and run on a real VM.

mod dispatch_tests;
mod helpers;
