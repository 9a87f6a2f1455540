//! Test helpers for interpreter tests
//!
//! Common utilities for assembling programs and building VMs

use crate::config::VmConfig;
use crate::interpreter::asm;
use crate::interpreter::{Library, Outcome, Value, Vm};
use std::collections::HashMap;
use std::rc::Rc;

/// Assemble `source` with no native symbols
pub fn library(source: &str) -> Library {
    asm::assemble_library(source, &HashMap::new()).expect("Assemble failed")
}

/// Assemble `source`, load its `main` as the entry frame
pub fn build_vm(source: &str) -> Vm {
    build_vm_with(source, VmConfig::default())
}

pub fn build_vm_with(source: &str, config: VmConfig) -> Vm {
    let library = library(source);
    let main = library.get("main").expect("No `main` procedure");
    let mut vm = Vm::new(config);
    vm.load_entry(Rc::clone(&main));
    vm
}

/// Run `main` and return its outcome
pub fn run(source: &str) -> Outcome {
    build_vm(source).run().expect("VM error")
}

pub fn returned(v: Value) -> Outcome {
    Outcome::Returned(Some(v))
}
