//! Instructions and programs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

/// Native routine identifier carried by the `native` instruction
pub type RoutineId = u32;

/// Single instruction
///
/// Jump targets are instruction indices within the same program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum Op {
    PushInt(i64),
    PushStr(String),
    PushBytes(Vec<u8>),
    PushBool(bool),
    PushNull,
    Pop,
    Dup,
    Swap,
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Not,
    Jump(usize),
    /// Pop; jump if truthy
    JumpIf(usize),
    /// Arm the frame's fault handler
    Catch(usize),
    /// Pop a message and fault the frame with it
    Throw,
    Native(RoutineId),
    /// Pop and log a value
    Log,
    Ret,
}

/// Named sequence of instructions
///
/// Each loaded frame executes exactly one program from index 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub code: Vec<Op>,
}

impl Program {
    pub fn new(name: impl Into<String>, code: Vec<Op>) -> Self {
        Self {
            name: name.into(),
            code,
        }
    }
}

/// Set of programs addressable by name
///
/// Host routines use it to re-enter the interpreter with a named procedure.
#[derive(Debug, Clone, Default)]
pub struct Library {
    programs: HashMap<String, Rc<Program>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a program, replacing any previous one with the same name
    pub fn insert(&mut self, program: Program) -> Rc<Program> {
        let program = Rc::new(program);
        self.programs
            .insert(program.name.clone(), Rc::clone(&program));
        program
    }

    pub fn get(&self, name: &str) -> Option<Rc<Program>> {
        self.programs.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl FromIterator<Program> for Library {
    fn from_iter<I: IntoIterator<Item = Program>>(iter: I) -> Self {
        let mut library = Library::new();
        for program in iter {
            library.insert(program);
        }
        library
    }
}
