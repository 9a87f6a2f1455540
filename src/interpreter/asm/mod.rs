//! Assembler - PEST-based parser for the textual program format
//!
//! Produces [`Program`]s ready to load into the VM, with span information for
//! error reporting. Native routines may be named symbolically; the caller
//! supplies the symbol table that maps names to routine ids.

use pest::Parser;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::types::{Library, Op, Program, RoutineId};

pub mod validator;


pub use validator::{validate, ValidationError};

/* ===================== Span ===================== */

/// Source location, 0-indexed lines and columns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "interpreter/asm/asm.pest"]
struct AsmParser;

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

/* ===================== Error Types ===================== */

#[derive(Debug)]
pub enum ParseError {
    PestError(String, Option<Span>),
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::PestError(_, span) => *span,
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg, _) => msg,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::PestError(msg, _) => write!(f, "{}", msg),
            ParseError::BuildError(msg, Some(span)) => {
                write!(f, "{}:{}: {}", span.start_line + 1, span.start_col + 1, msg)
            }
            ParseError::BuildError(msg, None) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let span = match err.line_col {
            pest::error::LineColLocation::Pos((line, col)) => Some(Span {
                start: 0,
                end: 0,
                start_line: line.saturating_sub(1),
                start_col: col.saturating_sub(1),
                end_line: line.saturating_sub(1),
                end_col: col,
            }),
            pest::error::LineColLocation::Span((start_line, start_col), (end_line, end_col)) => {
                Some(Span {
                    start: 0,
                    end: 0,
                    start_line: start_line.saturating_sub(1),
                    start_col: start_col.saturating_sub(1),
                    end_line: end_line.saturating_sub(1),
                    end_col: end_col.saturating_sub(1),
                })
            }
        };
        ParseError::PestError(err.to_string(), span)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Public API ===================== */

/// Assemble every `proc` in `source`
///
/// `natives` resolves symbolic operands of the `native` instruction;
/// numeric operands are taken as routine ids directly.
pub fn assemble(source: &str, natives: &HashMap<String, RoutineId>) -> ParseResult<Vec<Program>> {
    let file = AsmParser::parse(Rule::file, source)?
        .next()
        .ok_or_else(|| ParseError::BuildError("empty parse".to_string(), None))?;

    let mut programs: Vec<Program> = Vec::new();
    for pair in file.into_inner() {
        if pair.as_rule() != Rule::proc {
            continue;
        }
        let span = pair_to_span(&pair, source);
        let program = build_proc(pair, source, natives)?;
        if programs.iter().any(|p| p.name == program.name) {
            return Err(ParseError::BuildError(
                format!("duplicate procedure `{}`", program.name),
                Some(span),
            ));
        }
        programs.push(program);
    }

    Ok(programs)
}

/// Assemble `source` straight into a [`Library`]
pub fn assemble_library(
    source: &str,
    natives: &HashMap<String, RoutineId>,
) -> ParseResult<Library> {
    Ok(assemble(source, natives)?.into_iter().collect())
}

/* ===================== Builders ===================== */

fn build_proc(
    pair: Pair<'_>,
    source: &str,
    natives: &HashMap<String, RoutineId>,
) -> ParseResult<Program> {
    let mut inner = pair.into_inner();
    let name = inner
        .next()
        .map(|p| p.as_str().to_string())
        .ok_or_else(|| ParseError::BuildError("procedure without a name".to_string(), None))?;

    let lines: Vec<Pair<'_>> = inner.filter(|p| p.as_rule() != Rule::kw_end).collect();

    // First pass: label positions
    let mut labels: HashMap<&str, usize> = HashMap::new();
    let mut index = 0;
    for line in &lines {
        match line.as_rule() {
            Rule::label => {
                let label = line.as_str().trim_end_matches(':').trim();
                if labels.insert(label, index).is_some() {
                    return Err(ParseError::BuildError(
                        format!("duplicate label `{}` in `{}`", label, name),
                        Some(pair_to_span(line, source)),
                    ));
                }
            }
            Rule::instr => index += 1,
            _ => {}
        }
    }

    // Second pass: instructions
    let mut code = Vec::with_capacity(index);
    for line in lines {
        if line.as_rule() == Rule::instr {
            code.push(build_instr(line, source, &labels, natives)?);
        }
    }

    Ok(Program::new(name, code))
}

fn build_instr(
    pair: Pair<'_>,
    source: &str,
    labels: &HashMap<&str, usize>,
    natives: &HashMap<String, RoutineId>,
) -> ParseResult<Op> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();
    let mnemonic = inner.next().map(|p| p.as_str()).unwrap_or_default();
    let operand = inner.next();

    let err = |msg: String| ParseError::BuildError(msg, Some(span));

    let no_operand = |op: Op| match &operand {
        None => Ok(op),
        Some(_) => Err(err(format!("`{}` takes no operand", mnemonic))),
    };

    let label_operand = || -> ParseResult<usize> {
        let Some(p) = &operand else {
            return Err(err(format!("`{}` needs a label", mnemonic)));
        };
        match p.as_rule() {
            Rule::ident => labels
                .get(p.as_str())
                .copied()
                .ok_or_else(|| err(format!("unknown label `{}`", p.as_str()))),
            Rule::int => p
                .as_str()
                .parse()
                .map_err(|_| err(format!("bad target `{}`", p.as_str()))),
            _ => Err(err(format!("`{}` needs a label", mnemonic))),
        }
    };

    match mnemonic {
        "push" => {
            let Some(p) = &operand else {
                return Err(err("`push` needs an operand".to_string()));
            };
            match p.as_rule() {
                Rule::int => p
                    .as_str()
                    .parse()
                    .map(Op::PushInt)
                    .map_err(|_| err(format!("integer out of range: {}", p.as_str()))),
                Rule::string => Ok(Op::PushStr(unescape(
                    p.clone().into_inner().next().map(|i| i.as_str()).unwrap_or(""),
                ))),
                Rule::bytes => parse_hex(&p.as_str()[2..])
                    .map(Op::PushBytes)
                    .ok_or_else(|| err(format!("odd-length byte literal {}", p.as_str()))),
                Rule::ident => match p.as_str() {
                    "true" => Ok(Op::PushBool(true)),
                    "false" => Ok(Op::PushBool(false)),
                    "null" => Ok(Op::PushNull),
                    other => Err(err(format!("cannot push `{}`", other))),
                },
                _ => Err(err("unsupported operand".to_string())),
            }
        }
        "pop" => no_operand(Op::Pop),
        "dup" => no_operand(Op::Dup),
        "swap" => no_operand(Op::Swap),
        "add" => no_operand(Op::Add),
        "sub" => no_operand(Op::Sub),
        "mul" => no_operand(Op::Mul),
        "div" => no_operand(Op::Div),
        "eq" => no_operand(Op::Eq),
        "not" => no_operand(Op::Not),
        "throw" => no_operand(Op::Throw),
        "log" => no_operand(Op::Log),
        "ret" => no_operand(Op::Ret),
        "jump" => label_operand().map(Op::Jump),
        "jump_if" => label_operand().map(Op::JumpIf),
        "catch" => label_operand().map(Op::Catch),
        "native" => {
            let Some(p) = &operand else {
                return Err(err("`native` needs a routine".to_string()));
            };
            match p.as_rule() {
                Rule::int => p
                    .as_str()
                    .parse()
                    .map(Op::Native)
                    .map_err(|_| err(format!("bad routine id `{}`", p.as_str()))),
                Rule::ident => natives
                    .get(p.as_str())
                    .copied()
                    .map(Op::Native)
                    .ok_or_else(|| err(format!("unknown native routine `{}`", p.as_str()))),
                _ => Err(err("`native` needs a routine".to_string())),
            }
        }
        other => Err(err(format!("unknown instruction `{}`", other))),
    }
}

/* ===================== Literal Helpers ===================== */

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn parse_hex(digits: &str) -> Option<Vec<u8>> {
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

/* ===================== Span Helpers ===================== */

/// Convert a PEST pair's span to our Span type
fn pair_to_span(pair: &Pair<'_>, source: &str) -> Span {
    let pest_span = pair.as_span();
    let start = pest_span.start();
    let end = pest_span.end();

    let (start_line, start_col) = offset_to_line_col(source, start);
    let (end_line, end_col) = offset_to_line_col(source, end);

    Span {
        start,
        end,
        start_line,
        start_col,
        end_line,
        end_col,
    }
}

/// Convert byte offset to (line, column) - 0-indexed
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 0;
    let mut col = 0;
    let mut current_offset = 0;

    for ch in source.chars() {
        if current_offset >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
        current_offset += ch.len_utf8();
    }

    (line, col)
}
