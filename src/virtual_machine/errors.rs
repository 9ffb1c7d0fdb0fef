use crate::virtual_machine::isa::{Mode, Opcode};
use thiserror::Error;

/// Errors that can occur while parsing or assembling Redcode.
///
/// Assembly is all-or-nothing: any of these aborts with no partial program.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AsmError {
    /// Malformed source text.
    #[error("line {line}:{offset}: {message}")]
    Parse {
        line: usize,
        offset: usize,
        message: String,
    },
    /// Label defined more than once.
    #[error("duplicate symbol: {symbol}")]
    DuplicateSymbol { symbol: String },
    /// Reference to a label that was never defined.
    #[error("undefined symbol: {symbol}")]
    UndefinedSymbol { symbol: String },
    /// EQU definitions that refer back to themselves.
    #[error("circular EQU definition: {symbol}")]
    CircularEquate { symbol: String },
    /// Constant expression divides or takes a remainder by zero.
    #[error("division by zero in constant expression")]
    DivisionByZero,
    /// A real instruction follows an `END` pseudo-op.
    #[error("instruction after END")]
    InstructionAfterEnd,
    /// `ORG`/`END` target falls outside the assembled code.
    #[error("start index {index} outside program of length {len}")]
    StartIndexOutOfRange { index: i64, len: usize },
    /// The default modifier table has no rule for this combination.
    ///
    /// Unreachable while the table in [`defaults`](super::defaults) stays total.
    #[error("no default modifier for {opcode} {a_mode}/{b_mode}")]
    NoDefaultModifierMatched {
        opcode: Opcode,
        a_mode: Mode,
        b_mode: Mode,
    },
    /// Semantic error attributed to a source line.
    #[error("line {line}: {source}")]
    AtLine {
        line: usize,
        #[source]
        source: Box<AsmError>,
    },
    /// Source file could not be read.
    #[error("io error reading {path}: {reason}")]
    Io { path: String, reason: String },
}

impl AsmError {
    /// Attaches a source line to errors that do not already carry one.
    pub(crate) fn at_line(self, line: Option<usize>) -> Self {
        match (self, line) {
            (err @ (AsmError::Parse { .. } | AsmError::AtLine { .. }), _) => err,
            (err, Some(line)) => AsmError::AtLine {
                line,
                source: Box::new(err),
            },
            (err, None) => err,
        }
    }

    /// Returns the innermost error, skipping line attribution.
    pub fn root(&self) -> &AsmError {
        match self {
            AsmError::AtLine { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors raised while configuring or driving a match.
///
/// Simulation outcomes (a task hitting `DAT`, a division by zero, a warrior
/// dying) are not errors; they only show up in scheduling state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VMError {
    /// A step was requested for a warrior with an empty task queue.
    #[error("warrior {id} has no tasks left to execute")]
    DeadWarrior { id: usize },
    /// `VmOptions` failed validation.
    #[error("invalid options: {reason}")]
    InvalidOptions { reason: String },
    /// Number of programs does not match `num_warriors`.
    #[error("expected {expected} warriors, got {actual}")]
    WarriorCountMismatch { expected: usize, actual: usize },
    /// Program exceeds `instruction_limit`.
    #[error("warrior {id} has {len} instructions, limit is {limit}")]
    ProgramTooLong { id: usize, len: usize, limit: usize },
    /// Program is longer than the distance to the next warrior.
    #[error("warrior {id} has {len} instructions but warriors are only {separation} apart")]
    ProgramOverlaps {
        id: usize,
        len: usize,
        separation: usize,
    },
    /// Random placement cannot fit every warrior with the minimum separation.
    #[error("core of size {core_size} cannot hold {warriors} warriors {separation} apart")]
    CoreTooSmall {
        core_size: usize,
        warriors: usize,
        separation: usize,
    },
    /// Warrior index passed to a single-step entry point does not exist.
    #[error("no warrior at index {index}")]
    UnknownWarrior { index: usize },
}
