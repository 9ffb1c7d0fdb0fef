//! Fully resolved operand and instruction values.
//!
//! These are what the assembler produces and what core cells hold. They carry
//! no symbolic content: every label and expression has already been folded
//! into a plain offset.

use crate::virtual_machine::isa::{Mode, Modifier, Opcode};
use std::fmt::{self, Display};

/// One operand of an instruction.
///
/// `value` is a core-relative offset, or a literal when `mode` is
/// [`Mode::Immediate`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Operand {
    pub mode: Mode,
    pub value: i64,
}

impl Operand {
    pub const fn new(mode: Mode, value: i64) -> Self {
        Self { mode, value }
    }

    /// `#value`
    pub const fn immediate(value: i64) -> Self {
        Self::new(Mode::Immediate, value)
    }

    /// `$value`
    pub const fn direct(value: i64) -> Self {
        Self::new(Mode::Direct, value)
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.mode, self.value)
    }
}

/// A single core cell.
///
/// Equality is structural over all six components. The type is `Copy`, so
/// moving an instruction between cells never aliases the source.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub modifier: Modifier,
    pub a: Operand,
    pub b: Operand,
}

impl Instruction {
    pub const fn new(opcode: Opcode, modifier: Modifier, a: Operand, b: Operand) -> Self {
        Self {
            opcode,
            modifier,
            a,
            b,
        }
    }

    /// `DAT.F #0, #0`, the conventional empty cell.
    pub const fn empty() -> Self {
        Self::new(
            Opcode::Dat,
            Modifier::F,
            Operand::immediate(0),
            Operand::immediate(0),
        )
    }
}

impl Default for Instruction {
    fn default() -> Self {
        Self::empty()
    }
}

/// Canonical rendering, e.g. `ADD.AB #4, $0`.
///
/// The output parses back to the same instruction with
/// [`assemble_instruction`](super::assembler::assemble_instruction).
impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} {}, {}",
            self.opcode, self.modifier, self.a, self.b
        )
    }
}
