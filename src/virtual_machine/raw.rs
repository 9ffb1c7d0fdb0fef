//! Unresolved assembler input.
//!
//! A parser (the one in [`parser`](super::parser) or any external one) turns
//! source text into a list of [`RawRecord`]s. Nothing in here has been checked
//! against a symbol table yet: operands still hold expression trees and modes
//! and modifiers may be missing.

use crate::virtual_machine::isa::{Mode, Modifier, Opcode};
use std::fmt::{self, Display};

/// Binary operator in a constant expression.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    /// Floor division.
    Div,
    /// Truncating remainder.
    Mod,
}

impl BinOp {
    pub const fn symbol(&self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
            BinOp::Mod => '%',
        }
    }

    /// Applies the operator, returning `None` for a zero divisor.
    ///
    /// Overflow wraps. Shared with the arithmetic opcodes, which give the same
    /// meaning to `/` and `%` at run time.
    pub fn apply(&self, lhs: i64, rhs: i64) -> Option<i64> {
        match self {
            BinOp::Add => Some(lhs.wrapping_add(rhs)),
            BinOp::Sub => Some(lhs.wrapping_sub(rhs)),
            BinOp::Mul => Some(lhs.wrapping_mul(rhs)),
            BinOp::Div => (rhs != 0).then(|| floor_div(lhs, rhs)),
            BinOp::Mod => (rhs != 0).then(|| lhs.wrapping_rem(rhs)),
        }
    }
}

fn floor_div(lhs: i64, rhs: i64) -> i64 {
    let q = lhs.wrapping_div(rhs);
    if lhs.wrapping_rem(rhs) != 0 && ((lhs < 0) != (rhs < 0)) {
        q - 1
    } else {
        q
    }
}

/// Constant expression over literals and labels.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr {
    Number(i64),
    /// Label reference, resolved relative to the using instruction.
    Symbol(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn symbol(name: impl Into<String>) -> Self {
        Expr::Symbol(name.into())
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::Number(value)
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Symbol(s) => f.write_str(s),
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

/// Operand before resolution. A missing mode assembles as [`Mode::Direct`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawOperand {
    pub mode: Option<Mode>,
    pub expr: Expr,
}

impl RawOperand {
    pub fn new(mode: Option<Mode>, expr: impl Into<Expr>) -> Self {
        Self {
            mode,
            expr: expr.into(),
        }
    }
}

/// Instruction before resolution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawInstruction {
    pub opcode: Opcode,
    pub modifier: Option<Modifier>,
    pub a: RawOperand,
    /// `None` for the single-operand form.
    pub b: Option<RawOperand>,
}

/// What a record contributes to the program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RawBody {
    /// A real instruction; occupies one cell.
    Instruction(RawInstruction),
    /// `ORG expr` sets the start offset.
    Org(Expr),
    /// `END [expr]` ends the program, optionally setting the start offset.
    End(Option<Expr>),
    /// `label EQU expr` binds its labels to `expr` instead of an address.
    Equ(Expr),
}

impl RawBody {
    /// Whether this record occupies a cell (advances the program counter).
    pub fn is_instruction(&self) -> bool {
        matches!(self, RawBody::Instruction(_))
    }
}

/// One parsed line: its labels and its body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawRecord {
    pub labels: Vec<String>,
    /// 1-based source line, when the record came from text.
    pub line: Option<usize>,
    pub body: RawBody,
}

impl RawRecord {
    pub fn new(labels: Vec<String>, body: RawBody) -> Self {
        Self {
            labels,
            line: None,
            body,
        }
    }

    pub fn instruction(
        labels: Vec<String>,
        opcode: Opcode,
        modifier: Option<Modifier>,
        a: RawOperand,
        b: Option<RawOperand>,
    ) -> Self {
        Self::new(
            labels,
            RawBody::Instruction(RawInstruction {
                opcode,
                modifier,
                a,
                b,
            }),
        )
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expr_display_parenthesizes_binary() {
        let e = Expr::binary(
            BinOp::Sub,
            Expr::symbol("bomb"),
            Expr::binary(BinOp::Mul, Expr::Number(2), Expr::Number(-3)),
        );
        assert_eq!(e.to_string(), "(bomb - (2 * -3))");
    }

    #[test]
    fn division_floors_and_remainder_truncates() {
        assert_eq!(BinOp::Div.apply(7, 2), Some(3));
        assert_eq!(BinOp::Div.apply(-7, 2), Some(-4));
        assert_eq!(BinOp::Div.apply(7, -2), Some(-4));
        assert_eq!(BinOp::Div.apply(-8, 2), Some(-4));
        assert_eq!(BinOp::Mod.apply(-7, 2), Some(-1));
        assert_eq!(BinOp::Mod.apply(7, -2), Some(1));
        assert_eq!(BinOp::Div.apply(1, 0), None);
        assert_eq!(BinOp::Mod.apply(1, 0), None);
    }

    #[test]
    fn arithmetic_wraps_instead_of_panicking() {
        assert_eq!(BinOp::Add.apply(i64::MAX, 1), Some(i64::MIN));
        assert_eq!(BinOp::Mul.apply(i64::MIN, -1), Some(i64::MIN));
        assert_eq!(BinOp::Div.apply(i64::MIN, -1), Some(i64::MIN));
        assert_eq!(BinOp::Mod.apply(i64::MIN, -1), Some(0));
    }

    #[test]
    fn only_instructions_occupy_cells() {
        assert!(!RawBody::Org(Expr::Number(0)).is_instruction());
        assert!(!RawBody::End(None).is_instruction());
        assert!(!RawBody::Equ(Expr::Number(1)).is_instruction());
        let rec = RawRecord::instruction(
            vec![],
            Opcode::Jmp,
            None,
            RawOperand::new(None, 0),
            None,
        );
        assert!(rec.body.is_instruction());
        assert_eq!(rec.at_line(3).line, Some(3));
    }
}
