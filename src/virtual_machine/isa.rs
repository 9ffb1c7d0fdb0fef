//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_opcode!`](crate::for_each_opcode) macro holds the canonical
//! opcode table and invokes a callback macro for code generation, so the
//! enum, the default-modifier lookup and the VM dispatch table are all
//! generated from one list.
//!
//! This module generates:
//! - The [`Opcode`] enum with numeric codes and mnemonics
//! - `TryFrom<u8>` for decoding opcodes
//!
//! It also defines the two other instruction-level enums, [`Mode`] and
//! [`Modifier`], which are small enough to spell out by hand.
//!
//! # Textual form
//!
//! ```text
//! OPCODE.MODIFIER <mode>value, <mode>value
//! MOV.I $0, $1
//! ```

use crate::virtual_machine::raw::BinOp;
use std::fmt::{self, Display};

/// Invokes a callback macro with the complete opcode definition list.
///
/// Each entry is `Name = code, "MNEMONIC" => handler, default_rules`, where
/// `handler` names the executing function in [`vm`](super::vm) and
/// `default_rules` names the rule list in [`defaults`](super::defaults).
#[macro_export]
macro_rules! for_each_opcode {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Data
            // =========================
            /// DAT a, b ; kills the executing task
            Dat = 0x0, "DAT" => op_dat, DAT_RULES,
            /// MOV a, b ; copies fields (or the whole cell with .I) from A to B
            Mov = 0x1, "MOV" => op_mov, DATA_RULES,
            // =========================
            // Arithmetic
            // =========================
            /// ADD a, b ; B = B + A
            Add = 0x2, "ADD" => op_arithmetic, ARITH_RULES,
            /// SUB a, b ; B = B - A
            Sub = 0x3, "SUB" => op_arithmetic, ARITH_RULES,
            /// MUL a, b ; B = B * A
            Mul = 0x4, "MUL" => op_arithmetic, ARITH_RULES,
            /// DIV a, b ; B = floor(B / A), kills the task when A is zero
            Div = 0x5, "DIV" => op_arithmetic, ARITH_RULES,
            /// MOD a, b ; B = B % A, kills the task when A is zero
            Mod = 0x6, "MOD" => op_arithmetic, ARITH_RULES,
            // =========================
            // Control Flow
            // =========================
            /// JMP a ; continue at A
            Jmp = 0x7, "JMP" => op_jmp, BRANCH_RULES,
            /// JMZ a, b ; continue at A if B is zero
            Jmz = 0x8, "JMZ" => op_jmz, BRANCH_RULES,
            /// JMN a, b ; continue at A if B is non-zero
            Jmn = 0x9, "JMN" => op_jmn, BRANCH_RULES,
            /// DJN a, b ; decrement B, continue at A if B is non-zero
            Djn = 0xA, "DJN" => op_djn, BRANCH_RULES,
            // =========================
            // Comparison
            // =========================
            /// CMP a, b ; skip the next instruction if A equals B
            Cmp = 0xB, "CMP" => op_cmp, DATA_RULES,
            /// SLT a, b ; skip the next instruction if A is less than B
            Slt = 0xC, "SLT" => op_slt, SLT_RULES,
            // =========================
            // Tasks
            // =========================
            /// SPL a ; continue at the next instruction and spawn a task at A
            Spl = 0xD, "SPL" => op_spl, BRANCH_RULES,
        }
    };
}

#[macro_export]
macro_rules! define_opcodes {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:literal, $mnemonic:literal => $handler:ident, $rules:ident
        ),* $(,)?
    ) => {
        /// Operation performed by an instruction.
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $code,
            )*
        }

        impl TryFrom<u8> for Opcode {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $code => Ok(Opcode::$name), )*
                    other => Err(other),
                }
            }
        }

        impl Opcode {
            /// Every opcode in code order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name ),* ];

            /// Returns the assembly mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            /// Looks up an opcode by mnemonic, ignoring ASCII case.
            pub fn from_mnemonic(name: &str) -> Option<Opcode> {
                $(
                    if name.eq_ignore_ascii_case($mnemonic) {
                        return Some(Opcode::$name);
                    }
                )*
                None
            }
        }
    };
}

for_each_opcode!(define_opcodes);

impl Opcode {
    /// The operator an arithmetic opcode applies to its fields.
    pub const fn arithmetic_op(&self) -> Option<BinOp> {
        match self {
            Opcode::Add => Some(BinOp::Add),
            Opcode::Sub => Some(BinOp::Sub),
            Opcode::Mul => Some(BinOp::Mul),
            Opcode::Div => Some(BinOp::Div),
            Opcode::Mod => Some(BinOp::Mod),
            _ => None,
        }
    }

    /// Whether the opcode is one of the five arithmetic operations.
    pub const fn is_arithmetic(&self) -> bool {
        self.arithmetic_op().is_some()
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Addressing mode of an operand.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Mode {
    /// `#` the operand is a literal; it addresses its own cell.
    Immediate,
    /// `$` the operand is an offset from the current instruction.
    Direct,
    /// `@` the B-field of the offset cell is a further offset.
    Indirect,
    /// `<` like `@`, decrementing the intermediate B-field first.
    PreDecrementIndirect,
    /// `>` like `@`, incrementing the intermediate B-field afterwards.
    PostIncrementIndirect,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::Immediate,
        Mode::Direct,
        Mode::Indirect,
        Mode::PreDecrementIndirect,
        Mode::PostIncrementIndirect,
    ];

    /// Returns the single-character prefix used in source text.
    pub const fn sigil(&self) -> char {
        match self {
            Mode::Immediate => '#',
            Mode::Direct => '$',
            Mode::Indirect => '@',
            Mode::PreDecrementIndirect => '<',
            Mode::PostIncrementIndirect => '>',
        }
    }

    pub const fn from_sigil(c: char) -> Option<Mode> {
        match c {
            '#' => Some(Mode::Immediate),
            '$' => Some(Mode::Direct),
            '@' => Some(Mode::Indirect),
            '<' => Some(Mode::PreDecrementIndirect),
            '>' => Some(Mode::PostIncrementIndirect),
            _ => None,
        }
    }

    /// Whether this mode dereferences a second cell.
    pub const fn is_indirect(&self) -> bool {
        matches!(
            self,
            Mode::Indirect | Mode::PreDecrementIndirect | Mode::PostIncrementIndirect
        )
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sigil())
    }
}

/// Selects which fields of the A and B instructions an opcode works on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Modifier {
    /// A-field to A-field.
    A,
    /// B-field to B-field.
    B,
    /// A-field to B-field.
    AB,
    /// B-field to A-field.
    BA,
    /// Both fields, A to A and B to B.
    F,
    /// Both fields, crossed: A to B and B to A.
    X,
    /// The whole instruction (fields behave like `F` for arithmetic).
    I,
}

impl Modifier {
    pub const ALL: [Modifier; 7] = [
        Modifier::A,
        Modifier::B,
        Modifier::AB,
        Modifier::BA,
        Modifier::F,
        Modifier::X,
        Modifier::I,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Modifier::A => "A",
            Modifier::B => "B",
            Modifier::AB => "AB",
            Modifier::BA => "BA",
            Modifier::F => "F",
            Modifier::X => "X",
            Modifier::I => "I",
        }
    }

    /// Looks up a modifier by name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Modifier> {
        Modifier::ALL
            .into_iter()
            .find(|m| name.eq_ignore_ascii_case(m.as_str()))
    }
}

impl Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
