//! Redcode assembler and MARS execution engine.
//!
//! Source text goes through [`parser`] into [`raw`] records, which
//! [`assembler`] resolves into a [`program::Program`]. A [`vm::VM`] loads one
//! program per warrior into a shared core and runs the match.
//!
//! # Instruction model
//!
//! - **Opcodes**: `DAT MOV ADD SUB MUL DIV MOD JMP JMZ JMN DJN CMP SLT SPL`
//! - **Modes**: `#` immediate, `$` direct, `@` indirect, `<` pre-decrement
//!   indirect, `>` post-increment indirect
//! - **Modifiers**: `.A .B .AB .BA .F .X .I`, inferred when omitted
//!
//! # Modules
//!
//! - [`assembler`]: Symbol resolution, program assembly and diagnostics
//! - [`defaults`]: Default modifier rules
//! - [`errors`]: Assembly and execution error types
//! - [`isa`]: Opcode table, addressing modes and modifiers
//! - [`operand`]: Resolved operands and instructions
//! - [`options`]: Match configuration and presets
//! - [`parser`]: Text front-end producing raw records
//! - [`program`]: Assembled programs and their metadata
//! - [`raw`]: Unresolved assembler input
//! - [`vm`]: Core memory, warriors, scheduling and opcode semantics

pub mod assembler;
pub mod defaults;
pub mod errors;
pub mod isa;
pub mod operand;
pub mod options;
pub mod parser;
pub mod program;
pub mod raw;
pub mod vm;
