//! Redcode assembler.
//!
//! Resolves [`RawRecord`]s into a [`Program`] in two passes:
//!
//! 1. Walk the records assigning every label the current program counter
//!    (or, for `EQU`, its expression). Only real instructions advance the
//!    counter, so labels may be used before they are defined.
//! 2. Walk again, evaluating operand expressions against the running counter,
//!    filling in default modes and modifiers, and tracking `ORG`/`END`.
//!
//! Label references are always PC-relative: a symbol evaluates to
//! `address - pc` of the instruction that uses it. `ORG` and `END` targets
//! are evaluated at pc 0, which makes them absolute offsets into the code.
//!
//! Text input goes through [`parser`](super::parser) first; see
//! [`assemble_source`] and [`assemble_file`].

use crate::error;
use crate::virtual_machine::defaults::default_modifier;
use crate::virtual_machine::errors::AsmError;
use crate::virtual_machine::isa::{Mode, Opcode};
use crate::virtual_machine::operand::{Instruction, Operand};
use crate::virtual_machine::parser::{parse_instruction, parse_source};
use crate::virtual_machine::program::{Metadata, Program};
use crate::virtual_machine::raw::{Expr, RawBody, RawInstruction, RawOperand, RawRecord};
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

/// What a symbol stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    /// Label on an instruction: its offset from the start of the code.
    Address(usize),
    /// `EQU` binding, substituted at each use.
    Equate(Expr),
}

/// Symbol table for one assembly run.
///
/// Built during the first pass and dropped once the [`Program`] exists.
#[derive(Debug, Default)]
pub struct AsmContext {
    symbols: HashMap<String, Symbol>,
}

impl AsmContext {
    /// Creates an empty assembly context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a symbol, rejecting redefinitions.
    pub fn define(&mut self, name: &str, symbol: Symbol) -> Result<(), AsmError> {
        if self.symbols.contains_key(name) {
            return Err(AsmError::DuplicateSymbol {
                symbol: name.to_string(),
            });
        }
        self.symbols.insert(name.to_string(), symbol);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Evaluates `expr` for an instruction at `pc`.
    pub fn evaluate(&self, expr: &Expr, pc: usize) -> Result<i64, AsmError> {
        self.evaluate_in(expr, pc, &mut Vec::new())
    }

    /// `expanding` holds the equates currently being substituted.
    fn evaluate_in<'a>(
        &'a self,
        expr: &'a Expr,
        pc: usize,
        expanding: &mut Vec<&'a str>,
    ) -> Result<i64, AsmError> {
        match expr {
            Expr::Number(n) => Ok(*n),
            Expr::Symbol(name) => match self.symbols.get(name) {
                Some(Symbol::Address(address)) => Ok(*address as i64 - pc as i64),
                Some(Symbol::Equate(inner)) => {
                    if expanding.contains(&name.as_str()) {
                        return Err(AsmError::CircularEquate {
                            symbol: name.clone(),
                        });
                    }
                    expanding.push(name);
                    let value = self.evaluate_in(inner, pc, expanding);
                    expanding.pop();
                    value
                }
                None => Err(AsmError::UndefinedSymbol {
                    symbol: name.clone(),
                }),
            },
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.evaluate_in(lhs, pc, expanding)?;
                let rhs = self.evaluate_in(rhs, pc, expanding)?;
                op.apply(lhs, rhs).ok_or(AsmError::DivisionByZero)
            }
        }
    }

    fn resolve_operand(&self, raw: &RawOperand, pc: usize) -> Result<Operand, AsmError> {
        Ok(Operand::new(
            raw.mode.unwrap_or(Mode::Direct),
            self.evaluate(&raw.expr, pc)?,
        ))
    }
}

/// Resolves one instruction at `pc` against `ctx`.
///
/// A lone operand goes to the B-field for `DAT` and to the A-field for every
/// other opcode; the missing field becomes `#0`.
pub fn assemble_raw_instruction(
    ctx: &AsmContext,
    raw: &RawInstruction,
    pc: usize,
) -> Result<Instruction, AsmError> {
    let zero = Operand::immediate(0);
    let (a, b) = match (&raw.b, raw.opcode) {
        (Some(b), _) => (
            ctx.resolve_operand(&raw.a, pc)?,
            ctx.resolve_operand(b, pc)?,
        ),
        (None, Opcode::Dat) => (zero, ctx.resolve_operand(&raw.a, pc)?),
        (None, _) => (ctx.resolve_operand(&raw.a, pc)?, zero),
    };

    let modifier = match raw.modifier {
        Some(modifier) => modifier,
        None => default_modifier(raw.opcode, a.mode, b.mode)?,
    };

    Ok(Instruction::new(raw.opcode, modifier, a, b))
}

/// First pass: assign every label.
fn collect_symbols(records: &[RawRecord]) -> Result<AsmContext, AsmError> {
    let mut ctx = AsmContext::new();
    let mut pc = 0usize;

    for record in records {
        for label in &record.labels {
            let symbol = match &record.body {
                RawBody::Equ(expr) => Symbol::Equate(expr.clone()),
                _ => Symbol::Address(pc),
            };
            ctx.define(label, symbol)
                .map_err(|e| e.at_line(record.line))?;
        }
        if record.body.is_instruction() {
            pc += 1;
        }
    }

    Ok(ctx)
}

/// Assembles parsed records into a program.
///
/// All-or-nothing: the first error aborts without a partial program. Errors
/// from records that carry a source line are wrapped in
/// [`AsmError::AtLine`].
pub fn assemble(records: &[RawRecord]) -> Result<Program, AsmError> {
    let ctx = collect_symbols(records)?;

    let mut code = Vec::with_capacity(records.len());
    let mut org: Option<i64> = None;
    let mut end: Option<i64> = None;
    let mut ended = false;

    for record in records {
        let located = |e: AsmError| e.at_line(record.line);
        match &record.body {
            RawBody::Instruction(raw) => {
                if ended {
                    return Err(located(AsmError::InstructionAfterEnd));
                }
                let insn = assemble_raw_instruction(&ctx, raw, code.len()).map_err(located)?;
                code.push(insn);
            }
            RawBody::Org(expr) if !ended => {
                org = Some(ctx.evaluate(expr, 0).map_err(located)?);
            }
            RawBody::End(target) if !ended => {
                if let Some(expr) = target {
                    end = Some(ctx.evaluate(expr, 0).map_err(located)?);
                }
                ended = true;
            }
            RawBody::Org(_) | RawBody::End(_) | RawBody::Equ(_) => {}
        }
    }

    let start = end.or(org).unwrap_or(0);
    Program::new(code, start, Metadata::default())
}

/// Assembles one free-standing instruction, e.g. `"JMP #123"`.
///
/// The symbol table is empty, so any label reference is undefined.
pub fn assemble_instruction(text: &str) -> Result<Instruction, AsmError> {
    let raw = parse_instruction(text)?;
    assemble_raw_instruction(&AsmContext::new(), &raw, 0)
}

/// Assemble a full source string into a program, keeping its metadata.
pub fn assemble_source(source: &str) -> Result<Program, AsmError> {
    let (records, metadata) = parse_source(source)?;
    Ok(assemble(&records)?.with_metadata(metadata))
}

/// Convenience: assemble directly from file path.
///
/// On failure a compiler-style diagnostic is logged before the error is
/// returned.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, AsmError> {
    let path_ref = path.as_ref();
    let name = path_ref.display().to_string();
    let source = fs::read_to_string(path_ref).map_err(|e| AsmError::Io {
        path: name.clone(),
        reason: e.to_string(),
    })?;

    let result = assemble_source(&source);
    if let Err(err) = &result {
        error!("{}", render_diagnostic(&name, &source, err));
    }
    result
}

/// Return the line/column/message triple for located errors.
fn diagnostic_location(source: &str, err: &AsmError) -> Option<(usize, usize, String)> {
    match err {
        AsmError::Parse {
            line,
            offset,
            message,
        } => Some((*line, *offset, message.clone())),
        AsmError::AtLine { line, source: inner } => {
            // Point at the first non-blank column of the offending line.
            let column = source
                .lines()
                .nth(line.saturating_sub(1))
                .map_or(1, |text| text.len() - text.trim_start().len() + 1);
            Some((*line, column, inner.root().to_string()))
        }
        _ => None,
    }
}

/// Formats a compiler-style diagnostic for an assembly failure.
///
/// ```text
/// error: undefined symbol: bomb
///  --> dwarf.red:3:3
///   |
///    3 |   MOV bomb, @bomb
///   | ^
/// ```
pub fn render_diagnostic(file: &str, source: &str, err: &AsmError) -> String {
    let Some((line, offset, message)) = diagnostic_location(source, err) else {
        return format!("error: {err}\n");
    };

    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{offset}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(offset.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::Modifier;
    use crate::virtual_machine::raw::BinOp;
    use proptest::prelude::*;
    use std::io::Write as _;

    fn insn(text: &str) -> Instruction {
        assemble_instruction(text).unwrap()
    }

    fn code_of(source: &str) -> Vec<Instruction> {
        assemble_source(source).unwrap().code().to_vec()
    }

    #[test]
    fn assemble_instruction_literal() {
        assert_eq!(
            insn("ADD.AB #4, $0"),
            Instruction::new(
                Opcode::Add,
                Modifier::AB,
                Operand::immediate(4),
                Operand::direct(0),
            )
        );
    }

    #[test]
    fn missing_mode_defaults_to_direct() {
        let i = insn("MOV 0, 1");
        assert_eq!(i.a, Operand::direct(0));
        assert_eq!(i.b, Operand::direct(1));
        assert_eq!(i.modifier, Modifier::I);
    }

    #[test]
    fn default_modifiers_follow_modes() {
        assert_eq!(insn("MOV #1, 2").modifier, Modifier::AB);
        assert_eq!(insn("MOV 1, #2").modifier, Modifier::B);
        assert_eq!(insn("CMP @1, <2").modifier, Modifier::I);
        assert_eq!(insn("SUB 1, 2").modifier, Modifier::AB);
        assert_eq!(insn("SLT 1, 2").modifier, Modifier::B);
        assert_eq!(insn("SLT #1, 2").modifier, Modifier::AB);
        assert_eq!(insn("DAT #1, #2").modifier, Modifier::F);
        assert_eq!(insn("JMN 1, #2").modifier, Modifier::B);
    }

    #[test]
    fn single_operand_forms() {
        assert_eq!(insn("DAT #7"), insn("DAT.F #0, #7"));
        assert_eq!(insn("JMP -1"), insn("JMP.B $-1, #0"));
        assert_eq!(insn("SPL 2"), insn("SPL.B $2, #0"));
    }

    #[test]
    fn labels_are_pc_relative() {
        let code = code_of("top  ADD #4, bomb\n     MOV bomb, @bomb\n     JMP top\nbomb DAT #0\n");
        assert_eq!(code[0], insn("ADD.AB #4, $3"));
        assert_eq!(code[1], insn("MOV.I $2, @2"));
        assert_eq!(code[2], insn("JMP.B $-2, #0"));
        assert_eq!(code[3], insn("DAT.F #0, #0"));
    }

    #[test]
    fn expressions_fold_with_floor_division() {
        let code = code_of("DAT #-7 / 2, #-7 % 2\nDAT #(1 + 2) * 3, #here - 1\nhere DAT 0\n");
        assert_eq!(code[0], insn("DAT.F #-4, #-1"));
        assert_eq!(code[1], insn("DAT.F #9, #0"));
    }

    #[test]
    fn equ_substitutes_at_each_use() {
        let code = code_of("step EQU 4\ngap  EQU step * 2\n ADD #gap, target\ntarget DAT #step\n");
        assert_eq!(code[0], insn("ADD.AB #8, $1"));
        assert_eq!(code[1], insn("DAT.F #0, #4"));
    }

    #[test]
    fn equ_of_label_stays_relative_to_user() {
        let code = code_of("ptr EQU tail\n JMP ptr\n JMP ptr\ntail DAT 0\n");
        assert_eq!(code[0].a.value, 2);
        assert_eq!(code[1].a.value, 1);
    }

    #[test]
    fn circular_equ_is_rejected() {
        let err = assemble_source("a EQU b\nb EQU a\n DAT #a\n").unwrap_err();
        assert_eq!(
            err.root(),
            &AsmError::CircularEquate {
                symbol: "a".to_string()
            }
        );
    }

    #[test]
    fn division_by_zero_is_an_assembly_error() {
        let err = assemble_source("DAT #1, #4 / (2 - 2)\n").unwrap_err();
        assert_eq!(
            err,
            AsmError::AtLine {
                line: 1,
                source: Box::new(AsmError::DivisionByZero),
            }
        );
        assert_eq!(
            assemble_instruction("DAT #1 % 0").unwrap_err(),
            AsmError::DivisionByZero
        );
    }

    #[test]
    fn duplicate_label_error() {
        let err = assemble_source("x DAT 0\nx DAT 1\n").unwrap_err();
        assert_eq!(
            err,
            AsmError::AtLine {
                line: 2,
                source: Box::new(AsmError::DuplicateSymbol {
                    symbol: "x".to_string()
                }),
            }
        );
    }

    #[test]
    fn undefined_label_error() {
        let err = assemble_source("JMP nowhere\n").unwrap_err();
        assert_eq!(
            err.root(),
            &AsmError::UndefinedSymbol {
                symbol: "nowhere".to_string()
            }
        );
        assert!(matches!(
            assemble_instruction("JMP start"),
            Err(AsmError::UndefinedSymbol { .. })
        ));
    }

    #[test]
    fn org_and_end_set_start_index() {
        let program = assemble_source(" ORG go\n DAT 0\ngo JMP 0\n").unwrap();
        assert_eq!(program.start_index(), 1);

        let program = assemble_source(" ORG 0\n DAT 0\n DAT 0\ngo JMP 0\n END go\n").unwrap();
        assert_eq!(program.start_index(), 2);

        let program = assemble_source(" DAT 0\n JMP 0\n END\n").unwrap();
        assert_eq!(program.start_index(), 0);
    }

    #[test]
    fn most_recent_org_wins() {
        let program = assemble_source(" ORG 1\n ORG 2\n DAT 0\n DAT 0\n DAT 0\n").unwrap();
        assert_eq!(program.start_index(), 2);
    }

    #[test]
    fn instruction_after_end_error() {
        let err = assemble_source(" DAT 0\n END\n DAT 1\n").unwrap_err();
        assert_eq!(
            err,
            AsmError::AtLine {
                line: 3,
                source: Box::new(AsmError::InstructionAfterEnd),
            }
        );
    }

    #[test]
    fn pseudo_ops_after_end_are_ignored() {
        let program = assemble_source(" DAT 0\n JMP 0\n END 1\n ORG 0\n").unwrap();
        assert_eq!(program.start_index(), 1);
    }

    #[test]
    fn start_index_out_of_range() {
        assert_eq!(
            assemble_source(" DAT 0\n END 1\n").unwrap_err(),
            AsmError::StartIndexOutOfRange { index: 1, len: 1 }
        );
        assert_eq!(
            assemble_source("").unwrap_err(),
            AsmError::StartIndexOutOfRange { index: 0, len: 0 }
        );
    }

    #[test]
    fn structured_records_without_lines() {
        let records = vec![
            RawRecord::instruction(
                vec!["loop".to_string()],
                Opcode::Djn,
                None,
                RawOperand::new(None, Expr::symbol("loop")),
                Some(RawOperand::new(Some(Mode::Immediate), 3)),
            ),
            RawRecord::new(vec![], RawBody::End(Some(Expr::symbol("loop")))),
        ];
        let program = assemble(&records).unwrap();
        assert_eq!(program.code(), &[insn("DJN.B $0, #3")]);
        assert_eq!(program.start_index(), 0);

        let bad = vec![RawRecord::instruction(
            vec![],
            Opcode::Dat,
            None,
            RawOperand::new(
                None,
                Expr::binary(BinOp::Div, Expr::Number(1), Expr::Number(0)),
            ),
            None,
        )];
        assert_eq!(assemble(&bad).unwrap_err(), AsmError::DivisionByZero);
    }

    #[test]
    fn metadata_is_kept() {
        let program = assemble_source(";name Imp\n;author A. K. Dewdney\nMOV 0, 1\n").unwrap();
        assert_eq!(program.metadata().name.as_deref(), Some("Imp"));
        assert_eq!(program.metadata().author.as_deref(), Some("A. K. Dewdney"));
    }

    #[test]
    fn context_define_and_lookup() {
        let mut ctx = AsmContext::new();
        ctx.define("a", Symbol::Address(3)).unwrap();
        assert_eq!(ctx.get("a"), Some(&Symbol::Address(3)));
        assert!(matches!(
            ctx.define("a", Symbol::Address(4)),
            Err(AsmError::DuplicateSymbol { .. })
        ));
        assert_eq!(ctx.evaluate(&Expr::symbol("a"), 5), Ok(-2));
    }

    #[test]
    fn render_diagnostic_parse_error() {
        let source = "DAT 0\nMOV.Q 0, 1\n";
        let err = assemble_source(source).unwrap_err();
        let diag = render_diagnostic("imp.red", source, &err);
        assert_eq!(
            diag,
            "error: unknown modifier `Q`\n --> imp.red:2:5\n  |\n   2 | MOV.Q 0, 1\n  |     ^\n"
        );
    }

    #[test]
    fn render_diagnostic_semantic_error_points_at_line_start() {
        let source = "  JMP nowhere\n";
        let err = assemble_source(source).unwrap_err();
        let diag = render_diagnostic("x.red", source, &err);
        assert!(diag.starts_with("error: undefined symbol: nowhere\n --> x.red:1:3\n"));
        assert!(diag.ends_with("  |   ^\n"));
    }

    #[test]
    fn render_diagnostic_without_location() {
        let diag = render_diagnostic("x.red", "", &AsmError::DivisionByZero);
        assert_eq!(diag, "error: division by zero in constant expression\n");
    }

    #[test]
    fn assemble_file_reads_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ";name Dwarf").unwrap();
        writeln!(file, "bomb DAT #0").unwrap();
        writeln!(file, "top  ADD #4, bomb").unwrap();
        writeln!(file, "     MOV bomb, @bomb").unwrap();
        writeln!(file, "     JMP top").unwrap();
        writeln!(file, "     END top").unwrap();
        file.flush().unwrap();

        let program = assemble_file(file.path()).unwrap();
        assert_eq!(program.len(), 4);
        assert_eq!(program.start_index(), 1);
        assert_eq!(program.metadata().name.as_deref(), Some("Dwarf"));
        assert_eq!(program.code()[1], insn("ADD.AB #4, $-1"));
    }

    #[test]
    fn assemble_file_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.red");
        assert!(matches!(
            assemble_file(&path),
            Err(AsmError::Io { .. })
        ));
    }

    #[test]
    fn extreme_values_round_trip() {
        let low = assemble_instruction("DAT #0, #-9223372036854775807 - 1").unwrap();
        assert_eq!(low.b.value, i64::MIN);
        assert_eq!(assemble_instruction(&low.to_string()).unwrap(), low);

        let high = assemble_instruction("DAT #9223372036854775807, #0").unwrap();
        assert_eq!(high.a.value, i64::MAX);
        assert_eq!(assemble_instruction(&high.to_string()).unwrap(), high);
    }

    fn arb_instruction() -> impl Strategy<Value = Instruction> {
        (
            prop::sample::select(Opcode::ALL.to_vec()),
            prop::sample::select(Modifier::ALL.to_vec()),
            prop::sample::select(Mode::ALL.to_vec()),
            any::<i64>(),
            prop::sample::select(Mode::ALL.to_vec()),
            any::<i64>(),
        )
            .prop_map(|(op, modifier, am, av, bm, bv)| {
                Instruction::new(op, modifier, Operand::new(am, av), Operand::new(bm, bv))
            })
    }

    proptest! {
        #[test]
        fn display_round_trips(insn in arb_instruction()) {
            let text = insn.to_string();
            let parsed = assemble_instruction(&text).unwrap();
            prop_assert_eq!(parsed, insn);
            prop_assert_eq!(assemble_instruction(&parsed.to_string()).unwrap(), parsed);
        }

        #[test]
        fn numeric_operands_evaluate_to_themselves(a in -100_000i64..100_000, b in -100_000i64..100_000) {
            let parsed = assemble_instruction(&format!("DAT #{a}, #{b}")).unwrap();
            prop_assert_eq!(parsed.a.value, a);
            prop_assert_eq!(parsed.b.value, b);
        }
    }
}
