//! Redcode source text parser.
//!
//! Turns source text into [`RawRecord`]s for the [`assembler`](super::assembler).
//! The parser is line oriented and never resolves symbols.
//!
//! # Syntax
//!
//! ```text
//! ;name Imp                     metadata comment (whole line)
//! label: OPCODE.MOD #a, @b      ; trailing comment
//! step   EQU 4 * (2 + 1)
//!        ORG start
//!        END start
//! ```
//!
//! - Labels come first on a line, optionally followed by `:`. A line holding
//!   only labels attaches them to the next record.
//! - Opcodes, modifiers and pseudo-ops are case-insensitive.
//! - Mode sigils are `#`, `$`, `@`, `<` and `>`; a missing sigil means `$`.
//! - Expressions support `+ - * / %`, unary minus and parentheses.
//! - A single operand is allowed (`JMP start`, `DAT #0`).

use crate::virtual_machine::errors::AsmError;
use crate::virtual_machine::isa::{Mode, Modifier, Opcode};
use crate::virtual_machine::program::Metadata;
use crate::virtual_machine::raw::{BinOp, Expr, RawBody, RawInstruction, RawOperand, RawRecord};

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';
const MODIFIER_SEPARATOR: char = '.';
const OPERAND_SEPARATOR: char = ',';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme<'a> {
    Word(&'a str),
    /// Unsigned magnitude; sign and range are applied by the parser.
    Number(u64),
    Punct(char),
}

#[derive(Debug, Clone, Copy)]
struct Token<'a> {
    lexeme: Lexeme<'a>,
    /// 1-based column offset in the line.
    offset: usize,
}

fn parse_error(line: usize, offset: usize, message: impl Into<String>) -> AsmError {
    AsmError::Parse {
        line,
        offset,
        message: message.into(),
    }
}

/// Tokenize a single line of Redcode.
///
/// Rules:
/// - `;` starts a comment
/// - words are `[A-Za-z_][A-Za-z0-9_]*`, numbers are unsigned decimal
/// - sigils, operators, `.`, `,`, `:` and parentheses are single tokens
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, AsmError> {
    let mut out = Vec::with_capacity(8);
    let bytes = line.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        // comment start
        if b == COMMENT_CHAR as u8 {
            break;
        }

        let start = i;
        let lexeme = match b {
            b' ' | b'\t' | b'\r' => {
                i += 1;
                continue;
            }

            b'0'..=b'9' => {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let text = &line[start..i];
                let value = text.parse::<u64>().map_err(|_| {
                    parse_error(
                        line_no,
                        start + 1,
                        format!("integer literal `{text}` out of range"),
                    )
                })?;
                Lexeme::Number(value)
            }

            b'A'..=b'Z' | b'a'..=b'z' | b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                Lexeme::Word(&line[start..i])
            }

            b'#' | b'$' | b'@' | b'<' | b'>' | b'+' | b'-' | b'*' | b'/' | b'%' | b'(' | b')'
            | b',' | b'.' | b':' => {
                i += 1;
                Lexeme::Punct(b as char)
            }

            _ => {
                let c = line[start..].chars().next().unwrap_or('?');
                return Err(parse_error(
                    line_no,
                    start + 1,
                    format!("unexpected character `{c}`"),
                ));
            }
        };

        out.push(Token {
            lexeme,
            offset: start + 1,
        });
    }

    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Op(Opcode),
    Org,
    End,
    Equ,
}

fn keyword(word: &str) -> Option<Keyword> {
    if let Some(opcode) = Opcode::from_mnemonic(word) {
        return Some(Keyword::Op(opcode));
    }
    if word.eq_ignore_ascii_case("ORG") {
        Some(Keyword::Org)
    } else if word.eq_ignore_ascii_case("END") {
        Some(Keyword::End)
    } else if word.eq_ignore_ascii_case("EQU") {
        Some(Keyword::Equ)
    } else {
        None
    }
}

/// Cursor over the tokens of one line.
struct LineParser<'a> {
    line_no: usize,
    tokens: Vec<Token<'a>>,
    pos: usize,
    /// Column just past the last code character, used for end-of-line errors.
    end: usize,
}

impl<'a> LineParser<'a> {
    fn new(line_no: usize, line: &'a str, tokens: Vec<Token<'a>>) -> Self {
        let code = line.split(COMMENT_CHAR).next().unwrap_or("");
        Self {
            line_no,
            tokens,
            pos: 0,
            end: code.trim_end().len() + 1,
        }
    }

    fn peek(&self) -> Option<Lexeme<'a>> {
        self.tokens.get(self.pos).map(|t| t.lexeme)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |t| t.offset)
    }

    fn bump(&mut self) -> Option<Lexeme<'a>> {
        let lexeme = self.peek()?;
        self.pos += 1;
        Some(lexeme)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(Lexeme::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, message: impl Into<String>) -> AsmError {
        parse_error(self.line_no, self.offset(), message)
    }

    fn expect(&mut self, c: char) -> Result<(), AsmError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{c}`")))
        }
    }

    fn expect_end(&self) -> Result<(), AsmError> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.error("unexpected trailing input"))
        }
    }

    /// Consumes leading label definitions.
    fn labels(&mut self) -> Vec<String> {
        let mut labels = Vec::new();
        while let Some(Lexeme::Word(word)) = self.peek() {
            if keyword(word).is_some() {
                break;
            }
            self.pos += 1;
            self.eat(LABEL_SUFFIX);
            labels.push(word.to_string());
        }
        labels
    }

    /// Parses what follows the labels. `None` means the line held only labels.
    fn body(&mut self, has_labels: bool) -> Result<Option<RawBody>, AsmError> {
        let found = match self.peek() {
            None => return Ok(None),
            Some(Lexeme::Word(word)) => keyword(word),
            Some(_) => None,
        };
        let Some(found) = found else {
            return Err(self.error("expected label or opcode"));
        };
        let keyword_offset = self.offset();
        self.pos += 1;

        let body = match found {
            Keyword::Op(opcode) => RawBody::Instruction(self.instruction(opcode)?),
            Keyword::Org => RawBody::Org(self.expr()?),
            Keyword::End => {
                if self.at_end() {
                    RawBody::End(None)
                } else {
                    RawBody::End(Some(self.expr()?))
                }
            }
            Keyword::Equ => {
                if !has_labels {
                    return Err(parse_error(
                        self.line_no,
                        keyword_offset,
                        "EQU requires a label",
                    ));
                }
                RawBody::Equ(self.expr()?)
            }
        };

        self.expect_end()?;
        Ok(Some(body))
    }

    fn instruction(&mut self, opcode: Opcode) -> Result<RawInstruction, AsmError> {
        let modifier = if self.eat(MODIFIER_SEPARATOR) {
            let offset = self.offset();
            match self.bump() {
                Some(Lexeme::Word(name)) => Some(Modifier::from_name(name).ok_or_else(|| {
                    parse_error(self.line_no, offset, format!("unknown modifier `{name}`"))
                })?),
                _ => {
                    return Err(parse_error(
                        self.line_no,
                        offset,
                        "expected modifier after `.`",
                    ));
                }
            }
        } else {
            None
        };

        let a = self.operand()?;
        let b = if self.eat(OPERAND_SEPARATOR) {
            Some(self.operand()?)
        } else {
            None
        };

        Ok(RawInstruction {
            opcode,
            modifier,
            a,
            b,
        })
    }

    fn operand(&mut self) -> Result<RawOperand, AsmError> {
        let mode = match self.peek() {
            Some(Lexeme::Punct(c)) => Mode::from_sigil(c),
            _ => None,
        };
        if mode.is_some() {
            self.pos += 1;
        }
        Ok(RawOperand::new(mode, self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr, AsmError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Lexeme::Punct('+')) => BinOp::Add,
                Some(Lexeme::Punct('-')) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::binary(op, lhs, self.term()?);
        }
    }

    fn term(&mut self) -> Result<Expr, AsmError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Lexeme::Punct('*')) => BinOp::Mul,
                Some(Lexeme::Punct('/')) => BinOp::Div,
                Some(Lexeme::Punct('%')) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::binary(op, lhs, self.unary()?);
        }
    }

    fn unary(&mut self) -> Result<Expr, AsmError> {
        if self.eat('-') {
            // 2^63 only fits once negated.
            if self.peek() == Some(Lexeme::Number(i64::MIN.unsigned_abs())) {
                self.pos += 1;
                return Ok(Expr::Number(i64::MIN));
            }
            return Ok(match self.unary()? {
                Expr::Number(n) => Expr::Number(n.wrapping_neg()),
                inner => Expr::binary(BinOp::Sub, Expr::Number(0), inner),
            });
        }
        if self.eat('+') {
            return self.unary();
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, AsmError> {
        match self.peek() {
            Some(Lexeme::Number(n)) => {
                let value = i64::try_from(n)
                    .map_err(|_| self.error(format!("integer literal `{n}` out of range")))?;
                self.pos += 1;
                Ok(Expr::Number(value))
            }
            Some(Lexeme::Word(name)) => {
                self.pos += 1;
                Ok(Expr::symbol(name))
            }
            Some(Lexeme::Punct('(')) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(')')?;
                Ok(inner)
            }
            _ => Err(self.error("expected expression")),
        }
    }
}

/// Records a `;key value` comment line into `metadata`. Unknown keys are ignored.
fn read_metadata(metadata: &mut Metadata, comment: &str) {
    let comment = comment.trim();
    let (key, value) = comment
        .split_once(char::is_whitespace)
        .unwrap_or((comment, ""));
    metadata.set(key, value);
}

/// Parses a whole source file into records and metadata.
pub fn parse_source(source: &str) -> Result<(Vec<RawRecord>, Metadata), AsmError> {
    let mut records = Vec::new();
    let mut metadata = Metadata::default();
    let mut pending: Vec<String> = Vec::new();
    let mut pending_line = 0usize;

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;

        if let Some(comment) = line.trim_start().strip_prefix(COMMENT_CHAR) {
            read_metadata(&mut metadata, comment);
            continue;
        }

        let tokens = tokenize(line_no, line)?;
        if tokens.is_empty() {
            continue;
        }

        let mut parser = LineParser::new(line_no, line, tokens);
        let labels = parser.labels();
        if pending.is_empty() {
            pending_line = line_no;
        }
        pending.extend(labels);

        if let Some(body) = parser.body(!pending.is_empty())? {
            records.push(RawRecord::new(std::mem::take(&mut pending), body).at_line(line_no));
        }
    }

    // Trailing labels name the address just past the code.
    if !pending.is_empty() {
        records.push(RawRecord::new(pending, RawBody::End(None)).at_line(pending_line));
    }

    Ok((records, metadata))
}

/// Parses exactly one instruction with no labels, e.g. `"MOV.I $0, $1"`.
pub fn parse_instruction(text: &str) -> Result<RawInstruction, AsmError> {
    let tokens = tokenize(1, text)?;
    let mut parser = LineParser::new(1, text, tokens);
    let opcode = match parser.peek() {
        Some(Lexeme::Word(word)) => match keyword(word) {
            Some(Keyword::Op(opcode)) => opcode,
            _ => return Err(parser.error(format!("expected opcode, found `{word}`"))),
        },
        _ => return Err(parser.error("expected opcode")),
    };
    parser.pos += 1;
    let instruction = parser.instruction(opcode)?;
    parser.expect_end()?;
    Ok(instruction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: i64) -> Expr {
        Expr::Number(n)
    }

    fn single(source: &str) -> RawRecord {
        let (records, _) = parse_source(source).unwrap();
        assert_eq!(records.len(), 1, "{records:?}");
        records.into_iter().next().unwrap()
    }

    #[test]
    fn tokenize_skips_comments_and_whitespace() {
        let tokens = tokenize(1, "  mov.i $1, @-2 ; copy").unwrap();
        let lexemes: Vec<_> = tokens.iter().map(|t| t.lexeme).collect();
        assert_eq!(
            lexemes,
            vec![
                Lexeme::Word("mov"),
                Lexeme::Punct('.'),
                Lexeme::Word("i"),
                Lexeme::Punct('$'),
                Lexeme::Number(1),
                Lexeme::Punct(','),
                Lexeme::Punct('@'),
                Lexeme::Punct('-'),
                Lexeme::Number(2),
            ]
        );
        assert_eq!(tokens[0].offset, 3);
        assert_eq!(tokens[3].offset, 9);
    }

    #[test]
    fn tokenize_rejects_unknown_characters() {
        let err = tokenize(4, "MOV 0, ?1").unwrap_err();
        assert_eq!(
            err,
            AsmError::Parse {
                line: 4,
                offset: 8,
                message: "unexpected character `?`".to_string(),
            }
        );
    }

    #[test]
    fn tokenize_rejects_oversized_literals() {
        assert!(matches!(
            tokenize(1, "DAT #99999999999999999999"),
            Err(AsmError::Parse { offset: 6, .. })
        ));
    }

    #[test]
    fn most_negative_literal_needs_a_minus() {
        let rec = single("DAT #0, #-9223372036854775808");
        let RawBody::Instruction(raw) = rec.body else {
            panic!("expected an instruction");
        };
        assert_eq!(raw.b.unwrap().expr, Expr::Number(i64::MIN));

        assert!(matches!(
            parse_instruction("DAT #0, #9223372036854775808"),
            Err(AsmError::Parse { offset: 10, .. })
        ));
    }

    #[test]
    fn parse_full_instruction() {
        let rec = single("imp: MOV.I $0, >1");
        assert_eq!(rec.labels, vec!["imp".to_string()]);
        assert_eq!(rec.line, Some(1));
        assert_eq!(
            rec.body,
            RawBody::Instruction(RawInstruction {
                opcode: Opcode::Mov,
                modifier: Some(Modifier::I),
                a: RawOperand::new(Some(Mode::Direct), 0),
                b: Some(RawOperand::new(Some(Mode::PostIncrementIndirect), 1)),
            })
        );
    }

    #[test]
    fn opcodes_and_modifiers_ignore_case() {
        let rec = single("spl.ab < -2");
        let RawBody::Instruction(insn) = rec.body else {
            panic!("expected instruction");
        };
        assert_eq!(insn.opcode, Opcode::Spl);
        assert_eq!(insn.modifier, Some(Modifier::AB));
        assert_eq!(insn.a, RawOperand::new(Some(Mode::PreDecrementIndirect), -2));
        assert_eq!(insn.b, None);
    }

    #[test]
    fn missing_mode_and_modifier_stay_unset() {
        let rec = single("jmz start, count");
        let RawBody::Instruction(insn) = rec.body else {
            panic!("expected instruction");
        };
        assert_eq!(insn.modifier, None);
        assert_eq!(insn.a, RawOperand::new(None, Expr::symbol("start")));
        assert_eq!(insn.b, Some(RawOperand::new(None, Expr::symbol("count"))));
    }

    #[test]
    fn expression_precedence_and_parentheses() {
        let rec = single("DAT #1 + 2 * 3, #(1 + 2) * -x");
        let RawBody::Instruction(insn) = rec.body else {
            panic!("expected instruction");
        };
        assert_eq!(
            insn.a.expr,
            Expr::binary(BinOp::Add, num(1), Expr::binary(BinOp::Mul, num(2), num(3)))
        );
        assert_eq!(
            insn.b.unwrap().expr,
            Expr::binary(
                BinOp::Mul,
                Expr::binary(BinOp::Add, num(1), num(2)),
                Expr::binary(BinOp::Sub, num(0), Expr::symbol("x")),
            )
        );
    }

    #[test]
    fn left_associative_operators() {
        let rec = single("DAT #10 - 4 - 3, #8 / 2 % 3");
        let RawBody::Instruction(insn) = rec.body else {
            panic!("expected instruction");
        };
        assert_eq!(
            insn.a.expr,
            Expr::binary(BinOp::Sub, Expr::binary(BinOp::Sub, num(10), num(4)), num(3))
        );
        assert_eq!(
            insn.b.unwrap().expr,
            Expr::binary(BinOp::Mod, Expr::binary(BinOp::Div, num(8), num(2)), num(3))
        );
    }

    #[test]
    fn pseudo_ops() {
        let source = "step EQU 4\n ORG start\nstart DAT #0\n END start\n";
        let (records, _) = parse_source(source).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].labels, vec!["step".to_string()]);
        assert_eq!(records[0].body, RawBody::Equ(num(4)));
        assert_eq!(records[1].body, RawBody::Org(Expr::symbol("start")));
        assert!(records[2].body.is_instruction());
        assert_eq!(records[3].body, RawBody::End(Some(Expr::symbol("start"))));
        assert_eq!(records[3].line, Some(4));
    }

    #[test]
    fn bare_end() {
        let rec = single("end");
        assert_eq!(rec.body, RawBody::End(None));
    }

    #[test]
    fn label_only_lines_attach_to_next_record() {
        let source = "top\nloop:\n  ADD #4, 3\n";
        let (records, _) = parse_source(source).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].labels, vec!["top".to_string(), "loop".to_string()]);
        assert_eq!(records[0].line, Some(3));
    }

    #[test]
    fn trailing_labels_become_end_record() {
        let (records, _) = parse_source("JMP tail\ntail\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].labels, vec!["tail".to_string()]);
        assert_eq!(records[1].body, RawBody::End(None));
        assert_eq!(records[1].line, Some(2));
    }

    #[test]
    fn metadata_comments() {
        let source = ";redcode-94\n;name Dwarf\n;author A. K. Dewdney\n;strategy bomb every fourth cell\n  ADD #4, 3\n";
        let (records, metadata) = parse_source(source).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(metadata.name.as_deref(), Some("Dwarf"));
        assert_eq!(metadata.author.as_deref(), Some("A. K. Dewdney"));
        assert_eq!(
            metadata.strategy.as_deref(),
            Some("bomb every fourth cell")
        );
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let (records, metadata) = parse_source("\n   \n; just a note\n\t; another\n").unwrap();
        assert!(records.is_empty());
        assert!(metadata.is_empty());
    }

    #[test]
    fn equ_requires_label() {
        assert!(matches!(
            parse_source("  EQU 3"),
            Err(AsmError::Parse {
                line: 1,
                offset: 3,
                ..
            })
        ));
    }

    #[test]
    fn unknown_modifier_is_reported_at_its_column() {
        let err = parse_source("MOV.Q 0, 1").unwrap_err();
        assert_eq!(
            err,
            AsmError::Parse {
                line: 1,
                offset: 5,
                message: "unknown modifier `Q`".to_string(),
            }
        );
    }

    #[test]
    fn missing_operand_points_past_code() {
        let err = parse_source("DAT 0\nJMP   ; nothing\n").unwrap_err();
        assert_eq!(
            err,
            AsmError::Parse {
                line: 2,
                offset: 4,
                message: "expected expression".to_string(),
            }
        );
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert!(matches!(
            parse_source("DAT 0, 1, 2"),
            Err(AsmError::Parse { offset: 9, .. })
        ));
        assert!(matches!(
            parse_source("DAT (1 + 2"),
            Err(AsmError::Parse { .. })
        ));
    }

    #[test]
    fn punctuation_where_label_expected() {
        assert!(matches!(
            parse_source("#1"),
            Err(AsmError::Parse {
                line: 1,
                offset: 1,
                ..
            })
        ));
    }

    #[test]
    fn parse_instruction_single() {
        let insn = parse_instruction("DJN.F $-1, #3").unwrap();
        assert_eq!(insn.opcode, Opcode::Djn);
        assert_eq!(insn.modifier, Some(Modifier::F));
        assert_eq!(insn.a, RawOperand::new(Some(Mode::Direct), -1));
        assert_eq!(insn.b, Some(RawOperand::new(Some(Mode::Immediate), 3)));
    }

    #[test]
    fn parse_instruction_rejects_labels_and_pseudo_ops() {
        assert!(parse_instruction("start MOV 0, 1").is_err());
        assert!(parse_instruction("END").is_err());
        assert!(parse_instruction("").is_err());
    }
}
