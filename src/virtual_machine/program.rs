//! Assembled program representation.
//!
//! A [`Program`] is the assembler's output and the loader's input: an ordered
//! list of fully resolved instructions plus the offset of the first one to
//! execute. Programs are immutable once built.

use crate::virtual_machine::errors::AsmError;
use crate::virtual_machine::operand::Instruction;

/// Descriptive information gathered from `;name`-style comment lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub name: Option<String>,
    pub author: Option<String>,
    pub version: Option<String>,
    pub date: Option<String>,
    pub strategy: Option<String>,
}

impl Metadata {
    /// Records `value` under `key`, returning `false` for unknown keys.
    ///
    /// Repeated `strategy` lines accumulate, one per line; other keys keep the
    /// last value seen.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        let value = value.trim().to_string();
        let slot = match key.to_ascii_lowercase().as_str() {
            "name" => &mut self.name,
            "author" => &mut self.author,
            "version" => &mut self.version,
            "date" => &mut self.date,
            "strategy" => {
                match &mut self.strategy {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(&value);
                    }
                    None => self.strategy = Some(value),
                }
                return true;
            }
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }
}

/// Compiled warrior ready to be loaded into core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    code: Vec<Instruction>,
    start_index: usize,
    metadata: Metadata,
}

impl Program {
    /// Builds a program, checking that `start_index` addresses an instruction.
    pub fn new(
        code: Vec<Instruction>,
        start_index: i64,
        metadata: Metadata,
    ) -> Result<Self, AsmError> {
        if start_index < 0 || start_index as usize >= code.len() {
            return Err(AsmError::StartIndexOutOfRange {
                index: start_index,
                len: code.len(),
            });
        }
        Ok(Self {
            code,
            start_index: start_index as usize,
            metadata,
        })
    }

    pub fn code(&self) -> &[Instruction] {
        &self.code
    }

    /// Offset into [`code`](Self::code) of the first instruction to run.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Returns a copy with its metadata replaced.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}
