//! Match configuration.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Modifier, Opcode};
use crate::virtual_machine::operand::{Instruction, Operand};
use std::fmt::{self, Display};

/// How far apart consecutive warriors are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separation {
    /// Exactly this many cells from one warrior's first cell to the next.
    Fixed(usize),
    /// Random gaps of at least `minimum_separation`, drawn from the VM's RNG.
    Random,
}

impl Display for Separation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Separation::Fixed(n) => write!(f, "{n}"),
            Separation::Random => f.write_str("random"),
        }
    }
}

/// Immutable settings for one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmOptions {
    pub core_size: usize,
    pub cycles_before_tie: usize,
    /// Fills every cell before warriors are loaded.
    pub initial_instruction: Instruction,
    /// Longest program that may be loaded.
    pub instruction_limit: usize,
    /// Upper bound on a single warrior's task queue.
    pub max_num_tasks: usize,
    pub minimum_separation: usize,
    pub read_distance: usize,
    pub write_distance: usize,
    pub separation: Separation,
    pub num_warriors: usize,
}

impl VmOptions {
    /// ICWS'86-style limits.
    pub fn icws86() -> Self {
        Self {
            core_size: 8192,
            cycles_before_tie: 100_000,
            initial_instruction: Instruction::empty(),
            instruction_limit: 300,
            max_num_tasks: 64,
            minimum_separation: 300,
            read_distance: 8192,
            write_distance: 8192,
            separation: Separation::Random,
            num_warriors: 2,
        }
    }

    /// King of the Hill limits.
    pub fn koth() -> Self {
        Self {
            core_size: 8000,
            cycles_before_tie: 80_000,
            initial_instruction: Instruction::new(
                Opcode::Dat,
                Modifier::F,
                Operand::direct(0),
                Operand::direct(0),
            ),
            instruction_limit: 100,
            max_num_tasks: 8000,
            minimum_separation: 100,
            read_distance: 8000,
            write_distance: 8000,
            separation: Separation::Random,
            num_warriors: 2,
        }
    }

    /// Looks up a preset by name (`icws86` or `koth`, ignoring case).
    pub fn preset(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("icws86") {
            Some(Self::icws86())
        } else if name.eq_ignore_ascii_case("koth") {
            Some(Self::koth())
        } else {
            None
        }
    }

    /// Checks the options are internally consistent.
    ///
    /// Read and write distances must divide `core_size` so that clamped
    /// offsets stay stable under repeated clamping.
    pub fn validate(&self) -> Result<(), VMError> {
        let invalid = |reason: String| Err(VMError::InvalidOptions { reason });

        if self.core_size == 0 {
            return invalid("core_size must be positive".to_string());
        }
        if self.cycles_before_tie == 0 {
            return invalid("cycles_before_tie must be positive".to_string());
        }
        if self.instruction_limit == 0 {
            return invalid("instruction_limit must be positive".to_string());
        }
        if self.max_num_tasks == 0 {
            return invalid("max_num_tasks must be positive".to_string());
        }
        if self.minimum_separation == 0 {
            return invalid("minimum_separation must be positive".to_string());
        }
        if self.num_warriors == 0 {
            return invalid("num_warriors must be at least 1".to_string());
        }
        for (name, distance) in [
            ("read_distance", self.read_distance),
            ("write_distance", self.write_distance),
        ] {
            if distance == 0 || distance > self.core_size {
                return invalid(format!(
                    "{name} {distance} must be in 1..={}",
                    self.core_size
                ));
            }
            if self.core_size % distance != 0 {
                return invalid(format!(
                    "{name} {distance} must divide core_size {}",
                    self.core_size
                ));
            }
        }
        if let Separation::Fixed(gap) = self.separation
            && gap < self.minimum_separation
        {
            return invalid(format!(
                "separation {gap} is below minimum_separation {}",
                self.minimum_separation
            ));
        }
        Ok(())
    }
}

impl Default for VmOptions {
    fn default() -> Self {
        Self::icws86()
    }
}
