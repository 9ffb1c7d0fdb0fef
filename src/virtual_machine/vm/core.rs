//! Shared circular memory and operand resolution.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Mode;
use crate::virtual_machine::operand::{Instruction, Operand};
use crate::virtual_machine::options::VmOptions;

/// Re-centres `address` into the window of `limit` cells around the current
/// instruction, returned as an offset in `[0, core_size)`.
///
/// `r = address mod limit`; offsets past `limit / 2` are moved to the
/// negative side of the window, i.e. `r + core_size - limit`.
pub fn clamp(address: i64, limit: usize, core_size: usize) -> usize {
    let r = address.rem_euclid(limit as i64) as usize;
    if r > limit / 2 { r + core_size - limit } else { r }
}

/// Fixed-size array of instructions shared by every warrior in a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Core {
    cells: Vec<Instruction>,
    read_distance: usize,
    write_distance: usize,
}

impl Core {
    /// Creates a core filled with `options.initial_instruction`.
    pub fn new(options: &VmOptions) -> Result<Self, VMError> {
        options.validate()?;
        Ok(Self {
            cells: vec![options.initial_instruction; options.core_size],
            read_distance: options.read_distance,
            write_distance: options.write_distance,
        })
    }

    pub fn size(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[Instruction] {
        &self.cells
    }

    pub fn read_distance(&self) -> usize {
        self.read_distance
    }

    pub fn write_distance(&self) -> usize {
        self.write_distance
    }

    /// Pointer to `address`, wrapped into the core.
    pub fn pointer(&self, address: i64) -> InstructionPointer {
        InstructionPointer::new(self, address)
    }

    pub fn clamp(&self, address: i64, limit: usize) -> usize {
        clamp(address, limit, self.size())
    }

    /// Adds `delta` to the B-field of the cell at `ptr`, modulo the core size.
    fn bump_b_field(&mut self, ptr: InstructionPointer, delta: i64) {
        let mut cell = ptr.fetch(self);
        cell.b.value = cell.b.value.wrapping_add(delta).rem_euclid(self.size() as i64);
        ptr.set(self, cell);
    }

    /// Locates the cells an operand of the instruction at `pc` refers to.
    ///
    /// Pre-decrement happens before the indirection is followed and
    /// post-increment after both pointers are computed; both touch the B-field
    /// of the intermediate cell. The returned snapshot is taken last.
    pub fn resolve_operand(
        &mut self,
        pc: InstructionPointer,
        slot: OperandSlot,
    ) -> ResolvedOperand {
        let Operand { mode, value } = slot.of(&pc.fetch(self));

        let (read, write) = match mode {
            Mode::Immediate => (0, 0),
            Mode::Direct => (
                self.clamp(value, self.read_distance),
                self.clamp(value, self.write_distance),
            ),
            Mode::Indirect | Mode::PreDecrementIndirect | Mode::PostIncrementIndirect => {
                let read = self.clamp(value, self.read_distance);
                let write = self.clamp(value, self.write_distance);
                let intermediate = pc.add(write as i64);

                if mode == Mode::PreDecrementIndirect {
                    self.bump_b_field(intermediate, -1);
                }

                let read_offset = pc.add(read as i64).fetch(self).b.value;
                let write_offset = intermediate.fetch(self).b.value;
                let read = self.clamp(
                    (read as i64).wrapping_add(read_offset),
                    self.read_distance,
                );
                let write = self.clamp(
                    (write as i64).wrapping_add(write_offset),
                    self.write_distance,
                );

                if mode == Mode::PostIncrementIndirect {
                    self.bump_b_field(intermediate, 1);
                }
                (read, write)
            }
        };

        let read_pointer = pc.add(read as i64);
        ResolvedOperand {
            insn: read_pointer.fetch(self),
            read_pointer,
            write_pointer: pc.add(write as i64),
        }
    }
}

/// Address of one core cell, always in `[0, core_size)`.
///
/// Holds the core size rather than the core itself; the core is passed to
/// [`fetch`](Self::fetch) and [`set`](Self::set), which are the only ways
/// cells are read or written.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct InstructionPointer {
    address: usize,
    core_size: usize,
}

impl InstructionPointer {
    pub fn new(core: &Core, address: i64) -> Self {
        Self::wrap(address, core.size())
    }

    fn wrap(address: i64, core_size: usize) -> Self {
        Self {
            address: address.rem_euclid(core_size as i64) as usize,
            core_size,
        }
    }

    pub fn address(&self) -> usize {
        self.address
    }

    /// Pointer `offset` cells away, wrapping around the core.
    pub fn add(self, offset: i64) -> Self {
        Self::wrap(self.address as i64 + offset, self.core_size)
    }

    pub fn fetch(&self, core: &Core) -> Instruction {
        core.cells[self.address]
    }

    pub fn set(&self, core: &mut Core, insn: Instruction) {
        core.cells[self.address] = insn;
    }
}

/// Which operand of an instruction to resolve.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandSlot {
    A,
    B,
}

impl OperandSlot {
    fn of(self, insn: &Instruction) -> Operand {
        match self {
            OperandSlot::A => insn.a,
            OperandSlot::B => insn.b,
        }
    }
}

/// Result of resolving one operand.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ResolvedOperand {
    /// Copy of the cell at `read_pointer` once side effects are applied.
    pub insn: Instruction,
    pub read_pointer: InstructionPointer,
    pub write_pointer: InstructionPointer,
}
