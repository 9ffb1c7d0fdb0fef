use crate::virtual_machine::operand::Instruction;
use crate::virtual_machine::vm::core::{Core, InstructionPointer, OperandSlot, ResolvedOperand};
use crate::virtual_machine::vm::lens::Lens;

/// Everything an opcode handler needs about the instruction being executed.
///
/// Built once per step by [`decode`](Self::decode). Operand side effects
/// (pre-decrement, post-increment) have already been applied to the core.
#[derive(Copy, Clone, Debug)]
pub struct ExecContext {
    pub pc: InstructionPointer,
    /// Cell at `pc` as fetched before either operand was resolved.
    pub insn: Instruction,
    pub a: ResolvedOperand,
    pub b: ResolvedOperand,
    /// Fields read from the A operand.
    pub a_lens: Lens,
    /// Fields read and written on the B operand.
    pub b_lens: Lens,
}

impl ExecContext {
    /// Fetches the instruction at `pc` and resolves A, then B.
    pub fn decode(core: &mut Core, pc: InstructionPointer) -> Self {
        let insn = pc.fetch(core);
        let a = core.resolve_operand(pc, OperandSlot::A);
        let b = core.resolve_operand(pc, OperandSlot::B);
        let (a_lens, b_lens) = Lens::for_modifier(insn.modifier);
        Self {
            pc,
            insn,
            a,
            b,
            a_lens,
            b_lens,
        }
    }

    /// The instruction after this one.
    pub fn next(&self) -> InstructionPointer {
        self.pc.add(1)
    }

    /// The instruction after the next one.
    pub fn skip(&self) -> InstructionPointer {
        self.pc.add(2)
    }
}
