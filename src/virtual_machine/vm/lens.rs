//! Field selection over instruction values.
//!
//! A [`Lens`] names one or two numeric fields of an instruction in a fixed
//! order. Opcodes parameterized by a modifier build a source and destination
//! lens once per decode with [`Lens::for_modifier`] and then work on plain
//! value slices, so no handler branches on the modifier itself.

use crate::virtual_machine::isa::Modifier;
use crate::virtual_machine::operand::Instruction;
use std::ops::Deref;

/// One numeric field of an instruction.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Field {
    A,
    B,
}

impl Field {
    pub fn get(self, insn: &Instruction) -> i64 {
        match self {
            Field::A => insn.a.value,
            Field::B => insn.b.value,
        }
    }

    pub fn set(self, insn: &mut Instruction, value: i64) {
        match self {
            Field::A => insn.a.value = value,
            Field::B => insn.b.value = value,
        }
    }
}

/// Up to two values read through a lens.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Values {
    slots: [i64; 2],
    len: usize,
}

impl Values {
    pub fn as_slice(&self) -> &[i64] {
        &self.slots[..self.len]
    }
}

impl Deref for Values {
    type Target = [i64];

    fn deref(&self) -> &[i64] {
        self.as_slice()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Lens {
    fields: &'static [Field],
}

impl Lens {
    /// The A-field alone.
    pub const A: Lens = Lens { fields: &[Field::A] };
    /// The B-field alone.
    pub const B: Lens = Lens { fields: &[Field::B] };
    /// Both fields, A first.
    pub const AB: Lens = Lens {
        fields: &[Field::A, Field::B],
    };
    /// Both fields, B first.
    pub const BA: Lens = Lens {
        fields: &[Field::B, Field::A],
    };

    /// Source and destination lenses for `modifier`.
    pub const fn for_modifier(modifier: Modifier) -> (Lens, Lens) {
        match modifier {
            Modifier::A => (Lens::A, Lens::A),
            Modifier::B => (Lens::B, Lens::B),
            Modifier::AB => (Lens::A, Lens::B),
            Modifier::BA => (Lens::B, Lens::A),
            Modifier::F | Modifier::I => (Lens::AB, Lens::AB),
            Modifier::X => (Lens::AB, Lens::BA),
        }
    }

    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, insn: &Instruction) -> Values {
        let mut slots = [0; 2];
        for (slot, field) in slots.iter_mut().zip(self.fields) {
            *slot = field.get(insn);
        }
        Values {
            slots,
            len: self.fields.len(),
        }
    }

    /// Writes `values` into the selected fields in order.
    ///
    /// A shorter slice updates only the leading fields.
    pub fn set(&self, insn: &mut Instruction, values: &[i64]) {
        for (field, &value) in self.fields.iter().zip(values) {
            field.set(insn, value);
        }
    }

    /// Applies `f` to every selected field and returns the new values.
    pub fn update(&self, insn: &mut Instruction, f: impl Fn(i64) -> i64) -> Values {
        let mut values = self.get(insn);
        for slot in &mut values.slots[..values.len] {
            *slot = f(*slot);
        }
        self.set(insn, &values);
        values
    }

    /// Pairs this lens's values on `insn` with `other`'s values on `other_insn`.
    pub fn zip(
        &self,
        insn: &Instruction,
        other: &Lens,
        other_insn: &Instruction,
    ) -> impl Iterator<Item = (i64, i64)> + use<> {
        let lhs = self.get(insn);
        let rhs = other.get(other_insn);
        let len = lhs.len.min(rhs.len);
        (0..len).map(move |i| (lhs.slots[i], rhs.slots[i]))
    }
}
