//! Default modifier inference (ICWS'88 rules).
//!
//! When an instruction omits its `.MODIFIER`, the modifier is chosen from an
//! ordered rule list for its opcode: the first rule whose A-mode set and
//! B-mode set both contain the instruction's actual modes wins. The table is
//! total, so every opcode and mode pair resolves to exactly one modifier.

use crate::for_each_opcode;
use crate::virtual_machine::errors::AsmError;
use crate::virtual_machine::isa::{Mode, Modifier, Opcode};

/// One row of the default modifier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRule {
    pub a_modes: &'static [Mode],
    pub b_modes: &'static [Mode],
    pub modifier: Modifier,
}

impl DefaultRule {
    const fn new(a_modes: &'static [Mode], b_modes: &'static [Mode], modifier: Modifier) -> Self {
        Self {
            a_modes,
            b_modes,
            modifier,
        }
    }

    pub fn matches(&self, a: Mode, b: Mode) -> bool {
        self.a_modes.contains(&a) && self.b_modes.contains(&b)
    }
}

const ANY: &[Mode] = &Mode::ALL;
const IMMEDIATE: &[Mode] = &[Mode::Immediate];
const ADDRESSED: &[Mode] = &[
    Mode::Direct,
    Mode::Indirect,
    Mode::PreDecrementIndirect,
    Mode::PostIncrementIndirect,
];

const DAT_RULES: &[DefaultRule] = &[DefaultRule::new(ANY, ANY, Modifier::F)];

const DATA_RULES: &[DefaultRule] = &[
    DefaultRule::new(IMMEDIATE, ANY, Modifier::AB),
    DefaultRule::new(ADDRESSED, IMMEDIATE, Modifier::B),
    DefaultRule::new(ADDRESSED, ADDRESSED, Modifier::I),
];

const ARITH_RULES: &[DefaultRule] = &[
    DefaultRule::new(IMMEDIATE, ANY, Modifier::AB),
    DefaultRule::new(ADDRESSED, ANY, Modifier::AB),
];

const BRANCH_RULES: &[DefaultRule] = &[DefaultRule::new(ANY, ANY, Modifier::B)];

const SLT_RULES: &[DefaultRule] = &[
    DefaultRule::new(IMMEDIATE, ANY, Modifier::AB),
    DefaultRule::new(ADDRESSED, ANY, Modifier::B),
];

macro_rules! define_default_rules {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:literal, $mnemonic:literal => $handler:ident, $rules:ident
        ),* $(,)?
    ) => {
        /// Returns the ordered default modifier rules for `opcode`.
        pub fn rules_for(opcode: Opcode) -> &'static [DefaultRule] {
            match opcode {
                $( Opcode::$name => $rules, )*
            }
        }
    };
}

for_each_opcode!(define_default_rules);

/// Picks the modifier an instruction gets when none is written.
///
/// Returns [`AsmError::NoDefaultModifierMatched`] only if the table has a
/// hole, which is a defect in the table rather than in the source.
pub fn default_modifier(opcode: Opcode, a: Mode, b: Mode) -> Result<Modifier, AsmError> {
    rules_for(opcode)
        .iter()
        .find(|rule| rule.matches(a, b))
        .map(|rule| rule.modifier)
        .ok_or(AsmError::NoDefaultModifierMatched {
            opcode,
            a_mode: a,
            b_mode: b,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_combination_has_exactly_one_first_match() {
        for &op in Opcode::ALL {
            for a in Mode::ALL {
                for b in Mode::ALL {
                    assert!(
                        default_modifier(op, a, b).is_ok(),
                        "{op} {a}/{b} has no default"
                    );
                }
            }
        }
    }

    #[test]
    fn rule_sets_do_not_overlap_within_an_opcode() {
        for &op in Opcode::ALL {
            for a in Mode::ALL {
                for b in Mode::ALL {
                    let hits = rules_for(op).iter().filter(|r| r.matches(a, b)).count();
                    assert_eq!(hits, 1, "{op} {a}/{b} matched {hits} rules");
                }
            }
        }
    }

    #[test]
    fn dat_defaults_to_f() {
        for a in Mode::ALL {
            for b in Mode::ALL {
                assert_eq!(default_modifier(Opcode::Dat, a, b), Ok(Modifier::F));
            }
        }
    }

    #[test]
    fn mov_and_cmp_defaults() {
        for op in [Opcode::Mov, Opcode::Cmp] {
            assert_eq!(
                default_modifier(op, Mode::Immediate, Mode::Indirect),
                Ok(Modifier::AB)
            );
            assert_eq!(
                default_modifier(op, Mode::Direct, Mode::Immediate),
                Ok(Modifier::B)
            );
            assert_eq!(
                default_modifier(op, Mode::PreDecrementIndirect, Mode::Direct),
                Ok(Modifier::I)
            );
        }
    }

    #[test]
    fn arithmetic_defaults_to_ab() {
        for op in [Opcode::Add, Opcode::Sub, Opcode::Mul, Opcode::Div, Opcode::Mod] {
            for a in Mode::ALL {
                assert_eq!(default_modifier(op, a, Mode::Direct), Ok(Modifier::AB));
            }
        }
    }

    #[test]
    fn branches_default_to_b() {
        for op in [Opcode::Jmp, Opcode::Jmz, Opcode::Jmn, Opcode::Djn, Opcode::Spl] {
            assert_eq!(
                default_modifier(op, Mode::Immediate, Mode::Immediate),
                Ok(Modifier::B)
            );
        }
    }

    #[test]
    fn slt_defaults() {
        assert_eq!(
            default_modifier(Opcode::Slt, Mode::Immediate, Mode::Direct),
            Ok(Modifier::AB)
        );
        assert_eq!(
            default_modifier(Opcode::Slt, Mode::Indirect, Mode::Immediate),
            Ok(Modifier::B)
        );
    }
}
