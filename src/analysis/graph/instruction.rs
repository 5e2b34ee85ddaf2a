//! The closed instruction set the engine analyses.
//!
//! Instructions model a JVM/CIL-like stack machine: values live in frame slots (locals) and on an
//! operand stack. Front ends lower their bytecode (or any other linear IR) into [`InstrKind`]
//! values; everything the analyses need to know about an instruction is derived by matching on
//! the variant:
//!
//! - its [`InstrCategory`] (the coarse kind tag: read, write, jump, return, ...);
//! - its control flow: branch targets and whether it falls through;
//! - the variables it reads or writes (liveness);
//! - its stack effect (the frame simulator in [`crate::analysis::frame`]).

use strum::{Display, EnumCount, EnumIter};

use crate::analysis::VarId;

/// Dispatch flavour of a call instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dispatch {
    /// Statically bound call without receiver.
    Static,
    /// Statically bound call with receiver (constructors, private and super calls).
    Special,
    /// Virtual dispatch on the receiver's runtime class.
    Virtual,
    /// Dispatch through an interface.
    Interface,
}

/// The coarse classification of an instruction.
///
/// This is the "kind tag" used by the analyses when they only care about the shape of an
/// instruction, not its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum InstrCategory {
    /// Reads a variable.
    Read,
    /// Writes (or discards) a variable.
    Write,
    /// Unconditional jump.
    Jump,
    /// Conditional two-way branch.
    ConditionalJump,
    /// Multi-way switch.
    Switch,
    /// Returns from the unit.
    Return,
    /// Throws an exception.
    Throw,
    /// Statement boundary marker.
    StatementBoundary,
    /// Call into a nested subroutine.
    SubroutineCall,
    /// Return from a nested subroutine.
    SubroutineReturn,
    /// Any other instruction; it simply falls through to the next one.
    Fallthrough,
}

/// A single instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrKind {
    /// Does nothing.
    Nop,
    /// A branch target marker without runtime effect.
    Label,
    /// A debug line-number marker without runtime effect.
    LineMarker,
    /// Marks the end of a source statement; the point where dead variables may be discarded.
    StatementBoundary,
    /// Pushes a constant.
    PushConst,
    /// Allocates a new object and pushes the reference.
    New,
    /// Pushes the value of a variable.
    Load(VarId),
    /// Pops a value and stores it into a variable.
    Store(VarId),
    /// Explicitly discards the value of a variable.
    Discard(VarId),
    /// Duplicates the top stack value.
    Dup,
    /// Swaps the two topmost stack values.
    Swap,
    /// Pops and drops the top stack value.
    Pop,
    /// Pops `pops` operands and pushes one computed result.
    Compute {
        /// Number of consumed operands.
        pops: u8,
    },
    /// Reads a field; pops the receiver unless static, pushes the value.
    FieldRead {
        /// Whether the field is static.
        is_static: bool,
    },
    /// Writes a field; pops the value and, unless static, the receiver.
    FieldWrite {
        /// Whether the field is static.
        is_static: bool,
    },
    /// Pops array and index, pushes the element.
    ArrayRead,
    /// Pops array, index and value.
    ArrayWrite,
    /// Calls a method.
    Invoke {
        /// How the target is bound.
        dispatch: Dispatch,
        /// Number of stack operands consumed, receiver included.
        args: u8,
        /// Whether a result is pushed.
        returns: bool,
    },
    /// Unconditional jump to an instruction index.
    Goto(usize),
    /// Conditional jump: pops `pops` operands, jumps to `target` or falls through.
    If {
        /// Jump target.
        target: usize,
        /// Number of compared operands.
        pops: u8,
    },
    /// Pops the selector and jumps to one of the targets or to the default.
    Switch {
        /// Case targets.
        targets: Vec<usize>,
        /// Default target.
        default: usize,
    },
    /// Returns from the unit, optionally with the value on top of the stack.
    Return {
        /// Whether a value is returned.
        value: bool,
    },
    /// Pops an exception and throws it.
    Throw,
    /// Calls the subroutine at the given index, pushing the return address.
    Jsr(usize),
    /// Returns from a subroutine to the address stored in the given slot.
    Ret(u16),
}

impl InstrKind {
    /// Returns the coarse category of this instruction.
    #[must_use]
    pub fn category(&self) -> InstrCategory {
        match self {
            InstrKind::Load(_) => InstrCategory::Read,
            InstrKind::Store(_) | InstrKind::Discard(_) => InstrCategory::Write,
            InstrKind::Goto(_) => InstrCategory::Jump,
            InstrKind::If { .. } => InstrCategory::ConditionalJump,
            InstrKind::Switch { .. } => InstrCategory::Switch,
            InstrKind::Return { .. } => InstrCategory::Return,
            InstrKind::Throw => InstrCategory::Throw,
            InstrKind::StatementBoundary => InstrCategory::StatementBoundary,
            InstrKind::Jsr(_) => InstrCategory::SubroutineCall,
            InstrKind::Ret(_) => InstrCategory::SubroutineReturn,
            InstrKind::Nop
            | InstrKind::Label
            | InstrKind::LineMarker
            | InstrKind::PushConst
            | InstrKind::New
            | InstrKind::Dup
            | InstrKind::Swap
            | InstrKind::Pop
            | InstrKind::Compute { .. }
            | InstrKind::FieldRead { .. }
            | InstrKind::FieldWrite { .. }
            | InstrKind::ArrayRead
            | InstrKind::ArrayWrite
            | InstrKind::Invoke { .. } => InstrCategory::Fallthrough,
        }
    }

    /// Returns `true` if execution may continue with the next instruction.
    ///
    /// A subroutine call does not fall through directly (it jumps to the subroutine), but its
    /// return point is the next instruction; see [`InstrKind::needs_next`].
    #[must_use]
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            InstrKind::Goto(_)
                | InstrKind::Switch { .. }
                | InstrKind::Return { .. }
                | InstrKind::Throw
                | InstrKind::Jsr(_)
                | InstrKind::Ret(_)
        )
    }

    /// Returns `true` if a well-formed unit must contain an instruction after this one.
    #[must_use]
    pub fn needs_next(&self) -> bool {
        self.falls_through() || matches!(self, InstrKind::Jsr(_))
    }

    /// Returns the explicit jump targets of this instruction.
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match self {
            InstrKind::Goto(target) | InstrKind::If { target, .. } | InstrKind::Jsr(target) => {
                vec![*target]
            }
            InstrKind::Switch { targets, default } => {
                let mut all = targets.clone();
                all.push(*default);
                all
            }
            _ => Vec::new(),
        }
    }

    /// Returns `true` for instructions that leave the unit.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        matches!(self, InstrKind::Return { .. } | InstrKind::Throw)
    }

    /// Returns `true` for instructions that transfer control somewhere other than the next
    /// instruction (jumps, switches, returns, throws and subroutine calls/returns).
    #[must_use]
    pub fn is_control_transfer(&self) -> bool {
        matches!(
            self.category(),
            InstrCategory::Jump
                | InstrCategory::ConditionalJump
                | InstrCategory::Switch
                | InstrCategory::Return
                | InstrCategory::Throw
                | InstrCategory::SubroutineCall
                | InstrCategory::SubroutineReturn
        )
    }

    /// Returns `true` for instructions without any runtime effect.
    ///
    /// The origin tracker looks straight through them.
    #[must_use]
    pub fn is_transparent(&self) -> bool {
        matches!(
            self,
            InstrKind::Nop | InstrKind::Label | InstrKind::LineMarker | InstrKind::StatementBoundary
        )
    }

    /// Returns the variable read by this instruction, if any.
    #[must_use]
    pub fn read_variable(&self) -> Option<VarId> {
        match self {
            InstrKind::Load(var) => Some(*var),
            _ => None,
        }
    }

    /// Returns the variable written (assigned or discarded) by this instruction, if any.
    #[must_use]
    pub fn written_variable(&self) -> Option<VarId> {
        match self {
            InstrKind::Store(var) | InstrKind::Discard(var) => Some(*var),
            _ => None,
        }
    }

    /// Returns the variable referenced by this instruction, if any.
    #[must_use]
    pub fn variable(&self) -> Option<VarId> {
        self.read_variable().or_else(|| self.written_variable())
    }
}

/// An instruction together with its stable index in the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Index of the instruction within its graph.
    pub index: usize,
    /// What the instruction does.
    pub kind: InstrKind,
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(InstrKind::Load(VarId::new(0)).category(), InstrCategory::Read);
        assert_eq!(InstrKind::Discard(VarId::new(0)).category(), InstrCategory::Write);
        assert_eq!(
            InstrKind::If { target: 3, pops: 1 }.category(),
            InstrCategory::ConditionalJump
        );
        assert_eq!(InstrKind::Dup.category(), InstrCategory::Fallthrough);
        assert_eq!(InstrKind::Ret(0).category(), InstrCategory::SubroutineReturn);
        assert_eq!(InstrCategory::iter().count(), InstrCategory::COUNT);
        assert_eq!(InstrCategory::ConditionalJump.to_string(), "ConditionalJump");
    }

    #[test]
    fn test_control_flow_shape() {
        let switch = InstrKind::Switch {
            targets: vec![4, 5],
            default: 6,
        };
        assert_eq!(switch.branch_targets(), vec![4, 5, 6]);
        assert!(!switch.falls_through());
        assert!(switch.is_control_transfer());

        assert!(!InstrKind::Jsr(9).falls_through());
        assert!(InstrKind::Jsr(9).needs_next());
        assert!(InstrKind::If { target: 1, pops: 2 }.falls_through());
        assert!(InstrKind::Throw.is_exit());
        assert!(!InstrKind::Ret(0).is_exit());
    }

    #[test]
    fn test_transparent() {
        assert!(InstrKind::Label.is_transparent());
        assert!(InstrKind::StatementBoundary.is_transparent());
        assert!(!InstrKind::Goto(0).is_transparent());
        assert!(!InstrKind::PushConst.is_transparent());
    }
}
