//! A small assembler producing [`InstructionGraph`]s with symbolic labels.
//!
//! Front ends and tests describe units as a linear instruction stream; jump targets and
//! exception ranges refer to named labels which are resolved when the unit is finished. Every
//! emitting method returns `Result<&mut Self>` so calls chain with `?`.
//!
//! # Example
//!
//! ```rust
//! use flowscope::analysis::CodeAssembler;
//!
//! // x = 0; while (x) { x = x + 1; } return x;
//! let mut asm = CodeAssembler::new();
//! let x = asm.local(0);
//! asm.push_const()?
//!     .store(x)?
//!     .statement()?
//!     .label("loop")?
//!     .load(x)?
//!     .if_true("body")?
//!     .goto("end")?
//!     .label("body")?
//!     .load(x)?
//!     .push_const()?
//!     .compute(2)?
//!     .store(x)?
//!     .statement()?
//!     .goto("loop")?
//!     .label("end")?
//!     .load(x)?
//!     .ret_value()?;
//!
//! let graph = asm.finish()?;
//! assert_eq!(graph.len(), 17);
//! # Ok::<(), flowscope::Error>(())
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    analysis::{
        graph::{Dispatch, ExceptionRange, InstrKind, InstructionGraph},
        VarFlags, VarId, VariableStore,
    },
    Result,
};

/// An instruction whose jump targets may still be symbolic.
#[derive(Debug, Clone)]
enum Pending {
    Ready(InstrKind),
    Goto(String),
    If { label: String, pops: u8 },
    Switch { labels: Vec<String>, default: String },
    Jsr(String),
}

/// Builder for instruction graphs.
#[derive(Debug, Default)]
pub struct CodeAssembler {
    code: Vec<Pending>,
    labels: HashMap<String, usize>,
    ranges: Vec<(String, String, String)>,
    variables: VariableStore,
}

impl CodeAssembler {
    /// Creates an empty assembler with an empty variable store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an assembler over an existing variable store.
    #[must_use]
    pub fn with_variables(variables: VariableStore) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// Returns the variable store being populated.
    #[must_use]
    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Returns the variable store for direct modification.
    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    /// Declares a local variable in the given slot.
    pub fn local(&mut self, slot: u16) -> VarId {
        self.variables.add_local(slot)
    }

    /// Declares a local variable that may be read by code outside this unit.
    pub fn captured_local(&mut self, slot: u16) -> VarId {
        self.variables
            .add_local_with_flags(slot, VarFlags::IMPLICIT_READ)
    }

    /// Declares the receiver reference.
    pub fn this(&mut self, slot: u16) -> VarId {
        self.variables.add_this(slot)
    }

    /// Declares a field variable qualified by `qualifier`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the qualifier is unknown.
    pub fn field(&mut self, qualifier: VarId, name: &str) -> Result<VarId> {
        self.variables.add_field(qualifier, name)
    }

    /// Declares an unqualified slot-less variable.
    pub fn static_var(&mut self, name: &str) -> VarId {
        self.variables.add_static(name)
    }

    /// Declares the assertion-status flag.
    pub fn assertions_flag(&mut self) -> VarId {
        self.variables.add_assertions_flag()
    }

    /// Returns the index the next emitted instruction will get.
    #[must_use]
    pub fn position(&self) -> usize {
        self.code.len()
    }

    fn push(&mut self, pending: Pending) -> Result<&mut Self> {
        self.code.push(pending);
        Ok(self)
    }

    /// Emits an arbitrary instruction with already resolved targets.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the other emitters.
    pub fn emit(&mut self, kind: InstrKind) -> Result<&mut Self> {
        self.push(Pending::Ready(kind))
    }

    /// Binds `name` to the current position and emits a label instruction there.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the label was already bound.
    pub fn label(&mut self, name: &str) -> Result<&mut Self> {
        if self.labels.insert(name.to_string(), self.code.len()).is_some() {
            return Err(malformed_error!("Label '{}' is defined twice", name));
        }
        self.emit(InstrKind::Label)
    }

    /// Protects the instructions from label `start` up to (excluding) label `end` with the
    /// handler at label `handler`.
    ///
    /// # Errors
    ///
    /// Never fails here; unknown labels are reported by [`CodeAssembler::finish`].
    pub fn protect(&mut self, start: &str, end: &str, handler: &str) -> Result<&mut Self> {
        self.ranges
            .push((start.to_string(), end.to_string(), handler.to_string()));
        Ok(self)
    }

    /// Emits a no-op.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn nop(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::Nop)
    }

    /// Emits a line-number marker.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn line_marker(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::LineMarker)
    }

    /// Emits a statement boundary.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn statement(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::StatementBoundary)
    }

    /// Emits a constant push.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn push_const(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::PushConst)
    }

    /// Emits an object allocation.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn new_object(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::New)
    }

    /// Emits a variable load.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the variable is not declared.
    pub fn load(&mut self, var: VarId) -> Result<&mut Self> {
        self.variables.descriptor(var)?;
        self.emit(InstrKind::Load(var))
    }

    /// Emits a variable store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the variable is not declared.
    pub fn store(&mut self, var: VarId) -> Result<&mut Self> {
        self.variables.descriptor(var)?;
        self.emit(InstrKind::Store(var))
    }

    /// Emits an explicit discard of a variable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the variable is not declared.
    pub fn discard(&mut self, var: VarId) -> Result<&mut Self> {
        self.variables.descriptor(var)?;
        self.emit(InstrKind::Discard(var))
    }

    /// Emits `dup`.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn dup(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::Dup)
    }

    /// Emits `swap`.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn swap(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::Swap)
    }

    /// Emits `pop`.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn pop(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::Pop)
    }

    /// Emits an operation consuming `pops` operands and producing one result.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn compute(&mut self, pops: u8) -> Result<&mut Self> {
        self.emit(InstrKind::Compute { pops })
    }

    /// Emits an instance field read.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn get_field(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::FieldRead { is_static: false })
    }

    /// Emits a static field read.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn get_static(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::FieldRead { is_static: true })
    }

    /// Emits an instance field write.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn put_field(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::FieldWrite { is_static: false })
    }

    /// Emits an array element read.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn array_read(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::ArrayRead)
    }

    /// Emits an array element write.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn array_write(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::ArrayWrite)
    }

    /// Emits a call.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn invoke(&mut self, dispatch: Dispatch, args: u8, returns: bool) -> Result<&mut Self> {
        self.emit(InstrKind::Invoke {
            dispatch,
            args,
            returns,
        })
    }

    /// Emits an unconditional jump to `label`.
    ///
    /// # Errors
    ///
    /// Never fails here; unknown labels are reported by [`CodeAssembler::finish`].
    pub fn goto(&mut self, label: &str) -> Result<&mut Self> {
        self.push(Pending::Goto(label.to_string()))
    }

    /// Emits a conditional jump on the top stack value.
    ///
    /// # Errors
    ///
    /// Never fails here; unknown labels are reported by [`CodeAssembler::finish`].
    pub fn if_true(&mut self, label: &str) -> Result<&mut Self> {
        self.push(Pending::If {
            label: label.to_string(),
            pops: 1,
        })
    }

    /// Emits a conditional jump comparing the two topmost stack values.
    ///
    /// # Errors
    ///
    /// Never fails here; unknown labels are reported by [`CodeAssembler::finish`].
    pub fn if_cmp(&mut self, label: &str) -> Result<&mut Self> {
        self.push(Pending::If {
            label: label.to_string(),
            pops: 2,
        })
    }

    /// Emits a multi-way switch on the top stack value.
    ///
    /// # Errors
    ///
    /// Never fails here; unknown labels are reported by [`CodeAssembler::finish`].
    pub fn switch(&mut self, labels: &[&str], default: &str) -> Result<&mut Self> {
        self.push(Pending::Switch {
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            default: default.to_string(),
        })
    }

    /// Emits a return of the top stack value.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn ret_value(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::Return { value: true })
    }

    /// Emits a return without value.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn ret_void(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::Return { value: false })
    }

    /// Emits a throw of the top stack value.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn throw(&mut self) -> Result<&mut Self> {
        self.emit(InstrKind::Throw)
    }

    /// Emits a subroutine call to `label`.
    ///
    /// # Errors
    ///
    /// Never fails here; unknown labels are reported by [`CodeAssembler::finish`].
    pub fn jsr(&mut self, label: &str) -> Result<&mut Self> {
        self.push(Pending::Jsr(label.to_string()))
    }

    /// Emits a subroutine return through the address stored in `slot`.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn ret(&mut self, slot: u16) -> Result<&mut Self> {
        self.emit(InstrKind::Ret(slot))
    }

    fn resolve(&self, label: &str) -> Result<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| malformed_error!("Label '{}' does not resolve to an instruction", label))
    }

    /// Resolves all labels and builds the validated graph.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if a label is unknown or the resulting graph is invalid
    /// (see [`InstructionGraph::new`]).
    pub fn finish(self) -> Result<InstructionGraph> {
        let mut kinds = Vec::with_capacity(self.code.len());
        for pending in &self.code {
            let kind = match pending {
                Pending::Ready(kind) => kind.clone(),
                Pending::Goto(label) => InstrKind::Goto(self.resolve(label)?),
                Pending::If { label, pops } => InstrKind::If {
                    target: self.resolve(label)?,
                    pops: *pops,
                },
                Pending::Switch { labels, default } => InstrKind::Switch {
                    targets: labels
                        .iter()
                        .map(|label| self.resolve(label))
                        .collect::<Result<Vec<_>>>()?,
                    default: self.resolve(default)?,
                },
                Pending::Jsr(label) => InstrKind::Jsr(self.resolve(label)?),
            };
            kinds.push(kind);
        }

        let mut handlers = Vec::with_capacity(self.ranges.len());
        for (start, end, handler) in &self.ranges {
            handlers.push(ExceptionRange::new(
                self.resolve(start)?,
                self.resolve(end)?,
                self.resolve(handler)?,
            ));
        }

        InstructionGraph::new(kinds, handlers, Arc::new(self.variables))
    }
}
