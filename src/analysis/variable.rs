//! Variables and the store that owns them.
//!
//! Every analysed unit carries exactly one [`VariableStore`]. It is the single authority
//! mapping a [`VarId`] to its [`VariableDescriptor`]; instructions, live sets and equivalence
//! classes only ever hold ids. The store is shared through an `Arc`, so the structures that need
//! to resolve ids (equivalence classes, the instruction graph) stay cheap to clone.
//!
//! Variables form qualifier chains: `this.a.b` is a field variable `b` qualified by the field
//! variable `a`, which is qualified by `this`. The chain drives two analyses:
//!
//! - liveness: writing a variable also kills every variable qualified by it
//!   ([`VariableStore::dependents`]);
//! - equivalence classing: the shallowest alias is preferred as canonical
//!   ([`VariableStore::qualifier_chain`]).

use std::fmt;

use bitflags::bitflags;

use crate::{utils::BitSet, Result};

/// Identifier of a variable within one [`VariableStore`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) u32);

impl VarId {
    /// Creates a variable id from a raw index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        VarId(index)
    }

    /// Creates a variable id from a bit set or vector index.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn from_index(index: usize) -> Self {
        VarId(index as u32)
    }

    /// Returns the raw index, usable to index per-variable vectors and bit sets.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VarId({})", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

bitflags! {
    /// Additional properties of a variable.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VarFlags: u8 {
        /// The variable may be read by code outside the analysed instructions (e.g. a captured
        /// local read by a nested closure). Such variables are never discarded.
        const IMPLICIT_READ = 0x01;
        /// The variable was introduced by the front end and has no source-level counterpart.
        const SYNTHETIC = 0x02;
    }
}

/// What a variable denotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarKind {
    /// A local variable or parameter stored in a frame slot.
    Local {
        /// Frame slot backing the variable.
        slot: u16,
    },
    /// The receiver (`this`) reference.
    This {
        /// Frame slot backing the receiver.
        slot: u16,
    },
    /// A field reached through a qualifier variable.
    Field {
        /// The qualifying variable.
        qualifier: VarId,
        /// Field name.
        name: String,
    },
    /// An unqualified variable that does not live in a frame slot, such as a static field.
    Static {
        /// Variable name.
        name: String,
    },
    /// The synthetic "assertions enabled" flag.
    AssertionsEnabled,
}

/// Description of a single variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDescriptor {
    /// The id of this variable in its store.
    pub id: VarId,
    /// What the variable denotes.
    pub kind: VarKind,
    /// Additional properties.
    pub flags: VarFlags,
}

impl VariableDescriptor {
    /// Returns the qualifying variable, if this variable is reached through one.
    #[must_use]
    pub fn qualifier(&self) -> Option<VarId> {
        match self.kind {
            VarKind::Field { qualifier, .. } => Some(qualifier),
            _ => None,
        }
    }

    /// Returns the frame slot backing this variable, if any.
    #[must_use]
    pub fn slot(&self) -> Option<u16> {
        match self.kind {
            VarKind::Local { slot } | VarKind::This { slot } => Some(slot),
            _ => None,
        }
    }
}

/// The owning store of all variables of one analysed unit.
///
/// # Examples
///
/// ```rust
/// use flowscope::analysis::VariableStore;
///
/// let mut store = VariableStore::new();
/// let this = store.add_this(0);
/// let a = store.add_field(this, "a")?;
/// let b = store.add_field(a, "b")?;
///
/// assert_eq!(store.qualifier_depth(b), 2);
/// assert_eq!(store.dependents(this), vec![a, b]);
/// # Ok::<(), flowscope::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    vars: Vec<VariableDescriptor>,
}

impl VariableStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, kind: VarKind, flags: VarFlags) -> VarId {
        #[allow(clippy::cast_possible_truncation)]
        let id = VarId(self.vars.len() as u32);
        self.vars.push(VariableDescriptor { id, kind, flags });
        id
    }

    /// Adds a local variable stored in the given frame slot.
    pub fn add_local(&mut self, slot: u16) -> VarId {
        self.push(VarKind::Local { slot }, VarFlags::empty())
    }

    /// Adds a local variable with additional flags.
    pub fn add_local_with_flags(&mut self, slot: u16, flags: VarFlags) -> VarId {
        self.push(VarKind::Local { slot }, flags)
    }

    /// Adds the receiver reference.
    pub fn add_this(&mut self, slot: u16) -> VarId {
        self.push(VarKind::This { slot }, VarFlags::SYNTHETIC)
    }

    /// Adds a field variable qualified by `qualifier`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the qualifier is not part of this store.
    pub fn add_field(&mut self, qualifier: VarId, name: impl Into<String>) -> Result<VarId> {
        self.descriptor(qualifier)?;
        Ok(self.push(
            VarKind::Field {
                qualifier,
                name: name.into(),
            },
            VarFlags::empty(),
        ))
    }

    /// Adds an unqualified, slot-less variable such as a static field.
    pub fn add_static(&mut self, name: impl Into<String>) -> VarId {
        self.push(VarKind::Static { name: name.into() }, VarFlags::empty())
    }

    /// Adds the synthetic assertion-status flag.
    pub fn add_assertions_flag(&mut self) -> VarId {
        self.push(VarKind::AssertionsEnabled, VarFlags::SYNTHETIC)
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Returns `true` if the store holds no variables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Returns the descriptor of a variable, if it exists.
    #[must_use]
    pub fn get(&self, id: VarId) -> Option<&VariableDescriptor> {
        self.vars.get(id.index())
    }

    /// Returns the descriptor of a variable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the id does not belong to this store.
    pub fn descriptor(&self, id: VarId) -> Result<&VariableDescriptor> {
        self.get(id)
            .ok_or_else(|| malformed_error!("Unknown variable {} ({} variables)", id, self.len()))
    }

    /// Iterates over all variables in id order.
    pub fn iter(&self) -> impl Iterator<Item = &VariableDescriptor> {
        self.vars.iter()
    }

    /// Returns the qualifier of a variable, `None` for unknown or unqualified variables.
    #[must_use]
    pub fn qualifier(&self, id: VarId) -> Option<VarId> {
        self.get(id).and_then(VariableDescriptor::qualifier)
    }

    /// Returns the number of qualifiers above a variable (0 for unqualified variables).
    #[must_use]
    pub fn qualifier_depth(&self, id: VarId) -> usize {
        let mut depth = 0;
        let mut current = self.qualifier(id);
        while let Some(q) = current {
            depth += 1;
            current = self.qualifier(q);
        }
        depth
    }

    /// Returns the qualifier chain of a variable, root first and ending with the variable itself.
    #[must_use]
    pub fn qualifier_chain(&self, id: VarId) -> Vec<VarId> {
        let mut chain = vec![id];
        let mut current = self.qualifier(id);
        while let Some(q) = current {
            chain.push(q);
            current = self.qualifier(q);
        }
        chain.reverse();
        chain
    }

    /// Returns every variable whose qualifier chain contains `id`, in id order.
    #[must_use]
    pub fn dependents(&self, id: VarId) -> Vec<VarId> {
        self.vars
            .iter()
            .filter(|var| var.id != id && self.qualifier_chain(var.id).contains(&id))
            .map(|var| var.id)
            .collect()
    }

    /// Returns every variable backed by the given frame slot, in id order.
    #[must_use]
    pub fn slot_variables(&self, slot: u16) -> Vec<VarId> {
        self.vars
            .iter()
            .filter(|var| var.slot() == Some(slot))
            .map(|var| var.id)
            .collect()
    }

    /// Returns one kill mask per variable: the variable itself plus all of its dependents.
    ///
    /// Computed in a single pass; qualifiers are always created before the variables they
    /// qualify, so the chain of every variable only points to smaller ids.
    #[must_use]
    pub fn kill_masks(&self) -> Vec<BitSet> {
        let len = self.len();
        let mut masks: Vec<BitSet> = (0..len).map(|i| BitSet::from_indices(len, [i])).collect();
        for var in &self.vars {
            let mut current = var.qualifier();
            while let Some(q) = current {
                masks[q.index()].insert(var.id.index());
                current = self.qualifier(q);
            }
        }
        masks
    }

    /// Returns `true` if the variable must never be discarded by the flush analysis.
    ///
    /// Receiver references, the assertion-status flag and variables that may be read implicitly
    /// are exempt.
    #[must_use]
    pub fn is_flush_exempt(&self, id: VarId) -> bool {
        match self.get(id) {
            Some(var) => {
                matches!(var.kind, VarKind::This { .. } | VarKind::AssertionsEnabled)
                    || var.flags.contains(VarFlags::IMPLICIT_READ)
            }
            None => true,
        }
    }
}
