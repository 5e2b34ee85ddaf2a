//! Equivalence classes of interchangeable variables.
//!
//! When the front end proves two variables always hold the same value (e.g. after `a = b` with
//! neither reassigned), it merges them into one class. Consumers then refer to the whole class
//! through its *canonical* member, which must be chosen deterministically so that independent
//! runs agree.
//!
//! # Canonical order
//!
//! Variables are ordered by their qualifier chains:
//!
//! 1. a shallower chain (fewer qualifiers) sorts first, so `x` precedes `this.x`;
//! 2. chains of equal depth are compared element-wise from the root, by variable id.
//!
//! The canonical member is the minimum of this order. It depends only on the class membership
//! and the variable store, never on the order of merges.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use crate::{
    analysis::{VarId, VariableStore},
    utils::SortedIntSet,
    Result,
};

/// Identifier of a class within one [`EquivalenceClasses`] store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(usize);

impl ClassId {
    /// Returns the raw index of the class.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// A set of interchangeable variables.
#[derive(Debug, Clone)]
pub struct EqClass {
    members: SortedIntSet,
    store: Arc<VariableStore>,
}

impl EqClass {
    /// Returns the members, sorted by id.
    pub fn members(&self) -> impl Iterator<Item = VarId> + '_ {
        self.members.iter().map(|&raw| VarId::new(raw))
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`; classes are created with at least one member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns `true` if `var` is a member.
    #[must_use]
    pub fn contains(&self, var: VarId) -> bool {
        self.members.contains(var.raw())
    }

    /// Returns the canonical member.
    #[must_use]
    pub fn canonical(&self) -> Option<VarId> {
        self.members()
            .map(|var| (self.store.qualifier_chain(var), var))
            .min_by(|(left, _), (right, _)| compare_chains(left, right))
            .map(|(_, var)| var)
    }
}

/// Compares two qualifier chains (root first) in canonical order.
fn compare_chains(left: &[VarId], right: &[VarId]) -> Ordering {
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

/// Compares two variables in canonical order.
#[must_use]
pub fn canonical_order(store: &VariableStore, left: VarId, right: VarId) -> Ordering {
    compare_chains(&store.qualifier_chain(left), &store.qualifier_chain(right))
}

/// The equivalence classes of one unit.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use flowscope::analysis::{EquivalenceClasses, VariableStore};
///
/// let mut store = VariableStore::new();
/// let this = store.add_this(0);
/// let field = store.add_field(this, "cache")?;
/// let local = store.add_local(1);
///
/// let mut classes = EquivalenceClasses::new(Arc::new(store));
/// let class = classes.merge(field, local)?;
///
/// // The unqualified local wins over the field.
/// assert_eq!(classes.canonical(class)?, local);
/// assert_eq!(classes.members(class)?, vec![field, local]);
/// # Ok::<(), flowscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct EquivalenceClasses {
    store: Arc<VariableStore>,
    classes: Vec<Option<EqClass>>,
    class_of: HashMap<VarId, ClassId>,
}

impl EquivalenceClasses {
    /// Creates an empty set of classes over `store`.
    #[must_use]
    pub fn new(store: Arc<VariableStore>) -> Self {
        Self {
            store,
            classes: Vec::new(),
            class_of: HashMap::new(),
        }
    }

    /// Returns the variable store the classes refer to.
    #[must_use]
    pub fn store(&self) -> &Arc<VariableStore> {
        &self.store
    }

    /// Returns the class of `var`, creating a singleton class if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `var` is not in the store.
    pub fn insert(&mut self, var: VarId) -> Result<ClassId> {
        self.store.descriptor(var)?;
        if let Some(&class) = self.class_of.get(&var) {
            return Ok(class);
        }
        let class = ClassId(self.classes.len());
        self.classes.push(Some(EqClass {
            members: std::iter::once(var.raw()).collect(),
            store: Arc::clone(&self.store),
        }));
        self.class_of.insert(var, class);
        Ok(class)
    }

    /// Merges the classes of `a` and `b` and returns the resulting class.
    ///
    /// The smaller class is absorbed into the larger one; its id becomes invalid. Merging two
    /// variables of the same class returns that class unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if either variable is not in the store.
    pub fn merge(&mut self, a: VarId, b: VarId) -> Result<ClassId> {
        let class_a = self.insert(a)?;
        let class_b = self.insert(b)?;
        if class_a == class_b {
            return Ok(class_a);
        }

        let (keep, absorb) = if self.get(class_a)?.len() >= self.get(class_b)?.len() {
            (class_a, class_b)
        } else {
            (class_b, class_a)
        };

        let absorbed = self.classes[absorb.0]
            .take()
            .ok_or_else(|| malformed_error!("Class {} was already merged", absorb.0))?;
        for &raw in absorbed.members.iter() {
            self.class_of.insert(VarId::new(raw), keep);
        }
        match self.classes[keep.0].as_mut() {
            Some(target) => target.members.union_with(&absorbed.members),
            None => return Err(malformed_error!("Class {} was already merged", keep.0)),
        }
        Ok(keep)
    }

    /// Returns the class containing `var`, if any.
    #[must_use]
    pub fn class_of(&self, var: VarId) -> Option<ClassId> {
        self.class_of.get(&var).copied()
    }

    /// Returns the class with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the id is unknown or was absorbed by a merge.
    pub fn get(&self, class: ClassId) -> Result<&EqClass> {
        self.classes
            .get(class.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| malformed_error!("Unknown or merged equivalence class {}", class.0))
    }

    /// Returns the members of a class, sorted by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the id is unknown or was absorbed by a merge.
    pub fn members(&self, class: ClassId) -> Result<Vec<VarId>> {
        Ok(self.get(class)?.members().collect())
    }

    /// Returns the canonical member of a class.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the id is unknown or was absorbed by a merge.
    pub fn canonical(&self, class: ClassId) -> Result<VarId> {
        self.get(class)?
            .canonical()
            .ok_or_else(|| malformed_error!("Equivalence class {} is empty", class.0))
    }

    /// Returns the canonical member of the class of `var`, or `var` itself if it has no class.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the class of `var` is inconsistent.
    pub fn canonical_of(&self, var: VarId) -> Result<VarId> {
        match self.class_of(var) {
            Some(class) => self.canonical(class),
            None => Ok(var),
        }
    }

    /// Iterates over the live classes.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &EqClass)> {
        self.classes
            .iter()
            .enumerate()
            .filter_map(|(index, class)| class.as_ref().map(|class| (ClassId(index), class)))
    }
}
