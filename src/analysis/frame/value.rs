//! Abstract frame values.

use std::fmt;

use crate::Result;

/// A storage cell of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    /// A local slot.
    Local(u16),
    /// A stack cell; depth 0 is the bottom of the stack.
    Stack(u16),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(slot) => write!(f, "local[{slot}]"),
            Location::Stack(depth) => write!(f, "stack[{depth}]"),
        }
    }
}

/// What is known about the value held by a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProvenanceValue {
    /// Nothing is known; the value was produced by an instruction.
    #[default]
    Unknown,
    /// The value was copied unchanged from the given location.
    From(Location),
}

/// The abstract state before or after an instruction: local slots plus an operand stack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Frame {
    locals: Vec<ProvenanceValue>,
    stack: Vec<ProvenanceValue>,
}

impl Frame {
    /// Creates a frame with `num_locals` unknown locals and an empty stack.
    #[must_use]
    pub fn new(num_locals: usize) -> Self {
        Self {
            locals: vec![ProvenanceValue::Unknown; num_locals],
            stack: Vec::new(),
        }
    }

    /// Creates a frame with `num_locals` unknown locals and `depth` unknown stack values.
    #[must_use]
    pub fn with_stack_depth(num_locals: usize, depth: usize) -> Self {
        Self {
            locals: vec![ProvenanceValue::Unknown; num_locals],
            stack: vec![ProvenanceValue::Unknown; depth],
        }
    }

    /// Creates a frame of the same shape as `shape` in which every cell refers to itself.
    ///
    /// Stepping such a frame through an instruction shows, for every cell of the result, which
    /// cell of the input it was copied from.
    #[must_use]
    pub fn marker(shape: &Frame) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let locals = (0..shape.locals.len())
            .map(|slot| ProvenanceValue::From(Location::Local(slot as u16)))
            .collect();
        #[allow(clippy::cast_possible_truncation)]
        let stack = (0..shape.stack.len())
            .map(|depth| ProvenanceValue::From(Location::Stack(depth as u16)))
            .collect();
        Self { locals, stack }
    }

    /// Returns the number of local slots.
    #[must_use]
    pub fn num_locals(&self) -> usize {
        self.locals.len()
    }

    /// Returns the current stack depth.
    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns the local slots.
    #[must_use]
    pub fn locals(&self) -> &[ProvenanceValue] {
        &self.locals
    }

    /// Returns the stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[ProvenanceValue] {
        &self.stack
    }

    /// Returns the value held at `location`, `None` if the location does not exist.
    #[must_use]
    pub fn get(&self, location: Location) -> Option<ProvenanceValue> {
        match location {
            Location::Local(slot) => self.locals.get(usize::from(slot)).copied(),
            Location::Stack(depth) => self.stack.get(usize::from(depth)).copied(),
        }
    }

    /// Returns the location of the topmost stack value.
    #[must_use]
    pub fn top(&self) -> Option<Location> {
        let depth = self.stack.len().checked_sub(1)?;
        u16::try_from(depth).ok().map(Location::Stack)
    }

    /// Returns the value of a local slot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the slot does not exist.
    pub fn local(&self, slot: u16) -> Result<ProvenanceValue> {
        self.locals.get(usize::from(slot)).copied().ok_or_else(|| {
            malformed_error!(
                "Local slot {} is out of range ({} locals)",
                slot,
                self.locals.len()
            )
        })
    }

    /// Replaces the value of a local slot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the slot does not exist.
    pub fn set_local(&mut self, slot: u16, value: ProvenanceValue) -> Result<()> {
        let count = self.locals.len();
        match self.locals.get_mut(usize::from(slot)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(malformed_error!(
                "Local slot {} is out of range ({} locals)",
                slot,
                count
            )),
        }
    }

    /// Pushes a value.
    pub fn push(&mut self, value: ProvenanceValue) {
        self.stack.push(value);
    }

    /// Pops the topmost value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] on stack underflow.
    pub fn pop(&mut self) -> Result<ProvenanceValue> {
        self.stack
            .pop()
            .ok_or_else(|| malformed_error!("Operand stack underflow"))
    }

    /// Pops `count` values.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if fewer than `count` values are on the stack.
    pub fn pop_n(&mut self, count: usize) -> Result<()> {
        if count > self.stack.len() {
            return Err(malformed_error!(
                "Operand stack underflow: need {} values, have {}",
                count,
                self.stack.len()
            ));
        }
        self.stack.truncate(self.stack.len() - count);
        Ok(())
    }

    /// Returns the frame at the entry of an exception handler entered from this frame: the same
    /// locals and only the caught exception on the stack.
    #[must_use]
    pub fn handler_entry(&self) -> Frame {
        Self {
            locals: self.locals.clone(),
            stack: vec![ProvenanceValue::Unknown],
        }
    }

    /// Returns `true` if both frames have the same number of locals and the same stack depth.
    #[must_use]
    pub fn same_shape(&self, other: &Frame) -> bool {
        self.locals.len() == other.locals.len() && self.stack.len() == other.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_refers_to_itself() {
        let shape = Frame::with_stack_depth(2, 3);
        let marker = Frame::marker(&shape);
        assert_eq!(
            marker.get(Location::Local(1)),
            Some(ProvenanceValue::From(Location::Local(1)))
        );
        assert_eq!(
            marker.get(Location::Stack(2)),
            Some(ProvenanceValue::From(Location::Stack(2)))
        );
        assert_eq!(marker.get(Location::Stack(3)), None);
        assert_eq!(marker.top(), Some(Location::Stack(2)));
    }

    #[test]
    fn test_underflow_and_bad_slots() {
        let mut frame = Frame::new(1);
        assert!(frame.pop().is_err());
        assert!(frame.pop_n(1).is_err());
        assert!(frame.local(1).is_err());
        assert!(frame.set_local(3, ProvenanceValue::Unknown).is_err());
        frame.push(ProvenanceValue::Unknown);
        assert!(frame.pop_n(1).is_ok());
        assert_eq!(frame.top(), None);
    }
}
