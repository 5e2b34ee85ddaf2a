//! Abstract frame simulation.
//!
//! A [`Frame`] models the state of the stack machine at one program point: a fixed number of
//! local slots and an operand stack of varying depth. Cells hold [`ProvenanceValue`]s, which only
//! record whether a value is a plain copy of another cell.
//!
//! The [`FrameSimulator`] applies the stack effect of an instruction to a frame. Its main client
//! is the origin tracker, which asks [`FrameSimulator::pre_location`] where a value observed after
//! an instruction was located before it.

mod simulator;
mod value;

pub use simulator::FrameSimulator;
pub use value::{Frame, Location, ProvenanceValue};
