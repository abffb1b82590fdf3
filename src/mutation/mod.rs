//! Reversible mutable units.
//!
//! How a unit is altered is supplied by a [`MutationStrategy`]; this module only
//! owns the pristine snapshot and the apply/reset lifecycle.

pub mod unit;

pub use unit::{FnStrategy, MutableUnit, Mutation, MutationStrategy};
