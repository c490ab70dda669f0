//! Utility functions
//!
//! Randomization, owner-only file persistence, listener locations and
//! the listeners bound from them.

pub mod fs;
pub mod listener;
pub mod location;
pub mod rand;

pub use listener::{BoundListener, Connection};
pub use location::{Location, Protocol};
