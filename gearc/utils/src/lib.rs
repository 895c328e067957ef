//! Shared utilities for the gearc compiler.
mod errors;
mod id;

pub mod math;

pub use errors::{Error, GearResult};
pub use id::{GSym, GetName, Id};
pub use math::bits_needed_for;
