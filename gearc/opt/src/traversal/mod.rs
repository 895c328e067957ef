//! Naming and option parsing shared by the passes.
mod construct;

pub use construct::{ConstructPass, Named, ParseVal, PassOpt};
