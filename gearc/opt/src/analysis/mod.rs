//! Analyses over the scheduled module shared by the lowering passes.
mod conditions;
mod transitions;

pub use conditions::{CondPair, CondTable, RST_COND, STATE_REG};
pub use transitions::TransitionGraph;
