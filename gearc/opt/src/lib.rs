//! # The gearc lowering middle-end
//!
//! Turns the control tree of a synthesized procedure, where every yield
//! marks a clock cycle boundary, into a finite state machine described by
//! one lowered statement tree per class of signals.
//!
//! The passes run in order:
//! 1. [passes::Scheduler] partitions the control tree into scheduling units.
//! 2. [passes::StateFinder] assigns states and resolves register reads.
//! 3. [analysis::CondTable] derives the cycle and exit condition of every
//!    block.
//! 4. [passes::CBlockDriver] lowers the module once per [aspects::Aspect].
//! 5. [passes::SimplifyConditions] minimizes the materialized conditions.
//!
//! [pipeline::compile] runs all of them.
//!
//! ```rust
//! use gearc_ir::{DType, Expr, ModuleBuilder};
//! use gearc_opt::pipeline;
//! # fn main() -> gearc_utils::GearResult<()> {
//! let mut b = ModuleBuilder::new("counter");
//! b.add_out_port("dout", DType::uint(8));
//! let y = b.emit(vec![Expr::lit(1, DType::uint(8))]);
//! let lowered = pipeline::compile(b.finish(vec![y])?, &[])?;
//! assert_eq!(lowered.max_state, 0);
//! # Ok(())
//! # }
//! ```
pub mod analysis;
pub mod aspects;
pub mod passes;
pub mod pipeline;
pub mod traversal;
