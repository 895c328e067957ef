//! Passes of the lowering pipeline.
mod driver;
mod schedule;
mod simplify;
mod state_finder;

pub use driver::CBlockDriver;
pub use schedule::Scheduler;
pub use simplify::SimplifyConditions;
pub use state_finder::StateFinder;
