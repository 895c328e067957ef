//! Intermediate representations used by the gearc compiler: the control tree
//! produced by the front end, the scheduling tree and the lowered per-signal
//! statement trees.
mod builder;
mod cblock;
mod control;
mod expr;
mod hdl;
mod printer;
pub mod types;

pub use builder::ModuleBuilder;
pub use cblock::{CBlock, CBlockIdx, CBlockKind, Schedule, StateIds};
pub use control::{
    Block, BlockKind, Module, PortDef, RegDef, RegNextStmt, Stmt, StmtIdx,
    VariableDef, VariableStmt, Yield,
};
pub use expr::{
    BinOp, Context, Expr, OperandKind, OperandVal, ResExpr, Signal, UnaryOp,
};
pub use gearc_utils::{GetName, Id};
pub use hdl::{AssignValue, CombBlock, HdlBlock, HdlStmt};
pub use printer::Printer;
pub use types::{DType, TypeArg, TypeKind};
