//! Lowering of the scheduled module into one statement tree per signal class.
//!
//! Each [Aspect] describes what a class of signals (register enables,
//! outputs, ...) does for every statement of the control tree. The
//! [CBlockDriver](crate::passes::CBlockDriver) walks the scheduling tree,
//! asks the aspect to lower each statement and adds the state guards and
//! state transitions.
mod block_conditions;
mod defaults;
mod input;
mod output;
mod reg_en;
mod state_transition;
mod variable;

pub use block_conditions::BlockConditions;
pub use defaults::{update_defaults, update_defaults_tree};
pub use input::Input;
pub use output::Output;
pub use reg_en::RegEn;
pub use state_transition::StateTransition;
pub use variable::Variable;

use crate::analysis::CondTable;
use crate::traversal::Named;
use gearc_ir::{
    self as ir, AssignValue, CBlockIdx, Expr, HdlBlock, HdlStmt, Id,
    RegNextStmt, Stmt, StmtIdx, VariableStmt, Yield,
};
use gearc_utils::GearResult;
use std::collections::HashSet;

/// A state change taken when the unit the state copy belongs to is left.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    /// The state the transition is taken from.
    pub from: u32,
    pub next_state: u32,
    /// `None` when the transition is unconditional.
    pub cond: Option<Expr>,
}

/// Shared state of a lowering run.
pub struct LowerCtx<'a> {
    pub module: &'a ir::Module,
    pub schedule: &'a ir::Schedule,
    pub conds: &'a CondTable,
    /// Completion condition of the cycle being lowered, innermost last.
    cycle: Vec<Option<Expr>>,
    /// Named conditions referenced by lowered statements.
    used: HashSet<Id>,
}

impl<'a> LowerCtx<'a> {
    pub fn new(
        module: &'a ir::Module,
        schedule: &'a ir::Schedule,
        conds: &'a CondTable,
    ) -> Self {
        Self {
            module,
            schedule,
            conds,
            cycle: vec![],
            used: HashSet::new(),
        }
    }

    pub fn max_state(&self) -> u32 {
        self.conds.max_state()
    }

    /// Record the named conditions referenced by `expr`.
    pub fn mark(&mut self, expr: &Option<Expr>) {
        if let Some(e) = expr {
            for sig in e.signals() {
                if self.conds.contains(sig) {
                    self.used.insert(sig);
                }
            }
        }
    }

    /// Record the named conditions referenced anywhere in `block`.
    pub fn mark_tree(&mut self, block: &HdlBlock) {
        let conds = self.conds;
        let used = &mut self.used;
        block.for_each_expr(&mut |e: &Expr| {
            used.extend(e.signals().into_iter().filter(|s| conds.contains(*s)))
        });
    }

    pub fn push_cycle(&mut self, cond: Option<Expr>) {
        self.cycle.push(cond);
    }

    pub fn pop_cycle(&mut self) {
        self.cycle.pop();
    }

    /// Condition under which the current cycle completes.
    pub fn cycle_cond(&mut self) -> Option<Expr> {
        let cond = self.cycle.last().cloned().flatten();
        self.mark(&cond);
        cond
    }

    /// The enclosing cycle condition, without recording it as used.
    pub fn current_cycle(&self) -> Option<Expr> {
        self.cycle.last().cloned().flatten()
    }

    pub fn cycle_ref(&mut self, idx: CBlockIdx) -> Option<Expr> {
        let cond = self.conds.refs(idx).cycle.clone();
        self.mark(&cond);
        cond
    }

    pub fn exit_ref(&mut self, idx: CBlockIdx) -> Option<Expr> {
        let cond = self.conds.refs(idx).exit.clone();
        self.mark(&cond);
        cond
    }

    /// Reference to the cycle condition of the block numbered `id`.
    pub fn block_cycle(&mut self, id: u32) -> Option<Expr> {
        let name = CondTable::cycle_name(id);
        self.conds.contains(name).then(|| {
            self.used.insert(name);
            Expr::flag(name)
        })
    }

    /// Reference to the exit condition of the block numbered `id`.
    pub fn block_exit(&mut self, id: u32) -> Option<Expr> {
        let name = CondTable::exit_name(id);
        self.conds.contains(name).then(|| {
            self.used.insert(name);
            Expr::flag(name)
        })
    }

    pub fn used(&self) -> &HashSet<Id> {
        &self.used
    }

    pub fn into_used(self) -> HashSet<Id> {
        self.used
    }
}

/// Targets named like handshake or enable lines.
pub fn is_control_name(target: Id) -> bool {
    let name = target.as_str();
    name.ends_with("_en") || name.ends_with(".valid") || name.ends_with(".ready")
}

/// A lowering pass for one class of signals.
///
/// The hooks return the statements a control-tree statement lowers to; the
/// provided methods take care of blocks and default propagation.
pub trait Aspect: Named {
    /// Statements driven when entering the control block `block`.
    fn enter_block(
        &mut self,
        _ctx: &mut LowerCtx,
        _block: StmtIdx,
    ) -> GearResult<Vec<HdlStmt>> {
        Ok(vec![])
    }

    fn visit_reg_next(
        &mut self,
        _ctx: &mut LowerCtx,
        _stmt: &RegNextStmt,
    ) -> GearResult<Vec<HdlStmt>> {
        Ok(vec![])
    }

    fn visit_variable(
        &mut self,
        _ctx: &mut LowerCtx,
        _stmt: &VariableStmt,
    ) -> GearResult<Vec<HdlStmt>> {
        Ok(vec![])
    }

    fn visit_yield(
        &mut self,
        _ctx: &mut LowerCtx,
        _stmt: &Yield,
    ) -> GearResult<Vec<HdlStmt>> {
        Ok(vec![])
    }

    /// Add the statements performing `tr` to a state copy.
    fn assign_state(
        &mut self,
        _ctx: &mut LowerCtx,
        _block: &mut HdlBlock,
        _tr: &Transition,
    ) -> GearResult<()> {
        Ok(())
    }

    /// Control targets are deasserted unless explicitly driven, so their
    /// defaults never leave a guarded block.
    fn is_control(&self, assign: &AssignValue) -> bool {
        is_control_name(assign.target)
    }

    /// Lower a single statement without its nested statements.
    fn visit(&mut self, ctx: &mut LowerCtx, idx: StmtIdx) -> GearResult<Vec<HdlStmt>> {
        let module = ctx.module;
        match module.stmt(idx) {
            Stmt::Block(_) => Ok(vec![self.visit_block(ctx, idx)?.into()]),
            Stmt::Yield(y) => self.visit_yield(ctx, y),
            Stmt::RegNext(r) => self.visit_reg_next(ctx, r),
            Stmt::Variable(v) => self.visit_variable(ctx, v),
        }
    }

    /// An empty lowered block for `idx` guarded like it, holding the
    /// statements of [Aspect::enter_block].
    fn visit_block(&mut self, ctx: &mut LowerCtx, idx: StmtIdx) -> GearResult<HdlBlock> {
        let in_cond = ctx.module.block(idx).and_then(|b| b.in_cond.clone());
        let stmts = self.enter_block(ctx, idx)?;
        Ok(HdlBlock::with_stmts(in_cond, stmts))
    }

    /// Lower a statement executing within the current cycle, nested
    /// statements included.
    fn lower_stmt(&mut self, ctx: &mut LowerCtx, idx: StmtIdx) -> GearResult<Vec<HdlStmt>> {
        let module = ctx.module;
        let Stmt::Block(block) = module.stmt(idx) else {
            return self.visit(ctx, idx);
        };
        let mut lowered = self.visit_block(ctx, idx)?;
        for stmt in &block.stmts {
            lowered.stmts.extend(self.lower_stmt(ctx, *stmt)?);
        }
        self.update_defaults(&mut lowered);
        Ok(vec![lowered.into()])
    }

    /// The state copy of a unit performing `tr`. The statements of the
    /// control block `node` the unit was built from are lowered again, under
    /// the block's own guard, followed by the transition. The copy itself is
    /// unguarded: it is placed where the unit's state already holds.
    fn state_copy(
        &mut self,
        ctx: &mut LowerCtx,
        node: Option<StmtIdx>,
        tr: &Transition,
    ) -> GearResult<HdlBlock> {
        let mut copy = HdlBlock::new(None);
        if let Some(node) = node {
            let mut entry = self.visit_block(ctx, node)?;
            self.update_defaults(&mut entry);
            if !entry.is_empty() {
                copy.push(entry);
            }
        }
        self.assign_state(ctx, &mut copy, tr)?;
        self.update_defaults(&mut copy);
        Ok(copy)
    }

    fn update_defaults(&self, block: &mut HdlBlock) {
        update_defaults(block, &|a: &AssignValue| self.is_control(a))
    }
}
