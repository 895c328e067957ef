use super::{Aspect, LowerCtx, Transition, is_control_name};
use crate::analysis::{STATE_REG, TransitionGraph};
use crate::traversal::Named;
use gearc_ir::{AssignValue, BlockKind, Expr, HdlBlock, HdlStmt, Id, StmtIdx};
use gearc_utils::GearResult;

/// Lowers state transitions to the `state_en`/`state_next` pair of the state
/// register, and records the transition graph.
pub struct StateTransition {
    pub graph: TransitionGraph,
}

impl StateTransition {
    pub fn new(max_state: u32) -> Self {
        Self {
            graph: TransitionGraph::new(max_state),
        }
    }

    fn en() -> Id {
        Id::from(STATE_REG).with_suffix("_en")
    }

    fn next() -> Id {
        Id::from(STATE_REG).with_suffix("_next")
    }
}

impl Named for StateTransition {
    fn name() -> &'static str {
        "state_transition"
    }

    fn description() -> &'static str {
        "state register enable and next state"
    }
}

impl Aspect for StateTransition {
    fn enter_block(
        &mut self,
        ctx: &mut LowerCtx,
        block: StmtIdx,
    ) -> GearResult<Vec<HdlStmt>> {
        let is_module = matches!(
            ctx.module.block(block).map(|b| &b.kind),
            Some(BlockKind::Module)
        );
        if !is_module || ctx.max_state() == 0 {
            return Ok(vec![]);
        }
        Ok(vec![AssignValue::flag(Self::en(), Expr::bool(false)).into()])
    }

    fn assign_state(
        &mut self,
        ctx: &mut LowerCtx,
        block: &mut HdlBlock,
        tr: &Transition,
    ) -> GearResult<()> {
        if ctx.max_state() == 0 {
            return Ok(());
        }
        let mut change = HdlBlock::new(tr.cond.clone());
        change.push(AssignValue::flag(Self::en(), Expr::bool(true)));
        let next = AssignValue::new(
            Self::next(),
            ctx.conds.state_lit(tr.next_state),
            ctx.conds.state_width(),
        );
        change.dflts.insert(next.target, next);
        block.push(change);
        self.graph.add(tr.from, tr.next_state);
        Ok(())
    }

    /// Transitions nested in one another are taken in priority order, so
    /// the next state must stay with its enable.
    fn is_control(&self, assign: &AssignValue) -> bool {
        is_control_name(assign.target) || assign.target == Self::next()
    }
}
