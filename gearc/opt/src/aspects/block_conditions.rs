use super::{Aspect, LowerCtx};
use crate::analysis::{CondTable, RST_COND};
use crate::traversal::Named;
use gearc_ir::{AssignValue, BlockKind, Expr, HdlStmt, Id, StmtIdx, Yield};
use gearc_utils::GearResult;
use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;

/// Materializes the named block conditions referenced by the other aspects.
///
/// A condition is captured when the block defining it is visited. The
/// conditions it refers to are captured right after it.
pub struct BlockConditions {
    used: HashSet<Id>,
    captured: LinkedHashMap<Id, AssignValue>,
}

impl Named for BlockConditions {
    fn name() -> &'static str {
        "block_conditions"
    }

    fn description() -> &'static str {
        "per-block cycle and exit conditions"
    }
}

impl BlockConditions {
    pub fn new(used: HashSet<Id>) -> Self {
        Self {
            used,
            captured: LinkedHashMap::new(),
        }
    }

    fn capture(&mut self, ctx: &LowerCtx, name: Id) {
        if self.captured.contains_key(&name) {
            return;
        }
        let val = if name == RST_COND {
            ctx.conds.rst_cond()
        } else {
            ctx.conds.get(name).cloned().flatten()
        };
        let refs = val.as_ref().map(|v| v.signals()).unwrap_or_default();
        self.captured.insert(
            name,
            AssignValue::flag(name, val.unwrap_or_else(|| Expr::bool(true))),
        );
        for sig in refs {
            if ctx.conds.contains(sig) {
                self.capture(ctx, sig);
            }
        }
    }

    fn capture_block(&mut self, ctx: &LowerCtx, id: Option<u32>) {
        let Some(id) = id else { return };
        for name in [CondTable::cycle_name(id), CondTable::exit_name(id)] {
            if self.used.contains(&name) {
                self.capture(ctx, name);
            }
        }
    }

    /// The captured conditions. Referenced conditions whose block was never
    /// visited are appended in name order.
    pub fn finish(mut self, ctx: &LowerCtx) -> Vec<AssignValue> {
        let mut rest = self
            .used
            .iter()
            .filter(|n| !self.captured.contains_key(*n))
            .copied()
            .collect::<Vec<_>>();
        rest.sort();
        for name in rest {
            self.capture(ctx, name);
        }
        self.captured.into_iter().map(|(_, a)| a).collect()
    }
}

impl Aspect for BlockConditions {
    fn enter_block(
        &mut self,
        ctx: &mut LowerCtx,
        block: StmtIdx,
    ) -> GearResult<Vec<HdlStmt>> {
        let module = ctx.module;
        let Some(b) = module.block(block) else {
            return Ok(vec![]);
        };
        if matches!(b.kind, BlockKind::Module) && !module.regs.is_empty() {
            self.capture(ctx, Id::from(RST_COND));
        }
        self.capture_block(ctx, b.id);
        Ok(vec![])
    }

    fn visit_yield(
        &mut self,
        ctx: &mut LowerCtx,
        stmt: &Yield,
    ) -> GearResult<Vec<HdlStmt>> {
        self.capture_block(ctx, stmt.id);
        Ok(vec![])
    }
}
