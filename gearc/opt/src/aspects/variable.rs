use super::{Aspect, LowerCtx, is_control_name};
use crate::traversal::Named;
use gearc_ir::{AssignValue, Expr, HdlStmt, Stmt, StmtIdx, VariableStmt};
use gearc_utils::{Error, GearResult, Id};
use std::collections::{HashMap, HashSet};

/// Lowers variable assignments to `<var>_v` latches.
#[derive(Default)]
pub struct Variable {
    /// First value assigned to each latch.
    first: HashMap<Id, Expr>,
    /// Latches assigned different values in different places.
    differing: HashSet<Id>,
}

impl Named for Variable {
    fn name() -> &'static str {
        "variables"
    }

    fn description() -> &'static str {
        "combinational variable latches"
    }
}

impl Variable {
    /// Record the value of every assignment in `module` so that latch
    /// classification does not depend on lowering order.
    fn classify(&mut self, module: &gearc_ir::Module) {
        for idx in module.descendants(module.root) {
            let Stmt::Variable(v) = module.stmt(idx) else {
                continue;
            };
            let target = v.var.with_suffix("_v");
            match self.first.get(&target) {
                Some(first) if *first != v.val => {
                    self.differing.insert(target);
                }
                Some(_) => (),
                None => {
                    self.first.insert(target, v.val.clone());
                }
            }
        }
    }
}

impl Aspect for Variable {
    fn enter_block(
        &mut self,
        ctx: &mut LowerCtx,
        block: StmtIdx,
    ) -> GearResult<Vec<HdlStmt>> {
        if block == ctx.module.root && self.first.is_empty() {
            self.classify(ctx.module);
        }
        Ok(vec![])
    }

    fn visit_variable(
        &mut self,
        ctx: &mut LowerCtx,
        stmt: &VariableStmt,
    ) -> GearResult<Vec<HdlStmt>> {
        let width = ctx.module.decl_width(stmt.var).ok_or_else(|| {
            Error::malformed_structure(format!(
                "Variable `{}' has no concrete width",
                stmt.var
            ))
        })?;
        let target = stmt.var.with_suffix("_v");
        Ok(vec![AssignValue::new(target, stmt.val.clone(), width).into()])
    }

    /// The first value of a latch may become its default. Any other value
    /// stays under the guard it was assigned in.
    fn is_control(&self, assign: &AssignValue) -> bool {
        is_control_name(assign.target)
            || (self.differing.contains(&assign.target)
                && self.first.get(&assign.target) != assign.val.as_ref())
    }
}
