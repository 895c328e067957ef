use super::{Aspect, LowerCtx, is_control_name};
use crate::traversal::Named;
use gearc_ir::{
    AssignValue, BlockKind, Expr, HdlStmt, OperandKind, RegNextStmt, StmtIdx,
};
use gearc_utils::{Error, GearResult, Id};

/// Lowers register updates to `<reg>_en`/`<reg>_next` pairs.
///
/// A register is latched when the cycle its update belongs to completes.
/// `<reg>_next` holds the current value unless updated, so that reads of the
/// next value are always defined.
#[derive(Default)]
pub struct RegEn;

impl Named for RegEn {
    fn name() -> &'static str {
        "register_next_state"
    }

    fn description() -> &'static str {
        "register enable and next value signals"
    }
}

fn en(reg: Id) -> Id {
    reg.with_suffix("_en")
}

fn next(reg: Id) -> Id {
    reg.with_suffix("_next")
}

impl Aspect for RegEn {
    fn enter_block(
        &mut self,
        ctx: &mut LowerCtx,
        block: StmtIdx,
    ) -> GearResult<Vec<HdlStmt>> {
        let module = ctx.module;
        if !matches!(module.block(block).map(|b| &b.kind), Some(BlockKind::Module)) {
            return Ok(vec![]);
        }
        let mut stmts = vec![];
        for reg in module.regs.values() {
            let width = reg.dtype.width()?;
            stmts.push(AssignValue::flag(en(reg.name), Expr::bool(false)).into());
            let cur = Expr::operand(reg.name, OperandKind::Reg, reg.dtype.clone());
            stmts.push(AssignValue::new(next(reg.name), cur, width).into());
        }
        Ok(stmts)
    }

    fn visit_reg_next(
        &mut self,
        ctx: &mut LowerCtx,
        stmt: &RegNextStmt,
    ) -> GearResult<Vec<HdlStmt>> {
        let width = ctx.module.decl_width(stmt.reg).ok_or_else(|| {
            Error::malformed_structure(format!(
                "Register `{}' has no concrete width",
                stmt.reg
            ))
        })?;
        let enable = ctx.cycle_cond().unwrap_or_else(|| Expr::bool(true));
        Ok(vec![
            AssignValue::flag(en(stmt.reg), enable).into(),
            AssignValue::new(next(stmt.reg), stmt.val.clone(), width).into(),
        ])
    }

    /// The next value is read within the cycle, so it must not leak out of
    /// the branch updating it.
    fn is_control(&self, assign: &AssignValue) -> bool {
        is_control_name(assign.target) || assign.target.as_str().ends_with("_next")
    }
}
