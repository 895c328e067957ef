use super::{Aspect, LowerCtx};
use crate::traversal::Named;
use gearc_ir::{AssignValue, BlockKind, Expr, HdlStmt, StmtIdx, Yield};
use gearc_utils::GearResult;

/// Lowers yields to the `<port>.valid` handshake and `<port>_s` data of
/// every output port they emit on.
#[derive(Default)]
pub struct Output;

impl Named for Output {
    fn name() -> &'static str {
        "outputs"
    }

    fn description() -> &'static str {
        "output port valid and data signals"
    }
}

impl Aspect for Output {
    fn enter_block(
        &mut self,
        ctx: &mut LowerCtx,
        block: StmtIdx,
    ) -> GearResult<Vec<HdlStmt>> {
        let module = ctx.module;
        if !matches!(module.block(block).map(|b| &b.kind), Some(BlockKind::Module)) {
            return Ok(vec![]);
        }
        Ok(module
            .out_ports
            .iter()
            .map(|p| {
                AssignValue::flag(p.name.with_suffix(".valid"), Expr::bool(false)).into()
            })
            .collect())
    }

    fn visit_yield(
        &mut self,
        ctx: &mut LowerCtx,
        stmt: &Yield,
    ) -> GearResult<Vec<HdlStmt>> {
        let mut stmts = vec![];
        for (expr, port) in stmt.exprs.iter().zip(&ctx.module.out_ports) {
            let Some(expr) = expr else { continue };
            let width = port.dtype.width()?;
            stmts.push(
                AssignValue::flag(port.name.with_suffix(".valid"), Expr::bool(true)).into(),
            );
            stmts.push(
                AssignValue::new(port.name.with_suffix("_s"), expr.clone(), width).into(),
            );
        }
        Ok(stmts)
    }
}
