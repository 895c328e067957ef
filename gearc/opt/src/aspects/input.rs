use super::{Aspect, LowerCtx};
use crate::traversal::Named;
use gearc_ir::{AssignValue, BlockKind, Expr, HdlStmt, StmtIdx};
use gearc_utils::GearResult;

/// Lowers interface blocks to the `<port>.ready` handshake of the input
/// port they consume.
///
/// A transaction consumed by an interface block is acknowledged when the
/// block is left; one consumed by an interface loop is acknowledged every
/// time the loop body completes a cycle.
#[derive(Default)]
pub struct Input;

impl Named for Input {
    fn name() -> &'static str {
        "inputs"
    }

    fn description() -> &'static str {
        "input port ready signals"
    }
}

impl Aspect for Input {
    fn enter_block(
        &mut self,
        ctx: &mut LowerCtx,
        block: StmtIdx,
    ) -> GearResult<Vec<HdlStmt>> {
        let module = ctx.module;
        let Some(b) = module.block(block) else {
            return Ok(vec![]);
        };
        let ready = match (&b.kind, b.id) {
            (BlockKind::Module, _) => {
                return Ok(module
                    .in_ports
                    .iter()
                    .map(|p| {
                        AssignValue::flag(p.name.with_suffix(".ready"), Expr::bool(false))
                            .into()
                    })
                    .collect());
            }
            (BlockKind::Intf { intf }, Some(id)) => (*intf, ctx.block_exit(id)),
            (BlockKind::IntfLoop { intf }, Some(id)) => (*intf, ctx.block_cycle(id)),
            _ => return Ok(vec![]),
        };
        let (intf, cond) = ready;
        Ok(vec![
            AssignValue::flag(
                intf.with_suffix(".ready"),
                cond.unwrap_or_else(|| Expr::bool(true)),
            )
            .into(),
        ])
    }
}
