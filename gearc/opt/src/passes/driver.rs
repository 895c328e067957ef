use crate::aspects::{Aspect, LowerCtx, Transition};
use gearc_ir::{
    CBlock, CBlockIdx, CBlockKind, CombBlock, Expr, HdlBlock, HdlStmt,
};
use gearc_utils::GearResult;

/// Drives an [Aspect] over the scheduling tree.
///
/// Units live in fewer states than their parent are guarded by a test of
/// the state register. Units which leave their state when they complete get
/// a state copy per transition: the unit's own statements repeated without
/// a state guard of their own, followed by the state change.
pub struct CBlockDriver;

impl CBlockDriver {
    /// Lower the scheduled module for `aspect`. Named conditions referenced
    /// by the result are recorded in `ctx`.
    pub fn run<A: Aspect>(aspect: &mut A, ctx: &mut LowerCtx) -> GearResult<CombBlock> {
        let root = ctx.schedule.root;
        let stmts = Self::visit(aspect, ctx, root, None)?;
        let mut comb = HdlBlock::with_stmts(None, stmts);
        aspect.update_defaults(&mut comb);
        ctx.mark_tree(&comb);
        log::debug!("{}:\n{}", A::name(), gearc_ir::Printer::hdl_to_str(&comb));
        Ok(comb)
    }

    fn visit<A: Aspect>(
        aspect: &mut A,
        ctx: &mut LowerCtx,
        idx: CBlockIdx,
        parent: Option<&[u32]>,
    ) -> GearResult<Vec<HdlStmt>> {
        let schedule = ctx.schedule;
        let conds = ctx.conds;
        let cb = schedule.get(idx);
        let guard = parent.and_then(|p| conds.ids_guard(&cb.state_ids, p));
        let mut out = vec![];

        if !cb.prolog.is_empty() {
            let first = cb.first_state().into_iter().collect::<Vec<_>>();
            let in_cond = parent.and_then(|p| conds.ids_guard(&first, p));
            let cycle = conds.refs(idx).cycle.clone();
            let block = Self::free_stmts(aspect, ctx, &cb.prolog, in_cond, cycle)?;
            emit(&mut out, block);
        }

        let mut body = match cb.kind {
            CBlockKind::Leaf => {
                let cycle = match &conds.refs(idx).cycle {
                    Some(c) => Some(c.clone()),
                    None => ctx.current_cycle(),
                };
                Self::free_stmts(aspect, ctx, &cb.stmts, guard, cycle)?
            }
            CBlockKind::Seq | CBlockKind::Mutex => {
                let mut body = match cb.hdl_block {
                    Some(node) => aspect.visit_block(ctx, node)?,
                    None => HdlBlock::new(None),
                };
                body.in_cond = Expr::and_opt(guard, body.in_cond.take());
                ctx.push_cycle(conds.refs(idx).cycle.clone());
                for child in &cb.child {
                    let stmts = Self::visit(aspect, ctx, *child, Some(&cb.state_ids))?;
                    body.stmts.extend(stmts);
                }
                ctx.pop_cycle();
                body
            }
        };

        let copies = match parent {
            Some(p) if Self::needs_copy(ctx, cb, p) => {
                Self::state_copies(aspect, ctx, idx)?
            }
            _ => vec![],
        };
        let node_guarded = cb
            .hdl_block
            .and_then(|n| ctx.module.block(n))
            .is_some_and(|b| b.in_cond.is_some());
        let inline = cb.state_ids.len() == 1 && !node_guarded;
        let copies = if inline {
            copies.into_iter().for_each(|c| emit(&mut body.stmts, c));
            vec![]
        } else {
            copies
        };
        aspect.update_defaults(&mut body);
        emit(&mut out, body);
        if !copies.is_empty() {
            let first = cb.first_state().into_iter().collect::<Vec<_>>();
            let in_cond = parent.and_then(|p| conds.ids_guard(&first, p));
            let wrapper = HdlBlock::with_stmts(
                in_cond,
                copies.into_iter().map(HdlStmt::from).collect(),
            );
            out.push(wrapper.into());
        }

        if !cb.epilog.is_empty() {
            let last = cb.state_ids.last().into_iter().copied().collect::<Vec<_>>();
            let exit = conds.refs(idx).exit.clone();
            let in_cond = Expr::and_opt(
                parent.and_then(|p| conds.ids_guard(&last, p)),
                exit.clone(),
            );
            let block = Self::free_stmts(aspect, ctx, &cb.epilog, in_cond, exit)?;
            emit(&mut out, block);
        }
        Ok(out)
    }

    /// Lower statements executing in a single cycle completing on `cycle`.
    fn free_stmts<A: Aspect>(
        aspect: &mut A,
        ctx: &mut LowerCtx,
        stmts: &[gearc_ir::StmtIdx],
        in_cond: Option<Expr>,
        cycle: Option<Expr>,
    ) -> GearResult<HdlBlock> {
        let mut block = HdlBlock::new(in_cond);
        ctx.push_cycle(cycle);
        for stmt in stmts {
            let lowered = aspect.lower_stmt(ctx, *stmt)?;
            block.stmts.extend(lowered);
        }
        ctx.pop_cycle();
        aspect.update_defaults(&mut block);
        Ok(block)
    }

    /// Whether the state changes when the unit completes.
    fn needs_copy(ctx: &LowerCtx, cb: &CBlock, parent: &[u32]) -> bool {
        if ctx.max_state() == 0 {
            return false;
        }
        let same = cb.state_ids.len() == parent.len()
            && cb.state_ids.iter().all(|s| parent.contains(s));
        if same {
            return false;
        }
        // Multi-state units change states through their children, except a
        // skipped `if` which must jump over all of them.
        let is_if = cb
            .hdl_block
            .and_then(|n| ctx.module.block(n))
            .is_some_and(|b| b.kind == gearc_ir::BlockKind::If);
        cb.state_ids.len() == 1 || is_if
    }

    /// The transitions taken when the unit `idx` completes, in priority
    /// order: later ones override earlier ones.
    fn transitions(ctx: &LowerCtx, idx: CBlockIdx) -> Vec<Transition> {
        let schedule = ctx.schedule;
        let module = ctx.module;
        let Some(from) = schedule.get(idx).first_state() else {
            return vec![];
        };
        let mut acc = vec![];
        let mut cur = idx;
        while let Some(p) = schedule.get(cur).parent {
            let parent = schedule.get(p);
            if parent.kind == CBlockKind::Mutex {
                cur = p;
                continue;
            }
            let pos = parent.child.iter().position(|c| *c == cur).unwrap_or(0);
            let cond = ctx.conds.refs(cur).exit.clone();
            if let Some(next) = parent.child.get(pos + 1) {
                if let Some(next_state) = schedule.get(*next).first_state() {
                    acc.push(Transition {
                        from,
                        next_state,
                        cond,
                    });
                }
                break;
            }
            let is_loop = parent
                .hdl_block
                .and_then(|n| module.block(n))
                .is_some_and(|b| b.kind.is_loop());
            if is_loop && parent.state_ids.len() > 1 {
                if let Some(next_state) = parent.first_state() {
                    acc.push(Transition {
                        from,
                        next_state,
                        cond,
                    });
                }
            }
            cur = p;
        }
        acc
    }

    fn state_copies<A: Aspect>(
        aspect: &mut A,
        ctx: &mut LowerCtx,
        idx: CBlockIdx,
    ) -> GearResult<Vec<HdlBlock>> {
        let node = ctx.schedule.get(idx).hdl_block;
        let mut copies = vec![];
        for tr in Self::transitions(ctx, idx) {
            log::debug!(
                "{}: state copy {} -> {}",
                A::name(),
                tr.from,
                tr.next_state
            );
            let copy = aspect.state_copy(ctx, node, &tr)?;
            if !copy.is_empty() {
                copies.push(copy);
            }
        }
        Ok(copies)
    }
}

/// Append `block` to `out`. Unguarded blocks are flattened.
fn emit(out: &mut Vec<HdlStmt>, block: HdlBlock) {
    if block.is_empty() {
        return;
    }
    if block.in_cond.is_some() {
        out.push(block.into());
        return;
    }
    out.extend(block.dflts.into_iter().map(|(_, d)| HdlStmt::Assign(d)));
    out.extend(block.stmts);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::CondTable;
    use crate::aspects::{Input, RegEn, StateTransition};
    use crate::passes::{Scheduler, StateFinder};
    use gearc_ir::{DType, Module, ModuleBuilder, Printer, Schedule, StmtIdx};

    fn lit(v: i64) -> Expr {
        Expr::lit(v, DType::uint(8))
    }

    fn prepare(b: ModuleBuilder, stmts: Vec<StmtIdx>) -> (Module, Schedule, CondTable) {
        let mut module = b.finish(stmts).unwrap();
        let mut sched = Scheduler { dump: false }.run(&module).unwrap();
        let max_state = StateFinder.run(&mut module, &mut sched);
        let conds = CondTable::new(&module, &sched, max_state).unwrap();
        (module, sched, conds)
    }

    #[test]
    fn two_state_transitions() {
        let mut b = ModuleBuilder::new("top");
        b.add_out_port("dout", DType::uint(8));
        let y0 = b.emit(vec![lit(0)]);
        let y1 = b.emit(vec![lit(1)]);
        let (module, sched, conds) = prepare(b, vec![y0, y1]);
        let mut ctx = LowerCtx::new(&module, &sched, &conds);
        let mut aspect = StateTransition::new(conds.max_state());
        let comb = CBlockDriver::run(&mut aspect, &mut ctx).unwrap();
        assert_eq!(aspect.graph.edges, vec![(0, 1), (1, 0)]);
        assert!(aspect.graph.validate().is_ok());
        assert_eq!(
            Printer::hdl_to_str(&comb),
            "state_en = 0;\n\
             if (state_reg == 0) begin\n  \
               if (exit_cond_block_1) begin\n    \
                 state_next = 1;\n    \
                 state_en = 1;\n  \
               end\n\
             end\n\
             if (state_reg == 1) begin\n  \
               if (exit_cond_block_2) begin\n    \
                 state_next = 0;\n    \
                 state_en = 1;\n  \
               end\n\
             end\n"
        );
        let mut used = ctx.into_used().into_iter().collect::<Vec<_>>();
        used.sort();
        assert_eq!(used, vec!["exit_cond_block_1", "exit_cond_block_2"]);
    }

    #[test]
    fn register_updates_follow_the_cycle() {
        let mut b = ModuleBuilder::new("top");
        b.add_out_port("dout", DType::uint(8));
        b.add_reg("acc", DType::uint(8), 0);
        let upd = b.reg_next("acc", lit(3));
        let y0 = b.emit(vec![lit(0)]);
        let (module, sched, conds) = prepare(b, vec![upd, y0]);
        let mut ctx = LowerCtx::new(&module, &sched, &conds);
        let comb = CBlockDriver::run(&mut RegEn, &mut ctx).unwrap();
        assert_eq!(
            Printer::hdl_to_str(&comb),
            "acc_en = 0;\nacc_next = acc_reg;\nacc_en = cycle_cond_block_1;\nacc_next = 3;\n"
        );
    }

    #[test]
    fn interface_ready_on_exit() {
        let mut b = ModuleBuilder::new("top");
        b.add_out_port("dout", DType::uint(8));
        b.add_in_port("din", DType::uint(8));
        let y0 = b.emit(vec![lit(0)]);
        let intf = b.intf_block("din", vec![y0]);
        let (module, sched, conds) = prepare(b, vec![intf]);
        let mut ctx = LowerCtx::new(&module, &sched, &conds);
        let comb = CBlockDriver::run(&mut Input, &mut ctx).unwrap();
        assert_eq!(
            Printer::hdl_to_str(&comb),
            "din.ready = 0;\nif (din.valid) begin\n  din.ready = exit_cond_block_1;\nend\n"
        );
    }
}
