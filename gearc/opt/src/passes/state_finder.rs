use crate::traversal::{ConstructPass, Named};
use gearc_ir::{
    self as ir, CBlockIdx, CBlockKind, Context, OperandKind, Stmt, StmtIdx,
};
use gearc_utils::{GearResult, Id};
use std::collections::HashSet;

/// Assigns states to the scheduling tree.
///
/// Every unit starts in the state of its parent. A sequential unit moves to a
/// fresh state after each of its children except the last. Blocks and yields
/// are numbered in pre-order so that their conditions can be referenced by
/// name. Finally, register reads that follow a write to the same register in
/// the same cycle are retagged to observe the value about to be latched.
#[derive(Default)]
pub struct StateFinder;

impl Named for StateFinder {
    fn name() -> &'static str {
        "find-states"
    }

    fn description() -> &'static str {
        "assign states and block ids, resolve register read context"
    }
}

impl ConstructPass for StateFinder {
    fn from(_extra_opts: &[String]) -> GearResult<Self> {
        Ok(StateFinder)
    }
}

impl StateFinder {
    /// Annotate `schedule` in place and return the highest state id.
    pub fn run(&self, module: &mut ir::Module, schedule: &mut ir::Schedule) -> u32 {
        let mut finder = Finder {
            module,
            schedule,
            state: vec![0],
            max_state: 0,
            next_id: 0,
        };
        let root = finder.schedule.root;
        finder.visit(root);
        finder.resolve(root, HashSet::new());
        finder.max_state
    }
}

struct Finder<'a> {
    module: &'a mut ir::Module,
    schedule: &'a mut ir::Schedule,
    /// Current state of every unit being visited.
    state: Vec<u32>,
    max_state: u32,
    next_id: u32,
}

impl Finder<'_> {
    fn current(&self) -> u32 {
        self.state.last().copied().unwrap_or_default()
    }

    fn number(&mut self, idx: StmtIdx) {
        let id = self.next_id;
        match self.module.stmt_mut(idx) {
            Stmt::Block(b) => b.id = Some(id),
            Stmt::Yield(y) => y.id = Some(id),
            Stmt::RegNext(_) | Stmt::Variable(_) => return,
        }
        self.next_id += 1;
    }

    fn visit(&mut self, idx: CBlockIdx) {
        let cur = self.current();
        self.state.push(cur);
        let node = self.schedule.get_mut(idx);
        node.state_ids = [cur].into_iter().collect();
        let (kind, hdl_block) = (node.kind, node.hdl_block);
        let child = node.child.clone();
        let stmts = node.stmts.clone();

        if let Some(block) = hdl_block {
            self.number(block);
        }
        match kind {
            CBlockKind::Leaf => stmts.into_iter().for_each(|s| self.number(s)),
            CBlockKind::Seq | CBlockKind::Mutex => {
                for (i, c) in child.iter().enumerate() {
                    self.visit(*c);
                    let ids = self.schedule.get(*c).state_ids.clone();
                    let node = self.schedule.get_mut(idx);
                    for id in ids {
                        if !node.state_ids.contains(&id) {
                            node.state_ids.push(id);
                        }
                    }
                    if kind == CBlockKind::Seq && i + 1 < child.len() {
                        self.max_state += 1;
                        if let Some(top) = self.state.last_mut() {
                            *top = self.max_state;
                        }
                    }
                }
            }
        }
        self.state.pop();
    }

    /// Resolve register reads of the unit `idx`. `written` holds the
    /// registers already updated earlier in the cycle the unit is entered
    /// in. Returns the registers updated by the end of the cycle the unit is
    /// left in.
    fn resolve(&mut self, idx: CBlockIdx, mut written: HashSet<Id>) -> HashSet<Id> {
        let node = self.schedule.get(idx);
        let (kind, hdl_block) = (node.kind, node.hdl_block);
        let (prolog, epilog) = (node.prolog.clone(), node.epilog.clone());
        let (child, stmts) = (node.child.clone(), node.stmts.clone());

        self.resolve_stmts(&prolog, &mut written);
        if let Some(block) = hdl_block {
            self.retag(block, &written);
        }
        let mut out = match kind {
            CBlockKind::Leaf => {
                self.resolve_stmts(&stmts, &mut written);
                written
            }
            CBlockKind::Seq => {
                let mut out = written;
                for (i, c) in child.into_iter().enumerate() {
                    // Only the first child shares the cycle it is entered in.
                    let inherited = if i == 0 {
                        std::mem::take(&mut out)
                    } else {
                        HashSet::new()
                    };
                    out = self.resolve(c, inherited);
                }
                out
            }
            CBlockKind::Mutex if child.is_empty() => written,
            CBlockKind::Mutex => child
                .into_iter()
                .flat_map(|c| self.resolve(c, written.clone()))
                .collect(),
        };
        self.resolve_stmts(&epilog, &mut out);
        out
    }

    fn resolve_stmts(&mut self, stmts: &[StmtIdx], written: &mut HashSet<Id>) {
        for &stmt in stmts {
            self.retag(stmt, written);
            match self.module.stmt(stmt) {
                Stmt::RegNext(r) => {
                    written.insert(r.reg);
                }
                Stmt::Block(b) => {
                    let nested = b.stmts.clone();
                    self.resolve_stmts(&nested, written);
                }
                Stmt::Yield(_) | Stmt::Variable(_) => (),
            }
        }
    }

    /// Retag reads of registers in `written` directly owned by `stmt`.
    fn retag(&mut self, stmt: StmtIdx, written: &HashSet<Id>) {
        if written.is_empty() {
            return;
        }
        self.module.stmt_mut(stmt).for_each_expr_mut(|e| {
            e.for_each_operand_mut(&mut |op| {
                if op.kind == OperandKind::Reg
                    && op.context == Context::Reg
                    && written.contains(&op.name)
                {
                    log::debug!("`{}' reads the next value of the register", op.name);
                    op.context = Context::Next;
                }
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::Scheduler;
    use gearc_ir::{DType, Expr, ModuleBuilder, Printer};

    fn lit(v: i64) -> Expr {
        Expr::lit(v, DType::uint(8))
    }

    fn run(b: ModuleBuilder, stmts: Vec<StmtIdx>) -> (ir::Module, ir::Schedule, u32) {
        let mut module = b.finish(stmts).unwrap();
        let mut sched = Scheduler { dump: false }.run(&module).unwrap();
        let max_state = StateFinder.run(&mut module, &mut sched);
        (module, sched, max_state)
    }

    #[test]
    fn nested_states() {
        let mut b = ModuleBuilder::new("top");
        b.add_out_port("dout", DType::uint(8));
        b.add_in_port("din", DType::uint(8));
        let y0 = b.emit(vec![lit(0)]);
        let y1 = b.emit(vec![lit(1)]);
        let y2 = b.emit(vec![lit(2)]);
        let intf = b.intf_block("din", vec![y1, y2]);
        let y3 = b.emit(vec![lit(3)]);
        let (module, sched, max_state) = run(b, vec![y0, intf, y3]);
        assert_eq!(max_state, 3);
        assert_eq!(
            Printer::schedule_to_str(&module, &sched),
            "SeqCBlock: states: [0, 1, 2, 3], (Module)\n    \
             Leaf: state 0, [Yield]\n    \
             SeqCBlock: states: [1, 2], (IntfBlock)\n        \
             Leaf: state 1, [Yield]\n        \
             Leaf: state 2, [Yield]\n    \
             Leaf: state 3, [Yield]\n"
        );
    }

    #[test]
    fn block_ids_in_preorder() {
        let mut b = ModuleBuilder::new("top");
        b.add_out_port("dout", DType::uint(8));
        b.add_in_port("din", DType::uint(8));
        let y0 = b.emit(vec![lit(0)]);
        let y1 = b.emit(vec![lit(1)]);
        let intf = b.intf_block("din", vec![y1]);
        let (module, _, _) = run(b, vec![y0, intf]);
        assert_eq!(module.stmt(module.root).id(), Some(0));
        assert_eq!(module.stmt(y0).id(), Some(1));
        assert_eq!(module.stmt(intf).id(), Some(2));
        assert_eq!(module.stmt(y1).id(), Some(3));
        assert_eq!(module.find_id(3), Some(y1));
    }

    #[test]
    fn mutex_children_share_state() {
        let mut b = ModuleBuilder::new("top");
        b.add_out_port("dout", DType::uint(8));
        let y0 = b.emit(vec![lit(0)]);
        let a = b.if_block(Expr::flag("a"), vec![y0]);
        let y1 = b.emit(vec![lit(1)]);
        let na = b.if_block(Expr::flag("a").negate(), vec![y1]);
        let cont = b.container(vec![a, na]);
        let (_, sched, max_state) = run(b, vec![cont]);
        assert_eq!(max_state, 0);
        for idx in sched.preorder() {
            assert_eq!(sched.get(idx).state_ids.as_slice(), &[0]);
        }
    }

    fn read_context(module: &ir::Module, idx: StmtIdx) -> Context {
        let mut ctx = None;
        let mut stmt = module.stmt(idx).clone();
        stmt.for_each_expr_mut(|e| {
            e.for_each_operand_mut(&mut |op| ctx = Some(op.context))
        });
        ctx.unwrap()
    }

    #[test]
    fn read_after_write_observes_next() {
        let mut b = ModuleBuilder::new("top");
        b.add_out_port("dout", DType::uint(8));
        b.add_reg("acc", DType::uint(8), 0);
        b.add_variable("x", DType::uint(8));
        let before = b.assign("x", b.read("acc").unwrap());
        let upd = b.reg_next("acc", lit(5));
        let after = b.assign("x", b.read("acc").unwrap());
        let y = b.emit(vec![b.read("acc").unwrap()]);
        let (module, _, _) = run(b, vec![before, upd, after, y]);
        assert_eq!(read_context(&module, before), Context::Reg);
        assert_eq!(read_context(&module, after), Context::Next);
        assert_eq!(read_context(&module, y), Context::Next);
    }

    #[test]
    fn writes_do_not_cross_states() {
        let mut b = ModuleBuilder::new("top");
        b.add_out_port("dout", DType::uint(8));
        b.add_reg("acc", DType::uint(8), 0);
        let upd = b.reg_next("acc", lit(5));
        let y0 = b.emit(vec![lit(0)]);
        let y1 = b.emit(vec![b.read("acc").unwrap()]);
        let (module, _, _) = run(b, vec![upd, y0, y1]);
        assert_eq!(read_context(&module, y1), Context::Reg);
    }

    #[test]
    fn prolog_writes_reach_block_guard() {
        let mut b = ModuleBuilder::new("top");
        b.add_out_port("dout", DType::uint(8));
        b.add_reg("cnt", DType::uint(8), 0);
        let upd = b.reg_next("cnt", lit(1));
        let y = b.emit(vec![lit(0)]);
        let y2 = b.emit(vec![lit(1)]);
        let cond = Expr::binary(ir::BinOp::Eq, b.read("cnt").unwrap(), lit(1));
        let blk = b.if_block(cond, vec![y, y2]);
        let (module, _, _) = run(b, vec![upd, blk]);
        assert_eq!(read_context(&module, blk), Context::Next);
    }
}
