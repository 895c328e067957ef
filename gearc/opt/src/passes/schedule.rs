use crate::traversal::{ConstructPass, Named, ParseVal, PassOpt};
use gearc_idx::IndexedMap;
use gearc_ir::{self as ir, BlockKind, CBlock, CBlockIdx, CBlockKind, Stmt, StmtIdx};
use gearc_utils::{Error, GearResult};

/// Partitions the control tree of a module into scheduling units.
///
/// Blocking statements (yields, interface blocks and anything containing
/// them) become separate units. Free statements are merged into the closest
/// blocking unit: statements preceding a unit run when it is entered and
/// statements following it run when it is left.
pub struct Scheduler {
    /// Dump the scheduling tree once states are assigned.
    pub dump: bool,
}

impl Named for Scheduler {
    fn name() -> &'static str {
        "schedule"
    }

    fn description() -> &'static str {
        "partition the control tree into sequential and mutually exclusive units"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "dump",
            "log the scheduling tree after states are assigned",
            ParseVal::Bool(false),
            PassOpt::parse_bool,
        )]
    }
}

impl ConstructPass for Scheduler {
    fn from(extra_opts: &[String]) -> GearResult<Self> {
        let opts = Self::get_opts(extra_opts);
        Ok(Scheduler {
            dump: opts["dump"].bool(),
        })
    }
}

impl Scheduler {
    pub fn run(&self, module: &ir::Module) -> GearResult<ir::Schedule> {
        let mut builder = Builder {
            module,
            nodes: IndexedMap::new(),
        };
        let root = builder.visit_block(module.root, None)?;
        Ok(ir::Schedule {
            nodes: builder.nodes,
            root,
        })
    }
}

struct Builder<'a> {
    module: &'a ir::Module,
    nodes: IndexedMap<CBlockIdx, CBlock>,
}

impl Builder<'_> {
    fn add(&mut self, cblock: CBlock) -> CBlockIdx {
        let idx = self.nodes.push(cblock);
        if let Some(parent) = self.nodes[idx].parent {
            self.nodes[parent].child.push(idx);
        }
        idx
    }

    fn visit_block(
        &mut self,
        idx: StmtIdx,
        parent: Option<CBlockIdx>,
    ) -> GearResult<CBlockIdx> {
        let module = self.module;
        let Some(block) = module.block(idx) else {
            return Err(Error::malformed_structure(format!(
                "{} scheduled as a block",
                module.describe(idx)
            )));
        };
        let kind = match block.kind {
            BlockKind::Module
            | BlockKind::Intf { .. }
            | BlockKind::IntfLoop { .. }
            | BlockKind::Loop { .. } => CBlockKind::Seq,
            BlockKind::If if module.blocking_count(idx) > 1 => {
                CBlockKind::Seq
            }
            BlockKind::If | BlockKind::Container => CBlockKind::Mutex,
        };
        if matches!(block.kind, BlockKind::Loop { .. })
            && !module.is_blocking(idx)
        {
            return Err(non_blocking_loop(module, idx));
        }
        let cnode = self.add(CBlock::new(kind, Some(idx), parent));
        if matches!(block.kind, BlockKind::Container) {
            self.visit_branches(cnode, &block.stmts)?;
        } else {
            self.visit_stmts(cnode, &block.stmts)?;
        }
        Ok(cnode)
    }

    /// Schedule a statement list. Free statements are attached to the
    /// neighbouring blocking unit, or form a single leaf when there is none.
    fn visit_stmts(
        &mut self,
        cnode: CBlockIdx,
        stmts: &[StmtIdx],
    ) -> GearResult<()> {
        let module = self.module;
        let mut free = vec![];
        let mut last: Option<CBlockIdx> = None;
        for &stmt in stmts {
            if !module.is_blocking(stmt) {
                self.check_free(stmt)?;
                match last {
                    Some(prev) => self.append(prev, stmt),
                    None => free.push(stmt),
                }
                continue;
            }
            let child = match module.stmt(stmt) {
                Stmt::Block(_) => self.visit_block(stmt, Some(cnode))?,
                _ => self.add(CBlock::leaf(Some(cnode), vec![stmt])),
            };
            if !free.is_empty() {
                self.prepend(child, std::mem::take(&mut free));
            }
            last = Some(child);
        }
        if !free.is_empty() {
            self.add(CBlock::leaf(Some(cnode), free));
        }
        Ok(())
    }

    /// Schedule the branches of an if/else chain. Free branches run at entry
    /// of the next blocking branch or at exit of the last one.
    fn visit_branches(
        &mut self,
        cnode: CBlockIdx,
        branches: &[StmtIdx],
    ) -> GearResult<()> {
        let mut pending = vec![];
        let mut last = None;
        for &branch in branches {
            if self.module.is_blocking(branch) {
                let child = self.visit_block(branch, Some(cnode))?;
                if !pending.is_empty() {
                    self.prepend(child, std::mem::take(&mut pending));
                }
                last = Some(child);
            } else {
                self.check_free(branch)?;
                pending.push(branch);
            }
        }
        match (last, pending.is_empty()) {
            (_, true) => Ok(()),
            (Some(last), false) => {
                self.nodes[last].epilog.extend(pending);
                Ok(())
            }
            (None, false) => Err(Error::malformed_structure(format!(
                "Container {} has no blocking branch",
                self.nodes[cnode]
                    .hdl_block
                    .map_or(String::new(), |b| self.module.describe(b))
            ))),
        }
    }

    fn prepend(&mut self, child: CBlockIdx, free: Vec<StmtIdx>) {
        let node = &mut self.nodes[child];
        if node.is_leaf() {
            node.stmts.splice(0..0, free);
        } else {
            node.prolog.splice(0..0, free);
        }
    }

    fn append(&mut self, child: CBlockIdx, stmt: StmtIdx) {
        let node = &mut self.nodes[child];
        if node.is_leaf() {
            node.stmts.push(stmt);
        } else {
            node.epilog.push(stmt);
        }
    }

    /// Free statements are flattened into the current cycle, so any loop
    /// nested inside one would have to be unrolled combinationally.
    fn check_free(&self, stmt: StmtIdx) -> GearResult<()> {
        let module = self.module;
        match module.descendants(stmt).into_iter().find(|s| {
            matches!(
                module.block(*s).map(|b| &b.kind),
                Some(BlockKind::Loop { .. })
            )
        }) {
            Some(lp) => Err(non_blocking_loop(module, lp)),
            None => Ok(()),
        }
    }
}

fn non_blocking_loop(module: &ir::Module, idx: StmtIdx) -> Error {
    Error::malformed_control(format!(
        "{} has no blocking statement and cannot be scheduled",
        module.describe(idx)
    ))
}
