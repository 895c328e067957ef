use gearc_idx::IndexRef;
use gearc_ir::{
    self as ir, BinOp, BlockKind, CBlock, CBlockIdx, CBlockKind, DType, Expr,
    OperandKind, Stmt,
};
use gearc_utils::{Error, GearResult, Id, bits_needed_for};
use linked_hash_map::LinkedHashMap;
use std::collections::BTreeMap;

/// Name of the register holding the current state.
pub const STATE_REG: &str = "state";
/// Name of the condition signalling that the module finished a transaction.
pub const RST_COND: &str = "rst_cond";

/// The condition under which a scheduling unit completes its current cycle
/// (`cycle`) and under which it is left for good (`exit`). `None` stands for
/// an unconditional true.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CondPair {
    pub cycle: Option<Expr>,
    pub exit: Option<Expr>,
}

/// The per-block cycle and exit conditions of a scheduled module.
///
/// Every control block and yield with an id `i` defines two conditions,
/// `cycle_cond_block_<i>` and `exit_cond_block_<i>`. Conditions of a block
/// are expressed in terms of the named conditions of its children, so the
/// table is built bottom-up and references are only materialized when some
/// lowered tree uses them.
pub struct CondTable {
    conds: LinkedHashMap<Id, Option<Expr>>,
    /// References of every scheduling unit, indexed by [CBlockIdx].
    refs: Vec<CondPair>,
    root: CBlockIdx,
    max_state: u32,
}

impl CondTable {
    pub fn new(
        module: &ir::Module,
        schedule: &ir::Schedule,
        max_state: u32,
    ) -> GearResult<Self> {
        let mut builder = TableBuilder {
            module,
            schedule,
            max_state,
            values: BTreeMap::new(),
            refs: vec![CondPair::default(); schedule.nodes.len()],
        };
        builder.build(schedule.root)?;
        let mut conds = LinkedHashMap::new();
        for (id, pair) in builder.values {
            conds.insert(Self::cycle_name(id), pair.cycle);
            conds.insert(Self::exit_name(id), pair.exit);
        }
        Ok(CondTable {
            conds,
            refs: builder.refs,
            root: schedule.root,
            max_state,
        })
    }

    pub fn cycle_name(id: u32) -> Id {
        Id::from(format!("cycle_cond_block_{id}"))
    }

    pub fn exit_name(id: u32) -> Id {
        Id::from(format!("exit_cond_block_{id}"))
    }

    /// The defining value of a named condition.
    pub fn get(&self, name: Id) -> Option<&Option<Expr>> {
        self.conds.get(&name)
    }

    pub fn contains(&self, name: Id) -> bool {
        self.conds.contains_key(&name)
    }

    /// All named conditions in block id order.
    pub fn iter(&self) -> impl Iterator<Item = (&Id, &Option<Expr>)> {
        self.conds.iter()
    }

    pub fn refs(&self, idx: CBlockIdx) -> &CondPair {
        &self.refs[idx.index()]
    }

    /// The value of `rst_cond`: the module leaves its last state.
    pub fn rst_cond(&self) -> Option<Expr> {
        self.refs(self.root).exit.clone()
    }

    pub fn max_state(&self) -> u32 {
        self.max_state
    }

    pub fn state_width(&self) -> u64 {
        StateSpace(self.max_state).width()
    }

    pub fn state_reg(&self) -> Expr {
        StateSpace(self.max_state).reg()
    }

    pub fn state_lit(&self, state: u32) -> Expr {
        StateSpace(self.max_state).lit(state)
    }

    /// Membership of the state register in `ids`. `None` when the module
    /// has a single state or `ids` covers all of them.
    pub fn state_in(&self, ids: &[u32]) -> Option<Expr> {
        StateSpace(self.max_state).state_in(ids)
    }

    /// The state guard of a unit live in `ids` nested in a unit live in
    /// `parent`. No guard is needed when both are live in the same states.
    pub fn ids_guard(&self, ids: &[u32], parent: &[u32]) -> Option<Expr> {
        StateSpace(self.max_state).ids_guard(ids, parent)
    }
}

/// The states `0..=max_state` of a module.
#[derive(Clone, Copy)]
struct StateSpace(u32);

impl StateSpace {
    fn width(self) -> u64 {
        bits_needed_for(self.0 as u64 + 1)
    }

    fn reg(self) -> Expr {
        Expr::operand(
            Id::from(STATE_REG),
            OperandKind::Reg,
            DType::uint(self.width()),
        )
    }

    fn lit(self, state: u32) -> Expr {
        Expr::lit(state as i64, DType::uint(self.width()))
    }

    fn state_in(self, ids: &[u32]) -> Option<Expr> {
        let all = (0..=self.0).all(|s| ids.contains(&s));
        if self.0 == 0 || ids.is_empty() || all {
            return None;
        }
        Some(Expr::any(
            ids.iter()
                .map(|s| Expr::binary(BinOp::Eq, self.reg(), self.lit(*s))),
        ))
    }

    fn ids_guard(self, ids: &[u32], parent: &[u32]) -> Option<Expr> {
        let same = ids.len() == parent.len()
            && ids.iter().all(|s| parent.contains(s));
        if same { None } else { self.state_in(ids) }
    }
}

struct TableBuilder<'a> {
    module: &'a ir::Module,
    schedule: &'a ir::Schedule,
    max_state: u32,
    /// Values of the named conditions by block id.
    values: BTreeMap<u32, CondPair>,
    refs: Vec<CondPair>,
}

impl TableBuilder<'_> {
    fn define(&mut self, id: u32, pair: CondPair) -> CondPair {
        self.values.insert(id, pair);
        CondPair {
            cycle: Some(Expr::flag(CondTable::cycle_name(id))),
            exit: Some(Expr::flag(CondTable::exit_name(id))),
        }
    }

    fn state_in(&self, ids: &[u32], parent: &CBlock) -> Option<Expr> {
        StateSpace(self.max_state).ids_guard(ids, &parent.state_ids)
    }

    fn build(&mut self, idx: CBlockIdx) -> GearResult<()> {
        let schedule = self.schedule;
        let module = self.module;
        let cb = schedule.get(idx);
        for child in &cb.child {
            self.build(*child)?;
        }
        let refs = match cb.kind {
            CBlockKind::Leaf => {
                let yields = cb
                    .stmts
                    .iter()
                    .filter_map(|s| match module.stmt(*s) {
                        Stmt::Yield(y) => Some(y),
                        _ => None,
                    })
                    .collect::<Vec<_>>();
                let mut refs = vec![];
                for y in yields {
                    let id = y.id.ok_or_else(|| unnumbered("Yield"))?;
                    let ready = Expr::all(
                        y.exprs
                            .iter()
                            .zip(&module.out_ports)
                            .filter(|(e, _)| e.is_some())
                            .map(|(_, p)| Some(Expr::flag(format!("{}.ready", p.name)))),
                    );
                    refs.push(self.define(
                        id,
                        CondPair {
                            cycle: ready.clone(),
                            exit: ready,
                        },
                    ));
                }
                CondPair {
                    cycle: Expr::all(refs.iter().map(|r| r.cycle.clone())),
                    exit: Expr::all(refs.iter().map(|r| r.exit.clone())),
                }
            }
            CBlockKind::Seq | CBlockKind::Mutex => {
                let Some(node) = cb.hdl_block else {
                    return Err(Error::malformed_structure(
                        "Sequential or mutex unit without a control block",
                    ));
                };
                let Some(block) = module.block(node) else {
                    return Err(Error::malformed_structure(format!(
                        "{} is not a control block",
                        module.describe(node)
                    )));
                };
                let id = block.id.ok_or_else(|| unnumbered(block.kind.name()))?;
                let sub = if cb.kind == CBlockKind::Seq {
                    self.seq_conds(cb)
                } else {
                    self.mutex_conds(cb)
                };
                let pair = wrap(&block.kind, block.in_cond.as_ref(), sub);
                self.define(id, pair)
            }
        };
        self.refs[idx.index()] = refs;
        Ok(())
    }

    fn seq_conds(&self, cb: &CBlock) -> CondPair {
        let Some(last) = cb.child.last() else {
            return CondPair::default();
        };
        let cycle = cb
            .child
            .iter()
            .map(|c| {
                let child = self.schedule.get(*c);
                Expr::and_opt(
                    self.state_in(&child.state_ids, cb),
                    self.refs[c.index()].cycle.clone(),
                )
            })
            .reduce(Expr::or_opt)
            .flatten();
        let exit = Expr::and_opt(
            self.state_in(&self.schedule.get(*last).state_ids, cb),
            self.refs[last.index()].exit.clone(),
        );
        CondPair { cycle, exit }
    }

    fn mutex_conds(&self, cb: &CBlock) -> CondPair {
        CondPair {
            cycle: Expr::all(cb.child.iter().map(|c| self.refs[c.index()].cycle.clone())),
            exit: Expr::all(cb.child.iter().map(|c| self.refs[c.index()].exit.clone())),
        }
    }
}

/// Conditions of a block given the conditions of its body.
fn wrap(kind: &BlockKind, in_cond: Option<&Expr>, sub: CondPair) -> CondPair {
    match kind {
        BlockKind::Module | BlockKind::Container => sub,
        BlockKind::If => CondPair {
            cycle: skip_unless(in_cond, sub.cycle),
            exit: skip_unless(in_cond, sub.exit),
        },
        BlockKind::Loop { exit_cond } => CondPair {
            cycle: skip_unless(in_cond, sub.cycle),
            exit: skip_unless(in_cond, Expr::and_opt(sub.exit, exit_cond.clone())),
        },
        BlockKind::Intf { .. } => CondPair {
            cycle: Expr::and_opt(in_cond.cloned(), sub.cycle),
            exit: Expr::and_opt(in_cond.cloned(), sub.exit),
        },
        BlockKind::IntfLoop { intf } => {
            let eot = Expr::flag(format!("{intf}.eot"));
            CondPair {
                cycle: Expr::and_opt(in_cond.cloned(), sub.cycle),
                exit: Expr::and_opt(
                    in_cond.cloned(),
                    Expr::and_opt(sub.exit, Some(eot)),
                ),
            }
        }
    }
}

/// `!guard || cond`: a block that is skipped completes immediately.
fn skip_unless(guard: Option<&Expr>, cond: Option<Expr>) -> Option<Expr> {
    match (guard, cond) {
        (_, None) => None,
        (None, cond) => cond,
        (Some(g), Some(c)) => Some(g.clone().negate().or(c)),
    }
}

fn unnumbered(kind: &str) -> Error {
    Error::malformed_structure(format!("{kind} was not numbered by the state finder"))
}
