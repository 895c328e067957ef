//! The intermediate control tree consumed by the scheduler.
use crate::expr::Expr;
use crate::types::DType;
use gearc_idx::{IndexRef, IndexedMap, impl_index};
use gearc_utils::{GetName, Id};
use linked_hash_map::LinkedHashMap;

/// Index of a statement in [Module::nodes].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct StmtIdx(u32);
impl_index!(StmtIdx);

/// A register declaration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct RegDef {
    pub name: Id,
    pub dtype: DType,
    /// Reset value.
    pub init: i64,
}

/// A combinational variable declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDef {
    pub name: Id,
    pub dtype: DType,
}

/// An interface port of the module.
#[derive(Debug, Clone, PartialEq)]
pub struct PortDef {
    pub name: Id,
    pub dtype: DType,
}

impl GetName for RegDef {
    fn name(&self) -> Id {
        self.name
    }
}

impl GetName for VariableDef {
    fn name(&self) -> Id {
        self.name
    }
}

impl GetName for PortDef {
    fn name(&self) -> Id {
        self.name
    }
}

/// The different kinds of blocks.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// The root of the procedure.
    Module,
    /// Consumes one transaction from an input interface.
    Intf { intf: Id },
    /// A conditional branch.
    If,
    /// A chain of mutually exclusive `If` branches.
    Container,
    /// A loop that repeats while `exit_cond` is false.
    Loop { exit_cond: Option<Expr> },
    /// Consumes transactions from an input interface until end-of-transaction.
    IntfLoop { intf: Id },
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Module => "Module",
            BlockKind::Intf { .. } => "IntfBlock",
            BlockKind::If => "IfBlock",
            BlockKind::Container => "ContainerBlock",
            BlockKind::Loop { .. } => "Loop",
            BlockKind::IntfLoop { .. } => "IntfLoop",
        }
    }

    /// Blocks which return to their first state after their last one.
    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            BlockKind::Module | BlockKind::Loop { .. } | BlockKind::IntfLoop { .. }
        )
    }
}

/// A block of statements executed while `in_cond` holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: BlockKind,
    pub stmts: Vec<StmtIdx>,
    pub in_cond: Option<Expr>,
    /// Assigned by the state finder.
    pub id: Option<u32>,
}

/// A suspension point: emits one value per output port and ends the cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Yield {
    /// One entry per output port; `None` leaves that port idle.
    pub exprs: Vec<Option<Expr>>,
    /// Assigned by the state finder.
    pub id: Option<u32>,
}

/// `reg <= val` at the end of the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RegNextStmt {
    pub reg: Id,
    pub val: Expr,
}

/// `var = val` within the current cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableStmt {
    pub var: Id,
    pub val: Expr,
}

/// Statements of the control tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Block),
    Yield(Yield),
    RegNext(RegNextStmt),
    Variable(VariableStmt),
}

impl Stmt {
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Stmt::Block(b) => Some(b),
            _ => None,
        }
    }

    /// The id given to this statement by the state finder.
    pub fn id(&self) -> Option<u32> {
        match self {
            Stmt::Block(b) => b.id,
            Stmt::Yield(y) => y.id,
            Stmt::RegNext(_) | Stmt::Variable(_) => None,
        }
    }

    /// Apply `f` to every expression directly owned by this statement. Nested
    /// statements are not visited.
    pub fn for_each_expr_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Expr),
    {
        match self {
            Stmt::Block(b) => {
                if let Some(cond) = &mut b.in_cond {
                    f(cond)
                }
                if let BlockKind::Loop {
                    exit_cond: Some(cond),
                } = &mut b.kind
                {
                    f(cond)
                }
            }
            Stmt::Yield(y) => y.exprs.iter_mut().flatten().for_each(f),
            Stmt::RegNext(r) => f(&mut r.val),
            Stmt::Variable(v) => f(&mut v.val),
        }
    }
}

/// A synthesized procedure: declarations plus an arena of statements rooted
/// at a [BlockKind::Module] block.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: Id,
    pub regs: LinkedHashMap<Id, RegDef>,
    pub variables: LinkedHashMap<Id, VariableDef>,
    pub in_ports: Vec<PortDef>,
    pub out_ports: Vec<PortDef>,
    pub nodes: IndexedMap<StmtIdx, Stmt>,
    pub root: StmtIdx,
}

impl Module {
    pub fn stmt(&self, idx: StmtIdx) -> &Stmt {
        &self.nodes[idx]
    }

    pub fn stmt_mut(&mut self, idx: StmtIdx) -> &mut Stmt {
        &mut self.nodes[idx]
    }

    pub fn block(&self, idx: StmtIdx) -> Option<&Block> {
        self.nodes[idx].as_block()
    }

    /// Statements that suspend execution until the next cycle: yields,
    /// interface blocks and loops, and any block containing one of those.
    pub fn is_blocking(&self, idx: StmtIdx) -> bool {
        match self.stmt(idx) {
            Stmt::Yield(_) => true,
            Stmt::RegNext(_) | Stmt::Variable(_) => false,
            Stmt::Block(b) => match b.kind {
                BlockKind::Module
                | BlockKind::Intf { .. }
                | BlockKind::IntfLoop { .. } => true,
                BlockKind::If
                | BlockKind::Container
                | BlockKind::Loop { .. } => {
                    b.stmts.iter().any(|s| self.is_blocking(*s))
                }
            },
        }
    }

    /// Number of blocking statements directly inside `idx`.
    pub fn blocking_count(&self, idx: StmtIdx) -> usize {
        self.block(idx).map_or(0, |b| {
            b.stmts.iter().filter(|s| self.is_blocking(**s)).count()
        })
    }

    pub fn in_port(&self, name: Id) -> Option<&PortDef> {
        self.in_ports.iter().find(|p| p.name == name)
    }

    /// Width of the declaration written by `target`, if it is a register or
    /// variable.
    pub fn decl_width(&self, target: Id) -> Option<u64> {
        self.regs
            .get(&target)
            .map(|r| &r.dtype)
            .or_else(|| self.variables.get(&target).map(|v| &v.dtype))
            .and_then(|t| t.width().ok())
    }

    /// All statement indices reachable from `idx`, in pre-order.
    pub fn descendants(&self, idx: StmtIdx) -> Vec<StmtIdx> {
        let mut acc = vec![];
        let mut stack = vec![idx];
        while let Some(cur) = stack.pop() {
            acc.push(cur);
            if let Some(b) = self.block(cur) {
                stack.extend(b.stmts.iter().rev());
            }
        }
        acc
    }

    /// Find the statement carrying `id`.
    pub fn find_id(&self, id: u32) -> Option<StmtIdx> {
        self.nodes
            .iter()
            .find(|(_, s)| s.id() == Some(id))
            .map(|(idx, _)| idx)
    }

    /// Human readable location of a statement, used in diagnostics.
    pub fn describe(&self, idx: StmtIdx) -> String {
        match self.stmt(idx) {
            Stmt::Block(b) => {
                let mut desc = format!("{} #{}", b.kind.name(), idx.index());
                if let BlockKind::Loop {
                    exit_cond: Some(cond),
                } = &b.kind
                {
                    desc.push_str(&format!(" (exit when `{cond}')"));
                } else if let Some(cond) = &b.in_cond {
                    desc.push_str(&format!(" (if `{cond}')"));
                }
                desc
            }
            Stmt::Yield(_) => format!("Yield #{}", idx.index()),
            Stmt::RegNext(r) => format!("{} <= {}", r.reg, r.val),
            Stmt::Variable(v) => format!("{} = {}", v.var, v.val),
        }
    }
}
