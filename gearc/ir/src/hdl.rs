//! Lowered statements: guarded assignments grouped into blocks with defaults.
use crate::expr::Expr;
use gearc_utils::Id;
use linked_hash_map::LinkedHashMap;

/// `target = val`. A `None` value means the target keeps the default of the
/// enclosing block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct AssignValue {
    pub target: Id,
    pub val: Option<Expr>,
    pub width: u64,
}

impl AssignValue {
    pub fn new<S: Into<Id>>(target: S, val: Expr, width: u64) -> Self {
        Self {
            target: target.into(),
            val: Some(val),
            width,
        }
    }

    /// A single bit assignment.
    pub fn flag<S: Into<Id>>(target: S, val: Expr) -> Self {
        Self::new(target, val, 1)
    }
}

/// A lowered statement.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum HdlStmt {
    Assign(AssignValue),
    Block(HdlBlock),
}

impl From<AssignValue> for HdlStmt {
    fn from(a: AssignValue) -> Self {
        HdlStmt::Assign(a)
    }
}

impl From<HdlBlock> for HdlStmt {
    fn from(b: HdlBlock) -> Self {
        HdlStmt::Block(b)
    }
}

/// A region active while `in_cond` holds. Every target in `dflts` is driven to
/// its default at the top of the region and may be overridden by `stmts`.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct HdlBlock {
    pub in_cond: Option<Expr>,
    pub stmts: Vec<HdlStmt>,
    pub dflts: LinkedHashMap<Id, AssignValue>,
}

/// The unguarded root of a lowered tree.
pub type CombBlock = HdlBlock;

impl HdlBlock {
    pub fn new(in_cond: Option<Expr>) -> Self {
        Self {
            in_cond,
            ..Default::default()
        }
    }

    pub fn comb() -> CombBlock {
        Self::default()
    }

    pub fn with_stmts(in_cond: Option<Expr>, stmts: Vec<HdlStmt>) -> Self {
        Self {
            in_cond,
            stmts,
            dflts: LinkedHashMap::new(),
        }
    }

    /// No statements and no defaults.
    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty() && self.dflts.is_empty()
    }

    pub fn push<S: Into<HdlStmt>>(&mut self, stmt: S) {
        self.stmts.push(stmt.into())
    }

    /// Every assignment in this tree, defaults included, in pre-order.
    pub fn assigns(&self) -> Vec<&AssignValue> {
        let mut acc = vec![];
        self.collect_assigns(&mut acc);
        acc
    }

    fn collect_assigns<'a>(&'a self, acc: &mut Vec<&'a AssignValue>) {
        acc.extend(self.dflts.values());
        for stmt in &self.stmts {
            match stmt {
                HdlStmt::Assign(a) => acc.push(a),
                HdlStmt::Block(b) => b.collect_assigns(acc),
            }
        }
    }

    /// The nested blocks of this block.
    pub fn blocks(&self) -> impl Iterator<Item = &HdlBlock> {
        self.stmts.iter().filter_map(|s| match s {
            HdlStmt::Block(b) => Some(b),
            HdlStmt::Assign(_) => None,
        })
    }

    /// Apply `f` to every expression of this tree, guards included.
    pub fn for_each_expr_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Expr),
    {
        if let Some(cond) = &mut self.in_cond {
            f(cond);
        }
        for (_, dflt) in self.dflts.iter_mut() {
            if let Some(val) = &mut dflt.val {
                f(val)
            }
        }
        for stmt in &mut self.stmts {
            match stmt {
                HdlStmt::Assign(AssignValue { val: Some(val), .. }) => f(val),
                HdlStmt::Assign(_) => (),
                HdlStmt::Block(b) => b.for_each_expr_mut(f),
            }
        }
    }

    /// Apply `f` to every expression of this tree.
    pub fn for_each_expr<F>(&self, f: &mut F)
    where
        F: FnMut(&Expr),
    {
        if let Some(cond) = &self.in_cond {
            f(cond);
        }
        for val in self.dflts.values().filter_map(|d| d.val.as_ref()) {
            f(val)
        }
        for stmt in &self.stmts {
            match stmt {
                HdlStmt::Assign(AssignValue { val: Some(val), .. }) => f(val),
                HdlStmt::Assign(_) => (),
                HdlStmt::Block(b) => b.for_each_expr(f),
            }
        }
    }
}
