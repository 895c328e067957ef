use crate::types::DType;
use gearc_utils::Id;
use itertools::Itertools;
use std::fmt::Display;
use std::ops::{BitAnd, BitOr, Not};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum BinOp {
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Shl,
    Shr,
    BitAnd,
    BitOr,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Xor => "^",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
        }
    }

    /// The comparison that holds exactly when `self` does not.
    fn negated(&self) -> Option<BinOp> {
        match self {
            BinOp::Eq => Some(BinOp::Neq),
            BinOp::Neq => Some(BinOp::Eq),
            BinOp::Lt => Some(BinOp::Gte),
            BinOp::Gte => Some(BinOp::Lt),
            BinOp::Gt => Some(BinOp::Lte),
            BinOp::Lte => Some(BinOp::Gt),
            _ => None,
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum UnaryOp {
    /// Logical negation.
    Not,
    /// Bitwise inversion.
    Invert,
    Neg,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Invert => "~",
            UnaryOp::Neg => "-",
        }
    }
}

/// What an [OperandVal] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum OperandKind {
    Reg,
    Variable,
    /// The data of an input interface.
    Port,
}

/// Which value of a register is observed by a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Context {
    /// The value latched at the start of the cycle.
    #[default]
    Reg,
    /// The value about to be latched at the end of the cycle.
    Next,
}

/// A literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ResExpr {
    pub val: i64,
    pub dtype: DType,
}

/// A read of a register, variable or input port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct OperandVal {
    pub name: Id,
    pub kind: OperandKind,
    pub context: Context,
    pub dtype: DType,
}

impl OperandVal {
    /// The name of the wire this read resolves to.
    pub fn signal_name(&self) -> String {
        match (self.kind, self.context) {
            (OperandKind::Reg, Context::Reg) => format!("{}_reg", self.name),
            (OperandKind::Reg, Context::Next) => format!("{}_next", self.name),
            (OperandKind::Variable, _) => format!("{}_v", self.name),
            (OperandKind::Port, _) => format!("{}_s", self.name),
        }
    }
}

/// An opaque named wire, e.g. `dout.ready` or `cycle_cond_block_3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Signal {
    pub name: Id,
    pub width: u64,
}

/// Typed expressions.
///
/// Equality is structural: two independently built expressions with the same
/// shape are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Expr {
    Res(ResExpr),
    Operand(OperandVal),
    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Concat(Vec<Expr>),
    Signal(Signal),
}

impl Expr {
    pub fn bool(b: bool) -> Self {
        Expr::Res(ResExpr {
            val: b as i64,
            dtype: DType::bool(),
        })
    }

    pub fn lit(val: i64, dtype: DType) -> Self {
        Expr::Res(ResExpr { val, dtype })
    }

    pub fn signal<S: Into<Id>>(name: S, width: u64) -> Self {
        Expr::Signal(Signal {
            name: name.into(),
            width,
        })
    }

    /// A single bit wire.
    pub fn flag<S: Into<Id>>(name: S) -> Self {
        Expr::signal(name, 1)
    }

    pub fn operand(name: Id, kind: OperandKind, dtype: DType) -> Self {
        Expr::Operand(OperandVal {
            name,
            kind,
            context: Context::Reg,
            dtype,
        })
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    /// The truth value of a boolean literal.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Expr::Res(ResExpr { val, dtype }) if dtype.width().ok() == Some(1) => {
                Some(*val != 0)
            }
            _ => None,
        }
    }

    pub fn is_true(&self) -> bool {
        self.as_bool() == Some(true)
    }

    pub fn is_false(&self) -> bool {
        self.as_bool() == Some(false)
    }

    /// Conjunction with literal folding.
    pub fn and(self, rhs: Expr) -> Self {
        if self.is_true() {
            rhs
        } else if rhs.is_true() {
            self
        } else if self.is_false() || rhs.is_false() {
            Expr::bool(false)
        } else if self == rhs {
            self
        } else {
            Expr::binary(BinOp::And, self, rhs)
        }
    }

    /// Disjunction with literal folding.
    pub fn or(self, rhs: Expr) -> Self {
        if self.is_false() {
            rhs
        } else if rhs.is_false() {
            self
        } else if self.is_true() || rhs.is_true() {
            Expr::bool(true)
        } else if self == rhs {
            self
        } else {
            Expr::binary(BinOp::Or, self, rhs)
        }
    }

    /// Logical negation. Double negations cancel and comparisons are flipped.
    pub fn negate(self) -> Self {
        match self {
            Expr::UnaryOp {
                op: UnaryOp::Not,
                operand,
            } => *operand,
            Expr::BinOp { op, lhs, rhs } if op.negated().is_some() => {
                Expr::BinOp {
                    op: op.negated().unwrap_or(op),
                    lhs,
                    rhs,
                }
            }
            e => match e.as_bool() {
                Some(b) => Expr::bool(!b),
                None => Expr::unary(UnaryOp::Not, e),
            },
        }
    }

    /// Conjunction of optional conditions where `None` stands for true.
    pub fn and_opt(lhs: Option<Expr>, rhs: Option<Expr>) -> Option<Expr> {
        match (lhs, rhs) {
            (None, r) => r,
            (l, None) => l,
            (Some(l), Some(r)) => Some(l.and(r)),
        }
    }

    /// Disjunction of optional conditions where `None` stands for true.
    pub fn or_opt(lhs: Option<Expr>, rhs: Option<Expr>) -> Option<Expr> {
        match (lhs, rhs) {
            (Some(l), Some(r)) => Some(l.or(r)),
            _ => None,
        }
    }

    /// Conjunction of all conditions, `None` when there are none.
    pub fn all<I: IntoIterator<Item = Option<Expr>>>(conds: I) -> Option<Expr> {
        conds.into_iter().fold(None, Expr::and_opt)
    }

    /// Disjunction of all `terms`. The empty disjunction is false.
    pub fn any<I: IntoIterator<Item = Expr>>(terms: I) -> Expr {
        terms
            .into_iter()
            .reduce(Expr::or)
            .unwrap_or_else(|| Expr::bool(false))
    }

    /// Iterate over the direct sub-expressions.
    pub fn children(&self) -> Box<dyn Iterator<Item = &Expr> + '_> {
        match self {
            Expr::Res(_) | Expr::Operand(_) | Expr::Signal(_) => {
                Box::new(std::iter::empty())
            }
            Expr::BinOp { lhs, rhs, .. } => {
                Box::new([lhs.as_ref(), rhs.as_ref()].into_iter())
            }
            Expr::UnaryOp { operand, .. } => {
                Box::new(std::iter::once(operand.as_ref()))
            }
            Expr::Concat(ops) => Box::new(ops.iter()),
        }
    }

    /// Apply `f` to every register, variable and port read in this expression.
    pub fn for_each_operand_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut OperandVal),
    {
        match self {
            Expr::Operand(op) => f(op),
            Expr::Res(_) | Expr::Signal(_) => (),
            Expr::BinOp { lhs, rhs, .. } => {
                lhs.for_each_operand_mut(f);
                rhs.for_each_operand_mut(f);
            }
            Expr::UnaryOp { operand, .. } => operand.for_each_operand_mut(f),
            Expr::Concat(ops) => {
                ops.iter_mut().for_each(|op| op.for_each_operand_mut(f))
            }
        }
    }

    /// Names of all signals referenced by this expression, in reading order.
    pub fn signals(&self) -> Vec<Id> {
        let mut acc = vec![];
        self.collect_signals(&mut acc);
        acc
    }

    fn collect_signals(&self, acc: &mut Vec<Id>) {
        if let Expr::Signal(sig) = self {
            acc.push(sig.name);
        }
        self.children().for_each(|c| c.collect_signals(acc))
    }

    /// Replace every signal `s` for which `f(s)` returns an expression.
    pub fn replace_signals<F>(&mut self, f: &F)
    where
        F: Fn(&Signal) -> Option<Expr>,
    {
        match self {
            Expr::Signal(sig) => {
                if let Some(new) = f(sig) {
                    *self = new;
                }
            }
            Expr::Res(_) | Expr::Operand(_) => (),
            Expr::BinOp { lhs, rhs, .. } => {
                lhs.replace_signals(f);
                rhs.replace_signals(f);
            }
            Expr::UnaryOp { operand, .. } => operand.replace_signals(f),
            Expr::Concat(ops) => {
                ops.iter_mut().for_each(|op| op.replace_signals(f))
            }
        }
    }

    /// True for `&&`, `||` and `!` nodes.
    pub fn is_logic(&self) -> bool {
        matches!(
            self,
            Expr::BinOp {
                op: BinOp::And | BinOp::Or,
                ..
            } | Expr::UnaryOp {
                op: UnaryOp::Not,
                ..
            }
        )
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::bool(b)
    }
}

impl BitAnd for Expr {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl BitOr for Expr {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

impl Not for Expr {
    type Output = Self;

    fn not(self) -> Self {
        self.negate()
    }
}

impl Expr {
    fn fmt_operand(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            Expr::BinOp { .. } => write!(f, "({self})"),
            _ => write!(f, "{self}"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Res(ResExpr { val, .. }) => write!(f, "{val}"),
            Expr::Operand(op) => write!(f, "{}", op.signal_name()),
            Expr::Signal(sig) => write!(f, "{}", sig.name),
            Expr::BinOp { op, lhs, rhs } => {
                lhs.fmt_operand(f)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_operand(f)
            }
            Expr::UnaryOp { op, operand } => {
                write!(f, "{}", op.symbol())?;
                operand.fmt_operand(f)
            }
            Expr::Concat(ops) => write!(f, "{{{}}}", ops.iter().join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn a() -> Expr {
        Expr::flag("a")
    }

    fn b() -> Expr {
        Expr::flag("b")
    }

    #[test]
    fn literal_folding() {
        assert_eq!(Expr::bool(true).and(a()), a());
        assert_eq!(a().and(Expr::bool(false)), Expr::bool(false));
        assert_eq!(a().or(Expr::bool(true)), Expr::bool(true));
        assert_eq!(a().or(a()), a());
        assert_eq!(!!a(), a());
        assert_eq!(!Expr::bool(true), Expr::bool(false));
    }

    #[test]
    fn negation_flips_comparisons() {
        let state = Expr::signal("state", 2);
        let eq = Expr::binary(BinOp::Eq, state.clone(), Expr::lit(1, DType::uint(2)));
        let neq = Expr::binary(BinOp::Neq, state, Expr::lit(1, DType::uint(2)));
        assert_eq!(!eq, neq);
    }

    #[test]
    fn optional_conditions() {
        assert_eq!(Expr::and_opt(None, Some(a())), Some(a()));
        assert_eq!(Expr::or_opt(None, Some(a())), None);
        assert_eq!(Expr::all(vec![None, Some(a()), Some(b())]), Some(a() & b()));
        assert_eq!(Expr::all(vec![None, None]), None);
        assert_eq!(Expr::any(vec![]), Expr::bool(false));
    }

    #[test]
    fn display() {
        let acc = Expr::operand(Id::new("acc"), OperandKind::Reg, DType::uint(8));
        let e = (a() | b()) & !Expr::binary(BinOp::Add, acc, Expr::lit(1, DType::uint(8)));
        assert_eq!(e.to_string(), "(a || b) && !(acc_reg + 1)");
        assert_eq!(e.signals(), vec![Id::new("a"), Id::new("b")]);
    }

    #[test]
    fn replace_signals() {
        let mut e = a() & b();
        e.replace_signals(&|s| (s.name == "a").then(|| Expr::flag("c")));
        assert_eq!(e, Expr::flag("c") & b());
    }
}
