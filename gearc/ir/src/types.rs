//! Parametric hardware data types.
//!
//! The compiler only ever asks a type for its bit width and signedness; the
//! rest of this module exists so that front ends can describe generic types
//! (`Queue[T, 2]`) and resolve them against concrete ones.
use gearc_utils::{Error, GearResult, Id};
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use std::rc::Rc;

/// The base kind of a [DType].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum TypeKind {
    /// Zero-width type.
    Unit,
    /// A single bit.
    Bool,
    /// Unsigned integer, arguments: `[width]`.
    Uint,
    /// Signed integer, arguments: `[width]`.
    Int,
    /// Product of the argument types.
    Tuple,
    /// Arguments: `[element type, length]`.
    Array,
    /// Data with end-of-transaction flags, arguments: `[data type, level]`.
    Queue,
}

/// An argument of a parametric type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum TypeArg {
    Width(u64),
    Type(DType),
    /// An unresolved template parameter.
    Param(Id),
}

/// Bindings of template parameters produced by [DType::unify].
pub type Substitution = LinkedHashMap<Id, TypeArg>;

/// A type descriptor: a base kind plus an immutable argument list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct DType {
    kind: TypeKind,
    args: Rc<[TypeArg]>,
}

impl DType {
    pub fn new(kind: TypeKind, args: Vec<TypeArg>) -> Self {
        Self {
            kind,
            args: args.into(),
        }
    }

    pub fn unit() -> Self {
        Self::new(TypeKind::Unit, vec![])
    }

    pub fn bool() -> Self {
        Self::new(TypeKind::Bool, vec![])
    }

    pub fn uint(width: u64) -> Self {
        Self::new(TypeKind::Uint, vec![TypeArg::Width(width)])
    }

    pub fn int(width: u64) -> Self {
        Self::new(TypeKind::Int, vec![TypeArg::Width(width)])
    }

    pub fn tuple(fields: Vec<DType>) -> Self {
        Self::new(
            TypeKind::Tuple,
            fields.into_iter().map(TypeArg::Type).collect(),
        )
    }

    pub fn array(elem: DType, len: u64) -> Self {
        Self::new(
            TypeKind::Array,
            vec![TypeArg::Type(elem), TypeArg::Width(len)],
        )
    }

    pub fn queue(data: DType, lvl: u64) -> Self {
        Self::new(
            TypeKind::Queue,
            vec![TypeArg::Type(data), TypeArg::Width(lvl)],
        )
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn args(&self) -> &[TypeArg] {
        &self.args
    }

    pub fn signed(&self) -> bool {
        self.kind == TypeKind::Int
    }

    /// True when no argument, at any depth, is an unresolved parameter.
    pub fn is_concrete(&self) -> bool {
        self.args.iter().all(|arg| match arg {
            TypeArg::Width(_) => true,
            TypeArg::Type(t) => t.is_concrete(),
            TypeArg::Param(_) => false,
        })
    }

    fn width_arg(&self, pos: usize) -> GearResult<u64> {
        match self.args.get(pos) {
            Some(TypeArg::Width(w)) => Ok(*w),
            Some(TypeArg::Param(p)) => Err(Error::type_error(format!(
                "Width of `{self}' depends on unresolved parameter `{p}'"
            ))),
            _ => Err(Error::type_error(format!(
                "Type `{self}' is missing a width argument at position {pos}"
            ))),
        }
    }

    fn type_arg(&self, pos: usize) -> GearResult<&DType> {
        match self.args.get(pos) {
            Some(TypeArg::Type(t)) => Ok(t),
            Some(TypeArg::Param(p)) => Err(Error::type_error(format!(
                "Width of `{self}' depends on unresolved parameter `{p}'"
            ))),
            _ => Err(Error::type_error(format!(
                "Type `{self}' is missing a type argument at position {pos}"
            ))),
        }
    }

    /// Number of bits needed to represent a value of this type.
    pub fn width(&self) -> GearResult<u64> {
        match self.kind {
            TypeKind::Unit => Ok(0),
            TypeKind::Bool => Ok(1),
            TypeKind::Uint | TypeKind::Int => self.width_arg(0),
            TypeKind::Tuple => {
                let mut total = 0;
                for pos in 0..self.args.len() {
                    total += self.type_arg(pos)?.width()?;
                }
                Ok(total)
            }
            TypeKind::Array => {
                Ok(self.type_arg(0)?.width()? * self.width_arg(1)?)
            }
            TypeKind::Queue => {
                Ok(self.type_arg(0)?.width()? + self.width_arg(1)?)
            }
        }
    }

    /// Match `concrete` against `self`, binding parameters of `self` into
    /// `subst`. Returns false when the shapes disagree or a parameter would be
    /// bound to two different arguments. `subst` may be partially updated on
    /// failure.
    pub fn unify(&self, concrete: &DType, subst: &mut Substitution) -> bool {
        if self.kind != concrete.kind || self.args.len() != concrete.args.len()
        {
            return false;
        }

        self.args
            .iter()
            .zip(concrete.args.iter())
            .all(|(tmpl, conc)| match (tmpl, conc) {
                (TypeArg::Param(p), _) => match subst.get(p) {
                    Some(bound) => bound == conc,
                    None => {
                        subst.insert(*p, conc.clone());
                        true
                    }
                },
                (TypeArg::Width(a), TypeArg::Width(b)) => a == b,
                (TypeArg::Type(a), TypeArg::Type(b)) => a.unify(b, subst),
                _ => false,
            })
    }

    /// Replace every bound parameter with its binding.
    pub fn substitute(&self, subst: &Substitution) -> DType {
        let args = self
            .args
            .iter()
            .map(|arg| match arg {
                TypeArg::Param(p) => {
                    subst.get(p).cloned().unwrap_or(TypeArg::Param(*p))
                }
                TypeArg::Type(t) => TypeArg::Type(t.substitute(subst)),
                TypeArg::Width(w) => TypeArg::Width(*w),
            })
            .collect();
        DType::new(self.kind, args)
    }
}

impl std::fmt::Display for TypeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeArg::Width(w) => write!(f, "{w}"),
            TypeArg::Type(t) => write!(f, "{t}"),
            TypeArg::Param(p) => write!(f, "{p}"),
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, &*self.args) {
            (TypeKind::Unit, _) => write!(f, "()"),
            (TypeKind::Bool, _) => write!(f, "bool"),
            (TypeKind::Uint, [TypeArg::Width(w)]) => write!(f, "u{w}"),
            (TypeKind::Int, [TypeArg::Width(w)]) => write!(f, "i{w}"),
            (TypeKind::Uint, args) => write!(f, "Uint[{}]", args.iter().join(", ")),
            (TypeKind::Int, args) => write!(f, "Int[{}]", args.iter().join(", ")),
            (TypeKind::Tuple, args) => write!(f, "({})", args.iter().join(", ")),
            (TypeKind::Array, args) => {
                write!(f, "Array[{}]", args.iter().join(", "))
            }
            (TypeKind::Queue, args) => {
                write!(f, "Queue[{}]", args.iter().join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(DType::bool().width().unwrap(), 1);
        assert_eq!(DType::uint(8).width().unwrap(), 8);
        assert_eq!(DType::unit().width().unwrap(), 0);
        let t = DType::tuple(vec![DType::uint(4), DType::int(3)]);
        assert_eq!(t.width().unwrap(), 7);
        assert_eq!(DType::array(t.clone(), 3).width().unwrap(), 21);
        assert_eq!(DType::queue(DType::uint(8), 2).width().unwrap(), 10);
        assert!(DType::int(3).signed());
        assert!(!t.signed());
    }

    #[test]
    fn unresolved_width_is_an_error() {
        let t = DType::new(TypeKind::Uint, vec![TypeArg::Param(Id::new("W"))]);
        assert!(!t.is_concrete());
        assert!(matches!(t.width(), Err(Error::Type(_))));
    }

    #[test]
    fn unify_then_substitute() {
        let w = Id::new("W");
        let tmpl = DType::queue(
            DType::new(TypeKind::Uint, vec![TypeArg::Param(w)]),
            2,
        );
        let conc = DType::queue(DType::uint(16), 2);
        let mut subst = Substitution::new();
        assert!(tmpl.unify(&conc, &mut subst));
        assert_eq!(subst.get(&w), Some(&TypeArg::Width(16)));
        assert_eq!(tmpl.substitute(&subst), conc);
        assert_eq!(tmpl.substitute(&subst).to_string(), "Queue[u16, 2]");
    }

    #[test]
    fn unify_rejects_conflicting_bindings() {
        let t = TypeArg::Param(Id::new("T"));
        let tmpl = DType::new(TypeKind::Tuple, vec![t.clone(), t]);
        let conc = DType::tuple(vec![DType::uint(1), DType::uint(2)]);
        assert!(!tmpl.unify(&conc, &mut Substitution::new()));
        let same = DType::tuple(vec![DType::uint(2), DType::uint(2)]);
        assert!(tmpl.unify(&same, &mut Substitution::new()));
    }
}
