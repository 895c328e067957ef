use crate::traversal::{ConstructPass, Named, ParseVal, PassOpt};
use boolean_expression::{BDD, Expr as BExpr};
use gearc_ir::{AssignValue, BinOp, Expr, HdlBlock, Id, UnaryOp};
use gearc_utils::GearResult;
use std::collections::{HashMap, HashSet};

/// Simplify the named block conditions using binary decision diagrams.
///
/// Conditions are boolean combinations of opaque atoms: comparisons,
/// handshake flags and references to other conditions. Anything that is not
/// an `&&`, `||` or `!` is an atom, so every expression can be simplified.
pub struct SimplifyConditions {
    /// Expressions with more atoms are left alone.
    pub max_atoms: u64,
    /// Maximum number of simplify and alias cleanup rounds.
    pub rounds: u64,
}

impl Named for SimplifyConditions {
    fn name() -> &'static str {
        "simplify"
    }

    fn description() -> &'static str {
        "minimize block conditions using binary decision diagrams"
    }

    fn opts() -> Vec<PassOpt> {
        vec![
            PassOpt::new(
                "max-atoms",
                "do not simplify expressions with more atoms than this",
                ParseVal::Num(8),
                PassOpt::parse_num,
            ),
            PassOpt::new(
                "rounds",
                "number of simplify and alias cleanup rounds",
                ParseVal::Num(3),
                PassOpt::parse_num,
            ),
        ]
    }
}

impl ConstructPass for SimplifyConditions {
    fn from(extra_opts: &[String]) -> GearResult<Self> {
        let opts = Self::get_opts(extra_opts);
        Ok(SimplifyConditions {
            max_atoms: opts["max-atoms"].pos_num().unwrap_or(8),
            rounds: opts["rounds"].pos_num().unwrap_or(3),
        })
    }
}

impl Default for SimplifyConditions {
    fn default() -> Self {
        SimplifyConditions {
            max_atoms: 8,
            rounds: 3,
        }
    }
}

/// Comparisons represented as the negation of their opposite, so that
/// `a != b` and `!(a == b)` map to the same atom.
fn is_negated_cmp(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::BinOp {
            op: BinOp::Neq | BinOp::Gte | BinOp::Lte,
            ..
        }
    )
}

fn collect_atoms(expr: &Expr, acc: &mut Vec<Expr>) {
    match expr {
        Expr::BinOp {
            op: BinOp::And | BinOp::Or,
            lhs,
            rhs,
        } => {
            collect_atoms(lhs, acc);
            collect_atoms(rhs, acc);
        }
        Expr::UnaryOp {
            op: UnaryOp::Not,
            operand,
        } => collect_atoms(operand, acc),
        e if e.as_bool().is_some() => (),
        e if is_negated_cmp(e) => acc.push(e.clone().negate()),
        e => acc.push(e.clone()),
    }
}

/// The atoms of a logic expression, numbered by their position.
struct Atoms(Vec<Expr>);

impl Atoms {
    fn new(expr: &Expr) -> Self {
        let mut acc = vec![];
        collect_atoms(expr, &mut acc);
        // Numbering by text keeps the variable order independent of how the
        // expression was built.
        acc.sort_by_cached_key(|a| (a.to_string(), format!("{a:?}")));
        acc.dedup();
        Atoms(acc)
    }

    fn index(&self, atom: &Expr) -> Option<usize> {
        self.0.iter().position(|a| a == atom)
    }

    /// `None` when `expr` holds an atom missing from the table.
    fn to_bexpr(&self, expr: &Expr) -> Option<BExpr<usize>> {
        Some(match expr {
            Expr::BinOp {
                op: BinOp::And,
                lhs,
                rhs,
            } => BExpr::and(self.to_bexpr(lhs)?, self.to_bexpr(rhs)?),
            Expr::BinOp {
                op: BinOp::Or,
                lhs,
                rhs,
            } => BExpr::or(self.to_bexpr(lhs)?, self.to_bexpr(rhs)?),
            Expr::UnaryOp {
                op: UnaryOp::Not,
                operand,
            } => BExpr::not(self.to_bexpr(operand)?),
            e => match e.as_bool() {
                Some(b) => BExpr::Const(b),
                None if is_negated_cmp(e) => {
                    BExpr::not(BExpr::Terminal(self.index(&e.clone().negate())?))
                }
                None => BExpr::Terminal(self.index(e)?),
            },
        })
    }

    fn from_bexpr(&self, expr: BExpr<usize>) -> Expr {
        match expr {
            BExpr::Terminal(i) => self.0[i].clone(),
            BExpr::Const(b) => Expr::bool(b),
            BExpr::Not(e) => self.from_bexpr(*e).negate(),
            BExpr::And(l, r) => self.from_bexpr(*l).and(self.from_bexpr(*r)),
            BExpr::Or(l, r) => self.from_bexpr(*l).or(self.from_bexpr(*r)),
        }
    }
}

fn extract_dnf(expr: BExpr<usize>, acc: &mut Vec<BExpr<usize>>) {
    match expr {
        BExpr::Or(l, r) => {
            extract_dnf(*l, acc);
            extract_dnf(*r, acc);
        }
        _ => acc.push(expr),
    }
}

fn extract_cnf(expr: BExpr<usize>, acc: &mut Vec<BExpr<usize>>) {
    match expr {
        BExpr::And(l, r) => {
            extract_cnf(*l, acc);
            extract_cnf(*r, acc);
        }
        _ => acc.push(expr),
    }
}

/// Pull the conjuncts shared by every disjunct of a sum of products out of
/// the disjunction.
fn factor(sop: BExpr<usize>) -> BExpr<usize> {
    let mut disjuncts = Vec::new();
    extract_dnf(sop, &mut disjuncts);
    if disjuncts.len() == 1 {
        return disjuncts.remove(0);
    }

    let sets = disjuncts
        .into_iter()
        .map(|d| {
            let mut conjuncts = Vec::new();
            extract_cnf(d, &mut conjuncts);
            conjuncts
        })
        .collect::<Vec<_>>();

    let mut common = sets[0].clone();
    common.retain(|e| sets.iter().all(|s| s.contains(e)));
    if common.is_empty() {
        return sets
            .into_iter()
            .map(|s| s.into_iter().reduce(BExpr::and).unwrap_or(BExpr::Const(true)))
            .reduce(BExpr::or)
            .unwrap_or(BExpr::Const(false));
    }

    let rest = sets
        .into_iter()
        .map(|s| {
            s.into_iter()
                .filter(|e| !common.contains(e))
                .reduce(BExpr::and)
                .unwrap_or(BExpr::Const(true))
        })
        .reduce(BExpr::or)
        .unwrap_or(BExpr::Const(false));
    let common = common
        .into_iter()
        .reduce(BExpr::and)
        .unwrap_or(BExpr::Const(true));
    match rest {
        BExpr::Const(true) => common,
        rest => BExpr::and(common, rest),
    }
}

impl SimplifyConditions {
    /// Simplify a single expression. Expressions that are not logic or have
    /// too many atoms are returned unchanged.
    pub fn simplify(&self, expr: &Expr) -> Expr {
        if !expr.is_logic() {
            return expr.clone();
        }
        let atoms = Atoms::new(expr);
        if atoms.0.len() as u64 > self.max_atoms {
            log::debug!("{}: {} atoms in `{expr}'", Self::name(), atoms.0.len());
            return expr.clone();
        }
        let mut bdd = BDD::new();
        for i in 0..atoms.0.len() {
            bdd.terminal(i);
        }
        let Some(bexpr) = atoms.to_bexpr(expr) else {
            log::warn!("{}: unknown atom in `{expr}'", Self::name());
            return expr.clone();
        };
        let func = bdd.from_expr(&bexpr);
        let sop = bdd.to_expr(func);
        atoms.from_bexpr(factor(sop))
    }

    /// Simplify the materialized conditions, merge conditions with equal
    /// values and redirect references to aliases in `conds` and `trees` to
    /// the condition they stand for.
    pub fn run(&self, conds: &mut [AssignValue], trees: &mut [&mut HdlBlock]) {
        for round in 0..self.rounds {
            let before = conds.to_vec();
            for cond in conds.iter_mut() {
                if let Some(val) = &cond.val {
                    cond.val = Some(self.simplify(val));
                }
            }
            merge_equal(conds);
            let aliases = aliases(conds);
            if !aliases.is_empty() {
                let redirect = |s: &gearc_ir::Signal| {
                    aliases.get(&s.name).map(|t| Expr::signal(*t, s.width))
                };
                for val in conds.iter_mut().filter_map(|c| c.val.as_mut()) {
                    val.replace_signals(&redirect);
                }
                for tree in trees.iter_mut() {
                    tree.for_each_expr_mut(&mut |e: &mut Expr| e.replace_signals(&redirect));
                }
            }
            if conds == before.as_slice() {
                log::debug!("{}: stable after {} rounds", Self::name(), round + 1);
                break;
            }
        }
    }
}

/// Conditions with a compound value equal to that of an earlier condition
/// are redefined as a reference to it.
fn merge_equal(conds: &mut [AssignValue]) {
    let mut seen: HashMap<Expr, Id> = HashMap::new();
    for cond in conds.iter_mut() {
        let Some(val) = &cond.val else { continue };
        if !val.is_logic() {
            continue;
        }
        match seen.get(val) {
            Some(first) => {
                log::debug!("{} duplicates {first}", cond.target);
                cond.val = Some(Expr::flag(*first));
            }
            None => {
                seen.insert(val.clone(), cond.target);
            }
        }
    }
}

/// Conditions defined as another condition, mapped to the condition at the
/// end of the alias chain. Cyclic chains are left alone.
fn aliases(conds: &[AssignValue]) -> HashMap<Id, Id> {
    let names = conds.iter().map(|c| c.target).collect::<HashSet<_>>();
    let direct = conds
        .iter()
        .filter_map(|c| match &c.val {
            Some(Expr::Signal(s)) if names.contains(&s.name) && s.name != c.target => {
                Some((c.target, s.name))
            }
            _ => None,
        })
        .collect::<HashMap<_, _>>();
    let mut resolved = HashMap::new();
    for (alias, target) in &direct {
        let mut seen = HashSet::from([*alias]);
        let mut cur = *target;
        let mut cyclic = false;
        while let Some(next) = direct.get(&cur) {
            if !seen.insert(cur) {
                cyclic = true;
                break;
            }
            cur = *next;
        }
        if !cyclic && cur != *alias {
            resolved.insert(*alias, cur);
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use gearc_ir::DType;

    fn f(name: &str) -> Expr {
        Expr::flag(name)
    }

    fn simplify(e: &Expr) -> String {
        SimplifyConditions::default().simplify(e).to_string()
    }

    #[test]
    fn constant_results() {
        assert_eq!(simplify(&(f("a") & !f("a"))), "0");
        assert_eq!(simplify(&(f("a") | !f("a"))), "1");
    }

    #[test]
    fn absorption() {
        assert_eq!(simplify(&((f("a") & f("b")) | f("a"))), "a");
    }

    #[test]
    fn negated_comparisons_share_atoms() {
        let x = Expr::signal("x", 2);
        let one = Expr::lit(1, DType::uint(2));
        let eq = Expr::binary(BinOp::Eq, x.clone(), one.clone());
        let neq = Expr::binary(BinOp::Neq, x, one);
        assert_eq!(simplify(&(neq.clone() | !eq.clone())), "x != 1");
        assert_eq!(simplify(&(neq & eq)), "0");
    }

    #[test]
    fn too_many_atoms_are_left_alone() {
        let pass = SimplifyConditions {
            max_atoms: 2,
            rounds: 1,
        };
        let e = (f("a") & f("b")) | (f("a") & f("c"));
        assert_eq!(pass.simplify(&e), e);
    }

    #[test]
    fn non_logic_is_unchanged() {
        let e = Expr::binary(BinOp::Add, f("a"), f("b"));
        assert_eq!(SimplifyConditions::default().simplify(&e), e);
    }

    #[test]
    fn atoms_outside_the_table_are_rejected() {
        let e = f("a").and(f("b"));
        let atoms = Atoms::new(&e);
        assert_eq!(atoms.index(&f("b")), Some(1));
        assert_eq!(atoms.index(&f("c")), None);
        assert!(atoms.to_bexpr(&f("a").or(f("c"))).is_none());
        assert!(atoms.to_bexpr(&e).is_some());
    }

    #[test]
    fn options() {
        let opts = ["simplify:max-atoms=4".to_string()];
        let pass = <SimplifyConditions as ConstructPass>::from(&opts).unwrap();
        assert_eq!(pass.max_atoms, 4);
        assert_eq!(pass.rounds, 3);
    }

    #[test]
    fn aliases_are_redirected() {
        let mut conds = vec![
            AssignValue::flag("c0", f("c1")),
            AssignValue::flag("c1", f("c2")),
            AssignValue::flag("c2", f("a") & f("b")),
            AssignValue::flag("c3", f("b") & f("a")),
            AssignValue::flag("c4", f("c0") | f("z")),
        ];
        let mut tree = HdlBlock::with_stmts(
            Some(f("c0")),
            vec![AssignValue::flag("x_en", f("c3")).into()],
        );
        SimplifyConditions::default().run(&mut conds, &mut [&mut tree]);
        let vals = conds
            .iter()
            .map(|c| format!("{} = {}", c.target, c.val.as_ref().unwrap()))
            .collect::<Vec<_>>();
        assert_eq!(vals[0], "c0 = c2");
        assert_eq!(vals[1], "c1 = c2");
        assert_eq!(vals[3], "c3 = c2");
        assert!(vals[4].contains("c2"));
        assert_eq!(tree.in_cond, Some(f("c2")));
        assert_eq!(
            gearc_ir::Printer::hdl_to_str(&tree),
            "if (c2) begin\n  x_en = c2;\nend\n"
        );
    }

    #[test]
    fn cyclic_aliases_are_ignored() {
        let conds = vec![
            AssignValue::flag("c0", f("c1")),
            AssignValue::flag("c1", f("c0")),
        ];
        assert!(aliases(&conds).is_empty());
    }
}
