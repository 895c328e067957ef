//! Default propagation over lowered blocks.
//!
//! A block's `dflts` are driven at its top and may be overridden by its
//! statements. Propagation moves assignments into defaults and hoists
//! defaults of nested blocks into their parent, so that a target assigned
//! the same value everywhere ends up assigned once.
use gearc_ir::{AssignValue, Expr, HdlBlock, HdlStmt, Id};
use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;

/// Propagate defaults of `block` until a fixed point is reached.
///
/// Nested blocks are expected to be already processed. `is_control` marks
/// targets whose defaults must not leave a guarded block.
pub fn update_defaults<F>(block: &mut HdlBlock, is_control: &F)
where
    F: Fn(&AssignValue) -> bool,
{
    loop {
        let before = block.clone();
        hoist(block, is_control);
        cleanup(block);
        push_down(block, &LinkedHashMap::new());
        cleanup(block);
        if *block == before {
            break;
        }
    }
}

/// Propagate defaults of every block of the tree, innermost first, until
/// the whole tree reaches a fixed point.
pub fn update_defaults_tree<F>(block: &mut HdlBlock, is_control: &F)
where
    F: Fn(&AssignValue) -> bool,
{
    loop {
        let before = block.clone();
        bottom_up(block, is_control);
        if *block == before {
            break;
        }
    }
}

fn bottom_up<F>(block: &mut HdlBlock, is_control: &F)
where
    F: Fn(&AssignValue) -> bool,
{
    for stmt in &mut block.stmts {
        if let HdlStmt::Block(b) = stmt {
            bottom_up(b, is_control);
        }
    }
    update_defaults(block, is_control);
}

/// Names read by `expr`: operands by the wire they resolve to and signals.
fn reads(expr: &Expr, acc: &mut Vec<Id>) {
    match expr {
        Expr::Operand(op) => acc.push(Id::from(op.signal_name())),
        Expr::Signal(sig) => acc.push(sig.name),
        _ => expr.children().for_each(|c| reads(c, acc)),
    }
}

/// An assignment cannot move above statements that drive its target or
/// anything it reads.
fn pinned(driven: &HashSet<Id>, target: Id, val: Option<&Expr>) -> bool {
    if driven.contains(&target) {
        return true;
    }
    let mut acc = vec![];
    if let Some(val) = val {
        reads(val, &mut acc);
    }
    acc.iter().any(|r| driven.contains(r))
}

fn drive(driven: &mut HashSet<Id>, stmt: &HdlStmt) {
    match stmt {
        HdlStmt::Assign(a) => {
            driven.insert(a.target);
        }
        HdlStmt::Block(b) => {
            driven.extend(b.dflts.keys().copied());
            b.stmts.iter().for_each(|s| drive(driven, s));
        }
    }
}

/// Move assignments of `block` into its defaults and hoist the defaults of
/// its nested blocks.
fn hoist<F>(block: &mut HdlBlock, is_control: &F)
where
    F: Fn(&AssignValue) -> bool,
{
    let mut driven = HashSet::new();
    let mut kept = Vec::with_capacity(block.stmts.len());
    for stmt in std::mem::take(&mut block.stmts) {
        match stmt {
            HdlStmt::Assign(a) => {
                if !pinned(&driven, a.target, a.val.as_ref()) {
                    match block.dflts.get(&a.target) {
                        Some(d) if d.val == a.val => continue,
                        Some(_) => (),
                        None => {
                            block.dflts.insert(a.target, a);
                            continue;
                        }
                    }
                }
                let stmt = HdlStmt::Assign(a);
                drive(&mut driven, &stmt);
                kept.push(stmt);
            }
            HdlStmt::Block(mut child) => {
                let guarded = child.in_cond.is_some();
                for (target, d) in std::mem::take(&mut child.dflts) {
                    let stays = pinned(&driven, target, d.val.as_ref())
                        || (guarded && is_control(&d));
                    if !stays {
                        match block.dflts.get(&target) {
                            Some(p) if p.val == d.val => continue,
                            Some(_) => (),
                            None => {
                                block.dflts.insert(target, d);
                                continue;
                            }
                        }
                    }
                    child.dflts.insert(target, d);
                }
                let stmt = HdlStmt::Block(child);
                drive(&mut driven, &stmt);
                kept.push(stmt);
            }
        }
    }
    block.stmts = kept;
}

/// Remove defaults of nested blocks that repeat the value already in effect.
fn push_down(block: &mut HdlBlock, inherited: &LinkedHashMap<Id, Option<Expr>>) {
    let mut env = inherited.clone();
    for (target, d) in block.dflts.iter() {
        env.insert(*target, d.val.clone());
    }
    let mut driven = HashSet::new();
    for stmt in &mut block.stmts {
        if let HdlStmt::Block(child) = stmt {
            let child_env: LinkedHashMap<Id, Option<Expr>> = env
                .iter()
                .filter(|(t, v)| !pinned(&driven, **t, v.as_ref()))
                .map(|(t, v)| (*t, v.clone()))
                .collect();
            child.dflts = std::mem::take(&mut child.dflts)
                .into_iter()
                .filter(|(t, d)| child_env.get(t) != Some(&d.val))
                .collect();
            push_down(child, &child_env);
        }
        drive(&mut driven, stmt);
    }
}

/// Delete assignments without a value and blocks left empty.
fn cleanup(block: &mut HdlBlock) {
    block.stmts.retain_mut(|stmt| match stmt {
        HdlStmt::Assign(a) => a.val.is_some(),
        HdlStmt::Block(b) => {
            cleanup(b);
            !b.is_empty()
        }
    });
    let dflts = std::mem::take(&mut block.dflts);
    block.dflts = dflts.into_iter().filter(|(_, d)| d.val.is_some()).collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use gearc_ir::Printer;

    fn control(a: &AssignValue) -> bool {
        a.target.as_str().ends_with("_en")
    }

    fn assign(target: &str, val: i64) -> HdlStmt {
        AssignValue::flag(target, Expr::bool(val != 0)).into()
    }

    fn guarded(cond: &str, stmts: Vec<HdlStmt>) -> HdlStmt {
        HdlBlock::with_stmts(Some(Expr::flag(cond)), stmts).into()
    }

    #[test]
    fn equal_branches_hoist() {
        let mut root = HdlBlock::with_stmts(
            None,
            vec![
                guarded("a", vec![assign("x_v", 1)]),
                guarded("b", vec![assign("x_v", 1)]),
            ],
        );
        update_defaults_tree(&mut root, &control);
        assert_eq!(Printer::hdl_to_str(&root), "x_v = 1;\n");
    }

    #[test]
    fn control_stays_guarded() {
        let mut root = HdlBlock::with_stmts(
            None,
            vec![assign("x_en", 0), guarded("a", vec![assign("x_en", 1)])],
        );
        update_defaults_tree(&mut root, &control);
        assert_eq!(
            Printer::hdl_to_str(&root),
            "x_en = 0;\nif (a) begin\n  x_en = 1;\nend\n"
        );
    }

    #[test]
    fn differing_defaults_are_kept() {
        let mut root = HdlBlock::with_stmts(
            None,
            vec![
                guarded("a", vec![assign("x_v", 1)]),
                guarded("b", vec![assign("x_v", 0)]),
            ],
        );
        update_defaults_tree(&mut root, &control);
        assert_eq!(
            Printer::hdl_to_str(&root),
            "x_v = 1;\nif (b) begin\n  x_v = 0;\nend\n"
        );
    }

    #[test]
    fn later_write_keeps_order() {
        // `a` sets 0 which `b` must override back to 1
        let mut root = HdlBlock::with_stmts(
            None,
            vec![
                assign("x_v", 1),
                guarded("a", vec![assign("x_v", 0)]),
                guarded("b", vec![assign("x_v", 1)]),
            ],
        );
        update_defaults_tree(&mut root, &control);
        assert_eq!(
            Printer::hdl_to_str(&root),
            "x_v = 1;\nif (a) begin\n  x_v = 0;\nend\nif (b) begin\n  x_v = 1;\nend\n"
        );
    }

    #[test]
    fn nested_duplicates_are_removed() {
        let inner = guarded("b", vec![assign("x_en", 0), assign("y_en", 1)]);
        let mut root = HdlBlock::with_stmts(
            None,
            vec![assign("x_en", 0), guarded("a", vec![inner])],
        );
        update_defaults_tree(&mut root, &control);
        assert_eq!(
            Printer::hdl_to_str(&root),
            "x_en = 0;\nif (a) begin\n  if (b) begin\n    y_en = 1;\n  end\nend\n"
        );
    }

    #[test]
    fn fixed_point() {
        let mut root = HdlBlock::with_stmts(
            None,
            vec![
                assign("x_en", 0),
                guarded("a", vec![assign("x_v", 1), assign("x_en", 1)]),
                guarded("b", vec![assign("x_v", 1), assign("y_en", 0)]),
            ],
        );
        update_defaults_tree(&mut root, &control);
        let once = root.clone();
        update_defaults_tree(&mut root, &control);
        assert_eq!(root, once);
    }
}
