//! Implements a formatter for the intermediate trees.
//! Used for debugging output and in tests.
use crate::cblock::{CBlockIdx, CBlockKind, Schedule};
use crate::control::{Module, Stmt, StmtIdx};
use crate::hdl::{AssignValue, HdlBlock, HdlStmt};
use itertools::Itertools;
use std::io;

/// Printer for the intermediate trees.
pub struct Printer;

impl Printer {
    /// Format and write an assignment.
    pub fn write_assign<F: io::Write>(
        assign: &AssignValue,
        indent_level: usize,
        f: &mut F,
    ) -> io::Result<()> {
        write!(f, "{}", " ".repeat(indent_level))?;
        match &assign.val {
            Some(val) => writeln!(f, "{} = {};", assign.target, val),
            None => writeln!(f, "{} = <default>;", assign.target),
        }
    }

    /// Format and write a lowered block. Defaults are written first.
    pub fn write_hdl_block<F: io::Write>(
        block: &HdlBlock,
        indent_level: usize,
        f: &mut F,
    ) -> io::Result<()> {
        let inner = match &block.in_cond {
            Some(cond) => {
                write!(f, "{}", " ".repeat(indent_level))?;
                writeln!(f, "if ({cond}) begin")?;
                indent_level + 2
            }
            None => indent_level,
        };
        for dflt in block.dflts.values() {
            Self::write_assign(dflt, inner, f)?;
        }
        for stmt in &block.stmts {
            match stmt {
                HdlStmt::Assign(a) => Self::write_assign(a, inner, f)?,
                // Unguarded blocks are written inline.
                HdlStmt::Block(b) => Self::write_hdl_block(b, inner, f)?,
            }
        }
        if block.in_cond.is_some() {
            write!(f, "{}", " ".repeat(indent_level))?;
            writeln!(f, "end")?;
        }
        Ok(())
    }

    /// Convenience method to get string representation of [HdlBlock].
    pub fn hdl_to_str(block: &HdlBlock) -> String {
        let mut buf = Vec::new();
        Self::write_hdl_block(block, 0, &mut buf).ok();
        String::from_utf8_lossy(buf.as_slice()).to_string()
    }

    /// Format and write a statement of the control tree.
    pub fn write_stmt<F: io::Write>(
        module: &Module,
        idx: StmtIdx,
        indent_level: usize,
        f: &mut F,
    ) -> io::Result<()> {
        write!(f, "{}", " ".repeat(indent_level))?;
        match module.stmt(idx) {
            Stmt::Block(b) => {
                write!(f, "{}", b.kind.name())?;
                if let Some(id) = b.id {
                    write!(f, "[{id}]")?;
                }
                if let Some(cond) = &b.in_cond {
                    write!(f, " ({cond})")?;
                }
                writeln!(f, " {{")?;
                for stmt in &b.stmts {
                    Self::write_stmt(module, *stmt, indent_level + 2, f)?;
                }
                write!(f, "{}", " ".repeat(indent_level))?;
                writeln!(f, "}}")
            }
            Stmt::Yield(y) => {
                write!(f, "yield")?;
                if let Some(id) = y.id {
                    write!(f, "[{id}]")?;
                }
                let vals = y
                    .exprs
                    .iter()
                    .map(|e| e.as_ref().map_or("_".to_string(), |e| e.to_string()))
                    .join(", ");
                writeln!(f, " {vals};")
            }
            Stmt::RegNext(r) => writeln!(f, "{} <= {};", r.reg, r.val),
            Stmt::Variable(v) => writeln!(f, "{} = {};", v.var, v.val),
        }
    }

    /// Convenience method to get string representation of a module's
    /// control tree.
    pub fn module_to_str(module: &Module) -> String {
        let mut buf = Vec::new();
        Self::write_stmt(module, module.root, 0, &mut buf).ok();
        String::from_utf8_lossy(buf.as_slice()).to_string()
    }

    fn write_cblock<F: io::Write>(
        module: &Module,
        schedule: &Schedule,
        idx: CBlockIdx,
        indent_level: usize,
        f: &mut F,
    ) -> io::Result<()> {
        let cb = schedule.get(idx);
        write!(f, "{}", " ".repeat(indent_level))?;
        let states = cb.state_ids.iter().join(", ");
        match cb.kind {
            CBlockKind::Leaf => {
                let stmts = cb
                    .stmts
                    .iter()
                    .map(|s| Self::stmt_kind(module, *s))
                    .join(", ");
                writeln!(f, "Leaf: state {states}, [{stmts}]")?;
            }
            CBlockKind::Seq | CBlockKind::Mutex => {
                let kind = if cb.kind == CBlockKind::Seq {
                    "SeqCBlock"
                } else {
                    "MutexCBlock"
                };
                let hdl = cb
                    .hdl_block
                    .map_or("", |s| Self::stmt_kind(module, s));
                write!(f, "{kind}: states: [{states}], ({hdl})")?;
                if !cb.prolog.is_empty() {
                    write!(f, " prolog: {}", cb.prolog.len())?;
                }
                if !cb.epilog.is_empty() {
                    write!(f, " epilog: {}", cb.epilog.len())?;
                }
                writeln!(f)?;
                for child in &cb.child {
                    Self::write_cblock(
                        module,
                        schedule,
                        *child,
                        indent_level + 4,
                        f,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn stmt_kind(module: &Module, idx: StmtIdx) -> &'static str {
        match module.stmt(idx) {
            Stmt::Block(b) => b.kind.name(),
            Stmt::Yield(_) => "Yield",
            Stmt::RegNext(_) => "RegNextStmt",
            Stmt::Variable(_) => "VariableStmt",
        }
    }

    /// Convenience method to get string representation of a [Schedule].
    pub fn schedule_to_str(module: &Module, schedule: &Schedule) -> String {
        let mut buf = Vec::new();
        Self::write_cblock(module, schedule, schedule.root, 0, &mut buf).ok();
        String::from_utf8_lossy(buf.as_slice()).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expr;

    #[test]
    fn hdl_block_layout() {
        let mut root = HdlBlock::comb();
        root.dflts
            .insert("x_en".into(), AssignValue::flag("x_en", Expr::bool(false)));
        let mut inner = HdlBlock::new(Some(Expr::flag("c")));
        inner.push(AssignValue::flag("x_en", Expr::bool(true)));
        root.push(inner);
        assert_eq!(
            Printer::hdl_to_str(&root),
            "x_en = 0;\nif (c) begin\n  x_en = 1;\nend\n"
        );
    }

    #[test]
    fn unguarded_blocks_are_inlined() {
        let mut leaf = HdlBlock::new(Some(Expr::flag("c")));
        leaf.push(AssignValue::flag("y_en", Expr::bool(true)));
        let mut inner = HdlBlock::new(None);
        inner.push(AssignValue::flag("x_en", Expr::bool(true)));
        inner.push(leaf);
        let mut outer = HdlBlock::new(None);
        outer.push(inner);
        let mut root = HdlBlock::new(Some(Expr::flag("s")));
        root.push(outer);
        assert_eq!(
            Printer::hdl_to_str(&root),
            "if (s) begin\n  \
               x_en = 1;\n  \
               if (c) begin\n    \
                 y_en = 1;\n  \
               end\n\
             end\n"
        );
    }
}
