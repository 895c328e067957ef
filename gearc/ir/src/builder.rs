//! Module builder. Provides convenience methods to construct control trees and
//! validates them when the tree is finished.
use crate::control::{
    Block, BlockKind, Module, PortDef, RegDef, RegNextStmt, Stmt, StmtIdx,
    VariableDef, VariableStmt, Yield,
};
use crate::expr::{Expr, OperandKind};
use crate::types::DType;
use gearc_idx::{IndexRef, IndexedMap};
use gearc_utils::{Error, GearResult, GetName, Id};
use linked_hash_map::LinkedHashMap;
use std::collections::HashSet;

/// Builds a [Module] bottom-up: statements are added first and then grouped
/// into blocks by passing their indices.
pub struct ModuleBuilder {
    name: Id,
    regs: LinkedHashMap<Id, RegDef>,
    variables: LinkedHashMap<Id, VariableDef>,
    in_ports: Vec<PortDef>,
    out_ports: Vec<PortDef>,
    nodes: IndexedMap<StmtIdx, Stmt>,
}

impl ModuleBuilder {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        Self {
            name: name.into(),
            regs: LinkedHashMap::new(),
            variables: LinkedHashMap::new(),
            in_ports: vec![],
            out_ports: vec![],
            nodes: IndexedMap::new(),
        }
    }

    pub fn add_reg<S: Into<Id>>(&mut self, name: S, dtype: DType, init: i64) -> Id {
        let name = name.into();
        self.regs.insert(name, RegDef { name, dtype, init });
        name
    }

    pub fn add_variable<S: Into<Id>>(&mut self, name: S, dtype: DType) -> Id {
        let name = name.into();
        self.variables.insert(name, VariableDef { name, dtype });
        name
    }

    pub fn add_in_port<S: Into<Id>>(&mut self, name: S, dtype: DType) -> Id {
        let name = name.into();
        self.in_ports.push(PortDef { name, dtype });
        name
    }

    pub fn add_out_port<S: Into<Id>>(&mut self, name: S, dtype: DType) -> Id {
        let name = name.into();
        self.out_ports.push(PortDef { name, dtype });
        name
    }

    /// A read of the declaration called `name`.
    pub fn read<S: Into<Id>>(&self, name: S) -> GearResult<Expr> {
        let name = name.into();
        if let Some(r) = self.regs.get(&name) {
            Ok(Expr::operand(name, OperandKind::Reg, r.dtype.clone()))
        } else if let Some(v) = self.variables.get(&name) {
            Ok(Expr::operand(name, OperandKind::Variable, v.dtype.clone()))
        } else if let Some(p) = self.in_ports.iter().find(|p| p.name == name) {
            Ok(Expr::operand(name, OperandKind::Port, p.dtype.clone()))
        } else {
            Err(Error::malformed_structure(format!(
                "`{name}' is not a register, variable or input port"
            )))
        }
    }

    /// The `valid` flag of an input interface.
    pub fn valid<S: Into<Id>>(&self, intf: S) -> Expr {
        Expr::flag(format!("{}.valid", intf.into()))
    }

    fn add(&mut self, stmt: Stmt) -> StmtIdx {
        self.nodes.push(stmt)
    }

    pub fn reg_next<S: Into<Id>>(&mut self, reg: S, val: Expr) -> StmtIdx {
        self.add(Stmt::RegNext(RegNextStmt {
            reg: reg.into(),
            val,
        }))
    }

    pub fn assign<S: Into<Id>>(&mut self, var: S, val: Expr) -> StmtIdx {
        self.add(Stmt::Variable(VariableStmt {
            var: var.into(),
            val,
        }))
    }

    /// A yield emitting on every output port.
    pub fn emit(&mut self, exprs: Vec<Expr>) -> StmtIdx {
        self.emit_partial(exprs.into_iter().map(Some).collect())
    }

    pub fn emit_partial(&mut self, exprs: Vec<Option<Expr>>) -> StmtIdx {
        self.add(Stmt::Yield(Yield { exprs, id: None }))
    }

    pub fn block(
        &mut self,
        kind: BlockKind,
        in_cond: Option<Expr>,
        stmts: Vec<StmtIdx>,
    ) -> StmtIdx {
        self.add(Stmt::Block(Block {
            kind,
            stmts,
            in_cond,
            id: None,
        }))
    }

    pub fn if_block(&mut self, cond: Expr, stmts: Vec<StmtIdx>) -> StmtIdx {
        self.block(BlockKind::If, Some(cond), stmts)
    }

    /// An if/else-if chain. Branch conditions must be mutually exclusive.
    pub fn container(&mut self, branches: Vec<StmtIdx>) -> StmtIdx {
        self.block(BlockKind::Container, None, branches)
    }

    pub fn loop_block(
        &mut self,
        exit_cond: Expr,
        stmts: Vec<StmtIdx>,
    ) -> StmtIdx {
        self.block(
            BlockKind::Loop {
                exit_cond: Some(exit_cond),
            },
            None,
            stmts,
        )
    }

    /// A block consuming one transaction of `intf`.
    pub fn intf_block<S: Into<Id>>(&mut self, intf: S, stmts: Vec<StmtIdx>) -> StmtIdx {
        let intf = intf.into();
        let valid = self.valid(intf);
        self.block(BlockKind::Intf { intf }, Some(valid), stmts)
    }

    /// A loop consuming transactions of `intf` until its end-of-transaction.
    pub fn intf_loop<S: Into<Id>>(&mut self, intf: S, stmts: Vec<StmtIdx>) -> StmtIdx {
        let intf = intf.into();
        let valid = self.valid(intf);
        self.block(BlockKind::IntfLoop { intf }, Some(valid), stmts)
    }

    /// Wrap `stmts` in the module block and check the tree.
    pub fn finish(mut self, stmts: Vec<StmtIdx>) -> GearResult<Module> {
        let root = self.block(BlockKind::Module, None, stmts);
        let module = Module {
            name: self.name,
            regs: self.regs,
            variables: self.variables,
            in_ports: self.in_ports,
            out_ports: self.out_ports,
            nodes: self.nodes,
            root,
        };
        validate(&module)?;
        log::debug!(
            "built module {} with {} statements",
            module.name,
            module.nodes.len()
        );
        Ok(module)
    }
}

/// Declarations share one namespace.
fn check_unique<'a, T: GetName + 'a>(
    names: &mut HashSet<Id>,
    decls: impl IntoIterator<Item = &'a T>,
) -> GearResult<()> {
    for decl in decls {
        if !names.insert(decl.name()) {
            return Err(Error::malformed_structure(format!(
                "`{}' is declared more than once",
                decl.name()
            )));
        }
    }
    Ok(())
}

/// Check that `module` is a tree whose statements only refer to declared
/// registers, variables and ports.
fn validate(module: &Module) -> GearResult<()> {
    let mut names = HashSet::new();
    check_unique(&mut names, module.regs.values())?;
    check_unique(&mut names, module.variables.values())?;
    check_unique(&mut names, &module.in_ports)?;
    check_unique(&mut names, &module.out_ports)?;

    let mut seen = HashSet::new();
    for idx in module.descendants(module.root) {
        if !seen.insert(idx) {
            return Err(Error::malformed_structure(format!(
                "Statement {} has more than one parent",
                module.describe(idx)
            )));
        }
        match module.stmt(idx) {
            Stmt::Block(b) => match &b.kind {
                BlockKind::Module if idx != module.root => {
                    return Err(Error::malformed_structure(
                        "Module block nested inside the control tree",
                    ));
                }
                BlockKind::Intf { intf } | BlockKind::IntfLoop { intf }
                    if module.in_port(*intf).is_none() =>
                {
                    return Err(Error::malformed_structure(format!(
                        "{} reads undeclared interface `{intf}'",
                        module.describe(idx)
                    )));
                }
                BlockKind::Container => {
                    let non_if = b.stmts.iter().find(|s| {
                        !matches!(
                            module.block(**s).map(|b| &b.kind),
                            Some(BlockKind::If)
                        )
                    });
                    if let Some(s) = non_if {
                        return Err(Error::malformed_structure(format!(
                            "Container branch {} is not an if block",
                            module.describe(*s)
                        )));
                    }
                }
                _ => (),
            },
            Stmt::Yield(y) if y.exprs.len() != module.out_ports.len() => {
                return Err(Error::malformed_structure(format!(
                    "Yield #{} emits {} values for {} output ports",
                    idx.index(),
                    y.exprs.len(),
                    module.out_ports.len()
                )));
            }
            Stmt::RegNext(r) if !module.regs.contains_key(&r.reg) => {
                return Err(Error::malformed_structure(format!(
                    "Assignment to undeclared register `{}'",
                    r.reg
                )));
            }
            Stmt::Variable(v) if !module.variables.contains_key(&v.var) => {
                return Err(Error::malformed_structure(format!(
                    "Assignment to undeclared variable `{}'",
                    v.var
                )));
            }
            _ => (),
        }
    }
    Ok(())
}
