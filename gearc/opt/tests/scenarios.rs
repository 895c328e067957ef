use gearc_ir::{
    DType, Expr, HdlBlock, Id, Module, ModuleBuilder, Printer, Schedule,
    StmtIdx,
};
use gearc_opt::analysis::CondTable;
use gearc_opt::aspects::{Input, LowerCtx, StateTransition};
use gearc_opt::passes::{CBlockDriver, Scheduler, StateFinder};
use gearc_opt::pipeline::{self, Lowered};
use std::collections::HashSet;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn lit(v: i64) -> Expr {
    Expr::lit(v, DType::uint(8))
}

fn schedule(b: ModuleBuilder, stmts: Vec<StmtIdx>) -> (Module, Schedule, u32) {
    let mut module = b.finish(stmts).unwrap();
    let mut sched = Scheduler { dump: false }.run(&module).unwrap();
    let max_state = StateFinder.run(&mut module, &mut sched);
    (module, sched, max_state)
}

fn compile(b: ModuleBuilder, stmts: Vec<StmtIdx>) -> Lowered {
    init_logger();
    pipeline::compile(b.finish(stmts).unwrap(), &[]).unwrap()
}

fn tree(lowered: &Lowered, aspect: &str) -> String {
    Printer::hdl_to_str(lowered.aspect(aspect).unwrap())
}

fn is_cond_name(name: Id) -> bool {
    let name = name.as_str();
    name == "rst_cond"
        || name.starts_with("cycle_cond_block_")
        || name.starts_with("exit_cond_block_")
}

/// Every condition referenced by a lowered tree or by another condition is
/// defined among the materialized conditions.
fn assert_self_contained(lowered: &Lowered) {
    let defined = lowered
        .conditions()
        .iter()
        .map(|a| a.target)
        .collect::<HashSet<_>>();
    for (name, block) in lowered.aspects.iter() {
        let mut referenced = vec![];
        block.for_each_expr(&mut |e: &Expr| referenced.extend(e.signals()));
        for sig in referenced.into_iter().filter(|s| is_cond_name(*s)) {
            assert!(
                defined.contains(&sig),
                "`{sig}' used by {name} is not defined"
            );
        }
    }
}

#[test]
fn free_statements_follow_the_previous_yield() {
    let mut b = ModuleBuilder::new("top");
    b.add_out_port("dout", DType::uint(8));
    b.add_variable("x", DType::uint(8));
    let x1 = b.assign("x", lit(1));
    let y0 = b.emit(vec![lit(0)]);
    let x2 = b.assign("x", lit(2));
    let y1 = b.emit(vec![lit(1)]);
    let (module, sched, max_state) = schedule(b, vec![x1, y0, x2, y1]);
    assert_eq!(max_state, 1);
    assert_eq!(
        Printer::schedule_to_str(&module, &sched),
        "SeqCBlock: states: [0, 1], (Module)\n    \
         Leaf: state 0, [VariableStmt, Yield, VariableStmt]\n    \
         Leaf: state 1, [Yield]\n"
    );
}

#[test]
fn equal_branches_collapse() {
    let mut b = ModuleBuilder::new("top");
    b.add_out_port("dout", DType::uint(8));
    b.add_variable("x", DType::uint(8));
    let c = Expr::flag("c");
    let x1 = b.assign("x", lit(1));
    let then = b.if_block(c.clone(), vec![x1]);
    let x2 = b.assign("x", lit(1));
    let other = b.if_block(c.negate(), vec![x2]);
    let cont = b.container(vec![then, other]);
    let y = b.emit(vec![lit(0)]);
    let lowered = compile(b, vec![cont, y]);
    assert_eq!(tree(&lowered, "variables"), "x_v = 1;\n");
}

#[test]
fn reads_after_update_see_the_next_value() {
    let mut b = ModuleBuilder::new("top");
    b.add_out_port("dout", DType::uint(8));
    b.add_reg("acc", DType::uint(8), 0);
    b.add_variable("x", DType::uint(8));
    let upd = b.reg_next("acc", lit(3));
    let x = b.assign("x", b.read("acc").unwrap());
    let y = b.emit(vec![lit(0)]);
    let lowered = compile(b, vec![upd, x, y]);
    assert_eq!(tree(&lowered, "variables"), "x_v = acc_next;\n");
}

#[test]
fn nested_interface_transitions() {
    let mut b = ModuleBuilder::new("top");
    b.add_out_port("dout", DType::uint(8));
    b.add_in_port("din", DType::uint(8));
    let y0 = b.emit(vec![lit(0)]);
    let y1 = b.emit(vec![lit(1)]);
    let y2 = b.emit(vec![lit(2)]);
    let intf = b.intf_block("din", vec![y1, y2]);
    let lowered = compile(b, vec![y0, intf]);

    assert_eq!(lowered.max_state, 2);
    assert_eq!(lowered.transitions.edges, vec![(0, 1), (1, 2), (2, 0)]);
    let states = tree(&lowered, "state_transition");
    assert!(states.contains(
        "if (((state_reg == 1) || (state_reg == 2)) && din.valid) begin\n"
    ));
    assert!(states.contains(
        "  if (state_reg == 2) begin\n    \
             if (exit_cond_block_2) begin\n      \
               state_next = 0;\n      \
               state_en = 1;\n    \
             end\n  \
           end\n"
    ));
    assert_self_contained(&lowered);
}

/// The first block of `block`, in pre-order, guarded by `cond`.
fn guarded_by<'a>(block: &'a HdlBlock, cond: &str) -> Option<&'a HdlBlock> {
    if block.in_cond.as_ref().is_some_and(|c| c.to_string() == cond) {
        return Some(block);
    }
    block.blocks().find_map(|b| guarded_by(b, cond))
}

#[test]
fn state_copies_repeat_the_unit() {
    init_logger();
    let mut b = ModuleBuilder::new("top");
    b.add_out_port("dout", DType::uint(8));
    b.add_in_port("din", DType::uint(8));
    let y0 = b.emit(vec![lit(0)]);
    let y1 = b.emit(vec![lit(1)]);
    let y2 = b.emit(vec![lit(2)]);
    let intf = b.intf_block("din", vec![y2]);
    let lp = b.loop_block(Expr::flag("done"), vec![y1, intf]);
    // Module 0, Yield 1, Loop 2, Yield 3, IntfBlock 4, Yield 5
    let (module, sched, max_state) = schedule(b, vec![y0, lp]);
    assert_eq!(max_state, 2);
    let lp = sched.get(sched.root).child[1];
    let unit = sched.get(lp).child[1];
    assert_eq!(sched.get(lp).state_ids.as_slice(), &[1, 2]);
    assert_eq!(sched.get(unit).state_ids.as_slice(), &[2]);

    let conds = CondTable::new(&module, &sched, max_state).unwrap();
    let mut ctx = LowerCtx::new(&module, &sched, &conds);

    // The interface block acknowledges its transaction in both copies.
    let inputs = CBlockDriver::run(&mut Input, &mut ctx).unwrap();
    let copies = guarded_by(&inputs, "state_reg == 2").unwrap();
    assert_eq!(copies.stmts.len(), 2);
    for copy in copies.blocks() {
        assert_eq!(copy.in_cond, None);
        assert_eq!(
            Printer::hdl_to_str(copy),
            "if (din.valid) begin\n  \
               din.ready = exit_cond_block_4;\n\
             end\n"
        );
    }

    // Back to the top of the loop, unless the loop is done.
    let mut states = StateTransition::new(max_state);
    let trans = CBlockDriver::run(&mut states, &mut ctx).unwrap();
    assert_eq!(states.graph.edges, vec![(0, 1), (1, 2), (2, 1), (2, 0)]);
    let copies = guarded_by(&trans, "state_reg == 2").unwrap();
    assert!(copies.blocks().all(|c| c.in_cond.is_none()));
    assert_eq!(
        copies.blocks().map(Printer::hdl_to_str).collect::<Vec<_>>(),
        vec![
            "if (exit_cond_block_4) begin\n  state_next = 1;\n  state_en = 1;\nend\n",
            "if (exit_cond_block_2) begin\n  state_next = 0;\n  state_en = 1;\nend\n",
        ]
    );
}

#[test]
fn interface_block_leaves_to_the_next_unit() {
    let mut b = ModuleBuilder::new("top");
    b.add_out_port("dout", DType::uint(8));
    b.add_in_port("din", DType::uint(8));
    let y0 = b.emit(vec![lit(0)]);
    let y1 = b.emit(vec![lit(1)]);
    let y2 = b.emit(vec![lit(2)]);
    let intf = b.intf_block("din", vec![y1, y2]);
    let y3 = b.emit(vec![lit(3)]);
    let lowered = compile(b, vec![y0, intf, y3]);
    assert_eq!(lowered.max_state, 3);
    // No edge back into the interface block: it consumes one transaction.
    assert_eq!(
        lowered.transitions.edges,
        vec![(0, 1), (1, 2), (2, 3), (3, 0)]
    );
    assert_self_contained(&lowered);
}

#[test]
fn non_blocking_loop_is_rejected() {
    init_logger();
    let mut b = ModuleBuilder::new("top");
    b.add_out_port("dout", DType::uint(8));
    b.add_variable("x", DType::uint(8));
    let x = b.assign("x", lit(1));
    let lp = b.loop_block(Expr::flag("done"), vec![x]);
    let y = b.emit(vec![lit(0)]);
    let err = pipeline::compile(b.finish(vec![lp, y]).unwrap(), &[]).unwrap_err();
    assert!(matches!(err, gearc_utils::Error::MalformedControl(_)));
    assert!(err.message().contains("done"));
}

/// Accumulates one input transaction and emits the sum, then emits zero.
fn accumulator() -> Lowered {
    let mut b = ModuleBuilder::new("acc");
    b.add_reg("acc", DType::uint(8), 0);
    b.add_in_port("din", DType::uint(8));
    b.add_out_port("dout", DType::uint(8));
    let sum = Expr::binary(
        gearc_ir::BinOp::Add,
        b.read("acc").unwrap(),
        b.read("din").unwrap(),
    );
    let upd = b.reg_next("acc", sum);
    let y = b.emit(vec![b.read("acc").unwrap()]);
    let intf = b.intf_block("din", vec![upd, y]);
    let y0 = b.emit(vec![lit(0)]);
    compile(b, vec![intf, y0])
}

#[test]
fn accumulator_registers() {
    let lowered = accumulator();
    assert_eq!(lowered.max_state, 1);
    assert_eq!(
        lowered.regs.keys().map(|k| k.as_str()).collect::<Vec<_>>(),
        vec!["acc", "state"]
    );
    let state = lowered.regs.get(&Id::from("state")).unwrap();
    assert_eq!(state.dtype, DType::uint(1));
    assert_eq!(state.init, 0);
    assert_eq!(lowered.transitions.edges, vec![(0, 1), (1, 0)]);
}

#[test]
fn accumulator_trees() {
    let lowered = accumulator();
    assert_eq!(
        tree(&lowered, "register_next_state"),
        "acc_en = 0;\n\
         acc_next = acc_reg;\n\
         if ((state_reg == 0) && din.valid) begin\n  \
           acc_en = cycle_cond_block_2;\n  \
           acc_next = acc_reg + din_s;\n\
         end\n"
    );
    assert_eq!(
        tree(&lowered, "outputs"),
        "dout.valid = 0;\n\
         dout_s = acc_next;\n\
         if ((state_reg == 0) && din.valid) begin\n  \
           dout.valid = 1;\n\
         end\n\
         if (state_reg == 1) begin\n  \
           dout.valid = 1;\n  \
           dout_s = 0;\n\
         end\n"
    );
    assert!(tree(&lowered, "inputs").starts_with("din.ready = 0;\n"));
}

#[test]
fn accumulator_conditions() {
    let lowered = accumulator();
    let mut names = lowered
        .conditions()
        .iter()
        .map(|a| a.target.as_str().to_string())
        .collect::<Vec<_>>();
    names.sort();
    assert_eq!(
        names,
        vec![
            "cycle_cond_block_2",
            "exit_cond_block_0",
            "exit_cond_block_1",
            "exit_cond_block_2",
            "exit_cond_block_3",
            "rst_cond",
        ]
    );
    let exit = lowered
        .conditions()
        .into_iter()
        .find(|a| a.target.as_str() == "exit_cond_block_3")
        .and_then(|a| a.val.clone())
        .unwrap();
    assert_eq!(exit.to_string(), "dout.ready");
    assert_self_contained(&lowered);
}

#[test]
fn lowering_is_deterministic() {
    let a = accumulator();
    let b = accumulator();
    assert_eq!(a.aspects, b.aspects);
    assert_eq!(a.transitions, b.transitions);
}

#[test]
fn single_state_modules_have_no_state_register() {
    let mut b = ModuleBuilder::new("top");
    b.add_out_port("dout", DType::uint(8));
    b.add_reg("acc", DType::uint(8), 0);
    let upd = b.reg_next("acc", lit(1));
    let y = b.emit(vec![lit(0)]);
    let lowered = compile(b, vec![upd, y]);
    assert_eq!(lowered.max_state, 0);
    assert!(lowered.regs.get(&Id::from("state")).is_none());
    assert_eq!(tree(&lowered, "state_transition"), "");
    assert_self_contained(&lowered);
}
