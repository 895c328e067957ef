//! Runs the lowering passes over a module and collects their results.
use crate::analysis::{CondTable, STATE_REG, TransitionGraph};
use crate::aspects::{
    Aspect, BlockConditions, Input, LowerCtx, Output, RegEn, StateTransition,
    Variable,
};
use crate::passes::{CBlockDriver, Scheduler, SimplifyConditions, StateFinder};
use crate::traversal::{ConstructPass, Named, ParseVal, PassOpt};
use gearc_ir::{
    self as ir, AssignValue, CombBlock, DType, HdlBlock, HdlStmt, Id, Printer,
    RegDef,
};
use gearc_utils::GearResult;
use linked_hash_map::LinkedHashMap;
use std::time::Instant;

/// The lowered form of a module handed to code generation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Lowered {
    /// The module with block ids and register contexts filled in.
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub module: ir::Module,
    pub max_state: u32,
    /// Registers of the module, plus the state register when there is more
    /// than one state.
    pub regs: LinkedHashMap<Id, RegDef>,
    /// One lowered tree per aspect, in lowering order.
    pub aspects: LinkedHashMap<&'static str, CombBlock>,
    #[cfg_attr(feature = "serialize", serde(skip))]
    pub transitions: TransitionGraph,
}

impl Lowered {
    pub fn aspect(&self, name: &str) -> Option<&CombBlock> {
        self.aspects.get(name)
    }

    /// The materialized block conditions.
    pub fn conditions(&self) -> Vec<&AssignValue> {
        self.aspects
            .get(BlockConditions::name())
            .map(|b| b.assigns())
            .unwrap_or_default()
    }

    #[cfg(feature = "serialize")]
    pub fn to_json(&self) -> GearResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| gearc_utils::Error::misc(e.to_string()))
    }
}

/// Runs `pass` and reports how long it took.
fn timed<T, F>(name: &str, pass: F) -> GearResult<T>
where
    F: FnOnce() -> GearResult<T>,
{
    let start = Instant::now();
    let out = pass()?;
    let elapsed = start.elapsed();
    // Warn if pass takes more than 5 seconds.
    if elapsed.as_secs() > 5 {
        log::warn!("{name}: {}ms", elapsed.as_millis());
    } else {
        log::info!("{name}: {}ms", elapsed.as_millis());
    }
    Ok(out)
}

/// Schedules a module, assigns its states and lowers it once per aspect.
pub struct Pipeline {
    /// Check that every state is reachable.
    pub validate: bool,
    extra_opts: Vec<String>,
}

impl Named for Pipeline {
    fn name() -> &'static str {
        "lower"
    }

    fn description() -> &'static str {
        "schedule a module and lower it to per-aspect statement trees"
    }

    fn opts() -> Vec<PassOpt> {
        vec![PassOpt::new(
            "validate",
            "check that every state is reachable from the reset state",
            ParseVal::Bool(true),
            PassOpt::parse_bool,
        )]
    }
}

impl ConstructPass for Pipeline {
    fn from(extra_opts: &[String]) -> GearResult<Self> {
        let opts = Self::get_opts(extra_opts);
        Ok(Pipeline {
            validate: opts["validate"].bool(),
            extra_opts: extra_opts.to_vec(),
        })
    }
}

/// Lower `module` with the options in `extra_opts`, given as
/// `<pass>:<option>[=<value>]` strings.
pub fn compile(module: ir::Module, extra_opts: &[String]) -> GearResult<Lowered> {
    <Pipeline as ConstructPass>::from(extra_opts)?.run(module)
}

fn lower<A: Aspect>(
    aspect: &mut A,
    ctx: &mut LowerCtx,
    aspects: &mut LinkedHashMap<&'static str, CombBlock>,
) -> GearResult<()> {
    let comb = timed(A::name(), || CBlockDriver::run(aspect, ctx))?;
    aspects.insert(A::name(), comb);
    Ok(())
}

impl Pipeline {
    pub fn run(&self, mut module: ir::Module) -> GearResult<Lowered> {
        let scheduler = <Scheduler as ConstructPass>::from(&self.extra_opts)?;
        let simplifier =
            <SimplifyConditions as ConstructPass>::from(&self.extra_opts)?;

        let mut schedule = timed(Scheduler::name(), || scheduler.run(&module))?;
        let max_state = timed(StateFinder::name(), || {
            Ok(StateFinder.run(&mut module, &mut schedule))
        })?;
        log::debug!("numbered control tree:\n{}", Printer::module_to_str(&module));
        if scheduler.dump {
            log::info!("{}", Printer::schedule_to_str(&module, &schedule));
        }
        let conds = CondTable::new(&module, &schedule, max_state)?;

        let mut ctx = LowerCtx::new(&module, &schedule, &conds);
        let mut aspects = LinkedHashMap::new();
        lower(&mut RegEn, &mut ctx, &mut aspects)?;
        lower(&mut Variable::default(), &mut ctx, &mut aspects)?;
        lower(&mut Output, &mut ctx, &mut aspects)?;
        lower(&mut Input, &mut ctx, &mut aspects)?;
        let mut states = StateTransition::new(max_state);
        lower(&mut states, &mut ctx, &mut aspects)?;
        if self.validate {
            states.graph.validate()?;
        }

        let mut captured = BlockConditions::new(ctx.used().clone());
        CBlockDriver::run(&mut captured, &mut ctx)?;
        let mut conditions = captured.finish(&ctx);
        timed(SimplifyConditions::name(), || {
            let mut trees = aspects.iter_mut().map(|(_, b)| b).collect::<Vec<_>>();
            simplifier.run(&mut conditions, &mut trees);
            Ok(())
        })?;
        aspects.insert(
            BlockConditions::name(),
            HdlBlock::with_stmts(
                None,
                conditions.into_iter().map(HdlStmt::Assign).collect(),
            ),
        );

        let mut regs = module.regs.clone();
        if max_state > 0 {
            let name = Id::from(STATE_REG);
            regs.insert(
                name,
                RegDef {
                    name,
                    dtype: DType::uint(conds.state_width()),
                    init: 0,
                },
            );
        }
        Ok(Lowered {
            module,
            max_state,
            regs,
            aspects,
            transitions: states.graph,
        })
    }
}
