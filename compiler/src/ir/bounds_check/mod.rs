//! Bounds Check Instrumentation Pass
//!
//! Inserts a runtime check in front of every single-index element access:
//!
//! ```text
//!   $off = <element offset of $elem from its base allocation>
//!   $cap = <element capacity of that allocation>
//!   call __coco_check_bounds($off, $cap)
//!   $elem = gep i32 $ptr, [$i]
//! ```
//!
//! Offsets and capacities are traced through chained accesses and phi nodes.
//! Pointers that cross function boundaries carry their capacity in an extra
//! `i32` parameter: every function taking pointers is replaced by a version
//! with one size parameter per pointer parameter, and every call to it passes
//! the capacities of its pointer arguments.
//!
//! The pass runs in fixed phases: collect sites, rewrite signatures, emit
//! checks, rewrite calls, clean up.

mod base;
mod config;
mod context;
mod defs;
mod error;
mod offset;
mod signature;
mod size;

pub use base::{classify_base, resolve_base, BaseDefinition};
pub use config::{BoundsCheckConfig, UnresolvedSizePolicy};
pub use context::{
    FunctionCaches, FunctionResolver, FunctionSignatureRewrite, NodeKind, ParameterSizeMap,
    ResolvedValue, RewrittenSignature, RunContext,
};
pub use defs::{DefIndex, DefShape};
pub use error::BoundsCheckError;
pub use signature::SignatureRewriter;

use super::dump::dump_module;
use super::optimization::{OptimizationPass, OptimizationResult, PassError};
use super::{FunctionSignatureBuilder, IrFunctionId, IrId, IrInstruction, IrModule, IrType};
use fxhash::FxHashSet;
use log::{debug, log_enabled, trace, warn, Level};
use std::collections::HashMap;

const PASS_NAME: &str = "BoundsCheckInstrumentation";

/// Phases of one instrumentation run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    CollectSites,
    RewriteSignatures,
    EmitChecks,
    RewriteCalls,
    Cleanup,
}

impl Phase {
    fn next(self) -> Option<Phase> {
        match self {
            Phase::CollectSites => Some(Phase::RewriteSignatures),
            Phase::RewriteSignatures => Some(Phase::EmitChecks),
            Phase::EmitChecks => Some(Phase::RewriteCalls),
            Phase::RewriteCalls => Some(Phase::Cleanup),
            Phase::Cleanup => None,
        }
    }
}

/// Counters of one instrumentation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentationStats {
    pub checks_inserted: usize,
    pub sites_skipped: usize,
    pub functions_rewritten: usize,
    pub calls_rewritten: usize,
    /// Checks, offset arithmetic, synthesized phis and replacement calls
    pub instructions_inserted: usize,
    /// Superseded calls erased during cleanup
    pub instructions_eliminated: usize,
}

impl InstrumentationStats {
    fn into_result(self) -> OptimizationResult {
        let mut stats = HashMap::new();
        stats.insert("checks_inserted".to_string(), self.checks_inserted);
        stats.insert("functions_rewritten".to_string(), self.functions_rewritten);
        stats.insert("calls_rewritten".to_string(), self.calls_rewritten);
        stats.insert("sites_skipped".to_string(), self.sites_skipped);

        OptimizationResult {
            modified: self.checks_inserted > 0,
            instructions_inserted: self.instructions_inserted,
            instructions_eliminated: self.instructions_eliminated,
            stats,
        }
    }
}

/// Array bounds-check instrumentation over a whole module
#[derive(Debug, Clone, Default)]
pub struct BoundsCheckPass {
    config: BoundsCheckConfig,
}

impl BoundsCheckPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BoundsCheckConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BoundsCheckConfig {
        &self.config
    }

    /// Instrument every element access in `module`.
    ///
    /// The module is mutated in place; on error it is left partially
    /// instrumented.
    pub fn instrument(&self, module: &mut IrModule) -> Result<InstrumentationStats, BoundsCheckError> {
        let mut ctx = RunContext::new();
        let mut stats = InstrumentationStats::default();

        let mut phase = Some(Phase::CollectSites);
        while let Some(current) = phase {
            debug!("{}: {:?} on {}", PASS_NAME, current, module.name);
            match current {
                Phase::CollectSites => self.collect_sites(module, &mut ctx),
                Phase::RewriteSignatures => self.rewrite_signatures(module, &mut ctx, &mut stats)?,
                Phase::EmitChecks => self.emit_checks(module, &mut ctx, &mut stats)?,
                Phase::RewriteCalls => self.rewrite_calls(module, &mut ctx, &mut stats)?,
                Phase::Cleanup => self.cleanup(module, &mut ctx, &mut stats),
            }
            phase = current.next();
        }

        debug!(
            "{}: {} check(s), {} skipped, {} function(s) and {} call(s) rewritten",
            PASS_NAME,
            stats.checks_inserted,
            stats.sites_skipped,
            stats.functions_rewritten,
            stats.calls_rewritten
        );
        Ok(stats)
    }

    fn collect_sites(&self, module: &IrModule, ctx: &mut RunContext) {
        for (id, func) in &module.functions {
            let sites: Vec<IrId> = func
                .cfg
                .block_ids()
                .into_iter()
                .filter_map(|block| func.cfg.get_block(block))
                .flat_map(|block| block.instructions.iter())
                .filter(|inst| inst.is_single_index_gep())
                .filter_map(|inst| inst.dest())
                .collect();
            if !sites.is_empty() {
                trace!("{}: {} access site(s)", func.name, sites.len());
                ctx.sites.insert(*id, sites);
            }
        }
    }

    fn rewrite_signatures(
        &self,
        module: &mut IrModule,
        ctx: &mut RunContext,
        stats: &mut InstrumentationStats,
    ) -> Result<(), BoundsCheckError> {
        let rewriter = SignatureRewriter::new(&self.config.entry_function);
        let func_ids: Vec<IrFunctionId> = module.functions.keys().copied().collect();

        for id in func_ids {
            let Some(rewritten) = rewriter.maybe_rewrite(module, id, &mut ctx.param_sizes)? else {
                continue;
            };
            if let Some(sites) = ctx.sites.remove(&id) {
                ctx.sites.insert(rewritten.new_id, sites);
            }
            ctx.rewrites.insert(id, rewritten);
            stats.functions_rewritten += 1;
        }
        Ok(())
    }

    fn emit_checks(
        &self,
        module: &mut IrModule,
        ctx: &mut RunContext,
        stats: &mut InstrumentationStats,
    ) -> Result<(), BoundsCheckError> {
        if ctx.sites.is_empty() {
            return Ok(());
        }

        let check_fn = module.get_or_insert_extern(
            &self.config.check_function,
            FunctionSignatureBuilder::new()
                .param("offset", IrType::I32)
                .param("capacity", IrType::I32)
                .build(),
        );

        let func_ids: Vec<IrFunctionId> = module.functions.keys().copied().collect();
        let IrModule {
            functions, globals, ..
        } = module;

        for id in func_ids {
            let Some(sites) = ctx.sites.get(&id) else {
                continue;
            };
            let func = functions
                .get_mut(&id)
                .ok_or(BoundsCheckError::MissingFunction(id))?;
            let caches = ctx.caches.entry(id).or_default();
            let mut resolver = FunctionResolver::new(func, globals, caches, &ctx.param_sizes);

            for &site in sites {
                match Self::instrument_site(&mut resolver, site, check_fn) {
                    Ok(()) => stats.checks_inserted += 1,
                    Err(err)
                        if err.is_unresolved_size()
                            && self.config.on_unresolved_size == UnresolvedSizePolicy::SkipSite =>
                    {
                        warn!("{}: leaving access unchecked: {}", PASS_NAME, err.at_site(site));
                        stats.sites_skipped += 1;
                    }
                    Err(err) => return Err(err.at_site(site)),
                }
            }
            stats.instructions_inserted += resolver.inserted();
        }
        Ok(())
    }

    fn instrument_site(
        resolver: &mut FunctionResolver<'_>,
        site: IrId,
        check_fn: IrFunctionId,
    ) -> Result<(), BoundsCheckError> {
        let offset = resolver.resolve_offset(site)?;
        let base = resolver.resolve_base(site);
        let size = resolver.resolve_size(base)?;
        trace!(
            "{}: check {} (base {}) offset {} capacity {}",
            resolver.function().name,
            site,
            base,
            offset,
            size
        );

        let mut pending = Vec::with_capacity(3);
        let offset = resolver.operand(offset, &mut pending);
        let capacity = resolver.operand(size, &mut pending);
        pending.push(IrInstruction::CallDirect {
            dest: None,
            func_id: check_fn,
            args: vec![offset, capacity],
        });
        resolver.insert_before(site, pending)
    }

    fn rewrite_calls(
        &self,
        module: &mut IrModule,
        ctx: &mut RunContext,
        stats: &mut InstrumentationStats,
    ) -> Result<(), BoundsCheckError> {
        if ctx.rewrites.is_empty() {
            return Ok(());
        }

        let func_ids: Vec<IrFunctionId> = module.functions.keys().copied().collect();
        let IrModule {
            functions, globals, ..
        } = module;

        for id in func_ids {
            let func = functions
                .get_mut(&id)
                .ok_or(BoundsCheckError::MissingFunction(id))?;
            let caches = ctx.caches.entry(id).or_default();
            let mut resolver = FunctionResolver::new(func, globals, caches, &ctx.param_sizes);

            for block_id in resolver.function().cfg.block_ids() {
                let mut index = 0;
                loop {
                    let Some(inst) = resolver
                        .function()
                        .cfg
                        .get_block(block_id)
                        .and_then(|block| block.instructions.get(index))
                    else {
                        break;
                    };
                    let IrInstruction::CallDirect { dest, func_id, args } = inst else {
                        index += 1;
                        continue;
                    };
                    let (old_dest, callee, args) = (*dest, *func_id, args.clone());
                    let Some(rewritten) = ctx.rewrites.get(callee) else {
                        index += 1;
                        continue;
                    };

                    let mut pending = Vec::new();
                    let mut new_args = args.clone();
                    for &pos in &rewritten.pointer_positions {
                        let Some(&arg) = args.get(pos) else {
                            continue;
                        };
                        let base = resolver.resolve_base(arg);
                        let size = resolver.resolve_size(base).map_err(|err| err.at_site(arg))?;
                        new_args.push(resolver.operand(size, &mut pending));
                    }

                    let new_dest = old_dest.map(|old| {
                        let ty = resolver
                            .function()
                            .register_type(old)
                            .cloned()
                            .unwrap_or(IrType::Void);
                        resolver.func.alloc_typed_reg(ty)
                    });
                    trace!(
                        "{}: call {} -> {} with {} argument(s)",
                        resolver.function().name,
                        callee,
                        rewritten.new_id,
                        new_args.len()
                    );
                    pending.push(IrInstruction::CallDirect {
                        dest: new_dest,
                        func_id: rewritten.new_id,
                        args: new_args,
                    });

                    let count = pending.len();
                    resolver.insert_at(block_id, index, pending);
                    if let (Some(old), Some(new)) = (old_dest, new_dest) {
                        resolver.replace_all_uses(old, new);
                    }
                    stats.calls_rewritten += 1;
                    index += count + 1;
                }
            }
            stats.instructions_inserted += resolver.inserted();
        }
        Ok(())
    }

    fn cleanup(&self, module: &mut IrModule, ctx: &mut RunContext, stats: &mut InstrumentationStats) {
        let superseded: FxHashSet<IrFunctionId> = ctx.rewrites.iter().map(|(old, _)| *old).collect();
        let is_superseded = |inst: &IrInstruction| {
            matches!(inst, IrInstruction::CallDirect { func_id, .. } if superseded.contains(func_id))
        };

        // Detach every superseded call before erasing any of them
        for func in module.functions.values_mut() {
            for block in func.cfg.blocks.values_mut() {
                for inst in block.instructions.iter_mut().filter(|inst| is_superseded(inst)) {
                    inst.drop_all_references();
                }
            }
        }

        for func in module.functions.values_mut() {
            for block in func.cfg.blocks.values_mut() {
                let before = block.instructions.len();
                block.instructions.retain(|inst| !is_superseded(inst));
                stats.instructions_eliminated += before - block.instructions.len();
            }
        }

        ctx.clear();
    }
}

impl OptimizationPass for BoundsCheckPass {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run_on_module(&mut self, module: &mut IrModule) -> Result<OptimizationResult, PassError> {
        let stats = self.instrument(module)?;

        if self.config.verify_after {
            module.verify().map_err(|message| PassError::Verification {
                pass: PASS_NAME,
                message,
            })?;
        }
        if log_enabled!(Level::Trace) {
            trace!("{}: instrumented module\n{}", PASS_NAME, dump_module(module));
        }

        Ok(stats.into_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::optimization::PassManager;
    use crate::codegen::{InterpValue, MirInterpreter};
    use crate::ir::{CompareOp, IrBuilder, IrFunction, StructField};

    fn checks(func: &IrFunction, check_fn: IrFunctionId) -> Vec<Vec<IrId>> {
        func.cfg
            .block_ids()
            .into_iter()
            .flat_map(|id| func.cfg.blocks[&id].instructions.iter())
            .filter_map(|inst| match inst {
                IrInstruction::CallDirect { func_id, args, .. } if *func_id == check_fn => {
                    Some(args.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn check_fn(module: &IrModule) -> IrFunctionId {
        module.extern_by_name("__coco_check_bounds").unwrap().id
    }

    fn const_of(func: &IrFunction, reg: IrId) -> Option<i64> {
        match func.defining_inst(reg)? {
            IrInstruction::Const { value, .. } => value.as_i64(),
            _ => None,
        }
    }

    /// `fill(p: *i32, i: i32)` stores into `p[i]`; `main` calls it on a 10-element array
    fn interprocedural_module() -> IrModule {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new()
            .param("p", IrType::ptr(IrType::I32))
            .param("i", IrType::I32)
            .returns(IrType::I32)
            .build();
        let fill = builder.start_function("fill".to_string(), sig);
        let p = builder.param(0).unwrap();
        let i = builder.param(1).unwrap();
        let elem = builder.build_gep(p, vec![i], IrType::I32).unwrap();
        builder.build_store(elem, i).unwrap();
        builder.build_return(Some(i)).unwrap();
        builder.finish_function();

        let sig = FunctionSignatureBuilder::new().returns(IrType::I32).build();
        builder.start_function("main".to_string(), sig);
        let ten = builder.build_int(10, IrType::I32).unwrap();
        let arr = builder.build_alloc(IrType::I32, Some(ten)).unwrap();
        let three = builder.build_int(3, IrType::I32).unwrap();
        let result = builder.build_call_direct(fill, vec![arr, three]).unwrap();
        let doubled = builder.build_add(result, result).unwrap();
        builder.build_return(Some(doubled)).unwrap();
        builder.finish_function();
        builder.finish()
    }

    #[test]
    fn test_phases_run_in_order() {
        let mut phase = Some(Phase::CollectSites);
        let mut order = Vec::new();
        while let Some(current) = phase {
            order.push(current);
            phase = current.next();
        }
        assert_eq!(
            order,
            vec![
                Phase::CollectSites,
                Phase::RewriteSignatures,
                Phase::EmitChecks,
                Phase::RewriteCalls,
                Phase::Cleanup
            ]
        );
    }

    #[test]
    fn test_constant_access_is_checked() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        builder.start_function("f".to_string(), FunctionSignatureBuilder::new().build());
        let ten = builder.build_int(10, IrType::I32).unwrap();
        let arr = builder.build_alloc(IrType::I32, Some(ten)).unwrap();
        let four = builder.build_int(4, IrType::I32).unwrap();
        let elem = builder.build_gep(arr, vec![four], IrType::I32).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();
        let mut module = builder.finish();

        let stats = BoundsCheckPass::new().instrument(&mut module).unwrap();
        assert_eq!(stats.checks_inserted, 1);

        let check_fn = check_fn(&module);
        let func = module.function_by_name("f").unwrap();
        let calls = checks(func, check_fn);
        assert_eq!(calls.len(), 1);
        assert_eq!(const_of(func, calls[0][0]), Some(4));
        assert_eq!(const_of(func, calls[0][1]), Some(10));

        // the check sits immediately before the access
        let block = &func.cfg.blocks[&func.entry_block()];
        let at = block.position_of(elem).unwrap();
        assert!(matches!(
            &block.instructions[at - 1],
            IrInstruction::CallDirect { func_id, .. } if *func_id == check_fn
        ));
        assert!(module.verify().is_ok());
    }

    #[test]
    fn test_struct_and_multi_index_accesses_are_skipped() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        builder.start_function("f".to_string(), FunctionSignatureBuilder::new().build());
        let pair = IrType::Struct {
            name: "Pair".to_string(),
            fields: vec![
                StructField {
                    name: "a".to_string(),
                    ty: IrType::I32,
                    offset: 0,
                },
                StructField {
                    name: "b".to_string(),
                    ty: IrType::I32,
                    offset: 4,
                },
            ],
        };
        let record = builder.build_alloc(pair.clone(), None).unwrap();
        let zero = builder.build_int(0, IrType::I32).unwrap();
        builder.build_gep(record, vec![zero], pair).unwrap();
        let grid = builder.build_alloc(IrType::array(IrType::I32, 4), None).unwrap();
        builder.build_gep(grid, vec![zero, zero], IrType::I32).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();
        let mut module = builder.finish();

        let stats = BoundsCheckPass::new().instrument(&mut module).unwrap();
        assert_eq!(stats, InstrumentationStats::default());
        assert!(module.extern_by_name("__coco_check_bounds").is_none());
    }

    #[test]
    fn test_calls_pass_argument_capacities() {
        let mut module = interprocedural_module();
        let stats = BoundsCheckPass::new().instrument(&mut module).unwrap();
        assert_eq!(stats.functions_rewritten, 1);
        assert_eq!(stats.calls_rewritten, 1);
        assert_eq!(stats.instructions_eliminated, 1);

        let fill = module.function_by_name("fill").unwrap();
        assert_eq!(fill.signature.parameters.len(), 3);
        let size_param = fill.get_param_reg(2).unwrap();
        let calls = checks(fill, check_fn(&module));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![fill.get_param_reg(1).unwrap(), size_param]);

        let main = module.function_by_name("main").unwrap();
        let call = main
            .cfg
            .blocks
            .values()
            .flat_map(|b| b.instructions.iter())
            .find_map(|inst| match inst {
                IrInstruction::CallDirect { dest, func_id, args } if *func_id == fill.id => {
                    Some((*dest, args.clone()))
                }
                _ => None,
            })
            .unwrap();
        let (dest, args) = call;
        assert_eq!(args.len(), 3);
        assert_eq!(const_of(main, args[2]), Some(10));

        // only the replacement call remains and the result flows from it
        let calls_total = main
            .cfg
            .blocks
            .values()
            .flat_map(|b| b.instructions.iter())
            .filter(|inst| matches!(inst, IrInstruction::CallDirect { .. }))
            .count();
        assert_eq!(calls_total, 1);
        assert_eq!(main.use_count(dest.unwrap()), 2);
        assert!(module.verify().is_ok());
    }

    #[test]
    fn test_superseded_calls_feeding_each_other_are_erased() {
        // r1 = g(arr, 3); if r1 < 10 { r2 = g(arr, r1) }; r3 = g(arr, phi [r1, r2])
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new()
            .param("p", IrType::ptr(IrType::I32))
            .param("i", IrType::I32)
            .returns(IrType::I32)
            .build();
        let g = builder.start_function("g".to_string(), sig);
        let p = builder.param(0).unwrap();
        let i = builder.param(1).unwrap();
        let elem = builder.build_gep(p, vec![i], IrType::I32).unwrap();
        builder.build_store(elem, i).unwrap();
        builder.build_return(Some(i)).unwrap();
        builder.finish_function();

        let sig = FunctionSignatureBuilder::new().returns(IrType::I32).build();
        builder.start_function("main".to_string(), sig);
        let entry = builder.current_block().unwrap();
        let ten = builder.build_int(10, IrType::I32).unwrap();
        let arr = builder.build_alloc(IrType::I32, Some(ten)).unwrap();
        let three = builder.build_int(3, IrType::I32).unwrap();
        let r1 = builder.build_call_direct(g, vec![arr, three]).unwrap();
        let small = builder.build_cmp(CompareOp::Lt, r1, ten).unwrap();
        let then = builder.create_block().unwrap();
        let join = builder.create_block().unwrap();
        builder.build_cond_branch(small, then, join).unwrap();

        builder.switch_to_block(then);
        let r2 = builder.build_call_direct(g, vec![arr, r1]).unwrap();
        builder.build_branch(join).unwrap();

        builder.switch_to_block(join);
        let merged = builder.build_phi(join, IrType::I32).unwrap();
        builder.add_phi_incoming(join, merged, entry, r1).unwrap();
        builder.add_phi_incoming(join, merged, then, r2).unwrap();
        let r3 = builder.build_call_direct(g, vec![arr, merged]).unwrap();
        builder.build_return(Some(r3)).unwrap();
        builder.finish_function();
        let mut module = builder.finish();

        let stats = BoundsCheckPass::new().instrument(&mut module).unwrap();
        assert_eq!(stats.calls_rewritten, 3);
        assert_eq!(stats.instructions_eliminated, 3);

        let main = module.function_by_name("main").unwrap();
        for old in [r1, r2, r3] {
            assert_eq!(main.use_count(old), 0);
            assert!(main.definitions().all(|(reg, _)| reg != old));
        }
        assert!(module.verify().is_ok());

        let id = module.function_by_name("main").unwrap().id;
        let result = MirInterpreter::new().execute(&module, id, &[]);
        assert_eq!(result, Ok(InterpValue::Int(3)));
    }

    #[test]
    fn test_recursive_call_forwards_size_parameter() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new()
            .param("p", IrType::ptr(IrType::I32))
            .build();
        let walk = builder.start_function("walk".to_string(), sig);
        let p = builder.param(0).unwrap();
        builder.build_call_void(walk, vec![p]).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();
        let mut module = builder.finish();

        BoundsCheckPass::new().instrument(&mut module).unwrap();
        let func = module.function_by_name("walk").unwrap();
        let size_param = func.get_param_reg(1).unwrap();
        let block = &func.cfg.blocks[&func.entry_block()];
        assert_eq!(
            block.instructions,
            vec![IrInstruction::CallDirect {
                dest: None,
                func_id: func.id,
                args: vec![p, size_param],
            }]
        );
        assert!(module.verify().is_ok());
    }

    #[test]
    fn test_unresolved_size_halts_by_default() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        builder.start_function("f".to_string(), FunctionSignatureBuilder::new().build());
        let slot = builder.build_alloc(IrType::ptr(IrType::I32), None).unwrap();
        let loaded = builder.build_load(slot, IrType::ptr(IrType::I32)).unwrap();
        let one = builder.build_int(1, IrType::I32).unwrap();
        let elem = builder.build_gep(loaded, vec![one], IrType::I32).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();
        let module = builder.finish();

        let err = BoundsCheckPass::new().instrument(&mut module.clone()).unwrap_err();
        assert_eq!(
            err,
            BoundsCheckError::UnresolvedSize {
                function: "f".to_string(),
                site: Some(elem),
                base: loaded,
            }
        );

        let mut skipping = module;
        let config = BoundsCheckConfig::default().with_unresolved_size_policy(UnresolvedSizePolicy::SkipSite);
        let stats = BoundsCheckPass::with_config(config).instrument(&mut skipping).unwrap();
        assert_eq!(stats.checks_inserted, 0);
        assert_eq!(stats.sites_skipped, 1);
    }

    #[test]
    fn test_pass_manager_reports_stats() {
        let mut module = interprocedural_module();
        let mut manager = PassManager::new();
        manager.add_pass(BoundsCheckPass::with_config(
            BoundsCheckConfig::default().with_verification(true),
        ));

        let result = manager.run(&mut module).unwrap();
        assert!(result.modified);
        assert_eq!(result.stat("checks_inserted"), 1);
        assert_eq!(result.stat("functions_rewritten"), 1);
        assert_eq!(result.stat("calls_rewritten"), 1);
        assert_eq!(result.stat("sites_skipped"), 0);
    }

    #[test]
    fn test_pass_error_surfaces_through_manager() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new()
            .param("p", IrType::ptr(IrType::I32))
            .build();
        let callee = builder.start_function("callee".to_string(), sig);
        builder.build_return(None).unwrap();
        builder.finish_function();
        builder.start_function("caller".to_string(), FunctionSignatureBuilder::new().build());
        let slot = builder.build_alloc(IrType::ptr(IrType::I32), None).unwrap();
        let loaded = builder.build_load(slot, IrType::ptr(IrType::I32)).unwrap();
        builder.build_call_void(callee, vec![loaded]).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();
        let mut module = builder.finish();

        let mut manager = PassManager::new();
        manager.add_pass(BoundsCheckPass::new());
        let err = manager.run(&mut module).unwrap_err();
        assert!(matches!(
            err,
            PassError::BoundsCheck(BoundsCheckError::UnresolvedSize { base, .. }) if base == loaded
        ));
    }

    #[test]
    fn test_instrumentation_is_deterministic() {
        let mut first = interprocedural_module();
        let mut second = interprocedural_module();
        BoundsCheckPass::new().instrument(&mut first).unwrap();
        BoundsCheckPass::new().instrument(&mut second).unwrap();
        assert_eq!(dump_module(&first), dump_module(&second));
    }
}
