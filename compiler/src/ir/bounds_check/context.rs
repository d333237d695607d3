//! Per-run state of the bounds-check pass and the per-function resolver
//! that the base, offset and size resolution rules are implemented on.

use super::defs::{DefIndex, DefShape};
use super::error::BoundsCheckError;
use crate::ir::{
    BinaryOp, CompareOp, IrBlockId, IrFunction, IrFunctionId, IrGlobal, IrGlobalId, IrId,
    IrInstruction, IrPhiNode, IrType, IrValue,
};
use fxhash::FxHashMap;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;

/// An offset or capacity: folded at compile time, or held in a register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedValue {
    Const(i32),
    Runtime(IrId),
}

impl ResolvedValue {
    pub fn as_const(&self) -> Option<i32> {
        match self {
            ResolvedValue::Const(n) => Some(*n),
            ResolvedValue::Runtime(_) => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, ResolvedValue::Const(0))
    }
}

impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Const(n) => write!(f, "{}", n),
            ResolvedValue::Runtime(reg) => write!(f, "{}", reg),
        }
    }
}

/// Shape of a register as seen by offset resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Element access directly on its base definition
    DirectAccess { ptr: IrId, index: IrId },
    /// Element access on another access or on a merge point
    ChainedAccess { ptr: IrId, index: IrId },
    /// Phi node
    Merge { block: IrBlockId },
    /// Anything else, including bare base definitions
    Other,
}

/// Memoized offsets and sizes of one function, keyed by register
#[derive(Debug, Default)]
pub struct FunctionCaches {
    pub offsets: FxHashMap<IrId, ResolvedValue>,
    pub sizes: FxHashMap<IrId, ResolvedValue>,
}

/// Pointer parameter -> register carrying its capacity
#[derive(Debug, Default)]
pub struct ParameterSizeMap {
    sizes: FxHashMap<(IrFunctionId, IrId), IrId>,
}

impl ParameterSizeMap {
    pub fn insert(&mut self, function: IrFunctionId, param: IrId, size: IrId) {
        self.sizes.insert((function, param), size);
    }

    /// Size register of a pointer parameter
    pub fn get(&self, function: IrFunctionId, param: IrId) -> Option<IrId> {
        self.sizes.get(&(function, param)).copied()
    }

    /// Pointer parameter whose capacity `size` carries
    pub fn param_for_size(&self, function: IrFunctionId, size: IrId) -> Option<IrId> {
        self.sizes
            .iter()
            .find(|((func, _), reg)| *func == function && **reg == size)
            .map(|((_, param), _)| *param)
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    pub fn clear(&mut self) {
        self.sizes.clear();
    }
}

/// Size-extended replacement of a function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenSignature {
    pub new_id: IrFunctionId,
    /// Positions of pointer parameters in the original signature
    pub pointer_positions: Vec<usize>,
}

/// Original function -> its replacement, in rewrite order
#[derive(Debug, Default)]
pub struct FunctionSignatureRewrite {
    replacements: IndexMap<IrFunctionId, RewrittenSignature>,
}

impl FunctionSignatureRewrite {
    pub fn insert(&mut self, old: IrFunctionId, rewritten: RewrittenSignature) {
        self.replacements.insert(old, rewritten);
    }

    pub fn get(&self, old: IrFunctionId) -> Option<&RewrittenSignature> {
        self.replacements.get(&old)
    }

    pub fn contains(&self, old: IrFunctionId) -> bool {
        self.replacements.contains_key(&old)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IrFunctionId, &RewrittenSignature)> {
        self.replacements.iter()
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    pub fn clear(&mut self) {
        self.replacements.clear();
    }
}

/// Whole-program state of one instrumentation run
#[derive(Debug, Default)]
pub struct RunContext {
    pub caches: FxHashMap<IrFunctionId, FunctionCaches>,
    pub param_sizes: ParameterSizeMap,
    pub rewrites: FunctionSignatureRewrite,
    pub sites: FxHashMap<IrFunctionId, Vec<IrId>>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.caches.clear();
        self.param_sizes.clear();
        self.rewrites.clear();
        self.sites.clear();
    }
}

/// Resolution state for one function: the body being instrumented, its
/// caches, and the module-level facts the rules consult.
pub struct FunctionResolver<'a> {
    pub(super) func: &'a mut IrFunction,
    pub(super) globals: &'a HashMap<IrGlobalId, IrGlobal>,
    pub(super) caches: &'a mut FunctionCaches,
    pub(super) param_sizes: &'a ParameterSizeMap,
    pub(super) defs: DefIndex,
    pub(super) inserted: usize,
}

impl<'a> FunctionResolver<'a> {
    pub fn new(
        func: &'a mut IrFunction,
        globals: &'a HashMap<IrGlobalId, IrGlobal>,
        caches: &'a mut FunctionCaches,
        param_sizes: &'a ParameterSizeMap,
    ) -> Self {
        let defs = DefIndex::new(func);
        Self {
            func,
            globals,
            caches,
            param_sizes,
            defs,
            inserted: 0,
        }
    }

    pub fn function(&self) -> &IrFunction {
        self.func
    }

    /// Instructions and phis inserted through this resolver so far
    pub fn inserted(&self) -> usize {
        self.inserted
    }

    pub fn cached_offset(&self, node: IrId) -> Option<ResolvedValue> {
        self.caches.offsets.get(&node).copied()
    }

    pub fn cached_size(&self, base: IrId) -> Option<ResolvedValue> {
        self.caches.sizes.get(&base).copied()
    }

    pub(super) fn is_merge(&self, reg: IrId) -> bool {
        self.defs.is_merge(reg)
    }

    /// Integer value of a register defined by a `Const`
    pub(super) fn const_value(&self, reg: IrId) -> Option<i32> {
        match self.defs.shape(reg)? {
            DefShape::Const(value) => value,
            _ => None,
        }
    }

    pub(super) fn value_of(&self, reg: IrId) -> ResolvedValue {
        match self.const_value(reg) {
            Some(n) => ResolvedValue::Const(n),
            None => ResolvedValue::Runtime(reg),
        }
    }

    /// Incoming edges of the phi `dest` in `block`
    pub(super) fn phi_incoming(&self, block: IrBlockId, dest: IrId) -> Vec<(IrBlockId, IrId)> {
        self.func
            .cfg
            .get_block(block)
            .and_then(|b| b.phi(dest))
            .map(|phi| phi.incoming.clone())
            .unwrap_or_default()
    }

    /// Add an empty `i32` phi to `block`, to be wired once its inputs are resolved
    pub(super) fn placeholder_phi(&mut self, block: IrBlockId) -> IrId {
        let dest = self.func.alloc_typed_reg(IrType::I32);
        if let Some(b) = self.func.cfg.get_block_mut(block) {
            b.add_phi(IrPhiNode {
                dest,
                incoming: Vec::new(),
                ty: IrType::I32,
            });
            self.defs.record_phi(block, dest);
            self.inserted += 1;
        }
        dest
    }

    pub(super) fn wire_phi(&mut self, block: IrBlockId, dest: IrId, incoming: Vec<(IrBlockId, IrId)>) {
        if let Some(phi) = self.func.cfg.get_block_mut(block).and_then(|b| b.phi_mut(dest)) {
            phi.incoming = incoming;
        }
    }

    /// Register holding `value` as an `i32`. Instructions needed to produce
    /// it are pushed onto `pending` for the caller to place.
    pub fn operand(&mut self, value: ResolvedValue, pending: &mut Vec<IrInstruction>) -> IrId {
        match value {
            ResolvedValue::Const(n) => {
                let dest = self.func.alloc_typed_reg(IrType::I32);
                pending.push(IrInstruction::Const {
                    dest,
                    value: IrValue::I32(n),
                });
                dest
            }
            ResolvedValue::Runtime(reg) => match self.func.register_type(reg).cloned() {
                Some(ty) if ty.is_integer() && ty.size() > 4 => self.narrow_checked(reg, ty, pending),
                Some(ty) if ty.is_integer() && ty != IrType::I32 => self.cast(reg, ty, IrType::I32, pending),
                _ => reg,
            },
        }
    }

    fn cast(&mut self, src: IrId, from_ty: IrType, to_ty: IrType, pending: &mut Vec<IrInstruction>) -> IrId {
        let dest = self.func.alloc_typed_reg(to_ty.clone());
        pending.push(IrInstruction::Cast {
            dest,
            src,
            from_ty,
            to_ty,
        });
        dest
    }

    /// Narrow a 64-bit `reg` to `i32`. A value that does not survive the
    /// narrowing gets its sign bit set, so it still fails the check.
    ///
    /// ```text
    ///   $t    = cast i64 $reg to i32
    ///   $back = cast i32 $t to i64
    ///   $lost = cmp ne $reg, $back
    ///   $bit  = cast bool $lost to i32
    ///   $sign = shl $bit, 31
    ///   $out  = or $t, $sign
    /// ```
    fn narrow_checked(&mut self, reg: IrId, ty: IrType, pending: &mut Vec<IrInstruction>) -> IrId {
        let truncated = self.cast(reg, ty.clone(), IrType::I32, pending);
        let back = self.cast(truncated, IrType::I32, ty, pending);
        let lost = self.func.alloc_typed_reg(IrType::Bool);
        pending.push(IrInstruction::Cmp {
            dest: lost,
            op: CompareOp::Ne,
            left: reg,
            right: back,
        });
        let bit = self.cast(lost, IrType::Bool, IrType::I32, pending);
        let shift = self.func.alloc_typed_reg(IrType::I32);
        pending.push(IrInstruction::Const {
            dest: shift,
            value: IrValue::I32(31),
        });
        let sign = self.binop(BinaryOp::Shl, bit, shift, pending);
        self.binop(BinaryOp::Or, truncated, sign, pending)
    }

    fn binop(&mut self, op: BinaryOp, left: IrId, right: IrId, pending: &mut Vec<IrInstruction>) -> IrId {
        let dest = self.func.alloc_typed_reg(IrType::I32);
        pending.push(IrInstruction::BinOp { dest, op, left, right });
        dest
    }

    /// Place `insts` immediately before the instruction defining `anchor`
    pub fn insert_before(&mut self, anchor: IrId, insts: Vec<IrInstruction>) -> Result<(), BoundsCheckError> {
        if insts.is_empty() {
            return Ok(());
        }
        let count = insts.len();
        let block = self
            .defs
            .block(anchor)
            .ok_or_else(|| self.site_not_found(anchor))?;
        for inst in &insts {
            self.defs.record_inst(block, inst);
        }
        let placed = self
            .func
            .cfg
            .get_block_mut(block)
            .is_some_and(|b| b.insert_before(anchor, insts));
        if !placed {
            return Err(self.site_not_found(anchor));
        }
        self.inserted += count;
        Ok(())
    }

    /// Place `insts` at `index` in `block`
    pub(super) fn insert_at(&mut self, block: IrBlockId, index: usize, insts: Vec<IrInstruction>) {
        if let Some(b) = self.func.cfg.get_block_mut(block) {
            let index = index.min(b.instructions.len());
            for inst in &insts {
                self.defs.record_inst(block, inst);
            }
            self.inserted += insts.len();
            b.instructions.splice(index..index, insts);
        }
    }

    /// `value` as an `i32` register available at the end of `block`
    pub(super) fn operand_at_end(
        &mut self,
        block: IrBlockId,
        value: ResolvedValue,
        site: IrId,
    ) -> Result<IrId, BoundsCheckError> {
        let mut pending = Vec::new();
        let reg = self.operand(value, &mut pending);
        if pending.is_empty() {
            return Ok(reg);
        }
        let count = pending.len();
        let Some(b) = self.func.cfg.get_block_mut(block) else {
            return Err(self.site_not_found(site));
        };
        for inst in &pending {
            self.defs.record_inst(block, inst);
        }
        b.instructions.extend(pending);
        self.inserted += count;
        Ok(reg)
    }

    /// Redirect every use of `old` to `new` in the body and the index
    pub fn replace_all_uses(&mut self, old: IrId, new: IrId) -> usize {
        self.defs.replace_uses(old, new);
        self.func.replace_all_uses(old, new)
    }

    pub(super) fn site_not_found(&self, site: IrId) -> BoundsCheckError {
        BoundsCheckError::SiteNotFound {
            function: self.func.name.clone(),
            site,
        }
    }

    pub(super) fn unresolved(&self, base: IrId) -> BoundsCheckError {
        BoundsCheckError::UnresolvedSize {
            function: self.func.name.clone(),
            site: None,
            base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_size_map_lookups() {
        let mut map = ParameterSizeMap::default();
        map.insert(IrFunctionId(1), IrId::new(0), IrId::new(4));
        map.insert(IrFunctionId(2), IrId::new(0), IrId::new(5));

        assert_eq!(map.get(IrFunctionId(1), IrId::new(0)), Some(IrId::new(4)));
        assert_eq!(map.get(IrFunctionId(1), IrId::new(1)), None);
        assert_eq!(map.param_for_size(IrFunctionId(2), IrId::new(5)), Some(IrId::new(0)));
        assert_eq!(map.param_for_size(IrFunctionId(1), IrId::new(5)), None);

        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn test_resolved_value() {
        assert!(ResolvedValue::Const(0).is_zero());
        assert!(!ResolvedValue::Runtime(IrId::new(0)).is_zero());
        assert_eq!(ResolvedValue::Const(7).as_const(), Some(7));
        assert_eq!(ResolvedValue::Runtime(IrId::new(3)).to_string(), "$3");
    }

    #[test]
    fn test_inserted_code_is_indexed() {
        use crate::ir::{FunctionSignatureBuilder, IrBuilder};

        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let id = builder.start_function("f".to_string(), FunctionSignatureBuilder::new().build());
        let ten = builder.build_int(10, IrType::I32).unwrap();
        let arr = builder.build_alloc(IrType::I32, Some(ten)).unwrap();
        let elem = builder.build_gep(arr, vec![ten], IrType::I32).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();

        let globals = HashMap::new();
        let mut caches = FunctionCaches::default();
        let sizes = ParameterSizeMap::default();
        let func = builder.module.functions.get_mut(&id).unwrap();
        let entry = func.entry_block();
        let mut resolver = FunctionResolver::new(func, &globals, &mut caches, &sizes);

        let mut pending = Vec::new();
        let four = resolver.operand(ResolvedValue::Const(4), &mut pending);
        resolver.insert_before(elem, pending).unwrap();
        assert_eq!(resolver.const_value(four), Some(4));
        assert_eq!(resolver.defs.block(four), Some(entry));

        let phi = resolver.placeholder_phi(entry);
        assert!(resolver.is_merge(phi));

        resolver.replace_all_uses(ten, four);
        assert_eq!(resolver.classify(elem), NodeKind::DirectAccess { ptr: arr, index: four });
        assert_eq!(resolver.inserted(), 2);
    }

    #[test]
    fn test_run_context_clear() {
        let mut ctx = RunContext::new();
        ctx.caches
            .entry(IrFunctionId(0))
            .or_default()
            .offsets
            .insert(IrId::new(1), ResolvedValue::Const(2));
        ctx.sites.insert(IrFunctionId(0), vec![IrId::new(1)]);
        ctx.rewrites.insert(
            IrFunctionId(0),
            RewrittenSignature {
                new_id: IrFunctionId(3),
                pointer_positions: vec![0],
            },
        );
        ctx.clear();
        assert!(ctx.caches.is_empty());
        assert!(ctx.sites.is_empty());
        assert!(ctx.rewrites.is_empty());
    }
}
