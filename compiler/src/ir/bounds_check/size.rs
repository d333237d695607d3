//! Size resolution: the element capacity of the region behind a base definition.

use super::base::BaseDefinition;
use super::context::{FunctionResolver, ResolvedValue};
use super::error::BoundsCheckError;
use crate::ir::{IrBlockId, IrGlobalId, IrId, IrType};
use fxhash::FxHashSet;
use log::trace;

impl FunctionResolver<'_> {
    /// Element capacity of the region defined by `base`, memoized.
    ///
    /// Fails with `UnresolvedSize` when any region reachable through `base`
    /// has no traceable capacity; nothing is inserted in that case.
    pub fn resolve_size(&mut self, base: IrId) -> Result<ResolvedValue, BoundsCheckError> {
        if let Some(cached) = self.cached_size(base) {
            return Ok(cached);
        }
        let mut visiting = FxHashSet::default();
        if let Err(missing) = self.size_available(base, &mut visiting) {
            return Err(self.unresolved(missing));
        }
        self.build_size(base)
    }

    /// Check that every region reachable from `base` has a capacity.
    /// Reports the first base that does not.
    fn size_available(&self, base: IrId, visiting: &mut FxHashSet<IrId>) -> Result<(), IrId> {
        if self.caches.sizes.contains_key(&base) {
            return Ok(());
        }
        match self.classify_base(base) {
            BaseDefinition::Stack { .. } => Ok(()),
            BaseDefinition::Global(id) => self.global_len(id).map(|_| ()).ok_or(base),
            BaseDefinition::Param(_) => self
                .param_sizes
                .get(self.func.id, base)
                .map(|_| ())
                .ok_or(base),
            BaseDefinition::Merge(block) => {
                if !visiting.insert(base) {
                    return Ok(());
                }
                for (_, value) in self.phi_incoming(block, base) {
                    if value != base {
                        self.size_available(self.resolve_base(value), visiting)?;
                    }
                }
                Ok(())
            }
            BaseDefinition::Unknown => Err(base),
        }
    }

    fn global_len(&self, id: IrGlobalId) -> Option<i32> {
        match &self.globals.get(&id)?.ty {
            IrType::Array(_, len) => i32::try_from(*len).ok(),
            _ => Some(1),
        }
    }

    fn build_size(&mut self, base: IrId) -> Result<ResolvedValue, BoundsCheckError> {
        if let Some(cached) = self.cached_size(base) {
            return Ok(cached);
        }

        let value = match self.classify_base(base) {
            BaseDefinition::Stack { count: Some(count) } => self.value_of(count),
            BaseDefinition::Stack { count: None } => ResolvedValue::Const(1),
            BaseDefinition::Global(id) => match self.global_len(id) {
                Some(len) => ResolvedValue::Const(len),
                None => return Err(self.unresolved(base)),
            },
            BaseDefinition::Param(_) => match self.param_sizes.get(self.func.id, base) {
                Some(size) => ResolvedValue::Runtime(size),
                None => return Err(self.unresolved(base)),
            },
            BaseDefinition::Merge(block) => return self.build_merge_size(base, block),
            BaseDefinition::Unknown => return Err(self.unresolved(base)),
        };

        trace!("size of {} in {} = {}", base, self.func.name, value);
        self.caches.sizes.insert(base, value);
        Ok(value)
    }

    fn build_merge_size(&mut self, phi: IrId, block: IrBlockId) -> Result<ResolvedValue, BoundsCheckError> {
        let placeholder = self.placeholder_phi(block);
        self.caches.sizes.insert(phi, ResolvedValue::Runtime(placeholder));

        let incoming = self.phi_incoming(block, phi);
        let mut wired = Vec::with_capacity(incoming.len());
        for (pred, value) in incoming {
            let size = if value == phi {
                ResolvedValue::Runtime(placeholder)
            } else {
                let base = self.resolve_base(value);
                self.build_size(base)?
            };
            wired.push((pred, self.operand_at_end(pred, size, phi)?));
        }
        self.wire_phi(block, placeholder, wired);

        trace!("size of merge {} in {} = {}", phi, self.func.name, placeholder);
        Ok(ResolvedValue::Runtime(placeholder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::bounds_check::context::{FunctionCaches, ParameterSizeMap};
    use crate::ir::{FunctionSignatureBuilder, IrBuilder, IrInstruction, IrModule};

    fn resolve_in(
        module: &mut IrModule,
        sizes: &ParameterSizeMap,
        value: IrId,
    ) -> (Result<ResolvedValue, BoundsCheckError>, usize) {
        let IrModule {
            functions, globals, ..
        } = module;
        let func = functions.values_mut().next().unwrap();
        let mut caches = FunctionCaches::default();
        let mut resolver = FunctionResolver::new(func, globals, &mut caches, sizes);
        let base = resolver.resolve_base(value);
        let result = resolver.resolve_size(base);
        (result, resolver.inserted())
    }

    #[test]
    fn test_stack_allocation_sizes() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new().param("n", IrType::I32).build();
        builder.start_function("f".to_string(), sig);
        let n = builder.param(0).unwrap();
        let ten = builder.build_int(10, IrType::I32).unwrap();
        let fixed = builder.build_alloc(IrType::I32, Some(ten)).unwrap();
        let dynamic = builder.build_alloc(IrType::I32, Some(n)).unwrap();
        let single = builder.build_alloc(IrType::I64, None).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();
        let mut module = builder.finish();
        let sizes = ParameterSizeMap::default();

        assert_eq!(resolve_in(&mut module, &sizes, fixed).0, Ok(ResolvedValue::Const(10)));
        assert_eq!(resolve_in(&mut module, &sizes, dynamic).0, Ok(ResolvedValue::Runtime(n)));
        assert_eq!(resolve_in(&mut module, &sizes, single).0, Ok(ResolvedValue::Const(1)));
    }

    #[test]
    fn test_global_array_size() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let table = builder.add_global("table", IrType::array(IrType::I32, 16), None);
        builder.start_function("f".to_string(), FunctionSignatureBuilder::new().build());
        let addr = builder.build_global_addr(table).unwrap();
        let i = builder.build_int(4, IrType::I32).unwrap();
        let elem = builder.build_gep(addr, vec![i], IrType::I32).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();
        let mut module = builder.finish();

        let (size, _) = resolve_in(&mut module, &ParameterSizeMap::default(), elem);
        assert_eq!(size, Ok(ResolvedValue::Const(16)));
    }

    #[test]
    fn test_parameter_size_lookup() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new()
            .param("p", IrType::ptr(IrType::I32))
            .param("p.size", IrType::I32)
            .build();
        let id = builder.start_function("f".to_string(), sig);
        let p = builder.param(0).unwrap();
        let size = builder.param(1).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();
        let mut module = builder.finish();

        let (missing, _) = resolve_in(&mut module, &ParameterSizeMap::default(), p);
        assert!(matches!(missing, Err(BoundsCheckError::UnresolvedSize { base, .. }) if base == p));

        let mut sizes = ParameterSizeMap::default();
        sizes.insert(id, p, size);
        let (found, _) = resolve_in(&mut module, &sizes, p);
        assert_eq!(found, Ok(ResolvedValue::Runtime(size)));
    }

    #[test]
    fn test_loaded_pointer_has_no_size_and_inserts_nothing() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new().param("c", IrType::Bool).build();
        builder.start_function("f".to_string(), sig);
        let cond = builder.param(0).unwrap();
        let slot = builder.build_alloc(IrType::ptr(IrType::I32), None).unwrap();
        let loaded = builder.build_load(slot, IrType::ptr(IrType::I32)).unwrap();
        let ten = builder.build_int(10, IrType::I32).unwrap();
        let arr = builder.build_alloc(IrType::I32, Some(ten)).unwrap();
        let left = builder.create_block().unwrap();
        let right = builder.create_block().unwrap();
        let join = builder.create_block().unwrap();
        builder.build_cond_branch(cond, left, right).unwrap();
        builder.switch_to_block(left);
        builder.build_branch(join).unwrap();
        builder.switch_to_block(right);
        builder.build_branch(join).unwrap();
        builder.switch_to_block(join);
        let p = builder.build_phi(join, IrType::ptr(IrType::I32)).unwrap();
        builder.add_phi_incoming(join, p, left, arr).unwrap();
        builder.add_phi_incoming(join, p, right, loaded).unwrap();
        builder.build_return(None).unwrap();
        builder.finish_function();
        let mut module = builder.finish();

        let (result, inserted) = resolve_in(&mut module, &ParameterSizeMap::default(), p);
        assert!(matches!(result, Err(BoundsCheckError::UnresolvedSize { base, .. }) if base == loaded));
        assert_eq!(inserted, 0);
        assert_eq!(module.functions[0].cfg.blocks[&join].phi_nodes.len(), 1);
    }

    #[test]
    fn test_merge_size_phi_with_self_reference() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new().param("c", IrType::Bool).build();
        builder.start_function("f".to_string(), sig);
        let cond = builder.param(0).unwrap();
        let entry = builder.current_block().unwrap();
        let eight = builder.build_int(8, IrType::I32).unwrap();
        let arr = builder.build_alloc(IrType::I32, Some(eight)).unwrap();
        let body = builder.create_block().unwrap();
        let exit = builder.create_block().unwrap();
        builder.build_branch(body).unwrap();
        builder.switch_to_block(body);
        let p = builder.build_phi(body, IrType::ptr(IrType::I32)).unwrap();
        let one = builder.build_int(1, IrType::I32).unwrap();
        let next = builder.build_gep(p, vec![one], IrType::I32).unwrap();
        builder.add_phi_incoming(body, p, entry, arr).unwrap();
        builder.add_phi_incoming(body, p, body, next).unwrap();
        builder.build_cond_branch(cond, body, exit).unwrap();
        builder.switch_to_block(exit);
        builder.build_return(None).unwrap();
        builder.finish_function();
        let mut module = builder.finish();

        let (result, _) = resolve_in(&mut module, &ParameterSizeMap::default(), next);
        let Ok(ResolvedValue::Runtime(size_phi)) = result else {
            panic!("expected a size phi, got {:?}", result);
        };

        let func = &module.functions[0];
        let phi = func.cfg.blocks[&body].phi(size_phi).unwrap();
        // next's base is p itself, so the back edge carries the size phi
        assert!(phi.incoming.contains(&(body, size_phi)));
        let (_, from_entry) = phi.incoming.iter().find(|(b, _)| *b == entry).unwrap();
        assert!(matches!(
            func.defining_inst(*from_entry),
            Some(IrInstruction::Const { value, .. }) if value.as_i64() == Some(8)
        ));
        assert!(func.verify().is_ok());
    }
}
