//! MIR Builder
//!
//! This module provides a builder interface for constructing MIR in a convenient way.
//! The builder maintains context and provides helper methods for common patterns.

use tracing::debug;

use super::{
    BinaryOp, CompareOp, IrBlockId, IrFunction, IrFunctionId, IrFunctionSignature, IrGlobal,
    IrGlobalId, IrId, IrInstruction, IrModule, IrParameter, IrPhiNode, IrTerminator, IrType,
    IrValue, Linkage,
};

/// MIR builder for constructing IR modules
pub struct IrBuilder {
    /// The module being built
    pub module: IrModule,

    /// Current function being built
    pub(crate) current_function: Option<IrFunctionId>,

    /// Current basic block being built
    pub(crate) current_block: Option<IrBlockId>,
}

impl IrBuilder {
    /// Create a new IR builder
    pub fn new(module_name: String, source_file: String) -> Self {
        Self {
            module: IrModule::new(module_name, source_file),
            current_function: None,
            current_block: None,
        }
    }

    /// Take the finished module out of the builder
    pub fn finish(self) -> IrModule {
        self.module
    }

    // === Module Building ===

    /// Start building a new function
    pub fn start_function(&mut self, name: String, signature: IrFunctionSignature) -> IrFunctionId {
        let id = self.module.alloc_function_id();
        debug!("builder: starting function {} as {}", name, id);
        let function = IrFunction::new(id, name, signature);
        self.current_function = Some(id);
        self.current_block = Some(function.entry_block());
        self.module.add_function(function);
        id
    }

    /// Finish building the current function
    pub fn finish_function(&mut self) {
        self.current_function = None;
        self.current_block = None;
    }

    /// Get the current function
    pub fn current_function(&self) -> Option<&IrFunction> {
        self.current_function
            .and_then(|id| self.module.functions.get(&id))
    }

    /// Get the current function mutably
    pub fn current_function_mut(&mut self) -> Option<&mut IrFunction> {
        self.current_function
            .and_then(move |id| self.module.functions.get_mut(&id))
    }

    /// Parameter register of the current function
    pub fn param(&self, index: usize) -> Option<IrId> {
        self.current_function()?.get_param_reg(index)
    }

    /// Declare an external function
    pub fn declare_extern(&mut self, name: &str, signature: IrFunctionSignature) -> IrFunctionId {
        self.module.get_or_insert_extern(name, signature)
    }

    /// Add a module-level global
    pub fn add_global(&mut self, name: &str, ty: IrType, initializer: Option<IrValue>) -> IrGlobalId {
        let id = self.module.alloc_global_id();
        self.module.add_global(IrGlobal {
            id,
            name: name.to_string(),
            ty,
            initializer,
            mutable: true,
            linkage: Linkage::Private,
        })
    }

    // === Block Building ===

    /// Create a new basic block in the current function
    pub fn create_block(&mut self) -> Option<IrBlockId> {
        self.current_function_mut().map(|f| f.cfg.create_block())
    }

    /// Create a new basic block with a label
    pub fn create_block_with_label(&mut self, label: String) -> Option<IrBlockId> {
        let block_id = self.create_block()?;
        let block = self
            .current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block_id))?;
        block.label = Some(label);
        Some(block_id)
    }

    /// Switch to building in a different block
    pub fn switch_to_block(&mut self, block: IrBlockId) {
        self.current_block = Some(block);
    }

    /// Get the current block
    pub fn current_block(&self) -> Option<IrBlockId> {
        self.current_block
    }

    // === Register Management ===

    /// Allocate a new register in the current function
    pub fn alloc_reg(&mut self) -> Option<IrId> {
        self.current_function_mut().map(|f| f.alloc_reg())
    }

    /// Get the type of a register
    pub fn get_register_type(&self, reg: IrId) -> Option<IrType> {
        self.current_function()?.register_types.get(&reg).cloned()
    }

    /// Set the type of a register
    pub fn set_register_type(&mut self, reg: IrId, ty: IrType) {
        if let Some(func) = self.current_function_mut() {
            func.register_types.insert(reg, ty);
        }
    }

    /// Declare a local variable
    pub fn declare_local(&mut self, name: String, ty: IrType) -> Option<IrId> {
        self.current_function_mut().map(|f| f.declare_local(name, ty))
    }

    // === Instruction Building ===

    /// Add an instruction to the current block
    fn add_instruction(&mut self, inst: IrInstruction) -> Option<()> {
        let block_id = self.current_block?;
        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block_id))
            .map(|b| b.add_instruction(inst))
    }

    /// Allocate a register of type `ty` and emit the instruction built from it
    fn build_typed(&mut self, ty: IrType, make: impl FnOnce(IrId) -> IrInstruction) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, ty);
        self.add_instruction(make(dest))?;
        Some(dest)
    }

    /// Build a constant instruction
    pub fn build_const(&mut self, value: IrValue) -> Option<IrId> {
        let ty = value.ty();
        self.build_typed(ty, |dest| IrInstruction::Const { dest, value })
    }

    /// Build a copy instruction
    pub fn build_copy(&mut self, src: IrId) -> Option<IrId> {
        let ty = self.get_register_type(src).unwrap_or(IrType::Void);
        self.build_typed(ty, |dest| IrInstruction::Copy { dest, src })
    }

    /// Build a load instruction
    pub fn build_load(&mut self, ptr: IrId, ty: IrType) -> Option<IrId> {
        self.build_typed(ty.clone(), |dest| IrInstruction::Load { dest, ptr, ty })
    }

    /// Build a store instruction
    pub fn build_store(&mut self, ptr: IrId, value: IrId) -> Option<()> {
        self.add_instruction(IrInstruction::Store { ptr, value })
    }

    /// Build a binary operation
    pub fn build_binop(&mut self, op: BinaryOp, left: IrId, right: IrId) -> Option<IrId> {
        // Result type follows the left operand (or right if left is unknown)
        let ty = self
            .get_register_type(left)
            .or_else(|| self.get_register_type(right))
            .unwrap_or(IrType::I32);
        self.build_typed(ty, |dest| IrInstruction::BinOp { dest, op, left, right })
    }

    /// Build a comparison operation
    pub fn build_cmp(&mut self, op: CompareOp, left: IrId, right: IrId) -> Option<IrId> {
        // Comparisons always return Bool
        self.build_typed(IrType::Bool, |dest| IrInstruction::Cmp { dest, op, left, right })
    }

    /// Build a direct call to a function returning a value
    pub fn build_call_direct(&mut self, func_id: IrFunctionId, args: Vec<IrId>) -> Option<IrId> {
        let return_type = self.module.callee_signature(func_id)?.return_type.clone();
        if return_type == IrType::Void {
            return None;
        }
        self.build_typed(return_type, |dest| IrInstruction::CallDirect {
            dest: Some(dest),
            func_id,
            args,
        })
    }

    /// Build a direct call whose result (if any) is discarded
    pub fn build_call_void(&mut self, func_id: IrFunctionId, args: Vec<IrId>) -> Option<()> {
        self.add_instruction(IrInstruction::CallDirect {
            dest: None,
            func_id,
            args,
        })
    }

    /// Build a cast instruction
    pub fn build_cast(&mut self, src: IrId, from_ty: IrType, to_ty: IrType) -> Option<IrId> {
        self.build_typed(to_ty.clone(), |dest| IrInstruction::Cast {
            dest,
            src,
            from_ty,
            to_ty,
        })
    }

    /// Build an alloc instruction (stack allocation of `count` elements)
    pub fn build_alloc(&mut self, ty: IrType, count: Option<IrId>) -> Option<IrId> {
        self.build_typed(IrType::ptr(ty.clone()), |dest| IrInstruction::Alloc { dest, ty, count })
    }

    /// Build the address of a global; arrays decay to a pointer to their first element
    pub fn build_global_addr(&mut self, global_id: IrGlobalId) -> Option<IrId> {
        let ty = match &self.module.globals.get(&global_id)?.ty {
            IrType::Array(elem, _) => IrType::Ptr(elem.clone()),
            other => IrType::ptr(other.clone()),
        };
        self.build_typed(ty, |dest| IrInstruction::GlobalAddr { dest, global_id })
    }

    /// Build a GEP (get element pointer) instruction
    pub fn build_gep(&mut self, ptr: IrId, indices: Vec<IrId>, ty: IrType) -> Option<IrId> {
        self.build_typed(IrType::ptr(ty.clone()), |dest| IrInstruction::GetElementPtr {
            dest,
            ptr,
            indices,
            ty,
        })
    }

    // === Terminator Building ===

    /// Set the terminator for the current block
    fn set_terminator(&mut self, term: IrTerminator) -> Option<()> {
        let block_id = self.current_block?;
        let func = self.current_function_mut()?;

        let block = func.cfg.get_block_mut(block_id)?;
        block.set_terminator(term.clone());

        // Then, update predecessor information based on the terminator
        match &term {
            IrTerminator::Branch { target } => {
                func.cfg.connect_blocks(block_id, *target);
            }
            IrTerminator::CondBranch {
                true_target,
                false_target,
                ..
            } => {
                func.cfg.connect_blocks(block_id, *true_target);
                func.cfg.connect_blocks(block_id, *false_target);
            }
            _ => {}
        }

        Some(())
    }

    /// Build an unconditional branch
    pub fn build_branch(&mut self, target: IrBlockId) -> Option<()> {
        self.set_terminator(IrTerminator::Branch { target })
    }

    /// Build a conditional branch
    pub fn build_cond_branch(
        &mut self,
        condition: IrId,
        true_target: IrBlockId,
        false_target: IrBlockId,
    ) -> Option<()> {
        self.set_terminator(IrTerminator::CondBranch {
            condition,
            true_target,
            false_target,
        })
    }

    /// Build a return instruction
    pub fn build_return(&mut self, value: Option<IrId>) -> Option<()> {
        self.set_terminator(IrTerminator::Return { value })
    }

    /// Build an unreachable terminator
    pub fn build_unreachable(&mut self) -> Option<()> {
        self.set_terminator(IrTerminator::Unreachable)
    }

    // === Phi Node Building ===

    /// Add a phi node to a block
    pub fn build_phi(&mut self, block: IrBlockId, ty: IrType) -> Option<IrId> {
        let dest = self.alloc_reg()?;
        self.set_register_type(dest, ty.clone());
        let phi = IrPhiNode {
            dest,
            incoming: Vec::new(),
            ty,
        };

        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block))
            .map(|b| b.add_phi(phi))?;

        Some(dest)
    }

    /// Add an incoming value to a phi node
    pub fn add_phi_incoming(
        &mut self,
        block: IrBlockId,
        phi_dest: IrId,
        from_block: IrBlockId,
        value: IrId,
    ) -> Option<()> {
        self.current_function_mut()
            .and_then(|f| f.cfg.get_block_mut(block))
            .and_then(|b| b.phi_mut(phi_dest))
            .map(|phi| phi.incoming.push((from_block, value)))
    }

    // === Convenience Methods ===

    /// Build an integer constant
    pub fn build_int(&mut self, value: i64, ty: IrType) -> Option<IrId> {
        let ir_value = match ty {
            IrType::I8 => IrValue::I8(value as i8),
            IrType::I16 => IrValue::I16(value as i16),
            IrType::I32 => IrValue::I32(value as i32),
            IrType::I64 => IrValue::I64(value),
            IrType::U8 => IrValue::U8(value as u8),
            IrType::U16 => IrValue::U16(value as u16),
            IrType::U32 => IrValue::U32(value as u32),
            IrType::U64 => IrValue::U64(value as u64),
            _ => return None,
        };
        self.build_const(ir_value)
    }

    /// Build addition
    pub fn build_add(&mut self, left: IrId, right: IrId) -> Option<IrId> {
        self.build_binop(BinaryOp::Add, left, right)
    }

    /// Build subtraction
    pub fn build_sub(&mut self, left: IrId, right: IrId) -> Option<IrId> {
        self.build_binop(BinaryOp::Sub, left, right)
    }
}

/// Function builder helper for building function signatures
pub struct FunctionSignatureBuilder {
    parameters: Vec<IrParameter>,
    return_type: IrType,
}

impl Default for FunctionSignatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionSignatureBuilder {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
            return_type: IrType::Void,
        }
    }

    pub fn param(mut self, name: &str, ty: IrType) -> Self {
        self.parameters.push(IrParameter::new(name, ty));
        self
    }

    pub fn returns(mut self, ty: IrType) -> Self {
        self.return_type = ty;
        self
    }

    pub fn build(self) -> IrFunctionSignature {
        IrFunctionSignature {
            parameters: self.parameters,
            return_type: self.return_type,
        }
    }
}
