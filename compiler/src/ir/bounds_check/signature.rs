//! Signature rewriting: functions taking pointers get one extra `i32`
//! capacity parameter per pointer parameter.

use super::context::{ParameterSizeMap, RewrittenSignature};
use super::error::BoundsCheckError;
use crate::ir::{IrFunction, IrFunctionId, IrModule, IrParameter, IrType};
use log::debug;
use std::mem;

/// Rewrites pointer-taking functions into size-extended replacements
pub struct SignatureRewriter<'a> {
    entry_function: &'a str,
}

impl<'a> SignatureRewriter<'a> {
    pub fn new(entry_function: &'a str) -> Self {
        Self { entry_function }
    }

    /// Whether `func` is the process entry with its conventional `(count, args)` parameters
    pub fn is_entry(&self, func: &IrFunction) -> bool {
        let params = &func.signature.parameters;
        func.name == self.entry_function
            && params.len() == 2
            && params[0].ty.is_integer()
            && params[1].ty.is_pointer()
    }

    /// Replace `id` in `module` with a size-extended copy when it takes pointers.
    ///
    /// The replacement keeps the name, the position in the module and every
    /// register of the original, so its body needs no rebinding. Each pointer
    /// parameter is recorded in `param_sizes` against its new size parameter.
    /// The entry function is never replaced; its count parameter is recorded as
    /// the size of its argument vector instead.
    pub fn maybe_rewrite(
        &self,
        module: &mut IrModule,
        id: IrFunctionId,
        param_sizes: &mut ParameterSizeMap,
    ) -> Result<Option<RewrittenSignature>, BoundsCheckError> {
        let func = module
            .functions
            .get(&id)
            .ok_or(BoundsCheckError::MissingFunction(id))?;

        if self.is_entry(func) {
            let params = &func.signature.parameters;
            param_sizes.insert(id, params[1].reg, params[0].reg);
            debug!("{}: entry function, {} sizes {}", func.name, params[0].reg, params[1].reg);
            return Ok(None);
        }

        let pointer_positions = func.signature.pointer_positions();
        if pointer_positions.is_empty() {
            return Ok(None);
        }

        let new_id = module.alloc_function_id();
        let func = module
            .functions
            .get_mut(&id)
            .ok_or(BoundsCheckError::MissingFunction(id))?;
        let mut replacement = IrFunction {
            id: new_id,
            name: func.name.clone(),
            signature: func.signature.clone(),
            cfg: mem::take(&mut func.cfg),
            locals: mem::take(&mut func.locals),
            register_types: mem::take(&mut func.register_types),
            attributes: func.attributes.clone(),
            next_reg_id: func.next_reg_id,
        };

        for (ptr, &pos) in func.pointer_params().into_iter().zip(&pointer_positions) {
            let size = replacement.alloc_typed_reg(IrType::I32);
            let name = &func.signature.parameters[pos].name;
            let mut param = IrParameter::new(format!("{}.size", name), IrType::I32);
            param.reg = size;
            replacement.signature.parameters.push(param);
            param_sizes.insert(new_id, ptr, size);
        }

        debug!(
            "{}: {} -> {} with {} size parameter(s)",
            replacement.name,
            id,
            new_id,
            pointer_positions.len()
        );
        module
            .replace_function(id, replacement)
            .ok_or(BoundsCheckError::MissingFunction(id))?;

        Ok(Some(RewrittenSignature {
            new_id,
            pointer_positions,
        }))
    }
}
