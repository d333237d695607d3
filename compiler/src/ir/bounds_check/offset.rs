//! Offset resolution: the total element offset of an access from its base.
//!
//! ```text
//! direct   gep base, i            -> i
//! chained  gep (gep base, i), j   -> i + j   (folded when both are constants,
//!                                             else an `add` before the access)
//! merge    phi [a, bb0], [b, bb1] -> 0 when every branch is provably zero,
//!                                     else phi [off(a), bb0], [off(b), bb1]
//! ```
//!
//! Merge points are cached before their branches are resolved so a loop
//! that feeds a phi back into itself finds the placeholder instead of
//! recursing forever.

use super::context::{FunctionResolver, NodeKind, ResolvedValue};
use super::error::BoundsCheckError;
use crate::ir::{BinaryOp, IrBlockId, IrId, IrInstruction, IrType};
use log::trace;

impl FunctionResolver<'_> {
    /// Total element offset of `node` from its base definition, memoized
    pub fn resolve_offset(&mut self, node: IrId) -> Result<ResolvedValue, BoundsCheckError> {
        if let Some(cached) = self.cached_offset(node) {
            return Ok(cached);
        }

        let value = match self.classify(node) {
            NodeKind::DirectAccess { index, .. } => self.value_of(index),
            NodeKind::ChainedAccess { ptr, index } => {
                let ptr_offset = self.resolve_offset(ptr)?;
                // A cycle through a merge point may have resolved this node already
                if let Some(cached) = self.cached_offset(node) {
                    return Ok(cached);
                }
                self.chain_offset(node, ptr, ptr_offset, index)?
            }
            NodeKind::Merge { block } => return self.resolve_merge_offset(node, block),
            NodeKind::Other => ResolvedValue::Const(0),
        };

        trace!("offset of {} in {} = {}", node, self.func.name, value);
        self.caches.offsets.insert(node, value);
        Ok(value)
    }

    fn chain_offset(
        &mut self,
        node: IrId,
        ptr: IrId,
        ptr_offset: ResolvedValue,
        index: IrId,
    ) -> Result<ResolvedValue, BoundsCheckError> {
        let index_value = self.value_of(index);

        // An access on a merge point that always starts at the base is a first hop
        if ptr_offset.is_zero() && self.is_merge(ptr) {
            return Ok(index_value);
        }

        if let (ResolvedValue::Const(a), ResolvedValue::Const(b)) = (ptr_offset, index_value) {
            return Ok(ResolvedValue::Const(a.wrapping_add(b)));
        }

        let mut pending = Vec::new();
        let left = self.operand(ptr_offset, &mut pending);
        let right = self.operand(index_value, &mut pending);
        let dest = self.func.alloc_typed_reg(IrType::I32);
        pending.push(IrInstruction::BinOp {
            dest,
            op: BinaryOp::Add,
            left,
            right,
        });
        self.insert_before(node, pending)?;
        Ok(ResolvedValue::Runtime(dest))
    }

    fn resolve_merge_offset(
        &mut self,
        phi: IrId,
        block: IrBlockId,
    ) -> Result<ResolvedValue, BoundsCheckError> {
        let incoming = self.phi_incoming(block, phi);

        let mut all_zero = true;
        for &(_, value) in &incoming {
            if !self.provably_zero(phi, value)? {
                all_zero = false;
                break;
            }
        }
        if all_zero {
            trace!("offset of merge {} in {} is always zero", phi, self.func.name);
            self.caches.offsets.insert(phi, ResolvedValue::Const(0));
            return Ok(ResolvedValue::Const(0));
        }

        let placeholder = self.placeholder_phi(block);
        self.caches
            .offsets
            .insert(phi, ResolvedValue::Runtime(placeholder));

        let mut wired = Vec::with_capacity(incoming.len());
        for (pred, value) in incoming {
            let offset = if value == phi {
                ResolvedValue::Runtime(placeholder)
            } else {
                self.resolve_offset(value)?
            };
            wired.push((pred, self.operand_at_end(pred, offset, phi)?));
        }
        self.wire_phi(block, placeholder, wired);

        trace!("offset of merge {} in {} = {}", phi, self.func.name, placeholder);
        Ok(ResolvedValue::Runtime(placeholder))
    }

    /// Whether the branch `value` of merge `phi` always has offset zero.
    /// Values coming from another merge point are pessimistically not zero,
    /// without looking through them.
    fn provably_zero(&mut self, phi: IrId, value: IrId) -> Result<bool, BoundsCheckError> {
        if value == phi {
            return Ok(true);
        }
        if self.is_merge(value) || self.is_merge(self.resolve_base(value)) {
            return Ok(false);
        }
        Ok(self.resolve_offset(value)?.is_zero())
    }
}
