//! Base-definition resolution: walk an access chain back to the value that
//! first defines the accessed memory region.

use super::context::{FunctionResolver, NodeKind};
use super::defs::{DefIndex, DefShape};
use crate::ir::{IrBlockId, IrGlobalId, IrId};

/// What a base definition turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseDefinition {
    /// Stack allocation, with its element count register if it has one
    Stack { count: Option<IrId> },
    /// Address of a module global
    Global(IrGlobalId),
    /// Function parameter at the given position
    Param(usize),
    /// Phi node in the given block
    Merge(IrBlockId),
    /// Load, call or cast result: no capacity can be traced
    Unknown,
}

/// Follow the pointer operands of element accesses from `value` back to the
/// first value that is not one. Pure and uncached.
pub fn resolve_base(defs: &DefIndex, value: IrId) -> IrId {
    let mut current = value;
    // Bounded by the register count so malformed self-referencing chains terminate
    for _ in 0..=defs.len() {
        match defs.shape(current) {
            Some(DefShape::Gep { ptr, .. }) => current = ptr,
            _ => break,
        }
    }
    current
}

/// Classify the definition of a base register
pub fn classify_base(defs: &DefIndex, base: IrId) -> BaseDefinition {
    match defs.shape(base) {
        Some(DefShape::Param(pos)) => BaseDefinition::Param(pos),
        Some(DefShape::Phi(block)) => BaseDefinition::Merge(block),
        Some(DefShape::Alloc { count }) => BaseDefinition::Stack { count },
        Some(DefShape::GlobalAddr(global)) => BaseDefinition::Global(global),
        _ => BaseDefinition::Unknown,
    }
}

impl FunctionResolver<'_> {
    pub fn resolve_base(&self, value: IrId) -> IrId {
        resolve_base(&self.defs, value)
    }

    pub fn classify_base(&self, base: IrId) -> BaseDefinition {
        classify_base(&self.defs, base)
    }

    /// Classify `reg` for offset resolution
    pub fn classify(&self, reg: IrId) -> NodeKind {
        match self.defs.shape(reg) {
            Some(DefShape::Gep {
                ptr,
                index: Some(index),
            }) => {
                if self.resolve_base(ptr) == ptr && !self.is_merge(ptr) {
                    NodeKind::DirectAccess { ptr, index }
                } else {
                    NodeKind::ChainedAccess { ptr, index }
                }
            }
            Some(DefShape::Phi(block)) => NodeKind::Merge { block },
            _ => NodeKind::Other,
        }
    }
}
