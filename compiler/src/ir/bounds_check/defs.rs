//! Register definition index for one function, built in a single walk
//! over the body and kept current as the resolver inserts code.

use crate::ir::{IrBlockId, IrFunction, IrGlobalId, IrId, IrInstruction, RegisterDef};
use fxhash::FxHashMap;

/// A register definition, reduced to what resolution inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefShape {
    Param(usize),
    Phi(IrBlockId),
    /// Integer constant; `None` when it does not fit in an `i32`
    Const(Option<i32>),
    Alloc { count: Option<IrId> },
    GlobalAddr(IrGlobalId),
    /// Element access; `index` is set for single-index, non-struct accesses
    Gep { ptr: IrId, index: Option<IrId> },
    Other,
}

impl DefShape {
    fn of(inst: &IrInstruction) -> Self {
        match inst {
            IrInstruction::Const { value, .. } => {
                DefShape::Const(value.as_i64().and_then(|n| i32::try_from(n).ok()))
            }
            IrInstruction::Alloc { count, .. } => DefShape::Alloc { count: *count },
            IrInstruction::GlobalAddr { global_id, .. } => DefShape::GlobalAddr(*global_id),
            IrInstruction::GetElementPtr {
                ptr, indices, ty, ..
            } => DefShape::Gep {
                ptr: *ptr,
                index: match indices.as_slice() {
                    [index] if !ty.is_struct() => Some(*index),
                    _ => None,
                },
            },
            _ => DefShape::Other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Def {
    block: Option<IrBlockId>,
    shape: DefShape,
}

/// Register -> definition shape and block
#[derive(Debug, Default)]
pub struct DefIndex {
    defs: FxHashMap<IrId, Def>,
}

impl DefIndex {
    pub fn new(func: &IrFunction) -> Self {
        let defs = func
            .definitions()
            .map(|(reg, def)| {
                let def = match def {
                    RegisterDef::Param(pos) => Def {
                        block: None,
                        shape: DefShape::Param(pos),
                    },
                    RegisterDef::Phi { block, .. } => Def {
                        block: Some(block),
                        shape: DefShape::Phi(block),
                    },
                    RegisterDef::Inst { block, inst } => Def {
                        block: Some(block),
                        shape: DefShape::of(inst),
                    },
                };
                (reg, def)
            })
            .collect();
        Self { defs }
    }

    pub fn shape(&self, reg: IrId) -> Option<DefShape> {
        self.defs.get(&reg).map(|def| def.shape)
    }

    /// Block holding the definition; `None` for parameters
    pub fn block(&self, reg: IrId) -> Option<IrBlockId> {
        self.defs.get(&reg).and_then(|def| def.block)
    }

    pub fn is_merge(&self, reg: IrId) -> bool {
        matches!(self.shape(reg), Some(DefShape::Phi(_)))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn record_phi(&mut self, block: IrBlockId, dest: IrId) {
        self.defs.insert(
            dest,
            Def {
                block: Some(block),
                shape: DefShape::Phi(block),
            },
        );
    }

    pub fn record_inst(&mut self, block: IrBlockId, inst: &IrInstruction) {
        if let Some(dest) = inst.dest() {
            self.defs.insert(
                dest,
                Def {
                    block: Some(block),
                    shape: DefShape::of(inst),
                },
            );
        }
    }

    /// Follow a use rewrite `old -> new` in the recorded operands
    pub fn replace_uses(&mut self, old: IrId, new: IrId) {
        let swap = |reg: &mut IrId| {
            if *reg == old {
                *reg = new;
            }
        };
        for def in self.defs.values_mut() {
            match &mut def.shape {
                DefShape::Alloc { count: Some(count) } => swap(count),
                DefShape::Gep { ptr, index } => {
                    swap(ptr);
                    if let Some(index) = index {
                        swap(index);
                    }
                }
                _ => {}
            }
        }
    }
}
