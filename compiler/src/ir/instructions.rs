//! IR Instructions
//!
//! Defines the instruction set for the intermediate representation.
//! Instructions are low-level operations that map directly to machine operations.
//! Phi nodes and terminators live on the basic block, not in this enum.

use super::{IrFunctionId, IrGlobalId, IrId, IrType, IrValue};
use serde::{Deserialize, Serialize};

/// IR instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IrInstruction {
    // === Value Operations ===

    /// Load constant value
    Const {
        dest: IrId,
        value: IrValue,
    },

    /// Copy value from one register to another
    Copy {
        dest: IrId,
        src: IrId,
    },

    /// Load value from memory
    Load {
        dest: IrId,
        ptr: IrId,
        ty: IrType,
    },

    /// Store value to memory
    Store {
        ptr: IrId,
        value: IrId,
    },

    // === Arithmetic Operations ===

    /// Binary arithmetic operation
    BinOp {
        dest: IrId,
        op: BinaryOp,
        left: IrId,
        right: IrId,
    },

    /// Compare operation
    Cmp {
        dest: IrId,
        op: CompareOp,
        left: IrId,
        right: IrId,
    },

    // === Calls ===

    /// Direct function call (callee known at compile time)
    CallDirect {
        dest: Option<IrId>,
        func_id: IrFunctionId,
        args: Vec<IrId>,
    },

    // === Memory Operations ===

    /// Stack allocation of `count` elements of `ty` (one element when `count` is absent)
    Alloc {
        dest: IrId,
        ty: IrType,
        count: Option<IrId>,
    },

    /// Address of a module-level global
    GlobalAddr {
        dest: IrId,
        global_id: IrGlobalId,
    },

    /// Get element pointer (GEP); `ty` is the element type being addressed
    GetElementPtr {
        dest: IrId,
        ptr: IrId,
        indices: Vec<IrId>,
        ty: IrType,
    },

    // === Type Operations ===

    /// Type cast
    Cast {
        dest: IrId,
        src: IrId,
        from_ty: IrType,
        to_ty: IrType,
    },
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Rem,

    // Bitwise
    And,
    Or,
    Xor,
    Shl,
    Shr,
}

/// Comparison operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl IrInstruction {
    /// Get the destination register if this instruction produces a value
    pub fn dest(&self) -> Option<IrId> {
        match self {
            IrInstruction::Const { dest, .. }
            | IrInstruction::Copy { dest, .. }
            | IrInstruction::Load { dest, .. }
            | IrInstruction::BinOp { dest, .. }
            | IrInstruction::Cmp { dest, .. }
            | IrInstruction::Alloc { dest, .. }
            | IrInstruction::GlobalAddr { dest, .. }
            | IrInstruction::GetElementPtr { dest, .. }
            | IrInstruction::Cast { dest, .. } => Some(*dest),

            IrInstruction::CallDirect { dest, .. } => *dest,

            IrInstruction::Store { .. } => None,
        }
    }

    /// Get all registers used by this instruction
    pub fn uses(&self) -> Vec<IrId> {
        match self {
            IrInstruction::Copy { src, .. } => vec![*src],
            IrInstruction::Load { ptr, .. } => vec![*ptr],
            IrInstruction::Store { ptr, value } => vec![*ptr, *value],
            IrInstruction::BinOp { left, right, .. } => vec![*left, *right],
            IrInstruction::Cmp { left, right, .. } => vec![*left, *right],
            IrInstruction::CallDirect { args, .. } => args.clone(),
            IrInstruction::Alloc { count, .. } => count.map(|c| vec![c]).unwrap_or_default(),
            IrInstruction::GetElementPtr { ptr, indices, .. } => {
                let mut uses = vec![*ptr];
                uses.extend(indices);
                uses
            }
            IrInstruction::Cast { src, .. } => vec![*src],
            IrInstruction::Const { .. } | IrInstruction::GlobalAddr { .. } => vec![],
        }
    }

    /// Rewrite every use of `old` in this instruction to `new`.
    /// Returns the number of operands rewritten.
    pub fn replace_uses(&mut self, old: IrId, new: IrId) -> usize {
        let mut replaced = 0;
        let mut swap = |reg: &mut IrId| {
            if *reg == old {
                *reg = new;
                replaced += 1;
            }
        };

        match self {
            IrInstruction::Copy { src, .. } | IrInstruction::Cast { src, .. } => swap(src),
            IrInstruction::Load { ptr, .. } => swap(ptr),
            IrInstruction::Store { ptr, value } => {
                swap(ptr);
                swap(value);
            }
            IrInstruction::BinOp { left, right, .. } | IrInstruction::Cmp { left, right, .. } => {
                swap(left);
                swap(right);
            }
            IrInstruction::CallDirect { args, .. } => args.iter_mut().for_each(&mut swap),
            IrInstruction::Alloc { count, .. } => {
                if let Some(count) = count {
                    swap(count);
                }
            }
            IrInstruction::GetElementPtr { ptr, indices, .. } => {
                swap(ptr);
                indices.iter_mut().for_each(&mut swap);
            }
            IrInstruction::Const { .. } | IrInstruction::GlobalAddr { .. } => {}
        }

        replaced
    }

    /// Detach this call from everything it references so it can be erased
    /// even when other doomed instructions still point at it.
    ///
    /// Only calls carry droppable references; other instructions are left as is.
    pub fn drop_all_references(&mut self) {
        if let IrInstruction::CallDirect { dest, args, .. } = self {
            args.clear();
            *dest = None;
        }
    }

    /// Check if this is a single-index, non-struct element access
    pub fn is_single_index_gep(&self) -> bool {
        matches!(
            self,
            IrInstruction::GetElementPtr { indices, ty, .. } if indices.len() == 1 && !ty.is_struct()
        )
    }

    /// Check if this instruction has side effects
    pub fn has_side_effects(&self) -> bool {
        matches!(
            self,
            IrInstruction::Store { .. } | IrInstruction::CallDirect { .. }
        )
    }
}
