//! MIR Functions
//!
//! This module defines function representation in the MIR, including
//! function signatures, parameters, local variables, and the function body.

use super::{IrBlockId, IrControlFlowGraph, IrId, IrInstruction, IrPhiNode, IrType, Linkage};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// MIR function representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrFunction {
    /// Unique identifier for this function
    pub id: IrFunctionId,

    /// Function name
    pub name: String,

    /// Function signature
    pub signature: IrFunctionSignature,

    /// Control flow graph (function body)
    pub cfg: IrControlFlowGraph,

    /// Local variable declarations
    pub locals: HashMap<IrId, IrLocal>,

    /// Type information for all registers (parameters and intermediate values)
    pub register_types: HashMap<IrId, IrType>,

    /// Function attributes
    pub attributes: FunctionAttributes,

    /// Next available register ID
    pub next_reg_id: u32,
}

/// Unique identifier for functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrFunctionId(pub u32);

impl std::fmt::Display for IrFunctionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fn{}", self.0)
    }
}

/// Function signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrFunctionSignature {
    /// Parameter types and names
    pub parameters: Vec<IrParameter>,

    /// Return type
    pub return_type: IrType,
}

impl IrFunctionSignature {
    /// Signature from bare parameter types; parameters are named `arg0`, `arg1`, ...
    pub fn from_types(params: Vec<IrType>, return_type: IrType) -> Self {
        Self {
            parameters: params
                .into_iter()
                .enumerate()
                .map(|(i, ty)| IrParameter::new(format!("arg{}", i), ty))
                .collect(),
            return_type,
        }
    }

    /// Parameter types in declaration order
    pub fn param_types(&self) -> Vec<IrType> {
        self.parameters.iter().map(|p| p.ty.clone()).collect()
    }

    /// Positions of pointer-typed parameters
    pub fn pointer_positions(&self) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.ty.is_pointer())
            .map(|(i, _)| i)
            .collect()
    }

    /// Function type equivalent of this signature
    pub fn as_type(&self) -> IrType {
        IrType::Function {
            params: self.param_types(),
            return_type: Box::new(self.return_type.clone()),
        }
    }
}

/// Function parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrParameter {
    /// Parameter name
    pub name: String,

    /// Parameter type
    pub ty: IrType,

    /// Register assigned to this parameter
    pub reg: IrId,
}

impl IrParameter {
    /// Parameter whose register is assigned when the function is created
    pub fn new(name: impl Into<String>, ty: IrType) -> Self {
        Self {
            name: name.into(),
            ty,
            reg: IrId::invalid(),
        }
    }
}

/// Local variable declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrLocal {
    /// Variable name (for debugging)
    pub name: String,

    /// Variable type
    pub ty: IrType,

    /// Whether this is mutable
    pub mutable: bool,
}

/// Function attributes and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionAttributes {
    /// Linkage type
    pub linkage: Linkage,

    /// Whether this function is pure (no side effects)
    pub pure: bool,

    /// Whether this function never returns
    pub no_return: bool,

    /// Custom attributes
    pub custom: HashMap<String, String>,
}

impl Default for FunctionAttributes {
    fn default() -> Self {
        Self {
            linkage: Linkage::Private,
            pure: false,
            no_return: false,
            custom: HashMap::new(),
        }
    }
}

/// Where a register gets its value
#[derive(Debug, Clone, Copy)]
pub enum RegisterDef<'a> {
    /// Function parameter at the given position
    Param(usize),
    /// Phi node at the head of a block
    Phi {
        block: IrBlockId,
        phi: &'a IrPhiNode,
    },
    /// Instruction inside a block
    Inst {
        block: IrBlockId,
        inst: &'a IrInstruction,
    },
}

impl IrFunction {
    /// Create a new MIR function
    pub fn new(id: IrFunctionId, name: String, signature: IrFunctionSignature) -> Self {
        let mut function = Self {
            id,
            name,
            signature,
            cfg: IrControlFlowGraph::new(),
            locals: HashMap::new(),
            register_types: HashMap::new(),
            attributes: FunctionAttributes::default(),
            next_reg_id: 0,
        };

        // Allocate registers for parameters and register their types
        let param_count = function.signature.parameters.len();
        for i in 0..param_count {
            let reg = function.alloc_reg();
            let param_ty = function.signature.parameters[i].ty.clone();
            function.signature.parameters[i].reg = reg;
            function.register_types.insert(reg, param_ty);
        }

        function
    }

    /// Allocate a new register
    pub fn alloc_reg(&mut self) -> IrId {
        let id = IrId::new(self.next_reg_id);
        self.next_reg_id += 1;
        id
    }

    /// Allocate a new register and record its type
    pub fn alloc_typed_reg(&mut self, ty: IrType) -> IrId {
        let reg = self.alloc_reg();
        self.register_types.insert(reg, ty);
        reg
    }

    /// Declare a local variable
    pub fn declare_local(&mut self, name: String, ty: IrType) -> IrId {
        let reg = self.alloc_reg();
        let local = IrLocal {
            name,
            ty,
            mutable: true,
        };
        self.locals.insert(reg, local);
        reg
    }

    /// Get the entry block
    pub fn entry_block(&self) -> IrBlockId {
        self.cfg.entry_block
    }

    /// Get parameter register by index
    pub fn get_param_reg(&self, index: usize) -> Option<IrId> {
        self.signature.parameters.get(index).map(|p| p.reg)
    }

    /// Registers of pointer-typed parameters, in declaration order
    pub fn pointer_params(&self) -> Vec<IrId> {
        self.signature
            .parameters
            .iter()
            .filter(|p| p.ty.is_pointer())
            .map(|p| p.reg)
            .collect()
    }

    /// Type of a register, if known
    pub fn register_type(&self, reg: IrId) -> Option<&IrType> {
        self.register_types.get(&reg)
    }

    /// Every register definition: parameters first, then the phis and
    /// instructions of each block
    pub fn definitions(&self) -> impl Iterator<Item = (IrId, RegisterDef<'_>)> {
        let params = self
            .signature
            .parameters
            .iter()
            .enumerate()
            .map(|(pos, p)| (p.reg, RegisterDef::Param(pos)));
        let body = self.cfg.blocks.iter().flat_map(|(&block, b)| {
            let phis = b
                .phi_nodes
                .iter()
                .map(move |phi| (phi.dest, RegisterDef::Phi { block, phi }));
            let insts = b.instructions.iter().filter_map(move |inst| {
                inst.dest().map(|dest| (dest, RegisterDef::Inst { block, inst }))
            });
            phis.chain(insts)
        });
        params.chain(body)
    }

    /// Instruction defining `reg`, if it is defined by one
    pub fn defining_inst(&self, reg: IrId) -> Option<&IrInstruction> {
        self.definitions().find_map(|(dest, def)| match def {
            RegisterDef::Inst { inst, .. } if dest == reg => Some(inst),
            _ => None,
        })
    }

    /// Rewrite every use of `old` in the body to `new`: instruction operands,
    /// phi incoming values and terminators. Returns the number of rewritten uses.
    pub fn replace_all_uses(&mut self, old: IrId, new: IrId) -> usize {
        let mut replaced = 0;
        for block in self.cfg.blocks.values_mut() {
            for phi in &mut block.phi_nodes {
                for (_, value) in &mut phi.incoming {
                    if *value == old {
                        *value = new;
                        replaced += 1;
                    }
                }
            }
            for inst in &mut block.instructions {
                replaced += inst.replace_uses(old, new);
            }
            if block.terminator.uses().contains(&old) {
                block.terminator.replace_uses(old, new);
                replaced += 1;
            }
        }
        replaced
    }

    /// Count the uses of `reg` across the body
    pub fn use_count(&self, reg: IrId) -> usize {
        self.cfg
            .blocks
            .values()
            .map(|block| {
                let phis = block
                    .phi_nodes
                    .iter()
                    .flat_map(|phi| phi.incoming.iter())
                    .filter(|(_, value)| *value == reg)
                    .count();
                let insts = block
                    .instructions
                    .iter()
                    .flat_map(|inst| inst.uses())
                    .filter(|used| *used == reg)
                    .count();
                let term = block.terminator.uses().iter().filter(|u| **u == reg).count();
                phis + insts + term
            })
            .sum()
    }

    /// Verify function integrity
    pub fn verify(&self) -> Result<(), String> {
        // Skip verification for extern functions (no body/blocks)
        if self.cfg.blocks.is_empty() {
            return Ok(());
        }

        self.cfg.verify()?;

        if let Some(entry) = self.cfg.get_block(self.cfg.entry_block) {
            if !entry.phi_nodes.is_empty() {
                return Err("Entry block cannot have phi nodes".to_string());
            }
        }

        // SSA: every register is defined exactly once
        let mut defined: HashSet<IrId> = self.signature.parameters.iter().map(|p| p.reg).collect();
        for id in self.cfg.block_ids() {
            let block = &self.cfg.blocks[&id];
            let dests = block
                .phi_nodes
                .iter()
                .map(|phi| phi.dest)
                .chain(block.instructions.iter().filter_map(|inst| inst.dest()));
            for dest in dests {
                if !defined.insert(dest) {
                    return Err(format!(
                        "Register {} defined more than once in {}",
                        dest, self.name
                    ));
                }
            }
        }

        for id in self.cfg.block_ids() {
            let block = &self.cfg.blocks[&id];
            let uses = block
                .phi_nodes
                .iter()
                .flat_map(|phi| phi.incoming.iter().map(|(_, value)| *value))
                .chain(block.instructions.iter().flat_map(|inst| inst.uses()))
                .chain(block.terminator.uses());
            for used in uses {
                if !defined.contains(&used) {
                    return Err(format!(
                        "Register {} used in {} of {} but never defined",
                        used, id, self.name
                    ));
                }
            }
        }

        Ok(())
    }
}
