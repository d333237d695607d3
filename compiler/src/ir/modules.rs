//! MIR Modules
//!
//! This module defines the top-level compilation unit representation in the MIR,
//! including modules, global variables, and function declarations.

use super::{IrFunction, IrFunctionId, IrFunctionSignature, IrInstruction, IrType, IrValue, Linkage};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// MIR module - represents a compilation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrModule {
    /// Module name
    pub name: String,

    /// Source file path
    pub source_file: String,

    /// Functions defined in this module, in definition order
    pub functions: IndexMap<IrFunctionId, IrFunction>,

    /// Global variables
    pub globals: HashMap<IrGlobalId, IrGlobal>,

    /// External function declarations
    pub extern_functions: IndexMap<IrFunctionId, IrExternFunction>,

    /// Next available IDs
    pub next_function_id: u32,
    pub next_global_id: u32,
}

/// Global variable identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IrGlobalId(pub u32);

impl std::fmt::Display for IrGlobalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Global variable definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrGlobal {
    /// Global identifier
    pub id: IrGlobalId,

    /// Variable name
    pub name: String,

    /// Variable type
    pub ty: IrType,

    /// Initial value (if any)
    pub initializer: Option<IrValue>,

    /// Whether this is mutable
    pub mutable: bool,

    /// Linkage type
    pub linkage: Linkage,
}

/// External function declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrExternFunction {
    /// Function ID
    pub id: IrFunctionId,

    /// Symbol name
    pub name: String,

    /// Function signature
    pub signature: IrFunctionSignature,

    /// Which library/module this comes from
    pub source: String,
}

impl IrModule {
    /// Create a new MIR module
    pub fn new(name: String, source_file: String) -> Self {
        Self {
            name,
            source_file,
            functions: IndexMap::new(),
            globals: HashMap::new(),
            extern_functions: IndexMap::new(),
            next_function_id: 0,
            next_global_id: 0,
        }
    }

    /// Add a function to the module
    pub fn add_function(&mut self, function: IrFunction) -> IrFunctionId {
        let id = function.id;
        self.functions.insert(id, function);
        self.next_function_id = self.next_function_id.max(id.0 + 1);
        id
    }

    /// Allocate a new function ID
    pub fn alloc_function_id(&mut self) -> IrFunctionId {
        let id = IrFunctionId(self.next_function_id);
        self.next_function_id += 1;
        id
    }

    /// Add a global variable
    pub fn add_global(&mut self, global: IrGlobal) -> IrGlobalId {
        let id = global.id;
        self.globals.insert(id, global);
        self.next_global_id = self.next_global_id.max(id.0 + 1);
        id
    }

    /// Allocate a new global ID
    pub fn alloc_global_id(&mut self) -> IrGlobalId {
        let id = IrGlobalId(self.next_global_id);
        self.next_global_id += 1;
        id
    }

    /// Add an external function declaration
    pub fn add_extern_function(&mut self, extern_fn: IrExternFunction) {
        self.next_function_id = self.next_function_id.max(extern_fn.id.0 + 1);
        self.extern_functions.insert(extern_fn.id, extern_fn);
    }

    /// Look up an external declaration by symbol name
    pub fn extern_by_name(&self, name: &str) -> Option<&IrExternFunction> {
        self.extern_functions.values().find(|f| f.name == name)
    }

    /// Look up a defined function by name
    pub fn function_by_name(&self, name: &str) -> Option<&IrFunction> {
        self.functions.values().find(|f| f.name == name)
    }

    /// Return the ID of the external declaration `name`, declaring it with
    /// `signature` first if the module does not have one yet.
    pub fn get_or_insert_extern(&mut self, name: &str, signature: IrFunctionSignature) -> IrFunctionId {
        if let Some(existing) = self.extern_by_name(name) {
            return existing.id;
        }

        let id = self.alloc_function_id();
        self.add_extern_function(IrExternFunction {
            id,
            name: name.to_string(),
            signature,
            source: "runtime".to_string(),
        });
        id
    }

    /// Signature of a callee, defined or external
    pub fn callee_signature(&self, id: IrFunctionId) -> Option<&IrFunctionSignature> {
        self.functions
            .get(&id)
            .map(|f| &f.signature)
            .or_else(|| self.extern_functions.get(&id).map(|f| &f.signature))
    }

    /// Swap the function `old` for `replacement`, keeping its position in
    /// definition order. Returns the removed function.
    pub fn replace_function(&mut self, old: IrFunctionId, replacement: IrFunction) -> Option<IrFunction> {
        let index = self.functions.get_index_of(&old)?;
        let new_id = replacement.id;
        self.next_function_id = self.next_function_id.max(new_id.0 + 1);

        let (_, removed) = self.functions.shift_remove_index(index)?;
        self.functions.insert(new_id, replacement);
        let last = self.functions.len() - 1;
        self.functions.move_index(last, index);
        Some(removed)
    }

    /// Verify module integrity
    pub fn verify(&self) -> Result<(), String> {
        for (id, function) in &self.functions {
            function
                .verify()
                .map_err(|e| format!("Function {} ({}): {}", function.name, id, e))?;

            for block_id in function.cfg.block_ids() {
                let block = &function.cfg.blocks[&block_id];
                for inst in &block.instructions {
                    let IrInstruction::CallDirect { func_id, args, .. } = inst else {
                        continue;
                    };
                    let callee = self.callee_signature(*func_id).ok_or_else(|| {
                        format!(
                            "Function {} calls unknown function {} in {}",
                            function.name, func_id, block_id
                        )
                    })?;
                    if callee.parameters.len() != args.len() {
                        return Err(format!(
                            "Function {} calls {} with {} arguments, expected {}",
                            function.name,
                            func_id,
                            args.len(),
                            callee.parameters.len()
                        ));
                    }
                }

                for inst in &block.instructions {
                    if let IrInstruction::GlobalAddr { global_id, .. } = inst {
                        if !self.globals.contains_key(global_id) {
                            return Err(format!(
                                "Function {} references unknown global {}",
                                function.name, global_id
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
