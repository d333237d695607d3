//! MIR Register-Based Interpreter
//!
//! Executes MIR directly, without compilation. Used to run instrumented
//! programs in tests and benchmarks.
//!
//! ## Design
//! - **Register-based execution**: one register file per call frame, indexed by `IrId`
//! - Phi nodes are resolved against the block control came from
//! - **Element-granular memory**: every allocation is a region of element
//!   cells, and pointers are `(region, element index)` pairs. An access outside
//!   a region is a [`InterpError::MemoryFault`] instead of undefined behavior.
//! - External functions are host functions looked up by symbol name; the
//!   bounds-check runtime is registered by default and reports a failed check
//!   as [`InterpError::ProcessExit`] rather than exiting the host process.

use crate::ir::{
    BinaryOp, CompareOp, IrBlockId, IrFunction, IrFunctionId, IrGlobalId, IrId, IrInstruction,
    IrModule, IrTerminator, IrType, IrValue,
};
use coco_runtime::{check_bounds, report_violation, BOUNDS_VIOLATION_EXIT_CODE, CHECK_BOUNDS_SYMBOL};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;

/// Call arguments; most calls take a handful
pub type CallArgs = SmallVec<[InterpValue; 4]>;

/// Host implementation of an external function
pub type HostFunction = fn(&[InterpValue]) -> Result<InterpValue, InterpError>;

/// Address of one element cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointer {
    pub region: usize,
    pub index: i64,
}

impl Pointer {
    fn offset(self, by: i64) -> Self {
        Self {
            region: self.region,
            index: self.index.wrapping_add(by),
        }
    }
}

/// MIR interpreter value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpValue {
    #[default]
    Void,
    Bool(bool),
    /// Any integer, sign- or zero-extended from its MIR type
    Int(i64),
    Ptr(Pointer),
    Null,
}

impl InterpValue {
    /// Convert to boolean (for conditionals)
    pub fn to_bool(&self) -> Result<bool, InterpError> {
        match self {
            InterpValue::Bool(b) => Ok(*b),
            InterpValue::Int(n) => Ok(*n != 0),
            InterpValue::Null => Ok(false),
            InterpValue::Ptr(_) => Ok(true),
            InterpValue::Void => Err(InterpError::TypeError("void used as a condition".to_string())),
        }
    }

    /// Convert to i64 (for integer operations)
    pub fn to_i64(&self) -> Result<i64, InterpError> {
        match self {
            InterpValue::Int(n) => Ok(*n),
            InterpValue::Bool(b) => Ok(*b as i64),
            other => Err(InterpError::TypeError(format!("cannot convert {:?} to an integer", other))),
        }
    }

    pub fn to_pointer(&self) -> Result<Pointer, InterpError> {
        match self {
            InterpValue::Ptr(ptr) => Ok(*ptr),
            InterpValue::Null => Err(InterpError::NullDereference),
            other => Err(InterpError::TypeError(format!("cannot use {:?} as a pointer", other))),
        }
    }

    fn from_const(value: &IrValue) -> Self {
        match value {
            IrValue::Void | IrValue::Undef | IrValue::Array(_) => InterpValue::Void,
            IrValue::Null => InterpValue::Null,
            IrValue::Bool(b) => InterpValue::Bool(*b),
            other => other.as_i64().map(InterpValue::Int).unwrap_or_default(),
        }
    }
}

impl fmt::Display for InterpValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpValue::Void => write!(f, "void"),
            InterpValue::Bool(b) => write!(f, "{}", b),
            InterpValue::Int(n) => write!(f, "{}", n),
            InterpValue::Ptr(ptr) => write!(f, "&r{}[{}]", ptr.region, ptr.index),
            InterpValue::Null => write!(f, "null"),
        }
    }
}

/// Truncate `value` to the width of integer type `ty`, extending it back to 64 bits
fn wrap_to(ty: &IrType, value: i64) -> i64 {
    match ty {
        IrType::I8 => value as i8 as i64,
        IrType::I16 => value as i16 as i64,
        IrType::I32 => value as i32 as i64,
        IrType::U8 => value as u8 as i64,
        IrType::U16 => value as u16 as i64,
        IrType::U32 => value as u32 as i64,
        _ => value,
    }
}

/// Number of element cells one value of `ty` occupies
fn cell_count(ty: &IrType) -> usize {
    match ty {
        IrType::Array(elem, len) => len.saturating_mul(cell_count(elem)),
        _ => 1,
    }
}

/// One allocation: a run of element cells
#[derive(Debug)]
struct Region {
    cells: Vec<InterpValue>,
}

/// Interpreter memory
#[derive(Debug, Default)]
pub struct Memory {
    regions: Vec<Region>,
}

impl Memory {
    /// Allocate `len` cells initialized to `fill`
    pub fn allocate(&mut self, len: usize, fill: InterpValue) -> Pointer {
        self.regions.push(Region {
            cells: vec![fill; len],
        });
        Pointer {
            region: self.regions.len() - 1,
            index: 0,
        }
    }

    /// Allocate a region holding `values`
    pub fn allocate_with(&mut self, values: Vec<InterpValue>) -> Pointer {
        self.regions.push(Region { cells: values });
        Pointer {
            region: self.regions.len() - 1,
            index: 0,
        }
    }

    fn cell_mut(&mut self, ptr: Pointer) -> Result<&mut InterpValue, InterpError> {
        let region = self
            .regions
            .get_mut(ptr.region)
            .ok_or(InterpError::MemoryFault {
                region: ptr.region,
                index: ptr.index,
                len: 0,
            })?;
        let len = region.cells.len();
        usize::try_from(ptr.index)
            .ok()
            .and_then(|index| region.cells.get_mut(index))
            .ok_or(InterpError::MemoryFault {
                region: ptr.region,
                index: ptr.index,
                len,
            })
    }

    pub fn load(&mut self, ptr: Pointer) -> Result<InterpValue, InterpError> {
        self.cell_mut(ptr).map(|cell| *cell)
    }

    pub fn store(&mut self, ptr: Pointer, value: InterpValue) -> Result<(), InterpError> {
        *self.cell_mut(ptr)? = value;
        Ok(())
    }

    /// Number of live regions
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }
}

/// Register storage of one call frame
#[derive(Debug)]
struct RegisterFile {
    registers: Vec<InterpValue>,
}

impl RegisterFile {
    fn new(register_count: usize) -> Self {
        Self {
            registers: vec![InterpValue::Void; register_count],
        }
    }

    #[inline]
    fn get(&self, reg: IrId) -> InterpValue {
        self.registers
            .get(reg.as_u32() as usize)
            .copied()
            .unwrap_or_default()
    }

    #[inline]
    fn set(&mut self, reg: IrId, value: InterpValue) {
        let idx = reg.as_u32() as usize;
        if idx >= self.registers.len() {
            self.registers.resize(idx + 1, InterpValue::Void);
        }
        self.registers[idx] = value;
    }
}

/// Outcome of a block terminator
enum TerminatorResult {
    Continue(IrBlockId),
    Return(InterpValue),
}

/// Host side of the bounds check: a failed check ends the interpreted process
fn host_check_bounds(args: &[InterpValue]) -> Result<InterpValue, InterpError> {
    let [offset, capacity] = args else {
        return Err(InterpError::TypeError(format!(
            "{} expects 2 arguments, got {}",
            CHECK_BOUNDS_SYMBOL,
            args.len()
        )));
    };
    let offset = offset.to_i64()? as i32;
    let capacity = capacity.to_i64()? as i32;
    if let Err(violation) = check_bounds(offset, capacity) {
        report_violation(violation);
        tracing::debug!("bounds check failed: {}", violation);
        return Err(InterpError::ProcessExit {
            status: BOUNDS_VIOLATION_EXIT_CODE,
        });
    }
    Ok(InterpValue::Void)
}

/// MIR Register-Based Interpreter
pub struct MirInterpreter {
    /// Host functions backing extern declarations, by symbol
    host_functions: HashMap<String, HostFunction>,

    /// Element memory shared by all frames
    memory: Memory,

    /// Regions of module globals, created on first use
    globals: HashMap<IrGlobalId, Pointer>,

    /// Current call depth
    depth: usize,

    /// Maximum call depth (prevent stack overflow)
    max_stack_depth: usize,
}

impl Default for MirInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl MirInterpreter {
    /// Create an interpreter with the bounds-check runtime registered
    pub fn new() -> Self {
        let mut interp = Self {
            host_functions: HashMap::new(),
            memory: Memory::default(),
            globals: HashMap::new(),
            depth: 0,
            max_stack_depth: 1000,
        };
        interp.register_host_function(CHECK_BOUNDS_SYMBOL, host_check_bounds);
        interp
    }

    /// Register a host function for the extern symbol `name`
    pub fn register_host_function(&mut self, name: &str, function: HostFunction) {
        self.host_functions.insert(name.to_string(), function);
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// Run the function called `entry` as a process entry point and return its
    /// exit status.
    ///
    /// An entry taking `(count, args)` receives `args` as an array of
    /// NUL-terminated byte strings. A [`InterpError::ProcessExit`] raised
    /// anywhere in the program becomes the status.
    pub fn run_main(&mut self, module: &IrModule, entry: &str, args: &[&str]) -> Result<i32, InterpError> {
        let function = module
            .function_by_name(entry)
            .ok_or_else(|| InterpError::EntryNotFound(entry.to_string()))?;

        let mut call_args = CallArgs::new();
        if function.signature.parameters.len() == 2 {
            let strings: Vec<InterpValue> = args
                .iter()
                .map(|arg| {
                    let bytes = arg
                        .bytes()
                        .map(|b| InterpValue::Int(b as i64))
                        .chain(std::iter::once(InterpValue::Int(0)))
                        .collect();
                    InterpValue::Ptr(self.memory.allocate_with(bytes))
                })
                .collect();
            call_args.push(InterpValue::Int(args.len() as i64));
            call_args.push(InterpValue::Ptr(self.memory.allocate_with(strings)));
        }

        match self.execute(module, function.id, &call_args) {
            Ok(InterpValue::Int(status)) => Ok(status as i32),
            Ok(_) => Ok(0),
            Err(InterpError::ProcessExit { status }) => Ok(status),
            Err(err) => Err(err),
        }
    }

    /// Execute a function and return the result
    pub fn execute(
        &mut self,
        module: &IrModule,
        func_id: IrFunctionId,
        args: &[InterpValue],
    ) -> Result<InterpValue, InterpError> {
        let function = module
            .functions
            .get(&func_id)
            .ok_or(InterpError::FunctionNotFound(func_id))?;

        if self.depth >= self.max_stack_depth {
            return Err(InterpError::StackOverflow);
        }
        if args.len() != function.signature.parameters.len() {
            return Err(InterpError::TypeError(format!(
                "{} expects {} arguments, got {}",
                function.name,
                function.signature.parameters.len(),
                args.len()
            )));
        }

        tracing::trace!("call {} ({}) with {} argument(s)", function.name, func_id, args.len());

        let mut registers = RegisterFile::new(function.next_reg_id as usize);
        for (param, arg) in function.signature.parameters.iter().zip(args) {
            registers.set(param.reg, *arg);
        }

        self.depth += 1;
        let result = self.execute_function(module, function, &mut registers);
        self.depth -= 1;
        result
    }

    fn execute_function(
        &mut self,
        module: &IrModule,
        function: &IrFunction,
        registers: &mut RegisterFile,
    ) -> Result<InterpValue, InterpError> {
        let mut current = function.entry_block();
        let mut prev: Option<IrBlockId> = None;

        loop {
            let block = function
                .cfg
                .get_block(current)
                .ok_or(InterpError::BlockNotFound(current))?;

            // All phis read their inputs before any of them is written
            if let Some(prev) = prev {
                let values: SmallVec<[(IrId, InterpValue); 4]> = block
                    .phi_nodes
                    .iter()
                    .filter_map(|phi| {
                        phi.incoming
                            .iter()
                            .find(|(pred, _)| *pred == prev)
                            .map(|(_, value)| (phi.dest, registers.get(*value)))
                    })
                    .collect();
                for (dest, value) in values {
                    registers.set(dest, value);
                }
            }

            for inst in &block.instructions {
                self.execute_instruction(module, function, registers, inst)?;
            }

            match self.execute_terminator(registers, &block.terminator)? {
                TerminatorResult::Continue(next) => {
                    prev = Some(current);
                    current = next;
                }
                TerminatorResult::Return(value) => return Ok(value),
            }
        }
    }

    fn execute_instruction(
        &mut self,
        module: &IrModule,
        function: &IrFunction,
        registers: &mut RegisterFile,
        inst: &IrInstruction,
    ) -> Result<(), InterpError> {
        match inst {
            IrInstruction::Const { dest, value } => {
                registers.set(*dest, InterpValue::from_const(value));
            }
            IrInstruction::Copy { dest, src } => {
                registers.set(*dest, registers.get(*src));
            }
            IrInstruction::Load { dest, ptr, .. } => {
                let ptr = registers.get(*ptr).to_pointer()?;
                let value = self.memory.load(ptr)?;
                registers.set(*dest, value);
            }
            IrInstruction::Store { ptr, value } => {
                let ptr = registers.get(*ptr).to_pointer()?;
                self.memory.store(ptr, registers.get(*value))?;
            }
            IrInstruction::BinOp {
                dest,
                op,
                left,
                right,
            } => {
                let left = registers.get(*left).to_i64()?;
                let right = registers.get(*right).to_i64()?;
                let ty = function.register_type(*dest).cloned().unwrap_or(IrType::I64);
                let result = eval_binop(*op, left, right, &ty)?;
                registers.set(*dest, InterpValue::Int(wrap_to(&ty, result)));
            }
            IrInstruction::Cmp {
                dest,
                op,
                left,
                right,
            } => {
                let result = eval_cmp(*op, registers.get(*left), registers.get(*right))?;
                registers.set(*dest, InterpValue::Bool(result));
            }
            IrInstruction::CallDirect {
                dest,
                func_id,
                args,
            } => {
                let args: CallArgs = args.iter().map(|arg| registers.get(*arg)).collect();
                let result = self.call(module, *func_id, &args)?;
                if let Some(dest) = dest {
                    registers.set(*dest, result);
                }
            }
            IrInstruction::Alloc { dest, ty, count } => {
                let count = match count {
                    Some(reg) => registers.get(*reg).to_i64()?,
                    None => 1,
                };
                let count = usize::try_from(count)
                    .map_err(|_| InterpError::RuntimeError(format!("negative allocation count {}", count)))?;
                let fill = InterpValue::from_const(&element_type(ty).default_value());
                let ptr = self.memory.allocate(count.saturating_mul(cell_count(ty)), fill);
                registers.set(*dest, InterpValue::Ptr(ptr));
            }
            IrInstruction::GlobalAddr { dest, global_id } => {
                let ptr = self.global_region(module, *global_id)?;
                registers.set(*dest, InterpValue::Ptr(ptr));
            }
            IrInstruction::GetElementPtr {
                dest,
                ptr,
                indices,
                ty,
            } => {
                let base = registers.get(*ptr).to_pointer()?;
                let offset = match indices.as_slice() {
                    [index] => {
                        if ty.is_struct() {
                            return Err(InterpError::RuntimeError("struct field access".to_string()));
                        }
                        registers.get(*index).to_i64()? * cell_count(ty) as i64
                    }
                    _ => {
                        let pointee = function
                            .register_type(*ptr)
                            .and_then(|t| t.pointee())
                            .cloned()
                            .unwrap_or(IrType::I64);
                        nested_offset(registers, &pointee, indices)?
                    }
                };
                registers.set(*dest, InterpValue::Ptr(base.offset(offset)));
            }
            IrInstruction::Cast {
                dest, src, to_ty, ..
            } => {
                let value = registers.get(*src);
                let cast = match (value, to_ty) {
                    (_, IrType::Bool) => InterpValue::Bool(value.to_bool()?),
                    (InterpValue::Ptr(_) | InterpValue::Null, IrType::Ptr(_)) => value,
                    (_, ty) if ty.is_integer() => InterpValue::Int(wrap_to(ty, value.to_i64()?)),
                    _ => {
                        return Err(InterpError::TypeError(format!(
                            "cannot cast {:?} to {}",
                            value, to_ty
                        )))
                    }
                };
                registers.set(*dest, cast);
            }
        }
        Ok(())
    }

    fn call(&mut self, module: &IrModule, func_id: IrFunctionId, args: &[InterpValue]) -> Result<InterpValue, InterpError> {
        if module.functions.contains_key(&func_id) {
            return self.execute(module, func_id, args);
        }

        let extern_fn = module
            .extern_functions
            .get(&func_id)
            .ok_or(InterpError::FunctionNotFound(func_id))?;
        let host = self
            .host_functions
            .get(&extern_fn.name)
            .ok_or_else(|| InterpError::UnknownExtern(extern_fn.name.clone()))?;
        tracing::trace!("host call {}({:?})", extern_fn.name, args);
        host(args)
    }

    fn execute_terminator(
        &self,
        registers: &RegisterFile,
        terminator: &IrTerminator,
    ) -> Result<TerminatorResult, InterpError> {
        match terminator {
            IrTerminator::Branch { target } => Ok(TerminatorResult::Continue(*target)),
            IrTerminator::CondBranch {
                condition,
                true_target,
                false_target,
            } => {
                let next = if registers.get(*condition).to_bool()? {
                    *true_target
                } else {
                    *false_target
                };
                Ok(TerminatorResult::Continue(next))
            }
            IrTerminator::Return { value } => Ok(TerminatorResult::Return(
                value.map(|v| registers.get(v)).unwrap_or_default(),
            )),
            IrTerminator::Unreachable => Err(InterpError::RuntimeError("reached unreachable code".to_string())),
        }
    }

    fn global_region(&mut self, module: &IrModule, id: IrGlobalId) -> Result<Pointer, InterpError> {
        if let Some(ptr) = self.globals.get(&id) {
            return Ok(*ptr);
        }
        let global = module.globals.get(&id).ok_or(InterpError::GlobalNotFound(id))?;
        let mut cells = Vec::with_capacity(cell_count(&global.ty));
        if let Some(init) = &global.initializer {
            flatten_const(init, &mut cells);
        }
        let fill = InterpValue::from_const(&element_type(&global.ty).default_value());
        cells.resize(cell_count(&global.ty), fill);
        let ptr = self.memory.allocate_with(cells);
        self.globals.insert(id, ptr);
        Ok(ptr)
    }
}

/// Innermost non-array type of `ty`
fn element_type(ty: &IrType) -> &IrType {
    match ty {
        IrType::Array(elem, _) => element_type(elem),
        other => other,
    }
}

fn flatten_const(value: &IrValue, out: &mut Vec<InterpValue>) {
    match value {
        IrValue::Array(elems) => elems.iter().for_each(|e| flatten_const(e, out)),
        other => out.push(InterpValue::from_const(other)),
    }
}

/// Cell offset of a multi-index access into nested arrays
fn nested_offset(registers: &RegisterFile, pointee: &IrType, indices: &[IrId]) -> Result<i64, InterpError> {
    let mut ty = pointee;
    let mut offset = 0i64;
    for (i, index) in indices.iter().enumerate() {
        let index = registers.get(*index).to_i64()?;
        if i == 0 {
            offset = index * cell_count(ty) as i64;
            continue;
        }
        match ty {
            IrType::Array(elem, _) => {
                offset += index * cell_count(elem) as i64;
                ty = elem;
            }
            other => {
                return Err(InterpError::TypeError(format!("cannot index into {}", other)));
            }
        }
    }
    Ok(offset)
}

fn eval_binop(op: BinaryOp, left: i64, right: i64, ty: &IrType) -> Result<i64, InterpError> {
    let signed = !matches!(ty, IrType::U8 | IrType::U16 | IrType::U32 | IrType::U64);
    Ok(match op {
        BinaryOp::Add => left.wrapping_add(right),
        BinaryOp::Sub => left.wrapping_sub(right),
        BinaryOp::Mul => left.wrapping_mul(right),
        BinaryOp::Div | BinaryOp::Rem if right == 0 => {
            return Err(InterpError::RuntimeError("division by zero".to_string()))
        }
        BinaryOp::Div if signed => left.wrapping_div(right),
        BinaryOp::Div => ((left as u64) / (right as u64)) as i64,
        BinaryOp::Rem if signed => left.wrapping_rem(right),
        BinaryOp::Rem => ((left as u64) % (right as u64)) as i64,
        BinaryOp::And => left & right,
        BinaryOp::Or => left | right,
        BinaryOp::Xor => left ^ right,
        BinaryOp::Shl => left.wrapping_shl(right as u32),
        BinaryOp::Shr if signed => left.wrapping_shr(right as u32),
        BinaryOp::Shr => ((left as u64).wrapping_shr(right as u32)) as i64,
    })
}

fn eval_cmp(op: CompareOp, left: InterpValue, right: InterpValue) -> Result<bool, InterpError> {
    let ordering = match (left, right) {
        (InterpValue::Ptr(a), InterpValue::Ptr(b)) if a.region == b.region => a.index.cmp(&b.index),
        (InterpValue::Ptr(_), InterpValue::Ptr(_)) => {
            return match op {
                CompareOp::Eq => Ok(false),
                CompareOp::Ne => Ok(true),
                _ => Err(InterpError::TypeError("ordering pointers into different allocations".to_string())),
            }
        }
        (InterpValue::Null, InterpValue::Null) => std::cmp::Ordering::Equal,
        (InterpValue::Null, InterpValue::Ptr(_)) | (InterpValue::Ptr(_), InterpValue::Null) => {
            return Ok(op == CompareOp::Ne)
        }
        (a, b) => a.to_i64()?.cmp(&b.to_i64()?),
    };
    Ok(match op {
        CompareOp::Eq => ordering.is_eq(),
        CompareOp::Ne => ordering.is_ne(),
        CompareOp::Lt => ordering.is_lt(),
        CompareOp::Le => ordering.is_le(),
        CompareOp::Gt => ordering.is_gt(),
        CompareOp::Ge => ordering.is_ge(),
    })
}

/// Interpreter error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpError {
    FunctionNotFound(IrFunctionId),
    EntryNotFound(String),
    BlockNotFound(IrBlockId),
    GlobalNotFound(IrGlobalId),
    /// Extern declaration with no registered host function
    UnknownExtern(String),
    StackOverflow,
    TypeError(String),
    RuntimeError(String),
    NullDereference,
    /// Access outside the cells of an allocation
    MemoryFault { region: usize, index: i64, len: usize },
    /// The program asked to terminate the process
    ProcessExit { status: i32 },
}

impl fmt::Display for InterpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpError::FunctionNotFound(id) => write!(f, "Function not found: {}", id),
            InterpError::EntryNotFound(name) => write!(f, "Entry function not found: {}", name),
            InterpError::BlockNotFound(id) => write!(f, "Block not found: {}", id),
            InterpError::GlobalNotFound(id) => write!(f, "Global not found: {}", id),
            InterpError::UnknownExtern(name) => write!(f, "No host function for extern {}", name),
            InterpError::StackOverflow => write!(f, "Stack overflow"),
            InterpError::TypeError(msg) => write!(f, "Type error: {}", msg),
            InterpError::RuntimeError(msg) => write!(f, "Runtime error: {}", msg),
            InterpError::NullDereference => write!(f, "Null pointer dereference"),
            InterpError::MemoryFault { region, index, len } => write!(
                f,
                "Memory fault: element {} of region {} with {} element(s)",
                index, region, len
            ),
            InterpError::ProcessExit { status } => write!(f, "Process exited with status {}", status),
        }
    }
}

impl std::error::Error for InterpError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionSignatureBuilder, IrBuilder};

    #[test]
    fn test_interp_value_conversions() {
        assert_eq!(InterpValue::Int(42).to_i64().unwrap(), 42);
        assert!(InterpValue::Int(42).to_bool().unwrap());
        assert!(!InterpValue::Int(0).to_bool().unwrap());
        assert_eq!(InterpValue::Null.to_pointer(), Err(InterpError::NullDereference));
        assert!(InterpValue::Void.to_i64().is_err());
    }

    #[test]
    fn test_wrapping_to_type_width() {
        assert_eq!(wrap_to(&IrType::I8, 200), -56);
        assert_eq!(wrap_to(&IrType::U8, -1), 255);
        assert_eq!(wrap_to(&IrType::I32, i64::from(i32::MAX) + 1), i64::from(i32::MIN));
        assert_eq!(cell_count(&IrType::array(IrType::array(IrType::I32, 3), 4)), 12);
    }

    #[test]
    fn test_memory_fault_outside_region() {
        let mut memory = Memory::default();
        let ptr = memory.allocate(2, InterpValue::Int(0));
        memory.store(ptr.offset(1), InterpValue::Int(7)).unwrap();
        assert_eq!(memory.load(ptr.offset(1)), Ok(InterpValue::Int(7)));
        assert_eq!(
            memory.load(ptr.offset(2)),
            Err(InterpError::MemoryFault {
                region: ptr.region,
                index: 2,
                len: 2
            })
        );
        assert!(memory.load(ptr.offset(-1)).is_err());
    }

    #[test]
    fn test_loop_sums_array() {
        // sum = 0; for i in 0..4 { a[i] = i; sum += a[i] }
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new().returns(IrType::I32).build();
        let id = builder.start_function("sum".to_string(), sig);
        let entry = builder.current_block().unwrap();
        let four = builder.build_int(4, IrType::I32).unwrap();
        let zero = builder.build_int(0, IrType::I32).unwrap();
        let one = builder.build_int(1, IrType::I32).unwrap();
        let arr = builder.build_alloc(IrType::I32, Some(four)).unwrap();
        let head = builder.create_block().unwrap();
        let body = builder.create_block().unwrap();
        let exit = builder.create_block().unwrap();
        builder.build_branch(head).unwrap();

        builder.switch_to_block(head);
        let i = builder.build_phi(head, IrType::I32).unwrap();
        let sum = builder.build_phi(head, IrType::I32).unwrap();
        let more = builder.build_cmp(CompareOp::Lt, i, four).unwrap();
        builder.build_cond_branch(more, body, exit).unwrap();

        builder.switch_to_block(body);
        let slot = builder.build_gep(arr, vec![i], IrType::I32).unwrap();
        builder.build_store(slot, i).unwrap();
        let loaded = builder.build_load(slot, IrType::I32).unwrap();
        let next_sum = builder.build_add(sum, loaded).unwrap();
        let next_i = builder.build_add(i, one).unwrap();
        builder.build_branch(head).unwrap();

        builder.add_phi_incoming(head, i, entry, zero).unwrap();
        builder.add_phi_incoming(head, i, body, next_i).unwrap();
        builder.add_phi_incoming(head, sum, entry, zero).unwrap();
        builder.add_phi_incoming(head, sum, body, next_sum).unwrap();

        builder.switch_to_block(exit);
        builder.build_return(Some(sum)).unwrap();
        builder.finish_function();
        let module = builder.finish();

        let mut interp = MirInterpreter::new();
        assert_eq!(interp.execute(&module, id, &[]), Ok(InterpValue::Int(6)));
    }

    #[test]
    fn test_global_initializer_is_readable() {
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let init = IrValue::Array(vec![IrValue::I32(5), IrValue::I32(6), IrValue::I32(7)]);
        let table = builder.add_global("table", IrType::array(IrType::I32, 3), Some(init));
        let sig = FunctionSignatureBuilder::new().returns(IrType::I32).build();
        let id = builder.start_function("third".to_string(), sig);
        let addr = builder.build_global_addr(table).unwrap();
        let two = builder.build_int(2, IrType::I32).unwrap();
        let slot = builder.build_gep(addr, vec![two], IrType::I32).unwrap();
        let value = builder.build_load(slot, IrType::I32).unwrap();
        builder.build_return(Some(value)).unwrap();
        builder.finish_function();
        let module = builder.finish();

        let mut interp = MirInterpreter::new();
        assert_eq!(interp.execute(&module, id, &[]), Ok(InterpValue::Int(7)));
    }

    #[test]
    fn test_failed_check_exits_with_einval() {
        assert_eq!(host_check_bounds(&[InterpValue::Int(3), InterpValue::Int(4)]), Ok(InterpValue::Void));
        assert_eq!(
            host_check_bounds(&[InterpValue::Int(4), InterpValue::Int(4)]),
            Err(InterpError::ProcessExit { status: 22 })
        );
        assert!(host_check_bounds(&[InterpValue::Int(4)]).is_err());
    }

    #[test]
    fn test_run_main_passes_arguments() {
        // main(argc, argv) returns argc
        let mut builder = IrBuilder::new("t".to_string(), "t.coco".to_string());
        let sig = FunctionSignatureBuilder::new()
            .param("argc", IrType::I32)
            .param("argv", IrType::ptr(IrType::ptr(IrType::U8)))
            .returns(IrType::I32)
            .build();
        builder.start_function("main".to_string(), sig);
        let argc = builder.param(0).unwrap();
        builder.build_return(Some(argc)).unwrap();
        builder.finish_function();
        let module = builder.finish();

        let mut interp = MirInterpreter::new();
        assert_eq!(interp.run_main(&module, "main", &["prog", "x"]), Ok(2));
        assert_eq!(
            interp.run_main(&module, "start", &[]),
            Err(InterpError::EntryNotFound("start".to_string()))
        );
    }
}
