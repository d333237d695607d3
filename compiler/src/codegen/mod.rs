/// Execution backends for Coco MIR
///
/// - MIR Interpreter: runs modules directly, with element-granular memory
///   and host functions standing in for the runtime library
pub mod mir_interpreter;

pub use mir_interpreter::{CallArgs, HostFunction, InterpError, InterpValue, Memory, MirInterpreter, Pointer};
