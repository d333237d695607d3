pub mod ir;
pub mod codegen;
pub mod logging;
