//! MIR Pass Infrastructure
//!
//! Passes that transform a whole module implement [`OptimizationPass`] and are
//! sequenced by a [`PassManager`]. Each pass runs once per `PassManager::run`;
//! the first failing pass stops the pipeline.

use super::bounds_check::BoundsCheckError;
use super::{IrFunction, IrModule};
use std::collections::HashMap;
use std::fmt;

/// Optimization pass trait
pub trait OptimizationPass {
    /// Get the name of this pass
    fn name(&self) -> &'static str;

    /// Run the pass on a module
    fn run_on_module(&mut self, module: &mut IrModule) -> Result<OptimizationResult, PassError>;

    /// Run the pass on a function (default implementation does nothing)
    fn run_on_function(&mut self, _function: &mut IrFunction) -> Result<OptimizationResult, PassError> {
        Ok(OptimizationResult::unchanged())
    }
}

/// Result of an optimization pass
#[derive(Debug, Clone, Default)]
pub struct OptimizationResult {
    /// Whether the IR was modified
    pub modified: bool,

    /// Number of instructions inserted
    pub instructions_inserted: usize,

    /// Number of instructions eliminated
    pub instructions_eliminated: usize,

    /// Other statistics
    pub stats: HashMap<String, usize>,
}

impl OptimizationResult {
    /// Create a result indicating no changes
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Create a result indicating changes
    pub fn changed() -> Self {
        Self {
            modified: true,
            ..Self::default()
        }
    }

    /// Read a named statistic, zero when absent
    pub fn stat(&self, key: &str) -> usize {
        self.stats.get(key).copied().unwrap_or(0)
    }

    /// Combine results
    pub fn combine(mut self, other: OptimizationResult) -> Self {
        self.modified |= other.modified;
        self.instructions_inserted += other.instructions_inserted;
        self.instructions_eliminated += other.instructions_eliminated;

        for (key, value) in other.stats {
            *self.stats.entry(key).or_insert(0) += value;
        }

        self
    }
}

/// Error raised by a pass
#[derive(Debug, Clone, PartialEq)]
pub enum PassError {
    /// The bounds-check instrumentation could not complete
    BoundsCheck(BoundsCheckError),
    /// The module failed verification after a pass ran
    Verification { pass: &'static str, message: String },
}

impl fmt::Display for PassError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassError::BoundsCheck(err) => write!(f, "bounds check instrumentation failed: {}", err),
            PassError::Verification { pass, message } => {
                write!(f, "module verification failed after {}: {}", pass, message)
            }
        }
    }
}

impl std::error::Error for PassError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PassError::BoundsCheck(err) => Some(err),
            PassError::Verification { .. } => None,
        }
    }
}

impl From<BoundsCheckError> for PassError {
    fn from(err: BoundsCheckError) -> Self {
        PassError::BoundsCheck(err)
    }
}

/// Optimization pass manager
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl PassManager {
    /// Create a new pass manager
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Add a pass to the manager
    pub fn add_pass<P: OptimizationPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    /// Names of the registered passes, in run order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run all passes on a module, once each, in registration order
    pub fn run(&mut self, module: &mut IrModule) -> Result<OptimizationResult, PassError> {
        let mut total_result = OptimizationResult::unchanged();

        for pass in &mut self.passes {
            log::debug!("running pass {} on module {}", pass.name(), module.name);
            let result = pass.run_on_module(module)?;
            total_result = total_result.combine(result);
        }

        Ok(total_result)
    }
}
