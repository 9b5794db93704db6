//! Optimization pass infrastructure
//!
//! Passes implement [`OptimizationPass`] and are scheduled by a [`PassManager`],
//! which reruns its pipeline until no pass reports a modification.

use super::{IrFunction, IrModule};
use crate::config::VectorizerConfig;
use crate::ir::vectorization::LoadStoreVectorizer;
use std::collections::HashMap;
use tracing::debug;

/// Optimization pass trait
pub trait OptimizationPass {
    /// Get the name of this pass
    fn name(&self) -> &'static str;

    /// Run the pass on a module
    fn run_on_module(&mut self, module: &mut IrModule) -> OptimizationResult;

    /// Run the pass on a function (default implementation does nothing)
    fn run_on_function(&mut self, _function: &mut IrFunction) -> OptimizationResult {
        OptimizationResult::unchanged()
    }
}

/// Result of an optimization pass
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Whether the IR was modified
    pub modified: bool,

    /// Number of instructions eliminated
    pub instructions_eliminated: usize,

    /// Number of blocks eliminated
    pub blocks_eliminated: usize,

    /// Other statistics
    pub stats: HashMap<String, usize>,
}

impl OptimizationResult {
    /// Create a result indicating no changes
    pub fn unchanged() -> Self {
        Self {
            modified: false,
            instructions_eliminated: 0,
            blocks_eliminated: 0,
            stats: HashMap::new(),
        }
    }

    /// Create a result indicating changes
    pub fn changed() -> Self {
        Self {
            modified: true,
            ..Self::unchanged()
        }
    }

    /// Add to a named counter
    pub fn bump(&mut self, key: &str, by: usize) {
        *self.stats.entry(key.to_string()).or_insert(0) += by;
    }

    /// Read a named counter (0 if never bumped)
    pub fn stat(&self, key: &str) -> usize {
        self.stats.get(key).copied().unwrap_or(0)
    }

    /// Combine results
    pub fn combine(mut self, other: OptimizationResult) -> Self {
        self.modified |= other.modified;
        self.instructions_eliminated += other.instructions_eliminated;
        self.blocks_eliminated += other.blocks_eliminated;

        for (key, value) in other.stats {
            *self.stats.entry(key).or_insert(0) += value;
        }

        self
    }
}

/// Optimization pass manager
pub struct PassManager {
    passes: Vec<Box<dyn OptimizationPass>>,

    /// Upper bound on pipeline repetitions
    max_iterations: usize,
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManager {
    /// Create a new pass manager
    pub fn new() -> Self {
        Self {
            passes: Vec::new(),
            max_iterations: 8,
        }
    }

    /// Add a pass to the manager
    pub fn add_pass<P: OptimizationPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Pipeline running the load/store vectorizer with the given configuration
    pub fn vectorize_pipeline(config: VectorizerConfig) -> Self {
        let mut manager = Self::new();
        manager.add_pass(LoadStoreVectorizer::with_config(config));
        manager
    }

    /// Run all passes on a module until nothing changes
    pub fn run(&mut self, module: &mut IrModule) -> OptimizationResult {
        let mut total_result = OptimizationResult::unchanged();

        for iteration in 0..self.max_iterations {
            let mut changed = false;

            for pass in &mut self.passes {
                let result = pass.run_on_module(module);
                debug!(
                    pass = pass.name(),
                    iteration,
                    modified = result.modified,
                    "pass finished"
                );
                changed |= result.modified;
                total_result = total_result.combine(result);
            }

            if !changed {
                break;
            }
        }

        total_result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingPass {
        runs: usize,
        modify_first: bool,
    }

    impl OptimizationPass for CountingPass {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn run_on_module(&mut self, _module: &mut IrModule) -> OptimizationResult {
            self.runs += 1;
            let mut result = if self.modify_first && self.runs == 1 {
                OptimizationResult::changed()
            } else {
                OptimizationResult::unchanged()
            };
            result.bump("runs", 1);
            result
        }
    }

    #[test]
    fn test_pass_manager_reaches_fixed_point() {
        let mut module = IrModule::new("test");
        let mut manager = PassManager::new();
        manager.add_pass(CountingPass {
            runs: 0,
            modify_first: true,
        });
        let result = manager.run(&mut module);
        assert!(result.modified);
        assert_eq!(result.stat("runs"), 2);
        assert_eq!(result.stat("missing"), 0);
    }

    #[test]
    fn test_combine_merges_stats() {
        let mut a = OptimizationResult::unchanged();
        a.bump("x", 2);
        let mut b = OptimizationResult::changed();
        b.bump("x", 3);
        b.instructions_eliminated = 4;
        let c = a.combine(b);
        assert!(c.modified);
        assert_eq!(c.stat("x"), 5);
        assert_eq!(c.instructions_eliminated, 4);
    }

    #[test]
    fn test_vectorize_pipeline() {
        let manager = PassManager::vectorize_pipeline(VectorizerConfig::default());
        assert_eq!(manager.pass_names(), vec!["load-store-vectorizer"]);
    }
}
