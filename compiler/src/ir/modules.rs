//! IR Modules
//!
//! A module is the unit the pass manager runs over: a named set of functions.

use super::{IrFunction, IrFunctionId, IrType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// IR module - represents a compilation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrModule {
    /// Module name
    pub name: String,

    /// Functions defined in this module
    pub functions: HashMap<IrFunctionId, IrFunction>,

    /// Next available function ID
    pub next_function_id: u32,
}

impl IrModule {
    /// Create a new module
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: HashMap::new(),
            next_function_id: 0,
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

    /// Create an empty function in this module and return its ID
    pub fn create_function(&mut self, name: impl Into<String>, return_type: IrType) -> IrFunctionId {
        let id = self.alloc_function_id();
        self.functions
            .insert(id, IrFunction::new(id, name, return_type));
        id
    }

    pub fn get_function(&self, id: IrFunctionId) -> Option<&IrFunction> {
        self.functions.get(&id)
    }

    pub fn get_function_mut(&mut self, id: IrFunctionId) -> Option<&mut IrFunction> {
        self.functions.get_mut(&id)
    }

    /// Find a function by name
    pub fn get_function_by_name(&self, name: &str) -> Option<&IrFunction> {
        self.functions.values().find(|f| f.name == name)
    }

    /// Function IDs in ascending order
    pub fn function_ids(&self) -> Vec<IrFunctionId> {
        let mut ids: Vec<_> = self.functions.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Verify every function in the module
    pub fn verify(&self) -> Result<(), String> {
        for id in self.function_ids() {
            if let Some(func) = self.functions.get(&id) {
                func.verify()
                    .map_err(|e| format!("Function '{}' failed verification: {}", func.name, e))?;
            }
        }
        Ok(())
    }
}
