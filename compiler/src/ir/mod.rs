//! Intermediate Representation (IR) for the load/store vectorizer
//!
//! This module defines a small, low-level SSA representation that the
//! vectorization passes operate on. The IR is designed to be:
//! - Simple and explicit (no implicit operations)
//! - Strongly typed with explicit type information on every memory access
//! - Easy to mutate in place (instructions live in a per-function arena and are
//!   addressed through stable [`InstId`] handles)

pub mod types;
pub mod instructions;
pub mod blocks;
pub mod functions;
pub mod modules;
pub mod builder;
pub mod dump;
pub mod dominance;
pub mod interpreter;
pub mod optimization;
pub mod analysis;
pub mod vectorization;

pub use types::*;
pub use instructions::*;
pub use blocks::*;
pub use functions::*;
pub use modules::*;
pub use builder::*;

use serde::{Deserialize, Serialize};
use std::fmt;

/// IR version for compatibility checking
pub const IR_VERSION: u32 = 1;

/// Unique identifier for SSA values (registers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IrId(u32);

impl IrId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn invalid() -> Self {
        Self(u32::MAX)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != u32::MAX
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for IrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// Stable handle of an instruction inside its function's arena.
///
/// Handles survive insertion, movement and erasure of other instructions.
/// An erased instruction's handle is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstId(pub u32);

impl InstId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source location information for debugging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IrSourceLocation {
    pub file_id: u32,
    pub line: u32,
    pub column: u32,
}

impl IrSourceLocation {
    pub fn unknown() -> Self {
        Self {
            file_id: 0,
            line: 0,
            column: 0,
        }
    }

    pub fn new(file_id: u32, line: u32, column: u32) -> Self {
        Self {
            file_id,
            line,
            column,
        }
    }
}
