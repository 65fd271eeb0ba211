//! Statement lowering core for the Lane C SPMD kernel language.
//!
//! Lane C is a C-like language in which a fixed number of program
//! instances (lanes) execute in lockstep and an execution mask tracks
//! which lanes are live. This crate takes a type-checked statement tree
//! from the front end and lowers it to a control-flow graph that
//! preserves those SPMD semantics, specializing control flow for the
//! all-on / all-off / mixed mask states.
//!
//! Pipeline over a function body (driver's view):
//!
//!   let checked = checker::check_stmt(stmt, &mut symtab, &mut cx);   // None = dropped
//!   let folded  = const_fold::fold_stmt(checked, &mut symtab, &mut cx);
//!   lower::lower_function(name, ret, body, &mut symtab, &mut cx, &mut module)?;
//!
//! The lexer, parser, and resolver run upstream; backend code generation
//! consumes the [`ir`] module's output downstream.

pub mod ast;
pub mod const_fold;
pub mod cost;
pub mod diags;
pub mod error;
pub mod ir;
pub mod lower;
pub mod mask_analysis;
pub mod sym;
pub mod types;

// Re-export the checker from its types/ home, mirroring the type model.
pub use types::checker;

#[cfg(test)]
mod checker_tests;
#[cfg(test)]
mod const_fold_tests;
#[cfg(test)]
mod lower_tests;
#[cfg(test)]
mod mask_analysis_tests;

use std::hash::Hash;
use std::marker::PhantomData;

use indexmap::IndexMap;

pub use error::{CompilerError, Diagnostics, Result};

// =============================================================================
// Generic ID allocation
// =============================================================================

/// Generic counter for generating unique IDs.
///
/// The ID type must implement `From<u32>` to convert the raw counter value.
#[derive(Debug, Clone)]
pub struct IdSource<Id> {
    next_id: u32,
    _phantom: PhantomData<Id>,
}

impl<Id: From<u32>> IdSource<Id> {
    pub fn new() -> Self {
        IdSource {
            next_id: 0,
            _phantom: PhantomData,
        }
    }

    pub fn next_id(&mut self) -> Id {
        let id = Id::from(self.next_id);
        self.next_id += 1;
        id
    }
}

impl<Id: From<u32>> Default for IdSource<Id> {
    fn default() -> Self {
        Self::new()
    }
}

/// Arena that allocates IDs and stores associated items.
///
/// Uses IndexMap for deterministic iteration order (insertion order), so
/// IR dumps and diagnostics are stable run to run.
#[derive(Debug, Clone)]
pub struct IdArena<Id, T> {
    source: IdSource<Id>,
    items: IndexMap<Id, T>,
}

impl<Id: From<u32> + Copy + Eq + Hash, T> IdArena<Id, T> {
    pub fn new() -> Self {
        IdArena {
            source: IdSource::new(),
            items: IndexMap::new(),
        }
    }

    /// Allocate a new ID and store the item.
    pub fn alloc(&mut self, item: T) -> Id {
        let id = self.source.next_id();
        self.items.insert(id, item);
        id
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, Id, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> indexmap::map::IterMut<'_, Id, T> {
        self.items.iter_mut()
    }
}

impl<Id: From<u32> + Copy + Eq + Hash, T> Default for IdArena<Id, T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Compilation context
// =============================================================================

/// Target descriptor: what the backend needs to know about the machine.
#[derive(Debug, Clone)]
pub struct TargetInfo {
    /// Number of program instances running in lockstep.
    pub vector_width: u32,
}

impl Default for TargetInfo {
    fn default() -> Self {
        TargetInfo { vector_width: 8 }
    }
}

/// Optimization and policy switches threaded through the passes.
#[derive(Debug, Clone, Default)]
pub struct OptFlags {
    /// Ignore the user's `cif`/`cdo`/`cfor`/... coherence hints.
    pub disable_coherent_control_flow: bool,
    /// Always emit varying (mask-managed) control flow, even for uniform
    /// tests.
    pub disable_uniform_control_flow: bool,
    /// Store zero instead of an undefined value into variables declared
    /// without an initializer.
    pub zero_initialize_undef: bool,
    /// Emit instrumentation calls at control-flow points.
    pub instrument: bool,
}

/// Everything a pass needs besides the tree it walks: target, switches,
/// and the diagnostic sink.
#[derive(Debug, Default)]
pub struct CompileContext {
    pub target: TargetInfo,
    pub opts: OptFlags,
    pub diags: Diagnostics,
}

impl CompileContext {
    pub fn new(target: TargetInfo, opts: OptFlags) -> Self {
        CompileContext {
            target,
            opts,
            diags: Diagnostics::new(),
        }
    }
}
