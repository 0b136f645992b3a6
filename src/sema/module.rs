// src/sema/module.rs
//! Per-module analysis output and the module resolution seam.

use rustc_hash::FxHashMap;

use crate::errors::TypeError;
use crate::frontend::ast::{Expr, NodeId};
use crate::frontend::intern::Symbol;
use crate::sema::scope::{ScopeId, TypeFun};
use crate::sema::type_arena::{TypeId, TypePackId};

/// Identity of a module as known to the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
}

/// Maps require expressions to modules and exposes the exported type
/// bindings of already-analyzed modules. Exported `TypeFun`s must be
/// expressed in the consuming module's arena; transporting types
/// between arenas is the host's concern.
pub trait ModuleResolver {
    fn resolve_module_info(&self, current_module: &str, require_arg: &Expr) -> Option<ModuleInfo>;

    fn exported_types(&self, module: &str) -> Option<&FxHashMap<Symbol, TypeFun>>;
}

/// Resolver that knows no modules; every `require` silently imports
/// nothing
#[derive(Debug, Default)]
pub struct NullResolver;

impl ModuleResolver for NullResolver {
    fn resolve_module_info(&self, _current_module: &str, _require_arg: &Expr) -> Option<ModuleInfo> {
        None
    }

    fn exported_types(&self, _module: &str) -> Option<&FxHashMap<Symbol, TypeFun>> {
        None
    }
}

/// Everything the builder records about a module besides the constraint
/// list itself
#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    /// Inferred type of every visited expression
    pub ast_types: FxHashMap<NodeId, TypeId>,
    /// Inferred pack of every expression checked in pack position
    pub ast_type_packs: FxHashMap<NodeId, TypePackId>,
    /// Expected type recorded where the context supplied one
    pub ast_expected_types: FxHashMap<NodeId, TypeId>,
    /// Resolution of every visited type annotation
    pub ast_resolved_types: FxHashMap<NodeId, TypeId>,
    pub ast_resolved_type_packs: FxHashMap<NodeId, TypePackId>,
    /// Scope opened at each scope-introducing node
    pub ast_scopes: FxHashMap<NodeId, ScopeId>,
    /// Un-instantiated callee type per call expression
    pub ast_original_call_types: FxHashMap<NodeId, TypeId>,
    /// Overload picked by the solver per call expression
    pub ast_overload_resolved_types: FxHashMap<NodeId, TypeId>,
    pub declared_globals: FxHashMap<Symbol, TypeId>,
    pub errors: Vec<TypeError>,
    /// Exported type bindings of the root scope, for consumers
    pub exported_type_bindings: FxHashMap<Symbol, TypeFun>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
