// src/sema/mod.rs
pub mod builder;
pub mod builtins;
pub mod constraint;
pub mod fallthrough;
pub mod module;
pub mod refinements;
pub mod scope;
pub mod type_arena;
pub mod types;

pub use builder::{BuildResult, ConstraintGraphBuilder};
pub use builtins::BuiltinTypes;
pub use constraint::{Constraint, ConstraintId, ConstraintKind};
pub use module::{Module, ModuleInfo, ModuleResolver, NullResolver};
pub use refinements::{Refinement, RefinementArena, RefinementId};
pub use scope::{Binding, Scope, ScopeArena, ScopeId, TypeFun};
pub use type_arena::{TypeArena, TypeId, TypeIdVec, TypePackId};
pub use types::{
    ClassType, FunctionType, MetatableType, PendingExpansion, PrimitiveType, Property, Singleton,
    TableIndexer, TableState, TableType, Type, TypePack,
};
