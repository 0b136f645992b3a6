// src/sema/types.rs
//!
//! Type and type-pack node variants. Nodes live in a [`TypeArena`] and
//! refer to each other by handle, which lets cyclic types (`type Node =
//! { next: Node? }`) exist without any ownership cycles: the cycle runs
//! through arena indices, and `follow` collapses the `Bound`
//! indirections that unification and alias resolution leave behind.
//!
//! [`TypeArena`]: crate::sema::type_arena::TypeArena

use rustc_hash::FxHashMap;

use crate::frontend::intern::Symbol;
use crate::sema::scope::ScopeId;
use crate::sema::type_arena::{TypeId, TypeIdVec, TypePackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Nil,
    Boolean,
    Number,
    String,
    Thread,
    /// The top table type, as produced by `type(x) == "table"` guards
    Table,
    /// The top function type
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Singleton {
    Bool(bool),
    String(Symbol),
}

/// An inference variable owned by a scope. The scope's level drives
/// generalization in the solver.
#[derive(Debug, Clone, Copy)]
pub struct FreeType {
    pub scope: ScopeId,
}

/// A universally quantified variable bound by a function signature or
/// alias definition scope.
#[derive(Debug, Clone, Copy)]
pub struct GenericType {
    pub scope: ScopeId,
    pub name: Symbol,
}

/// A generic alias application whose expansion the solver performs.
#[derive(Debug, Clone)]
pub struct PendingExpansion {
    pub prefix: Option<Symbol>,
    pub name: Symbol,
    pub type_params: Vec<TypeId>,
    pub type_pack_params: Vec<TypePackId>,
}

#[derive(Debug, Clone)]
pub struct FunctionType {
    pub generics: Vec<TypeId>,
    pub generic_packs: Vec<TypePackId>,
    pub arg_pack: TypePackId,
    pub ret_pack: TypePackId,
    pub arg_names: Vec<Option<Symbol>>,
    pub has_self: bool,
    pub has_no_generics: bool,
}

impl FunctionType {
    pub fn new(arg_pack: TypePackId, ret_pack: TypePackId) -> Self {
        Self {
            generics: Vec::new(),
            generic_packs: Vec::new(),
            arg_pack,
            ret_pack,
            arg_names: Vec::new(),
            has_self: false,
            has_no_generics: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Property {
    pub ty: TypeId,
}

#[derive(Debug, Clone, Copy)]
pub struct TableIndexer {
    pub key_ty: TypeId,
    pub result_ty: TypeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    Free,
    Unsealed,
    Sealed,
    Generic,
}

#[derive(Debug, Clone)]
pub struct TableType {
    pub props: FxHashMap<Symbol, Property>,
    pub indexer: Option<TableIndexer>,
    pub state: TableState,
    pub level: u32,
    pub scope: Option<ScopeId>,
}

impl TableType {
    pub fn new(state: TableState, level: u32, scope: Option<ScopeId>) -> Self {
        Self {
            props: FxHashMap::default(),
            indexer: None,
            state,
            level,
            scope,
        }
    }
}

/// `setmetatable(target, metatable)` result
#[derive(Debug, Clone, Copy)]
pub struct MetatableType {
    pub table: TypeId,
    pub metatable: TypeId,
}

#[derive(Debug, Clone)]
pub struct ClassType {
    pub name: Symbol,
    pub props: FxHashMap<Symbol, Property>,
    pub parent: Option<TypeId>,
    pub metatable: Option<TypeId>,
    pub indexer: Option<TableIndexer>,
    pub defining_module: Option<String>,
}

impl ClassType {
    pub fn new(name: Symbol, parent: Option<TypeId>, defining_module: Option<String>) -> Self {
        Self {
            name,
            props: FxHashMap::default(),
            parent,
            metatable: None,
            indexer: None,
            defining_module,
        }
    }
}

/// A type node. Handle equality after `follow` is type identity.
#[derive(Debug, Clone)]
pub enum Type {
    Primitive(PrimitiveType),
    Singleton(Singleton),
    Free(FreeType),
    Generic(GenericType),
    /// Placeholder the solver must resolve; every one the builder mints
    /// is the output slot of at least one constraint
    Blocked,
    Pending(Box<PendingExpansion>),
    /// Forwarding indirection; `follow` resolves chains of these
    Bound(TypeId),
    Function(Box<FunctionType>),
    Table(Box<TableType>),
    Metatable(MetatableType),
    Class(Box<ClassType>),
    Union(TypeIdVec),
    Intersection(TypeIdVec),
    Negation(TypeId),
    Any,
    Unknown,
    Never,
    /// A type known to be wrong; inference continues around it
    ErrorRecovery,
}

impl Type {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Type::Blocked | Type::Pending(_))
    }

    /// May this node be rebound in place? Only placeholder variants
    /// accept a `Bound` rewrite after publication.
    pub fn is_rebindable(&self) -> bool {
        matches!(self, Type::Free(_) | Type::Blocked | Type::Pending(_))
    }

    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Type::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableType> {
        match self {
            Type::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassType> {
        match self {
            Type::Class(c) => Some(c),
            _ => None,
        }
    }
}

/// A type pack node
#[derive(Debug, Clone)]
pub enum TypePack {
    Pack {
        head: Vec<TypeId>,
        tail: Option<TypePackId>,
    },
    Variadic {
        ty: TypeId,
        /// A hidden variadic admits extra values without making `...`
        /// accessible in the function body
        hidden: bool,
    },
    Generic {
        scope: ScopeId,
        name: Symbol,
    },
    Free {
        scope: ScopeId,
    },
    Bound(TypePackId),
    Blocked,
    ErrorRecovery,
}

impl TypePack {
    pub fn empty() -> Self {
        TypePack::Pack {
            head: Vec::new(),
            tail: None,
        }
    }

    pub fn is_rebindable(&self) -> bool {
        matches!(self, TypePack::Free { .. } | TypePack::Blocked)
    }
}
