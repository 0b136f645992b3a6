// src/sema/scope.rs
//
// Lexical scopes. Scopes live in a ScopeArena and link to their parent
// by id, so constraints can reference a scope long after the builder's
// traversal has left it. Name lookups walk the parent chain; def
// lookups consult the flow-sensitive refinement map at each level
// before falling back to declared bindings.

use hashbrown::HashMap;
use rustc_hash::FxHashMap;

use crate::dfg::DefId;
use crate::frontend::Span;
use crate::frontend::intern::Symbol;
use crate::sema::type_arena::{TypeId, TypePackId};

/// Handle to a scope in the [`ScopeArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy)]
pub struct Binding {
    pub ty: TypeId,
    pub span: Span,
}

/// A named, possibly parameterized type: the value of a type alias
/// binding. Non-generic aliases have empty parameter lists.
#[derive(Debug, Clone)]
pub struct TypeFun {
    pub ty: TypeId,
    pub type_params: Vec<GenericTypeDef>,
    pub type_pack_params: Vec<GenericPackDef>,
}

impl TypeFun {
    pub fn monomorphic(ty: TypeId) -> Self {
        Self {
            ty,
            type_params: Vec::new(),
            type_pack_params: Vec::new(),
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty() || !self.type_pack_params.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct GenericTypeDef {
    pub ty: TypeId,
    pub default: Option<TypeId>,
}

#[derive(Debug, Clone)]
pub struct GenericPackDef {
    pub pack: TypePackId,
    pub default: Option<TypePackId>,
}

#[derive(Debug)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Nesting depth, used as the type level for generalization
    pub level: u32,
    pub bindings: FxHashMap<Symbol, Binding>,
    pub private_type_bindings: FxHashMap<Symbol, TypeFun>,
    pub exported_type_bindings: FxHashMap<Symbol, TypeFun>,
    pub private_type_pack_bindings: FxHashMap<Symbol, TypePackId>,
    pub exported_type_pack_bindings: FxHashMap<Symbol, TypePackId>,
    /// Type bindings imported under a require'd local's name
    pub imported_type_bindings: FxHashMap<Symbol, FxHashMap<Symbol, TypeFun>>,
    /// Source module names of imports, kept for go-to-declaration
    pub imported_modules: FxHashMap<Symbol, String>,
    /// Flow-sensitive narrowed type per def
    pub def_refinements: FxHashMap<DefId, TypeId>,
    pub return_type: TypePackId,
    pub vararg_pack: Option<TypePackId>,
    /// Caches so an alias's pre-binding pass and its visit pass hand
    /// out identical generic handles
    pub type_alias_type_params: HashMap<Symbol, TypeId>,
    pub type_alias_type_pack_params: HashMap<Symbol, TypePackId>,
}

impl Scope {
    fn new(parent: Option<ScopeId>, level: u32, return_type: TypePackId) -> Self {
        Self {
            parent,
            children: Vec::new(),
            level,
            bindings: FxHashMap::default(),
            private_type_bindings: FxHashMap::default(),
            exported_type_bindings: FxHashMap::default(),
            private_type_pack_bindings: FxHashMap::default(),
            exported_type_pack_bindings: FxHashMap::default(),
            imported_type_bindings: FxHashMap::default(),
            imported_modules: FxHashMap::default(),
            def_refinements: FxHashMap::default(),
            return_type,
            vararg_pack: None,
            type_alias_type_params: HashMap::new(),
            type_alias_type_pack_params: HashMap::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root scope with no parent
    pub fn root(&mut self, return_type: TypePackId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(None, 0, return_type));
        id
    }

    /// Create a child scope inheriting the parent's return type and
    /// vararg pack
    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        let (level, return_type, vararg_pack) = {
            let p = self.get(parent);
            (p.level + 1, p.return_type, p.vararg_pack)
        };
        let mut scope = Scope::new(Some(parent), level, return_type);
        scope.vararg_pack = vararg_pack;
        self.scopes.push(scope);
        self.get_mut(parent).children.push(id);
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId(i as u32), s))
    }

    /// Look up a symbol's binding, walking the parent chain
    pub fn lookup(&self, scope: ScopeId, name: Symbol) -> Option<TypeId> {
        self.lookup_ex(scope, name).map(|(ty, _)| ty)
    }

    /// Like [`ScopeArena::lookup`], also reporting the owning scope
    pub fn lookup_ex(&self, scope: ScopeId, name: Symbol) -> Option<(TypeId, ScopeId)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.get(id);
            if let Some(binding) = s.bindings.get(&name) {
                return Some((binding.ty, id));
            }
            current = s.parent;
        }
        None
    }

    /// Look up the flow-sensitive type of a def, walking the parent
    /// chain over refinement maps
    pub fn lookup_def(&self, scope: ScopeId, def: DefId) -> Option<TypeId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.get(id);
            if let Some(&ty) = s.def_refinements.get(&def) {
                return Some(ty);
            }
            current = s.parent;
        }
        None
    }

    /// Look up a type alias by name, checking private then exported
    /// bindings at each level
    pub fn lookup_type(&self, scope: ScopeId, name: Symbol) -> Option<&TypeFun> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.get(id);
            if let Some(fun) = s.private_type_bindings.get(&name) {
                return Some(fun);
            }
            if let Some(fun) = s.exported_type_bindings.get(&name) {
                return Some(fun);
            }
            current = s.parent;
        }
        None
    }

    /// Look up a type imported from a require'd module
    pub fn lookup_imported_type(
        &self,
        scope: ScopeId,
        prefix: Symbol,
        name: Symbol,
    ) -> Option<&TypeFun> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.get(id);
            if let Some(exports) = s.imported_type_bindings.get(&prefix) {
                return exports.get(&name);
            }
            current = s.parent;
        }
        None
    }

    /// Look up a generic type pack binding by name
    pub fn lookup_type_pack(&self, scope: ScopeId, name: Symbol) -> Option<TypePackId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.get(id);
            if let Some(&pack) = s.private_type_pack_bindings.get(&name) {
                return Some(pack);
            }
            if let Some(&pack) = s.exported_type_pack_bindings.get(&name) {
                return Some(pack);
            }
            current = s.parent;
        }
        None
    }
}
