// src/sema/type_arena.rs
//
// Append-only storage for type and type-pack nodes. Handles are u32
// indices, stable for the arena's lifetime. Unlike an interning arena
// there is no deduplication: free, blocked, and table nodes carry
// identity, and resolution rewrites them in place to `Bound` forwards.

use smallvec::SmallVec;

use crate::sema::builtins::BuiltinTypes;
use crate::sema::scope::ScopeId;
use crate::sema::types::{FreeType, Singleton, Type, TypePack};

/// Handle to a type node. Equality is handle equality after `follow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

impl TypeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Handle to a type pack node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypePackId(pub u32);

impl TypePackId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// SmallVec for type children - inline up to 4 (covers most unions,
/// intersections, and argument lists)
pub type TypeIdVec = SmallVec<[TypeId; 4]>;

/// Head/tail view of a pack produced by [`TypeArena::extend_type_pack`]
#[derive(Debug, Clone, Default)]
pub struct ExtendedPack {
    pub head: Vec<TypeId>,
    pub tail: Option<TypePackId>,
}

/// Per-module arena owning every type and type-pack node
#[derive(Debug, Default)]
pub struct TypeArena {
    types: Vec<Type>,
    packs: Vec<TypePack>,
}

impl TypeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn add_type_pack(&mut self, pack: TypePack) -> TypePackId {
        let id = TypePackId(self.packs.len() as u32);
        self.packs.push(pack);
        id
    }

    /// Allocate an inference variable owned by `scope`
    pub fn fresh_type(&mut self, scope: ScopeId) -> TypeId {
        self.add_type(Type::Free(FreeType { scope }))
    }

    /// Allocate a free type pack owned by `scope`
    pub fn fresh_type_pack(&mut self, scope: ScopeId) -> TypePackId {
        self.add_type_pack(TypePack::Free { scope })
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.0 as usize]
    }

    pub fn get_pack(&self, id: TypePackId) -> &TypePack {
        &self.packs[id.0 as usize]
    }

    /// Mutable view of a node. The sole mutation allowed to a live node
    /// after publication is rewriting a placeholder to `Bound`; use
    /// [`TypeArena::bind`] for that. Composite in-place edits (sealing a
    /// table under construction, patching a declared method's self) go
    /// through here before the node escapes the builder.
    pub fn as_mutable(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0 as usize]
    }

    pub fn pack_as_mutable(&mut self, id: TypePackId) -> &mut TypePack {
        &mut self.packs[id.0 as usize]
    }

    /// Rebind a placeholder node to forward to `target`
    pub fn bind(&mut self, id: TypeId, target: TypeId) {
        debug_assert!(
            self.get(id).is_rebindable(),
            "only free/blocked/pending types may be rebound"
        );
        tracing::trace!(from = id.0, to = target.0, "bind type");
        self.types[id.0 as usize] = Type::Bound(target);
    }

    /// Rebind a placeholder pack to forward to `target`
    pub fn bind_pack(&mut self, id: TypePackId, target: TypePackId) {
        debug_assert!(
            self.get_pack(id).is_rebindable(),
            "only free/blocked packs may be rebound"
        );
        tracing::trace!(from = id.0, to = target.0, "bind pack");
        self.packs[id.0 as usize] = TypePack::Bound(target);
    }

    /// Transitively resolve `Bound` indirections. Idempotent.
    pub fn follow(&self, mut id: TypeId) -> TypeId {
        while let Type::Bound(next) = self.get(id) {
            id = *next;
        }
        id
    }

    pub fn follow_pack(&self, mut id: TypePackId) -> TypePackId {
        while let TypePack::Bound(next) = self.get_pack(id) {
            id = *next;
        }
        id
    }

    /// First element of a pack, if it demonstrably has one
    pub fn pack_first(&self, id: TypePackId) -> Option<TypeId> {
        let mut id = self.follow_pack(id);
        loop {
            match self.get_pack(id) {
                TypePack::Pack { head, tail } => {
                    if let Some(first) = head.first() {
                        return Some(self.follow(*first));
                    }
                    match tail {
                        Some(tail) => id = self.follow_pack(*tail),
                        None => return None,
                    }
                }
                TypePack::Variadic { ty, .. } => return Some(self.follow(*ty)),
                _ => return None,
            }
        }
    }

    /// Concrete head types of a pack, walking chained `Pack` nodes
    pub fn pack_head_types(&self, id: TypePackId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut id = self.follow_pack(id);
        while let TypePack::Pack { head, tail } = self.get_pack(id) {
            out.extend(head.iter().copied());
            match tail {
                Some(tail) => id = self.follow_pack(*tail),
                None => break,
            }
        }
        out
    }

    /// Is `ty` a singleton, or a union with a singleton part? Literal
    /// expressions checked against such an expected type keep their
    /// singleton types instead of widening.
    pub fn maybe_singleton(&self, ty: TypeId) -> bool {
        match self.get(self.follow(ty)) {
            Type::Singleton(_) => true,
            Type::Union(parts) => parts
                .iter()
                .any(|&p| matches!(self.get(self.follow(p)), Type::Singleton(_))),
            _ => false,
        }
    }

    pub fn singleton(&mut self, value: Singleton) -> TypeId {
        self.add_type(Type::Singleton(value))
    }

    /// Materialize up to `length` head types from a pack.
    ///
    /// `Pack` nodes are split, a `Variadic` repeats its element type, a
    /// `Free` pack is taken as proof that the pack has at least `length`
    /// elements (fresh types are minted and the free pack is rebound to
    /// contain them), and an error pack pads with error-recovery types.
    /// Blocked and generic packs cannot be split; they become the tail.
    pub fn extend_type_pack(
        &mut self,
        builtins: &BuiltinTypes,
        pack: TypePackId,
        length: usize,
    ) -> ExtendedPack {
        let mut result = ExtendedPack::default();
        let mut pack = pack;

        loop {
            pack = self.follow_pack(pack);

            match self.get_pack(pack).clone() {
                TypePack::Pack { head, tail } => {
                    let mut i = 0;
                    while i < head.len() && result.head.len() < length {
                        result.head.push(head[i]);
                        i += 1;
                    }

                    if result.head.len() == length {
                        if i == head.len() {
                            result.tail = tail;
                        } else {
                            result.tail = Some(self.add_type_pack(TypePack::Pack {
                                head: head[i..].to_vec(),
                                tail,
                            }));
                        }
                        return result;
                    } else if let Some(tail) = tail {
                        pack = tail;
                    } else {
                        // There just aren't enough types in this pack
                        // to satisfy the request.
                        return result;
                    }
                }
                TypePack::Variadic { ty, .. } => {
                    while result.head.len() < length {
                        result.head.push(ty);
                    }
                    result.tail = Some(pack);
                    return result;
                }
                TypePack::Free { scope } => {
                    let mut minted = Vec::new();
                    while result.head.len() < length {
                        let fresh = self.fresh_type(scope);
                        minted.push(fresh);
                        result.head.push(fresh);
                    }
                    let tail = self.fresh_type_pack(scope);
                    let replacement = self.add_type_pack(TypePack::Pack {
                        head: minted,
                        tail: Some(tail),
                    });
                    self.bind_pack(pack, replacement);
                    result.tail = Some(tail);
                    return result;
                }
                TypePack::ErrorRecovery => {
                    while result.head.len() < length {
                        result.head.push(builtins.error_ty);
                    }
                    result.tail = Some(pack);
                    return result;
                }
                TypePack::Blocked | TypePack::Generic { .. } | TypePack::Bound(_) => {
                    result.tail = Some(pack);
                    return result;
                }
            }
        }
    }
}
