// src/sema/refinements.rs
//! Refinement trees. The arena is a structural builder only: it
//! allocates nodes and never simplifies, except that negating an absent
//! refinement stays absent. Sense polarity is not stored; the
//! interpreter in the graph builder threads a `sense` flag that flips
//! across `Negation` nodes.

use crate::dfg::DefId;
use crate::sema::type_arena::TypeId;

/// Handle to a refinement node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RefinementId(pub u32);

#[derive(Debug, Clone)]
pub enum Refinement {
    /// "The def's value is of the discriminant type"
    Proposition {
        def: DefId,
        discriminant: TypeId,
    },
    Negation(Option<RefinementId>),
    Conjunction {
        lhs: Option<RefinementId>,
        rhs: Option<RefinementId>,
    },
    Disjunction {
        lhs: Option<RefinementId>,
        rhs: Option<RefinementId>,
    },
    /// `==`-induced pairing: both sides refine under the same sense
    Equivalence {
        lhs: Option<RefinementId>,
        rhs: Option<RefinementId>,
    },
    /// One refinement per element of a value pack
    Variadic(Vec<RefinementId>),
}

#[derive(Debug, Default)]
pub struct RefinementArena {
    refinements: Vec<Refinement>,
}

impl RefinementArena {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, refinement: Refinement) -> RefinementId {
        let id = RefinementId(self.refinements.len() as u32);
        self.refinements.push(refinement);
        id
    }

    pub fn get(&self, id: RefinementId) -> &Refinement {
        &self.refinements[id.0 as usize]
    }

    pub fn proposition(&mut self, def: DefId, discriminant: TypeId) -> RefinementId {
        self.alloc(Refinement::Proposition { def, discriminant })
    }

    /// `negation(nil) = nil`
    pub fn negation(&mut self, inner: Option<RefinementId>) -> Option<RefinementId> {
        inner.map(|r| self.alloc(Refinement::Negation(Some(r))))
    }

    pub fn conjunction(
        &mut self,
        lhs: Option<RefinementId>,
        rhs: Option<RefinementId>,
    ) -> RefinementId {
        self.alloc(Refinement::Conjunction { lhs, rhs })
    }

    pub fn disjunction(
        &mut self,
        lhs: Option<RefinementId>,
        rhs: Option<RefinementId>,
    ) -> RefinementId {
        self.alloc(Refinement::Disjunction { lhs, rhs })
    }

    pub fn equivalence(
        &mut self,
        lhs: Option<RefinementId>,
        rhs: Option<RefinementId>,
    ) -> RefinementId {
        self.alloc(Refinement::Equivalence { lhs, rhs })
    }

    pub fn variadic(&mut self, parts: Vec<RefinementId>) -> RefinementId {
        self.alloc(Refinement::Variadic(parts))
    }
}
