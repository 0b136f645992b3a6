// src/dfg.rs
//!
//! Data-flow graph interface. The DFG builder (external to this crate)
//! assigns a def cell to every local binding and to every expression
//! whose value can be refined, then hands the finished graph to the
//! constraint graph builder. A def is either a plain cell or a field
//! projection of a parent def (`x.y` is a field cell of `x`'s cell).

use rustc_hash::FxHashMap;

use crate::frontend::ast::{LocalId, NodeId};
use crate::frontend::intern::Symbol;

/// Identifies a value cell in the data-flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefId(pub u32);

/// A field projection: this def is `parent.prop`
#[derive(Debug, Clone, Copy)]
pub struct FieldCell {
    pub parent: DefId,
    pub prop: Symbol,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Cell {
    pub field: Option<FieldCell>,
}

#[derive(Debug, Default)]
pub struct DataFlowGraph {
    cells: Vec<Cell>,
    expr_defs: FxHashMap<NodeId, DefId>,
    local_defs: FxHashMap<LocalId, DefId>,
}

impl DataFlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh root cell
    pub fn new_cell(&mut self) -> DefId {
        let id = DefId(self.cells.len() as u32);
        self.cells.push(Cell::default());
        id
    }

    /// Allocate a cell representing `parent.prop`
    pub fn new_field_cell(&mut self, parent: DefId, prop: Symbol) -> DefId {
        let id = DefId(self.cells.len() as u32);
        self.cells.push(Cell {
            field: Some(FieldCell { parent, prop }),
        });
        id
    }

    pub fn map_expr(&mut self, node: NodeId, def: DefId) {
        self.expr_defs.insert(node, def);
    }

    pub fn map_local(&mut self, local: LocalId, def: DefId) {
        self.local_defs.insert(local, def);
    }

    /// Def assigned to an expression node, if the DFG tracked one
    pub fn get_def(&self, node: NodeId) -> Option<DefId> {
        self.expr_defs.get(&node).copied()
    }

    /// Def assigned to a local binding site
    pub fn get_local_def(&self, local: LocalId) -> Option<DefId> {
        self.local_defs.get(&local).copied()
    }

    pub fn cell(&self, def: DefId) -> &Cell {
        &self.cells[def.0 as usize]
    }
}
