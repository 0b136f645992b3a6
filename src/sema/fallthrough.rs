// src/sema/fallthrough.rs
//! Control-fallthrough analysis: can execution reach the end of a block
//! without returning? Function bodies that can are constrained to have
//! a return pack compatible with `()`.

use crate::frontend::ast::{Block, Stmt, StmtKind};

/// A block falls through iff its last statement does (an empty block
/// trivially does).
pub fn block_falls_through(block: &Block) -> bool {
    match block.stmts.last() {
        Some(stmt) => stmt_falls_through(stmt),
        None => true,
    }
}

pub fn stmt_falls_through(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => false,
        // Control leaves the enclosing loop; it does not run past here.
        StmtKind::Break | StmtKind::Continue => false,
        StmtKind::Block(block) => block_falls_through(block),
        StmtKind::If(if_stmt) => match &if_stmt.else_body {
            // Without an else, the false branch falls through.
            None => true,
            Some(else_body) => {
                block_falls_through(&if_stmt.then_body) || block_falls_through(else_body)
            }
        },
        // The condition may be false on entry.
        StmtKind::While(_) => true,
        // The body runs at least once.
        StmtKind::Repeat(repeat) => block_falls_through(&repeat.body),
        _ => true,
    }
}
