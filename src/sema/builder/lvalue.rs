// src/sema/builder/lvalue.rs
//
// Assignment targets. The interesting case is a dotted path rooted at a
// symbol (`name.a.b.c`), which is where properties get inserted into
// unsealed tables: the root symbol's binding is replaced by a blocked
// "updated" type and a SetProp/HasProp constraint chain describes the
// write. Everything else falls back to ordinary expression checking.

use crate::frontend::ast::{Expr, ExprKind, NodeId};
use crate::frontend::intern::Symbol;
use crate::sema::builder::ConstraintGraphBuilder;
use crate::sema::constraint::ConstraintKind;
use crate::sema::scope::ScopeId;
use crate::sema::type_arena::{TypeId, TypePackId};
use crate::sema::types::{Type, TypePack};

impl ConstraintGraphBuilder<'_> {
    pub(crate) fn check_lvalues(&mut self, scope: ScopeId, exprs: &[Expr]) -> TypePackId {
        let mut types = Vec::with_capacity(exprs.len());
        for expr in exprs {
            types.push(self.check_lvalue(scope, expr));
        }

        self.arena.add_type_pack(TypePack::Pack {
            head: types,
            tail: None,
        })
    }

    pub(crate) fn check_lvalue(&mut self, scope: ScopeId, expr: &Expr) -> TypeId {
        // `a["b"]` assigns the same way `a.b` does.
        match &expr.kind {
            ExprKind::Index(index) => {
                if let ExprKind::String(name) = index.key.kind {
                    return self.check_lvalue_path(scope, expr, &index.obj, name, expr.id);
                }
                self.check_expr(scope, expr).ty
            }
            ExprKind::Field(field) => {
                self.check_lvalue_path(scope, expr, &field.obj, field.name, expr.id)
            }
            _ => self.check_expr(scope, expr).ty,
        }
    }

    fn check_lvalue_path(
        &mut self,
        scope: ScopeId,
        expr: &Expr,
        first_obj: &Expr,
        first_name: Symbol,
        first_node: NodeId,
    ) -> TypeId {
        // Collect the segments down to the root symbol. Anything other
        // than a plain field chain rooted at a local or global is
        // checked as an ordinary expression.
        let mut segments: Vec<(NodeId, Symbol)> = vec![(first_node, first_name)];
        let mut current = first_obj;
        let root_symbol;
        loop {
            match &current.kind {
                ExprKind::Global(name) => {
                    root_symbol = *name;
                    break;
                }
                ExprKind::Local(local) => {
                    root_symbol = local.name;
                    break;
                }
                ExprKind::Field(field) => {
                    segments.push((current.id, field.name));
                    current = &field.obj;
                }
                _ => return self.check_expr(scope, expr).ty,
            }
        }

        segments.reverse();

        let Some((subject_type, symbol_scope)) = self.scopes.lookup_ex(scope, root_symbol) else {
            return self.check_expr(scope, expr).ty;
        };

        let prop_ty = self.fresh_type(scope);
        let path: Vec<Symbol> = segments.iter().map(|(_, name)| *name).collect();

        let updated_type = self.arena.add_type(Type::Blocked);
        self.add_constraint(
            scope,
            expr.span,
            ConstraintKind::SetProp {
                updated: updated_type,
                subject: subject_type,
                path,
                prop_ty,
            },
        );

        let mut prev_segment_ty = updated_type;
        for &(node, name) in &segments {
            let segment_ty = self.arena.add_type(Type::Blocked);
            self.module.ast_types.insert(node, segment_ty);
            self.add_constraint(
                scope,
                expr.span,
                ConstraintKind::HasProp {
                    out: segment_ty,
                    subject: prev_segment_ty,
                    prop: name,
                },
            );
            prev_segment_ty = segment_ty;
        }

        self.module.ast_types.insert(expr.id, prev_segment_ty);
        self.module.ast_types.insert(current.id, updated_type);

        if let Some(binding) = self
            .scopes
            .get_mut(symbol_scope)
            .bindings
            .get_mut(&root_symbol)
        {
            binding.ty = updated_type;
        }

        // Augmenting a builtin table has a def-less root; that is fine.
        if let Some(def) = self.dfg.get_def(current.id) {
            self.scopes
                .get_mut(symbol_scope)
                .def_refinements
                .insert(def, updated_type);
        }

        prop_ty
    }
}
