// src/sema/builder/expr.rs

use crate::errors::{AnalysisError, ice};
use crate::frontend::Span;
use crate::frontend::ast::*;
use crate::frontend::intern::Symbol;
use crate::sema::builder::{ConstraintGraphBuilder, Inference, InferencePack};
use crate::sema::constraint::ConstraintKind;
use crate::sema::refinements::RefinementId;
use crate::sema::scope::{Binding, ScopeId};
use crate::sema::type_arena::{TypeId, TypePackId};
use crate::sema::types::{
    FunctionType, MetatableType, Property, Singleton, TableIndexer, TableState, TableType, Type,
    TypePack,
};

/// A `type(x) == "tag"` or `typeof(x) == "Name"` comparison
struct TypeGuard<'e> {
    is_typeof: bool,
    target: &'e Expr,
    tag: Symbol,
}

impl ConstraintGraphBuilder<'_> {
    pub(crate) fn check_expr(&mut self, scope: ScopeId, expr: &Expr) -> Inference {
        self.check_expr_expecting(scope, expr, None)
    }

    pub(crate) fn check_expr_expecting(
        &mut self,
        scope: ScopeId,
        expr: &Expr,
        expected: Option<TypeId>,
    ) -> Inference {
        self.check_expr_with(scope, expr, expected, false)
    }

    pub(crate) fn check_expr_with(
        &mut self,
        scope: ScopeId,
        expr: &Expr,
        expected: Option<TypeId>,
        force_singleton: bool,
    ) -> Inference {
        let Some(_guard) = self.recursion_guard(expr.span) else {
            return Inference::new(self.builtins.error_recovery_type());
        };

        let result = match &expr.kind {
            ExprKind::Group(inner) => {
                self.check_expr_with(scope, inner, expected, force_singleton)
            }
            ExprKind::String(value) => {
                self.check_string(scope, expr.span, *value, expected, force_singleton)
            }
            ExprKind::Number(_) => Inference::new(self.builtins.number_ty),
            ExprKind::Bool(value) => {
                self.check_bool(scope, expr.span, *value, expected, force_singleton)
            }
            ExprKind::Nil => Inference::new(self.builtins.nil_ty),
            ExprKind::Local(local) => self.check_local(scope, expr, *local),
            ExprKind::Global(name) => self.check_global(scope, expr.span, *name),
            ExprKind::Varargs => {
                let pack = self.check_pack_expr(scope, expr, Vec::new());
                self.flatten_pack(scope, expr.span, pack)
            }
            ExprKind::Call(_) => {
                let pack = self.check_pack_expr(scope, expr, Vec::new());
                self.flatten_pack(scope, expr.span, pack)
            }
            ExprKind::Function(func) => {
                let start = self.checkpoint();
                let sig = self.check_function_signature(scope, func, expected);
                self.check_function_body(sig.body_scope, func);
                let end = self.checkpoint();

                let generalized = self.arena.add_type(Type::Blocked);
                let constraint = self.add_constraint(
                    scope,
                    expr.span,
                    ConstraintKind::Generalization {
                        generalized,
                        source: sig.signature,
                    },
                );
                for dep in self.constraints_between(start, end) {
                    self.add_dependency(constraint, dep);
                }

                Inference::new(generalized)
            }
            ExprKind::Field(field) => self.check_field(scope, expr, field),
            ExprKind::Index(index) => self.check_index(scope, index),
            ExprKind::Table(table) => self.check_table(scope, table, expected),
            ExprKind::Unary(unary) => self.check_unary(scope, expr.span, unary),
            ExprKind::Binary(binary) => {
                let (left, right, refinement) =
                    self.check_binary(scope, binary, expected);
                let result = self.arena.add_type(Type::Blocked);
                self.add_constraint(
                    scope,
                    expr.span,
                    ConstraintKind::Binary {
                        op: binary.op,
                        left,
                        right,
                        out: result,
                        node: expr.id,
                    },
                );
                Inference::with_refinement(result, refinement)
            }
            ExprKind::IfElse(if_else) => self.check_if_else(scope, if_else, expected),
            ExprKind::TypeAssertion(assertion) => {
                self.check_expr(scope, &assertion.expr);
                Inference::new(self.resolve_type(scope, &assertion.annotation, false))
            }
            ExprKind::InterpString(parts) => {
                for part in parts {
                    if let InterpPart::Expr(part_expr) = part {
                        self.check_expr(scope, part_expr);
                    }
                }
                Inference::new(self.builtins.string_ty)
            }
            ExprKind::Error(sub_exprs) => {
                for sub in sub_exprs {
                    self.check_expr(scope, sub);
                }
                Inference::new(self.builtins.error_recovery_type())
            }
        };

        self.module.ast_types.insert(expr.id, result.ty);
        if let Some(expected) = expected {
            self.module.ast_expected_types.insert(expr.id, expected);
        }
        result
    }

    fn check_string(
        &mut self,
        scope: ScopeId,
        span: Span,
        value: Symbol,
        expected: Option<TypeId>,
        force_singleton: bool,
    ) -> Inference {
        if force_singleton {
            return Inference::new(self.arena.singleton(Singleton::String(value)));
        }

        if let Some(expected) = expected {
            let expected = self.arena.follow(expected);
            if self.arena.get(expected).is_blocked() {
                // Let the solver decide between the singleton and the
                // primitive once the expected type is known.
                let ty = self.arena.add_type(Type::Blocked);
                let singleton = self.arena.singleton(Singleton::String(value));
                self.add_constraint(
                    scope,
                    span,
                    ConstraintKind::Primitive {
                        out: ty,
                        expected,
                        singleton,
                        primitive: self.builtins.string_ty,
                    },
                );
                return Inference::new(ty);
            } else if self.arena.maybe_singleton(expected) {
                return Inference::new(self.arena.singleton(Singleton::String(value)));
            }
        }

        Inference::new(self.builtins.string_ty)
    }

    fn check_bool(
        &mut self,
        scope: ScopeId,
        span: Span,
        value: bool,
        expected: Option<TypeId>,
        force_singleton: bool,
    ) -> Inference {
        let singleton = if value {
            self.builtins.true_ty
        } else {
            self.builtins.false_ty
        };

        if force_singleton {
            return Inference::new(singleton);
        }

        if let Some(expected) = expected {
            let expected = self.arena.follow(expected);
            if self.arena.get(expected).is_blocked() {
                let ty = self.arena.add_type(Type::Blocked);
                self.add_constraint(
                    scope,
                    span,
                    ConstraintKind::Primitive {
                        out: ty,
                        expected,
                        singleton,
                        primitive: self.builtins.boolean_ty,
                    },
                );
                return Inference::new(ty);
            } else if self.arena.maybe_singleton(expected) {
                return Inference::new(singleton);
            }
        }

        Inference::new(self.builtins.boolean_ty)
    }

    fn check_local(&mut self, scope: ScopeId, expr: &Expr, local: LocalRef) -> Inference {
        let def = self.dfg.get_def(expr.id);

        let mut result = def.and_then(|def| self.scopes.lookup_def(scope, def));
        if result.is_none() {
            result = self.scopes.lookup(scope, local.name);
        }

        let Some(result) = result else {
            return Inference::new(self.builtins.error_recovery_type());
        };

        match def {
            Some(def) => {
                let refinement = self.refinements.proposition(def, self.builtins.truthy_ty);
                Inference::with_refinement(result, Some(refinement))
            }
            None => Inference::new(result),
        }
    }

    fn check_global(&mut self, scope: ScopeId, span: Span, name: Symbol) -> Inference {
        if let Some(ty) = self.scopes.lookup(scope, name) {
            return Inference::new(ty);
        }

        // Global functions were prepopulated before the walk, so any
        // name still missing here is definitely unknown.
        self.report_error(
            AnalysisError::UnknownSymbol {
                name: self.interner.resolve(name).to_string(),
                span: span.into(),
            },
            span,
        );
        Inference::new(self.builtins.error_recovery_type())
    }

    fn check_field(&mut self, scope: ScopeId, expr: &Expr, field: &FieldExpr) -> Inference {
        let obj = self.check_expr(scope, &field.obj).ty;
        let result = self.fresh_type(scope);

        let def = self.dfg.get_def(expr.id);
        if let Some(def) = def {
            if let Some(ty) = self.scopes.lookup_def(scope, def) {
                let refinement = self.refinements.proposition(def, self.builtins.truthy_ty);
                return Inference::with_refinement(ty, Some(refinement));
            }
            self.scopes
                .get_mut(scope)
                .def_refinements
                .insert(def, result);
        }

        let level = self.scopes.get(scope).level;
        let mut table = TableType::new(TableState::Free, level, Some(scope));
        table.props.insert(field.name, Property { ty: result });
        let expected_table = self.arena.add_type(Type::Table(Box::new(table)));

        self.add_constraint(
            scope,
            field.obj.span,
            ConstraintKind::Subtype {
                sub: obj,
                sup: expected_table,
            },
        );

        match def {
            Some(def) => {
                let refinement = self.refinements.proposition(def, self.builtins.truthy_ty);
                Inference::with_refinement(result, Some(refinement))
            }
            None => Inference::new(result),
        }
    }

    fn check_index(&mut self, scope: ScopeId, index: &IndexExpr) -> Inference {
        let obj = self.check_expr(scope, &index.obj).ty;
        let key = self.check_expr(scope, &index.key).ty;

        let result = self.fresh_type(scope);

        let level = self.scopes.get(scope).level;
        let mut table = TableType::new(TableState::Free, level, Some(scope));
        table.indexer = Some(TableIndexer {
            key_ty: key,
            result_ty: result,
        });
        let expected_table = self.arena.add_type(Type::Table(Box::new(table)));

        self.add_constraint(
            scope,
            index.obj.span,
            ConstraintKind::Subtype {
                sub: obj,
                sup: expected_table,
            },
        );

        Inference::new(result)
    }

    fn check_unary(&mut self, scope: ScopeId, span: Span, unary: &UnaryExpr) -> Inference {
        let operand = self.check_expr(scope, &unary.operand);

        let result = self.arena.add_type(Type::Blocked);
        self.add_constraint(
            scope,
            span,
            ConstraintKind::Unary {
                op: unary.op,
                operand: operand.ty,
                out: result,
            },
        );

        if unary.op == UnaryOp::Not {
            let negated = self.refinements.negation(operand.refinement);
            Inference::with_refinement(result, negated)
        } else {
            Inference::new(result)
        }
    }

    fn check_if_else(
        &mut self,
        scope: ScopeId,
        if_else: &IfElseExpr,
        expected: Option<TypeId>,
    ) -> Inference {
        self.child_scope(if_else.condition.id, scope);
        let refinement = self.check_expr(scope, &if_else.condition).refinement;

        let then_scope = self.child_scope(if_else.then_expr.id, scope);
        self.apply_refinements(then_scope, if_else.then_expr.span, refinement);
        let then_ty = self
            .check_expr_expecting(then_scope, &if_else.then_expr, expected)
            .ty;

        let else_scope = self.child_scope(if_else.else_expr.id, scope);
        let negated = self.refinements.negation(refinement);
        self.apply_refinements(else_scope, if_else.else_expr.span, negated);
        let else_ty = self
            .check_expr_expecting(else_scope, &if_else.else_expr, expected)
            .ty;

        match expected {
            Some(expected) => Inference::new(expected),
            None => Inference::new(
                self.arena
                    .add_type(Type::Union([then_ty, else_ty].into_iter().collect())),
            ),
        }
    }

    /// Check a binary expression's operands, producing their types and
    /// the refinement the whole comparison contributes.
    pub(crate) fn check_binary(
        &mut self,
        scope: ScopeId,
        binary: &BinaryExpr,
        expected: Option<TypeId>,
    ) -> (TypeId, TypeId, Option<RefinementId>) {
        match binary.op {
            BinaryOp::And => {
                let left = self.check_expr_expecting(scope, &binary.left, expected);

                let right_scope = self.child_scope(binary.right.id, scope);
                self.apply_refinements(right_scope, binary.right.span, left.refinement);
                let right = self.check_expr_expecting(right_scope, &binary.right, expected);

                let refinement = self
                    .refinements
                    .conjunction(left.refinement, right.refinement);
                (left.ty, right.ty, Some(refinement))
            }
            BinaryOp::Or => {
                let left = self.check_expr_expecting(scope, &binary.left, expected);

                let right_scope = self.child_scope(binary.right.id, scope);
                let negated = self.refinements.negation(left.refinement);
                self.apply_refinements(right_scope, binary.right.span, negated);
                let right = self.check_expr_expecting(right_scope, &binary.right, expected);

                let refinement = self
                    .refinements
                    .disjunction(left.refinement, right.refinement);
                (left.ty, right.ty, Some(refinement))
            }
            BinaryOp::Eq | BinaryOp::Ne => {
                if let Some(guard) = self.match_type_guard(binary) {
                    return self.check_type_guard(scope, binary, guard);
                }

                let left = self
                    .check_expr_with(scope, &binary.left, expected, true)
                    .ty;
                let right = self
                    .check_expr_with(scope, &binary.right, expected, true)
                    .ty;

                let mut left_refinement = self
                    .dfg
                    .get_def(binary.left.id)
                    .map(|def| self.refinements.proposition(def, right));
                let mut right_refinement = self
                    .dfg
                    .get_def(binary.right.id)
                    .map(|def| self.refinements.proposition(def, left));

                if binary.op == BinaryOp::Ne {
                    left_refinement = self.refinements.negation(left_refinement);
                    right_refinement = self.refinements.negation(right_refinement);
                }

                let refinement = self
                    .refinements
                    .equivalence(left_refinement, right_refinement);
                (left, right, Some(refinement))
            }
            _ => {
                let left = self.check_expr_expecting(scope, &binary.left, expected).ty;
                let right = self
                    .check_expr_expecting(scope, &binary.right, expected)
                    .ty;
                (left, right, None)
            }
        }
    }

    fn check_type_guard(
        &mut self,
        scope: ScopeId,
        binary: &BinaryExpr,
        guard: TypeGuard<'_>,
    ) -> (TypeId, TypeId, Option<RefinementId>) {
        let left = self.check_expr(scope, &binary.left).ty;
        let right = self.check_expr(scope, &binary.right).ty;

        let Some(def) = self.dfg.get_def(guard.target.id) else {
            return (left, right, None);
        };

        let tag = self.interner.resolve(guard.tag);
        let discriminant = match tag {
            "nil" => self.builtins.nil_ty,
            "string" => self.builtins.string_ty,
            "number" => self.builtins.number_ty,
            "boolean" => self.builtins.thread_ty,
            "table" => self.builtins.table_ty,
            "function" => self.builtins.function_ty,
            // Userdata and vector guards have no usable discriminant
            // until a top class type exists.
            "userdata" => self.builtins.never_ty,
            "vector" if !guard.is_typeof => self.builtins.never_ty,
            _ if !guard.is_typeof => self.builtins.never_ty,
            name => {
                let mut discriminant = self.builtins.never_ty;
                let fun = self
                    .scopes
                    .lookup_type(self.global_scope, guard.tag)
                    .filter(|fun| !fun.is_generic())
                    .map(|fun| fun.ty);
                if let Some(ty) = fun {
                    let ty = self.arena.follow(ty);
                    // Only the root of a class hierarchy discriminates.
                    let usable = match self.arena.get(ty).as_class() {
                        None => true,
                        Some(class) => {
                            if self.config.negated_class_types {
                                class.parent == Some(self.builtins.class_ty)
                            } else {
                                class.parent.is_none()
                            }
                        }
                    };
                    if usable {
                        discriminant = ty;
                    }
                } else {
                    tracing::trace!(name, "typeof guard names no known type");
                }
                discriminant
            }
        };

        let proposition = self.refinements.proposition(def, discriminant);
        match binary.op {
            BinaryOp::Eq => (left, right, Some(proposition)),
            BinaryOp::Ne => {
                let negated = self.refinements.negation(Some(proposition));
                (left, right, negated)
            }
            _ => ice("type guards only arise from equality comparisons"),
        }
    }

    fn check_table(
        &mut self,
        scope: ScopeId,
        table: &TableExpr,
        expected: Option<TypeId>,
    ) -> Inference {
        let level = self.scopes.get(scope).level;
        let ty = self.arena.add_type(Type::Table(Box::new(TableType::new(
            TableState::Unsealed,
            level,
            Some(scope),
        ))));

        let mut annotated_key_type: Option<TypeId> = None;
        let mut annotated_index_result_type: Option<TypeId> = None;

        if let Some(expected) = expected {
            let followed = self.arena.follow(expected);
            if let Some(expected_table) = self.arena.get(followed).as_table()
                && let Some(indexer) = expected_table.indexer
            {
                annotated_key_type = Some(self.arena.follow(indexer.key_ty));
                annotated_index_result_type = Some(indexer.result_ty);
            }
        }

        let mut is_indexed_result_type = false;
        let mut pinned_index_result_type: Option<TypeId> = None;

        for item in &table.items {
            if item.key.is_none() || item.bracketed {
                is_indexed_result_type = true;
            }

            let mut expected_value_type: Option<TypeId> = None;
            if let (Some(string_key), Some(expected)) = (item.string_key(), expected) {
                let followed = self.arena.follow(expected);
                let known_prop = self
                    .arena
                    .get(followed)
                    .as_table()
                    .and_then(|t| t.props.get(&string_key))
                    .map(|p| p.ty);
                match known_prop {
                    Some(prop_ty) => expected_value_type = Some(prop_ty),
                    None => {
                        let slot = self.arena.add_type(Type::Blocked);
                        self.add_constraint(
                            scope,
                            item.value.span,
                            ConstraintKind::HasProp {
                                out: slot,
                                subject: expected,
                                prop: string_key,
                            },
                        );
                        expected_value_type = Some(slot);
                    }
                }
            }

            // Expected type priority for the item's value: an expected
            // prop type, then an annotated indexer result, then the
            // first indexed item's type.
            let check_expected = expected_value_type
                .or(annotated_index_result_type)
                .or(pinned_index_result_type);

            let item_ty = self
                .check_expr_expecting(scope, &item.value, check_expected)
                .ty;

            if is_indexed_result_type && pinned_index_result_type.is_none() {
                pinned_index_result_type = Some(item_ty);
            }

            match &item.key {
                Some(key) => {
                    // The key of a record item still gets checked so it
                    // lands in the ast type map.
                    let key_ty = self
                        .check_expr_expecting(scope, key, annotated_key_type)
                        .ty;

                    match item.string_key() {
                        Some(name) => {
                            if let Type::Table(t) = self.arena.as_mutable(ty) {
                                t.props.insert(name, Property { ty: item_ty });
                            }
                        }
                        None => self.extend_indexer(scope, ty, key.span, key_ty, item_ty),
                    }
                }
                None => {
                    let number = self.builtins.number_ty;
                    self.extend_indexer(scope, ty, item.value.span, number, item_ty);
                }
            }
        }

        Inference::new(ty)
    }

    /// Create the table's indexer on first use and pin later keys and
    /// values to it with subtype constraints.
    fn extend_indexer(
        &mut self,
        scope: ScopeId,
        table_ty: TypeId,
        span: Span,
        key_ty: TypeId,
        result_ty: TypeId,
    ) {
        let indexer = match self.arena.get(table_ty).as_table().and_then(|t| t.indexer) {
            Some(indexer) => indexer,
            None => {
                let fresh_key = self.fresh_type(scope);
                let fresh_result = self.fresh_type(scope);
                let indexer = TableIndexer {
                    key_ty: fresh_key,
                    result_ty: fresh_result,
                };
                if let Type::Table(t) = self.arena.as_mutable(table_ty) {
                    t.indexer = Some(indexer);
                }
                indexer
            }
        };

        self.add_constraint(
            scope,
            span,
            ConstraintKind::Subtype {
                sub: indexer.key_ty,
                sup: key_ty,
            },
        );
        self.add_constraint(
            scope,
            span,
            ConstraintKind::Subtype {
                sub: indexer.result_ty,
                sup: result_ty,
            },
        );
    }

    /// Check several expressions in pack position: every expression but
    /// the last produces one type; the last may produce a pack.
    pub(crate) fn check_pack_exprs(
        &mut self,
        scope: ScopeId,
        exprs: &[Expr],
        expected: &[Option<TypeId>],
    ) -> InferencePack {
        let mut head = Vec::new();
        let mut tail: Option<TypePackId> = None;

        for (i, expr) in exprs.iter().enumerate() {
            if i < exprs.len() - 1 {
                let expected_type = expected.get(i).copied().flatten();
                head.push(self.check_expr_expecting(scope, expr, expected_type).ty);
            } else {
                let expected_tail: Vec<Option<TypeId>> = if i < expected.len() {
                    expected[i..].to_vec()
                } else {
                    Vec::new()
                };
                tail = Some(self.check_pack_expr(scope, expr, expected_tail).pack);
            }
        }

        if head.is_empty() && let Some(tail) = tail {
            InferencePack::new(tail)
        } else {
            InferencePack::new(self.arena.add_type_pack(TypePack::Pack { head, tail }))
        }
    }

    /// Check one expression in pack position
    pub(crate) fn check_pack_expr(
        &mut self,
        scope: ScopeId,
        expr: &Expr,
        expected: Vec<Option<TypeId>>,
    ) -> InferencePack {
        let Some(_guard) = self.recursion_guard(expr.span) else {
            return InferencePack::new(self.builtins.error_recovery_type_pack());
        };

        let result = match &expr.kind {
            ExprKind::Call(call) => self.check_call(scope, expr, call),
            ExprKind::Varargs => match self.scopes.get(scope).vararg_pack {
                Some(pack) => InferencePack::new(pack),
                None => InferencePack::new(self.builtins.error_recovery_type_pack()),
            },
            _ => {
                let expected_type = expected.first().copied().flatten();
                let ty = self.check_expr_expecting(scope, expr, expected_type).ty;
                InferencePack::new(self.arena.add_type_pack(TypePack::Pack {
                    head: vec![ty],
                    tail: None,
                }))
            }
        };

        self.module.ast_type_packs.insert(expr.id, result.pack);
        result
    }

    fn check_call(&mut self, scope: ScopeId, expr: &Expr, call: &CallExpr) -> InferencePack {
        let mut expr_args: Vec<&Expr> = Vec::with_capacity(call.args.len() + 1);
        let mut return_refinements = Vec::new();
        let mut discriminant_types: Vec<Option<TypeId>> = Vec::new();

        if call.is_method {
            let ExprKind::Field(field) = &call.func.kind else {
                ice("method call expression has no receiver");
            };
            expr_args.push(&field.obj);

            match self.dfg.get_def(field.obj.id) {
                Some(def) => {
                    let discriminant = self.arena.add_type(Type::Blocked);
                    return_refinements.push(self.refinements.proposition(def, discriminant));
                    discriminant_types.push(Some(discriminant));
                }
                None => discriminant_types.push(None),
            }
        }

        for arg in &call.args {
            expr_args.push(arg);

            match self.dfg.get_def(arg.id) {
                Some(def) => {
                    let discriminant = self.arena.add_type(Type::Blocked);
                    return_refinements.push(self.refinements.proposition(def, discriminant));
                    discriminant_types.push(Some(discriminant));
                }
                None => discriminant_types.push(None),
            }
        }

        let start_checkpoint = self.checkpoint();
        let fn_type = self.check_expr(scope, &call.func).ty;
        let fn_end_checkpoint = self.checkpoint();

        self.module
            .ast_original_call_types
            .insert(call.func.id, fn_type);

        let expected_arg_pack = self.fresh_type_pack(scope);
        let expected_ret_pack = self.fresh_type_pack(scope);
        let expected_function_type = self.arena.add_type(Type::Function(Box::new(
            FunctionType::new(expected_arg_pack, expected_ret_pack),
        )));

        let instantiated_fn_type = self.arena.add_type(Type::Blocked);
        self.add_constraint(
            scope,
            expr.span,
            ConstraintKind::Instantiation {
                out: instantiated_fn_type,
                source: fn_type,
            },
        );

        // Fully solve the callee, then extract its argument list as the
        // expected arg pack.
        let extract_args = self.add_constraint(
            scope,
            expr.span,
            ConstraintKind::Subtype {
                sub: instantiated_fn_type,
                sup: expected_function_type,
            },
        );
        for dep in self.constraints_between(start_checkpoint, fn_end_checkpoint) {
            self.add_dependency(extract_args, dep);
        }

        let need_tail = expr_args
            .last()
            .is_some_and(|last| matches!(last.kind, ExprKind::Call(_) | ExprKind::Varargs));

        let expected_count = if need_tail {
            expr_args.len().saturating_sub(1)
        } else {
            expr_args.len()
        };
        let expected_args =
            self.arena
                .extend_type_pack(&self.builtins, expected_arg_pack, expected_count);

        let mut args: Vec<TypeId> = Vec::new();
        let mut arg_tail: Option<TypePackId> = None;
        let mut argument_refinements: Vec<Option<RefinementId>> = Vec::new();

        let arg_checkpoint = self.checkpoint();

        for (i, arg) in expr_args.iter().enumerate() {
            let expected_type = expected_args.head.get(i).copied();

            if i == 0 && call.is_method {
                // The receiver was already checked while computing the
                // callee; reuse its recorded type instead of
                // re-walking it.
                let self_ty = self.module.ast_types.get(&arg.id).copied();
                match self_ty {
                    Some(self_ty) => args.push(self_ty),
                    None => {
                        let fresh = self.fresh_type(scope);
                        args.push(fresh);
                    }
                }
            } else if i < expr_args.len() - 1
                || !matches!(arg.kind, ExprKind::Call(_) | ExprKind::Varargs)
            {
                let inference = self.check_expr_expecting(scope, arg, expected_type);
                args.push(inference.ty);
                argument_refinements.push(inference.refinement);
            } else {
                let pack = self.check_pack_expr(scope, arg, Vec::new());
                arg_tail = Some(pack.pack);
                argument_refinements.extend(pack.refinements);
            }
        }

        let arg_end_checkpoint = self.checkpoint();

        // Argument constraints wait until the expected types have been
        // extracted from the callee, so lambdas passed as arguments are
        // checked under the callee's parameter types.
        for constraint in self.constraints_between(arg_checkpoint, arg_end_checkpoint) {
            self.add_dependency(constraint, extract_args);
        }

        if self.match_setmetatable(call)
            && let Some(result) = self.check_setmetatable(scope, call, &args, arg_tail)
        {
            let refinement = self.refinements.variadic(return_refinements);
            let pack = self.arena.add_type_pack(TypePack::Pack {
                head: vec![result],
                tail: None,
            });
            return InferencePack {
                pack,
                refinements: vec![Some(refinement)],
            };
        }

        if self.match_assert(call) && !argument_refinements.is_empty() {
            self.apply_refinements(scope, call.args[0].span, argument_refinements[0]);
        }

        let rets = self.arena.add_type_pack(TypePack::Blocked);
        let arg_pack = self.arena.add_type_pack(TypePack::Pack {
            head: args,
            tail: arg_tail,
        });

        let fcc = self.add_constraint(
            scope,
            call.func.span,
            ConstraintKind::FunctionCall {
                function: fn_type,
                args: arg_pack,
                rets,
                call: expr.id,
                discriminants: discriminant_types,
            },
        );
        for dep in self.constraints_between(fn_end_checkpoint, arg_end_checkpoint) {
            self.add_dependency(fcc, dep);
        }

        let refinement = self.refinements.variadic(return_refinements);
        InferencePack {
            pack: rets,
            refinements: vec![Some(refinement)],
        }
    }

    /// Compose the metatable type for a recognized `setmetatable(t, mt)`
    /// call. `None` means the two arguments could not be recovered from
    /// the checked packs; the caller falls back to a regular call.
    fn check_setmetatable(
        &mut self,
        scope: ScopeId,
        call: &CallExpr,
        args: &[TypeId],
        arg_tail: Option<TypePackId>,
    ) -> Option<TypeId> {
        let mut tail_heads = Vec::new();
        if let Some(tail) = arg_tail
            && args.len() < 2
        {
            tail_heads = self
                .arena
                .extend_type_pack(&self.builtins, tail, 2 - args.len())
                .head;
        }

        if args.len() + tail_heads.len() < 2 {
            return None;
        }

        let target = args.first().copied().unwrap_or_else(|| tail_heads[0]);
        let metatable = args
            .get(1)
            .copied()
            .unwrap_or_else(|| tail_heads[if args.is_empty() { 1 } else { 0 }]);

        let result = self.arena.add_type(Type::Metatable(MetatableType {
            table: target,
            metatable,
        }));

        if let ExprKind::Local(local) = &call.args[0].kind {
            self.scopes.get_mut(scope).bindings.insert(
                local.name,
                Binding {
                    ty: result,
                    span: call.args[0].span,
                },
            );
            if let Some(def) = self.dfg.get_def(call.args[0].id) {
                self.scopes
                    .get_mut(scope)
                    .def_refinements
                    .insert(def, result);
            }
        }

        Some(result)
    }

    /// Take the first value of a pack as a single type, constraining
    /// the pack to have at least one element when that is not yet
    /// evident.
    pub(crate) fn flatten_pack(
        &mut self,
        scope: ScopeId,
        span: Span,
        pack: InferencePack,
    ) -> Inference {
        let refinement = pack.refinements.first().copied().flatten();

        if let Some(first) = self.arena.pack_first(pack.pack) {
            return Inference::with_refinement(first, refinement);
        }

        let result = self.fresh_type(scope);
        let rest = self.fresh_type_pack(scope);
        let one_pack = self.arena.add_type_pack(TypePack::Pack {
            head: vec![result],
            tail: Some(rest),
        });

        self.add_constraint(
            scope,
            span,
            ConstraintKind::PackSubtype {
                sub: pack.pack,
                sup: one_pack,
            },
        );

        Inference::with_refinement(result, refinement)
    }

    fn match_type_guard<'e>(&self, binary: &'e BinaryExpr) -> Option<TypeGuard<'e>> {
        if binary.op != BinaryOp::Eq && binary.op != BinaryOp::Ne {
            return None;
        }

        let mut left = &binary.left;
        let mut right = &binary.right;
        if matches!(right.kind, ExprKind::Call(_)) {
            std::mem::swap(&mut left, &mut right);
        }

        let ExprKind::String(tag) = right.kind else {
            return None;
        };
        let ExprKind::Call(call) = &left.kind else {
            return None;
        };
        let ExprKind::Global(callee) = &call.func.kind else {
            return None;
        };

        let callee = self.interner.resolve(*callee);
        if callee != "type" && callee != "typeof" {
            return None;
        }
        if call.args.len() != 1 {
            return None;
        }

        Some(TypeGuard {
            is_typeof: callee == "typeof",
            target: &call.args[0],
            tag,
        })
    }

    fn match_setmetatable(&self, call: &CallExpr) -> bool {
        if call.args.len() != 2 {
            return false;
        }
        match &call.func.kind {
            ExprKind::Global(name) => self.interner.resolve(*name) == "setmetatable",
            _ => false,
        }
    }

    fn match_assert(&self, call: &CallExpr) -> bool {
        if call.args.is_empty() {
            return false;
        }
        match &call.func.kind {
            ExprKind::Global(name) => self.interner.resolve(*name) == "assert",
            _ => false,
        }
    }
}

