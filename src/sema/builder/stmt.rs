// src/sema/builder/stmt.rs

use rustc_hash::FxHashMap;

use crate::errors::{AnalysisError, ice};
use crate::frontend::Span;
use crate::frontend::ast::*;
use crate::frontend::intern::Symbol;
use crate::sema::builder::ConstraintGraphBuilder;
use crate::sema::constraint::ConstraintKind;
use crate::sema::scope::{Binding, ScopeId, TypeFun};
use crate::sema::type_arena::TypeId;
use crate::sema::types::{Property, TableState, TableType, Type, TypePack};

impl ConstraintGraphBuilder<'_> {
    /// Run the two-pass alias pre-binding then visit each statement, in
    /// an already-created scope. Pre-binding every alias in the block to
    /// a blocked type is what permits mutually recursive aliases.
    pub(crate) fn visit_block_without_child_scope(&mut self, scope: ScopeId, block: &Block) {
        let Some(_guard) = self.recursion_guard(block.span) else {
            return;
        };

        let mut alias_definition_spans: FxHashMap<Symbol, Span> = FxHashMap::default();

        for stmt in &block.stmts {
            let StmtKind::TypeAlias(alias) = &stmt.kind else {
                continue;
            };

            let already_bound = {
                let s = self.scopes.get(scope);
                s.exported_type_bindings.contains_key(&alias.name)
                    || s.private_type_bindings.contains_key(&alias.name)
            };
            if already_bound {
                let Some(&previous) = alias_definition_spans.get(&alias.name) else {
                    ice("duplicate alias binding with no recorded definition");
                };
                self.report_error(
                    AnalysisError::DuplicateTypeDefinition {
                        name: self.interner.resolve(alias.name).to_string(),
                        span: stmt.span.into(),
                        previous: previous.into(),
                    },
                    stmt.span,
                );
                continue;
            }

            let defn_scope = self.child_scope(stmt.id, scope);

            let initial_ty = self.arena.add_type(Type::Blocked);
            let mut initial_fun = TypeFun::monomorphic(initial_ty);

            for (name, generic) in self.create_generics(defn_scope, &alias.generics, true) {
                self.scopes
                    .get_mut(defn_scope)
                    .private_type_bindings
                    .insert(name, TypeFun::monomorphic(generic.ty));
                initial_fun.type_params.push(generic);
            }

            for (name, generic) in self.create_generic_packs(defn_scope, &alias.generic_packs, true)
            {
                self.scopes
                    .get_mut(defn_scope)
                    .private_type_pack_bindings
                    .insert(name, generic.pack);
                initial_fun.type_pack_params.push(generic);
            }

            let target = self.scopes.get_mut(scope);
            if alias.exported {
                target.exported_type_bindings.insert(alias.name, initial_fun);
            } else {
                target.private_type_bindings.insert(alias.name, initial_fun);
            }

            self.alias_defining_scopes.insert(stmt.id, defn_scope);
            alias_definition_spans.insert(alias.name, stmt.span);
        }

        for stmt in &block.stmts {
            self.visit_stmt(scope, stmt);
        }
    }

    /// Visit a block in a fresh child scope of `scope`
    pub(crate) fn visit_block(&mut self, scope: ScopeId, block: &Block) {
        let inner = self.child_scope(block.id, scope);
        self.visit_block_without_child_scope(inner, block);
    }

    pub(crate) fn visit_stmt(&mut self, scope: ScopeId, stmt: &Stmt) {
        let Some(_guard) = self.recursion_guard(stmt.span) else {
            return;
        };

        match &stmt.kind {
            StmtKind::Block(block) => self.visit_block(scope, block),
            StmtKind::If(if_stmt) => self.visit_if(scope, if_stmt),
            StmtKind::While(while_stmt) => self.visit_while(scope, stmt, while_stmt),
            StmtKind::Repeat(repeat) => self.visit_repeat(scope, stmt, repeat),
            StmtKind::Break | StmtKind::Continue => {}
            StmtKind::Return(ret) => self.visit_return(scope, stmt, ret),
            StmtKind::Expr(expr) => {
                self.check_pack_expr(scope, expr, Vec::new());
            }
            StmtKind::Local(local) => self.visit_local(scope, stmt, local),
            StmtKind::NumericFor(for_stmt) => self.visit_numeric_for(scope, stmt, for_stmt),
            StmtKind::GenericFor(for_stmt) => self.visit_generic_for(scope, stmt, for_stmt),
            StmtKind::Assign(assign) => self.visit_assign(scope, stmt, assign),
            StmtKind::CompoundAssign(assign) => self.visit_compound_assign(scope, stmt, assign),
            StmtKind::Function(function) => self.visit_function(scope, function),
            StmtKind::LocalFunction(function) => self.visit_local_function(scope, function),
            StmtKind::TypeAlias(alias) => self.visit_type_alias(scope, stmt, alias),
            StmtKind::DeclareGlobal(global) => self.visit_declare_global(scope, stmt, global),
            StmtKind::DeclareFunction(function) => {
                self.visit_declare_function(scope, stmt, function)
            }
            StmtKind::DeclareClass(class) => self.visit_declare_class(scope, stmt, class),
            StmtKind::Error(error) => {
                for s in &error.stmts {
                    self.visit_stmt(scope, s);
                }
                for e in &error.exprs {
                    self.check_expr(scope, e);
                }
            }
        }
    }

    fn visit_local(&mut self, scope: ScopeId, stmt: &Stmt, local: &LocalStmt) {
        let mut var_types: Vec<Option<TypeId>> = Vec::with_capacity(local.vars.len());

        // Used to name the first value's type for synthetic name
        // attribution even when it never lands in var_types.
        let mut first_value_type: Option<TypeId> = None;

        for var in &local.vars {
            let ty = var
                .annotation
                .as_ref()
                .map(|annotation| self.resolve_type(scope, annotation, false));
            var_types.push(ty);
        }

        for (i, value) in local.values.iter().enumerate() {
            let has_annotation = local
                .vars
                .get(i)
                .is_some_and(|var| var.annotation.is_some());

            if matches!(value.kind, ExprKind::Nil) {
                // Nil-initialized variables get a fresh type under the
                // assumption that a later assignment populates them.
                if var_types.get(i).is_some_and(|slot| slot.is_none()) {
                    var_types[i] = Some(self.fresh_type(scope));
                }
            } else if i != local.values.len() - 1
                || !matches!(value.kind, ExprKind::Call(_) | ExprKind::Varargs)
            {
                // Only calls and varargs can produce packs; everything
                // else is exactly one value.
                let expected = if has_annotation { var_types[i] } else { None };

                let expr_type = self.check_expr_expecting(scope, value, expected).ty;
                if let Some(slot) = var_types.get_mut(i) {
                    match *slot {
                        Some(var_ty) => {
                            self.add_constraint(
                                scope,
                                stmt.span,
                                ConstraintKind::Subtype {
                                    sub: expr_type,
                                    sup: var_ty,
                                },
                            );
                        }
                        None => *slot = Some(expr_type),
                    }
                }

                if i == 0 {
                    first_value_type = Some(expr_type);
                }
            } else {
                let expected: Vec<Option<TypeId>> = if has_annotation {
                    var_types[i..].to_vec()
                } else {
                    Vec::new()
                };

                let expr_pack = self.check_pack_expr(scope, value, expected).pack;

                if i < local.vars.len() {
                    let extended = self.arena.extend_type_pack(
                        &self.builtins,
                        expr_pack,
                        var_types.len() - i,
                    );

                    // Fill remaining slots from the pack's head, then
                    // from fresh types.
                    for j in i..var_types.len() {
                        if var_types[j].is_none() {
                            var_types[j] = match extended.head.get(j - i) {
                                Some(&ty) => Some(ty),
                                None => Some(self.fresh_type(scope)),
                            };
                        }
                    }

                    if i == 0 {
                        first_value_type = var_types[0];
                    }

                    let tail_values: Vec<TypeId> =
                        var_types[i..].iter().map(|ty| ty.unwrap()).collect();
                    let tail_pack = self.arena.add_type_pack(TypePack::Pack {
                        head: tail_values,
                        tail: None,
                    });
                    self.add_constraint(
                        scope,
                        stmt.span,
                        ConstraintKind::PackSubtype {
                            sub: expr_pack,
                            sup: tail_pack,
                        },
                    );
                }
            }
        }

        if local.vars.len() == 1
            && local.values.len() == 1
            && let Some(first_value_type) = first_value_type
        {
            let var = &local.vars[0];
            let value = &local.values[0];

            let synthetic_name = match &value.kind {
                ExprKind::Table(_) => true,
                ExprKind::Call(call) => match &call.func.kind {
                    ExprKind::Global(name) => self.interner.resolve(*name) == "setmetatable",
                    _ => false,
                },
                _ => false,
            };

            if synthetic_name {
                self.add_constraint(
                    scope,
                    value.span,
                    ConstraintKind::Name {
                        ty: first_value_type,
                        name: var.name,
                        synthetic: true,
                        type_params: Vec::new(),
                        type_pack_params: Vec::new(),
                    },
                );
            }
        }

        for (i, var) in local.vars.iter().enumerate() {
            let ty = match var_types[i] {
                Some(ty) => ty,
                None => self.fresh_type(scope),
            };

            self.scopes
                .get_mut(scope)
                .bindings
                .insert(var.name, Binding { ty, span: var.span });

            if let Some(def) = self.dfg.get_local_def(var.id) {
                self.scopes.get_mut(scope).def_refinements.insert(def, ty);
            }
        }

        // require'd modules also bring their exported type bindings
        // into scope under the local's name.
        for (i, value) in local.values.iter().enumerate() {
            if i >= local.vars.len() {
                break;
            }
            let ExprKind::Call(call) = &value.kind else {
                continue;
            };
            let Some(require_arg) = self.match_require(call) else {
                continue;
            };
            let Some(info) = self
                .resolver
                .resolve_module_info(&self.module.name, require_arg)
            else {
                continue;
            };
            if let Some(exports) = self.resolver.exported_types(&info.name) {
                let name = local.vars[i].name;
                let exports = exports.clone();
                let target = self.scopes.get_mut(scope);
                target.imported_type_bindings.insert(name, exports);
                if self.config.alias_declaration_metadata {
                    target.imported_modules.insert(name, info.name);
                }
            }
        }
    }

    fn visit_numeric_for(&mut self, scope: ScopeId, stmt: &Stmt, for_stmt: &NumericForStmt) {
        if let Some(annotation) = &for_stmt.var.annotation {
            self.resolve_type(scope, annotation, false);
        }

        let number = self.builtins.number_ty;
        let mut infer_number = |this: &mut Self, expr: &Expr| {
            let ty = this.check_expr(scope, expr).ty;
            this.add_constraint(
                scope,
                expr.span,
                ConstraintKind::Subtype {
                    sub: ty,
                    sup: number,
                },
            );
        };

        infer_number(self, &for_stmt.from);
        infer_number(self, &for_stmt.to);
        if let Some(step) = &for_stmt.step {
            infer_number(self, step);
        }

        let for_scope = self.child_scope(stmt.id, scope);
        self.module.ast_scopes.insert(for_stmt.body.id, for_scope);
        self.scopes.get_mut(for_scope).bindings.insert(
            for_stmt.var.name,
            Binding {
                ty: number,
                span: for_stmt.var.span,
            },
        );

        self.visit_block_without_child_scope(for_scope, &for_stmt.body);
    }

    fn visit_generic_for(&mut self, scope: ScopeId, stmt: &Stmt, for_stmt: &GenericForStmt) {
        let loop_scope = self.child_scope(stmt.id, scope);
        self.module.ast_scopes.insert(for_stmt.body.id, loop_scope);

        let iterator = self
            .check_pack_exprs(scope, &for_stmt.values, &[])
            .pack;

        let mut variable_types = Vec::with_capacity(for_stmt.vars.len());
        for var in &for_stmt.vars {
            let ty = self.fresh_type(loop_scope);
            self.scopes
                .get_mut(loop_scope)
                .bindings
                .insert(var.name, Binding { ty, span: var.span });
            variable_types.push(ty);

            if let Some(def) = self.dfg.get_local_def(var.id) {
                self.scopes
                    .get_mut(loop_scope)
                    .def_refinements
                    .insert(def, ty);
            }
        }

        // It is always ok to provide too few variables, so the variable
        // pack gets a free tail.
        let tail = self.fresh_type_pack(loop_scope);
        let variable_pack = self.arena.add_type_pack(TypePack::Pack {
            head: variable_types,
            tail: Some(tail),
        });

        let values_span = match (for_stmt.values.first(), for_stmt.values.last()) {
            (Some(first), Some(last)) => first.span.merge(last.span),
            _ => stmt.span,
        };
        self.add_constraint(
            loop_scope,
            values_span,
            ConstraintKind::Iterable {
                iterator,
                variables: variable_pack,
            },
        );

        self.visit_block_without_child_scope(loop_scope, &for_stmt.body);
    }

    fn visit_while(&mut self, scope: ScopeId, stmt: &Stmt, while_stmt: &WhileStmt) {
        self.check_expr(scope, &while_stmt.condition);

        let while_scope = self.child_scope(stmt.id, scope);
        self.module.ast_scopes.insert(while_stmt.body.id, while_scope);

        self.visit_block_without_child_scope(while_scope, &while_stmt.body);
    }

    fn visit_repeat(&mut self, scope: ScopeId, stmt: &Stmt, repeat: &RepeatStmt) {
        let repeat_scope = self.child_scope(stmt.id, scope);
        self.module.ast_scopes.insert(repeat.body.id, repeat_scope);

        self.visit_block_without_child_scope(repeat_scope, &repeat.body);

        // The condition sees bindings introduced by the body.
        self.check_expr(repeat_scope, &repeat.condition);
    }

    fn visit_return(&mut self, scope: ScopeId, stmt: &Stmt, ret: &ReturnStmt) {
        // The return pack only has interesting contents when the
        // enclosing function carries a return annotation; use its head
        // as the expected types for the returned expressions.
        let return_type = self.scopes.get(scope).return_type;
        let expected: Vec<Option<TypeId>> = self
            .arena
            .pack_head_types(return_type)
            .into_iter()
            .map(Some)
            .collect();

        let expr_pack = self.check_pack_exprs(scope, &ret.exprs, &expected).pack;
        self.add_constraint(
            scope,
            stmt.span,
            ConstraintKind::PackSubtype {
                sub: expr_pack,
                sup: return_type,
            },
        );
    }

    fn visit_assign(&mut self, scope: ScopeId, stmt: &Stmt, assign: &AssignStmt) {
        let var_pack = self.check_lvalues(scope, &assign.targets);

        let extended = self
            .arena
            .extend_type_pack(&self.builtins, var_pack, assign.values.len());

        let mut expected: Vec<Option<TypeId>> = Vec::with_capacity(extended.head.len());
        for ty in extended.head {
            let ty = self.arena.follow(ty);
            if matches!(self.arena.get(ty), Type::Free(_)) {
                expected.push(None);
            } else {
                expected.push(Some(ty));
            }
        }

        let value_pack = self.check_pack_exprs(scope, &assign.values, &expected).pack;

        self.add_constraint(
            scope,
            stmt.span,
            ConstraintKind::PackSubtype {
                sub: value_pack,
                sup: var_pack,
            },
        );
    }

    fn visit_compound_assign(
        &mut self,
        scope: ScopeId,
        stmt: &Stmt,
        assign: &CompoundAssignStmt,
    ) {
        let var_ty = self.check_lvalue(scope, &assign.target);
        let value_ty = self.check_expr(scope, &assign.value).ty;

        let result = self.arena.add_type(Type::Blocked);
        self.add_constraint(
            scope,
            stmt.span,
            ConstraintKind::Binary {
                op: assign.op,
                left: var_ty,
                right: value_ty,
                out: result,
                node: stmt.id,
            },
        );
        self.add_constraint(
            scope,
            stmt.span,
            ConstraintKind::Subtype {
                sub: result,
                sup: var_ty,
            },
        );
    }

    fn visit_if(&mut self, scope: ScopeId, if_stmt: &IfStmt) {
        let cond_scope = self.child_scope(if_stmt.condition.id, scope);
        let refinement = self.check_expr(cond_scope, &if_stmt.condition).refinement;

        let then_scope = self.child_scope(if_stmt.then_body.id, scope);
        self.apply_refinements(then_scope, if_stmt.condition.span, refinement);
        self.visit_block_without_child_scope(then_scope, &if_stmt.then_body);

        if let Some(else_body) = &if_stmt.else_body {
            let else_scope = self.child_scope(else_body.id, scope);
            let negated = self.refinements.negation(refinement);
            self.apply_refinements(else_scope, if_stmt.condition.span, negated);
            self.visit_block_without_child_scope(else_scope, else_body);
        }
    }

    fn visit_function(&mut self, scope: ScopeId, function: &FunctionStmt) {
        let mut generalized = self.arena.add_type(Type::Blocked);

        let start = self.checkpoint();
        let sig = self.check_function_signature(scope, &function.func, None);

        match &function.name.kind {
            ExprKind::Local(local) => {
                let existing = self.scopes.lookup(scope, local.name);
                if let Some(existing) = existing {
                    self.add_constraint(
                        scope,
                        function.name.span,
                        ConstraintKind::Subtype {
                            sub: generalized,
                            sup: existing,
                        },
                    );

                    let Some(def) = self.dfg.get_def(function.name.id) else {
                        ice("function name has no def");
                    };
                    let target = self.scopes.get_mut(scope);
                    target.bindings.insert(
                        local.name,
                        Binding {
                            ty: generalized,
                            span: function.name.span,
                        },
                    );
                    target.def_refinements.insert(def, generalized);
                } else {
                    self.scopes.get_mut(scope).bindings.insert(
                        local.name,
                        Binding {
                            ty: generalized,
                            span: function.name.span,
                        },
                    );
                }

                self.scopes.get_mut(sig.body_scope).bindings.insert(
                    local.name,
                    Binding {
                        ty: sig.signature,
                        span: function.name.span,
                    },
                );
            }
            ExprKind::Global(name) => {
                let Some(existing) = self.scopes.lookup(scope, *name) else {
                    ice("global function name was not prepopulated");
                };
                generalized = existing;

                self.scopes.get_mut(sig.body_scope).bindings.insert(
                    *name,
                    Binding {
                        ty: sig.signature,
                        span: function.name.span,
                    },
                );
            }
            ExprKind::Field(_) | ExprKind::Index(_) => {
                let lvalue_ty = self.check_lvalue(scope, &function.name);
                self.add_constraint(
                    scope,
                    function.name.span,
                    ConstraintKind::Subtype {
                        sub: lvalue_ty,
                        sup: generalized,
                    },
                );
            }
            ExprKind::Error(_) => {
                generalized = self.builtins.error_recovery_type();
            }
            _ => ice("function name is not a local, global, or field"),
        }

        self.check_function_body(sig.body_scope, &function.func);
        let end = self.checkpoint();

        let constraint = self.add_constraint(
            sig.signature_scope,
            function.name.span,
            ConstraintKind::Generalization {
                generalized,
                source: sig.signature,
            },
        );
        for dep in self.constraints_between(start, end) {
            self.add_dependency(constraint, dep);
        }
    }

    fn visit_local_function(&mut self, scope: ScopeId, function: &LocalFunctionStmt) {
        let function_type = self.arena.add_type(Type::Blocked);
        self.scopes.get_mut(scope).bindings.insert(
            function.var.name,
            Binding {
                ty: function_type,
                span: function.var.span,
            },
        );

        let sig = self.check_function_signature(scope, &function.func, None);
        // Recursive calls inside the body see the un-generalized
        // signature.
        self.scopes.get_mut(sig.body_scope).bindings.insert(
            function.var.name,
            Binding {
                ty: sig.signature,
                span: function.func.span,
            },
        );

        if let Some(def) = self.dfg.get_local_def(function.var.id) {
            self.scopes
                .get_mut(scope)
                .def_refinements
                .insert(def, function_type);
        }

        let start = self.checkpoint();
        self.check_function_body(sig.body_scope, &function.func);
        let end = self.checkpoint();

        let constraint = self.add_constraint(
            sig.signature_scope,
            function.var.span,
            ConstraintKind::Generalization {
                generalized: function_type,
                source: sig.signature,
            },
        );
        for dep in self.constraints_between(start, end) {
            self.add_dependency(constraint, dep);
        }
    }

    fn visit_type_alias(&mut self, scope: ScopeId, stmt: &Stmt, alias: &TypeAliasStmt) {
        // Absent entries mean the alias was a duplicate definition; it
        // was reported during pre-binding and is skipped here.
        let Some(&defn_scope) = self.alias_defining_scopes.get(&stmt.id) else {
            return;
        };

        let alias_ty = {
            let s = self.scopes.get(scope);
            let bindings = if alias.exported {
                &s.exported_type_bindings
            } else {
                &s.private_type_bindings
            };
            match bindings.get(&alias.name) {
                Some(fun) => fun.ty,
                None => return,
            }
        };

        let ty = self.resolve_type(defn_scope, &alias.body, false);

        debug_assert!(matches!(self.arena.get(alias_ty), Type::Blocked));

        if self.occurs_check(alias_ty, ty) {
            self.arena.bind(alias_ty, self.builtins.any_ty);
            self.report_error(
                AnalysisError::OccursCheckFailed {
                    span: alias.name_span.into(),
                },
                alias.name_span,
            );
        } else {
            self.arena.bind(alias_ty, ty);
        }

        let type_params: Vec<TypeId> = self
            .create_generics(defn_scope, &alias.generics, true)
            .into_iter()
            .map(|(_, generic)| generic.ty)
            .collect();
        let type_pack_params = self
            .create_generic_packs(defn_scope, &alias.generic_packs, true)
            .into_iter()
            .map(|(_, generic)| generic.pack)
            .collect();

        self.add_constraint(
            scope,
            alias.body.span,
            ConstraintKind::Name {
                ty,
                name: alias.name,
                synthetic: false,
                type_params,
                type_pack_params,
            },
        );
    }

    /// Does the alias placeholder occur inside its own resolved body,
    /// through union and intersection parts?
    fn occurs_check(&self, needle: TypeId, haystack: TypeId) -> bool {
        debug_assert!(matches!(self.arena.get(needle), Type::Blocked));

        let haystack = self.arena.follow(haystack);
        if needle == haystack {
            return true;
        }

        match self.arena.get(haystack) {
            Type::Union(parts) | Type::Intersection(parts) => parts
                .iter()
                .any(|&part| self.occurs_check(needle, part)),
            _ => false,
        }
    }

    fn visit_declare_global(&mut self, scope: ScopeId, stmt: &Stmt, global: &DeclareGlobalStmt) {
        let ty = self.resolve_type(scope, &global.annotation, false);

        self.module.declared_globals.insert(global.name, ty);
        self.scopes.get_mut(scope).bindings.insert(
            global.name,
            Binding {
                ty,
                span: stmt.span,
            },
        );
    }

    fn visit_declare_function(
        &mut self,
        scope: ScopeId,
        stmt: &Stmt,
        function: &DeclareFunctionStmt,
    ) {
        let generics = self.create_generics(scope, &function.generics, false);
        let generic_packs = self.create_generic_packs(scope, &function.generic_packs, false);

        let mut generic_tys = Vec::with_capacity(generics.len());
        for (name, generic) in generics {
            generic_tys.push(generic.ty);
            self.scopes
                .get_mut(scope)
                .private_type_bindings
                .insert(name, TypeFun::monomorphic(generic.ty));
        }

        let mut generic_tps = Vec::with_capacity(generic_packs.len());
        for (name, generic) in generic_packs {
            generic_tps.push(generic.pack);
            self.scopes
                .get_mut(scope)
                .private_type_pack_bindings
                .insert(name, generic.pack);
        }

        let has_generics = !generic_tys.is_empty() || !generic_tps.is_empty();
        let fun_scope = if has_generics {
            self.child_scope(stmt.id, scope)
        } else {
            scope
        };

        let arg_pack = self.resolve_type_list(fun_scope, &function.params, false);
        let ret_pack = self.resolve_type_list(fun_scope, &function.ret, false);

        let fn_type = self.arena.add_type(Type::Function(Box::new(
            crate::sema::types::FunctionType {
                generics: generic_tys,
                generic_packs: generic_tps,
                arg_pack,
                ret_pack,
                arg_names: function.param_names.iter().map(|&n| Some(n)).collect(),
                has_self: false,
                has_no_generics: !has_generics,
            },
        )));

        self.module.declared_globals.insert(function.name, fn_type);
        self.scopes.get_mut(scope).bindings.insert(
            function.name,
            Binding {
                ty: fn_type,
                span: stmt.span,
            },
        );
    }

    fn visit_declare_class(&mut self, scope: ScopeId, stmt: &Stmt, class: &DeclareClassStmt) {
        let mut super_ty = if self.config.negated_class_types {
            Some(self.builtins.class_ty)
        } else {
            None
        };

        if let Some(super_name) = class.super_name {
            let fun_ty = self.scopes.lookup_type(scope, super_name).map(|fun| fun.ty);
            let Some(parent) = fun_ty else {
                self.report_error(
                    AnalysisError::UnknownTypeSymbol {
                        name: self.interner.resolve(super_name).to_string(),
                        span: stmt.span.into(),
                    },
                    stmt.span,
                );
                return;
            };

            super_ty = Some(parent);

            let followed = self.arena.follow(parent);
            if !matches!(self.arena.get(followed), Type::Class(_)) {
                self.report_error(
                    AnalysisError::GenericError {
                        message: format!(
                            "cannot use non-class type '{}' as a superclass of class '{}'",
                            self.interner.resolve(super_name),
                            self.interner.resolve(class.name),
                        ),
                        span: stmt.span.into(),
                    },
                    stmt.span,
                );
                return;
            }
        }

        let class_ty = self.arena.add_type(Type::Class(Box::new(
            crate::sema::types::ClassType::new(
                class.name,
                super_ty,
                Some(self.module.name.clone()),
            ),
        )));

        let level = self.scopes.get(scope).level;
        let meta_ty = self.arena.add_type(Type::Table(Box::new(TableType::new(
            TableState::Sealed,
            level,
            Some(scope),
        ))));

        if let Type::Class(ctv) = self.arena.as_mutable(class_ty) {
            ctv.metatable = Some(meta_ty);
        }

        self.scopes
            .get_mut(scope)
            .exported_type_bindings
            .insert(class.name, TypeFun::monomorphic(class_ty));

        for prop in &class.props {
            let mut prop_ty = self.resolve_type(scope, &prop.annotation, false);
            let assign_to_metatable = is_metamethod(self.interner.resolve(prop.name));

            // Methods implicitly take self, which the annotation does
            // not spell out.
            if prop.is_method
                && let Type::Function(ftv) = self.arena.get(self.arena.follow(prop_ty))
            {
                let old_args = ftv.arg_pack;
                let followed = self.arena.follow(prop_ty);
                let new_args = self.arena.add_type_pack(TypePack::Pack {
                    head: vec![class_ty],
                    tail: Some(old_args),
                });
                if let Type::Function(ftv) = self.arena.as_mutable(followed) {
                    ftv.arg_names.insert(0, Some(self.sym_self));
                    ftv.arg_pack = new_args;
                    ftv.has_self = true;
                }
                prop_ty = followed;
            }

            let target_ty = if assign_to_metatable { meta_ty } else { class_ty };
            let existing = self.class_prop(target_ty, prop.name);

            match existing {
                None => {
                    self.set_class_prop(target_ty, prop.name, prop_ty);
                }
                Some(current) => {
                    // Keep overload intersections flat instead of
                    // nesting them per declaration.
                    let current_followed = self.arena.follow(current);
                    match self.arena.get(current_followed) {
                        Type::Intersection(parts) => {
                            let mut options = parts.clone();
                            options.push(prop_ty);
                            let merged = self.arena.add_type(Type::Intersection(options));
                            self.set_class_prop(target_ty, prop.name, merged);
                        }
                        Type::Function(_) => {
                            let merged = self.arena.add_type(Type::Intersection(
                                [current, prop_ty].into_iter().collect(),
                            ));
                            self.set_class_prop(target_ty, prop.name, merged);
                        }
                        _ => {
                            self.report_error(
                                AnalysisError::GenericError {
                                    message: format!(
                                        "cannot overload non-function class member '{}'",
                                        self.interner.resolve(prop.name),
                                    ),
                                    span: prop.span.into(),
                                },
                                prop.span,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Existing prop visible on a class (walking its parents) or on a
    /// metatable table. Overloads declared on a subclass flatten with
    /// the inherited definition; the merged prop lands on the subclass.
    fn class_prop(&self, subject: TypeId, name: Symbol) -> Option<TypeId> {
        match self.arena.get(subject) {
            Type::Table(ttv) => ttv.props.get(&name).map(|p| p.ty),
            Type::Class(_) => {
                let mut current = Some(subject);
                while let Some(ty) = current {
                    let followed = self.arena.follow(ty);
                    let Type::Class(ctv) = self.arena.get(followed) else {
                        break;
                    };
                    if let Some(prop) = ctv.props.get(&name) {
                        return Some(prop.ty);
                    }
                    current = ctv.parent;
                }
                None
            }
            _ => None,
        }
    }

    fn set_class_prop(&mut self, subject: TypeId, name: Symbol, ty: TypeId) {
        match self.arena.as_mutable(subject) {
            Type::Class(ctv) => {
                ctv.props.insert(name, Property { ty });
            }
            Type::Table(ttv) => {
                ttv.props.insert(name, Property { ty });
            }
            _ => ice("class prop target is neither class nor table"),
        }
    }

    pub(crate) fn match_require<'e>(&self, call: &'e CallExpr) -> Option<&'e Expr> {
        if call.args.len() != 1 {
            return None;
        }
        let ExprKind::Global(name) = &call.func.kind else {
            return None;
        };
        if self.interner.resolve(*name) != "require" {
            return None;
        }
        Some(&call.args[0])
    }
}

fn is_metamethod(name: &str) -> bool {
    matches!(
        name,
        "__index"
            | "__newindex"
            | "__call"
            | "__concat"
            | "__unm"
            | "__add"
            | "__sub"
            | "__mul"
            | "__div"
            | "__mod"
            | "__pow"
            | "__tostring"
            | "__metatable"
            | "__eq"
            | "__lt"
            | "__le"
            | "__mode"
            | "__iter"
            | "__len"
    )
}
