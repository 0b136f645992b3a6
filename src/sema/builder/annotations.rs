// src/sema/builder/annotations.rs
//
// Surface type syntax to type nodes. Alias references that need
// expansion become pending-expansion placeholders; a TypeAliasExpansion
// constraint is queued for them unless we are already inside a type
// argument list, in which case the outer expansion's dispatch queues
// the nested ones.

use crate::errors::AnalysisError;
use crate::frontend::ast::{
    TypeAnnot, TypeAnnotKind, TypeArg, TypeList, TypePackAnnot, TypePackAnnotKind,
};
use crate::sema::builder::ConstraintGraphBuilder;
use crate::sema::constraint::ConstraintKind;
use crate::sema::scope::{ScopeId, TypeFun};
use crate::sema::type_arena::{TypeId, TypePackId};
use crate::sema::types::{
    FunctionType, PendingExpansion, Property, Singleton, TableIndexer, TableState, TableType, Type,
    TypePack,
};

impl ConstraintGraphBuilder<'_> {
    pub(crate) fn resolve_type(
        &mut self,
        scope: ScopeId,
        annotation: &TypeAnnot,
        in_type_arguments: bool,
    ) -> TypeId {
        let result = match &annotation.kind {
            TypeAnnotKind::Reference {
                prefix,
                name,
                params,
            } => {
                let alias: Option<TypeFun> = match prefix {
                    Some(prefix) => self
                        .scopes
                        .lookup_imported_type(scope, *prefix, *name)
                        .cloned(),
                    None => self.scopes.lookup_type(scope, *name).cloned(),
                };

                match alias {
                    None => self.builtins.error_recovery_type(),
                    Some(alias) if !alias.is_generic() => alias.ty,
                    Some(_) => {
                        let mut type_params = Vec::new();
                        let mut type_pack_params = Vec::new();

                        for param in params {
                            match param {
                                TypeArg::Type(ty) => {
                                    type_params.push(self.resolve_type(scope, ty, true));
                                }
                                TypeArg::Pack(pack) => {
                                    type_pack_params
                                        .push(self.resolve_type_pack(scope, pack, true));
                                }
                            }
                        }

                        let result =
                            self.arena
                                .add_type(Type::Pending(Box::new(PendingExpansion {
                                    prefix: *prefix,
                                    name: *name,
                                    type_params,
                                    type_pack_params,
                                })));

                        // Dispatching this constraint queues expansion
                        // constraints for any nested applications.
                        if !in_type_arguments {
                            self.add_constraint(
                                scope,
                                annotation.span,
                                ConstraintKind::TypeAliasExpansion { target: result },
                            );
                        }

                        result
                    }
                }
            }
            TypeAnnotKind::Table { props, indexer } => {
                let level = self.scopes.get(scope).level;
                let mut table = TableType::new(TableState::Sealed, level, Some(scope));

                for prop in props {
                    let prop_ty = self.resolve_type(scope, &prop.ty, in_type_arguments);
                    table.props.insert(prop.name, Property { ty: prop_ty });
                }

                if let Some(indexer) = indexer {
                    table.indexer = Some(TableIndexer {
                        key_ty: self.resolve_type(scope, &indexer.key, in_type_arguments),
                        result_ty: self.resolve_type(scope, &indexer.result, in_type_arguments),
                    });
                }

                self.arena.add_type(Type::Table(Box::new(table)))
            }
            TypeAnnotKind::Function(func) => {
                let has_generics = !func.generics.is_empty() || !func.generic_packs.is_empty();

                let mut generic_types = Vec::new();
                let mut generic_type_packs = Vec::new();

                // Generic bindings need a scope of their own; without
                // generics the enclosing scope serves directly.
                let signature_scope = if has_generics {
                    let signature_scope = self.child_scope(annotation.id, scope);

                    for (name, generic) in
                        self.create_generics(signature_scope, &func.generics, false)
                    {
                        generic_types.push(generic.ty);
                        self.scopes
                            .get_mut(signature_scope)
                            .private_type_bindings
                            .insert(name, TypeFun::monomorphic(generic.ty));
                    }
                    for (name, generic) in
                        self.create_generic_packs(signature_scope, &func.generic_packs, false)
                    {
                        generic_type_packs.push(generic.pack);
                        self.scopes
                            .get_mut(signature_scope)
                            .private_type_pack_bindings
                            .insert(name, generic.pack);
                    }

                    signature_scope
                } else {
                    scope
                };

                let arg_pack =
                    self.resolve_type_list(signature_scope, &func.params, in_type_arguments);
                let ret_pack =
                    self.resolve_type_list(signature_scope, &func.ret, in_type_arguments);

                self.arena.add_type(Type::Function(Box::new(FunctionType {
                    generics: generic_types,
                    generic_packs: generic_type_packs,
                    arg_pack,
                    ret_pack,
                    arg_names: func.param_names.clone(),
                    has_self: false,
                    has_no_generics: !has_generics,
                })))
            }
            TypeAnnotKind::Typeof(expr) => self.check_expr(scope, expr).ty,
            TypeAnnotKind::Union(parts) => {
                let parts = parts
                    .iter()
                    .map(|part| self.resolve_type(scope, part, in_type_arguments))
                    .collect();
                self.arena.add_type(Type::Union(parts))
            }
            TypeAnnotKind::Intersection(parts) => {
                let parts = parts
                    .iter()
                    .map(|part| self.resolve_type(scope, part, in_type_arguments))
                    .collect();
                self.arena.add_type(Type::Intersection(parts))
            }
            TypeAnnotKind::BoolSingleton(value) => self.arena.singleton(Singleton::Bool(*value)),
            TypeAnnotKind::StringSingleton(value) => {
                self.arena.singleton(Singleton::String(*value))
            }
            TypeAnnotKind::Error => self.builtins.error_recovery_type(),
        };

        self.module
            .ast_resolved_types
            .insert(annotation.id, result);
        result
    }

    pub(crate) fn resolve_type_pack(
        &mut self,
        scope: ScopeId,
        annotation: &TypePackAnnot,
        in_type_arguments: bool,
    ) -> TypePackId {
        let result = match &annotation.kind {
            TypePackAnnotKind::Explicit(list) => {
                self.resolve_type_list(scope, list, in_type_arguments)
            }
            TypePackAnnotKind::Variadic(element) => {
                let mut ty = self.resolve_type(scope, element, in_type_arguments);
                if matches!(
                    self.arena.get(self.arena.follow(ty)),
                    Type::ErrorRecovery
                ) {
                    ty = self.fresh_type(scope);
                }
                self.arena.add_type_pack(TypePack::Variadic { ty, hidden: false })
            }
            TypePackAnnotKind::Generic(name) => {
                match self.scopes.lookup_type_pack(scope, *name) {
                    Some(pack) => pack,
                    None => {
                        self.report_error(
                            AnalysisError::UnknownTypeSymbol {
                                name: self.interner.resolve(*name).to_string(),
                                span: annotation.span.into(),
                            },
                            annotation.span,
                        );
                        self.builtins.error_recovery_type_pack()
                    }
                }
            }
        };

        self.module
            .ast_resolved_type_packs
            .insert(annotation.id, result);
        result
    }

    pub(crate) fn resolve_type_list(
        &mut self,
        scope: ScopeId,
        list: &TypeList,
        in_type_arguments: bool,
    ) -> TypePackId {
        let head = list
            .types
            .iter()
            .map(|ty| self.resolve_type(scope, ty, in_type_arguments))
            .collect();

        let tail = list
            .tail
            .as_ref()
            .map(|tail| self.resolve_type_pack(scope, tail, in_type_arguments));

        self.arena.add_type_pack(TypePack::Pack { head, tail })
    }
}
