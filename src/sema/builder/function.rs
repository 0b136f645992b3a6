// src/sema/builder/function.rs
//
// Function signatures and bodies. A signature gets its own scope (where
// generics and parameters live); the body scope hangs off it. The
// composed function type is recorded against the function expression
// before the body is walked, so recursive references see it.

use crate::errors::ice;
use crate::frontend::ast::{FunctionBody, GenericPackParam, GenericTypeParam};
use crate::frontend::intern::Symbol;
use crate::sema::builder::{ConstraintGraphBuilder, FunctionSignature};
use crate::sema::constraint::ConstraintKind;
use crate::sema::fallthrough::block_falls_through;
use crate::sema::scope::{Binding, GenericPackDef, GenericTypeDef, ScopeId, TypeFun};
use crate::sema::type_arena::{TypeId, TypePackId};
use crate::sema::types::{FunctionType, GenericType, Type, TypePack};

impl ConstraintGraphBuilder<'_> {
    pub(crate) fn check_function_signature(
        &mut self,
        parent: ScopeId,
        func: &FunctionBody,
        expected: Option<TypeId>,
    ) -> FunctionSignature {
        let mut expected = expected.map(|ty| self.arena.follow(ty));

        let has_generics = !func.generics.is_empty() || !func.generic_packs.is_empty();

        let signature_scope = self.child_scope(func.id, parent);

        // returnType is assigned before bodyScope is created so the
        // body inherits it.
        let return_type = self.fresh_type_pack(signature_scope);
        self.scopes.get_mut(signature_scope).return_type = return_type;

        let body_scope = self.child_scope(func.body.id, signature_scope);

        let mut generic_types: Vec<TypeId> = Vec::new();
        let mut generic_type_packs: Vec<TypePackId> = Vec::new();

        if has_generics {
            for (name, generic) in self.create_generics(signature_scope, &func.generics, false) {
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

            // An explicitly generic function cannot also inherit an
            // expected shape.
            expected = None;
        }

        let expected_function = expected.and_then(|ty| match self.arena.get(ty) {
            Type::Function(f) => Some(f.as_ref().clone()),
            _ => None,
        });

        let mut arg_types: Vec<TypeId> = Vec::new();
        let mut arg_names: Vec<Option<Symbol>> = Vec::new();
        let mut expected_args = crate::sema::type_arena::ExtendedPack::default();

        if let Some(expected_function) = &expected_function {
            expected_args = self.arena.extend_type_pack(
                &self.builtins,
                expected_function.arg_pack,
                func.params.len(),
            );

            generic_types = expected_function.generics.clone();
            generic_type_packs = expected_function.generic_packs.clone();
        }

        if let Some(self_param) = &func.self_param {
            let self_type = self.fresh_type(signature_scope);
            arg_types.push(self_type);
            arg_names.push(Some(self_param.name));
            self.scopes.get_mut(signature_scope).bindings.insert(
                self_param.name,
                Binding {
                    ty: self_type,
                    span: self_param.span,
                },
            );
        }

        for (i, param) in func.params.iter().enumerate() {
            let ty = self.fresh_type(signature_scope);
            arg_types.push(ty);
            arg_names.push(Some(param.name));
            self.scopes.get_mut(signature_scope).bindings.insert(
                param.name,
                Binding {
                    ty,
                    span: param.span,
                },
            );

            let Some(def) = self.dfg.get_local_def(param.id) else {
                ice("function parameter has no def");
            };
            self.scopes
                .get_mut(signature_scope)
                .def_refinements
                .insert(def, ty);

            if let Some(annotation) = &param.annotation {
                let mut annotation_ty = self.resolve_type(signature_scope, annotation, false);
                // A broken annotation is ignored in favor of a fresh
                // inference variable.
                let followed = self.arena.follow(annotation_ty);
                if matches!(self.arena.get(followed), Type::ErrorRecovery) {
                    annotation_ty = self.fresh_type(signature_scope);
                }
                self.add_constraint(
                    signature_scope,
                    annotation.span,
                    ConstraintKind::Subtype {
                        sub: ty,
                        sup: annotation_ty,
                    },
                );
            } else if let Some(&expected_arg) = expected_args.head.get(i) {
                self.add_constraint(
                    signature_scope,
                    param.span,
                    ConstraintKind::Subtype {
                        sub: ty,
                        sup: expected_arg,
                    },
                );
            }
        }

        let vararg_pack;
        if func.vararg {
            vararg_pack = if let Some(annotation) = &func.vararg_annotation {
                self.resolve_type_pack(signature_scope, annotation, false)
            } else if let Some(tail) = expected_args.tail.filter(|&tail| {
                matches!(
                    self.arena.get_pack(self.arena.follow_pack(tail)),
                    TypePack::Variadic { .. }
                )
            }) {
                tail
            } else {
                self.builtins.any_pack
            };

            self.scopes.get_mut(signature_scope).vararg_pack = Some(vararg_pack);
            self.scopes.get_mut(body_scope).vararg_pack = Some(vararg_pack);
        } else {
            // A hidden variadic tail admits extra arguments without
            // making `...` nameable in the body.
            vararg_pack = self.arena.add_type_pack(TypePack::Variadic {
                ty: self.builtins.any_ty,
                hidden: true,
            });

            self.scopes.get_mut(signature_scope).vararg_pack = None;
            self.scopes.get_mut(body_scope).vararg_pack = None;
        }

        // An explicit return annotation wins over the expected return
        // pack; checking reconciles any difference later.
        if let Some(return_annotation) = &func.return_annotation {
            let annotated = self.resolve_type_list(signature_scope, return_annotation, false);
            debug_assert!(matches!(
                self.arena.get_pack(return_type),
                TypePack::Free { .. }
            ));
            self.arena.bind_pack(return_type, annotated);
        } else if let Some(expected_function) = &expected_function {
            self.arena.bind_pack(return_type, expected_function.ret_pack);
        }

        let arg_pack = self.arena.add_type_pack(TypePack::Pack {
            head: arg_types,
            tail: Some(vararg_pack),
        });

        let signature = self.arena.add_type(Type::Function(Box::new(FunctionType {
            generics: generic_types,
            generic_packs: generic_type_packs,
            arg_pack,
            ret_pack: return_type,
            arg_names,
            has_self: false,
            has_no_generics: !has_generics,
        })));

        self.module.ast_types.insert(func.id, signature);

        if let Some(expected) = expected
            && matches!(self.arena.get(expected), Type::Free(_))
        {
            self.arena.bind(expected, signature);
        }

        FunctionSignature {
            signature,
            signature_scope,
            body_scope,
        }
    }

    pub(crate) fn check_function_body(&mut self, scope: ScopeId, func: &FunctionBody) {
        self.visit_block_without_child_scope(scope, &func.body);

        // If execution can reach the end of the body, the return type
        // must be compatible with the empty pack.
        if block_falls_through(&func.body) {
            let empty = self.arena.add_type_pack(TypePack::empty());
            let return_type = self.scopes.get(scope).return_type;
            self.add_constraint(
                scope,
                func.span,
                ConstraintKind::PackSubtype {
                    sub: return_type,
                    sup: empty,
                },
            );
        }
    }

    /// Allocate generic types for a parameter list. With `use_cache`,
    /// handles are reused through the parent scope's alias-parameter
    /// cache so pre-binding and visiting an alias agree on identity.
    pub(crate) fn create_generics(
        &mut self,
        scope: ScopeId,
        generics: &[GenericTypeParam],
        use_cache: bool,
    ) -> Vec<(Symbol, GenericTypeDef)> {
        let mut result = Vec::with_capacity(generics.len());

        for generic in generics {
            let parent = self.scopes.get(scope).parent;
            let cached = parent.and_then(|parent| {
                self.scopes
                    .get(parent)
                    .type_alias_type_params
                    .get(&generic.name)
                    .copied()
            });

            let ty = match cached {
                Some(cached) if use_cache => cached,
                _ => {
                    let ty = self.arena.add_type(Type::Generic(GenericType {
                        scope,
                        name: generic.name,
                    }));
                    if let Some(parent) = parent {
                        self.scopes
                            .get_mut(parent)
                            .type_alias_type_params
                            .insert(generic.name, ty);
                    }
                    ty
                }
            };

            let default = generic
                .default
                .as_ref()
                .map(|annotation| self.resolve_type(scope, annotation, false));

            result.push((generic.name, GenericTypeDef { ty, default }));
        }

        result
    }

    pub(crate) fn create_generic_packs(
        &mut self,
        scope: ScopeId,
        generics: &[GenericPackParam],
        use_cache: bool,
    ) -> Vec<(Symbol, GenericPackDef)> {
        let mut result = Vec::with_capacity(generics.len());

        for generic in generics {
            let parent = self.scopes.get(scope).parent;
            let cached = parent.and_then(|parent| {
                self.scopes
                    .get(parent)
                    .type_alias_type_pack_params
                    .get(&generic.name)
                    .copied()
            });

            let pack = match cached {
                Some(cached) if use_cache => cached,
                _ => {
                    let pack = self.arena.add_type_pack(TypePack::Generic {
                        scope,
                        name: generic.name,
                    });
                    if let Some(parent) = parent {
                        self.scopes
                            .get_mut(parent)
                            .type_alias_type_pack_params
                            .insert(generic.name, pack);
                    }
                    pack
                }
            };

            let default = generic
                .default
                .as_ref()
                .map(|annotation| self.resolve_type_pack(scope, annotation, false));

            result.push((generic.name, GenericPackDef { pack, default }));
        }

        result
    }
}
