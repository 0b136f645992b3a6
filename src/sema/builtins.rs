// src/sema/builtins.rs
//! Pre-allocated handles for the builtin types, created once per module
//! arena and immutable afterwards. Modules analyzed in parallel each
//! carry their own copy, so nothing here is shared mutable state.

use crate::frontend::Interner;
use crate::sema::type_arena::{TypeArena, TypeId, TypePackId};
use crate::sema::types::{ClassType, PrimitiveType, Singleton, Type, TypePack};

#[derive(Debug, Clone, Copy)]
pub struct BuiltinTypes {
    pub nil_ty: TypeId,
    pub boolean_ty: TypeId,
    pub number_ty: TypeId,
    pub string_ty: TypeId,
    pub thread_ty: TypeId,
    /// Top table type
    pub table_ty: TypeId,
    /// Top function type
    pub function_ty: TypeId,
    pub true_ty: TypeId,
    pub false_ty: TypeId,
    pub any_ty: TypeId,
    pub unknown_ty: TypeId,
    pub never_ty: TypeId,
    /// `false | nil`
    pub falsy_ty: TypeId,
    /// `~(false | nil)`
    pub truthy_ty: TypeId,
    /// Root of the declared-class hierarchy
    pub class_ty: TypeId,
    /// Error recovery sentinel
    pub error_ty: TypeId,
    pub any_pack: TypePackId,
    pub error_pack: TypePackId,
}

impl BuiltinTypes {
    pub fn new(arena: &mut TypeArena, interner: &mut Interner) -> Self {
        let nil_ty = arena.add_type(Type::Primitive(PrimitiveType::Nil));
        let boolean_ty = arena.add_type(Type::Primitive(PrimitiveType::Boolean));
        let number_ty = arena.add_type(Type::Primitive(PrimitiveType::Number));
        let string_ty = arena.add_type(Type::Primitive(PrimitiveType::String));
        let thread_ty = arena.add_type(Type::Primitive(PrimitiveType::Thread));
        let table_ty = arena.add_type(Type::Primitive(PrimitiveType::Table));
        let function_ty = arena.add_type(Type::Primitive(PrimitiveType::Function));

        let true_ty = arena.add_type(Type::Singleton(Singleton::Bool(true)));
        let false_ty = arena.add_type(Type::Singleton(Singleton::Bool(false)));

        let any_ty = arena.add_type(Type::Any);
        let unknown_ty = arena.add_type(Type::Unknown);
        let never_ty = arena.add_type(Type::Never);
        let error_ty = arena.add_type(Type::ErrorRecovery);

        let falsy_ty = arena.add_type(Type::Union([false_ty, nil_ty].into_iter().collect()));
        let truthy_ty = arena.add_type(Type::Negation(falsy_ty));

        let class_name = interner.intern("class");
        let class_ty = arena.add_type(Type::Class(Box::new(ClassType::new(
            class_name, None, None,
        ))));

        let any_pack = arena.add_type_pack(TypePack::Variadic {
            ty: any_ty,
            hidden: false,
        });
        let error_pack = arena.add_type_pack(TypePack::ErrorRecovery);

        Self {
            nil_ty,
            boolean_ty,
            number_ty,
            string_ty,
            thread_ty,
            table_ty,
            function_ty,
            true_ty,
            false_ty,
            any_ty,
            unknown_ty,
            never_ty,
            falsy_ty,
            truthy_ty,
            class_ty,
            error_ty,
            any_pack,
            error_pack,
        }
    }

    pub fn error_recovery_type(&self) -> TypeId {
        self.error_ty
    }

    pub fn error_recovery_type_pack(&self) -> TypePackId {
        self.error_pack
    }
}
