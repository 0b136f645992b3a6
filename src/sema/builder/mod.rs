// src/sema/builder/mod.rs
//
// The constraint graph builder walks a module's AST, creating scopes,
// fresh types, and constraints, and records type assignments against
// AST nodes. It never solves anything: ordering requirements between
// constraints are encoded as dependency edges, wired with checkpoints
// over the emission list so that edges always point at earlier
// constraints and the dependency graph stays acyclic.

mod annotations;
mod expr;
mod function;
mod lvalue;
mod stmt;
#[cfg(test)]
mod tests;

use std::cell::Cell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::config::AnalysisConfig;
use crate::dfg::{DataFlowGraph, DefId};
use crate::errors::{AnalysisError, TypeError, ice};
use crate::frontend::ast::{Block, Expr, ExprKind, NodeId, Stmt, StmtKind};
use crate::frontend::intern::{Interner, Symbol};
use crate::frontend::Span;
use crate::sema::builtins::BuiltinTypes;
use crate::sema::constraint::{Constraint, ConstraintId, ConstraintKind};
use crate::sema::module::{Module, ModuleResolver};
use crate::sema::refinements::{Refinement, RefinementArena, RefinementId};
use crate::sema::scope::{ScopeArena, ScopeId, TypeFun};
use crate::sema::type_arena::{TypeArena, TypeId, TypePackId};
use crate::sema::types::{Property, TableState, TableType, Type, TypePack};

/// Snapshot of the constraint list used to wire dependency edges
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint(usize);

/// The inferred type of an expression together with the refinement it
/// contributes to surrounding conditions
#[derive(Debug, Clone, Copy)]
pub struct Inference {
    pub ty: TypeId,
    pub refinement: Option<RefinementId>,
}

impl Inference {
    pub fn new(ty: TypeId) -> Self {
        Self {
            ty,
            refinement: None,
        }
    }

    pub fn with_refinement(ty: TypeId, refinement: Option<RefinementId>) -> Self {
        Self { ty, refinement }
    }
}

/// Pack-position analogue of [`Inference`]
#[derive(Debug, Clone)]
pub struct InferencePack {
    pub pack: TypePackId,
    pub refinements: Vec<Option<RefinementId>>,
}

impl InferencePack {
    pub fn new(pack: TypePackId) -> Self {
        Self {
            pack,
            refinements: Vec::new(),
        }
    }
}

/// Scopes and composed type produced for a function's signature
#[derive(Debug, Clone, Copy)]
pub(crate) struct FunctionSignature {
    pub signature: TypeId,
    pub signature_scope: ScopeId,
    pub body_scope: ScopeId,
}

/// RAII recursion depth guard
pub(crate) struct RecursionGuard {
    depth: Rc<Cell<usize>>,
}

impl RecursionGuard {
    fn new(depth: Rc<Cell<usize>>) -> Self {
        depth.set(depth.get() + 1);
        Self { depth }
    }
}

impl Drop for RecursionGuard {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

/// Everything the builder hands to the solver
#[derive(Debug)]
pub struct BuildResult {
    pub module: Module,
    pub constraints: Vec<Constraint>,
    pub scopes: ScopeArena,
    pub arena: TypeArena,
    pub refinements: RefinementArena,
    pub builtins: BuiltinTypes,
    pub global_scope: ScopeId,
    pub root_scope: ScopeId,
}

pub struct ConstraintGraphBuilder<'a> {
    pub(crate) module: Module,
    pub(crate) config: &'a AnalysisConfig,
    pub(crate) interner: &'a Interner,
    pub(crate) dfg: &'a DataFlowGraph,
    pub(crate) resolver: &'a dyn ModuleResolver,
    pub(crate) arena: TypeArena,
    pub(crate) builtins: BuiltinTypes,
    pub(crate) scopes: ScopeArena,
    pub(crate) refinements: RefinementArena,
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) global_scope: ScopeId,
    root_scope: Option<ScopeId>,
    recursion_depth: Rc<Cell<usize>>,
    /// Definition scope created for each alias during block pre-binding
    pub(crate) alias_defining_scopes: FxHashMap<NodeId, ScopeId>,
    pub(crate) sym_self: Symbol,
}

impl<'a> ConstraintGraphBuilder<'a> {
    pub fn new(
        module_name: impl Into<String>,
        config: &'a AnalysisConfig,
        interner: &'a mut Interner,
        dfg: &'a DataFlowGraph,
        resolver: &'a dyn ModuleResolver,
    ) -> Self {
        let mut arena = TypeArena::new();
        let builtins = BuiltinTypes::new(&mut arena, interner);

        let mut scopes = ScopeArena::new();
        let empty_returns = arena.add_type_pack(TypePack::empty());
        let global_scope = scopes.root(empty_returns);

        // Builtin type names resolve through ordinary alias lookup.
        let globals = scopes.get_mut(global_scope);
        for (name, ty) in [
            ("nil", builtins.nil_ty),
            ("boolean", builtins.boolean_ty),
            ("number", builtins.number_ty),
            ("string", builtins.string_ty),
            ("thread", builtins.thread_ty),
            ("any", builtins.any_ty),
            ("unknown", builtins.unknown_ty),
            ("never", builtins.never_ty),
        ] {
            let sym = interner.intern(name);
            globals
                .private_type_bindings
                .insert(sym, TypeFun::monomorphic(ty));
        }

        let sym_self = interner.intern("self");
        let interner: &'a Interner = interner;

        Self {
            module: Module::new(module_name),
            config,
            interner,
            dfg,
            resolver,
            arena,
            builtins,
            scopes,
            refinements: RefinementArena::new(),
            constraints: Vec::new(),
            global_scope,
            root_scope: None,
            recursion_depth: Rc::new(Cell::new(0)),
            alias_defining_scopes: FxHashMap::default(),
            sym_self,
        }
    }

    /// Walk the whole program and return the finished graph
    pub fn build(mut self, program: &Block) -> BuildResult {
        debug_assert!(self.root_scope.is_none());

        let root = self.scopes.child(self.global_scope);
        self.root_scope = Some(root);
        self.module.ast_scopes.insert(program.id, root);

        let returns = self.arena.fresh_type_pack(root);
        self.scopes.get_mut(root).return_type = returns;

        self.prepopulate_globals(root, program);
        self.visit_block_without_child_scope(root, program);

        self.module.exported_type_bindings =
            self.scopes.get(root).exported_type_bindings.clone();

        BuildResult {
            module: self.module,
            constraints: self.constraints,
            scopes: self.scopes,
            arena: self.arena,
            refinements: self.refinements,
            builtins: self.builtins,
            global_scope: self.global_scope,
            root_scope: root,
        }
    }

    pub(crate) fn fresh_type(&mut self, scope: ScopeId) -> TypeId {
        self.arena.fresh_type(scope)
    }

    pub(crate) fn fresh_type_pack(&mut self, scope: ScopeId) -> TypePackId {
        self.arena.fresh_type_pack(scope)
    }

    /// Create a child scope and record it against the introducing node
    pub(crate) fn child_scope(&mut self, node: NodeId, parent: ScopeId) -> ScopeId {
        let scope = self.scopes.child(parent);
        self.module.ast_scopes.insert(node, scope);
        scope
    }

    pub(crate) fn add_constraint(
        &mut self,
        scope: ScopeId,
        span: Span,
        kind: ConstraintKind,
    ) -> ConstraintId {
        let id = ConstraintId(self.constraints.len() as u32);
        self.constraints.push(Constraint::new(scope, span, kind));
        id
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.constraints.len())
    }

    /// Ids of every constraint emitted between two checkpoints
    pub(crate) fn constraints_between(&self, start: Checkpoint, end: Checkpoint) -> Vec<ConstraintId> {
        (start.0..end.0).map(|i| ConstraintId(i as u32)).collect()
    }

    pub(crate) fn add_dependency(&mut self, constraint: ConstraintId, dependency: ConstraintId) {
        self.constraints[constraint.0 as usize]
            .dependencies
            .push(dependency);
    }

    pub(crate) fn report_error(&mut self, error: AnalysisError, span: Span) {
        self.module.errors.push(TypeError::new(error, span));
    }

    pub(crate) fn report_code_too_complex(&mut self, span: Span) {
        self.report_error(AnalysisError::CodeTooComplex { span: span.into() }, span);
    }

    /// Enter one recursion level. `None` means the limit was exceeded;
    /// `CodeTooComplex` has already been reported and the caller must
    /// produce an error-recovery result.
    pub(crate) fn recursion_guard(&mut self, span: Span) -> Option<RecursionGuard> {
        let guard = RecursionGuard::new(self.recursion_depth.clone());
        if self.recursion_depth.get() >= self.config.recursion_limit {
            self.report_code_too_complex(span);
            return None;
        }
        Some(guard)
    }

    /// Pre-bind every `function globalName(...)` reachable from the
    /// program to a blocked type in the module's root scope, so earlier
    /// statements can reference it.
    fn prepopulate_globals(&mut self, scope: ScopeId, block: &Block) {
        for stmt in &block.stmts {
            self.prepopulate_globals_stmt(scope, stmt);
        }
    }

    fn prepopulate_globals_stmt(&mut self, scope: ScopeId, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Function(function) => {
                if let ExprKind::Global(name) = &function.name.kind {
                    let ty = self.arena.add_type(Type::Blocked);
                    self.scopes.get_mut(scope).bindings.insert(
                        *name,
                        crate::sema::scope::Binding {
                            ty,
                            span: function.name.span,
                        },
                    );
                }
                self.prepopulate_globals(scope, &function.func.body);
            }
            StmtKind::LocalFunction(function) => {
                self.prepopulate_globals(scope, &function.func.body)
            }
            StmtKind::Block(block) => self.prepopulate_globals(scope, block),
            StmtKind::If(if_stmt) => {
                self.prepopulate_globals_expr(scope, &if_stmt.condition);
                self.prepopulate_globals(scope, &if_stmt.then_body);
                if let Some(else_body) = &if_stmt.else_body {
                    self.prepopulate_globals(scope, else_body);
                }
            }
            StmtKind::While(while_stmt) => {
                self.prepopulate_globals_expr(scope, &while_stmt.condition);
                self.prepopulate_globals(scope, &while_stmt.body);
            }
            StmtKind::Repeat(repeat) => {
                self.prepopulate_globals(scope, &repeat.body);
                self.prepopulate_globals_expr(scope, &repeat.condition);
            }
            StmtKind::NumericFor(for_stmt) => self.prepopulate_globals(scope, &for_stmt.body),
            StmtKind::GenericFor(for_stmt) => self.prepopulate_globals(scope, &for_stmt.body),
            StmtKind::Local(local) => {
                for value in &local.values {
                    self.prepopulate_globals_expr(scope, value);
                }
            }
            StmtKind::Assign(assign) => {
                for value in &assign.values {
                    self.prepopulate_globals_expr(scope, value);
                }
            }
            StmtKind::CompoundAssign(assign) => {
                self.prepopulate_globals_expr(scope, &assign.value)
            }
            StmtKind::Return(ret) => {
                for expr in &ret.exprs {
                    self.prepopulate_globals_expr(scope, expr);
                }
            }
            StmtKind::Expr(expr) => self.prepopulate_globals_expr(scope, expr),
            StmtKind::Error(error) => {
                for s in &error.stmts {
                    self.prepopulate_globals_stmt(scope, s);
                }
                for e in &error.exprs {
                    self.prepopulate_globals_expr(scope, e);
                }
            }
            _ => {}
        }
    }

    fn prepopulate_globals_expr(&mut self, scope: ScopeId, expr: &Expr) {
        match &expr.kind {
            ExprKind::Function(func) => self.prepopulate_globals(scope, &func.body),
            ExprKind::Group(inner) => self.prepopulate_globals_expr(scope, inner),
            ExprKind::Call(call) => {
                self.prepopulate_globals_expr(scope, &call.func);
                for arg in &call.args {
                    self.prepopulate_globals_expr(scope, arg);
                }
            }
            ExprKind::Table(table) => {
                for item in &table.items {
                    if let Some(key) = &item.key {
                        self.prepopulate_globals_expr(scope, key);
                    }
                    self.prepopulate_globals_expr(scope, &item.value);
                }
            }
            ExprKind::Field(field) => self.prepopulate_globals_expr(scope, &field.obj),
            ExprKind::Index(index) => {
                self.prepopulate_globals_expr(scope, &index.obj);
                self.prepopulate_globals_expr(scope, &index.key);
            }
            ExprKind::Unary(unary) => self.prepopulate_globals_expr(scope, &unary.operand),
            ExprKind::Binary(binary) => {
                self.prepopulate_globals_expr(scope, &binary.left);
                self.prepopulate_globals_expr(scope, &binary.right);
            }
            ExprKind::IfElse(if_else) => {
                self.prepopulate_globals_expr(scope, &if_else.condition);
                self.prepopulate_globals_expr(scope, &if_else.then_expr);
                self.prepopulate_globals_expr(scope, &if_else.else_expr);
            }
            ExprKind::TypeAssertion(assertion) => {
                self.prepopulate_globals_expr(scope, &assertion.expr)
            }
            ExprKind::Error(exprs) => {
                for e in exprs {
                    self.prepopulate_globals_expr(scope, e);
                }
            }
            _ => {}
        }
    }

    /// Interpret a refinement tree into the scope's def refinement map.
    /// Writes only to `scope`; parent bindings are never touched.
    pub(crate) fn apply_refinements(
        &mut self,
        scope: ScopeId,
        span: Span,
        refinement: Option<RefinementId>,
    ) {
        let Some(refinement) = refinement else {
            return;
        };

        if self.config.solver_trace {
            tracing::trace!(scope = scope.0, "applying refinements");
        }

        let mut refis: FxHashMap<DefId, TypeId> = FxHashMap::default();
        let mut pending: Vec<ConstraintKind> = Vec::new();
        self.compute_refinement(Some(refinement), &mut refis, true, false, &mut pending);

        for (def, discriminant) in refis {
            let (def, discriminant) = self.compute_discriminant_type(scope, def, discriminant);
            let Some(def_ty) = self.scopes.lookup_def(scope, def) else {
                ice("every def must map to a type");
            };

            let result = self
                .arena
                .add_type(Type::Intersection([def_ty, discriminant].into_iter().collect()));
            self.scopes
                .get_mut(scope)
                .def_refinements
                .insert(def, result);
        }

        for kind in pending {
            self.add_constraint(scope, span, kind);
        }
    }

    /// Fold a refinement tree into a def -> discriminant map under the
    /// given sense. Disjunctions under positive sense and conjunctions
    /// under negative sense both union their branch maps.
    fn compute_refinement(
        &mut self,
        refinement: Option<RefinementId>,
        refis: &mut FxHashMap<DefId, TypeId>,
        sense: bool,
        eq: bool,
        constraints: &mut Vec<ConstraintKind>,
    ) {
        let Some(id) = refinement else {
            return;
        };

        match self.refinements.get(id).clone() {
            Refinement::Variadic(parts) => {
                for part in parts {
                    self.compute_refinement(Some(part), refis, sense, eq, constraints);
                }
            }
            Refinement::Negation(inner) => {
                self.compute_refinement(inner, refis, !sense, eq, constraints);
            }
            Refinement::Conjunction { lhs, rhs } => {
                if sense {
                    self.compute_refinement(lhs, refis, sense, eq, constraints);
                    self.compute_refinement(rhs, refis, sense, eq, constraints);
                } else {
                    let mut lhs_refis = FxHashMap::default();
                    let mut rhs_refis = FxHashMap::default();
                    self.compute_refinement(lhs, &mut lhs_refis, sense, eq, constraints);
                    self.compute_refinement(rhs, &mut rhs_refis, sense, eq, constraints);
                    self.union_refinements(&lhs_refis, &rhs_refis, refis);
                }
            }
            Refinement::Disjunction { lhs, rhs } => {
                if sense {
                    let mut lhs_refis = FxHashMap::default();
                    let mut rhs_refis = FxHashMap::default();
                    self.compute_refinement(lhs, &mut lhs_refis, sense, eq, constraints);
                    self.compute_refinement(rhs, &mut rhs_refis, sense, eq, constraints);
                    self.union_refinements(&lhs_refis, &rhs_refis, refis);
                } else {
                    self.compute_refinement(lhs, refis, sense, eq, constraints);
                    self.compute_refinement(rhs, refis, sense, eq, constraints);
                }
            }
            Refinement::Equivalence { lhs, rhs } => {
                self.compute_refinement(lhs, refis, sense, true, constraints);
                self.compute_refinement(rhs, refis, sense, true, constraints);
            }
            Refinement::Proposition { def, discriminant } => {
                let mut discriminant = discriminant;
                if !sense && !eq {
                    discriminant = self.arena.add_type(Type::Negation(discriminant));
                } else if eq {
                    let blocked = self.arena.add_type(Type::Blocked);
                    constraints.push(ConstraintKind::SingletonOrTopType {
                        out: blocked,
                        discriminant,
                        negated: !sense,
                    });
                    discriminant = blocked;
                }

                match refis.get(&def) {
                    Some(&existing) => {
                        let combined = self.arena.add_type(Type::Intersection(
                            [discriminant, existing].into_iter().collect(),
                        ));
                        refis.insert(def, combined);
                    }
                    None => {
                        refis.insert(def, discriminant);
                    }
                }
            }
        }
    }

    /// Defs present in both maps get the union of their discriminants
    fn union_refinements(
        &mut self,
        lhs: &FxHashMap<DefId, TypeId>,
        rhs: &FxHashMap<DefId, TypeId>,
        dest: &mut FxHashMap<DefId, TypeId>,
    ) {
        for (&def, &lhs_ty) in lhs {
            let Some(&rhs_ty) = rhs.get(&def) else {
                continue;
            };

            let mut discriminants = vec![lhs_ty, rhs_ty];
            if let Some(&existing) = dest.get(&def) {
                discriminants.push(existing);
            }

            let union = self
                .arena
                .add_type(Type::Union(discriminants.into_iter().collect()));
            dest.insert(def, union);
        }
    }

    /// Widen a field def's discriminant into a table shape on its root
    /// def: refining `x.y.z` refines `x` to `{ y: { z: T } }`.
    fn compute_discriminant_type(
        &mut self,
        scope: ScopeId,
        def: DefId,
        discriminant: TypeId,
    ) -> (DefId, TypeId) {
        let mut def = def;
        let mut discriminant = discriminant;

        while let Some(field) = self.dfg.cell(def).field {
            let level = self.scopes.get(scope).level;
            let mut table = TableType::new(TableState::Sealed, level, Some(scope));
            table.props.insert(field.prop, Property { ty: discriminant });
            discriminant = self.arena.add_type(Type::Table(Box::new(table)));
            def = field.parent;
        }

        (def, discriminant)
    }
}
