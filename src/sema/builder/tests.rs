use rustc_hash::FxHashMap;

use crate::config::AnalysisConfig;
use crate::dfg::{DataFlowGraph, DefId};
use crate::frontend::Span;
use crate::frontend::ast::*;
use crate::frontend::intern::{Interner, Symbol};
use crate::sema::builder::{BuildResult, ConstraintGraphBuilder};
use crate::sema::constraint::ConstraintKind;
use crate::sema::module::{ModuleInfo, ModuleResolver, NullResolver};
use crate::sema::scope::TypeFun;
use crate::sema::types::{TableState, Type};

/// Hand-rolls AST nodes and their DFG entries; the parser and DFG
/// builder live outside this crate.
struct Fixture {
    interner: Interner,
    dfg: DataFlowGraph,
    next_node: u32,
    next_local: u32,
}

impl Fixture {
    fn new() -> Self {
        Self {
            interner: Interner::new(),
            dfg: DataFlowGraph::new(),
            next_node: 0,
            next_local: 0,
        }
    }

    fn sym(&mut self, name: &str) -> Symbol {
        self.interner.intern(name)
    }

    fn node(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId(self.next_node)
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr {
            id: self.node(),
            kind,
            span: Span::default(),
        }
    }

    fn stmt(&mut self, kind: StmtKind) -> Stmt {
        Stmt {
            id: self.node(),
            kind,
            span: Span::default(),
        }
    }

    fn block(&mut self, stmts: Vec<Stmt>) -> Block {
        Block {
            id: self.node(),
            stmts,
            span: Span::default(),
        }
    }

    fn number(&mut self, value: f64) -> Expr {
        self.expr(ExprKind::Number(value))
    }

    fn string(&mut self, value: &str) -> Expr {
        let sym = self.sym(value);
        self.expr(ExprKind::String(sym))
    }

    fn global(&mut self, name: &str) -> Expr {
        let sym = self.sym(name);
        self.expr(ExprKind::Global(sym))
    }

    /// A fresh local binding site with its own DFG cell
    fn var(&mut self, name: &str) -> (LocalVar, DefId) {
        self.var_annotated(name, None)
    }

    fn var_annotated(&mut self, name: &str, annotation: Option<TypeAnnot>) -> (LocalVar, DefId) {
        self.next_local += 1;
        let id = LocalId(self.next_local);
        let def = self.dfg.new_cell();
        self.dfg.map_local(id, def);
        let name = self.sym(name);
        (
            LocalVar {
                id,
                name,
                annotation,
                span: Span::default(),
            },
            def,
        )
    }

    /// A reference to a local, wired to its def
    fn use_var(&mut self, var: &LocalVar, def: DefId) -> Expr {
        let expr = self.expr(ExprKind::Local(LocalRef {
            local: var.id,
            name: var.name,
        }));
        self.dfg.map_expr(expr.id, def);
        expr
    }

    fn annot(&mut self, kind: TypeAnnotKind) -> TypeAnnot {
        TypeAnnot {
            id: self.node(),
            kind,
            span: Span::default(),
        }
    }

    fn reference(&mut self, name: &str) -> TypeAnnot {
        let name = self.sym(name);
        self.annot(TypeAnnotKind::Reference {
            prefix: None,
            name,
            params: Vec::new(),
        })
    }

    fn function_annot(&mut self, params: Vec<TypeAnnot>, ret: Vec<TypeAnnot>) -> TypeAnnot {
        let param_names = (0..params.len())
            .map(|i| Some(self.sym(&format!("p{i}"))))
            .collect();
        self.annot(TypeAnnotKind::Function(Box::new(FunctionTypeAnnot {
            generics: Vec::new(),
            generic_packs: Vec::new(),
            params: TypeList {
                types: params,
                tail: None,
            },
            param_names,
            ret: TypeList {
                types: ret,
                tail: None,
            },
        })))
    }

    fn call(&mut self, func: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call(Box::new(CallExpr {
            func,
            args,
            is_method: false,
        })))
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        self.expr(ExprKind::Binary(Box::new(BinaryExpr { op, left, right })))
    }

    fn empty_table(&mut self) -> Expr {
        self.expr(ExprKind::Table(TableExpr { items: Vec::new() }))
    }

    fn local_stmt(&mut self, vars: Vec<LocalVar>, values: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Local(LocalStmt { vars, values }))
    }

    fn return_stmt(&mut self, exprs: Vec<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(ReturnStmt { exprs }))
    }

    /// `declare function name(params...): ret...`, the in-language way
    /// to seed ambient globals like `type` and `setmetatable`
    fn declare_fn(&mut self, name: &str, params: Vec<TypeAnnot>, ret: Vec<TypeAnnot>) -> Stmt {
        let name = self.sym(name);
        let param_names = (0..params.len())
            .map(|i| self.sym(&format!("p{i}")))
            .collect();
        self.stmt(StmtKind::DeclareFunction(Box::new(DeclareFunctionStmt {
            name,
            generics: Vec::new(),
            generic_packs: Vec::new(),
            params: TypeList {
                types: params,
                tail: None,
            },
            param_names,
            ret: TypeList {
                types: ret,
                tail: None,
            },
        })))
    }

    fn function_body(&mut self, params: Vec<LocalVar>, body: Block) -> FunctionBody {
        FunctionBody {
            id: self.node(),
            generics: Vec::new(),
            generic_packs: Vec::new(),
            self_param: None,
            params,
            vararg: false,
            vararg_annotation: None,
            return_annotation: None,
            body,
            span: Span::default(),
        }
    }
}

fn build(fixture: &mut Fixture, program: &Block) -> BuildResult {
    let config = AnalysisConfig::default();
    let resolver = NullResolver;
    ConstraintGraphBuilder::new(
        "test",
        &config,
        &mut fixture.interner,
        &fixture.dfg,
        &resolver,
    )
    .build(program)
}

fn build_with_resolver(
    fixture: &mut Fixture,
    program: &Block,
    resolver: &dyn ModuleResolver,
) -> BuildResult {
    let config = AnalysisConfig::default();
    ConstraintGraphBuilder::new(
        "test",
        &config,
        &mut fixture.interner,
        &fixture.dfg,
        resolver,
    )
    .build(program)
}

#[test]
fn local_number_literal_emits_no_constraints() {
    let mut f = Fixture::new();
    let (a, _) = f.var("a");
    let a_name = a.name;
    let value = f.number(1.0);
    let value_id = value.id;
    let local = f.local_stmt(vec![a], vec![value]);
    let program = f.block(vec![local]);

    let result = build(&mut f, &program);

    assert!(result.constraints.is_empty());
    assert!(result.module.errors.is_empty());
    assert_eq!(
        result.module.ast_types.get(&value_id),
        Some(&result.builtins.number_ty)
    );

    let binding = result.scopes.get(result.root_scope).bindings[&a_name];
    assert_eq!(binding.ty, result.builtins.number_ty);
}

#[test]
fn generic_alias_application_stays_pending() {
    // type T<U> = {U}
    // local x: T<string> = {}
    let mut f = Fixture::new();

    let t_name = f.sym("T");
    let u_name = f.sym("U");

    let key = f.reference("number");
    let result_annot = f.reference("U");
    let body = f.annot(TypeAnnotKind::Table {
        props: Vec::new(),
        indexer: Some(Box::new(TableTypeIndexer {
            key,
            result: result_annot,
        })),
    });
    let alias = f.stmt(StmtKind::TypeAlias(Box::new(TypeAliasStmt {
        name: t_name,
        name_span: Span::default(),
        generics: vec![GenericTypeParam {
            name: u_name,
            default: None,
            span: Span::default(),
        }],
        generic_packs: Vec::new(),
        body,
        exported: false,
    })));

    let string_arg = f.reference("string");
    let annotation = {
        let name = t_name;
        f.annot(TypeAnnotKind::Reference {
            prefix: None,
            name,
            params: vec![TypeArg::Type(string_arg)],
        })
    };
    let annotation_id = annotation.id;
    let (x, _) = f.var_annotated("x", Some(annotation));
    let value = f.empty_table();
    let value_id = value.id;
    let local = f.local_stmt(vec![x], vec![value]);

    let program = f.block(vec![alias, local]);
    let result = build(&mut f, &program);

    assert!(result.module.errors.is_empty());

    // The alias body resolved to a table whose indexer result is the
    // generic parameter.
    let fun = result
        .scopes
        .lookup_type(result.root_scope, t_name)
        .expect("alias is bound");
    assert_eq!(fun.type_params.len(), 1);
    let alias_body = result.arena.follow(fun.ty);
    let table = result
        .arena
        .get(alias_body)
        .as_table()
        .expect("alias body is a table");
    let indexer = table.indexer.expect("array shorthand has an indexer");
    assert_eq!(
        result.arena.follow(indexer.key_ty),
        result.builtins.number_ty
    );
    assert!(matches!(
        result.arena.get(result.arena.follow(indexer.result_ty)),
        Type::Generic(_)
    ));

    // The annotation stayed a pending expansion with an expansion
    // constraint targeting it.
    let pending = result.module.ast_resolved_types[&annotation_id];
    assert!(matches!(result.arena.get(pending), Type::Pending(_)));
    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::TypeAliasExpansion { target } if target == pending
    )));

    // The literal is constrained against the pending type.
    let table_ty = result.module.ast_types[&value_id];
    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::Subtype { sub, sup } if sub == table_ty && sup == pending
    )));

    // The alias visit records its parameters under its real name.
    assert!(result.constraints.iter().any(|c| matches!(
        &c.kind,
        ConstraintKind::Name { name, synthetic: false, type_params, .. }
            if *name == t_name && type_params.len() == 1
    )));
}

#[test]
fn type_guard_narrows_both_branches() {
    // function f(x)
    //   if type(x) == "number" then return x + 1 else return x end
    // end
    let mut f = Fixture::new();

    let any_ref = f.reference("any");
    let string_ref = f.reference("string");
    let declare_type = f.declare_fn("type", vec![any_ref], vec![string_ref]);

    let (x, x_def) = f.var("x");
    let x_cond = f.use_var(&x, x_def);
    let x_then = f.use_var(&x, x_def);
    let x_else = f.use_var(&x, x_def);

    let type_global = f.global("type");
    let guard_call = f.call(type_global, vec![x_cond]);
    let number_lit = f.string("number");
    let condition = f.binary(BinaryOp::Eq, guard_call, number_lit);

    let one = f.number(1.0);
    let add = f.binary(BinaryOp::Add, x_then, one);
    let add_id = add.id;
    let then_return = f.return_stmt(vec![add]);
    let then_body = f.block(vec![then_return]);
    let then_body_id = then_body.id;

    let else_return = f.return_stmt(vec![x_else]);
    let else_body = f.block(vec![else_return]);
    let else_body_id = else_body.id;

    let if_stmt = f.stmt(StmtKind::If(Box::new(IfStmt {
        condition,
        then_body,
        else_body: Some(else_body),
    })));

    let body = f.block(vec![if_stmt]);
    let func = f.function_body(vec![x], body);
    let name = f.global("f");
    let function_stmt = f.stmt(StmtKind::Function(Box::new(FunctionStmt {
        name,
        func,
    })));

    let program = f.block(vec![declare_type, function_stmt]);
    let result = build(&mut f, &program);

    assert!(result.module.errors.is_empty(), "{:?}", result.module.errors);

    // Then-branch: x narrowed to an intersection with number.
    let then_scope = result.module.ast_scopes[&then_body_id];
    let refined = result.scopes.get(then_scope).def_refinements[&x_def];
    let Type::Intersection(parts) = result.arena.get(refined) else {
        panic!("then-branch refinement is an intersection");
    };
    assert!(matches!(result.arena.get(parts[0]), Type::Free(_)));
    assert_eq!(parts[1], result.builtins.number_ty);

    // Else-branch: x narrowed away from number.
    let else_scope = result.module.ast_scopes[&else_body_id];
    let refined = result.scopes.get(else_scope).def_refinements[&x_def];
    let Type::Intersection(parts) = result.arena.get(refined) else {
        panic!("else-branch refinement is an intersection");
    };
    assert!(matches!(
        result.arena.get(parts[1]),
        Type::Negation(inner) if *inner == result.builtins.number_ty
    ));

    // The addition produced a binary constraint; the whole body hangs
    // off a generalization constraint.
    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::Binary { op: BinaryOp::Add, .. }
    )));
    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::Generalization { .. }
    ) && !c.dependencies.is_empty()));

    // Every expression of interest was assigned a type.
    assert!(result.module.ast_types.contains_key(&add_id));
}

#[test]
fn setmetatable_produces_metatable_type_and_synthetic_name() {
    // local M = {}
    // local t = setmetatable({}, M)
    let mut f = Fixture::new();

    let any1 = f.reference("any");
    let any2 = f.reference("any");
    let any3 = f.reference("any");
    let declare_smt = f.declare_fn("setmetatable", vec![any1, any2], vec![any3]);

    let (m, m_def) = f.var("M");
    let m_table = f.empty_table();
    let local_m = f.local_stmt(vec![m.clone()], vec![m_table]);

    let (t, _) = f.var("t");
    let t_name = t.name;
    let target = f.empty_table();
    let m_use = f.use_var(&m, m_def);
    let smt_global = f.global("setmetatable");
    let call = f.call(smt_global, vec![target, m_use]);
    let local_t = f.local_stmt(vec![t], vec![call]);

    let program = f.block(vec![declare_smt, local_m, local_t]);
    let result = build(&mut f, &program);

    assert!(result.module.errors.is_empty(), "{:?}", result.module.errors);

    let binding = result.scopes.get(result.root_scope).bindings[&t_name];
    assert!(matches!(result.arena.get(binding.ty), Type::Metatable(_)));

    assert!(result.constraints.iter().any(|c| matches!(
        &c.kind,
        ConstraintKind::Name { name, synthetic: true, .. } if *name == t_name
    )));
}

#[test]
fn declared_class_overloads_flatten_into_intersection() {
    // declare class A     function foo(self, x: number): number end
    // declare class B : A function foo(self, x: string): string end
    let mut f = Fixture::new();

    let a_name = f.sym("A");
    let b_name = f.sym("B");
    let foo = f.sym("foo");

    let num = f.reference("number");
    let num_ret = f.reference("number");
    let a_foo = f.function_annot(vec![num], vec![num_ret]);
    let class_a = f.stmt(StmtKind::DeclareClass(Box::new(DeclareClassStmt {
        name: a_name,
        super_name: None,
        props: vec![DeclaredClassProp {
            name: foo,
            annotation: a_foo,
            is_method: true,
            span: Span::default(),
        }],
    })));

    let str_param = f.reference("string");
    let str_ret = f.reference("string");
    let b_foo = f.function_annot(vec![str_param], vec![str_ret]);
    let class_b = f.stmt(StmtKind::DeclareClass(Box::new(DeclareClassStmt {
        name: b_name,
        super_name: Some(a_name),
        props: vec![DeclaredClassProp {
            name: foo,
            annotation: b_foo,
            is_method: true,
            span: Span::default(),
        }],
    })));

    let program = f.block(vec![class_a, class_b]);
    let result = build(&mut f, &program);

    assert!(result.module.errors.is_empty(), "{:?}", result.module.errors);

    let a_ty = result
        .scopes
        .lookup_type(result.root_scope, a_name)
        .expect("A is bound")
        .ty;
    let a_class = result.arena.get(a_ty).as_class().expect("A is a class");

    // A.foo gained an implicit self parameter of type A.
    let a_foo_ty = a_class.props[&foo].ty;
    let a_foo_fn = result
        .arena
        .get(a_foo_ty)
        .as_function()
        .expect("foo is a function");
    assert!(a_foo_fn.has_self);
    let arg_head = result.arena.pack_head_types(a_foo_fn.arg_pack);
    assert_eq!(arg_head[0], a_ty);
    assert_eq!(
        result.arena.follow(arg_head[1]),
        result.builtins.number_ty
    );

    // B.foo flattened the inherited overload into one intersection.
    let b_ty = result
        .scopes
        .lookup_type(result.root_scope, b_name)
        .expect("B is bound")
        .ty;
    let b_class = result.arena.get(b_ty).as_class().expect("B is a class");
    assert_eq!(b_class.parent, Some(a_ty));

    let b_foo_ty = b_class.props[&foo].ty;
    let Type::Intersection(parts) = result.arena.get(b_foo_ty) else {
        panic!("B.foo is an intersection of overloads");
    };
    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0], a_foo_ty);
    let b_overload = result
        .arena
        .get(parts[1])
        .as_function()
        .expect("second overload is a function");
    let overload_args = result.arena.pack_head_types(b_overload.arg_pack);
    assert_eq!(overload_args[0], b_ty);
}

#[test]
fn self_referential_alias_builds_a_cycle() {
    // type Node = { next: Node | nil }
    let mut f = Fixture::new();

    let node_name = f.sym("Node");
    let next = f.sym("next");

    let node_ref = f.reference("Node");
    let nil_ref = f.reference("nil");
    let next_ty = f.annot(TypeAnnotKind::Union(vec![node_ref, nil_ref]));
    let body = f.annot(TypeAnnotKind::Table {
        props: vec![TableTypeProp {
            name: next,
            ty: next_ty,
            span: Span::default(),
        }],
        indexer: None,
    });
    let alias = f.stmt(StmtKind::TypeAlias(Box::new(TypeAliasStmt {
        name: node_name,
        name_span: Span::default(),
        generics: Vec::new(),
        generic_packs: Vec::new(),
        body,
        exported: false,
    })));

    let program = f.block(vec![alias]);
    let result = build(&mut f, &program);

    assert!(result.module.errors.is_empty(), "{:?}", result.module.errors);

    let fun_ty = result
        .scopes
        .lookup_type(result.root_scope, node_name)
        .expect("Node is bound")
        .ty;
    let table_ty = result.arena.follow(fun_ty);
    let table = result
        .arena
        .get(table_ty)
        .as_table()
        .expect("alias body is a table");
    assert_eq!(table.state, TableState::Sealed);

    let Type::Union(parts) = result.arena.get(table.props[&next].ty) else {
        panic!("next is an optional union");
    };
    // The first union part loops back through the alias handle.
    assert_eq!(result.arena.follow(parts[0]), table_ty);
    assert_eq!(parts[1], result.builtins.nil_ty);
}

#[test]
fn nil_initialized_local_gets_fresh_type() {
    let mut f = Fixture::new();
    let (x, _) = f.var("x");
    let x_name = x.name;
    let nil = f.expr(ExprKind::Nil);
    let local = f.local_stmt(vec![x], vec![nil]);
    let program = f.block(vec![local]);

    let result = build(&mut f, &program);

    let binding = result.scopes.get(result.root_scope).bindings[&x_name];
    assert!(matches!(result.arena.get(binding.ty), Type::Free(_)));
    assert_ne!(binding.ty, result.builtins.nil_ty);
}

struct OneModuleResolver {
    exports: FxHashMap<Symbol, TypeFun>,
}

impl ModuleResolver for OneModuleResolver {
    fn resolve_module_info(&self, _current: &str, _arg: &Expr) -> Option<ModuleInfo> {
        Some(ModuleInfo { name: "m".into() })
    }

    fn exported_types(&self, module: &str) -> Option<&FxHashMap<Symbol, TypeFun>> {
        (module == "m").then_some(&self.exports)
    }
}

#[test]
fn require_imports_exported_type_bindings() {
    // local m = require("m")
    let mut f = Fixture::new();

    let string_ref = f.reference("string");
    let any_ref = f.reference("any");
    let declare_require = f.declare_fn("require", vec![string_ref], vec![any_ref]);

    let (m, _) = f.var("m");
    let m_name = m.name;
    let arg = f.string("m");
    let require_global = f.global("require");
    let call = f.call(require_global, vec![arg]);
    let local = f.local_stmt(vec![m], vec![call]);

    let point = f.sym("Point");
    let mut exports = FxHashMap::default();
    exports.insert(point, TypeFun::monomorphic(crate::sema::type_arena::TypeId(0)));
    let resolver = OneModuleResolver { exports };

    let program = f.block(vec![declare_require, local]);
    let result = build_with_resolver(&mut f, &program, &resolver);

    let imported = &result.scopes.get(result.root_scope).imported_type_bindings[&m_name];
    assert!(imported.contains_key(&point));
}

#[test]
fn numeric_for_constrains_bounds_against_number() {
    // for i = 1, 10, "x" do end
    let mut f = Fixture::new();

    let (i, _) = f.var("i");
    let i_name = i.name;
    let from = f.number(1.0);
    let to = f.number(10.0);
    let step = f.string("x");
    let body = f.block(vec![]);
    let for_stmt = f.stmt(StmtKind::NumericFor(Box::new(NumericForStmt {
        var: i,
        from,
        to,
        step: Some(step),
        body,
    })));
    let for_id = for_stmt.id;

    let program = f.block(vec![for_stmt]);
    let result = build(&mut f, &program);

    // The bad step only becomes an error when the solver dispatches
    // this constraint.
    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::Subtype { sub, sup }
            if sub == result.builtins.string_ty && sup == result.builtins.number_ty
    )));

    let for_scope = result.module.ast_scopes[&for_id];
    let binding = result.scopes.get(for_scope).bindings[&i_name];
    assert_eq!(binding.ty, result.builtins.number_ty);
}

#[test]
fn duplicate_alias_in_one_block_is_reported_once() {
    let mut f = Fixture::new();

    let name = f.sym("A");
    let first_body = f.reference("number");
    let first = f.stmt(StmtKind::TypeAlias(Box::new(TypeAliasStmt {
        name,
        name_span: Span::default(),
        generics: Vec::new(),
        generic_packs: Vec::new(),
        body: first_body,
        exported: false,
    })));
    let second_body = f.reference("string");
    let second = f.stmt(StmtKind::TypeAlias(Box::new(TypeAliasStmt {
        name,
        name_span: Span::default(),
        generics: Vec::new(),
        generic_packs: Vec::new(),
        body: second_body,
        exported: false,
    })));

    let program = f.block(vec![first, second]);
    let result = build(&mut f, &program);

    assert_eq!(result.module.errors.len(), 1);
    assert!(matches!(
        result.module.errors[0].error,
        crate::errors::AnalysisError::DuplicateTypeDefinition { .. }
    ));

    // The surviving binding is the first one.
    let fun = result
        .scopes
        .lookup_type(result.root_scope, name)
        .expect("first alias still bound");
    assert_eq!(result.arena.follow(fun.ty), result.builtins.number_ty);
}

#[test]
fn directly_recursive_alias_fails_occurs_check() {
    // type T = T
    let mut f = Fixture::new();

    let name = f.sym("T");
    let body = f.reference("T");
    let alias = f.stmt(StmtKind::TypeAlias(Box::new(TypeAliasStmt {
        name,
        name_span: Span::default(),
        generics: Vec::new(),
        generic_packs: Vec::new(),
        body,
        exported: false,
    })));

    let program = f.block(vec![alias]);
    let result = build(&mut f, &program);

    assert!(matches!(
        result.module.errors[0].error,
        crate::errors::AnalysisError::OccursCheckFailed { .. }
    ));

    let fun = result
        .scopes
        .lookup_type(result.root_scope, name)
        .expect("alias still bound");
    assert_eq!(result.arena.follow(fun.ty), result.builtins.any_ty);
}

#[test]
fn constraint_dependencies_point_backwards() {
    // local function id(x) return x end
    // local y = id(1)
    let mut f = Fixture::new();

    let (x, x_def) = f.var("x");
    let x_use = f.use_var(&x, x_def);
    let ret = f.return_stmt(vec![x_use]);
    let body = f.block(vec![ret]);
    let func = f.function_body(vec![x], body);
    let (id_var, id_def) = f.var("id");
    let local_fn = f.stmt(StmtKind::LocalFunction(Box::new(LocalFunctionStmt {
        var: id_var.clone(),
        func,
    })));

    let (y, _) = f.var("y");
    let id_use = f.use_var(&id_var, id_def);
    let one = f.number(1.0);
    let call = f.call(id_use, vec![one]);
    let local_y = f.local_stmt(vec![y], vec![call]);

    let program = f.block(vec![local_fn, local_y]);
    let result = build(&mut f, &program);

    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::FunctionCall { .. }
    )));

    // Dependency edges always reference earlier constraints, so the
    // graph is a DAG by construction.
    for (index, constraint) in result.constraints.iter().enumerate() {
        for dep in &constraint.dependencies {
            assert!(
                (dep.0 as usize) < index,
                "constraint {index} depends on later constraint {}",
                dep.0
            );
        }
    }
}

#[test]
fn refinements_stay_local_to_their_scope() {
    // local x = "s"
    // if type(x) == "string" then end
    let mut f = Fixture::new();

    let any_ref = f.reference("any");
    let string_ref = f.reference("string");
    let declare_type = f.declare_fn("type", vec![any_ref], vec![string_ref]);

    let (x, x_def) = f.var("x");
    let init = f.string("s");
    let local = f.local_stmt(vec![x.clone()], vec![init]);

    let x_use = f.use_var(&x, x_def);
    let type_global = f.global("type");
    let guard_call = f.call(type_global, vec![x_use]);
    let tag = f.string("string");
    let condition = f.binary(BinaryOp::Eq, guard_call, tag);
    let then_body = f.block(vec![]);
    let then_body_id = then_body.id;
    let if_stmt = f.stmt(StmtKind::If(Box::new(IfStmt {
        condition,
        then_body,
        else_body: None,
    })));

    let program = f.block(vec![declare_type, local, if_stmt]);
    let result = build(&mut f, &program);

    // The then-scope holds the narrowing; the declaring scope still
    // maps the def to its declared type.
    let root_refinement = result.scopes.get(result.root_scope).def_refinements[&x_def];
    assert_eq!(root_refinement, result.builtins.string_ty);

    let then_scope = result.module.ast_scopes[&then_body_id];
    let refined = result.scopes.get(then_scope).def_refinements[&x_def];
    let Type::Intersection(parts) = result.arena.get(refined) else {
        panic!("then-branch refinement is an intersection");
    };
    assert_eq!(parts[0], result.builtins.string_ty);
    assert_eq!(parts[1], result.builtins.string_ty);
}

#[test]
fn conjunction_condition_refines_both_operands() {
    // local x = "a"  local y = "b"
    // if x and y then end
    let mut f = Fixture::new();

    let (x, x_def) = f.var("x");
    let (y, y_def) = f.var("y");
    let a = f.string("a");
    let b = f.string("b");
    let local_x = f.local_stmt(vec![x.clone()], vec![a]);
    let local_y = f.local_stmt(vec![y.clone()], vec![b]);

    let x_use = f.use_var(&x, x_def);
    let y_use = f.use_var(&y, y_def);
    let condition = f.binary(BinaryOp::And, x_use, y_use);
    let then_body = f.block(vec![]);
    let then_body_id = then_body.id;
    let if_stmt = f.stmt(StmtKind::If(Box::new(IfStmt {
        condition,
        then_body,
        else_body: None,
    })));

    let program = f.block(vec![local_x, local_y, if_stmt]);
    let result = build(&mut f, &program);

    let then_scope = result.module.ast_scopes[&then_body_id];
    for def in [x_def, y_def] {
        let refined = result.scopes.get(then_scope).def_refinements[&def];
        let Type::Intersection(parts) = result.arena.get(refined) else {
            panic!("truthiness narrows through an intersection");
        };
        assert_eq!(parts[1], result.builtins.truthy_ty);
    }
}

#[test]
fn bracketed_string_key_pins_indexed_result_type() {
    // local t = { ["mode"] = "fast", 1 }
    // The bracketed item is an indexed one, so its type becomes the
    // expected type of the later positional item.
    let mut f = Fixture::new();

    let key = f.string("mode");
    let value = f.string("fast");
    let positional = f.number(1.0);
    let positional_id = positional.id;
    let table = f.expr(ExprKind::Table(TableExpr {
        items: vec![
            TableItem {
                key: Some(key),
                value,
                bracketed: true,
            },
            TableItem {
                key: None,
                value: positional,
                bracketed: false,
            },
        ],
    }));
    let (t, _) = f.var("t");
    let local = f.local_stmt(vec![t], vec![table]);
    let program = f.block(vec![local]);

    let result = build(&mut f, &program);

    assert_eq!(
        result.module.ast_expected_types.get(&positional_id),
        Some(&result.builtins.string_ty)
    );
}

#[test]
fn record_key_does_not_pin_indexed_result_type() {
    // local t = { mode = "fast", 1 }
    // A record item is not indexed, so the positional item is checked
    // without an expected type.
    let mut f = Fixture::new();

    let key = f.string("mode");
    let value = f.string("fast");
    let positional = f.number(1.0);
    let positional_id = positional.id;
    let table = f.expr(ExprKind::Table(TableExpr {
        items: vec![
            TableItem {
                key: Some(key),
                value,
                bracketed: false,
            },
            TableItem {
                key: None,
                value: positional,
                bracketed: false,
            },
        ],
    }));
    let (t, _) = f.var("t");
    let local = f.local_stmt(vec![t], vec![table]);
    let program = f.block(vec![local]);

    let result = build(&mut f, &program);

    assert_eq!(result.module.ast_expected_types.get(&positional_id), None);
}

#[test]
fn repeat_condition_sees_body_bindings() {
    // repeat local x = 1 until x
    let mut f = Fixture::new();

    let (x, x_def) = f.var("x");
    let one = f.number(1.0);
    let local = f.local_stmt(vec![x.clone()], vec![one]);
    let body = f.block(vec![local]);
    let x_use = f.use_var(&x, x_def);
    let x_use_id = x_use.id;
    let repeat = f.stmt(StmtKind::Repeat(Box::new(RepeatStmt {
        body,
        condition: x_use,
    })));

    let program = f.block(vec![repeat]);
    let result = build(&mut f, &program);

    assert_eq!(
        result.module.ast_types.get(&x_use_id),
        Some(&result.builtins.number_ty)
    );
}

#[test]
fn dotted_assignment_emits_set_prop_chain() {
    // local t = {}
    // t.x = 1
    let mut f = Fixture::new();

    let (t, t_def) = f.var("t");
    let t_name = t.name;
    let init = f.empty_table();
    let local = f.local_stmt(vec![t.clone()], vec![init]);

    let x = f.sym("x");
    let t_use = f.use_var(&t, t_def);
    let target = f.expr(ExprKind::Field(Box::new(FieldExpr {
        obj: t_use,
        name: x,
        name_span: Span::default(),
    })));
    let one = f.number(1.0);
    let assign = f.stmt(StmtKind::Assign(AssignStmt {
        targets: vec![target],
        values: vec![one],
    }));

    let program = f.block(vec![local, assign]);
    let result = build(&mut f, &program);

    let set_prop = result.constraints.iter().find_map(|c| match &c.kind {
        ConstraintKind::SetProp { updated, path, .. } => Some((*updated, path.clone())),
        _ => None,
    });
    let (updated, path) = set_prop.expect("dotted assignment emits SetProp");
    assert_eq!(path, vec![x]);

    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::HasProp { subject, prop, .. } if subject == updated && prop == x
    )));

    // The root binding and its def now point at the updated type.
    let binding = result.scopes.get(result.root_scope).bindings[&t_name];
    assert_eq!(binding.ty, updated);
    assert_eq!(
        result.scopes.get(result.root_scope).def_refinements[&t_def],
        updated
    );
}

#[test]
fn compound_assignment_feeds_result_back() {
    // local x = 1
    // x += 1   (surface form: x = x + 1 with a compound operator)
    let mut f = Fixture::new();

    let (x, x_def) = f.var("x");
    let one = f.number(1.0);
    let local = f.local_stmt(vec![x.clone()], vec![one]);

    let x_use = f.use_var(&x, x_def);
    let rhs = f.number(1.0);
    let assign = f.stmt(StmtKind::CompoundAssign(Box::new(CompoundAssignStmt {
        op: BinaryOp::Add,
        target: x_use,
        value: rhs,
    })));

    let program = f.block(vec![local, assign]);
    let result = build(&mut f, &program);

    let binary_out = result.constraints.iter().find_map(|c| match c.kind {
        ConstraintKind::Binary {
            op: BinaryOp::Add,
            out,
            ..
        } => Some(out),
        _ => None,
    });
    let out = binary_out.expect("compound assignment emits a binary constraint");

    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::Subtype { sub, .. } if sub == out
    )));
}

#[test]
fn function_body_falling_through_constrains_empty_return() {
    // function f() local a = 1 end
    let mut f = Fixture::new();

    let (a, _) = f.var("a");
    let one = f.number(1.0);
    let local = f.local_stmt(vec![a], vec![one]);
    let body = f.block(vec![local]);
    let func = f.function_body(vec![], body);
    let func_id = func.id;
    let name = f.global("f");
    let function_stmt = f.stmt(StmtKind::Function(Box::new(FunctionStmt { name, func })));

    let program = f.block(vec![function_stmt]);
    let result = build(&mut f, &program);

    // The signature landed in the ast type map, and the fallthrough
    // produced a pack constraint against ().
    let signature = result.module.ast_types[&func_id];
    let ret_pack = result
        .arena
        .get(signature)
        .as_function()
        .expect("signature is a function")
        .ret_pack;

    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::PackSubtype { sub, .. } if sub == ret_pack
    )));
}

#[test]
fn unknown_global_is_reported() {
    let mut f = Fixture::new();
    let (x, _) = f.var("x");
    let g = f.global("undefined_global");
    let local = f.local_stmt(vec![x], vec![g]);
    let program = f.block(vec![local]);

    let result = build(&mut f, &program);

    assert!(matches!(
        result.module.errors[0].error,
        crate::errors::AnalysisError::UnknownSymbol { .. }
    ));
}

#[test]
fn generic_for_emits_iterable_constraint() {
    // for v in it do end
    let mut f = Fixture::new();

    let (it, it_def) = f.var("it");
    let init = f.empty_table();
    let local = f.local_stmt(vec![it.clone()], vec![init]);

    let (v, v_def) = f.var("v");
    let it_use = f.use_var(&it, it_def);
    let body = f.block(vec![]);
    let for_stmt = f.stmt(StmtKind::GenericFor(Box::new(GenericForStmt {
        vars: vec![v],
        values: vec![it_use],
        body,
    })));
    let for_id = for_stmt.id;

    let program = f.block(vec![local, for_stmt]);
    let result = build(&mut f, &program);

    assert!(result.constraints.iter().any(|c| matches!(
        c.kind,
        ConstraintKind::Iterable { .. }
    )));

    // The loop variable is a fresh type refined in the loop scope.
    let loop_scope = result.module.ast_scopes[&for_id];
    let v_ty = result.scopes.get(loop_scope).def_refinements[&v_def];
    assert!(matches!(result.arena.get(v_ty), Type::Free(_)));
}
