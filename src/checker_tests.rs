//! Tests for the statement type-check pass.

use crate::ast::{BinaryOp, ConstValue, Expr, ExprKind, SourcePos, Stmt, StmtKind};
use crate::checker::check_stmt;
use crate::sym::{StorageClass, Symbol, SymbolId, SymbolTable};
use crate::types::Type;
use crate::CompileContext;

// =============================================================================
// Test helpers
// =============================================================================

fn test_pos() -> SourcePos {
    SourcePos::new("test.lc", 1, 1)
}

fn int_const(v: i32) -> Expr {
    Expr::new(
        ExprKind::Const {
            ty: Type::uniform_int32(),
            value: ConstValue::Int32(vec![v]),
        },
        test_pos(),
    )
}

fn varying_bool_sym(symtab: &mut SymbolTable) -> SymbolId {
    symtab.declare(Symbol::new(
        "c",
        Type::varying_bool(),
        StorageClass::Auto,
        test_pos(),
    ))
}

fn sym_ref(id: SymbolId) -> Expr {
    Expr::new(ExprKind::Symbol(id), test_pos())
}

fn expr_stmt(e: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(Some(e)), test_pos())
}

fn test_type(stmt: &Stmt, symtab: &SymbolTable) -> Type {
    match &stmt.kind {
        StmtKind::If { test, .. } | StmtKind::Do { test, .. } | StmtKind::Assert { test, .. } => {
            test.get_type(symtab).expect("test has a type")
        }
        StmtKind::For { test, .. } => test
            .as_ref()
            .expect("for has a test")
            .get_type(symtab)
            .expect("test has a type"),
        other => panic!("statement has no test: {:?}", other),
    }
}

// =============================================================================
// Test coercion
// =============================================================================

#[test]
fn uniform_if_test_becomes_uniform_bool() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let stmt = Stmt::if_stmt(
        int_const(1),
        Some(expr_stmt(int_const(0))),
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    let checked = check_stmt(stmt, &mut symtab, &mut cx).expect("checks");
    assert_eq!(test_type(&checked, &symtab), Type::uniform_bool());
    assert!(!cx.diags.has_errors());
}

#[test]
fn varying_if_test_becomes_varying_bool() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let c = varying_bool_sym(&mut symtab);
    let stmt = Stmt::if_stmt(
        sym_ref(c),
        Some(expr_stmt(int_const(0))),
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    let checked = check_stmt(stmt, &mut symtab, &mut cx).expect("checks");
    assert_eq!(test_type(&checked, &symtab), Type::varying_bool());
}

#[test]
fn struct_typed_if_test_is_rejected() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let s = symtab.declare(Symbol::new(
        "s",
        Type::Struct {
            name: "S".to_string(),
            fields: vec![("x".to_string(), Type::uniform_float())],
            is_const: false,
        },
        StorageClass::Auto,
        test_pos(),
    ));
    let stmt = Stmt::if_stmt(
        sym_ref(s),
        Some(expr_stmt(int_const(0))),
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    assert!(check_stmt(stmt, &mut symtab, &mut cx).is_none());
    assert_eq!(cx.diags.error_count(), 1);
}

#[test]
fn assert_test_is_coerced_to_varying_bool() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let v = symtab.declare(Symbol::new(
        "v",
        Type::varying_int32(),
        StorageClass::Auto,
        test_pos(),
    ));
    let stmt = Stmt::new(
        StmtKind::Assert {
            message: "v != 0".to_string(),
            test: sym_ref(v),
        },
        test_pos(),
    );
    let checked = check_stmt(stmt, &mut symtab, &mut cx).expect("checks");
    assert_eq!(test_type(&checked, &symtab), Type::varying_bool());
}

// =============================================================================
// Failure protocol
// =============================================================================

#[test]
fn failed_child_is_dropped_from_list_without_poisoning_siblings() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let s = symtab.declare(Symbol::new(
        "s",
        Type::Struct {
            name: "S".to_string(),
            fields: vec![],
            is_const: false,
        },
        StorageClass::Auto,
        test_pos(),
    ));
    let bad = Stmt::if_stmt(
        sym_ref(s),
        None,
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    let good = expr_stmt(int_const(1));
    let list = Stmt::new(StmtKind::List(vec![bad, good]), test_pos());

    let checked = check_stmt(list, &mut symtab, &mut cx).expect("list survives");
    match checked.kind {
        StmtKind::List(stmts) => assert_eq!(stmts.len(), 1),
        other => panic!("expected list, got {:?}", other),
    }
    assert_eq!(cx.diags.error_count(), 1);
}

// =============================================================================
// Loop demotion for varying break/continue
// =============================================================================

#[test]
fn do_loop_with_varying_break_gets_varying_test() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let c = varying_bool_sym(&mut symtab);
    let u = symtab.declare(Symbol::new(
        "go",
        Type::uniform_bool(),
        StorageClass::Auto,
        test_pos(),
    ));

    // do { if (c) break; } while (go);  -- go is uniform, but the break
    // under the varying if forces lane management.
    let brk = Stmt::break_stmt(false, &cx.opts, test_pos());
    let body_if = Stmt::if_stmt(
        sym_ref(c),
        Some(brk),
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    let body = Stmt::new(StmtKind::List(vec![body_if]), test_pos());
    let stmt = Stmt::do_stmt(sym_ref(u), Some(body), false, &cx.opts, test_pos());

    let checked = check_stmt(stmt, &mut symtab, &mut cx).expect("checks");
    assert_eq!(test_type(&checked, &symtab), Type::varying_bool());
}

#[test]
fn do_loop_with_uniform_break_keeps_uniform_test() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let u = symtab.declare(Symbol::new(
        "go",
        Type::uniform_bool(),
        StorageClass::Auto,
        test_pos(),
    ));

    // The break is under a uniform if, so the loop stays uniform.
    let brk = Stmt::break_stmt(false, &cx.opts, test_pos());
    let body_if = Stmt::if_stmt(
        int_const(1),
        Some(brk),
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    let body = Stmt::new(StmtKind::List(vec![body_if]), test_pos());
    let stmt = Stmt::do_stmt(sym_ref(u), Some(body), false, &cx.opts, test_pos());

    let checked = check_stmt(stmt, &mut symtab, &mut cx).expect("checks");
    assert_eq!(test_type(&checked, &symtab), Type::uniform_bool());
}

// =============================================================================
// Declarations
// =============================================================================

#[test]
fn atomic_initializer_is_converted_to_declared_type() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let f = symtab.declare(Symbol::new(
        "f",
        Type::uniform_float().as_const(),
        StorageClass::Auto,
        test_pos(),
    ));
    let stmt = Stmt::new(
        StmtKind::Decl(vec![crate::ast::VariableDeclaration {
            sym: f,
            init: Some(int_const(2)),
        }]),
        test_pos(),
    );
    let checked = check_stmt(stmt, &mut symtab, &mut cx).expect("checks");
    let StmtKind::Decl(vars) = &checked.kind else {
        panic!("expected decl");
    };
    let init_ty = vars[0]
        .init
        .as_ref()
        .unwrap()
        .get_type(&symtab)
        .expect("typed");
    assert_eq!(init_ty, Type::uniform_float().as_const());
}

#[test]
fn varying_initializer_for_uniform_decl_is_rejected() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let v = symtab.declare(Symbol::new(
        "v",
        Type::varying_int32(),
        StorageClass::Auto,
        test_pos(),
    ));
    let x = symtab.declare(Symbol::new(
        "x",
        Type::uniform_int32(),
        StorageClass::Auto,
        test_pos(),
    ));
    let stmt = Stmt::new(
        StmtKind::Decl(vec![crate::ast::VariableDeclaration {
            sym: x,
            init: Some(sym_ref(v)),
        }]),
        test_pos(),
    );
    assert!(check_stmt(stmt, &mut symtab, &mut cx).is_none());
    assert_eq!(cx.diags.error_count(), 1);
}

#[test]
fn uniform_binary_test_in_for_loop() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let i = symtab.declare(Symbol::new(
        "i",
        Type::uniform_int32(),
        StorageClass::Auto,
        test_pos(),
    ));
    let test = Expr::new(
        ExprKind::Binary {
            op: BinaryOp::Lt,
            lhs: Box::new(sym_ref(i)),
            rhs: Box::new(int_const(10)),
        },
        test_pos(),
    );
    let stmt = Stmt::for_stmt(
        None,
        Some(test),
        None,
        Some(expr_stmt(int_const(0))),
        false,
        &cx.opts,
        test_pos(),
    );
    let checked = check_stmt(stmt, &mut symtab, &mut cx).expect("checks");
    assert_eq!(test_type(&checked, &symtab), Type::uniform_bool());
}
