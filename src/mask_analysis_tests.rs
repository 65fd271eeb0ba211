//! Tests for the all-lanes-off safety predicate and the varying
//! break/continue detector.

use crate::ast::{BinaryOp, ConstValue, Expr, ExprKind, SourcePos, Stmt, StmtKind};
use crate::mask_analysis::{
    has_varying_break_or_continue, safe_to_run_with_all_lanes_off,
    safe_to_run_with_all_lanes_off_expr,
};
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

fn varying_int_const(vals: &[i32]) -> Expr {
    Expr::new(
        ExprKind::Const {
            ty: Type::varying_int32(),
            value: ConstValue::Int32(vals.to_vec()),
        },
        test_pos(),
    )
}

fn sym_ref(id: SymbolId) -> Expr {
    Expr::new(ExprKind::Symbol(id), test_pos())
}

fn declare(symtab: &mut SymbolTable, name: &str, ty: Type) -> SymbolId {
    symtab.declare(Symbol::new(name, ty, StorageClass::Auto, test_pos()))
}

fn array4(symtab: &mut SymbolTable) -> SymbolId {
    declare(
        symtab,
        "a",
        Type::Array {
            element: Box::new(Type::varying_int32()),
            count: 4,
        },
    )
}

fn index(base: Expr, idx: Expr) -> Expr {
    Expr::new(
        ExprKind::Index {
            base: Box::new(base),
            index: Box::new(idx),
        },
        test_pos(),
    )
}

fn assign(lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(
        ExprKind::Assign {
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        test_pos(),
    )
}

fn expr_stmt(e: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(Some(e)), test_pos())
}

// =============================================================================
// Expression safety
// =============================================================================

#[test]
fn constants_and_symbols_are_safe() {
    let mut symtab = SymbolTable::new();
    let x = declare(&mut symtab, "x", Type::varying_int32());
    assert!(safe_to_run_with_all_lanes_off_expr(&int_const(1), &symtab));
    assert!(safe_to_run_with_all_lanes_off_expr(&sym_ref(x), &symtab));
}

#[test]
fn arithmetic_over_safe_operands_is_safe() {
    let mut symtab = SymbolTable::new();
    let x = declare(&mut symtab, "x", Type::varying_int32());
    let e = Expr::new(
        ExprKind::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(sym_ref(x)),
            rhs: Box::new(int_const(1)),
        },
        test_pos(),
    );
    assert!(safe_to_run_with_all_lanes_off_expr(&e, &symtab));
}

#[test]
fn calls_are_never_safe() {
    let symtab = SymbolTable::new();
    let callee = Expr::new(
        ExprKind::FunctionSymbol {
            name: "f".to_string(),
            ty: Type::Function {
                ret: Box::new(Type::Void),
                params: vec![],
            },
        },
        test_pos(),
    );
    let call = Expr::new(
        ExprKind::Call {
            callee: Box::new(callee),
            args: vec![],
        },
        test_pos(),
    );
    assert!(!safe_to_run_with_all_lanes_off_expr(&call, &symtab));
}

#[test]
fn in_bounds_constant_index_is_safe() {
    let mut symtab = SymbolTable::new();
    let a = array4(&mut symtab);
    let e = index(sym_ref(a), int_const(2));
    assert!(safe_to_run_with_all_lanes_off_expr(&e, &symtab));
}

#[test]
fn out_of_bounds_constant_index_is_unsafe() {
    let mut symtab = SymbolTable::new();
    let a = array4(&mut symtab);
    let e = index(sym_ref(a), int_const(5));
    assert!(!safe_to_run_with_all_lanes_off_expr(&e, &symtab));
}

#[test]
fn varying_constant_index_checks_every_lane() {
    let mut symtab = SymbolTable::new();
    let a = array4(&mut symtab);
    assert!(safe_to_run_with_all_lanes_off_expr(
        &index(sym_ref(a), varying_int_const(&[0, 1, 2, 3])),
        &symtab
    ));
    assert!(!safe_to_run_with_all_lanes_off_expr(
        &index(sym_ref(a), varying_int_const(&[0, 1, 2, 5])),
        &symtab
    ));
}

#[test]
fn non_constant_index_is_unsafe() {
    let mut symtab = SymbolTable::new();
    let a = array4(&mut symtab);
    let i = declare(&mut symtab, "i", Type::varying_int32());
    let e = assign(index(sym_ref(a), sym_ref(i)), int_const(0));
    assert!(!safe_to_run_with_all_lanes_off_expr(&e, &symtab));
}

// =============================================================================
// Statement safety
// =============================================================================

#[test]
fn safe_assignments_make_a_safe_if() {
    let mut symtab = SymbolTable::new();
    let cx = CompileContext::default();
    let a = array4(&mut symtab);
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let then_s = expr_stmt(assign(index(sym_ref(a), int_const(2)), int_const(0)));
    let stmt = Stmt::if_stmt(
        sym_ref(c),
        Some(then_s),
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    assert!(safe_to_run_with_all_lanes_off(Some(&stmt), &symtab));
}

#[test]
fn assert_statements_are_never_safe() {
    let mut symtab = SymbolTable::new();
    let c = declare(&mut symtab, "c", Type::uniform_bool());
    let stmt = Stmt::new(
        StmtKind::Assert {
            message: "c".to_string(),
            test: sym_ref(c),
        },
        test_pos(),
    );
    assert!(!safe_to_run_with_all_lanes_off(Some(&stmt), &symtab));
}

#[test]
fn break_continue_and_absent_statements_are_safe() {
    let symtab = SymbolTable::new();
    let cx = CompileContext::default();
    assert!(safe_to_run_with_all_lanes_off(None, &symtab));
    assert!(safe_to_run_with_all_lanes_off(
        Some(&Stmt::break_stmt(false, &cx.opts, test_pos())),
        &symtab
    ));
    assert!(safe_to_run_with_all_lanes_off(
        Some(&Stmt::continue_stmt(false, &cx.opts, test_pos())),
        &symtab
    ));
}

#[test]
fn print_is_as_safe_as_its_values() {
    let mut symtab = SymbolTable::new();
    let x = declare(&mut symtab, "x", Type::varying_int32());
    let safe_print = Stmt::new(
        StmtKind::Print {
            format: "%d\n".to_string(),
            values: Some(sym_ref(x)),
        },
        test_pos(),
    );
    assert!(safe_to_run_with_all_lanes_off(Some(&safe_print), &symtab));
}

#[test]
fn print_without_values_is_unsafe() {
    let symtab = SymbolTable::new();
    let stmt = Stmt::new(
        StmtKind::Print {
            format: "hello\n".to_string(),
            values: None,
        },
        test_pos(),
    );
    assert!(!safe_to_run_with_all_lanes_off(Some(&stmt), &symtab));
}

#[test]
fn decl_without_initializer_is_unsafe() {
    let mut symtab = SymbolTable::new();
    let x = declare(&mut symtab, "x", Type::varying_int32());
    let stmt = Stmt::new(
        StmtKind::Decl(vec![crate::ast::VariableDeclaration { sym: x, init: None }]),
        test_pos(),
    );
    assert!(!safe_to_run_with_all_lanes_off(Some(&stmt), &symtab));

    let initialized = Stmt::new(
        StmtKind::Decl(vec![crate::ast::VariableDeclaration {
            sym: x,
            init: Some(int_const(0)),
        }]),
        test_pos(),
    );
    assert!(safe_to_run_with_all_lanes_off(Some(&initialized), &symtab));
}

#[test]
fn for_without_test_is_unsafe() {
    let mut symtab = SymbolTable::new();
    let cx = CompileContext::default();
    let x = declare(&mut symtab, "x", Type::varying_int32());
    let body = expr_stmt(assign(sym_ref(x), int_const(0)));
    let stmt = Stmt::for_stmt(
        None,
        None,
        None,
        Some(body),
        false,
        &cx.opts,
        test_pos(),
    );
    assert!(!safe_to_run_with_all_lanes_off(Some(&stmt), &symtab));
}

#[test]
fn return_without_value_is_safe() {
    let symtab = SymbolTable::new();
    let cx = CompileContext::default();
    let stmt = Stmt::return_stmt(None, false, &cx.opts, test_pos());
    assert!(safe_to_run_with_all_lanes_off(Some(&stmt), &symtab));
}

// =============================================================================
// Varying break/continue detection
// =============================================================================

#[test]
fn break_under_varying_if_is_detected() {
    let mut symtab = SymbolTable::new();
    let cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let body = Stmt::new(
        StmtKind::List(vec![Stmt::if_stmt(
            sym_ref(c),
            Some(Stmt::break_stmt(false, &cx.opts, test_pos())),
            None,
            false,
            &symtab,
            &cx.opts,
            test_pos(),
        )]),
        test_pos(),
    );
    assert!(has_varying_break_or_continue(Some(&body), &symtab));
}

#[test]
fn continue_under_varying_if_is_detected() {
    let mut symtab = SymbolTable::new();
    let cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let body = Stmt::if_stmt(
        sym_ref(c),
        None,
        Some(Stmt::continue_stmt(false, &cx.opts, test_pos())),
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    assert!(has_varying_break_or_continue(Some(&body), &symtab));
}

#[test]
fn break_under_uniform_if_is_not_detected() {
    let mut symtab = SymbolTable::new();
    let cx = CompileContext::default();
    let u = declare(&mut symtab, "u", Type::uniform_bool());
    let body = Stmt::if_stmt(
        sym_ref(u),
        Some(Stmt::break_stmt(false, &cx.opts, test_pos())),
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    assert!(!has_varying_break_or_continue(Some(&body), &symtab));
}

#[test]
fn bare_break_is_not_varying() {
    let symtab = SymbolTable::new();
    let cx = CompileContext::default();
    let body = Stmt::break_stmt(false, &cx.opts, test_pos());
    assert!(!has_varying_break_or_continue(Some(&body), &symtab));
}

#[test]
fn nested_loops_shield_their_own_jumps() {
    let mut symtab = SymbolTable::new();
    let cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let u = declare(&mut symtab, "u", Type::uniform_bool());

    // if (c) { do { break; } while (u); } -- the break targets the inner
    // loop, so the outer loop sees nothing varying.
    let inner = Stmt::do_stmt(
        sym_ref(u),
        Some(Stmt::break_stmt(false, &cx.opts, test_pos())),
        false,
        &cx.opts,
        test_pos(),
    );
    let body = Stmt::if_stmt(
        sym_ref(c),
        Some(inner),
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    assert!(!has_varying_break_or_continue(Some(&body), &symtab));
}
