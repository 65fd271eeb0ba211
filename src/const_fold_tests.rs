//! Tests for constant folding and the statement optimize pass.

use crate::ast::{BinaryOp, ConstValue, Expr, ExprKind, SourcePos, Stmt, StmtKind, UnaryOp};
use crate::const_fold::{fold_expr, fold_stmt};
use crate::sym::{StorageClass, Symbol, SymbolId, SymbolTable};
use crate::types::Type;

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

fn bool_const(b: bool) -> Expr {
    Expr::new(
        ExprKind::Const {
            ty: Type::uniform_bool(),
            value: ConstValue::Bool(vec![b]),
        },
        test_pos(),
    )
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        test_pos(),
    )
}

fn sym_ref(id: SymbolId) -> Expr {
    Expr::new(ExprKind::Symbol(id), test_pos())
}

fn const_int_decl(symtab: &mut SymbolTable, name: &str, is_const: bool) -> SymbolId {
    let ty = if is_const {
        Type::uniform_int32().as_const()
    } else {
        Type::uniform_int32()
    };
    symtab.declare(Symbol::new(name, ty, StorageClass::Auto, test_pos()))
}

fn expect_int(expr: &Expr) -> &[i32] {
    match &expr.kind {
        ExprKind::Const {
            value: ConstValue::Int32(v),
            ..
        } => v,
        other => panic!("expected folded int constant, got {:?}", other),
    }
}

// =============================================================================
// Expression folding
// =============================================================================

#[test]
fn binary_add_folds() {
    let symtab = SymbolTable::new();
    let folded = fold_expr(binary(BinaryOp::Add, int_const(3), int_const(4)), &symtab);
    assert_eq!(expect_int(&folded), &[7]);
}

#[test]
fn nested_arithmetic_folds() {
    let symtab = SymbolTable::new();
    let e = binary(
        BinaryOp::Mul,
        binary(BinaryOp::Add, int_const(3), int_const(4)),
        int_const(2),
    );
    assert_eq!(expect_int(&fold_expr(e, &symtab)), &[14]);
}

#[test]
fn division_by_zero_is_not_folded() {
    let symtab = SymbolTable::new();
    let folded = fold_expr(binary(BinaryOp::Div, int_const(3), int_const(0)), &symtab);
    assert!(matches!(folded.kind, ExprKind::Binary { .. }));
}

#[test]
fn unary_negate_folds() {
    let symtab = SymbolTable::new();
    let e = Expr::new(
        ExprKind::Unary {
            op: UnaryOp::Negate,
            operand: Box::new(int_const(5)),
        },
        test_pos(),
    );
    assert_eq!(expect_int(&fold_expr(e, &symtab)), &[-5]);
}

#[test]
fn comparison_folds_to_bool() {
    let symtab = SymbolTable::new();
    let folded = fold_expr(binary(BinaryOp::Lt, int_const(3), int_const(4)), &symtab);
    match &folded.kind {
        ExprKind::Const {
            ty,
            value: ConstValue::Bool(v),
        } => {
            assert_eq!(ty, &Type::uniform_bool());
            assert_eq!(v, &[true]);
        }
        other => panic!("expected bool constant, got {:?}", other),
    }
}

#[test]
fn uniform_operand_broadcasts_against_varying() {
    let symtab = SymbolTable::new();
    let e = binary(
        BinaryOp::Add,
        varying_int_const(&[1, 2, 3, 4]),
        int_const(10),
    );
    let folded = fold_expr(e, &symtab);
    match &folded.kind {
        ExprKind::Const { ty, value } => {
            assert!(ty.is_varying());
            assert_eq!(value, &ConstValue::Int32(vec![11, 12, 13, 14]));
        }
        other => panic!("expected constant, got {:?}", other),
    }
}

#[test]
fn cast_of_constant_converts() {
    let symtab = SymbolTable::new();
    let e = Expr::new(
        ExprKind::Cast {
            to: Type::uniform_float(),
            expr: Box::new(int_const(3)),
        },
        test_pos(),
    );
    match fold_expr(e, &symtab).kind {
        ExprKind::Const {
            ty,
            value: ConstValue::Float(v),
        } => {
            assert_eq!(ty, Type::uniform_float());
            assert_eq!(v, vec![3.0]);
        }
        other => panic!("expected float constant, got {:?}", other),
    }
}

#[test]
fn select_with_constant_test_picks_a_side() {
    let symtab = SymbolTable::new();
    let e = Expr::new(
        ExprKind::Select {
            test: Box::new(bool_const(false)),
            if_true: Box::new(int_const(1)),
            if_false: Box::new(int_const(2)),
        },
        test_pos(),
    );
    assert_eq!(expect_int(&fold_expr(e, &symtab)), &[2]);
}

// =============================================================================
// Statement pass
// =============================================================================

#[test]
fn optimize_is_idempotent() {
    let mut symtab = SymbolTable::new();
    let x = const_int_decl(&mut symtab, "x", false);
    let stmt = Stmt::new(
        StmtKind::Expr(Some(binary(
            BinaryOp::Add,
            binary(BinaryOp::Add, int_const(3), int_const(4)),
            sym_ref(x),
        ))),
        test_pos(),
    );
    let once = fold_stmt(stmt, &mut symtab);
    let twice = fold_stmt(once.clone(), &mut symtab);
    assert_eq!(once, twice);
}

#[test]
fn const_decl_captures_folded_initializer() {
    let mut symtab = SymbolTable::new();
    let x = const_int_decl(&mut symtab, "x", true);
    let stmt = Stmt::new(
        StmtKind::Decl(vec![crate::ast::VariableDeclaration {
            sym: x,
            init: Some(binary(BinaryOp::Add, int_const(3), int_const(4))),
        }]),
        test_pos(),
    );
    fold_stmt(stmt, &mut symtab);
    assert_eq!(symtab.get(x).const_value, Some(ConstValue::Int32(vec![7])));
}

#[test]
fn non_const_decl_is_not_captured() {
    let mut symtab = SymbolTable::new();
    let x = const_int_decl(&mut symtab, "x", false);
    let stmt = Stmt::new(
        StmtKind::Decl(vec![crate::ast::VariableDeclaration {
            sym: x,
            init: Some(binary(BinaryOp::Add, int_const(3), int_const(4))),
        }]),
        test_pos(),
    );
    fold_stmt(stmt, &mut symtab);
    assert_eq!(symtab.get(x).const_value, None);
}

#[test]
fn brace_list_initializer_is_not_captured() {
    let mut symtab = SymbolTable::new();
    let a = symtab.declare(Symbol::new(
        "a",
        Type::Array {
            element: Box::new(Type::uniform_int32().as_const()),
            count: 2,
        },
        StorageClass::Auto,
        test_pos(),
    ));
    let stmt = Stmt::new(
        StmtKind::Decl(vec![crate::ast::VariableDeclaration {
            sym: a,
            init: Some(Expr::new(
                ExprKind::List(vec![int_const(1), int_const(2)]),
                test_pos(),
            )),
        }]),
        test_pos(),
    );
    fold_stmt(stmt, &mut symtab);
    assert_eq!(symtab.get(a).const_value, None);
}

#[test]
fn captured_constant_feeds_later_folding() {
    let mut symtab = SymbolTable::new();
    let x = const_int_decl(&mut symtab, "x", true);
    let decl = Stmt::new(
        StmtKind::Decl(vec![crate::ast::VariableDeclaration {
            sym: x,
            init: Some(int_const(7)),
        }]),
        test_pos(),
    );
    fold_stmt(decl, &mut symtab);

    // `x + 1` now folds through the captured value.
    let use_stmt = Stmt::new(
        StmtKind::Expr(Some(binary(BinaryOp::Add, sym_ref(x), int_const(1)))),
        test_pos(),
    );
    let folded = fold_stmt(use_stmt, &mut symtab);
    match folded.kind {
        StmtKind::Expr(Some(e)) => assert_eq!(expect_int(&e), &[8]),
        other => panic!("expected expr stmt, got {:?}", other),
    }
}

#[test]
fn folding_recurses_into_loop_bodies() {
    let mut symtab = SymbolTable::new();
    let body = Stmt::new(
        StmtKind::Expr(Some(binary(BinaryOp::Add, int_const(2), int_const(2)))),
        test_pos(),
    );
    let stmt = Stmt::new(
        StmtKind::Do {
            test: bool_const(true),
            body: Some(Box::new(body)),
            coherent: false,
        },
        test_pos(),
    );
    let folded = fold_stmt(stmt, &mut symtab);
    match folded.kind {
        StmtKind::Do { body: Some(b), .. } => match b.kind {
            StmtKind::Expr(Some(ref e)) => assert_eq!(expect_int(e), &[4]),
            other => panic!("expected folded body, got {:?}", other),
        },
        other => panic!("expected do stmt, got {:?}", other),
    }
}
