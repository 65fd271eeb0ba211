//! Tests for statement lowering: declarations, masked control flow,
//! loops, print, and assert.
//!
//! Each test builds a small statement tree, runs it through type-check
//! and constant folding, lowers it, and then inspects the emitted CFG:
//! which blocks exist, which mask operations were emitted, what got
//! stored where.

use crate::ast::{
    BinaryOp, ConstValue, Expr, ExprKind, SourcePos, Stmt, StmtKind, UnaryOp, VariableDeclaration,
};
use crate::checker::check_stmt;
use crate::const_fold::fold_stmt;
use crate::ir::{FuncId, Inst, IrConst, IrType, Module, ValueDef};
use crate::lower::{emit_stmt, lower_function, FunctionEmitContext};
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

fn bool_const(b: bool) -> Expr {
    Expr::new(
        ExprKind::Const {
            ty: Type::uniform_bool(),
            value: ConstValue::Bool(vec![b]),
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

fn decl_stmt(sym: SymbolId, init: Option<Expr>) -> Stmt {
    Stmt::new(StmtKind::Decl(vec![VariableDeclaration { sym, init }]), test_pos())
}

fn expr_stmt(e: Expr) -> Stmt {
    Stmt::new(StmtKind::Expr(Some(e)), test_pos())
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

fn index(base: Expr, idx: Expr) -> Expr {
    Expr::new(
        ExprKind::Index {
            base: Box::new(base),
            index: Box::new(idx),
        },
        test_pos(),
    )
}

fn list(stmts: Vec<Stmt>) -> Stmt {
    Stmt::new(StmtKind::List(stmts), test_pos())
}

fn check_and_fold(stmt: Stmt, symtab: &mut SymbolTable, cx: &mut CompileContext) -> Stmt {
    let checked = check_stmt(stmt, symtab, cx).expect("type check succeeds");
    fold_stmt(checked, symtab)
}

/// Lower with both masks starting all-on (an entry function).
fn lower_all_on(
    stmt: &Stmt,
    symtab: &mut SymbolTable,
    cx: &mut CompileContext,
) -> (Module, FuncId) {
    let mut module = Module::new();
    let fid = lower_function("kernel", &Type::Void, stmt, symtab, cx, &mut module)
        .expect("lowering succeeds");
    (module, fid)
}

/// Lower with the internal mask bound to an incoming argument, so
/// nothing about it is known at compile time.
fn lower_mixed(
    stmt: &Stmt,
    symtab: &mut SymbolTable,
    cx: &mut CompileContext,
) -> (Module, FuncId) {
    let mut module = Module::new();
    let mut ctx = FunctionEmitContext::new(cx, symtab, &mut module, "kernel", &Type::Void)
        .expect("context");
    let width = ctx.vector_width();
    let mask = ctx.b.add_param(IrType::mask(width), "__mask");
    ctx.set_internal_mask(mask);
    emit_stmt(stmt, &mut ctx).expect("lowering succeeds");
    let fid = ctx.finish().expect("finish");
    (module, fid)
}

fn count_stores_of_i32(func: &crate::ir::Function, v: i32) -> usize {
    func.count_insts(|inst| match inst {
        Inst::Store { value, .. } => matches!(func.const_of(*value), Some(IrConst::I32(x)) if *x == v),
        _ => false,
    })
}

fn count_kind(func: &crate::ir::Function, pred: impl Fn(&Inst) -> bool) -> usize {
    func.count_insts(pred)
}

fn varying_array4(symtab: &mut SymbolTable, name: &str) -> SymbolId {
    declare(
        symtab,
        name,
        Type::Array {
            element: Box::new(Type::varying_int32()),
            count: 4,
        },
    )
}

// =============================================================================
// Declarations
// =============================================================================

#[test]
fn const_decl_lowers_to_single_store_of_folded_value() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let x = symtab.declare(Symbol::new(
        "x",
        Type::uniform_int32().as_const(),
        StorageClass::Auto,
        test_pos(),
    ));
    let stmt = decl_stmt(
        x,
        Some(Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(int_const(3)),
                rhs: Box::new(int_const(4)),
            },
            test_pos(),
        )),
    );
    let stmt = check_and_fold(stmt, &mut symtab, &mut cx);
    assert_eq!(symtab.get(x).const_value, Some(ConstValue::Int32(vec![7])));

    let (module, fid) = lower_all_on(&stmt, &mut symtab, &mut cx);
    let func = module.function(fid);
    assert_eq!(count_stores_of_i32(func, 7), 1);
    assert!(symtab.get(x).storage.is_some());
    assert_eq!(symtab.get(x).varying_cf_depth, Some(0));
}

#[test]
fn deferred_size_array_is_sized_and_element_initialized() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let a = declare(
        &mut symtab,
        "a",
        Type::Array {
            element: Box::new(Type::uniform_int32()),
            count: 0,
        },
    );
    let init = Expr::new(
        ExprKind::List(vec![int_const(10), int_const(20), int_const(30)]),
        test_pos(),
    );
    let stmt = check_and_fold(decl_stmt(a, Some(init)), &mut symtab, &mut cx);
    let (module, fid) = lower_all_on(&stmt, &mut symtab, &mut cx);
    let func = module.function(fid);

    assert_eq!(
        symtab.get(a).ty,
        Type::Array {
            element: Box::new(Type::uniform_int32()),
            count: 3,
        }
    );
    assert_eq!(count_stores_of_i32(func, 10), 1);
    assert_eq!(count_stores_of_i32(func, 20), 1);
    assert_eq!(count_stores_of_i32(func, 30), 1);
    assert_eq!(count_kind(func, |i| matches!(i, Inst::Gep { .. })), 3);
    assert!(!cx.diags.has_errors());
}

#[test]
fn unsized_array_without_brace_initializer_errors() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let a = declare(
        &mut symtab,
        "a",
        Type::Array {
            element: Box::new(Type::uniform_int32()),
            count: 0,
        },
    );
    let stmt = check_and_fold(decl_stmt(a, None), &mut symtab, &mut cx);
    lower_all_on(&stmt, &mut symtab, &mut cx);
    assert_eq!(cx.diags.error_count(), 1);
}

#[test]
fn brace_initializer_arity_mismatch_errors() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let a = declare(
        &mut symtab,
        "a",
        Type::Array {
            element: Box::new(Type::uniform_int32()),
            count: 3,
        },
    );
    let init = Expr::new(ExprKind::List(vec![int_const(1), int_const(2)]), test_pos());
    let stmt = check_and_fold(decl_stmt(a, Some(init)), &mut symtab, &mut cx);
    lower_all_on(&stmt, &mut symtab, &mut cx);
    assert_eq!(cx.diags.error_count(), 1);
    assert!(cx
        .diags
        .messages()
        .iter()
        .any(|d| d.message.contains("requires 3 values; 2 provided")));
}

#[test]
fn reference_decl_without_initializer_errors() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let r = declare(
        &mut symtab,
        "r",
        Type::Reference {
            target: Box::new(Type::uniform_int32()),
        },
    );
    let stmt = check_and_fold(decl_stmt(r, None), &mut symtab, &mut cx);
    lower_all_on(&stmt, &mut symtab, &mut cx);
    assert_eq!(cx.diags.error_count(), 1);
    assert!(cx
        .diags
        .messages()
        .iter()
        .any(|d| d.message.contains("reference-type variable")));
}

#[test]
fn static_decl_becomes_module_global_with_constant_init() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let s = symtab.declare(Symbol::new(
        "s",
        Type::uniform_int32(),
        StorageClass::Static,
        test_pos(),
    ));
    let stmt = check_and_fold(decl_stmt(s, Some(int_const(3))), &mut symtab, &mut cx);
    let (module, _) = lower_all_on(&stmt, &mut symtab, &mut cx);

    let global = module.global("static.1.s").expect("static global exists");
    assert_eq!(global.init, IrConst::I32(3));
    assert!(symtab.get(s).storage.is_some());
}

#[test]
fn static_decl_with_non_constant_initializer_errors() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let other = declare(&mut symtab, "other", Type::uniform_int32());
    let s = symtab.declare(Symbol::new(
        "s",
        Type::uniform_int32(),
        StorageClass::Static,
        test_pos(),
    ));
    let body = list(vec![
        decl_stmt(other, Some(int_const(1))),
        decl_stmt(s, Some(sym_ref(other))),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    lower_all_on(&body, &mut symtab, &mut cx);
    assert!(cx
        .diags
        .messages()
        .iter()
        .any(|d| d.message.contains("must be a constant")));
}

// =============================================================================
// If lowering
// =============================================================================

#[test]
fn uniform_if_branches_without_mask_operations() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let x = declare(&mut symtab, "x", Type::uniform_int32());
    let body = list(vec![
        decl_stmt(x, Some(int_const(0))),
        Stmt::if_stmt(
            bool_const(true),
            Some(expr_stmt(assign(sym_ref(x), int_const(1)))),
            Some(expr_stmt(assign(sym_ref(x), int_const(2)))),
            false,
            &symtab,
            &cx.opts,
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_all_on(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    assert!(func.block_by_name("if_then").is_some());
    assert!(func.block_by_name("if_else").is_some());
    assert!(func.block_by_name("if_exit").is_some());
    assert_eq!(count_kind(func, |i| matches!(i, Inst::Any { .. })), 0);
    assert_eq!(count_kind(func, |i| matches!(i, Inst::All { .. })), 0);
}

#[test]
fn varying_if_with_static_all_on_mask_specializes() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let x = declare(&mut symtab, "x", Type::varying_int32());
    let body = list(vec![
        decl_stmt(c, None),
        decl_stmt(x, Some(int_const(0))),
        Stmt::if_stmt(
            sym_ref(c),
            Some(expr_stmt(assign(sym_ref(x), int_const(1)))),
            Some(expr_stmt(assign(sym_ref(x), int_const(2)))),
            false,
            &symtab,
            &cx.opts,
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_all_on(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    // The entry mask is statically all on, so only the all-on
    // specialization is emitted: all(test), then any(test), no runtime
    // check of the mask itself.
    assert!(func.block_by_name("cif_test_all").is_some());
    assert!(func.block_by_name("cif_test_none").is_some());
    assert!(func.block_by_name("cif_test_mixed").is_some());
    assert!(func.block_by_name("cif_mask_all").is_none());
}

#[test]
fn coherent_varying_if_dispatches_on_mask_at_runtime() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let x = declare(&mut symtab, "x", Type::varying_int32());
    let body = list(vec![
        decl_stmt(c, None),
        decl_stmt(x, Some(int_const(0))),
        Stmt::if_stmt(
            sym_ref(c),
            Some(expr_stmt(assign(sym_ref(x), int_const(1)))),
            None,
            true,
            &symtab,
            &cx.opts,
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_mixed(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    assert!(func.block_by_name("cif_mask_all").is_some());
    assert!(func.block_by_name("cif_mask_mixed").is_some());
    assert!(func.block_by_name("cif_done").is_some());
}

#[test]
fn safe_cheap_if_is_predicated_with_blend_stores() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let a = varying_array4(&mut symtab, "a");

    // if (c) a[2] = 0; else ++a[2];  -- both sides safe under an all-off
    // mask and cheap, so no branch on any(mask): both run predicated.
    let then_s = expr_stmt(assign(index(sym_ref(a), int_const(2)), int_const(0)));
    let else_s = expr_stmt(Expr::new(
        ExprKind::Unary {
            op: UnaryOp::PreInc,
            operand: Box::new(index(sym_ref(a), int_const(2))),
        },
        test_pos(),
    ));
    let body = list(vec![
        decl_stmt(c, None),
        decl_stmt(a, None),
        Stmt::if_stmt(
            sym_ref(c),
            Some(then_s),
            Some(else_s),
            false,
            &symtab,
            &cx.opts,
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_mixed(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    assert_eq!(count_kind(func, |i| matches!(i, Inst::Any { .. })), 0);
    assert!(count_kind(func, |i| matches!(i, Inst::Select { .. })) >= 2);
}

#[test]
fn unsafe_if_body_is_gated_on_any_mask() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let a = varying_array4(&mut symtab, "a");
    let i = declare(&mut symtab, "i", Type::varying_int32());

    // if (c) a[i] = 0;  -- i is not a compile-time constant, so the
    // indexed store is unsafe under an all-off mask and the body must be
    // skipped when no lane wants it.
    let then_s = expr_stmt(assign(index(sym_ref(a), sym_ref(i)), int_const(0)));
    let body = list(vec![
        decl_stmt(c, None),
        decl_stmt(a, None),
        decl_stmt(i, None),
        Stmt::if_stmt(
            sym_ref(c),
            Some(then_s),
            None,
            false,
            &symtab,
            &cx.opts,
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_mixed(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    assert!(count_kind(func, |i| matches!(i, Inst::Any { .. })) >= 1);
    assert_eq!(count_kind(func, |i| matches!(i, Inst::Scatter { .. })), 1);
    assert!(func.block_by_name("safe_if_run_true").is_some());
}

#[test]
fn coherent_hint_on_uniform_test_warns_once() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let stmt = Stmt::if_stmt(
        bool_const(true),
        Some(expr_stmt(int_const(0))),
        None,
        true,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    let stmt = check_and_fold(stmt, &mut symtab, &mut cx);
    lower_all_on(&stmt, &mut symtab, &mut cx);

    let hints: Vec<_> = cx
        .diags
        .warnings()
        .filter(|d| d.message.contains("Uniform condition supplied"))
        .collect();
    assert_eq!(hints.len(), 1);
}

// =============================================================================
// Loop lowering
// =============================================================================

#[test]
fn uniform_do_loop_branches_directly() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let go = declare(&mut symtab, "go", Type::uniform_bool());
    let body = list(vec![
        decl_stmt(go, Some(bool_const(false))),
        Stmt::do_stmt(
            sym_ref(go),
            Some(expr_stmt(int_const(0))),
            false,
            &cx.opts,
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_all_on(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    assert!(func.block_by_name("do_loop").is_some());
    assert!(func.block_by_name("do_test").is_some());
    assert!(func.block_by_name("do_exit").is_some());
    // No lane bookkeeping for a uniform loop.
    assert_eq!(
        count_kind(func, |i| matches!(i, Inst::Alloca { name, .. } if name == "break_lanes_memory")),
        0
    );
}

#[test]
fn uniform_test_with_varying_break_lowers_as_varying_loop() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let go = declare(&mut symtab, "go", Type::uniform_bool());

    // do { if (c) break; } while (go);
    let body_if = Stmt::if_stmt(
        sym_ref(c),
        Some(Stmt::break_stmt(false, &cx.opts, test_pos())),
        None,
        false,
        &symtab,
        &cx.opts,
        test_pos(),
    );
    let body = list(vec![
        decl_stmt(c, None),
        decl_stmt(go, Some(bool_const(true))),
        Stmt::do_stmt(
            sym_ref(go),
            Some(list(vec![body_if])),
            false,
            &cx.opts,
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_all_on(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    // Despite the uniform `go`, the loop carries full lane management.
    assert_eq!(
        count_kind(func, |i| matches!(i, Inst::Alloca { name, .. } if name == "break_lanes_memory")),
        1
    );
    // The bottom-of-loop test is a mask check, not a scalar branch.
    assert!(count_kind(func, |i| matches!(i, Inst::Any { .. })) >= 1);
}

#[test]
fn for_loop_emits_test_step_body_exit_blocks() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let i = declare(&mut symtab, "i", Type::uniform_int32());
    let init = decl_stmt(i, Some(int_const(0)));
    let test = Expr::new(
        ExprKind::Binary {
            op: BinaryOp::Lt,
            lhs: Box::new(sym_ref(i)),
            rhs: Box::new(int_const(10)),
        },
        test_pos(),
    );
    let step = expr_stmt(Expr::new(
        ExprKind::Unary {
            op: UnaryOp::PreInc,
            operand: Box::new(sym_ref(i)),
        },
        test_pos(),
    ));
    let stmt = Stmt::for_stmt(
        Some(init),
        Some(test),
        Some(step),
        Some(list(vec![expr_stmt(int_const(0))])),
        false,
        &cx.opts,
        test_pos(),
    );
    let stmt = check_and_fold(stmt, &mut symtab, &mut cx);
    let (module, fid) = lower_all_on(&stmt, &mut symtab, &mut cx);
    let func = module.function(fid);

    for name in ["for_test", "for_step", "for_loop", "for_exit"] {
        assert!(func.block_by_name(name).is_some(), "missing block {}", name);
    }
}

#[test]
fn coherent_varying_do_loop_specializes_all_on_body() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let body = list(vec![
        decl_stmt(c, None),
        Stmt::do_stmt(
            sym_ref(c),
            Some(expr_stmt(int_const(0))),
            true,
            &cx.opts,
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_mixed(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    assert!(func.block_by_name("do_all_on").is_some());
    assert!(func.block_by_name("do_mixed").is_some());
}

// =============================================================================
// Return
// =============================================================================

#[test]
fn return_under_varying_if_accumulates_returned_lanes() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let c = declare(&mut symtab, "c", Type::varying_bool());
    let body = list(vec![
        decl_stmt(c, None),
        Stmt::if_stmt(
            sym_ref(c),
            Some(Stmt::return_stmt(None, false, &cx.opts, test_pos())),
            None,
            false,
            &symtab,
            &cx.opts,
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_mixed(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    let returned_slot = func
        .insts()
        .find_map(|(_, vid, inst)| match inst {
            Inst::Alloca { name, .. } if name == "returned_lanes_memory" => Some(vid),
            _ => None,
        })
        .expect("returned-lanes slot");
    let stores_to_slot = count_kind(func, |i| {
        matches!(i, Inst::Store { ptr, .. } if *ptr == returned_slot)
    });
    // The initial clear plus the accumulation at the return site.
    assert_eq!(stores_to_slot, 2);
}

#[test]
fn uniform_return_terminates_the_block() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let body = list(vec![
        Stmt::return_stmt(None, false, &cx.opts, test_pos()),
        // Unreachable; must be dropped silently.
        expr_stmt(int_const(1)),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_all_on(&body, &mut symtab, &mut cx);
    let func = module.function(fid);
    // The dead expression after the return emitted nothing: no constant 1
    // ends up stored or computed anywhere.
    assert_eq!(count_stores_of_i32(func, 1), 0);
}

// =============================================================================
// Print and assert
// =============================================================================

#[test]
fn print_marshals_type_string_and_arguments() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let i = declare(&mut symtab, "i", Type::varying_int32());
    let f = declare(&mut symtab, "f", Type::uniform_float());
    let body = list(vec![
        decl_stmt(i, None),
        decl_stmt(f, None),
        Stmt::new(
            StmtKind::Print {
                format: "%d %f\n".to_string(),
                values: Some(Expr::new(
                    ExprKind::List(vec![sym_ref(i), sym_ref(f)]),
                    test_pos(),
                )),
            },
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_all_on(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    let call_args = func
        .insts()
        .find_map(|(_, _, inst)| match inst {
            Inst::Call { callee, args, .. } if callee == "__do_print" => Some(args.clone()),
            _ => None,
        })
        .expect("__do_print call");
    assert_eq!(call_args.len(), 5);
    // Argument 1 is the type string: varying int32 then uniform float.
    assert_eq!(
        func.value(call_args[1]).def,
        ValueDef::Str("If".to_string())
    );
    // Argument 2 is the vector width.
    assert_eq!(func.const_of(call_args[2]), Some(&IrConst::I32(8)));
    // Two argument slots were parked on the stack.
    assert_eq!(
        count_kind(func, |i| matches!(i, Inst::Alloca { name, .. } if name == "print_arg")),
        2
    );
}

#[test]
fn print_rejects_non_atomic_values() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let a = varying_array4(&mut symtab, "a");
    let body = list(vec![
        decl_stmt(a, None),
        Stmt::new(
            StmtKind::Print {
                format: "%d\n".to_string(),
                values: Some(sym_ref(a)),
            },
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    lower_all_on(&body, &mut symtab, &mut cx);
    assert!(cx
        .diags
        .messages()
        .iter()
        .any(|d| d.message.contains("Only atomic types are allowed in print")));
}

#[test]
fn assert_calls_the_matching_runtime_helper() {
    let mut symtab = SymbolTable::new();
    let mut cx = CompileContext::default();
    let u = declare(&mut symtab, "u", Type::uniform_bool());
    let v = declare(&mut symtab, "v", Type::varying_bool());
    let body = list(vec![
        decl_stmt(u, None),
        decl_stmt(v, None),
        Stmt::new(
            StmtKind::Assert {
                message: "u holds".to_string(),
                test: sym_ref(u),
            },
            test_pos(),
        ),
        Stmt::new(
            StmtKind::Assert {
                message: "v holds".to_string(),
                test: sym_ref(v),
            },
            test_pos(),
        ),
    ]);
    let body = check_and_fold(body, &mut symtab, &mut cx);
    let (module, fid) = lower_all_on(&body, &mut symtab, &mut cx);
    let func = module.function(fid);

    let callees: Vec<String> = func
        .insts()
        .filter_map(|(_, _, inst)| match inst {
            Inst::Call { callee, .. } => Some(callee.clone()),
            _ => None,
        })
        .collect();
    assert!(callees.iter().any(|c| c == "__do_assert_uniform"));
    assert!(callees.iter().any(|c| c == "__do_assert_varying"));

    // The message string carries position and trailing newline.
    let has_msg = func.insts().any(|(_, _, inst)| match inst {
        Inst::Call { args, .. } => args.first().is_some_and(|a| {
            matches!(&func.value(*a).def,
                     ValueDef::Str(s) if s == "test.lc:1:1: Assertion failed: u holds\n")
        }),
        _ => false,
    });
    assert!(has_msg);
}
