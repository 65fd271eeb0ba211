//! Statement emission.
//!
//! Each statement variant lowers through the
//! [`FunctionEmitContext`](super::FunctionEmitContext); the interesting
//! work is the masked control flow. An `if` with a uniform test is two
//! plain branches; a varying test picks between three regimes: the body
//! run once with the mask known all-on, a runtime all-on/mixed dispatch
//! (the coherent forms), or straight-line predicated execution of both
//! branches when they are cheap and provably safe under an empty mask.
//! Loops follow the same split, with `break`/`continue` lane management
//! handled by the context.
//!
//! A statement emitted while no basic block is current is a no-op: some
//! earlier statement (a uniform `return`, say) already terminated the
//! flow.

use log::debug;

use super::expr::emit_expr_value;
use super::FunctionEmitContext;
use crate::ast::{ConstValue, Expr, ExprKind, SourcePos, Stmt, StmtKind, VariableDeclaration};
use crate::bail_lower;
use crate::cost::{estimate_stmt_cost, PREDICATE_SAFE_IF_STATEMENT_COST};
use crate::error::Result;
use crate::ir::{Global, IrConst, IrType, ValueId};
use crate::mask_analysis::safe_to_run_with_all_lanes_off;
use crate::sym::StorageClass;
use crate::types::checker::try_type_convert_expr;
use crate::types::Type;

pub fn emit_stmt(stmt: &Stmt, ctx: &mut FunctionEmitContext) -> Result<()> {
    match &stmt.kind {
        StmtKind::Expr(e) => {
            if ctx.current_basic_block().is_none() {
                return Ok(());
            }
            ctx.set_debug_pos(&stmt.pos);
            if let Some(e) = e {
                emit_expr_value(e, ctx)?;
            }
            Ok(())
        }

        StmtKind::Decl(vars) => emit_decl(vars, ctx),

        StmtKind::If {
            test,
            then_stmts,
            else_stmts,
            coherent,
            any_check,
        } => emit_if(
            test,
            then_stmts.as_deref(),
            else_stmts.as_deref(),
            *coherent,
            *any_check,
            &stmt.pos,
            ctx,
        ),

        StmtKind::Do {
            test,
            body,
            coherent,
        } => emit_do(test, body.as_deref(), *coherent, &stmt.pos, ctx),

        StmtKind::For {
            init,
            test,
            step,
            body,
            coherent,
        } => emit_for(
            init.as_deref(),
            test.as_ref(),
            step.as_deref(),
            body.as_deref(),
            *coherent,
            &stmt.pos,
            ctx,
        ),

        StmtKind::Break { coherent } => {
            if ctx.current_basic_block().is_none() {
                return Ok(());
            }
            ctx.set_debug_pos(&stmt.pos);
            ctx.emit_break(*coherent)
        }

        StmtKind::Continue { coherent } => {
            if ctx.current_basic_block().is_none() {
                return Ok(());
            }
            ctx.set_debug_pos(&stmt.pos);
            ctx.emit_continue(*coherent)
        }

        StmtKind::Return { value, coherent } => {
            if ctx.current_basic_block().is_none() {
                return Ok(());
            }
            ctx.set_debug_pos(&stmt.pos);
            let v = match value {
                Some(e) => emit_expr_value(e, ctx)?,
                None => None,
            };
            ctx.current_lanes_returned(v, *coherent)
        }

        StmtKind::List(stmts) => {
            if ctx.current_basic_block().is_none() {
                return Ok(());
            }
            ctx.start_scope();
            ctx.set_debug_pos(&stmt.pos);
            for s in stmts {
                emit_stmt(s, ctx)?;
            }
            ctx.end_scope();
            Ok(())
        }

        StmtKind::Print { format, values } => {
            if ctx.current_basic_block().is_none() {
                return Ok(());
            }
            emit_print(format, values.as_ref(), &stmt.pos, ctx)
        }

        StmtKind::Assert { message, test } => {
            if ctx.current_basic_block().is_none() {
                return Ok(());
            }
            emit_assert(message, test, &stmt.pos, ctx)
        }
    }
}

/// Emit one arm of an `if`. A bare statement (not a list) still gets its
/// own scope; a list brings one of its own.
fn emit_if_statements(
    stmts: Option<&Stmt>,
    note: &'static str,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    let Some(stmts) = stmts else {
        return Ok(());
    };
    let wrap = !stmts.is_list();
    if wrap {
        ctx.start_scope();
    }
    ctx.add_instrumentation_point(note);
    emit_stmt(stmts, ctx)?;
    if wrap {
        ctx.end_scope();
    }
    Ok(())
}

// =============================================================================
// Declarations
// =============================================================================

fn emit_decl(vars: &[VariableDeclaration], ctx: &mut FunctionEmitContext) -> Result<()> {
    if ctx.current_basic_block().is_none() {
        return Ok(());
    }

    for var in vars {
        let sym_id = var.sym;
        let (name, mut ty, storage_class, sym_pos) = {
            let sym = ctx.symtab.get(sym_id);
            (
                sym.name.clone(),
                sym.ty.clone(),
                sym.storage_class,
                sym.pos.clone(),
            )
        };

        // Now that emission knows how deeply nested in varying control
        // flow this declaration sits, record it on the symbol.
        let depth = ctx.varying_cf_depth();
        ctx.symtab.get_mut(sym_id).varying_cf_depth = Some(depth);

        ctx.set_debug_pos(&sym_pos);

        // An array declared without a size takes its size from a brace
        // initializer, now that we can see it.
        if matches!(&ty, Type::Array { count: 0, .. }) {
            match &var.init {
                Some(Expr {
                    kind: ExprKind::List(elems),
                    ..
                }) => {
                    ty = ty
                        .get_sized_array(elems.len() as u32)
                        .expect("sized variant of unsized array");
                    ctx.symtab.get_mut(sym_id).ty = ty.clone();
                    debug!("sized deferred array \"{}\" as \"{}\"", name, ty);
                }
                _ => {
                    ctx.cx.diags.error(
                        &sym_pos,
                        format!(
                            "Can't declare an unsized array \"{}\" as a local variable \
                             without providing an initializer expression to set its size.",
                            name
                        ),
                    );
                    continue;
                }
            }
        }

        if ty.is_reference() && var.init.is_none() {
            ctx.cx.diags.error(
                &sym_pos,
                format!(
                    "Must provide initializer for reference-type variable \"{}\".",
                    name
                ),
            );
            continue;
        }

        let Some(ir_ty) = ty.lowered(&ctx.cx.target) else {
            bail_lower!("declared type \"{}\" has no lowered form", ty);
        };

        if storage_class == StorageClass::Static {
            // Statics need compile-time-constant initializers and live at
            // module scope under a uniquified internal name, so they
            // persist across calls.
            let mut cinit = None;
            if let Some(init) = &var.init {
                cinit = static_const_init(init, &ty, ctx);
                if cinit.is_none() {
                    ctx.cx.diags.error(
                        &sym_pos,
                        format!(
                            "Initializer for static variable \"{}\" must be a constant.",
                            name
                        ),
                    );
                }
            }
            let init = cinit.unwrap_or(IrConst::Zero(ir_ty.clone()));
            let global_name = format!("static.{}.{}", sym_pos.line, name);
            ctx.b.add_module_global(Global {
                name: global_name.clone(),
                ty: ir_ty,
                init,
                is_const: ty.is_const(),
            });
            let ptr = ctx.b.global_ref(&global_name);
            ctx.symtab.get_mut(sym_id).storage = Some(ptr);
            ctx.emit_variable_debug_info(&name, ptr, &sym_pos);
        } else {
            let ptr = ctx.b.alloca(ir_ty, name.clone());
            ctx.symtab.get_mut(sym_id).storage = Some(ptr);
            // Debug info first, then the stores of the initializer.
            ctx.emit_variable_debug_info(&name, ptr, &sym_pos);
            let func = ctx.get_function();
            ctx.symtab.get_mut(sym_id).parent_function = Some(func);
            init_symbol(ptr, &name, &ty, var.init.as_ref(), ctx)?;
        }
    }
    Ok(())
}

/// Compile-time constant for a static initializer, including element-wise
/// brace lists for collections.
fn static_const_init(init: &Expr, ty: &Type, ctx: &FunctionEmitContext) -> Option<IrConst> {
    if let ExprKind::List(elems) = &init.kind {
        if !ty.is_collection() || ty.element_count() != Some(elems.len() as u32) {
            return None;
        }
        let parts = elems
            .iter()
            .enumerate()
            .map(|(i, e)| static_const_init(e, &ty.element_type(i as u32)?, ctx))
            .collect::<Option<Vec<_>>>()?;
        return Some(IrConst::Aggregate(parts));
    }
    let value = init.get_constant(ty)?;
    const_value_to_ir(&value, ty, ctx.vector_width())
}

fn const_value_to_ir(value: &ConstValue, ty: &Type, width: u32) -> Option<IrConst> {
    if ty.is_uniform() {
        if value.lane_count() != 1 {
            return None;
        }
        Some(match value {
            ConstValue::Bool(v) => IrConst::I1(v[0]),
            ConstValue::Int32(v) => IrConst::I32(v[0]),
            ConstValue::UInt32(v) => IrConst::I32(v[0] as i32),
            ConstValue::Float(v) => IrConst::F32(v[0]),
            ConstValue::Int64(v) => IrConst::I64(v[0]),
            ConstValue::UInt64(v) => IrConst::I64(v[0] as i64),
            ConstValue::Double(v) => IrConst::F64(v[0]),
        })
    } else {
        Some(match value.splat(width as usize) {
            ConstValue::Bool(v) => IrConst::VecI1(v),
            ConstValue::Int32(v) => IrConst::VecI32(v),
            ConstValue::UInt32(v) => IrConst::VecI32(v.into_iter().map(|x| x as i32).collect()),
            ConstValue::Float(v) => IrConst::VecF32(v),
            ConstValue::Int64(v) => IrConst::VecI64(v),
            ConstValue::UInt64(v) => IrConst::VecI64(v.into_iter().map(|x| x as i64).collect()),
            ConstValue::Double(v) => IrConst::VecF64(v),
        })
    }
}

/// Store an initializer into freshly allocated storage.
///
/// No initializer stores an undefined value (or zero, under the
/// zero-init policy switch); a plain expression is converted and stored;
/// brace lists recurse element-wise into collections. References accept
/// only an initializer of exactly their own type.
fn init_symbol(
    lvalue: ValueId,
    name: &str,
    ty: &Type,
    init: Option<&Expr>,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    let Some(ir_ty) = ty.lowered(&ctx.cx.target) else {
        bail_lower!("initialized type \"{}\" has no lowered form", ty);
    };

    let Some(init) = init else {
        let v = if ctx.cx.opts.zero_initialize_undef {
            ctx.b.zero(ir_ty)
        } else {
            ctx.b.undef(ir_ty)
        };
        ctx.b.store(v, lvalue);
        return Ok(());
    };

    // A plain expression that converts to the declared type is just
    // evaluated and stored.
    if !init.is_list() && !ty.is_reference() {
        if let Some(converted) = try_type_convert_expr(init.clone(), ty, ctx.symtab) {
            if let Some(v) = emit_expr_value(&converted, ctx)? {
                ctx.b.store(v, lvalue);
            }
            return Ok(());
        }
    }

    if ty.is_atomic() || ty.is_enum() {
        if init.is_list() {
            ctx.cx.diags.error(
                &init.pos,
                format!(
                    "Expression list initializers can't be used for variable \"{}\" \
                     with type \"{}\".",
                    name, ty
                ),
            );
        } else {
            let from = init
                .get_type(ctx.symtab)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "<error>".to_string());
            ctx.cx.diags.error(
                &init.pos,
                format!(
                    "Can't convert type \"{}\" to \"{}\" for initializer.",
                    from, ty
                ),
            );
        }
        return Ok(());
    }

    if ty.is_reference() {
        // No implicit conversions for references: the initializer's type
        // must be the reference type itself.
        if init.get_type(ctx.symtab).as_ref() != Some(ty) {
            let from = init
                .get_type(ctx.symtab)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "<error>".to_string());
            ctx.cx.diags.error(
                &init.pos,
                format!(
                    "Initializer for reference type \"{}\" must have same reference \
                     type itself. \"{}\" is incompatible.",
                    ty, from
                ),
            );
            return Ok(());
        }
        if let Some(v) = emit_expr_value(init, ctx)? {
            ctx.b.store(v, lvalue);
        }
        return Ok(());
    }

    if ty.is_collection() {
        let what = match ty {
            Type::Struct { .. } => "struct",
            Type::Array { .. } => "array",
            Type::Vector { .. } => "vector",
            _ => unreachable!(),
        };
        let ExprKind::List(elems) = &init.kind else {
            let from = init
                .get_type(ctx.symtab)
                .map(|t| t.to_string())
                .unwrap_or_else(|| "<error>".to_string());
            ctx.cx
                .diags
                .error(&init.pos, format!("Can't assign type \"{}\" to \"{}\".", from, ty));
            return Ok(());
        };
        let expected = ty.element_count().expect("collection element count");
        if elems.len() as u32 != expected {
            ctx.cx.diags.error(
                &init.pos,
                format!(
                    "Initializer for {} \"{}\" requires {} values; {} provided.",
                    what,
                    name,
                    expected,
                    elems.len()
                ),
            );
            return Ok(());
        }
        for (i, elem) in elems.iter().enumerate() {
            let ep = ctx.b.gep(lvalue, 0, i as u32, "element");
            let elem_ty = ty.element_type(i as u32).expect("collection element type");
            init_symbol(ep, name, &elem_ty, Some(elem), ctx)?;
        }
        return Ok(());
    }

    bail_lower!("unexpected type \"{}\" in initializer lowering", ty)
}

// =============================================================================
// If
// =============================================================================

fn emit_if(
    test: &Expr,
    then_stmts: Option<&Stmt>,
    else_stmts: Option<&Stmt>,
    coherent: bool,
    any_check: bool,
    pos: &SourcePos,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    // Bail quietly on anything an earlier error already broke.
    if ctx.current_basic_block().is_none() {
        return Ok(());
    }
    let Some(test_ty) = test.get_type(ctx.symtab) else {
        return Ok(());
    };

    ctx.set_debug_pos(pos);
    let is_uniform = test_ty.is_uniform();
    let Some(test_value) = emit_expr_value(test, ctx)? else {
        return Ok(());
    };

    if is_uniform {
        ctx.start_uniform_if();
        if coherent {
            ctx.cx.diags.warning(
                &test.pos,
                "Uniform condition supplied to \"cif\" statement.",
            );
        }

        // One branch on the scalar test; each side falls through to the
        // shared exit if it doesn't terminate on its own.
        let b_then = ctx.create_basic_block("if_then");
        let b_else = ctx.create_basic_block("if_else");
        let b_exit = ctx.create_basic_block("if_exit");
        ctx.cond_branch_inst(b_then, b_else, test_value);

        ctx.set_current_basic_block(b_then);
        emit_if_statements(then_stmts, "true", ctx)?;
        if ctx.current_basic_block().is_some() {
            ctx.branch_inst(b_exit);
        }

        ctx.set_current_basic_block(b_else);
        emit_if_statements(else_stmts, "false", ctx)?;
        if ctx.current_basic_block().is_some() {
            ctx.branch_inst(b_exit);
        }

        ctx.set_current_basic_block(b_exit);
        ctx.end_if();
        Ok(())
    } else {
        emit_varying_if(
            test_value,
            then_stmts,
            else_stmts,
            coherent,
            any_check,
            ctx,
        )
    }
}

/// Varying test: pick the lowering by what's known about the mask.
fn emit_varying_if(
    test_value: ValueId,
    then_stmts: Option<&Stmt>,
    else_stmts: Option<&Stmt>,
    coherent: bool,
    any_check: bool,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    let old_mask = ctx.get_internal_mask();
    let all_on = ctx.mask_all_on();

    if ctx.get_full_mask() == all_on {
        // The mask is all on statically; only the all-on specialization
        // is needed.
        let b_done = ctx.create_basic_block("cif_done");
        emit_mask_all_on(test_value, then_stmts, else_stmts, b_done, ctx)?;
        ctx.set_current_basic_block(b_done);
        return Ok(());
    }

    if coherent {
        // Can't tell at compile time; dispatch at runtime between the
        // all-on and mixed specializations.
        let b_all = ctx.create_basic_block("cif_mask_all");
        let b_mixed = ctx.create_basic_block("cif_mask_mixed");
        let b_done = ctx.create_basic_block("cif_done");

        let full = ctx.get_full_mask();
        let all_q = ctx.all(full);
        ctx.cond_branch_inst(b_all, b_mixed, all_q);

        ctx.set_current_basic_block(b_all);
        emit_mask_all_on(test_value, then_stmts, else_stmts, b_done, ctx)?;

        ctx.set_current_basic_block(b_mixed);
        emit_mask_mixed(old_mask, test_value, then_stmts, else_stmts, b_done, ctx)?;

        ctx.set_current_basic_block(b_done);
        return Ok(());
    }

    if then_stmts.is_none() && else_stmts.is_none() {
        return Ok(());
    }

    // For cheap branches that can't misbehave under an empty mask, run
    // both sides straight-line with blend stores; the mask checks would
    // cost more than the work they skip. The safety analysis keeps
    // data-dependent accesses like `if (i < n) a[i] = 0;` out of this
    // path.
    let safe = safe_to_run_with_all_lanes_off(then_stmts, ctx.symtab)
        && safe_to_run_with_all_lanes_off(else_stmts, ctx.symtab);
    let cost = then_stmts
        .map(|s| estimate_stmt_cost(s, ctx.symtab, &ctx.cx.opts))
        .unwrap_or(0)
        + else_stmts
            .map(|s| estimate_stmt_cost(s, ctx.symtab, &ctx.cx.opts))
            .unwrap_or(0);
    if safe && cost < PREDICATE_SAFE_IF_STATEMENT_COST {
        debug!("predicating safe varying if (cost {})", cost);
        ctx.start_varying_if(old_mask);
        emit_masked_true_and_false(old_mask, test_value, then_stmts, else_stmts, ctx)?;
        assert!(ctx.current_basic_block().is_some());
        ctx.end_if();
        return Ok(());
    }

    assert!(any_check);
    let b_done = ctx.create_basic_block("if_done");
    emit_mask_mixed(old_mask, test_value, then_stmts, else_stmts, b_done, ctx)?;
    ctx.set_current_basic_block(b_done);
    Ok(())
}

/// Both sides, unconditionally, under complementary masks.
fn emit_masked_true_and_false(
    old_mask: ValueId,
    test_value: ValueId,
    then_stmts: Option<&Stmt>,
    else_stmts: Option<&Stmt>,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    if then_stmts.is_some() {
        ctx.set_internal_mask_and(old_mask, test_value);
        emit_if_statements(then_stmts, "if: expr mixed, true statements", ctx)?;
        // Under varying control flow, returns can't end emission.
        assert!(ctx.current_basic_block().is_some());
    }
    if else_stmts.is_some() {
        ctx.set_internal_mask_and_not(old_mask, test_value);
        emit_if_statements(else_stmts, "if: expr mixed, false statements", ctx)?;
        assert!(ctx.current_basic_block().is_some());
    }
    Ok(())
}

/// The mask is known all on entering the `if`; specialize on the test:
/// all-true runs just the then side, all-false just the else side, and
/// only genuinely mixed tests pay for masked execution of both.
fn emit_mask_all_on(
    test_value: ValueId,
    then_stmts: Option<&Stmt>,
    else_stmts: Option<&Stmt>,
    b_done: crate::ir::BlockId,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    // Store all-on into the mask explicitly: its value doesn't change,
    // but downstream emission sees a compile-time all-on constant.
    let all_on = ctx.mask_all_on();
    ctx.set_internal_mask(all_on);
    let old_function_mask = ctx.get_function_mask();
    ctx.set_function_mask(all_on);

    let b_test_all = ctx.create_basic_block("cif_test_all");
    let b_test_none_check = ctx.create_basic_block("cif_test_none_check");
    let all_q = ctx.all(test_value);
    ctx.cond_branch_inst(b_test_all, b_test_none_check, all_q);

    ctx.set_current_basic_block(b_test_all);
    ctx.start_varying_if(all_on);
    emit_if_statements(then_stmts, "if: all on mask, expr all true", ctx)?;
    ctx.end_if();
    if ctx.current_basic_block().is_some() {
        // The block may have ended already: with every lane following
        // this path, a return/break/continue can actually jump.
        ctx.branch_inst(b_done);
    }

    ctx.set_current_basic_block(b_test_none_check);
    let b_test_none = ctx.create_basic_block("cif_test_none");
    let b_test_mixed = ctx.create_basic_block("cif_test_mixed");
    let any_q = ctx.any(test_value);
    ctx.cond_branch_inst(b_test_mixed, b_test_none, any_q);

    ctx.set_current_basic_block(b_test_none);
    ctx.start_varying_if(all_on);
    emit_if_statements(else_stmts, "if: all on mask, expr all false", ctx)?;
    ctx.end_if();
    if ctx.current_basic_block().is_some() {
        ctx.branch_inst(b_done);
    }

    ctx.set_current_basic_block(b_test_mixed);
    ctx.start_varying_if(all_on);
    emit_masked_true_and_false(all_on, test_value, then_stmts, else_stmts, ctx)?;
    assert!(ctx.current_basic_block().is_some());
    ctx.end_if();
    ctx.branch_inst(b_done);

    ctx.set_current_basic_block(b_done);
    ctx.set_function_mask(old_function_mask);
    Ok(())
}

/// The mask is (or may be) mixed: gate each side on `any(full_mask)` so
/// whole branches are skipped when no lane wants them.
fn emit_mask_mixed(
    old_mask: ValueId,
    test_value: ValueId,
    then_stmts: Option<&Stmt>,
    else_stmts: Option<&Stmt>,
    b_done: crate::ir::BlockId,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    ctx.start_varying_if(old_mask);
    let mut b_next = ctx.create_basic_block("safe_if_after_true");

    if then_stmts.is_some() {
        let b_run_true = ctx.create_basic_block("safe_if_run_true");
        ctx.set_internal_mask_and(old_mask, test_value);
        ctx.branch_if_mask_any(b_run_true, b_next);

        ctx.set_current_basic_block(b_run_true);
        emit_if_statements(then_stmts, "if: expr mixed, true statements", ctx)?;
        assert!(ctx.current_basic_block().is_some());
        ctx.branch_inst(b_next);
        ctx.set_current_basic_block(b_next);
    }

    if else_stmts.is_some() {
        let b_run_false = ctx.create_basic_block("safe_if_run_false");
        b_next = ctx.create_basic_block("safe_if_after_false");
        ctx.set_internal_mask_and_not(old_mask, test_value);
        ctx.branch_if_mask_any(b_run_false, b_next);

        ctx.set_current_basic_block(b_run_false);
        emit_if_statements(else_stmts, "if: expr mixed, false statements", ctx)?;
        assert!(ctx.current_basic_block().is_some());
        ctx.branch_inst(b_next);
        ctx.set_current_basic_block(b_next);
    }

    ctx.branch_inst(b_done);
    ctx.set_current_basic_block(b_done);
    ctx.end_if();
    Ok(())
}

// =============================================================================
// Loops
// =============================================================================

fn emit_do(
    test: &Expr,
    body: Option<&Stmt>,
    coherent: bool,
    pos: &SourcePos,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    if ctx.current_basic_block().is_none() {
        return Ok(());
    }
    let Some(test_ty) = test.get_type(ctx.symtab) else {
        return Ok(());
    };

    let uniform_test = test_ty.is_uniform();
    if uniform_test && coherent {
        ctx.cx
            .diags
            .warning(pos, "Uniform condition supplied to \"cdo\" statement.");
    }

    let b_loop = ctx.create_basic_block("do_loop");
    let b_exit = ctx.create_basic_block("do_exit");
    let b_test = ctx.create_basic_block("do_test");

    ctx.start_loop(b_exit, b_test, uniform_test);

    // Straight into the body; `do` tests at the bottom.
    ctx.branch_inst(b_loop);
    ctx.set_current_basic_block(b_loop);
    let entry_mask = ctx.get_internal_mask();
    ctx.set_loop_mask(entry_mask);
    ctx.set_debug_pos(pos);

    let wrap = body.map(|b| !b.is_list()).unwrap_or(true);
    if wrap {
        ctx.start_scope();
    }
    ctx.add_instrumentation_point("do loop body");

    if coherent && !uniform_test {
        let b_all_on = ctx.create_basic_block("do_all_on");
        let b_mixed = ctx.create_basic_block("do_mixed");
        ctx.branch_if_mask_all(b_all_on, b_mixed);

        // All lanes running: make that visible to downstream emission by
        // pinning both masks to the all-on constant for the body.
        ctx.set_current_basic_block(b_all_on);
        let all_on = ctx.mask_all_on();
        ctx.set_internal_mask(all_on);
        let old_function_mask = ctx.get_function_mask();
        ctx.set_function_mask(all_on);
        if let Some(body) = body {
            emit_stmt(body, ctx)?;
        }
        assert!(ctx.current_basic_block().is_some());
        ctx.set_function_mask(old_function_mask);
        ctx.branch_inst(b_test);

        ctx.set_current_basic_block(b_mixed);
        ctx.set_internal_mask(entry_mask);
        if let Some(body) = body {
            emit_stmt(body, ctx)?;
        }
        assert!(ctx.current_basic_block().is_some());
        ctx.branch_inst(b_test);
    } else {
        if let Some(body) = body {
            emit_stmt(body, ctx)?;
        }
        if ctx.current_basic_block().is_some() {
            ctx.branch_inst(b_test);
        }
    }
    if wrap {
        ctx.end_scope();
    }

    ctx.set_current_basic_block(b_test);
    // Lanes that continued sit out only the remainder of the iteration;
    // bring them back before testing. Uniform loops jump on continue and
    // never touch the mask.
    if !uniform_test {
        ctx.restore_continued_lanes();
    }
    let Some(test_value) = emit_expr_value(test, ctx)? else {
        ctx.end_loop();
        return Ok(());
    };

    if uniform_test {
        ctx.cond_branch_inst(b_loop, b_exit, test_value);
    } else {
        // Fold the test into the mask; loop while any lane is live.
        let mask = ctx.get_internal_mask();
        ctx.set_internal_mask_and(mask, test_value);
        ctx.branch_if_mask_any(b_loop, b_exit);
    }

    ctx.set_current_basic_block(b_exit);
    ctx.end_loop();
    Ok(())
}

fn emit_for(
    init: Option<&Stmt>,
    test: Option<&Expr>,
    step: Option<&Stmt>,
    body: Option<&Stmt>,
    coherent: bool,
    pos: &SourcePos,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    if ctx.current_basic_block().is_none() {
        return Ok(());
    }

    let b_test = ctx.create_basic_block("for_test");
    let b_step = ctx.create_basic_block("for_step");
    let b_loop = ctx.create_basic_block("for_loop");
    let b_exit = ctx.create_basic_block("for_exit");

    let uniform_test = match test {
        Some(t) => t
            .get_type(ctx.symtab)
            .map(|ty| ty.is_uniform())
            .unwrap_or(true),
        None => {
            !ctx.cx.opts.disable_uniform_control_flow
                && !crate::mask_analysis::has_varying_break_or_continue(body, ctx.symtab)
        }
    };

    ctx.start_loop(b_exit, b_step, uniform_test);
    ctx.set_debug_pos(pos);

    // The init opens a scope that encloses the whole loop, since it may
    // declare the induction variable.
    if let Some(init) = init {
        assert!(!init.is_list());
        ctx.start_scope();
        emit_stmt(init, ctx)?;
    }
    ctx.branch_inst(b_test);

    ctx.set_current_basic_block(b_test);
    let test_value = match test {
        Some(t) => match emit_expr_value(t, ctx)? {
            Some(v) => v,
            None => {
                if init.is_some() {
                    ctx.end_scope();
                }
                ctx.end_loop();
                return Ok(());
            }
        },
        // No test: always true.
        None => {
            if uniform_test {
                ctx.b.const_bool(true)
            } else {
                ctx.mask_all_on()
            }
        }
    };

    if uniform_test {
        if coherent {
            ctx.cx
                .diags
                .warning(pos, "Uniform condition supplied to \"cfor\"/\"cwhile\" statement.");
        }
        ctx.cond_branch_inst(b_loop, b_exit, test_value);
    } else {
        let mask = ctx.get_internal_mask();
        ctx.set_internal_mask_and(mask, test_value);
        ctx.branch_if_mask_any(b_loop, b_exit);
    }

    ctx.set_current_basic_block(b_loop);
    let entry_mask = ctx.get_internal_mask();
    ctx.set_loop_mask(entry_mask);
    ctx.add_instrumentation_point("for loop body");
    let wrap = body.map(|b| !b.is_list()).unwrap_or(true);
    if wrap {
        ctx.start_scope();
    }

    if coherent && !uniform_test {
        let b_all_on = ctx.create_basic_block("for_all_on");
        let b_mixed = ctx.create_basic_block("for_mixed");
        ctx.branch_if_mask_all(b_all_on, b_mixed);

        ctx.set_current_basic_block(b_all_on);
        let all_on = ctx.mask_all_on();
        ctx.set_internal_mask(all_on);
        let old_function_mask = ctx.get_function_mask();
        ctx.set_function_mask(all_on);
        if let Some(body) = body {
            emit_stmt(body, ctx)?;
        }
        assert!(ctx.current_basic_block().is_some());
        ctx.set_function_mask(old_function_mask);
        ctx.branch_inst(b_step);

        // Never entered with the mask all off; the any() at the test
        // guarantees at least one live lane.
        ctx.set_current_basic_block(b_mixed);
        ctx.set_internal_mask(entry_mask);
        if let Some(body) = body {
            emit_stmt(body, ctx)?;
        }
        assert!(ctx.current_basic_block().is_some());
        ctx.branch_inst(b_step);
    } else {
        if let Some(body) = body {
            emit_stmt(body, ctx)?;
        }
        if ctx.current_basic_block().is_some() {
            ctx.branch_inst(b_step);
        }
    }
    if wrap {
        ctx.end_scope();
    }

    ctx.set_current_basic_block(b_step);
    ctx.restore_continued_lanes();
    if let Some(step) = step {
        emit_stmt(step, ctx)?;
    }
    ctx.branch_inst(b_test);

    ctx.set_current_basic_block(b_exit);
    if init.is_some() {
        ctx.end_scope();
    }
    ctx.end_loop();
    Ok(())
}

// =============================================================================
// Print
// =============================================================================

/// Character coding an atomic type for the runtime's `__do_print`; case
/// carries uniform (lower) vs varying (upper). The decoder in the
/// runtime library must agree with this table.
fn encode_print_type(ty: &Type) -> Option<char> {
    use crate::types::AtomicKind::*;
    use crate::types::Variability;
    let Type::Atomic {
        kind, variability, ..
    } = ty
    else {
        return None;
    };
    let c = match kind {
        Bool => 'b',
        Int32 => 'i',
        UInt32 => 'u',
        Float => 'f',
        Int64 => 'l',
        UInt64 => 'v',
        Double => 'd',
        // 8/16-bit values were widened before encoding.
        Int8 | UInt8 | Int16 | UInt16 => return None,
    };
    Some(match variability {
        Variability::Uniform => c,
        Variability::Varying => c.to_ascii_uppercase(),
    })
}

/// Evaluate one `print` argument into fresh stack storage and hand back
/// an opaque pointer to it, appending its type code to `arg_types`.
fn process_print_arg(
    expr: &Expr,
    arg_types: &mut String,
    ctx: &mut FunctionEmitContext,
) -> Result<Option<ValueId>> {
    let Some(mut ty) = expr.get_type(ctx.symtab) else {
        return Ok(None);
    };
    let mut expr = expr.clone();

    // Print sees through references.
    if let Type::Reference { target } = ty {
        ty = *target;
        let pos = expr.pos.clone();
        expr = Expr::new(ExprKind::Deref(Box::new(expr)), pos);
    }

    // 8- and 16-bit integers ride as 32-bit.
    if let Type::Atomic {
        kind, variability, ..
    } = &ty
    {
        if kind.is_small_integer() {
            let to = Type::atomic(crate::types::AtomicKind::Int32, *variability);
            let pos = expr.pos.clone();
            expr = Expr::new(
                ExprKind::Cast {
                    to: to.clone(),
                    expr: Box::new(expr),
                },
                pos,
            );
            ty = to;
        }
    }

    let Some(code) = encode_print_type(&ty.as_non_const()) else {
        ctx.cx.diags.error(
            &expr.pos,
            format!(
                "Only atomic types are allowed in print statements; type \"{}\" is illegal.",
                ty
            ),
        );
        return Ok(None);
    };
    arg_types.push(code);

    let Some(ir_ty) = ty.lowered(&ctx.cx.target) else {
        bail_lower!("print argument type \"{}\" has no lowered form", ty);
    };
    let slot = ctx.b.alloca(ir_ty, "print_arg");
    let Some(v) = emit_expr_value(&expr, ctx)? else {
        return Ok(None);
    };
    ctx.b.store(v, slot);
    Ok(Some(ctx.b.bitcast(slot, IrType::byte_ptr())))
}

/// `print(format, values)` becomes a call to the runtime's
/// `__do_print(format, typeString, vectorWidth, laneMask, argArray)`,
/// with each value parked in its own stack slot and an array of opaque
/// pointers to those slots.
fn emit_print(
    format: &str,
    values: Option<&Expr>,
    pos: &SourcePos,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    ctx.set_debug_pos(pos);

    let mut arg_types = String::new();
    let arg_array = match values {
        None => {
            let null_ty = IrType::byte_ptr().ptr_to();
            ctx.b.zero(null_ty)
        }
        Some(values) => {
            let exprs: Vec<&Expr> = match &values.kind {
                ExprKind::List(es) => es.iter().collect(),
                _ => vec![values],
            };
            let array_ty = IrType::Array {
                elem: Box::new(IrType::byte_ptr()),
                count: exprs.len() as u32,
            };
            let array = ctx.b.alloca(array_ty, "print_arg_ptrs");
            for (i, e) in exprs.into_iter().enumerate() {
                let Some(ptr) = process_print_arg(e, &mut arg_types, ctx)? else {
                    return Ok(());
                };
                let slot = ctx.b.gep(array, 0, i as u32, "arg_ptr");
                ctx.b.store(ptr, slot);
            }
            ctx.b.bitcast(array, IrType::byte_ptr().ptr_to())
        }
    };

    let format_ptr = ctx.b.string_ptr(format);
    let types_ptr = ctx.b.string_ptr(arg_types);
    let width = ctx.b.const_i32(ctx.vector_width() as i32);
    let full = ctx.get_full_mask();
    let lanes = ctx.b.lane_mask(full);
    ctx.b.call(
        "__do_print",
        vec![format_ptr, types_ptr, width, lanes, arg_array],
        "",
        IrType::Void,
    );
    Ok(())
}

// =============================================================================
// Assert
// =============================================================================

/// `assert(cond)` calls the runtime's uniform or varying assert helper
/// with a prebuilt `"<file>:<line>:<column>: Assertion failed: <msg>\n"`
/// string, the test value, and the current lane mask. Deliberately never
/// emitted predicated: a masked-off lane must not fire an assertion.
fn emit_assert(
    message: &str,
    test: &Expr,
    pos: &SourcePos,
    ctx: &mut FunctionEmitContext,
) -> Result<()> {
    let Some(ty) = test.get_type(ctx.symtab) else {
        return Ok(());
    };
    ctx.set_debug_pos(pos);

    let assert_func = if ty.is_uniform() {
        "__do_assert_uniform"
    } else {
        "__do_assert_varying"
    };
    let error_string = format!(
        "{}:{}:{}: Assertion failed: {}\n",
        pos.file, pos.line, pos.col, message
    );
    let msg_ptr = ctx.b.string_ptr(error_string);
    let Some(test_value) = emit_expr_value(test, ctx)? else {
        return Ok(());
    };
    let full = ctx.get_full_mask();
    let lanes = ctx.b.lane_mask(full);
    ctx.b
        .call(assert_func, vec![msg_ptr, test_value, lanes], "", IrType::Void);
    Ok(())
}
