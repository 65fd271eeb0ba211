//! Statement type checking.
//!
//! The front end delivers expressions already typed; this pass enforces
//! the statement-level rules: every `if`/loop/`assert` test becomes
//! exactly `uniform bool` or `varying bool` (with an inserted cast),
//! atomic and enum declarations get their initializers converted to the
//! declared type, and loops whose body can break or continue under
//! varying control flow are demoted to varying tests so that lowering
//! emits lane management.
//!
//! Failure protocol: an error is recorded in the diagnostic sink and the
//! offending statement's check returns `None`; the caller drops it.
//! Inside a statement list, a failed child never poisons its siblings.

use log::debug;

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::error::Result;
use crate::mask_analysis::has_varying_break_or_continue;
use crate::sym::SymbolTable;
use crate::types::Type;
use crate::CompileContext;

/// Check a whole function body. Failed statements are dropped so their
/// siblings still get checked; the driver gets a single error summing
/// up how many were lost.
pub fn check_stmts(
    stmts: Vec<Stmt>,
    symtab: &mut SymbolTable,
    cx: &mut CompileContext,
) -> Result<Vec<Stmt>> {
    let checked: Vec<_> = stmts
        .into_iter()
        .filter_map(|s| check_stmt(s, symtab, cx))
        .collect();
    if cx.diags.has_errors() {
        Err(crate::err_type!(
            "{} error(s) during statement type checking",
            cx.diags.error_count()
        ))
    } else {
        Ok(checked)
    }
}

/// Silent variant of [`type_convert_expr`]: `None` simply means "not
/// convertible", with no diagnostic. The declaration lowering probes
/// with this before deciding which of its own errors applies.
pub fn try_type_convert_expr(expr: Expr, to: &Type, symtab: &SymbolTable) -> Option<Expr> {
    let from = expr.get_type(symtab)?;
    if &from == to {
        return Some(expr);
    }
    if from.is_varying() && to.is_uniform() {
        return None;
    }
    if !((from.is_atomic() || from.is_enum()) && (to.is_atomic() || to.is_enum())) {
        return None;
    }
    let pos = expr.pos.clone();
    Some(Expr::new(
        ExprKind::Cast {
            to: to.clone(),
            expr: Box::new(expr),
        },
        pos,
    ))
}

/// Convert `expr` to `to`, inserting a cast if needed. `None` means the
/// conversion is impossible; the error has been recorded.
pub fn type_convert_expr(
    expr: Expr,
    to: &Type,
    reason: &str,
    symtab: &SymbolTable,
    cx: &mut CompileContext,
) -> Option<Expr> {
    let Some(from) = expr.get_type(symtab) else {
        // Untyped subtree; an earlier pass already complained.
        return None;
    };
    let pos = expr.pos.clone();
    match try_type_convert_expr(expr, to, symtab) {
        Some(converted) => Some(converted),
        None => {
            cx.diags.error(
                &pos,
                format!(
                    "Can't convert type \"{}\" to \"{}\" for {}.",
                    from, to, reason
                ),
            );
            None
        }
    }
}

/// Coerce a control-flow test to boolean with the given variability.
/// `what` names the construct for the diagnostic.
fn coerce_test_to_bool(
    test: Expr,
    uniform: bool,
    what: &str,
    symtab: &SymbolTable,
    cx: &mut CompileContext,
) -> Option<Expr> {
    let Some(ty) = test.get_type(symtab) else {
        return None;
    };
    if !ty.is_numeric() && !ty.is_bool() {
        cx.diags.error(
            &test.pos,
            format!(
                "Type \"{}\" can't be converted to boolean for {}.",
                ty, what
            ),
        );
        return None;
    }
    let to = if uniform {
        Type::uniform_bool()
    } else {
        Type::varying_bool()
    };
    let pos = test.pos.clone();
    Some(Expr::new(
        ExprKind::Cast {
            to,
            expr: Box::new(test),
        },
        pos,
    ))
}

/// Expression type checking is the front end's job; here we only recurse
/// so that statement-level rewrites (like test coercion) see a stable
/// tree, and bail on subtrees an earlier error left untyped.
fn check_expr(expr: Expr, symtab: &SymbolTable, _cx: &mut CompileContext) -> Option<Expr> {
    if expr.is_list() || expr.get_type(symtab).is_some() {
        Some(expr)
    } else {
        None
    }
}

fn check_opt_box(
    s: Option<Box<Stmt>>,
    symtab: &mut SymbolTable,
    cx: &mut CompileContext,
) -> Option<Box<Stmt>> {
    s.and_then(|s| check_stmt(*s, symtab, cx).map(Box::new))
}

/// Type-check one statement. `None` is the failure sentinel: the error
/// has been recorded and the caller should drop the statement.
pub fn check_stmt(stmt: Stmt, symtab: &mut SymbolTable, cx: &mut CompileContext) -> Option<Stmt> {
    let pos = stmt.pos.clone();
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(match e {
            Some(e) => Some(check_expr(e, symtab, cx)?),
            None => None,
        }),

        StmtKind::Decl(vars) => {
            let mut encountered_error = false;
            let vars: Vec<_> = vars
                .into_iter()
                .map(|mut var| {
                    let Some(init) = var.init.take() else {
                        return var;
                    };
                    let Some(init) = check_expr(init, symtab, cx) else {
                        encountered_error = true;
                        return var;
                    };
                    // Convert atomic/enum initializers to the declared type
                    // here so that `const float f = 2;` captures 2.0f, not 2.
                    // A brace list for an atomic is an error, but that error
                    // is reported at lowering time; leave the list alone so
                    // it is in fact caught there.
                    let ty = symtab.get(var.sym).ty.clone();
                    if (ty.is_atomic() || ty.is_enum()) && !init.is_list() {
                        match type_convert_expr(init, &ty, "initializer", symtab, cx) {
                            Some(converted) => var.init = Some(converted),
                            None => encountered_error = true,
                        }
                    } else {
                        var.init = Some(init);
                    }
                    var
                })
                .collect();
            if encountered_error {
                return None;
            }
            StmtKind::Decl(vars)
        }

        StmtKind::If {
            test,
            then_stmts,
            else_stmts,
            coherent,
            any_check,
        } => {
            let test = check_expr(test, symtab, cx)?;
            let uniform = test
                .get_type(symtab)
                .map(|t| t.is_uniform() && !cx.opts.disable_uniform_control_flow)
                .unwrap_or(false);
            let test = coerce_test_to_bool(test, uniform, "\"if\" test", symtab, cx)?;
            // A failed branch is dropped without failing the whole `if`.
            StmtKind::If {
                test,
                then_stmts: check_opt_box(then_stmts, symtab, cx),
                else_stmts: check_opt_box(else_stmts, symtab, cx),
                coherent,
                any_check,
            }
        }

        StmtKind::Do {
            test,
            body,
            coherent,
        } => {
            let test = check_expr(test, symtab, cx)?;
            // The loop test may stay uniform only if nothing in the body
            // breaks or continues under varying control flow; otherwise
            // the generated loop must manage lanes, which means a varying
            // test.
            let uniform = test
                .get_type(symtab)
                .map(|t| {
                    t.is_uniform()
                        && !cx.opts.disable_uniform_control_flow
                        && !has_varying_break_or_continue(body.as_deref(), symtab)
                })
                .unwrap_or(false);
            if !uniform {
                debug!("do loop at {} lowered with varying test", pos);
            }
            let test = coerce_test_to_bool(test, uniform, "\"while\" test in \"do\" loop", symtab, cx)?;
            StmtKind::Do {
                test,
                body: check_opt_box(body, symtab, cx),
                coherent,
            }
        }

        StmtKind::For {
            init,
            test,
            step,
            body,
            coherent,
        } => {
            let test = match test {
                Some(test) => {
                    let test = check_expr(test, symtab, cx)?;
                    let uniform = test
                        .get_type(symtab)
                        .map(|t| {
                            t.is_uniform()
                                && !cx.opts.disable_uniform_control_flow
                                && !has_varying_break_or_continue(body.as_deref(), symtab)
                        })
                        .unwrap_or(false);
                    Some(coerce_test_to_bool(
                        test,
                        uniform,
                        "\"for\" loop test",
                        symtab,
                        cx,
                    )?)
                }
                None => None,
            };
            StmtKind::For {
                init: check_opt_box(init, symtab, cx),
                test,
                step: check_opt_box(step, symtab, cx),
                body: check_opt_box(body, symtab, cx),
                coherent,
            }
        }

        kind @ (StmtKind::Break { .. } | StmtKind::Continue { .. }) => kind,

        StmtKind::Return { value, coherent } => StmtKind::Return {
            value: match value {
                Some(v) => Some(check_expr(v, symtab, cx)?),
                None => None,
            },
            coherent,
        },

        StmtKind::List(stmts) => StmtKind::List(
            stmts
                .into_iter()
                .filter_map(|s| check_stmt(s, symtab, cx))
                .collect(),
        ),

        StmtKind::Print { format, values } => StmtKind::Print {
            format,
            values: match values {
                Some(v) => Some(check_expr(v, symtab, cx)?),
                None => None,
            },
        },

        StmtKind::Assert { message, test } => {
            let test = check_expr(test, symtab, cx)?;
            let uniform = test
                .get_type(symtab)
                .map(|t| t.is_uniform())
                .unwrap_or(false);
            let test = coerce_test_to_bool(test, uniform, "\"assert\"", symtab, cx)?;
            StmtKind::Assert { message, test }
        }
    };
    Some(Stmt::new(kind, pos))
}
