//! Structural analyses over statement trees that drive mask-aware
//! lowering decisions.
//!
//! Two questions are answered here, both conservatively:
//!
//! - [`safe_to_run_with_all_lanes_off`]: may this code be emitted
//!   unguarded, so that it executes even when the mask has no lanes on?
//!   Anything whose effects a naive lowering would make observable under
//!   an all-off mask (calls, data-dependent memory access, assertions)
//!   says no.
//! - [`has_varying_break_or_continue`]: does a loop body contain a
//!   `break`/`continue` reachable under varying control flow? If so, a
//!   loop with a uniform test still needs full lane management.

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::sym::SymbolTable;
use crate::types::Type;

/// Conservative check that an expression has no observable effect when
/// executed with the execution mask all off.
pub fn safe_to_run_with_all_lanes_off_expr(expr: &Expr, symtab: &SymbolTable) -> bool {
    match &expr.kind {
        ExprKind::Const { .. }
        | ExprKind::Symbol(_)
        | ExprKind::FunctionSymbol { .. }
        | ExprKind::Sync => true,

        ExprKind::Unary { operand, .. } => safe_to_run_with_all_lanes_off_expr(operand, symtab),
        ExprKind::Deref(inner) | ExprKind::Ref(inner) => {
            safe_to_run_with_all_lanes_off_expr(inner, symtab)
        }
        ExprKind::Member { base, .. } => safe_to_run_with_all_lanes_off_expr(base, symtab),
        ExprKind::Cast { expr: inner, .. } => safe_to_run_with_all_lanes_off_expr(inner, symtab),

        ExprKind::Binary { lhs, rhs, .. } => {
            safe_to_run_with_all_lanes_off_expr(lhs, symtab)
                && safe_to_run_with_all_lanes_off_expr(rhs, symtab)
        }
        ExprKind::Assign { lhs, rhs } => {
            safe_to_run_with_all_lanes_off_expr(lhs, symtab)
                && safe_to_run_with_all_lanes_off_expr(rhs, symtab)
        }
        ExprKind::Select {
            test,
            if_true,
            if_false,
        } => {
            safe_to_run_with_all_lanes_off_expr(test, symtab)
                && safe_to_run_with_all_lanes_off_expr(if_true, symtab)
                && safe_to_run_with_all_lanes_off_expr(if_false, symtab)
        }
        ExprKind::List(exprs) => exprs
            .iter()
            .all(|e| safe_to_run_with_all_lanes_off_expr(e, symtab)),

        // A called function might dereference, trap, or loop on the
        // assumption that some lane is live. Nothing here proves
        // otherwise, so calls are never safe.
        ExprKind::Call { .. } => false,

        ExprKind::Index { base, index } => {
            // Safe only when the access is provably in bounds: the base
            // is a sequential type of statically known size and every
            // lane's index is a compile-time constant within it.
            let Some(base_ty) = base.get_type(symtab) else {
                return false;
            };
            let Some(indices) = index.as_int32() else {
                return false;
            };
            let base_ty = match base_ty {
                Type::Reference { target } => *target,
                other => other,
            };
            assert!(
                base_ty.is_sequential(),
                "index into non-sequential type {} in all-lanes-off analysis",
                base_ty
            );
            let count = base_ty.element_count().unwrap_or(0);
            if count == 0 {
                // Unsized array; nothing is provable.
                return false;
            }
            indices.iter().all(|&i| i >= 0 && (i as u32) < count)
        }
    }
}

/// Statement-level companion of
/// [`safe_to_run_with_all_lanes_off_expr`]. An absent statement is
/// safe; an absent expression slot (a declaration without an
/// initializer, a test-less `for`, an argument-less `print`) is not.
/// The one exception is a value-less `return`, which is safe.
pub fn safe_to_run_with_all_lanes_off(stmt: Option<&Stmt>, symtab: &SymbolTable) -> bool {
    let Some(stmt) = stmt else {
        return true;
    };
    match &stmt.kind {
        StmtKind::Expr(e) => e
            .as_ref()
            .map(|e| safe_to_run_with_all_lanes_off_expr(e, symtab))
            .unwrap_or(false),

        StmtKind::Decl(vars) => vars.iter().all(|v| {
            v.init
                .as_ref()
                .map(|e| safe_to_run_with_all_lanes_off_expr(e, symtab))
                .unwrap_or(false)
        }),

        StmtKind::If {
            test,
            then_stmts,
            else_stmts,
            ..
        } => {
            safe_to_run_with_all_lanes_off_expr(test, symtab)
                && safe_to_run_with_all_lanes_off(then_stmts.as_deref(), symtab)
                && safe_to_run_with_all_lanes_off(else_stmts.as_deref(), symtab)
        }

        StmtKind::Do { test, body, .. } => {
            safe_to_run_with_all_lanes_off_expr(test, symtab)
                && safe_to_run_with_all_lanes_off(body.as_deref(), symtab)
        }

        StmtKind::For {
            init,
            test,
            step,
            body,
            ..
        } => {
            safe_to_run_with_all_lanes_off(init.as_deref(), symtab)
                && test
                    .as_ref()
                    .map(|e| safe_to_run_with_all_lanes_off_expr(e, symtab))
                    .unwrap_or(false)
                && safe_to_run_with_all_lanes_off(step.as_deref(), symtab)
                && safe_to_run_with_all_lanes_off(body.as_deref(), symtab)
        }

        StmtKind::Break { .. } | StmtKind::Continue { .. } => true,

        StmtKind::Return { value, .. } => value
            .as_ref()
            .map(|e| safe_to_run_with_all_lanes_off_expr(e, symtab))
            .unwrap_or(true),

        StmtKind::List(stmts) => stmts
            .iter()
            .all(|s| safe_to_run_with_all_lanes_off(Some(s), symtab)),

        StmtKind::Print { values, .. } => values
            .as_ref()
            .map(|e| safe_to_run_with_all_lanes_off_expr(e, symtab))
            .unwrap_or(false),

        // An assertion must not fire for lanes that were never meant to
        // execute it.
        StmtKind::Assert { .. } => false,
    }
}

/// Does `stmt` contain a `break` or `continue`, not enclosed by a nested
/// loop, whose nearest enclosing varying `if` lies within `stmt`?
///
/// Loops with a uniform test normally branch directly, without lane
/// management; that is wrong if some lanes may break out while others
/// keep going, which is exactly the case this detects.
pub fn has_varying_break_or_continue(stmt: Option<&Stmt>, symtab: &SymbolTable) -> bool {
    walk(stmt, false, symtab)
}

fn walk(stmt: Option<&Stmt>, in_varying_cf: bool, symtab: &SymbolTable) -> bool {
    let Some(stmt) = stmt else {
        return false;
    };
    match &stmt.kind {
        StmtKind::List(stmts) => stmts
            .iter()
            .any(|s| walk(Some(s), in_varying_cf, symtab)),

        StmtKind::If {
            test,
            then_stmts,
            else_stmts,
            ..
        } => {
            let varying = in_varying_cf
                || test
                    .get_type(symtab)
                    .map(|t| t.is_varying())
                    .unwrap_or(false);
            walk(then_stmts.as_deref(), varying, symtab)
                || walk(else_stmts.as_deref(), varying, symtab)
        }

        StmtKind::Break { .. } | StmtKind::Continue { .. } => in_varying_cf,

        // Jumps inside a nested loop target that loop, not this one, so
        // the recursion stops here. Everything else can't contain a
        // break/continue for this loop either.
        _ => false,
    }
}
