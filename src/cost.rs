//! Heuristic cost model for statements and expressions.
//!
//! The absolute numbers are tuning parameters; only their relative
//! ordering matters. The one consumer that treats them as more than a
//! sort key is the if-statement lowering, which predicates both branches
//! of a varying `if` when their combined cost stays under
//! [`PREDICATE_SAFE_IF_STATEMENT_COST`].

use crate::ast::{Expr, ExprKind, Stmt, StmtKind};
use crate::mask_analysis::has_varying_break_or_continue;
use crate::sym::SymbolTable;
use crate::OptFlags;

pub const COST_SIMPLE_ARITH_LOGIC_OP: i32 = 1;
pub const COST_LOAD_STORE: i32 = 1;
pub const COST_UNIFORM_IF: i32 = 2;
pub const COST_VARYING_IF: i32 = 4;
pub const COST_UNIFORM_LOOP: i32 = 4;
pub const COST_VARYING_LOOP: i32 = 8;
pub const COST_REGULAR_BREAK_CONTINUE: i32 = 1;
pub const COST_COHERENT_BREAK_CONTINUE: i32 = 4;
pub const COST_RETURN: i32 = 4;
pub const COST_FUNCALL: i32 = 8;
pub const COST_ASSERT: i32 = 8;

/// Branch-cost ceiling below which a safe varying `if` runs both sides
/// predicated instead of branching around them.
pub const PREDICATE_SAFE_IF_STATEMENT_COST: i32 = 8;

pub fn estimate_expr_cost(expr: &Expr) -> i32 {
    match &expr.kind {
        ExprKind::Const { .. }
        | ExprKind::Symbol(_)
        | ExprKind::FunctionSymbol { .. }
        | ExprKind::Sync => 0,
        ExprKind::Unary { operand, .. } => COST_SIMPLE_ARITH_LOGIC_OP + estimate_expr_cost(operand),
        ExprKind::Binary { lhs, rhs, .. } => {
            COST_SIMPLE_ARITH_LOGIC_OP + estimate_expr_cost(lhs) + estimate_expr_cost(rhs)
        }
        ExprKind::Assign { lhs, rhs } => {
            COST_LOAD_STORE + estimate_expr_cost(lhs) + estimate_expr_cost(rhs)
        }
        ExprKind::Select {
            test,
            if_true,
            if_false,
        } => {
            COST_SIMPLE_ARITH_LOGIC_OP
                + estimate_expr_cost(test)
                + estimate_expr_cost(if_true)
                + estimate_expr_cost(if_false)
        }
        ExprKind::List(exprs) => exprs.iter().map(estimate_expr_cost).sum(),
        ExprKind::Call { callee, args } => {
            COST_FUNCALL + estimate_expr_cost(callee) + args.iter().map(estimate_expr_cost).sum::<i32>()
        }
        ExprKind::Index { base, index } => {
            COST_LOAD_STORE + estimate_expr_cost(base) + estimate_expr_cost(index)
        }
        ExprKind::Member { base, .. } => estimate_expr_cost(base),
        ExprKind::Deref(inner) => COST_LOAD_STORE + estimate_expr_cost(inner),
        ExprKind::Ref(inner) => estimate_expr_cost(inner),
        ExprKind::Cast { expr, .. } => COST_SIMPLE_ARITH_LOGIC_OP + estimate_expr_cost(expr),
    }
}

fn cost_opt_expr(e: &Option<Expr>) -> i32 {
    e.as_ref().map(estimate_expr_cost).unwrap_or(0)
}

fn cost_opt_stmt(s: Option<&Stmt>, symtab: &SymbolTable, opts: &OptFlags) -> i32 {
    s.map(|s| estimate_stmt_cost(s, symtab, opts)).unwrap_or(0)
}

pub fn estimate_stmt_cost(stmt: &Stmt, symtab: &SymbolTable, opts: &OptFlags) -> i32 {
    match &stmt.kind {
        StmtKind::Expr(e) => cost_opt_expr(e),

        StmtKind::Decl(vars) => vars.iter().map(|v| cost_opt_expr(&v.init)).sum(),

        StmtKind::If {
            test,
            then_stmts,
            else_stmts,
            ..
        } => {
            let if_cost = match test.get_type(symtab) {
                Some(t) if t.is_uniform() => COST_UNIFORM_IF,
                Some(_) => COST_VARYING_IF,
                None => 0,
            };
            if_cost
                + estimate_expr_cost(test)
                + cost_opt_stmt(then_stmts.as_deref(), symtab, opts)
                + cost_opt_stmt(else_stmts.as_deref(), symtab, opts)
        }

        StmtKind::Do { test, body, .. } => {
            let loop_cost = match test.get_type(symtab) {
                Some(t) if t.is_uniform() => COST_UNIFORM_LOOP,
                Some(_) => COST_VARYING_LOOP,
                None => 0,
            };
            loop_cost
                + estimate_expr_cost(test)
                + cost_opt_stmt(body.as_deref(), symtab, opts)
        }

        StmtKind::For {
            init,
            test,
            step,
            body,
            ..
        } => {
            // Before type-check has pinned the test's type, mirror its
            // decision procedure for a missing test.
            let uniform = match test {
                Some(t) => t
                    .get_type(symtab)
                    .map(|ty| ty.is_uniform())
                    .unwrap_or(true),
                None => {
                    !opts.disable_uniform_control_flow
                        && !has_varying_break_or_continue(body.as_deref(), symtab)
                }
            };
            let loop_cost = if uniform {
                COST_UNIFORM_LOOP
            } else {
                COST_VARYING_LOOP
            };
            loop_cost
                + cost_opt_stmt(init.as_deref(), symtab, opts)
                + cost_opt_expr(test)
                + cost_opt_stmt(step.as_deref(), symtab, opts)
                + cost_opt_stmt(body.as_deref(), symtab, opts)
        }

        StmtKind::Break { coherent } | StmtKind::Continue { coherent } => {
            if *coherent {
                COST_COHERENT_BREAK_CONTINUE
            } else {
                COST_REGULAR_BREAK_CONTINUE
            }
        }

        StmtKind::Return { value, .. } => COST_RETURN + cost_opt_expr(value),

        StmtKind::List(stmts) => stmts
            .iter()
            .map(|s| estimate_stmt_cost(s, symtab, opts))
            .sum(),

        StmtKind::Print { values, .. } => COST_FUNCALL + cost_opt_expr(values),

        StmtKind::Assert { test, .. } => COST_ASSERT + estimate_expr_cost(test),
    }
}
