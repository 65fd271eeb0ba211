//! Constant folding over expressions and the statement-level optimize
//! pass.
//!
//! Folding is purely structural: operators over constant operands are
//! evaluated lane-wise at compile time, symbol references to captured
//! constants are inlined, and casts of constants convert eagerly. The
//! statement pass threads folding through every sub-expression and, for
//! `const`-qualified declarations whose folded initializer is a plain
//! constant of the declared type, captures the value on the symbol so
//! later folding can see through the name.

use log::debug;

use crate::ast::{BinaryOp, ConstValue, Expr, ExprKind, Stmt, StmtKind, UnaryOp};
use crate::sym::SymbolTable;

// =============================================================================
// Expression folding
// =============================================================================

/// Fold constants in an expression, bottom-up. Always returns a
/// structurally valid expression; nodes that cannot fold are rebuilt
/// with folded children.
pub fn fold_expr(expr: Expr, symtab: &SymbolTable) -> Expr {
    let pos = expr.pos.clone();
    let kind = match expr.kind {
        ExprKind::Symbol(id) => {
            let sym = symtab.get(id);
            match (&sym.const_value, sym.ty.is_const()) {
                (Some(value), true) => ExprKind::Const {
                    ty: sym.ty.as_non_const(),
                    value: value.clone(),
                },
                _ => ExprKind::Symbol(id),
            }
        }

        ExprKind::Unary { op, operand } => {
            let operand = Box::new(fold_expr(*operand, symtab));
            // ++/-- mutate their operand and are never folded; fold_unary
            // declines them.
            let folded = match &operand.kind {
                ExprKind::Const { ty, value } => fold_unary(op, value).map(|value| {
                    ExprKind::Const {
                        ty: ty.clone(),
                        value,
                    }
                }),
                _ => None,
            };
            folded.unwrap_or(ExprKind::Unary { op, operand })
        }

        ExprKind::Binary { op, lhs, rhs } => {
            let lhs = Box::new(fold_expr(*lhs, symtab));
            let rhs = Box::new(fold_expr(*rhs, symtab));
            let folded = match (&lhs.kind, &rhs.kind) {
                (
                    ExprKind::Const { ty: lt, value: lv },
                    ExprKind::Const { ty: rt, value: rv },
                ) => fold_binary(op, lv, rv).map(|value| {
                    let variability = lt.variability().max(rt.variability());
                    let ty = if op.is_bool_producing() {
                        crate::types::Type::atomic(crate::types::AtomicKind::Bool, variability)
                    } else {
                        lt.as_non_const().with_variability(variability)
                    };
                    ExprKind::Const { ty, value }
                }),
                _ => None,
            };
            folded.unwrap_or(ExprKind::Binary { op, lhs, rhs })
        }

        ExprKind::Assign { lhs, rhs } => ExprKind::Assign {
            lhs: Box::new(fold_expr(*lhs, symtab)),
            rhs: Box::new(fold_expr(*rhs, symtab)),
        },

        ExprKind::Select {
            test,
            if_true,
            if_false,
        } => {
            let test = Box::new(fold_expr(*test, symtab));
            let if_true = Box::new(fold_expr(*if_true, symtab));
            let if_false = Box::new(fold_expr(*if_false, symtab));
            if let ExprKind::Const {
                value: ConstValue::Bool(lanes),
                ..
            } = &test.kind
            {
                if lanes.iter().all(|&b| b) {
                    return *if_true;
                }
                if lanes.iter().all(|&b| !b) {
                    return *if_false;
                }
            }
            ExprKind::Select {
                test,
                if_true,
                if_false,
            }
        }

        ExprKind::List(exprs) => {
            ExprKind::List(exprs.into_iter().map(|e| fold_expr(e, symtab)).collect())
        }

        ExprKind::Call { callee, args } => ExprKind::Call {
            callee: Box::new(fold_expr(*callee, symtab)),
            args: args.into_iter().map(|e| fold_expr(e, symtab)).collect(),
        },

        ExprKind::Index { base, index } => ExprKind::Index {
            base: Box::new(fold_expr(*base, symtab)),
            index: Box::new(fold_expr(*index, symtab)),
        },

        ExprKind::Member { base, member } => ExprKind::Member {
            base: Box::new(fold_expr(*base, symtab)),
            member,
        },

        ExprKind::Deref(inner) => ExprKind::Deref(Box::new(fold_expr(*inner, symtab))),
        ExprKind::Ref(inner) => ExprKind::Ref(Box::new(fold_expr(*inner, symtab))),

        ExprKind::Cast { to, expr: inner } => {
            let inner = fold_expr(*inner, symtab);
            if let ExprKind::Const { value, .. } = &inner.kind {
                if let crate::types::Type::Atomic { kind, .. } = &to {
                    if let Some(converted) = value.convert_to(*kind) {
                        return Expr::new(
                            ExprKind::Const {
                                ty: to,
                                value: converted,
                            },
                            pos,
                        );
                    }
                }
            }
            ExprKind::Cast {
                to,
                expr: Box::new(inner),
            }
        }

        leaf @ (ExprKind::Const { .. } | ExprKind::FunctionSymbol { .. } | ExprKind::Sync) => leaf,
    };
    Expr::new(kind, pos)
}

fn fold_unary(op: UnaryOp, v: &ConstValue) -> Option<ConstValue> {
    match (op, v) {
        (UnaryOp::Negate, ConstValue::Int32(xs)) => {
            Some(ConstValue::Int32(xs.iter().map(|x| x.wrapping_neg()).collect()))
        }
        (UnaryOp::Negate, ConstValue::Int64(xs)) => {
            Some(ConstValue::Int64(xs.iter().map(|x| x.wrapping_neg()).collect()))
        }
        (UnaryOp::Negate, ConstValue::Float(xs)) => {
            Some(ConstValue::Float(xs.iter().map(|x| -x).collect()))
        }
        (UnaryOp::Negate, ConstValue::Double(xs)) => {
            Some(ConstValue::Double(xs.iter().map(|x| -x).collect()))
        }
        (UnaryOp::LogicalNot, ConstValue::Bool(xs)) => {
            Some(ConstValue::Bool(xs.iter().map(|x| !x).collect()))
        }
        (UnaryOp::BitNot, ConstValue::Int32(xs)) => {
            Some(ConstValue::Int32(xs.iter().map(|x| !x).collect()))
        }
        (UnaryOp::BitNot, ConstValue::UInt32(xs)) => {
            Some(ConstValue::UInt32(xs.iter().map(|x| !x).collect()))
        }
        (UnaryOp::BitNot, ConstValue::Int64(xs)) => {
            Some(ConstValue::Int64(xs.iter().map(|x| !x).collect()))
        }
        (UnaryOp::BitNot, ConstValue::UInt64(xs)) => {
            Some(ConstValue::UInt64(xs.iter().map(|x| !x).collect()))
        }
        _ => None,
    }
}

/// Pair lanes of two constants, broadcasting a one-lane side.
fn zip_lanes<T: Copy>(a: &[T], b: &[T]) -> Option<Vec<(T, T)>> {
    if a.len() == b.len() {
        Some(a.iter().copied().zip(b.iter().copied()).collect())
    } else if a.len() == 1 {
        Some(b.iter().map(|&y| (a[0], y)).collect())
    } else if b.len() == 1 {
        Some(a.iter().map(|&x| (x, b[0])).collect())
    } else {
        None
    }
}

macro_rules! int_fold {
    ($op:expr, $a:expr, $b:expr, $variant:ident) => {{
        let pairs = zip_lanes($a, $b)?;
        match $op {
            BinaryOp::Add => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x.wrapping_add(y)).collect(),
            )),
            BinaryOp::Sub => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x.wrapping_sub(y)).collect(),
            )),
            BinaryOp::Mul => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x.wrapping_mul(y)).collect(),
            )),
            BinaryOp::Div => {
                if pairs.iter().any(|&(_, y)| y == 0) {
                    None
                } else {
                    Some(ConstValue::$variant(
                        pairs.iter().map(|&(x, y)| x.wrapping_div(y)).collect(),
                    ))
                }
            }
            BinaryOp::Mod => {
                if pairs.iter().any(|&(_, y)| y == 0) {
                    None
                } else {
                    Some(ConstValue::$variant(
                        pairs.iter().map(|&(x, y)| x.wrapping_rem(y)).collect(),
                    ))
                }
            }
            BinaryOp::Shl => Some(ConstValue::$variant(
                pairs
                    .iter()
                    .map(|&(x, y)| x.wrapping_shl(y as u32))
                    .collect(),
            )),
            BinaryOp::Shr => Some(ConstValue::$variant(
                pairs
                    .iter()
                    .map(|&(x, y)| x.wrapping_shr(y as u32))
                    .collect(),
            )),
            BinaryOp::BitAnd => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x & y).collect(),
            )),
            BinaryOp::BitOr => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x | y).collect(),
            )),
            BinaryOp::BitXor => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x ^ y).collect(),
            )),
            BinaryOp::Lt => Some(ConstValue::Bool(pairs.iter().map(|&(x, y)| x < y).collect())),
            BinaryOp::Gt => Some(ConstValue::Bool(pairs.iter().map(|&(x, y)| x > y).collect())),
            BinaryOp::Le => Some(ConstValue::Bool(pairs.iter().map(|&(x, y)| x <= y).collect())),
            BinaryOp::Ge => Some(ConstValue::Bool(pairs.iter().map(|&(x, y)| x >= y).collect())),
            BinaryOp::Equal => Some(ConstValue::Bool(
                pairs.iter().map(|&(x, y)| x == y).collect(),
            )),
            BinaryOp::NotEqual => Some(ConstValue::Bool(
                pairs.iter().map(|&(x, y)| x != y).collect(),
            )),
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => None,
        }
    }};
}

macro_rules! float_fold {
    ($op:expr, $a:expr, $b:expr, $variant:ident) => {{
        let pairs = zip_lanes($a, $b)?;
        match $op {
            BinaryOp::Add => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x + y).collect(),
            )),
            BinaryOp::Sub => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x - y).collect(),
            )),
            BinaryOp::Mul => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x * y).collect(),
            )),
            BinaryOp::Div => Some(ConstValue::$variant(
                pairs.iter().map(|&(x, y)| x / y).collect(),
            )),
            BinaryOp::Lt => Some(ConstValue::Bool(pairs.iter().map(|&(x, y)| x < y).collect())),
            BinaryOp::Gt => Some(ConstValue::Bool(pairs.iter().map(|&(x, y)| x > y).collect())),
            BinaryOp::Le => Some(ConstValue::Bool(pairs.iter().map(|&(x, y)| x <= y).collect())),
            BinaryOp::Ge => Some(ConstValue::Bool(pairs.iter().map(|&(x, y)| x >= y).collect())),
            BinaryOp::Equal => Some(ConstValue::Bool(
                pairs.iter().map(|&(x, y)| x == y).collect(),
            )),
            BinaryOp::NotEqual => Some(ConstValue::Bool(
                pairs.iter().map(|&(x, y)| x != y).collect(),
            )),
            _ => None,
        }
    }};
}

fn fold_binary(op: BinaryOp, a: &ConstValue, b: &ConstValue) -> Option<ConstValue> {
    match (a, b) {
        (ConstValue::Int32(x), ConstValue::Int32(y)) => int_fold!(op, x, y, Int32),
        (ConstValue::UInt32(x), ConstValue::UInt32(y)) => int_fold!(op, x, y, UInt32),
        (ConstValue::Int64(x), ConstValue::Int64(y)) => int_fold!(op, x, y, Int64),
        (ConstValue::UInt64(x), ConstValue::UInt64(y)) => int_fold!(op, x, y, UInt64),
        (ConstValue::Float(x), ConstValue::Float(y)) => float_fold!(op, x, y, Float),
        (ConstValue::Double(x), ConstValue::Double(y)) => float_fold!(op, x, y, Double),
        (ConstValue::Bool(x), ConstValue::Bool(y)) => {
            let pairs = zip_lanes(x, y)?;
            match op {
                BinaryOp::LogicalAnd | BinaryOp::BitAnd => {
                    Some(ConstValue::Bool(pairs.iter().map(|&(p, q)| p && q).collect()))
                }
                BinaryOp::LogicalOr | BinaryOp::BitOr => {
                    Some(ConstValue::Bool(pairs.iter().map(|&(p, q)| p || q).collect()))
                }
                BinaryOp::BitXor | BinaryOp::NotEqual => {
                    Some(ConstValue::Bool(pairs.iter().map(|&(p, q)| p != q).collect()))
                }
                BinaryOp::Equal => {
                    Some(ConstValue::Bool(pairs.iter().map(|&(p, q)| p == q).collect()))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

// =============================================================================
// Statement pass
// =============================================================================

fn fold_opt_stmt(s: Option<Box<Stmt>>, symtab: &mut SymbolTable) -> Option<Box<Stmt>> {
    s.map(|s| Box::new(fold_stmt(*s, symtab)))
}

/// The optimize pass: fold every sub-expression, recurse into
/// sub-statements, and capture compile-time constants on `const`
/// symbols.
pub fn fold_stmt(stmt: Stmt, symtab: &mut SymbolTable) -> Stmt {
    let pos = stmt.pos.clone();
    let kind = match stmt.kind {
        StmtKind::Expr(e) => StmtKind::Expr(e.map(|e| fold_expr(e, symtab))),

        StmtKind::Decl(vars) => {
            let vars = vars
                .into_iter()
                .map(|mut var| {
                    let Some(init) = var.init.take() else {
                        return var;
                    };
                    let init = fold_expr(init, symtab);

                    // Capture `const foo = <constant>` on the symbol so that
                    // later expressions mentioning `foo` fold too. Aggregate
                    // (brace-list) initializers have no single constant value
                    // and are skipped; so are initializers whose folded type
                    // doesn't match the declaration.
                    let sym = symtab.get(var.sym);
                    if sym.ty.is_const() && !init.is_list() {
                        if let ExprKind::Const { ty, value } = &init.kind {
                            if ty.as_non_const() == sym.ty.as_non_const() {
                                let value = value.clone();
                                let name = sym.name.clone();
                                let sym = symtab.get_mut(var.sym);
                                sym.const_value = Some(value);
                                debug!("captured constant initializer for \"{}\"", name);
                            }
                        }
                    }
                    var.init = Some(init);
                    var
                })
                .collect();
            StmtKind::Decl(vars)
        }

        StmtKind::If {
            test,
            then_stmts,
            else_stmts,
            coherent,
            any_check,
        } => StmtKind::If {
            test: fold_expr(test, symtab),
            then_stmts: fold_opt_stmt(then_stmts, symtab),
            else_stmts: fold_opt_stmt(else_stmts, symtab),
            coherent,
            any_check,
        },

        StmtKind::Do {
            test,
            body,
            coherent,
        } => StmtKind::Do {
            test: fold_expr(test, symtab),
            body: fold_opt_stmt(body, symtab),
            coherent,
        },

        StmtKind::For {
            init,
            test,
            step,
            body,
            coherent,
        } => StmtKind::For {
            init: fold_opt_stmt(init, symtab),
            test: test.map(|t| fold_expr(t, symtab)),
            step: fold_opt_stmt(step, symtab),
            body: fold_opt_stmt(body, symtab),
            coherent,
        },

        kind @ (StmtKind::Break { .. } | StmtKind::Continue { .. }) => kind,

        StmtKind::Return { value, coherent } => StmtKind::Return {
            value: value.map(|v| fold_expr(v, symtab)),
            coherent,
        },

        StmtKind::List(stmts) => StmtKind::List(
            stmts
                .into_iter()
                .map(|s| fold_stmt(s, symtab))
                .collect(),
        ),

        StmtKind::Print { format, values } => StmtKind::Print {
            format,
            values: values.map(|v| fold_expr(v, symtab)),
        },

        StmtKind::Assert { message, test } => StmtKind::Assert {
            message,
            test: fold_expr(test, symtab),
        },
    };
    Stmt::new(kind, pos)
}
