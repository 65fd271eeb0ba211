//! Debug formatting for statement and expression trees.
//!
//! Produces an indented dump close to Lane C syntax, for compiler
//! debugging and test failure output. Types print through their
//! `Display` impl in the `types` module.

use std::fmt::Write;

use crate::ast::{BinaryOp, ConstValue, Expr, ExprKind, Stmt, StmtKind, UnaryOp};
use crate::sym::SymbolTable;

fn unary_op_str(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Negate => "-",
        UnaryOp::LogicalNot => "!",
        UnaryOp::BitNot => "~",
        UnaryOp::PreInc => "++",
        UnaryOp::PreDec => "--",
    }
}

fn binary_op_str(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Shl => "<<",
        BinaryOp::Shr => ">>",
        BinaryOp::Lt => "<",
        BinaryOp::Gt => ">",
        BinaryOp::Le => "<=",
        BinaryOp::Ge => ">=",
        BinaryOp::Equal => "==",
        BinaryOp::NotEqual => "!=",
        BinaryOp::BitAnd => "&",
        BinaryOp::BitXor => "^",
        BinaryOp::BitOr => "|",
        BinaryOp::LogicalAnd => "&&",
        BinaryOp::LogicalOr => "||",
    }
}

fn format_const(value: &ConstValue) -> String {
    fn join<T: std::fmt::Display>(v: &[T]) -> String {
        let parts: Vec<_> = v.iter().map(|x| x.to_string()).collect();
        if parts.len() == 1 {
            parts.into_iter().next().unwrap()
        } else {
            format!("<{}>", parts.join(", "))
        }
    }
    match value {
        ConstValue::Bool(v) => join(v),
        ConstValue::Int32(v) => join(v),
        ConstValue::UInt32(v) => join(v),
        ConstValue::Float(v) => join(v),
        ConstValue::Int64(v) => join(v),
        ConstValue::UInt64(v) => join(v),
        ConstValue::Double(v) => join(v),
    }
}

/// One-line rendering of an expression.
pub fn format_expr(expr: &Expr, symtab: &SymbolTable) -> String {
    match &expr.kind {
        ExprKind::Const { value, .. } => format_const(value),
        ExprKind::Symbol(id) => symtab.get(*id).name.clone(),
        ExprKind::FunctionSymbol { name, .. } => name.clone(),
        ExprKind::Sync => "sync".to_string(),
        ExprKind::Unary { op, operand } => {
            format!("{}{}", unary_op_str(*op), format_expr(operand, symtab))
        }
        ExprKind::Binary { op, lhs, rhs } => format!(
            "({} {} {})",
            format_expr(lhs, symtab),
            binary_op_str(*op),
            format_expr(rhs, symtab)
        ),
        ExprKind::Assign { lhs, rhs } => format!(
            "({} = {})",
            format_expr(lhs, symtab),
            format_expr(rhs, symtab)
        ),
        ExprKind::Select {
            test,
            if_true,
            if_false,
        } => format!(
            "({} ? {} : {})",
            format_expr(test, symtab),
            format_expr(if_true, symtab),
            format_expr(if_false, symtab)
        ),
        ExprKind::List(exprs) => {
            let parts: Vec<_> = exprs.iter().map(|e| format_expr(e, symtab)).collect();
            format!("{{ {} }}", parts.join(", "))
        }
        ExprKind::Call { callee, args } => {
            let parts: Vec<_> = args.iter().map(|e| format_expr(e, symtab)).collect();
            format!("{}({})", format_expr(callee, symtab), parts.join(", "))
        }
        ExprKind::Index { base, index } => format!(
            "{}[{}]",
            format_expr(base, symtab),
            format_expr(index, symtab)
        ),
        ExprKind::Member { base, member } => {
            format!("{}.{}", format_expr(base, symtab), member)
        }
        ExprKind::Deref(inner) => format!("*{}", format_expr(inner, symtab)),
        ExprKind::Ref(inner) => format!("&{}", format_expr(inner, symtab)),
        ExprKind::Cast { to, expr } => format!("({})({})", to, format_expr(expr, symtab)),
    }
}

/// Indented dump of a statement tree.
pub fn format_stmt(stmt: &Stmt, symtab: &SymbolTable, indent: usize) -> String {
    let mut out = String::new();
    write_stmt(&mut out, stmt, symtab, indent);
    out
}

fn pad(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push(' ');
    }
}

fn write_opt_stmt(
    out: &mut String,
    label: &str,
    stmt: Option<&Stmt>,
    symtab: &SymbolTable,
    indent: usize,
) {
    if let Some(stmt) = stmt {
        pad(out, indent);
        let _ = writeln!(out, "{}:", label);
        write_stmt(out, stmt, symtab, indent + 4);
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, symtab: &SymbolTable, indent: usize) {
    match &stmt.kind {
        StmtKind::Expr(e) => {
            pad(out, indent);
            match e {
                Some(e) => {
                    let _ = writeln!(out, "Expr stmt: {} ({})", format_expr(e, symtab), stmt.pos);
                }
                None => {
                    let _ = writeln!(out, "Expr stmt: <empty> ({})", stmt.pos);
                }
            }
        }
        StmtKind::Decl(vars) => {
            pad(out, indent);
            let _ = writeln!(out, "Decl stmt: ({})", stmt.pos);
            for var in vars {
                let sym = symtab.get(var.sym);
                pad(out, indent + 4);
                let _ = write!(out, "Variable {} ({})", sym.name, sym.ty);
                if let Some(init) = &var.init {
                    let _ = write!(out, " = {}", format_expr(init, symtab));
                }
                out.push('\n');
            }
        }
        StmtKind::If {
            test,
            then_stmts,
            else_stmts,
            coherent,
            ..
        } => {
            pad(out, indent);
            let _ = writeln!(
                out,
                "If stmt{}: ({})",
                if *coherent { " [coherent]" } else { "" },
                stmt.pos
            );
            pad(out, indent + 4);
            let _ = writeln!(out, "Test: {}", format_expr(test, symtab));
            write_opt_stmt(out, "True", then_stmts.as_deref(), symtab, indent + 4);
            write_opt_stmt(out, "False", else_stmts.as_deref(), symtab, indent + 4);
        }
        StmtKind::Do {
            test,
            body,
            coherent,
        } => {
            pad(out, indent);
            let _ = writeln!(
                out,
                "Do stmt{}: ({})",
                if *coherent { " [coherent]" } else { "" },
                stmt.pos
            );
            pad(out, indent + 4);
            let _ = writeln!(out, "Test: {}", format_expr(test, symtab));
            write_opt_stmt(out, "Stmts", body.as_deref(), symtab, indent + 4);
        }
        StmtKind::For {
            init,
            test,
            step,
            body,
            coherent,
        } => {
            pad(out, indent);
            let _ = writeln!(
                out,
                "For stmt{}: ({})",
                if *coherent { " [coherent]" } else { "" },
                stmt.pos
            );
            write_opt_stmt(out, "Init", init.as_deref(), symtab, indent + 4);
            if let Some(test) = test {
                pad(out, indent + 4);
                let _ = writeln!(out, "Test: {}", format_expr(test, symtab));
            }
            write_opt_stmt(out, "Step", step.as_deref(), symtab, indent + 4);
            write_opt_stmt(out, "Stmts", body.as_deref(), symtab, indent + 4);
        }
        StmtKind::Break { coherent } => {
            pad(out, indent);
            let _ = writeln!(
                out,
                "{}Break stmt ({})",
                if *coherent { "Coherent " } else { "" },
                stmt.pos
            );
        }
        StmtKind::Continue { coherent } => {
            pad(out, indent);
            let _ = writeln!(
                out,
                "{}Continue stmt ({})",
                if *coherent { "Coherent " } else { "" },
                stmt.pos
            );
        }
        StmtKind::Return { value, coherent } => {
            pad(out, indent);
            let _ = writeln!(
                out,
                "{}Return stmt: {} ({})",
                if *coherent { "Coherent " } else { "" },
                value
                    .as_ref()
                    .map(|v| format_expr(v, symtab))
                    .unwrap_or_else(|| "(void)".to_string()),
                stmt.pos
            );
        }
        StmtKind::List(stmts) => {
            pad(out, indent);
            let _ = writeln!(out, "Stmt list: ({})", stmt.pos);
            for s in stmts {
                write_stmt(out, s, symtab, indent + 4);
            }
        }
        StmtKind::Print { format, values } => {
            pad(out, indent);
            let _ = write!(out, "Print stmt ({:?})", format);
            if let Some(values) = values {
                let _ = write!(out, " {}", format_expr(values, symtab));
            }
            out.push('\n');
        }
        StmtKind::Assert { message, test } => {
            pad(out, indent);
            let _ = writeln!(
                out,
                "Assert stmt ({:?}): {}",
                message,
                format_expr(test, symtab)
            );
        }
    }
}
