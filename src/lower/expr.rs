//! Expression emission: values and lvalues.
//!
//! The statement lowering treats expressions as a black box with two
//! entry points: [`emit_expr_value`] evaluates an expression under the
//! current mask and [`emit_expr_lvalue`] resolves one to a storage
//! location. `Ok(None)` means an error was already recorded (or the
//! expression has no value, like `sync`); internal inconsistencies are
//! `Err`.
//!
//! Varying array indices never produce a single pointer: they resolve to
//! [`LValue::VaryingElem`], which reads as a gather and writes as a
//! scatter, both under the full mask. Ordinary assignments to varying
//! storage blend (load/select/store) unless the mask is provably all on.

use super::FunctionEmitContext;
use crate::ast::{BinaryOp, ConstValue, Expr, ExprKind, UnaryOp};
use crate::error::Result;
use crate::ir::{BinOpKind, CmpKind, IrConst, IrType, ScalarKind, UnOpKind, ValueId};
use crate::types::Type;
use crate::bail_lower;

/// A resolved assignment target.
#[derive(Debug, Clone, Copy)]
pub enum LValue {
    Ptr(ValueId),
    /// `base[index]` with a per-lane index.
    VaryingElem { base: ValueId, index: ValueId },
}

/// Lower a constant to an IR constant of `ty`'s lowered form,
/// broadcasting one-lane values into varying slots.
pub fn emit_const(
    ty: &Type,
    value: &ConstValue,
    ctx: &mut FunctionEmitContext,
) -> Result<ValueId> {
    let Some(ir_ty) = ty.lowered(&ctx.cx.target) else {
        bail_lower!("constant of type \"{}\" has no lowered form", ty);
    };
    match &ir_ty {
        IrType::Scalar(_) => {
            if value.lane_count() != 1 {
                bail_lower!("varying constant used where \"{}\" was expected", ty);
            }
            Ok(match value {
                ConstValue::Bool(v) => ctx.b.const_bool(v[0]),
                ConstValue::Int32(v) => ctx.b.const_i32(v[0]),
                ConstValue::UInt32(v) => ctx.b.const_of(IrConst::I32(v[0] as i32), ir_ty.clone()),
                ConstValue::Float(v) => ctx.b.const_of(IrConst::F32(v[0]), ir_ty.clone()),
                ConstValue::Int64(v) => ctx.b.const_i64(v[0]),
                ConstValue::UInt64(v) => ctx.b.const_of(IrConst::I64(v[0] as i64), ir_ty.clone()),
                ConstValue::Double(v) => ctx.b.const_of(IrConst::F64(v[0]), ir_ty.clone()),
            })
        }
        IrType::Vector { width, .. } => {
            let splat = value.splat(*width as usize);
            let c = match splat {
                ConstValue::Bool(v) => IrConst::VecI1(v),
                ConstValue::Int32(v) => IrConst::VecI32(v),
                ConstValue::UInt32(v) => {
                    IrConst::VecI32(v.into_iter().map(|x| x as i32).collect())
                }
                ConstValue::Float(v) => IrConst::VecF32(v),
                ConstValue::Int64(v) => IrConst::VecI64(v),
                ConstValue::UInt64(v) => {
                    IrConst::VecI64(v.into_iter().map(|x| x as i64).collect())
                }
                ConstValue::Double(v) => IrConst::VecF64(v),
            };
            Ok(ctx.b.const_of(c, ir_ty.clone()))
        }
        _ => bail_lower!("aggregate constant of type \"{}\" in value context", ty),
    }
}

/// A `1` of the same lowered shape as `model`, for `++`/`--`.
fn const_one_like(model: ValueId, ctx: &mut FunctionEmitContext) -> Result<ValueId> {
    let ty = ctx.b.value_type(model).clone();
    let scalar_one = |ctx: &mut FunctionEmitContext, k: &ScalarKind| match k {
        ScalarKind::F32 => ctx.b.const_of(IrConst::F32(1.0), IrType::Scalar(*k)),
        ScalarKind::F64 => ctx.b.const_of(IrConst::F64(1.0), IrType::Scalar(*k)),
        ScalarKind::I64 => ctx.b.const_i64(1),
        _ => ctx.b.const_i32(1),
    };
    match &ty {
        IrType::Scalar(k) => Ok(scalar_one(ctx, k)),
        IrType::Vector { elem, width } => {
            let one = scalar_one(ctx, elem);
            Ok(ctx.b.broadcast(one, *width))
        }
        other => bail_lower!("increment of non-numeric value ({:?})", other),
    }
}

/// Broadcast whichever operand is scalar when the other is a vector.
fn match_operands(
    lhs: ValueId,
    rhs: ValueId,
    ctx: &mut FunctionEmitContext,
) -> (ValueId, ValueId) {
    let lt = ctx.b.value_type(lhs).clone();
    let rt = ctx.b.value_type(rhs).clone();
    match (&lt, &rt) {
        (IrType::Scalar(_), IrType::Vector { width, .. }) => {
            (ctx.b.broadcast(lhs, *width), rhs)
        }
        (IrType::Vector { width, .. }, IrType::Scalar(_)) => {
            (lhs, ctx.b.broadcast(rhs, *width))
        }
        _ => (lhs, rhs),
    }
}

fn binop_kind(op: BinaryOp) -> std::result::Result<BinOpKind, CmpKind> {
    match op {
        BinaryOp::Add => Ok(BinOpKind::Add),
        BinaryOp::Sub => Ok(BinOpKind::Sub),
        BinaryOp::Mul => Ok(BinOpKind::Mul),
        BinaryOp::Div => Ok(BinOpKind::Div),
        BinaryOp::Mod => Ok(BinOpKind::Rem),
        BinaryOp::Shl => Ok(BinOpKind::Shl),
        BinaryOp::Shr => Ok(BinOpKind::Shr),
        BinaryOp::BitAnd | BinaryOp::LogicalAnd => Ok(BinOpKind::And),
        BinaryOp::BitOr | BinaryOp::LogicalOr => Ok(BinOpKind::Or),
        BinaryOp::BitXor => Ok(BinOpKind::Xor),
        BinaryOp::Lt => Err(CmpKind::Lt),
        BinaryOp::Gt => Err(CmpKind::Gt),
        BinaryOp::Le => Err(CmpKind::Le),
        BinaryOp::Ge => Err(CmpKind::Ge),
        BinaryOp::Equal => Err(CmpKind::Eq),
        BinaryOp::NotEqual => Err(CmpKind::Ne),
    }
}

fn read_lvalue(lv: &LValue, ctx: &mut FunctionEmitContext) -> ValueId {
    match lv {
        LValue::Ptr(p) => ctx.b.load(*p),
        LValue::VaryingElem { base, index } => {
            let full = ctx.get_full_mask();
            ctx.b.gather(*base, *index, full)
        }
    }
}

fn write_lvalue(lv: &LValue, value: ValueId, varying_target: bool, ctx: &mut FunctionEmitContext) {
    match lv {
        LValue::Ptr(p) => {
            if varying_target {
                let full = ctx.get_full_mask();
                ctx.masked_store(value, *p, full);
            } else {
                ctx.b.store(value, *p);
            }
        }
        LValue::VaryingElem { base, index } => {
            let full = ctx.get_full_mask();
            ctx.b.scatter(value, *base, *index, full);
        }
    }
}

/// Evaluate `expr` under the current mask.
pub fn emit_expr_value(expr: &Expr, ctx: &mut FunctionEmitContext) -> Result<Option<ValueId>> {
    match &expr.kind {
        ExprKind::Const { ty, value } => Ok(Some(emit_const(ty, value, ctx)?)),

        ExprKind::Symbol(id) => {
            let sym = ctx.symtab.get(*id);
            let Some(storage) = sym.storage else {
                ctx.cx.diags.error(
                    &expr.pos,
                    format!("Symbol \"{}\" has no storage to load from.", sym.name),
                );
                return Ok(None);
            };
            Ok(Some(ctx.b.load(storage)))
        }

        ExprKind::FunctionSymbol { name, .. } => {
            bail_lower!("function symbol \"{}\" used as a value", name)
        }

        ExprKind::Sync => {
            let full = ctx.get_full_mask();
            let lanes = ctx.b.lane_mask(full);
            ctx.b.call("__do_sync", vec![lanes], "", IrType::Void);
            Ok(None)
        }

        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Negate => {
                let Some(v) = emit_expr_value(operand, ctx)? else {
                    return Ok(None);
                };
                Ok(Some(ctx.b.unary(UnOpKind::Neg, v)))
            }
            UnaryOp::LogicalNot | UnaryOp::BitNot => {
                let Some(v) = emit_expr_value(operand, ctx)? else {
                    return Ok(None);
                };
                Ok(Some(ctx.b.unary(UnOpKind::Not, v)))
            }
            UnaryOp::PreInc | UnaryOp::PreDec => {
                let Some(lv) = emit_expr_lvalue(operand, ctx)? else {
                    return Ok(None);
                };
                let old = read_lvalue(&lv, ctx);
                let one = const_one_like(old, ctx)?;
                let kind = if *op == UnaryOp::PreInc {
                    BinOpKind::Add
                } else {
                    BinOpKind::Sub
                };
                let new = ctx.b.binary(kind, old, one);
                let varying = operand
                    .get_type(ctx.symtab)
                    .map(|t| t.is_varying())
                    .unwrap_or(false);
                write_lvalue(&lv, new, varying, ctx);
                Ok(Some(new))
            }
        },

        ExprKind::Binary { op, lhs, rhs } => {
            let Some(lv) = emit_expr_value(lhs, ctx)? else {
                return Ok(None);
            };
            let Some(rv) = emit_expr_value(rhs, ctx)? else {
                return Ok(None);
            };
            let (lv, rv) = match_operands(lv, rv, ctx);
            Ok(Some(match binop_kind(*op) {
                Ok(kind) => ctx.b.binary(kind, lv, rv),
                Err(cmp) => ctx.b.cmp(cmp, lv, rv),
            }))
        }

        ExprKind::Assign { lhs, rhs } => {
            let Some(value) = emit_expr_value(rhs, ctx)? else {
                return Ok(None);
            };
            let Some(lv) = emit_expr_lvalue(lhs, ctx)? else {
                return Ok(None);
            };
            let varying = lhs
                .get_type(ctx.symtab)
                .map(|t| t.is_varying())
                .unwrap_or(false);
            // Match the slot's width: a uniform value stored into a
            // varying location is broadcast first.
            let value = match (ctx.b.value_type(value).clone(), varying) {
                (IrType::Scalar(_), true) => {
                    let w = ctx.vector_width();
                    ctx.b.broadcast(value, w)
                }
                _ => value,
            };
            write_lvalue(&lv, value, varying, ctx);
            Ok(Some(value))
        }

        ExprKind::Select {
            test,
            if_true,
            if_false,
        } => {
            let Some(c) = emit_expr_value(test, ctx)? else {
                return Ok(None);
            };
            let Some(tv) = emit_expr_value(if_true, ctx)? else {
                return Ok(None);
            };
            let Some(fv) = emit_expr_value(if_false, ctx)? else {
                return Ok(None);
            };
            let (tv, fv) = match_operands(tv, fv, ctx);
            Ok(Some(ctx.b.select(c, tv, fv)))
        }

        ExprKind::List(_) => bail_lower!("expression list in value context"),

        ExprKind::Call { callee, args } => {
            let ExprKind::FunctionSymbol { name, ty } = &callee.kind else {
                bail_lower!("indirect calls are not supported");
            };
            let ret = match ty {
                Type::Function { ret, .. } => ret.as_ref().clone(),
                _ => Type::Void,
            };
            let mut arg_values = Vec::with_capacity(args.len());
            for arg in args {
                let Some(v) = emit_expr_value(arg, ctx)? else {
                    return Ok(None);
                };
                arg_values.push(v);
            }
            let ret_ir = match &ret {
                Type::Void => IrType::Void,
                other => match other.lowered(&ctx.cx.target) {
                    Some(t) => t,
                    None => bail_lower!("call returning unloweable type \"{}\"", other),
                },
            };
            let result = ctx.b.call(name.clone(), arg_values, "calltmp", ret_ir.clone());
            Ok(if ret_ir == IrType::Void {
                None
            } else {
                Some(result)
            })
        }

        ExprKind::Index { .. } | ExprKind::Member { .. } => {
            let Some(lv) = emit_expr_lvalue(expr, ctx)? else {
                return Ok(None);
            };
            Ok(Some(read_lvalue(&lv, ctx)))
        }

        ExprKind::Deref(inner) => {
            let Some(ptr) = emit_expr_value(inner, ctx)? else {
                return Ok(None);
            };
            Ok(Some(ctx.b.load(ptr)))
        }

        ExprKind::Ref(inner) => match emit_expr_lvalue(inner, ctx)? {
            Some(LValue::Ptr(p)) => Ok(Some(p)),
            Some(LValue::VaryingElem { .. }) => {
                ctx.cx.diags.error(
                    &expr.pos,
                    "Can't take a reference to a varying-indexed element.",
                );
                Ok(None)
            }
            None => Ok(None),
        },

        ExprKind::Cast { to, expr: inner } => {
            let Some(v) = emit_expr_value(inner, ctx)? else {
                return Ok(None);
            };
            let Some(to_ir) = to.lowered(&ctx.cx.target) else {
                bail_lower!("cast to unloweable type \"{}\"", to);
            };
            let from_ir = ctx.b.value_type(v).clone();
            if from_ir == to_ir {
                return Ok(Some(v));
            }
            Ok(Some(match (&from_ir, &to_ir) {
                // uniform -> varying: convert the scalar, then splat.
                (IrType::Scalar(_), IrType::Vector { elem, width }) => {
                    let scalar = ctx.b.cast(v, IrType::Scalar(*elem));
                    ctx.b.broadcast(scalar, *width)
                }
                _ => ctx.b.cast(v, to_ir.clone()),
            }))
        }
    }
}

/// Resolve `expr` to an assignment target.
pub fn emit_expr_lvalue(expr: &Expr, ctx: &mut FunctionEmitContext) -> Result<Option<LValue>> {
    match &expr.kind {
        ExprKind::Symbol(id) => {
            let sym = ctx.symtab.get(*id);
            let Some(storage) = sym.storage else {
                ctx.cx.diags.error(
                    &expr.pos,
                    format!("Symbol \"{}\" has no storage to assign to.", sym.name),
                );
                return Ok(None);
            };
            Ok(Some(LValue::Ptr(storage)))
        }

        ExprKind::Index { base, index } => {
            let Some(base_ty) = base.get_type(ctx.symtab) else {
                return Ok(None);
            };
            // Indexing through a reference uses the reference's value as
            // the base pointer.
            let base_ptr = if base_ty.is_reference() {
                emit_expr_value(base, ctx)?
            } else {
                match emit_expr_lvalue(base, ctx)? {
                    Some(LValue::Ptr(p)) => Some(p),
                    Some(LValue::VaryingElem { .. }) => {
                        ctx.cx.diags.error(
                            &expr.pos,
                            "Can't index through a varying-indexed element.",
                        );
                        None
                    }
                    None => None,
                }
            };
            let Some(bp) = base_ptr else {
                return Ok(None);
            };

            let index_varying = index
                .get_type(ctx.symtab)
                .map(|t| t.is_varying())
                .unwrap_or(false);
            if index_varying {
                let Some(iv) = emit_expr_value(index, ctx)? else {
                    return Ok(None);
                };
                return Ok(Some(LValue::VaryingElem { base: bp, index: iv }));
            }
            // Compile-time constant index: keep the structured form.
            if let Some(lanes) = index.as_int32() {
                let i = lanes[0];
                if i >= 0 {
                    return Ok(Some(LValue::Ptr(ctx.b.gep(bp, 0, i as u32, "element"))));
                }
            }
            let Some(iv) = emit_expr_value(index, ctx)? else {
                return Ok(None);
            };
            Ok(Some(LValue::Ptr(ctx.b.element_ptr(bp, iv, "element"))))
        }

        ExprKind::Member { base, member } => {
            let Some(mut base_ty) = base.get_type(ctx.symtab) else {
                return Ok(None);
            };
            let base_ptr = if let Type::Reference { target } = base_ty {
                base_ty = *target;
                emit_expr_value(base, ctx)?
            } else {
                match emit_expr_lvalue(base, ctx)? {
                    Some(LValue::Ptr(p)) => Some(p),
                    _ => None,
                }
            };
            let Some(bp) = base_ptr else {
                return Ok(None);
            };
            let Type::Struct { fields, .. } = &base_ty else {
                bail_lower!("member access into non-struct type \"{}\"", base_ty);
            };
            let Some(field_index) = fields.iter().position(|(n, _)| n == member) else {
                bail_lower!("unknown member \"{}\" of \"{}\"", member, base_ty);
            };
            Ok(Some(LValue::Ptr(ctx.b.gep(
                bp,
                0,
                field_index as u32,
                member.clone(),
            ))))
        }

        ExprKind::Deref(inner) => {
            let Some(ptr) = emit_expr_value(inner, ctx)? else {
                return Ok(None);
            };
            Ok(Some(LValue::Ptr(ptr)))
        }

        _ => {
            ctx.cx
                .diags
                .error(&expr.pos, "Expression is not assignable.");
            Ok(None)
        }
    }
}
