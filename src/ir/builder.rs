//! Builder for constructing one [`Function`] at a time.
//!
//! Handles the bookkeeping the lowering pass should not have to think
//! about: allocas are hoisted into a dedicated entry block, scalar and
//! mask constants are interned (so "is this mask provably all-on" is a
//! [`ValueId`] comparison), and terminating the current block clears it
//! so stray emission after a terminator is impossible.

use std::collections::HashMap;

use super::{
    BinOpKind, Block, BlockId, CmpKind, DebugVar, FuncId, Function, Global, Inst, IrConst, IrType,
    Module, ScalarKind, Terminator, UnOpKind, Value, ValueDef, ValueId,
};
use crate::ast::SourcePos;
use crate::IdArena;

/// Interning key for constants whose identity matters to the lowering.
/// Floats stay uninterned; nothing compares them by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    I1(bool),
    I32(i32),
    I64(i64),
    MaskAllOn(u32),
    MaskAllOff(u32),
}

pub struct Builder<'m> {
    module: &'m mut Module,
    func: Function,
    func_id: FuncId,
    cur: Option<BlockId>,
    first_code_block: BlockId,
    const_cache: HashMap<ConstKey, ValueId>,
    str_cache: HashMap<String, ValueId>,
    cur_pos: Option<SourcePos>,
}

impl<'m> Builder<'m> {
    pub fn new(module: &'m mut Module, name: impl Into<String>, ret: IrType) -> Self {
        let func_id = FuncId(module.functions.len() as u32);
        let mut blocks = IdArena::new();
        let alloca_block = blocks.alloc(Block {
            name: "allocas".to_string(),
            insts: Vec::new(),
            terminator: None,
        });
        let entry = blocks.alloc(Block {
            name: "entry".to_string(),
            insts: Vec::new(),
            terminator: None,
        });
        Builder {
            module,
            func: Function {
                name: name.into(),
                ret,
                params: Vec::new(),
                values: IdArena::new(),
                blocks,
                alloca_block,
                debug_vars: Vec::new(),
            },
            func_id,
            cur: Some(entry),
            first_code_block: entry,
            const_cache: HashMap::new(),
            str_cache: HashMap::new(),
            cur_pos: None,
        }
    }

    pub fn func_id(&self) -> FuncId {
        self.func_id
    }

    pub fn set_debug_pos(&mut self, pos: SourcePos) {
        self.cur_pos = Some(pos);
    }

    fn add_value(&mut self, def: ValueDef, ty: IrType) -> ValueId {
        self.func.values.alloc(Value {
            def,
            ty,
            pos: self.cur_pos.clone(),
        })
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    pub fn create_block(&mut self, name: impl Into<String>) -> BlockId {
        self.func.blocks.alloc(Block {
            name: name.into(),
            insts: Vec::new(),
            terminator: None,
        })
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.cur
    }

    pub fn set_current_block(&mut self, block: BlockId) {
        self.cur = Some(block);
    }

    /// Append an instruction to the current block.
    pub fn push(&mut self, inst: Inst, ty: IrType) -> ValueId {
        let block = self.cur.expect("instruction emitted with no current block");
        let id = self.add_value(ValueDef::Inst(inst), ty);
        self.func
            .blocks
            .get_mut(block)
            .expect("current block missing")
            .insts
            .push(id);
        id
    }

    fn terminate(&mut self, term: Terminator) {
        let block = self.cur.expect("terminator emitted with no current block");
        let b = self.func.blocks.get_mut(block).expect("block missing");
        assert!(b.terminator.is_none(), "block {} terminated twice", b.name);
        b.terminator = Some(term);
        self.cur = None;
    }

    pub fn branch(&mut self, dest: BlockId) {
        self.terminate(Terminator::Branch(dest));
    }

    pub fn cond_branch(&mut self, cond: ValueId, if_true: BlockId, if_false: BlockId) {
        self.terminate(Terminator::CondBranch {
            cond,
            if_true,
            if_false,
        });
    }

    pub fn ret(&mut self, value: Option<ValueId>) {
        self.terminate(Terminator::Return(value));
    }

    // =========================================================================
    // Constants
    // =========================================================================

    fn interned(&mut self, key: ConstKey, make: impl FnOnce() -> (IrConst, IrType)) -> ValueId {
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let (c, ty) = make();
        let id = self.add_value(ValueDef::Const(c), ty);
        self.const_cache.insert(key, id);
        id
    }

    pub fn const_bool(&mut self, v: bool) -> ValueId {
        self.interned(ConstKey::I1(v), || {
            (IrConst::I1(v), IrType::Scalar(ScalarKind::I1))
        })
    }

    pub fn const_i32(&mut self, v: i32) -> ValueId {
        self.interned(ConstKey::I32(v), || {
            (IrConst::I32(v), IrType::Scalar(ScalarKind::I32))
        })
    }

    pub fn const_i64(&mut self, v: i64) -> ValueId {
        self.interned(ConstKey::I64(v), || {
            (IrConst::I64(v), IrType::Scalar(ScalarKind::I64))
        })
    }

    pub fn const_of(&mut self, c: IrConst, ty: IrType) -> ValueId {
        self.add_value(ValueDef::Const(c), ty)
    }

    /// The interned all-lanes-on mask. Comparing a mask value against
    /// this id is the "provably all on at compile time" test.
    pub fn mask_all_on(&mut self, width: u32) -> ValueId {
        self.interned(ConstKey::MaskAllOn(width), || {
            (IrConst::VecI1(vec![true; width as usize]), IrType::mask(width))
        })
    }

    pub fn mask_all_off(&mut self, width: u32) -> ValueId {
        self.interned(ConstKey::MaskAllOff(width), || {
            (
                IrConst::VecI1(vec![false; width as usize]),
                IrType::mask(width),
            )
        })
    }

    pub fn undef(&mut self, ty: IrType) -> ValueId {
        self.add_value(ValueDef::Const(IrConst::Undef(ty.clone())), ty)
    }

    pub fn zero(&mut self, ty: IrType) -> ValueId {
        self.add_value(ValueDef::Const(IrConst::Zero(ty.clone())), ty)
    }

    /// Pointer to an interned string literal.
    pub fn string_ptr(&mut self, s: impl Into<String>) -> ValueId {
        let s = s.into();
        if let Some(&id) = self.str_cache.get(&s) {
            return id;
        }
        let id = self.add_value(ValueDef::Str(s.clone()), IrType::byte_ptr());
        self.str_cache.insert(s, id);
        id
    }

    /// Pointer to a module-level global by name. The global must have
    /// been added to the module already.
    pub fn global_ref(&mut self, name: &str) -> ValueId {
        let ty = self
            .module
            .global(name)
            .map(|g| g.ty.clone())
            .expect("global_ref to unknown global")
            .ptr_to();
        self.add_value(ValueDef::GlobalRef(name.to_string()), ty)
    }

    pub fn add_module_global(&mut self, global: Global) {
        self.module.add_global(global);
    }

    // =========================================================================
    // Arguments, allocas, memory
    // =========================================================================

    pub fn add_param(&mut self, ty: IrType, name: impl Into<String>) -> ValueId {
        let index = self.func.params.len() as u32;
        let id = self.add_value(
            ValueDef::Arg {
                index,
                name: name.into(),
            },
            ty,
        );
        self.func.params.push(id);
        id
    }

    /// Stack slot, hoisted into the entry alloca block regardless of the
    /// current insertion point.
    pub fn alloca(&mut self, ty: IrType, name: impl Into<String>) -> ValueId {
        let ptr_ty = ty.clone().ptr_to();
        let id = self.add_value(
            ValueDef::Inst(Inst::Alloca {
                ty,
                name: name.into(),
            }),
            ptr_ty,
        );
        let ab = self.func.alloca_block;
        self.func
            .blocks
            .get_mut(ab)
            .expect("alloca block missing")
            .insts
            .push(id);
        id
    }

    pub fn load(&mut self, ptr: ValueId) -> ValueId {
        let ty = self
            .func
            .value(ptr)
            .ty
            .pointee()
            .expect("load from non-pointer")
            .clone();
        self.push(Inst::Load { ptr }, ty)
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) -> ValueId {
        self.push(Inst::Store { value, ptr }, IrType::Void)
    }

    pub fn gep(&mut self, base: ValueId, idx0: u32, idx1: u32, name: impl Into<String>) -> ValueId {
        let elem_ty = match self.func.value(base).ty.pointee() {
            Some(IrType::Array { elem, .. }) => elem.as_ref().clone(),
            Some(IrType::Struct { fields }) => fields
                .get(idx1 as usize)
                .expect("struct gep index out of range")
                .clone(),
            other => panic!("gep through non-aggregate pointer: {:?}", other),
        };
        self.push(
            Inst::Gep {
                base,
                idx0,
                idx1,
                name: name.into(),
            },
            elem_ty.ptr_to(),
        )
    }

    pub fn element_ptr(
        &mut self,
        base: ValueId,
        index: ValueId,
        name: impl Into<String>,
    ) -> ValueId {
        let elem_ty = match self.func.value(base).ty.pointee() {
            Some(IrType::Array { elem, .. }) => elem.as_ref().clone(),
            other => panic!("element_ptr through non-array pointer: {:?}", other),
        };
        self.push(
            Inst::Element {
                base,
                index,
                name: name.into(),
            },
            elem_ty.ptr_to(),
        )
    }

    pub fn bitcast(&mut self, value: ValueId, to: IrType) -> ValueId {
        self.push(
            Inst::BitCast {
                value,
                to: to.clone(),
            },
            to,
        )
    }

    // =========================================================================
    // Arithmetic, logic, masks
    // =========================================================================

    pub fn unary(&mut self, op: UnOpKind, operand: ValueId) -> ValueId {
        let ty = self.func.value(operand).ty.clone();
        self.push(Inst::Unary { op, operand }, ty)
    }

    pub fn binary(&mut self, op: BinOpKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.func.value(lhs).ty.clone();
        self.push(Inst::Binary { op, lhs, rhs }, ty)
    }

    pub fn cmp(&mut self, op: CmpKind, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = match &self.func.value(lhs).ty {
            IrType::Vector { width, .. } => IrType::mask(*width),
            _ => IrType::Scalar(ScalarKind::I1),
        };
        self.push(Inst::Cmp { op, lhs, rhs }, ty)
    }

    pub fn select(&mut self, cond: ValueId, if_true: ValueId, if_false: ValueId) -> ValueId {
        let ty = self.func.value(if_true).ty.clone();
        self.push(
            Inst::Select {
                cond,
                if_true,
                if_false,
            },
            ty,
        )
    }

    pub fn cast(&mut self, value: ValueId, to: IrType) -> ValueId {
        if self.func.value(value).ty == to {
            return value;
        }
        self.push(
            Inst::Cast {
                value,
                to: to.clone(),
            },
            to,
        )
    }

    pub fn broadcast(&mut self, value: ValueId, width: u32) -> ValueId {
        let elem = match &self.func.value(value).ty {
            IrType::Scalar(k) => *k,
            other => panic!("broadcast of non-scalar: {:?}", other),
        };
        self.push(Inst::Broadcast { value, width }, IrType::Vector { elem, width })
    }

    /// `lhs & rhs` on masks.
    pub fn mask_and(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinOpKind::And, lhs, rhs)
    }

    /// `lhs & !rhs` on masks.
    pub fn mask_and_not(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        let not = self.unary(UnOpKind::Not, rhs);
        self.binary(BinOpKind::And, lhs, not)
    }

    pub fn mask_or(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.binary(BinOpKind::Or, lhs, rhs)
    }

    pub fn all(&mut self, mask: ValueId) -> ValueId {
        self.push(Inst::All { mask }, IrType::Scalar(ScalarKind::I1))
    }

    pub fn any(&mut self, mask: ValueId) -> ValueId {
        self.push(Inst::Any { mask }, IrType::Scalar(ScalarKind::I1))
    }

    pub fn lane_mask(&mut self, mask: ValueId) -> ValueId {
        self.push(Inst::LaneMask { mask }, IrType::Scalar(ScalarKind::I64))
    }

    pub fn gather(&mut self, base: ValueId, index: ValueId, mask: ValueId) -> ValueId {
        let width = match &self.func.value(index).ty {
            IrType::Vector { width, .. } => *width,
            _ => panic!("gather index must be varying"),
        };
        let elem = match self.func.value(base).ty.pointee() {
            Some(IrType::Array { elem, .. }) => match elem.as_ref() {
                IrType::Scalar(k) => *k,
                IrType::Vector { elem, .. } => *elem,
                other => panic!("gather of non-scalar element: {:?}", other),
            },
            other => panic!("gather through non-array pointer: {:?}", other),
        };
        self.push(
            Inst::Gather { base, index, mask },
            IrType::Vector { elem, width },
        )
    }

    pub fn scatter(&mut self, value: ValueId, base: ValueId, index: ValueId, mask: ValueId) -> ValueId {
        self.push(
            Inst::Scatter {
                value,
                base,
                index,
                mask,
            },
            IrType::Void,
        )
    }

    pub fn call(
        &mut self,
        callee: impl Into<String>,
        args: Vec<ValueId>,
        name: impl Into<String>,
        ret: IrType,
    ) -> ValueId {
        self.push(
            Inst::Call {
                callee: callee.into(),
                args,
                name: name.into(),
            },
            ret,
        )
    }

    // =========================================================================
    // Introspection and finish
    // =========================================================================

    pub fn value_type(&self, id: ValueId) -> &IrType {
        &self.func.value(id).ty
    }

    pub fn record_debug_var(&mut self, var: DebugVar) {
        self.func.debug_vars.push(var);
    }

    /// Finish construction: wire the alloca block to the first code block
    /// and move the function into the module.
    pub fn finish(mut self) -> FuncId {
        let ab = self.func.alloca_block;
        let block = self.func.blocks.get_mut(ab).expect("alloca block missing");
        assert!(block.terminator.is_none());
        block.terminator = Some(Terminator::Branch(self.first_code_block));
        self.module.functions.push(self.func);
        self.func_id
    }
}
