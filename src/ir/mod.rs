//! A small SSA-style control-flow-graph IR.
//!
//! This is the target of statement lowering: basic blocks holding
//! instructions, each instruction identified by the [`ValueId`] of its
//! result. It deliberately stays close to the shape of a production
//! backend builder (allocas, loads/stores, GEPs, calls, terminators)
//! plus the handful of SPMD-specific operations the lowering needs:
//! mask reductions (`all` / `any` / `lane_mask`), broadcasts, and
//! masked gather/scatter for varying indexing.
//!
//! Key properties:
//! - ValueIds are globally unique within a function (SSA-like).
//! - Blocks and values iterate in creation order (deterministic dumps).
//! - Terminating a block clears the builder's current block, so code
//!   after a `return`/`break` is naturally dropped.

pub mod builder;

use crate::ast::SourcePos;
use crate::IdArena;

// =============================================================================
// ID types
// =============================================================================

/// Identifier of a value: an instruction result, constant, argument,
/// string, or global reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

impl From<u32> for ValueId {
    fn from(id: u32) -> Self {
        ValueId(id)
    }
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl From<u32> for BlockId {
    fn from(id: u32) -> Self {
        BlockId(id)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(pub u32);

impl From<u32> for FuncId {
    fn from(id: u32) -> Self {
        FuncId(id)
    }
}

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    I1,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    Void,
    Scalar(ScalarKind),
    Vector { elem: ScalarKind, width: u32 },
    Ptr(Box<IrType>),
    Array { elem: Box<IrType>, count: u32 },
    Struct { fields: Vec<IrType> },
}

impl IrType {
    /// The `<W x i1>` execution-mask type.
    pub fn mask(width: u32) -> IrType {
        IrType::Vector {
            elem: ScalarKind::I1,
            width,
        }
    }

    /// An opaque byte pointer (`i8*`), the runtime's argument currency.
    pub fn byte_ptr() -> IrType {
        IrType::Ptr(Box::new(IrType::Scalar(ScalarKind::I8)))
    }

    pub fn ptr_to(self) -> IrType {
        IrType::Ptr(Box::new(self))
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, IrType::Vector { .. })
    }

    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }
}

// =============================================================================
// Constants
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum IrConst {
    I1(bool),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    VecI1(Vec<bool>),
    VecI32(Vec<i32>),
    VecI64(Vec<i64>),
    VecF32(Vec<f32>),
    VecF64(Vec<f64>),
    /// Element-wise constant for arrays and structs (static
    /// initializers).
    Aggregate(Vec<IrConst>),
    /// Zero-fill of an arbitrary lowered type (static zero init).
    Zero(IrType),
    /// Undefined contents of an arbitrary lowered type.
    Undef(IrType),
}

// =============================================================================
// Instructions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOpKind {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpKind {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Alloca {
        ty: IrType,
        name: String,
    },
    Load {
        ptr: ValueId,
    },
    Store {
        value: ValueId,
        ptr: ValueId,
    },
    /// Constant-index element pointer: `&base[idx0][idx1]`.
    Gep {
        base: ValueId,
        idx0: u32,
        idx1: u32,
        name: String,
    },
    /// Runtime-index element pointer `&base[index]` with a uniform
    /// (scalar) index.
    Element {
        base: ValueId,
        index: ValueId,
        name: String,
    },
    BitCast {
        value: ValueId,
        to: IrType,
    },
    Unary {
        op: UnOpKind,
        operand: ValueId,
    },
    Binary {
        op: BinOpKind,
        lhs: ValueId,
        rhs: ValueId,
    },
    Cmp {
        op: CmpKind,
        lhs: ValueId,
        rhs: ValueId,
    },
    Select {
        cond: ValueId,
        if_true: ValueId,
        if_false: ValueId,
    },
    /// Numeric conversion (and bool widening/narrowing) to `to`.
    Cast {
        value: ValueId,
        to: IrType,
    },
    /// Scalar to `<width x ty>` splat.
    Broadcast {
        value: ValueId,
        width: u32,
    },
    /// True iff every lane of the mask is on.
    All {
        mask: ValueId,
    },
    /// True iff any lane of the mask is on.
    Any {
        mask: ValueId,
    },
    /// The mask as an `i64` bit pattern, lane 0 in bit 0.
    LaneMask {
        mask: ValueId,
    },
    /// Per-lane load `base[index[lane]]` for lanes on in `mask`.
    Gather {
        base: ValueId,
        index: ValueId,
        mask: ValueId,
    },
    /// Per-lane store `base[index[lane]] = value[lane]` for lanes on in
    /// `mask`.
    Scatter {
        value: ValueId,
        base: ValueId,
        index: ValueId,
        mask: ValueId,
    },
    Call {
        callee: String,
        args: Vec<ValueId>,
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Branch(BlockId),
    CondBranch {
        cond: ValueId,
        if_true: BlockId,
        if_false: BlockId,
    },
    Return(Option<ValueId>),
}

// =============================================================================
// Values, blocks, functions, module
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ValueDef {
    Inst(Inst),
    Const(IrConst),
    /// Pointer to an interned string literal.
    Str(String),
    /// Pointer to a module-level global, by name.
    GlobalRef(String),
    Arg {
        index: u32,
        name: String,
    },
}

#[derive(Debug, Clone)]
pub struct Value {
    pub def: ValueDef,
    pub ty: IrType,
    /// Source position active when the value was created.
    pub pos: Option<SourcePos>,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub insts: Vec<ValueId>,
    pub terminator: Option<Terminator>,
}

/// Debug-info record for one source variable.
#[derive(Debug, Clone)]
pub struct DebugVar {
    pub name: String,
    pub storage: ValueId,
    pub scope_depth: u32,
    pub pos: SourcePos,
}

#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub ret: IrType,
    pub params: Vec<ValueId>,
    pub values: IdArena<ValueId, Value>,
    pub blocks: IdArena<BlockId, Block>,
    /// Block holding the hoisted allocas; branches to the first code
    /// block once construction finishes.
    pub alloca_block: BlockId,
    pub debug_vars: Vec<DebugVar>,
}

impl Function {
    pub fn value(&self, id: ValueId) -> &Value {
        self.values.get(id).expect("value id out of range")
    }

    pub fn block(&self, id: BlockId) -> &Block {
        self.blocks.get(id).expect("block id out of range")
    }

    pub fn block_by_name(&self, name: &str) -> Option<BlockId> {
        self.blocks
            .iter()
            .find(|(_, b)| b.name == name)
            .map(|(id, _)| *id)
    }

    /// All instruction values, in block creation order.
    pub fn insts(&self) -> impl Iterator<Item = (BlockId, ValueId, &Inst)> {
        self.blocks.iter().flat_map(move |(bid, block)| {
            block.insts.iter().filter_map(move |vid| {
                match &self.value(*vid).def {
                    ValueDef::Inst(inst) => Some((*bid, *vid, inst)),
                    _ => None,
                }
            })
        })
    }

    pub fn count_insts(&self, pred: impl Fn(&Inst) -> bool) -> usize {
        self.insts().filter(|(_, _, inst)| pred(inst)).count()
    }

    /// The constant behind a value, if it is one.
    pub fn const_of(&self, id: ValueId) -> Option<&IrConst> {
        match &self.value(id).def {
            ValueDef::Const(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
    pub init: IrConst,
    pub is_const: bool,
}

/// One translation unit's worth of lowered output.
#[derive(Debug, Default)]
pub struct Module {
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    pub fn add_global(&mut self, global: Global) {
        self.globals.push(global);
    }

    pub fn global(&self, name: &str) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }
}
