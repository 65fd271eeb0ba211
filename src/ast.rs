//! Expression and statement trees for the Lane C statement lowering core.
//!
//! The parser and symbol resolver run upstream and deliver a fully-typed
//! tree; the nodes here carry symbol *references* (ids into the
//! [`SymbolTable`](crate::sym::SymbolTable)), never owned symbols. Passes
//! over statements live in their own modules (`types::checker`,
//! `const_fold`, `lower`); this module holds the data and the queries
//! that need nothing but the tree and the symbol table.

use crate::sym::{SymbolId, SymbolTable};
use crate::types::{AtomicKind, Type};
use crate::OptFlags;

/// Source location: file, 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePos {
    pub file: String,
    pub line: u32,
    pub col: u32,
}

impl SourcePos {
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        SourcePos {
            file: file.into(),
            line,
            col,
        }
    }

    /// Position for generated nodes and tests.
    pub fn unknown() -> Self {
        SourcePos::new("<unknown>", 0, 0)
    }
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

// =============================================================================
// Constant values
// =============================================================================

/// A compile-time constant, uniform (one lane) or varying (one value per
/// lane). 8- and 16-bit integer literals are widened to 32 bits upstream,
/// so only the wide kinds appear here.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Float(Vec<f32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Double(Vec<f64>),
}

impl ConstValue {
    /// Number of lanes stored: 1 for uniform constants, the vector width
    /// for varying ones.
    pub fn lane_count(&self) -> usize {
        match self {
            ConstValue::Bool(v) => v.len(),
            ConstValue::Int32(v) => v.len(),
            ConstValue::UInt32(v) => v.len(),
            ConstValue::Float(v) => v.len(),
            ConstValue::Int64(v) => v.len(),
            ConstValue::UInt64(v) => v.len(),
            ConstValue::Double(v) => v.len(),
        }
    }

    pub fn atomic_kind(&self) -> AtomicKind {
        match self {
            ConstValue::Bool(_) => AtomicKind::Bool,
            ConstValue::Int32(_) => AtomicKind::Int32,
            ConstValue::UInt32(_) => AtomicKind::UInt32,
            ConstValue::Float(_) => AtomicKind::Float,
            ConstValue::Int64(_) => AtomicKind::Int64,
            ConstValue::UInt64(_) => AtomicKind::UInt64,
            ConstValue::Double(_) => AtomicKind::Double,
        }
    }

    /// Per-lane values as `i32`, converting from whatever kind is stored.
    /// This is the `AsInt32` query used by the all-lanes-off safety check
    /// on constant array indices.
    pub fn as_int32(&self) -> Vec<i32> {
        match self {
            ConstValue::Bool(v) => v.iter().map(|&b| b as i32).collect(),
            ConstValue::Int32(v) => v.clone(),
            ConstValue::UInt32(v) => v.iter().map(|&x| x as i32).collect(),
            ConstValue::Float(v) => v.iter().map(|&x| x as i32).collect(),
            ConstValue::Int64(v) => v.iter().map(|&x| x as i32).collect(),
            ConstValue::UInt64(v) => v.iter().map(|&x| x as i32).collect(),
            ConstValue::Double(v) => v.iter().map(|&x| x as i32).collect(),
        }
    }

    /// Convert every lane to `kind`, C-conversion style.
    pub fn convert_to(&self, kind: AtomicKind) -> Option<ConstValue> {
        macro_rules! conv {
            ($vals:expr) => {{
                let vs = $vals;
                Some(match kind {
                    AtomicKind::Bool => ConstValue::Bool(vs.iter().map(|&x| x != 0.0).collect()),
                    AtomicKind::Int8
                    | AtomicKind::Int16
                    | AtomicKind::Int32 => ConstValue::Int32(vs.iter().map(|&x| x as i32).collect()),
                    AtomicKind::UInt8
                    | AtomicKind::UInt16
                    | AtomicKind::UInt32 => {
                        ConstValue::UInt32(vs.iter().map(|&x| x as u32).collect())
                    }
                    AtomicKind::Float => ConstValue::Float(vs.iter().map(|&x| x as f32).collect()),
                    AtomicKind::Int64 => ConstValue::Int64(vs.iter().map(|&x| x as i64).collect()),
                    AtomicKind::UInt64 => {
                        ConstValue::UInt64(vs.iter().map(|&x| x as u64).collect())
                    }
                    AtomicKind::Double => ConstValue::Double(vs.to_vec()),
                })
            }};
        }
        // Route everything through f64; exact for bool/i32/f32 and for the
        // i64 range the front end accepts for literals.
        let as_f64: Vec<f64> = match self {
            ConstValue::Bool(v) => v.iter().map(|&b| b as u8 as f64).collect(),
            ConstValue::Int32(v) => v.iter().map(|&x| x as f64).collect(),
            ConstValue::UInt32(v) => v.iter().map(|&x| x as f64).collect(),
            ConstValue::Float(v) => v.iter().map(|&x| x as f64).collect(),
            ConstValue::Int64(v) => v.iter().map(|&x| x as f64).collect(),
            ConstValue::UInt64(v) => v.iter().map(|&x| x as f64).collect(),
            ConstValue::Double(v) => v.clone(),
        };
        conv!(&as_f64)
    }

    /// Broadcast a one-lane constant to `width` lanes. Varying constants
    /// are returned unchanged.
    pub fn splat(&self, width: usize) -> ConstValue {
        macro_rules! sp {
            ($variant:ident, $v:expr) => {
                if $v.len() == 1 {
                    ConstValue::$variant(vec![$v[0]; width])
                } else {
                    self.clone()
                }
            };
        }
        match self {
            ConstValue::Bool(v) => sp!(Bool, v),
            ConstValue::Int32(v) => sp!(Int32, v),
            ConstValue::UInt32(v) => sp!(UInt32, v),
            ConstValue::Float(v) => sp!(Float, v),
            ConstValue::Int64(v) => sp!(Int64, v),
            ConstValue::UInt64(v) => sp!(UInt64, v),
            ConstValue::Double(v) => sp!(Double, v),
        }
    }
}

// =============================================================================
// Expressions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitNot,
    PreInc,
    PreDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Equal,
    NotEqual,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalOr,
}

impl BinaryOp {
    /// Comparison and logical operators produce a boolean result.
    pub fn is_bool_producing(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
                | BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::LogicalAnd
                | BinaryOp::LogicalOr
        )
    }
}

/// Expression node. The variant set is exactly what the all-lanes-off
/// safety analysis needs to distinguish; everything else about
/// expressions is behind the methods below and the per-pass free
/// functions.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Const { ty: Type, value: ConstValue },
    Symbol(SymbolId),
    FunctionSymbol { name: String, ty: Type },
    Sync,
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Assign { lhs: Box<Expr>, rhs: Box<Expr> },
    Select { test: Box<Expr>, if_true: Box<Expr>, if_false: Box<Expr> },
    List(Vec<Expr>),
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Index { base: Box<Expr>, index: Box<Expr> },
    Member { base: Box<Expr>, member: String },
    Deref(Box<Expr>),
    Ref(Box<Expr>),
    Cast { to: Type, expr: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: SourcePos,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: SourcePos) -> Self {
        Expr { kind, pos }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, ExprKind::List(_))
    }

    /// The type of this expression, or `None` if an upstream error left
    /// part of the tree untyped. Mirrors the black-box `GetType` query.
    pub fn get_type(&self, symtab: &SymbolTable) -> Option<Type> {
        match &self.kind {
            ExprKind::Const { ty, .. } => Some(ty.clone()),
            ExprKind::Symbol(id) => Some(symtab.get(*id).ty.clone()),
            ExprKind::FunctionSymbol { ty, .. } => Some(ty.clone()),
            ExprKind::Sync => Some(Type::Void),
            ExprKind::Unary { operand, .. } => operand.get_type(symtab),
            ExprKind::Binary { op, lhs, rhs } => {
                let lt = lhs.get_type(symtab)?;
                let rt = rhs.get_type(symtab)?;
                let variability = lt.variability().max(rt.variability());
                if op.is_bool_producing() {
                    Some(Type::atomic(AtomicKind::Bool, variability))
                } else {
                    Some(lt.as_non_const().with_variability(variability))
                }
            }
            ExprKind::Assign { lhs, .. } => Some(lhs.get_type(symtab)?.as_non_const()),
            ExprKind::Select { test, if_true, .. } => {
                let tt = test.get_type(symtab)?;
                let vt = if_true.get_type(symtab)?;
                Some(vt.with_variability(vt.variability().max(tt.variability())))
            }
            // An expression list has no single type; its elements are
            // typed individually at the use site.
            ExprKind::List(_) => None,
            ExprKind::Call { callee, .. } => match callee.get_type(symtab)? {
                Type::Function { ret, .. } => Some(*ret),
                _ => None,
            },
            ExprKind::Index { base, index } => {
                let mut bt = base.get_type(symtab)?;
                if let Type::Reference { target } = bt {
                    bt = *target;
                }
                let elem = bt.element_type(0)?;
                let it = index.get_type(symtab)?;
                Some(elem.with_variability(elem.variability().max(it.variability())))
            }
            ExprKind::Member { base, member } => {
                let mut bt = base.get_type(symtab)?;
                if let Type::Reference { target } = bt {
                    bt = *target;
                }
                bt.member_type(member)
            }
            ExprKind::Deref(inner) => match inner.get_type(symtab)? {
                Type::Reference { target } => Some(*target),
                _ => None,
            },
            ExprKind::Ref(inner) => Some(Type::Reference {
                target: Box::new(inner.get_type(symtab)?),
            }),
            ExprKind::Cast { to, .. } => Some(to.clone()),
        }
    }

    /// If this is a constant expression, its value converted to `ty`'s
    /// atomic kind. Used for static initializers and constant capture.
    pub fn get_constant(&self, ty: &Type) -> Option<ConstValue> {
        let ExprKind::Const { ty: cty, value } = &self.kind else {
            return None;
        };
        // A varying constant cannot initialize a uniform slot.
        if cty.is_varying() && ty.is_uniform() {
            return None;
        }
        match ty {
            Type::Atomic { kind, .. } => value.convert_to(*kind),
            Type::Enum { .. } => value.convert_to(AtomicKind::Int32),
            _ => None,
        }
    }

    /// Per-lane `i32` view of a constant expression, or `None` if this is
    /// not a constant.
    pub fn as_int32(&self) -> Option<Vec<i32>> {
        match &self.kind {
            ExprKind::Const { value, .. } => Some(value.as_int32()),
            _ => None,
        }
    }
}

// =============================================================================
// Statements
// =============================================================================

/// One `symbol = initializer` pair of a declaration statement. The symbol
/// is owned by the symbol table; only the initializer expression lives
/// here.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub sym: SymbolId,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for its side effects.
    Expr(Option<Expr>),
    Decl(Vec<VariableDeclaration>),
    If {
        test: Expr,
        then_stmts: Option<Box<Stmt>>,
        else_stmts: Option<Box<Stmt>>,
        /// The user wrote `cif`: emit a runtime all-on check.
        coherent: bool,
        /// Cached at construction: the test is varying, so the mixed-mask
        /// path needs an `any` gate.
        any_check: bool,
    },
    Do {
        test: Expr,
        body: Option<Box<Stmt>>,
        coherent: bool,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Option<Box<Stmt>>,
        coherent: bool,
    },
    Break {
        coherent: bool,
    },
    Continue {
        coherent: bool,
    },
    Return {
        value: Option<Expr>,
        coherent: bool,
    },
    /// Ordered statements; introduces a lexical scope.
    List(Vec<Stmt>),
    Print {
        format: String,
        values: Option<Expr>,
    },
    Assert {
        message: String,
        test: Expr,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: SourcePos,
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: SourcePos) -> Self {
        Stmt { kind, pos }
    }

    /// Build an `if`. The coherence request from the parser is dropped
    /// when coherent control flow is disabled, and the `any_check` flag is
    /// derived from the test's variability.
    pub fn if_stmt(
        test: Expr,
        then_stmts: Option<Stmt>,
        else_stmts: Option<Stmt>,
        coherent: bool,
        symtab: &SymbolTable,
        opts: &OptFlags,
        pos: SourcePos,
    ) -> Stmt {
        let any_check = test
            .get_type(symtab)
            .map(|t| t.is_varying())
            .unwrap_or(false);
        Stmt::new(
            StmtKind::If {
                test,
                then_stmts: then_stmts.map(Box::new),
                else_stmts: else_stmts.map(Box::new),
                coherent: coherent && !opts.disable_coherent_control_flow,
                any_check,
            },
            pos,
        )
    }

    pub fn do_stmt(
        test: Expr,
        body: Option<Stmt>,
        coherent: bool,
        opts: &OptFlags,
        pos: SourcePos,
    ) -> Stmt {
        Stmt::new(
            StmtKind::Do {
                test,
                body: body.map(Box::new),
                coherent: coherent && !opts.disable_coherent_control_flow,
            },
            pos,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn for_stmt(
        init: Option<Stmt>,
        test: Option<Expr>,
        step: Option<Stmt>,
        body: Option<Stmt>,
        coherent: bool,
        opts: &OptFlags,
        pos: SourcePos,
    ) -> Stmt {
        Stmt::new(
            StmtKind::For {
                init: init.map(Box::new),
                test,
                step: step.map(Box::new),
                body: body.map(Box::new),
                coherent: coherent && !opts.disable_coherent_control_flow,
            },
            pos,
        )
    }

    pub fn break_stmt(coherent: bool, opts: &OptFlags, pos: SourcePos) -> Stmt {
        Stmt::new(
            StmtKind::Break {
                coherent: coherent && !opts.disable_coherent_control_flow,
            },
            pos,
        )
    }

    pub fn continue_stmt(coherent: bool, opts: &OptFlags, pos: SourcePos) -> Stmt {
        Stmt::new(
            StmtKind::Continue {
                coherent: coherent && !opts.disable_coherent_control_flow,
            },
            pos,
        )
    }

    pub fn return_stmt(
        value: Option<Expr>,
        coherent: bool,
        opts: &OptFlags,
        pos: SourcePos,
    ) -> Stmt {
        Stmt::new(
            StmtKind::Return {
                value,
                coherent: coherent && !opts.disable_coherent_control_flow,
            },
            pos,
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, StmtKind::List(_))
    }
}
