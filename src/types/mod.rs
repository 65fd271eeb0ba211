//! The Lane C type model.
//!
//! Types arrive fully resolved from the front end; this module only has
//! to answer capability questions (uniform/varying, const, numeric,
//! collection shape) and map each type to its lowered IR representation.
//! There is no inference here: uniform/varying is an explicit qualifier
//! and every composite carries its concrete element types.

pub mod checker;

use crate::ir::{IrType, ScalarKind};
use crate::TargetInfo;

/// Whether all lanes share one value (scalar storage) or each lane has
/// its own (vector storage). `Ord` so that combining two operands is
/// `a.max(b)`: varying is contagious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variability {
    Uniform,
    Varying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicKind {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float,
    Int64,
    UInt64,
    Double,
}

impl AtomicKind {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            AtomicKind::Int8
                | AtomicKind::UInt8
                | AtomicKind::Int16
                | AtomicKind::UInt16
                | AtomicKind::Int32
                | AtomicKind::UInt32
                | AtomicKind::Int64
                | AtomicKind::UInt64
        )
    }

    /// The 8- and 16-bit kinds, which `print` silently widens to 32 bits.
    pub fn is_small_integer(&self) -> bool {
        matches!(
            self,
            AtomicKind::Int8 | AtomicKind::UInt8 | AtomicKind::Int16 | AtomicKind::UInt16
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            AtomicKind::Int8 | AtomicKind::Int16 | AtomicKind::Int32 | AtomicKind::Int64
        )
    }

    fn name(&self) -> &'static str {
        match self {
            AtomicKind::Bool => "bool",
            AtomicKind::Int8 => "int8",
            AtomicKind::UInt8 => "unsigned int8",
            AtomicKind::Int16 => "int16",
            AtomicKind::UInt16 => "unsigned int16",
            AtomicKind::Int32 => "int32",
            AtomicKind::UInt32 => "unsigned int32",
            AtomicKind::Float => "float",
            AtomicKind::Int64 => "int64",
            AtomicKind::UInt64 => "unsigned int64",
            AtomicKind::Double => "double",
        }
    }

    fn scalar_kind(&self) -> ScalarKind {
        match self {
            AtomicKind::Bool => ScalarKind::I1,
            AtomicKind::Int8 | AtomicKind::UInt8 => ScalarKind::I8,
            AtomicKind::Int16 | AtomicKind::UInt16 => ScalarKind::I16,
            AtomicKind::Int32 | AtomicKind::UInt32 => ScalarKind::I32,
            AtomicKind::Float => ScalarKind::F32,
            AtomicKind::Int64 | AtomicKind::UInt64 => ScalarKind::I64,
            AtomicKind::Double => ScalarKind::F64,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Void,
    Atomic {
        kind: AtomicKind,
        variability: Variability,
        is_const: bool,
    },
    Enum {
        name: String,
        variability: Variability,
        is_const: bool,
    },
    /// A reference wraps its target type; references themselves have no
    /// uniform/varying qualifier of their own.
    Reference {
        target: Box<Type>,
    },
    Struct {
        name: String,
        fields: Vec<(String, Type)>,
        is_const: bool,
    },
    /// `count == 0` marks a deferred-size array: the declaration's brace
    /// initializer fixes the real count at lowering time.
    Array {
        element: Box<Type>,
        count: u32,
    },
    /// Short vector (`float<3>` style), distinct from the SPMD lanes.
    Vector {
        element: Box<Type>,
        count: u32,
    },
    Function {
        ret: Box<Type>,
        params: Vec<Type>,
    },
}

impl Type {
    pub fn atomic(kind: AtomicKind, variability: Variability) -> Type {
        Type::Atomic {
            kind,
            variability,
            is_const: false,
        }
    }

    pub fn uniform_bool() -> Type {
        Type::atomic(AtomicKind::Bool, Variability::Uniform)
    }

    pub fn varying_bool() -> Type {
        Type::atomic(AtomicKind::Bool, Variability::Varying)
    }

    pub fn uniform_int32() -> Type {
        Type::atomic(AtomicKind::Int32, Variability::Uniform)
    }

    pub fn varying_int32() -> Type {
        Type::atomic(AtomicKind::Int32, Variability::Varying)
    }

    pub fn uniform_float() -> Type {
        Type::atomic(AtomicKind::Float, Variability::Uniform)
    }

    pub fn varying_float() -> Type {
        Type::atomic(AtomicKind::Float, Variability::Varying)
    }

    pub fn as_const(self) -> Type {
        match self {
            Type::Atomic { kind, variability, .. } => Type::Atomic {
                kind,
                variability,
                is_const: true,
            },
            Type::Enum { name, variability, .. } => Type::Enum {
                name,
                variability,
                is_const: true,
            },
            Type::Struct { name, fields, .. } => Type::Struct {
                name,
                fields,
                is_const: true,
            },
            other => other,
        }
    }

    pub fn variability(&self) -> Variability {
        match self {
            Type::Atomic { variability, .. } | Type::Enum { variability, .. } => *variability,
            Type::Reference { target } => target.variability(),
            Type::Array { element, .. } | Type::Vector { element, .. } => element.variability(),
            Type::Struct { fields, .. } => fields
                .iter()
                .map(|(_, t)| t.variability())
                .max()
                .unwrap_or(Variability::Uniform),
            Type::Void | Type::Function { .. } => Variability::Uniform,
        }
    }

    pub fn is_uniform(&self) -> bool {
        self.variability() == Variability::Uniform
    }

    pub fn is_varying(&self) -> bool {
        self.variability() == Variability::Varying
    }

    pub fn is_const(&self) -> bool {
        match self {
            Type::Atomic { is_const, .. }
            | Type::Enum { is_const, .. }
            | Type::Struct { is_const, .. } => *is_const,
            _ => false,
        }
    }

    pub fn is_bool(&self) -> bool {
        matches!(
            self,
            Type::Atomic {
                kind: AtomicKind::Bool,
                ..
            }
        )
    }

    pub fn is_numeric(&self) -> bool {
        match self {
            Type::Atomic { kind, .. } => *kind != AtomicKind::Bool,
            _ => false,
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, Type::Atomic { .. })
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, Type::Enum { .. })
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Type::Reference { .. })
    }

    /// Structs, arrays, and short vectors: anything with an element count
    /// and per-index element types.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            Type::Struct { .. } | Type::Array { .. } | Type::Vector { .. }
        )
    }

    /// Arrays and short vectors: homogeneous collections.
    pub fn is_sequential(&self) -> bool {
        matches!(self, Type::Array { .. } | Type::Vector { .. })
    }

    pub fn element_count(&self) -> Option<u32> {
        match self {
            Type::Struct { fields, .. } => Some(fields.len() as u32),
            Type::Array { count, .. } | Type::Vector { count, .. } => Some(*count),
            _ => None,
        }
    }

    pub fn element_type(&self, i: u32) -> Option<Type> {
        match self {
            Type::Struct { fields, .. } => fields.get(i as usize).map(|(_, t)| t.clone()),
            Type::Array { element, .. } | Type::Vector { element, .. } => {
                Some(element.as_ref().clone())
            }
            _ => None,
        }
    }

    pub fn member_type(&self, name: &str) -> Option<Type> {
        match self {
            Type::Struct { fields, .. } => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t.clone()),
            _ => None,
        }
    }

    /// Strip the top-level `const` qualifier.
    pub fn as_non_const(&self) -> Type {
        match self {
            Type::Atomic { kind, variability, .. } => Type::Atomic {
                kind: *kind,
                variability: *variability,
                is_const: false,
            },
            Type::Enum { name, variability, .. } => Type::Enum {
                name: name.clone(),
                variability: *variability,
                is_const: false,
            },
            Type::Struct { name, fields, .. } => Type::Struct {
                name: name.clone(),
                fields: fields.clone(),
                is_const: false,
            },
            other => other.clone(),
        }
    }

    pub fn as_uniform(&self) -> Type {
        self.with_variability(Variability::Uniform)
    }

    pub fn with_variability(&self, variability: Variability) -> Type {
        match self {
            Type::Atomic { kind, is_const, .. } => Type::Atomic {
                kind: *kind,
                variability,
                is_const: *is_const,
            },
            Type::Enum { name, is_const, .. } => Type::Enum {
                name: name.clone(),
                variability,
                is_const: *is_const,
            },
            Type::Array { element, count } => Type::Array {
                element: Box::new(element.with_variability(variability)),
                count: *count,
            },
            Type::Vector { element, count } => Type::Vector {
                element: Box::new(element.with_variability(variability)),
                count: *count,
            },
            other => other.clone(),
        }
    }

    /// The sized variant of a deferred-size array.
    pub fn get_sized_array(&self, count: u32) -> Option<Type> {
        match self {
            Type::Array { element, .. } => Some(Type::Array {
                element: element.clone(),
                count,
            }),
            _ => None,
        }
    }

    /// The backend representation of this type: uniform atomics become
    /// scalars, varying atomics become `<W x ty>` vectors, composites map
    /// element-wise. `Function` and unsized arrays have no lowered form.
    pub fn lowered(&self, target: &TargetInfo) -> Option<IrType> {
        match self {
            Type::Void => Some(IrType::Void),
            Type::Atomic {
                kind, variability, ..
            } => {
                let scalar = kind.scalar_kind();
                Some(match variability {
                    Variability::Uniform => IrType::Scalar(scalar),
                    Variability::Varying => IrType::Vector {
                        elem: scalar,
                        width: target.vector_width,
                    },
                })
            }
            Type::Enum { variability, .. } => Some(match variability {
                Variability::Uniform => IrType::Scalar(ScalarKind::I32),
                Variability::Varying => IrType::Vector {
                    elem: ScalarKind::I32,
                    width: target.vector_width,
                },
            }),
            Type::Reference { target: t } => Some(IrType::Ptr(Box::new(t.lowered(target)?))),
            Type::Struct { fields, .. } => {
                let fields = fields
                    .iter()
                    .map(|(_, t)| t.lowered(target))
                    .collect::<Option<Vec<_>>>()?;
                Some(IrType::Struct { fields })
            }
            Type::Array { element, count } => {
                if *count == 0 {
                    return None;
                }
                Some(IrType::Array {
                    elem: Box::new(element.lowered(target)?),
                    count: *count,
                })
            }
            Type::Vector { element, count } => Some(IrType::Array {
                elem: Box::new(element.lowered(target)?),
                count: *count,
            }),
            Type::Function { .. } => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Atomic {
                kind,
                variability,
                is_const,
            } => {
                if *is_const {
                    write!(f, "const ")?;
                }
                match variability {
                    Variability::Uniform => write!(f, "uniform {}", kind.name()),
                    Variability::Varying => write!(f, "varying {}", kind.name()),
                }
            }
            Type::Enum {
                name,
                variability,
                is_const,
            } => {
                if *is_const {
                    write!(f, "const ")?;
                }
                match variability {
                    Variability::Uniform => write!(f, "uniform enum {}", name),
                    Variability::Varying => write!(f, "varying enum {}", name),
                }
            }
            Type::Reference { target } => write!(f, "{} &", target),
            Type::Struct { name, is_const, .. } => {
                if *is_const {
                    write!(f, "const ")?;
                }
                write!(f, "struct {}", name)
            }
            Type::Array { element, count } => {
                if *count == 0 {
                    write!(f, "{}[]", element)
                } else {
                    write!(f, "{}[{}]", element, count)
                }
            }
            Type::Vector { element, count } => write!(f, "{}<{}>", element, count),
            Type::Function { ret, params } => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", ret)
            }
        }
    }
}
