//! Type descriptors
//!
//! The server describes the argument and result types of a statement as a
//! flat list of descriptor records. Compound records refer to earlier
//! records by position, so a parsed descriptor is a DAG of shared
//! [`Descriptor`] nodes rooted at the last record of the stream.

mod parser;

pub use parser::{parse_descriptor_pair, parse_descriptors};

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::driver::protocol::Cardinality;

/// ID of the empty tuple, used when a statement takes no arguments.
pub const EMPTY_TUPLE_ID: Uuid = Uuid::from_u128(0xFF);

/// Descriptor record tags.
pub mod tag {
    pub const SET: u8 = 0;
    pub const OBJECT_SHAPE: u8 = 1;
    pub const BASE_SCALAR: u8 = 2;
    pub const SCALAR: u8 = 3;
    pub const TUPLE: u8 = 4;
    pub const NAMED_TUPLE: u8 = 5;
    pub const ARRAY: u8 = 6;
    pub const ENUM: u8 = 7;
    /// Tags at or above this value are type annotations.
    pub const ANNOTATION_MIN: u8 = 0x80;
}

/// Object-shape element flags.
pub mod flag {
    pub const IMPLICIT: u32 = 1 << 0;
    pub const LINK_PROPERTY: u32 = 1 << 1;
    pub const LINK: u32 = 1 << 2;
}

/// Built-in scalar types with a fixed binary encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Uuid,
    Str,
    Bytes,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    Bool,
    DateTime,
    LocalDateTime,
    LocalDate,
    LocalTime,
    Duration,
    Json,
    BigInt,
    RelativeDuration,
}

impl ScalarType {
    pub const ALL: [ScalarType; 18] = [
        ScalarType::Uuid,
        ScalarType::Str,
        ScalarType::Bytes,
        ScalarType::Int16,
        ScalarType::Int32,
        ScalarType::Int64,
        ScalarType::Float32,
        ScalarType::Float64,
        ScalarType::Decimal,
        ScalarType::Bool,
        ScalarType::DateTime,
        ScalarType::LocalDateTime,
        ScalarType::LocalDate,
        ScalarType::LocalTime,
        ScalarType::Duration,
        ScalarType::Json,
        ScalarType::BigInt,
        ScalarType::RelativeDuration,
    ];

    /// Well-known base scalar ID (`00000000-0000-0000-0000-0000000001xx`).
    pub fn base_id(self) -> Uuid {
        let low = match self {
            ScalarType::Uuid => 0x100,
            ScalarType::Str => 0x101,
            ScalarType::Bytes => 0x102,
            ScalarType::Int16 => 0x103,
            ScalarType::Int32 => 0x104,
            ScalarType::Int64 => 0x105,
            ScalarType::Float32 => 0x106,
            ScalarType::Float64 => 0x107,
            ScalarType::Decimal => 0x108,
            ScalarType::Bool => 0x109,
            ScalarType::DateTime => 0x10A,
            ScalarType::LocalDateTime => 0x10B,
            ScalarType::LocalDate => 0x10C,
            ScalarType::LocalTime => 0x10D,
            ScalarType::Duration => 0x10E,
            ScalarType::Json => 0x10F,
            ScalarType::BigInt => 0x110,
            ScalarType::RelativeDuration => 0x111,
        };
        Uuid::from_u128(low)
    }

    pub fn from_base_id(id: &Uuid) -> Option<Self> {
        ScalarType::ALL
            .iter()
            .copied()
            .find(|kind| kind.base_id() == *id)
    }

    /// Server-side type name.
    pub fn name(self) -> &'static str {
        match self {
            ScalarType::Uuid => "std::uuid",
            ScalarType::Str => "std::str",
            ScalarType::Bytes => "std::bytes",
            ScalarType::Int16 => "std::int16",
            ScalarType::Int32 => "std::int32",
            ScalarType::Int64 => "std::int64",
            ScalarType::Float32 => "std::float32",
            ScalarType::Float64 => "std::float64",
            ScalarType::Decimal => "std::decimal",
            ScalarType::Bool => "std::bool",
            ScalarType::DateTime => "std::datetime",
            ScalarType::LocalDateTime => "cal::local_datetime",
            ScalarType::LocalDate => "cal::local_date",
            ScalarType::LocalTime => "cal::local_time",
            ScalarType::Duration => "std::duration",
            ScalarType::Json => "std::json",
            ScalarType::BigInt => "std::bigint",
            ScalarType::RelativeDuration => "cal::relative_duration",
        }
    }
}

/// One node of a descriptor tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub id: Uuid,
    pub kind: DescriptorKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DescriptorKind {
    Set {
        element: Arc<Descriptor>,
    },
    Object {
        elements: Vec<ShapeElement>,
    },
    BaseScalar,
    Scalar {
        base: Arc<Descriptor>,
    },
    Tuple {
        elements: Vec<Arc<Descriptor>>,
    },
    NamedTuple {
        elements: Vec<TupleElement>,
    },
    Array {
        element: Arc<Descriptor>,
        dimensions: Vec<i32>,
    },
    Enum {
        members: Vec<String>,
    },
    Annotation {
        tag: u8,
        text: String,
    },
}

/// Field of an object shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeElement {
    pub flags: u32,
    pub cardinality: Cardinality,
    pub name: String,
    pub descriptor: Arc<Descriptor>,
}

impl ShapeElement {
    pub fn is_implicit(&self) -> bool {
        self.flags & flag::IMPLICIT != 0
    }

    pub fn is_link_property(&self) -> bool {
        self.flags & flag::LINK_PROPERTY != 0
    }

    pub fn is_link(&self) -> bool {
        self.flags & flag::LINK != 0
    }

    pub fn is_required(&self) -> bool {
        self.cardinality.is_required()
    }
}

/// Field of a named tuple. Named tuple fields are always present.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleElement {
    pub name: String,
    pub descriptor: Arc<Descriptor>,
}

impl Descriptor {
    /// The designated "no arguments / empty shape" descriptor.
    pub fn empty() -> Arc<Descriptor> {
        Arc::new(Descriptor {
            id: EMPTY_TUPLE_ID,
            kind: DescriptorKind::Tuple {
                elements: Vec::new(),
            },
        })
    }

    pub fn is_empty_tuple(&self) -> bool {
        matches!(&self.kind, DescriptorKind::Tuple { elements } if elements.is_empty())
    }

    /// Resolve scalar aliases down to a built-in scalar type.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match &self.kind {
            DescriptorKind::BaseScalar => ScalarType::from_base_id(&self.id),
            DescriptorKind::Scalar { base } => base.scalar_type(),
            _ => None,
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DescriptorKind::BaseScalar | DescriptorKind::Scalar { .. } => match self.scalar_type() {
                Some(kind) => write!(f, "{}", kind.name()),
                None => write!(f, "scalar {}", self.id),
            },
            DescriptorKind::Set { element } => write!(f, "set<{}>", element),
            DescriptorKind::Array { element, .. } => write!(f, "array<{}>", element),
            DescriptorKind::Tuple { elements } => {
                write!(f, "tuple<")?;
                for (i, el) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", el)?;
                }
                write!(f, ">")
            }
            DescriptorKind::NamedTuple { elements } => {
                write!(f, "tuple<")?;
                for (i, el) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", el.name, el.descriptor)?;
                }
                write!(f, ">")
            }
            DescriptorKind::Object { .. } => write!(f, "object"),
            DescriptorKind::Enum { .. } => write!(f, "enum"),
            DescriptorKind::Annotation { text, .. } => write!(f, "annotation {:?}", text),
        }
    }
}

/// Argument and result descriptors of one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorPair {
    pub input: Arc<Descriptor>,
    pub output: Arc<Descriptor>,
}

impl DescriptorPair {
    pub fn ids(&self) -> (Uuid, Uuid) {
        (self.input.id, self.output.id)
    }
}
