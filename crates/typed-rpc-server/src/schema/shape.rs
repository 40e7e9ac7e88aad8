//! The "describe your shape" capability
//!
//! Every parameter and result type reports a [`Shape`]. Records list their
//! fields as lazy thunks, so a record may refer to itself without the shape
//! becoming infinite; the reflector walks the thunks on demand.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// Wire-level classification of a base type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Struct,
    Map,
    Any,
    Null,
    /// Reported by the type itself, e.g. a timestamp that travels as a string
    Overridden(&'static str),
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Uint => "uint",
            Kind::Float => "float",
            Kind::String => "string",
            Kind::Struct => "struct",
            Kind::Map => "map",
            Kind::Any => "any",
            Kind::Null => "null",
            Kind::Overridden(kind) => kind,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Kind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Structural description of a type
#[derive(Debug, Clone)]
pub enum Shape {
    Primitive {
        name: &'static str,
        kind: Kind,
    },
    /// A nullable or indirect layer (`Option`, `Box`, `Arc`, `Rc`)
    Pointer(Box<Shape>),
    /// A sequence layer (`Vec`, arrays, sets)
    Array(Box<Shape>),
    Map {
        key: Box<Shape>,
        value: Box<Shape>,
    },
    Record(RecordShape),
    /// A named type that reports its own wire kind and is never expanded
    Override {
        name: &'static str,
        package: &'static str,
        kind: &'static str,
    },
}

impl Shape {
    pub fn primitive(name: &'static str, kind: Kind) -> Self {
        Shape::Primitive { name, kind }
    }

    pub fn pointer(inner: Shape) -> Self {
        Shape::Pointer(Box::new(inner))
    }

    pub fn array(inner: Shape) -> Self {
        Shape::Array(Box::new(inner))
    }

    pub fn map(key: Shape, value: Shape) -> Self {
        Shape::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, Shape::Record(_))
    }
}

/// A record with named fields. `name` is `None` for anonymous records.
#[derive(Debug, Clone)]
pub struct RecordShape {
    pub name: Option<&'static str>,
    pub package: &'static str,
    pub fields: Vec<FieldShape>,
}

#[derive(Debug, Clone)]
pub struct FieldShape {
    /// Field name as written in Rust
    pub name: &'static str,
    /// Member name on the wire
    pub wire_name: &'static str,
    /// Validation rule tokens, e.g. `["required", "min=1"]`
    pub rules: &'static [&'static str],
    pub shape: fn() -> Shape,
}

impl FieldShape {
    pub fn new(name: &'static str, shape: fn() -> Shape) -> Self {
        Self {
            name,
            wire_name: name,
            rules: &[],
            shape,
        }
    }

    pub fn is_required(&self) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.trim().starts_with("required"))
    }
}

/// Implemented by every type that can appear in a method signature.
///
/// Derive it for records with `#[derive(Describe)]`.
pub trait Describe {
    fn shape() -> Shape;
}

macro_rules! describe_primitive {
    ($($ty:ty => $name:literal, $kind:ident;)*) => {
        $(
            impl Describe for $ty {
                fn shape() -> Shape {
                    Shape::primitive($name, Kind::$kind)
                }
            }
        )*
    };
}

describe_primitive! {
    bool => "bool", Bool;
    i8 => "i8", Int;
    i16 => "i16", Int;
    i32 => "i32", Int;
    i64 => "i64", Int;
    i128 => "i128", Int;
    isize => "isize", Int;
    u8 => "u8", Uint;
    u16 => "u16", Uint;
    u32 => "u32", Uint;
    u64 => "u64", Uint;
    u128 => "u128", Uint;
    usize => "usize", Uint;
    f32 => "f32", Float;
    f64 => "f64", Float;
    char => "char", String;
    String => "String", String;
    str => "str", String;
    () => "()", Null;
    Value => "Value", Any;
}

macro_rules! describe_wrapper {
    ($variant:ident: $($ty:ident),*) => {
        $(
            impl<T: Describe> Describe for $ty<T> {
                fn shape() -> Shape {
                    Shape::$variant(Box::new(T::shape()))
                }
            }
        )*
    };
}

describe_wrapper!(Pointer: Option, Box, Arc, Rc);
describe_wrapper!(Array: Vec, VecDeque, BTreeSet);

// References serialize as their target
impl<T: Describe + ?Sized> Describe for &T {
    fn shape() -> Shape {
        T::shape()
    }
}

impl<T: Describe, S> Describe for HashSet<T, S> {
    fn shape() -> Shape {
        Shape::array(T::shape())
    }
}

impl<T: Describe, const N: usize> Describe for [T; N] {
    fn shape() -> Shape {
        Shape::array(T::shape())
    }
}

impl<K: Describe, V: Describe, S> Describe for HashMap<K, V, S> {
    fn shape() -> Shape {
        Shape::map(K::shape(), V::shape())
    }
}

impl<K: Describe, V: Describe> Describe for BTreeMap<K, V> {
    fn shape() -> Shape {
        Shape::map(K::shape(), V::shape())
    }
}

// Tuples travel as JSON arrays but have a fixed, positional layout, so they
// are described as anonymous records with numbered fields.
macro_rules! describe_tuple {
    ($(($($idx:literal $param:ident),+))*) => {
        $(
            impl<$($param: Describe),+> Describe for ($($param,)+) {
                fn shape() -> Shape {
                    Shape::Record(RecordShape {
                        name: None,
                        package: "",
                        fields: vec![$(FieldShape::new($idx, $param::shape)),+],
                    })
                }
            }
        )*
    };
}

describe_tuple! {
    ("0" A, "1" B)
    ("0" A, "1" B, "2" C)
    ("0" A, "1" B, "2" C, "3" D)
}
