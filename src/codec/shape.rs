//! Output shapes
//!
//! A destination type describes itself once through [`Queryable::shape`] and
//! hands out typed mutable handles ([`Slot`]) to its parts during decoding.
//! Records register their fields with the [`queryable!`](crate::queryable)
//! macro; decoders address those fields by index into the registered list.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use uuid::Uuid;

use super::types::{BigInt, Decimal, Duration, RelativeDuration};
use crate::descriptor::ScalarType;

/// Static description of a destination type.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Scalar(ScalarType),
    /// Can represent a missing value.
    Optional(Box<Shape>),
    Record {
        type_name: &'static str,
        fields: Vec<FieldShape>,
    },
    Tuple(Vec<Shape>),
    Sequence(Box<Shape>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldShape {
    pub name: &'static str,
    pub shape: Shape,
}

impl Shape {
    pub fn is_optional(&self) -> bool {
        matches!(self, Shape::Optional(_))
    }

    /// Rust-side type name used in error messages.
    pub fn type_name(&self) -> String {
        match self {
            Shape::Scalar(kind) => scalar_type_name(*kind).to_string(),
            Shape::Optional(inner) => format!("Option<{}>", inner.type_name()),
            Shape::Record { type_name, .. } => type_name.to_string(),
            Shape::Tuple(elements) => {
                let names: Vec<String> = elements.iter().map(Shape::type_name).collect();
                if names.len() == 1 {
                    format!("({},)", names[0])
                } else {
                    format!("({})", names.join(", "))
                }
            }
            Shape::Sequence(inner) => format!("Vec<{}>", inner.type_name()),
        }
    }
}

fn scalar_type_name(kind: ScalarType) -> &'static str {
    match kind {
        ScalarType::Uuid => "Uuid",
        ScalarType::Str => "String",
        ScalarType::Bytes => "Bytes",
        ScalarType::Int16 => "i16",
        ScalarType::Int32 => "i32",
        ScalarType::Int64 => "i64",
        ScalarType::Float32 => "f32",
        ScalarType::Float64 => "f64",
        ScalarType::Decimal => "Decimal",
        ScalarType::Bool => "bool",
        ScalarType::DateTime => "DateTime<Utc>",
        ScalarType::LocalDateTime => "NaiveDateTime",
        ScalarType::LocalDate => "NaiveDate",
        ScalarType::LocalTime => "NaiveTime",
        ScalarType::Duration => "Duration",
        ScalarType::Json => "serde_json::Value",
        ScalarType::BigInt => "BigInt",
        ScalarType::RelativeDuration => "RelativeDuration",
    }
}

/// Typed mutable handle to one part of a destination.
pub enum Slot<'a> {
    Uuid(&'a mut Uuid),
    Str(&'a mut String),
    Bytes(&'a mut Bytes),
    Int16(&'a mut i16),
    Int32(&'a mut i32),
    Int64(&'a mut i64),
    Float32(&'a mut f32),
    Float64(&'a mut f64),
    Decimal(&'a mut Decimal),
    Bool(&'a mut bool),
    DateTime(&'a mut DateTime<Utc>),
    LocalDateTime(&'a mut NaiveDateTime),
    LocalDate(&'a mut NaiveDate),
    LocalTime(&'a mut NaiveTime),
    Duration(&'a mut Duration),
    Json(&'a mut serde_json::Value),
    BigInt(&'a mut BigInt),
    RelativeDuration(&'a mut RelativeDuration),
    Optional(&'a mut dyn OptionalSlot),
    Record(&'a mut dyn RecordSlot),
    Sequence(&'a mut dyn SequenceSlot),
}

impl Slot<'_> {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Slot::Uuid(_) => "Uuid",
            Slot::Str(_) => "String",
            Slot::Bytes(_) => "Bytes",
            Slot::Int16(_) => "i16",
            Slot::Int32(_) => "i32",
            Slot::Int64(_) => "i64",
            Slot::Float32(_) => "f32",
            Slot::Float64(_) => "f64",
            Slot::Decimal(_) => "Decimal",
            Slot::Bool(_) => "bool",
            Slot::DateTime(_) => "DateTime<Utc>",
            Slot::LocalDateTime(_) => "NaiveDateTime",
            Slot::LocalDate(_) => "NaiveDate",
            Slot::LocalTime(_) => "NaiveTime",
            Slot::Duration(_) => "Duration",
            Slot::Json(_) => "serde_json::Value",
            Slot::BigInt(_) => "BigInt",
            Slot::RelativeDuration(_) => "RelativeDuration",
            Slot::Optional(_) => "optional",
            Slot::Record(_) => "record",
            Slot::Sequence(_) => "sequence",
        }
    }
}

/// A type rows can be decoded into.
pub trait Queryable {
    fn shape() -> Shape
    where
        Self: Sized;

    fn slot(&mut self) -> Slot<'_>;
}

/// A destination that can be marked absent.
///
/// `Option<T>` is the built-in implementation; other wrappers may opt in by
/// returning [`Shape::Optional`] from their shape.
pub trait OptionalSlot {
    fn set_missing(&mut self);

    /// Mark the value present and return a handle to fill it in.
    fn set_present(&mut self) -> Slot<'_>;
}

/// Records and tuples: handles to every field in registration order.
pub trait RecordSlot {
    fn slots(&mut self) -> Vec<Slot<'_>>;
}

/// Variable-length sequences.
pub trait SequenceSlot {
    fn clear(&mut self);

    /// Append a default element and return a handle to it.
    fn push_default(&mut self) -> Slot<'_>;
}

macro_rules! impl_scalar {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl Queryable for $ty {
                fn shape() -> Shape {
                    Shape::Scalar(ScalarType::$kind)
                }

                fn slot(&mut self) -> Slot<'_> {
                    Slot::$kind(self)
                }
            }
        )*
    };
}

impl_scalar! {
    Uuid => Uuid,
    String => Str,
    Bytes => Bytes,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    Decimal => Decimal,
    bool => Bool,
    DateTime<Utc> => DateTime,
    NaiveDateTime => LocalDateTime,
    NaiveDate => LocalDate,
    NaiveTime => LocalTime,
    Duration => Duration,
    serde_json::Value => Json,
    BigInt => BigInt,
    RelativeDuration => RelativeDuration,
}

impl<T: Queryable + Default> Queryable for Option<T> {
    fn shape() -> Shape {
        Shape::Optional(Box::new(T::shape()))
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Optional(self)
    }
}

impl<T: Queryable + Default> OptionalSlot for Option<T> {
    fn set_missing(&mut self) {
        *self = None;
    }

    fn set_present(&mut self) -> Slot<'_> {
        self.insert(T::default()).slot()
    }
}

impl<T: Queryable + Default> Queryable for Vec<T> {
    fn shape() -> Shape {
        Shape::Sequence(Box::new(T::shape()))
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Sequence(self)
    }
}

impl<T: Queryable + Default> SequenceSlot for Vec<T> {
    fn clear(&mut self) {
        Vec::clear(self);
    }

    fn push_default(&mut self) -> Slot<'_> {
        let idx = self.len();
        self.push(T::default());
        self[idx].slot()
    }
}

impl Queryable for () {
    fn shape() -> Shape {
        Shape::Tuple(Vec::new())
    }

    fn slot(&mut self) -> Slot<'_> {
        Slot::Record(self)
    }
}

impl RecordSlot for () {
    fn slots(&mut self) -> Vec<Slot<'_>> {
        Vec::new()
    }
}

macro_rules! impl_tuple {
    ($($name:ident $idx:tt),+) => {
        impl<$($name: Queryable),+> Queryable for ($($name,)+) {
            fn shape() -> Shape {
                Shape::Tuple(vec![$($name::shape()),+])
            }

            fn slot(&mut self) -> Slot<'_> {
                Slot::Record(self)
            }
        }

        impl<$($name: Queryable),+> RecordSlot for ($($name,)+) {
            fn slots(&mut self) -> Vec<Slot<'_>> {
                vec![$(self.$idx.slot()),+]
            }
        }
    };
}

impl_tuple!(A 0);
impl_tuple!(A 0, B 1);
impl_tuple!(A 0, B 1, C 2);
impl_tuple!(A 0, B 1, C 2, D 3);
impl_tuple!(A 0, B 1, C 2, D 3, E 4);
impl_tuple!(A 0, B 1, C 2, D 3, E 4, F 5);

/// Register a struct as a record destination.
///
/// Fields are matched to descriptor fields by name; `as "name"` overrides the
/// wire name.
///
/// ```
/// use edgewire::queryable;
///
/// #[derive(Debug, Default)]
/// struct User {
///     name: String,
///     age: Option<i32>,
///     kind: String,
/// }
///
/// queryable!(User { name: String, age: Option<i32>, kind as "type": String });
/// ```
#[macro_export]
macro_rules! queryable {
    (@name $field:ident) => {
        stringify!($field)
    };
    (@name $field:ident $wire:literal) => {
        $wire
    };
    ($ty:ident { $($field:ident $(as $wire:literal)? : $fty:ty),* $(,)? }) => {
        impl $crate::codec::Queryable for $ty {
            fn shape() -> $crate::codec::Shape {
                $crate::codec::Shape::Record {
                    type_name: stringify!($ty),
                    fields: vec![$(
                        $crate::codec::FieldShape {
                            name: $crate::queryable!(@name $field $($wire)?),
                            shape: <$fty as $crate::codec::Queryable>::shape(),
                        }
                    ),*],
                }
            }

            fn slot(&mut self) -> $crate::codec::Slot<'_> {
                $crate::codec::Slot::Record(self)
            }
        }

        impl $crate::codec::RecordSlot for $ty {
            fn slots(&mut self) -> Vec<$crate::codec::Slot<'_>> {
                vec![$($crate::codec::Queryable::slot(&mut self.$field)),*]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Point {
        x: i32,
        label: Option<String>,
    }

    crate::queryable!(Point { x: i32, label as "name": Option<String> });

    #[test]
    fn test_record_shape() {
        match Point::shape() {
            Shape::Record { type_name, fields } => {
                assert_eq!(type_name, "Point");
                assert_eq!(fields[0].name, "x");
                assert_eq!(fields[0].shape, Shape::Scalar(ScalarType::Int32));
                assert_eq!(fields[1].name, "name");
                assert!(fields[1].shape.is_optional());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_record_slots_write_through() {
        let mut p = Point::default();
        if let Slot::Record(rec) = p.slot() {
            let mut slots = rec.slots();
            if let Slot::Int32(x) = &mut slots[0] {
                **x = 7;
            }
            if let Slot::Optional(label) = &mut slots[1] {
                if let Slot::Str(s) = label.set_present() {
                    s.push_str("origin");
                }
            }
        }
        assert_eq!(p.x, 7);
        assert_eq!(p.label.as_deref(), Some("origin"));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(<Vec<Option<i64>>>::shape().type_name(), "Vec<Option<i64>>");
        assert_eq!(<(i32, String)>::shape().type_name(), "(i32, String)");
        assert_eq!(<(bool,)>::shape().type_name(), "(bool,)");
        assert_eq!(<()>::shape().type_name(), "()");
    }

    #[test]
    fn test_sequence_slot() {
        let mut v: Vec<i16> = vec![1, 2, 3];
        SequenceSlot::clear(&mut v);
        if let Slot::Int16(x) = v.push_default() {
            *x = 9;
        }
        assert_eq!(v, vec![9]);
    }
}
