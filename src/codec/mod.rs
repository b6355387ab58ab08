//! Codecs
//!
//! A codec pairs an argument [`Encoder`] with a result [`Decoder`], both built
//! once from a statement's descriptors and a destination [`Shape`]. Building
//! checks every field and scalar for compatibility up front, so decoding a row
//! only has to validate the data itself.

mod builder;
mod decoder;
mod encoder;
mod scalar;
mod shape;
mod types;
mod value;

pub use builder::{build_codec, build_decoder, build_encoder};
pub use decoder::{Decoder, DecoderField};
pub use encoder::Encoder;
pub use shape::{FieldShape, OptionalSlot, Queryable, RecordSlot, SequenceSlot, Shape, Slot};
pub use types::{BigInt, Decimal, Duration, RelativeDuration};
pub use value::Value;

use std::fmt;

use uuid::Uuid;

/// Length word marking a missing element.
pub const MISSING: u32 = 0xFFFF_FFFF;

/// A compatible encoder/decoder pair for one statement and destination type.
#[derive(Debug, Clone)]
pub struct Codec {
    pub input_id: Uuid,
    pub output_id: Uuid,
    pub encoder: Encoder,
    pub decoder: Decoder,
}

/// Symbolic location inside an argument or result value (`out.user.name`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path(String);

impl Path {
    pub fn root(name: &str) -> Self {
        Path(name.to_string())
    }

    pub fn field(&self, name: &str) -> Self {
        Path(format!("{}.{}", self.0, name))
    }

    pub fn index(&self, i: usize) -> Self {
        Path(format!("{}[{}]", self.0, i))
    }

    /// Element of a set or array.
    pub fn element(&self) -> Self {
        Path(format!("{}[]", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let out = Path::root("out");
        assert_eq!(out.field("user").field("name").as_str(), "out.user.name");
        assert_eq!(out.index(2).to_string(), "out[2]");
        assert_eq!(out.field("tags").element().to_string(), "out.tags[]");
    }
}
