use bytes::Bytes;
use uuid::Uuid;

use super::scalar::encode_scalar;
use super::value::Value;
use super::{Path, MISSING};
use crate::descriptor::ScalarType;
use crate::driver::protocol::Writer;
use crate::error::{DriverError, DriverResult};

/// Argument encoder built from a statement's input descriptor.
#[derive(Debug, Clone)]
pub enum Encoder {
    Scalar {
        id: Uuid,
        kind: ScalarType,
    },
    Enum {
        id: Uuid,
        members: Vec<String>,
    },
    Tuple {
        id: Uuid,
        elements: Vec<Encoder>,
    },
    NamedTuple {
        id: Uuid,
        fields: Vec<(String, Encoder)>,
    },
    Array {
        id: Uuid,
        element: Box<Encoder>,
    },
    Set {
        id: Uuid,
        element: Box<Encoder>,
    },
}

impl Encoder {
    pub fn id(&self) -> Uuid {
        match self {
            Encoder::Scalar { id, .. }
            | Encoder::Enum { id, .. }
            | Encoder::Tuple { id, .. }
            | Encoder::NamedTuple { id, .. }
            | Encoder::Array { id, .. }
            | Encoder::Set { id, .. } => *id,
        }
    }

    /// Encode the full argument payload of a statement.
    ///
    /// `Value::Nothing` stands for "no arguments" when the statement takes
    /// an empty tuple.
    pub fn encode_arguments(&self, args: &Value) -> DriverResult<Bytes> {
        let mut w = Writer::new();
        let path = Path::root("args");
        match (self, args) {
            (Encoder::Tuple { elements, .. }, Value::Nothing) if elements.is_empty() => {
                w.push_u32(0)
            }
            _ => self.encode(&mut w, args, &path)?,
        }
        Ok(w.into_bytes())
    }

    /// Encode one value's payload (without its length word).
    pub fn encode(&self, w: &mut Writer, value: &Value, path: &Path) -> DriverResult<()> {
        match self {
            Encoder::Scalar { kind, .. } => encode_scalar(*kind, value, w, path),
            Encoder::Enum { members, .. } => {
                let label = match value {
                    Value::Enum(label) | Value::Str(label) => label,
                    other => return Err(DriverError::mismatch(path, "enum label", other.kind_name())),
                };
                if !members.iter().any(|m| m == label) {
                    return Err(DriverError::mismatch(
                        path,
                        format!("one of {:?}", members),
                        format!("{:?}", label),
                    ));
                }
                w.push_raw(label.as_bytes());
                Ok(())
            }
            Encoder::Tuple { elements, .. } => {
                let items = match value {
                    Value::Tuple(items) => items,
                    other => return Err(DriverError::mismatch(path, "tuple", other.kind_name())),
                };
                if items.len() != elements.len() {
                    return Err(DriverError::mismatch(
                        path,
                        format!("{} elements", elements.len()),
                        format!("{} elements", items.len()),
                    ));
                }
                w.push_u32(elements.len() as u32);
                for (i, (encoder, item)) in elements.iter().zip(items).enumerate() {
                    push_element(w, encoder, item, &path.index(i))?;
                }
                Ok(())
            }
            Encoder::NamedTuple { fields, .. } => {
                let given = match value {
                    Value::NamedTuple(given) => given,
                    other => {
                        return Err(DriverError::mismatch(path, "named tuple", other.kind_name()))
                    }
                };
                if let Some((name, _)) = given
                    .iter()
                    .find(|(name, _)| !fields.iter().any(|(f, _)| f == name))
                {
                    return Err(DriverError::mismatch(
                        path.field(name),
                        "a declared argument",
                        "an unknown argument",
                    ));
                }
                w.push_u32(fields.len() as u32);
                for (name, encoder) in fields {
                    let item = given
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| {
                            DriverError::mismatch(path.field(name), "a value", "no argument given")
                        })?;
                    push_element(w, encoder, item, &path.field(name))?;
                }
                Ok(())
            }
            Encoder::Array { element, .. } | Encoder::Set { element, .. } => {
                let items = match value {
                    Value::Array(items) | Value::Set(items) => items,
                    other => return Err(DriverError::mismatch(path, "array", other.kind_name())),
                };
                if items.is_empty() {
                    w.push_u32(0); // ndims
                    w.push_u32(0); // flags
                    w.push_u32(0); // reserved
                    return Ok(());
                }
                w.push_u32(1);
                w.push_u32(0);
                w.push_u32(0);
                w.push_u32(items.len() as u32);
                w.push_u32(1); // lower bound
                for item in items {
                    if matches!(item, Value::Nothing) {
                        return Err(DriverError::mismatch(path.element(), "a value", "nothing"));
                    }
                    let pos = w.begin_length();
                    element.encode(w, item, &path.element())?;
                    w.end_length(pos);
                }
                Ok(())
            }
        }
    }
}

fn push_element(w: &mut Writer, encoder: &Encoder, item: &Value, path: &Path) -> DriverResult<()> {
    w.push_u32(0); // reserved
    if matches!(item, Value::Nothing) {
        w.push_u32(MISSING);
        return Ok(());
    }
    let pos = w.begin_length();
    encoder.encode(w, item, path)?;
    w.end_length(pos);
    Ok(())
}
