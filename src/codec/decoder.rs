use uuid::Uuid;

use super::scalar::decode_scalar;
use super::shape::{RecordSlot, SequenceSlot, Slot};
use super::{Path, MISSING};
use crate::descriptor::ScalarType;
use crate::driver::protocol::Reader;
use crate::error::{DriverError, DriverResult};

/// Result decoder built for one descriptor and one destination shape.
///
/// Objects and named tuples share a wire layout and both decode through
/// [`Decoder::Object`].
#[derive(Debug, Clone)]
pub enum Decoder {
    Scalar {
        id: Uuid,
        kind: ScalarType,
    },
    /// Enum labels decode into `String`.
    Enum {
        id: Uuid,
        members: Vec<String>,
    },
    Object {
        id: Uuid,
        fields: Vec<DecoderField>,
    },
    Tuple {
        id: Uuid,
        elements: Vec<Decoder>,
    },
    Array {
        id: Uuid,
        element: Box<Decoder>,
    },
    Set {
        id: Uuid,
        element: Box<Decoder>,
    },
    /// Destination can represent a missing value.
    Optional(Box<Decoder>),
}

/// How one wire field of an object maps onto the destination record.
#[derive(Debug, Clone)]
pub enum DecoderField {
    /// Decoded into the record slot at `index`.
    Bound {
        name: String,
        index: usize,
        decoder: Decoder,
    },
    /// Implicit field the destination did not ask for.
    Skipped { name: String },
}

impl DecoderField {
    pub fn name(&self) -> &str {
        match self {
            DecoderField::Bound { name, .. } | DecoderField::Skipped { name } => name,
        }
    }
}

/// Location of the value being decoded. Lives on the stack and only becomes
/// a [`Path`] when an error needs one.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Trail<'a> {
    Root,
    Field(&'a Trail<'a>, &'a str),
    Index(&'a Trail<'a>, usize),
    Element(&'a Trail<'a>),
}

impl Trail<'_> {
    pub(crate) fn path(&self) -> Path {
        match self {
            Trail::Root => Path::root("out"),
            Trail::Field(parent, name) => parent.path().field(name),
            Trail::Index(parent, i) => parent.path().index(*i),
            Trail::Element(parent) => parent.path().element(),
        }
    }
}

fn slot_mismatch(at: &Trail<'_>, expected: &str, slot: &Slot<'_>) -> DriverError {
    DriverError::mismatch(at.path(), expected, slot.kind_name())
}

impl Decoder {
    /// Descriptor ID this decoder was built for.
    pub fn id(&self) -> Uuid {
        match self {
            Decoder::Scalar { id, .. }
            | Decoder::Enum { id, .. }
            | Decoder::Object { id, .. }
            | Decoder::Tuple { id, .. }
            | Decoder::Array { id, .. }
            | Decoder::Set { id, .. } => *id,
            Decoder::Optional(inner) => inner.id(),
        }
    }

    /// Optional destinations and sequences; a missing set is an empty one.
    pub fn supports_missing(&self) -> bool {
        matches!(
            self,
            Decoder::Optional(_) | Decoder::Array { .. } | Decoder::Set { .. }
        )
    }

    /// Decode one value. `r` is bounded to exactly this value's bytes.
    pub fn decode(&self, r: &mut Reader<'_>, slot: Slot<'_>) -> DriverResult<()> {
        self.decode_at(r, slot, &Trail::Root)
    }

    fn decode_at(&self, r: &mut Reader<'_>, slot: Slot<'_>, at: &Trail<'_>) -> DriverResult<()> {
        match self {
            Decoder::Optional(inner) => match slot {
                Slot::Optional(opt) => inner.decode_at(r, opt.set_present(), at),
                other => Err(slot_mismatch(at, "optional", &other)),
            },
            Decoder::Scalar { kind, .. } => decode_scalar(*kind, r, slot, at),
            Decoder::Enum { members, .. } => match slot {
                Slot::Str(s) => {
                    let label = std::str::from_utf8(r.rest()).map_err(|_| {
                        DriverError::mismatch(at.path(), "utf-8 enum label", "invalid utf-8")
                    })?;
                    if !members.iter().any(|m| m == label) {
                        return Err(DriverError::mismatch(
                            at.path(),
                            format!("one of {:?}", members),
                            format!("{:?}", label),
                        ));
                    }
                    *s = label.to_string();
                    Ok(())
                }
                other => Err(slot_mismatch(at, "String", &other)),
            },
            Decoder::Object { fields, .. } => match slot {
                Slot::Record(rec) => decode_object(fields, r, rec, at),
                other => Err(slot_mismatch(at, "record", &other)),
            },
            Decoder::Tuple { elements, .. } => match slot {
                Slot::Record(rec) => decode_tuple(elements, r, rec, at),
                other => Err(slot_mismatch(at, "tuple", &other)),
            },
            Decoder::Array { element, .. } | Decoder::Set { element, .. } => match slot {
                Slot::Sequence(seq) => decode_array(element, r, seq, at),
                other => Err(slot_mismatch(at, "sequence", &other)),
            },
        }
    }

    /// Record a missing value, failing unless the destination can hold one.
    pub fn decode_missing(&self, slot: Slot<'_>) -> DriverResult<()> {
        self.decode_missing_at(slot, &Trail::Root)
    }

    fn decode_missing_at(&self, slot: Slot<'_>, at: &Trail<'_>) -> DriverResult<()> {
        match (self, slot) {
            (Decoder::Optional(_), Slot::Optional(opt)) => {
                opt.set_missing();
                Ok(())
            }
            (Decoder::Array { .. } | Decoder::Set { .. }, Slot::Sequence(seq)) => {
                seq.clear();
                Ok(())
            }
            (_, slot) => Err(DriverError::mismatch(
                at.path(),
                "a present value",
                format!("missing value for {}", slot.kind_name()),
            )),
        }
    }
}

fn check_count(r: &mut Reader<'_>, expected: usize) -> DriverResult<()> {
    let actual = r.pop_u32()? as usize;
    if actual != expected {
        return Err(DriverError::CountMismatch { expected, actual });
    }
    Ok(())
}

/// Pop the reserved word and length of the next compound element.
/// `None` means the element is missing.
fn next_element<'a>(r: &mut Reader<'a>) -> DriverResult<Option<Reader<'a>>> {
    r.discard(4)?;
    let len = r.pop_u32()?;
    if len == MISSING {
        return Ok(None);
    }
    r.pop_slice(len as usize).map(Some)
}

fn decode_object(
    fields: &[DecoderField],
    r: &mut Reader<'_>,
    rec: &mut dyn RecordSlot,
    at: &Trail<'_>,
) -> DriverResult<()> {
    check_count(r, fields.len())?;
    let mut slots: Vec<Option<Slot<'_>>> = rec.slots().into_iter().map(Some).collect();

    for field in fields {
        let element = next_element(r)?;
        let DecoderField::Bound {
            name,
            index,
            decoder,
        } = field
        else {
            continue;
        };
        let field_at = Trail::Field(at, name);
        let slot = slots.get_mut(*index).and_then(Option::take).ok_or_else(|| {
            DriverError::mismatch(field_at.path(), "a destination slot", "none")
        })?;
        match element {
            Some(mut er) => decoder.decode_at(&mut er, slot, &field_at)?,
            None => decoder.decode_missing_at(slot, &field_at).map_err(|_| {
                DriverError::mismatch(
                    field_at.path(),
                    "a value",
                    "missing value for a non-optional field",
                )
            })?,
        }
    }
    Ok(())
}

fn decode_tuple(
    elements: &[Decoder],
    r: &mut Reader<'_>,
    rec: &mut dyn RecordSlot,
    at: &Trail<'_>,
) -> DriverResult<()> {
    check_count(r, elements.len())?;
    let slots = rec.slots();
    if slots.len() != elements.len() {
        return Err(DriverError::CountMismatch {
            expected: elements.len(),
            actual: slots.len(),
        });
    }

    for (i, (decoder, slot)) in elements.iter().zip(slots).enumerate() {
        let element_at = Trail::Index(at, i);
        match next_element(r)? {
            Some(mut er) => decoder.decode_at(&mut er, slot, &element_at)?,
            None => decoder.decode_missing_at(slot, &element_at)?,
        }
    }
    Ok(())
}

fn decode_array(
    element: &Decoder,
    r: &mut Reader<'_>,
    seq: &mut dyn SequenceSlot,
    at: &Trail<'_>,
) -> DriverResult<()> {
    seq.clear();
    let ndims = r.pop_u32()?;
    r.discard(8)?; // flags, reserved
    if ndims == 0 {
        return Ok(());
    }
    if ndims != 1 {
        return Err(DriverError::mismatch(
            at.path(),
            "a one-dimensional array",
            format!("{} dimensions", ndims),
        ));
    }
    let len = r.pop_u32()?;
    r.discard(4)?; // lower bound

    let element_at = Trail::Element(at);
    for _ in 0..len {
        let elen = r.pop_u32()?;
        if elen == MISSING {
            return Err(DriverError::mismatch(
                element_at.path(),
                "a value",
                "missing array element",
            ));
        }
        let mut er = r.pop_slice(elen as usize)?;
        element.decode_at(&mut er, seq.push_default(), &element_at)?;
    }
    Ok(())
}
