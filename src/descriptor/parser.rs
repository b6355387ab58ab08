use std::sync::Arc;

use uuid::Uuid;

use super::{tag, Descriptor, DescriptorKind, DescriptorPair, ShapeElement, TupleElement};
use crate::driver::protocol::{Cardinality, Reader};
use crate::error::{DriverError, DriverResult};

/// Parse one descriptor stream and return its root.
///
/// An empty stream yields [`Descriptor::empty`].
pub fn parse_descriptors(data: &[u8]) -> DriverResult<Arc<Descriptor>> {
    let mut r = Reader::new(data);
    let mut table: Vec<Arc<Descriptor>> = Vec::new();

    while !r.is_empty() {
        let desc = parse_record(&mut r, &table).map_err(|e| match e {
            // the whole message was framed, so a short record is bad metadata
            DriverError::Framing(msg) => {
                DriverError::Descriptor(format!("truncated descriptor record: {}", msg))
            }
            other => other,
        })?;
        table.push(Arc::new(desc));
    }

    Ok(table
        .iter()
        .rev()
        .find(|d| !matches!(d.kind, DescriptorKind::Annotation { .. }))
        .cloned()
        .unwrap_or_else(Descriptor::empty))
}

/// Parse the argument and result streams of a `CommandDataDescription`,
/// checking each root against the ID the server declared for it.
pub fn parse_descriptor_pair(
    input_id: Uuid,
    input: &[u8],
    output_id: Uuid,
    output: &[u8],
) -> DriverResult<DescriptorPair> {
    let pair = DescriptorPair {
        input: parse_descriptors(input)?,
        output: parse_descriptors(output)?,
    };
    check_root("argument", input_id, input, &pair.input)?;
    check_root("result", output_id, output, &pair.output)?;
    Ok(pair)
}

fn check_root(what: &str, declared: Uuid, data: &[u8], root: &Descriptor) -> DriverResult<()> {
    if !data.is_empty() && root.id != declared {
        return Err(DriverError::Descriptor(format!(
            "{} descriptor root is {} but the server declared {}",
            what, root.id, declared
        )));
    }
    Ok(())
}

fn resolve(table: &[Arc<Descriptor>], pos: u16) -> DriverResult<Arc<Descriptor>> {
    table.get(pos as usize).cloned().ok_or_else(|| {
        DriverError::Descriptor(format!(
            "reference to descriptor {} before it was defined ({} known)",
            pos,
            table.len()
        ))
    })
}

fn parse_record(r: &mut Reader<'_>, table: &[Arc<Descriptor>]) -> DriverResult<Descriptor> {
    let kind_tag = r.pop_u8()?;
    let id = r.pop_uuid()?;

    let kind = match kind_tag {
        tag::SET => DescriptorKind::Set {
            element: resolve(table, r.pop_u16()?)?,
        },
        tag::OBJECT_SHAPE => {
            let count = r.pop_u16()?;
            let mut elements = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let flags = r.pop_u32()?;
                let cardinality = Cardinality::try_from(r.pop_u8()?)?;
                let name = r.pop_string()?;
                let descriptor = resolve(table, r.pop_u16()?)?;
                elements.push(ShapeElement {
                    flags,
                    cardinality,
                    name,
                    descriptor,
                });
            }
            DescriptorKind::Object { elements }
        }
        tag::BASE_SCALAR => DescriptorKind::BaseScalar,
        tag::SCALAR => DescriptorKind::Scalar {
            base: resolve(table, r.pop_u16()?)?,
        },
        tag::TUPLE => {
            let count = r.pop_u16()?;
            let mut elements = Vec::with_capacity(count as usize);
            for _ in 0..count {
                elements.push(resolve(table, r.pop_u16()?)?);
            }
            DescriptorKind::Tuple { elements }
        }
        tag::NAMED_TUPLE => {
            let count = r.pop_u16()?;
            let mut elements = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let name = r.pop_string()?;
                let descriptor = resolve(table, r.pop_u16()?)?;
                elements.push(TupleElement { name, descriptor });
            }
            DescriptorKind::NamedTuple { elements }
        }
        tag::ARRAY => {
            let element = resolve(table, r.pop_u16()?)?;
            let count = r.pop_u16()?;
            let mut dimensions = Vec::with_capacity(count as usize);
            for _ in 0..count {
                dimensions.push(r.pop_i32()?);
            }
            DescriptorKind::Array {
                element,
                dimensions,
            }
        }
        tag::ENUM => {
            let count = r.pop_u16()?;
            let mut members = Vec::with_capacity(count as usize);
            for _ in 0..count {
                members.push(r.pop_string()?);
            }
            DescriptorKind::Enum { members }
        }
        t if t >= tag::ANNOTATION_MIN => DescriptorKind::Annotation {
            tag: t,
            text: r.pop_string()?,
        },
        other => {
            return Err(DriverError::Descriptor(format!(
                "unknown descriptor type {}",
                other
            )))
        }
    };

    Ok(Descriptor { id, kind })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ScalarType;
    use crate::driver::protocol::Writer;

    fn base_scalar(w: &mut Writer, kind: ScalarType) {
        w.push_u8(tag::BASE_SCALAR);
        w.push_uuid(&kind.base_id());
    }

    #[test]
    fn test_empty_stream_is_empty_tuple() {
        let root = parse_descriptors(&[]).unwrap();
        assert!(root.is_empty_tuple());
    }

    #[test]
    fn test_last_record_is_root() {
        let mut w = Writer::new();
        base_scalar(&mut w, ScalarType::Int32);
        base_scalar(&mut w, ScalarType::Str);
        let root = parse_descriptors(w.as_slice()).unwrap();
        assert_eq!(root.scalar_type(), Some(ScalarType::Str));
    }

    #[test]
    fn test_object_shape_shares_children() {
        let obj_id = Uuid::new_v4();
        let mut w = Writer::new();
        base_scalar(&mut w, ScalarType::Int64); // 0
        w.push_u8(tag::OBJECT_SHAPE);
        w.push_uuid(&obj_id);
        w.push_u16(2);
        for (name, card) in [("a", Cardinality::One), ("b", Cardinality::AtMostOne)] {
            w.push_u32(0);
            w.push_u8(card as u8);
            w.push_string(name);
            w.push_u16(0);
        }

        let root = parse_descriptors(w.as_slice()).unwrap();
        assert_eq!(root.id, obj_id);
        match &root.kind {
            DescriptorKind::Object { elements } => {
                assert_eq!(elements.len(), 2);
                assert!(elements[0].is_required());
                assert!(!elements[1].is_required());
                assert!(Arc::ptr_eq(&elements[0].descriptor, &elements[1].descriptor));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut w = Writer::new();
        w.push_u8(tag::SET);
        w.push_uuid(&Uuid::new_v4());
        w.push_u16(0);
        let err = parse_descriptors(w.as_slice()).unwrap_err();
        assert!(matches!(err, DriverError::Descriptor(_)));
    }

    #[test]
    fn test_truncated_record_rejected() {
        let mut w = Writer::new();
        base_scalar(&mut w, ScalarType::Int32);
        w.push_u8(tag::TUPLE);
        w.push_raw(&[0; 8]);
        let err = parse_descriptors(w.as_slice()).unwrap_err();
        assert!(matches!(err, DriverError::Descriptor(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut w = Writer::new();
        w.push_u8(0x42);
        w.push_uuid(&Uuid::new_v4());
        assert!(matches!(
            parse_descriptors(w.as_slice()),
            Err(DriverError::Descriptor(_))
        ));
    }

    #[test]
    fn test_annotation_is_not_root() {
        let mut w = Writer::new();
        base_scalar(&mut w, ScalarType::Bool);
        w.push_u8(0xFF);
        w.push_uuid(&Uuid::new_v4());
        w.push_string("default::Flag");
        let root = parse_descriptors(w.as_slice()).unwrap();
        assert_eq!(root.scalar_type(), Some(ScalarType::Bool));
    }

    #[test]
    fn test_pair_checks_declared_root() {
        let mut w = Writer::new();
        base_scalar(&mut w, ScalarType::Int32);
        let out = w.as_slice().to_vec();

        let pair = parse_descriptor_pair(
            crate::descriptor::EMPTY_TUPLE_ID,
            &[],
            ScalarType::Int32.base_id(),
            &out,
        )
        .unwrap();
        assert!(pair.input.is_empty_tuple());
        assert_eq!(pair.output.scalar_type(), Some(ScalarType::Int32));

        let err = parse_descriptor_pair(
            crate::descriptor::EMPTY_TUPLE_ID,
            &[],
            ScalarType::Str.base_id(),
            &out,
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::Descriptor(_)));
    }
}
