use std::sync::Arc;

use tracing::debug;

use super::decoder::{Decoder, DecoderField};
use super::encoder::Encoder;
use super::scalar::compatible;
use super::shape::{FieldShape, Shape};
use super::{Codec, Path};
use crate::descriptor::{Descriptor, DescriptorKind, DescriptorPair};
use crate::driver::protocol::Cardinality;
use crate::error::{DriverError, DriverResult};

/// Build the codec pair for a statement's descriptors and a destination shape.
pub fn build_codec(pair: &DescriptorPair, shape: &Shape) -> DriverResult<Codec> {
    let encoder = build_encoder(&pair.input, &Path::root("args"))?;
    let decoder = build_decoder(&pair.output, shape, &Path::root("out"))?;
    debug!(
        input = %pair.input.id,
        output = %pair.output.id,
        shape = %shape.type_name(),
        "built codec"
    );
    Ok(Codec {
        input_id: pair.input.id,
        output_id: pair.output.id,
        encoder,
        decoder,
    })
}

/// Fields compared by name against a record shape.
struct WireField<'a> {
    name: &'a str,
    descriptor: &'a Arc<Descriptor>,
    required: bool,
    implicit: bool,
}

/// Build a decoder that writes values of `desc` into destinations of `shape`.
///
/// Fails with [`DriverError::CodecMismatch`] naming the first incompatible
/// path.
pub fn build_decoder(desc: &Descriptor, shape: &Shape, path: &Path) -> DriverResult<Decoder> {
    if let Shape::Optional(inner) = shape {
        return Ok(Decoder::Optional(Box::new(build_decoder(desc, inner, path)?)));
    }

    let mismatch = || DriverError::mismatch(path, desc.to_string(), shape.type_name());

    match &desc.kind {
        DescriptorKind::BaseScalar | DescriptorKind::Scalar { .. } => {
            let kind = desc.scalar_type().ok_or_else(|| {
                DriverError::Descriptor(format!("unsupported scalar type {} at {}", desc.id, path))
            })?;
            match shape {
                Shape::Scalar(dest) if compatible(kind, *dest) => Ok(Decoder::Scalar {
                    id: desc.id,
                    kind,
                }),
                _ => Err(mismatch()),
            }
        }
        DescriptorKind::Enum { members } => match shape {
            Shape::Scalar(crate::descriptor::ScalarType::Str) => Ok(Decoder::Enum {
                id: desc.id,
                members: members.clone(),
            }),
            _ => Err(mismatch()),
        },
        DescriptorKind::Object { elements } => {
            let wire = elements.iter().map(|el| WireField {
                name: &el.name,
                descriptor: &el.descriptor,
                required: el.is_required(),
                implicit: el.is_implicit(),
            });
            build_object(desc, wire, shape, path)
        }
        DescriptorKind::NamedTuple { elements } => {
            let wire = elements.iter().map(|el| WireField {
                name: &el.name,
                descriptor: &el.descriptor,
                required: true,
                implicit: false,
            });
            build_object(desc, wire, shape, path)
        }
        DescriptorKind::Tuple { elements } => match shape {
            Shape::Tuple(shapes) if shapes.len() == elements.len() => {
                let elements = elements
                    .iter()
                    .zip(shapes)
                    .enumerate()
                    .map(|(i, (el, s))| build_decoder(el, s, &path.index(i)))
                    .collect::<DriverResult<Vec<_>>>()?;
                Ok(Decoder::Tuple {
                    id: desc.id,
                    elements,
                })
            }
            _ => Err(mismatch()),
        },
        DescriptorKind::Array { element, .. } => match shape {
            Shape::Sequence(inner) => Ok(Decoder::Array {
                id: desc.id,
                element: Box::new(build_decoder(element, inner, &path.element())?),
            }),
            _ => Err(mismatch()),
        },
        DescriptorKind::Set { element } => match shape {
            Shape::Sequence(inner) => Ok(Decoder::Set {
                id: desc.id,
                element: Box::new(build_decoder(element, inner, &path.element())?),
            }),
            _ => Err(mismatch()),
        },
        DescriptorKind::Annotation { .. } => Err(DriverError::Descriptor(format!(
            "annotation {} used as a type at {}",
            desc.id, path
        ))),
    }
}

fn build_object<'a>(
    desc: &Descriptor,
    wire: impl Iterator<Item = WireField<'a>>,
    shape: &Shape,
    path: &Path,
) -> DriverResult<Decoder> {
    let (type_name, fields) = match shape {
        Shape::Record { type_name, fields } => (*type_name, fields),
        other => {
            return Err(DriverError::mismatch(
                path,
                desc.to_string(),
                other.type_name(),
            ))
        }
    };

    let mut decoders = Vec::new();
    for field in wire {
        let field_path = path.field(field.name);
        let index = fields.iter().position(|f: &FieldShape| f.name == field.name);
        let Some(index) = index else {
            if field.implicit {
                decoders.push(DecoderField::Skipped {
                    name: field.name.to_string(),
                });
                continue;
            }
            return Err(DriverError::mismatch(
                field_path,
                format!("{} to have a field named {:?}", type_name, field.name),
                "no such field",
            ));
        };

        let field_shape = &fields[index].shape;
        let decoder = build_decoder(field.descriptor, field_shape, &field_path)?;
        if !field.required && !decoder.supports_missing() {
            return Err(DriverError::mismatch(
                field_path,
                format!(
                    "Option<{}> because the field may be missing",
                    field_shape.type_name()
                ),
                field_shape.type_name(),
            ));
        }
        decoders.push(DecoderField::Bound {
            name: field.name.to_string(),
            index,
            decoder,
        });
    }

    Ok(Decoder::Object {
        id: desc.id,
        fields: decoders,
    })
}

/// Build an encoder for argument values of `desc`.
pub fn build_encoder(desc: &Descriptor, path: &Path) -> DriverResult<Encoder> {
    Ok(match &desc.kind {
        DescriptorKind::BaseScalar | DescriptorKind::Scalar { .. } => {
            let kind = desc.scalar_type().ok_or_else(|| {
                DriverError::Descriptor(format!("unsupported scalar type {} at {}", desc.id, path))
            })?;
            Encoder::Scalar { id: desc.id, kind }
        }
        DescriptorKind::Enum { members } => Encoder::Enum {
            id: desc.id,
            members: members.clone(),
        },
        DescriptorKind::Tuple { elements } => Encoder::Tuple {
            id: desc.id,
            elements: elements
                .iter()
                .enumerate()
                .map(|(i, el)| build_encoder(el, &path.index(i)))
                .collect::<DriverResult<_>>()?,
        },
        DescriptorKind::NamedTuple { elements } => Encoder::NamedTuple {
            id: desc.id,
            fields: elements
                .iter()
                .map(|el| Ok((el.name.clone(), build_encoder(&el.descriptor, &path.field(&el.name))?)))
                .collect::<DriverResult<_>>()?,
        },
        DescriptorKind::Object { elements } => {
            // newer servers describe named arguments as an object shape
            Encoder::NamedTuple {
                id: desc.id,
                fields: elements
                    .iter()
                    .filter(|el| !el.is_implicit())
                    .map(|el| {
                        if el.cardinality == Cardinality::Many {
                            return Err(DriverError::Descriptor(format!(
                                "set-valued argument {} at {}",
                                el.name, path
                            )));
                        }
                        Ok((el.name.clone(), build_encoder(&el.descriptor, &path.field(&el.name))?))
                    })
                    .collect::<DriverResult<_>>()?,
            }
        }
        DescriptorKind::Array { element, .. } => Encoder::Array {
            id: desc.id,
            element: Box::new(build_encoder(element, &path.element())?),
        },
        DescriptorKind::Set { element } => Encoder::Set {
            id: desc.id,
            element: Box::new(build_encoder(element, &path.element())?),
        },
        DescriptorKind::Annotation { .. } => {
            return Err(DriverError::Descriptor(format!(
                "annotation {} used as a type at {}",
                desc.id, path
            )))
        }
    })
}
