//! Value codecs, selected by declared property type.
//!
//! One encode/decode pair per wire representation, looked up through a
//! `match` over the closed [`PropertyType`] enumeration.

use crate::reader::WireReader;
use crate::writer::WireWriter;
use hpcview_core::error::WireError;
use hpcview_core::property::{PropertyId, PropertyType};
use hpcview_core::row::StoreProperty;
use hpcview_core::value::PropertyValue;

/// Writes a value; returns `false` when the variant does not fit the codec.
pub type EncodeFn = fn(&PropertyValue, &mut WireWriter) -> bool;
pub type DecodeFn = fn(&mut WireReader<'_>) -> Result<PropertyValue, WireError>;

pub struct ValueCodec {
    pub encode: EncodeFn,
    pub decode: DecodeFn,
}

static INT32: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::Int32(v) => {
            w.write_i32(*v);
            true
        }
        _ => false,
    },
    decode: |r| r.read_i32().map(PropertyValue::Int32),
};

static ENUM: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::Enum(v) => {
            w.write_i32(*v);
            true
        }
        _ => false,
    },
    decode: |r| r.read_i32().map(PropertyValue::Enum),
};

static UINT32: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::UInt32(v) => {
            w.write_u32(*v);
            true
        }
        _ => false,
    },
    decode: |r| r.read_u32().map(PropertyValue::UInt32),
};

static INT64: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::Int64(v) => {
            w.write_i64(*v);
            true
        }
        _ => false,
    },
    decode: |r| r.read_i64().map(PropertyValue::Int64),
};

static BOOL: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::Bool(v) => {
            w.write_bool(*v);
            true
        }
        _ => false,
    },
    decode: |r| r.read_bool().map(PropertyValue::Bool),
};

static STRING: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::String(s) => {
            w.write_string(s);
            true
        }
        _ => false,
    },
    decode: |r| r.read_string().map(PropertyValue::String),
};

static STRING_LIST: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::StringList(items) => {
            w.write_string_list(items);
            true
        }
        _ => false,
    },
    decode: |r| r.read_string_list().map(PropertyValue::StringList),
};

static DATETIME: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::DateTime(dt) => {
            w.write_datetime(dt);
            true
        }
        _ => false,
    },
    decode: |r| r.read_datetime().map(PropertyValue::DateTime),
};

static GUID: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::Guid(id) => {
            w.write_guid(id);
            true
        }
        _ => false,
    },
    decode: |r| r.read_guid().map(PropertyValue::Guid),
};

static BINARY: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::Binary(bytes) => {
            w.write_binary(bytes);
            true
        }
        _ => false,
    },
    decode: |r| r.read_binary().map(PropertyValue::Binary),
};

static TASK_ID: ValueCodec = ValueCodec {
    encode: |v, w| match v {
        PropertyValue::TaskId(id) => {
            w.write_task_id(id);
            true
        }
        _ => false,
    },
    decode: |r| r.read_task_id().map(PropertyValue::TaskId),
};

/// Codec for a declared type; `None` for object-typed properties, which
/// carry no value on the wire.
pub fn codec_for(ty: PropertyType) -> Option<&'static ValueCodec> {
    match ty {
        PropertyType::Int32 => Some(&INT32),
        PropertyType::Enum(_) => Some(&ENUM),
        PropertyType::UInt32 => Some(&UINT32),
        PropertyType::Int64 => Some(&INT64),
        PropertyType::Bool => Some(&BOOL),
        PropertyType::String => Some(&STRING),
        PropertyType::StringList => Some(&STRING_LIST),
        PropertyType::DateTime => Some(&DATETIME),
        PropertyType::Guid => Some(&GUID),
        PropertyType::Binary => Some(&BINARY),
        PropertyType::TaskId => Some(&TASK_ID),
        PropertyType::Object => None,
    }
}

const NULL_MARKER: u8 = 1;
const VALUE_MARKER: u8 = 0;

/// Encode one property entry: `[uniqueId:4][isNull:1][value?]`.
pub fn encode_property(prop: &StoreProperty, w: &mut WireWriter) -> Result<(), WireError> {
    let id = &prop.id;
    w.write_i32(id.unique_id());
    let codec = codec_for(id.value_type());
    match (codec, &prop.value) {
        (Some(codec), Some(value)) => {
            w.write_u8(VALUE_MARKER);
            if !(codec.encode)(value, w) {
                return Err(WireError::ValueTypeMismatch {
                    property: id.name().to_string(),
                    expected: id.value_type(),
                    got: value.type_name(),
                });
            }
        }
        _ => w.write_u8(NULL_MARKER),
    }
    Ok(())
}

/// Decode one property entry, resolving the unique id through `resolve`.
///
/// An id that cannot be resolved is a protocol mismatch and fails with
/// [`WireError::UnknownProperty`].
pub fn decode_property<'p>(
    r: &mut WireReader<'_>,
    resolve: impl Fn(i32) -> Option<&'p PropertyId>,
) -> Result<StoreProperty, WireError> {
    let unique_id = r.read_i32()?;
    let id = resolve(unique_id).ok_or(WireError::UnknownProperty { unique_id })?;
    let is_null = r.read_u8()? == NULL_MARKER;
    let value = match codec_for(id.value_type()) {
        Some(codec) if !is_null => Some((codec.decode)(r)?),
        _ => None,
    };
    Ok(StoreProperty {
        id: id.clone(),
        value,
    })
}
