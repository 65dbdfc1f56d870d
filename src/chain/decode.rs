// Decode - Metadata-driven SCALE decoding into serde_json values
//
// Mapping:
//   composite (named)    -> object
//   composite (1 field)  -> the inner value
//   composite (n fields) -> array
//   variant (no fields)  -> "Name"
//   variant (fields)     -> { "Name": value }
//   Option<T>            -> null | value
//   [u8; N] / Vec<u8>    -> "0x.." hex
//   u128 / i128          -> number when it fits 64 bits, decimal string otherwise

use codec::{Compact, Decode};
use scale_info::form::PortableForm;
use scale_info::{Field, PortableRegistry, TypeDef, TypeDefPrimitive};
use serde_json::{Map, Value};

/// Guard against malicious or cyclic type graphs
const MAX_DEPTH: usize = 128;

/// Decodes SCALE bytes of any registry type into JSON
pub struct ValueDecoder<'a> {
    registry: &'a PortableRegistry,
}

impl<'a> ValueDecoder<'a> {
    pub fn new(registry: &'a PortableRegistry) -> Self {
        Self { registry }
    }

    /// Decode one value of `type_id`, advancing `input`
    pub fn decode(&self, type_id: u32, input: &mut &[u8]) -> Result<Value, DecodeError> {
        self.decode_at(type_id, input, 0)
    }

    /// Decode and require that all bytes were consumed
    pub fn decode_all(&self, type_id: u32, bytes: &[u8]) -> Result<Value, DecodeError> {
        let mut input = bytes;
        let value = self.decode(type_id, &mut input)?;
        if !input.is_empty() {
            return Err(DecodeError::TrailingBytes(input.len()));
        }
        Ok(value)
    }

    /// Decode a list of fields: object if all are named, single value or array otherwise
    pub fn decode_fields(
        &self,
        fields: &[Field<PortableForm>],
        input: &mut &[u8],
    ) -> Result<Value, DecodeError> {
        self.fields_at(fields, input, 0)
    }

    fn decode_at(&self, type_id: u32, input: &mut &[u8], depth: usize) -> Result<Value, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }

        let ty = self
            .registry
            .resolve(type_id)
            .ok_or(DecodeError::UnknownType(type_id))?;

        match &ty.type_def {
            TypeDef::Composite(def) => self.fields_at(&def.fields, input, depth + 1),

            TypeDef::Variant(def) => {
                let index = u8::decode(input)?;
                let variant = def
                    .variants
                    .iter()
                    .find(|v| v.index == index)
                    .ok_or(DecodeError::InvalidVariant { type_id, index })?;

                let is_option = ty.path.segments.last().map(|s| s == "Option").unwrap_or(false);
                if is_option {
                    return match variant.fields.first() {
                        None => Ok(Value::Null),
                        Some(field) => self.decode_at(field.ty.id, input, depth + 1),
                    };
                }

                if variant.fields.is_empty() {
                    return Ok(Value::String(variant.name.clone()));
                }

                let inner = self.fields_at(&variant.fields, input, depth + 1)?;
                let mut object = Map::new();
                object.insert(variant.name.clone(), inner);
                Ok(Value::Object(object))
            }

            TypeDef::Sequence(def) => {
                let len = Compact::<u32>::decode(input)?.0 as usize;
                if self.is_u8(def.type_param.id) {
                    return take_hex(input, len);
                }
                let mut items = Vec::with_capacity(len.min(1024));
                for _ in 0..len {
                    items.push(self.decode_at(def.type_param.id, input, depth + 1)?);
                }
                Ok(Value::Array(items))
            }

            TypeDef::Array(def) => {
                let len = def.len as usize;
                if self.is_u8(def.type_param.id) {
                    return take_hex(input, len);
                }
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.decode_at(def.type_param.id, input, depth + 1)?);
                }
                Ok(Value::Array(items))
            }

            TypeDef::Tuple(def) => {
                if def.fields.is_empty() {
                    return Ok(Value::Null);
                }
                let mut items = Vec::with_capacity(def.fields.len());
                for field in &def.fields {
                    items.push(self.decode_at(field.id, input, depth + 1)?);
                }
                Ok(Value::Array(items))
            }

            TypeDef::Primitive(primitive) => decode_primitive(primitive, input),

            TypeDef::Compact(_) => {
                // Every compact integer width shares the same wire format
                let value = Compact::<u128>::decode(input)?.0;
                Ok(u128_value(value))
            }

            TypeDef::BitSequence(_) => {
                let bits = Compact::<u32>::decode(input)?.0 as usize;
                take_hex(input, bits.div_ceil(8))
            }
        }
    }

    fn fields_at(
        &self,
        fields: &[Field<PortableForm>],
        input: &mut &[u8],
        depth: usize,
    ) -> Result<Value, DecodeError> {
        if fields.is_empty() {
            return Ok(Value::Null);
        }

        if fields.iter().all(|f| f.name.is_some()) {
            let mut object = Map::new();
            for field in fields {
                let value = self.decode_at(field.ty.id, input, depth)?;
                object.insert(field.name.clone().unwrap_or_default(), value);
            }
            return Ok(Value::Object(object));
        }

        if fields.len() == 1 {
            return self.decode_at(fields[0].ty.id, input, depth);
        }

        let mut items = Vec::with_capacity(fields.len());
        for field in fields {
            items.push(self.decode_at(field.ty.id, input, depth)?);
        }
        Ok(Value::Array(items))
    }

    fn is_u8(&self, type_id: u32) -> bool {
        matches!(
            self.registry.resolve(type_id).map(|t| &t.type_def),
            Some(TypeDef::Primitive(TypeDefPrimitive::U8))
        )
    }
}

fn decode_primitive(primitive: &TypeDefPrimitive, input: &mut &[u8]) -> Result<Value, DecodeError> {
    let value = match primitive {
        TypeDefPrimitive::Bool => Value::Bool(bool::decode(input)?),
        TypeDefPrimitive::Char => {
            let code = u32::decode(input)?;
            let c = char::from_u32(code).ok_or(DecodeError::InvalidChar(code))?;
            Value::String(c.to_string())
        }
        TypeDefPrimitive::Str => Value::String(String::decode(input)?),
        TypeDefPrimitive::U8 => Value::from(u8::decode(input)?),
        TypeDefPrimitive::U16 => Value::from(u16::decode(input)?),
        TypeDefPrimitive::U32 => Value::from(u32::decode(input)?),
        TypeDefPrimitive::U64 => Value::from(u64::decode(input)?),
        TypeDefPrimitive::U128 => u128_value(u128::decode(input)?),
        TypeDefPrimitive::I8 => Value::from(i8::decode(input)?),
        TypeDefPrimitive::I16 => Value::from(i16::decode(input)?),
        TypeDefPrimitive::I32 => Value::from(i32::decode(input)?),
        TypeDefPrimitive::I64 => Value::from(i64::decode(input)?),
        TypeDefPrimitive::I128 => {
            let v = i128::decode(input)?;
            match i64::try_from(v) {
                Ok(small) => Value::from(small),
                Err(_) => Value::String(v.to_string()),
            }
        }
        TypeDefPrimitive::U256 | TypeDefPrimitive::I256 => take_hex(input, 32)?,
    };
    Ok(value)
}

fn take_hex(input: &mut &[u8], len: usize) -> Result<Value, DecodeError> {
    if input.len() < len {
        return Err(DecodeError::UnexpectedEnd { needed: len, available: input.len() });
    }
    let (head, rest) = input.split_at(len);
    *input = rest;
    Ok(Value::String(format!("0x{}", hex::encode(head))))
}

/// JSON representation of a u128 that keeps full precision
pub fn u128_value(v: u128) -> Value {
    match u64::try_from(v) {
        Ok(small) => Value::from(small),
        Err(_) => Value::String(v.to_string()),
    }
}

/// Read back an integer produced by the decoder (number, decimal or hex string)
pub fn value_as_u128(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex_digits) => u128::from_str_radix(hex_digits, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

/// Decoding errors
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("SCALE codec error: {0}")]
    Codec(#[from] codec::Error),

    #[error("Type {0} not found in registry")]
    UnknownType(u32),

    #[error("Invalid variant index {index} for type {type_id}")]
    InvalidVariant { type_id: u32, index: u8 },

    #[error("Invalid char code point {0}")]
    InvalidChar(u32),

    #[error("Unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEnd { needed: usize, available: usize },

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("Type nesting too deep")]
    TooDeep,
}
