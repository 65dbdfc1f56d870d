// Events - Decoding of the `System.Events` storage value into event records

use super::decode::{DecodeError, ValueDecoder};
use super::metadata::{Metadata, MetadataError};
use super::primitives::H256;
use codec::{Compact, Decode, Encode};
use scale_info::TypeInfo;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Block execution phase an event was emitted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo, Serialize)]
pub enum Phase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

impl Phase {
    /// Extrinsic index for `ApplyExtrinsic`
    pub fn extrinsic_index(&self) -> Option<u32> {
        match self {
            Phase::ApplyExtrinsic(index) => Some(*index),
            _ => None,
        }
    }
}

/// One field of an event payload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventField {
    pub name: Option<String>,
    pub value: Value,
}

/// A decoded event record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub phase: Phase,
    pub pallet: String,
    pub pallet_index: u8,
    pub variant: String,
    pub variant_index: u8,
    pub fields: Vec<EventField>,
    pub topics: Vec<H256>,
}

impl EventRecord {
    /// Pallet matches case-insensitively, event kind exactly
    pub fn is(&self, pallet: &str, variant: &str) -> bool {
        self.pallet.eq_ignore_ascii_case(pallet) && self.variant == variant
    }

    /// Value of a named field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name.as_deref() == Some(name))
            .map(|f| &f.value)
    }

    /// Positional field access (works for unnamed payloads too)
    pub fn field_at(&self, index: usize) -> Option<&Value> {
        self.fields.get(index).map(|f| &f.value)
    }

    /// True if a field carries this name, or an object-valued field has this top-level key
    pub fn has_key(&self, key: &str) -> bool {
        self.fields.iter().any(|f| {
            f.name.as_deref() == Some(key)
                || f.value.as_object().map(|o| o.contains_key(key)).unwrap_or(false)
        })
    }

    /// Payload as a single JSON value (object when every field is named)
    pub fn payload(&self) -> Value {
        if !self.fields.is_empty() && self.fields.iter().all(|f| f.name.is_some()) {
            let mut object = Map::new();
            for f in &self.fields {
                object.insert(f.name.clone().unwrap_or_default(), f.value.clone());
            }
            return Value::Object(object);
        }
        Value::Array(self.fields.iter().map(|f| f.value.clone()).collect())
    }
}

impl fmt::Display for EventRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{} {}", self.pallet, self.variant, self.payload())
    }
}

/// Decode the raw `System.Events` value
pub fn decode_events(metadata: &Metadata, bytes: &[u8]) -> Result<Vec<EventRecord>, EventError> {
    let input = &mut &bytes[..];
    let count = Compact::<u32>::decode(input).map_err(DecodeError::from)?.0 as usize;
    let decoder = ValueDecoder::new(metadata.types());

    let mut records = Vec::with_capacity(count.min(4096));
    for position in 0..count {
        let record = decode_record(metadata, &decoder, input)
            .map_err(|e| EventError::Record { position, source: Box::new(e) })?;
        records.push(record);
    }

    if !input.is_empty() {
        return Err(EventError::Decode(DecodeError::TrailingBytes(input.len())));
    }

    Ok(records)
}

fn decode_record(
    metadata: &Metadata,
    decoder: &ValueDecoder,
    input: &mut &[u8],
) -> Result<EventRecord, EventError> {
    let phase = Phase::decode(input).map_err(DecodeError::from)?;
    let pallet_index = u8::decode(input).map_err(DecodeError::from)?;
    let variant_index = u8::decode(input).map_err(DecodeError::from)?;

    let (pallet, variant) = metadata.event_variant(pallet_index, variant_index)?;

    let mut fields = Vec::with_capacity(variant.fields.len());
    for field in &variant.fields {
        fields.push(EventField {
            name: field.name.clone(),
            value: decoder.decode(field.ty.id, input)?,
        });
    }

    let topics = Vec::<H256>::decode(input).map_err(DecodeError::from)?;

    Ok(EventRecord {
        phase,
        pallet: pallet.name.clone(),
        pallet_index,
        variant: variant.name.clone(),
        variant_index,
        fields,
        topics,
    })
}

/// Event decoding errors
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Event record {position}: {source}")]
    Record {
        position: usize,
        #[source]
        source: Box<EventError>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_runtime::{self, BalancesEvent, RuntimeEvent, SessionEvent};

    fn encoded(events: Vec<(Phase, RuntimeEvent)>) -> Vec<u8> {
        test_runtime::encode_events(events)
    }

    #[test]
    fn test_decode_transfer_event() {
        let metadata = test_runtime::metadata();
        let bytes = encoded(vec![(
            Phase::ApplyExtrinsic(1),
            RuntimeEvent::Balances(BalancesEvent::Transfer {
                from: [1u8; 32].into(),
                to: [2u8; 32].into(),
                amount: 50_000_000_000_000_000_000,
            }),
        )]);

        let records = decode_events(&metadata, &bytes).unwrap();
        assert_eq!(records.len(), 1);

        let record = &records[0];
        assert_eq!(record.phase, Phase::ApplyExtrinsic(1));
        assert!(record.is("balances", "Transfer"));
        assert!(!record.is("Balances", "transfer"));
        assert_eq!(record.field("amount"), Some(&Value::String("50000000000000000000".into())));
        assert!(record.has_key("to"));
        assert!(!record.has_key("who"));
    }

    #[test]
    fn test_decode_multiple_phases() {
        let metadata = test_runtime::metadata();
        let bytes = encoded(vec![
            (Phase::Initialization, RuntimeEvent::Session(SessionEvent::NewSession { session_index: 4 })),
            (Phase::Finalization, RuntimeEvent::Session(SessionEvent::NewSession { session_index: 5 })),
        ]);

        let records = decode_events(&metadata, &bytes).unwrap();
        assert_eq!(records[0].phase, Phase::Initialization);
        assert_eq!(records[1].field("session_index"), Some(&Value::from(5u32)));
        assert_eq!(records[1].phase.extrinsic_index(), None);
        assert_eq!(records[1].to_string(), "Session.NewSession {\"session_index\":5}");
    }

    #[test]
    fn test_empty_and_corrupt_input() {
        let metadata = test_runtime::metadata();
        assert!(decode_events(&metadata, &[0]).unwrap().is_empty());

        // One record claimed, pallet 99 does not exist
        let bytes = [4u8, 0, 0, 0, 0, 0, 99, 0, 0];
        assert!(decode_events(&metadata, &bytes).is_err());
    }
}
