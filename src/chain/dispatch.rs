// Dispatch - Classification of an extrinsic's dispatch result from its events
//
// Outcome sources, in order:
//   System.ExtrinsicFailed { dispatch_error }  -> Failed
//   Sudo.Sudid { sudo_result: Err(..) }         -> Failed (sudo submissions only)
//   System.ExtrinsicSuccess                     -> Success

use super::events::EventRecord;
use super::metadata::Metadata;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Error names treated as origin failures rather than module errors
const ORIGIN_ERRORS: &[(&str, &str)] = &[("Sudo", "RequireSudo")];

/// Final result of dispatching an extrinsic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DispatchOutcome {
    Success,
    Failed(DispatchFailure),
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }

    pub fn failure(&self) -> Option<&DispatchFailure> {
        match self {
            DispatchOutcome::Success => None,
            DispatchOutcome::Failed(failure) => Some(failure),
        }
    }

    /// Derive the outcome from the events emitted by one extrinsic.
    /// Returns None when neither `ExtrinsicSuccess` nor `ExtrinsicFailed` is present.
    pub fn from_events(metadata: &Metadata, events: &[EventRecord], sudo: bool) -> Option<Self> {
        if let Some(failed) = events.iter().find(|e| e.is("System", "ExtrinsicFailed")) {
            let error = failed
                .field("dispatch_error")
                .or_else(|| failed.field_at(0))
                .cloned()
                .unwrap_or(Value::Null);
            return Some(DispatchOutcome::Failed(DispatchFailure::classify(metadata, &error)));
        }

        if !events.iter().any(|e| e.is("System", "ExtrinsicSuccess")) {
            return None;
        }

        if sudo {
            let inner = events
                .iter()
                .find(|e| e.is("Sudo", "Sudid"))
                .and_then(|e| e.field("sudo_result").or_else(|| e.field_at(0)));

            if let Some(err) = inner.and_then(|r| r.get("Err")) {
                return Some(DispatchOutcome::Failed(DispatchFailure::classify(metadata, err)));
            }
        }

        Some(DispatchOutcome::Success)
    }
}

/// Why a dispatch failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DispatchFailure {
    /// A pallet error, resolved against metadata when possible
    Module {
        pallet_index: u8,
        error_index: u8,
        pallet: Option<String>,
        error: Option<String>,
    },
    /// BadOrigin or a privileged-origin requirement
    Origin,
    /// Any other `DispatchError` variant, kept as decoded
    Other(Value),
}

impl DispatchFailure {
    /// Classify a decoded `DispatchError` value.
    ///
    /// Accepts `"BadOrigin"`, `{"Module": {"index": 6, "error": "0x02000000"}}`
    /// and the older `{"Module": {"index": 6, "error": 2}}` form.
    pub fn classify(metadata: &Metadata, error: &Value) -> Self {
        if error.as_str() == Some("BadOrigin") {
            return DispatchFailure::Origin;
        }

        let Some(module) = error.get("Module") else {
            return DispatchFailure::Other(error.clone());
        };

        let pallet_index = module
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|v| u8::try_from(v).ok());
        let error_index = module.get("error").and_then(error_index);

        let (Some(pallet_index), Some(error_index)) = (pallet_index, error_index) else {
            return DispatchFailure::Other(error.clone());
        };

        match metadata.module_error(pallet_index, error_index) {
            Some((pallet, name)) if is_origin_error(pallet, name) => DispatchFailure::Origin,
            Some((pallet, name)) => DispatchFailure::Module {
                pallet_index,
                error_index,
                pallet: Some(pallet.to_string()),
                error: Some(name.to_string()),
            },
            None => DispatchFailure::Module {
                pallet_index,
                error_index,
                pallet: None,
                error: None,
            },
        }
    }

    pub fn is_origin(&self) -> bool {
        matches!(self, DispatchFailure::Origin)
    }

    /// `Pallet::ErrorName` for resolved module errors
    pub fn module_name(&self) -> Option<String> {
        match self {
            DispatchFailure::Module { pallet: Some(p), error: Some(e), .. } => Some(format!("{}::{}", p, e)),
            _ => None,
        }
    }
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DispatchFailure::Module { pallet: Some(p), error: Some(e), .. } => write!(f, "{}::{}", p, e),
            DispatchFailure::Module { pallet_index, error_index, .. } => {
                write!(f, "Module error {} of pallet {}", error_index, pallet_index)
            }
            DispatchFailure::Origin => write!(f, "BadOrigin"),
            DispatchFailure::Other(v) => write!(f, "{}", v),
        }
    }
}

fn is_origin_error(pallet: &str, name: &str) -> bool {
    ORIGIN_ERRORS.iter().any(|(p, n)| *p == pallet && *n == name)
}

/// First byte of the 4-byte error field is the error variant index
fn error_index(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|v| u8::try_from(v).ok()),
        Value::String(s) => {
            let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).ok()?;
            bytes.first().copied()
        }
        _ => None,
    }
}
