// Chain - Primitives and metadata-driven SCALE codec for the node's runtime

pub mod decode;
pub mod dispatch;
pub mod events;
pub mod metadata;
pub mod primitives;
pub mod storage;

pub use decode::{DecodeError, ValueDecoder};
pub use dispatch::{DispatchFailure, DispatchOutcome};
pub use events::{decode_events, EventError, EventField, EventRecord, Phase};
pub use metadata::{Metadata, MetadataError};
pub use primitives::*;
pub use storage::{storage_key, AccountInfo, StorageKeyError};
