// Storage - Storage key construction and typed reads of well-known entries

use super::decode::value_as_u128;
use super::metadata::{Metadata, MetadataError, StorageKind};
use super::primitives::Balance;
use frame_metadata::v14::StorageHasher;
use serde_json::Value;

/// Full storage key for `pallet::entry` with SCALE-encoded map keys
pub fn storage_key(
    metadata: &Metadata,
    pallet: &str,
    entry: &str,
    keys: &[Vec<u8>],
) -> Result<Vec<u8>, StorageKeyError> {
    let (info, entry_info) = metadata.storage_entry(pallet, entry)?;
    let prefix = info.storage_prefix.as_deref().unwrap_or(info.name.as_str());

    let mut key = prefix_key(prefix, &entry_info.name);

    match &entry_info.kind {
        StorageKind::Plain { .. } => {
            if !keys.is_empty() {
                return Err(StorageKeyError::KeyCount { expected: 0, got: keys.len() });
            }
        }
        StorageKind::Map { hashers, .. } => {
            // Partial keys are allowed and address a prefix of the map
            if keys.len() > hashers.len() {
                return Err(StorageKeyError::KeyCount { expected: hashers.len(), got: keys.len() });
            }
            for (hasher, k) in hashers.iter().zip(keys) {
                key.extend(hash_key(hasher, k));
            }
        }
    }

    Ok(key)
}

/// twox128(pallet) ++ twox128(entry)
pub fn prefix_key(pallet_prefix: &str, entry: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&sp_crypto_hashing::twox_128(pallet_prefix.as_bytes()));
    key.extend_from_slice(&sp_crypto_hashing::twox_128(entry.as_bytes()));
    key
}

/// Apply a storage hasher to an encoded key
pub fn hash_key(hasher: &StorageHasher, key: &[u8]) -> Vec<u8> {
    match hasher {
        StorageHasher::Blake2_128 => sp_crypto_hashing::blake2_128(key).to_vec(),
        StorageHasher::Blake2_256 => sp_crypto_hashing::blake2_256(key).to_vec(),
        StorageHasher::Blake2_128Concat => {
            let mut out = sp_crypto_hashing::blake2_128(key).to_vec();
            out.extend_from_slice(key);
            out
        }
        StorageHasher::Twox128 => sp_crypto_hashing::twox_128(key).to_vec(),
        StorageHasher::Twox256 => sp_crypto_hashing::twox_256(key).to_vec(),
        StorageHasher::Twox64Concat => {
            let mut out = sp_crypto_hashing::twox_64(key).to_vec();
            out.extend_from_slice(key);
            out
        }
        StorageHasher::Identity => key.to_vec(),
    }
}

/// `System::Account` value as the harness reads it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccountInfo {
    pub nonce: u64,
    pub free: Balance,
    pub reserved: Balance,
    pub frozen: Balance,
}

impl AccountInfo {
    /// Extract from the decoded `AccountInfo<Nonce, AccountData<Balance>>` value.
    /// Older runtimes carry `misc_frozen`/`fee_frozen` instead of `frozen`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let data = value.get("data")?;
        let frozen = data
            .get("frozen")
            .or_else(|| data.get("misc_frozen"))
            .and_then(value_as_u128)
            .unwrap_or(0);

        Some(Self {
            nonce: value.get("nonce").and_then(value_as_u128).unwrap_or(0) as u64,
            free: value_as_u128(data.get("free")?)?,
            reserved: data.get("reserved").and_then(value_as_u128).unwrap_or(0),
            frozen,
        })
    }
}

/// Storage key errors
#[derive(Debug, thiserror::Error)]
pub enum StorageKeyError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Wrong number of map keys: expected at most {expected}, got {got}")]
    KeyCount { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_runtime;

    // Well-known keys every substrate runtime shares
    const SYSTEM_EVENTS_KEY: &str =
        "26aa394eea5630e07c48ae0c9558cef780d41e5e16056765bc8461851072c9d7";
    const SYSTEM_ACCOUNT_PREFIX: &str =
        "26aa394eea5630e07c48ae0c9558cef7b99d880ec681799c0cf30e8886371da9";

    #[test]
    fn test_plain_key_matches_system_events() {
        let metadata = test_runtime::metadata();
        let key = storage_key(&metadata, "System", "Events", &[]).unwrap();
        assert_eq!(hex::encode(key), SYSTEM_EVENTS_KEY);
    }

    #[test]
    fn test_map_key_uses_blake2_128_concat() {
        let metadata = test_runtime::metadata();
        let account = [9u8; 32];
        let key = storage_key(&metadata, "System", "Account", &[account.to_vec()]).unwrap();

        assert!(hex::encode(&key).starts_with(SYSTEM_ACCOUNT_PREFIX));
        assert_eq!(key.len(), 32 + 16 + 32);
        assert_eq!(&key[48..], &account);
    }

    #[test]
    fn test_too_many_keys_rejected() {
        let metadata = test_runtime::metadata();
        assert!(storage_key(&metadata, "System", "Events", &[vec![1]]).is_err());
        assert!(storage_key(&metadata, "System", "Missing", &[]).is_err());
    }

    #[test]
    fn test_account_info_from_value() {
        let value = serde_json::json!({
            "nonce": 3,
            "consumers": 0,
            "providers": 1,
            "sufficients": 0,
            "data": { "free": "1000000000000000000000", "reserved": 5, "frozen": 0, "flags": "0x00" }
        });
        let info = AccountInfo::from_value(&value).unwrap();
        assert_eq!(info.nonce, 3);
        assert_eq!(info.free, 1_000_000_000_000_000_000_000);
        assert_eq!(info.reserved, 5);
        assert!(AccountInfo::from_value(&serde_json::json!({ "nonce": 1 })).is_none());
    }
}
