// Metadata - Indexed view over the runtime metadata (V14)
// Principle: resolve names to indices once, look them up cheaply afterwards

use codec::Decode;
use frame_metadata::v14::{
    RuntimeMetadataV14, StorageEntryModifier, StorageEntryType, StorageHasher,
};
use frame_metadata::{RuntimeMetadata, RuntimeMetadataPrefixed, META_RESERVED};
use scale_info::form::PortableForm;
use scale_info::{PortableRegistry, Type, TypeDef, Variant};
use std::collections::HashMap;

/// Runtime metadata indexed by pallet name and pallet index
#[derive(Debug, Clone)]
pub struct Metadata {
    types: PortableRegistry,
    pallets: Vec<PalletInfo>,
    by_name: HashMap<String, usize>,
    by_index: HashMap<u8, usize>,
    extrinsic: ExtrinsicInfo,
}

/// Per-pallet information needed by the harness
#[derive(Debug, Clone)]
pub struct PalletInfo {
    pub name: String,
    pub index: u8,
    pub call_ty: Option<u32>,
    pub event_ty: Option<u32>,
    pub error_ty: Option<u32>,
    pub storage_prefix: Option<String>,
    pub storage: HashMap<String, StorageEntryInfo>,
}

/// Storage entry layout
#[derive(Debug, Clone)]
pub struct StorageEntryInfo {
    pub name: String,
    pub kind: StorageKind,
    /// SCALE bytes returned when the entry is absent (ValueQuery entries only)
    pub default: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub enum StorageKind {
    Plain {
        value_ty: u32,
    },
    Map {
        hashers: Vec<StorageHasher>,
        key_ty: u32,
        value_ty: u32,
    },
}

impl StorageKind {
    pub fn value_ty(&self) -> u32 {
        match self {
            StorageKind::Plain { value_ty } => *value_ty,
            StorageKind::Map { value_ty, .. } => *value_ty,
        }
    }
}

/// Extrinsic format information
#[derive(Debug, Clone)]
pub struct ExtrinsicInfo {
    pub version: u8,
    /// Type of the `Address` parameter of the runtime's UncheckedExtrinsic, if exposed
    pub address_ty: Option<u32>,
    pub signed_extensions: Vec<SignedExtensionInfo>,
}

#[derive(Debug, Clone)]
pub struct SignedExtensionInfo {
    pub identifier: String,
    pub ty: u32,
    pub additional_ty: u32,
}

impl Metadata {
    /// Decode the SCALE bytes returned by `state_getMetadata`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetadataError> {
        let prefixed = RuntimeMetadataPrefixed::decode(&mut &bytes[..])
            .map_err(|e| MetadataError::Decode(e.to_string()))?;

        if prefixed.0 != META_RESERVED {
            return Err(MetadataError::BadMagic(prefixed.0));
        }

        match prefixed.1 {
            RuntimeMetadata::V14(v14) => Ok(Self::from_v14(v14)),
            other => Err(MetadataError::UnsupportedVersion(other.version())),
        }
    }

    /// Build the index from V14 metadata
    pub fn from_v14(meta: RuntimeMetadataV14) -> Self {
        let mut pallets = Vec::with_capacity(meta.pallets.len());

        for pallet in meta.pallets {
            let mut storage = HashMap::new();
            let storage_prefix = pallet.storage.as_ref().map(|s| s.prefix.clone());

            if let Some(pallet_storage) = pallet.storage {
                for entry in pallet_storage.entries {
                    let kind = match entry.ty {
                        StorageEntryType::Plain(ty) => StorageKind::Plain { value_ty: ty.id },
                        StorageEntryType::Map { hashers, key, value } => StorageKind::Map {
                            hashers,
                            key_ty: key.id,
                            value_ty: value.id,
                        },
                    };
                    let default = match entry.modifier {
                        StorageEntryModifier::Default => Some(entry.default),
                        StorageEntryModifier::Optional => None,
                    };
                    storage.insert(
                        entry.name.clone(),
                        StorageEntryInfo { name: entry.name, kind, default },
                    );
                }
            }

            pallets.push(PalletInfo {
                name: pallet.name,
                index: pallet.index,
                call_ty: pallet.calls.map(|c| c.ty.id),
                event_ty: pallet.event.map(|e| e.ty.id),
                error_ty: pallet.error.map(|e| e.ty.id),
                storage_prefix,
                storage,
            });
        }

        let address_ty = meta.types.resolve(meta.extrinsic.ty.id).and_then(|ty| {
            ty.type_params
                .iter()
                .find(|p| p.name == "Address")
                .and_then(|p| p.ty.as_ref().map(|t| t.id))
        });

        let extrinsic = ExtrinsicInfo {
            version: meta.extrinsic.version,
            address_ty,
            signed_extensions: meta
                .extrinsic
                .signed_extensions
                .into_iter()
                .map(|ext| SignedExtensionInfo {
                    identifier: ext.identifier,
                    ty: ext.ty.id,
                    additional_ty: ext.additional_signed.id,
                })
                .collect(),
        };

        let by_name = pallets
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.to_ascii_lowercase(), i))
            .collect();
        let by_index = pallets.iter().enumerate().map(|(i, p)| (p.index, i)).collect();

        Self {
            types: meta.types,
            pallets,
            by_name,
            by_index,
            extrinsic,
        }
    }

    pub fn types(&self) -> &PortableRegistry {
        &self.types
    }

    pub fn extrinsic(&self) -> &ExtrinsicInfo {
        &self.extrinsic
    }

    pub fn pallets(&self) -> impl Iterator<Item = &PalletInfo> {
        self.pallets.iter()
    }

    /// Pallet lookup by name (case-insensitive, so `esgScore` finds `EsgScore`)
    pub fn pallet(&self, name: &str) -> Result<&PalletInfo, MetadataError> {
        self.by_name
            .get(&name.to_ascii_lowercase())
            .map(|&i| &self.pallets[i])
            .ok_or_else(|| MetadataError::PalletNotFound(name.to_string()))
    }

    pub fn pallet_by_index(&self, index: u8) -> Option<&PalletInfo> {
        self.by_index.get(&index).map(|&i| &self.pallets[i])
    }

    pub fn resolve(&self, type_id: u32) -> Result<&Type<PortableForm>, MetadataError> {
        self.types
            .resolve(type_id)
            .ok_or(MetadataError::TypeNotFound(type_id))
    }

    /// Variants of an enum type
    pub fn variants(&self, type_id: u32) -> Result<&[Variant<PortableForm>], MetadataError> {
        match &self.resolve(type_id)?.type_def {
            TypeDef::Variant(def) => Ok(&def.variants),
            _ => Err(MetadataError::NotAnEnum(type_id)),
        }
    }

    /// (pallet index, call index) for `Pallet::call_name`
    pub fn call_index(&self, pallet: &str, call: &str) -> Result<(u8, u8), MetadataError> {
        let info = self.pallet(pallet)?;
        let call_ty = info
            .call_ty
            .ok_or_else(|| MetadataError::CallNotFound(info.name.clone(), call.to_string()))?;
        let variant = self
            .variants(call_ty)?
            .iter()
            .find(|v| v.name == call)
            .ok_or_else(|| MetadataError::CallNotFound(info.name.clone(), call.to_string()))?;
        Ok((info.index, variant.index))
    }

    /// Event variant of a pallet by variant index
    pub fn event_variant(
        &self,
        pallet_index: u8,
        variant_index: u8,
    ) -> Result<(&PalletInfo, &Variant<PortableForm>), MetadataError> {
        let pallet = self
            .pallet_by_index(pallet_index)
            .ok_or(MetadataError::PalletIndexNotFound(pallet_index))?;
        let event_ty = pallet
            .event_ty
            .ok_or_else(|| MetadataError::NoEvents(pallet.name.clone()))?;
        let variant = self
            .variants(event_ty)?
            .iter()
            .find(|v| v.index == variant_index)
            .ok_or(MetadataError::VariantNotFound { type_id: event_ty, index: variant_index })?;
        Ok((pallet, variant))
    }

    /// Resolve a module error to (pallet name, error name)
    pub fn module_error(&self, pallet_index: u8, error_index: u8) -> Option<(&str, &str)> {
        let pallet = self.pallet_by_index(pallet_index)?;
        let variant = self
            .variants(pallet.error_ty?)
            .ok()?
            .iter()
            .find(|v| v.index == error_index)?;
        Some((pallet.name.as_str(), variant.name.as_str()))
    }

    pub fn storage_entry(
        &self,
        pallet: &str,
        entry: &str,
    ) -> Result<(&PalletInfo, &StorageEntryInfo), MetadataError> {
        let info = self.pallet(pallet)?;
        let storage_entry = info
            .storage
            .get(entry)
            .ok_or_else(|| MetadataError::StorageNotFound(info.name.clone(), entry.to_string()))?;
        Ok((info, storage_entry))
    }

    /// True when values of this type occupy no bytes (unit structs, empty tuples)
    pub fn is_zero_sized(&self, type_id: u32) -> bool {
        match self.types.resolve(type_id).map(|t| &t.type_def) {
            Some(TypeDef::Composite(def)) => def.fields.iter().all(|f| self.is_zero_sized(f.ty.id)),
            Some(TypeDef::Tuple(def)) => def.fields.iter().all(|f| self.is_zero_sized(f.id)),
            Some(TypeDef::Array(def)) => def.len == 0 || self.is_zero_sized(def.type_param.id),
            _ => false,
        }
    }
}

/// Metadata errors
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to decode metadata: {0}")]
    Decode(String),

    #[error("Metadata magic mismatch: {0:#x}")]
    BadMagic(u32),

    #[error("Unsupported metadata version: V{0}")]
    UnsupportedVersion(u32),

    #[error("Pallet not found: {0}")]
    PalletNotFound(String),

    #[error("Pallet index not found: {0}")]
    PalletIndexNotFound(u8),

    #[error("Call not found: {0}::{1}")]
    CallNotFound(String, String),

    #[error("Pallet {0} has no events")]
    NoEvents(String),

    #[error("Storage entry not found: {0}::{1}")]
    StorageNotFound(String, String),

    #[error("Type {0} not found in registry")]
    TypeNotFound(u32),

    #[error("Type {0} is not an enum")]
    NotAnEnum(u32),

    #[error("Variant {index} not found in type {type_id}")]
    VariantNotFound { type_id: u32, index: u8 },
}

#[cfg(test)]
mod tests {
    use crate::tests::test_runtime;

    #[test]
    fn test_pallet_lookup_is_case_insensitive() {
        let metadata = test_runtime::metadata();
        assert_eq!(metadata.pallet("Balances").unwrap().index, 5);
        assert_eq!(metadata.pallet("balances").unwrap().index, 5);
        assert!(metadata.pallet("Staking").is_err());
    }

    #[test]
    fn test_call_index_resolution() {
        let metadata = test_runtime::metadata();
        assert_eq!(metadata.call_index("Balances", "transfer_keep_alive").unwrap(), (5, 1));
        assert_eq!(metadata.call_index("Sudo", "sudo_unchecked_weight").unwrap(), (6, 1));
        assert!(metadata.call_index("Balances", "mint").is_err());
    }

    #[test]
    fn test_module_error_names() {
        let metadata = test_runtime::metadata();
        assert_eq!(metadata.module_error(6, 0), Some(("Sudo", "RequireSudo")));
        assert_eq!(metadata.module_error(5, 2), Some(("Balances", "InsufficientBalance")));
        assert_eq!(metadata.module_error(5, 99), None);
    }

    #[test]
    fn test_signed_extensions_and_address_type() {
        let metadata = test_runtime::metadata();
        let ids: Vec<&str> = metadata
            .extrinsic()
            .signed_extensions
            .iter()
            .map(|e| e.identifier.as_str())
            .collect();
        assert!(ids.contains(&"CheckNonce"));
        assert!(ids.contains(&"ChargeTransactionPayment"));
        assert!(metadata.extrinsic().address_ty.is_some());
    }

    #[test]
    fn test_metadata_bytes_roundtrip() {
        let bytes = test_runtime::metadata_bytes();
        let metadata = super::Metadata::from_bytes(&bytes).unwrap();
        assert!(metadata.storage_entry("System", "Events").is_ok());
        assert!(super::Metadata::from_bytes(&bytes[1..]).is_err());
    }
}
