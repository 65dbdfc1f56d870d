// Extrinsic - Signed extrinsic (format v4) construction
//
// Layout:
//   Compact(len) ++ 0x84 ++ address ++ MultiSignature ++ extra ++ call
// Signed payload:
//   call ++ extra ++ additional      (blake2_256 of it when longer than 256 bytes)

use super::signer::Signer;
use crate::chain::metadata::{Metadata, MetadataError};
use crate::chain::primitives::{decode_hex, Balance, MultiAddress, Nonce, H256};
use codec::{Compact, Encode};
use tracing::trace;

/// Only extrinsic format this encoder produces
const EXTRINSIC_VERSION: u8 = 4;
const SIGNED_BIT: u8 = 0b1000_0000;
const MAX_PAYLOAD_LEN: usize = 256;

/// Values the signed extensions need
#[derive(Debug, Clone, Copy)]
pub struct ExtrinsicParams {
    pub nonce: Nonce,
    pub tip: Balance,
    pub spec_version: u32,
    pub transaction_version: u32,
    pub genesis_hash: H256,
}

/// A signed, encoded extrinsic ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedExtrinsic {
    bytes: Vec<u8>,
    hash: H256,
    nonce: Nonce,
}

impl SignedExtrinsic {
    /// Full encoding including the length prefix
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// blake2_256 of the full encoding, as the pool and block bodies report it
    pub fn hash(&self) -> H256 {
        self.hash
    }

    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.bytes))
    }
}

/// Hash of a hex-encoded extrinsic as found in `chain_getBlock`
pub fn extrinsic_hash(hex_extrinsic: &str) -> Option<H256> {
    decode_hex(hex_extrinsic).ok().map(|bytes| H256::blake2(&bytes))
}

/// Build and sign an extrinsic for an encoded call
pub fn build_signed(
    metadata: &Metadata,
    call_data: &[u8],
    signer: &dyn Signer,
    params: &ExtrinsicParams,
) -> Result<SignedExtrinsic, ExtrinsicError> {
    let version = metadata.extrinsic().version;
    if version != EXTRINSIC_VERSION {
        return Err(ExtrinsicError::UnsupportedVersion(version));
    }

    let (extra, additional) = signed_extension_data(metadata, params)?;

    let mut payload = Vec::with_capacity(call_data.len() + extra.len() + additional.len());
    payload.extend_from_slice(call_data);
    payload.extend_from_slice(&extra);
    payload.extend_from_slice(&additional);

    let signature = if payload.len() > MAX_PAYLOAD_LEN {
        signer.sign(&sp_crypto_hashing::blake2_256(&payload))
    } else {
        signer.sign(&payload)
    };

    let account = signer.account_id();
    let address = if address_is_multi(metadata) {
        MultiAddress::Id(account).encode()
    } else {
        account.encode()
    };

    let mut body = Vec::with_capacity(1 + address.len() + 65 + extra.len() + call_data.len());
    body.push(SIGNED_BIT | EXTRINSIC_VERSION);
    body.extend_from_slice(&address);
    signature.encode_to(&mut body);
    body.extend_from_slice(&extra);
    body.extend_from_slice(call_data);

    let mut bytes = Compact(body.len() as u32).encode();
    bytes.extend_from_slice(&body);
    let hash = H256::blake2(&bytes);

    trace!(%hash, nonce = params.nonce, len = bytes.len(), "built signed extrinsic");
    Ok(SignedExtrinsic { bytes, hash, nonce: params.nonce })
}

/// Whether the runtime's address type is an enum (`MultiAddress`) rather than a bare account id
fn address_is_multi(metadata: &Metadata) -> bool {
    match metadata.extrinsic().address_ty {
        None => true,
        Some(ty) => metadata.variants(ty).is_ok(),
    }
}

/// (extra, additional) bytes in the order the metadata lists the signed extensions
pub fn signed_extension_data(
    metadata: &Metadata,
    params: &ExtrinsicParams,
) -> Result<(Vec<u8>, Vec<u8>), ExtrinsicError> {
    let mut extra = Vec::new();
    let mut additional = Vec::new();

    for ext in &metadata.extrinsic().signed_extensions {
        match ext.identifier.as_str() {
            "CheckNonZeroSender" | "CheckWeight" => {}
            "CheckSpecVersion" => params.spec_version.encode_to(&mut additional),
            "CheckTxVersion" => params.transaction_version.encode_to(&mut additional),
            "CheckGenesis" => params.genesis_hash.encode_to(&mut additional),
            "CheckMortality" | "CheckEra" => {
                // Immortal era; the checkpoint block is then genesis
                extra.push(0x00);
                params.genesis_hash.encode_to(&mut additional);
            }
            "CheckNonce" => Compact(params.nonce).encode_to(&mut extra),
            "ChargeTransactionPayment" => Compact(params.tip).encode_to(&mut extra),
            "ChargeAssetTxPayment" => {
                Compact(params.tip).encode_to(&mut extra);
                // asset_id: None
                extra.push(0x00);
            }
            "CheckMetadataHash" => {
                // Mode::Disabled, no metadata hash in the signed payload
                extra.push(0x00);
                additional.push(0x00);
            }
            other => {
                if !(metadata.is_zero_sized(ext.ty) && metadata.is_zero_sized(ext.additional_ty)) {
                    return Err(ExtrinsicError::UnsupportedExtension(other.to_string()));
                }
            }
        }
    }

    Ok((extra, additional))
}

/// Extrinsic construction errors
#[derive(Debug, thiserror::Error)]
pub enum ExtrinsicError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Unsupported extrinsic version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported signed extension with data: {0}")]
    UnsupportedExtension(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_runtime::{self, SPEC_VERSION, TX_VERSION};
    use crate::tx::signer::{DevAccount, MultiSignature};
    use codec::Decode;

    fn params(nonce: Nonce, tip: Balance) -> ExtrinsicParams {
        ExtrinsicParams {
            nonce,
            tip,
            spec_version: SPEC_VERSION,
            transaction_version: TX_VERSION,
            genesis_hash: H256::from_bytes([7u8; 32]),
        }
    }

    #[test]
    fn test_extension_data_layout() {
        let metadata = test_runtime::metadata();
        let (extra, additional) = signed_extension_data(&metadata, &params(3, 2000)).unwrap();

        // era ++ Compact(3) ++ Compact(2000)
        let mut expected_extra = vec![0x00];
        expected_extra.extend(Compact(3u32).encode());
        expected_extra.extend(Compact(2000u128).encode());
        assert_eq!(extra, expected_extra);

        // spec ++ tx ++ genesis (CheckGenesis) ++ genesis (CheckMortality)
        assert_eq!(additional.len(), 4 + 4 + 32 + 32);
        assert_eq!(&additional[..4], &SPEC_VERSION.to_le_bytes());
    }

    #[test]
    fn test_signed_extrinsic_layout() {
        let metadata = test_runtime::metadata();
        let alice = DevAccount::Alice.sr25519().unwrap();
        let call = vec![5u8, 1, 0xaa];
        let xt = build_signed(&metadata, &call, &alice, &params(0, 0)).unwrap();

        let mut input = xt.bytes();
        let len = Compact::<u32>::decode(&mut input).unwrap().0 as usize;
        assert_eq!(len, input.len());
        assert_eq!(input[0], 0x84);
        assert_eq!(input[1], 0x00, "MultiAddress::Id");
        assert_eq!(&input[2..34], alice.public_key().as_slice());

        let mut rest = &input[34..];
        let signature = MultiSignature::decode(&mut rest).unwrap();
        assert!(matches!(signature, MultiSignature::Sr25519(_)));
        assert!(rest.ends_with(&call));

        assert_eq!(xt.hash(), H256::blake2(xt.bytes()));
        assert_eq!(extrinsic_hash(&xt.to_hex()), Some(xt.hash()));
    }

    #[test]
    fn test_unknown_extensions() {
        let alice = DevAccount::Alice.sr25519().unwrap();

        let zero_sized = test_runtime::metadata_with_extensions(vec![test_runtime::unknown_zero_sized_extension()]);
        assert!(build_signed(&zero_sized, &[5, 1], &alice, &params(0, 0)).is_ok());

        let sized = test_runtime::metadata_with_extensions(vec![test_runtime::unknown_sized_extension()]);
        assert!(matches!(
            build_signed(&sized, &[5, 1], &alice, &params(0, 0)),
            Err(ExtrinsicError::UnsupportedExtension(id)) if id == "CheckEvmChainId"
        ));
    }

    #[test]
    fn test_large_payload_is_hashed_before_signing() {
        struct Recorder(std::sync::Mutex<Vec<usize>>);
        impl Signer for Recorder {
            fn account_id(&self) -> crate::chain::primitives::AccountId32 {
                [0u8; 32].into()
            }
            fn sign(&self, payload: &[u8]) -> MultiSignature {
                self.0.lock().unwrap().push(payload.len());
                MultiSignature::Ed25519([0u8; 64])
            }
        }

        let metadata = test_runtime::metadata();
        let recorder = Recorder(std::sync::Mutex::new(vec![]));
        build_signed(&metadata, &[0u8; 10], &recorder, &params(0, 0)).unwrap();
        build_signed(&metadata, &[0u8; 400], &recorder, &params(0, 0)).unwrap();

        let lens = recorder.0.lock().unwrap().clone();
        assert!(lens[0] > 10 && lens[0] <= MAX_PAYLOAD_LEN);
        assert_eq!(lens[1], 32);
    }
}
