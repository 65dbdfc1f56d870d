// Primitives - Minimal chain types shared by the codec, signer and RPC layers
use codec::{Decode, Encode};
use scale_info::TypeInfo;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Balance in base units (u128, 18 decimals on Firechain)
pub type Balance = u128;

/// Block number as reported by headers
pub type BlockNumber = u32;

/// Account nonce
pub type Nonce = u32;

/// Monetary constants (1 FIRE = 10^18 base units)
pub const UNIT: Balance = 1_000_000_000_000_000_000;
pub const MILLI_UNIT: Balance = 1_000_000_000_000_000;
pub const MICRO_UNIT: Balance = 1_000_000_000_000;

/// Generic substrate SS58 address format
pub const DEFAULT_SS58_PREFIX: u16 = 42;

const SS58_CHECKSUM_PREFIX: &[u8] = b"SS58PRE";
const SS58_CHECKSUM_LEN: usize = 2;

/// 256-bit hash (block hashes, extrinsic hashes, genesis hash)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode, TypeInfo)]
pub struct H256(pub [u8; 32]);

impl H256 {
    pub const ZERO: H256 = H256([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Blake2-256 of the given data (extrinsic and signing-payload hashing)
    pub fn blake2(data: &[u8]) -> Self {
        H256(sp_crypto_hashing::blake2_256(data))
    }

    /// Parse a `0x`-prefixed (or bare) hex string
    pub fn from_hex(s: &str) -> Result<Self, PrimitiveError> {
        let bytes = decode_hex(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| PrimitiveError::InvalidLength { expected: 32, got: b.len() })?;
        Ok(H256(arr))
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}…{}", hex::encode(&self.0[..4]), hex::encode(&self.0[28..]))
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_hex().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        H256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// 20-byte Ethereum account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode, TypeInfo)]
pub struct H160(pub [u8; 20]);

impl H160 {
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        H160(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, PrimitiveError> {
        let bytes = decode_hex(s)?;
        let arr: [u8; 20] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| PrimitiveError::InvalidLength { expected: 20, got: b.len() })?;
        Ok(H160(arr))
    }

    /// Lowercase `0x` form; node RPCs accept it without a checksum
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H160 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Display for H160 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for H160 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_hex().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for H160 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        H160::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// 32-byte account identifier (sr25519 / ed25519 public key)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Encode, Decode, TypeInfo)]
pub struct AccountId32(pub [u8; 32]);

impl AccountId32 {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        AccountId32(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// SS58 address with the given network prefix
    pub fn to_ss58(&self, prefix: u16) -> String {
        let mut data = ss58_prefix_bytes(prefix);
        data.extend_from_slice(&self.0);
        let checksum = ss58_checksum(&data);
        data.extend_from_slice(&checksum[..SS58_CHECKSUM_LEN]);
        bs58::encode(data).into_string()
    }

    /// Parse an SS58 address, returning the account and its network prefix
    pub fn from_ss58(address: &str) -> Result<(Self, u16), PrimitiveError> {
        let data = bs58::decode(address)
            .into_vec()
            .map_err(|e| PrimitiveError::InvalidSs58(e.to_string()))?;

        let (prefix, prefix_len) = match data.first() {
            Some(&b) if b < 64 => (b as u16, 1),
            Some(&b) if b < 128 => {
                let second = *data
                    .get(1)
                    .ok_or_else(|| PrimitiveError::InvalidSs58("truncated prefix".to_string()))?;
                let lower = (b << 2) | (second >> 6);
                let upper = second & 0b0011_1111;
                ((lower as u16) | ((upper as u16) << 8), 2)
            }
            _ => return Err(PrimitiveError::InvalidSs58("unsupported prefix".to_string())),
        };

        if data.len() != prefix_len + 32 + SS58_CHECKSUM_LEN {
            return Err(PrimitiveError::InvalidLength {
                expected: prefix_len + 32 + SS58_CHECKSUM_LEN,
                got: data.len(),
            });
        }

        let body_len = prefix_len + 32;
        let checksum = ss58_checksum(&data[..body_len]);
        if data[body_len..] != checksum[..SS58_CHECKSUM_LEN] {
            return Err(PrimitiveError::InvalidSs58("checksum mismatch".to_string()));
        }

        let mut account = [0u8; 32];
        account.copy_from_slice(&data[prefix_len..body_len]);
        Ok((AccountId32(account), prefix))
    }
}

impl fmt::Debug for AccountId32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_ss58(DEFAULT_SS58_PREFIX))
    }
}

impl fmt::Display for AccountId32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_ss58(DEFAULT_SS58_PREFIX))
    }
}

impl From<[u8; 32]> for AccountId32 {
    fn from(bytes: [u8; 32]) -> Self {
        AccountId32(bytes)
    }
}

impl FromStr for AccountId32 {
    type Err = PrimitiveError;

    /// Accepts either a 0x-hex public key or an SS58 address
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("0x") {
            let bytes = decode_hex(s)?;
            let arr: [u8; 32] = bytes
                .try_into()
                .map_err(|b: Vec<u8>| PrimitiveError::InvalidLength { expected: 32, got: b.len() })?;
            return Ok(AccountId32(arr));
        }
        AccountId32::from_ss58(s).map(|(account, _)| account)
    }
}

/// Address wrapper used by `Balances::transfer*` and the extrinsic signer field
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum MultiAddress {
    Id(AccountId32),
    Index(#[codec(compact)] u32),
    Raw(Vec<u8>),
    Address32([u8; 32]),
    Address20([u8; 20]),
}

impl From<AccountId32> for MultiAddress {
    fn from(account: AccountId32) -> Self {
        MultiAddress::Id(account)
    }
}

/// Decode a hex string with optional `0x` prefix
pub fn decode_hex(s: &str) -> Result<Vec<u8>, PrimitiveError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(stripped).map_err(|e| PrimitiveError::InvalidHex(e.to_string()))
}

fn ss58_prefix_bytes(prefix: u16) -> Vec<u8> {
    match prefix {
        0..=63 => vec![prefix as u8],
        _ => {
            let first = ((prefix & 0b0000_0000_1111_1100) as u8 >> 2) | 0b0100_0000;
            let second = ((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) as u8) << 6);
            vec![first, second]
        }
    }
}

fn ss58_checksum(data: &[u8]) -> [u8; 64] {
    let mut preimage = Vec::with_capacity(SS58_CHECKSUM_PREFIX.len() + data.len());
    preimage.extend_from_slice(SS58_CHECKSUM_PREFIX);
    preimage.extend_from_slice(data);
    sp_crypto_hashing::blake2_512(&preimage)
}

/// Format a base-unit balance as whole units with up to 4 decimals
pub fn format_balance(amount: Balance) -> String {
    let whole = amount / UNIT;
    let frac = (amount % UNIT) / (UNIT / 10_000);
    if frac == 0 {
        format!("{} FIRE", whole)
    } else {
        format!("{}.{:04} FIRE", whole, frac)
    }
}

/// Primitive parsing errors
#[derive(Debug, thiserror::Error)]
pub enum PrimitiveError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Invalid SS58 address: {0}")]
    InvalidSs58(String),
}
