// Signer - sr25519 / ed25519 transaction signing and the development keyring

use crate::chain::primitives::{decode_hex, AccountId32};
use codec::{Decode, Encode};
use ed25519_dalek::Signer as _;
use schnorrkel::derive::ChainCode;
use schnorrkel::{ExpansionMode, MiniSecretKey};
use std::fmt;
use std::str::FromStr;

/// Signing context used by substrate for sr25519
const SIGNING_CONTEXT: &[u8] = b"substrate";

/// Domain separator for ed25519 hard derivation
const ED25519_HDKD: &str = "Ed25519HDKD";

/// Signature attached to an extrinsic
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum MultiSignature {
    Ed25519([u8; 64]),
    Sr25519([u8; 64]),
}

/// Anything that can sign an extrinsic payload
pub trait Signer: Send + Sync {
    fn account_id(&self) -> AccountId32;

    fn sign(&self, payload: &[u8]) -> MultiSignature;
}

// =============================================================================
// SR25519
// =============================================================================

/// sr25519 key pair (the substrate default)
#[derive(Clone)]
pub struct Sr25519Signer {
    keypair: schnorrkel::Keypair,
}

impl Sr25519Signer {
    /// Key pair from a 32-byte mini secret ("secret seed")
    pub fn from_seed(seed: [u8; 32]) -> Result<Self, SignerError> {
        let mini = MiniSecretKey::from_bytes(&seed).map_err(|e| SignerError::InvalidSeed(e.to_string()))?;
        Ok(Self {
            keypair: mini.expand_to_keypair(ExpansionMode::Ed25519),
        })
    }

    /// Hard-derive a child key (`//junction`)
    pub fn derive_hard(&self, junction: &str) -> Self {
        let chain_code = ChainCode(junction_chain_code(junction));
        let (mini, _) = self.keypair.secret.hard_derive_mini_secret_key(Some(chain_code), b"");
        Self {
            keypair: mini.expand_to_keypair(ExpansionMode::Ed25519),
        }
    }

    /// Parse `//Alice`, `//Alice//stash` or `0x<seed>//junction`
    pub fn from_uri(uri: &str) -> Result<Self, SignerError> {
        let (root, junctions) = split_uri(uri)?;
        let mut signer = match root {
            Some(seed) => Self::from_seed(seed)?,
            None => {
                let first = junctions
                    .first()
                    .ok_or_else(|| SignerError::InvalidUri(uri.to_string()))?;
                DevAccount::from_str(first)?.sr25519()?
            }
        };

        let skip = if root.is_some() { 0 } else { 1 };
        for junction in junctions.iter().skip(skip) {
            signer = signer.derive_hard(junction);
        }
        Ok(signer)
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public.to_bytes()
    }
}

impl Signer for Sr25519Signer {
    fn account_id(&self) -> AccountId32 {
        AccountId32::from_bytes(self.public_key())
    }

    fn sign(&self, payload: &[u8]) -> MultiSignature {
        let context = schnorrkel::signing_context(SIGNING_CONTEXT);
        let signature = self.keypair.sign(context.bytes(payload));
        MultiSignature::Sr25519(signature.to_bytes())
    }
}

impl fmt::Debug for Sr25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Sr25519Signer({})", self.account_id())
    }
}

// =============================================================================
// ED25519
// =============================================================================

/// ed25519 key pair
#[derive(Clone)]
pub struct Ed25519Signer {
    seed: [u8; 32],
    key: ed25519_dalek::SigningKey,
}

impl Ed25519Signer {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            seed,
            key: ed25519_dalek::SigningKey::from_bytes(&seed),
        }
    }

    /// Fresh random key
    pub fn generate() -> Self {
        let key = ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng);
        Self { seed: key.to_bytes(), key }
    }

    /// Hard-derive a child key (`//junction`)
    pub fn derive_hard(&self, junction: &str) -> Self {
        let chain_code = junction_chain_code(junction);
        let seed = sp_crypto_hashing::blake2_256(&(ED25519_HDKD, self.seed, chain_code).encode());
        Self::from_seed(seed)
    }
}

impl Signer for Ed25519Signer {
    fn account_id(&self) -> AccountId32 {
        AccountId32::from_bytes(self.key.verifying_key().to_bytes())
    }

    fn sign(&self, payload: &[u8]) -> MultiSignature {
        MultiSignature::Ed25519(self.key.sign(payload).to_bytes())
    }
}

impl fmt::Debug for Ed25519Signer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Ed25519Signer({})", self.account_id())
    }
}

// =============================================================================
// DEVELOPMENT KEYRING
// =============================================================================

/// Well-known development accounts, one per authority role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DevAccount {
    Alice,
    Bob,
    Charlie,
    Dave,
    Eve,
    Ferdie,
}

impl DevAccount {
    pub const ALL: [DevAccount; 6] = [
        DevAccount::Alice,
        DevAccount::Bob,
        DevAccount::Charlie,
        DevAccount::Dave,
        DevAccount::Eve,
        DevAccount::Ferdie,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DevAccount::Alice => "Alice",
            DevAccount::Bob => "Bob",
            DevAccount::Charlie => "Charlie",
            DevAccount::Dave => "Dave",
            DevAccount::Eve => "Eve",
            DevAccount::Ferdie => "Ferdie",
        }
    }

    /// sr25519 mini secret of `<dev phrase>//<Name>`
    fn seed_hex(&self) -> &'static str {
        match self {
            DevAccount::Alice => "e5be9a5092b81bca64be81d212e7f2f9eba183bb7a797fbae21af5b1c2cb2c6e",
            DevAccount::Bob => "398f0c28f98885e046333d4a41c19cee4c37368a9832c6502f6cfd182e2aef89",
            DevAccount::Charlie => "bc1ede780f784bb6991a585e4f6e61522c14e1cae6ad0895fb57b9a205a8f938",
            DevAccount::Dave => "868020ae0687dda7d57565093a69090211449845a7e11453612800b663307246",
            DevAccount::Eve => "786ad0e2df456fe43dd1f91ebca22e235bc162e0bb8d53c633e8c85b2af68b7a",
            DevAccount::Ferdie => "42438b7883391c05512a938e36c2df0131e088b54dd04b6c9cb6ab4ea2b9aed2",
        }
    }

    pub fn seed(&self) -> Result<[u8; 32], SignerError> {
        let bytes = hex::decode(self.seed_hex()).map_err(|e| SignerError::InvalidSeed(e.to_string()))?;
        bytes
            .try_into()
            .map_err(|_| SignerError::InvalidSeed(self.name().to_string()))
    }

    pub fn sr25519(&self) -> Result<Sr25519Signer, SignerError> {
        Sr25519Signer::from_seed(self.seed()?)
    }

    /// `//Name//stash`
    pub fn stash(&self) -> Result<Sr25519Signer, SignerError> {
        Ok(self.sr25519()?.derive_hard("stash"))
    }

    pub fn account_id(&self) -> Result<AccountId32, SignerError> {
        Ok(self.sr25519()?.account_id())
    }
}

impl FromStr for DevAccount {
    type Err = SignerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DevAccount::ALL
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| SignerError::UnknownDevAccount(s.to_string()))
    }
}

impl fmt::Display for DevAccount {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Chain code of a derivation junction: numeric junctions encode as u64,
/// others as a SCALE string; longer than 32 bytes are hashed
fn junction_chain_code(junction: &str) -> [u8; 32] {
    let encoded = match junction.parse::<u64>() {
        Ok(n) => n.encode(),
        Err(_) => junction.encode(),
    };

    let mut cc = [0u8; 32];
    if encoded.len() > 32 {
        cc = sp_crypto_hashing::blake2_256(&encoded);
    } else {
        cc[..encoded.len()].copy_from_slice(&encoded);
    }
    cc
}

/// Split a URI into an optional hex seed and its hard junctions
fn split_uri(uri: &str) -> Result<(Option<[u8; 32]>, Vec<String>), SignerError> {
    let (root, path) = match uri.find("//") {
        Some(pos) => (&uri[..pos], &uri[pos..]),
        None => (uri, ""),
    };

    if path.contains('/') && path.split("//").any(|j| j.contains('/')) {
        return Err(SignerError::SoftDerivation(uri.to_string()));
    }

    let junctions: Vec<String> = path
        .split("//")
        .filter(|j| !j.is_empty())
        .map(str::to_string)
        .collect();

    let seed = if root.is_empty() {
        None
    } else {
        let bytes = decode_hex(root).map_err(|_| SignerError::InvalidUri(uri.to_string()))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SignerError::InvalidSeed(format!("{} is not 32 bytes", root)))?;
        Some(seed)
    };

    Ok((seed, junctions))
}

/// Signer errors
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Invalid secret URI: {0}")]
    InvalidUri(String),

    #[error("Soft derivation is not supported: {0}")]
    SoftDerivation(String),

    #[error("Unknown development account: {0}")]
    UnknownDevAccount(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use schnorrkel::{PublicKey, Signature};

    const ALICE_PUBLIC: &str = "d43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";
    const BOB_PUBLIC: &str = "8eaf04151687736326c9fea17e25fc5287613693c912909cb226aa4794f26a48";

    #[test]
    fn test_dev_accounts_match_well_known_keys() {
        assert_eq!(hex::encode(DevAccount::Alice.sr25519().unwrap().public_key()), ALICE_PUBLIC);
        assert_eq!(hex::encode(DevAccount::Bob.sr25519().unwrap().public_key()), BOB_PUBLIC);
        assert_eq!(
            DevAccount::Alice.account_id().unwrap().to_string(),
            "5GrwvaEF5zXb26Fz9rcQpDWS57CtERHpNehXCPcNoHGKutQY"
        );
    }

    #[test]
    fn test_sr25519_signature_verifies() {
        let signer = DevAccount::Alice.sr25519().unwrap();
        let payload = b"transfer payload";
        let MultiSignature::Sr25519(bytes) = signer.sign(payload) else {
            panic!("expected sr25519 signature");
        };

        let public = PublicKey::from_bytes(&signer.public_key()).unwrap();
        let signature = Signature::from_bytes(&bytes).unwrap();
        let context = schnorrkel::signing_context(SIGNING_CONTEXT);
        assert!(public.verify(context.bytes(payload), &signature).is_ok());
    }

    #[test]
    fn test_uri_parsing_and_derivation() {
        let alice = Sr25519Signer::from_uri("//Alice").unwrap();
        assert_eq!(alice.account_id(), DevAccount::Alice.account_id().unwrap());

        let stash = Sr25519Signer::from_uri("//Alice//stash").unwrap();
        assert_eq!(stash.account_id(), DevAccount::Alice.stash().unwrap().account_id());
        assert_ne!(stash.account_id(), alice.account_id());

        let seeded = Sr25519Signer::from_uri(&format!("0x{}", DevAccount::Bob.seed_hex())).unwrap();
        assert_eq!(seeded.account_id(), DevAccount::Bob.account_id().unwrap());

        assert!(Sr25519Signer::from_uri("//Mallory").is_err());
        assert!(Sr25519Signer::from_uri("//Alice/soft").is_err());
        assert!(Sr25519Signer::from_uri("0x1234").is_err());
    }

    #[test]
    fn test_junction_chain_codes() {
        let numeric = junction_chain_code("7");
        assert_eq!(&numeric[..8], &7u64.to_le_bytes());

        let named = junction_chain_code("stash");
        assert_eq!(named[0], 5 << 2);
        assert_eq!(&named[1..6], b"stash");

        let long = "x".repeat(40);
        assert_eq!(junction_chain_code(&long), sp_crypto_hashing::blake2_256(&long.encode()));
    }

    #[test]
    fn test_ed25519_signing_and_derivation() {
        let signer = Ed25519Signer::from_seed([3u8; 32]);
        let MultiSignature::Ed25519(bytes) = signer.sign(b"payload") else {
            panic!("expected ed25519 signature");
        };
        let signature = ed25519_dalek::Signature::from_bytes(&bytes);
        let verifying = ed25519_dalek::VerifyingKey::from_bytes(signer.account_id().as_bytes()).unwrap();
        assert!(verifying.verify_strict(b"payload", &signature).is_ok());

        let child = signer.derive_hard("1");
        assert_ne!(child.account_id(), signer.account_id());
        assert_eq!(child.account_id(), signer.derive_hard("1").account_id());
    }

    #[test]
    fn test_multi_signature_encoding() {
        assert_eq!(MultiSignature::Ed25519([0u8; 64]).encode()[0], 0);
        assert_eq!(MultiSignature::Sr25519([0u8; 64]).encode()[0], 1);
        assert_eq!(MultiSignature::Sr25519([0u8; 64]).encode().len(), 65);
    }
}
