// Tx - Calls, signers, extrinsic construction and submission tracking

pub mod call;
pub mod extrinsic;
pub mod signer;
pub mod submit;

pub use call::{Call, CallArg, Weight};
pub use extrinsic::{build_signed, extrinsic_hash, ExtrinsicError, ExtrinsicParams, SignedExtrinsic};
pub use signer::{DevAccount, Ed25519Signer, MultiSignature, Signer, SignerError, Sr25519Signer};
pub use submit::{
    ExtrinsicState, ExtrinsicSubmitter, NonceMode, PoolRejection, PoolRejectionKind, SubmittedExtrinsic, TxError,
    TxOptions, TxProgress, TxStatus, SUDO_TIP,
};
