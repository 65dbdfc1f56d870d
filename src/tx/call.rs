// Call - Runtime call values resolved against metadata at encode time
// Principle: a call is a name plus SCALE-encoded arguments; indices are looked up lazily

use crate::chain::metadata::{Metadata, MetadataError};
use crate::chain::primitives::{AccountId32, Balance, MultiAddress};
use codec::{Compact, Encode};
use scale_info::TypeInfo;
use std::fmt;

/// Weight passed to `Sudo::sudo_unchecked_weight`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Encode, TypeInfo)]
pub struct Weight {
    #[codec(compact)]
    pub ref_time: u64,
    #[codec(compact)]
    pub proof_size: u64,
}

impl Weight {
    pub fn new(ref_time: u64, proof_size: u64) -> Self {
        Self { ref_time, proof_size }
    }
}

/// One call argument
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    /// Already SCALE-encoded bytes
    Encoded(Vec<u8>),
    /// A nested call (sudo, utility batches)
    Call(Box<Call>),
}

/// A runtime call addressed by pallet and call name
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pallet: String,
    name: String,
    args: Vec<CallArg>,
}

impl Call {
    pub fn new(pallet: &str, name: &str) -> Self {
        Self {
            pallet: pallet.to_string(),
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    pub fn pallet(&self) -> &str {
        &self.pallet
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[CallArg] {
        &self.args
    }

    /// Append an argument encoded with its SCALE representation
    pub fn arg<T: Encode>(mut self, value: T) -> Self {
        self.args.push(CallArg::Encoded(value.encode()));
        self
    }

    /// Append a `#[pallet::compact]` integer argument
    pub fn compact_arg(self, value: u128) -> Self {
        self.arg(Compact(value))
    }

    /// Append pre-encoded bytes verbatim
    pub fn raw_arg(mut self, bytes: Vec<u8>) -> Self {
        self.args.push(CallArg::Encoded(bytes));
        self
    }

    /// Append a nested call
    pub fn call_arg(mut self, call: Call) -> Self {
        self.args.push(CallArg::Call(Box::new(call)));
        self
    }

    // =========================================================================
    // SUDO DECORATORS
    // =========================================================================

    /// `Sudo::sudo(call)`
    pub fn sudo(self) -> Call {
        Call::new("Sudo", "sudo").call_arg(self)
    }

    /// `Sudo::sudo_unchecked_weight(call, weight)`
    pub fn sudo_unchecked_weight(self, weight: Weight) -> Call {
        Call::new("Sudo", "sudo_unchecked_weight").call_arg(self).arg(weight)
    }

    /// True for calls produced by the sudo decorators
    pub fn is_sudo(&self) -> bool {
        self.pallet.eq_ignore_ascii_case("Sudo") && self.name.starts_with("sudo")
    }

    /// The wrapped call of a sudo envelope
    pub fn inner(&self) -> Option<&Call> {
        self.args.iter().find_map(|a| match a {
            CallArg::Call(c) => Some(c.as_ref()),
            CallArg::Encoded(_) => None,
        })
    }

    // =========================================================================
    // ENCODING
    // =========================================================================

    /// `[pallet_index, call_index] ++ args`
    pub fn encode(&self, metadata: &Metadata) -> Result<Vec<u8>, MetadataError> {
        let mut out = Vec::new();
        self.encode_to(metadata, &mut out)?;
        Ok(out)
    }

    fn encode_to(&self, metadata: &Metadata, out: &mut Vec<u8>) -> Result<(), MetadataError> {
        let (pallet_index, call_index) = metadata.call_index(&self.pallet, &self.name)?;
        out.push(pallet_index);
        out.push(call_index);
        for arg in &self.args {
            match arg {
                CallArg::Encoded(bytes) => out.extend_from_slice(bytes),
                CallArg::Call(call) => call.encode_to(metadata, out)?,
            }
        }
        Ok(())
    }

    // =========================================================================
    // COMMON CALLS
    // =========================================================================

    /// `Balances::transfer_keep_alive(dest, value)`
    pub fn transfer_keep_alive(dest: AccountId32, value: Balance) -> Call {
        Call::new("Balances", "transfer_keep_alive")
            .arg(MultiAddress::Id(dest))
            .compact_arg(value)
    }

    /// `Balances::transfer_allow_death(dest, value)`
    pub fn transfer_allow_death(dest: AccountId32, value: Balance) -> Call {
        Call::new("Balances", "transfer_allow_death")
            .arg(MultiAddress::Id(dest))
            .compact_arg(value)
    }

    /// `System::remark(bytes)`
    pub fn remark(remark: Vec<u8>) -> Call {
        Call::new("System", "remark").arg(remark)
    }

    /// `System::set_code(code)`; root only, so wrap it in a sudo decorator
    pub fn set_code(code: Vec<u8>) -> Call {
        Call::new("System", "set_code").arg(code)
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}::{}", self.pallet, self.name)?;
        if let Some(inner) = self.inner() {
            write!(f, "({})", inner)?;
        }
        Ok(())
    }
}
