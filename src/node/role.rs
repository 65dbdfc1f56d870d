// Role - Authority roles and their deterministic port assignment

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Node key of the bootstrap node (ed25519 secret, hex)
pub const BOOTSTRAP_NODE_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000001";

/// libp2p peer id derived from [`BOOTSTRAP_NODE_KEY`]
pub const BOOTSTRAP_PEER_ID: &str = "12D3KooWEyoppNCUx8Yx66oV9fJnriXwCcXwDDUA2kj6vnc6iDEp";

pub const DEFAULT_BASE_RPC_PORT: u16 = 9944;
pub const DEFAULT_BASE_P2P_PORT: u16 = 30333;

/// Well-known dev authorities, in port-table order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorityRole {
    Alice,
    Bob,
    Charlie,
    Dave,
    Eve,
    Ferdie,
}

impl AuthorityRole {
    pub const ALL: [AuthorityRole; 6] = [
        AuthorityRole::Alice,
        AuthorityRole::Bob,
        AuthorityRole::Charlie,
        AuthorityRole::Dave,
        AuthorityRole::Eve,
        AuthorityRole::Ferdie,
    ];

    /// Position in the port table
    pub fn index(&self) -> u16 {
        match self {
            AuthorityRole::Alice => 0,
            AuthorityRole::Bob => 1,
            AuthorityRole::Charlie => 2,
            AuthorityRole::Dave => 3,
            AuthorityRole::Eve => 4,
            AuthorityRole::Ferdie => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityRole::Alice => "alice",
            AuthorityRole::Bob => "bob",
            AuthorityRole::Charlie => "charlie",
            AuthorityRole::Dave => "dave",
            AuthorityRole::Eve => "eve",
            AuthorityRole::Ferdie => "ferdie",
        }
    }

    /// The node's `--<role>` flag
    pub fn flag(&self) -> String {
        format!("--{}", self.as_str())
    }

    /// Parse a comma separated list such as `alice,bob,charlie`
    pub fn parse_list(list: &str) -> Result<Vec<AuthorityRole>, UnknownRole> {
        let mut roles = Vec::new();
        for part in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let role = part.parse()?;
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        Ok(roles)
    }
}

impl fmt::Display for AuthorityRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorityRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuthorityRole::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown authority role: {0}")]
pub struct UnknownRole(pub String);

// =============================================================================
// PORT TABLE
// =============================================================================

/// `rpc = base_rpc + offset + i`, `p2p = base_p2p + offset + i`
///
/// Concurrent runs need offsets at least [`PortTable::SPAN`] apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortTable {
    pub base_rpc: u16,
    pub base_p2p: u16,
    pub offset: u16,
}

impl Default for PortTable {
    fn default() -> Self {
        Self {
            base_rpc: DEFAULT_BASE_RPC_PORT,
            base_p2p: DEFAULT_BASE_P2P_PORT,
            offset: 0,
        }
    }
}

impl PortTable {
    /// Ports consumed per table and per kind
    pub const SPAN: u16 = AuthorityRole::ALL.len() as u16;

    pub fn with_offset(mut self, offset: u16) -> Self {
        self.offset = offset;
        self
    }

    pub fn rpc_port(&self, role: AuthorityRole) -> u16 {
        self.base_rpc + self.offset + role.index()
    }

    pub fn p2p_port(&self, role: AuthorityRole) -> u16 {
        self.base_p2p + self.offset + role.index()
    }

    /// (rpc, p2p)
    pub fn ports(&self, role: AuthorityRole) -> (u16, u16) {
        (self.rpc_port(role), self.p2p_port(role))
    }

    /// Every port fits in u16 and the rpc and p2p ranges do not overlap
    pub fn validate(&self) -> Result<(), String> {
        let top = |base: u16| base as u32 + self.offset as u32 + Self::SPAN as u32 - 1;
        if top(self.base_rpc) > u16::MAX as u32 || top(self.base_p2p) > u16::MAX as u32 {
            return Err(format!("port offset {} overflows the port range", self.offset));
        }
        if self.base_rpc.abs_diff(self.base_p2p) < Self::SPAN {
            return Err(format!(
                "rpc base {} and p2p base {} overlap",
                self.base_rpc, self.base_p2p
            ));
        }
        Ok(())
    }

    /// Multiaddr of the bootstrap node as passed to `--bootnodes`
    pub fn bootnode_addr(&self, bootstrap: AuthorityRole) -> String {
        format!(
            "/ip4/127.0.0.1/tcp/{}/p2p/{}",
            self.p2p_port(bootstrap),
            BOOTSTRAP_PEER_ID
        )
    }
}
