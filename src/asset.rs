//! Asset identifiers.
//!
//! A tagged union over the four balance dimensions the search engine
//! bisects across: native NEAR, NEP-141 fungible tokens, NEP-245 /
//! NEAR-Intents multi-token positions, and delegated staking pools. Each
//! variant has a canonical string form that doubles as a map key and an
//! on-disk `token_id` identifier, packing extra structure into a single
//! string key.

use std::fmt;
use std::str::FromStr;

/// Prefix used by NEAR Intents multi-token ids.
pub const MT_PREFIX_NEP141: &str = "nep141";
pub const MT_PREFIX_NEP245: &str = "nep245";

const STAKING_PREFIX: &str = "staking:";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetId {
    Native,
    FungibleToken {
        contract_id: String,
    },
    MultiToken {
        prefix: MtPrefix,
        contract_id: String,
        sub_id: Option<String>,
    },
    StakedWith {
        pool_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MtPrefix {
    Nep141,
    Nep245,
}

impl MtPrefix {
    fn as_str(self) -> &'static str {
        match self {
            MtPrefix::Nep141 => MT_PREFIX_NEP141,
            MtPrefix::Nep245 => MT_PREFIX_NEP245,
        }
    }
}

impl AssetId {
    pub fn ft(contract_id: impl Into<String>) -> Self {
        AssetId::FungibleToken {
            contract_id: contract_id.into(),
        }
    }

    pub fn mt_nep141(contract_id: impl Into<String>) -> Self {
        AssetId::MultiToken {
            prefix: MtPrefix::Nep141,
            contract_id: contract_id.into(),
            sub_id: None,
        }
    }

    pub fn mt_nep245(contract_id: impl Into<String>, sub_id: impl Into<String>) -> Self {
        AssetId::MultiToken {
            prefix: MtPrefix::Nep245,
            contract_id: contract_id.into(),
            sub_id: Some(sub_id.into()),
        }
    }

    pub fn staked_with(pool_id: impl Into<String>) -> Self {
        AssetId::StakedWith {
            pool_id: pool_id.into(),
        }
    }

    /// The NEP-141 contract a FungibleToken metadata lookup would hit, or
    /// the underlying contract for a multi-token id — multi-token ids are
    /// unwrapped to their backing contract before a metadata lookup.
    pub fn metadata_contract(&self) -> Option<&str> {
        match self {
            AssetId::Native => None,
            AssetId::FungibleToken { contract_id } => Some(contract_id),
            AssetId::MultiToken { contract_id, .. } => Some(contract_id),
            AssetId::StakedWith { pool_id } => Some(pool_id),
        }
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Native => write!(f, "near"),
            AssetId::FungibleToken { contract_id } => write!(f, "{}", contract_id),
            AssetId::MultiToken {
                prefix,
                contract_id,
                sub_id: None,
            } => write!(f, "{}:{}", prefix.as_str(), contract_id),
            AssetId::MultiToken {
                prefix,
                contract_id,
                sub_id: Some(sub_id),
            } => write!(f, "{}:{}:{}", prefix.as_str(), contract_id, sub_id),
            AssetId::StakedWith { pool_id } => write!(f, "{}{}", STAKING_PREFIX, pool_id),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("not a recognized asset id: {0}")]
pub struct AssetIdParseError(String);

impl FromStr for AssetId {
    type Err = AssetIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("near") {
            return Ok(AssetId::Native);
        }
        if let Some(pool_id) = s.strip_prefix(STAKING_PREFIX) {
            return Ok(AssetId::staked_with(pool_id));
        }
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(MT_PREFIX_NEP141), Some(contract_id), None) => {
                Ok(AssetId::mt_nep141(contract_id))
            }
            (Some(MT_PREFIX_NEP245), Some(contract_id), Some(sub_id)) => {
                Ok(AssetId::mt_nep245(contract_id, sub_id))
            }
            (Some(MT_PREFIX_NEP245), Some(contract_id), None) => {
                Ok(AssetId::mt_nep245(contract_id, ""))
            }
            _ if !s.contains(':') => Ok(AssetId::ft(s)),
            _ => Err(AssetIdParseError(s.to_string())),
        }
    }
}

impl serde::Serialize for AssetId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for AssetId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        AssetId::from_str(&s).map_err(serde::de::Error::custom)
    }
}
