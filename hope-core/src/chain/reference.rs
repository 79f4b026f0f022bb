//! 16-byte chain references and the `latest` alias.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::hashing::ID_LEN;

/// Prefix of the textual reference notation, e.g. `chain:latest`
const CHAIN_PREFIX: &str = "chain:";
const LATEST: &str = "latest";

/// Content-derived identifier of a snapshot
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainRef([u8; ID_LEN]);

impl ChainRef {
    pub const LEN: usize = ID_LEN;

    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build from a slice that must be exactly 16 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; ID_LEN] = bytes.try_into().map_err(|_| {
            Error::invalid_input(format!(
                "chain reference must be {} bytes, got {}",
                ID_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChainRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainRef({})", self.to_hex())
    }
}

impl FromStr for ChainRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let hex_part = s.strip_prefix(CHAIN_PREFIX).unwrap_or(s);
        let bytes = hex::decode(hex_part)
            .map_err(|e| Error::invalid_input(format!("invalid chain reference {:?}: {}", s, e)))?;
        Self::from_slice(&bytes)
    }
}

impl Serialize for ChainRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChainRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What to resolve: the head at call time, or an exact snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainTarget {
    Latest,
    Id(ChainRef),
}

impl From<ChainRef> for ChainTarget {
    fn from(r: ChainRef) -> Self {
        ChainTarget::Id(r)
    }
}

impl From<&ChainRef> for ChainTarget {
    fn from(r: &ChainRef) -> Self {
        ChainTarget::Id(*r)
    }
}

impl FromStr for ChainTarget {
    type Err = Error;

    /// Accepts `latest`, `chain:latest`, 32 hex chars or `chain:<hex>`
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let body = trimmed.strip_prefix(CHAIN_PREFIX).unwrap_or(trimmed);
        if body.eq_ignore_ascii_case(LATEST) {
            return Ok(ChainTarget::Latest);
        }
        body.parse().map(ChainTarget::Id)
    }
}

impl fmt::Display for ChainTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainTarget::Latest => f.write_str(LATEST),
            ChainTarget::Id(r) => write!(f, "{}{}", CHAIN_PREFIX, r),
        }
    }
}
