//! Windows security identifiers (`objectSid`).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ConnectorError;

/// A parsed security identifier such as `S-1-5-21-3623811015-3361044348-30300820-1013`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityIdentifier {
    /// SID revision, always 1 in practice.
    pub revision: u8,
    /// 48-bit identifier authority.
    pub authority: u64,
    /// Sub-authorities; the last one is the relative identifier (RID).
    pub sub_authorities: Vec<u32>,
}

impl SecurityIdentifier {
    /// Decode the binary wire form returned by Active Directory.
    ///
    /// Layout: revision (1), sub-authority count (1), authority (6, big-endian),
    /// then `count` little-endian u32 sub-authorities.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConnectorError> {
        if bytes.len() < 8 {
            return Err(ConnectorError::InvalidData {
                message: format!("SID too short: {} bytes", bytes.len()),
            });
        }
        let revision = bytes[0];
        let count = bytes[1] as usize;
        if bytes.len() != 8 + count * 4 {
            return Err(ConnectorError::InvalidData {
                message: format!(
                    "SID length {} does not match {} sub-authorities",
                    bytes.len(),
                    count
                ),
            });
        }

        let authority = bytes[2..8]
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));

        let sub_authorities = bytes[8..]
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();

        Ok(Self {
            revision,
            authority,
            sub_authorities,
        })
    }

    /// The relative identifier: the trailing sub-authority.
    pub fn rid(&self) -> Option<u32> {
        self.sub_authorities.last().copied()
    }
}

impl FromStr for SecurityIdentifier {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConnectorError::InvalidData {
            message: format!("not a security identifier: {s}"),
        };

        let mut parts = s.trim().split('-');
        if !parts.next().is_some_and(|p| p.eq_ignore_ascii_case("S")) {
            return Err(invalid());
        }
        let revision = parts
            .next()
            .and_then(|p| p.parse::<u8>().ok())
            .ok_or_else(invalid)?;
        let authority = parts
            .next()
            .and_then(|p| p.parse::<u64>().ok())
            .ok_or_else(invalid)?;
        let sub_authorities = parts
            .map(|p| p.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            revision,
            authority,
            sub_authorities,
        })
    }
}

impl std::fmt::Display for SecurityIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "S-{}-{}", self.revision, self.authority)?;
        for sub in &self.sub_authorities {
            write!(f, "-{sub}")?;
        }
        Ok(())
    }
}
