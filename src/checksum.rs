//! Checksum utilities for bundle file integrity

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Result, SchemaError};

/// SHA-256 checksum of a schema file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    pub fn of(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn verify(&self, content: &str) -> bool {
        self.0.eq_ignore_ascii_case(Self::of(content).as_str())
    }

    /// Verify a bundle file, failing with `ChecksumMismatch`
    pub fn check(&self, file: &str, content: &str) -> Result<()> {
        if self.verify(content) {
            return Ok(());
        }
        Err(SchemaError::ChecksumMismatch {
            file: file.to_string(),
            expected: self.0.clone(),
            actual: Self::of(content).0,
        })
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
