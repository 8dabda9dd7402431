//! Bundle format versioning

use semver::Version;
use std::fmt;

use crate::error::{Result, SchemaError};

/// Format marker written to every bundle's metadata
pub const BUNDLE_FORMAT: &str = "xsd-repository-bundle";

/// Format version written by this crate
pub const CURRENT_FORMAT_VERSION: &str = "1.0.0";

/// A bundle format version; readable when its major matches ours
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FormatVersion(Version);

impl FormatVersion {
    pub fn current() -> Self {
        Self(Version::new(1, 0, 0))
    }

    /// Parse a version string, tolerating a leading `v`
    pub fn parse(version_str: &str) -> Result<Self> {
        let version_str = version_str.strip_prefix('v').unwrap_or(version_str);
        Ok(Self(Version::parse(version_str)?))
    }

    pub fn version(&self) -> &Version {
        &self.0
    }

    pub fn is_supported(&self) -> bool {
        self.0.major == Self::current().0.major
    }

    /// Fail with `UnsupportedFormat` for a different major version
    pub fn ensure_supported(&self) -> Result<()> {
        if self.is_supported() {
            return Ok(());
        }
        Err(SchemaError::UnsupportedFormat {
            found: self.0.to_string(),
            supported: format!("{}.x", Self::current().0.major),
        })
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_matches_constant() {
        assert_eq!(FormatVersion::current().to_string(), CURRENT_FORMAT_VERSION);
    }

    #[test]
    fn test_minor_versions_supported() {
        assert!(FormatVersion::parse("v1.4.2").unwrap().is_supported());
        let err = FormatVersion::parse("2.0.0").unwrap().ensure_supported().unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedFormat { .. }));
        assert!(FormatVersion::parse("one").is_err());
    }
}
