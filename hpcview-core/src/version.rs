//! Server protocol versions.
//!
//! Every property carries the version that introduced it, and the
//! compatibility layer compares that against the version of the connected
//! server to decide which converters apply.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Four-part scheduler server version (`major.minor.build.revision`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl ServerVersion {
    /// Oldest protocol generation this client can talk to.
    pub const V2: Self = Self::new(2, 0, 0, 0);
    /// First generation with dynamic rowsets and freeze.
    pub const V3: Self = Self::new(3, 0, 0, 0);
    pub const V3_SP1: Self = Self::new(3, 1, 0, 0);
    pub const V3_SP2: Self = Self::new(3, 2, 0, 0);
    /// Current generation.
    pub const V4: Self = Self::new(4, 0, 0, 0);

    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// The newest version this client knows about.
    pub const fn current() -> Self {
        Self::V4
    }

    /// Check whether a feature introduced in `introduced` is available on this server.
    pub fn supports(&self, introduced: ServerVersion) -> bool {
        *self >= introduced
    }
}

impl Default for ServerVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Error when parsing an invalid version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersionParseError(pub String);

impl fmt::Display for ServerVersionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid server version: {}", self.0)
    }
}

impl std::error::Error for ServerVersionParseError {}

impl FromStr for ServerVersion {
    type Err = ServerVersionParseError;

    /// Accepts one to four dot-separated components; missing components are zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u16; 4];
        let mut count = 0;
        for piece in s.trim().split('.') {
            if count == 4 {
                return Err(ServerVersionParseError(s.to_string()));
            }
            parts[count] = piece
                .parse()
                .map_err(|_| ServerVersionParseError(s.to_string()))?;
            count += 1;
        }
        Ok(Self::new(parts[0], parts[1], parts[2], parts[3]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        assert!(ServerVersion::V2 < ServerVersion::V3);
        assert!(ServerVersion::V3 < ServerVersion::V3_SP1);
        assert!(ServerVersion::V3_SP2 < ServerVersion::V4);
        assert!(ServerVersion::new(3, 1, 0, 5) > ServerVersion::V3_SP1);
    }

    #[test]
    fn test_supports() {
        assert!(ServerVersion::V4.supports(ServerVersion::V3));
        assert!(ServerVersion::V3.supports(ServerVersion::V3));
        assert!(!ServerVersion::V2.supports(ServerVersion::V3_SP1));
    }

    #[test]
    fn test_parse_and_display() {
        let v: ServerVersion = "3.2".parse().unwrap();
        assert_eq!(v, ServerVersion::V3_SP2);
        assert_eq!(v.to_string(), "3.2.0.0");
        assert_eq!("4.0.1234.5".parse::<ServerVersion>().unwrap().build, 1234);
        assert!("4.x".parse::<ServerVersion>().is_err());
        assert!("1.2.3.4.5".parse::<ServerVersion>().is_err());
    }
}
