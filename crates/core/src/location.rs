use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Placement hint used when a bucket is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Location {
    #[default]
    Default,
    Eu,
    UsWest,
    UsWest2,
    SaEast,
    ApNortheast,
    ApSoutheast,
    ApSoutheast2,
    CnNorth1,
}

impl Location {
    pub const ALL: [Location; 9] = [
        Location::Default,
        Location::Eu,
        Location::UsWest,
        Location::UsWest2,
        Location::SaEast,
        Location::ApNortheast,
        Location::ApSoutheast,
        Location::ApSoutheast2,
        Location::CnNorth1,
    ];

    /// Name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Location::Default => "DEFAULT",
            Location::Eu => "EU",
            Location::UsWest => "USWest",
            Location::UsWest2 => "USWest2",
            Location::SaEast => "SAEast",
            Location::ApNortheast => "APNortheast",
            Location::ApSoutheast => "APSoutheast",
            Location::ApSoutheast2 => "APSoutheast2",
            Location::CnNorth1 => "CNNorth1",
        }
    }

    /// Location constraint sent with a create-bucket request. Empty for the
    /// service default.
    pub fn constraint(self) -> &'static str {
        match self {
            Location::Default => "",
            Location::Eu => "EU",
            Location::UsWest => "us-west-1",
            Location::UsWest2 => "us-west-2",
            Location::SaEast => "sa-east-1",
            Location::ApNortheast => "ap-northeast-1",
            Location::ApSoutheast => "ap-southeast-1",
            Location::ApSoutheast2 => "ap-southeast-2",
            Location::CnNorth1 => "cn-north-1",
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Location {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Location::ALL
            .into_iter()
            .find(|l| l.name() == s || (!s.is_empty() && l.constraint() == s))
            .ok_or_else(|| StorageError::UnknownLocation(s.to_string()))
    }
}

impl TryFrom<String> for Location {
    type Error = StorageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Location> for String {
    fn from(l: Location) -> Self {
        l.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_constraints() {
        assert_eq!("DEFAULT".parse::<Location>().unwrap(), Location::Default);
        assert_eq!("EU".parse::<Location>().unwrap(), Location::Eu);
        assert_eq!("USWest2".parse::<Location>().unwrap(), Location::UsWest2);
        assert_eq!("sa-east-1".parse::<Location>().unwrap(), Location::SaEast);
    }

    #[test]
    fn rejects_unknown() {
        let err = "Mars".parse::<Location>().unwrap_err();
        assert!(matches!(err, StorageError::UnknownLocation(ref s) if s == "Mars"));
        assert!("".parse::<Location>().is_err());
    }

    #[test]
    fn serde_uses_names() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            location: Location,
        }
        let w: Wrapper = toml::from_str("location = \"APSoutheast2\"").unwrap();
        assert_eq!(w.location, Location::ApSoutheast2);
        let out = toml::to_string(&w).unwrap();
        assert!(out.contains("APSoutheast2"));
    }
}
