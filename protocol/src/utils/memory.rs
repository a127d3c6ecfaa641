use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

lazy_static! {
    static ref MEMORY_PATTERN: Regex =
        Regex::new(r"^([0-9]+)([GgMm])?$").expect("Failed to compile MEMORY_PATTERN regex");
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MemoryParseError {
    #[error("memory value is empty")]
    Empty,
    #[error("invalid memory value `{0}`: expected digits with an optional G or M suffix")]
    Invalid(String),
    #[error("memory value `{0}` is too large")]
    Overflow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryUnit {
    Megabytes,
    Gigabytes,
}

impl MemoryUnit {
    pub fn suffix(&self) -> char {
        match self {
            MemoryUnit::Megabytes => 'M',
            MemoryUnit::Gigabytes => 'G',
        }
    }
}

/// Heap size as accepted by `-Xms`/`-Xmx`.
///
/// A bare number means megabytes; the suffix is case-insensitive on input and
/// always rendered uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MemorySize {
    amount: u64,
    unit: MemoryUnit,
}

impl MemorySize {
    pub fn new(amount: u64, unit: MemoryUnit) -> Self {
        Self { amount, unit }
    }

    pub fn parse(input: &str) -> Result<Self, MemoryParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(MemoryParseError::Empty);
        }
        let caps = MEMORY_PATTERN
            .captures(trimmed)
            .ok_or_else(|| MemoryParseError::Invalid(trimmed.to_string()))?;
        let amount = caps[1]
            .parse::<u64>()
            .map_err(|_| MemoryParseError::Overflow(trimmed.to_string()))?;
        let unit = match caps.get(2).map(|m| m.as_str()) {
            Some("g") | Some("G") => MemoryUnit::Gigabytes,
            _ => MemoryUnit::Megabytes,
        };
        Ok(Self { amount, unit })
    }

    /// Parses and re-renders, e.g. `"2g"` becomes `"2G"` and `"512"` becomes `"512M"`.
    pub fn normalize(input: &str) -> Result<String, MemoryParseError> {
        Self::parse(input).map(|size| size.to_string())
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn unit(&self) -> MemoryUnit {
        self.unit
    }

    pub fn to_mb(&self) -> u64 {
        match self.unit {
            MemoryUnit::Megabytes => self.amount,
            MemoryUnit::Gigabytes => self.amount.saturating_mul(1024),
        }
    }
}

impl fmt::Display for MemorySize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for MemorySize {
    type Err = MemoryParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MemorySize {
    type Error = MemoryParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MemorySize> for String {
    fn from(value: MemorySize) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_suffixes() {
        assert_eq!(MemorySize::normalize("2g").unwrap(), "2G");
        assert_eq!(MemorySize::normalize("512").unwrap(), "512M");
        assert_eq!(MemorySize::normalize("768m").unwrap(), "768M");
        assert_eq!(MemorySize::normalize(" 4G ").unwrap(), "4G");
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            MemorySize::parse("abc"),
            Err(MemoryParseError::Invalid(_))
        ));
        assert_eq!(MemorySize::parse("   "), Err(MemoryParseError::Empty));
        // non-ASCII digits are not numbers here
        assert!(matches!(
            MemorySize::parse("\u{665}G"),
            Err(MemoryParseError::Invalid(_))
        ));
        for bad in ["1.5G", "-1", "2GB", "G", "2 G", "2k"] {
            assert!(MemorySize::parse(bad).is_err(), "{bad} should be rejected");
        }
        assert!(matches!(
            MemorySize::parse("99999999999999999999999"),
            Err(MemoryParseError::Overflow(_))
        ));
    }

    #[test]
    fn normalize_is_idempotent() {
        for input in ["1", "1g", "1G", "1024m", "0", "16G", "00512", " 3m"] {
            let once = MemorySize::normalize(input).unwrap();
            let twice = MemorySize::normalize(&once).unwrap();
            assert_eq!(once, twice, "input {input}");
        }
    }

    #[test]
    fn converts_to_megabytes() {
        assert_eq!(MemorySize::parse("2G").unwrap().to_mb(), 2048);
        assert_eq!(MemorySize::parse("1500").unwrap().to_mb(), 1500);
        assert!(MemorySize::parse("1G").unwrap().to_mb() < MemorySize::parse("1025M").unwrap().to_mb());
    }

    #[test]
    fn serializes_as_normalized_string() {
        let size: MemorySize = serde_json::from_str("\"3g\"").unwrap();
        assert_eq!(serde_json::to_string(&size).unwrap(), "\"3G\"");
        assert!(serde_json::from_str::<MemorySize>("\"lots\"").is_err());
    }
}
