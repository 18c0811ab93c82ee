//! Slot coordinates and their human-facing `L<level>B<block>` encoding

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A `(level, block)` slot coordinate. Both parts are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub level: u32,
    pub block: u32,
}

impl Position {
    pub const fn new(level: u32, block: u32) -> Self {
        Self { level, block }
    }

    /// Key used by the Gateway layout payload (`"<level>-<block>"`)
    pub fn slot_key(&self) -> String {
        format!("{}-{}", self.level, self.block)
    }

    /// Parse a Gateway slot key (`"1-2"`, also tolerating `"L1-B2"`)
    pub fn from_slot_key(key: &str) -> Result<Self, PositionParseError> {
        let trimmed = key.trim();
        let (level, block) = trimmed
            .split_once('-')
            .ok_or_else(|| PositionParseError::Format(key.to_string()))?;
        let level = level.strip_prefix(['L', 'l']).unwrap_or(level);
        let block = block.strip_prefix(['B', 'b']).unwrap_or(block);
        Ok(Self::new(parse_part(level, key)?, parse_part(block, key)?))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}B{}", self.level, self.block)
    }
}

/// Position parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionParseError {
    #[error("Position must be in format L{{level}}B{{block}} (e.g. L1B1), got {0:?}")]
    Format(String),

    #[error("Position component out of range in {0:?}")]
    OutOfRange(String),
}

/// Strict positive integer: ASCII digits only, no sign, no leading zero.
fn parse_part(digits: &str, original: &str) -> Result<u32, PositionParseError> {
    if digits.is_empty()
        || !digits.bytes().all(|b| b.is_ascii_digit())
        || (digits.len() > 1 && digits.starts_with('0'))
    {
        return Err(PositionParseError::Format(original.to_string()));
    }
    match digits.parse::<u32>() {
        Ok(0) | Err(_) => Err(PositionParseError::OutOfRange(original.to_string())),
        Ok(value) => Ok(value),
    }
}

impl FromStr for Position {
    type Err = PositionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let rest = upper
            .strip_prefix('L')
            .ok_or_else(|| PositionParseError::Format(s.to_string()))?;
        let (level, block) = rest
            .split_once('B')
            .ok_or_else(|| PositionParseError::Format(s.to_string()))?;
        Ok(Self::new(parse_part(level, s)?, parse_part(block, s)?))
    }
}

impl Serialize for Position {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        assert_eq!("L2B3".parse::<Position>().unwrap(), Position::new(2, 3));
        assert_eq!("l10b12".parse::<Position>().unwrap(), Position::new(10, 12));
        assert_eq!(" L1B1 ".parse::<Position>().unwrap(), Position::new(1, 1));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            "", "L", "LB", "L1", "B1", "L1B", "LB1", "L-1B2", "L+1B2", "L1B2x", "L 1B2", "L1 B2",
            "L1.0B2", "1B2", "L0B1", "L1B0", "L01B1", "L1B02", "L99999999999B1", "L1B1B1",
        ] {
            assert!(bad.parse::<Position>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_display_round_trip() {
        for level in 1..=5 {
            for block in 1..=12 {
                let pos = Position::new(level, block);
                assert_eq!(pos.to_string().parse::<Position>().unwrap(), pos);
            }
        }
    }

    #[test]
    fn test_slot_key() {
        let pos = Position::new(3, 4);
        assert_eq!(pos.slot_key(), "3-4");
        assert_eq!(Position::from_slot_key("3-4").unwrap(), pos);
        assert_eq!(Position::from_slot_key("L3-B4").unwrap(), pos);
        assert!(Position::from_slot_key("3_4").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Position::new(1, 6)).unwrap();
        assert_eq!(json, "\"L1B6\"");
        let back: Position = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Position::new(1, 6));
    }

    #[test]
    fn test_ordering_is_level_then_block() {
        let mut positions = vec![Position::new(2, 1), Position::new(1, 3), Position::new(1, 2)];
        positions.sort();
        assert_eq!(
            positions,
            vec![Position::new(1, 2), Position::new(1, 3), Position::new(2, 1)]
        );
    }
}
