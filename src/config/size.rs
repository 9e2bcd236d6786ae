//! Human-readable byte sizes such as `"50mb"` or `"1.5kb"`.
//!
//! Units are 1024-based and case-insensitive (`b`, `kb`, `mb`, `gb`, `tb`).
//! A bare number is a count of bytes. The original spelling is kept so error
//! responses can echo the limit exactly as it was configured.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A byte count together with the string it was parsed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteSize {
    bytes: u64,
    display: String,
}

/// Error returned when a size string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ByteSizeError {
    #[error("size is empty")]
    Empty,
    #[error("invalid size `{0}`")]
    Invalid(String),
    #[error("unknown unit `{unit}` in size `{input}`")]
    UnknownUnit { input: String, unit: String },
}

impl ByteSize {
    /// A size of `mib` mebibytes, displayed as `"<mib>mb"`.
    pub fn mib(mib: u64) -> Self {
        Self {
            bytes: mib.saturating_mul(1024 * 1024),
            display: format!("{}mb", mib),
        }
    }

    /// A size given in raw bytes, displayed as `"<bytes>b"`.
    pub fn from_bytes(bytes: u64) -> Self {
        Self {
            bytes,
            display: format!("{}b", bytes),
        }
    }

    pub fn as_u64(&self) -> u64 {
        self.bytes
    }

    /// Byte count clamped to the platform's `usize`.
    pub fn as_usize(&self) -> usize {
        usize::try_from(self.bytes).unwrap_or(usize::MAX)
    }

    /// The configured spelling, e.g. `"50mb"`.
    pub fn as_str(&self) -> &str {
        &self.display
    }
}

impl FromStr for ByteSize {
    type Err = ByteSizeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ByteSizeError::Empty);
        }

        let split = trimmed
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(trimmed.len());
        let (number, unit) = trimmed.split_at(split);

        let value: f64 = number
            .parse()
            .map_err(|_| ByteSizeError::Invalid(trimmed.to_string()))?;
        if !value.is_finite() || value < 0.0 {
            return Err(ByteSizeError::Invalid(trimmed.to_string()));
        }

        let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "b" => 1,
            "kb" => 1 << 10,
            "mb" => 1 << 20,
            "gb" => 1 << 30,
            "tb" => 1 << 40,
            other => {
                return Err(ByteSizeError::UnknownUnit {
                    input: trimmed.to_string(),
                    unit: other.to_string(),
                })
            }
        };

        Ok(Self {
            bytes: (value * multiplier as f64).floor() as u64,
            display: trimmed.to_string(),
        })
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Bytes(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Bytes(bytes) => Ok(ByteSize::from_bytes(bytes)),
        }
    }
}
