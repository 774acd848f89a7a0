//! Migration checksums.

use std::fmt;
use std::io::{self, BufRead, BufReader, Read};
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{MigrationError, StrataResult};

const ABSENT: u8 = 0;
const PRESENT: u8 = 1;
const BOM: char = '\u{feff}';

/// SHA-256 digest of a migration's content.
///
/// Stored in the history table as standard Base64.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// Start building a checksum.
    pub fn builder() -> ChecksumBuilder {
        ChecksumBuilder::new()
    }

    /// Checksum of a text, hashed line by line.
    pub fn of_lines(text: &str) -> Self {
        Self::builder().add_lines(Some(text.lines())).build()
    }

    /// Parse a Base64 checksum.
    pub fn parse(input: &str) -> StrataResult<Self> {
        let bytes = STANDARD
            .decode(input.trim())
            .map_err(|_| MigrationError::InvalidChecksum(input.to_string()))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| MigrationError::InvalidChecksum(input.to_string()))?;
        Ok(Self(digest))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&STANDARD.encode(self.0))
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self)
    }
}

impl FromStr for Checksum {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Incremental checksum builder.
///
/// Every `add_*` call appends one field. A field is written as a counter
/// byte, a presence byte and, when present, length-prefixed content, so
/// absent, empty and re-ordered fields all produce distinct digests.
/// [`build`](Self::build) resets the builder for reuse.
#[derive(Debug, Clone, Default)]
pub struct ChecksumBuilder {
    hasher: Sha256,
    counter: u8,
}

impl ChecksumBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn begin_field(&mut self, present: bool) {
        let marker = if present { PRESENT } else { ABSENT };
        self.hasher.update([self.counter, marker]);
        self.counter = self.counter.wrapping_add(1);
    }

    fn write_chunk(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_be_bytes());
        self.hasher.update(bytes);
    }

    /// Append raw bytes.
    pub fn add_bytes(&mut self, value: Option<&[u8]>) -> &mut Self {
        self.begin_field(value.is_some());
        if let Some(bytes) = value {
            self.write_chunk(bytes);
        }
        self
    }

    /// Append a string.
    pub fn add_str(&mut self, value: Option<&str>) -> &mut Self {
        self.add_bytes(value.map(str::as_bytes))
    }

    /// Append a number.
    pub fn add_number(&mut self, value: Option<i64>) -> &mut Self {
        self.begin_field(value.is_some());
        if let Some(n) = value {
            self.hasher.update(n.to_be_bytes());
        }
        self
    }

    /// Append text given as lines.
    ///
    /// Trailing carriage returns and a leading byte-order mark are ignored, so
    /// the same script checked out with different line endings hashes the same.
    pub fn add_lines<I, S>(&mut self, lines: Option<I>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.begin_field(lines.is_some());
        if let Some(lines) = lines {
            let mut count = 0u64;
            for line in lines {
                let line = line.as_ref();
                let line = if count == 0 {
                    line.strip_prefix(BOM).unwrap_or(line)
                } else {
                    line
                };
                self.write_chunk(line.trim_end_matches('\r').as_bytes());
                count += 1;
            }
            self.hasher.update(count.to_be_bytes());
        }
        self
    }

    /// Append the text read from a stream, line by line.
    ///
    /// Produces the same result as [`add_lines`](Self::add_lines) over the
    /// same text.
    pub fn add_reader<R: Read>(&mut self, reader: Option<R>) -> io::Result<&mut Self> {
        match reader {
            None => Ok(self.add_lines(None::<Vec<String>>)),
            Some(reader) => {
                let lines = BufReader::new(reader)
                    .lines()
                    .collect::<io::Result<Vec<_>>>()?;
                Ok(self.add_lines(Some(lines)))
            }
        }
    }

    /// Finish the digest and reset the builder.
    pub fn build(&mut self) -> Checksum {
        let digest = std::mem::take(&mut self.hasher).finalize();
        self.counter = 0;

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Checksum(bytes)
    }
}
