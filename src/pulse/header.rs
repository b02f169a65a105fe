// src/pulse/header.rs - GF1 header record block
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::fmt;

use super::{PulseError, RECORD_LEN};

/// Four-byte header key. Keys are opaque; only a few (e.g. `STfr`) mean anything to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeaderKey(pub [u8; 4]);

impl HeaderKey {
    pub fn new(key: &[u8; 4]) -> Self {
        Self(*key)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for HeaderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl From<&[u8; 4]> for HeaderKey {
    fn from(key: &[u8; 4]) -> Self {
        Self(*key)
    }
}

/// Ordered key/value mapping read from the header block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MotionHeader {
    entries: Vec<(HeaderKey, u32)>,
}

impl MotionHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record. A repeated key keeps its original position and takes the new value.
    pub fn insert(&mut self, key: HeaderKey, value: u32) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &HeaderKey) -> Option<u32> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HeaderKey, u32)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    /// Step frequency (`STfr`), if the file declares one.
    pub fn step_frequency(&self) -> Option<u32> {
        self.get(&super::STEP_FREQUENCY_KEY)
    }

    /// Length of the encoded block in bytes.
    pub fn encoded_len(&self) -> usize {
        self.entries.len() * RECORD_LEN
    }
}

impl FromIterator<(HeaderKey, u32)> for MotionHeader {
    fn from_iter<I: IntoIterator<Item = (HeaderKey, u32)>>(iter: I) -> Self {
        let mut header = MotionHeader::new();
        for (key, value) in iter {
            header.insert(key, value);
        }
        header
    }
}

impl Serialize for MotionHeader {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(&key.to_string(), value)?;
        }
        map.end()
    }
}

/// Decode a header block (without the preamble) into its records.
pub fn decode_header(bytes: &[u8]) -> Result<MotionHeader, PulseError> {
    if bytes.len() % RECORD_LEN != 0 {
        return Err(PulseError::MalformedHeader(format!(
            "header block of {} bytes is not a whole number of {}-byte records",
            bytes.len(),
            RECORD_LEN
        )));
    }
    let mut header = MotionHeader::new();
    for record in bytes.chunks_exact(RECORD_LEN) {
        let key = [record[0], record[1], record[2], record[3]];
        let value = u32::from_le_bytes([record[4], record[5], record[6], record[7]]);
        header.insert(HeaderKey(key), value);
    }
    Ok(header)
}

/// Encode a header into its record block (without the preamble).
pub fn encode_header(header: &MotionHeader) -> Vec<u8> {
    let mut out = Vec::with_capacity(header.encoded_len());
    for (key, value) in header.iter() {
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}
