// src/pulse/file.rs - Whole-file loading and streamed motion downloads
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;

use super::header::{MotionHeader, decode_header, encode_header};
use super::stats::{RunningStats, StatsReport, StepScale, fold_stats};
use super::steps::{Step, decode_step};
use super::{MAGIC, PREAMBLE_LEN, PulseError};

/// Lead byte written in front of the signature. Loading ignores it.
pub const LEAD_BYTE: u8 = 0x01;

/// Chunk size used when folding a streamed body.
pub const CHUNK_LEN: usize = 1024;

/// A loaded GF1 file. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseFile {
    header: MotionHeader,
    body: Vec<u8>,
}

impl PulseFile {
    pub fn new(header: MotionHeader, body: Vec<u8>) -> Self {
        Self { header, body }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PulseError> {
        let path = path.as_ref();
        tracing::debug!("Loading pulse file: {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PulseError> {
        let block_len = parse_preamble(bytes)?;
        let available = bytes.len() - PREAMBLE_LEN;
        if block_len > available {
            return Err(PulseError::MalformedHeader(format!(
                "preamble declares {} header bytes but only {} follow",
                block_len, available
            )));
        }
        let header = decode_header(&bytes[PREAMBLE_LEN..PREAMBLE_LEN + block_len])?;
        let body = bytes[PREAMBLE_LEN + block_len..].to_vec();
        Ok(Self { header, body })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PulseError> {
        let block = encode_header(&self.header);
        let declared = u16::try_from(block.len() + PREAMBLE_LEN).map_err(|_| {
            PulseError::MalformedHeader(format!("{} header bytes do not fit a 16-bit length", block.len()))
        })?;
        let mut out = Vec::with_capacity(PREAMBLE_LEN + block.len() + self.body.len());
        out.push(LEAD_BYTE);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&declared.to_le_bytes());
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&block);
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), PulseError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn header(&self) -> &MotionHeader {
        &self.header
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn steps(&self) -> impl Iterator<Item = Step> + '_ {
        self.body.iter().map(|&byte| decode_step(byte))
    }

    pub fn stats(&self) -> RunningStats {
        fold_stats(&self.body, None)
    }

    /// Playback time of the body at the header's step frequency.
    pub fn run_time(&self) -> Option<Duration> {
        run_time(self.body.len() as u64, self.header.step_frequency())
    }

    /// Time the laser is enabled during playback.
    pub fn laser_on_time(&self) -> Option<Duration> {
        self.header.step_frequency().and_then(|f| self.stats().laser_on_time(f))
    }
}

/// Validate the fixed preamble and return the length of the header block that follows it.
fn parse_preamble(bytes: &[u8]) -> Result<usize, PulseError> {
    if bytes.get(1..4) != Some(&MAGIC[..]) {
        let found = bytes.get(1..bytes.len().min(4)).unwrap_or_default();
        return Err(PulseError::BadMagic(found.to_vec()));
    }
    if bytes.len() < PREAMBLE_LEN {
        return Err(PulseError::MalformedHeader(format!(
            "preamble truncated at {} bytes",
            bytes.len()
        )));
    }
    let declared = u16::from_le_bytes([bytes[4], bytes[5]]) as usize;
    declared.checked_sub(PREAMBLE_LEN).ok_or_else(|| {
        PulseError::MalformedHeader(format!(
            "declared header length {} is shorter than the {}-byte preamble",
            declared, PREAMBLE_LEN
        ))
    })
}

fn run_time(size: u64, step_frequency: Option<u32>) -> Option<Duration> {
    step_frequency
        .filter(|&f| f > 0)
        .map(|f| Duration::from_secs_f64(size as f64 / f as f64))
}

/// Result of a streamed motion download.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionInfo {
    pub header: MotionHeader,
    /// Length of the header block, excluding the preamble
    pub header_len: usize,
    /// Body size in bytes
    pub size: u64,
    pub run_time: Option<Duration>,
    pub stats: RunningStats,
}

impl MotionInfo {
    pub fn laser_on_time(&self) -> Option<Duration> {
        self.header.step_frequency().and_then(|f| self.stats.laser_on_time(f))
    }

    pub fn report(&self, scale: &StepScale) -> MotionInfoReport<'_> {
        MotionInfoReport {
            header_data: &self.header,
            header_len: self.header_len,
            size: self.size,
            run_time: self.run_time.map(|t| t.as_secs_f64()),
            laser_on_time: self.laser_on_time().map(|t| t.as_secs_f64()),
            stats: self.stats.report(scale),
        }
    }
}

/// Serializable view of [`MotionInfo`], written next to each download.
#[derive(Debug, Serialize)]
pub struct MotionInfoReport<'a> {
    pub header_data: &'a MotionHeader,
    pub header_len: usize,
    pub size: u64,
    /// Seconds
    pub run_time: Option<f64>,
    /// Seconds with the laser enabled
    pub laser_on_time: Option<f64>,
    pub stats: StatsReport,
}

/// Read a pulse file from `reader`, folding statistics over the body chunk by chunk
/// and copying the body to `body_out` as it arrives.
pub fn load_motion<R: Read, W: Write>(mut reader: R, mut body_out: W) -> Result<MotionInfo, PulseError> {
    let mut preamble = [0u8; PREAMBLE_LEN];
    let got = read_full(&mut reader, &mut preamble)?;
    let block_len = parse_preamble(&preamble[..got])?;

    let mut block = vec![0u8; block_len];
    let got = read_full(&mut reader, &mut block)?;
    if got < block_len {
        return Err(PulseError::MalformedHeader(format!(
            "preamble declares {} header bytes but the stream ended after {}",
            block_len, got
        )));
    }
    let header = decode_header(&block)?;
    tracing::debug!("Motion header: {} records", header.len());

    let mut stats = RunningStats::default();
    let mut size = 0u64;
    let mut chunk = [0u8; CHUNK_LEN];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        stats = fold_stats(&chunk[..n], Some(stats));
        body_out.write_all(&chunk[..n])?;
        size += n as u64;
    }
    body_out.flush()?;

    let run_time = run_time(size, header.step_frequency());
    Ok(MotionInfo {
        header,
        header_len: block_len,
        size,
        run_time,
        stats,
    })
}

/// Fill `buf` until it is full or the reader is exhausted; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::HeaderKey;
    use std::io::Cursor;

    const SAMPLE: &[u8] = b"\x01GF1\x10\x00\x00\x00ABCD\x01\x00\x00\x00\x11\x00";

    #[test]
    fn parses_sample_file() {
        let file = PulseFile::from_bytes(SAMPLE).unwrap();
        assert_eq!(file.header().get(&HeaderKey(*b"ABCD")), Some(1));
        assert_eq!(file.body(), &[0x11, 0x00]);
        assert_eq!(file.to_bytes().unwrap(), SAMPLE);
    }

    #[test]
    fn rejects_wrong_signature() {
        let err = PulseFile::from_bytes(b"\x01GF2\x08\x00\x00\x00").unwrap_err();
        assert!(matches!(err, PulseError::BadMagic(ref found) if found == b"GF2"));
        assert!(matches!(PulseFile::from_bytes(b"\x01G").unwrap_err(), PulseError::BadMagic(_)));
    }

    #[test]
    fn rejects_header_longer_than_file() {
        let err = PulseFile::from_bytes(b"\x01GF1\x18\x00\x00\x00ABCD\x01\x00\x00\x00").unwrap_err();
        assert!(matches!(err, PulseError::MalformedHeader(_)));
    }

    #[test]
    fn rejects_length_below_preamble() {
        let err = PulseFile::from_bytes(b"\x01GF1\x04\x00\x00\x00").unwrap_err();
        assert!(matches!(err, PulseError::MalformedHeader(_)));
    }

    #[test]
    fn rejects_partial_record() {
        let err = PulseFile::from_bytes(b"\x01GF1\x0C\x00\x00\x00ABCD\x01\x00\x00\x00").unwrap_err();
        assert!(matches!(err, PulseError::MalformedHeader(_)));
    }

    #[test]
    fn streamed_load_matches_whole_file() {
        let mut body = Vec::new();
        for i in 0..5000u32 {
            body.push([0x11, 0x01, 0x04, 0x00, 0x0C][(i % 5) as usize]);
        }
        let mut header = MotionHeader::new();
        header.insert(HeaderKey(*b"STfr"), 1000);
        let file = PulseFile::new(header, body.clone());
        let bytes = file.to_bytes().unwrap();

        let mut copied = Vec::new();
        let info = load_motion(Cursor::new(bytes), &mut copied).unwrap();
        assert_eq!(copied, body);
        assert_eq!(info.size, 5000);
        assert_eq!(info.header_len, 8);
        assert_eq!(info.stats, file.stats());
        assert_eq!(info.run_time, Some(Duration::from_secs(5)));
    }

    #[test]
    fn streamed_load_detects_truncated_header() {
        let err = load_motion(Cursor::new(b"\x01GF1\x18\x00\x00\x00ABCD".to_vec()), std::io::sink()).unwrap_err();
        assert!(matches!(err, PulseError::MalformedHeader(_)));
    }
}
