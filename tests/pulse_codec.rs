use gf_emu::pulse::{
    Axis, HeaderKey, MotionHeader, PulseError, PulseFile, RunningStats, STEP_FREQUENCY_KEY, decode_step, fold_stats,
    generate_linear, load_motion,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Read};
use std::time::Duration;

/// Hands out the wrapped bytes in randomly sized reads.
struct Trickle {
    data: Vec<u8>,
    pos: usize,
    rng: StdRng,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.data.len() - self.pos;
        if left == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = self.rng.random_range(1..=left.min(buf.len()).min(37));
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn random_body(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.random::<u8>()).collect()
}

#[test]
fn sample_file_decodes() {
    let bytes = b"\x01GF1\x10\x00\x00\x00ABCD\x01\x00\x00\x00\x11\x00";
    let file = PulseFile::from_bytes(bytes).unwrap();
    assert_eq!(file.header().get(&HeaderKey(*b"ABCD")), Some(1));

    let steps: Vec<_> = file.steps().collect();
    assert_eq!(steps.len(), 2);
    assert!(steps[0].laser_enabled());
    assert!(steps[0].moves(Axis::X, Some(true)));
    assert!(!steps[1].laser_enabled());

    let stats = file.stats();
    assert_eq!(stats.x.positive, 1);
    assert_eq!(stats.delta(), [1, 0, 0]);
    assert_eq!(stats.laser_enabled, 1);
    assert_eq!(file.run_time(), None);
}

#[test]
fn every_byte_decodes() {
    for byte in 0..=u8::MAX {
        let step = decode_step(byte);
        if byte & 0x80 != 0 {
            assert_eq!(step.power, Some(byte & 0x7f));
            assert!(step.flags.is_empty());
        } else {
            assert_eq!(step.power, None);
            assert_eq!(step.laser_enabled(), byte & 0x10 != 0);
        }
    }
}

#[test]
fn chunked_folds_match_whole_fold() {
    let mut rng = StdRng::seed_from_u64(0x6f1);
    for _ in 0..50 {
        let len = rng.random_range(0..4096);
        let body = random_body(&mut rng, len);
        let whole = fold_stats(&body, None);

        let mut folded = RunningStats::default();
        let mut rest = &body[..];
        while !rest.is_empty() {
            let cut = rng.random_range(1..=rest.len());
            let (chunk, tail) = rest.split_at(cut);
            folded = fold_stats(chunk, Some(folded));
            rest = tail;
        }
        assert_eq!(folded, whole);
        assert_eq!(folded.bytes, body.len() as u64);
    }
}

#[test]
fn streamed_load_matches_whole_file() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut header = MotionHeader::new();
    header.insert(STEP_FREQUENCY_KEY, 2000);
    header.insert(HeaderKey(*b"PWid"), 12);
    let file = PulseFile::new(header, random_body(&mut rng, 6000));
    let bytes = file.to_bytes().unwrap();

    let mut body = Vec::new();
    let reader = Trickle {
        data: bytes,
        pos: 0,
        rng: StdRng::seed_from_u64(99),
    };
    let info = load_motion(reader, &mut body).unwrap();

    assert_eq!(body, file.body());
    assert_eq!(info.header, *file.header());
    assert_eq!(info.size, 6000);
    assert_eq!(info.stats, file.stats());
    assert_eq!(info.run_time, Some(Duration::from_secs(3)));
}

#[test]
fn rejects_foreign_files() {
    let err = PulseFile::from_bytes(b"\x89PNG\r\n\x1a\n").unwrap_err();
    assert!(matches!(err, PulseError::BadMagic(found) if found == b"PNG"));

    let err = PulseFile::from_bytes(b"\x01GF1\x04\x00\x00\x00").unwrap_err();
    assert!(matches!(err, PulseError::MalformedHeader(_)));
}

#[test]
fn generated_moves_land_on_target() {
    let mut rng = StdRng::seed_from_u64(2024);
    for _ in 0..40 {
        let dx = rng.random_range(-400..=400);
        let dy = rng.random_range(-400..=400);
        let body = generate_linear(dx, dy);
        let stats = fold_stats(&body, None);
        assert_eq!(stats.delta(), [dx, dy, 0], "move ({}, {})", dx, dy);
        assert_eq!(stats.x.total(), dx.unsigned_abs());
        assert_eq!(stats.y.total(), dy.unsigned_abs());
        assert_eq!(stats.laser_enabled, 0);
    }
}
