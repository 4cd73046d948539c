//! Time-Sorted IDs
//!
//! 64-bit identifiers: 42 bits of milliseconds since 2020-01-01T00:00:00Z
//! followed by 22 random bits, rendered as 13 Crockford Base32 characters.
//! String order equals creation order, which keeps IDs safe for JavaScript
//! clients that cannot hold 64-bit integers.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::Rng;

const TSID_EPOCH_MILLIS: i64 = 1_577_836_800_000;
const RANDOM_BITS: u32 = 22;
const RANDOM_MASK: u64 = (1 << RANDOM_BITS) - 1;
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

static LAST: AtomicU64 = AtomicU64::new(0);

pub struct TsidGenerator;

impl TsidGenerator {
    /// Generate a new TSID string, strictly greater than any previously
    /// generated in this process
    pub fn generate() -> String {
        encode(Self::next_value())
    }

    fn next_value() -> u64 {
        let millis = (Utc::now().timestamp_millis() - TSID_EPOCH_MILLIS).max(0) as u64;
        let random = rand::thread_rng().gen::<u64>() & RANDOM_MASK;
        let candidate = (millis << RANDOM_BITS) | random;

        let mut last = LAST.load(Ordering::Relaxed);
        loop {
            let next = candidate.max(last + 1);
            match LAST.compare_exchange_weak(last, next, Ordering::SeqCst, Ordering::Relaxed) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

fn encode(value: u64) -> String {
    let mut out = [0u8; 13];
    for (i, slot) in out.iter_mut().enumerate() {
        let shift = 60 - (i as u32) * 5;
        let index = if i == 0 { (value >> 60) & 0x0F } else { (value >> shift) & 0x1F };
        *slot = ALPHABET[index as usize];
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tsid_format() {
        let id = TsidGenerator::generate();
        assert_eq!(id.len(), 13);
        assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_tsids_sort_by_creation() {
        let ids: Vec<String> = (0..1000).map(|_| TsidGenerator::generate()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn test_encode_known_values() {
        assert_eq!(encode(0), "0000000000000");
        assert_eq!(encode(u64::MAX), "FZZZZZZZZZZZZ");
    }
}
