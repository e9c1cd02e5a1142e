use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-size bitset whose bits can be set concurrently without locking.
///
/// Setting a bit is idempotent, so racing writers on the same bit agree on the
/// final state; exactly one of them observes the bit as previously clear.
#[derive(Debug)]
pub struct AtomicBitSet {
    words: Vec<AtomicU64>,
    len: u64,
}

impl AtomicBitSet {
    /// A bitset of `len` clear bits.
    pub fn new(len: u64) -> Self {
        let words = len.div_ceil(64) as usize;
        Self {
            words: (0..words).map(|_| AtomicU64::new(0)).collect(),
            len,
        }
    }

    /// Number of addressable bits.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True when no bit is addressable.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sets bit `idx`, returning whether it was already set.
    ///
    /// Bits outside the set are ignored and read as clear.
    pub fn set(&self, idx: u64) -> bool {
        if idx >= self.len {
            return false;
        }
        let mask = 1u64 << (idx % 64);
        let prev = self.words[(idx / 64) as usize].fetch_or(mask, Ordering::AcqRel);
        prev & mask != 0
    }

    /// Whether bit `idx` is set.
    pub fn get(&self, idx: u64) -> bool {
        if idx >= self.len {
            return false;
        }
        let mask = 1u64 << (idx % 64);
        self.words[(idx / 64) as usize].load(Ordering::Acquire) & mask != 0
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u64 {
        self.words
            .iter()
            .map(|word| u64::from(word.load(Ordering::Acquire).count_ones()))
            .sum()
    }

    /// Indexes of set bits, ascending.
    pub fn iter_ones(&self) -> impl Iterator<Item = u64> + '_ {
        self.words.iter().enumerate().flat_map(|(pos, word)| {
            let mut bits = word.load(Ordering::Acquire);
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as u64;
                bits &= bits - 1;
                Some(pos as u64 * 64 + bit)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn set_reports_previous_state() {
        let bits = AtomicBitSet::new(130);
        assert!(!bits.set(129));
        assert!(bits.set(129));
        assert!(bits.get(129));
        assert!(!bits.get(128));
        assert!(!bits.set(500));
        assert!(!bits.get(500));
    }

    #[test]
    fn iterates_set_bits_in_order() {
        let bits = AtomicBitSet::new(200);
        for idx in [199, 3, 64, 65] {
            bits.set(idx);
        }
        assert_eq!(bits.iter_ones().collect::<Vec<_>>(), vec![3, 64, 65, 199]);
        assert_eq!(bits.count_ones(), 4);
    }

    #[test]
    fn concurrent_setters_claim_each_bit_once() {
        let bits = Arc::new(AtomicBitSet::new(1024));
        let winners: u64 = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let bits = Arc::clone(&bits);
                    scope.spawn(move || (0..1024).filter(|idx| !bits.set(*idx)).count() as u64)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        assert_eq!(winners, 1024);
        assert_eq!(bits.count_ones(), 1024);
    }
}
