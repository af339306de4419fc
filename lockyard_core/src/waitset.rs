use std::sync::atomic::{AtomicU64, Ordering};

const BITS_PER_WORD: usize = 64;

// Written only by its owning client; read racily by other clients during
// deadlock detection. The detector re-checks before raising, which bounds
// the false positives these racy reads can produce.
pub struct WaitSet {
    words: Box<[AtomicU64]>,
}

impl WaitSet {
    pub fn with_capacity(bits: usize) -> Self {
        let words = bits.max(BITS_PER_WORD).div_ceil(BITS_PER_WORD);
        let mut v = Vec::with_capacity(words);
        for _ in 0..words {
            v.push(AtomicU64::new(0));
        }
        Self {
            words: v.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len() * BITS_PER_WORD
    }

    pub fn clear(&self) {
        for word in self.words.iter() {
            word.store(0, Ordering::Relaxed);
        }
    }

    pub fn put(&self, id: u32) {
        if let Some(word) = self.words.get(id as usize / BITS_PER_WORD) {
            word.fetch_or(1 << (id as usize % BITS_PER_WORD), Ordering::Relaxed);
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        match self.words.get(id as usize / BITS_PER_WORD) {
            Some(word) => word.load(Ordering::Relaxed) & (1 << (id as usize % BITS_PER_WORD)) != 0,
            None => false,
        }
    }

    // Sets from one manager share a capacity; bits beyond ours are ignored.
    pub fn union_from(&self, other: &WaitSet) {
        for (word, peer) in self.words.iter().zip(other.words.iter()) {
            let bits = peer.load(Ordering::Relaxed);
            if bits != 0 {
                word.fetch_or(bits, Ordering::Relaxed);
            }
        }
    }

    pub fn size(&self) -> usize {
        self.words
            .iter()
            .map(|word| word.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    pub fn client_ids(&self) -> Vec<u32> {
        let mut ids = Vec::new();
        for (idx, word) in self.words.iter().enumerate() {
            let mut bits = word.load(Ordering::Relaxed);
            while bits != 0 {
                ids.push((idx * BITS_PER_WORD) as u32 + bits.trailing_zeros());
                bits &= bits - 1;
            }
        }
        ids
    }
}
