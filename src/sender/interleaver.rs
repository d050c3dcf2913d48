//! Interleaver (spec.md §4.7): scatters packets across a fixed window so
//! that a burst loss on the wire doesn't take out consecutive source
//! packets. Storage slot is chosen by a fixed pseudo-random permutation
//! of `[0, W)` rather than arrival order, so two packets that are
//! adjacent on input land in unrelated slots and are evicted (emitted)
//! at unrelated times.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

#[derive(Debug)]
pub struct Interleaver<T> {
    window: usize,
    permutation: Vec<usize>,
    slots: Vec<Option<T>>,
    write_count: usize,
}

impl<T> Interleaver<T> {
    pub fn new(window: usize, seed: u64) -> Self {
        let window = window.max(1);
        let mut permutation: Vec<usize> = (0..window).collect();
        permutation.shuffle(&mut StdRng::seed_from_u64(seed));
        Self {
            window,
            permutation,
            slots: (0..window).map(|_| None).collect(),
            write_count: 0,
        }
    }

    /// Stores `item` in its permuted slot, returning whatever packet
    /// previously occupied that slot (displaced, ready to emit) if any.
    pub fn write(&mut self, item: T) -> Option<T> {
        let slot = self.permutation[self.write_count % self.window];
        self.write_count += 1;
        self.slots[slot].replace(item)
    }

    /// Drains every occupied slot, in slot order. Called at shutdown so
    /// no packet is silently dropped when the pipeline stops.
    pub fn flush(&mut self) -> Vec<T> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displaces_after_one_full_window() {
        let mut il = Interleaver::new(4, 42);
        for i in 0..4 {
            assert!(il.write(i).is_none());
        }
        // The 5th write must displace exactly one of the first four.
        let displaced = il.write(4);
        assert!(displaced.is_some());
        assert!((0..4).contains(&displaced.unwrap()));
    }

    #[test]
    fn flush_drains_everything_written_since_last_flush() {
        let mut il: Interleaver<u32> = Interleaver::new(3, 7);
        il.write(10);
        il.write(11);
        let mut remaining = il.flush();
        remaining.sort();
        assert_eq!(remaining, vec![10, 11]);
        assert!(il.flush().is_empty());
    }
}
