// Minimal PRNG (no external crates).
//
// This is NOT cryptographically secure.
// It drives stimulus generation and reference-region wiring so every experiment
// is reproducible from a single seed.

#[derive(Debug, Clone)]
pub struct Prng {
    state: u64,
}

impl Prng {
    pub fn new(seed: u64) -> Self {
        // Avoid a zero state.
        let seed = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: seed }
    }

    /// Derive an independent seed for stream `index` of a base seed.
    ///
    /// Uses the splitmix64 finalizer, so neighbouring indices produce unrelated
    /// streams. Experiment `i` of a batch runs on `derive_seed(base, i)`.
    pub fn derive_seed(base: u64, index: u64) -> u64 {
        let mut z = base
            .wrapping_add(0x9E3779B97F4A7C15)
            .wrapping_add(index.wrapping_mul(0xBF58476D1CE4E5B9));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        // xorshift64*
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    pub fn next_f32_01(&mut self) -> f32 {
        // Convert to [0,1).
        let x = self.next_u32();
        (x as f32) / (u32::MAX as f32 + 1.0)
    }

    /// Bernoulli trial with success probability `p`.
    #[inline]
    pub fn gen_bool(&mut self, p: f32) -> bool {
        self.next_f32_01() < p
    }

    #[inline]
    pub fn gen_range_usize(&mut self, low: usize, high: usize) -> usize {
        if high <= low {
            return low;
        }
        let span = (high - low) as u64;
        let v = self.next_u64() % span;
        low + v as usize
    }

    /// In-place Fisher–Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.gen_range_usize(0, i + 1);
            items.swap(i, j);
        }
    }

    /// Partial Fisher–Yates: leaves a uniform random `k`-subset in `items[..k]`.
    pub fn partial_shuffle<T>(&mut self, items: &mut [T], k: usize) {
        let k = k.min(items.len());
        for i in 0..k {
            let j = self.gen_range_usize(i, items.len());
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Prng::new(99);
        let mut b = Prng::new(99);
        for _ in 0..64 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn zero_seed_is_usable() {
        let mut rng = Prng::new(0);
        let draws: Vec<u32> = (0..8).map(|_| rng.next_u32()).collect();
        assert!(draws.iter().any(|&x| x != 0));
    }

    #[test]
    fn derived_seeds_differ_per_index() {
        let seeds: Vec<u64> = (0..16).map(|i| Prng::derive_seed(7, i)).collect();
        for i in 0..seeds.len() {
            for j in (i + 1)..seeds.len() {
                assert_ne!(seeds[i], seeds[j]);
            }
        }
        assert_eq!(Prng::derive_seed(7, 3), seeds[3]);
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = Prng::new(5);
        let mut v: Vec<usize> = (0..50).collect();
        rng.shuffle(&mut v);
        let mut sorted = v.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn gen_range_stays_in_bounds() {
        let mut rng = Prng::new(11);
        for _ in 0..1000 {
            let x = rng.gen_range_usize(3, 9);
            assert!((3..9).contains(&x));
        }
        assert_eq!(rng.gen_range_usize(4, 4), 4);
    }
}
