//! Sampling without replacement: uniform swap-to-end and a weighted sum tree.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::cancel::Interrupt;
use crate::error::ForestError;

/// Integer mass shared out among the leaves of the weighted sum tree.
const FIXED_POINT_SCALE: u64 = 2_147_483_647;

/// Transform applied to raw weights before sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightTransform {
    /// Sample proportionally to the raw weights.
    Identity,
    /// Sample proportionally to the square root of the weights.
    Sqrt,
}

/// Draw `k` distinct items from `items` uniformly at random.
///
/// Each draw picks a random position among the remaining items and moves the
/// last remaining item into its slot. Returns a copy of `items` in the
/// original order when `k >= items.len()`.
#[must_use]
pub fn random_sample<T: Copy>(items: &[T], k: usize, seed: u64) -> Vec<T> {
    let mut pool = items.to_vec();
    if k >= pool.len() {
        return pool;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut remaining = pool.len();
    let mut result = Vec::with_capacity(k);
    for _ in 0..k {
        let r = rng.gen_range(0..remaining);
        result.push(pool[r]);
        pool[r] = pool[remaining - 1];
        remaining -= 1;
    }
    result
}

/// Weighted sampling without replacement over a heap-shaped sum tree.
///
/// Leaf `j` (1-based, heap layout) holds the normalized integer weight of
/// item `j - 1` in `own[j]`; `subtree[j]` holds the total mass of the subtree
/// rooted at `j`. A draw descends from the root in `O(log n)`, zeroes the
/// chosen leaf, and propagates the decrement back to the root.
///
/// Buffers are kept between calls so one sampler can serve every node of a tree.
#[derive(Debug, Clone, Default)]
pub struct WeightedSampler {
    own: Vec<u64>,
    subtree: Vec<u64>,
    taken: Vec<bool>,
}

impl WeightedSampler {
    /// Create an empty sampler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `k` distinct indices into `weights` with probability proportional
    /// to the transformed weights.
    ///
    /// Returns every index in order when `k >= weights.len()`. All-zero
    /// weights are treated as uniform.
    pub fn sample(
        &mut self,
        weights: &[f64],
        k: usize,
        seed: u64,
        transform: WeightTransform,
    ) -> Vec<usize> {
        // Without a checkpoint the draw cannot be interrupted.
        self.draw(weights, k, seed, transform, None)
            .unwrap_or_default()
    }

    /// Same as [`sample`](Self::sample), checking for cancellation before every draw.
    ///
    /// Under a yielding policy a cancelled draw returns an empty vector.
    pub(crate) fn sample_interruptible(
        &mut self,
        weights: &[f64],
        k: usize,
        seed: u64,
        transform: WeightTransform,
        interrupt: &Interrupt<'_>,
    ) -> Result<Vec<usize>, ForestError> {
        self.draw(weights, k, seed, transform, Some(interrupt))
    }

    fn draw(
        &mut self,
        weights: &[f64],
        k: usize,
        seed: u64,
        transform: WeightTransform,
        interrupt: Option<&Interrupt<'_>>,
    ) -> Result<Vec<usize>, ForestError> {
        let n = weights.len();
        if k >= n {
            return Ok((0..n).collect());
        }

        self.load(weights, transform);

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut result = Vec::with_capacity(k);
        for _ in 0..k {
            if let Some(interrupt) = interrupt
                && interrupt.should_stop()?
            {
                return Ok(Vec::new());
            }

            // Truncation to integers can leave positive-weight items with no
            // mass; fall back to uniform over what is left.
            if self.subtree[1] == 0 {
                self.refill_uniform();
            }

            let mut r = rng.gen_range(0..self.subtree[1]);
            let mut j = 1usize;
            while r >= self.own[j] {
                r -= self.own[j];
                j <<= 1;
                if r >= self.mass(j) {
                    r -= self.mass(j);
                    j += 1;
                }
            }

            result.push(j - 1);
            self.taken[j] = true;
            let w = self.own[j];
            self.own[j] = 0;
            while j != 0 {
                self.subtree[j] -= w;
                j >>= 1;
            }
        }
        Ok(result)
    }

    fn load(&mut self, weights: &[f64], transform: WeightTransform) {
        let n = weights.len();
        self.own.clear();
        self.own.resize(n + 1, 0);
        self.taken.clear();
        self.taken.resize(n + 1, false);

        let transformed: Vec<f64> = weights
            .iter()
            .map(|&w| {
                let w = w.max(0.0);
                match transform {
                    WeightTransform::Identity => w,
                    WeightTransform::Sqrt => w.sqrt(),
                }
            })
            .collect();
        let sum: f64 = transformed.iter().sum();

        if sum > 0.0 {
            for (i, w) in transformed.iter().enumerate() {
                self.own[i + 1] = (w / sum * FIXED_POINT_SCALE as f64) as u64;
            }
        } else {
            let uniform = FIXED_POINT_SCALE / n as u64;
            self.own[1..].fill(uniform);
        }
        self.rebuild_sums();
    }

    fn refill_uniform(&mut self) {
        for j in 1..self.own.len() {
            self.own[j] = u64::from(!self.taken[j]);
        }
        self.rebuild_sums();
    }

    fn rebuild_sums(&mut self) {
        let n = self.own.len() - 1;
        self.subtree.clear();
        self.subtree.extend_from_slice(&self.own);
        for i in (2..=n).rev() {
            self.subtree[i >> 1] += self.subtree[i];
        }
    }

    fn mass(&self, j: usize) -> u64 {
        self.subtree.get(j).copied().unwrap_or(0)
    }
}
