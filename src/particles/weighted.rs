use crate::error::{FbaError, Result};
use rand::Rng;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::mem;

/// A particle with its (unnormalized) weight
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedParticle<T> {
    pub particle: T,
    pub weight: f64,
}

/// Population of weighted particles with a running total weight
///
/// Every operation that drops a particle hands it to a caller-supplied
/// deallocator; the filter never decides how payloads are released.
#[derive(Clone, Debug)]
pub struct WeightedFilter<T> {
    particles: Vec<WeightedParticle<T>>,
    total_weight: f64,
}

impl<T> Default for WeightedFilter<T> {
    fn default() -> Self {
        WeightedFilter {
            particles: Vec::new(),
            total_weight: 0.0,
        }
    }
}

impl<T> WeightedFilter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter of `size` allocated particles with weight `1 / size` each
    pub fn with_allocator(size: usize, mut allocate: impl FnMut() -> T) -> Result<Self> {
        if size == 0 {
            return Err(FbaError::invalid_parameter("size", "weighted filter needs at least one particle"));
        }

        let mut filter = WeightedFilter::new();
        for _ in 0..size {
            filter.add_weighted(allocate(), 1.0 / size as f64);
        }
        Ok(filter)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Adds a particle with the current average weight, or 1 into an empty filter
    pub fn add(&mut self, particle: T) {
        let weight = self.average_weight();
        self.add_weighted(particle, weight);
    }

    pub fn add_weighted(&mut self, particle: T, weight: f64) {
        assert!(weight >= 0.0 && weight.is_finite(), "illegal weight {}", weight);

        self.total_weight += weight;
        self.particles.push(WeightedParticle { particle, weight });
    }

    /// Replaces particle `i`, giving it the current average weight
    pub fn replace(&mut self, i: usize, particle: T, dealloc: impl FnOnce(T)) {
        let weight = self.average_weight();
        self.replace_weighted(i, particle, dealloc, weight);
    }

    pub fn replace_weighted(&mut self, i: usize, particle: T, dealloc: impl FnOnce(T), weight: f64) {
        assert!(weight >= 0.0 && weight.is_finite(), "illegal weight {}", weight);

        let old = mem::replace(&mut self.particles[i], WeightedParticle { particle, weight });
        self.total_weight += weight - old.weight;
        dealloc(old.particle);
    }

    /// Releases every particle and leaves the filter empty
    pub fn free(&mut self, dealloc: impl FnMut(T)) {
        self.drain().into_iter().map(|p| p.particle).for_each(dealloc);
    }

    /// Moves every particle out, leaving the filter empty
    pub fn drain(&mut self) -> Vec<WeightedParticle<T>> {
        self.total_weight = 0.0;
        mem::take(&mut self.particles)
    }

    pub fn particle(&self, i: usize) -> &WeightedParticle<T> {
        &self.particles[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeightedParticle<T>> {
        self.particles.iter()
    }

    /// Mutable access to the payloads; weights stay untouched
    pub fn particles_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.particles.iter_mut().map(|p| &mut p.particle)
    }

    /// Multiplies every weight by what `likelihood` returns for its particle
    ///
    /// Returns the new total weight.
    pub fn reweight(&mut self, mut likelihood: impl FnMut(&mut T) -> f64) -> f64 {
        let mut total = 0.0;
        for p in &mut self.particles {
            let factor = likelihood(&mut p.particle);
            assert!(factor >= 0.0, "negative likelihood {}", factor);
            p.weight *= factor;
            total += p.weight;
        }
        self.total_weight = total;
        total
    }

    /// `weight` relative to the total weight
    pub fn normalized_weight(&self, weight: f64) -> f64 {
        weight / self.total_weight
    }

    /// Divides every weight by `total`
    pub fn normalize(&mut self, total: f64) {
        assert!(total > 0.0, "cannot normalize by {}", total);

        self.total_weight = 0.0;
        for p in &mut self.particles {
            p.weight /= total;
            self.total_weight += p.weight;
        }
    }

    /// Index drawn with probability proportional to its weight
    pub fn sample_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        assert!(!self.is_empty(), "cannot sample from an empty filter");
        assert!(self.total_weight > 0.0, "cannot sample from a filter without weight");

        let threshold = rng.gen::<f64>() * self.total_weight;
        let mut remaining = self.total_weight;
        for i in (0..self.particles.len()).rev() {
            remaining -= self.particles[i].weight;
            if threshold >= remaining {
                return i;
            }
        }
        0
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.particles[self.sample_index(rng)].particle
    }

    /// Indices of the `n` lowest-weight particles, lightest first
    pub fn least_likely(&self, n: usize) -> Vec<usize> {
        let mut heap: BinaryHeap<(ByWeight, usize)> = BinaryHeap::with_capacity(n + 1);

        for (i, p) in self.particles.iter().enumerate() {
            if heap.len() < n {
                heap.push((ByWeight(p.weight), i));
            } else if let Some(&(ByWeight(heaviest), _)) = heap.peek() {
                if p.weight < heaviest {
                    heap.pop();
                    heap.push((ByWeight(p.weight), i));
                }
            }
        }

        heap.into_sorted_vec().into_iter().map(|(_, i)| i).collect()
    }

    /// Normalized weight summed per particle key, one `key: weight` line each
    pub fn describe(&self, key: impl Fn(&T) -> String) -> String {
        let mut summary: BTreeMap<String, f64> = BTreeMap::new();
        for p in &self.particles {
            *summary.entry(key(&p.particle)).or_default() += self.normalized_weight(p.weight);
        }

        summary
            .into_iter()
            .map(|(k, w)| format!("{}: {:.4}\n", k, w))
            .collect()
    }

    fn average_weight(&self) -> f64 {
        if self.particles.is_empty() {
            1.0
        } else {
            self.total_weight / self.particles.len() as f64
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct ByWeight(f64);

impl Eq for ByWeight {}

impl PartialOrd for ByWeight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByWeight {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_add_tracks_total() {
        let mut filter = WeightedFilter::new();
        filter.add("a");
        assert_eq!(filter.total_weight(), 1.0);

        filter.add_weighted("b", 3.0);
        assert_eq!(filter.total_weight(), 4.0);

        // implicit weight is the current average
        filter.add("c");
        assert_eq!(filter.particle(2).weight, 2.0);
        assert_eq!(filter.total_weight(), 6.0);
    }

    #[test]
    fn test_replace_deallocates() {
        let mut filter = WeightedFilter::new();
        filter.add_weighted(1, 1.0);
        filter.add_weighted(2, 3.0);

        let mut released = vec![];
        filter.replace_weighted(0, 5, |p| released.push(p), 2.0);
        assert_eq!(released, vec![1]);
        assert_eq!(filter.total_weight(), 5.0);
        assert_eq!(filter.particle(0).particle, 5);

        filter.free(|p| released.push(p));
        assert_eq!(released, vec![1, 5, 2]);
        assert!(filter.is_empty());
        assert_eq!(filter.total_weight(), 0.0);
    }

    #[test]
    fn test_normalize() {
        let mut filter = WeightedFilter::new();
        filter.add_weighted('a', 2.0);
        filter.add_weighted('b', 6.0);

        assert_eq!(filter.normalized_weight(2.0), 0.25);
        filter.normalize(8.0);
        assert!((filter.total_weight() - 1.0).abs() < 1e-12);
        assert_eq!(filter.particle(1).weight, 0.75);
    }

    #[test]
    fn test_reweight() {
        let mut filter = WeightedFilter::with_allocator(2, || 1).unwrap();
        let total = filter.reweight(|p| {
            *p += 1;
            0.5
        });
        assert_eq!(total, 0.5);
        assert!(filter.iter().all(|p| p.particle == 2));
    }

    #[test]
    fn test_zero_size_allocator() {
        assert!(WeightedFilter::with_allocator(0, || 0).is_err());
    }

    #[test]
    fn test_sample_proportional_to_weight() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut filter = WeightedFilter::new();
        filter.add_weighted("light", 1.0);
        filter.add_weighted("also light", 1.0);
        filter.add_weighted("heavy", 1000.0);

        let heavy = (0..10_000)
            .filter(|_| *filter.sample(&mut rng) == "heavy")
            .count();
        assert!(heavy > 9_500, "heavy drawn {} times", heavy);
    }

    #[test]
    fn test_zero_weight_never_sampled() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut filter = WeightedFilter::new();
        filter.add_weighted(0, 0.0);
        filter.add_weighted(1, 1.0);
        filter.add_weighted(2, 0.0);

        for _ in 0..1_000 {
            assert_eq!(filter.sample_index(&mut rng), 1);
        }
    }

    #[test]
    fn test_least_likely() {
        let mut filter = WeightedFilter::new();
        for w in [5.0, 1.0, 4.0, 0.5, 3.0] {
            filter.add_weighted((), w);
        }

        assert_eq!(filter.least_likely(2), vec![3, 1]);
        assert_eq!(filter.least_likely(0), Vec::<usize>::new());
        assert_eq!(filter.least_likely(10).len(), 5);
    }

    #[test]
    fn test_describe() {
        let mut filter = WeightedFilter::new();
        filter.add_weighted(1, 1.0);
        filter.add_weighted(1, 1.0);
        filter.add_weighted(2, 2.0);

        assert_eq!(filter.describe(|p| p.to_string()), "1: 0.5000\n2: 0.5000\n");
    }
}
