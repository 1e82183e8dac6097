use crate::error::{FbaError, Result};
use rand::Rng;
use std::collections::BTreeMap;
use std::mem;

/// Population of equally weighted particles
#[derive(Clone, Debug, PartialEq)]
pub struct FlatFilter<T> {
    particles: Vec<T>,
}

impl<T> Default for FlatFilter<T> {
    fn default() -> Self {
        FlatFilter { particles: Vec::new() }
    }
}

impl<T> FlatFilter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_particles(particles: Vec<T>) -> Self {
        FlatFilter { particles }
    }

    /// Filter of `size` particles produced by `allocate`
    pub fn with_allocator(size: usize, allocate: impl FnMut() -> T) -> Result<Self> {
        if size == 0 {
            return Err(FbaError::invalid_parameter("size", "flat filter needs at least one particle"));
        }
        Ok(FlatFilter {
            particles: std::iter::repeat_with(allocate).take(size).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn push(&mut self, particle: T) {
        self.particles.push(particle);
    }

    pub fn particles(&self) -> &[T] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [T] {
        &mut self.particles
    }

    pub fn sample_index<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        assert!(!self.is_empty(), "cannot sample from an empty filter");
        rng.gen_range(0..self.particles.len())
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        &self.particles[self.sample_index(rng)]
    }

    /// Replaces a uniformly drawn slot; returns the slot index
    pub fn replace<R: Rng + ?Sized>(&mut self, particle: T, dealloc: impl FnOnce(T), rng: &mut R) -> usize {
        let i = self.sample_index(rng);
        self.replace_at(i, particle, dealloc);
        i
    }

    pub fn replace_at(&mut self, i: usize, particle: T, dealloc: impl FnOnce(T)) {
        dealloc(mem::replace(&mut self.particles[i], particle));
    }

    /// Releases every particle and leaves the filter empty
    pub fn free(&mut self, dealloc: impl FnMut(T)) {
        mem::take(&mut self.particles).into_iter().for_each(dealloc);
    }

    /// Number of particles per key, one `key: count` line each
    pub fn describe(&self, key: impl Fn(&T) -> String) -> String {
        let mut summary: BTreeMap<String, usize> = BTreeMap::new();
        for p in &self.particles {
            *summary.entry(key(p)).or_default() += 1;
        }

        summary
            .into_iter()
            .map(|(k, n)| format!("{}: {}\n", k, n))
            .collect()
    }
}
