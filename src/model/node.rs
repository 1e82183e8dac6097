//! A single conditional probability table parameterized by Dirichlet counts.

use crate::sampling::{expected_mult, log_gamma, SampleMethod};
use crate::types::indexing;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete conditional distribution over `output_size` values, conditioned on
/// a subset of a global feature vector (the parents)
///
/// Counts are stored flat: the parent values form the high mixed-radix digits
/// and the output value the lowest one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConditionalTableNode {
    output_size: usize,
    parents: Vec<usize>,
    parent_sizes: Vec<usize>,
    counts: Vec<f64>,
}

impl ConditionalTableNode {
    /// Creates a node with zero counts
    ///
    /// `graph_range` holds the cardinality of every feature the parents index into.
    pub fn new(graph_range: &[usize], parents: Vec<usize>, output_size: usize) -> Self {
        assert!(output_size > 0, "node needs a positive output size");
        assert!(
            parents.len() <= graph_range.len(),
            "{} parents exceed the {} available features",
            parents.len(),
            graph_range.len()
        );

        let parent_sizes: Vec<usize> = parents
            .iter()
            .map(|&p| {
                assert!(p < graph_range.len(), "parent {} out of range {}", p, graph_range.len());
                graph_range[p]
            })
            .collect();
        let num_params = output_size * parent_sizes.iter().product::<usize>();

        ConditionalTableNode {
            output_size,
            parents,
            parent_sizes,
            counts: vec![0.0; num_params],
        }
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    pub fn parent_sizes(&self) -> &[usize] {
        &self.parent_sizes
    }

    /// Number of count cells: output size times every parent configuration
    pub fn num_params(&self) -> usize {
        self.counts.len()
    }

    pub fn num_parent_configurations(&self) -> usize {
        self.counts.len() / self.output_size
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Values of the parents within a global feature vector
    pub fn parent_values(&self, graph_values: &[usize]) -> Vec<usize> {
        self.parents.iter().map(|&p| graph_values[p]).collect()
    }

    /// Draws an output value given the global feature vector
    pub fn sample<R: Rng + ?Sized>(
        &self,
        graph_values: &[usize],
        method: SampleMethod,
        rng: &mut R,
    ) -> usize {
        method.sample(self.distribution(self.graph_config(graph_values)), rng)
    }

    /// Normalized counts for the parent configuration within `graph_values`
    pub fn expectation(&self, graph_values: &[usize]) -> Vec<f64> {
        expected_mult(self.distribution(self.graph_config(graph_values)))
    }

    /// The categorical distribution `method` associates with the parent configuration
    pub fn sample_multinomial<R: Rng + ?Sized>(
        &self,
        graph_values: &[usize],
        method: SampleMethod,
        rng: &mut R,
    ) -> Vec<f64> {
        method.multinomial(self.distribution(self.graph_config(graph_values)), rng)
    }

    /// Adds `amount` to one count cell; negative amounts undo earlier increments
    pub fn increment(&mut self, graph_values: &[usize], output: usize, amount: f64) {
        assert!(output < self.output_size, "output {} out of range {}", output, self.output_size);

        let start = self.graph_config(graph_values) * self.output_size;
        let cell = &mut self.counts[start + output];
        *cell += amount;
        debug_assert!(*cell >= 0.0, "count dropped below zero");
    }

    /// Count of `output` for the given parent values
    pub fn count(&self, parent_values: &[usize], output: usize) -> f64 {
        assert!(output < self.output_size);
        self.counts[self.parent_config(parent_values) * self.output_size + output]
    }

    pub fn count_mut(&mut self, parent_values: &[usize], output: usize) -> &mut f64 {
        assert!(output < self.output_size);
        let index = self.parent_config(parent_values) * self.output_size + output;
        &mut self.counts[index]
    }

    /// Overwrites the whole count vector of one parent configuration
    pub fn set_dirichlet(&mut self, parent_values: &[usize], counts: &[f64]) {
        assert_eq!(counts.len(), self.output_size, "distribution of wrong size");
        assert!(counts.iter().all(|&c| c >= 0.0), "counts must be non-negative");

        let start = self.parent_config(parent_values) * self.output_size;
        self.counts[start..start + self.output_size].copy_from_slice(counts);
    }

    /// Node over `new_parents` (a subset of the current parents) whose counts are
    /// the sums over the eliminated parents
    pub fn marginalize_out(&self, new_parents: &[usize]) -> ConditionalTableNode {
        if new_parents == self.parents.as_slice() {
            return self.clone();
        }

        let positions: Vec<usize> = new_parents
            .iter()
            .map(|p| {
                self.parents
                    .iter()
                    .position(|q| q == p)
                    .unwrap_or_else(|| panic!("{} is not a parent of this node", p))
            })
            .collect();
        debug_assert!(
            (1..positions.len()).all(|i| !positions[..i].contains(&positions[i])),
            "duplicate parents"
        );

        let mut reduced = ConditionalTableNode {
            output_size: self.output_size,
            parents: new_parents.to_vec(),
            parent_sizes: positions.iter().map(|&i| self.parent_sizes[i]).collect(),
            counts: Vec::new(),
        };
        reduced.counts = vec![0.0; self.output_size * reduced.parent_sizes.iter().product::<usize>()];

        let mut values = vec![0; self.parents.len()];
        loop {
            let from = indexing::project(&values, &self.parent_sizes) * self.output_size;
            let kept: Vec<usize> = positions.iter().map(|&i| values[i]).collect();
            let to = indexing::project(&kept, &reduced.parent_sizes) * self.output_size;

            for o in 0..self.output_size {
                reduced.counts[to + o] += self.counts[from + o];
            }

            if indexing::increment(&mut values, &self.parent_sizes) {
                break;
            }
        }

        reduced
    }

    /// `marginalize_out` followed by rescaling every parent configuration to `target_total`
    pub fn marginalize_out_normalized(
        &self,
        new_parents: &[usize],
        target_total: f64,
    ) -> ConditionalTableNode {
        let mut reduced = self.marginalize_out(new_parents);
        reduced.normalize_totals(target_total);
        reduced
    }

    /// Rescales each parent configuration with mass so its counts sum to `target_total`
    pub fn normalize_totals(&mut self, target_total: f64) {
        assert!(target_total > 0.0, "target total must be positive");

        for dist in self.counts.chunks_mut(self.output_size) {
            let total: f64 = dist.iter().sum();
            if total > 0.0 {
                dist.iter_mut().for_each(|c| *c *= target_total / total);
            }
        }
    }

    /// Mean count total over the parent configurations
    pub fn mean_total(&self) -> f64 {
        self.counts.iter().sum::<f64>() / self.num_parent_configurations() as f64
    }

    /// Renames the parents, keeping counts and cardinalities
    pub(crate) fn rename_parents(&mut self, rename: impl Fn(usize) -> usize) {
        self.parents.iter_mut().for_each(|p| *p = rename(*p));
    }

    /// Log Bayesian-Dirichlet score of these counts given `prior` counts
    pub fn log_bd_score(&self, prior: &ConditionalTableNode) -> f64 {
        assert_eq!(self.output_size, prior.output_size, "prior with other output size");
        assert_eq!(self.counts.len(), prior.counts.len(), "prior with other parent configurations");

        self.counts
            .chunks(self.output_size)
            .zip(prior.counts.chunks(self.output_size))
            .map(|(posterior, prior)| {
                let cells: f64 = posterior
                    .iter()
                    .zip(prior)
                    .map(|(&c, &p)| log_gamma(c) - log_gamma(p))
                    .sum();
                cells + log_gamma(prior.iter().sum()) - log_gamma(posterior.iter().sum())
            })
            .sum()
    }

    fn distribution(&self, config: usize) -> &[f64] {
        let start = config * self.output_size;
        &self.counts[start..start + self.output_size]
    }

    fn graph_config(&self, graph_values: &[usize]) -> usize {
        self.parents
            .iter()
            .zip(&self.parent_sizes)
            .fold(0, |index, (&p, &size)| {
                let value = graph_values[p];
                debug_assert!(value < size, "feature {} value {} out of range {}", p, value, size);
                index * size + value
            })
    }

    fn parent_config(&self, parent_values: &[usize]) -> usize {
        assert_eq!(parent_values.len(), self.parents.len(), "wrong number of parent values");
        indexing::project(parent_values, &self.parent_sizes)
    }
}

impl fmt::Display for ConditionalTableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "parents {:?}", self.parents)?;

        let steps = indexing::step_sizes(&self.parent_sizes);
        for (config, dist) in self.counts.chunks(self.output_size).enumerate() {
            let values = indexing::project_using_step_sizes(config, &steps);
            writeln!(f, "  {:?}: {:?}", values, dist)?;
        }
        Ok(())
    }
}
