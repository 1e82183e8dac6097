//! Categorical and Dirichlet sampling over pseudo-count vectors.

use rand::Rng;
use rand_distr::{Distribution, Gamma};
use serde::{Deserialize, Serialize};
use statrs::function::gamma::ln_gamma;

/// How a categorical distribution is drawn from a vector of Dirichlet counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleMethod {
    /// Use the normalized counts (the Dirichlet mean)
    #[default]
    Expected,
    /// Draw a multinomial from the Dirichlet first
    Sampled,
}

impl SampleMethod {
    /// Maps the `bayes_sample_method` configuration code: `0` samples, anything else expects
    pub fn from_code(code: i64) -> Self {
        if code == 0 {
            SampleMethod::Sampled
        } else {
            SampleMethod::Expected
        }
    }

    /// Draws an outcome index
    pub fn sample<R: Rng + ?Sized>(self, counts: &[f64], rng: &mut R) -> usize {
        let probs = self.multinomial(counts, rng);
        sample_from_mult(&probs, 1.0, rng)
    }

    /// The categorical distribution this method associates with `counts`
    pub fn multinomial<R: Rng + ?Sized>(self, counts: &[f64], rng: &mut R) -> Vec<f64> {
        match self {
            SampleMethod::Expected => expected_mult(counts),
            SampleMethod::Sampled => sample_mult(counts, rng),
        }
    }
}

/// Normalized counts; a vector without mass maps to the uniform distribution
pub fn expected_mult(counts: &[f64]) -> Vec<f64> {
    normalize_or_uniform(counts.to_vec())
}

/// A multinomial drawn from `Dir(counts)` through independent gamma draws
pub fn sample_mult<R: Rng + ?Sized>(counts: &[f64], rng: &mut R) -> Vec<f64> {
    let gammas = counts.iter().map(|&c| gamma_draw(c, rng)).collect();
    normalize_or_uniform(gammas)
}

/// Draws an index with probability `probs[i] / total`
///
/// `total` must be the sum of `probs`; the last index with mass is returned when
/// rounding leaves the threshold beyond the cumulative sum.
pub fn sample_from_mult<R: Rng + ?Sized>(probs: &[f64], total: f64, rng: &mut R) -> usize {
    assert!(!probs.is_empty(), "cannot sample from an empty distribution");

    let threshold = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, &p) in probs.iter().enumerate() {
        cumulative += p;
        if threshold < cumulative {
            return i;
        }
    }

    probs.iter().rposition(|&p| p > 0.0).unwrap_or(probs.len() - 1)
}

/// `ln Γ(x)`, clamped to 0 below 1 as the BD score convention requires
pub fn log_gamma(x: f64) -> f64 {
    if x < 1.0 {
        0.0
    } else {
        ln_gamma(x)
    }
}

fn gamma_draw<R: Rng + ?Sized>(shape: f64, rng: &mut R) -> f64 {
    if shape <= 0.0 {
        return 0.0;
    }
    match Gamma::new(shape, 1.0) {
        Ok(gamma) => gamma.sample(rng),
        Err(_) => 0.0,
    }
}

fn normalize_or_uniform(mut values: Vec<f64>) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter_mut().for_each(|v| *v /= total);
    } else if !values.is_empty() {
        let uniform = 1.0 / values.len() as f64;
        values.iter_mut().for_each(|v| *v = uniform);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_expected_mult_normalizes() {
        let probs = expected_mult(&[1.0, 3.0]);
        assert!((probs[0] - 0.25).abs() < 1e-12);
        assert!((probs[1] - 0.75).abs() < 1e-12);

        let uniform = expected_mult(&[0.0, 0.0, 0.0, 0.0]);
        assert!(uniform.iter().all(|&p| (p - 0.25).abs() < 1e-12));
    }

    #[test]
    fn test_single_outcome_always_sampled() {
        let mut rng = StdRng::seed_from_u64(3);
        let counts = [0.0, 0.0, 7.0, 0.0];

        for method in [SampleMethod::Expected, SampleMethod::Sampled] {
            for _ in 0..200 {
                assert_eq!(method.sample(&counts, &mut rng), 2);
            }
        }
    }

    #[test]
    fn test_sample_mult_is_distribution() {
        let mut rng = StdRng::seed_from_u64(11);
        let probs = sample_mult(&[2.0, 0.5, 10.0], &mut rng);
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(probs.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn test_sample_from_mult_frequencies() {
        let mut rng = StdRng::seed_from_u64(5);
        let probs = [0.2, 0.8];
        let hits = (0..10_000)
            .filter(|_| sample_from_mult(&probs, 1.0, &mut rng) == 1)
            .count();
        assert!(hits > 7_500 && hits < 8_500, "hits = {}", hits);
    }

    #[test]
    fn test_log_gamma_clamp() {
        assert_eq!(log_gamma(0.5), 0.0);
        assert!(log_gamma(1.0).abs() < 1e-12);
        assert!((log_gamma(5.0) - 24f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn test_method_from_code() {
        assert_eq!(SampleMethod::from_code(0), SampleMethod::Sampled);
        assert_eq!(SampleMethod::from_code(1), SampleMethod::Expected);
        assert_eq!(SampleMethod::from_code(-3), SampleMethod::Expected);
    }
}
