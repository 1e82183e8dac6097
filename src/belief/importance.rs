//! Importance sampling: reweight by observation likelihood, then resample.

use super::{BaBelief, Belief};
use crate::bayes_adaptive::{BaState, Fbapomdp};
use crate::error::{FbaError, Result};
use crate::particles::WeightedFilter;
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp};
use crate::types::{Action, Observation};
use rand::{Rng, RngCore};
use tracing::{debug, info, warn};

/// Steps every particle and multiplies its weight by the likelihood of `observation`
///
/// Weights are normalized afterwards; the returned value is the total weight
/// before normalization. A population without any likelihood mass left is an
/// error and stays unnormalized.
pub fn update<D: Pomdp, R: Rng + ?Sized>(
    belief: &mut WeightedFilter<D::State>,
    action: Action,
    observation: &Observation,
    domain: &D,
    rng: &mut R,
) -> Result<f64> {
    let total = belief.reweight(|particle| domain.step_weighted(particle, action, observation, rng));

    debug!(total, particles = belief.len(), "importance sampling update");

    if !(total > 0.0) {
        warn!(?action, ?observation, "no particle explains the observation");
        return Err(FbaError::degenerate("importance sampling", belief.len()));
    }

    belief.normalize(total);
    Ok(total)
}

/// Replaces the population by `n` copies drawn proportional to weight, each weighing `1 / n`
pub fn resample<D: Pomdp, R: Rng + ?Sized>(
    belief: &mut WeightedFilter<D::State>,
    domain: &D,
    n: usize,
    rng: &mut R,
) {
    let mut fresh = WeightedFilter::new();
    for _ in 0..n {
        fresh.add_weighted(domain.copy_state(belief.sample(rng)), 1.0 / n as f64);
    }

    belief.free(|s| domain.release_state(s));
    *belief = fresh;
}

/// Importance-sampling belief of fixed size
#[derive(Clone, Debug)]
pub struct ImportanceSampling<S> {
    filter: WeightedFilter<S>,
    size: usize,
}

impl<S> ImportanceSampling<S> {
    pub fn new(size: usize) -> Result<Self> {
        if size < 1 {
            return Err(FbaError::invalid_parameter("particle_amount", "importance sampling needs at least 1 particle"));
        }
        Ok(ImportanceSampling {
            filter: WeightedFilter::new(),
            size,
        })
    }

    /// Belief that starts from an existing population
    pub fn from_filter(filter: WeightedFilter<S>, size: usize) -> Result<Self> {
        let mut belief = Self::new(size)?;
        belief.filter = filter;
        Ok(belief)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn filter(&self) -> &WeightedFilter<S> {
        &self.filter
    }
}

impl<D: Pomdp> Belief<D> for ImportanceSampling<D::State> {
    fn initiate(&mut self, domain: &D, rng: &mut dyn RngCore) {
        assert!(self.filter.is_empty(), "belief is already initiated");

        for _ in 0..self.size {
            self.filter
                .add_weighted(domain.sample_start_state(rng), 1.0 / self.size as f64);
        }
        info!(size = self.size, "initiated importance sampling belief");
    }

    fn free(&mut self, domain: &D) {
        self.filter.free(|s| domain.release_state(s));
    }

    fn sample(&self, rng: &mut dyn RngCore) -> &D::State {
        self.filter.sample(rng)
    }

    fn update_estimation(
        &mut self,
        action: Action,
        observation: &Observation,
        domain: &D,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        update(&mut self.filter, action, observation, domain, rng)?;
        resample(&mut self.filter, domain, self.size, rng);
        Ok(())
    }

    fn len(&self) -> usize {
        self.filter.len()
    }
}

impl<D: FactoredDomain, P: FactoredPrior> BaBelief<D, P> for ImportanceSampling<BaState> {
    /// Resamples by weight, then redraws the domain state of every copy
    fn reset_domain_state_distribution(&mut self, bapomdp: &Fbapomdp<D, P>, rng: &mut dyn RngCore) {
        let mut hits = vec![0usize; self.filter.len()];
        for _ in 0..self.size {
            hits[self.filter.sample_index(rng)] += 1;
        }

        let mut fresh = WeightedFilter::new();
        for (p, copies) in self.filter.drain().into_iter().zip(hits) {
            for _ in 0..copies {
                let mut state = bapomdp.copy_state(&p.particle);
                bapomdp.reset_domain_state(&mut state, rng);
                fresh.add_weighted(state, 1.0 / self.size as f64);
            }
            bapomdp.release_state(p.particle);
        }
        self.filter = fresh;

        debug!(
            "importance sampling belief after resetting domain states:\n{}",
            self.filter.describe(|s| s.index().to_string())
        );
    }
}
