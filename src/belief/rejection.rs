//! Rejection sampling: keep simulated successors whose observation matches.

use super::{BaBelief, Belief};
use crate::bayes_adaptive::{BaState, Fbapomdp};
use crate::error::{FbaError, Result};
use crate::particles::FlatFilter;
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp};
use crate::types::{Action, Observation};
use rand::{Rng, RngCore};
use tracing::{debug, info, warn};

/// Default bound on simulation attempts per accepted particle
pub const DEFAULT_MAX_ATTEMPTS: usize = 10_000;

/// Rebuilds `belief` from `n` successors that produced `observation`
///
/// Gives up after `max_attempts` simulations in total, releasing whatever was
/// accepted so far and leaving `belief` untouched. Returns the number of
/// simulations it took.
pub fn reject_sample<D: Pomdp, R: Rng + ?Sized>(
    action: Action,
    observation: &Observation,
    domain: &D,
    n: usize,
    belief: &mut FlatFilter<D::State>,
    max_attempts: usize,
    rng: &mut R,
) -> Result<usize> {
    let mut accepted = Vec::with_capacity(n);
    let mut attempts = 0;

    while accepted.len() < n {
        if attempts >= max_attempts {
            warn!(attempts, accepted = accepted.len(), ?observation, "rejection sampling exhausted");
            accepted.into_iter().for_each(|s| domain.release_state(s));
            return Err(FbaError::degenerate("rejection sampling", attempts));
        }
        attempts += 1;

        let mut state = domain.copy_state(belief.sample(rng));
        let transition = domain.step(&mut state, action, rng);

        if transition.observation == *observation {
            accepted.push(state);
        } else {
            domain.release_state(state);
        }
        domain.release_observation(transition.observation);
    }

    debug!(attempts, accepted = n, "rejection sampling update");

    belief.free(|s| domain.release_state(s));
    *belief = FlatFilter::from_particles(accepted);
    Ok(attempts)
}

/// Rejection-sampling belief of fixed size
#[derive(Clone, Debug)]
pub struct RejectionSampling<S> {
    filter: FlatFilter<S>,
    size: usize,
    max_attempts: usize,
}

impl<S> RejectionSampling<S> {
    pub fn new(size: usize) -> Result<Self> {
        if size < 1 {
            return Err(FbaError::invalid_parameter("particle_amount", "rejection sampling needs at least 1 particle"));
        }
        Ok(RejectionSampling {
            filter: FlatFilter::new(),
            size,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    /// Bound on simulations per accepted particle
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn filter(&self) -> &FlatFilter<S> {
        &self.filter
    }
}

impl<D: Pomdp> Belief<D> for RejectionSampling<D::State> {
    fn initiate(&mut self, domain: &D, rng: &mut dyn RngCore) {
        assert!(self.filter.is_empty(), "belief is already initiated");

        for _ in 0..self.size {
            self.filter.push(domain.sample_start_state(rng));
        }
        info!(size = self.size, "initiated rejection sampling belief");
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
        let cap = self.max_attempts.saturating_mul(self.size);
        reject_sample(action, observation, domain, self.size, &mut self.filter, cap, rng)?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.filter.len()
    }
}

impl<D: FactoredDomain, P: FactoredPrior> BaBelief<D, P> for RejectionSampling<BaState> {
    fn reset_domain_state_distribution(&mut self, bapomdp: &Fbapomdp<D, P>, rng: &mut dyn RngCore) {
        for state in self.filter.particles_mut() {
            bapomdp.reset_domain_state(state, rng);
        }
        debug!(
            "rejection sampling belief after resetting domain states:\n{}",
            self.filter.describe(|s| s.index().to_string())
        );
    }
}
