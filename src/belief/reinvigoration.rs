//! Rejection sampling that keeps structure diversity alive by breeding new
//! particles from a fully connected companion population.

use super::rejection::{reject_sample, DEFAULT_MAX_ATTEMPTS};
use super::{BaBelief, Belief};
use crate::bayes_adaptive::{BaState, Fbapomdp};
use crate::error::{FbaError, Result};
use crate::particles::FlatFilter;
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp};
use crate::types::{Action, Observation};
use rand::{Rng, RngCore};
use tracing::{debug, info};

/// Particle with the domain state of `structure_state`, a mutation of its
/// structure, and the counts of `counts_state` marginalized onto that structure
///
/// `counts_state` must be fully connected so any structure is a marginal of it.
pub fn breed<D, P, R>(
    bapomdp: &Fbapomdp<D, P>,
    structure_state: &BaState,
    counts_state: &BaState,
    rng: &mut R,
) -> BaState
where
    D: FactoredDomain,
    P: FactoredPrior,
    R: Rng + ?Sized,
{
    let structure = bapomdp.mutate(structure_state.model.structure(), rng);
    let model = counts_state.model.marginalize_out(&structure);
    BaState::new(bapomdp.domain().copy_state(&structure_state.domain_state), model)
}

/// Rejection sampling over two populations: the belief itself and a fully
/// connected one that tracks the same history
#[derive(Clone, Debug)]
pub struct ReinvigoratingRejectionSampling {
    belief: FlatFilter<BaState>,
    fully_connected_belief: FlatFilter<BaState>,
    size: usize,
    reinvigoration_amount: usize,
    max_attempts: usize,
}

impl ReinvigoratingRejectionSampling {
    pub fn new(size: usize, reinvigoration_amount: usize) -> Result<Self> {
        if size < 1 {
            return Err(FbaError::invalid_parameter(
                "particle_amount".to_string(),
                format!("cannot initiate belief of size {}", size),
            ));
        }
        if reinvigoration_amount < 1 {
            return Err(FbaError::invalid_parameter(
                "resample_amount".to_string(),
                format!("cannot reinvigorate {} particles", reinvigoration_amount),
            ));
        }

        Ok(ReinvigoratingRejectionSampling {
            belief: FlatFilter::new(),
            fully_connected_belief: FlatFilter::new(),
            size,
            reinvigoration_amount,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn belief(&self) -> &FlatFilter<BaState> {
        &self.belief
    }

    pub fn fully_connected_belief(&self) -> &FlatFilter<BaState> {
        &self.fully_connected_belief
    }

    /// Copy of the belief with `reinvigoration_amount` random particles replaced by bred ones
    fn reinvigorated<D, P, R>(&self, bapomdp: &Fbapomdp<D, P>, rng: &mut R) -> FlatFilter<BaState>
    where
        D: FactoredDomain,
        P: FactoredPrior,
        R: Rng + ?Sized,
    {
        let mut bred = FlatFilter::from_particles(
            self.belief
                .particles()
                .iter()
                .map(|s| bapomdp.copy_state(s))
                .collect(),
        );

        for _ in 0..self.reinvigoration_amount {
            let child = breed(
                bapomdp,
                self.belief.sample(rng),
                self.fully_connected_belief.sample(rng),
                rng,
            );
            bred.replace(child, |s| bapomdp.release_state(s), rng);
        }
        bred
    }
}

impl<D: FactoredDomain, P: FactoredPrior> Belief<Fbapomdp<D, P>> for ReinvigoratingRejectionSampling {
    fn initiate(&mut self, bapomdp: &Fbapomdp<D, P>, rng: &mut dyn RngCore) {
        assert!(self.belief.is_empty() && self.fully_connected_belief.is_empty());

        for _ in 0..self.size {
            self.belief.push(bapomdp.sample_start_state(rng));
        }
        for _ in 0..self.size {
            self.fully_connected_belief
                .push(bapomdp.sample_fully_connected_state(rng));
        }

        info!(
            size = self.size,
            reinvigoration_amount = self.reinvigoration_amount,
            "initiated reinvigorating rejection sampling belief"
        );
    }

    fn free(&mut self, bapomdp: &Fbapomdp<D, P>) {
        self.belief.free(|s| bapomdp.release_state(s));
        self.fully_connected_belief.free(|s| bapomdp.release_state(s));
    }

    fn sample(&self, rng: &mut dyn RngCore) -> &BaState {
        self.belief.sample(rng)
    }

    fn update_estimation(
        &mut self,
        action: Action,
        observation: &Observation,
        bapomdp: &Fbapomdp<D, P>,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        debug_assert_eq!(self.belief.len(), self.size);
        debug_assert_eq!(self.fully_connected_belief.len(), self.size);

        // both populations only change once both have been updated
        let mut bred = self.reinvigorated(bapomdp, rng);

        let cap = self.max_attempts.saturating_mul(self.size);
        let updated = reject_sample(action, observation, bapomdp, self.size, &mut bred, cap, rng).and_then(|_| {
            reject_sample(
                action,
                observation,
                bapomdp,
                self.size,
                &mut self.fully_connected_belief,
                cap,
                rng,
            )
        });

        if let Err(e) = updated {
            bred.free(|s| bapomdp.release_state(s));
            return Err(e);
        }

        let mut old = std::mem::replace(&mut self.belief, bred);
        old.free(|s| bapomdp.release_state(s));

        debug!(
            "reinvigorating belief after update:\n{}",
            self.belief.describe(|s| s.index().to_string())
        );
        Ok(())
    }

    fn len(&self) -> usize {
        self.belief.len()
    }
}

impl<D: FactoredDomain, P: FactoredPrior> BaBelief<D, P> for ReinvigoratingRejectionSampling {
    fn reset_domain_state_distribution(&mut self, bapomdp: &Fbapomdp<D, P>, rng: &mut dyn RngCore) {
        for state in self.belief.particles_mut() {
            bapomdp.reset_domain_state(state, rng);
        }
        for state in self.fully_connected_belief.particles_mut() {
            bapomdp.reset_domain_state(state, rng);
        }
    }
}
