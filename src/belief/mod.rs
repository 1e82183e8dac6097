//! # Belief Tracking
//!
//! Particle approximations of the posterior over hidden states. For the
//! Bayes-adaptive simulator every particle is a [`BaState`], so the same
//! population also tracks the posterior over dynamics models.
//!
//! ## Available Components
//!
//! - [`Belief`]: core interface, object safe so a planner can hold a `Box<dyn Belief<_>>`
//! - [`BaBelief`]: beliefs over hyper-states that can be reset between episodes
//! - [`ImportanceSampling`]: reweight by observation likelihood, then resample
//! - [`RejectionSampling`]: keep only successors that reproduce the observation
//! - [`ReinvigoratingRejectionSampling`]: rejection sampling plus structure breeding
//! - [`MhWithinGibbs`]: importance sampling that re-derives the population by
//!   MCMC over structures once the log likelihood collapses
//!
//! Beliefs are built from configuration through [`make_belief`].

pub mod history;
pub mod importance;
pub mod mh_within_gibbs;
pub mod reinvigoration;
pub mod rejection;

pub use history::{History, Interaction};
pub use importance::ImportanceSampling;
pub use mh_within_gibbs::{MhWithinGibbs, StateHistorySampling};
pub use reinvigoration::ReinvigoratingRejectionSampling;
pub use rejection::RejectionSampling;

use crate::bayes_adaptive::{BaState, Fbapomdp};
use crate::config::BeliefConfig;
use crate::error::{FbaError, Result};
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp};
use crate::types::{Action, Observation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Core trait for particle beliefs over the states of `D`
pub trait Belief<D: Pomdp> {
    /// Fills the population with start states
    fn initiate(&mut self, domain: &D, rng: &mut dyn RngCore);

    /// Releases every particle back to `domain`
    fn free(&mut self, domain: &D);

    /// Draws one representative state
    fn sample(&self, rng: &mut dyn RngCore) -> &D::State;

    /// Conditions the belief on having taken `action` and perceived `observation`
    ///
    /// After an error the population is no longer conditioned on the history
    /// and should be freed and initiated again.
    fn update_estimation(
        &mut self,
        action: Action,
        observation: &Observation,
        domain: &D,
        rng: &mut dyn RngCore,
    ) -> Result<()>;

    /// Number of particles currently held
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Belief over hyper-states of a factored Bayes-adaptive POMDP
pub trait BaBelief<D: FactoredDomain, P: FactoredPrior>: Belief<Fbapomdp<D, P>> {
    /// Redraws the domain state of every particle while keeping its model
    fn reset_domain_state_distribution(&mut self, bapomdp: &Fbapomdp<D, P>, rng: &mut dyn RngCore);
}

/// Belief update strategy, as named in configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BeliefKind {
    #[default]
    RejectionSampling,
    ImportanceSampling,
    Reinvigoration,
    MhWithinGibbs,
}

impl BeliefKind {
    pub fn name(&self) -> &'static str {
        match self {
            BeliefKind::RejectionSampling => "rejection_sampling",
            BeliefKind::ImportanceSampling => "importance_sampling",
            BeliefKind::Reinvigoration => "reinvigoration",
            BeliefKind::MhWithinGibbs => "mh-within-gibbs",
        }
    }
}

impl FromStr for BeliefKind {
    type Err = FbaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rejection_sampling" => Ok(BeliefKind::RejectionSampling),
            "importance_sampling" => Ok(BeliefKind::ImportanceSampling),
            "reinvigoration" => Ok(BeliefKind::Reinvigoration),
            "mh-within-gibbs" => Ok(BeliefKind::MhWithinGibbs),
            other => Err(FbaError::UnsupportedBelief(other.to_string())),
        }
    }
}

impl TryFrom<String> for BeliefKind {
    type Error = FbaError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<BeliefKind> for String {
    fn from(kind: BeliefKind) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for BeliefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Builds the belief described by `conf` over hyper-states of `Fbapomdp<D, P>`
pub fn make_belief<D, P>(conf: &BeliefConfig) -> Result<Box<dyn BaBelief<D, P>>>
where
    D: FactoredDomain,
    P: FactoredPrior,
{
    conf.validate()?;

    let belief: Box<dyn BaBelief<D, P>> = match conf.belief {
        BeliefKind::RejectionSampling => Box::new(
            RejectionSampling::<BaState>::new(conf.particle_amount)?.with_max_attempts(conf.max_attempts),
        ),
        BeliefKind::ImportanceSampling => Box::new(ImportanceSampling::<BaState>::new(conf.particle_amount)?),
        BeliefKind::Reinvigoration => Box::new(
            ReinvigoratingRejectionSampling::new(conf.particle_amount, conf.resample_amount)?
                .with_max_attempts(conf.max_attempts),
        ),
        BeliefKind::MhWithinGibbs => Box::new(
            MhWithinGibbs::new(
                conf.particle_amount,
                conf.threshold,
                StateHistorySampling::from_option(&conf.option)?,
            )?
            .with_max_attempts(conf.max_attempts),
        ),
    };

    Ok(belief)
}
