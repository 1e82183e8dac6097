//! # Environment Contract
//!
//! The interface beliefs and the Bayes-adaptive simulator expect from a
//! domain. States are acquired from and released back to the domain
//! explicitly, so a domain can pool or intern them.
//!
//! - [`Pomdp`]: generative simulator (start states, steps, observation likelihoods)
//! - [`FactoredDomain`]: the extra knowledge needed to learn a factored model
//! - [`FactoredPrior`]: prior distribution over factored models and structures

use crate::error::{FbaError, Result};
use crate::model::{FactoredModel, Structure};
use crate::types::{Action, DomainDescriptor, FactoredState, Observation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Outcome of one simulated step
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub observation: Observation,
    pub reward: f64,
    pub terminal: bool,
}

/// Generative POMDP simulator
pub trait Pomdp {
    type State: fmt::Debug;

    fn num_actions(&self) -> usize;

    fn sample_start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::State;

    /// Advances `state` in place under `action`
    fn step<R: Rng + ?Sized>(&self, state: &mut Self::State, action: Action, rng: &mut R) -> Transition;

    /// Like `step`, for a step whose real observation is already known
    ///
    /// Simulators that learn from their own steps override this to learn from
    /// `observation`; the returned observation is then `observation` itself.
    fn step_observed<R: Rng + ?Sized>(
        &self,
        state: &mut Self::State,
        action: Action,
        _observation: &Observation,
        rng: &mut R,
    ) -> Transition {
        self.step(state, action, rng)
    }

    /// Advances `state` under `action` and returns the likelihood of the real
    /// `observation` at the successor
    ///
    /// The likelihood is taken before a learning simulator takes `observation`
    /// into account.
    fn step_weighted<R: Rng + ?Sized>(
        &self,
        state: &mut Self::State,
        action: Action,
        observation: &Observation,
        rng: &mut R,
    ) -> f64 {
        let transition = self.step(state, action, rng);
        self.release_observation(transition.observation);
        self.observation_probability(observation, action, state, rng)
    }

    /// Likelihood of `observation` after reaching `new_state` through `action`
    fn observation_probability<R: Rng + ?Sized>(
        &self,
        observation: &Observation,
        action: Action,
        new_state: &Self::State,
        rng: &mut R,
    ) -> f64;

    fn copy_state(&self, state: &Self::State) -> Self::State;

    fn release_state(&self, state: Self::State);

    fn copy_action(&self, action: Action) -> Action {
        action
    }

    fn release_action(&self, _action: Action) {}

    fn copy_observation(&self, observation: &Observation) -> Observation {
        observation.clone()
    }

    fn release_observation(&self, _observation: Observation) {}
}

/// Domain knowledge a factored Bayes-adaptive model is learned against
pub trait FactoredDomain: Pomdp<State = FactoredState> {
    fn descriptor(&self) -> &Arc<DomainDescriptor>;

    fn state_from_features(&self, features: &[usize]) -> FactoredState {
        self.descriptor().assert_legal_state(features);
        FactoredState::new(features.to_vec())
    }

    /// Start-state distribution over flat state indices
    fn state_prior(&self) -> Result<Vec<f64>>;

    fn reward(&self, state: &FactoredState, action: Action, new_state: &FactoredState) -> f64;

    fn terminal(&self, state: &FactoredState, action: Action, new_state: &FactoredState) -> bool;
}

/// Prior over factored dynamics models
pub trait FactoredPrior {
    /// Draws the model a fresh particle starts with
    fn sample_model<R: Rng + ?Sized>(&self, rng: &mut R) -> FactoredModel;

    /// Model in which every node depends on every state feature
    fn fully_connected_model(&self) -> FactoredModel;

    /// Prior counts for the given structure
    fn compute_prior_model(&self, _structure: &Structure) -> Result<FactoredModel> {
        Err(FbaError::Unsupported(
            "this prior cannot compute a prior model for a structure".to_string(),
        ))
    }

    /// Proposes a neighbouring structure
    fn mutate<R: Rng + ?Sized>(&self, structure: Structure, rng: &mut R) -> Structure;
}

/// Which structures a prior hands out to new particles
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StructurePrior {
    /// The correct structure with the configured counts
    #[default]
    MatchCounts,
    /// Random parent sets with uninformed counts
    Uniform,
    /// Random parent sets that always contain the informative feature
    MatchUniform,
    /// Every node connected to every state feature
    FullyConnected,
}

impl FromStr for StructurePrior {
    type Err = FbaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "match-counts" => Ok(StructurePrior::MatchCounts),
            "uniform" => Ok(StructurePrior::Uniform),
            "match-uniform" => Ok(StructurePrior::MatchUniform),
            "fully-connected" => Ok(StructurePrior::FullyConnected),
            other => Err(FbaError::invalid_parameter(
                "structure_prior".to_string(),
                format!("unfamiliar structure prior '{}'", other),
            )),
        }
    }
}

impl TryFrom<String> for StructurePrior {
    type Error = FbaError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<StructurePrior> for String {
    fn from(prior: StructurePrior) -> Self {
        prior.to_string()
    }
}

impl fmt::Display for StructurePrior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StructurePrior::MatchCounts => "",
            StructurePrior::Uniform => "uniform",
            StructurePrior::MatchUniform => "match-uniform",
            StructurePrior::FullyConnected => "fully-connected",
        };
        write!(f, "{}", name)
    }
}
