//! # Factored Bayes-Adaptive POMDP
//!
//! Lifts a factored domain into a POMDP over hyper-states ([`BaState`]):
//! every particle carries its own [`FactoredModel`](crate::model::FactoredModel)
//! which drives its simulated transitions and learns from them.

pub mod state;

pub use state::BaState;

use crate::error::Result;
use crate::model::{FactoredModel, Structure};
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp, StructurePrior, Transition};
use crate::sampling::SampleMethod;
use crate::types::{Action, DomainDescriptor, FactoredState, Observation};
use rand::Rng;
use std::mem;
use std::sync::Arc;

/// Whether stepping a hyper-state also updates its counts
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StepMode {
    #[default]
    UpdateCounts,
    KeepCounts,
}

/// Factored Bayes-adaptive POMDP over domain `D` with model prior `P`
#[derive(Clone, Debug)]
pub struct Fbapomdp<D, P> {
    domain: D,
    prior: P,
    sample_method: SampleMethod,
    structure_prior: StructurePrior,
    mode: StepMode,
}

impl<D: FactoredDomain, P: FactoredPrior> Fbapomdp<D, P> {
    pub fn new(domain: D, prior: P, sample_method: SampleMethod, structure_prior: StructurePrior) -> Self {
        Fbapomdp {
            domain,
            prior,
            sample_method,
            structure_prior,
            mode: StepMode::default(),
        }
    }

    pub fn domain(&self) -> &D {
        &self.domain
    }

    pub fn prior(&self) -> &P {
        &self.prior
    }

    pub fn descriptor(&self) -> &Arc<DomainDescriptor> {
        self.domain.descriptor()
    }

    pub fn sample_method(&self) -> SampleMethod {
        self.sample_method
    }

    pub fn mode(&self) -> StepMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: StepMode) {
        self.mode = mode;
    }

    pub fn sample_domain_state<R: Rng + ?Sized>(&self, rng: &mut R) -> FactoredState {
        self.domain.sample_start_state(rng)
    }

    pub fn domain_state(&self, features: &[usize]) -> FactoredState {
        self.domain.state_from_features(features)
    }

    pub fn release_domain_state(&self, state: FactoredState) {
        self.domain.release_state(state);
    }

    /// Redraws the domain state of `state`, keeping its model
    pub fn reset_domain_state<R: Rng + ?Sized>(&self, state: &mut BaState, rng: &mut R) {
        let fresh = self.domain.sample_start_state(rng);
        let old = mem::replace(&mut state.domain_state, fresh);
        self.domain.release_state(old);
    }

    /// Hyper-state with a fresh domain state and a fully connected model
    pub fn sample_fully_connected_state<R: Rng + ?Sized>(&self, rng: &mut R) -> BaState {
        BaState::new(self.domain.sample_start_state(rng), self.prior.fully_connected_model())
    }

    pub fn compute_prior_model(&self, structure: &Structure) -> Result<FactoredModel> {
        self.prior.compute_prior_model(structure)
    }

    pub fn mutate<R: Rng + ?Sized>(&self, structure: Structure, rng: &mut R) -> Structure {
        self.prior.mutate(structure, rng)
    }

    /// Keeps `structure` with probability 1/2, otherwise mutates it
    pub fn propose_structure<R: Rng + ?Sized>(&self, structure: Structure, rng: &mut R) -> Structure {
        if rng.gen_bool(0.5) {
            structure
        } else {
            self.prior.mutate(structure, rng)
        }
    }

    /// Moves `state` to a successor drawn from its own model and learns from
    /// the transition to `observation` (unless counts are kept)
    fn advance<R: Rng + ?Sized>(
        &self,
        state: &mut BaState,
        action: Action,
        observation: Option<&Observation>,
        rng: &mut R,
    ) -> Transition {
        let new_features = self.sample_successor(state, action, rng);
        let observation = match observation {
            Some(o) => o.clone(),
            None => Observation::new(state.model.sample_observation_features(
                action,
                &new_features,
                self.sample_method,
                rng,
            )),
        };

        self.commit(state, action, observation, new_features)
    }

    fn sample_successor<R: Rng + ?Sized>(&self, state: &BaState, action: Action, rng: &mut R) -> Vec<usize> {
        state
            .model
            .sample_state_features(state.domain_state.features(), action, self.sample_method, rng)
    }

    /// Learns `(s, action, observation, s')` and moves `state` to `new_features`
    fn commit(
        &self,
        state: &mut BaState,
        action: Action,
        observation: Observation,
        new_features: Vec<usize>,
    ) -> Transition {
        let new_state = self.domain.state_from_features(&new_features);
        let reward = self.domain.reward(&state.domain_state, action, &new_state);
        let terminal = self.domain.terminal(&state.domain_state, action, &new_state);

        if self.mode == StepMode::UpdateCounts {
            state.model.increment_counts_of(
                state.domain_state.features(),
                action,
                observation.features(),
                &new_features,
                1.0,
            );
        }

        let old = mem::replace(&mut state.domain_state, new_state);
        self.domain.release_state(old);

        Transition {
            observation,
            reward,
            terminal,
        }
    }
}

impl<D: FactoredDomain, P: FactoredPrior> Pomdp for Fbapomdp<D, P> {
    type State = BaState;

    fn num_actions(&self) -> usize {
        self.domain.num_actions()
    }

    fn sample_start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> BaState {
        let domain_state = self.domain.sample_start_state(rng);
        let model = match self.structure_prior {
            StructurePrior::FullyConnected => self.prior.fully_connected_model(),
            _ => self.prior.sample_model(rng),
        };
        BaState::new(domain_state, model)
    }

    fn step<R: Rng + ?Sized>(&self, state: &mut BaState, action: Action, rng: &mut R) -> Transition {
        self.advance(state, action, None, rng)
    }

    /// Counts learn from the perceived observation instead of a simulated one
    fn step_observed<R: Rng + ?Sized>(
        &self,
        state: &mut BaState,
        action: Action,
        observation: &Observation,
        rng: &mut R,
    ) -> Transition {
        self.advance(state, action, Some(observation), rng)
    }

    /// Weighs the successor with the counts from before `observation` is learned
    fn step_weighted<R: Rng + ?Sized>(
        &self,
        state: &mut BaState,
        action: Action,
        observation: &Observation,
        rng: &mut R,
    ) -> f64 {
        let new_features = self.sample_successor(state, action, rng);
        let likelihood = state.model.observation_probability(
            observation.features(),
            action,
            &new_features,
            self.sample_method,
            rng,
        );

        let transition = self.commit(state, action, observation.clone(), new_features);
        self.domain.release_observation(transition.observation);
        likelihood
    }

    fn observation_probability<R: Rng + ?Sized>(
        &self,
        observation: &Observation,
        action: Action,
        new_state: &BaState,
        rng: &mut R,
    ) -> f64 {
        new_state.model.observation_probability(
            observation.features(),
            action,
            new_state.domain_state.features(),
            self.sample_method,
            rng,
        )
    }

    fn copy_state(&self, state: &BaState) -> BaState {
        BaState::new(self.domain.copy_state(&state.domain_state), state.model.clone())
    }

    fn release_state(&self, state: BaState) {
        self.domain.release_state(state.domain_state);
    }

    fn copy_action(&self, action: Action) -> Action {
        self.domain.copy_action(action)
    }

    fn release_action(&self, action: Action) {
        self.domain.release_action(action);
    }

    fn copy_observation(&self, observation: &Observation) -> Observation {
        self.domain.copy_observation(observation)
    }

    fn release_observation(&self, observation: Observation) {
        self.domain.release_observation(observation);
    }
}
