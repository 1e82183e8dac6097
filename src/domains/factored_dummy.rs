//! Deterministic `n x n` grid with a known factored structure.

use crate::error::{FbaError, Result};
use crate::model::{FactoredModel, Structure};
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp, Transition};
use crate::types::{indexing, Action, DomainDescriptor, FactoredState, FeatureSizes, Observation};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

/// Grid whose state index is `y * n + x`; up moves `x`, right moves `y`
///
/// Starts in the bottom-left corner, every step costs 1 until the agent sits
/// in the top-right corner. There is a single, uninformative observation.
#[derive(Clone, Debug)]
pub struct FactoredDummyDomain {
    size: usize,
    descriptor: Arc<DomainDescriptor>,
}

impl FactoredDummyDomain {
    pub const UP: Action = Action(0);
    pub const RIGHT: Action = Action(1);

    /// Feature holding the column, the most significant digit of the index
    pub const Y_FEATURE: usize = 0;
    /// Feature holding the row
    pub const X_FEATURE: usize = 1;

    pub fn new(size: usize) -> Result<Self> {
        if size < 1 {
            return Err(FbaError::invalid_parameter(
                "size".to_string(),
                format!("cannot create a factored dummy grid of size {}", size),
            ));
        }

        let descriptor = DomainDescriptor::new(
            2,
            FeatureSizes {
                state: vec![size, size],
                observation: vec![1],
            },
        )?;
        debug!(size, "initiated factored dummy domain");

        Ok(FactoredDummyDomain {
            size,
            descriptor: descriptor.shared(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Flat index reached from `index` under `action`
    pub fn next_index(&self, index: usize, action: Action) -> usize {
        let n = self.size;
        match action {
            Self::UP if (index + 1) % n != 0 => index + 1,
            Self::RIGHT if index < (n - 1) * n => index + n,
            _ => index,
        }
    }

    fn index_of(&self, state: &FactoredState) -> usize {
        indexing::project(state.features(), &self.descriptor.feature_sizes().state)
    }

    fn state_of(&self, index: usize) -> FactoredState {
        FactoredState::new(indexing::project_using_step_sizes(index, &self.descriptor.steps().state))
    }
}

impl Pomdp for FactoredDummyDomain {
    type State = FactoredState;

    fn num_actions(&self) -> usize {
        2
    }

    fn sample_start_state<R: Rng + ?Sized>(&self, _rng: &mut R) -> FactoredState {
        self.state_of(0)
    }

    fn step<R: Rng + ?Sized>(&self, state: &mut FactoredState, action: Action, _rng: &mut R) -> Transition {
        self.descriptor.assert_legal_state(state.features());
        self.descriptor.assert_legal_action(action);

        let old = state.clone();
        *state = self.state_of(self.next_index(self.index_of(state), action));

        Transition {
            observation: Observation::single(0),
            reward: self.reward(&old, action, state),
            terminal: false,
        }
    }

    fn observation_probability<R: Rng + ?Sized>(
        &self,
        _observation: &Observation,
        _action: Action,
        _new_state: &FactoredState,
        _rng: &mut R,
    ) -> f64 {
        1.0
    }

    fn copy_state(&self, state: &FactoredState) -> FactoredState {
        state.clone()
    }

    fn release_state(&self, _state: FactoredState) {}
}

impl FactoredDomain for FactoredDummyDomain {
    fn descriptor(&self) -> &Arc<DomainDescriptor> {
        &self.descriptor
    }

    fn state_prior(&self) -> Result<Vec<f64>> {
        let mut prior = vec![0.0; self.size * self.size];
        prior[0] = 1.0;
        Ok(prior)
    }

    fn reward(&self, _state: &FactoredState, _action: Action, new_state: &FactoredState) -> f64 {
        if self.index_of(new_state) + 1 < self.size * self.size {
            -1.0
        } else {
            0.0
        }
    }

    fn terminal(&self, _state: &FactoredState, _action: Action, _new_state: &FactoredState) -> bool {
        false
    }
}

/// Exact prior of the grid: counts enumerate every deterministic transition once
#[derive(Clone, Debug)]
pub struct FactoredDummyPrior {
    correct: FactoredModel,
    fully_connected: FactoredModel,
}

impl FactoredDummyPrior {
    pub fn new(domain: &FactoredDummyDomain) -> Self {
        let descriptor = domain.descriptor();
        let (x, y) = (FactoredDummyDomain::X_FEATURE, FactoredDummyDomain::Y_FEATURE);

        let mut correct = FactoredModel::new(Arc::clone(descriptor));
        let mut fully_connected = FactoredModel::new(Arc::clone(descriptor));
        for action in [FactoredDummyDomain::UP, FactoredDummyDomain::RIGHT] {
            correct.reset_transition_node(action, y, vec![y]);
            correct.reset_transition_node(action, x, vec![x]);
            fully_connected.reset_transition_node(action, y, vec![y, x]);
            fully_connected.reset_transition_node(action, x, vec![y, x]);
        }

        let observation = [0];
        for index in 0..domain.size() * domain.size() {
            let state = domain.state_of(index);
            for action in [FactoredDummyDomain::UP, FactoredDummyDomain::RIGHT] {
                let next = domain.state_of(domain.next_index(index, action));
                correct.increment_counts_of(state.features(), action, &observation, next.features(), 1.0);
                fully_connected.increment_counts_of(state.features(), action, &observation, next.features(), 1.0);
            }
        }

        FactoredDummyPrior { correct, fully_connected }
    }
}

impl FactoredPrior for FactoredDummyPrior {
    fn sample_model<R: Rng + ?Sized>(&self, _rng: &mut R) -> FactoredModel {
        self.correct.clone()
    }

    fn fully_connected_model(&self) -> FactoredModel {
        self.fully_connected.clone()
    }

    /// The structure of the grid is known, mutation leaves it untouched
    fn mutate<R: Rng + ?Sized>(&self, structure: Structure, _rng: &mut R) -> Structure {
        structure
    }
}
