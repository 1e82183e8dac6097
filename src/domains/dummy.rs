//! Trivial domains: a single-state dummy and a linear counter.

use crate::error::Result;
use crate::model::{ConditionalTableNode, FactoredModel, Structure};
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp, Transition};
use crate::types::{indexing, Action, DomainDescriptor, FactoredState, FeatureSizes, Observation};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

/// One state, one action, one observation; every step pays 1
#[derive(Clone, Debug)]
pub struct DummyDomain {
    descriptor: Arc<DomainDescriptor>,
}

impl DummyDomain {
    pub fn new() -> Result<Self> {
        let descriptor = DomainDescriptor::new(
            1,
            FeatureSizes {
                state: vec![1],
                observation: vec![1],
            },
        )?;
        debug!("initiated dummy domain");

        Ok(DummyDomain {
            descriptor: descriptor.shared(),
        })
    }
}

impl Pomdp for DummyDomain {
    type State = FactoredState;

    fn num_actions(&self) -> usize {
        1
    }

    fn sample_start_state<R: Rng + ?Sized>(&self, _rng: &mut R) -> FactoredState {
        FactoredState::new(vec![0])
    }

    fn step<R: Rng + ?Sized>(&self, state: &mut FactoredState, action: Action, _rng: &mut R) -> Transition {
        self.descriptor.assert_legal_state(state.features());
        self.descriptor.assert_legal_action(action);

        Transition {
            observation: Observation::single(0),
            reward: 1.0,
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

impl FactoredDomain for DummyDomain {
    fn descriptor(&self) -> &Arc<DomainDescriptor> {
        &self.descriptor
    }

    fn state_prior(&self) -> Result<Vec<f64>> {
        Ok(vec![1.0])
    }

    fn reward(&self, _state: &FactoredState, _action: Action, _new_state: &FactoredState) -> f64 {
        1.0
    }

    fn terminal(&self, _state: &FactoredState, _action: Action, _new_state: &FactoredState) -> bool {
        false
    }
}

/// Accurate and confident prior of the dummy domain
///
/// Every node starts with `counts` on its only outcome.
#[derive(Clone, Debug)]
pub struct DummyPrior {
    descriptor: Arc<DomainDescriptor>,
    counts: f64,
}

impl DummyPrior {
    pub const DEFAULT_COUNTS: f64 = 100.0;

    pub fn new(domain: &DummyDomain, counts: f64) -> Self {
        DummyPrior {
            descriptor: Arc::clone(domain.descriptor()),
            counts,
        }
    }

    /// Model with the given parents, every configuration holding `counts`
    fn model_with(&self, structure: &Structure) -> FactoredModel {
        let mut model = FactoredModel::new(Arc::clone(&self.descriptor));
        let state_sizes = self.descriptor.feature_sizes().state.clone();

        for (a, (transition, observation)) in structure.transition.iter().zip(&structure.observation).enumerate() {
            for (f, parents) in transition.iter().enumerate() {
                model.reset_transition_node(Action(a), f, parents.clone());
                fill(model.transition_node_mut(Action(a), f), &state_sizes, self.counts);
            }
            for (f, parents) in observation.iter().enumerate() {
                model.reset_observation_node(Action(a), f, parents.clone());
                fill(model.observation_node_mut(Action(a), f), &state_sizes, self.counts);
            }
        }
        model
    }
}

/// Sets every parent configuration of `node` to `counts` per outcome
pub(crate) fn fill(node: &mut ConditionalTableNode, state_sizes: &[usize], counts: f64) {
    let ranges: Vec<usize> = node.parents().iter().map(|&p| state_sizes[p]).collect();
    let mut values = vec![0; ranges.len()];
    let distribution = vec![counts; node.output_size()];
    loop {
        node.set_dirichlet(&values, &distribution);
        if indexing::increment(&mut values, &ranges) {
            break;
        }
    }
}

impl FactoredPrior for DummyPrior {
    fn sample_model<R: Rng + ?Sized>(&self, _rng: &mut R) -> FactoredModel {
        self.model_with(&Structure {
            transition: vec![vec![vec![]]],
            observation: vec![vec![vec![]]],
        })
    }

    fn fully_connected_model(&self) -> FactoredModel {
        self.model_with(&Structure {
            transition: vec![vec![vec![0]]],
            observation: vec![vec![vec![0]]],
        })
    }

    fn compute_prior_model(&self, structure: &Structure) -> Result<FactoredModel> {
        Ok(self.model_with(structure))
    }

    /// The dummy has nothing to learn about its structure
    fn mutate<R: Rng + ?Sized>(&self, structure: Structure, _rng: &mut R) -> Structure {
        structure
    }
}

/// Counter on the natural numbers: forward increments, backward decrements
///
/// Always observes 0 and pays 1, so it is fully deterministic apart from the
/// actions taken. Not factored; it exercises the plain [`Pomdp`] contract.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinearDummyDomain;

impl LinearDummyDomain {
    pub const FORWARD: Action = Action(0);
    pub const BACKWARD: Action = Action(1);

    pub fn new() -> Self {
        debug!("initiated linear dummy domain");
        LinearDummyDomain
    }

    /// Actions that keep the counter non-negative
    pub fn legal_actions(&self, state: usize) -> Vec<Action> {
        if state == 0 {
            vec![Self::FORWARD]
        } else {
            vec![Self::FORWARD, Self::BACKWARD]
        }
    }
}

impl Pomdp for LinearDummyDomain {
    type State = usize;

    fn num_actions(&self) -> usize {
        2
    }

    fn sample_start_state<R: Rng + ?Sized>(&self, _rng: &mut R) -> usize {
        0
    }

    fn step<R: Rng + ?Sized>(&self, state: &mut usize, action: Action, _rng: &mut R) -> Transition {
        assert!(action.index() < 2, "action {} out of range 2", action.index());

        if action == Self::BACKWARD {
            assert!(*state > 0, "cannot move backward from 0");
            *state -= 1;
        } else {
            *state += 1;
        }

        Transition {
            observation: Observation::single(0),
            reward: 1.0,
            terminal: false,
        }
    }

    fn observation_probability<R: Rng + ?Sized>(
        &self,
        observation: &Observation,
        _action: Action,
        _new_state: &usize,
        _rng: &mut R,
    ) -> f64 {
        if observation.features() == [0] {
            1.0
        } else {
            0.0
        }
    }

    fn copy_state(&self, state: &usize) -> usize {
        *state
    }

    fn release_state(&self, _state: usize) {}
}
