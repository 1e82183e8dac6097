//! Factored tiger: the classic tiger problem padded with irrelevant binary
//! state features, so that the observation structure has to be learned.

use crate::error::{FbaError, Result};
use crate::model::{ConditionalTableNode, FactoredModel, Structure};
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp, StructurePrior, Transition};
use crate::types::{indexing, Action, DomainDescriptor, FactoredState, FeatureSizes, Observation};
use rand::Rng;
use std::sync::Arc;
use tracing::debug;

/// Whether opening a door ends the episode
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TigerKind {
    Episodic,
    Continuous,
}

/// Tiger location (feature 0) plus `size` irrelevant binary features
#[derive(Clone, Debug)]
pub struct FactoredTiger {
    kind: TigerKind,
    descriptor: Arc<DomainDescriptor>,
}

impl FactoredTiger {
    pub const OPEN_LEFT: Action = Action(0);
    pub const OPEN_RIGHT: Action = Action(1);
    pub const LISTEN: Action = Action(2);

    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;

    pub const LOCATION_FEATURE: usize = 0;

    /// Probability that listening reports the correct door
    pub const LISTEN_ACCURACY: f64 = 0.85;

    pub fn new(kind: TigerKind, num_irrelevant_features: usize) -> Result<Self> {
        if num_irrelevant_features < 1 {
            return Err(FbaError::invalid_parameter(
                "size".to_string(),
                format!(
                    "factored tiger needs at least 1 irrelevant feature, got {}",
                    num_irrelevant_features
                ),
            ));
        }

        let descriptor = DomainDescriptor::new(
            3,
            FeatureSizes {
                state: vec![2; num_irrelevant_features + 1],
                observation: vec![2],
            },
        )?;
        debug!(?kind, num_irrelevant_features, "initiated factored tiger");

        Ok(FactoredTiger {
            kind,
            descriptor: descriptor.shared(),
        })
    }

    pub fn kind(&self) -> TigerKind {
        self.kind
    }

    pub fn tiger_location(state: &FactoredState) -> usize {
        state.features()[Self::LOCATION_FEATURE]
    }
}

impl Pomdp for FactoredTiger {
    type State = FactoredState;

    fn num_actions(&self) -> usize {
        3
    }

    /// Every feature uniformly at random
    fn sample_start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> FactoredState {
        let features = self
            .descriptor
            .feature_sizes()
            .state
            .iter()
            .map(|&size| rng.gen_range(0..size))
            .collect();
        FactoredState::new(features)
    }

    fn step<R: Rng + ?Sized>(&self, state: &mut FactoredState, action: Action, rng: &mut R) -> Transition {
        self.descriptor.assert_legal_state(state.features());
        self.descriptor.assert_legal_action(action);

        let old = state.clone();
        let observation = if action == Self::LISTEN {
            let location = Self::tiger_location(state);
            if rng.gen::<f64>() < Self::LISTEN_ACCURACY {
                location
            } else {
                1 - location
            }
        } else {
            *state = self.sample_start_state(rng);
            rng.gen_range(0..2)
        };

        Transition {
            observation: Observation::single(observation),
            reward: self.reward(&old, action, state),
            terminal: self.terminal(&old, action, state),
        }
    }

    fn observation_probability<R: Rng + ?Sized>(
        &self,
        observation: &Observation,
        action: Action,
        new_state: &FactoredState,
        _rng: &mut R,
    ) -> f64 {
        if action != Self::LISTEN {
            0.5
        } else if observation.features()[0] == Self::tiger_location(new_state) {
            Self::LISTEN_ACCURACY
        } else {
            1.0 - Self::LISTEN_ACCURACY
        }
    }

    fn copy_state(&self, state: &FactoredState) -> FactoredState {
        state.clone()
    }

    fn release_state(&self, _state: FactoredState) {}
}

impl FactoredDomain for FactoredTiger {
    fn descriptor(&self) -> &Arc<DomainDescriptor> {
        &self.descriptor
    }

    fn state_prior(&self) -> Result<Vec<f64>> {
        let num_states = self.descriptor.flat_num_states().ok_or_else(|| {
            FbaError::dimension_mismatch("flat-addressable tiger states", "factored tiger states")
        })?;
        Ok(vec![1.0 / num_states as f64; num_states])
    }

    /// Opening the door the tiger is at pays 10, the other door costs 100
    fn reward(&self, state: &FactoredState, action: Action, _new_state: &FactoredState) -> f64 {
        if action == Self::LISTEN {
            -1.0
        } else if action.index() == Self::tiger_location(state) {
            10.0
        } else {
            -100.0
        }
    }

    fn terminal(&self, _state: &FactoredState, action: Action, _new_state: &FactoredState) -> bool {
        action != Self::LISTEN && self.kind == TigerKind::Episodic
    }
}

/// Prior of the factored tiger
///
/// Transitions are known with high confidence. The parents of the listening
/// observation node are the unknown part: the tiger location is the only
/// informative one.
#[derive(Clone, Debug)]
pub struct FactoredTigerPrior {
    descriptor: Arc<DomainDescriptor>,
    structure_prior: StructurePrior,
    accurate_count: f64,
    inaccurate_count: f64,
    uniform_count: f64,
    transition_nodes: Vec<ConditionalTableNode>,
    unstructured_observation_nodes: Vec<ConditionalTableNode>,
    correct_observation_nodes: Vec<ConditionalTableNode>,
    fully_connected_observation_nodes: Vec<ConditionalTableNode>,
}

impl FactoredTigerPrior {
    /// Counts of the parts of the model that are known
    pub const KNOWN_COUNTS: f64 = 5000.0;

    pub fn new(domain: &FactoredTiger, noise: f64, counts_total: f64, structure_prior: StructurePrior) -> Result<Self> {
        if !(noise > -0.15 && noise <= 0.3) {
            return Err(FbaError::invalid_parameter(
                "noise".to_string(),
                format!("must lie in (-0.15, 0.3], is {}", noise),
            ));
        }

        let descriptor = Arc::clone(domain.descriptor());
        let num_features = descriptor.num_state_features();
        let mut model = FactoredModel::new(Arc::clone(&descriptor));

        // listening keeps every feature
        for f in 0..num_features {
            model.reset_transition_node(FactoredTiger::LISTEN, f, vec![f]);
            let node = model.transition_node_mut(FactoredTiger::LISTEN, f);
            for value in 0..2 {
                *node.count_mut(&[value], value) = Self::KNOWN_COUNTS;
            }
        }

        // opening a door resets every feature uniformly and hears noise
        for open in [FactoredTiger::OPEN_LEFT, FactoredTiger::OPEN_RIGHT] {
            for f in 0..num_features {
                model
                    .transition_node_mut(open, f)
                    .set_dirichlet(&[], &[Self::KNOWN_COUNTS; 2]);
            }
            model
                .observation_node_mut(open, 0)
                .set_dirichlet(&[], &[Self::KNOWN_COUNTS; 2]);
        }

        let mut prior = FactoredTigerPrior {
            descriptor,
            structure_prior,
            accurate_count: (FactoredTiger::LISTEN_ACCURACY - noise) * counts_total,
            inaccurate_count: (1.0 - FactoredTiger::LISTEN_ACCURACY + noise) * counts_total,
            uniform_count: 0.5 * counts_total,
            transition_nodes: model.transition_nodes().to_vec(),
            unstructured_observation_nodes: model.observation_nodes().to_vec(),
            correct_observation_nodes: Vec::new(),
            fully_connected_observation_nodes: Vec::new(),
        };

        prior.set_observation_model(&mut model, vec![FactoredTiger::LOCATION_FEATURE]);
        prior.correct_observation_nodes = model.observation_nodes().to_vec();

        prior.set_observation_model(&mut model, (0..num_features).collect());
        prior.fully_connected_observation_nodes = model.observation_nodes().to_vec();

        debug!(noise, counts_total, %structure_prior, "initiated factored tiger prior");
        Ok(prior)
    }

    pub fn structure_prior(&self) -> StructurePrior {
        self.structure_prior
    }

    fn model_with(&self, observation_nodes: &[ConditionalTableNode]) -> FactoredModel {
        FactoredModel::from_nodes(
            Arc::clone(&self.descriptor),
            self.transition_nodes.clone(),
            observation_nodes.to_vec(),
        )
    }

    /// Gives the listening observation node `parents` and its prior counts
    ///
    /// With the tiger location among the parents the counts are informed,
    /// otherwise uniform.
    fn set_observation_model(&self, model: &mut FactoredModel, parents: Vec<usize>) {
        let informed = parents.first() == Some(&FactoredTiger::LOCATION_FEATURE);
        let ranges = vec![2; parents.len()];
        let mut values = vec![0; parents.len()];

        model.reset_observation_node(FactoredTiger::LISTEN, 0, parents);
        let node = model.observation_node_mut(FactoredTiger::LISTEN, 0);

        loop {
            let counts = if informed {
                let mut counts = [self.inaccurate_count; 2];
                counts[values[0]] = self.accurate_count;
                counts
            } else {
                [self.uniform_count; 2]
            };
            node.set_dirichlet(&values, &counts);

            if indexing::increment(&mut values, &ranges) {
                break;
            }
        }
    }

    /// Every state feature with probability 1/2, forcing the location in for match-uniform
    fn sample_noisy_parents<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<usize> {
        let mut parents: Vec<usize> = (0..self.descriptor.num_state_features())
            .filter(|_| rng.gen_bool(0.5))
            .collect();

        if self.structure_prior == StructurePrior::MatchUniform
            && parents.first() != Some(&FactoredTiger::LOCATION_FEATURE)
        {
            parents.insert(0, FactoredTiger::LOCATION_FEATURE);
        }
        parents
    }

    fn assert_shape(&self, structure: &Structure) {
        let num_actions = self.descriptor.num_actions();
        assert_eq!(structure.transition.len(), num_actions);
        assert_eq!(structure.observation.len(), num_actions);
        for a in 0..num_actions {
            assert_eq!(structure.transition[a].len(), self.descriptor.num_state_features());
            assert_eq!(structure.observation[a].len(), self.descriptor.num_observation_features());
            assert!(structure.transition[a].iter().all(|parents| parents.len() <= 1));
        }
    }
}

impl FactoredPrior for FactoredTigerPrior {
    fn sample_model<R: Rng + ?Sized>(&self, rng: &mut R) -> FactoredModel {
        match self.structure_prior {
            StructurePrior::MatchCounts => self.model_with(&self.correct_observation_nodes),
            StructurePrior::FullyConnected => self.fully_connected_model(),
            StructurePrior::Uniform | StructurePrior::MatchUniform => {
                let mut model = self.model_with(&self.unstructured_observation_nodes);
                self.set_observation_model(&mut model, self.sample_noisy_parents(rng));
                model
            }
        }
    }

    fn fully_connected_model(&self) -> FactoredModel {
        self.model_with(&self.fully_connected_observation_nodes)
    }

    fn compute_prior_model(&self, structure: &Structure) -> Result<FactoredModel> {
        self.assert_shape(structure);

        let mut model = self.model_with(&self.unstructured_observation_nodes);
        let parents = structure.observation[FactoredTiger::LISTEN.index()][0].clone();
        self.set_observation_model(&mut model, parents);
        Ok(model)
    }

    /// Flips one edge into the listening observation node
    fn mutate<R: Rng + ?Sized>(&self, mut structure: Structure, rng: &mut R) -> Structure {
        self.assert_shape(&structure);

        let edge = Structure::flip_random_edge(
            &mut structure.observation[FactoredTiger::LISTEN.index()][0],
            self.descriptor.num_state_features(),
            rng,
        );
        debug!(edge, "mutated listening observation parents");
        structure
    }
}
