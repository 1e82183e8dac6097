//! Factored (DBN) dynamics model: one conditional table per action and feature.

use super::node::ConditionalTableNode;
use super::structure::Structure;
use crate::error::{FbaError, Result};
use crate::sampling::SampleMethod;
use crate::types::{indexing, Action, CompositeIndex, DomainDescriptor};
use ndarray::Array3;
use rand::Rng;
use std::fmt;
use std::sync::Arc;

/// Transition and observation dynamics as Dirichlet-count tables
///
/// Transition node `(a, f)` predicts the next value of state feature `f`,
/// observation node `(a, f)` predicts observation feature `f` from the new
/// state. Both read their parents from the state features. The size
/// descriptor is shared and never mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct FactoredModel {
    descriptor: Arc<DomainDescriptor>,
    transition_nodes: Vec<ConditionalTableNode>,
    observation_nodes: Vec<ConditionalTableNode>,
}

impl FactoredModel {
    /// Model without edges and with zero counts
    pub fn new(descriptor: Arc<DomainDescriptor>) -> Self {
        let sizes = descriptor.feature_sizes();

        let transition_nodes = (0..descriptor.num_actions())
            .flat_map(|_| {
                sizes
                    .state
                    .iter()
                    .map(|&size| ConditionalTableNode::new(&sizes.state, vec![], size))
            })
            .collect();
        let observation_nodes = (0..descriptor.num_actions())
            .flat_map(|_| {
                sizes
                    .observation
                    .iter()
                    .map(|&size| ConditionalTableNode::new(&sizes.state, vec![], size))
            })
            .collect();

        FactoredModel {
            descriptor,
            transition_nodes,
            observation_nodes,
        }
    }

    pub fn from_nodes(
        descriptor: Arc<DomainDescriptor>,
        transition_nodes: Vec<ConditionalTableNode>,
        observation_nodes: Vec<ConditionalTableNode>,
    ) -> Self {
        let num_actions = descriptor.num_actions();
        let sizes = descriptor.feature_sizes();
        assert_eq!(transition_nodes.len(), num_actions * sizes.state.len());
        assert_eq!(observation_nodes.len(), num_actions * sizes.observation.len());

        for (i, node) in transition_nodes.iter().enumerate() {
            assert_eq!(node.output_size(), sizes.state[i % sizes.state.len()]);
        }
        for (i, node) in observation_nodes.iter().enumerate() {
            assert_eq!(node.output_size(), sizes.observation[i % sizes.observation.len()]);
        }

        FactoredModel {
            descriptor,
            transition_nodes,
            observation_nodes,
        }
    }

    pub fn descriptor(&self) -> &Arc<DomainDescriptor> {
        &self.descriptor
    }

    pub fn transition_nodes(&self) -> &[ConditionalTableNode] {
        &self.transition_nodes
    }

    pub fn observation_nodes(&self) -> &[ConditionalTableNode] {
        &self.observation_nodes
    }

    pub fn transition_node(&self, action: Action, feature: usize) -> &ConditionalTableNode {
        &self.transition_nodes[self.transition_position(action, feature)]
    }

    pub fn transition_node_mut(&mut self, action: Action, feature: usize) -> &mut ConditionalTableNode {
        let i = self.transition_position(action, feature);
        &mut self.transition_nodes[i]
    }

    pub fn observation_node(&self, action: Action, feature: usize) -> &ConditionalTableNode {
        &self.observation_nodes[self.observation_position(action, feature)]
    }

    pub fn observation_node_mut(&mut self, action: Action, feature: usize) -> &mut ConditionalTableNode {
        let i = self.observation_position(action, feature);
        &mut self.observation_nodes[i]
    }

    /// Replaces a transition node by an empty one with the given parents
    pub fn reset_transition_node(&mut self, action: Action, feature: usize, parents: Vec<usize>) {
        let sizes = self.descriptor.feature_sizes();
        let node = ConditionalTableNode::new(&sizes.state, parents, sizes.state[feature]);
        *self.transition_node_mut(action, feature) = node;
    }

    /// Replaces an observation node by an empty one with the given parents
    pub fn reset_observation_node(&mut self, action: Action, feature: usize, parents: Vec<usize>) {
        let sizes = self.descriptor.feature_sizes();
        let node = ConditionalTableNode::new(&sizes.state, parents, sizes.observation[feature]);
        *self.observation_node_mut(action, feature) = node;
    }

    /// Draws every next-state feature given the current state features
    pub fn sample_state_features<R: Rng + ?Sized>(
        &self,
        state: &[usize],
        action: Action,
        method: SampleMethod,
        rng: &mut R,
    ) -> Vec<usize> {
        self.descriptor.assert_legal_state(state);
        (0..self.descriptor.num_state_features())
            .map(|f| self.transition_node(action, f).sample(state, method, rng))
            .collect()
    }

    pub fn sample_state_index<R: Rng + ?Sized>(
        &self,
        state: &[usize],
        action: Action,
        method: SampleMethod,
        rng: &mut R,
    ) -> CompositeIndex {
        let features = self.sample_state_features(state, action, method, rng);
        self.descriptor.state_index(&features)
    }

    /// Draws every observation feature given the new state features
    pub fn sample_observation_features<R: Rng + ?Sized>(
        &self,
        action: Action,
        new_state: &[usize],
        method: SampleMethod,
        rng: &mut R,
    ) -> Vec<usize> {
        self.descriptor.assert_legal_state(new_state);
        (0..self.descriptor.num_observation_features())
            .map(|f| self.observation_node(action, f).sample(new_state, method, rng))
            .collect()
    }

    pub fn sample_observation_index<R: Rng + ?Sized>(
        &self,
        action: Action,
        new_state: &[usize],
        method: SampleMethod,
        rng: &mut R,
    ) -> CompositeIndex {
        let features = self.sample_observation_features(action, new_state, method, rng);
        self.descriptor.observation_index(&features)
    }

    /// Probability of `observation`, the product over its features
    pub fn observation_probability<R: Rng + ?Sized>(
        &self,
        observation: &[usize],
        action: Action,
        new_state: &[usize],
        method: SampleMethod,
        rng: &mut R,
    ) -> f64 {
        self.descriptor.assert_legal_observation(observation);
        observation
            .iter()
            .enumerate()
            .map(|(f, &value)| {
                self.observation_node(action, f)
                    .sample_multinomial(new_state, method, rng)[value]
            })
            .product()
    }

    /// Adds `amount` to the cells of every node the transition `(s, a, o, s')` touches
    pub fn increment_counts_of(
        &mut self,
        state: &[usize],
        action: Action,
        observation: &[usize],
        new_state: &[usize],
        amount: f64,
    ) {
        self.descriptor.assert_legal_state(state);
        self.descriptor.assert_legal_state(new_state);
        self.descriptor.assert_legal_observation(observation);

        for (f, &value) in new_state.iter().enumerate() {
            self.transition_node_mut(action, f).increment(state, value, amount);
        }
        for (f, &value) in observation.iter().enumerate() {
            self.observation_node_mut(action, f).increment(new_state, value, amount);
        }
    }

    /// Parent lists of every node
    pub fn structure(&self) -> Structure {
        let num_s = self.descriptor.num_state_features();
        let num_o = self.descriptor.num_observation_features();

        Structure {
            transition: self
                .transition_nodes
                .chunks(num_s)
                .map(|nodes| nodes.iter().map(|n| n.parents().to_vec()).collect())
                .collect(),
            observation: self
                .observation_nodes
                .chunks(num_o)
                .map(|nodes| nodes.iter().map(|n| n.parents().to_vec()).collect())
                .collect(),
        }
    }

    /// Model whose nodes are marginalized onto the parents in `structure`
    pub fn marginalize_out(&self, structure: &Structure) -> FactoredModel {
        self.assert_structure_shape(structure);

        let num_s = self.descriptor.num_state_features();
        let num_o = self.descriptor.num_observation_features();

        let transition_nodes = self
            .transition_nodes
            .iter()
            .enumerate()
            .map(|(i, node)| node.marginalize_out(&structure.transition[i / num_s][i % num_s]))
            .collect();
        let observation_nodes = self
            .observation_nodes
            .iter()
            .enumerate()
            .map(|(i, node)| node.marginalize_out(&structure.observation[i / num_o][i % num_o]))
            .collect();

        FactoredModel {
            descriptor: Arc::clone(&self.descriptor),
            transition_nodes,
            observation_nodes,
        }
    }

    /// Reduced model over the state features in `feature_subset`
    ///
    /// Transition nodes of features outside the subset are removed, edges leaving
    /// the subset are dropped before marginalizing onto `structure`, and parents
    /// are renumbered into `abstract_descriptor`'s feature space. With `normalize`
    /// every reduced node keeps the mean per-configuration count total of its
    /// source node.
    pub fn abstract_model(
        &self,
        feature_subset: &[usize],
        structure: &Structure,
        abstract_descriptor: Arc<DomainDescriptor>,
        normalize: bool,
    ) -> FactoredModel {
        self.assert_structure_shape(structure);
        assert!(
            feature_subset.windows(2).all(|w| w[0] < w[1]),
            "feature subset must be strictly increasing"
        );

        let sizes = self.descriptor.feature_sizes();
        let abstract_sizes = abstract_descriptor.feature_sizes();
        assert_eq!(abstract_descriptor.num_actions(), self.descriptor.num_actions());
        assert_eq!(abstract_sizes.observation, sizes.observation);
        assert_eq!(
            abstract_sizes.state,
            feature_subset.iter().map(|&f| sizes.state[f]).collect::<Vec<_>>(),
            "abstract descriptor does not match the feature subset"
        );

        let position_in_subset = |f: usize| {
            feature_subset
                .iter()
                .position(|&g| g == f)
                .unwrap_or_else(|| panic!("feature {} is not in the abstraction", f))
        };
        let reduce = |node: &ConditionalTableNode, parents: &[usize]| {
            let kept: Vec<usize> = parents
                .iter()
                .copied()
                .filter(|p| feature_subset.contains(p))
                .collect();
            let target = node.mean_total();
            let mut reduced = if normalize && target > 0.0 {
                node.marginalize_out_normalized(&kept, target)
            } else {
                node.marginalize_out(&kept)
            };
            reduced.rename_parents(&position_in_subset);
            reduced
        };

        let mut transition_nodes = Vec::with_capacity(self.descriptor.num_actions() * feature_subset.len());
        let mut observation_nodes = Vec::with_capacity(self.observation_nodes.len());
        for a in 0..self.descriptor.num_actions() {
            let action = Action(a);
            for &f in feature_subset {
                transition_nodes.push(reduce(self.transition_node(action, f), &structure.transition[a][f]));
            }
            for f in 0..self.descriptor.num_observation_features() {
                observation_nodes.push(reduce(self.observation_node(action, f), &structure.observation[a][f]));
            }
        }

        FactoredModel::from_nodes(abstract_descriptor, transition_nodes, observation_nodes)
    }

    /// Sum of the per-node BD scores against the matching nodes of `prior`
    pub fn log_bd_score(&self, prior: &FactoredModel) -> f64 {
        assert_eq!(self.transition_nodes.len(), prior.transition_nodes.len());
        assert_eq!(self.observation_nodes.len(), prior.observation_nodes.len());

        self.transition_nodes
            .iter()
            .zip(&prior.transition_nodes)
            .chain(self.observation_nodes.iter().zip(&prior.observation_nodes))
            .map(|(node, prior)| node.log_bd_score(prior))
            .sum()
    }

    /// Expected transition probabilities as a dense `[s][a][s']` table
    pub fn flatten_transition(&self) -> Result<Array3<f64>> {
        let num_states = self.flat_states()?;
        let num_actions = self.descriptor.num_actions();
        let sizes = &self.descriptor.feature_sizes().state;
        let steps = &self.descriptor.steps().state;
        checked_table_size(&[num_states, num_actions, num_states])?;

        let mut table = Array3::zeros((num_states, num_actions, num_states));
        for s in 0..num_states {
            let state = indexing::project_using_step_sizes(s, steps);
            for a in 0..num_actions {
                let marginals: Vec<Vec<f64>> = (0..sizes.len())
                    .map(|f| self.transition_node(Action(a), f).expectation(&state))
                    .collect();
                for_each_joint(&marginals, sizes, |new_state, p| {
                    table[[s, a, new_state]] = p;
                });
            }
        }
        Ok(table)
    }

    /// Expected observation probabilities as a dense `[a][s'][o]` table
    pub fn flatten_observation(&self) -> Result<Array3<f64>> {
        let num_states = self.flat_states()?;
        let num_observations = self.descriptor.flat_num_observations().ok_or_else(|| {
            FbaError::dimension_mismatch("flat-addressable observation space", "factored observation space")
        })?;
        let num_actions = self.descriptor.num_actions();
        let sizes = &self.descriptor.feature_sizes().observation;
        let steps = &self.descriptor.steps().state;
        checked_table_size(&[num_actions, num_states, num_observations])?;

        let mut table = Array3::zeros((num_actions, num_states, num_observations));
        for a in 0..num_actions {
            for s in 0..num_states {
                let new_state = indexing::project_using_step_sizes(s, steps);
                let marginals: Vec<Vec<f64>> = (0..sizes.len())
                    .map(|f| self.observation_node(Action(a), f).expectation(&new_state))
                    .collect();
                for_each_joint(&marginals, sizes, |o, p| {
                    table[[a, s, o]] = p;
                });
            }
        }
        Ok(table)
    }

    /// Dumps every conditional table at info level
    pub fn log(&self) {
        tracing::info!("factored model:\n{}", self);
    }

    fn flat_states(&self) -> Result<usize> {
        self.descriptor.flat_num_states().ok_or_else(|| {
            FbaError::dimension_mismatch("flat-addressable state space", "factored state space")
        })
    }

    fn transition_position(&self, action: Action, feature: usize) -> usize {
        self.descriptor.assert_legal_action(action);
        let num_s = self.descriptor.num_state_features();
        assert!(feature < num_s, "state feature {} out of range {}", feature, num_s);
        action.index() * num_s + feature
    }

    fn observation_position(&self, action: Action, feature: usize) -> usize {
        self.descriptor.assert_legal_action(action);
        let num_o = self.descriptor.num_observation_features();
        assert!(feature < num_o, "observation feature {} out of range {}", feature, num_o);
        action.index() * num_o + feature
    }

    fn assert_structure_shape(&self, structure: &Structure) {
        let num_actions = self.descriptor.num_actions();
        assert_eq!(structure.transition.len(), num_actions, "structure over other actions");
        assert_eq!(structure.observation.len(), num_actions, "structure over other actions");
        for a in 0..num_actions {
            assert_eq!(structure.transition[a].len(), self.descriptor.num_state_features());
            assert_eq!(structure.observation[a].len(), self.descriptor.num_observation_features());
        }
    }
}

impl fmt::Display for FactoredModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let num_s = self.descriptor.num_state_features();
        let num_o = self.descriptor.num_observation_features();

        for (i, node) in self.transition_nodes.iter().enumerate() {
            write!(f, "T(a{}, s{}) {}", i / num_s, i % num_s, node)?;
        }
        for (i, node) in self.observation_nodes.iter().enumerate() {
            write!(f, "O(a{}, o{}) {}", i / num_o, i % num_o, node)?;
        }
        Ok(())
    }
}

/// Calls `visit(flat_index, probability)` for every joint value of independent features
fn for_each_joint(marginals: &[Vec<f64>], sizes: &[usize], mut visit: impl FnMut(usize, f64)) {
    let mut values = vec![0; sizes.len()];
    loop {
        let p: f64 = values
            .iter()
            .enumerate()
            .map(|(f, &v)| marginals[f][v])
            .product();
        visit(indexing::project(&values, sizes), p);

        if indexing::increment(&mut values, sizes) {
            break;
        }
    }
}

fn checked_table_size(shape: &[usize]) -> Result<()> {
    match indexing::checked_product(shape) {
        Some(_) => Ok(()),
        None => Err(FbaError::dimension_mismatch(
            "a table that fits in memory".to_string(),
            format!("shape {:?}", shape),
        )),
    }
}
