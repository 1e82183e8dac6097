//! Core value types: actions, featured states and observations, and the
//! shared size descriptors every model instance refers to.

pub mod indexing;

use crate::error::{FbaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Largest number of values a space may have and still be addressed by a flat index
pub const MAX_FLAT_INDEX: usize = i32::MAX as usize;

/// Anything that decomposes into a factored feature vector
pub trait Featured {
    fn feature_values(&self) -> &[usize];
}

/// Discrete action, addressed by its flat index
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Action(pub usize);

impl Action {
    pub fn new(index: usize) -> Self {
        Action(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

/// Observation described by its feature values
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Observation {
    features: Vec<usize>,
}

impl Observation {
    pub fn new(features: Vec<usize>) -> Self {
        Observation { features }
    }

    /// Observation of a domain with a single observation feature
    pub fn single(value: usize) -> Self {
        Observation { features: vec![value] }
    }

    pub fn features(&self) -> &[usize] {
        &self.features
    }
}

impl Featured for Observation {
    fn feature_values(&self) -> &[usize] {
        &self.features
    }
}

/// Domain state described by its feature values
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactoredState {
    features: Vec<usize>,
}

impl FactoredState {
    pub fn new(features: Vec<usize>) -> Self {
        FactoredState { features }
    }

    pub fn features(&self) -> &[usize] {
        &self.features
    }

    pub fn features_mut(&mut self) -> &mut [usize] {
        &mut self.features
    }
}

impl Featured for FactoredState {
    fn feature_values(&self) -> &[usize] {
        &self.features
    }
}

/// Sizes of the flat state, action and observation spaces
///
/// `states` and `observations` saturate at `usize::MAX` for spaces too large to count.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSize {
    pub states: usize,
    pub actions: usize,
    pub observations: usize,
}

/// Cardinality of every state and observation feature
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSizes {
    pub state: Vec<usize>,
    pub observation: Vec<usize>,
}

/// Mixed-radix strides of the state and observation feature vectors
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexingSteps {
    pub state: Vec<usize>,
    pub observation: Vec<usize>,
}

/// How composite indices of a space are represented
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Addressing {
    /// One radix-projected integer
    Flat,
    /// The feature digits themselves
    Factored,
}

/// Index of a state or observation, in the addressing mode of its space
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompositeIndex {
    Flat(usize),
    Features(Vec<usize>),
}

impl fmt::Display for CompositeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompositeIndex::Flat(i) => write!(f, "{}", i),
            CompositeIndex::Features(values) => {
                let digits: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", digits.join("+"))
            }
        }
    }
}

/// Read-only description of a factored domain, shared by every model over it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainDescriptor {
    size: DomainSize,
    features: FeatureSizes,
    steps: IndexingSteps,
    state_addressing: Addressing,
    observation_addressing: Addressing,
}

fn validate_features(name: &str, sizes: &[usize]) -> Result<()> {
    if sizes.is_empty() {
        return Err(FbaError::invalid_parameter(name, "needs at least one feature"));
    }
    if sizes.iter().any(|&s| s == 0) {
        return Err(FbaError::invalid_parameter(name, "feature cardinalities must be positive"));
    }
    Ok(())
}

fn default_addressing(count: Option<usize>) -> Addressing {
    match count {
        Some(n) if n <= MAX_FLAT_INDEX => Addressing::Flat,
        _ => Addressing::Factored,
    }
}

impl DomainDescriptor {
    /// Builds a descriptor, picking flat addressing for every space that fits `MAX_FLAT_INDEX`
    pub fn new(num_actions: usize, features: FeatureSizes) -> Result<Self> {
        if num_actions == 0 {
            return Err(FbaError::invalid_parameter("num_actions", "must be at least 1"));
        }
        validate_features("state features", &features.state)?;
        validate_features("observation features", &features.observation)?;

        let num_states = indexing::checked_product(&features.state);
        let num_observations = indexing::checked_product(&features.observation);

        Ok(DomainDescriptor {
            size: DomainSize {
                states: num_states.unwrap_or(usize::MAX),
                actions: num_actions,
                observations: num_observations.unwrap_or(usize::MAX),
            },
            steps: IndexingSteps {
                state: indexing::step_sizes(&features.state),
                observation: indexing::step_sizes(&features.observation),
            },
            state_addressing: default_addressing(num_states),
            observation_addressing: default_addressing(num_observations),
            features,
        })
    }

    /// Overrides the addressing modes; flat addressing must fit `MAX_FLAT_INDEX`
    pub fn with_addressing(mut self, state: Addressing, observation: Addressing) -> Result<Self> {
        if state == Addressing::Flat && self.size.states > MAX_FLAT_INDEX {
            return Err(FbaError::invalid_parameter(
                "state addressing".to_string(),
                format!("{} states do not fit a flat index (at most {})", self.size.states, MAX_FLAT_INDEX),
            ));
        }
        if observation == Addressing::Flat && self.size.observations > MAX_FLAT_INDEX {
            return Err(FbaError::invalid_parameter(
                "observation addressing".to_string(),
                format!(
                    "{} observations do not fit a flat index (at most {})",
                    self.size.observations, MAX_FLAT_INDEX
                ),
            ));
        }
        self.state_addressing = state;
        self.observation_addressing = observation;
        Ok(self)
    }

    /// Descriptor of the abstract domain that only keeps `feature_subset` of the state features
    pub fn abstraction(&self, feature_subset: &[usize]) -> Result<Self> {
        if feature_subset.is_empty() {
            return Err(FbaError::invalid_parameter("feature_subset", "must not be empty"));
        }
        if feature_subset.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FbaError::invalid_parameter("feature_subset", "must be strictly increasing"));
        }
        if let Some(&f) = feature_subset.iter().find(|&&f| f >= self.features.state.len()) {
            return Err(FbaError::invalid_parameter(
                "feature_subset".to_string(),
                format!("feature {} out of range {}", f, self.features.state.len()),
            ));
        }

        DomainDescriptor::new(
            self.size.actions,
            FeatureSizes {
                state: feature_subset.iter().map(|&f| self.features.state[f]).collect(),
                observation: self.features.observation.clone(),
            },
        )
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn size(&self) -> &DomainSize {
        &self.size
    }

    pub fn feature_sizes(&self) -> &FeatureSizes {
        &self.features
    }

    pub fn steps(&self) -> &IndexingSteps {
        &self.steps
    }

    pub fn num_actions(&self) -> usize {
        self.size.actions
    }

    pub fn num_state_features(&self) -> usize {
        self.features.state.len()
    }

    pub fn num_observation_features(&self) -> usize {
        self.features.observation.len()
    }

    pub fn state_addressing(&self) -> Addressing {
        self.state_addressing
    }

    pub fn observation_addressing(&self) -> Addressing {
        self.observation_addressing
    }

    /// Number of states when the state space is flat-addressable
    pub fn flat_num_states(&self) -> Option<usize> {
        (self.state_addressing == Addressing::Flat).then_some(self.size.states)
    }

    /// Number of observations when the observation space is flat-addressable
    pub fn flat_num_observations(&self) -> Option<usize> {
        (self.observation_addressing == Addressing::Flat).then_some(self.size.observations)
    }

    pub fn state_index(&self, features: &[usize]) -> CompositeIndex {
        compose(features, &self.features.state, self.state_addressing)
    }

    pub fn observation_index(&self, features: &[usize]) -> CompositeIndex {
        compose(features, &self.features.observation, self.observation_addressing)
    }

    pub fn state_features(&self, index: &CompositeIndex) -> Vec<usize> {
        decompose(index, &self.steps.state)
    }

    pub fn observation_features(&self, index: &CompositeIndex) -> Vec<usize> {
        decompose(index, &self.steps.observation)
    }

    pub fn assert_legal_state(&self, features: &[usize]) {
        assert_legal("state", features, &self.features.state);
    }

    pub fn assert_legal_observation(&self, features: &[usize]) {
        assert_legal("observation", features, &self.features.observation);
    }

    pub fn assert_legal_action(&self, action: Action) {
        assert!(
            action.index() < self.size.actions,
            "action {} out of range {}",
            action.index(),
            self.size.actions
        );
    }
}

fn compose(features: &[usize], sizes: &[usize], addressing: Addressing) -> CompositeIndex {
    match addressing {
        Addressing::Flat => CompositeIndex::Flat(indexing::project(features, sizes)),
        Addressing::Factored => CompositeIndex::Features(features.to_vec()),
    }
}

fn decompose(index: &CompositeIndex, steps: &[usize]) -> Vec<usize> {
    match index {
        CompositeIndex::Flat(i) => indexing::project_using_step_sizes(*i, steps),
        CompositeIndex::Features(values) => {
            assert_eq!(values.len(), steps.len(), "feature index of wrong length");
            values.clone()
        }
    }
}

fn assert_legal(what: &str, features: &[usize], sizes: &[usize]) {
    assert_eq!(features.len(), sizes.len(), "{} has the wrong number of features", what);
    for (f, (&value, &size)) in features.iter().zip(sizes).enumerate() {
        assert!(value < size, "{} feature {} value {} out of range {}", what, f, value, size);
    }
}
