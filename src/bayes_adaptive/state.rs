use crate::model::FactoredModel;
use crate::types::{CompositeIndex, FactoredState, Featured};

/// Hyper-state of the Bayes-adaptive POMDP: a domain state paired with the
/// model the particle believes in
#[derive(Clone, Debug, PartialEq)]
pub struct BaState {
    pub domain_state: FactoredState,
    pub model: FactoredModel,
}

impl BaState {
    pub fn new(domain_state: FactoredState, model: FactoredModel) -> Self {
        BaState { domain_state, model }
    }

    pub fn domain_state(&self) -> &FactoredState {
        &self.domain_state
    }

    pub fn model(&self) -> &FactoredModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut FactoredModel {
        &mut self.model
    }

    /// Index of the domain state in the addressing mode of the domain
    pub fn index(&self) -> CompositeIndex {
        self.model.descriptor().state_index(self.domain_state.features())
    }
}

impl Featured for BaState {
    fn feature_values(&self) -> &[usize] {
        self.domain_state.features()
    }
}
