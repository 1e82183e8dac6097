//! # Reference Domains
//!
//! Small problems with known dynamics to run and test the Bayes-adaptive
//! machinery against:
//!
//! - [`DummyDomain`]: one state, nothing to learn
//! - [`LinearDummyDomain`]: a counter, for beliefs over plain states
//! - [`FactoredDummyDomain`]: deterministic grid with independent axes
//! - [`FactoredTiger`]: tiger problem with irrelevant features
//!
//! [`make_fbapomdp`] builds the factored ones from an [`FbaConfig`].

pub mod dummy;
pub mod factored_dummy;
pub mod tiger;

pub use dummy::{DummyDomain, DummyPrior, LinearDummyDomain};
pub use factored_dummy::{FactoredDummyDomain, FactoredDummyPrior};
pub use tiger::{FactoredTiger, FactoredTigerPrior, TigerKind};

use crate::bayes_adaptive::Fbapomdp;
use crate::config::FbaConfig;
use crate::error::{FbaError, Result};
use crate::model::{FactoredModel, Structure};
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp, Transition};
use crate::types::{Action, DomainDescriptor, FactoredState, Observation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Names of the domains a configuration can ask for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DomainKind {
    #[default]
    Dummy,
    LinearDummy,
    FactoredDummy,
    EpisodicFactoredTiger,
    ContinuousFactoredTiger,
}

impl DomainKind {
    pub fn name(&self) -> &'static str {
        match self {
            DomainKind::Dummy => "dummy",
            DomainKind::LinearDummy => "linear_dummy",
            DomainKind::FactoredDummy => "factored-dummy",
            DomainKind::EpisodicFactoredTiger => "episodic-factored-tiger",
            DomainKind::ContinuousFactoredTiger => "continuous-factored-tiger",
        }
    }

    pub fn is_tiger(&self) -> bool {
        matches!(
            self,
            DomainKind::EpisodicFactoredTiger | DomainKind::ContinuousFactoredTiger
        )
    }
}

impl FromStr for DomainKind {
    type Err = FbaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dummy" => Ok(DomainKind::Dummy),
            "linear_dummy" => Ok(DomainKind::LinearDummy),
            "factored-dummy" => Ok(DomainKind::FactoredDummy),
            "episodic-factored-tiger" => Ok(DomainKind::EpisodicFactoredTiger),
            "continuous-factored-tiger" => Ok(DomainKind::ContinuousFactoredTiger),
            other => Err(FbaError::UnsupportedDomain(other.to_string())),
        }
    }
}

impl TryFrom<String> for DomainKind {
    type Error = FbaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DomainKind> for String {
    fn from(kind: DomainKind) -> Self {
        kind.name().to_string()
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Any of the factored reference domains
#[derive(Clone, Debug)]
pub enum ReferenceDomain {
    Dummy(DummyDomain),
    FactoredDummy(FactoredDummyDomain),
    Tiger(FactoredTiger),
}

macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            ReferenceDomain::Dummy($inner) => $body,
            ReferenceDomain::FactoredDummy($inner) => $body,
            ReferenceDomain::Tiger($inner) => $body,
        }
    };
}

impl Pomdp for ReferenceDomain {
    type State = FactoredState;

    fn num_actions(&self) -> usize {
        dispatch!(self, d => d.num_actions())
    }

    fn sample_start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> FactoredState {
        dispatch!(self, d => d.sample_start_state(rng))
    }

    fn step<R: Rng + ?Sized>(&self, state: &mut FactoredState, action: Action, rng: &mut R) -> Transition {
        dispatch!(self, d => d.step(state, action, rng))
    }

    fn observation_probability<R: Rng + ?Sized>(
        &self,
        observation: &Observation,
        action: Action,
        new_state: &FactoredState,
        rng: &mut R,
    ) -> f64 {
        dispatch!(self, d => d.observation_probability(observation, action, new_state, rng))
    }

    fn copy_state(&self, state: &FactoredState) -> FactoredState {
        state.clone()
    }

    fn release_state(&self, _state: FactoredState) {}
}

impl FactoredDomain for ReferenceDomain {
    fn descriptor(&self) -> &Arc<DomainDescriptor> {
        dispatch!(self, d => d.descriptor())
    }

    fn state_prior(&self) -> Result<Vec<f64>> {
        dispatch!(self, d => d.state_prior())
    }

    fn reward(&self, state: &FactoredState, action: Action, new_state: &FactoredState) -> f64 {
        dispatch!(self, d => d.reward(state, action, new_state))
    }

    fn terminal(&self, state: &FactoredState, action: Action, new_state: &FactoredState) -> bool {
        dispatch!(self, d => d.terminal(state, action, new_state))
    }
}

/// Prior matching a [`ReferenceDomain`]
#[derive(Clone, Debug)]
pub enum ReferencePrior {
    Dummy(DummyPrior),
    FactoredDummy(FactoredDummyPrior),
    Tiger(FactoredTigerPrior),
}

impl FactoredPrior for ReferencePrior {
    fn sample_model<R: Rng + ?Sized>(&self, rng: &mut R) -> FactoredModel {
        match self {
            ReferencePrior::Dummy(p) => p.sample_model(rng),
            ReferencePrior::FactoredDummy(p) => p.sample_model(rng),
            ReferencePrior::Tiger(p) => p.sample_model(rng),
        }
    }

    fn fully_connected_model(&self) -> FactoredModel {
        match self {
            ReferencePrior::Dummy(p) => p.fully_connected_model(),
            ReferencePrior::FactoredDummy(p) => p.fully_connected_model(),
            ReferencePrior::Tiger(p) => p.fully_connected_model(),
        }
    }

    fn compute_prior_model(&self, structure: &Structure) -> Result<FactoredModel> {
        match self {
            ReferencePrior::Dummy(p) => p.compute_prior_model(structure),
            ReferencePrior::FactoredDummy(p) => p.compute_prior_model(structure),
            ReferencePrior::Tiger(p) => p.compute_prior_model(structure),
        }
    }

    fn mutate<R: Rng + ?Sized>(&self, structure: Structure, rng: &mut R) -> Structure {
        match self {
            ReferencePrior::Dummy(p) => p.mutate(structure, rng),
            ReferencePrior::FactoredDummy(p) => p.mutate(structure, rng),
            ReferencePrior::Tiger(p) => p.mutate(structure, rng),
        }
    }
}

/// Builds the configured domain with its prior, wrapped as a Bayes-adaptive POMDP
pub fn make_fbapomdp(conf: &FbaConfig) -> Result<Fbapomdp<ReferenceDomain, ReferencePrior>> {
    conf.validate()?;

    let size = conf.domain_conf.size;
    let (domain, prior) = match conf.domain_conf.domain {
        DomainKind::Dummy => {
            let domain = DummyDomain::new()?;
            let prior = DummyPrior::new(&domain, DummyPrior::DEFAULT_COUNTS);
            (ReferenceDomain::Dummy(domain), ReferencePrior::Dummy(prior))
        }
        DomainKind::FactoredDummy => {
            let domain = FactoredDummyDomain::new(size)?;
            let prior = FactoredDummyPrior::new(&domain);
            (ReferenceDomain::FactoredDummy(domain), ReferencePrior::FactoredDummy(prior))
        }
        DomainKind::EpisodicFactoredTiger | DomainKind::ContinuousFactoredTiger => {
            let kind = if conf.domain_conf.domain == DomainKind::EpisodicFactoredTiger {
                TigerKind::Episodic
            } else {
                TigerKind::Continuous
            };
            let domain = FactoredTiger::new(kind, size)?;
            let prior = FactoredTigerPrior::new(&domain, conf.noise, conf.counts_total, conf.structure_prior)?;
            (ReferenceDomain::Tiger(domain), ReferencePrior::Tiger(prior))
        }
        DomainKind::LinearDummy => {
            return Err(FbaError::UnsupportedDomain(format!(
                "{} has no factored representation",
                DomainKind::LinearDummy
            )))
        }
    };

    info!(
        domain = %conf.domain_conf.domain,
        size,
        structure_prior = %conf.structure_prior,
        "created factored bayes-adaptive pomdp"
    );
    Ok(Fbapomdp::new(domain, prior, conf.sample_method(), conf.structure_prior))
}
