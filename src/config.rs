//! # Configuration
//!
//! Serde-backed run configuration. Every field has a default so partial JSON
//! documents are accepted; [`FbaConfig::validate`] rejects combinations that
//! cannot be run.
//!
//! ```json
//! {
//!   "domain_conf": { "domain": "episodic-factored-tiger", "size": 2 },
//!   "belief_conf": { "belief": "mh-within-gibbs", "particle_amount": 64, "threshold": -5.0 },
//!   "structure_prior": "match-uniform",
//!   "seed": 7
//! }
//! ```

use crate::belief::BeliefKind;
use crate::belief::StateHistorySampling;
use crate::domains::DomainKind;
use crate::error::{FbaError, Result};
use crate::pomdp::StructurePrior;
use crate::sampling::SampleMethod;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Lowest (exclusive) and highest observation noise the tiger prior accepts
pub const TIGER_NOISE_RANGE: (f64, f64) = (-0.15, 0.3);

/// Which belief tracks the hyper-state and how large it is
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeliefConfig {
    pub belief: BeliefKind,
    pub particle_amount: usize,
    /// Particles bred per update, reinvigoration only
    pub resample_amount: usize,
    /// Log likelihood that triggers structure search, MH-within-Gibbs only
    pub threshold: f64,
    /// State history sampling of MH-within-Gibbs: `""` or `"rs"`
    pub option: String,
    /// Bound on retries per produced sample
    pub max_attempts: usize,
}

impl Default for BeliefConfig {
    fn default() -> Self {
        BeliefConfig {
            belief: BeliefKind::default(),
            particle_amount: 100,
            resample_amount: 0,
            threshold: 0.0,
            option: String::new(),
            max_attempts: 10_000,
        }
    }
}

impl BeliefConfig {
    pub fn validate(&self) -> Result<()> {
        if self.particle_amount < 1 {
            return Err(FbaError::invalid_parameter("particle_amount", "must be at least 1"));
        }
        if self.max_attempts < 1 {
            return Err(FbaError::invalid_parameter("max_attempts", "must be at least 1"));
        }

        if self.belief == BeliefKind::Reinvigoration {
            if self.resample_amount < 1 || self.resample_amount > self.particle_amount {
                return Err(FbaError::invalid_parameter(
                    "resample_amount".to_string(),
                    format!(
                        "must lie in [1, {}] for reinvigoration, is {}",
                        self.particle_amount, self.resample_amount
                    ),
                ));
            }
        } else if self.resample_amount != 0 {
            return Err(FbaError::invalid_parameter(
                "resample_amount".to_string(),
                format!("only used by reinvigoration, not by {}", self.belief),
            ));
        }

        if self.belief == BeliefKind::MhWithinGibbs {
            StateHistorySampling::from_option(&self.option)?;
            if !(self.threshold < 0.0) {
                return Err(FbaError::invalid_parameter(
                    "threshold".to_string(),
                    format!("must be negative for mh-within-gibbs, is {}", self.threshold),
                ));
            }
        } else if !self.option.is_empty() {
            return Err(FbaError::invalid_parameter(
                "option".to_string(),
                format!("only used by mh-within-gibbs, not by {}", self.belief),
            ));
        }

        Ok(())
    }
}

/// Which reference domain to run and its size parameter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    pub domain: DomainKind,
    /// Grid width for the factored dummy, number of irrelevant features for tiger
    pub size: usize,
}

impl Default for DomainConfig {
    fn default() -> Self {
        DomainConfig {
            domain: DomainKind::default(),
            size: 1,
        }
    }
}

/// Complete configuration of a factored Bayes-adaptive run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FbaConfig {
    pub domain_conf: DomainConfig,
    pub belief_conf: BeliefConfig,
    /// Shifts the prior listening accuracy of the tiger prior
    pub noise: f64,
    /// Total pseudo-count of uncertain prior distributions
    pub counts_total: f64,
    /// `0` draws models from their Dirichlets, anything else uses expectations
    pub bayes_sample_method: i64,
    pub structure_prior: StructurePrior,
    pub seed: Option<u64>,
}

impl Default for FbaConfig {
    fn default() -> Self {
        FbaConfig {
            domain_conf: DomainConfig::default(),
            belief_conf: BeliefConfig::default(),
            noise: 0.0,
            counts_total: 10_000.0,
            bayes_sample_method: 1,
            structure_prior: StructurePrior::default(),
            seed: None,
        }
    }
}

impl FbaConfig {
    /// Parses and validates a JSON document
    ///
    /// Unknown domain, belief and structure prior names surface as their own
    /// error kinds rather than as serialization errors.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        check_tags(&value)?;

        let config: FbaConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.belief_conf.validate()?;

        if !(self.counts_total > 0.0) {
            return Err(FbaError::invalid_parameter(
                "counts_total".to_string(),
                format!("must be positive, is {}", self.counts_total),
            ));
        }

        if self.domain_conf.domain.is_tiger() {
            let (low, high) = TIGER_NOISE_RANGE;
            if !(self.noise > low && self.noise <= high) {
                return Err(FbaError::invalid_parameter(
                    "noise".to_string(),
                    format!("must lie in ({}, {}], is {}", low, high, self.noise),
                ));
            }
        }

        Ok(())
    }

    pub fn sample_method(&self) -> SampleMethod {
        SampleMethod::from_code(self.bayes_sample_method)
    }

    /// Generator seeded from `seed`, or from entropy when none is configured
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

fn check_tags(value: &Value) -> Result<()> {
    if let Some(domain) = value.pointer("/domain_conf/domain").and_then(Value::as_str) {
        domain.parse::<DomainKind>()?;
    }
    if let Some(belief) = value.pointer("/belief_conf/belief").and_then(Value::as_str) {
        belief.parse::<BeliefKind>()?;
    }
    if let Some(prior) = value.get("structure_prior").and_then(Value::as_str) {
        prior.parse::<StructurePrior>()?;
    }
    Ok(())
}
