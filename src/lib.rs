//! # fbapomdp - Factored Bayes-Adaptive POMDPs
//!
//! fbapomdp learns the dynamics of a partially observable domain while acting
//! in it. Every hyper-state pairs a domain state with a factored Dirichlet model
//! of the transition and observation functions; particle beliefs over these
//! hyper-states track both the hidden state and the posterior over models,
//! including the graph structure of the model.
//!
//! ## Key Features
//!
//! - **Factored Models**: conditional count tables per action and feature,
//!   marginalization and abstraction onto feature subsets, BD scores
//! - **Bayes-Adaptive Simulator**: steps sample from the model and update its counts
//! - **Beliefs**: importance sampling, rejection sampling, reinvigorating
//!   rejection sampling and MH-within-Gibbs structure search
//! - **Reference Domains**: dummy domains, a factored grid and a factored tiger
//! - **Configuration**: serde JSON configuration with validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fbapomdp::belief::{make_belief, Belief};
//! use fbapomdp::config::FbaConfig;
//! use fbapomdp::domains::{make_fbapomdp, ReferenceDomain, ReferencePrior};
//! use fbapomdp::pomdp::Pomdp;
//! use fbapomdp::types::Action;
//!
//! let conf = FbaConfig::from_json_str(
//!     r#"{ "domain_conf": { "domain": "episodic-factored-tiger", "size": 1 }, "seed": 1 }"#,
//! )
//! .unwrap();
//! let mut rng = conf.rng();
//!
//! let bapomdp = make_fbapomdp(&conf).unwrap();
//! let mut belief = make_belief::<ReferenceDomain, ReferencePrior>(&conf.belief_conf).unwrap();
//! belief.initiate(&bapomdp, &mut rng);
//!
//! // listen to the real tiger and condition on what was heard
//! let mut state = bapomdp.domain().sample_start_state(&mut rng);
//! let heard = bapomdp.domain().step(&mut state, Action(2), &mut rng).observation;
//! belief.update_estimation(Action(2), &heard, &bapomdp, &mut rng).unwrap();
//! ```
//!
//! ## Module Organization
//!
//! - [`bayes_adaptive`] - The Bayes-adaptive simulator and its hyper-states
//! - [`belief`] - Particle beliefs and the belief factory
//! - [`config`] - Run configuration
//! - [`domains`] - Reference domains, their priors and the domain factory
//! - [`error`] - Error types and result handling
//! - [`model`] - Count tables, structures and factored models
//! - [`particles`] - Flat and weighted particle filters
//! - [`pomdp`] - Simulator, domain and prior traits
//! - [`sampling`] - Dirichlet and multinomial sampling
//! - [`types`] - Actions, observations, states and domain descriptors

pub mod bayes_adaptive;
pub mod belief;
pub mod config;
pub mod domains;
pub mod error;
pub mod model;
pub mod particles;
pub mod pomdp;
pub mod sampling;
pub mod types;

#[cfg(test)]
mod tests;
