//! # Dynamics Models
//!
//! Bayesian models of unknown POMDP dynamics, parameterized by Dirichlet
//! pseudo-counts.
//!
//! - [`ConditionalTableNode`]: one conditional distribution over a parent subset
//! - [`Structure`]: the parent sets of a whole model, without counts
//! - [`FactoredModel`]: per-action, per-feature transition and observation nodes

pub mod factored;
pub mod node;
pub mod structure;

pub use factored::FactoredModel;
pub use node::ConditionalTableNode;
pub use structure::Structure;
