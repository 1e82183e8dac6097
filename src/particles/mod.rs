//! # Particle Containers
//!
//! Fixed-size particle populations. Containers own their particles but never
//! free them implicitly: every path that drops a particle takes a deallocation
//! callback from the caller.

pub mod flat;
pub mod weighted;

pub use flat::FlatFilter;
pub use weighted::{WeightedFilter, WeightedParticle};
