pub mod test_importance_sampling;
pub mod test_mh_within_gibbs;
