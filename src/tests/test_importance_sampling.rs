use crate::bayes_adaptive::{BaState, Fbapomdp};
use crate::belief::importance::{resample, update};
use crate::belief::{BaBelief, Belief, ImportanceSampling};
use crate::domains::{DummyDomain, DummyPrior, FactoredTiger, FactoredTigerPrior, LinearDummyDomain, TigerKind};
use crate::error::FbaError;
use crate::particles::WeightedFilter;
use crate::pomdp::{Pomdp, StructurePrior};
use crate::sampling::SampleMethod;
use crate::types::{Action, Observation};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn tiger_bapomdp() -> Fbapomdp<FactoredTiger, FactoredTigerPrior> {
    let domain = FactoredTiger::new(TigerKind::Episodic, 1).unwrap();
    let prior = FactoredTigerPrior::new(&domain, 0.0, 10_000.0, StructurePrior::MatchCounts).unwrap();
    Fbapomdp::new(domain, prior, SampleMethod::Expected, StructurePrior::MatchCounts)
}

#[test]
fn test_update_on_linear_dummy() {
    let domain = LinearDummyDomain::new();
    let mut rng = StdRng::seed_from_u64(10);

    let mut filter = WeightedFilter::new();
    for _ in 0..5 {
        filter.add(0usize);
    }

    let total = update(&mut filter, LinearDummyDomain::FORWARD, &Observation::single(0), &domain, &mut rng).unwrap();
    assert!((total - 5.0).abs() < 1e-12);
    assert!(filter.iter().all(|p| p.particle == 1));
    assert!((filter.total_weight() - 1.0).abs() < 1e-12);

    resample(&mut filter, &domain, 3, &mut rng);
    assert_eq!(filter.len(), 3);
    assert!(filter.iter().all(|p| (p.weight - 1.0 / 3.0).abs() < 1e-12));
}

#[test]
fn test_unexplained_observation_is_degenerate() {
    let domain = LinearDummyDomain::new();
    let mut rng = StdRng::seed_from_u64(11);

    let mut belief = ImportanceSampling::<usize>::new(4).unwrap();
    belief.initiate(&domain, &mut rng);

    let result = belief.update_estimation(LinearDummyDomain::FORWARD, &Observation::single(1), &domain, &mut rng);
    assert!(matches!(result, Err(FbaError::DegenerateSampling { .. })));
}

#[test]
fn test_invalid_size() {
    assert!(ImportanceSampling::<usize>::new(0).is_err());
}

#[test]
fn test_dummy_counts_grow_with_updates() {
    let domain = DummyDomain::new().unwrap();
    let prior = DummyPrior::new(&domain, 10.0);
    let bapomdp = Fbapomdp::new(domain, prior, SampleMethod::Expected, StructurePrior::MatchCounts);
    let mut rng = StdRng::seed_from_u64(12);

    let mut belief = ImportanceSampling::<BaState>::new(8).unwrap();
    belief.initiate(&bapomdp, &mut rng);

    for _ in 0..3 {
        belief
            .update_estimation(Action(0), &Observation::single(0), &bapomdp, &mut rng)
            .unwrap();
    }

    assert_eq!(belief.filter().len(), 8);
    for p in belief.filter().iter() {
        assert_eq!(p.particle.model().transition_node(Action(0), 0).counts(), &[13.0]);
        assert_eq!(p.particle.model().observation_node(Action(0), 0).counts(), &[13.0]);
    }

    belief.free(&bapomdp);
    assert!(belief.filter().is_empty());
}

#[test]
fn test_listening_locates_the_tiger() {
    let bapomdp = tiger_bapomdp();
    let mut rng = StdRng::seed_from_u64(13);

    let mut belief = ImportanceSampling::<BaState>::new(200).unwrap();
    belief.initiate(&bapomdp, &mut rng);

    for _ in 0..5 {
        belief
            .update_estimation(FactoredTiger::LISTEN, &Observation::single(FactoredTiger::LEFT), &bapomdp, &mut rng)
            .unwrap();
    }

    let left = belief
        .filter()
        .iter()
        .filter(|p| p.particle.domain_state().features()[0] == FactoredTiger::LEFT)
        .count();
    assert!(left > 180, "only {} particles believe the tiger is left", left);
}

#[test]
fn test_reset_keeps_models() {
    let bapomdp = tiger_bapomdp();
    let mut rng = StdRng::seed_from_u64(14);

    let mut belief = ImportanceSampling::<BaState>::new(20).unwrap();
    belief.initiate(&bapomdp, &mut rng);
    belief
        .update_estimation(FactoredTiger::LISTEN, &Observation::single(FactoredTiger::RIGHT), &bapomdp, &mut rng)
        .unwrap();

    belief.reset_domain_state_distribution(&bapomdp, &mut rng);

    assert_eq!(belief.filter().len(), 20);
    assert!((belief.filter().total_weight() - 1.0).abs() < 1e-9);
    for p in belief.filter().iter() {
        let listen = p.particle.model().observation_node(FactoredTiger::LISTEN, 0);
        // one observation was learned on top of the prior
        assert!((listen.counts().iter().sum::<f64>() - 20_001.0).abs() < 1e-6);
    }
}

fn particle_with_listen_counts(
    bapomdp: &Fbapomdp<FactoredTiger, FactoredTigerPrior>,
    counts: &[f64],
    rng: &mut StdRng,
) -> BaState {
    let mut state = bapomdp.sample_start_state(rng);
    let model = state.model_mut();
    model.reset_observation_node(FactoredTiger::LISTEN, 0, vec![]);
    model
        .observation_node_mut(FactoredTiger::LISTEN, 0)
        .set_dirichlet(&[], counts);
    state
}

#[test]
fn test_weight_ignores_the_observation_being_learned() {
    let bapomdp = tiger_bapomdp();
    let mut rng = StdRng::seed_from_u64(15);

    let mut filter = WeightedFilter::new();
    filter.add(particle_with_listen_counts(&bapomdp, &[3.0, 1.0], &mut rng));

    let total = update(&mut filter, FactoredTiger::LISTEN, &Observation::single(1), &bapomdp, &mut rng).unwrap();
    assert!((total - 0.25).abs() < 1e-12);

    // the observation is learned after weighting
    let listen = filter.particle(0).particle.model().observation_node(FactoredTiger::LISTEN, 0);
    assert_eq!(listen.counts(), &[3.0, 2.0]);
}

#[test]
fn test_impossible_observation_gets_no_weight() {
    let bapomdp = tiger_bapomdp();
    let mut rng = StdRng::seed_from_u64(16);

    let mut filter = WeightedFilter::new();
    filter.add(particle_with_listen_counts(&bapomdp, &[10.0, 0.0], &mut rng));

    let result = update(&mut filter, FactoredTiger::LISTEN, &Observation::single(1), &bapomdp, &mut rng);
    assert!(matches!(result, Err(FbaError::DegenerateSampling { .. })));
    assert_eq!(filter.particle(0).weight, 0.0);
}
