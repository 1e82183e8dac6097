use crate::bayes_adaptive::{BaState, Fbapomdp};
use crate::belief::mh_within_gibbs::{
    compute_posterior_counts, message_passing_state_history, rejection_sample_state_history,
};
use crate::belief::{BaBelief, Belief, History, MhWithinGibbs, StateHistorySampling};
use crate::domains::{FactoredTiger, FactoredTigerPrior, TigerKind};
use crate::error::{FbaError, Result};
use crate::model::{FactoredModel, Structure};
use crate::particles::WeightedParticle;
use crate::pomdp::{FactoredPrior, StructurePrior};
use crate::sampling::SampleMethod;
use crate::types::Observation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn tiger_bapomdp(structure_prior: StructurePrior) -> Fbapomdp<FactoredTiger, FactoredTigerPrior> {
    let domain = FactoredTiger::new(TigerKind::Episodic, 1).unwrap();
    let prior = FactoredTigerPrior::new(&domain, 0.0, 100.0, structure_prior).unwrap();
    Fbapomdp::new(domain, prior, SampleMethod::Expected, structure_prior)
}

fn correct_model(bapomdp: &Fbapomdp<FactoredTiger, FactoredTigerPrior>) -> FactoredModel {
    let mut rng = StdRng::seed_from_u64(0);
    bapomdp.prior().sample_model(&mut rng)
}

fn listening(observations: &[usize]) -> History {
    let mut episode = History::new();
    for &o in observations {
        episode.add(FactoredTiger::LISTEN, Observation::single(o));
    }
    episode
}

#[test]
fn test_posterior_counts_follow_the_trajectory() {
    let bapomdp = tiger_bapomdp(StructurePrior::MatchCounts);
    let prior = correct_model(&bapomdp);

    let history = vec![listening(&[0]), listening(&[1, 1])];
    let states = vec![vec![0, 0], vec![0, 0], vec![1, 1], vec![1, 1], vec![1, 1]];
    let posterior = compute_posterior_counts(&prior, &history, &states);

    let observation = posterior.observation_node(FactoredTiger::LISTEN, 0);
    let prior_observation = prior.observation_node(FactoredTiger::LISTEN, 0);
    assert_eq!(observation.count(&[0], 0), prior_observation.count(&[0], 0) + 1.0);
    assert_eq!(observation.count(&[1], 1), prior_observation.count(&[1], 1) + 2.0);
    assert_eq!(observation.count(&[1], 0), prior_observation.count(&[1], 0));

    let location = posterior.transition_node(FactoredTiger::LISTEN, 0);
    assert_eq!(location.count(&[1], 1), 5002.0);
    assert_eq!(location.count(&[0], 0), 5001.0);
}

#[test]
#[should_panic(expected = "state sequence does not match the history")]
fn test_posterior_counts_reject_short_trajectories() {
    let bapomdp = tiger_bapomdp(StructurePrior::MatchCounts);
    let prior = correct_model(&bapomdp);

    let history = vec![listening(&[0]), listening(&[1])];
    let states = vec![vec![0, 0], vec![0, 0], vec![1, 1], vec![1, 1], vec![1, 1]];
    compute_posterior_counts(&prior, &history, &states);
}

#[test]
fn test_rejection_sampled_history_reproduces_episodes() {
    let bapomdp = tiger_bapomdp(StructurePrior::MatchCounts);
    let model = correct_model(&bapomdp);
    let mut rng = StdRng::seed_from_u64(30);

    let history = vec![listening(&[0, 0]), listening(&[1])];
    let states = rejection_sample_state_history(&model, &history, &bapomdp, 10_000, &mut rng).unwrap();

    assert_eq!(states.len(), 3 + 2);
    // listening never moves anything
    assert_eq!(states[0], states[1]);
    assert_eq!(states[1], states[2]);
    assert_eq!(states[3], states[4]);
}

#[test]
fn test_message_passing_follows_evidence() {
    let bapomdp = tiger_bapomdp(StructurePrior::MatchCounts);
    let model = correct_model(&bapomdp);
    let mut rng = StdRng::seed_from_u64(31);

    let history = vec![listening(&[1, 1, 1, 1, 1, 1])];

    let mut right = 0;
    for _ in 0..100 {
        let states = message_passing_state_history(&model, &history, &bapomdp, &mut rng).unwrap();
        assert_eq!(states.len(), 7);
        assert!(states.windows(2).all(|w| w[0] == w[1]));
        if states[0][0] == FactoredTiger::RIGHT {
            right += 1;
        }
    }
    assert!(right > 95, "only {} trajectories put the tiger right", right);
}

#[test]
fn test_message_passing_handles_empty_episodes() {
    let bapomdp = tiger_bapomdp(StructurePrior::MatchCounts);
    let model = correct_model(&bapomdp);
    let mut rng = StdRng::seed_from_u64(32);

    let history = vec![listening(&[0]), History::new()];
    let states = message_passing_state_history(&model, &history, &bapomdp, &mut rng).unwrap();
    assert_eq!(states.len(), 3);
    assert!(states.iter().all(|s| s.len() == 2));
}

fn run_reinvigoration(mode: StateHistorySampling) {
    let bapomdp = tiger_bapomdp(StructurePrior::Uniform);
    let mut rng = StdRng::seed_from_u64(33);

    let mut belief = MhWithinGibbs::new(40, -0.3, mode).unwrap();
    belief.initiate(&bapomdp, &mut rng);
    assert_eq!(belief.history().len(), 1);

    // an even population explains the first observation with likelihood about 1/2
    belief
        .update_estimation(FactoredTiger::LISTEN, &Observation::single(FactoredTiger::LEFT), &bapomdp, &mut rng)
        .unwrap();

    assert_eq!(belief.log_likelihood(), 0.0);
    assert_eq!(belief.belief().len(), 40);
    assert!((belief.belief().total_weight() - 1.0).abs() < 1e-9);
    assert_eq!(belief.history()[0].len(), 1);

    for p in belief.belief().iter() {
        // every accepted model holds the prior of its structure plus the sampled trajectory
        let structure = p.particle.model().structure();
        let prior = bapomdp.compute_prior_model(&structure).unwrap();
        let learned: f64 = p.particle.model().observation_node(FactoredTiger::LISTEN, 0).counts().iter().sum::<f64>()
            - prior.observation_node(FactoredTiger::LISTEN, 0).counts().iter().sum::<f64>();
        assert!((learned - 1.0).abs() < 1e-9);
    }

    belief.reset_domain_state_distribution(&bapomdp, &mut rng);
    belief.reset_domain_state_distribution(&bapomdp, &mut rng);
    assert_eq!(belief.history().len(), 2);

    belief
        .update_estimation(FactoredTiger::LISTEN, &Observation::single(FactoredTiger::RIGHT), &bapomdp, &mut rng)
        .unwrap();
    assert_eq!(belief.history()[1].len(), 1);

    belief.free(&bapomdp);
    assert!(belief.history().is_empty());
    assert!(belief.belief().is_empty());
}

#[test]
fn test_reinvigoration_with_message_passing() {
    run_reinvigoration(StateHistorySampling::MessagePassing);
}

#[test]
fn test_reinvigoration_with_rejection_sampling() {
    run_reinvigoration(StateHistorySampling::RejectionSampling);
}

#[test]
fn test_high_likelihood_skips_reinvigoration() {
    let bapomdp = tiger_bapomdp(StructurePrior::MatchCounts);
    let mut rng = StdRng::seed_from_u64(34);

    let mut belief = MhWithinGibbs::new(20, -100.0, StateHistorySampling::MessagePassing).unwrap();
    belief.initiate(&bapomdp, &mut rng);
    belief
        .update_estimation(FactoredTiger::LISTEN, &Observation::single(FactoredTiger::LEFT), &bapomdp, &mut rng)
        .unwrap();

    assert!(belief.log_likelihood() < 0.0);
    assert!(belief.log_likelihood() > -100.0);
}

/// Tiger prior whose mutations always disconnect the listening observation node
#[derive(Clone, Debug)]
struct DisconnectingPrior(FactoredTigerPrior);

impl FactoredPrior for DisconnectingPrior {
    fn sample_model<R: Rng + ?Sized>(&self, rng: &mut R) -> FactoredModel {
        self.0.sample_model(rng)
    }

    fn fully_connected_model(&self) -> FactoredModel {
        self.0.fully_connected_model()
    }

    fn compute_prior_model(&self, structure: &Structure) -> Result<FactoredModel> {
        self.0.compute_prior_model(structure)
    }

    fn mutate<R: Rng + ?Sized>(&self, mut structure: Structure, _rng: &mut R) -> Structure {
        structure.observation[FactoredTiger::LISTEN.index()][0].clear();
        structure
    }
}

fn deaf_model(bapomdp: &Fbapomdp<FactoredTiger, FactoredTigerPrior>) -> FactoredModel {
    let mut model = correct_model(bapomdp);
    model.reset_observation_node(FactoredTiger::LISTEN, 0, vec![]);
    model
        .observation_node_mut(FactoredTiger::LISTEN, 0)
        .set_dirichlet(&[], &[10.0, 0.0]);
    model
}

fn snapshot(belief: &MhWithinGibbs) -> Vec<WeightedParticle<BaState>> {
    belief.belief().iter().cloned().collect()
}

#[test]
fn test_unsupported_history_exhausts_trajectory_sampling() {
    let bapomdp = tiger_bapomdp(StructurePrior::MatchCounts);
    let model = deaf_model(&bapomdp);
    let mut rng = StdRng::seed_from_u64(35);

    // the model never hears the tiger on the right
    let history = vec![listening(&[0]), listening(&[1])];
    let result = rejection_sample_state_history(&model, &history, &bapomdp, 50, &mut rng);

    match result {
        Err(FbaError::DegenerateSampling { attempts, .. }) => assert_eq!(attempts, 50),
        other => panic!("expected degenerate sampling, got {:?}", other),
    }
    assert!(message_passing_state_history(&model, &history, &bapomdp, &mut rng).is_err());
}

fn run_failed_reinvigoration(mode: StateHistorySampling, operation: &str) {
    let bapomdp = tiger_bapomdp(StructurePrior::Uniform);
    let mut rng = StdRng::seed_from_u64(36);

    let mut belief = MhWithinGibbs::new(10, -1e6, mode).unwrap().with_max_attempts(0);
    belief.initiate(&bapomdp, &mut rng);
    belief
        .update_estimation(FactoredTiger::LISTEN, &Observation::single(FactoredTiger::LEFT), &bapomdp, &mut rng)
        .unwrap();

    let before = snapshot(&belief);
    let log_likelihood = belief.log_likelihood();

    match belief.reinvigorate(&bapomdp, &mut rng) {
        Err(FbaError::DegenerateSampling { operation: failed, .. }) => assert_eq!(failed, operation),
        other => panic!("expected degenerate sampling, got {:?}", other),
    }
    assert_eq!(snapshot(&belief), before);
    assert_eq!(belief.log_likelihood(), log_likelihood);
}

#[test]
fn test_failed_reinvigoration_keeps_the_population_with_rejection_sampling() {
    run_failed_reinvigoration(StateHistorySampling::RejectionSampling, "state history rejection sampling");
}

#[test]
fn test_failed_reinvigoration_keeps_the_population_with_message_passing() {
    run_failed_reinvigoration(StateHistorySampling::MessagePassing, "mh-within-gibbs");
}

#[test]
fn test_structure_search_rejects_much_worse_structures() {
    let domain = FactoredTiger::new(TigerKind::Episodic, 1).unwrap();
    let prior = FactoredTigerPrior::new(&domain, 0.0, 100.0, StructurePrior::MatchCounts).unwrap();
    let bapomdp = Fbapomdp::new(
        domain,
        DisconnectingPrior(prior),
        SampleMethod::Expected,
        StructurePrior::MatchCounts,
    );
    let mut rng = StdRng::seed_from_u64(37);

    let mut belief = MhWithinGibbs::new(20, -1e6, StateHistorySampling::MessagePassing).unwrap();
    belief.initiate(&bapomdp, &mut rng);
    for _ in 0..60 {
        belief
            .update_estimation(FactoredTiger::LISTEN, &Observation::single(FactoredTiger::LEFT), &bapomdp, &mut rng)
            .unwrap();
    }

    belief.reinvigorate(&bapomdp, &mut rng).unwrap();

    assert_eq!(belief.belief().len(), 20);
    assert_eq!(belief.log_likelihood(), 0.0);
    // sixty consistent listens make the disconnected node far less likely
    for p in belief.belief().iter() {
        let listen = p.particle.model().observation_node(FactoredTiger::LISTEN, 0);
        assert_eq!(listen.parents(), &[FactoredTiger::LOCATION_FEATURE]);
    }
}
