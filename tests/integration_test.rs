use fbapomdp::{
    belief::{make_belief, BaBelief, Belief, BeliefKind},
    config::{BeliefConfig, FbaConfig},
    domains::{make_fbapomdp, DomainKind, ReferenceDomain, ReferencePrior},
    error::FbaError,
    pomdp::{Pomdp, StructurePrior},
    types::{Action, CompositeIndex, Observation},
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

/// Routes library logs to the test output; set `RUST_LOG` to see them
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tiger_config(belief_conf: BeliefConfig) -> FbaConfig {
    let mut conf = FbaConfig {
        belief_conf,
        counts_total: 100.0,
        structure_prior: StructurePrior::MatchUniform,
        seed: Some(7),
        ..FbaConfig::default()
    };
    conf.domain_conf.domain = DomainKind::EpisodicFactoredTiger;
    conf.domain_conf.size = 1;
    conf
}

#[test]
fn test_dummy_end_to_end() {
    init_tracing();
    let conf = FbaConfig {
        seed: Some(1),
        ..FbaConfig::default()
    };
    let mut rng = conf.rng();

    let bapomdp = make_fbapomdp(&conf).unwrap();
    let mut belief = make_belief::<ReferenceDomain, ReferencePrior>(&conf.belief_conf).unwrap();
    belief.initiate(&bapomdp, &mut rng);
    assert_eq!(belief.len(), 100);

    for step in 1..=5 {
        belief
            .update_estimation(Action(0), &Observation::single(0), &bapomdp, &mut rng)
            .unwrap();

        let state = belief.sample(&mut rng);
        assert_eq!(state.index(), CompositeIndex::Flat(0));
        assert_eq!(
            state.model().transition_node(Action(0), 0).counts(),
            &[100.0 + step as f64]
        );
        assert!(state.model().transition_node(Action(0), 0).parents().is_empty());
    }

    belief.reset_domain_state_distribution(&bapomdp, &mut rng);
    assert_eq!(belief.len(), 100);
    belief.free(&bapomdp);
    assert!(belief.is_empty());
}

#[test]
fn test_every_belief_tracks_the_tiger() {
    init_tracing();
    let configs = vec![
        BeliefConfig {
            belief: BeliefKind::RejectionSampling,
            particle_amount: 50,
            ..BeliefConfig::default()
        },
        BeliefConfig {
            belief: BeliefKind::ImportanceSampling,
            particle_amount: 50,
            ..BeliefConfig::default()
        },
        BeliefConfig {
            belief: BeliefKind::Reinvigoration,
            particle_amount: 50,
            resample_amount: 5,
            ..BeliefConfig::default()
        },
        BeliefConfig {
            belief: BeliefKind::MhWithinGibbs,
            particle_amount: 50,
            threshold: -2.0,
            ..BeliefConfig::default()
        },
        BeliefConfig {
            belief: BeliefKind::MhWithinGibbs,
            particle_amount: 50,
            threshold: -2.0,
            option: "rs".to_string(),
            ..BeliefConfig::default()
        },
    ];

    for belief_conf in configs {
        let conf = tiger_config(belief_conf);
        let mut rng = conf.rng();
        let bapomdp = make_fbapomdp(&conf).unwrap();

        let mut belief = make_belief::<ReferenceDomain, ReferencePrior>(&conf.belief_conf).unwrap();
        belief.initiate(&bapomdp, &mut rng);

        for _ in 0..6 {
            belief
                .update_estimation(Action(2), &Observation::single(0), &bapomdp, &mut rng)
                .unwrap();
        }
        assert_eq!(belief.len(), 50, "{}", conf.belief_conf.belief);

        let left = (0..200)
            .filter(|_| belief.sample(&mut rng).domain_state().features()[0] == 0)
            .count();
        assert!(left > 160, "{} puts the tiger left {} of 200 times", conf.belief_conf.belief, left);

        // opening a door starts a new episode
        belief.reset_domain_state_distribution(&bapomdp, &mut rng);
        belief.free(&bapomdp);
    }
}

#[test]
fn test_simulated_episode_against_the_real_tiger() {
    let conf = tiger_config(BeliefConfig {
        belief: BeliefKind::ImportanceSampling,
        particle_amount: 100,
        ..BeliefConfig::default()
    });
    let mut rng = StdRng::seed_from_u64(70);
    let bapomdp = make_fbapomdp(&conf).unwrap();

    let mut belief = make_belief::<ReferenceDomain, ReferencePrior>(&conf.belief_conf).unwrap();
    belief.initiate(&bapomdp, &mut rng);

    // an odd number of listens never leaves the evidence tied
    let mut state = bapomdp.domain().sample_start_state(&mut rng);
    for _ in 0..11 {
        let transition = bapomdp.domain().step(&mut state, Action(2), &mut rng);
        belief
            .update_estimation(Action(2), &transition.observation, &bapomdp, &mut rng)
            .unwrap();
    }

    let correct = (0..100)
        .filter(|_| belief.sample(&mut rng).domain_state().features()[0] == state.features()[0])
        .count();
    assert!(correct > 50, "belief agrees with the real state {} of 100 times", correct);
}

#[test]
fn test_factory_errors() {
    let mut conf = FbaConfig::default();
    conf.domain_conf.domain = DomainKind::LinearDummy;
    assert!(matches!(make_fbapomdp(&conf), Err(FbaError::UnsupportedDomain(_))));

    let bad_belief = BeliefConfig {
        belief: BeliefKind::MhWithinGibbs,
        threshold: -1.0,
        option: "gibbs".to_string(),
        ..BeliefConfig::default()
    };
    assert!(matches!(
        make_belief::<ReferenceDomain, ReferencePrior>(&bad_belief),
        Err(FbaError::InvalidParameter { .. })
    ));

    let mut noisy = tiger_config(BeliefConfig::default());
    noisy.noise = 0.5;
    assert!(make_fbapomdp(&noisy).is_err());

    assert!(matches!(
        FbaConfig::from_json_str(r#"{ "belief_conf": { "belief": "pomcp" } }"#),
        Err(FbaError::UnsupportedBelief(_))
    ));
}

#[test]
fn test_config_file_drives_the_factory() {
    let conf = tiger_config(BeliefConfig {
        belief: BeliefKind::Reinvigoration,
        particle_amount: 20,
        resample_amount: 2,
        ..BeliefConfig::default()
    });

    let file = NamedTempFile::new().unwrap();
    conf.save(file.path()).unwrap();
    let loaded = FbaConfig::from_file(file.path()).unwrap();
    assert_eq!(loaded, conf);

    let bapomdp = make_fbapomdp(&loaded).unwrap();
    assert_eq!(bapomdp.descriptor().num_state_features(), 2);

    let mut rng = loaded.rng();
    let mut belief = make_belief::<ReferenceDomain, ReferencePrior>(&loaded.belief_conf).unwrap();
    belief.initiate(&bapomdp, &mut rng);
    assert_eq!(belief.len(), 20);
}
