#[cfg(test)]
mod property_tests {
    use fbapomdp::model::{ConditionalTableNode, FactoredModel, Structure};
    use fbapomdp::particles::WeightedFilter;
    use fbapomdp::sampling::{expected_mult, sample_mult};
    use fbapomdp::types::{indexing, Action, DomainDescriptor, FeatureSizes};
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // Strategy for feature cardinalities of a small factored domain
    fn feature_sizes_strategy() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(1usize..=4, 1..=4)
    }

    // Strategy for non-negative count vectors with at least one outcome
    fn counts_strategy() -> impl Strategy<Value = Vec<f64>> {
        prop::collection::vec(0.0f64..50.0, 1..=6)
    }

    fn connected_node(sizes: &[usize]) -> ConditionalTableNode {
        ConditionalTableNode::new(sizes, (0..sizes.len()).collect(), sizes[0])
    }

    proptest! {
        #[test]
        fn test_increment_visits_every_value_once(sizes in feature_sizes_strategy()) {
            let total: usize = sizes.iter().product();
            let mut values = vec![0; sizes.len()];
            let mut seen = vec![false; total];

            for _ in 0..total {
                let index = indexing::project(&values, &sizes);
                prop_assert!(!seen[index], "visited {:?} twice", values);
                seen[index] = true;
                prop_assert_eq!(indexing::project_using_step_sizes(index, &indexing::step_sizes(&sizes)), values.clone());
                indexing::increment(&mut values, &sizes);
            }

            prop_assert!(seen.into_iter().all(|s| s));
            prop_assert!(values.iter().all(|&v| v == 0), "increment did not wrap around");
        }

        #[test]
        fn test_expectation_is_a_distribution(counts in counts_strategy(), seed in any::<u64>()) {
            let expected = expected_mult(&counts);
            prop_assert!((expected.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            prop_assert!(expected.iter().all(|&p| p >= 0.0));

            let mut rng = StdRng::seed_from_u64(seed);
            let sampled = sample_mult(&counts, &mut rng);
            prop_assert!((sampled.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            prop_assert!(sampled.iter().all(|&p| p >= 0.0));
        }

        #[test]
        fn test_marginalize_out_preserves_mass_and_composes(
            sizes in prop::collection::vec(1usize..=3, 3..=4),
            increments in prop::collection::vec((any::<u64>(), 0.5f64..5.0), 1..20)
        ) {
            let mut node = connected_node(&sizes);
            let steps = indexing::step_sizes(&sizes);
            let total_states: usize = sizes.iter().product();
            for (seed, amount) in &increments {
                let values = indexing::project_using_step_sizes((*seed as usize) % total_states, &steps);
                node.increment(&values, (*seed as usize) % sizes[0], *amount);
            }

            let mass: f64 = node.counts().iter().sum();
            let all: Vec<usize> = (0..sizes.len()).collect();
            let middle: Vec<usize> = all.iter().copied().filter(|&f| f != 1).collect();
            let last = vec![middle[0]];

            let direct = node.marginalize_out(&last);
            let stepwise = node.marginalize_out(&middle).marginalize_out(&last);

            prop_assert!((direct.counts().iter().sum::<f64>() - mass).abs() < 1e-9);
            prop_assert_eq!(direct.parents(), stepwise.parents());
            for (a, b) in direct.counts().iter().zip(stepwise.counts()) {
                prop_assert!((a - b).abs() < 1e-9);
            }
        }

        #[test]
        fn test_bd_score_ignores_observation_order(
            outcomes in prop::collection::vec(0usize..3, 1..30),
            prior_count in 1.0f64..10.0
        ) {
            let mut prior = ConditionalTableNode::new(&[2], vec![0], 3);
            for parent in 0..2 {
                prior.set_dirichlet(&[parent], &[prior_count; 3]);
            }

            let mut forward = prior.clone();
            for (i, &o) in outcomes.iter().enumerate() {
                forward.increment(&[i % 2], o, 1.0);
            }
            let mut backward = prior.clone();
            for (i, &o) in outcomes.iter().enumerate().rev() {
                backward.increment(&[i % 2], o, 1.0);
            }

            let a = forward.log_bd_score(&prior);
            let b = backward.log_bd_score(&prior);
            prop_assert!((a - b).abs() < 1e-9);
            prop_assert!(a.is_finite());
        }

        #[test]
        fn test_flip_edge_is_an_involution(
            parents in prop::collection::btree_set(0usize..8, 0..8),
            edge in 0usize..8
        ) {
            let original: Vec<usize> = parents.into_iter().collect();
            let mut flipped = original.clone();

            Structure::flip_edge(&mut flipped, edge);
            prop_assert_eq!(flipped.contains(&edge), !original.contains(&edge));
            prop_assert!(flipped.windows(2).all(|w| w[0] < w[1]));

            Structure::flip_edge(&mut flipped, edge);
            prop_assert_eq!(flipped, original);
        }

        #[test]
        fn test_model_structure_round_trips_through_marginalization(sizes in feature_sizes_strategy()) {
            let descriptor = DomainDescriptor::new(
                2,
                FeatureSizes { state: sizes.clone(), observation: vec![2] },
            )
            .unwrap()
            .shared();

            let mut model = FactoredModel::new(descriptor);
            let all: Vec<usize> = (0..sizes.len()).collect();
            for a in 0..2 {
                for f in 0..sizes.len() {
                    model.reset_transition_node(Action(a), f, all.clone());
                }
                model.reset_observation_node(Action(a), 0, all.clone());
            }

            let mut structure = model.structure();
            structure.transition[0][0] = vec![];
            structure.observation[1][0] = vec![sizes.len() - 1];

            prop_assert_eq!(model.marginalize_out(&structure).structure(), structure);
        }
    }

    #[test]
    fn test_weighted_sampling_follows_weights() {
        let mut filter = WeightedFilter::new();
        filter.add_weighted('a', 1.0);
        filter.add_weighted('b', 1.0);
        filter.add_weighted('c', 1000.0);

        let mut rng = StdRng::seed_from_u64(99);
        let heavy = (0..10_000).filter(|_| *filter.sample(&mut rng) == 'c').count();
        assert!(heavy > 9_500, "heavy particle drawn {} of 10000 times", heavy);
    }
}
