//! MH-within-Gibbs structure search.
//!
//! The belief is tracked with importance sampling. Once the accumulated log
//! likelihood of the observations drops below a threshold, the population is
//! re-derived from the full interaction history by alternating two moves:
//!
//! 1. sample a hidden state trajectory given the current model;
//! 2. propose a structure, compute its posterior counts from the trajectory and
//!    accept it with the Metropolis-Hastings test on the BD scores.
//!
//! Every accepted model becomes a particle of the new population.

use super::history::History;
use super::importance;
use super::{BaBelief, Belief};
use crate::bayes_adaptive::{BaState, Fbapomdp};
use crate::error::{FbaError, Result};
use crate::model::FactoredModel;
use crate::particles::WeightedFilter;
use crate::pomdp::{FactoredDomain, FactoredPrior, Pomdp};
use crate::sampling::{sample_from_mult, SampleMethod};
use crate::types::{indexing, Action, Observation};
use ndarray::{s, Array2, ArrayView1};
use rand::{Rng, RngCore};
use tracing::{debug, info, trace, warn};

/// Default bound on Gibbs iterations per particle and on trajectory restarts per episode
pub const DEFAULT_MAX_ATTEMPTS: usize = 10_000;

/// How hidden state trajectories are drawn given a model
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StateHistorySampling {
    /// Simulate every episode with the expected model, restarting it on the
    /// first observation mismatch
    RejectionSampling,
    /// Exact backward messages over the flattened tables, then a forward draw
    #[default]
    MessagePassing,
}

impl StateHistorySampling {
    /// Maps the belief `option`: `""` passes messages, `"rs"` rejection samples
    pub fn from_option(option: &str) -> Result<Self> {
        match option {
            "" => Ok(StateHistorySampling::MessagePassing),
            "rs" => Ok(StateHistorySampling::RejectionSampling),
            other => Err(FbaError::invalid_parameter(
                "option".to_string(),
                format!("unknown state history sampling '{}', expected \"\" or \"rs\"", other),
            )),
        }
    }
}

/// States of every episode, each episode contributing its length + 1 states
pub type StateSequence = Vec<Vec<usize>>;

/// `prior` plus one count for every `(s, a, o, s')` the trajectory passes through
///
/// `states` must hold `len + 1` states for every episode of `history`, in order.
pub fn compute_posterior_counts(prior: &FactoredModel, history: &[History], states: &[Vec<usize>]) -> FactoredModel {
    let mut posterior = prior.clone();

    let mut i = 0;
    for episode in history {
        for step in episode {
            posterior.increment_counts_of(&states[i], step.action, step.observation.features(), &states[i + 1], 1.0);
            i += 1;
        }
        // skip the final state, the next episode starts afresh
        i += 1;
    }

    assert_eq!(i, states.len(), "state sequence does not match the history");
    posterior
}

/// Trajectory drawn by simulating `model` and restarting an episode whenever
/// it disagrees with an observation
pub fn rejection_sample_state_history<D, P, R>(
    model: &FactoredModel,
    history: &[History],
    bapomdp: &Fbapomdp<D, P>,
    max_attempts: usize,
    rng: &mut R,
) -> Result<StateSequence>
where
    D: FactoredDomain,
    P: FactoredPrior,
    R: Rng + ?Sized,
{
    let mut states = Vec::new();

    for episode in history {
        let mut attempts = 0;
        let sequence = loop {
            if attempts >= max_attempts {
                warn!(attempts, steps = episode.len(), "no trajectory reproduced the episode");
                return Err(FbaError::degenerate("state history rejection sampling", attempts));
            }
            attempts += 1;

            if let Some(sequence) = simulate_episode(model, episode, bapomdp, rng) {
                break sequence;
            }
        };

        trace!(attempts, "sampled episode trajectory");
        states.extend(sequence);
    }

    Ok(states)
}

fn simulate_episode<D, P, R>(
    model: &FactoredModel,
    episode: &History,
    bapomdp: &Fbapomdp<D, P>,
    rng: &mut R,
) -> Option<StateSequence>
where
    D: FactoredDomain,
    P: FactoredPrior,
    R: Rng + ?Sized,
{
    let start = bapomdp.sample_domain_state(rng);
    let mut sequence = Vec::with_capacity(episode.len() + 1);
    sequence.push(start.features().to_vec());
    bapomdp.release_domain_state(start);

    for step in episode {
        let state = &sequence[sequence.len() - 1];
        let new_state = model.sample_state_features(state, step.action, SampleMethod::Expected, rng);
        let observation = model.sample_observation_features(step.action, &new_state, SampleMethod::Expected, rng);

        if observation != step.observation.features() {
            return None;
        }
        sequence.push(new_state);
    }

    Some(sequence)
}

/// Trajectory drawn from its exact posterior under the expected `model`
///
/// Backward messages `m[t][s] = p(o_t.. | s_t = s)` are computed over the flat
/// tables, then states are drawn forward from `T[s][a] * m[t + 1]`.
pub fn message_passing_state_history<D, P, R>(
    model: &FactoredModel,
    history: &[History],
    bapomdp: &Fbapomdp<D, P>,
    rng: &mut R,
) -> Result<StateSequence>
where
    D: FactoredDomain,
    P: FactoredPrior,
    R: Rng + ?Sized,
{
    let transition = model.flatten_transition()?;
    let observation = model.flatten_observation()?;
    let state_prior = bapomdp.domain().state_prior()?;

    let descriptor = model.descriptor();
    let num_states = transition.shape()[0];
    let state_steps = &descriptor.steps().state;
    let observation_sizes = &descriptor.feature_sizes().observation;

    if state_prior.len() != num_states {
        return Err(FbaError::dimension_mismatch(
            format!("state prior over {} states", num_states),
            format!("state prior over {} states", state_prior.len()),
        ));
    }

    let likelihood = |action: Action, obs: &Observation, state: usize| {
        observation[[action.index(), state, indexing::project(obs.features(), observation_sizes)]]
    };

    let mut states = Vec::new();

    for episode in history {
        let len = episode.len();

        // backward pass
        let mut messages = Array2::<f64>::zeros((len + 1, num_states));
        match episode.last() {
            Some(last) => {
                for state in 0..num_states {
                    messages[[len, state]] = likelihood(last.action, &last.observation, state);
                }
            }
            None => messages.row_mut(0).assign(&ArrayView1::from(&state_prior[..])),
        }

        for step in (0..len).rev() {
            let action = episode.get(step).action.index();

            for state in 0..num_states {
                let future = transition
                    .slice(s![state, action, ..])
                    .dot(&messages.row(step + 1));
                let local = if step == 0 {
                    state_prior[state]
                } else {
                    let previous = episode.get(step - 1);
                    likelihood(previous.action, &previous.observation, state)
                };
                messages[[step, state]] = future * local;
            }

            let total = messages.row(step).sum();
            if !(total > 0.0) {
                warn!(step, "history has no support under the model");
                return Err(FbaError::degenerate("message passing", step));
            }
            messages.row_mut(step).mapv_inplace(|m| m / total);
        }

        // forward pass
        let first = messages.row(0).to_vec();
        let mut state = sample_from_mult(&first, first.iter().sum(), rng);
        states.push(indexing::project_using_step_sizes(state, state_steps));

        for step in 0..len {
            let action = episode.get(step).action.index();
            let probs = (&transition.slice(s![state, action, ..]) * &messages.row(step + 1)).to_vec();
            let total: f64 = probs.iter().sum();
            if !(total > 0.0) {
                warn!(step, "no successor explains the next observation");
                return Err(FbaError::degenerate("message passing", step));
            }

            state = sample_from_mult(&probs, total, rng);
            states.push(indexing::project_using_step_sizes(state, state_steps));
        }
    }

    trace!(?states, "sampled state history");
    Ok(states)
}

/// Importance sampling with MCMC re-derivation of the population
#[derive(Clone, Debug)]
pub struct MhWithinGibbs {
    size: usize,
    threshold: f64,
    mode: StateHistorySampling,
    max_attempts: usize,
    log_likelihood: f64,
    history: Vec<History>,
    belief: WeightedFilter<BaState>,
}

impl MhWithinGibbs {
    /// `threshold` is the (negative) log likelihood below which the population is re-derived
    pub fn new(size: usize, threshold: f64, mode: StateHistorySampling) -> Result<Self> {
        if size < 1 {
            return Err(FbaError::invalid_parameter(
                "particle_amount".to_string(),
                format!("cannot initiate MH-within-Gibbs with size {}", size),
            ));
        }
        if !(threshold < 0.0) {
            return Err(FbaError::invalid_parameter(
                "threshold".to_string(),
                format!("log likelihood threshold must be negative, is {}", threshold),
            ));
        }

        debug!(size, threshold, ?mode, "created MH-within-Gibbs belief");

        Ok(MhWithinGibbs {
            size,
            threshold,
            mode,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            log_likelihood: 0.0,
            history: Vec::new(),
            belief: WeightedFilter::new(),
        })
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Log likelihood of the observations since the last re-derivation
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    pub fn history(&self) -> &[History] {
        &self.history
    }

    pub fn belief(&self) -> &WeightedFilter<BaState> {
        &self.belief
    }

    pub fn mode(&self) -> StateHistorySampling {
        self.mode
    }

    fn sample_state_history<D, P, R>(
        &self,
        model: &FactoredModel,
        bapomdp: &Fbapomdp<D, P>,
        rng: &mut R,
    ) -> Result<StateSequence>
    where
        D: FactoredDomain,
        P: FactoredPrior,
        R: Rng + ?Sized,
    {
        match self.mode {
            StateHistorySampling::RejectionSampling => {
                rejection_sample_state_history(model, &self.history, bapomdp, self.max_attempts, rng)
            }
            StateHistorySampling::MessagePassing => message_passing_state_history(model, &self.history, bapomdp, rng),
        }
    }

    /// Replaces the population by `size` models drawn with MH-within-Gibbs
    ///
    /// On error the old population is kept.
    pub fn reinvigorate<D, P, R>(&mut self, bapomdp: &Fbapomdp<D, P>, rng: &mut R) -> Result<()>
    where
        D: FactoredDomain,
        P: FactoredPrior,
        R: Rng + ?Sized,
    {
        info!(log_likelihood = self.log_likelihood, "reinvigorating belief");

        let mut fresh = WeightedFilter::new();
        match self.run_chain(bapomdp, &mut fresh, rng) {
            Ok(attempts) => {
                info!(attempts, accepted = fresh.len(), "reinvigoration finished");
                self.belief.free(|s| bapomdp.release_state(s));
                self.belief = fresh;
                self.log_likelihood = 0.0;
                Ok(())
            }
            Err(e) => {
                fresh.free(|s| bapomdp.release_state(s));
                Err(e)
            }
        }
    }

    /// Fills `fresh` with accepted models; returns the number of proposals it took
    fn run_chain<D, P, R>(
        &self,
        bapomdp: &Fbapomdp<D, P>,
        fresh: &mut WeightedFilter<BaState>,
        rng: &mut R,
    ) -> Result<usize>
    where
        D: FactoredDomain,
        P: FactoredPrior,
        R: Rng + ?Sized,
    {
        let seed = self.belief.sample(rng).model.clone();
        let mut states = self.sample_state_history(&seed, bapomdp, rng)?;

        let mut prior = bapomdp.compute_prior_model(&seed.structure())?;
        let mut model = compute_posterior_counts(&prior, &self.history, &states);
        let mut score = model.log_bd_score(&prior);

        let cap = self.max_attempts.saturating_mul(self.size);
        let mut attempts = 0;

        while fresh.len() < self.size {
            if attempts >= cap {
                warn!(attempts, accepted = fresh.len(), "structure search did not fill the population");
                return Err(FbaError::degenerate("mh-within-gibbs", attempts));
            }
            attempts += 1;

            let structure = bapomdp.propose_structure(model.structure(), rng);
            let proposal_prior = bapomdp.compute_prior_model(&structure)?;
            let proposal = compute_posterior_counts(&proposal_prior, &self.history, &states);
            let proposal_score = proposal.log_bd_score(&proposal_prior);

            if rng.gen::<f64>().ln() >= proposal_score - score {
                trace!(attempts, proposal_score, score, "proposal rejected");
                continue;
            }
            debug!(attempts, proposal_score, score, accepted = fresh.len() + 1, "proposal accepted");

            let next_states = self.sample_state_history(&proposal, bapomdp, rng)?;

            assert!(!states.is_empty(), "history without states");
            let domain_state = bapomdp.domain_state(&states[states.len() - 1]);
            fresh.add_weighted(BaState::new(domain_state, proposal), 1.0 / self.size as f64);

            states = next_states;
            prior = proposal_prior;
            model = compute_posterior_counts(&prior, &self.history, &states);
            score = model.log_bd_score(&prior);
        }

        Ok(attempts)
    }
}

impl<D: FactoredDomain, P: FactoredPrior> Belief<Fbapomdp<D, P>> for MhWithinGibbs {
    fn initiate(&mut self, bapomdp: &Fbapomdp<D, P>, rng: &mut dyn RngCore) {
        assert!(self.belief.is_empty(), "belief is already initiated");
        assert!(self.history.is_empty(), "belief already has a history");

        for _ in 0..self.size {
            self.belief
                .add_weighted(bapomdp.sample_start_state(rng), 1.0 / self.size as f64);
        }
        self.history.push(History::new());

        info!(size = self.size, threshold = self.threshold, "initiated MH-within-Gibbs belief");
        debug!("initial belief:\n{}", self.belief.describe(|s| s.index().to_string()));
    }

    fn free(&mut self, bapomdp: &Fbapomdp<D, P>) {
        self.belief.free(|s| bapomdp.release_state(s));
        for episode in &mut self.history {
            episode.clear(bapomdp);
        }
        self.history.clear();
        self.log_likelihood = 0.0;
    }

    fn sample(&self, rng: &mut dyn RngCore) -> &BaState {
        self.belief.sample(rng)
    }

    fn update_estimation(
        &mut self,
        action: Action,
        observation: &Observation,
        bapomdp: &Fbapomdp<D, P>,
        rng: &mut dyn RngCore,
    ) -> Result<()> {
        let total = importance::update(&mut self.belief, action, observation, bapomdp, rng)?;
        self.log_likelihood += total.ln();

        importance::resample(&mut self.belief, bapomdp, self.size, rng);

        if self.history.is_empty() {
            self.history.push(History::new());
        }
        if let Some(episode) = self.history.last_mut() {
            episode.add(bapomdp.copy_action(action), bapomdp.copy_observation(observation));
        }

        if self.log_likelihood < self.threshold {
            self.reinvigorate(bapomdp, rng)?;
        }

        debug!(log_likelihood = self.log_likelihood, "MH-within-Gibbs update");
        trace!("belief:\n{}", self.belief.describe(|s| s.index().to_string()));
        Ok(())
    }

    fn len(&self) -> usize {
        self.belief.len()
    }
}

impl<D: FactoredDomain, P: FactoredPrior> BaBelief<D, P> for MhWithinGibbs {
    fn reset_domain_state_distribution(&mut self, bapomdp: &Fbapomdp<D, P>, rng: &mut dyn RngCore) {
        for state in self.belief.particles_mut() {
            bapomdp.reset_domain_state(state, rng);
        }

        if self.history.last().map_or(true, |episode| !episode.is_empty()) {
            self.history.push(History::new());
        }

        debug!(
            episodes = self.history.len(),
            "reset domain states:\n{}",
            self.belief.describe(|s| s.index().to_string())
        );
    }
}
