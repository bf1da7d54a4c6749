use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Range;
use std::str::FromStr;

use rand::rngs::StdRng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::Error;
use crate::solver::*;

// Value given to actions that have never been updated.
// Strongly pessimistic, so any action that was actually tried looks better.
pub const INITIAL_ACTION_VALUE: f64 = -1.0e6;

#[derive(Clone, Debug, PartialEq)]
pub struct Step<S, A> {
    pub state: S,
    pub action: A,
    pub reward: f64,
    // Whether the behavior policy picked the greedy action.
    pub greedy: bool,
}

#[derive(Clone, Debug)]
pub struct Episode<S, A> {
    pub steps: Vec<Step<S, A>>,
    // Index of the first step where a non-greedy action was taken.
    pub first_exploratory: Option<usize>,
}

impl<S, A> Episode<S, A> {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    // Steps from the first non-greedy action to the end.
    // None if every action was greedy, i.e. the episode carries nothing to learn from.
    pub fn exploratory_suffix(&self) -> Option<&[Step<S, A>]> {
        self.first_exploratory.map(|i| &self.steps[i..])
    }
}

// Order in which the returns and importance weights are accumulated over
// the kept part of an episode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnAccounting {
    // Steps in the order they occurred; the weight is updated before the return.
    Forward,
    // Steps from the episode end back to the first exploratory action,
    // with the weight updated after each step (Sutton & Barto, section 5.7).
    Backward,
}

impl Default for ReturnAccounting {
    fn default() -> Self {
        ReturnAccounting::Forward
    }
}

impl FromStr for ReturnAccounting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(ReturnAccounting::Forward),
            "backward" => Ok(ReturnAccounting::Backward),
            other => Err(Error::Config(format!(
                "unknown return accounting '{}' (expected 'forward' or 'backward')",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct TrainingSummary {
    // Length of every generated episode, discarded ones included.
    pub episode_lengths: Vec<usize>,
    // Number of fully greedy episodes that were not used for updates.
    pub discarded: u64,
    // Number of states in the action-value store after training.
    pub states: usize,
}

impl TrainingSummary {
    pub fn episodes(&self) -> usize {
        self.episode_lengths.len()
    }

    pub fn average_length(&self, range: Range<usize>) -> f64 {
        let lengths = &self.episode_lengths[range];
        if lengths.is_empty() {
            return 0.0;
        }
        lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
    }

    // Average episode length over consecutive windows, as (episode, average) points.
    pub fn windowed_averages(&self, window: usize) -> Vec<(f64, f64)> {
        assert!(window > 0);
        self.episode_lengths
            .chunks(window)
            .enumerate()
            .map(|(i, chunk)| {
                let average = chunk.iter().sum::<usize>() as f64 / chunk.len() as f64;
                ((i * window + chunk.len()) as f64, average)
            })
            .collect()
    }
}

// Probability that the epsilon-soft behavior policy took an action.
fn behavior_probability(exploration_fraction: f64, action_count: usize, greedy: bool) -> f64 {
    let random_probability = exploration_fraction / action_count as f64;
    if greedy {
        1.0 - exploration_fraction + random_probability
    } else {
        random_probability
    }
}

// Off-policy Monte Carlo control with weighted importance sampling.
// Episodes are generated by an epsilon-soft policy around the current greedy policy.
pub struct OffPolicyControl<S, A> {
    action_values: ActionValues<S, A>,
    exploration_fraction: f64,
    discount: f64,
    return_accounting: ReturnAccounting,
    progress_interval: u64,
    rng: StdRng,
}

impl<S, A> OffPolicyControl<S, A>
where
    S: Clone + Eq + Hash + Debug,
    A: Copy + Eq + Debug,
{
    pub fn new(
        action_values: ActionValues<S, A>,
        exploration_fraction: f64,
        discount: f64,
        rng: StdRng,
    ) -> OffPolicyControl<S, A> {
        assert!((0.0..=1.0).contains(&exploration_fraction));
        OffPolicyControl {
            action_values: action_values,
            exploration_fraction: exploration_fraction,
            discount: discount,
            return_accounting: ReturnAccounting::default(),
            progress_interval: 0,
            rng: rng,
        }
    }

    pub fn with_return_accounting(mut self, return_accounting: ReturnAccounting) -> Self {
        self.return_accounting = return_accounting;
        self
    }

    // Log progress every `interval` episodes (0 disables progress logs).
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn action_values(&self) -> &ActionValues<S, A> {
        &self.action_values
    }

    pub fn exploration_fraction(&self) -> f64 {
        self.exploration_fraction
    }

    fn choose_action<T>(&mut self, task: &T, state: &S) -> (A, bool)
    where
        T: Episodic<State = S, Action = A>,
    {
        let state_actions = self
            .action_values
            .get_or_insert(state, || task.legal_actions(state));
        state_actions.epsilon_greedy(self.exploration_fraction, &mut self.rng)
    }

    pub fn generate_episode<T>(&mut self, task: &T) -> Episode<S, A>
    where
        T: Episodic<State = S, Action = A>,
    {
        let start = task.start_state(&mut self.rng);
        self.generate_episode_from(task, start)
    }

    // Runs the behavior policy from `start` until the task signals the episode end.
    pub fn generate_episode_from<T>(&mut self, task: &T, start: S) -> Episode<S, A>
    where
        T: Episodic<State = S, Action = A>,
    {
        let mut state = start;
        let mut steps = Vec::new();
        let mut first_exploratory = None;
        loop {
            let (action, greedy) = self.choose_action(task, &state);
            if !greedy && first_exploratory.is_none() {
                first_exploratory = Some(steps.len());
            }

            let (new_state, reward) = task.next_state(&state, &action);
            steps.push(Step {
                state: state,
                action: action,
                reward: reward,
                greedy: greedy,
            });
            match new_state {
                Some(s) => state = s,
                None => break,
            }
        }

        Episode {
            steps: steps,
            first_exploratory: first_exploratory,
        }
    }

    // Folds one observed return into the weighted average of the step's action value.
    fn accumulate(&mut self, step: &Step<S, A>, weight: f64, returns: f64) {
        let record = *self
            .action_values
            .record(&step.state, &step.action)
            .unwrap_or_else(|| panic!("No estimate for {:?} in {:?}", step.action, step.state));
        let numerator = record.numerator + weight * returns;
        let denominator = record.denominator + weight;
        self.action_values.update(
            &step.state,
            &step.action,
            ActionRecord {
                value: numerator / denominator,
                numerator: numerator,
                denominator: denominator,
            },
        );
    }

    fn behavior_probability(&self, step: &Step<S, A>) -> f64 {
        let action_count = self
            .action_values
            .get(&step.state)
            .map_or(0, |actions| actions.len());
        assert!(action_count > 0, "Unknown state {:?}", step.state);
        behavior_probability(self.exploration_fraction, action_count, step.greedy)
    }

    // Updates action values from the kept part of an episode.
    //
    // Forward accounting, for each step in order:
    //   W ← W / b(A|S),  G ← γ∙G + R,  N ← N + W∙G,  D ← D + W,  Q ← N / D.
    // Backward accounting walks the steps in reverse and divides W by b(A|S)
    // after the step is folded in.
    pub fn update(&mut self, steps: &[Step<S, A>]) {
        let mut weight = 1.0;
        let mut returns = 0.0;
        match self.return_accounting {
            ReturnAccounting::Forward => {
                for step in steps {
                    weight /= self.behavior_probability(step);
                    returns = self.discount * returns + step.reward;
                    self.accumulate(step, weight, returns);
                }
            }
            ReturnAccounting::Backward => {
                for step in steps.iter().rev() {
                    returns = self.discount * returns + step.reward;
                    self.accumulate(step, weight, returns);
                    weight /= self.behavior_probability(step);
                }
            }
        }
    }

    // Generates `iterations` episodes and learns from every one that explored.
    pub fn train<T>(&mut self, task: &T, iterations: u64) -> TrainingSummary
    where
        T: Episodic<State = S, Action = A>,
    {
        info!(
            iterations,
            epsilon = self.exploration_fraction,
            discount = self.discount,
            accounting = ?self.return_accounting,
            "Starting off-policy Monte Carlo control"
        );

        let mut summary = TrainingSummary::default();
        for i in 0..iterations {
            let episode = self.generate_episode(task);
            summary.episode_lengths.push(episode.len());

            match episode.exploratory_suffix() {
                Some(suffix) => self.update(suffix),
                None => {
                    summary.discarded += 1;
                    debug!(episode = i, steps = episode.len(), "Discarding fully greedy episode");
                }
            }

            let done = i + 1;
            if self.progress_interval > 0 && done % self.progress_interval == 0 {
                let window = self.progress_interval as usize;
                let end = summary.episodes();
                info!(
                    episodes = done,
                    states = self.action_values.len(),
                    discarded = summary.discarded,
                    average_steps = summary.average_length(end.saturating_sub(window)..end),
                    "Training progress"
                );
            }
        }

        summary.states = self.action_values.len();
        info!(
            episodes = summary.episodes(),
            states = summary.states,
            discarded = summary.discarded,
            "Training finished"
        );
        summary
    }

    // One purely greedy episode from each of the task's start states.
    pub fn report<T>(&mut self, task: &T) -> Vec<Episode<S, A>>
    where
        T: Episodic<State = S, Action = A>,
    {
        let exploration_fraction = self.exploration_fraction;
        self.exploration_fraction = 0.0;

        let starts = task.start_states(&mut self.rng);
        let episodes = starts
            .into_iter()
            .map(|start| self.generate_episode_from(task, start))
            .collect();

        self.exploration_fraction = exploration_fraction;
        episodes
    }
}
