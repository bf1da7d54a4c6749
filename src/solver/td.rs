use rand::Rng;
use tracing::info;

use crate::solver::*;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QLearningParams {
    pub alpha: f64,
    pub discount: f64,
    pub exploration_fraction: f64,
}

impl Default for QLearningParams {
    fn default() -> Self {
        QLearningParams {
            alpha: 0.9,
            discount: 0.9,
            exploration_fraction: 0.05,
        }
    }
}

// Tabular Q-learning with an ε-greedy behavior policy.
// Action values are updated after every step:
//   Q(S, A) ← Q(S, A) + α∙[R + γ∙max Q(S₊₁, a) - Q(S, A)],
// where the maximum is taken as 0 once the episode has ended.
// Returns the number of steps of every episode.
pub fn q_learning<T, R>(
    task: &T,
    action_values: &mut ActionValues<T::State, T::Action>,
    params: &QLearningParams,
    episodes: u64,
    rng: &mut R,
) -> Vec<usize>
where
    T: Episodic,
    R: Rng + ?Sized,
{
    info!(
        episodes,
        alpha = params.alpha,
        discount = params.discount,
        epsilon = params.exploration_fraction,
        "Starting Q-learning"
    );

    let mut lengths = Vec::with_capacity(episodes as usize);
    for _ in 0..episodes {
        let mut state = task.start_state(rng);
        let mut steps = 0;
        loop {
            let (action, _) = action_values
                .get_or_insert(&state, || task.legal_actions(&state))
                .epsilon_greedy(params.exploration_fraction, rng);
            let record = *action_values
                .record(&state, &action)
                .unwrap_or_else(|| panic!("No estimate for {:?} in {:?}", action, state));

            let (maybe_new_state, reward) = task.next_state(&state, &action);
            steps += 1;

            let returns = match &maybe_new_state {
                Some(new_state) => action_values
                    .get_or_insert(new_state, || task.legal_actions(new_state))
                    .best_value(),
                None => 0.0,
            };
            let value =
                record.value + params.alpha * (reward + params.discount * returns - record.value);
            action_values.update(
                &state,
                &action,
                ActionRecord {
                    value: value,
                    ..record
                },
            );

            match maybe_new_state {
                Some(new_state) => state = new_state,
                None => break,
            }
        }
        lengths.push(steps);
    }
    lengths
}

#[derive(Clone, Debug, PartialEq)]
pub struct GreedyPath<S> {
    // Visited states, starting with the start state.
    pub states: Vec<S>,
    pub total_reward: f64,
    pub finished: bool,
}

// Follows the greedy policy from `start` for at most `max_steps` steps.
// States never seen during learning take their first legal action.
pub fn greedy_path<T>(
    task: &T,
    action_values: &ActionValues<T::State, T::Action>,
    start: T::State,
    max_steps: usize,
) -> GreedyPath<T::State>
where
    T: Episodic,
{
    let mut path = GreedyPath {
        states: vec![start.clone()],
        total_reward: 0.0,
        finished: false,
    };
    let mut state = start;
    for _ in 0..max_steps {
        let action = match action_values.best_action(&state) {
            Some(action) => action,
            None => match task.legal_actions(&state).first() {
                Some(action) => *action,
                None => break,
            },
        };
        let (maybe_new_state, reward) = task.next_state(&state, &action);
        path.total_reward += reward;
        match maybe_new_state {
            Some(new_state) => {
                path.states.push(new_state.clone());
                state = new_state;
            }
            None => {
                path.finished = true;
                break;
            }
        }
    }
    path
}
