use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use rand::Rng;

pub mod monte_carlo;
pub mod td;

// An episodic task the tabular solvers can learn on.
pub trait Episodic {
    type State: Clone + Eq + Hash + Debug;
    type Action: Copy + Eq + Debug;

    // Draws a random initial state.
    fn start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::State;

    // One initial state per distinct starting configuration of the task.
    fn start_states<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Self::State>;

    // Legal actions in a fixed canonical order.
    // Must not be empty for any state reachable from a start state.
    fn legal_actions(&self, state: &Self::State) -> Vec<Self::Action>;

    // Takes the action and returns the next state with the reward.
    // Returns (None, reward) when the action ends the episode.
    fn next_state(&self, state: &Self::State, action: &Self::Action) -> (Option<Self::State>, f64);
}

// Estimate of a single action value.
// For weighted averages `value` equals `numerator / denominator` once `denominator > 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActionRecord {
    pub value: f64,
    pub numerator: f64,
    pub denominator: f64,
}

impl ActionRecord {
    pub fn new(value: f64) -> ActionRecord {
        ActionRecord {
            value: value,
            numerator: 0.0,
            denominator: 0.0,
        }
    }
}

// Legal actions of one state with their estimates, in canonical order.
// The action set is fixed when the state is first seen.
#[derive(Clone, Debug)]
pub struct StateActions<A> {
    actions: Vec<(A, ActionRecord)>,
}

impl<A: Copy + Eq> StateActions<A> {
    fn new(actions: Vec<A>, initial_value: f64) -> StateActions<A> {
        StateActions {
            actions: actions
                .into_iter()
                .map(|a| (a, ActionRecord::new(initial_value)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(A, ActionRecord)> {
        self.actions.iter()
    }

    pub fn record(&self, action: &A) -> Option<&ActionRecord> {
        self.actions
            .iter()
            .find(|(a, _)| a == action)
            .map(|(_, record)| record)
    }

    // Action with the maximum value; ties go to the earliest action in canonical order.
    pub fn best_action(&self) -> A {
        let mut best = &self.actions[0];
        for entry in self.actions.iter().skip(1) {
            if entry.1.value > best.1.value {
                best = entry;
            }
        }
        best.0
    }

    pub fn best_value(&self) -> f64 {
        self.actions
            .iter()
            .map(|(_, record)| record.value)
            .fold(f64::NEG_INFINITY, |a, b| a.max(b))
    }

    pub fn random_action<R: Rng + ?Sized>(&self, rng: &mut R) -> A {
        self.actions[rng.gen_range(0..self.actions.len())].0
    }

    // Chooses the greedy action with (1 - exploration_fraction) probability,
    // otherwise a uniformly random one.
    // Also returns whether the chosen action is the greedy one.
    pub fn epsilon_greedy<R: Rng + ?Sized>(&self, exploration_fraction: f64, rng: &mut R) -> (A, bool) {
        let best = self.best_action();
        if rng.gen::<f64>() >= exploration_fraction {
            return (best, true);
        }
        let action = self.random_action(rng);
        (action, action == best)
    }
}

// Tabular action-value store shared by all episodes of a learning run.
// States are added on first visit and never removed.
#[derive(Clone, Debug)]
pub struct ActionValues<S, A> {
    states: HashMap<S, StateActions<A>>,
    initial_value: f64,
}

impl<S, A> ActionValues<S, A>
where
    S: Clone + Eq + Hash + Debug,
    A: Copy + Eq + Debug,
{
    pub fn new(initial_value: f64) -> ActionValues<S, A> {
        ActionValues {
            states: HashMap::new(),
            initial_value: initial_value,
        }
    }

    pub fn initial_value(&self) -> f64 {
        self.initial_value
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, state: &S) -> Option<&StateActions<A>> {
        self.states.get(state)
    }

    // Returns the state's actions, creating them from `legal_actions` on first visit.
    pub fn get_or_insert<F>(&mut self, state: &S, legal_actions: F) -> &StateActions<A>
    where
        F: FnOnce() -> Vec<A>,
    {
        let initial_value = self.initial_value;
        self.states.entry(state.clone()).or_insert_with(|| {
            let actions = legal_actions();
            assert!(!actions.is_empty(), "No legal actions in state {:?}", state);
            StateActions::new(actions, initial_value)
        })
    }

    pub fn best_action(&self, state: &S) -> Option<A> {
        self.states.get(state).map(|actions| actions.best_action())
    }

    pub fn random_action<R: Rng + ?Sized>(&self, state: &S, rng: &mut R) -> Option<A> {
        self.states.get(state).map(|actions| actions.random_action(rng))
    }

    pub fn record(&self, state: &S, action: &A) -> Option<&ActionRecord> {
        self.states
            .get(state)
            .and_then(|actions| actions.record(action))
    }

    // Overwrites the estimate of a known state-action pair.
    pub fn update(&mut self, state: &S, action: &A, record: ActionRecord) {
        let state_actions = self
            .states
            .get_mut(state)
            .unwrap_or_else(|| panic!("Updating unknown state {:?}", state));
        let entry = state_actions
            .actions
            .iter_mut()
            .find(|(a, _)| a == action)
            .unwrap_or_else(|| panic!("Action {:?} is not legal in state {:?}", action, state));
        entry.1 = record;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&S, &StateActions<A>)> {
        self.states.iter()
    }
}
