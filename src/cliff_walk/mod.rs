use std::collections::HashSet;

use prettytable::{Cell, Row, Table};
use rand::Rng;
use tracing::info;

use crate::config::CliffConfig;
use crate::solver::td::*;
use crate::solver::*;

pub type Point = (i32, i32);

const STEP_REWARD: f64 = -1.0;
const CLIFF_REWARD: f64 = -100.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Move {
    Up,
    Down,
    Left,
    Right,
}

const MOVES: [Move; 4] = [Move::Up, Move::Down, Move::Left, Move::Right];

impl Move {
    fn delta(self) -> Point {
        match self {
            Move::Up => (0, 1),
            Move::Down => (0, -1),
            Move::Left => (-1, 0),
            Move::Right => (1, 0),
        }
    }
}

/// Grid with the start in the bottom left corner, the goal in the bottom
/// right corner and a cliff between them. Walking into the cliff costs 100
/// and sends the agent back to the start.
#[derive(Clone, Copy, Debug)]
pub struct CliffWalk {
    width: i32,
    height: i32,
}

impl CliffWalk {
    pub fn new(width: i32, height: i32) -> CliffWalk {
        assert!(width >= 3 && height >= 2);
        CliffWalk {
            width: width,
            height: height,
        }
    }

    pub fn start(&self) -> Point {
        (0, 0)
    }

    pub fn goal(&self) -> Point {
        (self.width - 1, 0)
    }

    pub fn is_cliff(&self, cell: Point) -> bool {
        cell.1 == 0 && cell.0 > 0 && cell.0 < self.width - 1
    }

    fn contains(&self, cell: Point) -> bool {
        cell.0 >= 0 && cell.0 < self.width && cell.1 >= 0 && cell.1 < self.height
    }

    // Top row first. The path is drawn with `*`.
    pub fn render_path(&self, path: &[Point]) -> Table {
        let visited: HashSet<&Point> = path.iter().collect();
        let mut table = Table::new();
        for y in (0..self.height).rev() {
            let cells = (0..self.width)
                .map(|x| {
                    let glyph = if (x, y) == self.start() {
                        "S"
                    } else if (x, y) == self.goal() {
                        "G"
                    } else if self.is_cliff((x, y)) {
                        "C"
                    } else if visited.contains(&(x, y)) {
                        "*"
                    } else {
                        "."
                    };
                    Cell::new(glyph)
                })
                .collect();
            table.add_row(Row::new(cells));
        }
        table
    }
}

impl Episodic for CliffWalk {
    type State = Point;
    type Action = Move;

    fn start_state<R: Rng + ?Sized>(&self, _rng: &mut R) -> Point {
        self.start()
    }

    fn start_states<R: Rng + ?Sized>(&self, _rng: &mut R) -> Vec<Point> {
        vec![self.start()]
    }

    fn legal_actions(&self, state: &Point) -> Vec<Move> {
        MOVES
            .iter()
            .filter(|m| {
                let (dx, dy) = m.delta();
                self.contains((state.0 + dx, state.1 + dy))
            })
            .copied()
            .collect()
    }

    fn next_state(&self, state: &Point, action: &Move) -> (Option<Point>, f64) {
        let (dx, dy) = action.delta();
        let cell = (state.0 + dx, state.1 + dy);
        if cell == self.goal() {
            (None, STEP_REWARD)
        } else if self.is_cliff(cell) {
            (Some(self.start()), CLIFF_REWARD)
        } else {
            (Some(cell), STEP_REWARD)
        }
    }
}

pub fn run<R: Rng + ?Sized>(config: &CliffConfig, rng: &mut R) {
    let task = CliffWalk::new(config.width, config.height);
    let params = QLearningParams {
        alpha: config.alpha,
        discount: config.discount,
        exploration_fraction: config.epsilon,
    };

    let mut action_values = ActionValues::new(0.0);
    let lengths = q_learning(&task, &mut action_values, &params, config.episodes, rng);
    let tail = &lengths[lengths.len().saturating_sub(100)..];
    if !tail.is_empty() {
        info!(
            average_steps = tail.iter().sum::<usize>() as f64 / tail.len() as f64,
            "Average length of the last {} episodes",
            tail.len()
        );
    }

    let max_steps = (config.width * config.height) as usize;
    let path = greedy_path(&task, &action_values, task.start(), max_steps);
    task.render_path(&path.states).printstd();
    if path.finished {
        println!("Greedy path: {} steps, reward {}", path.states.len(), path.total_reward);
    } else {
        println!("Greedy path does not reach the goal in {} steps", max_steps);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn legal_moves_stay_on_grid() {
        let task = CliffWalk::new(12, 4);
        assert_eq!(task.legal_actions(&(0, 0)), vec![Move::Up, Move::Right]);
        assert_eq!(task.legal_actions(&(11, 3)), vec![Move::Down, Move::Left]);
        assert_eq!(
            task.legal_actions(&(5, 2)),
            vec![Move::Up, Move::Down, Move::Left, Move::Right]
        );
    }

    #[test]
    fn cliff_sends_agent_back_to_start() {
        let task = CliffWalk::new(12, 4);
        assert_eq!(task.next_state(&(0, 0), &Move::Right), (Some((0, 0)), CLIFF_REWARD));
        assert_eq!(task.next_state(&(4, 1), &Move::Down), (Some((0, 0)), CLIFF_REWARD));
        assert_eq!(task.next_state(&(0, 0), &Move::Up), (Some((0, 1)), STEP_REWARD));
        assert_eq!(task.next_state(&(11, 1), &Move::Down), (None, STEP_REWARD));
        assert_eq!(task.next_state(&(10, 0), &Move::Right), (None, STEP_REWARD));
    }

    #[test]
    fn q_learning_finds_path_along_cliff() {
        let task = CliffWalk::new(12, 4);
        let mut action_values = ActionValues::new(0.0);
        let mut rng = StdRng::seed_from_u64(12);
        let lengths = q_learning(
            &task,
            &mut action_values,
            &QLearningParams::default(),
            5000,
            &mut rng,
        );
        assert_eq!(lengths.len(), 5000);

        let path = greedy_path(&task, &action_values, task.start(), 48);
        println!("{:?}", path);
        assert!(path.finished);
        assert!(path.states.iter().all(|c| !task.is_cliff(*c)));
        assert!(path.total_reward >= -20.0);
    }

    #[test]
    fn render_marks_path() {
        let task = CliffWalk::new(4, 2);
        let rendered = task.render_path(&[(0, 0), (0, 1), (1, 1), (2, 1), (3, 1)]).to_string();
        let lines: Vec<&str> = rendered.lines().collect();
        assert!(lines.iter().any(|l| l.contains("| * | * | * | * |")));
        assert!(lines.iter().any(|l| l.contains("| S | C | C | G |")));
    }
}
