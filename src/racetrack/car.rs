use std::fmt;

use rand::Rng;

use crate::error::{Error, Result};
use crate::racetrack::track::{Position, Track};
use crate::solver::Episodic;

// (horizontal, vertical) speed. Both components stay within [0, max_speed].
pub type Speed = (i32, i32);

pub const DEFAULT_MAX_SPEED: i32 = 5;

// Reward for a step whose unclamped destination is on the track.
pub const STEP_REWARD: f64 = -1.0;
// Reward for a step that would drive the car off the track.
pub const OFF_TRACK_REWARD: f64 = -5.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Acceleration {
    pub dx: i32,
    pub dy: i32,
}

impl Acceleration {
    pub const fn new(dx: i32, dy: i32) -> Acceleration {
        Acceleration { dx: dx, dy: dy }
    }
}

// Every acceleration in canonical order. Greedy ties resolve to the earliest one.
pub const ACCELERATIONS: [Acceleration; 9] = [
    Acceleration::new(-1, -1),
    Acceleration::new(-1, 0),
    Acceleration::new(-1, 1),
    Acceleration::new(0, -1),
    Acceleration::new(0, 0),
    Acceleration::new(0, 1),
    Acceleration::new(1, -1),
    Acceleration::new(1, 0),
    Acceleration::new(1, 1),
];

// A decision point of the racetrack task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CarState {
    pub position: Position,
    pub speed: Speed,
}

impl fmt::Display for CarState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "position ({}, {}), speed ({}, {})",
            self.position.0, self.position.1, self.speed.0, self.speed.1
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Car {
    position: Position,
    speed: Speed,
    max_speed: i32,
}

impl Car {
    pub fn new(max_speed: i32) -> Car {
        assert!(max_speed >= 1);
        Car {
            position: (0, 0),
            speed: (0, 0),
            max_speed: max_speed,
        }
    }

    pub fn from_state(state: CarState, max_speed: i32) -> Car {
        Car {
            position: state.position,
            speed: state.speed,
            max_speed: max_speed,
        }
    }

    pub fn state(&self) -> CarState {
        CarState {
            position: self.position,
            speed: self.speed,
        }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    // Puts the car on a random start cell with a random speed.
    pub fn reset<R: Rng + ?Sized>(&mut self, track: &Track, rng: &mut R) {
        let start = track.start_cells();
        let position = start[rng.gen_range(0..start.len())];
        self.reset_at(position, rng);
    }

    // Puts the car at `position` with a random speed that is never (0, 0).
    pub fn reset_at<R: Rng + ?Sized>(&mut self, position: Position, rng: &mut R) {
        let mut horizontal = rng.gen_range(0..=self.max_speed);
        let mut vertical = rng.gen_range(0..=self.max_speed);
        if horizontal == 0 && vertical == 0 {
            if rng.gen_bool(0.5) {
                vertical = 1;
            } else {
                horizontal = 1;
            }
        }
        self.position = position;
        self.speed = (horizontal, vertical);
    }

    // The caller guarantees the resulting speed is legal.
    pub fn apply_acceleration(&mut self, acceleration: Acceleration) {
        self.speed = (
            self.speed.0 + acceleration.dx,
            self.speed.1 + acceleration.dy,
        );
        debug_assert!(is_legal_speed(self.speed, self.max_speed));
    }

    // Moves the car by its speed.
    //
    // When the destination is off the track, the car instead walks one cell at a
    // time, alternating up and right, spending one unit of the matching speed
    // component for every cell it enters. This catches boundaries that a
    // diagonal jump would cross. If the car cannot move at all it is nudged one
    // cell right, or else one cell up.
    pub fn advance(&mut self, track: &Track) {
        let destination = (
            self.position.0 + self.speed.0,
            self.position.1 + self.speed.1,
        );
        if track.is_valid(destination) {
            self.position = destination;
            return;
        }

        let origin = self.position;
        let (mut horizontal, mut vertical) = self.speed;
        // Every round that moves spends at least one unit of speed.
        for _ in 0..=2 * self.max_speed {
            let mut moved = false;

            let up = (self.position.0, self.position.1 + 1);
            if vertical > 0 && track.is_valid(up) {
                self.position = up;
                vertical -= 1;
                moved = true;
            }

            let right = (self.position.0 + 1, self.position.1);
            if horizontal > 0 && track.is_valid(right) {
                self.position = right;
                horizontal -= 1;
                moved = true;
            }

            if !moved {
                break;
            }
        }

        if self.position == origin {
            let right = (origin.0 + 1, origin.1);
            let up = (origin.0, origin.1 + 1);
            if track.is_valid(right) {
                self.position = right;
            } else if track.is_valid(up) {
                self.position = up;
            }
        }
    }
}

fn is_legal_speed(speed: Speed, max_speed: i32) -> bool {
    (0..=max_speed).contains(&speed.0) && (0..=max_speed).contains(&speed.1) && speed != (0, 0)
}

// Accelerations that keep the speed in range and the car moving, in canonical order.
pub fn legal_accelerations(speed: Speed, max_speed: i32) -> Vec<Acceleration> {
    ACCELERATIONS
        .iter()
        .filter(|a| is_legal_speed((speed.0 + a.dx, speed.1 + a.dy), max_speed))
        .copied()
        .collect()
}

/// The racetrack as an episodic task: states are car positions and speeds,
/// actions are accelerations, and an episode ends on a finish cell.
#[derive(Clone, Debug)]
pub struct Racetrack {
    track: Track,
    max_speed: i32,
}

impl Racetrack {
    // Fails on tracks with a dead end, where an episode could never finish.
    pub fn new(track: Track, max_speed: i32) -> Result<Racetrack> {
        assert!(max_speed >= 1);
        if let Some((col, row)) = track.dead_end() {
            return Err(Error::DeadEnd { col: col, row: row });
        }
        Ok(Racetrack {
            track: track,
            max_speed: max_speed,
        })
    }

    pub fn track(&self) -> &Track {
        &self.track
    }

    pub fn max_speed(&self) -> i32 {
        self.max_speed
    }

    // -1 if position + speed + acceleration lands on the track, -5 otherwise.
    pub fn reward(&self, state: &CarState, acceleration: &Acceleration) -> f64 {
        let destination = (
            state.position.0 + state.speed.0 + acceleration.dx,
            state.position.1 + state.speed.1 + acceleration.dy,
        );
        if self.track.is_valid(destination) {
            STEP_REWARD
        } else {
            OFF_TRACK_REWARD
        }
    }
}

impl Episodic for Racetrack {
    type State = CarState;
    type Action = Acceleration;

    fn start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> CarState {
        let mut car = Car::new(self.max_speed);
        car.reset(&self.track, rng);
        car.state()
    }

    fn start_states<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<CarState> {
        self.track
            .start_cells()
            .iter()
            .map(|position| {
                let mut car = Car::new(self.max_speed);
                car.reset_at(*position, rng);
                car.state()
            })
            .collect()
    }

    fn legal_actions(&self, state: &CarState) -> Vec<Acceleration> {
        legal_accelerations(state.speed, self.max_speed)
    }

    fn next_state(&self, state: &CarState, action: &Acceleration) -> (Option<CarState>, f64) {
        let reward = self.reward(state, action);

        let mut car = Car::from_state(*state, self.max_speed);
        car.apply_acceleration(*action);
        car.advance(&self.track);

        if self.track.is_finish(car.position()) {
            (None, reward)
        } else {
            (Some(car.state()), reward)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::racetrack::track::{Preset, RowDescriptor};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use test_case::test_case;

    fn car_at(position: Position, speed: Speed) -> Car {
        Car::from_state(
            CarState {
                position: position,
                speed: speed,
            },
            DEFAULT_MAX_SPEED,
        )
    }

    // A 3 wide corridor four rows high with a ledge to the right at the top.
    //   row 3: . . . . . .
    //   row 2: . . .
    //   row 1: . . .
    //   row 0: S S S
    fn corner_track() -> Track {
        Track::new(&[RowDescriptor::repeated(0, 3, 3), RowDescriptor::new(0, 6)]).unwrap()
    }

    #[test]
    fn reset_never_leaves_car_stationary() {
        let track = Preset::Narrow.track().unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut car = Car::new(DEFAULT_MAX_SPEED);
        for _ in 0..1000 {
            car.reset(&track, &mut rng);
            let (h, v) = car.speed();
            assert!(h >= 0 && h <= DEFAULT_MAX_SPEED);
            assert!(v >= 0 && v <= DEFAULT_MAX_SPEED);
            assert!(h > 0 || v > 0);
            assert!(track.start_cells().contains(&car.position()));
        }
    }

    #[test]
    fn reset_with_single_speed_forces_one_axis() {
        // With max speed 1 both components are often drawn as 0.
        let mut rng = StdRng::seed_from_u64(9);
        let mut car = Car::new(1);
        let mut forced = 0;
        for _ in 0..200 {
            car.reset_at((0, 0), &mut rng);
            let (h, v) = car.speed();
            assert_eq!(car.position(), (0, 0));
            assert!(h + v >= 1);
            if h + v == 1 {
                forced += 1;
            }
        }
        assert!(forced > 0);
    }

    #[test]
    fn advance_moves_directly_when_destination_is_valid() {
        let track = corner_track();
        let mut car = car_at((0, 0), (1, 2));
        car.advance(&track);
        assert_eq!(car.position(), (1, 2));
        assert_eq!(car.speed(), (1, 2));
    }

    #[test]
    fn advance_walks_around_corner() {
        let track = corner_track();
        // (0, 0) + (4, 3) lands on (4, 3), which is valid.
        let mut car = car_at((0, 0), (4, 3));
        car.advance(&track);
        assert_eq!(car.position(), (4, 3));

        // (0, 0) + (4, 2) lands on (4, 2), which is off the track.
        // Up to (0, 1), right to (1, 1), up to (1, 2), right to (2, 2),
        // then up is spent and right is blocked.
        let mut car = car_at((0, 0), (4, 2));
        car.advance(&track);
        assert_eq!(car.position(), (2, 2));
    }

    #[test]
    fn advance_stops_slow_walk_at_boundary() {
        // (0, 1) + (3, 3) overshoots the top of the corridor.
        // Up to (0, 2), right to (1, 2), up to (1, 3), right to (2, 3),
        // up is blocked then right continues to (3, 3).
        let track = corner_track();
        let mut car = car_at((0, 1), (3, 3));
        car.advance(&track);
        assert_eq!(car.position(), (3, 3));
        assert_eq!(car.speed(), (3, 3));
    }

    #[test]
    fn advance_nudges_right_when_stuck() {
        let track = corner_track();
        // Moving up is impossible from the top row and the car has no horizontal speed.
        let mut car = car_at((0, 3), (0, 5));
        car.advance(&track);
        assert_eq!(car.position(), (1, 3));
    }

    #[test]
    fn advance_nudges_up_when_right_is_blocked() {
        let track = corner_track();
        let mut car = car_at((2, 0), (5, 0));
        car.advance(&track);
        assert_eq!(car.position(), (2, 1));
    }

    #[test]
    fn advance_stays_in_dead_end() {
        let track = Track::new(&[RowDescriptor::new(0, 1)]).unwrap();
        let mut car = car_at((0, 0), (1, 1));
        car.advance(&track);
        assert_eq!(car.position(), (0, 0));
    }

    #[test_case((0, 1), &[(0, 0), (0, 1), (1, -1), (1, 0), (1, 1)]; "slow vertical")]
    #[test_case((1, 0), &[(-1, 1), (0, 0), (0, 1), (1, 0), (1, 1)]; "slow horizontal")]
    #[test_case((5, 5), &[(-1, -1), (-1, 0), (0, -1), (0, 0)]; "full speed")]
    #[test_case((1, 1), &[(-1, 0), (-1, 1), (0, -1), (0, 0), (0, 1), (1, -1), (1, 0), (1, 1)]; "both slow")]
    fn legal_accelerations_test(speed: Speed, expected: &[(i32, i32)]) {
        let actions: Vec<(i32, i32)> = legal_accelerations(speed, DEFAULT_MAX_SPEED)
            .iter()
            .map(|a| (a.dx, a.dy))
            .collect();
        assert_eq!(actions, expected.to_vec());
    }

    #[test]
    fn legal_accelerations_keep_speed_in_range() {
        for h in 0..=DEFAULT_MAX_SPEED {
            for v in 0..=DEFAULT_MAX_SPEED {
                if h == 0 && v == 0 {
                    continue;
                }
                let actions = legal_accelerations((h, v), DEFAULT_MAX_SPEED);
                assert!(!actions.is_empty());
                assert!(actions.contains(&Acceleration::new(0, 0)));
                for a in actions {
                    let mut car = car_at((0, 0), (h, v));
                    car.apply_acceleration(a);
                    assert!(is_legal_speed(car.speed(), DEFAULT_MAX_SPEED));
                }
            }
        }
    }

    #[test]
    fn reward_penalizes_leaving_track() {
        let task = Racetrack::new(corner_track(), DEFAULT_MAX_SPEED).unwrap();
        let state = CarState {
            position: (0, 0),
            speed: (1, 1),
        };
        assert_eq!(task.reward(&state, &Acceleration::new(0, 0)), STEP_REWARD);
        assert_eq!(task.reward(&state, &Acceleration::new(1, 0)), STEP_REWARD);
        assert_eq!(task.reward(&state, &Acceleration::new(1, 1)), STEP_REWARD);
        let fast = CarState {
            position: (0, 0),
            speed: (3, 1),
        };
        assert_eq!(task.reward(&fast, &Acceleration::new(0, 0)), OFF_TRACK_REWARD);
    }

    #[test]
    fn next_state_ends_on_finish() {
        let task = Racetrack::new(corner_track(), DEFAULT_MAX_SPEED).unwrap();
        let finish = task.track().finish_cells().to_vec();
        assert_eq!(finish, vec![(5, 3)]);

        let state = CarState {
            position: (1, 3),
            speed: (3, 0),
        };
        let (next, reward) = task.next_state(&state, &Acceleration::new(1, 0));
        assert_eq!(next, None);
        assert_eq!(reward, STEP_REWARD);

        let (next, reward) = task.next_state(&state, &Acceleration::new(0, 0));
        assert_eq!(
            next,
            Some(CarState {
                position: (4, 3),
                speed: (3, 0),
            })
        );
        assert_eq!(reward, STEP_REWARD);
    }

    #[test]
    fn track_with_dead_end_is_rejected() {
        // From (1, 0) both (2, 0) and (1, 1) are off the track.
        let track = Track::parse("0,2; 2,2").unwrap();
        assert_eq!(
            Racetrack::new(track, DEFAULT_MAX_SPEED).unwrap_err(),
            Error::DeadEnd { col: 1, row: 0 }
        );
    }

    #[test]
    fn start_states_cover_every_start_cell() {
        let task = Racetrack::new(Preset::Narrow.track().unwrap(), DEFAULT_MAX_SPEED).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let starts = task.start_states(&mut rng);
        let positions: Vec<Position> = starts.iter().map(|s| s.position).collect();
        assert_eq!(positions, task.track().start_cells().to_vec());
        for state in starts {
            assert!(!task.legal_actions(&state).is_empty());
        }
    }
}
