pub mod car;
pub mod track;

use plotlib::{
    page::Page,
    repr::Plot,
    style::{PointMarker, PointStyle},
    view::ContinuousView,
};
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::error::Result;
use crate::solver::monte_carlo::*;
use crate::solver::ActionValues;

pub use car::{Acceleration, Car, CarState, Racetrack};
pub use track::{Position, Preset, RowDescriptor, Track};

pub type RacetrackControl = OffPolicyControl<CarState, Acceleration>;

// Number of points on the learning curve.
const CURVE_POINTS: usize = 100;

pub fn new_control(config: &TrainingConfig) -> RacetrackControl {
    OffPolicyControl::new(
        ActionValues::new(INITIAL_ACTION_VALUE),
        config.epsilon,
        config.discount,
        config.rng(),
    )
    .with_return_accounting(config.return_accounting)
    .with_progress_interval(config.progress_interval)
}

// Cells the car occupied during an episode, ending with the cell it finished on.
pub fn trajectory_positions(
    task: &Racetrack,
    episode: &Episode<CarState, Acceleration>,
) -> Vec<Position> {
    let mut positions: Vec<Position> = episode.steps.iter().map(|s| s.state.position).collect();
    if let Some(last) = episode.steps.last() {
        let mut car = Car::from_state(last.state, task.max_speed());
        car.apply_acceleration(last.action);
        car.advance(task.track());
        positions.push(car.position());
    }
    positions
}

pub fn print_learning_curve(summary: &TrainingSummary) {
    if summary.episodes() == 0 {
        return;
    }
    let window = (summary.episodes() / CURVE_POINTS).max(1);
    let values = summary.windowed_averages(window);

    let s1 = Plot::new(values).point_style(PointStyle::new().marker(PointMarker::Circle));
    let v = ContinuousView::new()
        .add(s1)
        .x_range(0.0, summary.episodes() as f64)
        .x_label("Episode")
        .y_label("Average steps");
    match Page::single(&v).dimensions(100, 30).to_text() {
        Ok(text) => println!("{}", text),
        Err(e) => warn!("Could not plot learning curve: {}", e),
    }
}

pub fn print_report(task: &Racetrack, episodes: &[Episode<CarState, Acceleration>]) {
    for episode in episodes {
        if let Some(first) = episode.steps.first() {
            println!("Start: {}, steps: {}", first.state, episode.len());
        }
        task.track()
            .trajectory_table(&trajectory_positions(task, episode))
            .printstd();
    }
}

pub fn run(config: &TrainingConfig, track: Track) -> Result<()> {
    info!(
        width = track.width(),
        height = track.height(),
        start_cells = track.start_cells().len(),
        finish_cells = track.finish_cells().len(),
        "Built track"
    );
    println!("{}", track);

    let task = Racetrack::new(track, config.max_speed)?;
    let mut control = new_control(config);
    let summary = control.train(&task, config.iterations);
    print_learning_curve(&summary);

    let window = summary.episodes().min(1000);
    println!(
        "Average steps: first {} episodes {:.2}, last {} episodes {:.2}, {} of {} discarded",
        window,
        summary.average_length(0..window),
        window,
        summary.average_length(summary.episodes() - window..summary.episodes()),
        summary.discarded,
        summary.episodes()
    );

    let episodes = control.report(&task);
    print_report(&task, &episodes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::Episodic;

    fn config(seed: u64, iterations: u64) -> TrainingConfig {
        TrainingConfig {
            iterations: iterations,
            seed: Some(seed),
            progress_interval: 0,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn training_shortens_episodes_on_narrow_track() {
        let config = config(2024, 30_000);
        let task = Racetrack::new(config.build_track().unwrap(), config.max_speed).unwrap();
        let mut control = new_control(&config);
        let summary = control.train(&task, config.iterations);

        assert_eq!(summary.episodes(), 30_000);
        let first = summary.average_length(0..1000);
        let last = summary.average_length(29_000..30_000);
        println!("First: {:.2}, last: {:.2}", first, last);
        assert!(last < first);
    }

    #[test]
    fn report_reaches_finish_from_every_start_cell() {
        let config = config(11, 2000);
        let task = Racetrack::new(config.build_track().unwrap(), config.max_speed).unwrap();
        let mut control = new_control(&config);
        control.train(&task, config.iterations);

        let episodes = control.report(&task);
        assert_eq!(episodes.len(), task.track().start_cells().len());
        for (episode, start) in episodes.iter().zip(task.track().start_cells()) {
            assert!(!episode.is_empty());
            assert_eq!(episode.steps[0].state.position, *start);
            assert!(episode.steps.iter().all(|s| s.greedy));

            let last = episode.steps.last().unwrap();
            assert_eq!(task.next_state(&last.state, &last.action).0, None);
            let positions = trajectory_positions(&task, episode);
            assert_eq!(positions.len(), episode.len() + 1);
            assert!(task.track().is_finish(*positions.last().unwrap()));
        }
    }

    #[test]
    fn greedy_episodes_are_discarded() {
        let config = TrainingConfig {
            epsilon: 0.0,
            ..config(3, 50)
        };
        let task = Racetrack::new(config.build_track().unwrap(), config.max_speed).unwrap();
        let mut control = new_control(&config);

        let episode = control.generate_episode(&task);
        assert_eq!(episode.first_exploratory, None);
        assert!(episode.exploratory_suffix().is_none());

        let summary = control.train(&task, config.iterations);
        assert_eq!(summary.discarded, 50);
        assert_eq!(summary.episodes(), 50);
        for (_, actions) in control.action_values().iter() {
            for (_, record) in actions.iter() {
                assert_eq!(record.value, INITIAL_ACTION_VALUE);
                assert_eq!(record.denominator, 0.0);
            }
        }
    }

    #[test]
    fn custom_rows_train_to_completion() {
        let config = TrainingConfig {
            rows: Some(vec![vec![0, 3], vec![1, 2]]),
            max_speed: 2,
            ..config(5, 200)
        };
        let task = Racetrack::new(config.build_track().unwrap(), config.max_speed).unwrap();
        let mut control = new_control(&config);
        let summary = control.train(&task, config.iterations);
        assert_eq!(summary.episodes(), 200);
        assert!(summary.episode_lengths.iter().all(|l| *l >= 1));
    }
}
