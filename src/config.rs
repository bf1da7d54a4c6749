use std::path::Path;

use config_file::FromConfigFile;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::racetrack::car::DEFAULT_MAX_SPEED;
use crate::racetrack::track::{Preset, Track};
use crate::solver::monte_carlo::ReturnAccounting;

/// Settings of a training run, read from a TOML file.
/// Every field is optional in the file and falls back to its default.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of generated episodes, discarded ones included.
    pub iterations: u64,
    /// Probability of a random action in the behavior policy.
    pub epsilon: f64,
    pub discount: f64,
    pub max_speed: i32,
    /// Random seed. A fresh one is drawn from the OS when absent.
    pub seed: Option<u64>,
    pub track: Preset,
    /// Custom row descriptors, e.g. `[[0, 3], [1, 2]]`. Override `track`.
    pub rows: Option<Vec<Vec<i64>>>,
    /// Episodes between progress log lines, 0 disables them.
    pub progress_interval: u64,
    pub return_accounting: ReturnAccounting,
    pub cliff: CliffConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            iterations: 100_000,
            epsilon: 0.1,
            discount: 0.9,
            max_speed: DEFAULT_MAX_SPEED,
            seed: None,
            track: Preset::default(),
            rows: None,
            progress_interval: 10_000,
            return_accounting: ReturnAccounting::default(),
            cliff: CliffConfig::default(),
        }
    }
}

/// Settings of the cliff walk, the `[cliff]` table of the file.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CliffConfig {
    pub width: i32,
    pub height: i32,
    pub episodes: u64,
    pub alpha: f64,
    pub discount: f64,
    pub epsilon: f64,
}

impl Default for CliffConfig {
    fn default() -> Self {
        CliffConfig {
            width: 12,
            height: 4,
            episodes: 5000,
            alpha: 0.9,
            discount: 0.9,
            epsilon: 0.05,
        }
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

impl TrainingConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TrainingConfig> {
        let path = path.as_ref();
        let config = TrainingConfig::from_config_file(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        check_fraction("epsilon", self.epsilon)?;
        check_fraction("discount", self.discount)?;
        if self.max_speed < 1 {
            return Err(Error::Config(format!(
                "max_speed must be at least 1, got {}",
                self.max_speed
            )));
        }

        check_fraction("cliff.epsilon", self.cliff.epsilon)?;
        check_fraction("cliff.discount", self.cliff.discount)?;
        if self.cliff.alpha <= 0.0 || self.cliff.alpha > 1.0 {
            return Err(Error::Config(format!(
                "cliff.alpha must be within (0, 1], got {}",
                self.cliff.alpha
            )));
        }
        if self.cliff.width < 3 || self.cliff.height < 2 {
            return Err(Error::Config(format!(
                "cliff grid must be at least 3x2, got {}x{}",
                self.cliff.width, self.cliff.height
            )));
        }
        Ok(())
    }

    pub fn build_track(&self) -> Result<Track> {
        match &self.rows {
            Some(rows) => Track::from_fields(rows),
            None => self.track.track(),
        }
    }

    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
