pub mod cliff_walk;
pub mod config;
pub mod error;
pub mod racetrack;
pub mod solver;

pub use error::{Error, Result};
