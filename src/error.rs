use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("malformed track descriptor #{index}: {reason}")]
    MalformedTrackDescriptor { index: usize, reason: String },

    #[error("track description has no rows")]
    EmptyTrack,

    // Raised when construction tries to label a cell that is off the track.
    #[error("cell ({col}, {row}) is outside the track")]
    InvalidCell { col: i32, row: i32 },

    // A non-finish cell from which the car can move neither right nor up.
    #[error("cell ({col}, {row}) is a dead end, no finish cell can be reached from it")]
    DeadEnd { col: i32, row: i32 },

    #[error("unknown track preset '{0}' (expected 'narrow' or 'wide')")]
    UnknownPreset(String),

    #[error("configuration error: {0}")]
    Config(String),
}
