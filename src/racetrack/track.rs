use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use nalgebra::DMatrix;
use prettytable::{Cell, Row, Table};
use serde::Deserialize;

use crate::error::{Error, Result};

// Logical (column, row) coordinates. Row 0 is the bottom row, columns may be negative.
pub type Position = (i32, i32);

// Largest distance of a valid cell from column 0, and largest number of rows.
const MAX_SIDE: i64 = 4096;

const INVALID_GLYPH: &str = "X";
const TRACK_GLYPH: &str = ".";
const START_GLYPH: &str = "S";
const FINISH_GLYPH: &str = "F";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Track,
    Start,
    Finish,
}

/// One row of a track description.
///
/// `shift` moves the valid span of this row relative to the span of the
/// previous row, `length` is the number of valid cells and `repeat` is the
/// number of identical rows stacked on top of each other.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowDescriptor {
    pub shift: i32,
    pub length: i32,
    pub repeat: i32,
}

impl RowDescriptor {
    pub fn new(shift: i32, length: i32) -> RowDescriptor {
        RowDescriptor::repeated(shift, length, 1)
    }

    pub fn repeated(shift: i32, length: i32, repeat: i32) -> RowDescriptor {
        RowDescriptor {
            shift: shift,
            length: length,
            repeat: repeat,
        }
    }

    /// Builds a descriptor from `[shift, length]` or `[shift, length, repeat]`.
    /// `index` is the position of the row in its list, used for error reporting.
    pub fn from_fields(index: usize, fields: &[i64]) -> Result<RowDescriptor> {
        let malformed = |reason: String| Error::MalformedTrackDescriptor {
            index: index,
            reason: reason,
        };

        if fields.len() < 2 || fields.len() > 3 {
            return Err(malformed(format!(
                "expected 2 or 3 fields, found {}",
                fields.len()
            )));
        }

        let mut values = [0i32, 0, 1];
        for (i, field) in fields.iter().enumerate() {
            values[i] = i32::try_from(*field)
                .map_err(|_| malformed(format!("field {} is out of range", field)))?;
        }

        let row = RowDescriptor::repeated(values[0], values[1], values[2]);
        if row.length < 1 {
            return Err(malformed(format!("row length must be positive, got {}", row.length)));
        }
        if row.repeat < 1 {
            return Err(malformed(format!("repeat count must be positive, got {}", row.repeat)));
        }
        Ok(row)
    }

    /// Parses one descriptor from comma separated integers, e.g. "-1, 7, 7".
    pub fn parse(index: usize, text: &str) -> Result<RowDescriptor> {
        let fields = text
            .split(',')
            .map(|field| {
                let field = field.trim();
                field
                    .parse::<i64>()
                    .map_err(|_| Error::MalformedTrackDescriptor {
                        index: index,
                        reason: format!("'{}' is not an integer", field),
                    })
            })
            .collect::<Result<Vec<i64>>>()?;
        RowDescriptor::from_fields(index, &fields)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Narrow,
    Wide,
}

const NARROW_ROWS: [(i32, i32, i32); 9] = [
    (0, 6, 3),
    (-1, 7, 7),
    (-1, 8, 8),
    (-1, 9, 7),
    (0, 10, 1),
    (0, 17, 2),
    (1, 16, 1),
    (1, 15, 2),
    (1, 14, 1),
];

const WIDE_ROWS: [(i32, i32, i32); 25] = [
    (0, 23, 3),
    (1, 22, 1),
    (1, 21, 1),
    (1, 20, 1),
    (1, 19, 1),
    (1, 18, 1),
    (1, 17, 1),
    (1, 16, 1),
    (1, 15, 1),
    (1, 14, 1),
    (1, 13, 1),
    (1, 12, 1),
    (1, 11, 1),
    (1, 10, 1),
    (1, 9, 1),
    (0, 10, 1),
    (0, 12, 1),
    (0, 13, 1),
    (0, 16, 1),
    (-1, 19, 1),
    (-1, 20, 1),
    (-1, 21, 4),
    (1, 20, 1),
    (1, 19, 1),
    (3, 16, 1),
];

impl Default for Preset {
    fn default() -> Self {
        Preset::Narrow
    }
}

impl Preset {
    pub fn rows(self) -> Vec<RowDescriptor> {
        let rows: &[(i32, i32, i32)] = match self {
            Preset::Narrow => &NARROW_ROWS,
            Preset::Wide => &WIDE_ROWS,
        };
        rows.iter()
            .map(|(shift, length, repeat)| RowDescriptor::repeated(*shift, *length, *repeat))
            .collect()
    }

    pub fn track(self) -> Result<Track> {
        Track::new(&self.rows())
    }
}

impl FromStr for Preset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "narrow" => Ok(Preset::Narrow),
            "wide" => Ok(Preset::Wide),
            _ => Err(Error::UnknownPreset(s.to_string())),
        }
    }
}

/// The static course: a rectangular grid of cells that are either off the
/// track or carry a [`Role`]. Built once and never modified afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    // Row 0 is the bottom row. `None` marks a cell that is off the track.
    cells: DMatrix<Option<Role>>,
    // Added to a logical column to get the storage column.
    column_offset: i32,
    start: Vec<Position>,
    finish: Vec<Position>,
}

impl Track {
    pub fn new(rows: &[RowDescriptor]) -> Result<Track> {
        if rows.is_empty() {
            return Err(Error::EmptyTrack);
        }

        // Find the leftmost shift and the rightmost extent of the valid spans.
        // Sums are taken in i64 so that no descriptor list can overflow them.
        let mut shift: i64 = 0;
        let mut min_shift: i64 = 0;
        let mut extent = i64::MIN;
        let mut height: i64 = 0;
        for (index, row) in rows.iter().enumerate() {
            shift += i64::from(row.shift);
            min_shift = min_shift.min(shift);
            extent = extent.max(shift + i64::from(row.length));
            height += i64::from(row.repeat);
            if min_shift < -MAX_SIDE || extent > MAX_SIDE || height > MAX_SIDE {
                return Err(Error::MalformedTrackDescriptor {
                    index: index,
                    reason: format!("track does not fit in {} cells per side", MAX_SIDE),
                });
            }
        }
        // All values are bounded by MAX_SIDE from here on.
        let (min_shift, extent, height) = (min_shift as i32, extent as i32, height as i32);
        let column_offset = -min_shift;
        // One extra column of padding on the right is always off the track.
        let width = extent + column_offset + 1;

        let mut cells = DMatrix::from_element(height as usize, width as usize, None);
        let mut shift = 0;
        let mut r = 0;
        for row in rows {
            shift += row.shift;
            let first = (shift + column_offset) as usize;
            for _ in 0..row.repeat {
                for c in first..first + row.length as usize {
                    cells[(r, c)] = Some(Role::Track);
                }
                r += 1;
            }
        }

        let mut track = Track {
            cells: cells,
            column_offset: column_offset,
            start: Vec::new(),
            finish: Vec::new(),
        };

        // Start cells are the whole bottom row; finish cells are the rightmost used column.
        track.start = track
            .column_range()
            .map(|c| (c, 0))
            .filter(|p| track.is_valid(*p))
            .collect();
        let finish_column = extent - 1;
        track.finish = (0..height)
            .map(|r| (finish_column, r))
            .filter(|p| track.is_valid(*p))
            .collect();

        for position in track.start.clone() {
            track.set_role(position, Role::Start)?;
        }
        for position in track.finish.clone() {
            track.set_role(position, Role::Finish)?;
        }

        Ok(track)
    }

    /// Parses a list of descriptors separated by `;` or new lines,
    /// e.g. "0, 3; 1, 2".
    pub fn parse(text: &str) -> Result<Track> {
        let rows = text
            .split(|c: char| c == ';' || c == '\n')
            .map(|row| row.trim())
            .filter(|row| !row.is_empty())
            .enumerate()
            .map(|(i, row)| RowDescriptor::parse(i, row))
            .collect::<Result<Vec<RowDescriptor>>>()?;
        Track::new(&rows)
    }

    /// Builds a track from raw integer rows, e.g. `[[0, 3], [1, 2]]`.
    pub fn from_fields(rows: &[Vec<i64>]) -> Result<Track> {
        let rows = rows
            .iter()
            .enumerate()
            .map(|(i, fields)| RowDescriptor::from_fields(i, fields))
            .collect::<Result<Vec<RowDescriptor>>>()?;
        Track::new(&rows)
    }

    fn index(&self, position: Position) -> Option<(usize, usize)> {
        let (col, row) = position;
        let c = col + self.column_offset;
        if row < 0 || c < 0 || row as usize >= self.cells.nrows() || c as usize >= self.cells.ncols() {
            return None;
        }
        Some((row as usize, c as usize))
    }

    fn set_role(&mut self, position: Position, role: Role) -> Result<()> {
        match self.index(position) {
            Some(i) if self.cells[i].is_some() => {
                self.cells[i] = Some(role);
                Ok(())
            }
            _ => Err(Error::InvalidCell {
                col: position.0,
                row: position.1,
            }),
        }
    }

    // Role of the cell, None if it is off the track (including outside the grid).
    pub fn role(&self, position: Position) -> Option<Role> {
        self.index(position).and_then(|i| self.cells[i])
    }

    pub fn is_valid(&self, position: Position) -> bool {
        self.role(position).is_some()
    }

    pub fn is_start(&self, position: Position) -> bool {
        self.start.contains(&position)
    }

    pub fn is_finish(&self, position: Position) -> bool {
        self.role(position) == Some(Role::Finish)
    }

    pub fn start_cells(&self) -> &[Position] {
        &self.start
    }

    pub fn finish_cells(&self) -> &[Position] {
        &self.finish
    }

    pub fn width(&self) -> usize {
        self.cells.ncols()
    }

    pub fn height(&self) -> usize {
        self.cells.nrows()
    }

    pub fn column_offset(&self) -> i32 {
        self.column_offset
    }

    // First cell, bottom row first, that is not a finish cell and has no valid
    // neighbor to the right or above. A car there can never move again.
    pub fn dead_end(&self) -> Option<Position> {
        (0..self.height() as i32)
            .flat_map(|row| self.column_range().map(move |col| (col, row)))
            .find(|&(col, row)| {
                self.is_valid((col, row))
                    && !self.is_finish((col, row))
                    && !self.is_valid((col + 1, row))
                    && !self.is_valid((col, row + 1))
            })
    }

    // Logical columns covered by the grid.
    pub fn column_range(&self) -> Range<i32> {
        -self.column_offset..self.width() as i32 - self.column_offset
    }

    fn glyph(&self, position: Position) -> &'static str {
        match self.role(position) {
            None => INVALID_GLYPH,
            Some(Role::Track) => TRACK_GLYPH,
            Some(Role::Start) => START_GLYPH,
            Some(Role::Finish) => FINISH_GLYPH,
        }
    }

    // Top row first, with row numbers on the right and column numbers below.
    fn to_table(&self, overlay: &HashMap<Position, String>) -> Table {
        let mut table = Table::new();
        for row in (0..self.height() as i32).rev() {
            let mut cells: Vec<Cell> = self
                .column_range()
                .map(|col| match overlay.get(&(col, row)) {
                    Some(label) => Cell::new(label),
                    None => Cell::new(self.glyph((col, row))),
                })
                .collect();
            cells.push(Cell::new(&format!("{}", row)));
            table.add_row(Row::new(cells));
        }

        let mut ruler: Vec<Cell> = self
            .column_range()
            .map(|col| Cell::new(&format!("{}", col)))
            .collect();
        ruler.push(Cell::new(""));
        table.add_row(Row::new(ruler));
        table
    }

    /// Renders the track with every visited position labeled by its step number.
    pub fn trajectory_table(&self, positions: &[Position]) -> Table {
        let overlay = positions
            .iter()
            .enumerate()
            .map(|(step, position)| (*position, format!("{}", step)))
            .collect();
        self.to_table(&overlay)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_table(&HashMap::new()))
    }
}
