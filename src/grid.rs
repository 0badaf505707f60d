use std::collections::{HashSet, VecDeque};

use thiserror::Error;

use crate::rng::Rng;
use crate::types::{Direction, Vec2};

/// Cells inside the exit scan window, measured from the far corner.
const EXIT_WINDOW: i32 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GridError {
    #[error("invalid maze dimensions {rows}x{cols}: need at least 3x5 or 5x3")]
    InvalidDimensions { rows: usize, cols: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellKind {
    Wall,
    Path,
}

/// An immutable perfect maze. Odd dimensions; rooms sit on odd indices and
/// carved walls on even indices between them. Built once per session.
#[derive(Clone, Debug)]
pub struct Grid {
    rows: usize,
    cols: usize,
    cells: Vec<CellKind>,
    start: Vec2,
    exit: Vec2,
}

impl Grid {
    /// Carves a maze with a randomized recursive backtracker. Even requested
    /// dimensions are reduced to the nearest odd value. Requests smaller than
    /// 3, or so small that start and exit would coincide, are rejected.
    pub fn generate(rows: usize, cols: usize, seed: u32) -> Result<Self, GridError> {
        if rows < 3 || cols < 3 {
            return Err(GridError::InvalidDimensions { rows, cols });
        }
        let rows = coerce_odd(rows);
        let cols = coerce_odd(cols);
        if rows == 3 && cols == 3 {
            // a single-room lattice cannot host distinct start and exit
            return Err(GridError::InvalidDimensions { rows, cols });
        }

        let mut rng = Rng::new(seed);
        let mut cells = vec![CellKind::Wall; rows * cols];
        let room_rows = rows / 2;
        let room_cols = cols / 2;

        let mut visited = vec![false; room_rows * room_cols];
        let mut stack: Vec<(usize, usize)> = Vec::with_capacity(room_rows * room_cols);

        visited[0] = true;
        carve_room(&mut cells, cols, 0, 0);
        stack.push((0, 0));

        while let Some(&(row, col)) = stack.last() {
            let mut dirs = [
                Direction::Up,
                Direction::Down,
                Direction::Left,
                Direction::Right,
            ];
            rng.shuffle(&mut dirs);

            let mut advanced = false;
            for dir in dirs {
                let (dx, dy) = dir.delta();
                let next_row = row as i32 + dy;
                let next_col = col as i32 + dx;
                if next_row < 0
                    || next_col < 0
                    || next_row >= room_rows as i32
                    || next_col >= room_cols as i32
                {
                    continue;
                }
                let next_row = next_row as usize;
                let next_col = next_col as usize;
                if visited[next_row * room_cols + next_col] {
                    continue;
                }

                visited[next_row * room_cols + next_col] = true;
                carve_wall_between(&mut cells, cols, row, col, next_row, next_col);
                carve_room(&mut cells, cols, next_row, next_col);
                stack.push((next_row, next_col));
                advanced = true;
                break;
            }

            if !advanced {
                stack.pop();
            }
        }

        let start = Vec2 { x: 1, y: 1 };
        let exit = pick_exit(&cells, rows, cols, start);

        Ok(Self {
            rows,
            cols,
            cells,
            start,
            exit,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn start(&self) -> Vec2 {
        self.start
    }

    pub fn exit(&self) -> Vec2 {
        self.exit
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.cols && (y as usize) < self.rows
    }

    pub fn is_path(&self, x: i32, y: i32) -> bool {
        self.in_bounds(x, y) && self.cells[y as usize * self.cols + x as usize] == CellKind::Path
    }

    /// Every path cell, row-major. Used for collectible placement.
    pub fn path_cells(&self) -> Vec<Vec2> {
        let mut out = Vec::new();
        for y in 0..self.rows {
            for x in 0..self.cols {
                if self.cells[y * self.cols + x] == CellKind::Path {
                    out.push(Vec2 {
                        x: x as i32,
                        y: y as i32,
                    });
                }
            }
        }
        out
    }

    /// Breadth-first reachability from `from`. Full connectivity of all path
    /// cells is guaranteed by construction; this exists so tests can prove it.
    pub fn reachable_from(&self, from: Vec2) -> HashSet<(i32, i32)> {
        let mut out = HashSet::new();
        if !self.is_path(from.x, from.y) {
            return out;
        }
        let mut queue = VecDeque::new();
        out.insert((from.x, from.y));
        queue.push_back((from.x, from.y));
        while let Some((x, y)) = queue.pop_front() {
            for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
                if self.is_path(nx, ny) && out.insert((nx, ny)) {
                    queue.push_back((nx, ny));
                }
            }
        }
        out
    }

    /// Row-major tile strings (`#` wall, `.` path) for the wire format.
    pub fn to_tiles(&self) -> Vec<String> {
        (0..self.rows)
            .map(|y| {
                (0..self.cols)
                    .map(|x| match self.cells[y * self.cols + x] {
                        CellKind::Wall => '#',
                        CellKind::Path => '.',
                    })
                    .collect()
            })
            .collect()
    }
}

fn coerce_odd(value: usize) -> usize {
    if value % 2 == 0 {
        value - 1
    } else {
        value
    }
}

fn carve_room(cells: &mut [CellKind], cols: usize, room_row: usize, room_col: usize) {
    let y = room_row * 2 + 1;
    let x = room_col * 2 + 1;
    cells[y * cols + x] = CellKind::Path;
}

fn carve_wall_between(
    cells: &mut [CellKind],
    cols: usize,
    room_row: usize,
    room_col: usize,
    next_row: usize,
    next_col: usize,
) {
    let y = room_row + next_row + 1;
    let x = room_col + next_col + 1;
    cells[y * cols + x] = CellKind::Path;
}

/// First path cell in a bounded window anchored at the far corner, row-major.
/// The exact corner cell is always a wall, so "near the corner" is the
/// product behavior, not an approximation.
fn pick_exit(cells: &[CellKind], rows: usize, cols: usize, start: Vec2) -> Vec2 {
    let y_from = (rows as i32 - EXIT_WINDOW).max(0);
    let x_from = (cols as i32 - EXIT_WINDOW).max(0);
    for y in y_from..rows as i32 {
        for x in x_from..cols as i32 {
            if cells[y as usize * cols + x as usize] == CellKind::Path
                && !(x == start.x && y == start.y)
            {
                return Vec2 { x, y };
            }
        }
    }
    // the room adjacent to the far corner is carved in every perfect maze
    Vec2 {
        x: cols as i32 - 2,
        y: rows as i32 - 2,
    }
}
