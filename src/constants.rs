use crate::types::Difficulty;

pub const TICK_RATE: u32 = 20;
pub const TICK_MS: u64 = 1000 / TICK_RATE as u64;

/// Upper bound applied to every advance() delta. Larger host hitches are
/// truncated so entities cannot tunnel through walls in a single step.
pub const MAX_STEP_MS: u64 = 50;

pub const MAZE_ROWS: usize = 15;
pub const MAZE_COLS: usize = 21;

pub const CELL_SIZE: f32 = 16.0;
pub const PLAYER_RADIUS: f32 = 6.0;
pub const HAZARD_RADIUS: f32 = 6.0;

/// Wall-clock duration of one player cell-to-cell slide.
pub const MOVE_DURATION_MS: u64 = 160;

pub const HAZARD_BASE_SPEED: f32 = 52.0;

pub const READY_DURATION_MS: u64 = 3_000;
pub const SHOW_DURATION_MS: u64 = 3_000;
pub const HOLD_DURATION_MS: u64 = 2_000;

pub const COLLECTIBLE_SCORE: i32 = 100;
pub const CLEAR_BASE_SCORE: i32 = 500;
/// Time bonus decays to zero over this window after the play phase begins.
pub const CLEAR_BONUS_WINDOW_MS: u64 = 60_000;
pub const CLEAR_BONUS_MAX: i32 = 300;

pub const SEQUENCE_BOARD_SIDE: usize = 3;
pub const SEQUENCE_SCORE_PER_STEP: i32 = 50;

pub const WAGER_BASE_PAYOUT: i64 = 10;

pub fn get_hazard_count(rows: usize, cols: usize, difficulty: Difficulty) -> usize {
    let rooms = (rows / 2) * (cols / 2);
    let base = (rooms / 18).clamp(1, 8);
    match difficulty {
        Difficulty::Casual => base.saturating_sub(1).max(1),
        Difficulty::Normal => base,
        Difficulty::Hard => base + 2,
    }
}

pub fn get_collectible_count(rows: usize, cols: usize) -> usize {
    let rooms = (rows / 2) * (cols / 2);
    (rooms / 12).clamp(2, 10)
}

pub fn get_hazard_speed_multiplier(difficulty: Difficulty) -> f32 {
    match difficulty {
        Difficulty::Casual => 0.75,
        Difficulty::Normal => 1.0,
        Difficulty::Hard => 1.35,
    }
}

pub fn get_sequence_length(difficulty: Difficulty) -> usize {
    match difficulty {
        Difficulty::Casual => 3,
        Difficulty::Normal => 4,
        Difficulty::Hard => 6,
    }
}
