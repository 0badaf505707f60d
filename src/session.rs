use serde_json::json;
use thiserror::Error;

use crate::constants::{
    CELL_SIZE, CLEAR_BASE_SCORE, CLEAR_BONUS_MAX, CLEAR_BONUS_WINDOW_MS, COLLECTIBLE_SCORE,
    MAX_STEP_MS, MAZE_COLS, MAZE_ROWS, SEQUENCE_BOARD_SIDE, SEQUENCE_SCORE_PER_STEP,
    WAGER_BASE_PAYOUT,
};
use crate::constants::get_sequence_length;
use crate::grid::{Grid, GridError};
use crate::phase_clock::{PhaseClock, PhaseSchedule};
use crate::reward::{RewardTable, WagerRound, WagerState};
use crate::rng::{DrawSource, Rng};
use crate::types::{
    Difficulty, Direction, GameKind, Intent, Phase, RewardGrant, RuntimeEvent, SequenceView,
    SessionInit, SessionOutcome, SessionPhase, SessionSummary, Snapshot, WagerChoice,
};
use crate::world::{SimulationWorld, WorldEvent};

/// Seed offset applied on retry so a fresh instance rolls a fresh layout
/// while staying reproducible from the original seed.
const RETRY_SEED_STRIDE: u32 = 0x9e37_79b9;

/// Decorrelates entity spawn draws from the maze carve draws.
const WORLD_SEED_SALT: u32 = 0x5bd1_e995;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Everything needed to build one session. Cloned unchanged into retries,
/// apart from the seed stride.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub game: GameKind,
    pub difficulty: Difficulty,
    pub seed: u32,
    pub rows: usize,
    pub cols: usize,
    /// Where terminal reward draws come from. Defaults to the session seed;
    /// the server swaps in a per-user-per-day stream.
    pub draw: DrawSource,
    pub reward_table: RewardTable,
}

impl SessionConfig {
    pub fn new(game: GameKind, difficulty: Difficulty, seed: u32) -> Self {
        Self {
            game,
            difficulty,
            seed,
            rows: MAZE_ROWS,
            cols: MAZE_COLS,
            draw: DrawSource::seeded(seed),
            reward_table: RewardTable::standard_slot(),
        }
    }
}

/// Ordered-recall board: a pattern of distinct cells is revealed, hidden,
/// and then compared against the submitted attempt cell by cell.
#[derive(Clone, Debug)]
struct SequenceBoard {
    side: usize,
    pattern: Vec<usize>,
    attempt: Vec<usize>,
}

impl SequenceBoard {
    fn new(difficulty: Difficulty, rng: &mut Rng) -> Self {
        let side = SEQUENCE_BOARD_SIDE;
        let length = get_sequence_length(difficulty).min(side * side);
        let mut cells: Vec<usize> = (0..side * side).collect();
        rng.shuffle(&mut cells);
        cells.truncate(length);
        Self {
            side,
            pattern: cells,
            attempt: Vec::new(),
        }
    }

    fn select(&mut self, index: usize) -> bool {
        if index >= self.side * self.side || self.attempt.len() >= self.pattern.len() {
            return false;
        }
        self.attempt.push(index);
        true
    }

    fn matched_prefix_len(&self) -> usize {
        self.pattern
            .iter()
            .zip(&self.attempt)
            .take_while(|(expected, got)| expected == got)
            .count()
    }

    fn view(&self, revealed: bool) -> SequenceView {
        SequenceView {
            board_side: self.side,
            pattern_len: self.pattern.len(),
            revealed: revealed.then(|| self.pattern.clone()),
            attempt: self.attempt.clone(),
        }
    }
}

#[derive(Clone, Debug)]
enum Mode {
    Maze { world: SimulationWorld },
    Sequence { board: SequenceBoard },
    Wager { round: WagerRound },
}

/// Orchestrates one mini-game round: owns the clock, the mode-specific
/// state, the score, and the single terminal reward resolution. Hosts talk
/// to it exclusively through intents, `advance`, and snapshots.
#[derive(Debug)]
pub struct SessionController {
    config: SessionConfig,
    attempt: u32,
    clock: PhaseClock,
    mode: Mode,
    session_phase: SessionPhase,
    tick: u64,
    elapsed_ms: u64,
    /// Time spent inside the maze play phase, for the clear-speed bonus.
    play_elapsed_ms: u64,
    score: i32,
    collected_tags: Vec<String>,
    events: Vec<RuntimeEvent>,
    draw: DrawSource,
    grant: Option<RewardGrant>,
}

impl SessionController {
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        let (mode, clock) = match config.game {
            GameKind::MazeEscape => {
                let grid = Grid::generate(config.rows, config.cols, config.seed)?;
                let mut rng = Rng::new(config.seed ^ WORLD_SEED_SALT);
                let world = SimulationWorld::new(grid, config.difficulty, &mut rng);
                (
                    Mode::Maze { world },
                    PhaseClock::new(PhaseSchedule::maze_escape()),
                )
            }
            GameKind::SequenceRecall => {
                let mut rng = Rng::new(config.seed);
                let board = SequenceBoard::new(config.difficulty, &mut rng);
                (
                    Mode::Sequence { board },
                    PhaseClock::new(PhaseSchedule::sequence_recall()),
                )
            }
            GameKind::CoinWager => (
                Mode::Wager {
                    round: WagerRound::new(WAGER_BASE_PAYOUT),
                },
                PhaseClock::new(PhaseSchedule::input_only()),
            ),
        };

        let session_phase = if clock.input_allowed() {
            SessionPhase::Playing
        } else {
            SessionPhase::Ready
        };
        let draw = config.draw.clone();

        Ok(Self {
            config,
            attempt: 0,
            clock,
            mode,
            session_phase,
            tick: 0,
            elapsed_ms: 0,
            play_elapsed_ms: 0,
            score: 0,
            collected_tags: Vec::new(),
            events: Vec::new(),
            draw,
            grant: None,
        })
    }

    pub fn game(&self) -> GameKind {
        self.config.game
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn session_phase(&self) -> SessionPhase {
        self.session_phase
    }

    pub fn is_ended(&self) -> bool {
        self.session_phase.is_terminal()
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn grant(&self) -> Option<&RewardGrant> {
        self.grant.as_ref()
    }

    /// Routes one player intent. Returns whether it was accepted; illegal
    /// intents (wrong phase, wrong game, mid-slide moves) are silent no-ops.
    pub fn apply_intent(&mut self, intent: Intent) -> bool {
        if self.session_phase.is_terminal() {
            return false;
        }
        match intent {
            Intent::Move(dir) => self.handle_move(dir),
            Intent::SelectCell(index) => self.handle_select(index),
            Intent::SubmitAnswer => self.handle_submit(),
            Intent::Guess(choice) => self.handle_guess(choice),
            Intent::StepUp => self.handle_step_up(),
            Intent::Claim => self.handle_claim(),
        }
    }

    /// Advances the session by one host tick: clock first, then the world.
    /// A terminal session ignores further ticks.
    pub fn advance(&mut self, dt_ms: u64) {
        if self.session_phase.is_terminal() {
            return;
        }
        let dt_ms = dt_ms.min(MAX_STEP_MS);
        self.tick += 1;
        self.elapsed_ms += dt_ms;

        if self.clock.tick(dt_ms) {
            self.events.push(RuntimeEvent::PhaseChanged {
                phase: self.clock.current_phase(),
            });
        }
        if self.session_phase == SessionPhase::Ready && self.clock.input_allowed() {
            self.session_phase = SessionPhase::Playing;
        }

        let world_events = match &mut self.mode {
            Mode::Maze { world } if self.clock.current_phase() == Phase::Play => {
                self.play_elapsed_ms += dt_ms;
                world.advance(dt_ms)
            }
            _ => Vec::new(),
        };

        for event in world_events {
            match event {
                WorldEvent::HazardContact { hazard_id } => {
                    self.events.push(RuntimeEvent::HazardContact { hazard_id });
                    // death preempts any pickup or arrival from the same tick
                    self.finish(SessionPhase::Failed);
                    break;
                }
                WorldEvent::Collected { tag, cell } => {
                    self.score += COLLECTIBLE_SCORE;
                    self.collected_tags.push(tag.clone());
                    self.events.push(RuntimeEvent::Collected { tag, cell });
                }
                WorldEvent::Arrived => {
                    self.score += CLEAR_BASE_SCORE + self.clear_time_bonus();
                    self.events.push(RuntimeEvent::Arrived);
                    self.finish(SessionPhase::Cleared);
                    break;
                }
            }
        }
    }

    /// Projects the current state and drains accumulated events into it.
    pub fn snapshot(&mut self) -> Snapshot {
        let entities = match &self.mode {
            Mode::Maze { world } => world.entity_views(),
            _ => Vec::new(),
        };
        let sequence = match &self.mode {
            Mode::Sequence { board } => {
                Some(board.view(self.clock.current_phase() == Phase::Show))
            }
            _ => None,
        };
        let wager = match &self.mode {
            Mode::Wager { round } => Some(round.view()),
            _ => None,
        };

        Snapshot {
            tick: self.tick,
            phase: self.clock.current_phase(),
            session_phase: self.session_phase,
            elapsed_ms: self.elapsed_ms,
            phase_progress: self.clock.progress01(),
            time_remaining_ms: self.clock.remaining_ms(),
            input_allowed: self.clock.input_allowed() && !self.session_phase.is_terminal(),
            score: self.score,
            collected_tags: self.collected_tags.clone(),
            entities,
            sequence,
            wager,
            events: std::mem::take(&mut self.events),
        }
    }

    /// Static per-session data sent once at creation.
    pub fn session_init(&self) -> SessionInit {
        let grid = match &self.mode {
            Mode::Maze { world } => Some(world.grid()),
            _ => None,
        };
        SessionInit {
            game: self.config.game,
            difficulty: self.config.difficulty,
            seed: self.config.seed,
            cell_size: CELL_SIZE,
            rows: grid.map(Grid::rows),
            cols: grid.map(Grid::cols),
            tiles: grid.map(Grid::to_tiles),
            start: grid.map(Grid::start),
            exit: grid.map(Grid::exit),
        }
    }

    /// Final report for the host. Only meaningful once the session ended;
    /// a session abandoned mid-flight reports as failed.
    pub fn summary(&self) -> SessionSummary {
        let outcome = if self.session_phase == SessionPhase::Cleared {
            SessionOutcome::Cleared
        } else {
            SessionOutcome::Failed
        };
        SessionSummary {
            game: self.config.game,
            outcome,
            duration_ms: self.elapsed_ms,
            score: self.score,
            collected_tags: self.collected_tags.clone(),
            grant: self.grant.clone(),
        }
    }

    /// Builds a brand-new session from the same config with a strided seed.
    /// Nothing carries over; the old instance stays frozen in its terminal
    /// state.
    pub fn retry(&self) -> Result<Self, SessionError> {
        let mut config = self.config.clone();
        config.seed = config.seed.wrapping_add(RETRY_SEED_STRIDE);
        let mut next = Self::new(config)?;
        next.attempt = self.attempt + 1;
        Ok(next)
    }

    fn handle_move(&mut self, dir: Direction) -> bool {
        if !self.clock.input_allowed() {
            return false;
        }
        let Mode::Maze { world } = &mut self.mode else {
            return false;
        };
        world.try_move(dir)
    }

    fn handle_select(&mut self, index: usize) -> bool {
        if self.clock.current_phase() != Phase::Input {
            return false;
        }
        let Mode::Sequence { board } = &mut self.mode else {
            return false;
        };
        board.select(index)
    }

    fn handle_submit(&mut self) -> bool {
        if self.clock.current_phase() != Phase::Input {
            return false;
        }
        let (expected_len, matched_len, attempt_len) = match &self.mode {
            Mode::Sequence { board } if !board.attempt.is_empty() => (
                board.pattern.len(),
                board.matched_prefix_len(),
                board.attempt.len(),
            ),
            _ => return false,
        };

        self.clock.force_advance();
        if matched_len == expected_len && attempt_len == expected_len {
            self.score += expected_len as i32 * SEQUENCE_SCORE_PER_STEP;
            self.events.push(RuntimeEvent::SequenceAccepted);
            self.finish(SessionPhase::Cleared);
        } else {
            self.events.push(RuntimeEvent::SequenceRejected {
                expected_len,
                matched_len,
            });
            self.finish(SessionPhase::Failed);
        }
        true
    }

    fn handle_guess(&mut self, choice: WagerChoice) -> bool {
        let Mode::Wager { round } = &mut self.mode else {
            return false;
        };
        if round.state() != WagerState::AwaitingGuess {
            return false;
        }
        let draw = self.draw.draw();
        if !round.guess(choice, draw) {
            return false;
        }
        let streak = round.streak();
        let lost = round.state() == WagerState::Lost;

        if lost {
            self.events.push(RuntimeEvent::WagerLost);
            self.finish(SessionPhase::Failed);
        } else {
            self.events.push(RuntimeEvent::WagerWon { streak });
        }
        true
    }

    fn handle_step_up(&mut self) -> bool {
        let Mode::Wager { round } = &mut self.mode else {
            return false;
        };
        round.step_up()
    }

    fn handle_claim(&mut self) -> bool {
        let Mode::Wager { round } = &mut self.mode else {
            return false;
        };
        let multiplier = round.view().multiplier;
        let Some(payout) = round.claim() else {
            return false;
        };

        self.grant = Some(RewardGrant {
            tier: "wager".to_string(),
            payout_spec: json!({ "coins": payout }),
            multiplier,
        });
        self.score += payout as i32;
        self.events.push(RuntimeEvent::WagerClaimed { payout });
        self.finish(SessionPhase::Cleared);
        true
    }

    /// Enters a terminal state and resolves the reward grant exactly once.
    /// A failed session gets no grant; a wager claim brings its own.
    fn finish(&mut self, outcome: SessionPhase) {
        debug_assert!(outcome.is_terminal());
        self.session_phase = outcome;
        if outcome == SessionPhase::Cleared && self.grant.is_none() {
            let draw = self.draw.draw();
            let tier = self.config.reward_table.resolve(draw);
            self.grant = Some(RewardGrant {
                tier: tier.tier.clone(),
                payout_spec: tier.payout_spec.clone(),
                multiplier: 1,
            });
        }
    }

    fn clear_time_bonus(&self) -> i32 {
        let used = self.play_elapsed_ms.min(CLEAR_BONUS_WINDOW_MS);
        let left = (CLEAR_BONUS_WINDOW_MS - used) as f64 / CLEAR_BONUS_WINDOW_MS as f64;
        (CLEAR_BONUS_MAX as f64 * left).round() as i32
    }

    #[cfg(test)]
    fn world_mut(&mut self) -> Option<&mut SimulationWorld> {
        match &mut self.mode {
            Mode::Maze { world } => Some(world),
            _ => None,
        }
    }

    #[cfg(test)]
    fn world(&self) -> Option<&SimulationWorld> {
        match &self.mode {
            Mode::Maze { world } => Some(world),
            _ => None,
        }
    }
}
