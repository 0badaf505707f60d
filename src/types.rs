use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn parse_move(value: &str) -> Option<Self> {
        match value {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Casual,
    Normal,
    Hard,
}

impl Difficulty {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "casual" => Some(Self::Casual),
            "normal" => Some(Self::Normal),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameKind {
    MazeEscape,
    SequenceRecall,
    CoinWager,
}

impl GameKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "maze_escape" => Some(Self::MazeEscape),
            "sequence_recall" => Some(Self::SequenceRecall),
            "coin_wager" => Some(Self::CoinWager),
            _ => None,
        }
    }
}

/// A named timed stage inside a mini-game round, declared by the schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Ready,
    Show,
    Hold,
    Input,
    Play,
}

impl Phase {
    pub fn accepts_input(self) -> bool {
        matches!(self, Self::Input | Self::Play)
    }
}

/// Lifecycle of one session instance. Terminal states never transition out;
/// a retry builds a whole new session instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Ready,
    Playing,
    Cleared,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cleared | Self::Failed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerChoice {
    Odd,
    Even,
}

impl WagerChoice {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "odd" => Some(Self::Odd),
            "even" => Some(Self::Even),
            _ => None,
        }
    }
}

/// Input intents consumed by a session. Illegal intents are rejected as
/// no-ops, never errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Move(Direction),
    SelectCell(usize),
    SubmitAnswer,
    Guess(WagerChoice),
    StepUp,
    Claim,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Vec2 {
    pub x: i32,
    pub y: i32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityView {
    Player {
        x: f32,
        y: f32,
        radius: f32,
        cell: Vec2,
        #[serde(rename = "targetCell")]
        target_cell: Option<Vec2>,
        #[serde(rename = "moveProgress")]
        move_progress: f32,
    },
    Hazard {
        id: u32,
        x: f32,
        y: f32,
        radius: f32,
        vx: f32,
        vy: f32,
    },
    Collectible {
        id: u32,
        x: f32,
        y: f32,
        radius: f32,
        cell: Vec2,
        tag: String,
        collected: bool,
    },
}

#[derive(Clone, Debug, Serialize)]
pub struct SequenceView {
    #[serde(rename = "boardSide")]
    pub board_side: usize,
    #[serde(rename = "patternLen")]
    pub pattern_len: usize,
    /// Pattern cells are only exposed while the reveal phase is running.
    pub revealed: Option<Vec<usize>>,
    pub attempt: Vec<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WagerStateView {
    AwaitingGuess,
    Won,
    Lost,
    Claimed,
}

#[derive(Clone, Debug, Serialize)]
pub struct WagerView {
    pub state: WagerStateView,
    pub streak: u32,
    pub multiplier: i64,
    #[serde(rename = "potentialPayout")]
    pub potential_payout: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    PhaseChanged {
        phase: Phase,
    },
    Collected {
        tag: String,
        cell: Vec2,
    },
    HazardContact {
        #[serde(rename = "hazardId")]
        hazard_id: u32,
    },
    Arrived,
    SequenceAccepted,
    SequenceRejected {
        #[serde(rename = "expectedLen")]
        expected_len: usize,
        #[serde(rename = "matchedLen")]
        matched_len: usize,
    },
    WagerWon {
        streak: u32,
    },
    WagerLost,
    WagerClaimed {
        payout: i64,
    },
}

/// Renderer-agnostic projection of one tick. The host forwards this verbatim;
/// the engine never carries colors or layout.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub tick: u64,
    pub phase: Phase,
    #[serde(rename = "sessionPhase")]
    pub session_phase: SessionPhase,
    #[serde(rename = "elapsedMs")]
    pub elapsed_ms: u64,
    #[serde(rename = "phaseProgress")]
    pub phase_progress: f32,
    #[serde(rename = "timeRemainingMs")]
    pub time_remaining_ms: Option<u64>,
    #[serde(rename = "inputAllowed")]
    pub input_allowed: bool,
    pub score: i32,
    #[serde(rename = "collectedTags")]
    pub collected_tags: Vec<String>,
    pub entities: Vec<EntityView>,
    pub sequence: Option<SequenceView>,
    pub wager: Option<WagerView>,
    pub events: Vec<RuntimeEvent>,
}

/// Sent once when a session is created; immutable for the session lifetime.
#[derive(Clone, Debug, Serialize)]
pub struct SessionInit {
    pub game: GameKind,
    pub difficulty: Difficulty,
    pub seed: u32,
    #[serde(rename = "cellSize")]
    pub cell_size: f32,
    pub rows: Option<usize>,
    pub cols: Option<usize>,
    /// Row-major tile strings, `#` wall / `.` path, maze sessions only.
    pub tiles: Option<Vec<String>>,
    pub start: Option<Vec2>,
    pub exit: Option<Vec2>,
}

/// Outcome handed to the persistence collaborator. The engine decides it
/// exactly once per session and never re-resolves.
#[derive(Clone, Debug, Serialize)]
pub struct RewardGrant {
    pub tier: String,
    #[serde(rename = "payoutSpec")]
    pub payout_spec: serde_json::Value,
    pub multiplier: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Cleared,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionSummary {
    pub game: GameKind,
    pub outcome: SessionOutcome,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
    pub score: i32,
    #[serde(rename = "collectedTags")]
    pub collected_tags: Vec<String>,
    pub grant: Option<RewardGrant>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredGrant {
    pub tier: String,
    #[serde(rename = "payoutSpec")]
    pub payout_spec: serde_json::Value,
    pub multiplier: i64,
    pub game: String,
    #[serde(rename = "grantedAtMs")]
    pub granted_at_ms: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct GrantsResponse {
    #[serde(rename = "generatedAt")]
    pub generated_at_iso: String,
    pub users: Vec<UserGrantsEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct UserGrantsEntry {
    pub name: String,
    #[serde(rename = "grantCount")]
    pub grant_count: u64,
    pub recent: Vec<StoredGrant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parse_rejects_unknown_values() {
        assert_eq!(Direction::parse_move("up"), Some(Direction::Up));
        assert_eq!(Direction::parse_move("none"), None);
        assert_eq!(Direction::parse_move(""), None);
    }

    #[test]
    fn only_input_like_phases_accept_input() {
        assert!(Phase::Input.accepts_input());
        assert!(Phase::Play.accepts_input());
        assert!(!Phase::Ready.accepts_input());
        assert!(!Phase::Show.accepts_input());
        assert!(!Phase::Hold.accepts_input());
    }

    #[test]
    fn terminal_session_phases() {
        assert!(SessionPhase::Cleared.is_terminal());
        assert!(SessionPhase::Failed.is_terminal());
        assert!(!SessionPhase::Ready.is_terminal());
        assert!(!SessionPhase::Playing.is_terminal());
    }

    #[test]
    fn entity_view_serializes_with_kind_tag() {
        let view = EntityView::Hazard {
            id: 3,
            x: 1.0,
            y: 2.0,
            radius: 6.0,
            vx: -4.0,
            vy: 4.0,
        };
        let json = serde_json::to_value(&view).expect("entity view should serialize");
        assert_eq!(json["kind"], "hazard");
        assert_eq!(json["id"], 3);
    }
}
