use clap::Parser;
use duo_arcade_server::constants::{CELL_SIZE, TICK_MS};
use duo_arcade_server::rng::DrawSource;
use duo_arcade_server::session::{SessionConfig, SessionController};
use duo_arcade_server::types::{
    Difficulty, Direction, EntityView, GameKind, Intent, RuntimeEvent, SessionInit, SessionOutcome,
    Snapshot, WagerChoice, WagerStateView,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Run a single scenario instead of the default battery.
    #[arg(long)]
    single: bool,
    #[arg(long)]
    game: Option<String>,
    #[arg(long)]
    difficulty: Option<String>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct Scenario {
    name: String,
    game: GameKind,
    difficulty: Difficulty,
    seed: u32,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioResultLine {
    scenario: String,
    game: GameKind,
    seed: u32,
    difficulty: Difficulty,
    outcome: SessionOutcome,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    score: i32,
    ticks: u64,
    collected: usize,
    #[serde(rename = "hazardContacts")]
    hazard_contacts: usize,
    #[serde(rename = "grantTier")]
    grant_tier: Option<String>,
    anomalies: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
struct AnomalyRecord {
    tick: u64,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
struct ScenarioRunResult {
    #[serde(flatten)]
    result: ScenarioResultLine,
    #[serde(rename = "anomalyRecords")]
    anomaly_records: Vec<AnomalyRecord>,
    finished_tick: u64,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(rename = "startedAtMs")]
    started_at_ms: u64,
    #[serde(rename = "finishedAtMs")]
    finished_at_ms: u64,
    #[serde(rename = "scenarioCount")]
    scenario_count: usize,
    #[serde(rename = "anomalyCount")]
    anomaly_count: usize,
    #[serde(rename = "averageDurationMs")]
    average_duration_ms: u64,
    #[serde(rename = "outcomeCounts")]
    outcome_counts: BTreeMap<String, usize>,
    scenarios: Vec<ScenarioResultLine>,
}

#[derive(Clone, Debug, Serialize)]
struct StructuredLogLine {
    #[serde(rename = "timestampMs")]
    timestamp_ms: u64,
    level: String,
    event: String,
    #[serde(rename = "runId")]
    run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tick: Option<u64>,
    details: Value,
}

fn main() {
    let cli = Cli::parse();
    let scenarios = resolve_scenarios(&cli);
    let run_started_at_ms = now_ms();
    let seed_hint = scenarios.first().map(|scenario| scenario.seed).unwrap_or(0);
    let run_id = cli
        .run_id
        .clone()
        .unwrap_or_else(|| default_run_id(seed_hint, run_started_at_ms));
    let mut has_anomaly = false;
    let mut scenario_results = Vec::new();
    let mut outcome_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_duration_ms = 0u64;
    let mut total_anomalies = 0usize;

    for scenario in scenarios {
        emit_log(
            "info",
            "scenario_started",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            None,
            json!({
                "game": scenario.game,
                "difficulty": scenario.difficulty,
            }),
        );
        let scenario_run = run_scenario(&scenario);

        for anomaly in &scenario_run.anomaly_records {
            emit_log(
                "warn",
                "anomaly_detected",
                &run_id,
                Some(&scenario.name),
                Some(scenario.seed),
                Some(anomaly.tick),
                json!({
                    "message": anomaly.message,
                }),
            );
        }

        if !scenario_run.result.anomalies.is_empty() {
            has_anomaly = true;
        }
        total_anomalies += scenario_run.anomaly_records.len();
        total_duration_ms += scenario_run.result.duration_ms;
        *outcome_counts
            .entry(outcome_key(scenario_run.result.outcome))
            .or_insert(0) += 1;

        emit_log(
            "info",
            "scenario_finished",
            &run_id,
            Some(&scenario.name),
            Some(scenario.seed),
            Some(scenario_run.finished_tick),
            json!({
                "outcome": scenario_run.result.outcome,
                "durationMs": scenario_run.result.duration_ms,
                "score": scenario_run.result.score,
                "anomalyCount": scenario_run.anomaly_records.len(),
            }),
        );

        println!(
            "{}",
            serde_json::to_string(&scenario_run.result).expect("scenario result should serialize")
        );
        scenario_results.push(scenario_run.result);
    }

    let run_finished_at_ms = now_ms();
    let summary = build_run_summary(
        run_id.clone(),
        run_started_at_ms,
        run_finished_at_ms,
        scenario_results,
        outcome_counts,
        total_anomalies,
        total_duration_ms,
    );

    let mut summary_out_written: Option<String> = None;
    if let Some(path) = cli.summary_out.as_ref() {
        if let Err(error) = write_summary(path, &summary) {
            emit_log(
                "error",
                "summary_write_failed",
                &run_id,
                None,
                None,
                None,
                json!({
                    "path": path.to_string_lossy(),
                    "error": error.to_string(),
                }),
            );
            std::process::exit(2);
        }
        summary_out_written = Some(path.to_string_lossy().to_string());
    }

    emit_log(
        "info",
        "run_finished",
        &run_id,
        None,
        None,
        None,
        json!({
            "scenarioCount": summary.scenario_count,
            "anomalyCount": summary.anomaly_count,
            "averageDurationMs": summary.average_duration_ms,
            "outcomeCounts": summary.outcome_counts,
            "summaryOut": summary_out_written,
        }),
    );

    if has_anomaly {
        std::process::exit(1);
    }
}

/// Scripted player for one session. Each variant plays its game to the end
/// through the public intent API only.
enum Bot {
    Maze {
        steps: Vec<Direction>,
        index: usize,
    },
    Sequence {
        pattern: Vec<usize>,
        selected: usize,
        submitted: bool,
    },
    Wager {
        target_streak: u32,
    },
}

impl Bot {
    fn act(&mut self, session: &mut SessionController, snapshot: &Snapshot) {
        match self {
            Bot::Maze { steps, index } => {
                if !snapshot.input_allowed || *index >= steps.len() {
                    return;
                }
                let moving = snapshot.entities.iter().any(|entity| {
                    matches!(
                        entity,
                        EntityView::Player {
                            target_cell: Some(_),
                            ..
                        }
                    )
                });
                if moving {
                    return;
                }
                if session.apply_intent(Intent::Move(steps[*index])) {
                    *index += 1;
                }
            }
            Bot::Sequence {
                pattern,
                selected,
                submitted,
            } => {
                if !snapshot.input_allowed || *submitted {
                    return;
                }
                if *selected < pattern.len() {
                    if session.apply_intent(Intent::SelectCell(pattern[*selected])) {
                        *selected += 1;
                    }
                } else if session.apply_intent(Intent::SubmitAnswer) {
                    *submitted = true;
                }
            }
            Bot::Wager { target_streak } => {
                let Some(wager) = snapshot.wager.as_ref() else {
                    return;
                };
                match wager.state {
                    WagerStateView::AwaitingGuess => {
                        session.apply_intent(Intent::Guess(WagerChoice::Even));
                    }
                    WagerStateView::Won => {
                        if wager.streak < *target_streak {
                            session.apply_intent(Intent::StepUp);
                        } else {
                            session.apply_intent(Intent::Claim);
                        }
                    }
                    WagerStateView::Lost | WagerStateView::Claimed => {}
                }
            }
        }
    }
}

fn run_scenario(scenario: &Scenario) -> ScenarioRunResult {
    let mut config = SessionConfig::new(scenario.game, scenario.difficulty, scenario.seed);
    config.draw = DrawSource::seeded(scenario.seed);
    let mut session = SessionController::new(config).expect("scenario session should build");
    let init = session.session_init();

    let first_snapshot = session.snapshot();
    let mut bot = match scenario.game {
        GameKind::MazeEscape => Bot::Maze {
            steps: plan_maze_path(&init),
            index: 0,
        },
        GameKind::SequenceRecall => Bot::Sequence {
            pattern: first_snapshot
                .sequence
                .as_ref()
                .and_then(|view| view.revealed.clone())
                .unwrap_or_default(),
            selected: 0,
            submitted: false,
        },
        GameKind::CoinWager => Bot::Wager { target_streak: 2 },
    };

    let mut anomalies = Vec::new();
    let mut anomaly_records = Vec::new();
    let mut anomaly_seen = HashSet::new();
    let mut collected = 0usize;
    let mut hazard_contacts = 0usize;
    let mut last_elapsed_ms = 0u64;
    let mut last_tick = 0u64;
    let mut tick_safety = 0usize;

    while !session.is_ended() {
        session.advance(TICK_MS);
        let snapshot = session.snapshot();
        last_tick = snapshot.tick;

        for message in collect_snapshot_anomalies(&snapshot, &init, last_elapsed_ms) {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                message,
            );
        }
        last_elapsed_ms = snapshot.elapsed_ms;

        for event in &snapshot.events {
            match event {
                RuntimeEvent::Collected { .. } => collected += 1,
                RuntimeEvent::HazardContact { .. } => hazard_contacts += 1,
                _ => {}
            }
        }

        bot.act(&mut session, &snapshot);

        tick_safety += 1;
        if tick_safety > 20 * 60 * 5 {
            push_anomaly(
                &mut anomalies,
                &mut anomaly_records,
                &mut anomaly_seen,
                snapshot.tick,
                "tick safety limit exceeded".to_string(),
            );
            break;
        }
    }

    let summary = session.summary();
    ScenarioRunResult {
        result: ScenarioResultLine {
            scenario: scenario.name.clone(),
            game: scenario.game,
            seed: scenario.seed,
            difficulty: scenario.difficulty,
            outcome: summary.outcome,
            duration_ms: summary.duration_ms,
            score: summary.score,
            ticks: last_tick,
            collected,
            hazard_contacts,
            grant_tier: summary.grant.map(|grant| grant.tier),
            anomalies,
        },
        anomaly_records,
        finished_tick: last_tick,
    }
}

/// Shortest start-to-exit walk recovered from the published tile strings.
fn plan_maze_path(init: &SessionInit) -> Vec<Direction> {
    let (Some(tiles), Some(start), Some(exit)) = (&init.tiles, init.start, init.exit) else {
        return Vec::new();
    };

    let is_path = |x: i32, y: i32| -> bool {
        if x < 0 || y < 0 {
            return false;
        }
        tiles
            .get(y as usize)
            .and_then(|row| row.as_bytes().get(x as usize))
            .map(|&tile| tile == b'.')
            .unwrap_or(false)
    };

    let mut prev: HashMap<(i32, i32), ((i32, i32), Direction)> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back((start.x, start.y));
    while let Some((x, y)) = queue.pop_front() {
        if (x, y) == (exit.x, exit.y) {
            break;
        }
        for dir in [
            Direction::Up,
            Direction::Down,
            Direction::Left,
            Direction::Right,
        ] {
            let (dx, dy) = dir.delta();
            let next = (x + dx, y + dy);
            if is_path(next.0, next.1) && next != (start.x, start.y) && !prev.contains_key(&next) {
                prev.insert(next, ((x, y), dir));
                queue.push_back(next);
            }
        }
    }

    let mut steps = Vec::new();
    let mut cursor = (exit.x, exit.y);
    while cursor != (start.x, start.y) {
        let Some(&(parent, dir)) = prev.get(&cursor) else {
            return Vec::new();
        };
        steps.push(dir);
        cursor = parent;
    }
    steps.reverse();
    steps
}

fn collect_snapshot_anomalies(
    snapshot: &Snapshot,
    init: &SessionInit,
    last_elapsed_ms: u64,
) -> Vec<String> {
    let mut anomalies = Vec::new();

    if !snapshot.phase_progress.is_finite()
        || snapshot.phase_progress < 0.0
        || snapshot.phase_progress > 1.0
    {
        anomalies.push(format!(
            "phase progress out of range: {}",
            snapshot.phase_progress
        ));
    }
    if snapshot.elapsed_ms < last_elapsed_ms {
        anomalies.push(format!(
            "elapsed time went backwards: {} -> {}",
            last_elapsed_ms, snapshot.elapsed_ms
        ));
    }
    if snapshot.score < 0 {
        anomalies.push(format!("negative score: {}", snapshot.score));
    }

    let Some(tiles) = &init.tiles else {
        return anomalies;
    };
    let width = init.cols.unwrap_or(0) as f32 * CELL_SIZE;
    let height = init.rows.unwrap_or(0) as f32 * CELL_SIZE;
    let wall_at = |x: f32, y: f32| -> bool {
        let cx = (x / CELL_SIZE).floor() as i32;
        let cy = (y / CELL_SIZE).floor() as i32;
        if cx < 0 || cy < 0 {
            return true;
        }
        tiles
            .get(cy as usize)
            .and_then(|row| row.as_bytes().get(cx as usize))
            .map(|&tile| tile == b'#')
            .unwrap_or(true)
    };

    for entity in &snapshot.entities {
        match entity {
            EntityView::Player { x, y, .. } => {
                if *x < 0.0 || *y < 0.0 || *x > width || *y > height {
                    anomalies.push(format!("player out of bounds: ({x:.1}, {y:.1})"));
                }
            }
            EntityView::Hazard { id, x, y, .. } => {
                if wall_at(*x, *y) {
                    anomalies.push(format!("hazard {id} inside a wall: ({x:.1}, {y:.1})"));
                }
            }
            EntityView::Collectible { .. } => {}
        }
    }

    anomalies
}

fn resolve_scenarios(cli: &Cli) -> Vec<Scenario> {
    let seed = normalize_seed(cli.seed.unwrap_or_else(now_ms));
    let difficulty = cli
        .difficulty
        .as_deref()
        .and_then(Difficulty::parse)
        .unwrap_or(Difficulty::Normal);
    let game = cli.game.as_deref().and_then(GameKind::parse);

    if cli.single || game.is_some() {
        let game = game.unwrap_or(GameKind::MazeEscape);
        return vec![Scenario {
            name: format!("custom-{}", game_key(game)),
            game,
            difficulty,
            seed,
        }];
    }

    vec![
        Scenario {
            name: "maze-normal".to_string(),
            game: GameKind::MazeEscape,
            difficulty: Difficulty::Normal,
            seed,
        },
        Scenario {
            name: "maze-hard".to_string(),
            game: GameKind::MazeEscape,
            difficulty: Difficulty::Hard,
            seed: normalize_seed(seed as u64 + 1),
        },
        Scenario {
            name: "sequence-normal".to_string(),
            game: GameKind::SequenceRecall,
            difficulty: Difficulty::Normal,
            seed: normalize_seed(seed as u64 + 2),
        },
        Scenario {
            name: "wager-scripted".to_string(),
            game: GameKind::CoinWager,
            difficulty: Difficulty::Normal,
            seed: normalize_seed(seed as u64 + 3),
        },
    ]
}

fn normalize_seed(seed: u64) -> u32 {
    seed as u32
}

fn push_anomaly(
    anomalies: &mut Vec<String>,
    anomaly_records: &mut Vec<AnomalyRecord>,
    anomaly_seen: &mut HashSet<String>,
    tick: u64,
    message: String,
) {
    anomaly_records.push(AnomalyRecord {
        tick,
        message: message.clone(),
    });
    if anomaly_seen.insert(message.clone()) {
        anomalies.push(message);
    }
}

fn default_run_id(seed: u32, timestamp_ms: u64) -> String {
    format!("sim-{seed}-{timestamp_ms}")
}

fn build_run_summary(
    run_id: String,
    started_at_ms: u64,
    finished_at_ms: u64,
    scenarios: Vec<ScenarioResultLine>,
    outcome_counts: BTreeMap<String, usize>,
    anomaly_count: usize,
    total_duration_ms: u64,
) -> RunSummary {
    let scenario_count = scenarios.len();
    let average_duration_ms = if scenario_count == 0 {
        0
    } else {
        total_duration_ms / scenario_count as u64
    };
    RunSummary {
        run_id,
        started_at_ms,
        finished_at_ms,
        scenario_count,
        anomaly_count,
        average_duration_ms,
        outcome_counts,
        scenarios,
    }
}

fn emit_log(
    level: &str,
    event: &str,
    run_id: &str,
    scenario: Option<&str>,
    seed: Option<u32>,
    tick: Option<u64>,
    details: Value,
) {
    let log_line = StructuredLogLine {
        timestamp_ms: now_ms(),
        level: level.to_string(),
        event: event.to_string(),
        run_id: run_id.to_string(),
        scenario: scenario.map(|value| value.to_string()),
        seed,
        tick,
        details,
    };
    eprintln!(
        "{}",
        serde_json::to_string(&log_line).expect("structured log should serialize")
    );
}

fn outcome_key(outcome: SessionOutcome) -> String {
    match outcome {
        SessionOutcome::Cleared => "cleared",
        SessionOutcome::Failed => "failed",
    }
    .to_string()
}

fn game_key(game: GameKind) -> &'static str {
    match game {
        GameKind::MazeEscape => "maze_escape",
        GameKind::SequenceRecall => "sequence_recall",
        GameKind::CoinWager => "coin_wager",
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let summary_text = serde_json::to_string_pretty(summary).expect("run summary should serialize");
    std::fs::write(path, summary_text)
}
