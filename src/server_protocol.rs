use serde_json::Value;

use crate::types::{Difficulty, Direction, GameKind, Intent, WagerChoice};

#[derive(Debug)]
pub enum ParsedClientMessage {
    Hello {
        name: String,
    },
    Start {
        game: GameKind,
        difficulty: Option<Difficulty>,
        rows: Option<i64>,
        cols: Option<i64>,
    },
    Intent {
        intent: Intent,
    },
    Retry,
    Exit,
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            Some(ParsedClientMessage::Hello { name })
        }
        "start" => {
            let game = GameKind::parse(object.get("game")?.as_str()?)?;
            let difficulty = match object.get("difficulty") {
                None => None,
                Some(value) => Difficulty::parse(value.as_str()?),
            };
            if object.get("difficulty").is_some() && difficulty.is_none() {
                return None;
            }
            let rows = parse_optional_i64(object.get("rows"))?;
            let cols = parse_optional_i64(object.get("cols"))?;
            Some(ParsedClientMessage::Start {
                game,
                difficulty,
                rows,
                cols,
            })
        }
        "intent" => {
            let intent = parse_intent(object)?;
            Some(ParsedClientMessage::Intent { intent })
        }
        "retry" => Some(ParsedClientMessage::Retry),
        "exit" => Some(ParsedClientMessage::Exit),
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

fn parse_intent(object: &serde_json::Map<String, Value>) -> Option<Intent> {
    let action = object.get("action")?.as_str()?;
    match action {
        "move" => {
            let dir = Direction::parse_move(object.get("dir")?.as_str()?)?;
            Some(Intent::Move(dir))
        }
        "select_cell" => {
            let cell = object.get("cell")?.as_u64()?;
            let cell = usize::try_from(cell).ok()?;
            Some(Intent::SelectCell(cell))
        }
        "submit_answer" => Some(Intent::SubmitAnswer),
        "guess" => {
            let choice = WagerChoice::parse(object.get("choice")?.as_str()?)?;
            Some(Intent::Guess(choice))
        }
        "step_up" => Some(Intent::StepUp),
        "claim" => Some(Intent::Claim),
        _ => None,
    }
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_991.0;

    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored.abs() > MAX_SAFE_INTEGER_F64 {
                return None;
            }
            if floored < i64::MIN as f64 || floored > i64::MAX as f64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}
