use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use duo_arcade_server::constants::{MAZE_COLS, MAZE_ROWS, TICK_MS};
use duo_arcade_server::grant_store::GrantStore;
use duo_arcade_server::rng::DrawSource;
use duo_arcade_server::server_protocol::{parse_client_message, ParsedClientMessage};
use duo_arcade_server::session::{SessionConfig, SessionController};
use duo_arcade_server::types::{Difficulty, GameKind, Intent, RewardGrant};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type SharedState = Arc<Mutex<ServerState>>;

struct ClientContext {
    tx: mpsc::Sender<OutboundMessage>,
    name: Option<String>,
    session: Option<SessionController>,
    game_over_sent: bool,
}

#[derive(Clone, Debug)]
enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum QueuePolicy {
    DropOnFull,
    DisconnectOnFull,
}

struct ServerState {
    clients: HashMap<String, ClientContext>,
    grant_store: GrantStore,
}

impl ServerState {
    fn new(grant_store: GrantStore) -> Self {
        Self {
            clients: HashMap::new(),
            grant_store,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GrantsQuery {
    limit: Option<String>,
}

#[tokio::main]
async fn main() {
    let port = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let grants_path = std::env::var("GRANTS_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".data/grants.json"));

    let state = Arc::new(Mutex::new(ServerState::new(GrantStore::new(grants_path))));
    start_tick_loop(state.clone());

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/grants", get(grants_handler))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let app = if let Some(static_dir) = resolve_static_dir() {
        let index_file = static_dir.join("index.html");
        println!(
            "[server] static file root: {}",
            static_dir.to_string_lossy()
        );
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        eprintln!("[server] static file root not found. run the client build to generate dist/client.");
        app
    };

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    println!("[server] listening on :{port}");
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn resolve_static_dir() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("STATIC_DIR") {
        let path = PathBuf::from(raw);
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [
        PathBuf::from("dist/client"),
        PathBuf::from("../../dist/client"),
    ];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn grants_handler(
    State(state): State<SharedState>,
    Query(query): Query<GrantsQuery>,
) -> impl IntoResponse {
    let guard = state.lock().await;
    Json(
        guard
            .grant_store
            .build_response(parse_grants_limit(query.limit.as_deref())),
    )
}

fn parse_grants_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.parse::<usize>().ok())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: SharedState, socket: WebSocket) {
    let client_id = make_id("client");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = state.lock().await;
        guard.clients.insert(
            client_id.clone(),
            ClientContext {
                tx: tx.clone(),
                name: None,
                session: None,
                game_over_sent: false,
            },
        );
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(state.clone(), &client_id, raw.to_string()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(state.clone(), &client_id, text).await;
                } else {
                    send_error_to_client(&state, &client_id, "invalid utf8 message").await;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = state.lock().await;
        guard.clients.remove(&client_id);
    }
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(state: SharedState, client_id: &str, raw: String) {
    let Some(message) = parse_client_message(&raw) else {
        send_error_to_client(&state, client_id, "invalid message").await;
        return;
    };

    match message {
        ParsedClientMessage::Hello { name } => {
            let mut guard = state.lock().await;
            let name = sanitize_name(&name);
            if let Some(ctx) = guard.clients.get_mut(client_id) {
                ctx.name = Some(name.clone());
            }
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "welcome",
                    "name": name,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        ParsedClientMessage::Start {
            game,
            difficulty,
            rows,
            cols,
        } => {
            handle_start(state, client_id, game, difficulty, rows, cols).await;
        }
        ParsedClientMessage::Intent { intent } => {
            handle_intent(state, client_id, intent).await;
        }
        ParsedClientMessage::Retry => {
            handle_retry(state, client_id).await;
        }
        ParsedClientMessage::Exit => {
            let mut guard = state.lock().await;
            if let Some(ctx) = guard.clients.get_mut(client_id) {
                ctx.session = None;
                ctx.game_over_sent = false;
            }
        }
        ParsedClientMessage::Ping { t } => {
            let mut guard = state.lock().await;
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "pong",
                    "t": t,
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

async fn handle_start(
    state: SharedState,
    client_id: &str,
    game: GameKind,
    difficulty: Option<Difficulty>,
    rows: Option<i64>,
    cols: Option<i64>,
) {
    let mut guard = state.lock().await;
    let Some(name) = guard
        .clients
        .get(client_id)
        .and_then(|ctx| ctx.name.clone())
    else {
        send_to_client(
            &mut guard,
            client_id,
            &json!({
                "type": "error",
                "message": "send hello first",
            }),
            QueuePolicy::DisconnectOnFull,
        );
        return;
    };

    let mut config = SessionConfig::new(game, difficulty.unwrap_or(Difficulty::Normal), seed_now());
    config.rows = normalize_dimension(rows, MAZE_ROWS);
    config.cols = normalize_dimension(cols, MAZE_COLS);
    // the reward draw stream is tied to the user and calendar day, so it
    // cannot be re-rolled by reconnecting
    config.draw = DrawSource::for_user_day(&name, Utc::now().date_naive());

    let session = match SessionController::new(config) {
        Ok(session) => session,
        Err(error) => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "error",
                    "message": format!("failed to start session: {error}"),
                }),
                QueuePolicy::DisconnectOnFull,
            );
            return;
        }
    };

    let init = session.session_init();
    if let Some(ctx) = guard.clients.get_mut(client_id) {
        ctx.session = Some(session);
        ctx.game_over_sent = false;
    }

    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "session_init",
            "init": init,
            "startedAtMs": now_ms(),
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

async fn handle_intent(state: SharedState, client_id: &str, intent: Intent) {
    let mut guard = state.lock().await;
    let Some(ctx) = guard.clients.get_mut(client_id) else {
        return;
    };
    let Some(session) = ctx.session.as_mut() else {
        send_to_client(
            &mut guard,
            client_id,
            &json!({
                "type": "error",
                "message": "no session running",
            }),
            QueuePolicy::DisconnectOnFull,
        );
        return;
    };
    // rejected intents are silent; the next state snapshot is the answer
    session.apply_intent(intent);
}

async fn handle_retry(state: SharedState, client_id: &str) {
    let mut guard = state.lock().await;
    let Some(ctx) = guard.clients.get_mut(client_id) else {
        return;
    };

    let retried = match ctx.session.as_ref() {
        Some(session) if session.is_ended() => session.retry(),
        _ => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "error",
                    "message": "retry is only available after the session ends",
                }),
                QueuePolicy::DisconnectOnFull,
            );
            return;
        }
    };

    match retried {
        Ok(session) => {
            let init = session.session_init();
            ctx.session = Some(session);
            ctx.game_over_sent = false;
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "session_init",
                    "init": init,
                    "startedAtMs": now_ms(),
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
        Err(error) => {
            send_to_client(
                &mut guard,
                client_id,
                &json!({
                    "type": "error",
                    "message": format!("failed to retry session: {error}"),
                }),
                QueuePolicy::DisconnectOnFull,
            );
        }
    }
}

fn start_tick_loop(state: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = state.lock().await;
            tick_sessions(&mut guard);
        }
    });
}

fn tick_sessions(state: &mut ServerState) {
    let client_ids: Vec<String> = state.clients.keys().cloned().collect();
    for client_id in client_ids {
        let mut outgoing: Vec<(Value, QueuePolicy)> = Vec::new();
        let mut grant_record: Option<(String, GameKind, RewardGrant)> = None;

        if let Some(ctx) = state.clients.get_mut(&client_id) {
            let Some(session) = ctx.session.as_mut() else {
                continue;
            };
            if ctx.game_over_sent {
                continue;
            }

            session.advance(TICK_MS);
            let snapshot = session.snapshot();
            outgoing.push((
                json!({
                    "type": "state",
                    "snapshot": snapshot,
                }),
                QueuePolicy::DropOnFull,
            ));

            if session.is_ended() {
                ctx.game_over_sent = true;
                let summary = session.summary();
                if let Some(grant) = session.grant() {
                    let name = ctx.name.clone().unwrap_or_else(|| "Player".to_string());
                    grant_record = Some((name, session.game(), grant.clone()));
                }
                outgoing.push((
                    json!({
                        "type": "game_over",
                        "summary": summary,
                    }),
                    QueuePolicy::DisconnectOnFull,
                ));
            }
        } else {
            continue;
        }

        if let Some((name, game, grant)) = grant_record {
            state.grant_store.record_grant(&name, game, &grant);
        }
        for (message, policy) in outgoing {
            send_to_client(state, &client_id, &message, policy);
        }
    }
}

fn send_to_client(state: &mut ServerState, client_id: &str, message: &Value, policy: QueuePolicy) {
    let send_failed = if let Some(client) = state.clients.get(client_id) {
        client
            .tx
            .try_send(OutboundMessage::Text(message.to_string()))
            .is_err()
    } else {
        false
    };
    if send_failed && policy == QueuePolicy::DisconnectOnFull {
        if let Some(client) = state.clients.remove(client_id) {
            let _ = client.tx.try_send(OutboundMessage::Close {
                code: 1013,
                reason: "outbound queue overflow".to_string(),
            });
        }
    }
}

async fn send_error_to_client(state: &SharedState, client_id: &str, message: &str) {
    let mut guard = state.lock().await;
    send_to_client(
        &mut guard,
        client_id,
        &json!({
            "type": "error",
            "message": message,
        }),
        QueuePolicy::DisconnectOnFull,
    );
}

fn sanitize_name(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "Player".to_string();
    }
    trimmed.chars().take(16).collect()
}

fn normalize_dimension(value: Option<i64>, default: usize) -> usize {
    match value {
        None => default,
        Some(requested) => requested.clamp(5, 41) as usize,
    }
}

fn make_id(prefix: &str) -> String {
    let seq = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{seq}")
}

fn seed_now() -> u32 {
    now_ms() as u32
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
