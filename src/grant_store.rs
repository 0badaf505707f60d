use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GameKind, GrantsResponse, RewardGrant, StoredGrant, UserGrantsEntry};

/// Grants kept per user before the oldest are dropped.
const MAX_GRANT_HISTORY: usize = 50;

/// Grants exposed per user in API responses, newest first.
const RECENT_GRANTS: usize = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredUserGrants {
    name: String,
    grants: Vec<StoredGrant>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct GrantStoreFile {
    version: u8,
    users: HashMap<String, StoredUserGrants>,
}

#[derive(Clone, Debug, Deserialize)]
struct GrantStoreFileRaw {
    version: u8,
    users: HashMap<String, serde_json::Value>,
}

/// File-backed ledger of resolved reward grants. Writes are best effort:
/// a failed save is logged and the in-memory state stays authoritative.
pub struct GrantStore {
    file_path: PathBuf,
    users: HashMap<String, StoredUserGrants>,
}

impl GrantStore {
    pub fn new(file_path: PathBuf) -> Self {
        let users = load_users(&file_path);
        Self { file_path, users }
    }

    pub fn record_grant(&mut self, name: &str, game: GameKind, grant: &RewardGrant) {
        let key = store_key(name);
        if key.is_empty() {
            return;
        }
        let entry = self.users.entry(key).or_insert_with(|| StoredUserGrants {
            name: name.trim().to_string(),
            grants: Vec::new(),
        });
        entry.name = name.trim().to_string();
        entry.grants.push(StoredGrant {
            tier: grant.tier.clone(),
            payout_spec: grant.payout_spec.clone(),
            multiplier: grant.multiplier,
            game: game_label(game).to_string(),
            granted_at_ms: now_ms(),
        });
        if entry.grants.len() > MAX_GRANT_HISTORY {
            let excess = entry.grants.len() - MAX_GRANT_HISTORY;
            entry.grants.drain(..excess);
        }

        self.save();
    }

    pub fn build_response(&self, requested_limit: Option<usize>) -> GrantsResponse {
        GrantsResponse {
            generated_at_iso: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            users: self.get_top(requested_limit),
        }
    }

    fn get_top(&self, requested_limit: Option<usize>) -> Vec<UserGrantsEntry> {
        let normalized_limit = requested_limit.unwrap_or(10).clamp(1, 100);
        let mut entries: Vec<UserGrantsEntry> = self
            .users
            .values()
            .map(|stored| {
                let mut recent: Vec<StoredGrant> =
                    stored.grants.iter().rev().take(RECENT_GRANTS).cloned().collect();
                recent.sort_by(|a, b| b.granted_at_ms.cmp(&a.granted_at_ms));
                UserGrantsEntry {
                    name: stored.name.clone(),
                    grant_count: stored.grants.len() as u64,
                    recent,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.grant_count
                .cmp(&a.grant_count)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        entries.truncate(normalized_limit);
        entries
    }

    fn save(&self) {
        if let Some(parent) = self.file_path.parent() {
            if let Err(error) = fs::create_dir_all(parent) {
                eprintln!(
                    "[grant-store] failed to create parent dir {}: {error}",
                    parent.display()
                );
                return;
            }
        }

        let payload = GrantStoreFile {
            version: 1,
            users: self.users.clone(),
        };
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => {
                if let Err(error) = fs::write(&self.file_path, text) {
                    eprintln!(
                        "[grant-store] failed to write {}: {error}",
                        self.file_path.display()
                    );
                }
            }
            Err(error) => {
                eprintln!(
                    "[grant-store] failed to serialize payload for {}: {error}",
                    self.file_path.display()
                );
            }
        }
    }
}

fn load_users(path: &Path) -> HashMap<String, StoredUserGrants> {
    let text = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(error) => {
            if error.kind() != std::io::ErrorKind::NotFound {
                eprintln!("[grant-store] failed to read {}: {error}", path.display());
            }
            return HashMap::new();
        }
    };
    let parsed: GrantStoreFileRaw = match serde_json::from_str::<GrantStoreFileRaw>(&text) {
        Ok(value) if value.version == 1 => value,
        Ok(value) => {
            eprintln!(
                "[grant-store] unsupported version {} at {}",
                value.version,
                path.display()
            );
            return HashMap::new();
        }
        Err(error) => {
            eprintln!("[grant-store] failed to parse {}: {error}", path.display());
            return HashMap::new();
        }
    };

    let mut sanitized = HashMap::<String, StoredUserGrants>::new();
    for (user_key, raw_value) in parsed.users {
        let value: StoredUserGrants = match serde_json::from_value(raw_value) {
            Ok(entry) => entry,
            Err(error) => {
                eprintln!(
                    "[grant-store] failed to parse user entry '{}' in {}: {error}",
                    user_key,
                    path.display()
                );
                continue;
            }
        };
        let Some(normalized) = sanitize_stored_user(value) else {
            continue;
        };
        let key = store_key(&normalized.name);
        if key.is_empty() {
            continue;
        }

        match sanitized.get_mut(&key) {
            Some(current) => {
                current.name = normalized.name;
                current.grants.extend(normalized.grants);
                current.grants.sort_by_key(|grant| grant.granted_at_ms);
                if current.grants.len() > MAX_GRANT_HISTORY {
                    let excess = current.grants.len() - MAX_GRANT_HISTORY;
                    current.grants.drain(..excess);
                }
            }
            None => {
                sanitized.insert(key, normalized);
            }
        }
    }

    sanitized
}

fn sanitize_stored_user(value: StoredUserGrants) -> Option<StoredUserGrants> {
    let normalized_name = value.name.trim().to_string();
    if normalized_name.is_empty() {
        return None;
    }
    let grants: Vec<StoredGrant> = value
        .grants
        .into_iter()
        .filter(|grant| !grant.tier.trim().is_empty() && grant.multiplier >= 1)
        .collect();
    Some(StoredUserGrants {
        name: normalized_name,
        grants,
    })
}

fn store_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn game_label(game: GameKind) -> &'static str {
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
