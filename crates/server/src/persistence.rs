//! Durable persistence: JSON snapshot files and the write-behind queue.
//!
//! Snapshot layout under the data directory:
//!
//! ```text
//! <dir>/meta.json                 id sequence watermark
//! <dir>/games/<uuid>.json         one GameRecord per file
//! <dir>/tournaments/<id>.json     one Versioned<Tournament> per file
//! ```
//!
//! Saves are incremental: only records dirtied since the previous save are
//! rewritten, and deleted records have their files removed.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use pong_engine::bracket::Tournament;
use pong_engine::ids::MatchId;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::dashboard::Metrics;
use crate::store::{DurableStore, GameRecord, MemoryStore, RecordKey, StoreError, Versioned};

#[derive(Serialize, Deserialize, Debug)]
struct Meta {
    next_id: u64,
}

// ── Save ─────────────────────────────────────────────────────────────────

/// Write every dirty record to `<dir>` and remove files of deleted ones.
/// Returns the number of records written.
pub fn save_store(store: &MemoryStore, dir: &Path) -> Result<usize> {
    let dirty = store.take_dirty();
    let deleted = store.take_deleted();
    if dirty.is_empty() && deleted.is_empty() {
        tracing::info!("Store save: nothing to save (no dirty records)");
        return Ok(0);
    }

    let start = Instant::now();
    let games_dir = dir.join("games");
    let tournaments_dir = dir.join("tournaments");
    fs::create_dir_all(&games_dir)?;
    fs::create_dir_all(&tournaments_dir)?;

    let mut written = 0usize;
    for (i, key) in dirty.iter().enumerate() {
        let result = match *key {
            RecordKey::Game(id) => match store.get_game(id) {
                Some(record) => write_json(&games_dir.join(format!("{}.json", id)), &record),
                None => continue, // Deleted between dirty-mark and save.
            },
            RecordKey::Tournament(id) => match store.get_tournament(id) {
                Some(record) => {
                    write_json(&tournaments_dir.join(format!("{}.json", id)), &record)
                }
                None => continue,
            },
        };
        if let Err(e) = result {
            // Put the unwritten tail back so the next save retries it.
            store.requeue_dirty(&dirty[i..]);
            return Err(e);
        }
        written += 1;
    }

    for key in &deleted {
        let path = match *key {
            RecordKey::Game(id) => games_dir.join(format!("{}.json", id)),
            RecordKey::Tournament(id) => tournaments_dir.join(format!("{}.json", id)),
        };
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
        }
    }

    write_json(
        &dir.join("meta.json"),
        &Meta {
            next_id: store.id_watermark(),
        },
    )?;

    tracing::info!(
        "Store saved: {} records written, {} removed ({:.2?})",
        written,
        deleted.len(),
        start.elapsed(),
    );
    Ok(written)
}

/// Write to a sibling temp file, then rename over the target.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming into {}", path.display()))?;
    Ok(())
}

// ── Load ─────────────────────────────────────────────────────────────────

/// Load every record under `<dir>` into `store` (without dirtying them).
/// Returns the number of records loaded; a missing directory loads nothing.
pub fn load_into(store: &MemoryStore, dir: &Path) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let start = Instant::now();

    let meta_path = dir.join("meta.json");
    if meta_path.exists() {
        let meta: Meta = read_json(&meta_path)?;
        store.raise_id_watermark(meta.next_id);
    }

    let mut games = 0usize;
    for path in json_files(&dir.join("games"))? {
        let record: GameRecord = read_json(&path)?;
        store.restore_game(record);
        games += 1;
    }

    let mut tournaments = 0usize;
    for path in json_files(&dir.join("tournaments"))? {
        let record: Versioned<Tournament> = read_json(&path)?;
        // Keep the sequence ahead of every id already handed out.
        let highest = record
            .value
            .matches
            .iter()
            .map(|m| m.match_id.0)
            .chain(std::iter::once(record.value.tournament_id.0))
            .max()
            .unwrap_or(0);
        store.raise_id_watermark(highest + 1);
        store.restore_tournament(record);
        tournaments += 1;
    }

    if games + tournaments > 0 {
        tracing::info!(
            "Store loaded: {} games, {} tournaments ({:.2?})",
            games,
            tournaments,
            start.elapsed(),
        );
    }
    Ok(games + tournaments)
}

fn json_files(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(path);
        } else {
            tracing::warn!("Skipping unexpected file in {}: {}", dir.display(), path.display());
        }
    }
    Ok(files)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}

// ── Write-behind queue ───────────────────────────────────────────────────

/// Serializes game writes onto one task and retries failures on an
/// interval until they land (at-least-once). Only the newest revision of a
/// game is retried; older ones are superseded.
#[derive(Clone)]
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<GameRecord>,
}

impl PersistQueue {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn(
        store: Arc<dyn DurableStore>,
        metrics: Arc<Metrics>,
        retry_every: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_queue(store, metrics, rx, retry_every));
        Self { tx }
    }

    pub fn enqueue(&self, record: GameRecord) {
        if self.tx.send(record).is_err() {
            tracing::warn!("Persist queue is closed; dropping game write");
        }
    }
}

async fn run_queue(
    store: Arc<dyn DurableStore>,
    metrics: Arc<Metrics>,
    mut rx: mpsc::UnboundedReceiver<GameRecord>,
    retry_every: Duration,
) {
    let mut pending: HashMap<MatchId, GameRecord> = HashMap::new();
    let mut retry = tokio::time::interval(retry_every);
    retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
    retry.tick().await; // first tick is immediate, skip it

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(record) = received else {
                    break;
                };
                write_or_hold(store.as_ref(), &metrics, &mut pending, record);
            }
            _ = retry.tick(), if !pending.is_empty() => {
                let due: Vec<GameRecord> = pending.drain().map(|(_, r)| r).collect();
                tracing::info!("Retrying {} pending game writes", due.len());
                for record in due {
                    write_or_hold(store.as_ref(), &metrics, &mut pending, record);
                }
            }
        }
    }

    // Senders are gone: last attempt for anything still pending.
    for (_, record) in pending.drain() {
        if let Err(e) = store.put_game(&record) {
            tracing::error!("Dropping game {} write at shutdown: {}", record.game_id, e);
        }
    }
}

fn write_or_hold(
    store: &dyn DurableStore,
    metrics: &Metrics,
    pending: &mut HashMap<MatchId, GameRecord>,
    record: GameRecord,
) {
    let id = record.game_id;
    if pending.get(&id).is_some_and(|held| held.revision > record.revision) {
        return;
    }
    match store.put_game(&record) {
        Ok(()) => {
            metrics.store_write_ok();
            pending.remove(&id);
        }
        Err(StoreError::Stale { stored, attempted }) => {
            tracing::debug!(
                "Game {}: dropping stale write (rev {} < stored {})",
                id,
                attempted,
                stored
            );
            pending.remove(&id);
        }
        Err(e) => {
            metrics.store_write_failed();
            tracing::warn!("Game {} write failed, will retry: {}", id, e);
            pending.insert(id, record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pong_engine::clock::{Clock, ManualClock};
    use pong_engine::game::{EndReason, MatchConfig, MatchEngine};
    use pong_engine::ids::{TournamentId, UserId};

    fn record(user: u64) -> GameRecord {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(5_000));
        let engine = MatchEngine::with_seed(
            MatchId::new(),
            UserId(user),
            format!("user{}", user),
            Arc::new(MatchConfig::default()),
            clock,
            1,
        );
        GameRecord::from_engine(&engine, 5_000)
    }

    fn temp_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("pong_test_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_save_load_roundtrip() {
        let store = MemoryStore::new();
        let game = record(1);
        store.put_game(&game).unwrap();
        let t = Tournament::new(TournamentId(store.next_id()), "cup", UserId(1), "one", 4, 10);
        store.insert_tournament(&t).unwrap();
        assert_eq!(store.dirty_count(), 2);

        let tmp = temp_dir("roundtrip");
        let saved = save_store(&store, &tmp).unwrap();
        assert_eq!(saved, 2);
        assert!(tmp.join(format!("games/{}.json", game.game_id)).exists());
        assert!(tmp.join(format!("tournaments/{}.json", t.tournament_id)).exists());

        let loaded = MemoryStore::new();
        assert_eq!(load_into(&loaded, &tmp).unwrap(), 2);
        assert_eq!(loaded.get_game(game.game_id), Some(game));
        let back = loaded.get_tournament(t.tournament_id).unwrap();
        assert_eq!(back.version, 1);
        assert_eq!(back.value, t);

        // Loading does not dirty, and the id sequence continues past saved ids.
        assert_eq!(loaded.dirty_count(), 0);
        assert_eq!(save_store(&loaded, &tmp).unwrap(), 0);
        assert!(loaded.next_id() > t.tournament_id.0);

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn test_incremental_save() {
        let store = MemoryStore::new();
        let mut first = record(1);
        let second = record(2);
        store.put_game(&first).unwrap();
        store.put_game(&second).unwrap();

        let tmp = temp_dir("incremental");
        assert_eq!(save_store(&store, &tmp).unwrap(), 2);
        assert_eq!(store.dirty_count(), 0);

        first.close(EndReason::Inactivity, 9_000);
        store.put_game(&first).unwrap();
        assert_eq!(save_store(&store, &tmp).unwrap(), 1);

        store.delete_game(second.game_id).unwrap();
        save_store(&store, &tmp).unwrap();
        assert!(!tmp.join(format!("games/{}.json", second.game_id)).exists());

        let loaded = MemoryStore::new();
        assert_eq!(load_into(&loaded, &tmp).unwrap(), 1);
        assert!(loaded.get_game(first.game_id).unwrap().is_finished());

        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn test_missing_dir_loads_nothing() {
        let store = MemoryStore::new();
        let tmp = temp_dir("missing");
        assert_eq!(load_into(&store, &tmp).unwrap(), 0);
    }
}
