//! SQLite storage backend
//!
//! One database file holds the event log, the edge table, the aggregation
//! cursor, and session carryover state, so a batch commit is a single SQLite
//! transaction.

use super::traits::{
    BatchCommit, EventLog, GravityStore, MergeOutcome, OpenStore, StorageError, StorageResult,
};
use crate::graph::{Checkpoint, Edge, Event, EventType, SessionState, TrackId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed event log and gravity store
///
/// Thread-safe via internal mutex on the connection. Edge increments use
/// `ON CONFLICT DO UPDATE SET weight = weight + excluded.weight`, a single
/// atomic increment-or-insert: there is never a read-then-write window for a
/// concurrent writer to race.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Append-only behavioral event log; seq is the log order
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                track_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                meta_json TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id);

            -- The gravity graph: one row per directed track pair
            CREATE TABLE IF NOT EXISTS track_edges (
                from_track_id TEXT NOT NULL,
                to_track_id TEXT NOT NULL,
                weight REAL NOT NULL DEFAULT 0.0,
                PRIMARY KEY (from_track_id, to_track_id)
            );
            CREATE INDEX IF NOT EXISTS idx_edges_from_weight
                ON track_edges(from_track_id, weight DESC);

            -- Single-row aggregation cursor
            CREATE TABLE IF NOT EXISTS gravity_cursor (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                last_sequence INTEGER NOT NULL DEFAULT 0,
                last_event_id TEXT,
                last_timestamp TEXT
            );
            INSERT OR IGNORE INTO gravity_cursor (id, last_sequence) VALUES (1, 0);

            -- Session carryover: survives batch boundaries, TTL-evicted
            CREATE TABLE IF NOT EXISTS session_state (
                session_id TEXT PRIMARY KEY,
                prev_track_id TEXT,
                skipped_prev INTEGER NOT NULL DEFAULT 0,
                last_seen TEXT NOT NULL
            );

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }

    fn row_to_event(
        seq: i64,
        id: String,
        session_id: String,
        track_id: String,
        event_type: String,
        timestamp: String,
        meta_json: String,
    ) -> StorageResult<Event> {
        Ok(Event {
            id,
            session_id,
            track: TrackId::from_string(track_id),
            event_type: EventType::parse(&event_type),
            timestamp: Self::parse_timestamp(&timestamp)?,
            sequence: seq,
            meta: serde_json::from_str(&meta_json)?,
        })
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl EventLog for SqliteStore {
    fn append(&self, event: &Event) -> StorageResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO events (id, session_id, track_id, event_type, timestamp, meta_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                event.id,
                event.session_id,
                event.track.as_str(),
                event.event_type.as_str(),
                event.timestamp.to_rfc3339(),
                serde_json::to_string(&event.meta)?,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn fetch_since(&self, sequence: i64, limit: usize) -> StorageResult<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT seq, id, session_id, track_id, event_type, timestamp, meta_json
            FROM events
            WHERE seq > ?1
            ORDER BY seq ASC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![sequence, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (seq, id, session_id, track_id, event_type, timestamp, meta_json) = row?;
            events.push(Self::row_to_event(
                seq, id, session_id, track_id, event_type, timestamp, meta_json,
            )?);
        }
        Ok(events)
    }
}

impl GravityStore for SqliteStore {
    fn outgoing_edges(&self, track: &TrackId) -> StorageResult<HashMap<TrackId, f64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT to_track_id, weight FROM track_edges WHERE from_track_id = ?1",
        )?;

        let rows = stmt.query_map(params![track.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut edges = HashMap::new();
        for row in rows {
            let (to, weight) = row?;
            edges.insert(TrackId::from_string(to), weight);
        }
        Ok(edges)
    }

    fn top_neighbors(&self, track: &TrackId, limit: usize) -> StorageResult<Vec<Edge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT to_track_id, weight FROM track_edges
            WHERE from_track_id = ?1
            ORDER BY weight DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![track.as_str(), limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (to, weight) = row?;
            edges.push(Edge::new(track.clone(), TrackId::from_string(to), weight));
        }
        Ok(edges)
    }

    fn checkpoint(&self) -> StorageResult<Checkpoint> {
        let conn = self.conn.lock().unwrap();
        let (last_sequence, last_event_id, last_timestamp) = conn.query_row(
            "SELECT last_sequence, last_event_id, last_timestamp FROM gravity_cursor WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )?;

        let last_timestamp = match last_timestamp {
            Some(raw) => Some(Self::parse_timestamp(&raw)?),
            None => None,
        };

        Ok(Checkpoint {
            last_sequence,
            last_event_id,
            last_timestamp,
        })
    }

    fn session_states(
        &self,
        session_ids: &[String],
    ) -> StorageResult<HashMap<String, SessionState>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT prev_track_id, skipped_prev, last_seen FROM session_state WHERE session_id = ?1",
        )?;

        let mut states = HashMap::new();
        for sid in session_ids {
            let row = stmt
                .query_row(params![sid], |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;

            if let Some((prev_track_id, skipped_prev, last_seen)) = row {
                states.insert(
                    sid.clone(),
                    SessionState {
                        prev_track: prev_track_id.map(TrackId::from_string),
                        skipped_prev,
                        last_seen: Some(Self::parse_timestamp(&last_seen)?),
                    },
                );
            }
        }
        Ok(states)
    }

    fn merge_batch(&self, commit: &BatchCommit) -> StorageResult<MergeOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        // Compare-and-swap on the cursor first: zero rows updated means the
        // checkpoint already covers this batch, so nothing else may be
        // written. Dropping the transaction rolls back.
        let advanced = tx.execute(
            r#"
            UPDATE gravity_cursor
            SET last_sequence = ?1, last_event_id = ?2, last_timestamp = ?3
            WHERE id = 1 AND last_sequence < ?1
            "#,
            params![
                commit.checkpoint.last_sequence,
                commit.checkpoint.last_event_id,
                commit.checkpoint.last_timestamp.map(|t| t.to_rfc3339()),
            ],
        )?;
        if advanced == 0 {
            return Ok(MergeOutcome::AlreadyApplied);
        }

        for (key, delta) in commit.deltas.iter() {
            // A batch whose crossings of a pair cancel out nets to zero;
            // writing it would materialize a phantom edge
            if delta == 0.0 {
                continue;
            }
            tx.execute(
                r#"
                INSERT INTO track_edges (from_track_id, to_track_id, weight)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(from_track_id, to_track_id)
                    DO UPDATE SET weight = weight + excluded.weight
                "#,
                params![key.from.as_str(), key.to.as_str(), delta],
            )?;
        }

        for (session_id, state) in &commit.session_states {
            tx.execute(
                r#"
                INSERT INTO session_state (session_id, prev_track_id, skipped_prev, last_seen)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(session_id) DO UPDATE SET
                    prev_track_id = excluded.prev_track_id,
                    skipped_prev = excluded.skipped_prev,
                    last_seen = excluded.last_seen
                "#,
                params![
                    session_id,
                    state.prev_track.as_ref().map(|t| t.as_str().to_string()),
                    state.skipped_prev,
                    state.last_seen.unwrap_or_else(Utc::now).to_rfc3339(),
                ],
            )?;
        }

        if let Some(cutoff) = commit.evict_sessions_before {
            tx.execute(
                "DELETE FROM session_state WHERE last_seen < ?1",
                params![cutoff.to_rfc3339()],
            )?;
        }

        tx.commit()?;
        Ok(MergeOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DeltaMap, EdgeKey, EventMeta};
    use chrono::Duration;

    fn event(session: &str, track: &str, kind: EventType) -> Event {
        Event::new(session, track, kind)
    }

    fn commit_for(deltas: DeltaMap, last_sequence: i64) -> BatchCommit {
        BatchCommit {
            deltas,
            checkpoint: Checkpoint {
                last_sequence,
                last_event_id: Some("ev-last".to_string()),
                last_timestamp: Some(Utc::now()),
            },
            session_states: HashMap::new(),
            evict_sessions_before: None,
        }
    }

    #[test]
    fn fresh_store_has_origin_checkpoint() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cp = store.checkpoint().unwrap();
        assert_eq!(cp.last_sequence, 0);
        assert!(cp.last_event_id.is_none());
    }

    #[test]
    fn append_assigns_increasing_sequences() {
        let store = SqliteStore::open_in_memory().unwrap();
        let s1 = store.append(&event("s", "a", EventType::PlayStart)).unwrap();
        let s2 = store.append(&event("s", "b", EventType::PlayStart)).unwrap();
        assert!(s2 > s1);
    }

    #[test]
    fn fetch_since_is_strictly_after_and_ordered() {
        let store = SqliteStore::open_in_memory().unwrap();
        for track in ["a", "b", "c", "d"] {
            store.append(&event("s", track, EventType::PlayStart)).unwrap();
        }

        let all = store.fetch_since(0, 100).unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].sequence < w[1].sequence));

        let after_second = store.fetch_since(all[1].sequence, 100).unwrap();
        assert_eq!(after_second.len(), 2);
        assert_eq!(after_second[0].track.as_str(), "c");

        let limited = store.fetch_since(0, 2).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn fetch_round_trips_meta_and_type() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ev = event("s", "a", EventType::Skip)
            .with_meta(EventMeta::new().with("elapsed_ms", 2000));
        store.append(&ev).unwrap();

        let fetched = store.fetch_since(0, 1).unwrap();
        assert_eq!(fetched[0].event_type, EventType::Skip);
        assert_eq!(fetched[0].meta.elapsed_ms(), 2000);
        assert_eq!(fetched[0].id, ev.id);
    }

    #[test]
    fn merge_applies_increments_on_top_of_existing_weights() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut deltas = DeltaMap::new();
        deltas.add(EdgeKey::new("a", "b"), 1.0);
        assert_eq!(
            store.merge_batch(&commit_for(deltas, 1)).unwrap(),
            MergeOutcome::Applied
        );

        let mut deltas = DeltaMap::new();
        deltas.add(EdgeKey::new("a", "b"), 2.0);
        deltas.add(EdgeKey::new("a", "c"), -0.5);
        assert_eq!(
            store.merge_batch(&commit_for(deltas, 2)).unwrap(),
            MergeOutcome::Applied
        );

        let edges = store.outgoing_edges(&TrackId::from("a")).unwrap();
        assert_eq!(edges[&TrackId::from("b")], 3.0);
        assert_eq!(edges[&TrackId::from("c")], -0.5);
    }

    #[test]
    fn zero_net_deltas_do_not_materialize_phantom_edges() {
        let store = SqliteStore::open_in_memory().unwrap();

        // Crossings of a -> b cancel out within the batch; a -> c does not
        let mut deltas = DeltaMap::new();
        deltas.add(EdgeKey::new("a", "b"), 1.0);
        deltas.add(EdgeKey::new("a", "b"), -1.0);
        deltas.add(EdgeKey::new("a", "c"), 1.0);
        store.merge_batch(&commit_for(deltas, 1)).unwrap();

        let edges = store.outgoing_edges(&TrackId::from("a")).unwrap();
        assert!(!edges.contains_key(&TrackId::from("b")));
        assert_eq!(edges[&TrackId::from("c")], 1.0);
        assert!(store
            .top_neighbors(&TrackId::from("a"), 10)
            .unwrap()
            .iter()
            .all(|e| e.to.as_str() != "b"));

        // An edge that already exists still receives later non-zero deltas
        let mut deltas = DeltaMap::new();
        deltas.add(EdgeKey::new("a", "c"), 0.0);
        deltas.add(EdgeKey::new("a", "c"), -0.5);
        store.merge_batch(&commit_for(deltas, 2)).unwrap();
        let edges = store.outgoing_edges(&TrackId::from("a")).unwrap();
        assert_eq!(edges[&TrackId::from("c")], 0.5);
    }

    #[test]
    fn replayed_batch_is_rejected_without_double_counting() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut deltas = DeltaMap::new();
        deltas.add(EdgeKey::new("a", "b"), 1.0);
        let commit = commit_for(deltas, 5);

        assert_eq!(store.merge_batch(&commit).unwrap(), MergeOutcome::Applied);
        assert_eq!(
            store.merge_batch(&commit).unwrap(),
            MergeOutcome::AlreadyApplied
        );

        let edges = store.outgoing_edges(&TrackId::from("a")).unwrap();
        assert_eq!(edges[&TrackId::from("b")], 1.0);
        assert_eq!(store.checkpoint().unwrap().last_sequence, 5);
    }

    #[test]
    fn rejected_batch_writes_no_session_state() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut first = commit_for(DeltaMap::new(), 3);
        first.session_states.insert(
            "sess-1".to_string(),
            SessionState {
                prev_track: Some(TrackId::from("a")),
                skipped_prev: false,
                last_seen: Some(Utc::now()),
            },
        );
        assert_eq!(store.merge_batch(&first).unwrap(), MergeOutcome::Applied);

        // Same checkpoint again, with a different session: must write nothing
        let mut replay = commit_for(DeltaMap::new(), 3);
        replay.session_states.insert(
            "sess-2".to_string(),
            SessionState::new(),
        );
        assert_eq!(
            store.merge_batch(&replay).unwrap(),
            MergeOutcome::AlreadyApplied
        );

        let states = store
            .session_states(&["sess-1".to_string(), "sess-2".to_string()])
            .unwrap();
        assert!(states.contains_key("sess-1"));
        assert!(!states.contains_key("sess-2"));
        assert_eq!(states["sess-1"].prev_track, Some(TrackId::from("a")));
    }

    #[test]
    fn top_neighbors_orders_by_weight_and_limits() {
        let store = SqliteStore::open_in_memory().unwrap();

        let mut deltas = DeltaMap::new();
        deltas.add(EdgeKey::new("a", "b"), 4.0);
        deltas.add(EdgeKey::new("a", "c"), 1.0);
        deltas.add(EdgeKey::new("a", "d"), 2.5);
        store.merge_batch(&commit_for(deltas, 1)).unwrap();

        let top = store.top_neighbors(&TrackId::from("a"), 2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].to.as_str(), "b");
        assert_eq!(top[0].weight, 4.0);
        assert_eq!(top[1].to.as_str(), "d");
    }

    #[test]
    fn stale_sessions_are_evicted_in_the_commit() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();

        let mut first = commit_for(DeltaMap::new(), 1);
        first.session_states.insert(
            "stale".to_string(),
            SessionState {
                prev_track: None,
                skipped_prev: false,
                last_seen: Some(now - Duration::hours(48)),
            },
        );
        store.merge_batch(&first).unwrap();

        let mut second = commit_for(DeltaMap::new(), 2);
        second.session_states.insert(
            "fresh".to_string(),
            SessionState {
                prev_track: None,
                skipped_prev: false,
                last_seen: Some(now),
            },
        );
        second.evict_sessions_before = Some(now - Duration::hours(24));
        store.merge_batch(&second).unwrap();

        let states = store
            .session_states(&["stale".to_string(), "fresh".to_string()])
            .unwrap();
        assert!(!states.contains_key("stale"));
        assert!(states.contains_key("fresh"));
    }

    #[test]
    fn missing_edges_read_as_empty_map() {
        let store = SqliteStore::open_in_memory().unwrap();
        let edges = store.outgoing_edges(&TrackId::from("nowhere")).unwrap();
        assert!(edges.is_empty());
    }
}
