//! SQLite storage backend
//!
//! One database file holds both collaborators the engine needs:
//! - `signals`: every ingested signal with its cached embedding. Doubles as
//!   the signal-history vector index (brute-force cosine search).
//! - `clusters` / `cluster_members`: the persistent cluster population.
//!   Members keep their own embedding copy so a cluster round-trips
//!   losslessly even if the history row is later re-embedded.
//! - `cluster_aliases`: merged-away cluster ids and their survivors.

use super::point_id::point_id;
use super::traits::{
    ClusterRepository, OpenStore, ScoredSignal, ScrollPage, StorageError, StorageResult,
    VectorIndex,
};
use crate::signal::{timestamp, Cluster, ClusterAlias, ClusterId, EmbeddedSignal, Signal, SignalId};
use crate::vector;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Columns selected whenever a full signal row is read
const SIGNAL_COLUMNS: &str =
    "s.signal_id, s.text, s.timestamp, s.source, s.domain, s.subdomain, s.metadata_json";

/// Raw signal columns before JSON/date decoding
type SignalRow = (String, String, String, String, String, String, String);

/// SQLite-backed cluster repository and signal index
///
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn from_connection(conn: Connection) -> StorageResult<Self> {
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            -- Signal history (payload + cached embedding)
            CREATE TABLE IF NOT EXISTS signals (
                signal_id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                source TEXT NOT NULL,
                domain TEXT NOT NULL,
                subdomain TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                embedding_json TEXT NOT NULL
            );

            -- Cluster population, keyed by integer point id
            CREATE TABLE IF NOT EXISTS clusters (
                point_id INTEGER PRIMARY KEY,
                cluster_id TEXT NOT NULL UNIQUE,
                position INTEGER NOT NULL,
                centroid_json TEXT,
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            -- Ordered membership; a signal belongs to at most one cluster
            CREATE TABLE IF NOT EXISTS cluster_members (
                cluster_id TEXT NOT NULL,
                signal_id TEXT NOT NULL UNIQUE,
                ordinal INTEGER NOT NULL,
                embedding_json TEXT NOT NULL,
                PRIMARY KEY (cluster_id, signal_id),
                FOREIGN KEY (cluster_id) REFERENCES clusters(cluster_id) ON DELETE CASCADE,
                FOREIGN KEY (signal_id) REFERENCES signals(signal_id)
            );

            CREATE INDEX IF NOT EXISTS idx_members_cluster
                ON cluster_members(cluster_id, ordinal);

            CREATE TABLE IF NOT EXISTS cluster_aliases (
                alias_id TEXT PRIMARY KEY,
                survivor_id TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_aliases_survivor
                ON cluster_aliases(survivor_id);

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Self::migrate_add_scores(conn)?;
        Ok(())
    }

    /// Migration: add the score cache column to databases created before it
    ///
    /// SQLite doesn't support ALTER TABLE ADD COLUMN IF NOT EXISTS,
    /// so we check with the table_info pragma first.
    fn migrate_add_scores(conn: &Connection) -> StorageResult<()> {
        let has_scores: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM pragma_table_info('clusters') WHERE name = 'scores_json'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !has_scores {
            conn.execute("ALTER TABLE clusters ADD COLUMN scores_json TEXT", [])?;
        }
        Ok(())
    }

    fn read_signal_row(row: &Row<'_>) -> rusqlite::Result<SignalRow> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
        ))
    }

    fn row_to_signal(row: SignalRow) -> StorageResult<Signal> {
        let (signal_id, text, ts, source, domain, subdomain, metadata_json) = row;
        Ok(Signal {
            signal_id: SignalId::from_string(signal_id),
            text,
            timestamp: parse_date(&ts)?,
            source,
            domain,
            subdomain,
            metadata: serde_json::from_str(&metadata_json)?,
        })
    }

    fn upsert_signal(
        conn: &Connection,
        signal: &Signal,
        embedding: &[f32],
    ) -> StorageResult<()> {
        conn.execute(
            "INSERT INTO signals \
                 (signal_id, text, timestamp, source, domain, subdomain, metadata_json, embedding_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(signal_id) DO UPDATE SET \
                 text = excluded.text, \
                 timestamp = excluded.timestamp, \
                 source = excluded.source, \
                 domain = excluded.domain, \
                 subdomain = excluded.subdomain, \
                 metadata_json = excluded.metadata_json, \
                 embedding_json = excluded.embedding_json",
            params![
                signal.signal_id.as_str(),
                signal.text,
                signal.timestamp.to_rfc3339(),
                signal.source,
                signal.domain,
                signal.subdomain,
                serde_json::to_string(&signal.metadata)?,
                serde_json::to_string(embedding)?,
            ],
        )?;
        Ok(())
    }

    fn insert_cluster(tx: &Transaction<'_>, position: usize, cluster: &Cluster) -> StorageResult<()> {
        let centroid_json = cluster.centroid().map(serde_json::to_string).transpose()?;
        let scores_json = cluster.scores().map(serde_json::to_string).transpose()?;
        tx.execute(
            "INSERT INTO clusters \
                 (point_id, cluster_id, position, centroid_json, created_at, last_updated, scores_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                point_id(cluster.id()),
                cluster.id().as_str(),
                position as i64,
                centroid_json,
                cluster.created_at().to_rfc3339(),
                cluster.last_updated().to_rfc3339(),
                scores_json,
            ],
        )?;

        let mut insert_member = tx.prepare_cached(
            "INSERT INTO cluster_members (cluster_id, signal_id, ordinal, embedding_json) \
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (ordinal, (signal, embedding)) in cluster.signals().iter().zip(cluster.embeddings()).enumerate() {
            Self::upsert_signal(tx, signal, embedding)?;
            insert_member.execute(params![
                cluster.id().as_str(),
                signal.signal_id.as_str(),
                ordinal as i64,
                serde_json::to_string(embedding)?,
            ])?;
        }
        Ok(())
    }

    fn load_members(
        conn: &Connection,
        cluster_id: &str,
    ) -> StorageResult<(Vec<Signal>, Vec<Vec<f32>>)> {
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SIGNAL_COLUMNS}, m.embedding_json \
             FROM cluster_members m JOIN signals s ON s.signal_id = m.signal_id \
             WHERE m.cluster_id = ?1 ORDER BY m.ordinal"
        ))?;
        let rows = stmt
            .query_map(params![cluster_id], |row| {
                Ok((Self::read_signal_row(row)?, row.get::<_, String>(7)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut signals = Vec::with_capacity(rows.len());
        let mut embeddings = Vec::with_capacity(rows.len());
        for (signal_row, embedding_json) in rows {
            signals.push(Self::row_to_signal(signal_row)?);
            embeddings.push(serde_json::from_str(&embedding_json)?);
        }
        Ok((signals, embeddings))
    }

    /// Number of signals in the history index
    pub fn signal_count(&self) -> StorageResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM signals", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn parse_date(s: &str) -> StorageResult<DateTime<Utc>> {
    timestamp::parse(s).ok_or_else(|| StorageError::DateParse(s.to_string()))
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }
}

impl ClusterRepository for SqliteStore {
    fn load(&self) -> StorageResult<Vec<Cluster>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT cluster_id, centroid_json, created_at, last_updated, scores_json \
             FROM clusters ORDER BY position",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut clusters = Vec::with_capacity(rows.len());
        for (cluster_id, centroid_json, created_at, last_updated, scores_json) in rows {
            let (signals, embeddings) = Self::load_members(&conn, &cluster_id)?;
            let centroid = centroid_json
                .as_deref()
                .map(serde_json::from_str::<Vec<f32>>)
                .transpose()?;
            let mut cluster = Cluster::from_parts(
                ClusterId::from_string(cluster_id.clone()),
                signals,
                embeddings,
                centroid,
                parse_date(&created_at)?,
                parse_date(&last_updated)?,
            )
            .map_err(|source| StorageError::InvalidCluster { cluster_id, source })?;
            if let Some(json) = scores_json {
                cluster.set_scores(serde_json::from_str(&json)?);
            }
            clusters.push(cluster);
        }

        debug!(clusters = clusters.len(), "loaded cluster population");
        Ok(clusters)
    }

    fn save(&self, clusters: &[Cluster]) -> StorageResult<()> {
        let mut seen: HashMap<i64, &ClusterId> = HashMap::with_capacity(clusters.len());
        for cluster in clusters {
            let pid = point_id(cluster.id());
            if let Some(first) = seen.insert(pid, cluster.id()) {
                if first != cluster.id() {
                    return Err(StorageError::PointIdCollision {
                        point_id: pid,
                        first: first.clone(),
                        second: cluster.id().clone(),
                    });
                }
            }
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cluster_members", [])?;
        tx.execute("DELETE FROM clusters", [])?;
        for (position, cluster) in clusters.iter().enumerate() {
            Self::insert_cluster(&tx, position, cluster)?;
        }
        tx.commit()?;

        debug!(clusters = clusters.len(), "saved cluster population");
        Ok(())
    }

    fn record_aliases(&self, aliases: &[ClusterAlias]) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for alias in aliases {
            tx.execute(
                "UPDATE cluster_aliases SET survivor_id = ?1 WHERE survivor_id = ?2",
                params![alias.survivor.as_str(), alias.alias.as_str()],
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO cluster_aliases (alias_id, survivor_id, recorded_at) \
                 VALUES (?1, ?2, ?3)",
                params![
                    alias.alias.as_str(),
                    alias.survivor.as_str(),
                    alias.recorded_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn resolve_alias(&self, id: &ClusterId) -> StorageResult<Option<ClusterId>> {
        let conn = self.lock()?;
        let survivor: Option<String> = conn
            .query_row(
                "SELECT survivor_id FROM cluster_aliases WHERE alias_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(survivor.map(ClusterId::from_string))
    }
}

impl VectorIndex for SqliteStore {
    fn upsert(&self, _id: &SignalId, vector: &[f32], payload: &Signal) -> StorageResult<()> {
        let conn = self.lock()?;
        Self::upsert_signal(&conn, payload, vector)
    }

    fn upsert_batch(&self, items: &[EmbeddedSignal]) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for item in items {
            Self::upsert_signal(&tx, &item.signal, &item.embedding)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn query_nearest(&self, query: &[f32], top_k: usize) -> StorageResult<Vec<ScoredSignal>> {
        if vector::is_degenerate(query) {
            return Err(vector::VectorError::DegenerateVector.into());
        }
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SIGNAL_COLUMNS}, s.embedding_json FROM signals s"
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((Self::read_signal_row(row)?, row.get::<_, String>(7)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut scored: Vec<(SignalRow, f32)> = Vec::with_capacity(rows.len());
        for (signal_row, embedding_json) in rows {
            let embedding: Vec<f32> = serde_json::from_str(&embedding_json)?;
            if let Ok(similarity) = vector::cosine_similarity(query, &embedding) {
                scored.push((signal_row, similarity));
            }
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(row, similarity)| {
                Ok(ScoredSignal {
                    signal: Self::row_to_signal(row)?,
                    similarity,
                })
            })
            .collect()
    }

    fn scroll(&self, offset: Option<u64>, limit: usize) -> StorageResult<ScrollPage> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SIGNAL_COLUMNS}, s.embedding_json, s.rowid FROM signals s \
             WHERE s.rowid > ?1 ORDER BY s.rowid LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![offset.unwrap_or(0) as i64, limit as i64], |row| {
                Ok((
                    Self::read_signal_row(row)?,
                    row.get::<_, String>(7)?,
                    row.get::<_, i64>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let full_page = rows.len() == limit;
        let mut last_rowid = None;
        let mut points = Vec::with_capacity(rows.len());
        for (signal_row, embedding_json, rowid) in rows {
            points.push(EmbeddedSignal::new(
                Self::row_to_signal(signal_row)?,
                serde_json::from_str(&embedding_json)?,
            ));
            last_rowid = Some(rowid as u64);
        }

        Ok(ScrollPage {
            points,
            next_offset: if full_page { last_rowid } else { None },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::{EmergenceLevel, ScoreAttachment};
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 10, 0, 0).unwrap()
    }

    fn sig(id: &str, source: &str) -> Signal {
        Signal::new(id, format!("text {id}"), at(20), source)
            .with_domain("emerging_technology", "ai")
            .with_metadata("link", serde_json::json!(format!("https://example.org/{id}")))
    }

    fn sample_population() -> Vec<Cluster> {
        let a = Cluster::promote(
            vec![
                (sig("a1", "arxiv"), vec![0.9, 0.3, 0.1]),
                (sig("a2", "hn"), vec![0.85, 0.35, 0.15]),
            ],
            at(20),
        )
        .unwrap();
        let mut b = Cluster::promote(vec![(sig("b1", "arxiv"), vec![0.1, 0.2, 0.95])], at(21)).unwrap();
        b.set_scores(ScoreAttachment::from_growth(EmergenceLevel::Rapid, 1.0));
        vec![a, b]
    }

    #[test]
    fn population_round_trips_losslessly() {
        let store = SqliteStore::open_in_memory().unwrap();
        let population = sample_population();
        store.save(&population).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, population);
    }

    #[test]
    fn save_replaces_previous_population() {
        let store = SqliteStore::open_in_memory().unwrap();
        let population = sample_population();
        store.save(&population).unwrap();
        store.save(&population[..1]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id(), population[0].id());
        // History keeps every signal ever saved
        assert_eq!(store.signal_count().unwrap(), 3);
    }

    #[test]
    fn missing_centroid_round_trips_as_missing() {
        let store = SqliteStore::open_in_memory().unwrap();
        let cluster = Cluster::from_parts(
            ClusterId::from("no-centroid"),
            vec![sig("x", "rss")],
            vec![vec![1.0, 0.0, 0.0]],
            None,
            at(20),
            at(20),
        )
        .unwrap();
        store.save(&[cluster]).unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded[0].centroid().is_none());
    }

    #[test]
    fn empty_store_loads_empty_population() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn aliases_stay_one_hop() {
        let store = SqliteStore::open_in_memory().unwrap();
        let (a, b, c) = (ClusterId::from("a"), ClusterId::from("b"), ClusterId::from("c"));

        store
            .record_aliases(&[ClusterAlias {
                alias: a.clone(),
                survivor: b.clone(),
                recorded_at: at(20),
            }])
            .unwrap();
        store
            .record_aliases(&[ClusterAlias {
                alias: b.clone(),
                survivor: c.clone(),
                recorded_at: at(21),
            }])
            .unwrap();

        assert_eq!(store.resolve_alias(&a).unwrap(), Some(c.clone()));
        assert_eq!(store.resolve_alias(&b).unwrap(), Some(c.clone()));
        assert_eq!(store.resolve_alias(&c).unwrap(), None);
    }

    #[test]
    fn index_query_and_scroll() {
        let store = SqliteStore::open_in_memory().unwrap();
        let points = vec![
            EmbeddedSignal::new(sig("travel", "rss"), vec![0.9, 0.3, 0.1]),
            EmbeddedSignal::new(sig("democracy", "rss"), vec![0.1, 0.2, 0.95]),
            EmbeddedSignal::new(sig("journey", "rss"), vec![0.85, 0.35, 0.15]),
        ];
        store.upsert_batch(&points).unwrap();

        let hits = store.query_nearest(&[0.9, 0.3, 0.1], 2).unwrap();
        assert_eq!(hits[0].signal.signal_id.as_str(), "travel");
        assert_eq!(hits[1].signal.signal_id.as_str(), "journey");

        let first = store.scroll(None, 2).unwrap();
        assert_eq!(first.points.len(), 2);
        assert!(first.next_offset.is_some());
        assert_eq!(store.scroll_all(2).unwrap(), points);
    }

    #[test]
    fn reopening_a_file_store_keeps_population() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trendline.db");
        let population = sample_population();
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save(&population).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load().unwrap(), population);
    }
}
