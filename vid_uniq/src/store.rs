//! Optional SQLite tracking store for sessions and their variants.
//!
//! Every operation opens its own short-lived connection; nothing holds a
//! lock between calls. Rows are written once and never updated.

use crate::errors::Result;
use crate::intensity::IntensityTier;
use crate::params::TransformationParameters;
use crate::scoring::SAFE_THRESHOLD;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DB_ENV: &str = "VID_UNIQ_DB";
pub const DEFAULT_DB_FILE: &str = "vid_uniq.db";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    mode TEXT NOT NULL,
    source TEXT,
    intensity TEXT NOT NULL DEFAULT 'medium',
    folder_name TEXT,
    num_variations INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS variations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    output_path TEXT,
    uniqueness_score REAL,
    parameters_json TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_variations_session ON variations(session_id);
";

/// Score buckets reported by [`TrackingStore::analytics`], highest first.
pub const SCORE_BUCKETS: [&str; 5] = ["80-100", "60-79", "40-59", "20-39", "0-19"];

#[derive(Debug, Clone)]
pub struct NewSession<'a> {
    pub mode: &'a str,
    pub source: &'a str,
    pub intensity: IntensityTier,
    pub folder_name: &'a str,
    pub num_variations: usize,
}

#[derive(Debug, Clone)]
pub struct NewVariation<'a> {
    pub name: &'a str,
    pub output_path: &'a Path,
    pub uniqueness_score: Option<u8>,
    pub parameters: &'a TransformationParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub id: i64,
    pub created_at: String,
    pub mode: String,
    pub source: Option<String>,
    pub intensity: String,
    pub folder_name: Option<String>,
    pub num_variations: i64,
}

impl SessionRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            created_at: row.get("created_at")?,
            mode: row.get("mode")?,
            source: row.get("source")?,
            intensity: row.get("intensity")?,
            folder_name: row.get("folder_name")?,
            num_variations: row.get("num_variations")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationRecord {
    pub id: i64,
    pub session_id: i64,
    pub name: String,
    pub output_path: Option<String>,
    pub uniqueness_score: Option<f64>,
    pub parameters_json: Option<String>,
    pub created_at: String,
}

impl VariationRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            name: row.get("name")?,
            output_path: row.get("output_path")?,
            uniqueness_score: row.get("uniqueness_score")?,
            parameters_json: row.get("parameters_json")?,
            created_at: row.get("created_at")?,
        })
    }

    pub fn parameters(&self) -> Option<serde_json::Result<TransformationParameters>> {
        self.parameters_json
            .as_deref()
            .map(TransformationParameters::from_json)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analytics {
    pub total_sessions: u64,
    pub total_variations: u64,
    /// Mean score, one decimal place; 0 when nothing is scored yet
    pub avg_uniqueness: f64,
    pub safe_count: u64,
    pub sessions_by_mode: BTreeMap<String, u64>,
    pub score_distribution: BTreeMap<String, u64>,
}

#[derive(Debug, Clone)]
pub struct TrackingStore {
    path: PathBuf,
}

impl TrackingStore {
    /// Open (creating if needed) the store at `path` and ensure the schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { path };
        let conn = store.connect()?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %store.path.display(), "Tracking store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            ",
        )?;
        Ok(conn)
    }

    pub fn save_session(&self, session: &NewSession<'_>) -> Result<i64> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO sessions (mode, source, intensity, folder_name, num_variations)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.mode,
                session.source,
                session.intensity.as_str(),
                session.folder_name,
                session.num_variations as i64,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(session_id = id, mode = session.mode, "Session recorded");
        Ok(id)
    }

    pub fn save_variation(&self, session_id: i64, variation: &NewVariation<'_>) -> Result<i64> {
        let parameters_json = variation.parameters.to_json()?;
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO variations (session_id, name, output_path, uniqueness_score, parameters_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                variation.name,
                variation.output_path.to_string_lossy().into_owned(),
                variation.uniqueness_score.map(f64::from),
                parameters_json,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first, optionally restricted to one mode.
    pub fn recent_sessions(&self, limit: usize, mode: Option<&str>) -> Result<Vec<SessionRecord>> {
        let conn = self.connect()?;
        let limit = limit as i64;
        let rows = match mode {
            Some(mode) => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM sessions WHERE mode = ?1
                     ORDER BY created_at DESC, id DESC LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![mode, limit], SessionRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT * FROM sessions ORDER BY created_at DESC, id DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], SessionRecord::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn session(&self, id: i64) -> Result<Option<SessionRecord>> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                "SELECT * FROM sessions WHERE id = ?1",
                params![id],
                SessionRecord::from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn session_variations(&self, session_id: i64) -> Result<Vec<VariationRecord>> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT * FROM variations WHERE session_id = ?1 ORDER BY name")?;
        let rows = stmt
            .query_map(params![session_id], VariationRecord::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn analytics(&self) -> Result<Analytics> {
        let conn = self.connect()?;

        let count = |sql: &str| -> rusqlite::Result<u64> {
            conn.query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n.max(0) as u64)
        };

        let total_sessions = count("SELECT COUNT(*) FROM sessions")?;
        let total_variations = count("SELECT COUNT(*) FROM variations")?;
        let safe_sql = format!(
            "SELECT COUNT(*) FROM variations WHERE uniqueness_score >= {}",
            SAFE_THRESHOLD
        );
        let safe_count = count(safe_sql.as_str())?;

        let avg: Option<f64> = conn.query_row(
            "SELECT AVG(uniqueness_score) FROM variations WHERE uniqueness_score IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        let avg_uniqueness = avg.map(|a| (a * 10.0).round() / 10.0).unwrap_or(0.0);

        let mut sessions_by_mode = BTreeMap::new();
        let mut stmt = conn.prepare("SELECT mode, COUNT(*) FROM sessions GROUP BY mode")?;
        let modes = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for entry in modes {
            let (mode, n) = entry?;
            sessions_by_mode.insert(mode, n.max(0) as u64);
        }

        let mut score_distribution = BTreeMap::new();
        let mut stmt = conn.prepare(
            "SELECT CASE
                 WHEN uniqueness_score >= 80 THEN '80-100'
                 WHEN uniqueness_score >= 60 THEN '60-79'
                 WHEN uniqueness_score >= 40 THEN '40-59'
                 WHEN uniqueness_score >= 20 THEN '20-39'
                 ELSE '0-19'
             END AS bucket, COUNT(*)
             FROM variations WHERE uniqueness_score IS NOT NULL
             GROUP BY bucket",
        )?;
        let buckets =
            stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for entry in buckets {
            let (bucket, n) = entry?;
            score_distribution.insert(bucket, n.max(0) as u64);
        }

        Ok(Analytics {
            total_sessions,
            total_variations,
            avg_uniqueness,
            safe_count,
            sessions_by_mode,
            score_distribution,
        })
    }
}
