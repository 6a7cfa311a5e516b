//! SQLite-backed session store.
//!
//! Every write the lifecycle manager performs is a single call here, and
//! every call that writes more than one row runs inside a transaction while
//! holding the connection lock. Readers therefore never see a half-applied
//! status change or a partially inserted summary set.

mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::models::*;

const QUERY_COLUMNS: &str = "id, query, created_at, status, num_papers, provider";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        Self::open(default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        schema::run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("database lock poisoned"))
    }

    // ============================================================
    // Query operations
    // ============================================================

    pub fn create_query(&self, input: CreateQueryInput) -> Result<Query> {
        let conn = self.lock()?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO queries (id, query, created_at, status, num_papers, provider)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                &id,
                &input.query,
                format_datetime(now),
                QueryStatus::Processing.as_str(),
                input.num_papers,
                &input.provider,
            ),
        )?;

        Ok(Query {
            id,
            query: input.query,
            created_at: parse_datetime(format_datetime(now)),
            status: QueryStatus::Processing,
            num_papers: input.num_papers,
            provider: input.provider,
        })
    }

    pub fn get_query(&self, id: &str) -> Result<Option<Query>> {
        let conn = self.lock()?;
        select_query(&conn, id)
    }

    /// All queries, newest first.
    pub fn get_all_queries(&self) -> Result<Vec<Query>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {QUERY_COLUMNS} FROM queries ORDER BY created_at DESC, rowid DESC"
        ))?;

        let queries = stmt
            .query_map([], row_to_query)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(queries)
    }

    /// Move a query to `to` if that is a legal edge from its current status.
    ///
    /// The read of the current status and the write of the new one happen in
    /// one transaction under the connection lock, so two workflows racing on
    /// the same id are serialized and the loser sees [`Transition::Rejected`].
    pub fn transition_query_status(&self, id: &str, to: QueryStatus) -> Result<Transition> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let Some(mut query) = select_query(&tx, id)? else {
            return Ok(Transition::NotFound);
        };

        if !query.status.can_transition_to(to) {
            return Ok(Transition::Rejected(query.status));
        }

        tx.execute(
            "UPDATE queries SET status = ? WHERE id = ?",
            (to.as_str(), id),
        )?;
        tx.commit()?;

        query.status = to;
        Ok(Transition::Applied(query))
    }

    /// Mark every query still in `processing` or `analyzing` as failed.
    ///
    /// Called at startup: no workflow survives a restart, so anything left
    /// in flight can never finish.
    pub fn fail_stale_queries(&self) -> Result<usize> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE queries SET status = ? WHERE status IN (?, ?)",
            (
                QueryStatus::Failed.as_str(),
                QueryStatus::Processing.as_str(),
                QueryStatus::Analyzing.as_str(),
            ),
        )?;
        Ok(rows)
    }

    // ============================================================
    // Summary operations
    // ============================================================

    /// Insert a batch of summaries atomically. Returns the number inserted.
    ///
    /// Fails (inserting nothing) if any summary references an unknown query.
    pub fn add_summaries(&self, summaries: &[Summary]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO summaries (id, query_id, title, authors, file_path, content, position)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;
            for (position, summary) in summaries.iter().enumerate() {
                stmt.execute((
                    &summary.id,
                    &summary.query_id,
                    &summary.title,
                    &summary.authors,
                    &summary.file_path,
                    &summary.content,
                    position as i64,
                ))
                .with_context(|| format!("Failed to insert summary {}", summary.id))?;
            }
        }

        tx.commit()?;
        Ok(summaries.len())
    }

    pub fn get_summaries_by_query(&self, query_id: &str) -> Result<Vec<Summary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, query_id, title, authors, file_path, content
             FROM summaries WHERE query_id = ? ORDER BY position, rowid",
        )?;

        let summaries = stmt
            .query_map([query_id], |row| {
                Ok(Summary {
                    id: row.get(0)?,
                    query_id: row.get(1)?,
                    title: row.get(2)?,
                    authors: row.get(3)?,
                    file_path: row.get(4)?,
                    content: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(summaries)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

/// Default database location in the platform data directory.
pub fn default_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "paperdesk")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("paperdesk.db"))
}

fn select_query(conn: &Connection, id: &str) -> Result<Option<Query>> {
    let query = conn
        .query_row(
            &format!("SELECT {QUERY_COLUMNS} FROM queries WHERE id = ?"),
            [id],
            row_to_query,
        )
        .optional()?;
    Ok(query)
}

fn row_to_query(row: &rusqlite::Row<'_>) -> rusqlite::Result<Query> {
    Ok(Query {
        id: row.get(0)?,
        query: row.get(1)?,
        created_at: parse_datetime(row.get::<_, String>(2)?),
        // Unknown values only appear if the row was edited by hand; treat
        // them as failed so nothing tries to resume them.
        status: QueryStatus::from_str(&row.get::<_, String>(3)?).unwrap_or(QueryStatus::Failed),
        num_papers: row.get(4)?,
        provider: row.get(5)?,
    })
}

fn format_datetime(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
