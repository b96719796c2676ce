//! Proposal Persistence Layer
//!
//! SQLite storage for proposals and their vote ledgers. Proposals live in one
//! row each; the ledger lives in `votes`, keyed by `(proposal_id, voter_id)`
//! so the database itself refuses a second vote from the same wallet.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use super::proposal_store::{ProposalFilter, ProposalStore};
use super::{
    GovernanceError, Proposal, ProposalCategory, ProposalMetadata, ProposalStatus, VoteChoice,
    VoteRecord,
};

const PROPOSAL_COLUMNS: &str = "id, author, title, description, category, votes_for,
     votes_against, created_at, deadline, status, required_votes, passing_threshold, revision";

/// SQLite-backed proposal store
pub struct SqliteProposalStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteProposalStore {
    /// Create or open the proposal database at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, GovernanceError> {
        let conn = Connection::open(db_path.as_ref())
            .map_err(|e| GovernanceError::Storage(format!("Failed to open database: {}", e)))?;

        Self::create_tables(&conn)?;

        info!("Opened proposal database: {:?}", db_path.as_ref());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (useful for testing)
    pub fn in_memory() -> Result<Self, GovernanceError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            GovernanceError::Storage(format!("Failed to open in-memory database: {}", e))
        })?;

        Self::create_tables(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn create_tables(conn: &Connection) -> Result<(), GovernanceError> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

             CREATE TABLE IF NOT EXISTS proposals (
                id TEXT PRIMARY KEY,
                author TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                votes_for INTEGER NOT NULL DEFAULT 0,
                votes_against INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                deadline INTEGER NOT NULL,
                status TEXT NOT NULL,
                required_votes INTEGER NOT NULL,
                passing_threshold REAL NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0
             );

             CREATE INDEX IF NOT EXISTS idx_proposals_status_deadline
                ON proposals(status, deadline);

             CREATE TABLE IF NOT EXISTS votes (
                proposal_id TEXT NOT NULL,
                voter_id TEXT NOT NULL,
                choice TEXT NOT NULL,
                weight INTEGER NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (proposal_id, voter_id),
                FOREIGN KEY (proposal_id) REFERENCES proposals(id) ON DELETE CASCADE
             );",
        )
        .map_err(|e| GovernanceError::Storage(format!("Failed to create tables: {}", e)))
    }

    fn load_votes(conn: &Connection, proposal_id: &str) -> Result<Vec<VoteRecord>, GovernanceError> {
        let mut stmt = conn
            .prepare(
                "SELECT voter_id, choice, weight, timestamp
                 FROM votes WHERE proposal_id = ?1
                 ORDER BY timestamp, rowid",
            )
            .map_err(|e| GovernanceError::Storage(format!("Failed to prepare statement: {}", e)))?;

        let rows = stmt
            .query_map(params![proposal_id], |row| {
                let voter_id: String = row.get(0)?;
                let choice: String = row.get(1)?;
                let weight: i64 = row.get(2)?;
                let timestamp: i64 = row.get(3)?;
                Ok((voter_id, choice, weight, timestamp))
            })
            .map_err(|e| GovernanceError::Storage(format!("Failed to query votes: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GovernanceError::Storage(format!("Failed to read votes: {}", e)))?;

        rows.into_iter()
            .map(|(voter_id, choice, weight, timestamp)| {
                Ok(VoteRecord {
                    voter_id,
                    choice: choice.parse::<VoteChoice>().map_err(corrupt_row)?,
                    weight: weight as u64,
                    timestamp,
                })
            })
            .collect()
    }

    /// Turn proposal rows into full proposals, attaching each ledger
    fn hydrate(
        conn: &Connection,
        rows: Vec<ProposalRow>,
    ) -> Result<Vec<Proposal>, GovernanceError> {
        rows.into_iter()
            .map(|row| {
                let votes = Self::load_votes(conn, &row.id)?;
                row.into_proposal(votes)
            })
            .collect()
    }

    fn query_proposals(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Proposal>, GovernanceError> {
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| GovernanceError::Storage(format!("Failed to prepare statement: {}", e)))?;

        let rows = stmt
            .query_map(params, ProposalRow::from_row)
            .map_err(|e| GovernanceError::Storage(format!("Failed to query proposals: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GovernanceError::Storage(format!("Failed to read proposals: {}", e)))?;

        Self::hydrate(conn, rows)
    }
}

#[async_trait]
impl ProposalStore for SqliteProposalStore {
    async fn insert(&self, proposal: &Proposal) -> Result<(), GovernanceError> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| GovernanceError::Storage(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO proposals (id, author, title, description, category, votes_for,
                votes_against, created_at, deadline, status, required_votes, passing_threshold,
                revision)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                proposal.id,
                proposal.author,
                proposal.title,
                proposal.description,
                proposal.category.as_str(),
                proposal.votes_for as i64,
                proposal.votes_against as i64,
                proposal.created_at,
                proposal.deadline,
                proposal.status.as_str(),
                proposal.metadata.required_votes as i64,
                proposal.metadata.passing_threshold,
                proposal.revision as i64,
            ],
        )
        .map_err(|e| GovernanceError::Storage(format!("Failed to insert proposal: {}", e)))?;

        insert_votes(&tx, proposal)?;

        tx.commit()
            .map_err(|e| GovernanceError::Storage(format!("Failed to commit proposal: {}", e)))
    }

    async fn get(&self, id: &str) -> Result<Option<Proposal>, GovernanceError> {
        let conn = self.conn.lock().await;

        let row = conn
            .query_row(
                &format!("SELECT {} FROM proposals WHERE id = ?1", PROPOSAL_COLUMNS),
                params![id],
                ProposalRow::from_row,
            )
            .optional()
            .map_err(|e| GovernanceError::Storage(format!("Failed to load proposal: {}", e)))?;

        match row {
            Some(row) => {
                let votes = Self::load_votes(&conn, &row.id)?;
                Ok(Some(row.into_proposal(votes)?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, proposal: &Proposal) -> Result<bool, GovernanceError> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| GovernanceError::Storage(format!("Failed to begin transaction: {}", e)))?;

        let rows = tx
            .execute(
                "UPDATE proposals SET
                    title = ?1,
                    description = ?2,
                    category = ?3,
                    votes_for = ?4,
                    votes_against = ?5,
                    deadline = ?6,
                    status = ?7,
                    required_votes = ?8,
                    passing_threshold = ?9,
                    revision = revision + 1
                 WHERE id = ?10 AND revision = ?11",
                params![
                    proposal.title,
                    proposal.description,
                    proposal.category.as_str(),
                    proposal.votes_for as i64,
                    proposal.votes_against as i64,
                    proposal.deadline,
                    proposal.status.as_str(),
                    proposal.metadata.required_votes as i64,
                    proposal.metadata.passing_threshold,
                    proposal.id,
                    proposal.revision as i64,
                ],
            )
            .map_err(|e| GovernanceError::Storage(format!("Failed to update proposal: {}", e)))?;

        if rows == 0 {
            // Dropping the transaction rolls it back
            return Ok(false);
        }

        insert_votes(&tx, proposal)?;

        tx.commit()
            .map_err(|e| GovernanceError::Storage(format!("Failed to commit update: {}", e)))?;

        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool, GovernanceError> {
        let conn = self.conn.lock().await;

        // Ledger rows go with the proposal through ON DELETE CASCADE
        let rows_affected = conn
            .execute("DELETE FROM proposals WHERE id = ?1", params![id])
            .map_err(|e| GovernanceError::Storage(format!("Failed to delete proposal: {}", e)))?;

        Ok(rows_affected > 0)
    }

    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, GovernanceError> {
        let conn = self.conn.lock().await;

        let sql = format!(
            "SELECT {} FROM proposals
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR category = ?2)
               AND (?3 IS NULL OR author = ?3)
             ORDER BY created_at DESC, id ASC
             LIMIT ?4",
            PROPOSAL_COLUMNS
        );

        Self::query_proposals(
            &conn,
            &sql,
            params![
                filter.status.map(|s| s.as_str()),
                filter.category.map(|c| c.as_str()),
                filter.author.as_deref(),
                filter.effective_limit() as i64,
            ],
        )
    }

    async fn list_due(&self, now: i64) -> Result<Vec<Proposal>, GovernanceError> {
        let conn = self.conn.lock().await;

        let sql = format!(
            "SELECT {} FROM proposals
             WHERE status IN ('active', 'pending') AND deadline < ?1
             ORDER BY deadline ASC, id ASC",
            PROPOSAL_COLUMNS
        );

        Self::query_proposals(&conn, &sql, params![now])
    }

    async fn status_counts(&self) -> Result<HashMap<ProposalStatus, usize>, GovernanceError> {
        let conn = self.conn.lock().await;

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM proposals GROUP BY status")
            .map_err(|e| GovernanceError::Storage(format!("Failed to prepare statement: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })
            .map_err(|e| GovernanceError::Storage(format!("Failed to count proposals: {}", e)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GovernanceError::Storage(format!("Failed to count proposals: {}", e)))?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            let status = status.parse::<ProposalStatus>().map_err(corrupt_row)?;
            counts.insert(status, count as usize);
        }
        Ok(counts)
    }
}

/// Append ledger entries not yet stored. The ledger is append-only, so
/// existing `(proposal_id, voter_id)` rows are left as they are.
fn insert_votes(conn: &Connection, proposal: &Proposal) -> Result<(), GovernanceError> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT OR IGNORE INTO votes (proposal_id, voter_id, choice, weight, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .map_err(|e| GovernanceError::Storage(format!("Failed to prepare statement: {}", e)))?;

    for vote in &proposal.votes {
        stmt.execute(params![
            proposal.id,
            vote.voter_id,
            vote.choice.as_str(),
            vote.weight as i64,
            vote.timestamp,
        ])
        .map_err(|e| GovernanceError::Storage(format!("Failed to save vote: {}", e)))?;
    }

    Ok(())
}

fn corrupt_row(e: GovernanceError) -> GovernanceError {
    GovernanceError::Storage(format!("Corrupt proposal row: {}", e))
}

/// Raw `proposals` row before enum parsing
struct ProposalRow {
    id: String,
    author: String,
    title: String,
    description: String,
    category: String,
    votes_for: i64,
    votes_against: i64,
    created_at: i64,
    deadline: i64,
    status: String,
    required_votes: i64,
    passing_threshold: f64,
    revision: i64,
}

impl ProposalRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            author: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            category: row.get(4)?,
            votes_for: row.get(5)?,
            votes_against: row.get(6)?,
            created_at: row.get(7)?,
            deadline: row.get(8)?,
            status: row.get(9)?,
            required_votes: row.get(10)?,
            passing_threshold: row.get(11)?,
            revision: row.get(12)?,
        })
    }

    fn into_proposal(self, votes: Vec<VoteRecord>) -> Result<Proposal, GovernanceError> {
        Ok(Proposal {
            category: self.category.parse::<ProposalCategory>().map_err(corrupt_row)?,
            status: self.status.parse::<ProposalStatus>().map_err(corrupt_row)?,
            id: self.id,
            author: self.author,
            title: self.title,
            description: self.description,
            votes_for: self.votes_for as u64,
            votes_against: self.votes_against as u64,
            votes,
            created_at: self.created_at,
            deadline: self.deadline,
            metadata: ProposalMetadata {
                required_votes: self.required_votes as u64,
                passing_threshold: self.passing_threshold,
            },
            revision: self.revision as u64,
        })
    }
}
