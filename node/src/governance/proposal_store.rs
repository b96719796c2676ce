//! Proposal Store
//!
//! Storage abstraction for proposal records. Every write that depends on the
//! current record goes through [`ProposalStore::update`], a conditional
//! replace keyed on the record's revision, so the read-check-write done by the
//! tracker is atomic per proposal.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{GovernanceError, Proposal, ProposalCategory, ProposalStatus};

/// Default number of proposals returned by a listing
pub const DEFAULT_LIST_LIMIT: usize = 50;

/// Upper bound on proposals returned by a listing
pub const MAX_LIST_LIMIT: usize = 200;

/// Listing filter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProposalFilter {
    pub status: Option<ProposalStatus>,
    pub category: Option<ProposalCategory>,
    pub author: Option<String>,
    pub limit: Option<usize>,
}

impl ProposalFilter {
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.status.map_or(true, |s| proposal.status == s)
            && self.category.map_or(true, |c| proposal.category == c)
            && self
                .author
                .as_deref()
                .map_or(true, |a| proposal.author == a)
    }

    /// Requested limit clamped to `1..=MAX_LIST_LIMIT`
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

/// Persistent home of proposal records
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Insert a new proposal. Fails if the id is already taken.
    async fn insert(&self, proposal: &Proposal) -> Result<(), GovernanceError>;

    /// Fetch a proposal with its full vote ledger
    async fn get(&self, id: &str) -> Result<Option<Proposal>, GovernanceError>;

    /// Replace the stored proposal if its revision still equals
    /// `proposal.revision`, bumping the stored revision by one.
    ///
    /// Returns `false` when another writer got there first (or the record is
    /// gone); the caller should reload and retry.
    async fn update(&self, proposal: &Proposal) -> Result<bool, GovernanceError>;

    /// Remove a proposal and its ledger. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, GovernanceError>;

    /// Proposals matching `filter`, newest first
    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, GovernanceError>;

    /// Open proposals whose deadline is strictly before `now`, oldest
    /// deadline first
    async fn list_due(&self, now: i64) -> Result<Vec<Proposal>, GovernanceError>;

    /// Number of proposals in each status
    async fn status_counts(&self) -> Result<HashMap<ProposalStatus, usize>, GovernanceError>;
}

/// In-memory proposal store
#[derive(Debug, Default)]
pub struct MemoryProposalStore {
    proposals: Arc<RwLock<HashMap<String, Proposal>>>,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.proposals.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.proposals.read().await.is_empty()
    }
}

fn newest_first(a: &Proposal, b: &Proposal) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.id.cmp(&b.id))
}

#[async_trait]
impl ProposalStore for MemoryProposalStore {
    async fn insert(&self, proposal: &Proposal) -> Result<(), GovernanceError> {
        let mut proposals = self.proposals.write().await;

        if proposals.contains_key(&proposal.id) {
            return Err(GovernanceError::Storage(format!(
                "duplicate proposal id: {}",
                proposal.id
            )));
        }

        proposals.insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Proposal>, GovernanceError> {
        let proposals = self.proposals.read().await;
        Ok(proposals.get(id).cloned())
    }

    async fn update(&self, proposal: &Proposal) -> Result<bool, GovernanceError> {
        let mut proposals = self.proposals.write().await;

        match proposals.get_mut(&proposal.id) {
            Some(stored) if stored.revision == proposal.revision => {
                let mut next = proposal.clone();
                next.revision = proposal.revision + 1;
                *stored = next;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, GovernanceError> {
        let mut proposals = self.proposals.write().await;
        Ok(proposals.remove(id).is_some())
    }

    async fn list(&self, filter: &ProposalFilter) -> Result<Vec<Proposal>, GovernanceError> {
        let proposals = self.proposals.read().await;

        let mut matching: Vec<Proposal> = proposals
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by(newest_first);
        matching.truncate(filter.effective_limit());

        Ok(matching)
    }

    async fn list_due(&self, now: i64) -> Result<Vec<Proposal>, GovernanceError> {
        let proposals = self.proposals.read().await;

        let mut due: Vec<Proposal> = proposals
            .values()
            .filter(|p| p.status.is_open() && p.deadline < now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.deadline.cmp(&b.deadline).then_with(|| a.id.cmp(&b.id)));

        Ok(due)
    }

    async fn status_counts(&self) -> Result<HashMap<ProposalStatus, usize>, GovernanceError> {
        let proposals = self.proposals.read().await;

        let mut counts = HashMap::new();
        for proposal in proposals.values() {
            *counts.entry(proposal.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
