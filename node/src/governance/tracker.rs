//! Proposal Tracker
//!
//! Service that applies the lifecycle and voting rules to stored proposals.
//! Each mutation is a read → pure rule → conditional update loop: when the
//! store reports a revision conflict the record is reloaded and the rule runs
//! again against the fresh copy, so the voter-uniqueness check and the tally
//! increment always commit together.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::clock::Clock;
use super::lifecycle;
use super::proposal_store::{ProposalFilter, ProposalStore};
use super::voting::{self, ConstantWeight, VoteWeightResolver};
use super::{
    generate_proposal_id, GovernanceConfig, GovernanceError, Proposal, ProposalCategory,
    ProposalMetadata, ProposalStatus, VoteChoice, VoteRecord, MAX_DESCRIPTION_LENGTH,
    MAX_TITLE_LENGTH, MAX_WALLET_ID_LENGTH,
};

/// Conditional update attempts before giving up with `Contention`
const MAX_UPDATE_ATTEMPTS: usize = 64;

/// Input for a new proposal
#[derive(Debug, Clone)]
pub struct NewProposal {
    pub author: String,
    pub title: String,
    pub description: String,
    pub category: ProposalCategory,
    /// Overrides the configured default voting period
    pub voting_period_secs: Option<i64>,
}

/// Result of evaluating one proposal
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The proposal as stored after evaluation
    pub proposal: Proposal,
    /// New status, if this call performed the transition
    pub transitioned: Option<ProposalStatus>,
}

/// Result of an accepted vote
#[derive(Debug, Clone, Serialize)]
pub struct VoteReceipt {
    pub proposal_id: String,
    pub vote: VoteRecord,
    pub votes_for: u64,
    pub votes_against: u64,
}

/// Proposal counts by status
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ProposalStats {
    pub total: usize,
    pub pending: usize,
    pub active: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Proposal lifecycle tracker
pub struct ProposalTracker {
    store: Arc<dyn ProposalStore>,
    clock: Arc<dyn Clock>,
    weights: Arc<dyn VoteWeightResolver>,
    config: GovernanceConfig,
}

impl ProposalTracker {
    /// Create a tracker with one-wallet-one-vote weighting
    pub fn new(
        store: Arc<dyn ProposalStore>,
        clock: Arc<dyn Clock>,
        config: GovernanceConfig,
    ) -> Self {
        Self {
            store,
            clock,
            weights: Arc::new(ConstantWeight::default()),
            config,
        }
    }

    /// Replace the vote weight resolver
    pub fn with_weight_resolver(mut self, weights: Arc<dyn VoteWeightResolver>) -> Self {
        self.weights = weights;
        self
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Validate and store a new active proposal
    pub async fn create_proposal(&self, request: NewProposal) -> Result<Proposal, GovernanceError> {
        let author = validate_wallet_id(&request.author, "author")?;
        let title = sanitize_text(&request.title);
        let description = sanitize_text(&request.description);

        let title_len = title.chars().count();
        if title_len == 0 || title_len > MAX_TITLE_LENGTH {
            return Err(GovernanceError::InvalidInput(format!(
                "title must be 1-{} characters",
                MAX_TITLE_LENGTH
            )));
        }

        let description_len = description.chars().count();
        if description_len == 0 || description_len > MAX_DESCRIPTION_LENGTH {
            return Err(GovernanceError::InvalidInput(format!(
                "description must be 1-{} characters",
                MAX_DESCRIPTION_LENGTH
            )));
        }

        let period = request
            .voting_period_secs
            .unwrap_or(self.config.default_voting_period_secs);
        if !self.config.period_in_bounds(period) {
            return Err(GovernanceError::InvalidInput(format!(
                "voting period must be between {} and {} seconds",
                self.config.min_voting_period_secs, self.config.max_voting_period_secs
            )));
        }

        let created_at = self.clock.now();
        let proposal = Proposal {
            id: generate_proposal_id(),
            author,
            title,
            description,
            category: request.category,
            votes_for: 0,
            votes_against: 0,
            votes: Vec::new(),
            created_at,
            deadline: created_at + period,
            status: ProposalStatus::Active,
            metadata: ProposalMetadata {
                required_votes: self.config.required_votes,
                passing_threshold: self.config.passing_threshold,
            },
            revision: 0,
        };

        self.store.insert(&proposal).await?;
        Ok(proposal)
    }

    /// Fetch a proposal, settling its status first if the deadline passed
    pub async fn get_proposal(&self, id: &str) -> Result<Proposal, GovernanceError> {
        Ok(self.evaluate(id).await?.proposal)
    }

    /// Evaluate a proposal against the current time and persist any transition
    pub async fn evaluate(&self, id: &str) -> Result<Evaluation, GovernanceError> {
        self.evaluate_at(id, self.clock.now()).await
    }

    async fn evaluate_at(&self, id: &str, now: i64) -> Result<Evaluation, GovernanceError> {
        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut proposal = self.load(id).await?;

            let next = match lifecycle::apply_evaluation(&mut proposal, now) {
                Some(next) => next,
                None => {
                    return Ok(Evaluation {
                        proposal,
                        transitioned: None,
                    })
                }
            };

            if self.store.update(&proposal).await? {
                proposal.revision += 1;
                return Ok(Evaluation {
                    proposal,
                    transitioned: Some(next),
                });
            }
        }

        Err(contention(id))
    }

    /// Cast a vote for `voter_id` on proposal `id`
    pub async fn submit_vote(
        &self,
        id: &str,
        voter_id: &str,
        choice: VoteChoice,
    ) -> Result<VoteReceipt, GovernanceError> {
        let voter_id = validate_wallet_id(voter_id, "voter")?;

        for _ in 0..MAX_UPDATE_ATTEMPTS {
            let mut proposal = self.load(id).await?;
            let now = self.clock.now();
            let weight = self.weights.resolve_weight(&voter_id, &proposal);

            let vote = voting::apply_vote(&mut proposal, &voter_id, choice, weight, now)?;

            if self.store.update(&proposal).await? {
                return Ok(VoteReceipt {
                    proposal_id: proposal.id,
                    vote,
                    votes_for: proposal.votes_for,
                    votes_against: proposal.votes_against,
                });
            }
        }

        Err(contention(id))
    }

    /// [`submit_vote`](Self::submit_vote) with the choice still in wire form
    pub async fn submit_vote_str(
        &self,
        id: &str,
        voter_id: &str,
        choice: &str,
    ) -> Result<VoteReceipt, GovernanceError> {
        let choice = choice.parse::<VoteChoice>()?;
        self.submit_vote(id, voter_id, choice).await
    }

    /// Evaluate every open proposal whose deadline is before `now`.
    ///
    /// Returns the ids this call transitioned. Proposals settled or deleted
    /// concurrently by another caller are skipped. A failure on one proposal
    /// is logged and the pass moves on to the next.
    pub async fn sweep(&self, now: i64) -> Result<Vec<String>, GovernanceError> {
        let due = self.store.list_due(now).await?;

        let mut transitioned = Vec::new();
        for proposal in due {
            match self.evaluate_at(&proposal.id, now).await {
                Ok(evaluation) => {
                    if evaluation.transitioned.is_some() {
                        transitioned.push(proposal.id);
                    }
                }
                Err(GovernanceError::NotFound(_)) => {
                    debug!("Proposal {} removed before it could be swept", proposal.id);
                }
                Err(e) => {
                    warn!("Failed to settle proposal {}: {}", proposal.id, e);
                }
            }
        }

        Ok(transitioned)
    }

    /// Delete a closed proposal on behalf of its author or an admin
    pub async fn delete_proposal(&self, id: &str, requester: &str) -> Result<(), GovernanceError> {
        let proposal = self.get_proposal(id).await?;

        if proposal.author != requester && !self.config.is_admin(requester) {
            return Err(GovernanceError::Unauthorized(format!(
                "{} may not delete proposal {}",
                requester, id
            )));
        }

        if proposal.status.is_open() {
            return Err(GovernanceError::ProposalStillActive(format!(
                "proposal {} is open until {}",
                id, proposal.deadline
            )));
        }

        if !self.store.delete(id).await? {
            return Err(GovernanceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// List proposals, settling any that are past their deadline
    pub async fn list_proposals(
        &self,
        filter: &ProposalFilter,
    ) -> Result<Vec<Proposal>, GovernanceError> {
        let now = self.clock.now();

        // Stored status is stale for due rows, so settle them before filtering on it
        self.sweep(now).await?;
        let proposals = self.store.list(filter).await?;

        let mut settled = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            if lifecycle::is_due(&proposal, now) {
                let evaluation = self.evaluate_at(&proposal.id, now).await?;
                if filter.matches(&evaluation.proposal) {
                    settled.push(evaluation.proposal);
                }
            } else {
                settled.push(proposal);
            }
        }

        Ok(settled)
    }

    /// The vote `voter_id` cast on proposal `id`, if any
    pub async fn get_vote(
        &self,
        id: &str,
        voter_id: &str,
    ) -> Result<Option<VoteRecord>, GovernanceError> {
        let proposal = self.load(id).await?;
        Ok(proposal.vote_of(voter_id).cloned())
    }

    /// Proposal counts by status, after settling any that are past their deadline
    pub async fn stats(&self) -> Result<ProposalStats, GovernanceError> {
        self.sweep(self.clock.now()).await?;
        let counts = self.store.status_counts().await?;
        let count = |status: ProposalStatus| counts.get(&status).copied().unwrap_or(0);

        let stats = ProposalStats {
            pending: count(ProposalStatus::Pending),
            active: count(ProposalStatus::Active),
            passed: count(ProposalStatus::Passed),
            failed: count(ProposalStatus::Failed),
            total: counts.values().sum(),
        };
        Ok(stats)
    }

    async fn load(&self, id: &str) -> Result<Proposal, GovernanceError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| GovernanceError::NotFound(id.to_string()))
    }
}

fn contention(id: &str) -> GovernanceError {
    GovernanceError::Contention(format!(
        "proposal {} changed {} times during update",
        id, MAX_UPDATE_ATTEMPTS
    ))
}

/// Trim and drop control characters other than newline and tab
fn sanitize_text(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .trim()
        .to_string()
}

fn validate_wallet_id(wallet: &str, field: &str) -> Result<String, GovernanceError> {
    let wallet = wallet.trim();
    if wallet.is_empty() || wallet.chars().count() > MAX_WALLET_ID_LENGTH {
        return Err(GovernanceError::InvalidInput(format!(
            "{} wallet id must be 1-{} characters",
            field, MAX_WALLET_ID_LENGTH
        )));
    }
    if wallet.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(GovernanceError::InvalidInput(format!(
            "{} wallet id contains invalid characters",
            field
        )));
    }
    Ok(wallet.to_string())
}
