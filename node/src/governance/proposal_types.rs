//! Proposal Types
//!
//! Proposal records, the per-proposal vote ledger and the governance error
//! taxonomy shared by the lifecycle rules, the stores and the HTTP API.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum proposal title length (characters)
pub const MAX_TITLE_LENGTH: usize = 200;

/// Maximum proposal description length (characters)
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Maximum wallet id length accepted for authors and voters
pub const MAX_WALLET_ID_LENGTH: usize = 128;

/// Proposal status
///
/// `Pending` is accepted for records written by older flows and behaves
/// exactly like `Active`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    /// Voting is open until the deadline
    Active,
    /// Support rate and required votes both met
    Passed,
    /// Deadline elapsed without meeting the decision rule
    Failed,
}

impl ProposalStatus {
    /// Whether the proposal still accepts votes and awaits evaluation
    pub fn is_open(&self) -> bool {
        matches!(self, ProposalStatus::Pending | ProposalStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Pending => "pending",
            ProposalStatus::Active => "active",
            ProposalStatus::Passed => "passed",
            ProposalStatus::Failed => "failed",
        }
    }

    pub fn all() -> [ProposalStatus; 4] {
        [
            ProposalStatus::Pending,
            ProposalStatus::Active,
            ProposalStatus::Passed,
            ProposalStatus::Failed,
        ]
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ProposalStatus::Pending),
            "active" => Ok(ProposalStatus::Active),
            "passed" => Ok(ProposalStatus::Passed),
            "failed" => Ok(ProposalStatus::Failed),
            _ => Err(GovernanceError::InvalidInput(format!(
                "unknown proposal status: {}",
                s
            ))),
        }
    }
}

/// Proposal category
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProposalCategory {
    Game,
    Governance,
    Technical,
    Funding,
}

impl ProposalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalCategory::Game => "game",
            ProposalCategory::Governance => "governance",
            ProposalCategory::Technical => "technical",
            ProposalCategory::Funding => "funding",
        }
    }
}

impl fmt::Display for ProposalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalCategory {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "game" => Ok(ProposalCategory::Game),
            "governance" => Ok(ProposalCategory::Governance),
            "technical" => Ok(ProposalCategory::Technical),
            "funding" => Ok(ProposalCategory::Funding),
            _ => Err(GovernanceError::InvalidInput(format!(
                "unknown proposal category: {}",
                s
            ))),
        }
    }
}

/// Vote choices
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VoteChoice {
    For,
    Against,
}

impl VoteChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteChoice::For => "for",
            VoteChoice::Against => "against",
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteChoice {
    type Err = GovernanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "for" => Ok(VoteChoice::For),
            "against" => Ok(VoteChoice::Against),
            _ => Err(GovernanceError::InvalidChoice(s.to_string())),
        }
    }
}

/// One entry of the append-only vote ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteRecord {
    /// Wallet id of the voter
    pub voter_id: String,
    pub choice: VoteChoice,
    /// Weight added to the tally for `choice`
    pub weight: u64,
    /// When the vote was cast (unix seconds)
    pub timestamp: i64,
}

/// Decision thresholds, fixed when the proposal is created
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ProposalMetadata {
    /// Minimum total ballots cast
    pub required_votes: u64,
    /// Minimum for-vote percentage (0-100)
    pub passing_threshold: f64,
}

/// A governance proposal and its vote ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    /// Unique proposal id
    pub id: String,
    /// Wallet id of the proposal author
    pub author: String,
    pub title: String,
    pub description: String,
    pub category: ProposalCategory,
    /// Total FOR weight
    pub votes_for: u64,
    /// Total AGAINST weight
    pub votes_against: u64,
    /// Ledger of individual votes, in cast order
    pub votes: Vec<VoteRecord>,
    /// Creation timestamp (unix seconds)
    pub created_at: i64,
    /// End of the voting window (unix seconds, inclusive)
    pub deadline: i64,
    pub status: ProposalStatus,
    pub metadata: ProposalMetadata,
    /// Store revision, bumped by every successful conditional update
    #[serde(default)]
    pub revision: u64,
}

impl Proposal {
    /// Sum of both tallies
    pub fn total_votes(&self) -> u64 {
        self.votes_for.saturating_add(self.votes_against)
    }

    /// For-vote percentage, 0 when nobody has voted
    pub fn support_rate(&self) -> f64 {
        super::lifecycle::support_rate(self.votes_for, self.votes_against)
    }

    pub fn has_voted(&self, voter_id: &str) -> bool {
        self.votes.iter().any(|v| v.voter_id == voter_id)
    }

    pub fn vote_of(&self, voter_id: &str) -> Option<&VoteRecord> {
        self.votes.iter().find(|v| v.voter_id == voter_id)
    }

    /// Whether a vote cast at `now` would be accepted (ignoring the ledger)
    pub fn is_voting_open(&self, now: i64) -> bool {
        self.status.is_open() && now <= self.deadline
    }

    /// Seconds left in the voting window, 0 once it has closed
    pub fn time_remaining(&self, now: i64) -> i64 {
        (self.deadline - now).max(0)
    }
}

/// Generate a new proposal id
pub fn generate_proposal_id() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 8] = rng.gen();
    format!("prop_{}", hex::encode(bytes))
}

/// Governance errors
///
/// Every rejected operation maps to exactly one of these; none of them is
/// fatal to the process.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GovernanceError {
    #[error("Proposal not found: {0}")]
    NotFound(String),

    #[error("Wallet {voter_id} already voted on proposal {proposal_id}")]
    AlreadyVoted {
        proposal_id: String,
        voter_id: String,
    },

    #[error("Proposal not active: {0}")]
    ProposalNotActive(String),

    #[error("Invalid vote choice: {0}. Valid options: for, against")]
    InvalidChoice(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Proposal still active: {0}")]
    ProposalStillActive(String),

    #[error("Concurrent update conflict: {0}")]
    Contention(String),

    #[error("Tally overflow on proposal {0}")]
    Overflow(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}
