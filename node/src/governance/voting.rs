//! Vote submission rules and vote weight resolution.

use super::{GovernanceError, Proposal, VoteChoice, VoteRecord};

/// Resolves the weight a wallet's vote carries on a proposal.
///
/// Every deployment so far uses [`ConstantWeight`] (one wallet, one vote);
/// stake-weighted voting plugs in here.
pub trait VoteWeightResolver: Send + Sync {
    fn resolve_weight(&self, voter_id: &str, proposal: &Proposal) -> u64;
}

/// Same weight for every wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantWeight(pub u64);

impl Default for ConstantWeight {
    fn default() -> Self {
        Self(1)
    }
}

impl VoteWeightResolver for ConstantWeight {
    fn resolve_weight(&self, _voter_id: &str, _proposal: &Proposal) -> u64 {
        self.0
    }
}

impl<F> VoteWeightResolver for F
where
    F: Fn(&str, &Proposal) -> u64 + Send + Sync,
{
    fn resolve_weight(&self, voter_id: &str, proposal: &Proposal) -> u64 {
        self(voter_id, proposal)
    }
}

/// Record a vote on an in-memory proposal.
///
/// The ledger check runs first, so a wallet that already voted gets
/// `AlreadyVoted` even after the window closed. On any error the proposal is
/// left untouched.
pub fn apply_vote(
    proposal: &mut Proposal,
    voter_id: &str,
    choice: VoteChoice,
    weight: u64,
    now: i64,
) -> Result<VoteRecord, GovernanceError> {
    if proposal.has_voted(voter_id) {
        return Err(GovernanceError::AlreadyVoted {
            proposal_id: proposal.id.clone(),
            voter_id: voter_id.to_string(),
        });
    }

    if !proposal.status.is_open() {
        return Err(GovernanceError::ProposalNotActive(format!(
            "proposal {} is {}",
            proposal.id, proposal.status
        )));
    }

    if now > proposal.deadline {
        return Err(GovernanceError::ProposalNotActive(format!(
            "voting on proposal {} ended at {}",
            proposal.id, proposal.deadline
        )));
    }

    if weight == 0 {
        return Err(GovernanceError::InvalidInput(format!(
            "wallet {} has no voting power",
            voter_id
        )));
    }

    let overflow = || GovernanceError::Overflow(proposal.id.clone());
    let (votes_for, votes_against) = match choice {
        VoteChoice::For => (
            proposal.votes_for.checked_add(weight).ok_or_else(overflow)?,
            proposal.votes_against,
        ),
        VoteChoice::Against => (
            proposal.votes_for,
            proposal.votes_against.checked_add(weight).ok_or_else(overflow)?,
        ),
    };

    let record = VoteRecord {
        voter_id: voter_id.to_string(),
        choice,
        weight,
        timestamp: now,
    };

    proposal.votes_for = votes_for;
    proposal.votes_against = votes_against;
    proposal.votes.push(record.clone());

    Ok(record)
}
