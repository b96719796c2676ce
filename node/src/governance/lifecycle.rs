//! Proposal Lifecycle Rules
//!
//! The single home of the pass/fail decision. Everything here is pure: the
//! caller supplies `now` and persists whatever transition comes back.
//!
//! ```text
//!   pending ─┐
//!            ├─(now > deadline, rule true)──▶ passed
//!   active ──┤
//!            └─(now > deadline, rule false)─▶ failed
//! ```
//!
//! `passed` and `failed` are terminal.

use super::{Proposal, ProposalMetadata, ProposalStatus};

/// For-vote percentage in `0..=100`, defined as 0 when no votes were cast
pub fn support_rate(votes_for: u64, votes_against: u64) -> f64 {
    let total = votes_for.saturating_add(votes_against);
    if total == 0 {
        return 0.0;
    }
    votes_for as f64 / total as f64 * 100.0
}

/// Apply the decision rule to a closed tally.
///
/// Both thresholds are inclusive. The percentage comparison is done as
/// `votes_for * 100 >= threshold * total` so integral thresholds land exactly
/// on their boundary. This is not the literal `votes_for / total * 100`
/// float division: 57 of 100 at a threshold of 57 passes here, where the
/// division yields 56.99999999999999 and would fail it.
pub fn decide(votes_for: u64, votes_against: u64, metadata: &ProposalMetadata) -> ProposalStatus {
    let total = votes_for.saturating_add(votes_against);

    let support_met = if total == 0 {
        0.0 >= metadata.passing_threshold
    } else {
        votes_for as f64 * 100.0 >= metadata.passing_threshold * total as f64
    };
    let quorum_met = total >= metadata.required_votes;

    if support_met && quorum_met {
        ProposalStatus::Passed
    } else {
        ProposalStatus::Failed
    }
}

/// Whether the proposal is open and its deadline has elapsed at `now`
pub fn is_due(proposal: &Proposal, now: i64) -> bool {
    proposal.status.is_open() && now > proposal.deadline
}

/// Decide the status a proposal should move to at `now`.
///
/// Returns `None` when nothing changes: the proposal is already terminal or
/// its voting window is still open.
pub fn evaluate(proposal: &Proposal, now: i64) -> Option<ProposalStatus> {
    if !is_due(proposal, now) {
        return None;
    }
    Some(decide(
        proposal.votes_for,
        proposal.votes_against,
        &proposal.metadata,
    ))
}

/// [`evaluate`] and write the resulting status into `proposal`
pub fn apply_evaluation(proposal: &mut Proposal, now: i64) -> Option<ProposalStatus> {
    let next = evaluate(proposal, now)?;
    proposal.status = next;
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::ProposalCategory;
    use proptest::prelude::*;

    const DEADLINE: i64 = 10_000;

    fn proposal_with(votes_for: u64, votes_against: u64) -> Proposal {
        Proposal {
            id: "prop_lifecycle".to_string(),
            author: "wallet_author".to_string(),
            title: "Raise quest rewards".to_string(),
            description: "Double the weekly quest reward pool".to_string(),
            category: ProposalCategory::Funding,
            votes_for,
            votes_against,
            votes: Vec::new(),
            created_at: 0,
            deadline: DEADLINE,
            status: ProposalStatus::Active,
            metadata: ProposalMetadata {
                required_votes: 50,
                passing_threshold: 60.0,
            },
            revision: 0,
        }
    }

    #[test]
    fn test_boundary_values_pass() {
        let proposal = proposal_with(30, 20);
        assert_eq!(proposal.support_rate(), 60.0);
        assert_eq!(evaluate(&proposal, DEADLINE + 1), Some(ProposalStatus::Passed));
    }

    #[test]
    fn test_fractional_boundary_is_inclusive() {
        let metadata = ProposalMetadata {
            required_votes: 100,
            passing_threshold: 57.0,
        };
        assert!(57.0_f64 / 100.0 * 100.0 < 57.0);
        assert_eq!(decide(57, 43, &metadata), ProposalStatus::Passed);
        assert_eq!(decide(56, 44, &metadata), ProposalStatus::Failed);
    }

    #[test]
    fn test_below_threshold_fails() {
        let proposal = proposal_with(29, 21);
        assert_eq!(evaluate(&proposal, DEADLINE + 1), Some(ProposalStatus::Failed));
    }

    #[test]
    fn test_insufficient_total_votes_fails() {
        let proposal = proposal_with(40, 0);
        assert_eq!(proposal.support_rate(), 100.0);
        assert_eq!(evaluate(&proposal, DEADLINE + 1), Some(ProposalStatus::Failed));
    }

    #[test]
    fn test_zero_votes_fails_without_nan() {
        let proposal = proposal_with(0, 0);
        assert_eq!(proposal.support_rate(), 0.0);
        assert_eq!(evaluate(&proposal, DEADLINE + 1), Some(ProposalStatus::Failed));
    }

    #[test]
    fn test_not_due_at_or_before_deadline() {
        let proposal = proposal_with(500, 0);
        assert_eq!(evaluate(&proposal, DEADLINE - 1), None);
        assert_eq!(evaluate(&proposal, DEADLINE), None);
        assert!(evaluate(&proposal, DEADLINE + 1).is_some());
    }

    #[test]
    fn test_terminal_proposals_are_never_reevaluated() {
        let mut proposal = proposal_with(30, 20);

        assert_eq!(apply_evaluation(&mut proposal, DEADLINE + 1), Some(ProposalStatus::Passed));
        assert_eq!(proposal.status, ProposalStatus::Passed);

        // A later tally change must not flip a terminal proposal
        proposal.votes_against = 1_000;
        assert_eq!(apply_evaluation(&mut proposal, DEADLINE + 100), None);
        assert_eq!(proposal.status, ProposalStatus::Passed);
    }

    #[test]
    fn test_pending_behaves_like_active() {
        let mut proposal = proposal_with(30, 20);
        proposal.status = ProposalStatus::Pending;
        assert_eq!(evaluate(&proposal, DEADLINE + 1), Some(ProposalStatus::Passed));
    }

    #[test]
    fn test_thresholds_are_read_per_proposal() {
        let mut proposal = proposal_with(3, 2);
        proposal.metadata = ProposalMetadata {
            required_votes: 5,
            passing_threshold: 51.0,
        };
        assert_eq!(evaluate(&proposal, DEADLINE + 1), Some(ProposalStatus::Passed));

        proposal.metadata.passing_threshold = 61.0;
        assert_eq!(evaluate(&proposal, DEADLINE + 1), Some(ProposalStatus::Failed));
    }

    #[test]
    fn test_zero_thresholds_pass_empty_tally() {
        let metadata = ProposalMetadata {
            required_votes: 0,
            passing_threshold: 0.0,
        };
        assert_eq!(decide(0, 0, &metadata), ProposalStatus::Passed);
    }

    proptest! {
        #[test]
        fn prop_decision_matches_integer_rule(
            votes_for in 0u64..10_000,
            votes_against in 0u64..10_000,
            required in 0u64..200,
            threshold in 0u64..=100,
        ) {
            let metadata = ProposalMetadata {
                required_votes: required,
                passing_threshold: threshold as f64,
            };
            let total = votes_for + votes_against;
            let support_met = if total == 0 {
                threshold == 0
            } else {
                votes_for * 100 >= threshold * total
            };
            let expected = if support_met && total >= required {
                ProposalStatus::Passed
            } else {
                ProposalStatus::Failed
            };
            prop_assert_eq!(decide(votes_for, votes_against, &metadata), expected);
        }

        #[test]
        fn prop_evaluation_is_idempotent(
            votes_for in 0u64..1_000,
            votes_against in 0u64..1_000,
            offset in 1i64..1_000_000,
        ) {
            let mut proposal = proposal_with(votes_for, votes_against);
            let first = apply_evaluation(&mut proposal, DEADLINE + offset);
            prop_assert!(first.is_some());
            let settled = proposal.clone();
            prop_assert_eq!(apply_evaluation(&mut proposal, DEADLINE + offset + 1), None);
            prop_assert_eq!(proposal, settled);
        }
    }
}
