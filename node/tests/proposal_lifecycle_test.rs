// Proposal lifecycle integration tests
//
// Drives the tracker end to end against both stores: voting windows,
// pass/fail boundaries, idempotent settlement and the sweep path.

use std::sync::Arc;

use agora_node::governance::{
    Clock,
    GovernanceConfig, GovernanceError, ManualClock, MemoryProposalStore, NewProposal, Proposal,
    ProposalCategory, ProposalFilter, ProposalStatus, ProposalStore, ProposalTracker,
    SqliteProposalStore, VoteChoice,
};

const START: i64 = 1_700_000_000;
const HOUR: i64 = 60 * 60;

struct Harness {
    tracker: ProposalTracker,
    clock: Arc<ManualClock>,
    store: Arc<dyn ProposalStore>,
}

fn harness_with(store: Arc<dyn ProposalStore>) -> Harness {
    let clock = Arc::new(ManualClock::new(START));
    let tracker = ProposalTracker::new(store.clone(), clock.clone(), GovernanceConfig::default());
    Harness {
        tracker,
        clock,
        store,
    }
}

fn harnesses() -> Vec<Harness> {
    vec![
        harness_with(Arc::new(MemoryProposalStore::new())),
        harness_with(Arc::new(SqliteProposalStore::in_memory().unwrap())),
    ]
}

fn request(period: i64) -> NewProposal {
    NewProposal {
        author: "wallet_author".to_string(),
        title: "Community treasury grant".to_string(),
        description: "Fund the next community tournament".to_string(),
        category: ProposalCategory::Funding,
        voting_period_secs: Some(period),
    }
}

async fn cast(h: &Harness, proposal: &Proposal, votes_for: usize, votes_against: usize) {
    for i in 0..votes_for {
        h.tracker
            .submit_vote(&proposal.id, &format!("wallet_for_{}", i), VoteChoice::For)
            .await
            .unwrap();
    }
    for i in 0..votes_against {
        h.tracker
            .submit_vote(&proposal.id, &format!("wallet_against_{}", i), VoteChoice::Against)
            .await
            .unwrap();
    }
}

async fn settle_with(h: &Harness, votes_for: usize, votes_against: usize) -> ProposalStatus {
    let proposal = h.tracker.create_proposal(request(HOUR)).await.unwrap();
    cast(h, &proposal, votes_for, votes_against).await;

    h.clock.set(proposal.deadline + 1);
    let evaluation = h.tracker.evaluate(&proposal.id).await.unwrap();
    assert_eq!(evaluation.transitioned, Some(evaluation.proposal.status));
    evaluation.proposal.status
}

#[tokio::test]
async fn test_boundary_votes_pass() {
    for h in harnesses() {
        assert_eq!(settle_with(&h, 30, 20).await, ProposalStatus::Passed);
    }
}

#[tokio::test]
async fn test_below_threshold_fails() {
    for h in harnesses() {
        assert_eq!(settle_with(&h, 29, 21).await, ProposalStatus::Failed);
    }
}

#[tokio::test]
async fn test_insufficient_turnout_fails() {
    for h in harnesses() {
        assert_eq!(settle_with(&h, 40, 0).await, ProposalStatus::Failed);
    }
}

#[tokio::test]
async fn test_zero_votes_fail() {
    for h in harnesses() {
        assert_eq!(settle_with(&h, 0, 0).await, ProposalStatus::Failed);
    }
}

#[tokio::test]
async fn test_evaluation_is_idempotent() {
    for h in harnesses() {
        let proposal = h.tracker.create_proposal(request(HOUR)).await.unwrap();
        cast(&h, &proposal, 3, 1).await;
        h.clock.set(proposal.deadline + 1);

        let first = h.tracker.evaluate(&proposal.id).await.unwrap();
        assert!(first.transitioned.is_some());

        h.clock.advance(HOUR);
        let second = h.tracker.evaluate(&proposal.id).await.unwrap();
        assert_eq!(second.transitioned, None);
        assert_eq!(second.proposal.status, first.proposal.status);
        assert_eq!(second.proposal.revision, first.proposal.revision);

        // The sweep does not touch it again either
        assert!(h.tracker.sweep(h.clock.now()).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_no_evaluation_before_deadline() {
    for h in harnesses() {
        let proposal = h.tracker.create_proposal(request(HOUR)).await.unwrap();
        cast(&h, &proposal, 2, 0).await;

        h.clock.set(proposal.deadline);
        let evaluation = h.tracker.evaluate(&proposal.id).await.unwrap();
        assert_eq!(evaluation.transitioned, None);
        assert_eq!(evaluation.proposal.status, ProposalStatus::Active);
        assert_eq!(evaluation.proposal.votes_for, 2);

        assert!(h.tracker.sweep(h.clock.now()).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_one_vote_per_wallet() {
    for h in harnesses() {
        let proposal = h.tracker.create_proposal(request(HOUR)).await.unwrap();

        h.tracker
            .submit_vote(&proposal.id, "wallet_a", VoteChoice::For)
            .await
            .unwrap();
        let err = h
            .tracker
            .submit_vote(&proposal.id, "wallet_a", VoteChoice::Against)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::AlreadyVoted { .. }));

        let stored = h.tracker.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(stored.votes_for, 1);
        assert_eq!(stored.votes_against, 0);
        assert_eq!(stored.votes.len(), 1);
    }
}

#[tokio::test]
async fn test_vote_after_deadline_rejected() {
    for h in harnesses() {
        let proposal = h.tracker.create_proposal(request(HOUR)).await.unwrap();
        h.clock.set(proposal.deadline + 1);

        let err = h
            .tracker
            .submit_vote(&proposal.id, "wallet_late", VoteChoice::For)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::ProposalNotActive(_)));

        // Once settled the rejection is the same
        h.tracker.evaluate(&proposal.id).await.unwrap();
        let err = h
            .tracker
            .submit_vote(&proposal.id, "wallet_late", VoteChoice::For)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::ProposalNotActive(_)));
    }
}

#[tokio::test]
async fn test_sweep_settles_only_due_proposals() {
    for h in harnesses() {
        let short = h.tracker.create_proposal(request(HOUR)).await.unwrap();
        let medium = h.tracker.create_proposal(request(2 * HOUR)).await.unwrap();
        let long = h.tracker.create_proposal(request(24 * HOUR)).await.unwrap();

        let transitioned = h.tracker.sweep(START + 3 * HOUR).await.unwrap();
        assert_eq!(transitioned, vec![short.id.clone(), medium.id.clone()]);

        let stored = h.store.get(&long.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ProposalStatus::Active);

        let stats = h.tracker.stats().await.unwrap();
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.active, 1);
    }
}

#[tokio::test]
async fn test_pending_behaves_like_active() {
    for h in harnesses() {
        let mut proposal = h.tracker.create_proposal(request(HOUR)).await.unwrap();
        h.store.delete(&proposal.id).await.unwrap();
        proposal.status = ProposalStatus::Pending;
        proposal.metadata.required_votes = 1;
        h.store.insert(&proposal).await.unwrap();

        h.tracker
            .submit_vote(&proposal.id, "wallet_a", VoteChoice::For)
            .await
            .unwrap();

        h.clock.set(proposal.deadline + 1);
        let transitioned = h.tracker.sweep(h.clock.now()).await.unwrap();
        assert_eq!(transitioned, vec![proposal.id.clone()]);

        let settled = h.tracker.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(settled.status, ProposalStatus::Passed);
    }
}

#[tokio::test]
async fn test_list_filters_by_author_and_category() {
    for h in harnesses() {
        h.tracker.create_proposal(request(HOUR)).await.unwrap();

        let mut other = request(HOUR);
        other.author = "wallet_other".to_string();
        other.category = ProposalCategory::Technical;
        h.clock.advance(1);
        let other = h.tracker.create_proposal(other).await.unwrap();

        let by_author = h
            .tracker
            .list_proposals(&ProposalFilter {
                author: Some("wallet_other".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_author.len(), 1);
        assert_eq!(by_author[0].id, other.id);

        let technical = h
            .tracker
            .list_proposals(&ProposalFilter {
                category: Some(ProposalCategory::Technical),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(technical.len(), 1);

        let all = h.tracker.list_proposals(&ProposalFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, other.id);
    }
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("governance.db");

    let id = {
        let h = harness_with(Arc::new(SqliteProposalStore::new(&path).unwrap()));
        let proposal = h.tracker.create_proposal(request(HOUR)).await.unwrap();
        cast(&h, &proposal, 2, 1).await;
        proposal.id
    };

    let h = harness_with(Arc::new(SqliteProposalStore::new(&path).unwrap()));
    let proposal = h.tracker.get_proposal(&id).await.unwrap();
    assert_eq!(proposal.votes_for, 2);
    assert_eq!(proposal.votes_against, 1);
    assert_eq!(proposal.votes.len(), 3);
    assert!(proposal.has_voted("wallet_against_0"));

    let err = h
        .tracker
        .submit_vote(&id, "wallet_for_0", VoteChoice::For)
        .await
        .unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyVoted { .. }));
}
