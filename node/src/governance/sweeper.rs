//! Background sweep of proposals past their deadline.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::tracker::ProposalTracker;
use super::GovernanceError;

/// Periodically settles open proposals whose voting window has closed
pub struct ProposalSweeper {
    tracker: Arc<ProposalTracker>,
    interval: Duration,
}

impl ProposalSweeper {
    pub fn new(tracker: Arc<ProposalTracker>, interval: Duration) -> Self {
        Self { tracker, interval }
    }

    /// Build a sweeper using the tracker's configured interval
    pub fn from_config(tracker: Arc<ProposalTracker>) -> Self {
        let interval = Duration::from_secs(tracker.config().sweep_interval_secs);
        Self::new(tracker, interval)
    }

    /// Run a single sweep against the tracker's clock
    pub async fn run_once(&self) -> Result<Vec<String>, GovernanceError> {
        let now = self.tracker.clock().now();
        let transitioned = self.tracker.sweep(now).await?;

        if transitioned.is_empty() {
            debug!("Sweep at {} found nothing due", now);
        } else {
            info!(
                "Sweep settled {} proposal(s): {}",
                transitioned.len(),
                transitioned.join(", ")
            );
        }

        Ok(transitioned)
    }

    /// Start the sweep loop. Stops once `shutdown` turns true or its sender
    /// is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        info!("Starting proposal sweeper (interval: {:?})", self.interval);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!("Proposal sweep failed: {}", e);
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Proposal sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::clock::ManualClock;
    use crate::governance::proposal_store::MemoryProposalStore;
    use crate::governance::tracker::NewProposal;
    use crate::governance::{GovernanceConfig, ProposalCategory, ProposalStatus};

    fn tracker(clock: Arc<ManualClock>) -> Arc<ProposalTracker> {
        Arc::new(ProposalTracker::new(
            Arc::new(MemoryProposalStore::new()),
            clock,
            GovernanceConfig::default(),
        ))
    }

    fn request() -> NewProposal {
        NewProposal {
            author: "wallet_author".to_string(),
            title: "Seasonal quest rotation".to_string(),
            description: "Rotate quests every season".to_string(),
            category: ProposalCategory::Game,
            voting_period_secs: Some(60 * 60),
        }
    }

    #[tokio::test]
    async fn test_run_once_settles_due_proposals() {
        let clock = Arc::new(ManualClock::new(1_000));
        let tracker = tracker(clock.clone());
        let proposal = tracker.create_proposal(request()).await.unwrap();

        let sweeper = ProposalSweeper::new(tracker.clone(), Duration::from_secs(60));
        assert!(sweeper.run_once().await.unwrap().is_empty());

        clock.set(proposal.deadline + 1);
        assert_eq!(sweeper.run_once().await.unwrap(), vec![proposal.id.clone()]);

        // Second pass has nothing left to do
        assert!(sweeper.run_once().await.unwrap().is_empty());

        let settled = tracker.get_proposal(&proposal.id).await.unwrap();
        assert_eq!(settled.status, ProposalStatus::Failed);
    }

    #[tokio::test]
    async fn test_spawned_sweeper_stops_on_shutdown() {
        let clock = Arc::new(ManualClock::new(1_000));
        let tracker = tracker(clock.clone());
        let proposal = tracker.create_proposal(request()).await.unwrap();
        clock.set(proposal.deadline + 1);

        let (tx, rx) = watch::channel(false);
        let handle = ProposalSweeper::new(tracker.clone(), Duration::from_millis(10)).spawn(rx);

        // First tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stats = tracker.stats().await.unwrap();
        assert_eq!(stats.failed, 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }
}
