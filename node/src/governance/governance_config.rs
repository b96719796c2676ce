//! Governance Configuration
//!
//! Voting windows, decision thresholds copied onto new proposals, sweep
//! cadence and the admin wallet list.

use serde::{Deserialize, Serialize};

use super::GovernanceError;

/// Default voting period (7 days in seconds)
pub const DEFAULT_VOTING_PERIOD: i64 = 7 * 24 * 60 * 60;

/// Minimum voting period (1 hour)
pub const MIN_VOTING_PERIOD: i64 = 60 * 60;

/// Maximum voting period (30 days)
pub const MAX_VOTING_PERIOD: i64 = 30 * 24 * 60 * 60;

/// Governance rules applied by the tracker
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Voting period used when a proposal does not ask for one (seconds)
    pub default_voting_period_secs: i64,
    /// Shortest voting period a proposal may request (seconds)
    pub min_voting_period_secs: i64,
    /// Longest voting period a proposal may request (seconds)
    pub max_voting_period_secs: i64,
    /// Minimum total ballots for a proposal to pass
    pub required_votes: u64,
    /// Minimum for-vote percentage for a proposal to pass
    pub passing_threshold: f64,
    /// How often the sweeper evaluates due proposals (seconds)
    pub sweep_interval_secs: u64,
    /// Wallets allowed to delete any closed proposal
    pub admin_wallets: Vec<String>,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            default_voting_period_secs: DEFAULT_VOTING_PERIOD,
            min_voting_period_secs: MIN_VOTING_PERIOD,
            max_voting_period_secs: MAX_VOTING_PERIOD,
            required_votes: 50,
            passing_threshold: 60.0,
            sweep_interval_secs: 60,
            admin_wallets: Vec::new(),
        }
    }
}

impl GovernanceConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GovernanceError> {
        if self.min_voting_period_secs <= 0 {
            return Err(GovernanceError::Config(
                "min_voting_period_secs must be > 0".to_string(),
            ));
        }

        if self.max_voting_period_secs < self.min_voting_period_secs {
            return Err(GovernanceError::Config(
                "max_voting_period_secs must be >= min_voting_period_secs".to_string(),
            ));
        }

        if !self.period_in_bounds(self.default_voting_period_secs) {
            return Err(GovernanceError::Config(format!(
                "default_voting_period_secs must lie in [{}, {}]",
                self.min_voting_period_secs, self.max_voting_period_secs
            )));
        }

        if !(0.0..=100.0).contains(&self.passing_threshold) {
            return Err(GovernanceError::Config(
                "passing_threshold must be a percentage between 0 and 100".to_string(),
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(GovernanceError::Config(
                "sweep_interval_secs must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn period_in_bounds(&self, secs: i64) -> bool {
        secs >= self.min_voting_period_secs && secs <= self.max_voting_period_secs
    }

    pub fn is_admin(&self, wallet: &str) -> bool {
        self.admin_wallets.iter().any(|w| w == wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GovernanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.required_votes, 50);
        assert_eq!(config.passing_threshold, 60.0);
    }

    #[test]
    fn test_threshold_out_of_range() {
        let config = GovernanceConfig {
            passing_threshold: 150.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GovernanceError::Config(_))));

        let config = GovernanceConfig {
            passing_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_period_bounds() {
        let config = GovernanceConfig {
            default_voting_period_secs: MAX_VOTING_PERIOD + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GovernanceConfig {
            min_voting_period_secs: 100,
            max_voting_period_secs: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GovernanceConfig::default();
        assert!(config.period_in_bounds(MIN_VOTING_PERIOD));
        assert!(!config.period_in_bounds(MIN_VOTING_PERIOD - 1));
    }

    #[test]
    fn test_zero_sweep_interval() {
        let config = GovernanceConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_admin_lookup() {
        let config = GovernanceConfig {
            admin_wallets: vec!["wallet_admin".to_string()],
            ..Default::default()
        };
        assert!(config.is_admin("wallet_admin"));
        assert!(!config.is_admin("wallet_user"));
    }
}
