//! Agora Governance
//!
//! Wallet-identified members submit proposals, vote for or against them, and
//! each proposal settles as passed or failed once its voting window closes.
//!
//! ## Architecture
//!
//! ```text
//! Member → HTTP API → Rate Limiter (per wallet)
//!                         ↓
//!                  Proposal Tracker ← Clock
//!                         ↓
//!            lifecycle / voting rules (pure)
//!                         ↓
//!     Proposal Store (conditional update by revision)
//!              ↙                    ↘
//!        in-memory               SQLite
//!
//! Sweeper (interval) → Proposal Tracker::sweep
//! ```
//!
//! ## Components
//!
//! - `proposal_types`: proposal, vote ledger and error types
//! - `lifecycle`: pass/fail decision and deadline evaluation
//! - `voting`: vote application and weight resolution
//! - `clock`: system and manual clocks
//! - `governance_config`: voting windows, thresholds, admin wallets
//! - `proposal_store`: store trait and in-memory store
//! - `proposal_persistence`: SQLite store
//! - `tracker`: service running the rules against a store
//! - `sweeper`: background settlement of expired proposals
//! - `governance_api`: HTTP API

pub mod proposal_types;
pub mod lifecycle;
pub mod voting;
pub mod clock;
pub mod governance_config;
pub mod proposal_store;
pub mod proposal_persistence;
pub mod tracker;
pub mod sweeper;
pub mod governance_api;

pub use proposal_types::*;
pub use voting::*;
pub use clock::*;
pub use governance_config::*;
pub use proposal_store::*;
pub use proposal_persistence::*;
pub use tracker::*;
pub use sweeper::*;
pub use governance_api::*;
