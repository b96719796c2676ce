// Library interface for Agora node components
// Allows testing and reuse of the governance service

pub mod config;
pub mod governance;
pub mod rate_limiter;
