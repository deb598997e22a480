//! Per-transaction and per-block EVM monitoring agents that turn on-chain
//! events and state into structured findings.

pub mod alerts;
pub mod config;
pub mod events;
pub mod listener;
pub mod rules;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::{AppConfig, SetupError};
pub use events::{BlockContext, ChainEvent, Finding, FindingType, LogEntry, Severity, TransactionContext};
pub use rules::{Agent, AgentEngine, AgentError, HandlerReport};
pub use state::MonitorState;
