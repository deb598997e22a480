use alloy::primitives::Address;
use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::events::{BlockContext, EventRegistry, EventSignature, Finding, TransactionContext};
use crate::listener::{ChainDataProvider, ProviderError};
use crate::state::MonitorState;

pub mod balance;
pub mod flash_loan;
pub mod matcher;
pub mod pooled;
pub mod reporter;
pub mod template;
pub mod threshold;
pub mod transfer;

pub use balance::BalanceFloorAgent;
pub use flash_loan::FlashLoanLossAgent;
pub use matcher::{EventDescriptor, EventMatcher};
pub use pooled::PooledEtherAgent;
pub use reporter::RateLimitedReporter;
pub use template::{DescriptionTemplate, TemplateError};
pub use threshold::{normalize, AmountError, ThresholdEvaluator, TokenAmount};
pub use transfer::LargeTransferAgent;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("{event} log from {address} has no usable `{arg}` argument")]
    BadArgument {
        event: String,
        address: Address,
        arg: String,
    },
    #[error("balance delta out of range: {0}")]
    Delta(String),
    #[error("failed to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
#[error("agent `{agent}` failed: {error}")]
pub struct AgentFailure {
    pub agent: String,
    #[source]
    pub error: AgentError,
}

/// A per-transaction / per-block handler. Chain access and shared state are
/// passed in on every call so tests can hand in doubles.
#[async_trait]
pub trait Agent: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Events this agent needs decoded.
    fn signatures(&self) -> Vec<EventSignature> {
        Vec::new()
    }

    /// Contracts whose logs this agent needs to see.
    fn watched_addresses(&self) -> Vec<Address> {
        Vec::new()
    }

    async fn initialize(
        &self,
        _block: u64,
        _chain: &dyn ChainDataProvider,
        _state: &MonitorState,
    ) -> Result<(), AgentError> {
        Ok(())
    }

    async fn handle_transaction(
        &self,
        _tx: &TransactionContext,
        _chain: &dyn ChainDataProvider,
        _state: &MonitorState,
    ) -> Result<Vec<Finding>, AgentError> {
        Ok(Vec::new())
    }

    async fn handle_block(
        &self,
        _block: &BlockContext,
        _chain: &dyn ChainDataProvider,
        _state: &MonitorState,
    ) -> Result<Vec<Finding>, AgentError> {
        Ok(Vec::new())
    }
}

/// Findings and failures for one unit of work. A failing agent never hides
/// the findings of the others.
#[derive(Debug, Default)]
pub struct HandlerReport {
    pub findings: Vec<Finding>,
    pub failures: Vec<AgentFailure>,
}

impl HandlerReport {
    fn record(&mut self, agent: &dyn Agent, result: Result<Vec<Finding>, AgentError>) {
        match result {
            Ok(findings) => {
                if !findings.is_empty() {
                    debug!(agent = agent.name(), count = findings.len(), "Agent produced findings");
                }
                self.findings.extend(findings);
            }
            Err(e) => {
                error!(agent = agent.name(), "Agent failed: {}", e);
                self.failures.push(AgentFailure {
                    agent: agent.name().to_string(),
                    error: e,
                });
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct AgentEngine {
    agents: Vec<Box<dyn Agent>>,
}

impl AgentEngine {
    pub fn new() -> Self {
        Self { agents: Vec::new() }
    }

    pub fn add_agent(&mut self, agent: Box<dyn Agent>) {
        info!(agent = agent.name(), "Registered agent");
        self.agents.push(agent);
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn registry(&self) -> EventRegistry {
        let mut registry = EventRegistry::new();
        for signature in self.agents.iter().flat_map(|a| a.signatures()) {
            registry.register(signature);
        }
        registry
    }

    pub fn watched_addresses(&self) -> Vec<Address> {
        let mut addresses = Vec::new();
        for address in self.agents.iter().flat_map(|a| a.watched_addresses()) {
            if !addresses.contains(&address) {
                addresses.push(address);
            }
        }
        addresses
    }

    /// Stops at the first failure: an agent that cannot read its baseline must
    /// not start processing.
    pub async fn initialize(
        &self,
        block: u64,
        chain: &dyn ChainDataProvider,
        state: &MonitorState,
    ) -> Result<(), AgentFailure> {
        for agent in &self.agents {
            agent
                .initialize(block, chain, state)
                .await
                .map_err(|error| AgentFailure {
                    agent: agent.name().to_string(),
                    error,
                })?;
        }
        Ok(())
    }

    pub async fn process_transaction(
        &self,
        tx: &TransactionContext,
        chain: &dyn ChainDataProvider,
        state: &MonitorState,
    ) -> HandlerReport {
        let mut report = HandlerReport::default();
        for agent in &self.agents {
            let result = agent.handle_transaction(tx, chain, state).await;
            report.record(agent.as_ref(), result);
        }
        report
    }

    pub async fn process_block(
        &self,
        block: &BlockContext,
        chain: &dyn ChainDataProvider,
        state: &MonitorState,
    ) -> HandlerReport {
        let mut report = HandlerReport::default();
        for agent in &self.agents {
            let result = agent.handle_block(block, chain, state).await;
            report.record(agent.as_ref(), result);
        }
        report
    }
}
