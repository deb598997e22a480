use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use tracing::info;

use super::threshold::{AmountError, TokenAmount};
use super::{Agent, AgentError};
use crate::events::{BlockContext, Finding, FindingType, Severity};
use crate::listener::ChainDataProvider;
use crate::state::{MonitorState, TrackedChange};

pub const POOLED_ETHER_ALERT_ID: &str = "TOTAL-POOLED-ETH-INCREASED";

const ETH_DECIMALS: u8 = 18;

/// Tracks a staking contract's `getTotalPooledEther()` and reports every
/// block in which it rises above the highest value seen so far.
#[derive(Debug, Clone)]
pub struct PooledEtherAgent {
    contract: Address,
    key: String,
    alert_id: String,
}

impl PooledEtherAgent {
    pub fn new(contract: Address, alert_id: impl Into<String>) -> Self {
        Self {
            contract,
            key: format!("pooled-ether-{contract}"),
            alert_id: alert_id.into(),
        }
    }

    fn finding(&self, previous: U256, current: U256) -> Result<Finding, AgentError> {
        let eth = |raw: U256| -> Result<String, AmountError> {
            TokenAmount::new(raw, ETH_DECIMALS)?.to_fixed(2)
        };
        Ok(Finding::new(
            "Total pooled ETH increased",
            format!(
                "Total pooled Ether increased from {} ETH to {} ETH",
                eth(previous)?,
                eth(current)?
            ),
            self.alert_id.as_str(),
            Severity::Info,
            FindingType::Info,
        )
        .with_metadata("prevTotalPooledEther", previous.to_string())
        .with_metadata("newTotalPooledEther", current.to_string()))
    }
}

#[async_trait]
impl Agent for PooledEtherAgent {
    fn name(&self) -> &str {
        &self.key
    }

    async fn initialize(
        &self,
        block: u64,
        chain: &dyn ChainDataProvider,
        state: &MonitorState,
    ) -> Result<(), AgentError> {
        let total = chain.total_pooled_ether_at(self.contract, block).await?;
        state.set_tracked(&self.key, total);
        info!(contract = %self.contract, block, %total, "Total pooled ether baseline");
        Ok(())
    }

    async fn handle_block(
        &self,
        block: &BlockContext,
        chain: &dyn ChainDataProvider,
        state: &MonitorState,
    ) -> Result<Vec<Finding>, AgentError> {
        let total = chain.total_pooled_ether_at(self.contract, block.number).await?;
        match state.raise_tracked(&self.key, total) {
            TrackedChange::Increased { previous } => Ok(vec![self.finding(previous, total)?]),
            TrackedChange::Initialized | TrackedChange::Unchanged => Ok(Vec::new()),
        }
    }
}
