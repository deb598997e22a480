use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use super::threshold::ThresholdEvaluator;
use super::{Agent, AgentError};
use crate::events::{
    EventSignature, Finding, FindingType, LogEntry, Severity, SignatureError, TransactionContext,
};
use crate::listener::ChainDataProvider;
use crate::state::MonitorState;

pub const ERC20_TRANSFER_EVENT: &str =
    "event Transfer(address indexed from, address indexed to, uint256 value)";
pub const LARGE_TRANSFER_ALERT_ID: &str = "FORTA-1";

/// Flags ERC-20 transfers of one token whose normalized value is above a
/// fixed threshold.
#[derive(Debug, Clone)]
pub struct LargeTransferAgent {
    name: String,
    symbol: String,
    token: Address,
    transfer: EventSignature,
    evaluator: ThresholdEvaluator,
    alert_id: String,
    severity: Severity,
}

impl LargeTransferAgent {
    pub fn new(
        symbol: impl Into<String>,
        token: Address,
        evaluator: ThresholdEvaluator,
        alert_id: impl Into<String>,
        severity: Severity,
    ) -> Result<Self, SignatureError> {
        let symbol = symbol.into();
        Ok(Self {
            name: format!("large-transfer-{}", symbol.to_lowercase()),
            symbol,
            token,
            transfer: EventSignature::parse(ERC20_TRANSFER_EVENT)?,
            evaluator,
            alert_id: alert_id.into(),
            severity,
        })
    }

    fn arg<'a>(&self, log: &'a LogEntry, arg: &str) -> Result<&'a str, AgentError> {
        log.arg(arg).ok_or_else(|| AgentError::BadArgument {
            event: log.event_name.clone(),
            address: log.address,
            arg: arg.to_string(),
        })
    }

    pub fn evaluate(&self, tx: &TransactionContext) -> Result<Vec<Finding>, AgentError> {
        let mut findings = Vec::new();
        for log in tx.filter_logs(&self.transfer, self.token) {
            let value: U256 = self
                .arg(log, "value")?
                .parse()
                .map_err(|_| AgentError::BadArgument {
                    event: log.event_name.clone(),
                    address: log.address,
                    arg: "value".to_string(),
                })?;
            let outcome = self.evaluator.evaluate(value)?;
            if !outcome.exceeded {
                continue;
            }

            findings.push(
                Finding::new(
                    format!("High {} Transfer", self.symbol),
                    format!("High amount of {} transferred: {}", self.symbol, outcome.normalized),
                    self.alert_id.as_str(),
                    self.severity,
                    FindingType::Info,
                )
                .with_metadata("to", self.arg(log, "to")?)
                .with_metadata("from", self.arg(log, "from")?),
            );
        }
        Ok(findings)
    }
}

#[async_trait]
impl Agent for LargeTransferAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn signatures(&self) -> Vec<EventSignature> {
        vec![self.transfer.clone()]
    }

    fn watched_addresses(&self) -> Vec<Address> {
        vec![self.token]
    }

    async fn handle_transaction(
        &self,
        tx: &TransactionContext,
        _chain: &dyn ChainDataProvider,
        _state: &MonitorState,
    ) -> Result<Vec<Finding>, AgentError> {
        self.evaluate(tx)
    }
}
