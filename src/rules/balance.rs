use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::BTreeMap;

use super::reporter::RateLimitedReporter;
use super::template::{DescriptionTemplate, TemplateError};
use super::{Agent, AgentError};
use crate::events::{BlockContext, Finding, FindingType, Severity};
use crate::listener::ChainDataProvider;
use crate::state::MonitorState;

pub const DEFAULT_COOLDOWN_SECS: u64 = 4 * 60 * 60;
pub const MIN_BALANCE_ALERT_ID: &str = "FORTA-6";
pub const MIN_BALANCE_NAME: &str = "Minimum Account Balance";
pub const MIN_BALANCE_DESCRIPTION: &str = "Account balance ({balance}) below threshold ({threshold})";

const TEMPLATE_ARGS: [&str; 3] = ["balance", "threshold", "account"];

/// Per block: alert when `account` holds less than `min_balance` wei, at
/// most once per cooldown window while the balance stays low.
#[derive(Debug, Clone)]
pub struct BalanceFloorAgent {
    account: Address,
    min_balance: U256,
    reporter: RateLimitedReporter,
    alert_id: String,
    finding_name: String,
    description: DescriptionTemplate,
    severity: Severity,
    finding_type: FindingType,
}

impl BalanceFloorAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        account: Address,
        min_balance: U256,
        cooldown_secs: u64,
        alert_id: impl Into<String>,
        finding_name: impl Into<String>,
        description: &str,
        severity: Severity,
        finding_type: FindingType,
    ) -> Result<Self, TemplateError> {
        let description = DescriptionTemplate::parse(description)?;
        let available: Vec<String> = TEMPLATE_ARGS.iter().map(|a| a.to_string()).collect();
        description.check_args(&available, "balance check")?;
        Ok(Self {
            account,
            min_balance,
            reporter: RateLimitedReporter::new(id, cooldown_secs),
            alert_id: alert_id.into(),
            finding_name: finding_name.into(),
            description,
            severity,
            finding_type,
        })
    }

    /// The defaults for a plain minimum-balance monitor.
    pub fn minimum_balance(account: Address, min_balance: U256) -> Result<Self, TemplateError> {
        Self::new(
            format!("min-balance-{account}"),
            account,
            min_balance,
            DEFAULT_COOLDOWN_SECS,
            MIN_BALANCE_ALERT_ID,
            MIN_BALANCE_NAME,
            MIN_BALANCE_DESCRIPTION,
            Severity::Info,
            FindingType::Suspicious,
        )
    }

    fn finding(&self, balance: U256) -> Result<Finding, AgentError> {
        let args: BTreeMap<String, String> = [
            ("balance", balance.to_string()),
            ("threshold", self.min_balance.to_string()),
            ("account", self.account.to_string()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let mut finding = Finding::new(
            self.finding_name.as_str(),
            self.description.render(&args)?,
            self.alert_id.as_str(),
            self.severity,
            self.finding_type,
        );
        finding.metadata = args;
        Ok(finding)
    }
}

#[async_trait]
impl Agent for BalanceFloorAgent {
    fn name(&self) -> &str {
        self.reporter.key()
    }

    async fn handle_block(
        &self,
        block: &BlockContext,
        chain: &dyn ChainDataProvider,
        state: &MonitorState,
    ) -> Result<Vec<Finding>, AgentError> {
        let balance = chain.balance_at(self.account, block.number).await?;
        let healthy = balance >= self.min_balance;
        let finding = self
            .reporter
            .observe(state, block.timestamp, healthy, || self.finding(balance))?;
        Ok(finding.into_iter().collect())
    }
}
