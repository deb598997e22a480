use alloy::primitives::{Address, I256, U256};
use async_trait::async_trait;

use super::{Agent, AgentError};
use crate::events::{EventSignature, Finding, FindingType, LogEntry, Severity, TransactionContext};
use crate::listener::ChainDataProvider;
use crate::state::MonitorState;

pub const AAVE_V2_FLASH_LOAN_EVENT: &str = "event FlashLoan(address indexed target, address indexed initiator, address indexed asset, uint256 amount, uint256 premium, uint16 referralCode)";
pub const FLASH_LOAN_ALERT_ID: &str = "FORTA-5";
pub const FLASH_LOAN_PROTOCOL: &str = "aave";

/// Flags a transaction that takes a flash loan from `lending_pool` while the
/// `target` vault's `balance()` drops by at least `threshold` units.
#[derive(Debug, Clone)]
pub struct FlashLoanLossAgent {
    lending_pool: Address,
    target: Address,
    flash_loan: EventSignature,
    threshold: U256,
    protocol: String,
    alert_id: String,
}

impl FlashLoanLossAgent {
    pub fn new(
        lending_pool: Address,
        target: Address,
        flash_loan: EventSignature,
        threshold: U256,
        protocol: impl Into<String>,
        alert_id: impl Into<String>,
    ) -> Self {
        Self {
            lending_pool,
            target,
            flash_loan,
            threshold,
            protocol: protocol.into(),
            alert_id: alert_id.into(),
        }
    }

    /// Signed `current - previous`.
    pub fn balance_diff(current: U256, previous: U256) -> Result<I256, AgentError> {
        let signed = |v: U256| I256::try_from(v).map_err(|_| AgentError::Delta(v.to_string()));
        signed(current)?
            .checked_sub(signed(previous)?)
            .ok_or_else(|| AgentError::Delta(format!("{current} - {previous}")))
    }
}

#[async_trait]
impl Agent for FlashLoanLossAgent {
    fn name(&self) -> &str {
        "flash-loan-loss"
    }

    fn signatures(&self) -> Vec<EventSignature> {
        vec![self.flash_loan.clone()]
    }

    fn watched_addresses(&self) -> Vec<Address> {
        vec![self.lending_pool, self.target]
    }

    async fn handle_transaction(
        &self,
        tx: &TransactionContext,
        chain: &dyn ChainDataProvider,
        _state: &MonitorState,
    ) -> Result<Vec<Finding>, AgentError> {
        if !tx.involves(&self.lending_pool) || !tx.involves(&self.target) {
            return Ok(Vec::new());
        }
        let loans: Vec<&LogEntry> = tx.filter_logs(&self.flash_loan, self.lending_pool).collect();
        if loans.is_empty() {
            return Ok(Vec::new());
        }

        let block = tx.block_number;
        let (current, previous) = tokio::try_join!(
            chain.vault_balance_at(self.target, block),
            chain.vault_balance_at(self.target, block.saturating_sub(1)),
        )?;

        let diff = Self::balance_diff(current, previous)?;
        if !diff.is_negative() || diff.unsigned_abs() < self.threshold {
            return Ok(Vec::new());
        }

        let finding = Finding::new(
            "Flash Loan with Loss",
            format!("Flash Loan with loss of {diff} detected for {}", self.target),
            self.alert_id.as_str(),
            Severity::High,
            FindingType::Suspicious,
        )
        .with_protocol(self.protocol.as_str())
        .with_metadata("protocolAddress", self.target.to_string())
        .with_metadata("balanceDiff", diff.to_string())
        .with_metadata("loans", serde_json::to_string(&loans)?);

        Ok(vec![finding])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{addr, entry, transaction, MockChain};

    const BLOCK: u64 = 100;

    fn aave() -> Address {
        addr(0x7d)
    }

    fn vault() -> Address {
        addr(0xac)
    }

    fn signature() -> EventSignature {
        EventSignature::parse(AAVE_V2_FLASH_LOAN_EVENT).unwrap()
    }

    fn agent() -> FlashLoanLossAgent {
        FlashLoanLossAgent::new(
            aave(),
            vault(),
            signature(),
            "200000000000000000000".parse().unwrap(),
            FLASH_LOAN_PROTOCOL,
            FLASH_LOAN_ALERT_ID,
        )
    }

    fn loan() -> LogEntry {
        entry(
            &signature(),
            aave(),
            &[("target", "0x01"), ("amount", "1000"), ("premium", "9")],
        )
    }

    fn chain(current: &str, previous: &str) -> MockChain {
        MockChain::new()
            .with_vault_balance(vault(), BLOCK, current.parse().unwrap())
            .with_vault_balance(vault(), BLOCK - 1, previous.parse().unwrap())
    }

    #[tokio::test]
    async fn no_findings_when_lending_pool_not_involved() {
        let tx = transaction(BLOCK, &[vault()], vec![loan()]);
        let chain = MockChain::new();

        let findings = agent().handle_transaction(&tx, &chain, &MonitorState::new()).await.unwrap();

        assert!(findings.is_empty());
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn no_findings_without_flash_loan() {
        let tx = transaction(BLOCK, &[aave(), vault()], vec![]);
        let chain = MockChain::new();

        let findings = agent().handle_transaction(&tx, &chain, &MonitorState::new()).await.unwrap();

        assert!(findings.is_empty());
        assert!(chain.calls().is_empty());
    }

    #[tokio::test]
    async fn reports_flash_loan_with_loss() {
        let tx = transaction(BLOCK, &[aave(), vault()], vec![loan()]);
        let chain = chain("1", "200000000000000000001");

        let findings = agent().handle_transaction(&tx, &chain, &MonitorState::new()).await.unwrap();

        let mut calls = chain.calls();
        calls.sort_by_key(|c| std::cmp::Reverse(c.2));
        assert_eq!(
            calls,
            vec![("vault_balance", vault(), BLOCK), ("vault_balance", vault(), BLOCK - 1)]
        );

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.name, "Flash Loan with Loss");
        assert_eq!(
            finding.description,
            format!("Flash Loan with loss of -200000000000000000000 detected for {}", vault())
        );
        assert_eq!(finding.alert_id, "FORTA-5");
        assert_eq!(finding.protocol, "aave");
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.finding_type, FindingType::Suspicious);
        assert_eq!(
            finding.metadata.get("balanceDiff").map(String::as_str),
            Some("-200000000000000000000")
        );
        assert_eq!(
            finding.metadata.get("protocolAddress"),
            Some(&vault().to_string())
        );
        assert_eq!(
            finding.metadata.get("loans"),
            Some(&serde_json::to_string(&vec![loan()]).unwrap())
        );
    }

    #[tokio::test]
    async fn small_loss_or_gain_is_ignored() {
        let tx = transaction(BLOCK, &[aave(), vault()], vec![loan()]);
        let state = MonitorState::new();

        let small = chain("2", "200000000000000000001");
        assert!(agent().handle_transaction(&tx, &small, &state).await.unwrap().is_empty());

        let gain = chain("300000000000000000000", "1");
        assert!(agent().handle_transaction(&tx, &gain, &state).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn balance_failure_propagates() {
        let tx = transaction(BLOCK, &[aave(), vault()], vec![loan()]);
        let chain = MockChain::new().with_vault_balance(vault(), BLOCK, U256::from(1u8));

        let result = agent().handle_transaction(&tx, &chain, &MonitorState::new()).await;

        assert!(matches!(result, Err(AgentError::Provider(_))));
    }

    #[tokio::test]
    async fn loss_is_measured_on_vault_holdings_not_native_balance() {
        let tx = transaction(BLOCK, &[aave(), vault()], vec![loan()]);
        let chain = chain("1", "200000000000000000001")
            .with_balance(vault(), BLOCK, U256::ZERO)
            .with_balance(vault(), BLOCK - 1, U256::ZERO);

        let findings = agent().handle_transaction(&tx, &chain, &MonitorState::new()).await.unwrap();

        assert_eq!(findings.len(), 1);
        assert!(chain.calls().iter().all(|(query, _, _)| *query == "vault_balance"));
    }

    #[test]
    fn balance_diff_is_signed() {
        let u = |s: &str| s.parse::<U256>().unwrap();
        let diff = FlashLoanLossAgent::balance_diff(u("1"), u("200000000000000000001")).unwrap();
        assert_eq!(diff.to_string(), "-200000000000000000000");
        assert!(FlashLoanLossAgent::balance_diff(U256::MAX, U256::ZERO).is_err());
    }
}
