//! Test doubles shared by the unit tests.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::events::{EventSignature, LogEntry, TransactionContext};
use crate::listener::{ChainDataProvider, ProviderError};

pub fn addr(n: u8) -> Address {
    Address::with_last_byte(n)
}

pub fn entry(signature: &EventSignature, address: Address, args: &[(&str, &str)]) -> LogEntry {
    LogEntry {
        address,
        selector: signature.selector(),
        event_name: signature.name().to_string(),
        args: args
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    }
}

pub fn transaction(block_number: u64, involved: &[Address], logs: Vec<LogEntry>) -> TransactionContext {
    TransactionContext {
        hash: B256::repeat_byte(0x11),
        block_number,
        involved_addresses: involved.iter().copied().collect::<HashSet<_>>(),
        logs,
    }
}

/// Scripted chain: answers only what the test put in, records every query.
#[derive(Debug, Default)]
pub struct MockChain {
    balances: HashMap<(Address, u64), U256>,
    pooled: HashMap<(Address, u64), U256>,
    vaults: HashMap<(Address, u64), U256>,
    calls: Mutex<Vec<(&'static str, Address, u64)>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(mut self, account: Address, block: u64, balance: U256) -> Self {
        self.balances.insert((account, block), balance);
        self
    }

    pub fn with_pooled(mut self, contract: Address, block: u64, total: U256) -> Self {
        self.pooled.insert((contract, block), total);
        self
    }

    pub fn with_vault_balance(mut self, vault: Address, block: u64, balance: U256) -> Self {
        self.vaults.insert((vault, block), balance);
        self
    }

    pub fn calls(&self) -> Vec<(&'static str, Address, u64)> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(
        &self,
        table: &HashMap<(Address, u64), U256>,
        query: &'static str,
        address: Address,
        block: u64,
    ) -> Result<U256, ProviderError> {
        self.calls.lock().unwrap().push((query, address, block));
        table.get(&(address, block)).copied().ok_or(ProviderError::Query {
            query,
            block,
            message: format!("no scripted value for {address}"),
        })
    }
}

#[async_trait]
impl ChainDataProvider for MockChain {
    async fn balance_at(&self, account: Address, block: u64) -> Result<U256, ProviderError> {
        self.lookup(&self.balances, "balance", account, block)
    }

    async fn total_pooled_ether_at(&self, contract: Address, block: u64) -> Result<U256, ProviderError> {
        self.lookup(&self.pooled, "pooled", contract, block)
    }

    async fn vault_balance_at(&self, vault: Address, block: u64) -> Result<U256, ProviderError> {
        self.lookup(&self.vaults, "vault_balance", vault, block)
    }
}
