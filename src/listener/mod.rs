use alloy::primitives::{Address, Log as PrimitiveLog, B256, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider, WsConnect};
use alloy::pubsub::PubSubFrontend;
use alloy::rpc::types::{BlockId, Filter, Log};
use alloy::sol;
use async_trait::async_trait;
use eyre::Result;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::events::{BlockContext, ChainEvent, EventRegistry};

sol! {
    #[sol(rpc)]
    interface ILido {
        function getTotalPooledEther() external view returns (uint256);
    }

    #[sol(rpc)]
    interface IVault {
        function balance() external view returns (uint256);
    }
}

pub type WsProvider = RootProvider<PubSubFrontend>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{query} at block {block} failed: {message}")]
    Query {
        query: &'static str,
        block: u64,
        message: String,
    },
}

/// Point-in-time chain queries the agents depend on.
#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    async fn balance_at(&self, account: Address, block: u64) -> Result<U256, ProviderError>;

    async fn total_pooled_ether_at(&self, contract: Address, block: u64) -> Result<U256, ProviderError>;

    /// Underlying assets held by a yield vault, as reported by its `balance()`.
    async fn vault_balance_at(&self, vault: Address, block: u64) -> Result<U256, ProviderError>;
}

pub async fn connect(rpc_url: &str) -> Result<WsProvider> {
    let url = Url::parse(rpc_url)?;
    let ws = WsConnect::new(url);
    let provider = ProviderBuilder::new().on_ws(ws).await?;
    Ok(provider)
}

#[derive(Clone)]
pub struct RpcChain {
    provider: WsProvider,
}

impl RpcChain {
    pub fn new(provider: WsProvider) -> Self {
        Self { provider }
    }

    pub async fn latest_block(&self) -> Result<u64> {
        Ok(self.provider.get_block_number().await?)
    }
}

#[async_trait]
impl ChainDataProvider for RpcChain {
    async fn balance_at(&self, account: Address, block: u64) -> Result<U256, ProviderError> {
        self.provider
            .get_balance(account)
            .block_id(BlockId::number(block))
            .await
            .map_err(|e| ProviderError::Query {
                query: "eth_getBalance",
                block,
                message: e.to_string(),
            })
    }

    async fn total_pooled_ether_at(&self, contract: Address, block: u64) -> Result<U256, ProviderError> {
        let lido = ILido::new(contract, self.provider.clone());
        let result = lido
            .getTotalPooledEther()
            .block(BlockId::number(block))
            .call()
            .await
            .map_err(|e| ProviderError::Query {
                query: "getTotalPooledEther",
                block,
                message: e.to_string(),
            })?;
        Ok(result._0)
    }

    async fn vault_balance_at(&self, vault: Address, block: u64) -> Result<U256, ProviderError> {
        let contract = IVault::new(vault, self.provider.clone());
        let result = contract
            .balance()
            .block(BlockId::number(block))
            .call()
            .await
            .map_err(|e| ProviderError::Query {
                query: "balance",
                block,
                message: e.to_string(),
            })?;
        Ok(result._0)
    }
}

/// Splits a block's logs into per-transaction batches, keeping the order in
/// which each transaction first appears and the log order inside it.
pub fn group_by_transaction(logs: Vec<Log>) -> Vec<(B256, Vec<PrimitiveLog>)> {
    let mut groups: Vec<(B256, Vec<PrimitiveLog>)> = Vec::new();
    let mut index: HashMap<B256, usize> = HashMap::new();

    for log in logs {
        let Some(hash) = log.transaction_hash else {
            debug!("Skipping pending log without transaction hash");
            continue;
        };
        let slot = *index.entry(hash).or_insert_with(|| {
            groups.push((hash, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(log.inner);
    }

    groups
}

/// Runs `fetch` a second time if the first attempt fails. A second failure
/// drops the block's transactions and is reported at `error`.
pub async fn retry_once<T, E, F, Fut>(block: u64, mut fetch: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match fetch().await {
        Ok(value) => return Some(value),
        Err(e) => warn!(block, "Failed to fetch logs, retrying: {}", e),
    }
    match fetch().await {
        Ok(value) => Some(value),
        Err(e) => {
            error!(block, "Transactions of block {} skipped, logs unavailable: {}", block, e);
            None
        }
    }
}

/// Publishes every new block, then one unit per transaction that touched a
/// watched address. Runs until the subscription ends.
pub async fn watch_chain(
    provider: Arc<WsProvider>,
    registry: Arc<EventRegistry>,
    addresses: Vec<Address>,
    tx: Sender<ChainEvent>,
) -> Result<()> {
    let sub = provider.subscribe_blocks().await?;
    let mut stream = sub.into_stream();

    while let Some(block) = stream.next().await {
        let Some(number) = block.header.number else {
            warn!("Received block header without a number");
            continue;
        };
        let context = BlockContext {
            number,
            timestamp: block.header.timestamp,
        };
        info!("New Block: {}", number);
        tx.send(ChainEvent::Block(context)).await?;

        if addresses.is_empty() {
            continue;
        }

        let filter = Filter::new()
            .address(addresses.clone())
            .from_block(number)
            .to_block(number);
        let Some(logs) = retry_once(number, || provider.get_logs(&filter)).await else {
            continue;
        };

        for (hash, batch) in group_by_transaction(logs) {
            let context = registry.assemble(hash, number, &batch);
            debug!(tx = %hash, logs = context.logs.len(), "Dispatching transaction");
            tx.send(ChainEvent::Transaction(context)).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, Bytes};

    fn rpc_log(tx: Option<B256>, emitter: Address) -> Log {
        Log {
            inner: PrimitiveLog::new_unchecked(emitter, vec![B256::ZERO], Bytes::new()),
            transaction_hash: tx,
            ..Default::default()
        }
    }

    #[test]
    fn groups_logs_by_transaction_in_arrival_order() {
        let a = B256::repeat_byte(0xaa);
        let b = B256::repeat_byte(0xbb);
        let first = address!("0000000000000000000000000000000000000001");
        let second = address!("0000000000000000000000000000000000000002");
        let third = address!("0000000000000000000000000000000000000003");

        let groups = group_by_transaction(vec![
            rpc_log(Some(b), first),
            rpc_log(Some(a), second),
            rpc_log(None, second),
            rpc_log(Some(b), third),
        ]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, b);
        let emitters: Vec<_> = groups[0].1.iter().map(|l| l.address).collect();
        assert_eq!(emitters, vec![first, third]);
        assert_eq!(groups[1].0, a);
        assert_eq!(groups[1].1.len(), 1);
    }

    #[tokio::test]
    async fn log_fetch_is_retried_once() {
        let attempts = std::cell::Cell::new(0);
        let fetched = retry_once(9, || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                if n == 1 {
                    Err("connection reset")
                } else {
                    Ok(vec![n])
                }
            }
        })
        .await;
        assert_eq!(fetched, Some(vec![2]));
        assert_eq!(attempts.get(), 2);

        let attempts = std::cell::Cell::new(0);
        let failed: Option<()> = retry_once(9, || {
            attempts.set(attempts.get() + 1);
            async { Err::<(), _>("timeout") }
        })
        .await;
        assert_eq!(failed, None);
        assert_eq!(attempts.get(), 2);
    }
}
