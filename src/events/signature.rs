//! Human-readable event signatures and the selector table used to turn raw
//! logs into [`LogEntry`] values.

use alloy::dyn_abi::{DynSolValue, EventExt};
use alloy::json_abi::Event;
use alloy::primitives::{hex, Address, Log, B256};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

use super::{LogEntry, TransactionContext};

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("invalid event signature `{signature}`: {reason}")]
    Parse { signature: String, reason: String },
    #[error("anonymous events cannot be matched by selector: `{0}`")]
    Anonymous(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("log from {address} does not match `{event}`: {reason}")]
    Mismatch {
        address: Address,
        event: String,
        reason: String,
    },
}

/// A parsed `event Name(type [indexed] name, ...)` declaration.
#[derive(Debug, Clone)]
pub struct EventSignature {
    text: String,
    event: Event,
}

impl EventSignature {
    pub fn parse(text: &str) -> Result<Self, SignatureError> {
        let event = Event::parse(text.trim()).map_err(|e| SignatureError::Parse {
            signature: text.to_string(),
            reason: e.to_string(),
        })?;
        if event.anonymous {
            return Err(SignatureError::Anonymous(text.to_string()));
        }
        Ok(Self {
            text: text.trim().to_string(),
            event,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn name(&self) -> &str {
        &self.event.name
    }

    /// topic0 of every log emitted for this event.
    pub fn selector(&self) -> B256 {
        self.event.selector()
    }

    pub fn input_names(&self) -> Vec<String> {
        self.event
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| arg_name(i, &input.name))
            .collect()
    }

    pub fn decode(&self, log: &Log) -> Result<LogEntry, DecodeError> {
        self.decode_with_addresses(log).map(|(entry, _)| entry)
    }

    fn decode_with_addresses(&self, log: &Log) -> Result<(LogEntry, Vec<Address>), DecodeError> {
        let decoded = self
            .event
            .decode_log(&log.data, true)
            .map_err(|e| DecodeError::Mismatch {
                address: log.address,
                event: self.text.clone(),
                reason: e.to_string(),
            })?;

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let mut args = BTreeMap::new();
        let mut addresses = Vec::new();

        for (i, input) in self.event.inputs.iter().enumerate() {
            let value = if input.indexed { indexed.next() } else { body.next() };
            let Some(value) = value else {
                return Err(DecodeError::Mismatch {
                    address: log.address,
                    event: self.text.clone(),
                    reason: format!("missing value for input #{i}"),
                });
            };
            if let DynSolValue::Address(address) = &value {
                addresses.push(*address);
            }
            args.insert(arg_name(i, &input.name), render_value(&value));
        }

        let entry = LogEntry {
            address: log.address,
            selector: self.selector(),
            event_name: self.event.name.clone(),
            args,
        };
        Ok((entry, addresses))
    }
}

fn arg_name(index: usize, name: &str) -> String {
    if name.is_empty() {
        format!("arg{index}")
    } else {
        name.to_string()
    }
}

fn render_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(address) => address.to_string(),
        DynSolValue::Uint(v, _) => v.to_string(),
        DynSolValue::Int(v, _) => v.to_string(),
        DynSolValue::Bool(v) => v.to_string(),
        DynSolValue::FixedBytes(word, size) => hex::encode_prefixed(&word[..*size]),
        DynSolValue::Bytes(bytes) => hex::encode_prefixed(bytes),
        DynSolValue::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

/// Selector-keyed set of the events some agent cares about. Declarations
/// that share a selector but differ in which inputs are indexed (ERC-20 and
/// ERC-721 `Transfer`) are all kept and tried in registration order.
#[derive(Debug, Clone, Default)]
pub struct EventRegistry {
    events: HashMap<B256, Vec<EventSignature>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, signature: EventSignature) {
        let candidates = self.events.entry(signature.selector()).or_default();
        if !candidates.iter().any(|known| known.text() == signature.text()) {
            candidates.push(signature);
        }
    }

    pub fn len(&self) -> usize {
        self.events.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// `None` when the log's topic0 is not a registered event.
    pub fn decode(&self, log: &Log) -> Option<Result<LogEntry, DecodeError>> {
        self.decode_with_addresses(log)
            .map(|result| result.map(|(entry, _)| entry))
    }

    fn decode_with_addresses(&self, log: &Log) -> Option<Result<(LogEntry, Vec<Address>), DecodeError>> {
        let selector = log.data.topics().first()?;
        let candidates = self.events.get(selector)?;
        let mut last_error = None;
        for signature in candidates {
            match signature.decode_with_addresses(log) {
                Ok(decoded) => return Some(Ok(decoded)),
                Err(e) => last_error = Some(e),
            }
        }
        last_error.map(Err)
    }

    /// Builds the per-transaction view from one transaction's raw logs.
    /// Logs that are unknown or fail to decode still mark their emitter as
    /// involved.
    pub fn assemble(&self, hash: B256, block_number: u64, logs: &[Log]) -> TransactionContext {
        let mut involved = HashSet::new();
        let mut entries = Vec::new();

        for log in logs {
            involved.insert(log.address);
            let Some(decoded) = self.decode_with_addresses(log) else {
                debug!(address = %log.address, "Skipping log with unregistered signature");
                continue;
            };
            match decoded {
                Ok((entry, addresses)) => {
                    involved.extend(addresses);
                    entries.push(entry);
                }
                Err(e) => warn!(tx = %hash, "Failed to decode log: {}", e),
            }
        }

        TransactionContext {
            hash,
            block_number,
            involved_addresses: involved,
            logs: entries,
        }
    }
}
