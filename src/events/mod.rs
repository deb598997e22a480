use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

pub mod signature;

pub use signature::{DecodeError, EventRegistry, EventSignature, SignatureError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Info" => Ok(Severity::Info),
            "Low" => Ok(Severity::Low),
            "Medium" => Ok(Severity::Medium),
            "High" => Ok(Severity::High),
            "Critical" => Ok(Severity::Critical),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FindingType {
    Info,
    Suspicious,
    Degraded,
    Exploit,
}

impl FromStr for FindingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Info" => Ok(FindingType::Info),
            "Suspicious" => Ok(FindingType::Suspicious),
            "Degraded" => Ok(FindingType::Degraded),
            "Exploit" => Ok(FindingType::Exploit),
            other => Err(other.to_string()),
        }
    }
}

pub const DEFAULT_PROTOCOL: &str = "ethereum";

/// Structured alert handed to the emitter. Built once, never mutated after
/// it leaves the agent that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub name: String,
    pub description: String,
    pub alert_id: String,
    pub protocol: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub metadata: BTreeMap<String, String>,
}

impl Finding {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        alert_id: impl Into<String>,
        severity: Severity,
        finding_type: FindingType,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            alert_id: alert_id.into(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            severity,
            finding_type,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.alert_id, self.name, self.description)
    }
}

/// One decoded log. Argument values are rendered to strings at decode time
/// (decimal for integers, checksummed hex for addresses, 0x-hex for bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: Address,
    pub selector: B256,
    pub event_name: String,
    pub args: BTreeMap<String, String>,
}

impl LogEntry {
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionContext {
    pub hash: B256,
    pub block_number: u64,
    pub involved_addresses: HashSet<Address>,
    pub logs: Vec<LogEntry>,
}

impl TransactionContext {
    pub fn involves(&self, address: &Address) -> bool {
        self.involved_addresses.contains(address)
    }

    /// Logs emitted by `address` for the event behind `signature`, in log order.
    pub fn filter_logs<'a>(
        &'a self,
        signature: &'a EventSignature,
        address: Address,
    ) -> impl Iterator<Item = &'a LogEntry> + 'a {
        let selector = signature.selector();
        self.logs
            .iter()
            .filter(move |log| log.address == address && log.selector == selector)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    pub number: u64,
    pub timestamp: u64,
}

/// Unit of work flowing from the chain watcher to the orchestrator.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    Block(BlockContext),
    Transaction(TransactionContext),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_parses_strictly() {
        assert_eq!("Critical".parse::<Severity>(), Ok(Severity::Critical));
        assert_eq!("Info".parse::<Severity>(), Ok(Severity::Info));
        assert!("critical".parse::<Severity>().is_err());
        assert!("Severe".parse::<Severity>().is_err());
    }

    #[test]
    fn finding_serializes_with_forta_field_names() {
        let finding = Finding::new("n", "d", "FORTA-1", Severity::Low, FindingType::Info)
            .with_metadata("to", "0xdef");
        let json = serde_json::to_value(&finding).unwrap();

        assert_eq!(json["alertId"], "FORTA-1");
        assert_eq!(json["type"], "Info");
        assert_eq!(json["protocol"], "ethereum");
        assert_eq!(json["metadata"]["to"], "0xdef");
    }
}
