use alloy::primitives::Address;
use async_trait::async_trait;

use super::template::{DescriptionTemplate, TemplateError};
use super::{Agent, AgentError};
use crate::events::{EventSignature, Finding, FindingType, Severity, TransactionContext};
use crate::listener::ChainDataProvider;
use crate::state::MonitorState;

/// An event of interest: which contract, which event, and how to describe a
/// hit. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct EventDescriptor {
    pub contract_address: Address,
    pub signature: EventSignature,
    pub alert_id: String,
    pub name: String,
    pub description: DescriptionTemplate,
    pub severity: Severity,
    pub finding_type: FindingType,
}

impl EventDescriptor {
    /// Compiles `description` and checks its placeholders against the event
    /// inputs.
    pub fn new(
        contract_address: Address,
        signature: EventSignature,
        alert_id: impl Into<String>,
        name: impl Into<String>,
        description: &str,
        severity: Severity,
        finding_type: FindingType,
    ) -> Result<Self, TemplateError> {
        let description = DescriptionTemplate::parse(description)?;
        description.check_args(&signature.input_names(), signature.name())?;
        Ok(Self {
            contract_address,
            signature,
            alert_id: alert_id.into(),
            name: name.into(),
            description,
            severity,
            finding_type,
        })
    }
}

/// Turns configured events of interest into findings. Descriptor order is
/// preserved; within a descriptor, log order is preserved.
#[derive(Debug, Clone, Default)]
pub struct EventMatcher {
    descriptors: Vec<EventDescriptor>,
}

impl EventMatcher {
    pub fn new(descriptors: Vec<EventDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn matches(&self, tx: &TransactionContext) -> Result<Vec<Finding>, AgentError> {
        let mut findings = Vec::new();
        for descriptor in &self.descriptors {
            if !tx.involves(&descriptor.contract_address) {
                continue;
            }
            for log in tx.filter_logs(&descriptor.signature, descriptor.contract_address) {
                let description = descriptor.description.render(&log.args)?;
                let mut finding = Finding::new(
                    descriptor.name.as_str(),
                    description,
                    descriptor.alert_id.as_str(),
                    descriptor.severity,
                    descriptor.finding_type,
                );
                finding.metadata = log.args.clone();
                findings.push(finding);
            }
        }
        Ok(findings)
    }
}

#[async_trait]
impl Agent for EventMatcher {
    fn name(&self) -> &str {
        "event-matcher"
    }

    fn signatures(&self) -> Vec<EventSignature> {
        self.descriptors.iter().map(|d| d.signature.clone()).collect()
    }

    fn watched_addresses(&self) -> Vec<Address> {
        self.descriptors.iter().map(|d| d.contract_address).collect()
    }

    async fn handle_transaction(
        &self,
        tx: &TransactionContext,
        _chain: &dyn ChainDataProvider,
        _state: &MonitorState,
    ) -> Result<Vec<Finding>, AgentError> {
        self.matches(tx)
    }
}
