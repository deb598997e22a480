use alloy::primitives::{Address, U256};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;
use std::collections::HashSet;
use std::str::FromStr;
use thiserror::Error;

use crate::events::{EventSignature, FindingType, Severity, SignatureError};
use crate::rules::balance::{
    DEFAULT_COOLDOWN_SECS, MIN_BALANCE_ALERT_ID, MIN_BALANCE_DESCRIPTION, MIN_BALANCE_NAME,
};
use crate::rules::flash_loan::{AAVE_V2_FLASH_LOAN_EVENT, FLASH_LOAN_ALERT_ID, FLASH_LOAN_PROTOCOL};
use crate::rules::pooled::POOLED_ETHER_ALERT_ID;
use crate::rules::transfer::LARGE_TRANSFER_ALERT_ID;
use crate::rules::{
    AgentEngine, AmountError, BalanceFloorAgent, EventDescriptor, EventMatcher, FlashLoanLossAgent,
    LargeTransferAgent, PooledEtherAgent, TemplateError, ThresholdEvaluator,
};

/// Everything that makes a configuration unusable. Any of these stops the
/// process before the first block is handled.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("`{0}` must be set")]
    Missing(String),
    #[error("`{field}` is not an address: `{value}`")]
    Address { field: String, value: String },
    #[error("`{field}` is not a raw integer amount: `{value}`")]
    RawAmount { field: String, value: String },
    #[error("`{field}`: {source}")]
    Amount {
        field: String,
        #[source]
        source: AmountError,
    },
    #[error("`{field}`: unknown severity `{value}`")]
    Severity { field: String, value: String },
    #[error("`{field}`: unknown finding type `{value}`")]
    FindingType { field: String, value: String },
    #[error("`{field}`: {source}")]
    Signature {
        field: String,
        #[source]
        source: SignatureError,
    },
    #[error("`{field}`: {source}")]
    Template {
        field: String,
        #[source]
        source: TemplateError,
    },
    #[error("`{field}`: monitor id `{id}` is already used")]
    DuplicateId { field: String, id: String },
    #[error("no monitors configured")]
    NothingToMonitor,
}

#[derive(Debug, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoggingConfig {
    pub directory: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct AlertsConfig {
    #[serde(default)]
    pub webhook_url: String,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferConfig {
    pub symbol: String,
    pub address: String,
    pub decimals: u8,
    pub threshold: String,
    #[serde(default = "default_transfer_alert_id")]
    pub alert_id: String,
    #[serde(default = "default_transfer_severity")]
    pub severity: String,
}

#[derive(Debug, Deserialize)]
pub struct BalanceConfig {
    pub id: String,
    #[serde(default)]
    pub account: String,
    pub min_balance: String,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_balance_alert_id")]
    pub alert_id: String,
    #[serde(default = "default_balance_name")]
    pub name: String,
    #[serde(default = "default_balance_description")]
    pub description: String,
    #[serde(default = "default_info")]
    pub severity: String,
    #[serde(default = "default_suspicious")]
    pub finding_type: String,
}

#[derive(Debug, Deserialize)]
pub struct FlashLoanConfig {
    #[serde(default)]
    pub lending_pool: String,
    #[serde(default)]
    pub target: String,
    pub balance_diff_threshold: String,
    #[serde(default = "default_flash_loan_event")]
    pub event: String,
    #[serde(default = "default_flash_loan_protocol")]
    pub protocol: String,
    #[serde(default = "default_flash_loan_alert_id")]
    pub alert_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PooledEtherConfig {
    #[serde(default)]
    pub contract: String,
    #[serde(default = "default_pooled_alert_id")]
    pub alert_id: String,
}

#[derive(Debug, Deserialize)]
pub struct EventConfig {
    #[serde(default)]
    pub address: String,
    pub signature: String,
    pub alert_id: String,
    pub name: String,
    pub description: String,
    pub severity: String,
    #[serde(default = "default_info")]
    pub finding_type: String,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub chain: ChainConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub transfers: Vec<TransferConfig>,
    #[serde(default)]
    pub balances: Vec<BalanceConfig>,
    pub flash_loan: Option<FlashLoanConfig>,
    pub pooled_ether: Option<PooledEtherConfig>,
    #[serde(default)]
    pub events: Vec<EventConfig>,
}

fn default_chain_id() -> u64 {
    1
}

fn default_transfer_alert_id() -> String {
    LARGE_TRANSFER_ALERT_ID.to_string()
}

fn default_transfer_severity() -> String {
    "Low".to_string()
}

fn default_cooldown() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_balance_alert_id() -> String {
    MIN_BALANCE_ALERT_ID.to_string()
}

fn default_balance_name() -> String {
    MIN_BALANCE_NAME.to_string()
}

fn default_balance_description() -> String {
    MIN_BALANCE_DESCRIPTION.to_string()
}

fn default_info() -> String {
    "Info".to_string()
}

fn default_suspicious() -> String {
    "Suspicious".to_string()
}

fn default_flash_loan_event() -> String {
    AAVE_V2_FLASH_LOAN_EVENT.to_string()
}

fn default_flash_loan_protocol() -> String {
    FLASH_LOAN_PROTOCOL.to_string()
}

fn default_flash_loan_alert_id() -> String {
    FLASH_LOAN_ALERT_ID.to_string()
}

fn default_pooled_alert_id() -> String {
    POOLED_ETHER_ALERT_ID.to_string()
}

fn address(field: &str, value: &str) -> Result<Address, SetupError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(SetupError::Missing(field.to_string()));
    }
    Address::from_str(value).map_err(|_| SetupError::Address {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn raw_amount(field: &str, value: &str) -> Result<U256, SetupError> {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(SetupError::RawAmount {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    U256::from_str_radix(value, 10).map_err(|_| SetupError::RawAmount {
        field: field.to_string(),
        value: value.to_string(),
    })
}

fn severity(field: &str, value: &str) -> Result<Severity, SetupError> {
    value.parse().map_err(|value| SetupError::Severity {
        field: field.to_string(),
        value,
    })
}

fn finding_type(field: &str, value: &str) -> Result<FindingType, SetupError> {
    value.parse().map_err(|value| SetupError::FindingType {
        field: field.to_string(),
        value,
    })
}

fn signature(field: &str, value: &str) -> Result<EventSignature, SetupError> {
    EventSignature::parse(value).map_err(|source| SetupError::Signature {
        field: field.to_string(),
        source,
    })
}

fn template_error(field: String) -> impl FnOnce(TemplateError) -> SetupError {
    move |source| SetupError::Template { field, source }
}

impl TransferConfig {
    pub fn build(&self, field: &str) -> Result<LargeTransferAgent, SetupError> {
        let evaluator = ThresholdEvaluator::new(&self.threshold, self.decimals).map_err(|source| {
            SetupError::Amount {
                field: format!("{field}.threshold"),
                source,
            }
        })?;
        LargeTransferAgent::new(
            self.symbol.as_str(),
            address(&format!("{field}.address"), &self.address)?,
            evaluator,
            self.alert_id.as_str(),
            severity(&format!("{field}.severity"), &self.severity)?,
        )
        .map_err(|source| SetupError::Signature {
            field: field.to_string(),
            source,
        })
    }
}

impl BalanceConfig {
    pub fn build(&self, field: &str) -> Result<BalanceFloorAgent, SetupError> {
        BalanceFloorAgent::new(
            self.id.as_str(),
            address(&format!("{field}.account"), &self.account)?,
            raw_amount(&format!("{field}.min_balance"), &self.min_balance)?,
            self.cooldown_secs,
            self.alert_id.as_str(),
            self.name.as_str(),
            &self.description,
            severity(&format!("{field}.severity"), &self.severity)?,
            finding_type(&format!("{field}.finding_type"), &self.finding_type)?,
        )
        .map_err(template_error(format!("{field}.description")))
    }
}

impl FlashLoanConfig {
    pub fn build(&self) -> Result<FlashLoanLossAgent, SetupError> {
        Ok(FlashLoanLossAgent::new(
            address("flash_loan.lending_pool", &self.lending_pool)?,
            address("flash_loan.target", &self.target)?,
            signature("flash_loan.event", &self.event)?,
            raw_amount("flash_loan.balance_diff_threshold", &self.balance_diff_threshold)?,
            self.protocol.as_str(),
            self.alert_id.as_str(),
        ))
    }
}

impl PooledEtherConfig {
    pub fn build(&self) -> Result<PooledEtherAgent, SetupError> {
        Ok(PooledEtherAgent::new(
            address("pooled_ether.contract", &self.contract)?,
            self.alert_id.as_str(),
        ))
    }
}

impl EventConfig {
    pub fn build(&self, field: &str) -> Result<EventDescriptor, SetupError> {
        EventDescriptor::new(
            address(&format!("{field}.address"), &self.address)?,
            signature(&format!("{field}.signature"), &self.signature)?,
            self.alert_id.as_str(),
            self.name.as_str(),
            &self.description,
            severity(&format!("{field}.severity"), &self.severity)?,
            finding_type(&format!("{field}.finding_type"), &self.finding_type)?,
        )
        .map_err(template_error(format!("{field}.description")))
    }
}

impl AppConfig {
    /// Reads `<name>.toml` (or any format the `config` crate recognises) and
    /// lets `RPC_URL` override the endpoint.
    pub fn load(name: &str) -> Result<Self, SetupError> {
        let cfg = Config::builder()
            .add_source(File::with_name(name))
            .build()?;
        let mut app: AppConfig = cfg.try_deserialize()?;

        if let Ok(env_rpc) = std::env::var("RPC_URL") {
            if !env_rpc.is_empty() {
                app.chain.rpc_url = env_rpc;
            }
        }
        Ok(app)
    }

    pub fn from_toml(text: &str) -> Result<Self, SetupError> {
        let cfg = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Validates every monitor and wires it into an engine. Agents run in
    /// this order: event descriptors, transfers, flash loan, balances, pooled
    /// ether.
    pub fn build_engine(&self) -> Result<AgentEngine, SetupError> {
        let mut engine = AgentEngine::new();

        if !self.events.is_empty() {
            let descriptors = self
                .events
                .iter()
                .enumerate()
                .map(|(i, event)| event.build(&format!("events[{i}]")))
                .collect::<Result<Vec<_>, _>>()?;
            engine.add_agent(Box::new(EventMatcher::new(descriptors)));
        }
        for (i, transfer) in self.transfers.iter().enumerate() {
            engine.add_agent(Box::new(transfer.build(&format!("transfers[{i}]"))?));
        }
        if let Some(flash_loan) = &self.flash_loan {
            engine.add_agent(Box::new(flash_loan.build()?));
        }
        let mut ids = HashSet::new();
        for (i, balance) in self.balances.iter().enumerate() {
            let field = format!("balances[{i}]");
            if balance.id.trim().is_empty() {
                return Err(SetupError::Missing(format!("{field}.id")));
            }
            if !ids.insert(balance.id.as_str()) {
                return Err(SetupError::DuplicateId {
                    field: format!("{field}.id"),
                    id: balance.id.clone(),
                });
            }
            engine.add_agent(Box::new(balance.build(&field)?));
        }
        if let Some(pooled) = &self.pooled_ether {
            engine.add_agent(Box::new(pooled.build()?));
        }

        if engine.is_empty() {
            return Err(SetupError::NothingToMonitor);
        }
        Ok(engine)
    }
}
