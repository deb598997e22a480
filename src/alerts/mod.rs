use reqwest::Client;
use serde::Serialize;
use tracing::{error, info};

use crate::config::AlertsConfig;
use crate::events::{Finding, Severity};

#[derive(Debug, Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    fields: Vec<EmbedField>,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct DiscordPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

#[derive(Debug, Serialize)]
struct TelegramPayload {
    chat_id: String,
    text: String,
    parse_mode: String,
}

fn severity_color(severity: Severity) -> u32 {
    match severity {
        Severity::Critical => 0xFF0000,
        Severity::High => 0xE67E22,
        Severity::Medium => 0xF1C40F,
        Severity::Low => 0x3498DB,
        Severity::Info => 0x95A5A6,
    }
}

fn discord_payload(finding: &Finding) -> DiscordPayload {
    let mut fields = vec![
        EmbedField { name: "Alert ID".to_string(), value: finding.alert_id.clone(), inline: true },
        EmbedField { name: "Severity".to_string(), value: format!("{:?}", finding.severity), inline: true },
        EmbedField { name: "Type".to_string(), value: format!("{:?}", finding.finding_type), inline: true },
        EmbedField { name: "Protocol".to_string(), value: finding.protocol.clone(), inline: true },
    ];
    fields.extend(finding.metadata.iter().map(|(key, value)| EmbedField {
        name: key.clone(),
        value: value.clone(),
        inline: false,
    }));

    DiscordPayload {
        content: None,
        embeds: vec![DiscordEmbed {
            title: finding.name.clone(),
            description: finding.description.clone(),
            color: severity_color(finding.severity),
            fields,
        }],
    }
}

fn telegram_text(finding: &Finding) -> String {
    let mut text = format!(
        "*{}* ({})\n\n*Severity:* {:?}\n*Type:* {:?}\n{}",
        finding.name, finding.alert_id, finding.severity, finding.finding_type, finding.description
    );
    for (key, value) in &finding.metadata {
        text.push_str(&format!("\n`{key}`: {value}"));
    }
    text
}

/// Delivers findings: always to the log, and to the webhook / Telegram chat
/// when configured. Delivery failures are logged and never retried.
pub struct AlertManager {
    client: Client,
    config: AlertsConfig,
}

impl AlertManager {
    pub fn new(config: AlertsConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub async fn emit(&self, finding: &Finding) {
        info!(
            alert_id = %finding.alert_id,
            severity = ?finding.severity,
            finding_type = ?finding.finding_type,
            metadata = ?finding.metadata,
            "FINDING {}: {}",
            finding.name,
            finding.description
        );

        self.send_discord_alert(finding).await;
        self.send_telegram_alert(finding).await;
    }

    async fn send_discord_alert(&self, finding: &Finding) {
        if self.config.webhook_url.is_empty() { return; }

        let payload = discord_payload(finding);
        match self.client.post(&self.config.webhook_url).json(&payload).send().await {
            Ok(response) if !response.status().is_success() => {
                error!(status = %response.status(), "Webhook rejected alert {}", finding.alert_id);
            }
            Ok(_) => info!("Webhook Alert Sent"),
            Err(e) => error!("Failed to send webhook alert: {}", e),
        }
    }

    async fn send_telegram_alert(&self, finding: &Finding) {
        let token = match &self.config.telegram_bot_token {
            Some(t) if !t.is_empty() => t,
            _ => return,
        };
        let chat_id = match &self.config.telegram_chat_id {
            Some(id) if !id.is_empty() => id,
            _ => return,
        };

        let payload = TelegramPayload {
            chat_id: chat_id.clone(),
            text: telegram_text(finding),
            parse_mode: "Markdown".to_string(),
        };

        let url = format!("https://api.telegram.org/bot{}/sendMessage", token);

        if let Err(e) = self.client.post(&url).json(&payload).send().await {
            error!("Failed to send Telegram alert: {}", e);
        } else {
            info!("Telegram Alert Sent");
        }
    }
}
