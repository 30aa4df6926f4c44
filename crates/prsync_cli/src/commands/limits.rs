use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::ValueEnum;

use prsync::QuotaSnapshot;
use prsync::access::{GovernorConfig, QuotaSource, admission_delay};
use prsync::github::GitHubClient;

use crate::config::Config;

/// Output format for rate limit display.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Handle the limits command.
pub(crate) async fn handle_limits(
    output: OutputFormat,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let token = config
        .github_token()
        .ok_or("No GitHub token configured. Set github.token or GITHUB_TOKEN.")?;
    let client = GitHubClient::new(&token)?;
    let snapshot = client.quota().await?;

    let display = RateLimitDisplay::from_snapshot(&snapshot, Utc::now(), &GovernorConfig::default());
    display.print(output)?;

    Ok(())
}

/// Rate limit information for display.
#[derive(Debug, Clone, serde::Serialize, tabled::Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Limit")]
    pub limit: u64,
    #[tabled(rename = "Used")]
    pub used: u64,
    #[tabled(rename = "Remaining")]
    pub remaining: u64,
    #[tabled(rename = "Usage %")]
    pub usage_percent: String,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
    #[tabled(rename = "Next Request Waits")]
    pub next_wait: String,
}

impl RateLimitDisplay {
    pub(crate) fn from_snapshot(
        snapshot: &QuotaSnapshot,
        now: DateTime<Utc>,
        governor: &GovernorConfig,
    ) -> Self {
        let used = snapshot.limit.saturating_sub(snapshot.remaining);
        let usage_percent = if snapshot.limit > 0 {
            (used as f64 / snapshot.limit as f64) * 100.0
        } else {
            0.0
        };
        let reset_duration = snapshot.reset_at.signed_duration_since(now);
        let reset_in = if reset_duration.num_seconds() > 0 {
            format_duration(reset_duration)
        } else {
            "now".to_string()
        };
        let wait = admission_delay(snapshot, now, governor);

        Self {
            limit: snapshot.limit,
            used,
            remaining: snapshot.remaining,
            usage_percent: format!("{:.1}%", usage_percent),
            reset_at: snapshot.reset_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            reset_in,
            next_wait: format_wait(wait),
        }
    }

    pub(crate) fn print(self, format: OutputFormat) -> serde_json::Result<()> {
        match format {
            OutputFormat::Table => {
                let mut table = tabled::Table::new(vec![self]);
                table.with(tabled::settings::Style::rounded());
                println!("{}", table);
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&self)?);
            }
        }
        Ok(())
    }
}

fn format_wait(wait: Duration) -> String {
    if wait.is_zero() {
        "none".to_string()
    } else if wait < Duration::from_secs(1) {
        format!("{}ms", wait.as_millis())
    } else {
        format_duration(chrono::Duration::seconds(wait.as_secs() as i64))
    }
}

fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds();
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    }
}
