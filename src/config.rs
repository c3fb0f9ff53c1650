//! Environment-sourced configuration, loaded once at startup.

use anyhow::{bail, Context, Result};
use std::env;
use std::time::Duration;

const DEFAULT_LOCATION: &str = "Richmond driver licensing (Lansdowne Centre mall)";
const DEFAULT_INTERVAL_MINUTES: u64 = 5;

/// Which parts of a snapshot the loop compares between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareKey {
    /// Status category and slot details both count as a change.
    FullSnapshot,
    /// Only the available/not-available category counts.
    StatusOnly,
}

#[derive(Debug, Clone)]
pub struct CheckerConfig {
    pub last_name: String,
    pub license_number: String,
    pub keyword: String,
    pub discord_token: String,
    pub discord_channel_id: u64,
    pub check_interval: Duration,
    /// Search text for the target test center.
    pub location: String,
    pub headless: bool,
    /// Externally managed WebDriver endpoint; when unset the checker spawns
    /// its own chromedriver.
    pub webdriver_url: Option<String>,
    pub compare_key: CompareKey,
}

impl CheckerConfig {
    pub fn from_env() -> Result<Self> {
        let channel_id = env::var("DISCORD_CHANNEL_ID")
            .context("DISCORD_CHANNEL_ID must be set")?;
        let discord_channel_id = channel_id
            .parse()
            .with_context(|| format!("DISCORD_CHANNEL_ID must be a number, got: {channel_id}"))?;

        let interval_minutes = match env::var("CHECK_INTERVAL_MINUTES") {
            Ok(raw) => parse_positive_minutes(&raw)
                .context("CHECK_INTERVAL_MINUTES must be a positive integer")?,
            Err(_) => DEFAULT_INTERVAL_MINUTES,
        };

        let compare_key = match env::var("ICBC_COMPARE_KEY") {
            Ok(raw) => parse_compare_key(&raw)
                .context("ICBC_COMPARE_KEY must be \"full\" or \"status\"")?,
            Err(_) => CompareKey::FullSnapshot,
        };

        Ok(Self {
            last_name: env::var("ICBC_LAST_NAME").context("ICBC_LAST_NAME must be set")?,
            license_number: env::var("ICBC_LEARNER_LICENSE")
                .context("ICBC_LEARNER_LICENSE must be set")?,
            keyword: env::var("ICBC_KEYWORD").context("ICBC_KEYWORD must be set")?,
            discord_token: env::var("DISCORD_BOT_TOKEN")
                .context("DISCORD_BOT_TOKEN must be set")?,
            discord_channel_id,
            check_interval: Duration::from_secs(interval_minutes * 60),
            location: env::var("ICBC_LOCATION").unwrap_or_else(|_| DEFAULT_LOCATION.to_string()),
            headless: env::var("ICBC_HEADLESS")
                .map(|v| parse_bool_flag(&v))
                .unwrap_or(true),
            webdriver_url: env::var("WEBDRIVER_URL").ok(),
            compare_key,
        })
    }

    pub fn interval_minutes(&self) -> u64 {
        self.check_interval.as_secs() / 60
    }
}

fn parse_positive_minutes(raw: &str) -> Result<u64> {
    let minutes: u64 = raw.trim().parse()?;
    if minutes == 0 {
        bail!("interval must be at least one minute");
    }
    Ok(minutes)
}

fn parse_compare_key(raw: &str) -> Result<CompareKey> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "full" => Ok(CompareKey::FullSnapshot),
        "status" => Ok(CompareKey::StatusOnly),
        other => bail!("unrecognized compare key: {other}"),
    }
}

/// "0", "false", "no", "off" (any case) disable; anything else enables.
fn parse_bool_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
