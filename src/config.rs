//! Configuration loading from `.env` files.

use std::{env, time::Duration};

use anyhow::{anyhow, bail, Context, Result};

use crate::{
    client::ClientConfig,
    codec::{TopicFilter, DEFAULT_KIND, DEFAULT_TOPIC, DEFAULT_TOPIC_TAG},
};

/// Every variable read by [`Settings::from_env`].
pub const ENV_VARS: [&str; 8] = [
    "RELAYS",
    "TOPIC",
    "TOPIC_TAG",
    "KIND",
    "AUTHORIZED_SIGNERS",
    "RECONNECT_INTERVAL_SECS",
    "CONNECT_TIMEOUT_SECS",
    "TOR_SOCKS",
];

/// Relays written into a fresh `.env`.
pub const DEFAULT_RELAYS: [&str; 4] = [
    "wss://relay.substation.ninja",
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
];

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Relay endpoints to subscribe on.
    pub relays: Vec<String>,
    /// Topic value, matched against the discriminator tag.
    pub topic: String,
    /// Discriminator tag key, `d` unless overridden.
    pub topic_tag: String,
    pub kind: u32,
    /// Lowercase hex keys; empty accepts any signer.
    pub authorized_signers: Vec<String>,
    pub reconnect_interval: Duration,
    pub connect_timeout: Duration,
    /// Optional SOCKS proxy (host:port) for all relay connections.
    pub tor_socks: Option<String>,
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let relays = csv_strings(env::var("RELAYS").context("RELAYS is not set")?);
        if relays.is_empty() {
            bail!("RELAYS must list at least one relay");
        }
        let topic = non_empty_var("TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.into());
        let topic_tag = non_empty_var("TOPIC_TAG").unwrap_or_else(|| DEFAULT_TOPIC_TAG.into());
        let kind = match non_empty_var("KIND") {
            Some(k) => k.parse().with_context(|| format!("invalid KIND: {k}"))?,
            None => DEFAULT_KIND,
        };
        let authorized_signers = csv_strings(env::var("AUTHORIZED_SIGNERS").unwrap_or_default())
            .into_iter()
            .map(|key| {
                if key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit()) {
                    Ok(key.to_ascii_lowercase())
                } else {
                    Err(anyhow!("invalid AUTHORIZED_SIGNERS entry: {key}"))
                }
            })
            .collect::<Result<Vec<_>>>()?;
        let reconnect_interval = secs_var("RECONNECT_INTERVAL_SECS", 5)?;
        let connect_timeout = secs_var("CONNECT_TIMEOUT_SECS", 10)?;
        let tor_socks = non_empty_var("TOR_SOCKS");
        Ok(Self {
            relays,
            topic,
            topic_tag,
            kind,
            authorized_signers,
            reconnect_interval,
            connect_timeout,
            tor_socks,
        })
    }

    pub fn topic_filter(&self) -> TopicFilter {
        TopicFilter {
            tag_key: self.topic_tag.clone(),
            topic: self.topic.clone(),
            kind: self.kind,
            authorized_signers: self.authorized_signers.clone(),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            relays: self.relays.clone(),
            reconnect_interval: self.reconnect_interval,
            connect_timeout: self.connect_timeout,
            tor_socks: self.tor_socks.clone(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn secs_var(name: &str, default: u64) -> Result<Duration> {
    let secs = match non_empty_var(name) {
        Some(v) => v
            .parse::<u64>()
            .with_context(|| format!("invalid {name}: {v}"))?,
        None => default,
    };
    if secs == 0 {
        bail!("{name} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    let s = input.as_ref();
    s.split(',')
        .filter_map(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .collect()
}

/// Contents of a freshly generated `.env` file.
pub fn default_env_contents() -> String {
    let mut content = String::new();
    content.push_str(&format!("RELAYS={}\n", DEFAULT_RELAYS.join(",")));
    content.push_str(&format!("TOPIC={DEFAULT_TOPIC}\n"));
    content.push_str(&format!("TOPIC_TAG={DEFAULT_TOPIC_TAG}\n"));
    content.push_str(&format!("KIND={DEFAULT_KIND}\n"));
    content.push_str("AUTHORIZED_SIGNERS=\n");
    content.push_str("RECONNECT_INTERVAL_SECS=5\n");
    content.push_str("CONNECT_TIMEOUT_SECS=10\n");
    content.push_str("TOR_SOCKS=\n");
    content
}
