use std::fmt;
use std::time::Duration;

use ipnet::IpNet;

use crate::webhook::signature::SignatureEncoding;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// The pre-shared signing secret. Never printed.
#[derive(Clone)]
pub struct WebhookSecret(Vec<u8>);

impl WebhookSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(<redacted>)")
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub path: String,
    pub signing_secret: WebhookSecret,
    pub signature_header: String,
    pub signature_encoding: SignatureEncoding,
    pub allowed_cidrs: Vec<IpNet>,
    pub rate_limit_per_minute: u32,
    pub rate_limit_burst: u32,
    pub store_timeout: Duration,
    pub max_body_bytes: usize,
    pub trust_forwarded_for: bool,
}

impl WebhookConfig {
    pub fn new(signing_secret: WebhookSecret) -> Self {
        Self {
            path: "/webhooks/payments".to_string(),
            signing_secret,
            signature_header: "x-webhook-signature".to_string(),
            signature_encoding: SignatureEncoding::Hex,
            allowed_cidrs: default_allowed_cidrs(),
            rate_limit_per_minute: 120,
            rate_limit_burst: 30,
            store_timeout: Duration::from_millis(5_000),
            max_body_bytes: 256 * 1024,
            trust_forwarded_for: false,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparseable numeric values
    /// keep their defaults; anything security-relevant is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = lookup("RECEIVER_WEBHOOK_SECRET")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("RECEIVER_WEBHOOK_SECRET"))?;
        let mut config = Self::new(WebhookSecret::new(secret));

        if let Some(value) = lookup("RECEIVER_WEBHOOK_PATH") {
            let value = value.trim();
            if !value.starts_with('/') {
                return Err(ConfigError::Invalid {
                    name: "RECEIVER_WEBHOOK_PATH",
                    reason: "must start with '/'".to_string(),
                });
            }
            config.path = value.to_string();
        }
        if let Some(value) = lookup("RECEIVER_SIGNATURE_HEADER")
            && !value.trim().is_empty()
        {
            config.signature_header = value.trim().to_ascii_lowercase();
        }
        if let Some(value) = lookup("RECEIVER_SIGNATURE_ENCODING") {
            config.signature_encoding =
                value
                    .parse()
                    .map_err(|reason: String| ConfigError::Invalid {
                        name: "RECEIVER_SIGNATURE_ENCODING",
                        reason,
                    })?;
        }
        if let Some(value) = lookup("RECEIVER_ALLOWED_CIDRS") {
            config.allowed_cidrs = parse_cidrs(&value)?;
        }
        if let Some(value) = lookup("RECEIVER_RATE_LIMIT_PER_MINUTE")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.rate_limit_per_minute = parsed.max(1);
        }
        if let Some(value) = lookup("RECEIVER_RATE_LIMIT_BURST")
            && let Ok(parsed) = value.parse::<u32>()
        {
            config.rate_limit_burst = parsed.max(1);
        }
        if let Some(value) = lookup("RECEIVER_STORE_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.store_timeout = Duration::from_millis(parsed.max(1));
        }
        if let Some(value) = lookup("RECEIVER_MAX_BODY_BYTES")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.max_body_bytes = parsed.max(1);
        }
        if let Some(value) = lookup("RECEIVER_TRUST_FORWARDED_FOR") {
            config.trust_forwarded_for = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes"
            );
        }

        Ok(config)
    }
}

/// Comma-separated CIDRs. Bare addresses are taken as single-host networks.
pub fn parse_cidrs(value: &str) -> Result<Vec<IpNet>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<IpNet>()
                .or_else(|_| part.parse::<std::net::IpAddr>().map(IpNet::from))
                .map_err(|_| ConfigError::Invalid {
                    name: "RECEIVER_ALLOWED_CIDRS",
                    reason: format!("{part} is not a CIDR or IP address"),
                })
        })
        .collect()
}

fn default_allowed_cidrs() -> Vec<IpNet> {
    // Loopback only; production deployments list the processor's ranges.
    ["127.0.0.0/8", "::1/128"]
        .iter()
        .filter_map(|cidr| cidr.parse().ok())
        .collect()
}
