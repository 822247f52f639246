use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;
use utoipa::ToSchema;

pub const DEFAULT_RPC_URL: &str = "https://api.devnet.solana.com";
pub const DEFAULT_TOKEN_SYMBOL: &str = "USDC";
pub const DEFAULT_TOKEN_DECIMALS: u8 = 6;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SIGNATURE_LIMIT: usize = 10;
pub const DEFAULT_TOLERANCE: &str = "0.001";

#[derive(Debug, Clone, Eq, Hash, PartialEq, Deserialize, Serialize, ToSchema)]
pub struct TokenConfig {
    pub symbol: String,
    /// Mint address of the only token the watcher accepts.
    pub mint: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub rpc_url: String,
    pub token: TokenConfig,
    pub poll_interval: Duration,
    /// Budget for one whole poll cycle.
    pub cycle_timeout: Duration,
    pub rpc_timeout: Duration,
    pub signature_limit: usize,
    pub tolerance: BigDecimal,
    /// Invoices checked in parallel within one cycle. 1 means strictly sequential.
    pub max_concurrent_checks: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_owned(),
            token: TokenConfig {
                symbol: DEFAULT_TOKEN_SYMBOL.to_owned(),
                mint: String::new(),
                decimals: DEFAULT_TOKEN_DECIMALS,
            },
            poll_interval: DEFAULT_POLL_INTERVAL,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            signature_limit: DEFAULT_SIGNATURE_LIMIT,
            tolerance: default_tolerance(),
            max_concurrent_checks: 1,
        }
    }
}

fn default_tolerance() -> BigDecimal {
    BigDecimal::from_str(DEFAULT_TOLERANCE).unwrap_or_default()
}

impl WatcherConfig {
    /// Reads `FLUIDA_*` variables, falling back to defaults for anything unset.
    /// The token mint has no default and must be supplied.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`WatcherConfig::from_env`] with a custom variable source. A value
    /// that is set but does not parse is an error, never a silent default.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("FLUIDA_RPC_URL") {
            url::Url::parse(&url)
                .map_err(|e| anyhow::anyhow!("FLUIDA_RPC_URL '{}' is not a valid url: {}", url, e))?;
            config.rpc_url = url;
        }

        config.token.mint = lookup("FLUIDA_TOKEN_MINT")
            .map(|m| m.trim().to_owned())
            .filter(|m| !m.is_empty())
            .ok_or_else(|| anyhow::anyhow!("FLUIDA_TOKEN_MINT must be set to the token mint address"))?;

        if let Some(symbol) = lookup("FLUIDA_TOKEN_SYMBOL") {
            config.token.symbol = symbol;
        }

        config.token.decimals = parse_var(&lookup, "FLUIDA_TOKEN_DECIMALS", config.token.decimals)?;
        config.poll_interval = Duration::from_secs(
            parse_var(&lookup, "FLUIDA_POLL_INTERVAL_SECS", config.poll_interval.as_secs())?);
        config.cycle_timeout = Duration::from_secs(
            parse_var(&lookup, "FLUIDA_CYCLE_TIMEOUT_SECS", config.cycle_timeout.as_secs())?);
        config.rpc_timeout = Duration::from_secs(
            parse_var(&lookup, "FLUIDA_RPC_TIMEOUT_SECS", config.rpc_timeout.as_secs())?);
        config.signature_limit = parse_var(&lookup, "FLUIDA_SIGNATURE_LIMIT", config.signature_limit)?;
        config.max_concurrent_checks = parse_var(&lookup, "FLUIDA_MAX_CONCURRENT_CHECKS",
                                                 config.max_concurrent_checks)?;
        config.tolerance = parse_var(&lookup, "FLUIDA_AMOUNT_TOLERANCE", config.tolerance.clone())?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.token.mint.trim().is_empty() {
            anyhow::bail!("token mint is not configured");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll interval must be positive");
        }

        if self.cycle_timeout.is_zero() {
            anyhow::bail!("cycle timeout must be positive");
        }

        if self.signature_limit == 0 {
            anyhow::bail!("signature limit must be at least 1");
        }

        if self.max_concurrent_checks == 0 {
            anyhow::bail!("max concurrent checks must be at least 1");
        }

        if self.tolerance < BigDecimal::default() {
            anyhow::bail!("amount tolerance cannot be negative");
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| {
            warn!(key, value = %raw, "Invalid config value");
            anyhow::anyhow!("{} '{}' is invalid: {}", key, raw, e)
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = WatcherConfig::default();

        assert_eq!(config.poll_interval, Duration::from_secs(15));
        assert_eq!(config.cycle_timeout, Duration::from_secs(30));
        assert_eq!(config.signature_limit, 10);
        assert_eq!(config.token.decimals, 6);
        assert_eq!(config.tolerance, BigDecimal::from_str("0.001").unwrap());
    }

    #[test]
    fn test_validate_requires_mint() {
        let mut config = WatcherConfig::default();
        assert!(config.validate().is_err());

        config.token.mint = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU".into();
        assert!(config.validate().is_ok());

        config.signature_limit = 0;
        assert!(config.validate().is_err());
    }

    const MINT: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = WatcherConfig::from_lookup(lookup(&[("FLUIDA_TOKEN_MINT", MINT)])).unwrap();

        assert_eq!(config.token.mint, MINT);
        assert_eq!(config.token.decimals, DEFAULT_TOKEN_DECIMALS);
        assert_eq!(config.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.max_concurrent_checks, 1);
        assert_eq!(config.tolerance, BigDecimal::from_str(DEFAULT_TOLERANCE).unwrap());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = WatcherConfig::from_lookup(lookup(&[
            ("FLUIDA_TOKEN_MINT", MINT),
            ("FLUIDA_RPC_URL", "http://localhost:8899"),
            ("FLUIDA_TOKEN_DECIMALS", "9"),
            ("FLUIDA_POLL_INTERVAL_SECS", " 5 "),
            ("FLUIDA_SIGNATURE_LIMIT", "25"),
            ("FLUIDA_MAX_CONCURRENT_CHECKS", "4"),
            ("FLUIDA_AMOUNT_TOLERANCE", "0"),
        ])).unwrap();

        assert_eq!(config.rpc_url, "http://localhost:8899");
        assert_eq!(config.token.decimals, 9);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.signature_limit, 25);
        assert_eq!(config.max_concurrent_checks, 4);
        assert_eq!(config.tolerance, BigDecimal::from(0));
    }

    #[test]
    fn test_from_lookup_requires_mint() {
        assert!(WatcherConfig::from_lookup(lookup(&[])).is_err());
        assert!(WatcherConfig::from_lookup(lookup(&[("FLUIDA_TOKEN_MINT", "  ")])).is_err());
    }

    #[test]
    fn test_from_lookup_rejects_invalid_values() {
        for (key, value) in [
            ("FLUIDA_TOKEN_DECIMALS", "six"),
            ("FLUIDA_TOKEN_DECIMALS", "300"),
            ("FLUIDA_SIGNATURE_LIMIT", "-1"),
            ("FLUIDA_POLL_INTERVAL_SECS", "0"),
            ("FLUIDA_MAX_CONCURRENT_CHECKS", "0"),
            ("FLUIDA_AMOUNT_TOLERANCE", "a lot"),
            ("FLUIDA_AMOUNT_TOLERANCE", "-0.5"),
            ("FLUIDA_RPC_URL", "not a url"),
        ] {
            let result = WatcherConfig::from_lookup(lookup(&[("FLUIDA_TOKEN_MINT", MINT), (key, value)]));
            assert!(result.is_err(), "{}={} should be rejected", key, value);
        }
    }
}
