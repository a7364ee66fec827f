use std::{fmt, path::Path, str::FromStr, time::Duration};

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Pause after every accepted transaction
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(1_000);
/// Pause after a failed send that was not a nonce conflict
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);
/// How long a worker waits for outstanding confirmations once the deadline passes
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_secs(30);
/// How often the RPC block watcher polls for a new head
pub const DEFAULT_BLOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Transaction envelope family to submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TxKind {
    /// Type 0, priced with `gasPrice`
    Legacy,
    /// Type 2 (EIP-1559), priced with max fee and priority fee
    #[default]
    #[serde(alias = "eip1559")]
    PriorityFee,
    /// Type 3 (EIP-4844), carries a blob sidecar
    #[serde(alias = "blob")]
    DataBlob,
}

impl TxKind {
    pub const ALL: [Self; 3] = [Self::Legacy, Self::PriorityFee, Self::DataBlob];
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Legacy => write!(f, "legacy"),
            Self::PriorityFee => write!(f, "eip1559"),
            Self::DataBlob => write!(f, "blob"),
        }
    }
}

impl FromStr for TxKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "eip1559" | "priority-fee" | "priority_fee" => Ok(Self::PriorityFee),
            "blob" | "data-blob" | "data_blob" | "eip4844" => Ok(Self::DataBlob),
            _ => Err(format!("Invalid transaction type: {s}. Must be one of: legacy, eip1559, blob")),
        }
    }
}

/// Parses either a bare number of seconds or a humantime string like `90s` or `5m`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))
}

/// Run definition as written in a YAML file. Every field is optional so CLI flags can fill gaps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub rpc: Option<String>,
    pub private_key: Option<String>,
    pub to: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<TxKind>,
    pub concurrency: Option<usize>,
    pub duration: Option<String>,
    pub send_interval: Option<String>,
    pub retry_delay: Option<String>,
    pub drain_window: Option<String>,
    pub block_poll_interval: Option<String>,
}

impl FileConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("failed to parse config YAML")
    }

    /// Fills every unset field of `self` from `base`.
    pub fn or(self, base: Self) -> Self {
        Self {
            rpc: self.rpc.or(base.rpc),
            private_key: self.private_key.or(base.private_key),
            to: self.to.or(base.to),
            kind: self.kind.or(base.kind),
            concurrency: self.concurrency.or(base.concurrency),
            duration: self.duration.or(base.duration),
            send_interval: self.send_interval.or(base.send_interval),
            retry_delay: self.retry_delay.or(base.retry_delay),
            drain_window: self.drain_window.or(base.drain_window),
            block_poll_interval: self.block_poll_interval.or(base.block_poll_interval),
        }
    }

    /// Validates and resolves into a [`RunConfig`], applying defaults.
    pub fn resolve(self) -> Result<RunConfig> {
        let rpc_url = self.rpc.context("missing RPC endpoint (--rpc)")?;
        rpc_url.parse::<url::Url>().with_context(|| format!("invalid RPC URL: {rpc_url}"))?;

        let key = self.private_key.context("missing private key (--key)")?;
        let signer = parse_private_key(&key)?;

        let to = self.to.context("missing recipient address (--to)")?;
        let recipient =
            to.parse::<Address>().with_context(|| format!("invalid recipient address: {to}"))?;

        let duration = opt_duration(self.duration.as_deref(), DEFAULT_DURATION)?;
        if duration.is_zero() {
            bail!("duration must be greater than zero");
        }

        let concurrency = self.concurrency.unwrap_or(DEFAULT_CONCURRENCY);
        if concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        let block_poll_interval =
            opt_duration(self.block_poll_interval.as_deref(), DEFAULT_BLOCK_POLL_INTERVAL)?;
        if block_poll_interval.is_zero() {
            bail!("block poll interval must be greater than zero");
        }

        Ok(RunConfig {
            rpc_url,
            signer,
            recipient,
            kind: self.kind.unwrap_or_default(),
            concurrency,
            duration,
            timings: WorkerTimings {
                send_interval: opt_duration(self.send_interval.as_deref(), DEFAULT_SEND_INTERVAL)?,
                retry_delay: opt_duration(self.retry_delay.as_deref(), DEFAULT_RETRY_DELAY)?,
                drain_window: opt_duration(self.drain_window.as_deref(), DEFAULT_DRAIN_WINDOW)?,
            },
            block_poll_interval,
        })
    }
}

fn opt_duration(value: Option<&str>, default: Duration) -> Result<Duration> {
    value.map(parse_duration).transpose().map(|d| d.unwrap_or(default))
}

/// Parses a private key from hex string (with or without 0x prefix)
pub fn parse_private_key(hex_key: &str) -> Result<PrivateKeySigner> {
    let key = hex_key.trim();
    let key = key.strip_prefix("0x").unwrap_or(key);
    key.parse::<PrivateKeySigner>().context("failed to parse private key")
}

/// Delays that shape a worker's send loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTimings {
    pub send_interval: Duration,
    pub retry_delay: Duration,
    pub drain_window: Duration,
}

impl Default for WorkerTimings {
    fn default() -> Self {
        Self {
            send_interval: DEFAULT_SEND_INTERVAL,
            retry_delay: DEFAULT_RETRY_DELAY,
            drain_window: DEFAULT_DRAIN_WINDOW,
        }
    }
}

/// Fully validated run configuration.
#[derive(Clone)]
pub struct RunConfig {
    pub rpc_url: String,
    pub signer: PrivateKeySigner,
    pub recipient: Address,
    pub kind: TxKind,
    pub concurrency: usize,
    pub duration: Duration,
    pub timings: WorkerTimings,
    pub block_poll_interval: Duration,
}

// Hand-written so the signing key never ends up in logs.
impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("rpc_url", &self.rpc_url)
            .field("from", &self.signer.address())
            .field("recipient", &self.recipient)
            .field("kind", &self.kind)
            .field("concurrency", &self.concurrency)
            .field("duration", &self.duration)
            .field("timings", &self.timings)
            .field("block_poll_interval", &self.block_poll_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TO: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

    fn minimal() -> FileConfig {
        FileConfig {
            rpc: Some("http://localhost:8545".into()),
            private_key: Some(KEY.into()),
            to: Some(TO.into()),
            ..Default::default()
        }
    }

    #[test]
    fn tx_kind_accepts_cli_spellings() {
        assert_eq!("legacy".parse::<TxKind>().unwrap(), TxKind::Legacy);
        assert_eq!("EIP1559".parse::<TxKind>().unwrap(), TxKind::PriorityFee);
        assert_eq!("priority-fee".parse::<TxKind>().unwrap(), TxKind::PriorityFee);
        assert_eq!("blob".parse::<TxKind>().unwrap(), TxKind::DataBlob);
        assert!("eip2930".parse::<TxKind>().is_err());
    }

    #[test]
    fn tx_kind_display_parses_back() {
        for kind in TxKind::ALL {
            assert_eq!(kind.to_string().parse::<TxKind>().unwrap(), kind);
        }
    }

    #[test]
    fn duration_accepts_seconds_and_humantime() {
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn resolve_applies_defaults() {
        let config = minimal().resolve().unwrap();
        assert_eq!(config.kind, TxKind::PriorityFee);
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.duration, DEFAULT_DURATION);
        assert_eq!(config.timings, WorkerTimings::default());
        assert_eq!(config.recipient, TO.parse::<Address>().unwrap());
    }

    #[test]
    fn resolve_rejects_zero_concurrency() {
        let err = FileConfig { concurrency: Some(0), ..minimal() }.resolve().unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn resolve_rejects_zero_block_poll_interval() {
        let config = FileConfig { block_poll_interval: Some("0".into()), ..minimal() };
        let err = config.resolve().unwrap_err();
        assert!(err.to_string().contains("block poll interval"));

        let config = FileConfig { block_poll_interval: Some("250ms".into()), ..minimal() };
        assert_eq!(config.resolve().unwrap().block_poll_interval, Duration::from_millis(250));
    }

    #[test]
    fn resolve_rejects_bad_key() {
        let err = FileConfig { private_key: Some("0x1234".into()), ..minimal() }
            .resolve()
            .unwrap_err();
        assert!(err.to_string().contains("private key"));
    }

    #[test]
    fn resolve_requires_rpc() {
        assert!(FileConfig { rpc: None, ..minimal() }.resolve().is_err());
    }

    #[test]
    fn debug_output_hides_key() {
        let config = minimal().resolve().unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains(&KEY[2..]));
    }

    #[test]
    fn cli_values_override_file_values() {
        let file = FileConfig { concurrency: Some(4), duration: Some("10s".into()), ..minimal() };
        let cli = FileConfig { concurrency: Some(8), ..Default::default() };
        let merged = cli.or(file);
        assert_eq!(merged.concurrency, Some(8));
        assert_eq!(merged.duration.as_deref(), Some("10s"));
    }

    #[test]
    fn loads_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "rpc: http://localhost:8545\nprivate_key: {KEY}\nto: {TO}\ntype: blob\nconcurrency: 3\nduration: 5s\nsend_interval: 200ms"
        )
        .unwrap();

        let config = FileConfig::load(file.path()).unwrap().resolve().unwrap();
        assert_eq!(config.kind, TxKind::DataBlob);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.duration, Duration::from_secs(5));
        assert_eq!(config.timings.send_interval, Duration::from_millis(200));
        assert_eq!(config.timings.retry_delay, DEFAULT_RETRY_DELAY);
    }

    #[test]
    fn yaml_rejects_unknown_fields() {
        assert!(FileConfig::parse("rpc: http://x\nthreads: 4\n").is_err());
    }
}
