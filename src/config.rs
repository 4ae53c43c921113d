// src/config.rs

//! Manages server configuration: loading, resolving dynamic values, and validation.

use crate::core::protocol::frame::DEFAULT_MAX_REQUEST_SIZE;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use sysinfo::System;
use tracing::{info, warn};

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    7852
}

/// Configuration for TLS encryption of the TCP listener.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cert_path")]
    pub cert_path: String,
    #[serde(default = "default_key_path")]
    pub key_path: String,
}

fn default_cert_path() -> String {
    "harrier.crt".to_string()
}

fn default_key_path() -> String {
    "harrier.key".to_string()
}

/// Snapshot persistence settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PersistenceConfig {
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    /// Autosave period. `0s` disables autosave.
    #[serde(default, with = "humantime_serde")]
    pub storage_timeout: Duration,
    #[serde(default = "default_save_on_shutdown")]
    pub save_on_shutdown: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            storage_timeout: Duration::ZERO,
            save_on_shutdown: default_save_on_shutdown(),
        }
    }
}

fn default_storage_path() -> String {
    "harrier.dat".to_string()
}

fn default_save_on_shutdown() -> bool {
    true
}

/// Size and timing limits applied to requests and deliveries.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LimitsConfig {
    /// Largest accepted request body, in bytes. Larger frames close the connection.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// Largest accepted message payload, in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// How long a delivered message waits for `queue_confirm` before it is requeued.
    #[serde(default = "default_confirm_timeout", with = "humantime_serde")]
    pub confirm_timeout: Duration,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: default_max_request_size(),
            max_message_size: default_max_message_size(),
            confirm_timeout: default_confirm_timeout(),
        }
    }
}

fn default_max_request_size() -> usize {
    DEFAULT_MAX_REQUEST_SIZE
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024
}

fn default_confirm_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Cgroup v2 and v1 memory limit files, in the order they are consulted.
const CGROUP_MEMORY_LIMITS: [&str; 2] = [
    "/sys/fs/cgroup/memory.max",
    "/sys/fs/cgroup/memory/memory.limit_in_bytes",
];

/// Reads the container memory limit. Unlimited cgroups report `max` or a huge
/// sentinel value, both of which are ignored.
fn cgroup_memory_limit() -> Option<u64> {
    if !cfg!(target_os = "linux") {
        return None;
    }
    CGROUP_MEMORY_LIMITS.iter().find_map(|path| {
        let limit = fs::read_to_string(path).ok()?.trim().parse::<u64>().ok()?;
        (limit < u64::MAX / 2).then(|| {
            info!("Detected cgroup memory limit of {} bytes in {}", limit, path);
            limit
        })
    })
}

/// The memory a percentage `max_memory` is relative to: the cgroup limit when
/// running in a container, otherwise the total system memory.
fn available_memory() -> u64 {
    if let Some(limit) = cgroup_memory_limit() {
        return limit;
    }
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    warn!(
        "No cgroup memory limit found. Using total system memory: {} bytes",
        total
    );
    total
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum MaxMemoryConfig {
    Bytes(u64),
    String(String),
}

/// A raw representation of the config file before validation and resolution.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    unix_socket: Option<String>,
    #[serde(default = "default_unix_socket_perm")]
    unix_socket_perm: u32,
    #[serde(default = "default_admin_name")]
    admin_name: String,
    #[serde(default = "default_admin_password")]
    admin_password: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default = "default_max_memory_config")]
    max_memory: MaxMemoryConfig,
    #[serde(default, with = "humantime_serde")]
    client_timeout: Duration,
    #[serde(default)]
    persistence: PersistenceConfig,
    #[serde(default)]
    limits: LimitsConfig,
    #[serde(default)]
    tls: TlsConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7851
}

fn default_unix_socket_perm() -> u32 {
    0o700
}

fn default_admin_name() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "admin".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_clients() -> usize {
    16384
}

fn default_max_memory_config() -> MaxMemoryConfig {
    MaxMemoryConfig::Bytes(0)
}

/// Represents the final, validated, and resolved server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Path of an additional Unix domain socket listener.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_socket: Option<String>,
    /// Permission bits applied to the Unix socket file.
    pub unix_socket_perm: u32,
    pub admin_name: String,
    pub admin_password: String,
    pub log_level: String,
    pub max_clients: usize,
    /// The resolved memory ceiling in bytes. `None` or `Some(0)` means unlimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_memory: Option<u64>,
    /// Idle sessions are disconnected after this long. Zero disables the check.
    #[serde(with = "humantime_serde")]
    pub client_timeout: Duration,
    pub persistence: PersistenceConfig,
    pub limits: LimitsConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            unix_socket: None,
            unix_socket_perm: default_unix_socket_perm(),
            admin_name: default_admin_name(),
            admin_password: default_admin_password(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            max_memory: None,
            client_timeout: Duration::ZERO,
            persistence: PersistenceConfig::default(),
            limits: LimitsConfig::default(),
            tls: TlsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses, resolves and validates a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let raw_config: RawConfig =
            toml::from_str(contents).context("Failed to parse configuration TOML")?;
        let max_memory = resolve_max_memory(raw_config.max_memory, available_memory)?;
        let config = Config {
            host: raw_config.host,
            port: raw_config.port,
            unix_socket: raw_config.unix_socket,
            unix_socket_perm: raw_config.unix_socket_perm,
            admin_name: raw_config.admin_name,
            admin_password: raw_config.admin_password,
            log_level: raw_config.log_level,
            max_clients: raw_config.max_clients,
            max_memory,
            client_timeout: raw_config.client_timeout,
            persistence: raw_config.persistence,
            limits: raw_config.limits,
            tls: raw_config.tls,
            metrics: raw_config.metrics,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.admin_name.is_empty() || self.admin_name.len() > 64 {
            return Err(anyhow!("admin_name must be between 1 and 64 bytes"));
        }
        if self.unix_socket_perm > 0o777 {
            return Err(anyhow!(
                "unix_socket_perm must be a permission mode between 0 and 0o777"
            ));
        }
        if self.limits.max_request_size == 0 || self.limits.max_request_size > i32::MAX as usize {
            return Err(anyhow!(
                "limits.max_request_size must be between 1 and {} bytes",
                i32::MAX
            ));
        }
        if self.limits.max_message_size > self.limits.max_request_size {
            warn!(
                "limits.max_message_size ({}) exceeds limits.max_request_size ({}); the request limit wins.",
                self.limits.max_message_size, self.limits.max_request_size
            );
        }
        if self.limits.confirm_timeout.is_zero() {
            return Err(anyhow!("limits.confirm_timeout cannot be 0"));
        }
        if let Some(mem) = self.max_memory
            && mem > 0
            && mem < 1_000_000
        {
            warn!(
                "low max_memory setting: {} bytes. Most writes may be refused.",
                mem
            );
        }

        if self.tls.enabled {
            if self.tls.cert_path.trim().is_empty() {
                return Err(anyhow!("tls.cert_path cannot be empty when TLS is enabled"));
            }
            if self.tls.key_path.trim().is_empty() {
                return Err(anyhow!("tls.key_path cannot be empty when TLS is enabled"));
            }
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}

/// Resolves the `max_memory` setting into bytes. `available_memory` is consulted only
/// for percentage values.
const MEMORY_UNITS: [(&str, u64); 3] = [("gb", 1 << 30), ("mb", 1 << 20), ("kb", 1 << 10)];

fn resolve_max_memory(
    cfg: MaxMemoryConfig,
    available_memory: impl FnOnce() -> u64,
) -> Result<Option<u64>> {
    let raw = match cfg {
        MaxMemoryConfig::Bytes(b) => return Ok(Some(b)),
        MaxMemoryConfig::String(s) => s,
    };
    let lower = raw.trim().to_lowercase();

    if let Some(pct) = lower.strip_suffix('%') {
        let pct: f64 = pct
            .trim()
            .parse()
            .with_context(|| format!("max_memory '{raw}' is not a valid percentage"))?;
        if !(0.0..=100.0).contains(&pct) {
            return Err(anyhow!("max_memory '{raw}' must be between 0% and 100%"));
        }
        let available = available_memory();
        let bytes = (available as f64 * pct / 100.0) as u64;
        info!("max_memory '{}' resolves to {} of {} bytes", raw, bytes, available);
        return Ok(Some(bytes));
    }

    let (digits, multiplier) = MEMORY_UNITS
        .iter()
        .find_map(|(unit, mul)| lower.strip_suffix(unit).map(|d| (d, *mul)))
        .unwrap_or((lower.as_str(), 1));
    let value: u64 = digits.trim().parse().with_context(|| {
        format!("max_memory '{raw}' must be a byte count, a percentage or use a kb/mb/gb unit")
    })?;
    value
        .checked_mul(multiplier)
        .map(Some)
        .ok_or_else(|| anyhow!("max_memory '{raw}' is too large"))
}
