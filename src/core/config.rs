use crate::interceptor::ChainSettings;
use crate::packets::{PacketLimits, Qos, UTF8_STRING_MAX_LENGTH};
use crate::pipeline::{PipelineMetrics, DEFAULT_CHAIN_QUEUE_CAPACITY};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/gatehouse.toml";
const CONFIG_ENV: &str = "GATEHOUSE_CONFIG";

/// Top-level configuration for the gatehouse runtime.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub extensions: ExtensionsConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub restrictions: RestrictionsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Folder scanned for `<id>/extension.toml` manifests.
    pub folder: PathBuf,
    /// Upper bound accepted by `Output::async_for`.
    pub max_async_timeout_ms: u64,
    /// Chains a single connection may have queued before `begin_chain` is refused.
    pub chain_queue_capacity: usize,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("extensions"),
            max_async_timeout_ms: 3_600_000,
            chain_queue_capacity: DEFAULT_CHAIN_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub maximum_qos: Qos,
    pub retained_messages_enabled: bool,
    pub max_message_expiry_interval: u64,
    pub max_session_expiry_interval: u64,
    pub max_keep_alive: u16,
    pub max_packet_size: u32,
}

impl Default for MqttConfig {
    fn default() -> Self {
        let limits = PacketLimits::default();
        Self {
            maximum_qos: limits.maximum_qos,
            retained_messages_enabled: limits.retained_messages_enabled,
            max_message_expiry_interval: limits.max_message_expiry_interval,
            max_session_expiry_interval: limits.max_session_expiry_interval,
            max_keep_alive: limits.max_keep_alive,
            max_packet_size: limits.max_packet_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestrictionsConfig {
    pub max_utf8_string_length: usize,
    pub max_topic_length: usize,
    pub max_client_id_length: usize,
    pub validate_utf8: bool,
}

impl Default for RestrictionsConfig {
    fn default() -> Self {
        Self {
            max_utf8_string_length: UTF8_STRING_MAX_LENGTH,
            max_topic_length: UTF8_STRING_MAX_LENGTH,
            max_client_id_length: UTF8_STRING_MAX_LENGTH,
            validate_utf8: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration from the path named by `GATEHOUSE_CONFIG`, or the default path.
    pub fn load_from_env() -> Result<Self> {
        Self::load(env_config_path())
    }

    /// Load configuration from a specific file (TOML or JSON based on extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        if is_json(path_ref) {
            Ok(serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON config {}", path_ref.display()))?)
        } else {
            Ok(toml::from_str(&data)
                .with_context(|| format!("invalid TOML config {}", path_ref.display()))?)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.extensions.max_async_timeout_ms == 0 {
            bail!("extensions.max_async_timeout_ms must be > 0");
        }
        if self.extensions.chain_queue_capacity == 0 {
            bail!("extensions.chain_queue_capacity must be > 0");
        }
        if self.mqtt.max_packet_size == 0 {
            bail!("mqtt.max_packet_size must be > 0");
        }
        if self.mqtt.max_message_expiry_interval == 0 {
            bail!("mqtt.max_message_expiry_interval must be > 0");
        }
        let r = &self.restrictions;
        for (name, value) in [
            ("max_utf8_string_length", r.max_utf8_string_length),
            ("max_topic_length", r.max_topic_length),
            ("max_client_id_length", r.max_client_id_length),
        ] {
            if value == 0 || value > UTF8_STRING_MAX_LENGTH {
                bail!("restrictions.{name} must be within 1..={UTF8_STRING_MAX_LENGTH}");
            }
        }
        Ok(())
    }

    /// Limits every modifiable packet validates against.
    pub fn packet_limits(&self) -> PacketLimits {
        PacketLimits {
            max_utf8_string_length: self.restrictions.max_utf8_string_length,
            max_topic_length: self.restrictions.max_topic_length,
            max_client_id_length: self.restrictions.max_client_id_length,
            validate_utf8: self.restrictions.validate_utf8,
            maximum_qos: self.mqtt.maximum_qos,
            retained_messages_enabled: self.mqtt.retained_messages_enabled,
            max_message_expiry_interval: self.mqtt.max_message_expiry_interval,
            max_session_expiry_interval: self.mqtt.max_session_expiry_interval,
            max_keep_alive: self.mqtt.max_keep_alive,
            max_packet_size: self.mqtt.max_packet_size,
        }
    }

    pub fn chain_settings(&self) -> ChainSettings {
        ChainSettings {
            limits: Arc::new(self.packet_limits()),
            max_async_timeout: Duration::from_millis(self.extensions.max_async_timeout_ms),
            metrics: Arc::new(PipelineMetrics::default()),
        }
    }
}

fn env_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        PathBuf::from(path)
    } else {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }
}

fn is_json(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.extensions.folder, PathBuf::from("extensions"));
        assert_eq!(config.extensions.max_async_timeout_ms, 3_600_000);
        assert_eq!(config.packet_limits(), PacketLimits::default());
    }

    #[test]
    fn sections_override_limits() {
        let config: Config = toml::from_str(
            r#"
            [extensions]
            folder = "/opt/ext"
            max_async_timeout_ms = 5000

            [mqtt]
            maximum_qos = 1
            retained_messages_enabled = false

            [restrictions]
            max_topic_length = 64

            [telemetry]
            log_level = "debug"
            "#,
        )
        .unwrap();
        let limits = config.packet_limits();
        assert_eq!(limits.maximum_qos, Qos::AtLeastOnce);
        assert!(!limits.retained_messages_enabled);
        assert_eq!(limits.max_topic_length, 64);
        assert_eq!(
            config.chain_settings().max_async_timeout,
            Duration::from_secs(5)
        );
        assert_eq!(config.telemetry.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn invalid_qos_is_rejected() {
        let parsed: Result<Config, _> = toml::from_str("[mqtt]\nmaximum_qos = 3\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.extensions.max_async_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_reads_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gatehouse.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, r#"{{"extensions": {{"chain_queue_capacity": 8}}}}"#).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.extensions.chain_queue_capacity, 8);
    }
}
