//! Configuration resolution for `MedInsight`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (`~/.config/medinsight/settings.json`)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables (`MEDINSIGHT_*`)
//! 5. CLI arguments (applied by the binary, highest priority)
//!
//! Files may be partial: they are deep-merged over the layer below.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Development-only JWT signing secret.
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

/// Development-only record encryption secret.
pub const DEFAULT_RECORD_SECRET: &str = "dev-record-secret-change-me";

/// Complete `MedInsight` configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub otp: OtpPolicy,
    #[serde(default)]
    pub access: AccessPolicy,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// HTTP listener and storage location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub database_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            database_path: None,
            log_level: "info".to_string(),
        }
    }
}

/// Bearer credential settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_ttl_secs: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_ttl_secs: 8 * 3600,
        }
    }
}

/// One-time code timing and attempt limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OtpPolicy {
    /// Lifetime of an issued code.
    pub expiry_secs: i64,
    /// Minimum gap between two sends for the same identity and purpose.
    pub resend_cooldown_secs: i64,
    /// Verification is refused once the attempt counter exceeds this.
    pub max_attempts: i64,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            expiry_secs: 180,
            resend_cooldown_secs: 90,
            max_attempts: 3,
        }
    }
}

/// Access request limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessPolicy {
    pub max_reason_len: usize,
    /// Length of codes generated when the approver does not supply one.
    pub generated_code_len: usize,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            max_reason_len: 500,
            generated_code_len: 8,
        }
    }
}

/// Medical record encryption at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    pub encryption_secret: String,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            encryption_secret: DEFAULT_RECORD_SECRET.to_string(),
        }
    }
}

/// Outbound notification channel.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    /// Mail gateway endpoint. When unset, notifications are only logged.
    pub webhook_url: Option<String>,
}

/// Load configuration with hierarchical resolution.
pub fn load_config(explicit_file: Option<&Path>) -> Result<Config> {
    let mut merged = serde_json::to_value(Config::default())?;

    if let Some(global_path) = global_config_path() {
        if global_path.exists() {
            merge_values(&mut merged, read_config_value(&global_path)?);
        }
    }

    if let Some(path) = explicit_file {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        merge_values(&mut merged, read_config_value(path)?);
    }

    let mut config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::Config(format!("Invalid configuration: {e}")))?;

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;

    Ok(config)
}

impl Config {
    /// Names of secret settings still holding their built-in development value.
    pub fn default_secrets(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            names.push("auth.jwt_secret");
        }
        if self.records.encryption_secret == DEFAULT_RECORD_SECRET {
            names.push("records.encryption_secret");
        }
        names
    }

    /// Reject settings the engines cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.otp.expiry_secs <= 0 {
            return Err(Error::Config("otp.expiry_secs must be positive".into()));
        }
        if self.otp.resend_cooldown_secs < 0 {
            return Err(Error::Config(
                "otp.resend_cooldown_secs must not be negative".into(),
            ));
        }
        if self.otp.max_attempts < 1 {
            return Err(Error::Config("otp.max_attempts must be at least 1".into()));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(Error::Config("auth.jwt_secret must not be empty".into()));
        }
        if self.auth.access_ttl_secs <= 0 {
            return Err(Error::Config("auth.access_ttl_secs must be positive".into()));
        }
        if self.records.encryption_secret.is_empty() {
            return Err(Error::Config(
                "records.encryption_secret must not be empty".into(),
            ));
        }
        if self.access.generated_code_len < 4 {
            return Err(Error::Config(
                "access.generated_code_len must be at least 4".into(),
            ));
        }
        Ok(())
    }
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("settings.json"))
}

/// Default location of the server database.
pub fn database_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("medinsight.db"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .ok()
            .map(|h| PathBuf::from(h).join(".medinsight"))
    }
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join("Library/Application Support/medinsight"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| std::env::var("HOME").ok().map(|h| PathBuf::from(h).join(".config")))
            .map(|p| p.join("medinsight"))
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
    {
        None
    }
}

fn read_config_value(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Recursively overlay `overlay` onto `base`. Objects merge key by key;
/// any other value replaces what was there.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `MEDINSIGHT_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(addr) = lookup("MEDINSIGHT_ADDR").and_then(|v| v.parse().ok()) {
        config.server.addr = addr;
    }
    if let Some(path) = lookup("MEDINSIGHT_DB_PATH") {
        config.server.database_path = Some(PathBuf::from(path));
    }
    if let Some(level) = lookup("MEDINSIGHT_LOG_LEVEL") {
        config.server.log_level = level;
    }
    if let Some(secret) = lookup("MEDINSIGHT_JWT_SECRET") {
        config.auth.jwt_secret = secret;
    }
    if let Some(ttl) = lookup("MEDINSIGHT_ACCESS_TTL").and_then(|v| v.parse().ok()) {
        config.auth.access_ttl_secs = ttl;
    }
    if let Some(secret) = lookup("MEDINSIGHT_RECORD_SECRET") {
        config.records.encryption_secret = secret;
    }
    if let Some(url) = lookup("MEDINSIGHT_NOTIFY_WEBHOOK") {
        config.notify.webhook_url = Some(url);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_otp_policy_matches_login_flow() {
        let config = Config::default();
        assert_eq!(config.otp.expiry_secs, 180);
        assert_eq!(config.otp.resend_cooldown_secs, 90);
        assert_eq!(config.otp.max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "otp": { "resend_cooldown_secs": 30 } }"#).unwrap();

        let mut merged = serde_json::to_value(Config::default()).unwrap();
        merge_values(&mut merged, read_config_value(&path).unwrap());
        let config: Config = serde_json::from_value(merged).unwrap();

        assert_eq!(config.otp.resend_cooldown_secs, 30);
        assert_eq!(config.otp.expiry_secs, 180);
        assert_eq!(config.access.max_reason_len, 500);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some(Path::new("/nonexistent/medinsight.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn default_secrets_are_reported_until_overridden() {
        let mut config = Config::default();
        assert_eq!(
            config.default_secrets(),
            ["auth.jwt_secret", "records.encryption_secret"]
        );

        config.auth.jwt_secret = "prod-jwt".into();
        assert_eq!(config.default_secrets(), ["records.encryption_secret"]);

        config.records.encryption_secret = "prod-records".into();
        assert!(config.default_secrets().is_empty());
    }

    #[test]
    fn malformed_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = read_config_value(&path).unwrap_err();
        assert!(matches!(&err, Error::ConfigParse { path: p, .. } if *p == path));
        assert!(err.to_string().contains("settings.json"));
    }

    #[test]
    fn env_overrides_win_over_defaults() {
        let vars: HashMap<&str, &str> = [
            ("MEDINSIGHT_ADDR", "127.0.0.1:9000"),
            ("MEDINSIGHT_JWT_SECRET", "s3cret"),
            ("MEDINSIGHT_ACCESS_TTL", "60"),
            ("MEDINSIGHT_NOTIFY_WEBHOOK", "http://mail.local/send"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.server.addr.port(), 9000);
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.auth.access_ttl_secs, 60);
        assert_eq!(
            config.notify.webhook_url.as_deref(),
            Some("http://mail.local/send")
        );
    }

    #[test]
    fn unparsable_env_values_are_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| {
            (k == "MEDINSIGHT_ACCESS_TTL").then(|| "soon".to_string())
        });
        assert_eq!(config.auth.access_ttl_secs, 8 * 3600);
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut config = Config::default();
        config.otp.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
