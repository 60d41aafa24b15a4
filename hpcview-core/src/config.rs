//! Client configuration
//!
//! Loaded from TOML (every section optional, missing fields fall back to
//! defaults), then overridden from `HPCVIEW_*` environment variables.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// How the notification channel reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Streaming socket pushed by the server.
    #[default]
    Direct,
    /// Client pulls buffered packets on a fixed interval.
    Poll,
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(TransportKind::Direct),
            "poll" => Ok(TransportKind::Poll),
            other => Err(ConfigError::InvalidValue {
                field: "notification.transport".to_string(),
                value: other.to_string(),
                reason: "expected 'direct' or 'poll'".to_string(),
            }),
        }
    }
}

/// Notification channel settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NotificationConfig {
    pub port: u16,
    pub transport: TransportKind,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    /// Upper bound for joining the background thread on shutdown.
    pub shutdown_join_timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            port: 5970,
            transport: TransportKind::Direct,
            reconnect_delay_ms: 5_000,
            poll_interval_ms: 1_000,
            connect_timeout_ms: 10_000,
            shutdown_join_timeout_ms: 2_000,
        }
    }
}

impl NotificationConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn shutdown_join_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_join_timeout_ms)
    }
}

/// Rowset defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RowsetConfig {
    pub page_size: usize,
    /// How often open Dynamic rowsets should be touched to stay alive.
    pub keep_alive_interval_ms: u64,
}

impl Default for RowsetConfig {
    fn default() -> Self {
        Self {
            page_size: 128,
            keep_alive_interval_ms: 60_000,
        }
    }
}

impl RowsetConfig {
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub scheduler: String,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub rowset: RowsetConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            scheduler: "localhost".to_string(),
            notification: NotificationConfig::default(),
            rowset: RowsetConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration for `scheduler` with every other field defaulted.
    pub fn for_scheduler(scheduler: impl Into<String>) -> Self {
        Self {
            scheduler: scheduler.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Defaults overridden by process environment variables.
    ///
    /// Environment variables:
    /// - `HPCVIEW_SCHEDULER`: scheduler host name
    /// - `HPCVIEW_NOTIFICATION_PORT`: notification port (default: 5970)
    /// - `HPCVIEW_NOTIFICATION_TRANSPORT`: `direct` or `poll`
    /// - `HPCVIEW_RECONNECT_DELAY_MS`: fixed reconnect delay (default: 5000)
    /// - `HPCVIEW_POLL_INTERVAL_MS`: poll transport interval (default: 1000)
    /// - `HPCVIEW_CONNECT_TIMEOUT_MS`: connect timeout (default: 10000)
    /// - `HPCVIEW_SHUTDOWN_JOIN_TIMEOUT_MS`: bounded join on shutdown (default: 2000)
    /// - `HPCVIEW_PAGE_SIZE`: rows per page (default: 128)
    /// - `HPCVIEW_KEEP_ALIVE_INTERVAL_MS`: rowset keep-alive interval (default: 60000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `HPCVIEW_*` overrides read through `lookup`.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(host) = lookup("HPCVIEW_SCHEDULER") {
            self.scheduler = host;
        }
        let n = &mut self.notification;
        override_parsed(&lookup, "HPCVIEW_NOTIFICATION_PORT", &mut n.port)?;
        override_parsed(&lookup, "HPCVIEW_NOTIFICATION_TRANSPORT", &mut n.transport)?;
        override_parsed(&lookup, "HPCVIEW_RECONNECT_DELAY_MS", &mut n.reconnect_delay_ms)?;
        override_parsed(&lookup, "HPCVIEW_POLL_INTERVAL_MS", &mut n.poll_interval_ms)?;
        override_parsed(&lookup, "HPCVIEW_CONNECT_TIMEOUT_MS", &mut n.connect_timeout_ms)?;
        override_parsed(
            &lookup,
            "HPCVIEW_SHUTDOWN_JOIN_TIMEOUT_MS",
            &mut n.shutdown_join_timeout_ms,
        )?;
        let r = &mut self.rowset;
        override_parsed(&lookup, "HPCVIEW_PAGE_SIZE", &mut r.page_size)?;
        override_parsed(&lookup, "HPCVIEW_KEEP_ALIVE_INTERVAL_MS", &mut r.keep_alive_interval_ms)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.trim().is_empty() {
            return Err(invalid("scheduler", &self.scheduler, "must not be empty"));
        }
        let n = &self.notification;
        if n.port == 0 {
            return Err(invalid("notification.port", n.port, "must be > 0"));
        }
        if n.reconnect_delay_ms == 0 {
            return Err(invalid(
                "notification.reconnect_delay_ms",
                n.reconnect_delay_ms,
                "must be > 0",
            ));
        }
        if n.poll_interval_ms == 0 {
            return Err(invalid(
                "notification.poll_interval_ms",
                n.poll_interval_ms,
                "must be > 0",
            ));
        }
        if n.connect_timeout_ms == 0 {
            return Err(invalid(
                "notification.connect_timeout_ms",
                n.connect_timeout_ms,
                "must be > 0",
            ));
        }
        if n.shutdown_join_timeout_ms == 0 {
            return Err(invalid(
                "notification.shutdown_join_timeout_ms",
                n.shutdown_join_timeout_ms,
                "must be > 0",
            ));
        }
        if self.rowset.page_size == 0 || self.rowset.page_size > i32::MAX as usize {
            return Err(invalid(
                "rowset.page_size",
                self.rowset.page_size,
                "must be between 1 and i32::MAX",
            ));
        }
        if self.rowset.keep_alive_interval_ms == 0 {
            return Err(invalid(
                "rowset.keep_alive_interval_ms",
                self.rowset.keep_alive_interval_ms,
                "must be > 0",
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| invalid(key, &raw, "cannot be parsed"))?;
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rowset.page_size, 128);
        assert_eq!(config.notification.transport, TransportKind::Direct);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = ClientConfig::from_toml_str(
            r#"
            scheduler = "head-node"

            [notification]
            transport = "poll"
            poll_interval_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler, "head-node");
        assert_eq!(config.notification.transport, TransportKind::Poll);
        assert_eq!(config.notification.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.notification.port, NotificationConfig::default().port);
        assert_eq!(config.rowset, RowsetConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_unknown_fields() {
        let err = ClientConfig::from_toml_str("scheduler = \"x\"\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_toml_requires_scheduler() {
        let err = ClientConfig::from_toml_str("[rowset]\npage_size = 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "scheduler = \"cluster01\"\n[rowset]\npage_size = 64").unwrap();
        let config = ClientConfig::from_path(file.path()).unwrap();
        assert_eq!(config.scheduler, "cluster01");
        assert_eq!(config.rowset.page_size, 64);
    }

    #[test]
    fn test_from_path_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::from_path(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("HPCVIEW_SCHEDULER", "sched"),
            ("HPCVIEW_NOTIFICATION_TRANSPORT", "POLL"),
            ("HPCVIEW_PAGE_SIZE", "32"),
        ]
        .into_iter()
        .collect();
        let config = ClientConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.scheduler, "sched");
        assert_eq!(config.notification.transport, TransportKind::Poll);
        assert_eq!(config.rowset.page_size, 32);
    }

    #[test]
    fn test_override_parse_failure_names_variable() {
        let err = ClientConfig::default()
            .with_overrides(|k| (k == "HPCVIEW_NOTIFICATION_PORT").then(|| "http".to_string()))
            .unwrap_err();
        match err {
            ConfigError::InvalidValue { field, value, .. } => {
                assert_eq!(field, "HPCVIEW_NOTIFICATION_PORT");
                assert_eq!(value, "http");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = ClientConfig::default();
        config.notification.reconnect_delay_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "notification.reconnect_delay_ms"
        ));

        let mut config = ClientConfig::default();
        config.rowset.page_size = 0;
        assert!(config.validate().is_err());

        let config = ClientConfig::for_scheduler("  ");
        assert!(config.validate().is_err());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_positive_settings_validate(
            port in 1u16..,
            delay in 1u64..600_000,
            poll in 1u64..600_000,
            page in 1usize..10_000,
        ) {
            let mut config = ClientConfig::for_scheduler("head");
            config.notification.port = port;
            config.notification.reconnect_delay_ms = delay;
            config.notification.poll_interval_ms = poll;
            config.rowset.page_size = page;
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_toml_round_trip(port in 1u16.., page in 1usize..10_000) {
            let mut config = ClientConfig::for_scheduler("head");
            config.notification.port = port;
            config.rowset.page_size = page;
            let text = toml::to_string(&config).unwrap();
            prop_assert_eq!(ClientConfig::from_toml_str(&text).unwrap(), config);
        }
    }
}
