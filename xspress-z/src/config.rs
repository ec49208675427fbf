//! Startup configuration for the detector bridge.
//!
//! Two layers live here: the zenoh session overrides every client link
//! starts from, and [`DetectorConfig`], the user-facing settings loaded from
//! a JSON5 file or from a flat key/value options map.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::endpoint::Endpoint;
use crate::param::value::split_list;
use crate::state::DetectorSettings;
use crate::transport::ZLinkConfig;
use crate::transport::zlink::DEFAULT_KEY_PREFIX;
use crate::{Error, Result};

#[derive(Serialize, Deserialize, Clone)]
pub struct ConfigOverride {
    pub key: &'static str,
    pub value: Value,
    pub reason: &'static str,
}

// SESSION CONFIG - one client session per bridge process, talking to one server
pub fn session_overrides() -> Vec<ConfigOverride> {
    vec![
        ConfigOverride {
            key: "mode",
            value: serde_json::json!("client"),
            reason: "The bridge only talks to the control server, never routes",
        },
        ConfigOverride {
            key: "listen/endpoints",
            value: serde_json::json!([]),
            reason: "Clients accept no inbound connections",
        },
        ConfigOverride {
            key: "scouting/multicast/enabled",
            value: serde_json::json!(false),
            reason: "The server endpoint is always configured explicitly",
        },
        ConfigOverride {
            key: "transport/unicast/open_timeout",
            value: serde_json::json!(10000),
            reason: "Control servers on busy hosts can be slow to accept",
        },
        ConfigOverride {
            key: "transport/link/tx/lease",
            value: serde_json::json!(10000),
            reason: "Detect a dead control server within a few poll periods",
        },
        ConfigOverride {
            key: "transport/link/tx/queue/congestion_control/drop/wait_before_drop",
            value: serde_json::json!(1000),
            reason: "Non-blocking sends give up quickly on a congested link",
        },
        ConfigOverride {
            key: "transport/shared_memory/enabled",
            value: serde_json::json!(false),
            reason: "Frames are small JSON documents",
        },
    ]
}

/// What to do when the pending-request map is full.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Backpressure {
    /// Refuse the new send with `ResourceExhausted`.
    #[default]
    Reject,
    /// Evict the oldest pending entry to make room.
    DropOldest,
}

fn default_endpoint() -> String {
    "127.0.0.1:12000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_pending_timeout_ms() -> u64 {
    5000
}

fn default_max_pending() -> usize {
    64
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Control server `address:port`.
    pub endpoint: String,
    pub num_cards: u32,
    pub num_tf: u32,
    pub base_ip: String,
    pub max_channels: u32,
    pub max_spectra: u32,
    pub settings_path: String,
    pub run_flags: u32,
    pub debug: u32,
    /// Comma-separated DAQ endpoints; empty disables the DAQ.
    pub daq_endpoints: String,

    pub poll_interval_ms: u64,
    pub pending_timeout_ms: u64,
    pub max_pending: usize,
    pub backpressure: Backpressure,
    pub key_prefix: String,
    /// Block on a congested link instead of dropping the frame.
    pub blocking_send: bool,
    /// Zenoh JSON5 config file underneath the built-in client settings.
    pub zenoh_config_file: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            num_cards: 0,
            num_tf: 0,
            base_ip: String::new(),
            max_channels: 0,
            max_spectra: 0,
            settings_path: String::new(),
            run_flags: 0,
            debug: 0,
            daq_endpoints: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
            pending_timeout_ms: default_pending_timeout_ms(),
            max_pending: default_max_pending(),
            backpressure: Backpressure::default(),
            key_prefix: default_key_prefix(),
            blocking_send: false,
            zenoh_config_file: String::new(),
        }
    }
}

fn parse_option<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::configuration(format!("option '{key}' = '{value}': {e}")))
}

impl DetectorConfig {
    /// Load a JSON5 document. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json5(&text)
    }

    pub fn from_json5(text: &str) -> Result<Self> {
        let config: Self = json5::from_str(text).map_err(Error::configuration)?;
        config.validate()?;
        Ok(config)
    }

    /// Build from string options, as handed over by an adapter host.
    ///
    /// Unknown keys are rejected; absent keys keep their defaults.
    pub fn from_options(options: &HashMap<String, String>) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in options {
            match key.as_str() {
                "endpoint" => config.endpoint = value.trim().to_string(),
                "num_cards" => config.num_cards = parse_option(key, value)?,
                "num_tf" => config.num_tf = parse_option(key, value)?,
                "base_ip" => config.base_ip = value.trim().to_string(),
                "max_channels" => config.max_channels = parse_option(key, value)?,
                "max_spectra" => config.max_spectra = parse_option(key, value)?,
                "settings_path" => config.settings_path = value.trim().to_string(),
                "run_flags" => config.run_flags = parse_option(key, value)?,
                "debug" => config.debug = parse_option(key, value)?,
                "daq_endpoints" => config.daq_endpoints = value.clone(),
                "poll_interval_ms" => config.poll_interval_ms = parse_option(key, value)?,
                "pending_timeout_ms" => config.pending_timeout_ms = parse_option(key, value)?,
                "max_pending" => config.max_pending = parse_option(key, value)?,
                "backpressure" => config.backpressure = parse_option(key, value)?,
                "key_prefix" => config.key_prefix = value.trim().to_string(),
                "blocking_send" => config.blocking_send = parse_option(key, value)?,
                "zenoh_config_file" => config.zenoh_config_file = value.trim().to_string(),
                other => {
                    return Err(Error::configuration(format!("unknown option '{other}'")));
                }
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint()?;
        if self.poll_interval_ms == 0 {
            return Err(Error::configuration("poll_interval_ms must be positive"));
        }
        if self.pending_timeout_ms == 0 {
            return Err(Error::configuration("pending_timeout_ms must be positive"));
        }
        if self.max_pending == 0 {
            return Err(Error::configuration("max_pending must be positive"));
        }
        if self.key_prefix.trim_matches('/').is_empty() {
            return Err(Error::configuration("key_prefix must not be empty"));
        }
        Ok(())
    }

    pub fn endpoint(&self) -> Result<Endpoint> {
        self.endpoint.parse()
    }

    pub fn daq_endpoints(&self) -> Vec<String> {
        split_list(&self.daq_endpoints)
    }

    /// Values for the initial configure push.
    pub fn settings(&self) -> DetectorSettings {
        DetectorSettings {
            num_cards: self.num_cards,
            num_tf: self.num_tf,
            base_ip: self.base_ip.clone(),
            max_channels: self.max_channels,
            max_spectra: self.max_spectra,
            settings_path: self.settings_path.clone(),
            run_flags: self.run_flags,
            debug: self.debug,
            daq_endpoints: self.daq_endpoints(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_millis(self.pending_timeout_ms)
    }

    pub fn link_config(&self) -> ZLinkConfig {
        let link = ZLinkConfig::default()
            .with_key_prefix(self.key_prefix.clone())
            .blocking(self.blocking_send);
        if self.zenoh_config_file.is_empty() {
            link
        } else {
            link.with_config_file(&self.zenoh_config_file)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_session_overrides_are_client() {
        let overrides = session_overrides();
        let mode = overrides.iter().find(|o| o.key == "mode").unwrap();
        assert_eq!(mode.value, serde_json::json!("client"));
        let mut keys: Vec<_> = overrides.iter().map(|o| o.key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), overrides.len());
    }

    #[test]
    fn test_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.pending_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_pending, 64);
        assert_eq!(config.backpressure, Backpressure::Reject);
        assert_eq!(config.key_prefix, "xspress/ctrl");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_options() {
        let config = DetectorConfig::from_options(&options(&[
            ("endpoint", "192.168.0.10:12000"),
            ("num_cards", "4"),
            ("num_tf", "16384"),
            ("base_ip", "192.168.0.1"),
            ("max_channels", "36"),
            ("settings_path", "/etc/xspress/settings"),
            ("daq_endpoints", "tcp://127.0.0.1:15150, tcp://127.0.0.1:15151"),
            ("backpressure", "drop_oldest"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint().unwrap(), Endpoint::new("192.168.0.10", 12000));
        assert_eq!(config.backpressure, Backpressure::DropOldest);
        let settings = config.settings();
        assert_eq!(settings.num_cards, 4);
        assert_eq!(settings.num_tf, 16384);
        assert_eq!(
            settings.daq_endpoints,
            vec!["tcp://127.0.0.1:15150", "tcp://127.0.0.1:15151"]
        );
    }

    #[test]
    fn test_from_options_rejects_bad_input() {
        for pairs in [
            &[("num_cards", "four")][..],
            &[("endpoint", "nowhere")][..],
            &[("poll_interval_ms", "0")][..],
            &[("backpressure", "block")][..],
            &[("num_process", "1")][..],
        ] {
            assert!(
                matches!(
                    DetectorConfig::from_options(&options(pairs)),
                    Err(Error::Configuration(_))
                ),
                "{pairs:?}"
            );
        }
    }

    #[test]
    fn test_link_config() {
        let link = DetectorConfig::default().link_config();
        assert!(!link.is_blocking());
        assert!(link.config_file().is_none());
        assert_eq!(link.request_key(), "xspress/ctrl/request");

        let config = DetectorConfig::from_options(&options(&[
            ("key_prefix", "lab/xsp3/"),
            ("blocking_send", "true"),
            ("zenoh_config_file", "/nonexistent/zenoh.json5"),
        ]))
        .unwrap();
        let link = config.link_config();
        assert!(link.is_blocking());
        assert_eq!(link.request_key(), "lab/xsp3/request");
        assert!(matches!(
            link.zenoh_config(&config.endpoint().unwrap()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_from_json5() {
        let config = DetectorConfig::from_json5(
            r#"{
                // single card test rig
                endpoint: "localhost:12000",
                num_cards: 1,
                base_ip: "10.0.0.1",
                max_pending: 8,
                backpressure: "drop_oldest",
            }"#,
        )
        .unwrap();
        assert_eq!(config.num_cards, 1);
        assert_eq!(config.max_pending, 8);
        assert_eq!(config.poll_interval_ms, 2000);
        assert!(config.daq_endpoints().is_empty());

        assert!(DetectorConfig::from_json5("{ bogus: 1 }").is_err());
    }
}
