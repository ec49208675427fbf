use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::json;
use tracing::{debug, info, trace, warn};
use zenoh::{Session, Wait, qos::CongestionControl};

use super::{FrameSink, Link};
use crate::attachment::Attachment;
use crate::config::session_overrides;
use crate::endpoint::{ClientIdentity, Endpoint};
use crate::{Error, Result};

pub const DEFAULT_KEY_PREFIX: &str = "xspress/ctrl";

const CONFIG_FILE_ENV: &str = "XSPRESS_Z_CONFIG_FILE";
const CONFIG_OVERRIDE_ENV: &str = "XSPRESS_Z_CONFIG_OVERRIDE";

/// Session settings for a [`ZLink`].
///
/// Layering, lowest priority first: the zenoh config file (explicit path or
/// `XSPRESS_Z_CONFIG_FILE`), the built-in client overrides, the endpoint,
/// `XSPRESS_Z_CONFIG_OVERRIDE`, then overrides added with [`with_json`].
///
/// [`with_json`]: ZLinkConfig::with_json
#[derive(Debug, Clone)]
pub struct ZLinkConfig {
    key_prefix: String,
    config_file: Option<PathBuf>,
    config_overrides: Vec<(String, serde_json::Value)>,
    blocking: bool,
}

impl Default for ZLinkConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            config_file: None,
            config_overrides: Vec::new(),
            blocking: false,
        }
    }
}

impl ZLinkConfig {
    pub fn with_key_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.key_prefix = prefix.into().trim_end_matches('/').to_string();
        self
    }

    /// Load the zenoh configuration from a JSON5 file
    pub fn with_config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Add a JSON configuration override
    ///
    /// # Example
    /// ```
    /// use serde_json::json;
    /// use xspress_z::transport::ZLinkConfig;
    ///
    /// let cfg = ZLinkConfig::default()
    ///     .with_json("transport/unicast/open_timeout", json!(5000));
    /// ```
    pub fn with_json<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
        self.config_overrides.push((key.into(), value));
        self
    }

    /// Block on a congested transmit queue instead of dropping the frame
    pub fn blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn config_file(&self) -> Option<&PathBuf> {
        self.config_file.as_ref()
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn request_key(&self) -> String {
        format!("{}/request", self.key_prefix)
    }

    pub fn reply_key(&self, identity: &ClientIdentity) -> String {
        format!("{}/reply/{}", self.key_prefix, identity)
    }

    /// Parse `key1=value1;key2=value2` with JSON5 values
    fn env_overrides() -> Result<Vec<(String, serde_json::Value)>> {
        let mut overrides = Vec::new();
        let Ok(overrides_str) = std::env::var(CONFIG_OVERRIDE_ENV) else {
            return Ok(overrides);
        };
        debug!(
            "Applying config overrides from {}: {}",
            CONFIG_OVERRIDE_ENV, overrides_str
        );

        for pair in overrides_str.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                return Err(Error::configuration(format!(
                    "invalid {CONFIG_OVERRIDE_ENV} entry '{pair}', expected 'key=value'"
                )));
            };
            let key = key.trim();
            let value = value.trim();
            let json_value = json5::from_str::<serde_json::Value>(value).map_err(|e| {
                Error::configuration(format!(
                    "failed to parse {CONFIG_OVERRIDE_ENV} value for key '{key}': {e} (value: {value})"
                ))
            })?;
            debug!("Override: {} = {}", key, json_value);
            overrides.push((key.to_string(), json_value));
        }
        Ok(overrides)
    }

    pub(crate) fn zenoh_config(&self, endpoint: &Endpoint) -> Result<zenoh::Config> {
        let mut config = if let Some(ref path) = self.config_file {
            zenoh::Config::from_file(path).map_err(Error::configuration)?
        } else if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            zenoh::Config::from_file(path).map_err(Error::configuration)?
        } else {
            zenoh::Config::default()
        };

        let mut layers: Vec<(String, serde_json::Value)> = session_overrides()
            .into_iter()
            .map(|o| (o.key.to_string(), o.value))
            .collect();
        layers.push(("connect/endpoints".to_string(), json!([endpoint.locator()])));
        layers.extend(Self::env_overrides()?);
        layers.extend(self.config_overrides.iter().cloned());

        for (key, value) in layers {
            let value_str = serde_json::to_string(&value).map_err(|e| {
                Error::configuration(format!("failed to serialize value for key '{key}': {e}"))
            })?;
            config.insert_json5(&key, &value_str).map_err(|e| {
                Error::configuration(format!(
                    "failed to apply config override '{key}' = '{value_str}': {e}"
                ))
            })?;
        }
        Ok(config)
    }
}

/// Link over a zenoh session in client mode.
///
/// Frames go out on `<prefix>/request`; replies come back on
/// `<prefix>/reply/<identity>`.
pub struct ZLink {
    session: Session,
    publisher: zenoh::pubsub::Publisher<'static>,
    _subscriber: zenoh::pubsub::Subscriber<()>,
    identity: ClientIdentity,
    sn: AtomicI64,
}

impl Link for ZLink {
    type Config = ZLinkConfig;

    fn open(
        config: &ZLinkConfig,
        endpoint: &Endpoint,
        identity: &ClientIdentity,
        sink: FrameSink,
    ) -> Result<Self> {
        let zconfig = config.zenoh_config(endpoint)?;
        let session = zenoh::open(zconfig).wait().map_err(Error::connection)?;

        let request_key = config.request_key();
        let reply_key = config.reply_key(identity);
        debug!("[ZL] request KE: {request_key}, reply KE: {reply_key}");

        let congestion = if config.blocking {
            CongestionControl::Block
        } else {
            CongestionControl::Drop
        };
        let publisher = session
            .declare_publisher(request_key)
            .congestion_control(congestion)
            .wait()
            .map_err(Error::connection)?;

        let subscriber = session
            .declare_subscriber(reply_key)
            .callback(move |sample| {
                let frame = sample.payload().to_bytes().into_owned();
                sink.deliver(frame);
            })
            .wait()
            .map_err(Error::connection)?;

        info!("[ZL] link ready: endpoint={}, identity={}", endpoint, identity);

        Ok(ZLink {
            session,
            publisher,
            _subscriber: subscriber,
            identity: identity.clone(),
            sn: AtomicI64::new(0),
        })
    }

    fn send(&self, frame: Vec<u8>) -> Result<()> {
        let sn = self.sn.fetch_add(1, Ordering::Relaxed);
        trace!("[ZL] put sn={} len={}", sn, frame.len());
        self.publisher
            .put(frame)
            .attachment(Attachment::new(sn, &self.identity))
            .wait()
            .map_err(Error::connection)
    }

    fn is_connected(&self) -> bool {
        if self.session.is_closed() {
            return false;
        }
        let info = self.session.info();
        let mut routers = info.routers_zid().wait();
        if routers.next().is_some() {
            return true;
        }
        info.peers_zid().wait().next().is_some()
    }

    fn close(&self) -> Result<()> {
        if self.session.is_closed() {
            warn!("[ZL] session already closed");
            return Ok(());
        }
        self.session.close().wait().map_err(Error::connection)
    }
}
