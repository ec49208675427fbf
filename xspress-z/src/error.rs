//! Error types for the detector control bridge

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid path: {0}")]
    PathNotFound(String),

    #[error("invalid value for '{path}': {reason}")]
    InvalidValue { path: String, reason: String },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl Error {
    pub(crate) fn protocol(msg: impl std::fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }

    pub(crate) fn connection(msg: impl std::fmt::Display) -> Self {
        Self::Connection(msg.to_string())
    }

    pub(crate) fn configuration(msg: impl std::fmt::Display) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Whether a REST front end should report this as a client (4xx) error.
    ///
    /// Everything else is a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::PathNotFound(_) | Self::InvalidValue { .. } | Self::Protocol(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(Error::PathNotFound("xsp/nope".into()).is_client_error());
        assert!(
            Error::InvalidValue {
                path: "xsp/num_cards".into(),
                reason: "expected an unsigned integer".into(),
            }
            .is_client_error()
        );
        assert!(!Error::Connection("socket closed".into()).is_client_error());
        assert!(!Error::ResourceExhausted("64 pending".into()).is_client_error());
    }

    #[test]
    fn test_display() {
        let e = Error::InvalidValue {
            path: "xsp/base_ip".into(),
            reason: "expected a string".into(),
        };
        assert_eq!(
            e.to_string(),
            "invalid value for 'xsp/base_ip': expected a string"
        );
    }
}
