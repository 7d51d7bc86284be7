// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

/// All errors that can occur in the webbrick-lan-bridge library.
///
/// Nothing here is fatal to a running driver; every failure is scoped to
/// the single operation that raised it. The one startup-time exception is
/// [`WebbrickError::LocalIpUnavailable`], which prevents the driver from
/// starting at all (without a local address, self-origin datagrams cannot
/// be told apart from real traffic).
#[derive(Debug, thiserror::Error)]
pub enum WebbrickError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("unknown source-type code: {code:?}")]
    UnknownDeviceType { code: String },

    #[error("{operation} is not supported for {category} device {uid}")]
    UnsupportedOperation {
        uid: String,
        category: &'static str,
        operation: &'static str,
    },

    #[error("unknown device: {uid}")]
    UnknownDevice { uid: String },

    #[error("no known address for brick {brick_id}")]
    UnknownBrick { brick_id: u8 },

    #[error("unable to determine local interface address")]
    LocalIpUnavailable,
}

impl WebbrickError {
    /// Whether this error is transient and the operation is worth retrying.
    ///
    /// Poll failures retry naturally on the next tick; command failures are
    /// surfaced to the caller, who can use this to decide whether to re-issue.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebbrickError::Io(_) | WebbrickError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, WebbrickError>;
