//! Error types for mijia-core.
//!
//! Every failure is surfaced to the caller; the core never retries on its own.
//! Retry policy, if any, belongs to whoever drives the [`crate::Device`].
//!
//! | Error Type | Meaning | Usual response |
//! |------------|---------|----------------|
//! | [`Error::NotConnected`] | No live session, or the link dropped mid-operation | Reconnect |
//! | [`Error::Resolution`] | Service or characteristic missing on the peripheral | Wrong model, do not retry |
//! | [`Error::Decode`] / [`Error::InvalidReadingFormat`] | Payload does not match the layout | Report, do not retry |
//! | [`Error::WriteFailed`] | Peripheral rejected a write | Retry once |
//! | [`Error::InvalidArgument`] | Caller value outside the accepted domain | Fix input |
//! | [`Error::ConnectionFailed`] | Platform link could not be established | Retry with backoff |
//! | [`Error::Timeout`] | A configured deadline elapsed | Retry |

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur when talking to a Mijia sensor.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the platform stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Discovery did not return a matching peripheral.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// An accessor that needs a bound peripheral was called before discovery.
    #[error("No device bound; request a device first")]
    NoDevice,

    /// Operation attempted while not connected, or the link went down.
    #[error("Not connected to device")]
    NotConnected,

    /// A required service or characteristic is not present on the peripheral.
    #[error("{kind} not found: {uuid}")]
    Resolution {
        /// What was being resolved.
        kind: ResolutionKind,
        /// The identifier that could not be resolved.
        uuid: String,
    },

    /// The payload did not match the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The payload is shorter than the fixed layout requires.
    #[error("Invalid reading format: expected {expected} bytes, got {actual}")]
    InvalidReadingFormat {
        /// Expected data size.
        expected: usize,
        /// Actual data size received.
        actual: usize,
    },

    /// The peripheral rejected a write.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// A caller-supplied value is outside the accepted domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// What a [`Error::Resolution`] failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    /// A GATT service.
    Service,
    /// A characteristic within a service.
    Characteristic,
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service => write!(f, "Service"),
            Self::Characteristic => write!(f, "Characteristic"),
        }
    }
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// No peripheral has been bound yet.
    NoHandle,
    /// Connection attempt timed out.
    Timeout,
    /// Generic BLE error.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoHandle => write!(f, "no device bound"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// No peripheral matching the request filters was seen.
    NoMatch {
        /// The names that were requested.
        filters: Vec<String>,
    },
    /// Device with specified name/address not found.
    NotFound { identifier: String },
    /// Scan timed out before finding a device.
    ScanTimeout { duration: Duration },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatch { filters } => {
                write!(f, "no device matching [{}]", filters.join(", "))
            }
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::ScanTimeout { duration } => write!(f, "scan timed out after {:?}", duration),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a service resolution error.
    pub fn service_not_found(uuid: impl fmt::Display) -> Self {
        Self::Resolution {
            kind: ResolutionKind::Service,
            uuid: uuid.to_string(),
        }
    }

    /// Create a characteristic resolution error.
    pub fn characteristic_not_found(uuid: impl fmt::Display) -> Self {
        Self::Resolution {
            kind: ResolutionKind::Characteristic,
            uuid: uuid.to_string(),
        }
    }

    /// Create an invalid reading format error.
    pub fn invalid_reading(expected: usize, actual: usize) -> Self {
        Self::InvalidReadingFormat { expected, actual }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a write failure.
    pub fn write_failed(uuid: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            uuid: uuid.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Whether this error means the payload did not match its layout.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::InvalidReadingFormat { .. })
    }
}

impl From<mijia_types::ParseError> for Error {
    fn from(err: mijia_types::ParseError) -> Self {
        match err {
            mijia_types::ParseError::InsufficientBytes { expected, actual } => {
                Error::InvalidReadingFormat { expected, actual }
            }
            mijia_types::ParseError::Malformed(msg) => Error::Decode(msg),
            mijia_types::ParseError::InvalidValue(msg) => Error::InvalidArgument(msg),
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::Decode(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using mijia-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("AA:BB:CC:DD:EE:FF");
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::characteristic_not_found("ebe0ccc1-7a0a-4b0c-8a1a-6ff2997da3a6");
        assert_eq!(
            err.to_string(),
            "Characteristic not found: ebe0ccc1-7a0a-4b0c-8a1a-6ff2997da3a6"
        );

        let err = Error::timeout("connect", Duration::from_secs(10));
        assert!(err.to_string().contains("connect"));
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_device_not_found_reasons() {
        let err = Error::DeviceNotFound(DeviceNotFoundReason::NoMatch {
            filters: vec!["LYWSD02".into(), "MJ_HT_V1".into()],
        });
        assert!(err.to_string().contains("LYWSD02, MJ_HT_V1"));

        let err = Error::DeviceNotFound(DeviceNotFoundReason::ScanTimeout {
            duration: Duration::from_secs(30),
        });
        assert!(err.to_string().contains("30s"));

        let err = Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter);
        assert!(err.to_string().contains("no Bluetooth adapter available"));
    }

    #[test]
    fn test_connection_failure_reasons() {
        let err = Error::connection_failed(None, ConnectionFailureReason::NoHandle);
        assert!(err.to_string().contains("no device bound"));

        let err = Error::connection_failed(
            Some("E7:2E:00:AA:BB:CC".into()),
            ConnectionFailureReason::Timeout,
        );
        assert!(err.to_string().contains("connection timed out"));

        let reason = ConnectionFailureReason::BleError("link refused".into());
        assert_eq!(reason.to_string(), "BLE error: link refused");
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = mijia_types::ParseError::insufficient(14, 2).into();
        assert!(matches!(
            err,
            Error::InvalidReadingFormat {
                expected: 14,
                actual: 2
            }
        ));
        assert!(err.is_decode());

        let err: Error = mijia_types::ParseError::Malformed("x".into()).into();
        assert!(err.is_decode());

        let err: Error = mijia_types::ParseError::InvalidValue("K".into()).into();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!err.is_decode());
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }
}
