use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

/// Errors reported by the MQTT client library.
///
/// Validation errors are reported synchronously, before any resource is
/// acquired. Errors that occur while an operation is in flight surface
/// through the operation's terminal status and propagate to waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MqttError {
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    #[error("Bad parameter: {0}")]
    BadParameter(String),

    #[error("No memory")]
    NoMemory,

    #[error("Network error")]
    NetworkError,

    #[error("Scheduling error")]
    SchedulingError,

    #[error("Bad response received: {0}")]
    BadResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Server refused request")]
    ServerRefused,

    #[error("No response after retries")]
    RetryNoResponse,
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        tracing::debug!(error = %err, "I/O error mapped to network error");
        MqttError::NetworkError
    }
}
