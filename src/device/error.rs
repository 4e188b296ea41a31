use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device at {url} is unreachable: {message}")]
    Unreachable { url: String, message: String },
    #[error("{path} failed with HTTP {status}: {body}")]
    Rejected {
        path: String,
        status: u16,
        body: String,
    },
    #[error("{path} returned malformed JSON")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} returned an unusable document: {message}")]
    Invalid { path: String, message: String },
    #[error("failed to read response body from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl DeviceError {
    /// Plain-text message the device attached to a rejected request, if any.
    pub fn device_message(&self) -> Option<&str> {
        match self {
            DeviceError::Rejected { body, .. } if !body.trim().is_empty() => Some(body.trim()),
            _ => None,
        }
    }
}
