use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuelError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Malformed payload for tag {tag:?}: {source}")]
    MalformedPayload {
        tag: char,
        #[source]
        source: serde_json::Error,
    },
    #[error("Address error: {0}")]
    AddressError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl DuelError {
    /// Wraps a failure to parse a payload whose bytes were read in full.
    /// The stream is still aligned on the next tag.
    pub fn payload(tag: u8, source: serde_json::Error) -> Self {
        DuelError::MalformedPayload {
            tag: char::from(tag),
            source,
        }
    }

    /// True when the error means the underlying stream can no longer be read.
    pub fn is_disconnect(&self) -> bool {
        match self {
            DuelError::IoError(_) => true,
            DuelError::SerializationError(e) => e.is_eof() || e.is_io(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DuelError>;
