use base64::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NcmError {
    #[error("not a valid NCM file: {0}")]
    InvalidFormat(String),
    #[error("truncated file: {section} needs {expected} bytes but only {actual} remain")]
    Truncated {
        section: &'static str,
        expected: u64,
        actual: u64,
    },
    #[error("decryption failed: {0}")]
    Crypto(String),
    #[error("metadata decode failed: {0}")]
    Metadata(#[from] MetadataError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while recovering the embedded metadata. These never abort a decode.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("blob too short ({0} bytes)")]
    TooShort(usize),
    #[error("base64 decode error: {0}")]
    Base64(#[from] DecodeError),
    #[error("cipher error: {0}")]
    Cipher(String),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NcmError>;
