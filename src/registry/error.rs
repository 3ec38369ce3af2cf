use thiserror::Error;

/// Failure of a single registry call. Never leaves the registry module:
/// the public operations log it and degrade to an empty value.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    #[error("result code {code}: {message}")]
    ResultCode { code: String, message: String },
    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}
