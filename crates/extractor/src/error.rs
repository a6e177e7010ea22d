use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("invalid extractor configuration: {0}")]
    Config(String),

    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("completion request failed: {0}")]
    Request(reqwest::Error),

    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response did not conform to expected schema: {0}")]
    ResponseParse(#[from] serde_json::Error),

    #[error("completion response contained no text")]
    EmptyResponse,
}

pub type ExtractorResult<T> = std::result::Result<T, ExtractorError>;
