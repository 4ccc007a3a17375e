//! Crate-wide error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolrError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Solr returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid response payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("invalid Solr URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SolrError>;
