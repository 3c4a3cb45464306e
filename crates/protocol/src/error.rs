use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed channel frame: {0}")]
    MalformedFrame(#[source] serde_json::Error),
    #[error("failed to encode {method} call: {source}")]
    Encode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
