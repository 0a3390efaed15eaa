use thiserror::Error;

/// Failures talking to the epay gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Gateway misconfigured: {0}")]
    Configuration(&'static str),

    #[error("Gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gateway rejected the access token")]
    Unauthorized,

    #[error("Gateway returned HTTP {status}: {body}")]
    Gateway { status: u16, body: String },

    #[error("Failed to encode gateway request: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode gateway response: {0}")]
    Decode(#[source] serde_json::Error),
}
