//! Error types for kvs-signaling

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignalingError {
    /// Construction-time configuration problem (missing field, role mismatch).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The channel endpoint handed to the signer cannot be presigned.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// No credential source yielded a usable key pair.
    #[error("credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error("client is already open, opening, or closing")]
    AlreadyOpen,

    #[error("could not send message because the connection to the signaling service is not open")]
    NotOpen,

    #[error("unexpected recipient client id; as the VIEWER, messages must not be sent with a recipient client id")]
    ViewerMustNotAddressRecipient,

    /// Bubbled up from the WebSocket transport (dial, read, write).
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, SignalingError>;
