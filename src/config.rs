use crate::error::{Result, SignalingError};
use crate::signer::Credentials;

/// Actor role on a signaling channel.
///
/// A master accepts offers from any number of remote viewers; a viewer talks
/// to exactly one master and identifies itself with a client id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Viewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Master => write!(f, "MASTER"),
            Role::Viewer => write!(f, "VIEWER"),
        }
    }
}

/// Connection configuration for one signaling channel.
///
/// Immutable after construction; `SignalingClient::new` validates it.
#[derive(Debug, Clone)]
pub struct Config {
    /// ARN of the signaling channel.
    pub channel_arn: String,
    /// WebSocket endpoint for the channel (`wss://…`, no query string).
    pub channel_endpoint: String,
    /// AWS region used in the credential scope.
    pub region: String,
    pub role: Role,
    /// Viewer identifier. Required for `Role::Viewer`, forbidden for
    /// `Role::Master`.
    pub client_id: Option<String>,
    /// Offset in milliseconds applied to all signing times, for hosts with
    /// skewed clocks.
    pub system_clock_offset_ms: i64,
    /// Static credentials. When absent, the environment and the shared
    /// credentials file are consulted at presign time.
    pub credentials: Option<Credentials>,
}

impl Config {
    pub fn new(
        channel_arn: impl Into<String>,
        channel_endpoint: impl Into<String>,
        region: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            channel_arn: channel_arn.into(),
            channel_endpoint: channel_endpoint.into(),
            region: region.into(),
            role,
            client_id: None,
            system_clock_offset_ms: 0,
            credentials: None,
        }
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn system_clock_offset_ms(mut self, offset_ms: i64) -> Self {
        self.system_clock_offset_ms = offset_ms;
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match self.role {
            Role::Viewer => {
                if self.client_id.as_deref().unwrap_or("").is_empty() {
                    return Err(SignalingError::InvalidConfig(
                        "clientID cannot be nil".into(),
                    ));
                }
            }
            Role::Master => {
                if self.client_id.is_some() {
                    return Err(SignalingError::InvalidConfig(
                        "clientID should be nil when master selected".into(),
                    ));
                }
            }
        }
        if self.channel_arn.is_empty() {
            return Err(SignalingError::InvalidConfig(
                "channelARN cannot be nil".into(),
            ));
        }
        if self.region.is_empty() {
            return Err(SignalingError::InvalidConfig("region cannot be nil".into()));
        }
        if self.channel_endpoint.is_empty() {
            return Err(SignalingError::InvalidConfig(
                "channelEndpoint cannot be nil".into(),
            ));
        }
        Ok(())
    }
}
