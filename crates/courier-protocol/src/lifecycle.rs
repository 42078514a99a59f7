//! Disconnect-cause classification.
//!
//! Causes mirror the lifecycle reasons a transport reports when a connection
//! terminates. Classification is observability only: every cause funnels
//! into the same cleanup path.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// The server force-closed the connection.
    ServerForcedDisconnect,
    /// The client closed the connection deliberately.
    ClientInitiatedDisconnect,
    /// The server is shutting down.
    ServerShutdown,
    /// The client stopped answering pings within the configured timeout.
    PingTimeout,
    /// The underlying transport closed (network drop, interface change).
    TransportClose,
    /// The underlying transport reported an error.
    TransportError,
    /// A cause string the classifier does not know. Cleanup proceeds
    /// normally; the raw string is kept for the logs.
    Unrecognized(String),
}

impl DisconnectCause {
    /// Classify a transport-reported cause string.
    pub fn classify(raw: &str) -> Self {
        match raw {
            "server namespace disconnect" => Self::ServerForcedDisconnect,
            "client namespace disconnect" => Self::ClientInitiatedDisconnect,
            "server shutting down" => Self::ServerShutdown,
            "ping timeout" => Self::PingTimeout,
            "transport close" => Self::TransportClose,
            "transport error" => Self::TransportError,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerForcedDisconnect => "server forced disconnect",
            Self::ClientInitiatedDisconnect => "client initiated disconnect",
            Self::ServerShutdown => "server shutdown",
            Self::PingTimeout => "ping timeout",
            Self::TransportClose => "transport close",
            Self::TransportError => "transport error",
            Self::Unrecognized(raw) => raw,
        }
    }

    /// True for causes that indicate a fault rather than an orderly close.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::TransportError | Self::Unrecognized(_))
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
