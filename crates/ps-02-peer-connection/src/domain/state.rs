//! Connection lifecycle.
//!
//! ```text
//! Connecting -> Handshaking{VersionSent | AwaitingVerack} -> Ready -> Disconnecting -> Closed
//!      \______________________\_____________________________\____________\-> Banned
//! ```

/// Progress inside the version/verack exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStep {
    /// Our `version` is out, theirs has not arrived.
    VersionSent,
    /// Both versions exchanged, waiting for their `verack`.
    AwaitingVerack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Handshaking(HandshakeStep),
    Ready,
    Disconnecting,
    Closed,
    Banned,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Banned)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// Legal transitions. `Ready` is only reachable from the handshake.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        use HandshakeStep::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Banned) => true,
            (Connecting, Handshaking(_)) => true,
            (Handshaking(VersionSent), Handshaking(AwaitingVerack)) => true,
            (Handshaking(_), Ready) => true,
            (Connecting | Handshaking(_) | Ready, Disconnecting) => true,
            (Disconnecting, Closed) => true,
            _ => false,
        }
    }
}
