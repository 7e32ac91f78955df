//! Per-device connection state machine.
//!
//! The machine is pure: it owns no transport and performs no I/O. The
//! device worker feeds it [`TransportEvent`]s one at a time and acts on
//! the transitions it reports. Events that have no defined transition
//! from the current state are ignored, which is what discards a late
//! `Ready` arriving after a disconnect.

use serde::Serialize;

use crate::backend::TransportEvent;

/// Connection lifecycle states of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// A service asked for out-of-band pairing.
    PairingRequired,
    /// Connected; commands are accepted.
    Connected,
    /// Was connected (or connecting) and is no longer.
    Disconnected,
    /// Pairing failed. Terminal until the next connection attempt.
    Failed,
}

/// Pure transition table over [`ConnectionState`].
#[derive(Debug)]
pub(crate) struct ConnectionMachine {
    state: ConnectionState,
}

impl ConnectionMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// Attempts to enter `Connecting`.
    ///
    /// Allowed from `Idle`, `Disconnected` and `Failed`. Returns the
    /// `(from, to)` pair on success, `None` when a connection attempt is
    /// already in flight or the device is already connected.
    pub(crate) fn begin_connect(&mut self) -> Option<(ConnectionState, ConnectionState)> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Disconnected | ConnectionState::Failed => {
                Some(self.transition(ConnectionState::Connecting))
            }
            ConnectionState::Connecting
            | ConnectionState::PairingRequired
            | ConnectionState::Connected => None,
        }
    }

    /// Applies one transport event, returning the `(from, to)` pair when
    /// the event causes a transition and `None` when it is ignored.
    pub(crate) fn apply(
        &mut self,
        event: &TransportEvent,
    ) -> Option<(ConnectionState, ConnectionState)> {
        match (self.state, event) {
            (ConnectionState::Connecting, TransportEvent::Ready) => {
                Some(self.transition(ConnectionState::Connected))
            }
            (
                ConnectionState::Connecting | ConnectionState::Connected,
                TransportEvent::PairingRequired { .. },
            ) => Some(self.transition(ConnectionState::PairingRequired)),
            (ConnectionState::PairingRequired, TransportEvent::PairingFailed { .. }) => {
                Some(self.transition(ConnectionState::Failed))
            }
            (ConnectionState::PairingRequired, TransportEvent::PairingSucceeded { .. }) => {
                Some(self.transition(ConnectionState::Connected))
            }
            (ConnectionState::Disconnected, TransportEvent::Disconnected(_)) => None,
            (_, TransportEvent::Disconnected(_)) => {
                Some(self.transition(ConnectionState::Disconnected))
            }
            _ => None,
        }
    }

    fn transition(&mut self, to: ConnectionState) -> (ConnectionState, ConnectionState) {
        let from = self.state;
        self.state = to;
        (from, to)
    }
}
