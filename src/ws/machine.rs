//! Connection state machine.
//!
//! Every socket, timer and caller signal is turned into a [`ConnEvent`] and fed
//! through [`ConnectionMachine::handle`]. The machine never performs I/O; it
//! returns the [`Command`]s the driver must carry out. Because the driver is
//! the only caller, transitions are serialized.

use super::backoff::Backoff;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

/// An inbound data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnEvent {
    ConnectRequested,
    Opened,
    ConnectFailed(String),
    FrameReceived(Frame),
    Closed(String),
    RetryElapsed,
    ShutdownRequested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch a socket token and open a new transport.
    OpenSocket,
    StartHeartbeat,
    StopHeartbeat,
    /// Close the socket (or abandon the pending open) and report `Closed`.
    CloseSocket,
    /// Forget a socket that has already failed.
    DropSocket,
    ScheduleReconnect(Duration),
    CancelReconnect,
    /// Hand the payload to the dispatch worker.
    HandleFrame(Vec<u8>),
}

/// Liveness reply from the server; never decoded.
pub const PONG: &str = "PONG";

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    backoff: Backoff,
    /// Set once a connection attempt has failed and cleared on open.
    reconnecting: bool,
    shutdown: bool,
}

impl ConnectionMachine {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff,
            reconnecting: false,
            shutdown: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[cfg(test)]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub fn handle(&mut self, event: ConnEvent) -> Vec<Command> {
        use ConnectionState::*;

        match event {
            ConnEvent::ConnectRequested => {
                self.shutdown = false;
                match self.state {
                    Disconnected => {
                        self.state = Connecting;
                        vec![Command::CancelReconnect, Command::OpenSocket]
                    }
                    // Closing finishes with `Closed`, which now schedules a retry.
                    Connecting | Open | Closing => Vec::new(),
                }
            }

            ConnEvent::Opened => match self.state {
                Connecting => {
                    self.state = Open;
                    self.backoff.reset();
                    self.reconnecting = false;
                    vec![Command::StartHeartbeat]
                }
                _ => Vec::new(),
            },

            ConnEvent::ConnectFailed(_) | ConnEvent::Closed(_) => match self.state {
                // Duplicate failure signals for the same socket land here.
                Disconnected => Vec::new(),
                Connecting | Open | Closing => {
                    self.state = Disconnected;
                    let mut commands = vec![Command::StopHeartbeat, Command::DropSocket];
                    if !self.shutdown {
                        if self.reconnecting {
                            self.backoff.grow();
                        }
                        self.reconnecting = true;
                        commands.push(Command::ScheduleReconnect(self.backoff.current()));
                    }
                    commands
                }
            },

            ConnEvent::RetryElapsed => {
                if self.state == Disconnected && self.reconnecting && !self.shutdown {
                    self.state = Connecting;
                    vec![Command::OpenSocket]
                } else {
                    Vec::new()
                }
            }

            ConnEvent::ShutdownRequested => {
                self.shutdown = true;
                self.reconnecting = false;
                let mut commands = vec![Command::CancelReconnect, Command::StopHeartbeat];
                match self.state {
                    Connecting | Open => {
                        self.state = Closing;
                        commands.push(Command::CloseSocket);
                    }
                    Disconnected | Closing => {}
                }
                commands
            }

            ConnEvent::FrameReceived(frame) => {
                if self.state != Open {
                    return Vec::new();
                }
                match frame {
                    Frame::Text(text) if text == PONG => Vec::new(),
                    Frame::Text(text) => vec![Command::HandleFrame(text.into_bytes())],
                    Frame::Binary(bytes) => vec![Command::HandleFrame(bytes)],
                }
            }
        }
    }
}
