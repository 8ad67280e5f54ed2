//! Pure link state machine

use std::fmt;

/// Connectivity lifecycle of the wireless link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing started yet
    Idle,
    /// An attempt is in flight
    Connecting,
    /// Link is up with an address
    Connected,
    /// Retry budget exhausted
    Failed,
}

impl LinkState {
    /// True for the states that resolve the bootstrap wait
    pub fn is_terminal(self) -> bool {
        matches!(self, LinkState::Connected | LinkState::Failed)
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkState::Idle => "idle",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
            LinkState::Failed => "failed",
        })
    }
}

/// Events fed to the machine by a driver adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// Network stack is up; attempts may begin
    StackStarted,
    /// The link came up and holds an address
    AddressAcquired,
    /// The link dropped, or an attempt failed
    Disconnected,
}

/// Transition core: owns the retry counter, performs no I/O.
///
/// Losing an established link resets the counter before reconnecting,
/// so an outage only counts against the budget once fresh attempts
/// start failing too. Once Failed, further disconnects are absorbed
/// without touching the counter; a late address still flips the
/// machine back to Connected.
#[derive(Debug)]
pub struct LinkStateMachine {
    state: LinkState,
    retries: u32,
    max_retries: u32,
}

impl LinkStateMachine {
    pub fn new(max_retries: u32) -> Self {
        Self {
            state: LinkState::Idle,
            retries: 0,
            max_retries,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Applies one event and returns the resulting state.
    pub fn apply(&mut self, event: LinkEvent) -> LinkState {
        use LinkEvent::*;
        use LinkState::*;

        let next = match (self.state, event) {
            (Idle, StackStarted) => Connecting,

            (Connecting, AddressAcquired) | (Failed, AddressAcquired) => {
                self.retries = 0;
                Connected
            }

            (Connecting, Disconnected) => {
                if self.retries < self.max_retries {
                    self.retries += 1;
                }
                if self.retries < self.max_retries {
                    Connecting
                } else {
                    Failed
                }
            }

            // An established link that drops gets a fresh budget
            // before anything counts toward Failed again.
            (Connected, Disconnected) => {
                self.retries = 0;
                Connecting
            }

            // Everything else is absorbed: stray stack starts,
            // disconnects while Idle or already Failed, addresses
            // before the stack is up.
            (state, _) => state,
        };

        self.state = next;
        next
    }
}
