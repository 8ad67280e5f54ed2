//! Wireless link supervision

mod nmcli;
mod state;

pub use nmcli::NmcliDriver;
pub use state::{LinkEvent, LinkState, LinkStateMachine};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tracing::{info, warn};

use crate::config::WifiConfig;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("network stack failed to initialize: {0}")]
    StackInit(String),

    #[error("driver command failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("link supervision ended before an outcome")]
    SupervisorGone,
}

/// Terminal result the bootstrap waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Connected,
    Failed,
}

/// Adapter between the state machine and a real wireless stack.
///
/// The machine never touches the network; a driver turns its side of
/// the world into [`LinkEvent`]s and starts attempts when asked.
#[async_trait]
pub trait WifiDriver: Send {
    /// Brings the underlying network stack up. Errors here are fatal
    /// to bootstrap.
    async fn start_stack(&mut self) -> Result<(), LinkError>;

    /// Starts one connection attempt. The attempt's outcome arrives
    /// later as an event; if the attempt cannot even start, the driver
    /// must still surface a Disconnected event so the retry budget
    /// runs down.
    async fn connect(&mut self) -> Result<(), LinkError>;

    /// Waits for the next link event; `None` means the driver has shut
    /// down and no more events will come.
    async fn next_event(&mut self) -> Option<LinkEvent>;
}

/// Supervises the wireless link.
///
/// Owns the state machine on a background task, feeds it driver
/// events, exposes read-only state snapshots and the one-shot
/// bootstrap wait.
#[derive(Debug)]
pub struct WifiManager {
    state_rx: watch::Receiver<LinkState>,
    outcome_rx: Option<oneshot::Receiver<LinkOutcome>>,
    wait_timeout: Option<Duration>,
}

impl WifiManager {
    /// Starts the stack and spawns the supervision task.
    pub async fn start<D>(mut driver: D, config: &WifiConfig) -> Result<Self, LinkError>
    where
        D: WifiDriver + 'static,
    {
        driver.start_stack().await?;

        let (state_tx, state_rx) = watch::channel(LinkState::Idle);
        let (outcome_tx, outcome_rx) = oneshot::channel();

        tokio::spawn(supervise(driver, config.max_retries, state_tx, outcome_tx));

        Ok(Self {
            state_rx,
            outcome_rx: Some(outcome_rx),
            wait_timeout: config.wait_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Read-only snapshot of the current link state.
    pub fn state(&self) -> LinkState {
        *self.state_rx.borrow()
    }

    /// Watch handle for observing transitions.
    pub fn watch(&self) -> watch::Receiver<LinkState> {
        self.state_rx.clone()
    }

    /// Waits until the machine first reaches Connected or Failed.
    ///
    /// Resolves exactly once from the supervisor; later calls answer
    /// from the current snapshot instead of waiting again. Without a
    /// configured timeout the wait is indefinite, which is safe
    /// because the bounded retry budget forces a terminal state once
    /// attempts have started.
    pub async fn wait_for_outcome(&mut self) -> Result<LinkOutcome, LinkError> {
        let Some(rx) = self.outcome_rx.take() else {
            return Ok(match self.state() {
                LinkState::Connected => LinkOutcome::Connected,
                _ => LinkOutcome::Failed,
            });
        };

        match self.wait_timeout {
            None => rx.await.map_err(|_| LinkError::SupervisorGone),
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(resolved) => resolved.map_err(|_| LinkError::SupervisorGone),
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "Link wait timed out");
                    Ok(LinkOutcome::Failed)
                }
            },
        }
    }
}

/// Event loop behind [`WifiManager`]: runs the machine, triggers
/// connection attempts, publishes state and resolves the first
/// terminal outcome.
async fn supervise<D: WifiDriver>(
    mut driver: D,
    max_retries: u32,
    state_tx: watch::Sender<LinkState>,
    outcome_tx: oneshot::Sender<LinkOutcome>,
) {
    let mut machine = LinkStateMachine::new(max_retries);
    let mut outcome_tx = Some(outcome_tx);

    while let Some(event) = driver.next_event().await {
        let prev = machine.state();
        let next = machine.apply(event);

        if next != prev {
            info!(from = %prev, to = %next, retries = machine.retries(), "Link state changed");
            let _ = state_tx.send(next);
        }

        // A fresh entry into Connecting means an attempt should be
        // running: the initial one after stack start, or a retry
        // after a drop.
        let attempt = match (event, next) {
            (LinkEvent::StackStarted, LinkState::Connecting) if prev == LinkState::Idle => true,
            (LinkEvent::Disconnected, LinkState::Connecting) => true,
            _ => false,
        };

        if attempt {
            if let Err(err) = driver.connect().await {
                // The driver queues the failed attempt as an event of
                // its own; nothing more to do here.
                warn!(error = %err, "Connection attempt failed to start");
            }
        }

        if next.is_terminal() {
            if let Some(tx) = outcome_tx.take() {
                let outcome = match next {
                    LinkState::Connected => LinkOutcome::Connected,
                    _ => LinkOutcome::Failed,
                };
                let _ = tx.send(outcome);
            }
        }
    }

    info!("Link supervision ended");
}
